//! `cd` はプロセス全体のカレントディレクトリを変えるため、独立したテストバイナリで確認する。

use std::env;
use std::fs;

use myshell::config::Config;
use myshell::shell::Shell;

#[test]
fn cd_changes_shell_directory_and_children_inherit_it() {
    let dir = env::temp_dir().join(format!("myshell-cd-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    let dir = dir.canonicalize().unwrap();

    let mut shell = Shell::new(&Config::default());
    let original = env::current_dir().unwrap();

    assert_eq!(shell.run_line(&format!("cd {}", dir.display())), 0);
    assert_eq!(env::current_dir().unwrap(), dir);

    // 相対パスのリダイレクトは新しいカレントディレクトリ基準で解決される
    assert_eq!(shell.run_line("pwd > where.txt"), 0);
    let printed = fs::read_to_string(dir.join("where.txt")).unwrap();
    assert_eq!(printed.trim(), dir.to_string_lossy());

    // 失敗しても移動しない
    assert_eq!(shell.run_line("cd /myshell/no/such/dir"), 1);
    assert_eq!(shell.run_line("cd"), 1);
    assert_eq!(env::current_dir().unwrap(), dir);

    env::set_current_dir(&original).unwrap();
    fs::remove_dir_all(&dir).unwrap();
}
