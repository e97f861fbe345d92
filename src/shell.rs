//! シェルの状態を保持するモジュール。
//!
//! 履歴（[`History`]）、トークン数上限、`exit` による終了要求を持つ。
//! 行ソース（対話入力 / スクリプトファイル）は 1 行ずつ [`Shell::run_line`] に渡す。
//! スクリプトファイルのバッチ実行は [`Shell::run_script`] / [`Shell::run_file`]。

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::Context;

use crate::config::Config;
use crate::executor;
use crate::history::History;
use crate::parser;

/// シェルの実行状態。メインループ全体で共有される。
#[derive(Debug)]
pub struct Shell {
    /// 入力行の履歴。実行前に記録する。
    pub history: History,
    /// 1 行あたりのトークン数上限。`None` なら無制限。
    pub max_args: Option<usize>,
    /// `exit` ビルトインで true にセットされ、メインループを終了させる。
    pub should_exit: bool,
}

impl Shell {
    pub fn new(config: &Config) -> Self {
        Self {
            history: History::with_capacity(config.history_size),
            max_args: config.max_args,
            should_exit: false,
        }
    }

    /// 1 行を記録・解析・実行し、終了ステータスを返す。
    ///
    /// エラーはすべてここまでで報告済みで、呼び出し側のループを止めることはない。
    /// 空白のみの行は何もせず 0 を返す。
    pub fn run_line(&mut self, line: &str) -> i32 {
        if line.trim().is_empty() {
            return 0;
        }
        self.history.record(line);

        let args = match parser::tokenize(line, self.max_args) {
            Ok(args) => args,
            Err(e) => {
                eprintln!("myshell: {}", e);
                return 2;
            }
        };
        executor::execute(self, &args)
    }

    /// 行ソースを終端まで 1 行ずつ実行する。空行はスキップし、`exit` で打ち切る。
    ///
    /// UTF-8 として不正なバイトは置換文字に変換して実行を続ける。
    /// 読み取り自体の失敗だけを `Err` で返す。
    pub fn run_script<R: BufRead>(&mut self, mut reader: R) -> io::Result<()> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            if buf.last() == Some(&b'\n') {
                buf.pop();
            }
            if buf.is_empty() {
                continue;
            }

            let line = String::from_utf8_lossy(&buf);
            self.run_line(&line);
            if self.should_exit {
                break;
            }
        }
        Ok(())
    }

    /// スクリプトファイルを開いて [`Shell::run_script`] で実行する。
    pub fn run_file(&mut self, path: &Path) -> anyhow::Result<()> {
        let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        self.run_script(BufReader::new(file))
            .with_context(|| format!("cannot read {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("myshell-shell-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn blank_line_is_noop() {
        let mut sh = Shell::new(&Config::default());
        assert_eq!(sh.run_line("   "), 0);
        assert!(sh.history.is_empty());
    }

    #[test]
    fn records_before_executing() {
        let mut sh = Shell::new(&Config::default());
        sh.run_line("help");
        sh.run_line("cd");
        assert_eq!(sh.history.iter().collect::<Vec<_>>(), vec!["help", "cd"]);
    }

    #[test]
    fn token_limit_abandons_command() {
        let config = Config {
            max_args: Some(2),
            ..Config::default()
        };
        let mut sh = Shell::new(&config);
        assert_eq!(sh.run_line("exit now please"), 2);
        assert!(!sh.should_exit);
        assert_eq!(sh.history.len(), 1);
    }

    #[test]
    fn exit_sets_flag() {
        let mut sh = Shell::new(&Config::default());
        assert_eq!(sh.run_line("exit"), 0);
        assert!(sh.should_exit);
    }

    // ── バッチ実行 ──

    #[test]
    fn script_skips_empty_lines() {
        let mut sh = Shell::new(&Config::default());
        sh.run_script(&b"\n\nhelp\n\n"[..]).unwrap();
        assert_eq!(sh.history.iter().collect::<Vec<_>>(), vec!["help"]);
    }

    #[test]
    fn script_stops_at_exit() {
        let dir = scratch_dir("exit");
        let before = dir.join("before.txt");
        let after = dir.join("after.txt");
        let script = format!(
            "echo one > {}\nexit\necho two > {}\n",
            before.display(),
            after.display()
        );

        let mut sh = Shell::new(&Config::default());
        sh.run_script(script.as_bytes()).unwrap();
        assert!(sh.should_exit);
        assert_eq!(fs::read_to_string(&before).unwrap(), "one\n");
        assert!(!after.exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn invalid_utf8_line_does_not_end_script() {
        let dir = scratch_dir("utf8");
        let bad = dir.join("bad.txt");
        let after = dir.join("after.txt");
        let mut script = b"echo ".to_vec();
        script.push(0xff);
        script.extend_from_slice(format!(" > {}\n", bad.display()).as_bytes());
        script.extend_from_slice(format!("echo two > {}\n", after.display()).as_bytes());

        let mut sh = Shell::new(&Config::default());
        sh.run_script(&script[..]).unwrap();
        assert_eq!(fs::read_to_string(&bad).unwrap(), "\u{FFFD}\n");
        assert_eq!(fs::read_to_string(&after).unwrap(), "two\n");
        assert_eq!(sh.history.len(), 2);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_script_file_is_an_error() {
        let dir = scratch_dir("missing");
        let mut sh = Shell::new(&Config::default());
        assert!(sh.run_file(&dir.join("nope.sh")).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn run_file_executes_script() {
        let dir = scratch_dir("file");
        let out = dir.join("out.txt");
        let script = dir.join("script.sh");
        fs::write(&script, format!("echo from-file > {}\n", out.display())).unwrap();

        let mut sh = Shell::new(&Config::default());
        sh.run_file(&script).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "from-file\n");
        fs::remove_dir_all(&dir).unwrap();
    }
}
