//! ビルトインコマンドの実装。
//!
//! ビルトインは fork を経由せずシェルのプロセス内で直接実行される。
//! `try_exec()` が `Some(status)` を返せばビルトインとして処理済み、
//! `None` なら外部コマンドとして executor に委ねる。
//! 判定は先頭トークンの完全一致（大文字小文字を区別）のみ。

use std::env;
use std::io::{self, Write};
use std::path::Path;

use thiserror::Error;

use crate::shell::Shell;

/// ビルトイン名の一覧。
pub const BUILTINS: &[&str] = &["cd", "exit", "help"];

const HELP_TEXT: &str = "\
Built-in commands:
  cd <dir>    - Change directory
  exit        - Exit the shell
  help        - Display this help
External commands are executed using fork and execvp.
Supports piping (|), redirection (>, <), and background (&).
";

/// ビルトイン実行時のエラー。いずれもシェルは継続する。
#[derive(Debug, Error)]
pub enum BuiltinError {
    #[error("cd: expected argument")]
    CdMissingArgument,
    #[error("cd: too many arguments")]
    CdTooManyArguments,
    #[error("cd: {path}: {source}")]
    Cd { path: String, source: io::Error },
    #[error("help: {0}")]
    Output(#[from] io::Error),
}

/// `name` がビルトインか判定する。
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// ビルトインコマンドの実行を試みる。
///
/// 戻り値:
/// - `Some(status)` — ビルトインとして実行済み（エラーは stderr に報告済み）
/// - `None` — 該当するビルトインなし（外部コマンドとして実行すべき）
pub fn try_exec(shell: &mut Shell, args: &[&str], out: &mut dyn Write) -> Option<i32> {
    let result = match *args.first()? {
        "cd" => builtin_cd(args),
        "exit" => {
            builtin_exit(shell);
            Ok(())
        }
        "help" => builtin_help(out),
        _ => return None,
    };

    tracing::debug!(builtin = args[0], ok = result.is_ok(), "ran builtin");
    match result {
        Ok(()) => Some(0),
        Err(e) => {
            eprintln!("myshell: {}", e);
            Some(1)
        }
    }
}

/// `exit` — シェルに終了を要求する。引数は無視し、常にステータス 0 で終了する。
fn builtin_exit(shell: &mut Shell) {
    shell.should_exit = true;
}

/// `cd <dir>` — シェル自身のカレントディレクトリを変更する。引数はちょうど 1 個。
fn builtin_cd(args: &[&str]) -> Result<(), BuiltinError> {
    let target = match args {
        [_] => return Err(BuiltinError::CdMissingArgument),
        [_, target] => *target,
        _ => return Err(BuiltinError::CdTooManyArguments),
    };

    env::set_current_dir(Path::new(target)).map_err(|source| BuiltinError::Cd {
        path: target.to_string(),
        source,
    })
}

/// `help` — 固定の使い方テキストを出力する。
fn builtin_help(out: &mut dyn Write) -> Result<(), BuiltinError> {
    out.write_all(HELP_TEXT.as_bytes())?;
    out.flush()?;
    Ok(())
}
