//! myshell — fork/exec ベースの小さなコマンドシェル
//!
//! メインループ: 行ソースから 1 行読み取り → [`Shell::run_line`] で記録・解析・実行 → ループ
//!
//! - 引数なし: rustyline の行エディタで対話入力（↑↓ で同一セッション内の履歴を呼び出せる）
//! - 引数にスクリプトファイル: ファイルを 1 行ずつ実行するバッチモード
//!
//! `exit` ビルトインまたは入力の終端（EOF / Ctrl+D）でステータス 0 で終了する。

use std::io;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use myshell::config::{Config, LOG_ENV};
use myshell::shell::Shell;

const PROMPT: &str = "myshell> ";

/// `MYSHELL_LOG` があればそれを、なければ `--verbose` に応じたレベルでログを stderr に出す。
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(config.default_log_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

/// 行エディタで対話入力を読み、1 行ずつ実行する。
fn run_interactive(shell: &mut Shell) -> Result<()> {
    let mut editor = DefaultEditor::new().context("cannot initialize line editor")?;

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    if let Err(e) = editor.add_history_entry(line.as_str()) {
                        tracing::warn!(error = %e, "cannot add line to editor history");
                    }
                }
                shell.run_line(&line);
                if shell.should_exit {
                    break;
                }
            }
            // Ctrl+C: 入力中の行を破棄してプロンプトを出し直す
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            // UTF-8 として読めない行は捨てて次の入力へ
            Err(ReadlineError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
                eprintln!("myshell: {}", e);
                continue;
            }
            Err(e) => return Err(e).context("cannot read input"),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let config = Config::from_env();
    init_logging(&config);
    tracing::debug!(?config, "starting");

    let mut shell = Shell::new(&config);
    match &config.script {
        Some(path) => shell.run_file(path),
        None => run_interactive(&mut shell),
    }
}
