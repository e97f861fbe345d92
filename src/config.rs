//! 起動オプション。
//!
//! コマンドライン引数を [`argh`] で解析する。ログのフィルタは環境変数 [`LOG_ENV`] で上書きできる。

use std::path::PathBuf;

use argh::FromArgs;

use crate::history;

/// ログフィルタ（`tracing_subscriber::EnvFilter` 構文）を指定する環境変数。
pub const LOG_ENV: &str = "MYSHELL_LOG";

#[derive(FromArgs, Debug, Clone, PartialEq)]
/// A small command shell with two-stage pipes, file redirection and background commands.
pub struct Config {
    /// script file to run line by line instead of reading from the terminal
    #[argh(positional)]
    pub script: Option<PathBuf>,

    /// number of input lines kept in the in-memory history
    #[argh(option, default = "history::DEFAULT_CAPACITY")]
    pub history_size: usize,

    /// maximum number of tokens accepted on one line (unbounded when omitted)
    #[argh(option)]
    pub max_args: Option<usize>,

    /// log spawn/wait activity to stderr
    #[argh(switch, short = 'v')]
    pub verbose: bool,
}

impl Config {
    /// プロセスの引数から読み込む。不正な引数なら使い方を表示して終了する。
    pub fn from_env() -> Self {
        argh::from_env()
    }

    /// [`LOG_ENV`] が未設定のときに使うフィルタ。
    pub fn default_log_directive(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "warn"
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            script: None,
            history_size: history::DEFAULT_CAPACITY,
            max_args: None,
            verbose: false,
        }
    }
}
