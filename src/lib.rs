//! myshell ライブラリ — ベンチマーク・テスト用にモジュールを公開する。
//!
//! バイナリ本体は `main.rs` のメインループ（対話入力またはスクリプトファイル）。
//! この `lib.rs` は `benches/bench_main.rs` や `tests/` から
//! パーサー・ビルトイン・子プロセス起動に直接アクセスするために存在する。
//!
//! ## モジュール構成
//!
//! | モジュール | 役割 |
//! |-----------|------|
//! | [`parser`] | トークナイザ、演算子の分類（`|`, `<`, `>`, `&`）、構造化コマンド |
//! | [`executor`] | ディスパッチ、単一コマンド起動、2 段パイプライン接続、foreground 待機 |
//! | [`spawn`] | 子プロセスビルダー（fork → fd 付け替え → execvp） |
//! | [`builtins`] | ビルトイン（`cd`, `exit`, `help`） |
//! | [`history`] | 固定容量リングバッファの入力履歴 |
//! | [`shell`] | シェルの状態と 1 行実行の入口 |
//! | [`config`] | コマンドライン引数とログ設定 |

pub mod builtins;
pub mod config;
pub mod executor;
pub mod history;
pub mod parser;
pub mod shell;
pub mod spawn;
