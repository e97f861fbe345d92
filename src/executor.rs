//! コマンド実行: ビルトイン判定、単一コマンド起動、2 段パイプライン接続。
//!
//! - [`execute`]: 1 行分のトークン列を受け取るディスパッチャ
//!   - 先頭トークンがビルトイン → fork なしで [`builtins::try_exec`]
//!   - それ以外 → [`parser::parse_command`] で構造化し、単一なら [`launch`]、パイプなら [`run_pipeline`]
//! - foreground: 子の終了まで `waitpid` で待機
//! - background: PID を表示してハンドルを手放す（ジョブテーブルは持たない）
//!
//! fd の付け替えはすべて [`spawn::ChildSpec`] 経由で子プロセス内でのみ行う。

use std::io::{self, Write};
use std::os::fd::AsRawFd;

use crate::builtins;
use crate::parser::{self, Command, Stages};
use crate::shell::Shell;
use crate::spawn::{Child, ChildSpec, Pipe, SpawnError};

/// 外部コマンド起動の結果。
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// foreground で実行し終了した。終了ステータスを持つ。
    Exited(i32),
    /// background で起動した。PID を持つ。
    Background(libc::pid_t),
}

/// 1 行分のトークン列を実行し、終了ステータスを返す。
///
/// ディスパッチ順序:
/// 1. 空 → 何もしない
/// 2. 先頭がビルトイン → プロセス内で実行（`&` やパイプも含めてビルトインの引数として渡る）
/// 3. 末尾 `&` を除去 → パイプ有無で [`run_pipeline`] / [`launch`]
///
/// エラーはすべてここで stderr に報告し、呼び出し側には終了ステータスだけを返す。
pub fn execute(shell: &mut Shell, args: &[&str]) -> i32 {
    execute_to(shell, args, &mut io::stdout())
}

/// [`execute`] と同じだが、ビルトインの出力と background の PID 通知を `out` に書く。
pub fn execute_to(shell: &mut Shell, args: &[&str], out: &mut dyn Write) -> i32 {
    let Some(&name) = args.first() else {
        return 0;
    };

    if builtins::is_builtin(name) {
        return builtins::try_exec(shell, args, out).unwrap_or(0);
    }

    let line = match parser::parse_command(args) {
        Ok(line) => line,
        Err(e) => {
            eprintln!("myshell: {}", e);
            return 2;
        }
    };

    let result = match &line.stages {
        Stages::Single(cmd) => launch(cmd, line.background).map(|outcome| match outcome {
            Outcome::Exited(status) => status,
            Outcome::Background(pid) => {
                if let Err(e) = writeln!(out, "[Background process started with PID {}]", pid) {
                    tracing::warn!(pid, error = %e, "cannot write background notice");
                }
                0
            }
        }),
        Stages::Pipe(left, right) => {
            if line.background {
                tracing::warn!("`&` is not supported with a pipe; running in the foreground");
            }
            run_pipeline(left, right).map(|(_, right_status)| right_status)
        }
    };

    result.unwrap_or_else(|e| {
        eprintln!("myshell: {}", e);
        1
    })
}

/// 単一の外部コマンドを子プロセスとして起動する。
///
/// `background == false` なら終了まで待機し、`true` なら待たずに PID を返す。
/// fork 失敗は再試行せず `Err` を返す。
pub fn launch(cmd: &Command, background: bool) -> Result<Outcome, SpawnError> {
    let child = ChildSpec::new(cmd)?.spawn()?;

    if background {
        let pid = child.detach();
        tracing::debug!(pid, program = cmd.program(), "detached background child");
        return Ok(Outcome::Background(pid));
    }
    wait_child(child).map(Outcome::Exited)
}

/// 2 段パイプライン `left | right` を実行し、両側の終了ステータスを返す。
///
/// 処理の流れ:
/// 1. パイプを作成
/// 2. 左側を起動（stdout → write end、read end は close）
/// 3. 右側を起動（stdin ← read end、write end は close）
/// 4. 親側で両端を close（右側が EOF を受け取るために必須）
/// 5. 両方の終了を待機
///
/// 各段のリダイレクトはパイプ接続の後に子の中で適用されるため、明示的な `>` / `<` が優先される。
/// 片側の exec 失敗はもう片側を止めない。右側が先に終われば左側は書き込み時に
/// SIGPIPE で終了する（子では SIGPIPE を既定動作に戻してから exec する）。
pub fn run_pipeline(left: &Command, right: &Command) -> Result<(i32, i32), SpawnError> {
    let pipe = Pipe::new()?;
    let read_fd = pipe.read.as_raw_fd();
    let write_fd = pipe.write.as_raw_fd();

    let left_spec = ChildSpec::new(left)?.stdout(write_fd).close(read_fd);
    let right_spec = ChildSpec::new(right)?.stdin(read_fd).close(write_fd);

    let left_child = left_spec.spawn()?;
    let right_child = match right_spec.spawn() {
        Ok(child) => child,
        Err(e) => {
            drop(pipe);
            // 左側は読み手を失い SIGPIPE / EOF で終わる
            let _ = wait_child(left_child);
            return Err(e);
        }
    };

    // 親が write end を持ったままだと右側は EOF を受け取れない
    drop(pipe);
    tracing::debug!(
        left = left_child.id(),
        right = right_child.id(),
        "pipeline started"
    );

    let left_status = wait_child(left_child);
    let right_status = wait_child(right_child);
    Ok((left_status?, right_status?))
}

fn wait_child(child: Child) -> Result<i32, SpawnError> {
    child.wait().map_err(SpawnError::Wait)
}
