//! 子プロセスビルダー: `fork()` + fd 付け替え + `execvp()` の安全な Rust ラッパー。
//!
//! 子プロセスの fd 配線を [`ChildSpec`] に宣言的に積み上げ、[`ChildSpec::spawn`] で
//! fork した子の中だけで一括適用してからプログラムイメージを置き換える。
//! 親（シェル）の fd テーブルは一切書き換えない。
//!
//! ## 構成
//!
//! | 型 | 役割 |
//! |-----|------|
//! | [`ChildSpec`] | argv・stdin/stdout の接続元・close 対象 fd・ファイルリダイレクトの宣言 |
//! | [`Child`] | 起動済み子プロセスのハンドル（`wait` で reap、`detach` で手放す） |
//! | [`Pipe`] | `pipe2(2)` の両端を [`OwnedFd`] で保持する RAII ラッパー |
//! | [`CStringVec`] | argv 用の NULL 終端ポインタ配列 |
//!
//! ## 子プロセス側の適用順序
//!
//! 1. SIGPIPE を既定動作に戻す
//! 2. stdin/stdout の接続元 fd を `dup2` し、元の fd を close
//! 3. 明示された close 対象 fd（パイプの未使用端など）を close（付け替え先の 0/1 は除く）
//! 4. ファイルリダイレクトを出現順に open → `dup2` → close（パイプより後なので明示リダイレクトが勝つ）
//! 5. `execvp`
//!
//! fork 後の子では、事前に確保した `CString` と libc 呼び出しだけを使う。
//! 失敗時は子自身が stderr に報告して `_exit(1)` し、シェルのロジックには戻らない。

use std::ffi::CString;
use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use thiserror::Error;

use crate::parser::{Command, RedirectKind};

/// 子プロセスが起動に失敗したとき（リダイレクト open 失敗、exec 失敗）の終了ステータス。
pub const CHILD_FAILURE_STATUS: i32 = 1;

// ── エラー型 ──────────────────────────────────────────────────────

/// 親プロセス側で検出される起動失敗。
#[derive(Debug, Error)]
pub enum SpawnError {
    /// `pipe2(2)` の失敗（fd 枯渇など）。
    #[error("pipe: {0}")]
    Pipe(io::Error),
    /// `fork(2)` の失敗（プロセス数上限など）。
    #[error("fork: {0}")]
    Fork(io::Error),
    /// `waitpid(2)` の失敗。
    #[error("wait: {0}")]
    Wait(io::Error),
    /// 引数に NUL バイトが含まれ、C 文字列に変換できない。
    #[error("{0}: argument contains a NUL byte")]
    NulByte(String),
}

// ── Pipe ──────────────────────────────────────────────────────────

/// 匿名パイプ。両端とも close-on-exec 付きで作成し、Drop で close する。
#[derive(Debug)]
pub struct Pipe {
    pub read: OwnedFd,
    pub write: OwnedFd,
}

impl Pipe {
    pub fn new() -> Result<Self, SpawnError> {
        let mut fds = [-1i32; 2];
        // close-on-exec は作成と同時に付ける（他スレッドの fork に両端が漏れないように）
        if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } != 0 {
            return Err(SpawnError::Pipe(io::Error::last_os_error()));
        }
        unsafe {
            Ok(Pipe {
                read: OwnedFd::from_raw_fd(fds[0]),
                write: OwnedFd::from_raw_fd(fds[1]),
            })
        }
    }
}

fn last_errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

// ── CStringVec ────────────────────────────────────────────────────

/// argv 用の CString ベクタ。NULL 終端のポインタ配列を構築する。
struct CStringVec {
    _strings: Vec<CString>,
    ptrs: Vec<*const libc::c_char>,
}

impl CStringVec {
    fn from_args(args: &[String]) -> Result<Self, SpawnError> {
        let strings = args
            .iter()
            .map(|s| CString::new(s.as_str()).map_err(|_| SpawnError::NulByte(s.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        let mut ptrs: Vec<*const libc::c_char> = strings.iter().map(|s| s.as_ptr()).collect();
        ptrs.push(std::ptr::null()); // NULL 終端
        Ok(Self {
            _strings: strings,
            ptrs,
        })
    }

    fn program(&self) -> *const libc::c_char {
        self.ptrs[0]
    }

    fn as_ptr(&self) -> *const *const libc::c_char {
        self.ptrs.as_ptr()
    }
}

/// 子プロセス内で開くリダイレクト。パスは fork 前に C 文字列化しておく。
struct FileRedirect {
    kind: RedirectKind,
    path: CString,
    display: String,
}

impl FileRedirect {
    fn open_flags(&self) -> libc::c_int {
        match self.kind {
            RedirectKind::Input => libc::O_RDONLY | libc::O_CLOEXEC,
            RedirectKind::Output => libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC | libc::O_CLOEXEC,
        }
    }
}

// ── ChildSpec ─────────────────────────────────────────────────────

/// 子プロセスの起動内容。fd 操作は宣言のみで、実際の適用は fork 後の子で行う。
pub struct ChildSpec {
    program: String,
    argv: CStringVec,
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
    close: Vec<RawFd>,
    redirects: Vec<FileRedirect>,
}

impl ChildSpec {
    /// パース済みコマンドから構築する。argv とリダイレクト先はこの時点で C 文字列に変換する。
    pub fn new(cmd: &Command) -> Result<Self, SpawnError> {
        let argv = CStringVec::from_args(&cmd.args)?;
        let redirects = cmd
            .redirects
            .iter()
            .map(|r| {
                Ok(FileRedirect {
                    kind: r.kind,
                    path: CString::new(r.target.as_str())
                        .map_err(|_| SpawnError::NulByte(r.target.clone()))?,
                    display: r.target.clone(),
                })
            })
            .collect::<Result<Vec<_>, SpawnError>>()?;

        Ok(Self {
            program: cmd.program().to_string(),
            argv,
            stdin: None,
            stdout: None,
            close: Vec::new(),
            redirects,
        })
    }

    /// stdin の接続元 fd を指定する（パイプの read end など）。
    pub fn stdin(mut self, fd: RawFd) -> Self {
        self.stdin = Some(fd);
        self
    }

    /// stdout の接続先 fd を指定する（パイプの write end など）。
    pub fn stdout(mut self, fd: RawFd) -> Self {
        self.stdout = Some(fd);
        self
    }

    /// 子プロセスで close する fd を追加する。
    pub fn close(mut self, fd: RawFd) -> Self {
        self.close.push(fd);
        self
    }

    /// fork して子プロセスを起動する。成功時は子のハンドルを返す。
    ///
    /// 返るのは fork の成否のみ。リダイレクトや exec の失敗は子の中で報告され、
    /// 子は [`CHILD_FAILURE_STATUS`] で終了する。
    pub fn spawn(&self) -> Result<Child, SpawnError> {
        let pid = unsafe { libc::fork() };
        if pid < 0 {
            return Err(SpawnError::Fork(io::Error::last_os_error()));
        }
        if pid == 0 {
            self.exec_in_child();
        }

        tracing::debug!(pid, program = %self.program, "spawned child");
        Ok(Child { pid })
    }

    /// fork 後の子プロセスで fd を配線し、プログラムイメージを置き換える。戻らない。
    fn exec_in_child(&self) -> ! {
        // Rust ランタイムは SIGPIPE を無視に設定しており、この設定は exec 後も引き継がれる
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }

        let bindings = [
            (self.stdin, libc::STDIN_FILENO),
            (self.stdout, libc::STDOUT_FILENO),
        ];
        for (src, target) in bindings {
            if let Some(src) = src {
                if let Err(errno) = bind_fd(src, target) {
                    child_fail("dup2", errno);
                }
            }
        }
        for &fd in &self.close {
            // 付け替え済みの stdin/stdout と同じ番号なら閉じない
            if bindings.iter().any(|&(src, target)| src.is_some() && target == fd) {
                continue;
            }
            unsafe {
                libc::close(fd);
            }
        }

        for r in &self.redirects {
            let fd = unsafe { libc::open(r.path.as_ptr(), r.open_flags(), 0o644 as libc::c_uint) };
            if fd < 0 {
                child_fail(&r.display, last_errno());
            }
            if let Err(errno) = bind_fd(fd, r.kind.target_fd()) {
                child_fail(&r.display, errno);
            }
        }

        unsafe {
            libc::execvp(self.argv.program(), self.argv.as_ptr());
        }
        match last_errno() {
            libc::ENOENT => child_fail_msg(&self.program, b"command not found"),
            errno => child_fail(&self.program, errno),
        }
    }
}

/// `src` を `target` に複製し、`src` を close する。`src == target` なら close-on-exec を外すだけ。
///
/// fork 後の子から呼ぶため、失敗は errno のまま返す。
fn bind_fd(src: RawFd, target: RawFd) -> Result<(), i32> {
    unsafe {
        if src == target {
            let flags = libc::fcntl(src, libc::F_GETFD);
            if flags < 0 || libc::fcntl(src, libc::F_SETFD, flags & !libc::FD_CLOEXEC) < 0 {
                return Err(last_errno());
            }
            return Ok(());
        }
        if libc::dup2(src, target) < 0 {
            return Err(last_errno());
        }
        libc::close(src);
    }
    Ok(())
}

/// errno を `strerror_r` でスタック上のバッファに展開して報告する。
fn child_fail(context: &str, errno: i32) -> ! {
    let mut buf = [0u8; 128];
    let ret = unsafe { libc::strerror_r(errno, buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    let msg = if ret == 0 {
        let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        &buf[..len]
    } else {
        &b"unknown error"[..]
    };
    child_fail_msg(context, msg)
}

/// 子プロセスからエラーを報告して即座に終了する。
///
/// fork 後はヒープ確保も `std::io::stderr()` のロックも使わず、各部分を fd 2 へ直接 `write(2)` する。
/// atexit ハンドラも走らせない。
fn child_fail_msg(context: &str, msg: &[u8]) -> ! {
    let parts: [&[u8]; 5] = [b"myshell: ", context.as_bytes(), b": ", msg, b"\n"];
    for part in parts {
        unsafe {
            libc::write(
                libc::STDERR_FILENO,
                part.as_ptr() as *const libc::c_void,
                part.len(),
            );
        }
    }
    unsafe { libc::_exit(CHILD_FAILURE_STATUS) }
}

// ── Child ─────────────────────────────────────────────────────────

/// 起動済みの子プロセス。[`Child::wait`] で reap するか [`Child::detach`] で手放す。
#[derive(Debug)]
#[must_use = "a child that is neither waited on nor detached is left as a zombie"]
pub struct Child {
    pid: libc::pid_t,
}

impl Child {
    /// プロセス ID。
    pub fn id(&self) -> libc::pid_t {
        self.pid
    }

    /// 子プロセスの終了までブロックし、終了ステータスを返す。
    ///
    /// 正常終了なら終了コード、シグナル終了なら 128 + シグナル番号。
    pub fn wait(self) -> io::Result<i32> {
        let mut raw_status: i32 = 0;
        loop {
            let ret = unsafe { libc::waitpid(self.pid, &mut raw_status, 0) };
            if ret == self.pid {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }

        let status = if libc::WIFEXITED(raw_status) {
            libc::WEXITSTATUS(raw_status)
        } else if libc::WIFSIGNALED(raw_status) {
            128 + libc::WTERMSIG(raw_status)
        } else {
            1
        };
        tracing::trace!(pid = self.pid, status, "reaped child");
        Ok(status)
    }

    /// 待機せずにハンドルを手放し、PID を返す。以後シェルはこのプロセスを追跡しない。
    pub fn detach(self) -> libc::pid_t {
        self.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{extract_redirects, Redirect};
    use std::fs;
    use std::io::{Read, Write};
    use std::os::fd::AsRawFd;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("myshell-spawn-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn command(args: &[&str]) -> Command {
        extract_redirects(args).unwrap()
    }

    #[test]
    fn spawn_and_wait_status() {
        let ok = ChildSpec::new(&command(&["true"])).unwrap().spawn().unwrap();
        assert_eq!(ok.wait().unwrap(), 0);

        let fail = ChildSpec::new(&command(&["false"])).unwrap().spawn().unwrap();
        assert_eq!(fail.wait().unwrap(), 1);
    }

    #[test]
    fn exec_failure_exits_with_failure_status() {
        let child = ChildSpec::new(&command(&["myshell-no-such-command-xyz"]))
            .unwrap()
            .spawn()
            .unwrap();
        assert_eq!(child.wait().unwrap(), CHILD_FAILURE_STATUS);
    }

    #[test]
    fn output_redirect_in_child_only() {
        let dir = scratch_dir("out");
        let out = dir.join("out.txt");
        let mut cmd = command(&["echo", "hello"]);
        cmd.redirects.push(Redirect {
            kind: RedirectKind::Output,
            target: out.to_string_lossy().into_owned(),
        });
        let child = ChildSpec::new(&cmd).unwrap().spawn().unwrap();
        assert_eq!(child.wait().unwrap(), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "hello\n");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unopenable_redirect_aborts_child() {
        let dir = scratch_dir("bad");
        let out = dir.join("missing-dir").join("out.txt");
        let mut cmd = command(&["echo", "hello"]);
        cmd.redirects.push(Redirect {
            kind: RedirectKind::Output,
            target: out.to_string_lossy().into_owned(),
        });
        let child = ChildSpec::new(&cmd).unwrap().spawn().unwrap();
        assert_eq!(child.wait().unwrap(), CHILD_FAILURE_STATUS);
        assert!(!out.exists());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn stdout_binding_to_pipe() {
        let pipe = Pipe::new().unwrap();
        let child = ChildSpec::new(&command(&["echo", "piped"]))
            .unwrap()
            .stdout(pipe.write.as_raw_fd())
            .close(pipe.read.as_raw_fd())
            .spawn()
            .unwrap();

        let Pipe { read, write } = pipe;
        drop(write);
        let mut output = String::new();
        fs::File::from(read).read_to_string(&mut output).unwrap();
        assert_eq!(child.wait().unwrap(), 0);
        assert_eq!(output, "piped\n");
    }

    #[test]
    fn close_list_never_closes_bound_stdout() {
        let pipe = Pipe::new().unwrap();
        let child = ChildSpec::new(&command(&["echo", "kept"]))
            .unwrap()
            .stdout(pipe.write.as_raw_fd())
            .close(pipe.read.as_raw_fd())
            .close(libc::STDOUT_FILENO)
            .spawn()
            .unwrap();

        let Pipe { read, write } = pipe;
        drop(write);
        let mut output = String::new();
        fs::File::from(read).read_to_string(&mut output).unwrap();
        assert_eq!(child.wait().unwrap(), 0);
        assert_eq!(output, "kept\n");
    }

    #[test]
    fn pipe_ends_are_close_on_exec() {
        let pipe = Pipe::new().unwrap();
        for fd in [pipe.read.as_raw_fd(), pipe.write.as_raw_fd()] {
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
            assert_ne!(flags & libc::FD_CLOEXEC, 0);
        }
    }

    #[test]
    fn stdin_binding_from_pipe() {
        let dir = scratch_dir("stdin");
        let out = dir.join("count.txt");
        let pipe = Pipe::new().unwrap();
        let mut cmd = command(&["wc", "-l"]);
        cmd.redirects.push(Redirect {
            kind: RedirectKind::Output,
            target: out.to_string_lossy().into_owned(),
        });
        let child = ChildSpec::new(&cmd)
            .unwrap()
            .stdin(pipe.read.as_raw_fd())
            .close(pipe.write.as_raw_fd())
            .spawn()
            .unwrap();

        let Pipe { read, write } = pipe;
        drop(read);
        let mut writer = fs::File::from(write);
        writer.write_all(b"a\nb\n").unwrap();
        drop(writer);
        assert_eq!(child.wait().unwrap(), 0);
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "2");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn nul_byte_is_rejected_before_fork() {
        let cmd = Command {
            args: vec!["echo".into(), "a\0b".into()],
            redirects: Vec::new(),
        };
        assert!(matches!(ChildSpec::new(&cmd), Err(SpawnError::NulByte(_))));
    }
}
