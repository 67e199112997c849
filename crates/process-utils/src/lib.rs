//! Small process-related helpers for the capture subprocesses.
//!
//! - [`tokio_command`] builds a child command that never pops up a console
//!   window on Windows.
//! - [`terminate_child`] asks a child to quit and force-kills it when it does
//!   not exit within a grace period.

use std::ffi::OsStr;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd
}

/// How a child process ended after [`terminate_child`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The child exited on its own within the grace period.
    Exited(Option<i32>),
    /// The grace period elapsed and the child was killed.
    Killed(Option<i32>),
}

impl Termination {
    /// Exit code reported by the OS, if any (killed processes usually have none).
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Exited(code) | Self::Killed(code) => *code,
        }
    }
}

/// Ask `child` to quit and wait at most `grace` before killing it.
///
/// When `stdin` is given, `quit_input` is written to it and the pipe is
/// closed; ffmpeg treats `q` on stdin as a request to finalize its output and
/// exit. Children without a quit protocol simply get killed after `grace`.
///
/// The caller is never blocked longer than `grace` plus the time the OS
/// needs to reap a killed process.
#[cfg(feature = "tokio")]
pub async fn terminate_child(
    child: &mut tokio::process::Child,
    stdin: Option<tokio::process::ChildStdin>,
    quit_input: &[u8],
    grace: std::time::Duration,
) -> Termination {
    use tokio::io::AsyncWriteExt;
    use tracing::{debug, warn};

    if let Ok(Some(status)) = child.try_wait() {
        return Termination::Exited(status.code());
    }

    if let Some(mut stdin) = stdin {
        if !quit_input.is_empty() {
            // The child may already be gone; a broken pipe here is expected.
            if let Err(e) = stdin.write_all(quit_input).await {
                debug!(error = %e, "Failed to write quit request to child stdin");
            }
            let _ = stdin.flush().await;
        }
        drop(stdin);
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => Termination::Exited(status.code()),
        Ok(Err(e)) => {
            warn!(error = %e, "Error waiting for child process; killing it");
            kill_and_reap(child).await
        }
        Err(_) => {
            warn!(grace_ms = grace.as_millis() as u64, "Child did not exit in time; killing it");
            kill_and_reap(child).await
        }
    }
}

#[cfg(feature = "tokio")]
async fn kill_and_reap(child: &mut tokio::process::Child) -> Termination {
    // `kill` sends the signal and waits for the process to be reaped.
    if let Err(e) = child.kill().await {
        tracing::error!(error = %e, "Failed to kill child process");
    }
    let code = child.try_wait().ok().flatten().and_then(|status| status.code());
    Termination::Killed(code)
}

#[cfg(all(test, unix, feature = "tokio"))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn kills_child_that_ignores_quit_request() {
        let mut child = tokio_command("sleep")
            .arg("30")
            .stdin(Stdio::piped())
            .spawn()
            .unwrap();
        let stdin = child.stdin.take();

        let started = Instant::now();
        let outcome = terminate_child(&mut child, stdin, b"q", Duration::from_millis(200)).await;

        assert!(matches!(outcome, Termination::Killed(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(child.try_wait().unwrap().is_some());
    }

    #[tokio::test]
    async fn reports_exit_when_child_quits_on_stdin_close() {
        // `cat` exits as soon as its stdin is closed.
        let mut child = tokio_command("cat")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        let stdin = child.stdin.take();

        let outcome = terminate_child(&mut child, stdin, b"q", Duration::from_secs(5)).await;

        assert_eq!(outcome, Termination::Exited(Some(0)));
    }

    #[tokio::test]
    async fn already_exited_child_is_reported_without_waiting() {
        let mut child = tokio_command("true").spawn().unwrap();
        child.wait().await.unwrap();

        let outcome = terminate_child(&mut child, None, b"", Duration::from_secs(5)).await;
        assert_eq!(outcome.code(), Some(0));
    }
}
