//! Subprocess execution bounded by a timeout
//!
//! The child is polled with `try_wait`; stdout and stderr are drained on
//! reader threads so a chatty tool cannot block on a full pipe. On expiry
//! the child is killed and reaped.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::{MediaError, MediaResult};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Captured result of a finished subprocess
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Render a command for logging
pub fn command_line(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn drain<R: Read + Send + 'static>(source: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    source.map(|mut reader| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Run `cmd` to completion or until `timeout` elapses
///
/// A non-zero exit is returned as output, not as an error; use
/// [`run_checked`] when failure should be an error.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> MediaResult<ToolOutput> {
    let tool = cmd.get_program().to_string_lossy().into_owned();

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| MediaError::ToolNotFound {
            tool: tool.clone(),
            reason: e.to_string(),
        })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = wait_with_timeout(&mut child, timeout)?;
    let stdout = collect(stdout);
    let stderr = collect(stderr);

    match status {
        Some(status) => Ok(ToolOutput {
            status,
            stdout,
            stderr,
        }),
        None => {
            log::error!("{} killed after {}s timeout", tool, timeout.as_secs());
            Err(MediaError::Timeout {
                tool,
                seconds: timeout.as_secs(),
            })
        }
    }
}

/// Run `cmd` and turn a non-zero exit into [`MediaError::ToolFailed`]
pub fn run_checked(cmd: &mut Command, timeout: Duration) -> MediaResult<ToolOutput> {
    let output = run_with_timeout(cmd, timeout)?;
    if output.status.success() {
        Ok(output)
    } else {
        let tool = cmd.get_program().to_string_lossy().into_owned();
        let stderr = output.stderr_lossy();
        log::error!("{} failed: {}", tool, stderr.trim());
        Err(MediaError::ToolFailed {
            tool,
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_rendering() {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-y", "-i", "in.wav"]);
        assert_eq!(command_line(&cmd), "ffmpeg -y -i in.wav");
    }

    #[test]
    fn test_missing_tool() {
        let mut cmd = Command::new("definitely-not-a-real-tool-4821");
        let result = run_with_timeout(&mut cmd, Duration::from_secs(1));
        assert!(matches!(result, Err(MediaError::ToolNotFound { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let start = Instant::now();
        let result = run_with_timeout(&mut cmd, Duration::from_millis(300));
        assert!(matches!(result, Err(MediaError::Timeout { .. })));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_output_and_failure() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo hello; echo oops >&2; exit 3"]);
        let output = run_with_timeout(&mut cmd, Duration::from_secs(5)).unwrap();
        assert_eq!(output.stdout_lossy().trim(), "hello");
        assert!(!output.status.success());

        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo oops >&2; exit 3"]);
        match run_checked(&mut cmd, Duration::from_secs(5)) {
            Err(MediaError::ToolFailed { stderr, .. }) => assert_eq!(stderr, "oops"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
