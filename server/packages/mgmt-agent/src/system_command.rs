//! Runs an operating-system command for the controller.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{oneshot, Mutex};

/// Executes `command` through the platform shell.
///
/// The child is killed once `watchdog_timeout` passes. The caller waits at
/// most `result_timeout` and gets whatever output was captured by then. A
/// spawn failure is reported as the output text.
pub async fn exec_system_command(
    command: &str,
    result_timeout: Duration,
    watchdog_timeout: Duration,
) -> String {
    let mut process = shell_command(command);
    process
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    // Own process group so the watchdog reaches grandchildren too.
    #[cfg(unix)]
    process.process_group(0);

    let mut child = match process.spawn() {
        Ok(child) => child,
        Err(err) => {
            tracing::warn!(command = %command, error = %err, "failed to spawn system command");
            return format!("failed to execute '{command}': {err}");
        }
    };
    let pid = child.id().unwrap_or(0);
    tracing::info!(pid = pid, command = %command, "system command started");

    let output = Arc::new(Mutex::new(String::new()));
    let stdout_task = child
        .stdout
        .take()
        .map(|stdout| tokio::spawn(pump(stdout, output.clone())));
    let stderr_task = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(pump(stderr, output.clone())));

    let (done_tx, done_rx) = oneshot::channel();
    tokio::spawn(async move {
        match tokio::time::timeout(watchdog_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(pid = pid, status = %status, "system command exited");
            }
            Ok(Err(err)) => {
                tracing::warn!(pid = pid, error = %err, "failed waiting for system command");
            }
            Err(_) => {
                tracing::warn!(
                    pid = pid,
                    timeout_ms = watchdog_timeout.as_millis() as u64,
                    "system command exceeded watchdog timeout; killing"
                );
                kill_process_group(pid);
                let _ = child.kill().await;
            }
        }
        for task in [stdout_task, stderr_task].into_iter().flatten() {
            let _ = task.await;
        }
        let _ = done_tx.send(());
    });

    if tokio::time::timeout(result_timeout, done_rx).await.is_err() {
        tracing::warn!(
            pid = pid,
            timeout_ms = result_timeout.as_millis() as u64,
            "timed out waiting for system command output"
        );
    }
    let captured = output.lock().await.clone();
    captured
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = i32::try_from(pid) else {
        return;
    };
    if pgid <= 0 {
        return;
    }
    // SAFETY: plain signal delivery to the group led by our own child.
    let result = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if result != 0 {
        tracing::debug!(pid = pid, error = %std::io::Error::last_os_error(), "process group kill failed");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut process = Command::new("cmd.exe");
        process.arg("/C").arg(command);
        process
    } else {
        let mut process = Command::new("sh");
        process.arg("-c").arg(command);
        process
    }
}

async fn pump<R>(reader: R, output: Arc<Mutex<String>>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let mut output = output.lock().await;
        output.push_str(&line);
        output.push('\n');
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_output() {
        let output = exec_system_command(
            "echo hello",
            Duration::from_secs(5),
            Duration::from_secs(10),
        )
        .await;
        assert_eq!(output, "hello\n");
    }

    #[tokio::test]
    async fn result_timeout_returns_partial_output() {
        let started = std::time::Instant::now();
        let output = exec_system_command(
            "echo early; sleep 5; echo late",
            Duration::from_millis(300),
            Duration::from_millis(600),
        )
        .await;
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(output, "early\n");
    }

    #[cfg(target_os = "linux")]
    fn running(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .is_some_and(|state| state != "Z"),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn watchdog_kills_background_children() {
        let output = exec_system_command(
            "sleep 30 & echo $!; wait",
            Duration::from_secs(5),
            Duration::from_millis(300),
        )
        .await;
        let pid: i32 = output.trim().parse().expect("background pid");

        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        while running(pid) && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!running(pid), "background child {pid} survived the watchdog");
    }
}
