//! Backend Supervisor.
//!
//! Spawns a backend inference subprocess, polls it until its health endpoint
//! responds, and tears it down on request — SIGTERM first, SIGKILL if it
//! hasn't exited within the configured grace period. Grounded on the
//! spawn/poll/SIGTERM-then-SIGKILL shape of `ManagedModel`/`ModelManager` in
//! the retrieved `model_manager.rs` example.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::Instant;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to spawn backend process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("backend process exited before becoming ready (code {code:?})")]
    ExitedDuringStartup { code: Option<i32> },
    #[error("backend did not become ready within {0:?}")]
    StartupTimeout(Duration),
    #[error("backend did not stop within {0:?}")]
    StopTimeout(Duration),
}

/// A running backend subprocess and the port it was told to listen on.
pub struct BackendHandle {
    pub port: u16,
    child: Child,
}

impl BackendHandle {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Structured invocation parameters forwarded to every backend on top of its
/// declared `args` (which carries the model path and anything else the
/// operator wants passed through verbatim).
pub struct SpawnParams<'a> {
    pub backend_path: &'a str,
    pub args: &'a [String],
    pub port: u16,
    pub tensor_parallel_degree: u32,
    pub max_sequence_length: u32,
    pub memory_utilization: f64,
    pub model_id: &'a str,
}

/// Spawn `backend_path args... --port <port> --tensor-parallel-size <n>
/// --max-model-len <n> --gpu-memory-utilization <f>`, capturing stdout/stderr
/// into `tracing` line by line. `kill_on_drop` ensures a dropped handle whose
/// `stop()` was never called doesn't leak an orphan process.
pub fn spawn(params: SpawnParams<'_>) -> Result<BackendHandle, BackendError> {
    let SpawnParams {
        backend_path,
        args,
        port,
        tensor_parallel_degree,
        max_sequence_length,
        memory_utilization,
        model_id,
    } = params;

    let mut command = Command::new(backend_path);
    command
        .args(args)
        .arg("--port")
        .arg(port.to_string())
        .arg("--tensor-parallel-size")
        .arg(tensor_parallel_degree.to_string())
        .arg("--max-model-len")
        .arg(max_sequence_length.to_string())
        .arg("--gpu-memory-utilization")
        .arg(memory_utilization.to_string())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(BackendError::Spawn)?;

    if let Some(stdout) = child.stdout.take() {
        let model_id = model_id.to_string();
        tokio::spawn(forward_lines(stdout, model_id, false));
    }
    if let Some(stderr) = child.stderr.take() {
        let model_id = model_id.to_string();
        tokio::spawn(forward_lines(stderr, model_id, true));
    }

    Ok(BackendHandle { port, child })
}

async fn forward_lines(
    stream: impl tokio::io::AsyncRead + Unpin,
    model_id: String,
    is_stderr: bool,
) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_stderr {
            tracing::warn!(model = %model_id, backend_stderr = %line);
        } else {
            tracing::debug!(model = %model_id, backend_stdout = %line);
        }
    }
}

/// Cap on the backoff between readiness polls regardless of how long
/// `timeout` is — a 5-minute `start_timeout_seconds` shouldn't mean a 5-minute
/// gap between the last two poll attempts.
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Poll `http://127.0.0.1:<port>/health` until it returns 2xx, the process
/// exits, or `timeout` elapses. The wait between polls doubles after every
/// failed attempt, starting from `poll_interval` and capped at
/// `MAX_POLL_INTERVAL`, so a slow-starting backend isn't hammered with
/// requests for the full startup window.
pub async fn wait_ready(
    handle: &mut BackendHandle,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<(), BackendError> {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", handle.port);
    let deadline = Instant::now() + timeout;
    let mut backoff = poll_interval;

    loop {
        if let Some(status) = handle.child.try_wait().map_err(BackendError::Spawn)? {
            return Err(BackendError::ExitedDuringStartup {
                code: status.code(),
            });
        }

        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return Ok(());
            }
        }

        if Instant::now() >= deadline {
            return Err(BackendError::StartupTimeout(timeout));
        }
        tokio::time::sleep(backoff.min(MAX_POLL_INTERVAL)).await;
        backoff = (backoff * 2).min(MAX_POLL_INTERVAL);
    }
}

/// SIGTERM, then poll for exit, then SIGKILL if it didn't listen.
pub async fn stop(handle: &mut BackendHandle, timeout: Duration) -> Result<(), BackendError> {
    if let Some(pid) = handle.child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
    } else {
        return Ok(()); // already reaped
    }

    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(Some(_)) = handle.child.try_wait() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    handle
        .child
        .start_kill()
        .map_err(BackendError::Spawn)?;
    handle
        .child
        .wait()
        .await
        .map_err(BackendError::Spawn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sleep_params<'a>(args: &'a [String]) -> SpawnParams<'a> {
        SpawnParams {
            backend_path: "/bin/sh",
            args,
            port: 0,
            tensor_parallel_degree: 1,
            max_sequence_length: 1024,
            memory_utilization: 0.9,
            model_id: "test-model",
        }
    }

    #[tokio::test]
    async fn spawn_and_stop_a_real_sleep_process() {
        // Extra flags get appended by `spawn`; `sh -c` ignores positional
        // args it never references, so the script still just sleeps
        // regardless of what's tacked on after it.
        let args = vec!["-c".to_string(), "sleep 30".to_string()];
        let mut handle = spawn(sleep_params(&args)).unwrap();
        assert!(handle.pid().is_some());
        stop(&mut handle, Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn spawn_of_missing_binary_errors() {
        let mut params = sleep_params(&[]);
        params.backend_path = "/nonexistent/binary-xyz";
        let result = spawn(params);
        assert!(matches!(result, Err(BackendError::Spawn(_))));
    }
}
