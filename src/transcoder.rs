//! TranscoderJob — wraps one transcoder subprocess (§4.3).
//!
//! Unlike the teacher's `Transcoder`, which parsed fMP4 atoms out of ffmpeg's
//! stdout, this job only writes HLS output to disk: stdout is discarded and
//! stderr is drained continuously into a bounded ring so a full pipe buffer
//! can never stall the transcoder (§9 "subprocess output draining").

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const STDERR_TAIL_CAP_BYTES: usize = 4 * 1024;

#[derive(Debug)]
pub enum TranscoderOutcome {
    Exited { success: bool, stderr_tail: String },
    Cancelled,
    TimedOut,
    SpawnFailed(String),
}

/// Spawns `binary argv[..]` with working directory `work_dir`, drains stderr,
/// and waits under a combined cancellation: either `cancel` fires or
/// `timeout` elapses, whichever comes first kills the process.
pub async fn run(
    binary: &str,
    argv: &[String],
    work_dir: &Path,
    cancel: CancellationToken,
    timeout: Duration,
) -> TranscoderOutcome {
    let mut child = match Command::new(binary)
        .args(argv)
        .current_dir(work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return TranscoderOutcome::SpawnFailed(e.to_string()),
    };

    let stderr = child.stderr.take().expect("stderr was piped");
    let tail = tokio::spawn(drain_stderr(stderr));

    tokio::select! {
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            tail.abort();
            TranscoderOutcome::Cancelled
        }
        _ = tokio::time::sleep(timeout) => {
            let _ = child.kill().await;
            tail.abort();
            TranscoderOutcome::TimedOut
        }
        status = child.wait() => {
            let stderr_tail = tail.await.unwrap_or_default();
            match status {
                Ok(status) => TranscoderOutcome::Exited { success: status.success(), stderr_tail },
                Err(e) => TranscoderOutcome::Exited { success: false, stderr_tail: e.to_string() },
            }
        }
    }
}

async fn drain_stderr(stderr: tokio::process::ChildStderr) -> String {
    let mut reader = BufReader::new(stderr);
    let mut ring: VecDeque<String> = VecDeque::new();
    let mut ring_bytes = 0usize;
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim_end().to_string();
                debug!(transcoder_stderr = %trimmed);
                ring_bytes += trimmed.len();
                ring.push_back(trimmed);
                while ring_bytes > STDERR_TAIL_CAP_BYTES {
                    if let Some(removed) = ring.pop_front() {
                        ring_bytes = ring_bytes.saturating_sub(removed.len());
                    } else {
                        break;
                    }
                }
            }
            Err(_) => break,
        }
    }

    ring.into_iter().collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let outcome = run(
            "definitely-not-a-real-binary-xyz",
            &[],
            tmp.path(),
            CancellationToken::new(),
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(outcome, TranscoderOutcome::SpawnFailed(_)));
    }

    #[tokio::test]
    async fn clean_exit_is_reported_success() {
        let tmp = tempfile::tempdir().unwrap();
        let outcome = run(
            "true",
            &[],
            tmp.path(),
            CancellationToken::new(),
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(outcome, TranscoderOutcome::Exited { success: true, .. }));
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let outcome = run(
            "false",
            &[],
            tmp.path(),
            CancellationToken::new(),
            Duration::from_secs(5),
        )
        .await;
        assert!(matches!(outcome, TranscoderOutcome::Exited { success: false, .. }));
    }

    #[tokio::test]
    async fn cancellation_stops_a_long_running_process() {
        let tmp = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_clone.cancel();
        });
        let outcome = run(
            "sleep",
            &["30".to_string()],
            tmp.path(),
            cancel,
            Duration::from_secs(30),
        )
        .await;
        assert!(matches!(outcome, TranscoderOutcome::Cancelled));
    }

    #[tokio::test]
    async fn timeout_stops_a_long_running_process() {
        let tmp = tempfile::tempdir().unwrap();
        let outcome = run(
            "sleep",
            &["30".to_string()],
            tmp.path(),
            CancellationToken::new(),
            Duration::from_millis(50),
        )
        .await;
        assert!(matches!(outcome, TranscoderOutcome::TimedOut));
    }
}
