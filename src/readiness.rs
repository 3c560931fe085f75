//! ReadinessProbe — decides when a playlist is "ready enough" to serve (§4.2).

use std::path::Path;
use std::time::Duration;

use crate::config::ReadinessConfig;
use crate::error::StreamerError;
use crate::model::playlist_path;
use crate::playlist;
use crate::registry::{JobHandle, JobStatus};

pub const POLL_INTERVAL: Duration = Duration::from_millis(200);
pub const OVERALL_TIMEOUT: Duration = Duration::from_secs(30);
pub const MIN_SEGMENTS: usize = 2;
pub const FALLBACK_AFTER: Duration = Duration::from_secs(2);

/// Runtime-tunable mirror of the `readiness.*` config keys (§6); the module
/// constants above remain the spec-mandated defaults `ReadinessParams`
/// falls back to.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessParams {
    pub poll_interval: Duration,
    pub overall_timeout: Duration,
    pub min_segments: usize,
    pub fallback_after: Duration,
}

impl Default for ReadinessParams {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            overall_timeout: OVERALL_TIMEOUT,
            min_segments: MIN_SEGMENTS,
            fallback_after: FALLBACK_AFTER,
        }
    }
}

impl From<&ReadinessConfig> for ReadinessParams {
    fn from(cfg: &ReadinessConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(cfg.poll_ms),
            overall_timeout: Duration::from_millis(cfg.timeout_ms),
            min_segments: cfg.min_segments,
            fallback_after: Duration::from_millis(cfg.fallback_ms),
        }
    }
}

/// Polls `work_dir`'s playlist until it looks ready to stream, the job dies,
/// or the overall timeout expires.
///
/// "Ready" means either `params.min_segments` segments are referenced, or at
/// least one segment is referenced and `params.fallback_after` has elapsed
/// since the probe started — this keeps first-byte latency bounded on slow
/// encodes without waiting the full window when the encoder is merely a
/// little behind.
pub async fn wait_until_ready(
    work_dir: &Path,
    job: &JobHandle,
    params: &ReadinessParams,
) -> Result<String, StreamerError> {
    let started = std::time::Instant::now();

    loop {
        if let Some(text) = try_read_ready_playlist(work_dir, started, params).await? {
            return Ok(text);
        }

        if !job.is_running() {
            if job.status() == JobStatus::SpawnFailed {
                return Err(StreamerError::TranscoderUnavailable(job.item_id.clone()));
            }
            if job.status() == JobStatus::Completed {
                // The job finished before we ever saw min_segments or the
                // fallback window elapse (a short track). Any complete,
                // well-formed playlist is good enough once nothing more is
                // coming.
                if let Some(text) = read_finished_playlist(work_dir).await? {
                    return Ok(text);
                }
            }
            return Err(StreamerError::TranscoderExitedWithoutOutput);
        }

        if started.elapsed() > params.overall_timeout {
            return Err(StreamerError::ReadinessTimeout);
        }

        tokio::time::sleep(params.poll_interval).await;
    }
}

async fn read_finished_playlist(work_dir: &Path) -> Result<Option<String>, StreamerError> {
    let text = match tokio::fs::read_to_string(playlist_path(work_dir)).await {
        Ok(t) => t,
        Err(_) => return Ok(None),
    };
    if !playlist::has_header_magic(&text) || playlist::referenced_segments(&text).is_empty() {
        return Ok(None);
    }
    Ok(Some(text))
}

/// Checks the two readiness conditions of §4.2 plus the startup fallback:
/// (a) `|S| >= min_segments` AND the last segment file exists with size > 0;
/// (b) `|S| >= 1` AND the stream-end marker is present (accept immediately,
/// regardless of file size — the encoder is done and will write no more);
/// fallback: `|S| >= 1` and `fallback_after` has elapsed without (a).
async fn try_read_ready_playlist(
    work_dir: &Path,
    started: std::time::Instant,
    params: &ReadinessParams,
) -> Result<Option<String>, StreamerError> {
    let text = match tokio::fs::read_to_string(playlist_path(work_dir)).await {
        Ok(t) => t,
        Err(_) => return Ok(None),
    };

    if !playlist::has_header_magic(&text) {
        return Ok(None);
    }

    let segments = playlist::referenced_segments(&text);
    if segments.is_empty() {
        return Ok(None);
    }

    if playlist::has_end_marker(&text) {
        return Ok(Some(text));
    }

    if segments.len() >= params.min_segments {
        let last = segments.last().expect("non-empty segments");
        if let Ok(meta) = tokio::fs::metadata(work_dir.join(last)).await {
            if meta.len() > 0 {
                return Ok(Some(text));
            }
        }
    }

    if started.elapsed() > params.fallback_after {
        return Ok(Some(text));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Variant;
    use crate::registry::JobRegistry;
    use std::time::Duration as StdDuration;

    async fn write_playlist(dir: &Path, segments: u32) {
        tokio::fs::create_dir_all(dir).await.unwrap();
        let mut text = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
        for i in 0..segments {
            let name = crate::model::segment_file_name(i);
            tokio::fs::write(dir.join(&name), b"x").await.unwrap();
            text.push_str("#EXTINF:3.0,\n");
            text.push_str(&name);
            text.push('\n');
        }
        tokio::fs::write(playlist_path(dir), text).await.unwrap();
    }

    #[tokio::test]
    async fn returns_ready_once_min_segments_present() {
        let tmp = tempfile::tempdir().unwrap();
        write_playlist(tmp.path(), 2).await;

        let registry = JobRegistry::new(4, "sleep".to_string(), StdDuration::from_secs(30));
        let job = registry
            .ensure_running(
                "item",
                Variant::new(0, None),
                tmp.path().to_path_buf(),
                || vec!["30".to_string()],
                || {},
            )
            .await;

        let text = wait_until_ready(tmp.path(), &job, &ReadinessParams::default()).await.unwrap();
        assert!(text.contains("segment_001.ts"));
        job.cancel();
    }

    #[tokio::test]
    async fn reports_exited_without_output_when_job_dies_early() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(4, "false".to_string(), StdDuration::from_secs(30));
        let job = registry
            .ensure_running(
                "item",
                Variant::new(0, None),
                tmp.path().to_path_buf(),
                Vec::new,
                || {},
            )
            .await;

        let result = wait_until_ready(tmp.path(), &job, &ReadinessParams::default()).await;
        assert!(matches!(result, Err(StreamerError::TranscoderExitedWithoutOutput)));
    }

    #[tokio::test]
    async fn reports_transcoder_unavailable_when_binary_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(4, "definitely-not-a-real-binary-xyz".to_string(), StdDuration::from_secs(30));
        let job = registry
            .ensure_running("item", Variant::new(0, None), tmp.path().to_path_buf(), Vec::new, || {})
            .await;

        let result = wait_until_ready(tmp.path(), &job, &ReadinessParams::default()).await;
        assert!(matches!(result, Err(StreamerError::TranscoderUnavailable(_))));
    }

    #[tokio::test]
    async fn falls_back_to_single_segment_after_grace_period() {
        let tmp = tempfile::tempdir().unwrap();
        write_playlist(tmp.path(), 1).await;

        let registry = JobRegistry::new(4, "sleep".to_string(), StdDuration::from_secs(30));
        let job = registry
            .ensure_running(
                "item",
                Variant::new(0, None),
                tmp.path().to_path_buf(),
                || vec!["30".to_string()],
                || {},
            )
            .await;

        // Only one segment is present, so this must not resolve immediately.
        let fast = tokio::time::timeout(
            StdDuration::from_millis(100),
            wait_until_ready(tmp.path(), &job, &ReadinessParams::default()),
        )
        .await;
        assert!(fast.is_err());
        job.cancel();
    }

    #[tokio::test]
    async fn custom_params_shrink_the_fallback_window() {
        let tmp = tempfile::tempdir().unwrap();
        write_playlist(tmp.path(), 1).await;

        let registry = JobRegistry::new(4, "sleep".to_string(), StdDuration::from_secs(30));
        let job = registry
            .ensure_running(
                "item",
                Variant::new(0, None),
                tmp.path().to_path_buf(),
                || vec!["30".to_string()],
                || {},
            )
            .await;

        let params = ReadinessParams {
            poll_interval: Duration::from_millis(10),
            overall_timeout: Duration::from_secs(5),
            min_segments: 2,
            fallback_after: Duration::from_millis(20),
        };

        let text = tokio::time::timeout(StdDuration::from_secs(1), wait_until_ready(tmp.path(), &job, &params))
            .await
            .unwrap()
            .unwrap();
        assert!(text.contains("segment_000.ts"));
        job.cancel();
    }

    #[tokio::test]
    async fn does_not_accept_min_segments_while_last_segment_is_still_empty() {
        let tmp = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(tmp.path()).await.unwrap();
        let mut text = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
        for i in 0..2u32 {
            let name = crate::model::segment_file_name(i);
            // segment_001.ts exists but is still zero bytes, as if the
            // transcoder had just created it and not yet flushed any data.
            tokio::fs::write(tmp.path().join(&name), if i == 1 { b"" } else { b"x" }).await.unwrap();
            text.push_str("#EXTINF:3.0,\n");
            text.push_str(&name);
            text.push('\n');
        }
        tokio::fs::write(playlist_path(tmp.path()), text).await.unwrap();

        let registry = JobRegistry::new(4, "sleep".to_string(), StdDuration::from_secs(30));
        let job = registry
            .ensure_running(
                "item",
                Variant::new(0, None),
                tmp.path().to_path_buf(),
                || vec!["30".to_string()],
                || {},
            )
            .await;

        // min_segments is satisfied by count alone, but the last segment's
        // size is still 0, so this must not resolve until the fallback fires.
        let params = ReadinessParams {
            poll_interval: Duration::from_millis(10),
            overall_timeout: Duration::from_secs(5),
            min_segments: 2,
            fallback_after: Duration::from_millis(500),
        };
        let fast = tokio::time::timeout(StdDuration::from_millis(100), wait_until_ready(tmp.path(), &job, &params)).await;
        assert!(fast.is_err());
        job.cancel();
    }

    #[tokio::test]
    async fn end_marker_with_single_segment_accepts_immediately() {
        let tmp = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(tmp.path()).await.unwrap();
        let name = crate::model::segment_file_name(0);
        tokio::fs::write(tmp.path().join(&name), b"x").await.unwrap();
        let text = format!("#EXTM3U\n#EXT-X-VERSION:3\n#EXTINF:1.5,\n{name}\n#EXT-X-ENDLIST\n");
        tokio::fs::write(playlist_path(tmp.path()), text).await.unwrap();

        let registry = JobRegistry::new(4, "sleep".to_string(), StdDuration::from_secs(30));
        let job = registry
            .ensure_running(
                "item",
                Variant::new(0, None),
                tmp.path().to_path_buf(),
                || vec!["30".to_string()],
                || {},
            )
            .await;

        // min_segments is 2 and never reached, but the end marker plus one
        // segment must accept immediately per the §4.2 (b) clause.
        let params = ReadinessParams {
            min_segments: 2,
            fallback_after: Duration::from_secs(5),
            ..ReadinessParams::default()
        };
        let text = tokio::time::timeout(StdDuration::from_millis(100), wait_until_ready(tmp.path(), &job, &params))
            .await
            .unwrap()
            .unwrap();
        assert!(text.contains(&name));
        job.cancel();
    }
}
