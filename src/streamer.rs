//! Streamer — the facade tying CacheStore, JobRegistry, ReadinessProbe and
//! the library index together (§4.5).
//!
//! `generate_playlist` and `serve_segment` are the only two entry points the
//! HTTP layer calls; everything else in this module is argv construction and
//! the cache-completion continuation described in §4.5 step 7.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::cache::CacheStore;
use crate::error::StreamerError;
use crate::library::LibraryIndex;
use crate::model::{cache_key, playlist_path, MediaSource, Variant};
use crate::pathsafe;
use crate::playlist;
use crate::readiness::{self, ReadinessParams};
use crate::registry::JobRegistry;

#[derive(Clone)]
pub struct Streamer {
    library: Arc<dyn LibraryIndex>,
    cache: CacheStore,
    registry: Arc<JobRegistry>,
    cache_root: PathBuf,
    readiness_params: ReadinessParams,
}

impl Streamer {
    pub fn new(
        library: Arc<dyn LibraryIndex>,
        cache: CacheStore,
        registry: JobRegistry,
        cache_root: PathBuf,
    ) -> Self {
        Self::with_readiness_params(library, cache, registry, cache_root, ReadinessParams::default())
    }

    pub fn with_readiness_params(
        library: Arc<dyn LibraryIndex>,
        cache: CacheStore,
        registry: JobRegistry,
        cache_root: PathBuf,
        readiness_params: ReadinessParams,
    ) -> Self {
        Self {
            library,
            cache,
            registry: Arc::new(registry),
            cache_root,
            readiness_params,
        }
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    fn resolve_work_dir(&self, key: &str) -> Result<PathBuf, StreamerError> {
        pathsafe::join_within(&self.cache_root, key).ok_or(StreamerError::PathEscape)
    }

    /// `generatePlaylist(itemId, variant) → playlist text` (§4.5).
    pub async fn generate_playlist(
        &self,
        item_id: &str,
        variant: Variant,
        base_path: &str,
    ) -> Result<String, StreamerError> {
        let key = cache_key(item_id, &variant);
        let work_dir = self.resolve_work_dir(&key)?;

        if let Some(entry) = self.cache.get(&key).await {
            if entry.complete {
                let text = read_playlist(&entry.work_dir).await?;
                return Ok(playlist::rewrite_segment_urls(&text, base_path, &key));
            }
        }

        let source = self
            .library
            .lookup(item_id)
            .await
            .ok_or_else(|| StreamerError::ItemNotFound(item_id.to_string()))?;

        match tokio::fs::metadata(&source.absolute_path).await {
            Ok(meta) if meta.is_file() => {}
            _ => return Err(StreamerError::SourceMissing(item_id.to_string())),
        }

        tokio::fs::create_dir_all(&work_dir)
            .await
            .map_err(|e| StreamerError::Internal(e.into()))?;

        let variant_for_argv = variant.clone();
        let source_for_argv = source.clone();
        let cache_for_completion = self.cache.clone();
        let key_for_completion = key.clone();
        let work_dir_for_completion = work_dir.clone();

        let job = self
            .registry
            .ensure_running(
                item_id,
                variant,
                work_dir.clone(),
                move || build_argv(&source_for_argv, &variant_for_argv),
                move || {
                    // Re-putting a key whose work dir is unchanged refreshes the FIFO
                    // position without deleting anything (cache.rs `put`); the actual
                    // "complete" bit is recomputed by `get`'s completeness check.
                    tokio::spawn(async move {
                        cache_for_completion
                            .put(&key_for_completion, work_dir_for_completion)
                            .await;
                    });
                },
            )
            .await;

        let text = readiness::wait_until_ready(&work_dir, &job, &self.readiness_params).await?;

        self.cache.put(&key, work_dir).await;
        info!(item_id, key, "playlist generated, cache entry pending");

        Ok(playlist::rewrite_segment_urls(&text, base_path, &key))
    }

    /// `serveSegment(key) → absolute file path` (§4.5).
    ///
    /// Traversal (`..`) is rejected syntactically before ever touching disk.
    /// Existence is then checked on the un-canonicalized candidate, because
    /// `canonicalize` requires the path to exist and a merely-missing segment
    /// must report `SegmentNotFound`, not `PathEscape`. Only once the file is
    /// known to exist is it canonicalized and checked for ancestry, which
    /// catches a symlink planted under `cacheRoot` that points outside it.
    pub async fn serve_segment(&self, key_and_segment: &str) -> Result<PathBuf, StreamerError> {
        let candidate = pathsafe::join_within(&self.cache_root, key_and_segment)
            .ok_or(StreamerError::PathEscape)?;

        if tokio::fs::metadata(&candidate).await.is_err() {
            return Err(StreamerError::SegmentNotFound(key_and_segment.to_string()));
        }

        pathsafe::canonical_descendant(&self.cache_root, &candidate)
            .await
            .ok_or(StreamerError::PathEscape)
    }
}

async fn read_playlist(work_dir: &Path) -> Result<String, StreamerError> {
    tokio::fs::read_to_string(playlist_path(work_dir))
        .await
        .map_err(|e| StreamerError::Internal(e.into()))
}

/// MIME type for a served path, by extension (§4.5).
pub fn mime_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ts") => "video/MP2T",
        Some("m3u8") => "application/vnd.apple.mpegurl",
        _ => "application/octet-stream",
    }
}

/// Builds the transcoder argv from a resolved source and requested variant
/// (§4.3). Cue tracks get a pre-input seek and, when known, a duration bound;
/// audio is re-encoded to AAC at the requested bitrate (or codec default when
/// `bitrate_kbps == 0`), video is dropped, and HLS options match the fixed
/// segmenting policy (3s segments, unbounded list, zero-padded names).
fn build_argv(source: &MediaSource, variant: &Variant) -> Vec<String> {
    let mut argv = Vec::new();

    if source.is_cue_track {
        argv.push("-ss".to_string());
        argv.push(format!("{}", source.cue_start_seconds));
    }

    argv.push("-i".to_string());
    argv.push(source.absolute_path.to_string_lossy().into_owned());

    if source.is_cue_track {
        if let Some(duration) = source.cue_duration_seconds {
            argv.push("-t".to_string());
            argv.push(format!("{duration}"));
        }
    }

    argv.push("-vn".to_string());
    argv.push("-c:a".to_string());
    argv.push("aac".to_string());
    if variant.bitrate_kbps > 0 {
        argv.push("-b:a".to_string());
        argv.push(format!("{}k", variant.bitrate_kbps));
    }

    argv.push("-f".to_string());
    argv.push("hls".to_string());
    argv.push("-hls_time".to_string());
    argv.push("3".to_string());
    argv.push("-hls_list_size".to_string());
    argv.push("0".to_string());
    argv.push("-hls_segment_filename".to_string());
    argv.push("segment_%03d.ts".to_string());
    argv.push("-start_number".to_string());
    argv.push("0".to_string());
    argv.push("-v".to_string());
    argv.push("error".to_string());
    argv.push("-y".to_string());
    argv.push("playlist.m3u8".to_string());

    argv
}
