//! Core domain types shared across the cache, registry and streamer.

use std::path::{Path, PathBuf};

/// A bitrate + track selection. `bitrate_kbps == 0` means "codec default".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variant {
    pub bitrate_kbps: u32,
    pub audio_track: Option<String>,
}

impl Variant {
    pub fn new(bitrate_kbps: u32, audio_track: Option<String>) -> Self {
        Self {
            bitrate_kbps,
            audio_track,
        }
    }

    /// `<bitrateOrDefault>_<trackOrDefault>`, the on-disk/cache-key fragment for this variant.
    pub fn variant_key(&self) -> String {
        let bitrate = if self.bitrate_kbps == 0 {
            "default".to_string()
        } else {
            self.bitrate_kbps.to_string()
        };
        let track = self.audio_track.as_deref().unwrap_or("default");
        format!("{bitrate}_{track}")
    }
}

/// `itemId + "/" + variantKey`. Doubles as the on-disk subpath under `cacheRoot`.
pub fn cache_key(item_id: &str, variant: &Variant) -> String {
    format!("{item_id}/{}", variant.variant_key())
}

/// Resolved source of a library item, as returned by a `LibraryIndex`.
#[derive(Debug, Clone)]
pub struct MediaSource {
    pub absolute_path: PathBuf,
    pub is_cue_track: bool,
    pub cue_start_seconds: f64,
    pub cue_duration_seconds: Option<f64>,
}

impl MediaSource {
    pub fn file(absolute_path: PathBuf) -> Self {
        Self {
            absolute_path,
            is_cue_track: false,
            cue_start_seconds: 0.0,
            cue_duration_seconds: None,
        }
    }

    pub fn cue_track(absolute_path: PathBuf, start_seconds: f64, duration_seconds: Option<f64>) -> Self {
        Self {
            absolute_path,
            is_cue_track: true,
            cue_start_seconds: start_seconds,
            cue_duration_seconds: duration_seconds,
        }
    }
}

pub const PLAYLIST_FILE_NAME: &str = "playlist.m3u8";

pub fn playlist_path(work_dir: &Path) -> PathBuf {
    work_dir.join(PLAYLIST_FILE_NAME)
}

pub fn segment_file_name(index: u32) -> String {
    format!("segment_{index:03}.ts")
}
