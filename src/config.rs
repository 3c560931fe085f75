//! Configuration layer: `config` + `serde`, loaded the same way the teacher's
//! `main.rs` loads its `Settings` (a single TOML file resolved by `clap`).

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub library: LibraryConfig,
    pub cache: CacheConfig,
    pub transcoder: TranscoderConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub job: JobConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LibraryConfig {
    /// Root directory scanned for playable files.
    pub root: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub cache_root: String,
    pub working_dir: String,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_max_age_minutes")]
    pub max_age_minutes: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_max_entries() -> usize {
    100
}

fn default_max_age_minutes() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranscoderConfig {
    #[serde(default = "default_transcoder_path")]
    pub path: String,
}

fn default_transcoder_path() -> String {
    "ffmpeg".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReadinessConfig {
    #[serde(default = "default_min_segments")]
    pub min_segments: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    #[serde(default = "default_fallback_ms")]
    pub fallback_ms: u64,
}

fn default_min_segments() -> usize {
    2
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_poll_ms() -> u64 {
    200
}
fn default_fallback_ms() -> u64 {
    2_000
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            min_segments: default_min_segments(),
            timeout_ms: default_timeout_ms(),
            poll_ms: default_poll_ms(),
            fallback_ms: default_fallback_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,
}

fn default_max_jobs() -> usize {
    4
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_jobs: default_max_jobs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct JobConfig {
    #[serde(default = "default_job_timeout_minutes")]
    pub timeout_minutes: u64,
}

fn default_job_timeout_minutes() -> u64 {
    10
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: default_job_timeout_minutes(),
        }
    }
}

/// Resolves the transcoder binary path, letting `TRANSCODER_PATH` override
/// the config file the same way the teacher lets env vars override settings
/// for deployment-specific paths.
pub fn resolve_transcoder_path(settings: &TranscoderConfig) -> String {
    std::env::var("TRANSCODER_PATH").unwrap_or_else(|_| settings.path.clone())
}
