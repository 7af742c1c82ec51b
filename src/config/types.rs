use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub playout: PlayoutConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub backfill: BackfillConfig,
}

/// Knobs for the per-station production and delivery engines.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayoutConfig {
    /// Nominal regular-chunk duration in seconds.
    #[serde(default = "default_nominal_chunk_secs")]
    pub nominal_chunk_secs: f64,

    /// Hard cap on any single chunk duration.
    #[serde(default = "default_max_chunk_secs")]
    pub max_chunk_secs: f64,

    /// Production idles once this much playout time is buffered...
    #[serde(default = "default_high_water_secs")]
    pub buffer_high_water_secs: f64,

    /// ...and at least this many chunks are queued.
    #[serde(default = "default_high_water_chunks")]
    pub buffer_high_water_chunks: usize,

    /// Retry bound for regular chunks.
    #[serde(default = "default_chunk_retries")]
    pub chunk_retries: u32,

    /// Retry bound for ad chunks and final chunks.
    #[serde(default = "default_extended_retries")]
    pub extended_retries: u32,

    /// Base backoff between transcode retries, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Production poll interval while idling, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum distinct ads inserted per break.
    #[serde(default = "default_ads_per_break")]
    pub ads_per_break: usize,

    /// Extra time granted to a chunk's A/V transmission beyond its nominal
    /// duration before the join is abandoned.
    #[serde(default = "default_delivery_slack_secs")]
    pub delivery_slack_secs: f64,

    /// Tag marking videos eligible as ad material.
    #[serde(default = "default_commercial_tag")]
    pub commercial_tag: String,
}

impl Default for PlayoutConfig {
    fn default() -> Self {
        Self {
            nominal_chunk_secs: default_nominal_chunk_secs(),
            max_chunk_secs: default_max_chunk_secs(),
            buffer_high_water_secs: default_high_water_secs(),
            buffer_high_water_chunks: default_high_water_chunks(),
            chunk_retries: default_chunk_retries(),
            extended_retries: default_extended_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            ads_per_break: default_ads_per_break(),
            delivery_slack_secs: default_delivery_slack_secs(),
            commercial_tag: default_commercial_tag(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// SQLite metadata database.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Scratch directory for produced chunk files.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            work_dir: default_work_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackfillConfig {
    /// Concurrent probe/loudness subprocesses during startup backfill.
    #[serde(default = "default_backfill_concurrency")]
    pub concurrency: usize,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            concurrency: default_backfill_concurrency(),
        }
    }
}

fn default_nominal_chunk_secs() -> f64 {
    30.0
}

fn default_max_chunk_secs() -> f64 {
    60.0
}

fn default_high_water_secs() -> f64 {
    120.0
}

fn default_high_water_chunks() -> usize {
    4
}

fn default_chunk_retries() -> u32 {
    3
}

fn default_extended_retries() -> u32 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_ads_per_break() -> usize {
    3
}

fn default_delivery_slack_secs() -> f64 {
    5.0
}

fn default_commercial_tag() -> String {
    "commercial".to_string()
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("airwave.db")
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("airwave").join("chunks")
}

fn default_backfill_concurrency() -> usize {
    4
}
