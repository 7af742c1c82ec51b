//! Internal Rust models matching the database schema.

use serde::{Deserialize, Serialize};

/// Precomputed loudness-normalization parameters for a video, as measured by
/// a first-pass loudnorm analysis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Loudness {
    /// Measured integrated loudness (LUFS).
    pub input_i: f64,
    /// Measured true peak (dBTP).
    pub input_tp: f64,
    /// Measured loudness range (LU).
    pub input_lra: f64,
    /// Measured threshold (LUFS).
    pub input_thresh: f64,
}

/// A video asset known to the playout system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Video {
    pub id: String,
    /// Path (or URI) of the source media file.
    pub source_path: String,
    /// Total duration in seconds, once probed.
    pub duration_secs: Option<f64>,
    /// Loudness-normalization parameters, once measured.
    pub loudness: Option<Loudness>,
}

/// A station row: identity plus the wall-clock epoch its rotation is
/// synchronized to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Station {
    pub name: String,
    /// Unix timestamp (seconds) the station's rotation notionally started.
    pub unix_start: i64,
}
