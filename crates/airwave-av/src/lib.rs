//! # airwave-av
//!
//! External transcoder adapter for the playout pipeline.
//!
//! This crate wraps ffmpeg/ffprobe subprocesses behind a typed contract:
//! - Cutting exact-duration chunk pairs (raw H.264 + Ogg/Opus) with optional
//!   cross-fades and loudness normalization
//! - Probing durations and frame rates from produced output
//! - First-pass loudness measurement for the startup backfill
//! - Tool discovery and timeout-bounded subprocess execution
//!
//! The transcoder is treated as untrusted: every failure mode surfaces as a
//! typed [`Error`], never silently.

mod error;

pub mod chunk;
pub mod command;
pub mod probe;
pub mod tools;

// Re-exports
pub use chunk::{
    format_descriptor, ChunkOutput, ChunkRequest, ChunkSegments, FadeDirection, FadeSpec,
    FfmpegTranscoder, SourceVideo, NEGLIGIBLE_FLOOR_SECS,
};
pub use command::{ToolCommand, ToolOutput};
pub use error::{Error, Result};
pub use probe::{measure_loudness, probe, probe_duration, LoudnessParams, ProbeInfo, Rational};
pub use tools::{check_tool, check_tools, require_tool, ToolInfo};
