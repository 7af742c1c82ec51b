//! # airwave-bitstream
//!
//! Elementary-stream parsing for the playout pipeline.
//!
//! This crate provides functionality for:
//! - Splitting H.264 Annex-B byte streams into NAL units
//! - Reading Exp-Golomb slice-header fields (`first_mb_in_slice`)
//! - Grouping NAL sequences into access units for per-frame delivery
//! - Extracting Opus packets (with granule timing) from Ogg containers
//!
//! It deliberately stops short of a general-purpose demuxer: only what the
//! delivery engine needs to turn transcoder output into timed samples.

mod error;

pub mod access_unit;
pub mod exp_golomb;
pub mod nal;
pub mod ogg;

// Re-exports
pub use access_unit::{group_access_units, AccessUnit};
pub use error::{Error, Result};
pub use exp_golomb::first_mb_in_slice;
pub use nal::{is_vcl, nal_type, remove_emulation_prevention, split_nalus, NalUnitType};
pub use ogg::{OpusPacket, DEFAULT_FRAME_SAMPLES, OPUS_SAMPLE_RATE};
