//! Database query modules.
//!
//! This module organizes all database operations into logical groups:
//! - videos: video rows, tag membership, duration/loudness backfill
//! - stations: station rows and ordered rotations
//! - annotations: per-video annotation values (break points)

pub mod annotations;
pub mod stations;
pub mod videos;
