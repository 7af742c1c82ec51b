//! Airwave - Linear TV-station playout scheduler
//!
//! This library crate exposes the core functionality for integration testing.

pub mod bootstrap;
pub mod breaks;
pub mod config;
pub mod engine;
pub mod sink;
pub mod station;
