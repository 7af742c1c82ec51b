//! Airwave-DB: metadata store schema, migrations, and query operations
//!
//! This crate provides the station/video metadata store for airwave using
//! SQLite with rusqlite and r2d2 connection pooling.
//!
//! # Modules
//!
//! - `migrations` - Database schema migrations
//! - `pool` - Connection pool management
//! - `models` - Rust models matching the database schema
//! - `queries` - Database query operations
//!
//! The playout hot path only ever reads; writes are limited to seeding and
//! the startup duration/loudness backfill job.
//!
//! # Example
//!
//! ```no_run
//! use airwave_db::pool::{get_conn, init_pool};
//! use airwave_db::queries::stations;
//!
//! let pool = init_pool("/var/lib/airwave/airwave.db").unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! let rotation = stations::rotation(&conn, "channel-1").unwrap();
//! println!("{} videos in rotation", rotation.len());
//! ```

mod error;

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;

pub use error::{Error, Result};
