//! Per-video annotation queries.
//!
//! Annotations are free-form JSON values keyed by kind. Break points use
//! kind `break`; decoding the JSON shapes is the caller's concern.

use rusqlite::{params, Connection};

use crate::error::Result;

/// The annotation kind under which ad-break cues are stored.
pub const BREAK_KIND: &str = "break";

/// Add an annotation value for a video.
pub fn add_annotation(conn: &Connection, video_id: &str, kind: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO video_annotations (video_id, kind, value) VALUES (?, ?, ?)",
        params![video_id, kind, value],
    )?;
    Ok(())
}

/// Fetch all annotation values of a kind for a video, in insertion order.
pub fn annotation_values(conn: &Connection, video_id: &str, kind: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT value FROM video_annotations WHERE video_id = ? AND kind = ? ORDER BY id",
    )?;
    let rows = stmt.query_map(params![video_id, kind], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Fetch the raw break-point values for a video.
pub fn break_values(conn: &Connection, video_id: &str) -> Result<Vec<String>> {
    annotation_values(conn, video_id, BREAK_KIND)
}
