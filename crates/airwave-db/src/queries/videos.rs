//! Video database queries.
//!
//! The hot scheduling path only reads; the duration/loudness setters exist
//! for the startup backfill batch job.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::{Loudness, Video};

fn video_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Video> {
    let input_i: Option<f64> = row.get(3)?;
    let input_tp: Option<f64> = row.get(4)?;
    let input_lra: Option<f64> = row.get(5)?;
    let input_thresh: Option<f64> = row.get(6)?;

    let loudness = match (input_i, input_tp, input_lra, input_thresh) {
        (Some(input_i), Some(input_tp), Some(input_lra), Some(input_thresh)) => Some(Loudness {
            input_i,
            input_tp,
            input_lra,
            input_thresh,
        }),
        _ => None,
    };

    Ok(Video {
        id: row.get(0)?,
        source_path: row.get(1)?,
        duration_secs: row.get(2)?,
        loudness,
    })
}

const VIDEO_COLUMNS: &str =
    "id, source_path, duration_secs, loudness_i, loudness_tp, loudness_lra, loudness_thresh";

/// Insert a new video row.
///
/// # Arguments
///
/// * `conn` - Database connection
/// * `id` - Video identifier
/// * `source_path` - Path to the source media file
pub fn create_video(conn: &Connection, id: &str, source_path: &str) -> Result<Video> {
    conn.execute(
        "INSERT INTO videos (id, source_path) VALUES (?, ?)",
        params![id, source_path],
    )?;
    get_video(conn, id)
}

/// Fetch a video by ID.
///
/// # Returns
///
/// * `Ok(Video)` - The video row
/// * `Err(Error::NotFound)` - If no such video exists
pub fn get_video(conn: &Connection, id: &str) -> Result<Video> {
    conn.query_row(
        &format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = ?"),
        params![id],
        video_from_row,
    )
    .optional()?
    .ok_or_else(|| Error::not_found("video", id))
}

/// List videos that have no probed duration yet (backfill candidates).
pub fn list_videos_missing_metadata(conn: &Connection) -> Result<Vec<Video>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VIDEO_COLUMNS} FROM videos
         WHERE duration_secs IS NULL OR loudness_i IS NULL
         ORDER BY id"
    ))?;
    let rows = stmt.query_map([], video_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Record a video's probed duration.
pub fn set_duration(conn: &Connection, id: &str, duration_secs: f64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE videos SET duration_secs = ? WHERE id = ?",
        params![duration_secs, id],
    )?;
    if updated == 0 {
        return Err(Error::not_found("video", id));
    }
    Ok(())
}

/// Record a video's measured loudness parameters.
pub fn set_loudness(conn: &Connection, id: &str, loudness: &Loudness) -> Result<()> {
    let updated = conn.execute(
        "UPDATE videos SET loudness_i = ?, loudness_tp = ?, loudness_lra = ?, loudness_thresh = ?
         WHERE id = ?",
        params![
            loudness.input_i,
            loudness.input_tp,
            loudness.input_lra,
            loudness.input_thresh,
            id
        ],
    )?;
    if updated == 0 {
        return Err(Error::not_found("video", id));
    }
    Ok(())
}

/// Attach a tag to a video, creating the tag row if needed.
pub fn tag_video(conn: &Connection, video_id: &str, tag: &str) -> Result<()> {
    conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?)", params![tag])?;
    conn.execute(
        "INSERT OR IGNORE INTO video_tags (video_id, tag_id)
         SELECT ?, id FROM tags WHERE name = ?",
        params![video_id, tag],
    )?;
    Ok(())
}

/// Whether a video carries the given tag.
pub fn video_has_tag(conn: &Connection, video_id: &str, tag: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM video_tags vt
         JOIN tags t ON t.id = vt.tag_id
         WHERE vt.video_id = ? AND t.name = ?",
        params![video_id, tag],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// List IDs of all videos carrying the given tag.
pub fn videos_with_tag(conn: &Connection, tag: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT vt.video_id FROM video_tags vt
         JOIN tags t ON t.id = vt.tag_id
         WHERE t.name = ?
         ORDER BY vt.video_id",
    )?;
    let rows = stmt.query_map(params![tag], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
