//! Station database queries.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::Station;

/// Insert a new station row.
///
/// # Arguments
///
/// * `conn` - Database connection
/// * `name` - Station name (primary key)
/// * `unix_start` - Wall-clock epoch (Unix seconds) the rotation started
pub fn create_station(conn: &Connection, name: &str, unix_start: i64) -> Result<Station> {
    conn.execute(
        "INSERT INTO stations (name, unix_start) VALUES (?, ?)",
        params![name, unix_start],
    )?;
    get_station(conn, name)
}

/// Fetch a station by name.
pub fn get_station(conn: &Connection, name: &str) -> Result<Station> {
    conn.query_row(
        "SELECT name, unix_start FROM stations WHERE name = ?",
        params![name],
        |row| {
            Ok(Station {
                name: row.get(0)?,
                unix_start: row.get(1)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| Error::not_found("station", name))
}

/// List all station names.
pub fn list_stations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM stations ORDER BY name")?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Replace a station's rotation with the given ordered video IDs.
pub fn set_rotation(conn: &Connection, station: &str, video_ids: &[&str]) -> Result<()> {
    conn.execute(
        "DELETE FROM station_videos WHERE station_name = ?",
        params![station],
    )?;
    for (position, video_id) in video_ids.iter().enumerate() {
        conn.execute(
            "INSERT INTO station_videos (station_name, video_id, position) VALUES (?, ?, ?)",
            params![station, video_id, position as i64],
        )?;
    }
    Ok(())
}

/// Fetch a station's rotation: video IDs in playout order.
pub fn rotation(conn: &Connection, station: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT video_id FROM station_videos WHERE station_name = ? ORDER BY position",
    )?;
    let rows = stmt.query_map(params![station], |row| row.get(0))?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use crate::queries::videos::create_video;

    #[test]
    fn station_roundtrip() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();

        create_station(&conn, "one", 1_700_000_000).unwrap();
        let station = get_station(&conn, "one").unwrap();
        assert_eq!(station.unix_start, 1_700_000_000);
        assert_eq!(list_stations(&conn).unwrap(), vec!["one"]);
    }

    #[test]
    fn rotation_preserves_order() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        create_station(&conn, "one", 0).unwrap();
        for id in ["c", "a", "b"] {
            create_video(&conn, id, &format!("/media/{id}.mp4")).unwrap();
        }

        set_rotation(&conn, "one", &["c", "a", "b"]).unwrap();
        assert_eq!(rotation(&conn, "one").unwrap(), vec!["c", "a", "b"]);

        set_rotation(&conn, "one", &["b", "c"]).unwrap();
        assert_eq!(rotation(&conn, "one").unwrap(), vec!["b", "c"]);
    }
}
