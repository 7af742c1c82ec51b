//! Break-point resolution.
//!
//! Ad-break cues are stored per video as JSON annotation values: either a
//! bare number (a simple cue) or a structured fade object. Shapes are decoded
//! explicitly into a tagged variant; anything unrecognized is skipped with a
//! log line rather than failing the video.

use rusqlite::Connection;
use serde::Deserialize;
use tracing::warn;

/// Half-open fade range in seconds, relative to the break time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct FadeRange {
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
}

/// Independent video/audio ranges for one side of a fade.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct FadePhase {
    #[serde(default)]
    pub video: FadeRange,
    #[serde(default)]
    pub audio: FadeRange,
}

impl FadePhase {
    /// Earliest offset (relative to break time) either track starts fading.
    pub fn earliest_start(&self) -> f64 {
        self.video.start.min(self.audio.start)
    }

    /// Latest offset (relative to break time) either track finishes fading.
    pub fn latest_end(&self) -> f64 {
        self.video.end.max(self.audio.end)
    }
}

/// An authored ad-break cue.
#[derive(Debug, Clone, PartialEq)]
pub enum BreakPoint {
    /// Bare timestamp: cut straight to ads.
    Simple { time: f64 },
    /// Fade-structured break with independent out/in phases.
    Fade {
        time: f64,
        color: String,
        fade_out: FadePhase,
        fade_in: FadePhase,
    },
}

impl BreakPoint {
    /// The authored break time in video-timeline seconds.
    pub fn time(&self) -> f64 {
        match self {
            BreakPoint::Simple { time } => *time,
            BreakPoint::Fade { time, .. } => *time,
        }
    }

    /// Absolute start of the fade-out window; the break time itself for a
    /// simple cue. The ad-insertion trigger measures distance to this point.
    pub fn fade_out_window_start(&self) -> f64 {
        match self {
            BreakPoint::Simple { time } => *time,
            BreakPoint::Fade { time, fade_out, .. } => time + fade_out.earliest_start().min(0.0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FadeBreakJson {
    #[serde(rename = "type")]
    kind: String,
    time: f64,
    #[serde(default = "default_color")]
    color: String,
    #[serde(default)]
    fade_out: FadePhase,
    #[serde(default)]
    fade_in: FadePhase,
}

fn default_color() -> String {
    "black".to_string()
}

/// Decode one stored break value. `None` means the shape was unrecognized.
fn decode_break(value: &str) -> Option<BreakPoint> {
    let json: serde_json::Value = serde_json::from_str(value).ok()?;

    if let Some(time) = json.as_f64() {
        return Some(BreakPoint::Simple { time });
    }

    if json.is_object() {
        let fade: FadeBreakJson = serde_json::from_value(json).ok()?;
        if fade.kind != "fade" {
            return None;
        }
        return Some(BreakPoint::Fade {
            time: fade.time,
            color: fade.color,
            fade_out: fade.fade_out,
            fade_in: fade.fade_in,
        });
    }

    None
}

/// Load and decode the break points for a video, sorted ascending by time.
///
/// Invalid or partially structured entries are skipped, not fatal.
pub fn resolve_breaks(conn: &Connection, video_id: &str) -> anyhow::Result<Vec<BreakPoint>> {
    let values = airwave_db::queries::annotations::break_values(conn, video_id)?;

    let mut breaks = Vec::with_capacity(values.len());
    for value in &values {
        match decode_break(value) {
            Some(bp) => breaks.push(bp),
            None => {
                warn!(video = video_id, value, "skipping unrecognized break annotation");
            }
        }
    }

    breaks.sort_by(|a, b| a.time().total_cmp(&b.time()));
    Ok(breaks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use airwave_db::pool::init_memory_pool;
    use airwave_db::queries::{annotations, videos};

    #[test]
    fn bare_number_is_simple_cue() {
        assert_eq!(decode_break("120.5"), Some(BreakPoint::Simple { time: 120.5 }));
        assert_eq!(decode_break("30"), Some(BreakPoint::Simple { time: 30.0 }));
    }

    #[test]
    fn fade_object_with_defaults() {
        let bp = decode_break(
            r#"{"type":"fade","time":300,"fade_out":{"video":{"start":-1,"end":1}}}"#,
        )
        .unwrap();
        match bp {
            BreakPoint::Fade {
                time,
                color,
                fade_out,
                fade_in,
            } => {
                assert_eq!(time, 300.0);
                assert_eq!(color, "black");
                assert_eq!(fade_out.video, FadeRange { start: -1.0, end: 1.0 });
                assert_eq!(fade_out.audio, FadeRange::default());
                assert_eq!(fade_in, FadePhase::default());
            }
            other => panic!("expected fade break, got {other:?}"),
        }
    }

    #[test]
    fn unknown_shapes_are_skipped() {
        assert_eq!(decode_break(r#"{"type":"quiz","time":10}"#), None);
        assert_eq!(decode_break(r#""thirty""#), None);
        assert_eq!(decode_break("not json"), None);
        assert_eq!(decode_break("[1,2,3]"), None);
    }

    #[test]
    fn fade_out_window_start_accounts_for_lead_in() {
        let bp = decode_break(
            r#"{"type":"fade","time":30,"fade_out":{"video":{"start":-1,"end":1}}}"#,
        )
        .unwrap();
        assert_eq!(bp.fade_out_window_start(), 29.0);
        assert_eq!(BreakPoint::Simple { time: 30.0 }.fade_out_window_start(), 30.0);
    }

    #[test]
    fn resolved_breaks_are_sorted() {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        videos::create_video(&conn, "a", "/media/a.mp4").unwrap();

        annotations::add_annotation(&conn, "a", annotations::BREAK_KIND, "200").unwrap();
        annotations::add_annotation(&conn, "a", annotations::BREAK_KIND, "50").unwrap();
        annotations::add_annotation(&conn, "a", annotations::BREAK_KIND, "garbage").unwrap();
        annotations::add_annotation(
            &conn,
            "a",
            annotations::BREAK_KIND,
            r#"{"type":"fade","time":120}"#,
        )
        .unwrap();

        let breaks = resolve_breaks(&conn, "a").unwrap();
        let times: Vec<f64> = breaks.iter().map(|b| b.time()).collect();
        assert_eq!(times, vec![50.0, 120.0, 200.0]);
    }
}
