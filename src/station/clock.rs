//! Wall-clock synchronization of a station's rotation.
//!
//! A station behaves like a broadcast that has been running since its anchor
//! timestamp. Joining viewers land mid-program: elapsed real time is folded
//! modulo the rotation's total program length and walked to a (video, offset)
//! position. Ad material in the rotation occupies no program time.

use tracing::warn;

/// One rotation slot with the metadata synchronization needs.
#[derive(Debug, Clone)]
pub struct RotationEntry {
    pub id: String,
    pub duration_secs: f64,
    /// Ads are skipped by the clock; they are inserted at breaks instead.
    pub is_ad: bool,
}

/// Map elapsed wall time onto the rotation.
///
/// Returns the rotation index and the offset into that video, or `None` when
/// the rotation has no playable (non-ad, positive-duration) material.
/// A `now` before the anchor clamps to the rotation start.
pub fn sync_position(entries: &[RotationEntry], unix_start: i64, now: i64) -> Option<(usize, f64)> {
    let total: f64 = entries
        .iter()
        .filter(|e| !e.is_ad)
        .map(|e| e.duration_secs.max(0.0))
        .sum();
    if total <= 0.0 {
        warn!("rotation has no playable material");
        return None;
    }

    let elapsed = (now - unix_start).max(0) as f64;
    let mut remaining = elapsed % total;

    for (index, entry) in entries.iter().enumerate() {
        if entry.is_ad || entry.duration_secs <= 0.0 {
            continue;
        }
        if remaining < entry.duration_secs {
            return Some((index, remaining));
        }
        remaining -= entry.duration_secs;
    }

    // remaining can equal total only through float accumulation; land at the
    // start of the first playable entry.
    entries
        .iter()
        .position(|e| !e.is_ad && e.duration_secs > 0.0)
        .map(|index| (index, 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, duration_secs: f64, is_ad: bool) -> RotationEntry {
        RotationEntry {
            id: id.into(),
            duration_secs,
            is_ad,
        }
    }

    #[test]
    fn elapsed_time_walks_into_second_video() {
        let entries = vec![entry("a", 100.0, false), entry("b", 50.0, false)];
        let (index, offset) = sync_position(&entries, 1_000, 1_120).unwrap();
        assert_eq!(index, 1);
        assert_eq!(offset, 20.0);
    }

    #[test]
    fn elapsed_wraps_modulo_program_length() {
        let entries = vec![entry("a", 100.0, false), entry("b", 50.0, false)];
        // 150s program, 310s elapsed -> 10s into the second cycle.
        let (index, offset) = sync_position(&entries, 0, 310).unwrap();
        assert_eq!(index, 0);
        assert_eq!(offset, 10.0);
    }

    #[test]
    fn ads_occupy_no_program_time() {
        let entries = vec![
            entry("a", 100.0, false),
            entry("spot", 15.0, true),
            entry("b", 50.0, false),
        ];
        let (index, offset) = sync_position(&entries, 0, 120).unwrap();
        assert_eq!(index, 2);
        assert_eq!(offset, 20.0);
    }

    #[test]
    fn future_anchor_clamps_to_rotation_start() {
        let entries = vec![entry("a", 100.0, false)];
        let (index, offset) = sync_position(&entries, 5_000, 1_000).unwrap();
        assert_eq!(index, 0);
        assert_eq!(offset, 0.0);
    }

    #[test]
    fn all_ads_is_unplayable() {
        let entries = vec![entry("spot", 15.0, true)];
        assert!(sync_position(&entries, 0, 100).is_none());
        assert!(sync_position(&[], 0, 100).is_none());
    }

    #[test]
    fn same_inputs_give_same_position() {
        let entries = vec![entry("a", 73.5, false), entry("b", 41.25, false)];
        let first = sync_position(&entries, 777, 12_345).unwrap();
        let second = sync_position(&entries, 777, 12_345).unwrap();
        assert_eq!(first, second);
    }
}
