//! Ogg/Opus packet extraction.
//!
//! Walks Ogg pages, stitches lacing segments into packets, drops the
//! `OpusHead`/`OpusTags` header packets, and derives per-packet durations
//! from granule position deltas.

use crate::error::{Error, Result};

/// Opus always runs at a 48 kHz granule clock.
pub const OPUS_SAMPLE_RATE: u32 = 48_000;

/// Fallback frame duration: 20 ms at 48 kHz.
pub const DEFAULT_FRAME_SAMPLES: u32 = 960;

// Sane Opus frame durations are 2.5-60 ms; we clamp the granule-delta
// heuristic to 2-60 ms.
const MIN_FRAME_SAMPLES: u64 = 96;
const MAX_FRAME_SAMPLES: u64 = 2_880;

const PAGE_HEADER_LEN: usize = 27;
const CAPTURE_PATTERN: &[u8; 4] = b"OggS";

/// One extracted Opus packet with its timing.
#[derive(Debug, Clone)]
pub struct OpusPacket {
    /// Raw Opus packet payload.
    pub data: Vec<u8>,
    /// Granule position of the page the packet ended on.
    pub granule: u64,
    /// Packet duration in 48 kHz samples.
    pub duration_samples: u32,
}

impl OpusPacket {
    /// Packet duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        f64::from(self.duration_samples) / f64::from(OPUS_SAMPLE_RATE)
    }
}

/// Extract Opus packets from an Ogg-encapsulated byte stream.
///
/// Header packets (`OpusHead`, `OpusTags`) are skipped. Packets continued
/// across pages are stitched; a packet left unterminated at end of stream is
/// dropped. The granule delta of each page is divided across the packets
/// completing on it (the last one takes the remainder), falling back to
/// 20 ms per packet when the delta is non-positive or the share is outside
/// the sane 2-60 ms range.
pub fn packets(data: &[u8]) -> Result<Vec<OpusPacket>> {
    let mut out: Vec<OpusPacket> = Vec::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut prev_granule = 0u64;
    let mut pos = 0;

    while pos < data.len() {
        if pos + PAGE_HEADER_LEN > data.len() {
            return Err(Error::malformed("truncated Ogg page header"));
        }
        if &data[pos..pos + 4] != CAPTURE_PATTERN {
            return Err(Error::malformed("missing OggS capture pattern"));
        }

        let header_type = data[pos + 5];
        let granule = u64::from_le_bytes(
            data[pos + 6..pos + 14]
                .try_into()
                .map_err(|_| Error::malformed("short granule field"))?,
        );
        let n_segments = data[pos + 26] as usize;

        let lacing_start = pos + PAGE_HEADER_LEN;
        let body_start = lacing_start + n_segments;
        if body_start > data.len() {
            return Err(Error::malformed("truncated Ogg lacing table"));
        }

        // A fresh page that is not a continuation discards any half-built
        // packet from a damaged predecessor.
        if header_type & 0x01 == 0 && !pending.is_empty() {
            pending.clear();
        }

        let mut completed: Vec<Vec<u8>> = Vec::new();
        let mut body_pos = body_start;
        for seg in 0..n_segments {
            let lacing = data[lacing_start + seg] as usize;
            if body_pos + lacing > data.len() {
                return Err(Error::malformed("truncated Ogg page body"));
            }
            pending.extend_from_slice(&data[body_pos..body_pos + lacing]);
            body_pos += lacing;

            if lacing < 255 {
                completed.push(std::mem::take(&mut pending));
            }
        }
        pos = body_pos;

        if completed.is_empty() {
            continue;
        }

        // The page granule covers every packet completing on it; split the
        // delta evenly. Encoders batch many equal-length frames per page, so
        // the even split is the real per-frame duration. A granule of -1
        // marks a page where no packet should end; treated as invalid.
        let count = completed.len() as u64;
        let per = if granule != u64::MAX && granule > prev_granule {
            let share = (granule - prev_granule) / count;
            (MIN_FRAME_SAMPLES..=MAX_FRAME_SAMPLES)
                .contains(&share)
                .then_some(share)
        } else {
            None
        };
        let last_share = per.map(|p| granule - prev_granule - p * (count - 1));
        if granule != u64::MAX {
            prev_granule = granule;
        }

        let last = completed.len() - 1;
        for (i, payload) in completed.into_iter().enumerate() {
            if payload.starts_with(b"OpusHead") || payload.starts_with(b"OpusTags") {
                continue;
            }
            // Remainder lands on the page's last packet so granule totals
            // stay exact.
            let share = if i == last { last_share } else { per };
            out.push(OpusPacket {
                data: payload,
                granule,
                duration_samples: share
                    .map(|s| s as u32)
                    .unwrap_or(DEFAULT_FRAME_SAMPLES),
            });
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Build a minimal Ogg page. Each payload entry becomes one packet on the
    // page (must be < 255 bytes).
    fn page(header_type: u8, granule: u64, payloads: &[&[u8]]) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(b"OggS");
        p.push(0); // version
        p.push(header_type);
        p.extend_from_slice(&granule.to_le_bytes());
        p.extend_from_slice(&1u32.to_le_bytes()); // serial
        p.extend_from_slice(&0u32.to_le_bytes()); // sequence
        p.extend_from_slice(&0u32.to_le_bytes()); // crc (unchecked)
        p.push(payloads.len() as u8);
        for payload in payloads {
            assert!(payload.len() < 255);
            p.push(payload.len() as u8);
        }
        for payload in payloads {
            p.extend_from_slice(payload);
        }
        p
    }

    fn opus_stream(payload_pages: &[(u64, &[u8])]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(page(0x02, 0, &[b"OpusHead\x01\x02"]));
        data.extend(page(0x00, 0, &[b"OpusTagsXYZ"]));
        for &(granule, payload) in payload_pages {
            data.extend(page(0x00, granule, &[payload]));
        }
        data
    }

    #[test]
    fn header_pages_are_skipped() {
        let data = opus_stream(&[(960, b"aa"), (1920, b"bb"), (2880, b"cc")]);
        let pkts = packets(&data).unwrap();
        assert_eq!(pkts.len(), 3);
        assert_eq!(pkts[0].data, b"aa");
        assert_eq!(pkts[2].data, b"cc");
    }

    #[test]
    fn durations_from_granule_deltas() {
        let data = opus_stream(&[(960, b"aa"), (1920, b"bb"), (3840, b"cc")]);
        let pkts = packets(&data).unwrap();
        assert_eq!(pkts[0].duration_samples, 960);
        assert_eq!(pkts[1].duration_samples, 960);
        assert_eq!(pkts[2].duration_samples, 1920);
    }

    #[test]
    fn bad_deltas_fall_back_to_twenty_ms() {
        // Repeated granule (delta 0) and a wild jump both fall back.
        let data = opus_stream(&[(960, b"aa"), (960, b"bb"), (960_000, b"cc")]);
        let pkts = packets(&data).unwrap();
        assert_eq!(pkts[1].duration_samples, DEFAULT_FRAME_SAMPLES);
        assert_eq!(pkts[2].duration_samples, DEFAULT_FRAME_SAMPLES);
    }

    #[test]
    fn page_delta_is_distributed_across_its_packets() {
        // Encoders batch packets per page: four 20 ms frames on one page,
        // then two 10 ms frames on the next.
        let mut data = opus_stream(&[]);
        data.extend(page(0x00, 4 * 960, &[b"a", b"b", b"c", b"d"]));
        data.extend(page(0x00, 4 * 960 + 2 * 480, &[b"e", b"f"]));

        let pkts = packets(&data).unwrap();
        assert_eq!(pkts.len(), 6);
        assert!(pkts[..4].iter().all(|p| p.duration_samples == 960));
        assert_eq!(pkts[4].duration_samples, 480);
        assert_eq!(pkts[5].duration_samples, 480);
    }

    #[test]
    fn distribution_remainder_lands_on_the_last_packet() {
        let mut data = opus_stream(&[]);
        data.extend(page(0x00, 1921, &[b"a", b"b"]));

        let pkts = packets(&data).unwrap();
        assert_eq!(pkts[0].duration_samples, 960);
        assert_eq!(pkts[1].duration_samples, 961);
    }

    #[test]
    fn empty_input_yields_no_packets() {
        assert!(packets(&[]).unwrap().is_empty());
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(packets(b"not an ogg stream at all....").is_err());
    }

    #[test]
    fn packet_spanning_pages_is_stitched() {
        // One packet of 300 bytes: lacing 255 on the first page, 45 on the
        // continuation page.
        let chunk_a = vec![0xAB; 255];
        let chunk_b = vec![0xCD; 45];

        let mut first = Vec::new();
        first.extend_from_slice(b"OggS");
        first.push(0);
        first.push(0x00);
        first.extend_from_slice(&u64::MAX.to_le_bytes()); // -1: no packet ends here
        first.extend_from_slice(&1u32.to_le_bytes());
        first.extend_from_slice(&0u32.to_le_bytes());
        first.extend_from_slice(&0u32.to_le_bytes());
        first.push(1);
        first.push(255);
        first.extend_from_slice(&chunk_a);

        let second = page(0x01, 960, &[&chunk_b]);

        let mut data = opus_stream(&[]);
        data.extend(first);
        data.extend(second);

        let pkts = packets(&data).unwrap();
        assert_eq!(pkts.len(), 1);
        assert_eq!(pkts[0].data.len(), 300);
        assert_eq!(pkts[0].granule, 960);
    }
}
