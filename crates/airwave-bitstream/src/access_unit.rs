//! Access-unit grouping for H.264 elementary streams.
//!
//! The transcoder emits a flat NAL unit sequence; the transport wants one
//! access unit (one displayable frame) per sample. Grouping follows slice
//! boundary detection: a non-VCL unit after a VCL unit ends a picture, and a
//! slice with `first_mb_in_slice == 0` starts a new one even when no non-VCL
//! delimiter separates multi-slice pictures.

use crate::exp_golomb::first_mb_in_slice;
use crate::nal::is_vcl;

/// One access unit: the ordered NAL units composing a single frame.
#[derive(Debug, Clone, Default)]
pub struct AccessUnit {
    pub nalus: Vec<Vec<u8>>,
}

impl AccessUnit {
    /// Whether the unit holds at least one VCL (slice) NAL.
    pub fn has_vcl(&self) -> bool {
        self.nalus.iter().any(|n| is_vcl(n))
    }

    /// Serialize to Annex-B, prefixing every NAL with a 4-byte start code.
    pub fn to_annex_b(&self) -> Vec<u8> {
        let total: usize = self.nalus.iter().map(|n| n.len() + 4).sum();
        let mut out = Vec::with_capacity(total);
        for nalu in &self.nalus {
            out.extend_from_slice(&[0, 0, 0, 1]);
            out.extend_from_slice(nalu);
        }
        out
    }
}

/// Group a flat NAL unit sequence into access units.
///
/// A new access unit begins when a non-VCL unit follows a VCL unit, or when a
/// VCL unit with `first_mb_in_slice == 0` arrives while the current unit has
/// already accumulated a VCL unit. Slices whose header cannot be parsed are
/// treated as continuing the current picture.
pub fn group_access_units(nalus: &[&[u8]]) -> Vec<AccessUnit> {
    let mut units = Vec::new();
    let mut current = AccessUnit::default();
    let mut current_has_vcl = false;

    for &nalu in nalus {
        if nalu.is_empty() {
            continue;
        }

        let vcl = is_vcl(nalu);
        let boundary = if vcl {
            current_has_vcl && first_mb_in_slice(nalu).map(|mb| mb == 0).unwrap_or(false)
        } else {
            current_has_vcl
        };

        if boundary && !current.nalus.is_empty() {
            units.push(std::mem::take(&mut current));
            current_has_vcl = false;
        }

        current.nalus.push(nalu.to_vec());
        current_has_vcl |= vcl;
    }

    if !current.nalus.is_empty() {
        units.push(current);
    }

    units
}

#[cfg(test)]
mod tests {
    use super::*;

    // Build a synthetic NAL unit of the given type whose slice header (for
    // VCL types) encodes the requested first_mb_in_slice via Exp-Golomb.
    fn nalu(nal_type: u8, first_mb_zero: bool) -> Vec<u8> {
        // 0x80 encodes ue(0); 0x40 encodes ue(1).
        let header_bits = if first_mb_zero { 0x80 } else { 0x40 };
        vec![nal_type & 0x1F, header_bits]
    }

    #[test]
    fn sps_pps_prefix_stays_with_first_slice() {
        let stream = vec![
            nalu(7, false), // SPS
            nalu(8, false), // PPS
            nalu(5, true),  // IDR slice, first_mb == 0
        ];
        let refs: Vec<&[u8]> = stream.iter().map(|v| v.as_slice()).collect();
        let units = group_access_units(&refs);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].nalus.len(), 3);
    }

    #[test]
    fn sei_boundary_and_multi_slice_pictures() {
        // SPS, PPS, IDR(mb=0), slice(mb!=0), slice(mb!=0), SEI, IDR(mb=0)
        let stream = vec![
            nalu(7, false),
            nalu(8, false),
            nalu(5, true),
            nalu(1, false),
            nalu(1, false),
            nalu(6, false),
            nalu(5, true),
        ];
        let refs: Vec<&[u8]> = stream.iter().map(|v| v.as_slice()).collect();
        let units = group_access_units(&refs);

        // The SEI after the slices closes the first picture; the second IDR
        // lands in the unit the SEI opened.
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].nalus.len(), 5);
        assert_eq!(units[1].nalus.len(), 2);
        assert!(units[0].has_vcl());
        assert!(units[1].has_vcl());
    }

    #[test]
    fn multi_slice_picture_split_on_first_mb_zero() {
        // Two pictures of two slices each, no delimiters between them.
        let stream = vec![
            nalu(1, true),
            nalu(1, false),
            nalu(1, true),
            nalu(1, false),
        ];
        let refs: Vec<&[u8]> = stream.iter().map(|v| v.as_slice()).collect();
        let units = group_access_units(&refs);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].nalus.len(), 2);
        assert_eq!(units[1].nalus.len(), 2);
    }

    #[test]
    fn annex_b_serialization_uses_four_byte_codes() {
        let au = AccessUnit {
            nalus: vec![vec![0x67, 0x64], vec![0x65, 0x88]],
        };
        assert_eq!(
            au.to_annex_b(),
            vec![0, 0, 0, 1, 0x67, 0x64, 0, 0, 0, 1, 0x65, 0x88]
        );
    }

    #[test]
    fn empty_input_yields_no_units() {
        assert!(group_access_units(&[]).is_empty());
    }
}
