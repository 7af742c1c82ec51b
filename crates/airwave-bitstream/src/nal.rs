//! H.264 Annex-B NAL unit splitting.

/// H.264 NAL unit types relevant to playout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NalUnitType {
    /// Coded slice of a non-IDR picture
    Slice = 1,
    /// Coded slice data partition A
    SliceDpa = 2,
    /// Coded slice data partition B
    SliceDpb = 3,
    /// Coded slice data partition C
    SliceDpc = 4,
    /// Coded slice of an IDR picture
    IdrSlice = 5,
    /// Supplemental enhancement information
    Sei = 6,
    /// Sequence Parameter Set
    Sps = 7,
    /// Picture Parameter Set
    Pps = 8,
    /// Access Unit Delimiter
    Aud = 9,
    /// Unknown/other
    Unknown(u8),
}

impl From<u8> for NalUnitType {
    fn from(value: u8) -> Self {
        match value {
            1 => NalUnitType::Slice,
            2 => NalUnitType::SliceDpa,
            3 => NalUnitType::SliceDpb,
            4 => NalUnitType::SliceDpc,
            5 => NalUnitType::IdrSlice,
            6 => NalUnitType::Sei,
            7 => NalUnitType::Sps,
            8 => NalUnitType::Pps,
            9 => NalUnitType::Aud,
            v => NalUnitType::Unknown(v),
        }
    }
}

/// Read the NAL unit type from the 1-byte H.264 NAL header.
///
/// Returns `None` for an empty unit.
pub fn nal_type(nalu: &[u8]) -> Option<NalUnitType> {
    nalu.first().map(|b| NalUnitType::from(b & 0x1F))
}

/// Whether a NAL unit is a VCL (slice) unit. Types 1–5 carry picture data.
pub fn is_vcl(nalu: &[u8]) -> bool {
    matches!(nalu.first().map(|b| b & 0x1F), Some(1..=5))
}

/// Split an Annex-B byte stream into raw NAL units.
///
/// Handles both 3-byte (`00 00 01`) and 4-byte (`00 00 00 01`) start codes.
/// Each returned slice includes the 1-byte NAL header. Empty input yields an
/// empty vector; a trailing partial unit after the last start code is still
/// returned.
pub fn split_nalus(data: &[u8]) -> Vec<&[u8]> {
    // Payload start offsets, paired with the offset of their start code.
    let mut nal_starts: Vec<(usize, usize)> = Vec::new();
    let mut i = 0;

    while i + 2 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 {
            if data[i + 2] == 1 {
                // 3-byte start code
                nal_starts.push((i + 3, i));
                i += 3;
                continue;
            } else if i + 3 < data.len() && data[i + 2] == 0 && data[i + 3] == 1 {
                // 4-byte start code
                nal_starts.push((i + 4, i));
                i += 4;
                continue;
            }
        }
        i += 1;
    }

    let mut units = Vec::with_capacity(nal_starts.len());
    for (idx, &(start, _)) in nal_starts.iter().enumerate() {
        let end = if idx + 1 < nal_starts.len() {
            nal_starts[idx + 1].1
        } else {
            data.len()
        };
        if start < end {
            units.push(&data[start..end]);
        }
    }

    units
}

/// Remove emulation prevention bytes (0x03) from a NAL unit payload.
///
/// In H.264, the byte sequence `00 00 03` prevents start code emulation
/// inside RBSP data. This function removes the 0x03 bytes.
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        if i + 2 < data.len() && data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 3 {
            result.push(0);
            result.push(0);
            i += 3; // Skip the 0x03
        } else {
            result.push(data[i]);
            i += 1;
        }
    }

    result
}
