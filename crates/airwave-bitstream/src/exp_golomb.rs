//! Exp-Golomb bit reading for H.264 slice headers.

use crate::error::{Error, Result};
use crate::nal::remove_emulation_prevention;

/// MSB-first bit reader over a byte slice.
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// Read n bits (up to 32).
    pub fn read_bits(&mut self, n: u8) -> Result<u32> {
        let mut result = 0u32;

        for _ in 0..n {
            if self.byte_pos >= self.data.len() {
                return Err(Error::malformed("bit stream exhausted"));
            }

            let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
            result = (result << 1) | (bit as u32);

            self.bit_pos += 1;
            if self.bit_pos == 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
        }

        Ok(result)
    }

    /// Read one unsigned Exp-Golomb coded value.
    pub fn read_ue(&mut self) -> Result<u32> {
        // Count leading zeros up to the terminating 1 bit.
        let mut leading_zeros = 0u8;
        loop {
            let bit = self.read_bits(1)?;
            if bit == 1 {
                break;
            }
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(Error::malformed("Exp-Golomb prefix too long"));
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        let suffix = self.read_bits(leading_zeros)?;
        Ok((1 << leading_zeros) - 1 + suffix)
    }
}

/// Read `first_mb_in_slice` from a slice NAL unit.
///
/// Strips emulation prevention from the unit, skips the 1-byte NAL header,
/// and reads the first Exp-Golomb value of the slice header.
///
/// # Errors
///
/// Returns [`Error::Malformed`] if the unit holds fewer than 2 bytes or the
/// bit stream ends before a terminating 1 bit is found.
pub fn first_mb_in_slice(nalu: &[u8]) -> Result<u32> {
    if nalu.len() < 2 {
        return Err(Error::malformed("slice NAL unit shorter than 2 bytes"));
    }

    let rbsp = remove_emulation_prevention(nalu);
    let mut reader = BitReader::new(&rbsp[1..]);
    reader.read_ue()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ue_zero() {
        // Header byte, then bits 1... -> ue(v) == 0
        assert_eq!(first_mb_in_slice(&[0x41, 0x80]).unwrap(), 0);
    }

    #[test]
    fn ue_five() {
        // ue(5): 2 leading zeros, terminator, suffix 10 -> 00110...
        // 0b0011_0000 = 0x30
        assert_eq!(first_mb_in_slice(&[0x41, 0x30]).unwrap(), 5);
    }

    #[test]
    fn too_short_is_malformed() {
        assert!(first_mb_in_slice(&[0x41]).is_err());
        assert!(first_mb_in_slice(&[]).is_err());
    }

    #[test]
    fn all_zero_bits_is_malformed() {
        assert!(first_mb_in_slice(&[0x41, 0x00]).is_err());
    }

    #[test]
    fn emulation_prevention_is_stripped_before_reading() {
        // 00 00 03 collapses to 00 00; the reader must consume the
        // de-escaped form. 0x80 after the escape terminates ue at a
        // large-but-valid value rather than erroring on the 0x03.
        let nalu = [0x41, 0x00, 0x00, 0x03, 0x80, 0x00, 0x00];
        // De-escaped payload: 00 00 80 00 00 -> 16 leading zeros, then the
        // terminating 1 bit, then a 16-bit zero suffix.
        let value = first_mb_in_slice(&nalu).unwrap();
        assert_eq!(value, (1 << 16) - 1);
    }
}
