//! Bit-level stream primitives
//!
//! Everything replicated about a ship is expressed with these calls: single
//! flags, fixed-width integers, ranged integers, unit floats and short strings.
//! Bits are packed MSB-first into bytes. The stream carries no tags, so the
//! reader must issue exactly the same sequence of calls as the writer.

use bitvec::prelude::*;

/// Protocol-level stream failures. Any of these is fatal to the connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BitStreamError {
    #[error("Stream truncated: needed {needed} bits, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("Ranged value {value} exceeds maximum {max}")]
    OutOfRange { value: u32, max: u32 },
    #[error("String payload is not valid UTF-8")]
    InvalidString,
}

/// Number of bits needed to express every value in `0..=range`
#[inline]
pub fn bits_for_range(range: u32) -> u32 {
    32 - range.leading_zeros()
}

/// Append-only bit writer
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bits: BitVec<u8, Msb0>,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bits: usize) -> Self {
        Self {
            bits: BitVec::with_capacity(bits),
        }
    }

    /// Write one bit and hand the value back, so it can gate the following fields
    #[inline]
    pub fn write_flag(&mut self, value: bool) -> bool {
        self.bits.push(value);
        value
    }

    /// Write the low `bit_count` bits of `value`, most significant first
    pub fn write_int(&mut self, value: u32, bit_count: u32) {
        debug_assert!(bit_count <= 32);
        for shift in (0..bit_count).rev() {
            self.bits.push((value >> shift) & 1 == 1);
        }
    }

    /// Write `value` in `min..=max` using only as many bits as the range needs.
    /// Values outside the range are clamped.
    pub fn write_ranged_u32(&mut self, value: u32, min: u32, max: u32) {
        debug_assert!(min <= max);
        let clamped = value.clamp(min, max);
        self.write_int(clamped - min, bits_for_range(max - min));
    }

    /// Write an enumeration value in `0..count`
    #[inline]
    pub fn write_enum(&mut self, value: u32, count: u32) {
        self.write_ranged_u32(value, 0, count.saturating_sub(1));
    }

    /// Write a float in `[0, 1]` with `bit_count` bits of precision
    pub fn write_float(&mut self, value: f32, bit_count: u32) {
        let max = (1u32 << bit_count) - 1;
        let quantized = (value.clamp(0.0, 1.0) * max as f32).round() as u32;
        self.write_int(quantized, bit_count);
    }

    /// Write a float in `[-1, 1]` with `bit_count` bits of precision
    #[inline]
    pub fn write_signed_float(&mut self, value: f32, bit_count: u32) {
        self.write_float((value.clamp(-1.0, 1.0) + 1.0) * 0.5, bit_count);
    }

    /// Write a full-precision f32
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.write_int(value.to_bits(), 32);
    }

    /// Write a string of up to 255 bytes (longer input is cut on a char boundary)
    pub fn write_string(&mut self, value: &str) {
        let mut end = value.len().min(u8::MAX as usize);
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        let bytes = &value.as_bytes()[..end];
        self.write_int(bytes.len() as u32, 8);
        for &byte in bytes {
            self.write_int(byte as u32, 8);
        }
    }

    #[inline]
    pub fn bit_len(&self) -> usize {
        self.bits.len()
    }

    /// Finish the stream, zero-padding the final byte
    pub fn into_bytes(self) -> Vec<u8> {
        self.bits.into_vec()
    }
}

/// Cursor over a received bit stream
pub struct BitReader<'a> {
    bits: &'a BitSlice<u8, Msb0>,
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bits: bytes.view_bits::<Msb0>(),
            pos: 0,
        }
    }

    #[inline]
    pub fn bits_remaining(&self) -> usize {
        self.bits.len() - self.pos
    }

    #[inline]
    fn ensure(&self, needed: usize) -> Result<(), BitStreamError> {
        let remaining = self.bits_remaining();
        if needed > remaining {
            Err(BitStreamError::Truncated { needed, remaining })
        } else {
            Ok(())
        }
    }

    pub fn read_flag(&mut self) -> Result<bool, BitStreamError> {
        self.ensure(1)?;
        let bit = self.bits[self.pos];
        self.pos += 1;
        Ok(bit)
    }

    pub fn read_int(&mut self, bit_count: u32) -> Result<u32, BitStreamError> {
        self.ensure(bit_count as usize)?;
        let mut value = 0u32;
        for bit in self.bits[self.pos..self.pos + bit_count as usize].iter().by_vals() {
            value = (value << 1) | bit as u32;
        }
        self.pos += bit_count as usize;
        Ok(value)
    }

    pub fn read_ranged_u32(&mut self, min: u32, max: u32) -> Result<u32, BitStreamError> {
        let range = max - min;
        let raw = self.read_int(bits_for_range(range))?;
        if raw > range {
            return Err(BitStreamError::OutOfRange { value: raw, max: range });
        }
        Ok(raw + min)
    }

    #[inline]
    pub fn read_enum(&mut self, count: u32) -> Result<u32, BitStreamError> {
        self.read_ranged_u32(0, count.saturating_sub(1))
    }

    pub fn read_float(&mut self, bit_count: u32) -> Result<f32, BitStreamError> {
        let max = (1u32 << bit_count) - 1;
        Ok(self.read_int(bit_count)? as f32 / max as f32)
    }

    #[inline]
    pub fn read_signed_float(&mut self, bit_count: u32) -> Result<f32, BitStreamError> {
        Ok(self.read_float(bit_count)? * 2.0 - 1.0)
    }

    #[inline]
    pub fn read_f32(&mut self) -> Result<f32, BitStreamError> {
        Ok(f32::from_bits(self.read_int(32)?))
    }

    pub fn read_string(&mut self) -> Result<String, BitStreamError> {
        let len = self.read_int(8)? as usize;
        let mut bytes = Vec::with_capacity(len);
        for _ in 0..len {
            bytes.push(self.read_int(8)? as u8);
        }
        String::from_utf8(bytes).map_err(|_| BitStreamError::InvalidString)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_for_range() {
        assert_eq!(bits_for_range(0), 0);
        assert_eq!(bits_for_range(1), 1);
        assert_eq!(bits_for_range(6), 3);
        assert_eq!(bits_for_range(1023), 10);
        assert_eq!(bits_for_range(1024), 11);
    }

    #[test]
    fn test_flag_gates_and_orders() {
        let mut w = BitWriter::new();
        assert!(w.write_flag(true));
        assert!(!w.write_flag(false));
        w.write_int(0b101, 3);
        assert_eq!(w.bit_len(), 5);

        let bytes = w.into_bytes();
        assert_eq!(bytes, vec![0b1010_1000]);

        let mut r = BitReader::new(&bytes);
        assert!(r.read_flag().unwrap());
        assert!(!r.read_flag().unwrap());
        assert_eq!(r.read_int(3).unwrap(), 0b101);
    }

    #[test]
    fn test_ranged_values_use_minimal_width() {
        let mut w = BitWriter::new();
        w.write_ranged_u32(1023, 0, 1023);
        assert_eq!(w.bit_len(), 10);
        w.write_ranged_u32(7, 5, 10);
        assert_eq!(w.bit_len(), 13);
        // Clamped on write
        w.write_ranged_u32(50, 0, 6);

        let bytes = w.into_bytes();
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_ranged_u32(0, 1023).unwrap(), 1023);
        assert_eq!(r.read_ranged_u32(5, 10).unwrap(), 7);
        assert_eq!(r.read_ranged_u32(0, 6).unwrap(), 6);
    }

    #[test]
    fn test_ranged_read_rejects_garbage() {
        // 3 bits of ones = 7, but the range only goes to 5
        let bytes = [0b1110_0000];
        let mut r = BitReader::new(&bytes);
        assert_eq!(
            r.read_ranged_u32(0, 5),
            Err(BitStreamError::OutOfRange { value: 7, max: 5 })
        );
    }

    #[test]
    fn test_unit_float_precision() {
        let mut w = BitWriter::new();
        w.write_float(0.7, 6);
        w.write_signed_float(-0.25, 8);
        let bytes = w.into_bytes();

        let mut r = BitReader::new(&bytes);
        assert!((r.read_float(6).unwrap() - 0.7).abs() <= 0.5 / 63.0 + 1e-6);
        assert!((r.read_signed_float(8).unwrap() + 0.25).abs() <= 1.0 / 255.0 + 1e-6);
    }

    #[test]
    fn test_raw_f32_and_string() {
        let mut w = BitWriter::new();
        w.write_f32(-1234.5678);
        w.write_string("Ripley");
        let bytes = w.into_bytes();

        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_f32().unwrap(), -1234.5678);
        assert_eq!(r.read_string().unwrap(), "Ripley");
    }

    #[test]
    fn test_truncated_stream_is_an_error() {
        let bytes = [0xFF];
        let mut r = BitReader::new(&bytes);
        assert!(r.read_int(6).is_ok());
        assert_eq!(
            r.read_int(4),
            Err(BitStreamError::Truncated { needed: 4, remaining: 2 })
        );
    }
}
