// MSB-first bit sink and the value primitives of the DEM bitstream.
//
// Primitive layouts (all MSB-first):
//   binary(v, n)  : exactly n bits of v
//   unary(v)      : v zero bits, then a terminating one bit
//   hybrid(v, u)  : unary(length part), binary(binary part, log2 u), sign bit
//   escape(v)     : unary(limit), binary(|v| - 1, width), sign bit
//
// A trailing partial byte is padded with zero bits by `finish()`.

use crate::error::{DemError, Result};

/// Widest binary field a single `write_binary` call accepts.
pub const MAX_BINARY_BITS: u32 = 64;

/// Append-only bit sink, packing bits MSB-first into bytes.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    cur: u8,
    /// Bits already placed in `cur` (0..=7).
    used: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with room for `bytes` flushed bytes.
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(bytes),
            cur: 0,
            used: 0,
        }
    }

    /// Append one bit. Every eighth bit flushes a byte into the buffer.
    #[inline]
    pub fn append_bit(&mut self, bit: bool) {
        if bit {
            self.cur |= 1 << (7 - self.used);
        }
        self.used += 1;
        if self.used == 8 {
            self.buf.push(self.cur);
            self.cur = 0;
            self.used = 0;
        }
    }

    /// Total number of bits appended so far.
    pub fn bit_len(&self) -> usize {
        self.buf.len() * 8 + self.used as usize
    }

    /// True if no bit was appended.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty() && self.used == 0
    }

    /// Consume the writer and return the packed bytes.
    ///
    /// 1..=7 leftover bits are padded with zero bits to a full byte, so the
    /// result always holds `ceil(bit_len / 8)` bytes.
    pub fn finish(mut self) -> Vec<u8> {
        if self.used > 0 {
            self.buf.push(self.cur);
        }
        self.buf
    }

    // -----------------------------------------------------------------------
    // Value primitives
    // -----------------------------------------------------------------------

    /// Write `value` as an unsigned binary number of exactly `num_bits` bits.
    ///
    /// Fails with [`DemError::EncodingOverflow`] if `value >= 2^num_bits`,
    /// which includes any non-zero value with `num_bits == 0`.
    pub fn write_binary(&mut self, value: u64, num_bits: u32) -> Result<()> {
        if num_bits > MAX_BINARY_BITS {
            return Err(DemError::InvalidInput(format!(
                "binary field of {num_bits} bits exceeds {MAX_BINARY_BITS}"
            )));
        }
        if num_bits < MAX_BINARY_BITS && value >> num_bits != 0 {
            return Err(DemError::EncodingOverflow {
                value,
                bits: num_bits,
            });
        }
        for i in (0..num_bits).rev() {
            self.append_bit((value >> i) & 1 != 0);
        }
        Ok(())
    }

    /// Write `value` zero bits followed by a terminating one bit.
    pub fn write_unary(&mut self, value: u32) {
        for _ in 0..value {
            self.append_bit(false);
        }
        self.append_bit(true);
    }

    /// Write a signed value in hybrid form.
    ///
    /// The magnitude (`value - 1` for positive values, `-value` otherwise) is
    /// split into a length part and a binary part with base `hunit`, which
    /// must be a power of two. Emission order is fixed: unary length part,
    /// binary part in `log2(hunit)` bits, sign bit (1 = positive).
    ///
    /// Fails with [`DemError::LengthOverflow`] when the length part exceeds
    /// `max_length`.
    pub fn write_hybrid(&mut self, value: i32, hunit: u32, max_length: u32) -> Result<()> {
        let (length, binary) = hybrid_parts(value, hunit)?;
        if length > max_length {
            return Err(DemError::LengthOverflow {
                length,
                limit: max_length,
            });
        }
        self.write_unary(length);
        self.write_binary(u64::from(binary), hunit.trailing_zeros())?;
        self.append_bit(value > 0);
        Ok(())
    }

    /// Write a non-zero signed value in escape ("big binary") form.
    ///
    /// `zero_bits` zero bits plus a one bit flag the escape; they are followed
    /// by `|value| - 1` in `magnitude_bits` bits and a sign bit (1 = negative).
    pub fn write_escape(&mut self, value: i32, zero_bits: u32, magnitude_bits: u32) -> Result<()> {
        if value == 0 {
            return Err(DemError::InvalidInput(
                "escape form cannot carry a zero value".into(),
            ));
        }
        self.write_unary(zero_bits);
        self.write_binary(u64::from(value.unsigned_abs() - 1), magnitude_bits)?;
        self.append_bit(value < 0);
        Ok(())
    }
}

/// Split a signed value into `(length part, binary part)` for base `hunit`.
pub fn hybrid_parts(value: i32, hunit: u32) -> Result<(u32, u32)> {
    if !hunit.is_power_of_two() {
        return Err(DemError::InvalidInput(format!(
            "hybrid unit {hunit} is not a positive power of two"
        )));
    }
    let magnitude = if value > 0 {
        value.unsigned_abs() - 1
    } else {
        value.unsigned_abs()
    };
    Ok((magnitude / hunit, magnitude % hunit))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
