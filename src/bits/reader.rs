// MSB-first bit source mirroring `BitWriter`.
//
// Zero padding after the last meaningful bit is indistinguishable from data,
// so the tile decoder stops by sample count, never by running out of bits.

use crate::error::{DemError, Result};

use super::writer::MAX_BINARY_BITS;

/// Reads bits MSB-first from a byte slice.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Index of the next bit to read.
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Number of bits consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bits left, padding included.
    pub fn remaining(&self) -> usize {
        self.data.len() * 8 - self.pos
    }

    #[inline]
    pub fn read_bit(&mut self) -> Result<bool> {
        let byte = *self
            .data
            .get(self.pos / 8)
            .ok_or(DemError::Truncated("tile bitstream"))?;
        let bit = byte & (0x80 >> (self.pos % 8)) != 0;
        self.pos += 1;
        Ok(bit)
    }

    /// Read an unsigned binary number of exactly `num_bits` bits.
    pub fn read_binary(&mut self, num_bits: u32) -> Result<u64> {
        if num_bits > MAX_BINARY_BITS {
            return Err(DemError::InvalidInput(format!(
                "binary field of {num_bits} bits exceeds {MAX_BINARY_BITS}"
            )));
        }
        let mut value = 0u64;
        for _ in 0..num_bits {
            value = (value << 1) | u64::from(self.read_bit()?);
        }
        Ok(value)
    }

    /// Count zero bits up to the terminating one bit.
    ///
    /// A run longer than `max_zeros` cannot come from the encoder and is
    /// reported as invalid input instead of being scanned to the end.
    pub fn read_unary(&mut self, max_zeros: u32) -> Result<u32> {
        let mut count = 0u32;
        while !self.read_bit()? {
            count += 1;
            if count > max_zeros {
                return Err(DemError::InvalidInput(format!(
                    "unary run longer than {max_zeros} zero bits at bit {}",
                    self.pos
                )));
            }
        }
        Ok(count)
    }
}
