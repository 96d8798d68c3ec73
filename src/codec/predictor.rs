// Adaptive value predictor.
//
// Each tile runs three independent predictors, one per sample context:
//
//   Standard        : regular samples (upper and left neighbor deltas differ)
//   PlateauZero     : the sample right after a plateau, where dDiff == 0
//   PlateauNonZero  : the sample right after a plateau, where dDiff != 0
//
// A predictor keeps running statistics of the values it has coded. Before a
// value is written the statistics of all *previous* values select the form:
// hybrid with unit `hunit` when `hunit > 0`, otherwise a pure unary length
// code of the zigzag-folded, wrap-mapped value. Values whose code would reach
// the zero-bit limit go out in escape form instead.

use crate::bits::writer::hybrid_parts;
use crate::bits::{BitReader, BitWriter};
use crate::error::{DemError, Result};

use super::tables::{max_length_zero_bits, normalize_hunit, start_hunit, unit_delta};

/// Sample context a predictor is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalcType {
    Standard,
    PlateauZero,
    PlateauNonZero,
}

/// Bit form chosen for the next value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncType {
    Hybrid,
    Length,
}

/// Value mapping applied before a length-mode code is folded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapType {
    /// `d`
    Wrap0,
    /// `1 - d`
    Wrap1,
    /// `-d`
    Wrap2,
}

impl WrapType {
    /// The mapping is an involution, so this also undoes it.
    #[inline]
    fn apply(self, d: i32) -> i32 {
        match self {
            Self::Wrap0 => d,
            Self::Wrap1 => 1 - d,
            Self::Wrap2 => -d,
        }
    }
}

/// Five-branch estimator driving `SumL` of the standard predictor.
///
/// `s` is the running sum, `k` the element count and `d` the new value.
pub fn eval_sum_spec(s: i32, k: i32, d: i32) -> i32 {
    if d < -2 - ((s + 3 * k) >> 1) {
        -1 - s - k
    } else if d < -((s + k) >> 1) {
        2 * (d + k) + 3
    } else if d < 2 - ((s - k) >> 1) {
        2 * d - 1
    } else if d < 4 - ((s - 3 * k) >> 1) {
        2 * (d - k) - 5
    } else {
        1 - s + k
    }
}

/// Parity nudge applied to the 64th value of the standard predictor, just
/// before its statistics are halved.
fn last_sample_nudge(sum_l: i32, value: i32) -> i32 {
    if sum_l > 0 {
        let aligned = (sum_l + 1) % 4 == 0;
        if aligned == (value % 2 != 0) { value - 1 } else { value }
    } else {
        let aligned = (sum_l - 1) % 4 == 0;
        if aligned == (value % 2 != 0) { value + 1 } else { value }
    }
}

/// Fold a signed value onto the unary code space: 1, -1, 2, -2... map to
/// 1, 2, 3, 4... and 0 maps to 0.
#[inline]
fn fold(d: i32) -> u32 {
    if d > 0 {
        d.unsigned_abs() * 2 - 1
    } else {
        d.unsigned_abs() * 2
    }
}

#[inline]
fn unfold(n: u32) -> i32 {
    if n % 2 == 1 {
        n.div_ceil(2) as i32
    } else {
        -((n / 2) as i32)
    }
}

/// Statistics and mode selection of one predictor.
#[derive(Debug, Clone)]
pub struct Predictor {
    calc: CalcType,
    enc: EncType,
    wrap: WrapType,
    sum_h: i32,
    sum_l: i32,
    elem_count: i32,
    hunit: i32,
    unit_delta: i32,
    /// Zero bits that flag the escape form.
    max_zero_bits: u32,
    /// Width of the escape magnitude.
    escape_bits: u32,
    /// Largest magnitude a wrapped value can have.
    max_magnitude: u32,
}

impl Predictor {
    /// A fresh predictor for a tile with the given difference height.
    pub fn new(calc: CalcType, difference_height: i32) -> Self {
        let limit = max_length_zero_bits(difference_height);
        Self {
            calc,
            enc: EncType::Hybrid,
            wrap: WrapType::Wrap0,
            sum_h: 0,
            sum_l: 0,
            elem_count: 0,
            hunit: start_hunit(difference_height),
            unit_delta: unit_delta(difference_height),
            max_zero_bits: match calc {
                CalcType::Standard => limit,
                CalcType::PlateauZero | CalcType::PlateauNonZero => limit - 1,
            },
            escape_bits: limit - 1,
            max_magnitude: difference_height.unsigned_abs() / 2 + 1,
        }
    }

    pub fn calc_type(&self) -> CalcType {
        self.calc
    }

    pub fn enc_type(&self) -> EncType {
        self.enc
    }

    pub fn wrap_type(&self) -> WrapType {
        self.wrap
    }

    pub fn hunit(&self) -> i32 {
        self.hunit
    }

    pub fn elem_count(&self) -> i32 {
        self.elem_count
    }

    // -----------------------------------------------------------------------
    // Coding
    // -----------------------------------------------------------------------

    /// Write `value` with the current mode, then update the statistics.
    ///
    /// `d_diff` is the difference between the upper and the left neighbor
    /// delta at the sample's position.
    pub fn encode(&mut self, out: &mut BitWriter, value: i32, d_diff: i32) -> Result<()> {
        let (enc, wrap, hunit) = (self.enc, self.wrap, self.hunit);
        let d = wrap.apply(self.update(value, d_diff));
        match enc {
            EncType::Hybrid => {
                let (length, _) = hybrid_parts(d, hunit as u32)?;
                if length < self.max_zero_bits {
                    out.write_hybrid(d, hunit as u32, self.max_zero_bits)
                } else {
                    out.write_escape(d, self.max_zero_bits, self.escape_bits)
                }
            }
            EncType::Length => {
                let n = fold(d);
                if n < self.max_zero_bits {
                    out.write_unary(n);
                    Ok(())
                } else {
                    out.write_escape(d, self.max_zero_bits, self.escape_bits)
                }
            }
        }
    }

    /// Read one value written by [`encode`](Self::encode) in the same state.
    pub fn decode(&mut self, input: &mut BitReader<'_>, d_diff: i32) -> Result<i32> {
        let zeros = input.read_unary(self.max_zero_bits)?;
        let d = if zeros == self.max_zero_bits {
            let magnitude = input.read_binary(self.escape_bits)? as i64 + 1;
            if input.read_bit()? { -magnitude } else { magnitude }
        } else {
            match self.enc {
                EncType::Hybrid => {
                    let hunit = self.hunit as u32;
                    let binary = input.read_binary(hunit.trailing_zeros())? as i64;
                    let magnitude = i64::from(zeros) * i64::from(hunit) + binary;
                    if input.read_bit()? { magnitude + 1 } else { -magnitude }
                }
                EncType::Length => i64::from(unfold(zeros)),
            }
        };
        let d = i32::try_from(d)
            .map_err(|_| DemError::InvalidInput(format!("decoded value {d} out of range")))?;
        let d = self.wrap.apply(d);
        let value = match self.calc {
            CalcType::Standard => d,
            CalcType::PlateauZero => {
                if d <= 0 {
                    d - 1
                } else {
                    d
                }
            }
            CalcType::PlateauNonZero => {
                if d_diff > 0 {
                    -d
                } else {
                    d
                }
            }
        };
        if value.unsigned_abs() > self.max_magnitude {
            return Err(DemError::InvalidInput(format!(
                "decoded value {value} outside the tile's height range"
            )));
        }
        self.update(value, d_diff);
        Ok(value)
    }

    // -----------------------------------------------------------------------
    // Statistics
    // -----------------------------------------------------------------------

    /// Feed one sample value into the statistics and return the value the
    /// stream carries for it.
    fn update(&mut self, value: i32, d_diff: i32) -> i32 {
        match self.calc {
            CalcType::Standard => self.update_standard(value),
            CalcType::PlateauZero => self.update_plateau_zero(value),
            CalcType::PlateauNonZero => self.update_plateau_non_zero(value, d_diff),
        }
    }

    fn update_standard(&mut self, value: i32) -> i32 {
        self.sum_h += value.abs();

        let work = if self.elem_count == 63 {
            last_sample_nudge(self.sum_l, value)
        } else {
            value
        };
        self.sum_l += eval_sum_spec(self.sum_l, self.elem_count, work);
        self.elem_count += 1;

        if self.elem_count == 64 {
            self.halve();
            if self.sum_l % 2 != 0 {
                self.sum_l += 1;
            }
        }

        self.hunit = normalize_hunit((self.unit_delta + self.sum_h + 1) / (self.elem_count + 1));
        self.select(|sum_l| (sum_l > 0).then_some(WrapType::Wrap1));
        value
    }

    fn update_plateau_zero(&mut self, value: i32) -> i32 {
        self.sum_h += if value > 0 { value } else { 1 - value };
        self.sum_l += if value <= 0 { -1 } else { 1 };
        self.elem_count += 1;

        if self.elem_count == 64 {
            self.halve();
            if self.sum_l % 2 != 0 {
                self.sum_l += 1;
            }
        }

        self.hunit = normalize_hunit(
            (self.unit_delta + self.sum_h + 1 - self.elem_count / 2) / (self.elem_count + 1),
        );
        self.select(|sum_l| (sum_l >= 0).then_some(WrapType::Wrap1));
        if value < 0 { value + 1 } else { value }
    }

    fn update_plateau_non_zero(&mut self, value: i32, d_diff: i32) -> i32 {
        self.sum_h += value.abs();
        self.sum_l += if value <= 0 { -1 } else { 1 };
        self.elem_count += 1;

        if self.elem_count == 64 {
            self.halve();
            if self.sum_l % 2 != 0 {
                self.sum_l -= 1;
            }
        }

        self.hunit = normalize_hunit((self.unit_delta + self.sum_h + 1) / (self.elem_count + 1));
        self.select(|sum_l| (sum_l <= 0).then_some(WrapType::Wrap2));
        if d_diff > 0 { -value } else { value }
    }

    fn halve(&mut self) {
        self.elem_count = 32;
        self.sum_h = ((self.sum_h - self.unit_delta) >> 1) - 1;
        self.sum_l /= 2;
    }

    /// Pick the form of the next value from the fresh `hunit`.
    fn select(&mut self, length_wrap: impl Fn(i32) -> Option<WrapType>) {
        if self.hunit > 0 {
            self.enc = EncType::Hybrid;
            self.wrap = WrapType::Wrap0;
        } else {
            self.enc = EncType::Length;
            self.wrap = length_wrap(self.sum_l).unwrap_or(WrapType::Wrap0);
        }
    }
}
