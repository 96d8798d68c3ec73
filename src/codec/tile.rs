// Tile encoder: one independent compression unit.
//
// Encoding is eager. `Tile::encode` derives the base and difference heights,
// turns samples into deltas against the base and scans them row by row. Each
// position either starts a plateau (upper and left neighbor deltas agree), is
// the follower right after a plateau, or is a standard sample. The result is
// immutable.

use log::trace;

use crate::bits::BitWriter;
use crate::error::{DemError, Result};

use super::matrix::{ElevationMatrix, UNDEFINED_HEIGHT};
use super::plateau::PlateauCoder;
use super::predictor::{CalcType, Predictor};

/// Largest difference height a tile header can carry (two bytes).
pub const MAX_DIFFERENCE_HEIGHT: i32 = 0xFFFF;

/// Meaning of the highest encodable height of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingType {
    /// Every height is a real elevation.
    #[default]
    Normal,
    /// `base + difference` stands for "undefined".
    HighestIsUndefined,
}

impl EncodingType {
    /// Byte stored in the tile header when the section carries the extra
    /// field.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::HighestIsUndefined => 2,
        }
    }
}

impl TryFrom<u8> for EncodingType {
    type Error = DemError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Normal),
            2 => Ok(Self::HighestIsUndefined),
            other => Err(DemError::InvalidInput(format!(
                "unsupported tile encoding type {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Neighbors and prediction
// ---------------------------------------------------------------------------

/// Row-major delta grid addressed with signed coordinates.
///
/// Outside the grid: above the first row reads 0, left of the first column
/// reads 0 on row 0 and the first delta of the previous row otherwise.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeltaView<'a> {
    deltas: &'a [i32],
    width: usize,
}

impl<'a> DeltaView<'a> {
    pub(crate) fn new(deltas: &'a [i32], width: usize) -> Self {
        Self { deltas, width }
    }

    #[inline]
    pub(crate) fn get(&self, col: isize, row: isize) -> i32 {
        if row < 0 {
            return 0;
        }
        if col < 0 {
            return if row == 0 {
                0
            } else {
                self.deltas[(row as usize - 1) * self.width]
            };
        }
        self.deltas[row as usize * self.width + col as usize]
    }

    /// Number of samples from `(col, row)` to the row end that equal `value`,
    /// stopping at the first one that does not.
    pub(crate) fn run_len(&self, col: usize, row: usize, value: i32) -> usize {
        let start = row * self.width;
        self.deltas[start + col..start + self.width]
            .iter()
            .take_while(|&&d| d == value)
            .count()
    }
}

/// Wrap `v` modulo `difference + 1` into `[-difference / 2, (difference + 1) / 2]`.
#[inline]
pub(crate) fn wrap(v: i32, difference: i32) -> i32 {
    let modulus = difference + 1;
    let r = v.rem_euclid(modulus);
    if r > modulus / 2 { r - modulus } else { r }
}

/// Standard-context prediction of the delta at a position from its left,
/// upper and upper-left neighbors. `-1` stands for the maximum.
#[inline]
pub(crate) fn predict(h_left: i32, h_upper: i32, h_up_left: i32, difference: i32) -> i32 {
    let hdiff_up = h_upper - h_up_left;
    if hdiff_up >= difference - h_left {
        -1
    } else if hdiff_up <= -h_left {
        0
    } else {
        h_left + hdiff_up
    }
}

// ---------------------------------------------------------------------------
// Tile
// ---------------------------------------------------------------------------

/// An encoded tile: header fields plus packed bitstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    width: usize,
    height: usize,
    base_height: i32,
    difference_height: i32,
    encoding_type: EncodingType,
    bit_len: usize,
    bitstream: Vec<u8>,
}

impl Tile {
    /// Encode a matrix into a tile.
    ///
    /// Fails with an overflow error if a value does not fit the width the
    /// format reserves for it; nothing of the tile survives in that case.
    pub fn encode(matrix: &ElevationMatrix) -> Result<Self> {
        let width = matrix.width();
        let height = matrix.height();
        let samples = matrix.samples();

        let mut min = i32::MAX;
        let mut max = i32::MIN;
        let mut has_undefined = false;
        for &s in samples {
            if s == UNDEFINED_HEIGHT {
                has_undefined = true;
            } else {
                min = min.min(s);
                max = max.max(s);
            }
        }

        if min > max {
            // Nothing defined at all.
            return Ok(Self::flat(width, height, 0));
        }

        let mut encoding_type = EncodingType::Normal;
        if has_undefined {
            max = max.checked_add(1).ok_or_else(|| {
                DemError::InvalidInput("no height left to mark undefined samples".into())
            })?;
            encoding_type = EncodingType::HighestIsUndefined;
        }

        let difference = max.checked_sub(min).ok_or_else(|| {
            DemError::InvalidInput(format!("height range {min}..={max} is too large"))
        })?;
        if difference == 0 {
            return Ok(Self::flat(width, height, min));
        }
        if difference > MAX_DIFFERENCE_HEIGHT {
            return Err(DemError::FieldOverflow {
                field: "differenceHeight",
                value: i64::from(difference),
                size: 2,
            });
        }

        let deltas: Vec<i32> = samples
            .iter()
            .map(|&s| if s == UNDEFINED_HEIGHT { difference } else { s - min })
            .collect();

        let mut out = BitWriter::with_capacity(width * height / 4);
        scan(&mut out, &deltas, width, difference)?;
        let bit_len = out.bit_len();
        let bitstream = out.finish();

        trace!("tile {width}x{height}: base {min}, diff {difference}, {bit_len} bits");

        Ok(Self {
            width,
            height,
            base_height: min,
            difference_height: difference,
            encoding_type,
            bit_len,
            bitstream,
        })
    }

    fn flat(width: usize, height: usize, base_height: i32) -> Self {
        Self {
            width,
            height,
            base_height,
            difference_height: 0,
            encoding_type: EncodingType::Normal,
            bit_len: 0,
            bitstream: Vec::new(),
        }
    }

    /// Assemble a tile from parsed header fields and its body bytes.
    pub fn from_parts(
        width: usize,
        height: usize,
        base_height: i32,
        difference_height: i32,
        encoding_type: EncodingType,
        bitstream: Vec<u8>,
    ) -> Self {
        Self {
            width,
            height,
            base_height,
            difference_height,
            encoding_type,
            bit_len: bitstream.len() * 8,
            bitstream,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Lowest height of the tile.
    pub fn base_height(&self) -> i32 {
        self.base_height
    }

    /// `max - min`; 0 for a flat tile.
    pub fn difference_height(&self) -> i32 {
        self.difference_height
    }

    /// `base + difference`.
    pub fn max_height(&self) -> i32 {
        self.base_height + self.difference_height
    }

    pub fn encoding_type(&self) -> EncodingType {
        self.encoding_type
    }

    /// Meaningful bits in the stream, before padding.
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Packed body bytes.
    pub fn bitstream(&self) -> &[u8] {
        &self.bitstream
    }

    pub fn is_flat(&self) -> bool {
        self.difference_height == 0
    }
}

/// Scan all deltas row-major and append their codes to `out`.
fn scan(out: &mut BitWriter, deltas: &[i32], width: usize, difference: i32) -> Result<()> {
    let grid = DeltaView::new(deltas, width);
    let mut plateau = PlateauCoder::new();
    let mut standard = Predictor::new(CalcType::Standard, difference);
    let mut plateau_zero = Predictor::new(CalcType::PlateauZero, difference);
    let mut plateau_non_zero = Predictor::new(CalcType::PlateauNonZero, difference);

    let mut follower = false;
    let mut pos = 0;
    while pos < deltas.len() {
        let col = pos % width;
        let row = pos / width;
        let (c, r) = (col as isize, row as isize);
        let h_upper = grid.get(c, r - 1);
        let h_left = grid.get(c - 1, r);
        let d_diff = h_upper - h_left;
        let h = deltas[pos];

        if follower {
            follower = false;
            let v = wrap(h - h_upper, difference);
            if d_diff == 0 {
                plateau_zero.encode(out, v, d_diff)?;
            } else {
                plateau_non_zero.encode(out, v, d_diff)?;
            }
            pos += 1;
        } else if d_diff == 0 {
            let len = grid.run_len(col, row, h_left);
            plateau.write_run(out, len, col, width)?;
            follower = col + len < width;
            pos += len;
        } else {
            let h_up_left = grid.get(c - 1, r - 1);
            let prediction = predict(h_left, h_upper, h_up_left, difference);
            let v = wrap((prediction - h) * d_diff.signum(), difference);
            standard.encode(out, v, d_diff)?;
            pos += 1;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn corner_matrix(value: i32) -> ElevationMatrix {
        let mut m = ElevationMatrix::filled(64, 64, 0).unwrap();
        m.set(63, 0, value).unwrap();
        m
    }

    #[test]
    fn plateau_vector() {
        let tile = Tile::encode(&corner_matrix(3)).unwrap();
        let mut expected = vec![0xFF; 10];
        expected.extend_from_slice(&[0xC0, 0x2E]);
        assert_eq!(tile.bitstream(), expected.as_slice());
        assert_eq!(tile.base_height(), 0);
        assert_eq!(tile.difference_height(), 3);
        assert_eq!(tile.encoding_type(), EncodingType::Normal);
    }

    #[test]
    fn undefined_sentinel_vector() {
        let tile = Tile::encode(&corner_matrix(UNDEFINED_HEIGHT)).unwrap();
        let mut expected = vec![0xFF; 10];
        expected.extend_from_slice(&[0xC0, 0x3E]);
        assert_eq!(tile.bitstream(), expected.as_slice());
        assert_eq!(tile.bit_len(), 95);
        assert_eq!(tile.difference_height(), 1);
        assert_eq!(tile.encoding_type(), EncodingType::HighestIsUndefined);
    }

    #[test]
    fn flat_tiles() {
        for value in [0, 1, -20, 4000] {
            let tile = Tile::encode(&ElevationMatrix::filled(64, 64, value).unwrap()).unwrap();
            assert!(tile.is_flat());
            assert_eq!(tile.base_height(), value);
            assert!(tile.bitstream().is_empty());
            assert_eq!(tile.encoding_type(), EncodingType::Normal);
        }
    }

    #[test]
    fn all_undefined_is_flat_at_zero() {
        let m = ElevationMatrix::filled(10, 7, UNDEFINED_HEIGHT).unwrap();
        let tile = Tile::encode(&m).unwrap();
        assert!(tile.is_flat());
        assert_eq!(tile.base_height(), 0);
        assert_eq!(tile.encoding_type(), EncodingType::Normal);
    }

    #[test]
    fn height_derivation() {
        let m = ElevationMatrix::from_fn(20, 9, |r, c| (r * 31 + c * 7) as i32 % 50 - 12).unwrap();
        let tile = Tile::encode(&m).unwrap();
        let min = *m.samples().iter().min().unwrap();
        let max = *m.samples().iter().max().unwrap();
        assert_eq!(tile.base_height(), min);
        assert_eq!(tile.difference_height(), max - min);
        assert_eq!(tile.max_height(), max);
    }

    #[test]
    fn deterministic() {
        let m = ElevationMatrix::from_fn(64, 64, |r, c| ((r * c) % 97) as i32).unwrap();
        assert_eq!(Tile::encode(&m).unwrap(), Tile::encode(&m).unwrap());
    }

    #[test]
    fn neighbor_left_of_col0_is_first_of_previous_row() {
        let (width, height) = (5usize, 4usize);
        let deltas: Vec<i32> = (0..width * height).map(|i| i as i32 + 100).collect();
        let grid = DeltaView::new(&deltas, width);
        for row in -1..height as isize {
            for col in -1..width as isize {
                let expected = if row < 0 {
                    0
                } else if col < 0 {
                    if row == 0 { 0 } else { deltas[(row as usize - 1) * width] }
                } else {
                    deltas[row as usize * width + col as usize]
                };
                assert_eq!(grid.get(col, row), expected, "({col}, {row})");
            }
        }
        // Spot checks of the rule itself: column 0 of the row above, not its
        // last column.
        assert_eq!(grid.get(-1, 0), 0);
        assert_eq!(grid.get(-1, 1), 100);
        assert_ne!(grid.get(-1, 1), 104);
        assert_eq!(grid.get(-1, 3), 110);
        assert_eq!(grid.get(2, -1), 0);
    }

    #[test]
    fn run_length_stops_at_mismatch() {
        let deltas = [1, 1, 2, 1, 1, 1, 1, 1];
        let grid = DeltaView::new(&deltas, 4);
        assert_eq!(grid.run_len(0, 0, 1), 2);
        assert_eq!(grid.run_len(2, 0, 1), 0);
        assert_eq!(grid.run_len(0, 1, 1), 4);
        assert_eq!(grid.run_len(3, 1, 1), 1);
    }

    #[test]
    fn wrapping_window() {
        // difference 3 -> modulus 4 -> [-1, 2]
        assert_eq!(wrap(3, 3), -1);
        assert_eq!(wrap(2, 3), 2);
        assert_eq!(wrap(-2, 3), 2);
        assert_eq!(wrap(-4, 3), 0);
        // difference 2 -> modulus 3 -> [-1, 1]
        assert_eq!(wrap(2, 2), -1);
        assert_eq!(wrap(-2, 2), 1);
        // difference 1 -> modulus 2 -> [0, 1]
        assert_eq!(wrap(-1, 1), 1);
        for v in -9..=9 {
            let w = wrap(v, 5);
            assert!((-2..=3).contains(&w));
            assert_eq!((v - w).rem_euclid(6), 0);
        }
    }

    #[test]
    fn prediction_clamps() {
        assert_eq!(predict(2, 5, 1, 5), -1);
        assert_eq!(predict(2, 0, 3, 5), 0);
        assert_eq!(predict(2, 3, 2, 5), 3);
    }

    #[test]
    fn encoding_type_bytes() {
        assert_eq!(EncodingType::Normal.as_byte(), 0);
        assert_eq!(EncodingType::HighestIsUndefined.as_byte(), 2);
        assert_eq!(EncodingType::try_from(2).unwrap(), EncodingType::HighestIsUndefined);
        assert!(EncodingType::try_from(1).is_err());
    }

    #[test]
    fn difference_above_two_bytes_overflows() {
        let wide = ElevationMatrix::from_fn(2, 2, |r, _| if r == 0 { -40_000 } else { 40_000 })
            .unwrap();
        assert!(Tile::encode(&wide).unwrap_err().is_overflow());

        let widest =
            ElevationMatrix::from_fn(2, 2, |r, _| if r == 0 { 0 } else { MAX_DIFFERENCE_HEIGHT })
                .unwrap();
        assert_eq!(
            Tile::encode(&widest).unwrap().difference_height(),
            MAX_DIFFERENCE_HEIGHT
        );
    }
}
