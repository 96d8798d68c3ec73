// Tile decoder: the inverse of the tile scan.
//
// Every decision the encoder makes depends only on deltas that precede the
// current position, so the decoder replays the same scan and rebuilds each
// delta from the neighbors it has already restored.

use crate::bits::BitReader;
use crate::error::{DemError, Result};

use super::matrix::{ElevationMatrix, UNDEFINED_HEIGHT};
use super::plateau::PlateauCoder;
use super::predictor::{CalcType, Predictor};
use super::tile::{predict, DeltaView, EncodingType, Tile, MAX_DIFFERENCE_HEIGHT};

/// Rebuild the elevation matrix of an encoded tile.
///
/// With [`EncodingType::HighestIsUndefined`], samples at the tile maximum
/// come back as [`UNDEFINED_HEIGHT`].
pub fn decode_tile(tile: &Tile) -> Result<ElevationMatrix> {
    let width = tile.width();
    let height = tile.height();
    let base = tile.base_height();
    let difference = tile.difference_height();

    if !(0..=MAX_DIFFERENCE_HEIGHT).contains(&difference) {
        return Err(DemError::InvalidInput(format!(
            "difference height {difference} out of range"
        )));
    }
    if difference == 0 {
        return ElevationMatrix::filled(width, height, base);
    }

    let deltas = decode_deltas(tile.bitstream(), width, height, difference)?;
    let undefined = tile.encoding_type() == EncodingType::HighestIsUndefined;
    let samples = deltas
        .into_iter()
        .map(|d| {
            if undefined && d == difference {
                UNDEFINED_HEIGHT
            } else {
                base + d
            }
        })
        .collect();
    ElevationMatrix::new(width, height, samples)
}

fn decode_deltas(bitstream: &[u8], width: usize, height: usize, difference: i32) -> Result<Vec<i32>> {
    let total = width * height;
    let mut deltas = vec![0i32; total];
    let mut input = BitReader::new(bitstream);
    let mut plateau = PlateauCoder::new();
    let mut standard = Predictor::new(CalcType::Standard, difference);
    let mut plateau_zero = Predictor::new(CalcType::PlateauZero, difference);
    let mut plateau_non_zero = Predictor::new(CalcType::PlateauNonZero, difference);
    let modulus = difference + 1;

    let mut follower = false;
    let mut pos = 0;
    while pos < total {
        let col = pos % width;
        let row = pos / width;
        let (c, r) = (col as isize, row as isize);
        let grid = DeltaView::new(&deltas, width);
        let h_upper = grid.get(c, r - 1);
        let h_left = grid.get(c - 1, r);
        let d_diff = h_upper - h_left;

        if follower {
            follower = false;
            let v = if d_diff == 0 {
                plateau_zero.decode(&mut input, d_diff)?
            } else {
                plateau_non_zero.decode(&mut input, d_diff)?
            };
            deltas[pos] = (v + h_upper).rem_euclid(modulus);
            pos += 1;
        } else if d_diff == 0 {
            let len = plateau.read_run(&mut input, col, width)?;
            deltas[pos..pos + len].fill(h_left);
            follower = col + len < width;
            pos += len;
        } else {
            let h_up_left = grid.get(c - 1, r - 1);
            let prediction = predict(h_left, h_upper, h_up_left, difference);
            let v = standard.decode(&mut input, d_diff)?;
            deltas[pos] = (prediction - v * d_diff.signum()).rem_euclid(modulus);
            pos += 1;
        }
    }
    Ok(deltas)
}
