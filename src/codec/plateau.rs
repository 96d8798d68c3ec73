// Run-length coding of plateaus: stretches of a row whose delta equals the
// delta left of the run start.
//
// A length is written as a series of `1` bits, each consuming
// `PLATEAU_UNIT[pos]` samples and advancing the table cursor, closed either by
// reaching the row end or by a `0` bit plus the remainder in
// `PLATEAU_BIN_BITS[pos]` bits (after stepping the cursor back once). The
// cursor lives for the whole tile; long runs make later runs cheaper to
// start with big units.

use crate::bits::{BitReader, BitWriter};
use crate::error::{DemError, Result};

use super::tables::{PLATEAU_BIN_BITS, PLATEAU_TABLE_LAST, PLATEAU_UNIT};

/// Plateau length coder with its tile-scoped table cursor.
#[derive(Debug, Clone, Default)]
pub struct PlateauCoder {
    table_pos: usize,
}

impl PlateauCoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current table cursor.
    pub fn table_pos(&self) -> usize {
        self.table_pos
    }

    /// Write a run of `len` samples starting at column `col` of a row that is
    /// `width` samples wide. `col + len` must not exceed `width`.
    pub fn write_run(
        &mut self,
        out: &mut BitWriter,
        len: usize,
        col: usize,
        width: usize,
    ) -> Result<()> {
        if col + len > width {
            return Err(DemError::InvalidInput(format!(
                "plateau of {len} at column {col} overruns row width {width}"
            )));
        }
        let mut rest = len;
        let mut x = col;
        loop {
            let unit = PLATEAU_UNIT[self.table_pos];
            if rest >= unit {
                out.append_bit(true);
                rest -= unit;
                x += unit;
                self.advance();
                if x >= width {
                    return Ok(());
                }
            } else if x + rest >= width {
                // Partial unit up to the row end.
                out.append_bit(true);
                return Ok(());
            } else {
                break;
            }
        }
        self.table_pos = self.table_pos.saturating_sub(1);
        out.append_bit(false);
        out.write_binary(rest as u64, PLATEAU_BIN_BITS[self.table_pos])
    }

    /// Read the length of a run starting at column `col`.
    pub fn read_run(&mut self, input: &mut BitReader<'_>, col: usize, width: usize) -> Result<usize> {
        let mut x = col;
        while input.read_bit()? {
            let unit = PLATEAU_UNIT[self.table_pos];
            if x + unit > width {
                return Ok(width - col);
            }
            x += unit;
            self.advance();
            if x == width {
                return Ok(width - col);
            }
        }
        self.table_pos = self.table_pos.saturating_sub(1);
        let rest = input.read_binary(PLATEAU_BIN_BITS[self.table_pos])? as usize;
        if x + rest >= width {
            return Err(DemError::InvalidInput(format!(
                "plateau remainder {rest} at column {x} overruns row width {width}"
            )));
        }
        Ok(x + rest - col)
    }

    fn advance(&mut self) {
        if self.table_pos < PLATEAU_TABLE_LAST {
            self.table_pos += 1;
        }
    }
}
