// Row-major elevation grid handed to the codec.

use crate::error::{DemError, Result};

/// Sample value marking an elevation that is not known.
///
/// Tiles containing it are written with encoding type 2, where the highest
/// encodable height stands for "undefined".
pub const UNDEFINED_HEIGHT: i32 = i32::MAX;

/// A `width × height` grid of elevation samples in meters, stored row-major
/// with row 0 at the top (north) and column 0 at the left (west).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevationMatrix {
    width: usize,
    height: usize,
    samples: Vec<i32>,
}

impl ElevationMatrix {
    /// Wrap row-major samples. Fails unless `samples.len() == width * height`
    /// and both dimensions are non-zero.
    pub fn new(width: usize, height: usize, samples: Vec<i32>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(DemError::InvalidInput(format!(
                "matrix dimensions must be non-zero, got {width}x{height}"
            )));
        }
        let expected = width.checked_mul(height).ok_or_else(|| {
            DemError::InvalidInput(format!("matrix {width}x{height} is too large"))
        })?;
        if samples.len() != expected {
            return Err(DemError::InvalidInput(format!(
                "matrix {width}x{height} needs {expected} samples, got {}",
                samples.len()
            )));
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    /// A matrix with every sample set to `value`.
    pub fn filled(width: usize, height: usize, value: i32) -> Result<Self> {
        Self::new(width, height, vec![value; width.saturating_mul(height)])
    }

    /// Build a matrix by evaluating `f(row, col)` for every sample.
    pub fn from_fn(
        width: usize,
        height: usize,
        mut f: impl FnMut(usize, usize) -> i32,
    ) -> Result<Self> {
        let mut samples = Vec::with_capacity(width.saturating_mul(height));
        for row in 0..height {
            for col in 0..width {
                samples.push(f(row, col));
            }
        }
        Self::new(width, height, samples)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// All samples, row-major.
    pub fn samples(&self) -> &[i32] {
        &self.samples
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<i32> {
        if row < self.height && col < self.width {
            Some(self.samples[row * self.width + col])
        } else {
            None
        }
    }

    /// Overwrite one sample. Out-of-range coordinates are invalid input.
    pub fn set(&mut self, row: usize, col: usize, value: i32) -> Result<()> {
        if row >= self.height || col >= self.width {
            return Err(DemError::InvalidInput(format!(
                "sample ({row}, {col}) outside {}x{} matrix",
                self.width, self.height
            )));
        }
        self.samples[row * self.width + col] = value;
        Ok(())
    }

    /// Copy the `width × height` block whose top-left sample is
    /// `(row, col)`.
    pub fn window(&self, row: usize, col: usize, width: usize, height: usize) -> Result<Self> {
        if row + height > self.height || col + width > self.width {
            return Err(DemError::InvalidInput(format!(
                "window {width}x{height} at ({row}, {col}) exceeds {}x{} matrix",
                self.width, self.height
            )));
        }
        let mut samples = Vec::with_capacity(width * height);
        for r in row..row + height {
            let start = r * self.width + col;
            samples.extend_from_slice(&self.samples[start..start + width]);
        }
        Self::new(width, height, samples)
    }

    /// True if at least one sample is [`UNDEFINED_HEIGHT`].
    pub fn has_undefined(&self) -> bool {
        self.samples.contains(&UNDEFINED_HEIGHT)
    }
}
