// File-level helpers: load SRTM-style `.hgt` rasters and write DEM files.
//
// An `.hgt` file is a square grid of big-endian i16 samples, row 0 at the
// north edge, with -32768 marking voids. 1201 samples per edge is 3″ data,
// 3601 is 1″ data. The file name gives the south-west corner (N47E008).
// Optionally computes SHA-256 checksums (feature-gated behind `file-io`).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::debug;
#[cfg(feature = "file-io")]
use sha2::Digest;

use crate::codec::{ElevationMatrix, UNDEFINED_HEIGHT};
use crate::dem::section::{align_distance, default_point_distance, SectionGeometry};
use crate::dem::{DemFile, EncodeOptions, ZoomLevel};
use crate::error::{DemError, Result};

/// Void marker of `.hgt` samples.
pub const HGT_VOID: i16 = -32768;

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// HGT input
// ---------------------------------------------------------------------------

/// A loaded `.hgt` raster.
#[derive(Debug, Clone)]
pub struct HgtGrid {
    pub grid: ElevationMatrix,
    /// Samples per degree (edge length - 1).
    pub resolution: u32,
    /// South-west corner `(lat, lon)` in degrees, from the file name.
    pub origin: Option<(i32, i32)>,
}

impl HgtGrid {
    /// Geometry of the full-resolution grid: `top` is the north edge.
    pub fn geometry(&self, distance: i32) -> SectionGeometry {
        let (lat, lon) = self.origin.unwrap_or((0, 0));
        SectionGeometry::square(
            degrees_to_map_units(f64::from(lat + 1)),
            degrees_to_map_units(f64::from(lon)),
            distance,
        )
    }
}

/// Convert degrees to 32-bit map units (2^32 per full circle).
pub fn degrees_to_map_units(degrees: f64) -> i32 {
    let units = (degrees * (f64::from(u32::MAX) + 1.0) / 360.0).round();
    units.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
}

/// South-west corner encoded in an `.hgt` file name such as `S12W077.hgt`.
pub fn hgt_origin(path: &Path) -> Option<(i32, i32)> {
    let name = path.file_stem()?.to_str()?;
    if name.len() != 7 || !name.is_ascii() {
        return None;
    }
    let lat_sign = match name.as_bytes()[0] {
        b'N' | b'n' => 1,
        b'S' | b's' => -1,
        _ => return None,
    };
    let lon_sign = match name.as_bytes()[3] {
        b'E' | b'e' => 1,
        b'W' | b'w' => -1,
        _ => return None,
    };
    let lat: i32 = name[1..3].parse().ok()?;
    let lon: i32 = name[4..7].parse().ok()?;
    Some((lat * lat_sign, lon * lon_sign))
}

/// Parse raw `.hgt` bytes into a square grid.
pub fn parse_hgt(bytes: &[u8]) -> Result<ElevationMatrix> {
    if bytes.len() % 2 != 0 {
        return Err(DemError::InvalidInput(format!(
            "hgt data has odd length {}",
            bytes.len()
        )));
    }
    let count = bytes.len() / 2;
    let edge = count.isqrt();
    if edge < 2 || edge * edge != count {
        return Err(DemError::InvalidInput(format!(
            "hgt data with {count} samples is not a square grid"
        )));
    }
    let samples = bytes
        .chunks_exact(2)
        .map(|b| match i16::from_be_bytes([b[0], b[1]]) {
            HGT_VOID => UNDEFINED_HEIGHT,
            h => i32::from(h),
        })
        .collect();
    ElevationMatrix::new(edge, edge, samples)
}

/// Load an `.hgt` file.
pub fn load_hgt(path: &Path) -> Result<HgtGrid> {
    let bytes = std::fs::read(path)?;
    let grid = parse_hgt(&bytes)?;
    let resolution = (grid.width() - 1) as u32;
    Ok(HgtGrid {
        grid,
        resolution,
        origin: hgt_origin(path),
    })
}

/// Resample a raster whose samples lie `native` map units apart at a
/// coarser spacing of `distance` units.
///
/// The output covers the raster from its north-west corner; the last row and
/// column are the last ones that still fall inside it. Positions between
/// source samples are interpolated on the triangle (north-west or
/// south-east half of the cell) that contains them. If a corner of that
/// triangle is void, the height is the mean of the defined cell corners, or
/// void when fewer than two are defined. Positions on source samples copy
/// them, so `distance == native` reproduces the raster.
pub fn resample(grid: &ElevationMatrix, native: i32, distance: i32) -> Result<ElevationMatrix> {
    if native <= 0 || distance < native {
        return Err(DemError::InvalidInput(format!(
            "point distance {distance} is finer than the raster spacing {native}"
        )));
    }
    let (native, distance) = (i64::from(native), i64::from(distance));
    let points = |samples: usize| ((samples as i64 - 1) * native / distance) as usize + 1;
    ElevationMatrix::from_fn(points(grid.width()), points(grid.height()), |r, c| {
        let (y, x) = (r as i64 * distance, c as i64 * distance);
        let (row, col) = ((y / native) as usize, (x / native) as usize);
        match (y % native, x % native) {
            (0, 0) => grid.get(row, col).unwrap_or(UNDEFINED_HEIGHT),
            (ry, rx) => {
                let frac = |rem: i64| rem as f64 / native as f64;
                interpolate(grid, row, col, frac(ry), frac(rx))
            }
        }
    })
}

/// Height at `(row + fy, col + fx)` with `fy`, `fx` in `[0, 1)`.
fn interpolate(grid: &ElevationMatrix, row: usize, col: usize, fy: f64, fx: f64) -> i32 {
    let at = |r: usize, c: usize| {
        grid.get(r.min(grid.height() - 1), c.min(grid.width() - 1))
            .unwrap_or(UNDEFINED_HEIGHT)
    };
    let nw = at(row, col);
    let ne = at(row, col + 1);
    let sw = at(row + 1, col);
    let se = at(row + 1, col + 1);
    let defined = |h: i32| h != UNDEFINED_HEIGHT;

    // `up` runs from the southern sample row towards the northern one.
    let up = 1.0 - fy;
    let plane = if !defined(sw) || !defined(ne) {
        None
    } else if up >= fx {
        defined(nw).then(|| {
            let (ne, sw, nw) = (f64::from(ne), f64::from(sw), f64::from(nw));
            nw + fx * (ne - nw) - (up - 1.0) * (sw - nw)
        })
    } else {
        defined(se).then(|| {
            let (ne, sw, se) = (f64::from(ne), f64::from(sw), f64::from(se));
            se - (fx - 1.0) * (sw - se) + up * (ne - se)
        })
    };
    match plane {
        Some(h) => round_half_up(h),
        None => {
            let valid: Vec<i32> = [nw, ne, sw, se].into_iter().filter(|&h| defined(h)).collect();
            if valid.len() < 2 {
                UNDEFINED_HEIGHT
            } else {
                let sum: i64 = valid.iter().map(|&h| i64::from(h)).sum();
                round_half_up(sum as f64 / valid.len() as f64)
            }
        }
    }
}

#[inline]
fn round_half_up(v: f64) -> i32 {
    (v + 0.5).floor() as i32
}

/// Build one zoom level per point distance. `None` means the raster's own
/// spacing. Requested distances are rounded to a multiple of 16, and the
/// raster is resampled at exactly that spacing, so the section header
/// describes the samples it carries.
pub fn zoom_levels(hgt: &HgtGrid, distances: &[Option<i32>]) -> Result<Vec<ZoomLevel>> {
    let native = default_point_distance(hgt.resolution);
    distances
        .iter()
        .map(|d| {
            let distance = match *d {
                None => native,
                Some(d) if d > 0 => align_distance(d),
                Some(d) => {
                    return Err(DemError::InvalidInput(format!(
                        "point distance must be positive, got {d}"
                    )));
                }
            };
            let grid = resample(&hgt.grid, native, distance)?;
            debug!(
                "zoom level: distance {distance}, {}x{} samples",
                grid.width(),
                grid.height()
            );
            Ok(ZoomLevel {
                grid,
                geometry: hgt.geometry(distance),
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by [`encode_hgt_file`].
#[derive(Debug, Clone)]
pub struct EncodeStats {
    /// Input file size in bytes.
    pub input_size: u64,
    /// DEM output size in bytes.
    pub output_size: u64,
    /// Number of zoom levels written.
    pub sections: usize,
    /// Tiles over all sections.
    pub tiles: usize,
    /// Tiles with a non-empty bitstream.
    pub coded_tiles: usize,
    /// SHA-256 of the output (if `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// encode_hgt_file
// ---------------------------------------------------------------------------

/// Encode an `.hgt` file into a DEM file at `output_path`, one section per
/// entry of `distances`.
///
/// Nothing is written unless every section encodes successfully.
pub fn encode_hgt_file(
    input_path: &Path,
    output_path: &Path,
    distances: &[Option<i32>],
    opts: &EncodeOptions,
) -> Result<EncodeStats> {
    let input_size = std::fs::metadata(input_path)?.len();
    let hgt = load_hgt(input_path)?;
    debug!(
        "loaded {}: {}x{} samples, origin {:?}",
        input_path.display(),
        hgt.grid.width(),
        hgt.grid.height(),
        hgt.origin
    );

    let levels = zoom_levels(&hgt, distances)?;
    let dem = DemFile::encode(&levels, opts)?;
    let bytes = dem.to_bytes()?;

    let file = File::create(output_path)?;
    let mut writer = BufWriter::with_capacity(BUF_SIZE, file);
    writer.write_all(&bytes)?;
    writer.flush()?;

    #[cfg(feature = "file-io")]
    let output_sha256 = Some(sha256(&bytes));
    #[cfg(not(feature = "file-io"))]
    let output_sha256: Option<[u8; 32]> = None;

    let tiles = dem.sections().iter().map(|s| s.tiles().len()).sum();
    let coded_tiles = dem
        .sections()
        .iter()
        .flat_map(|s| s.tiles())
        .filter(|t| !t.bitstream().is_empty())
        .count();

    Ok(EncodeStats {
        input_size,
        output_size: bytes.len() as u64,
        sections: dem.sections().len(),
        tiles,
        coded_tiles,
        output_sha256,
    })
}

/// SHA-256 of a byte buffer.
#[cfg(feature = "file-io")]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = sha2::Sha256::new();
    h.update(data);
    h.finalize().into()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dem::{CreationTime, DemReader};

    fn hgt_bytes(edge: usize, f: impl Fn(usize, usize) -> i16) -> Vec<u8> {
        let mut out = Vec::with_capacity(edge * edge * 2);
        for r in 0..edge {
            for c in 0..edge {
                out.extend_from_slice(&f(r, c).to_be_bytes());
            }
        }
        out
    }

    fn opts() -> EncodeOptions {
        EncodeOptions {
            parallel: false,
            creation_time: Some(CreationTime::from_unix(0)),
        }
    }

    #[test]
    fn parse_hgt_voids_and_order() {
        let bytes = hgt_bytes(3, |r, c| {
            if r == 1 && c == 2 { HGT_VOID } else { (r * 3 + c) as i16 - 2 }
        });
        let grid = parse_hgt(&bytes).unwrap();
        assert_eq!(grid.width(), 3);
        assert_eq!(grid.get(0, 0), Some(-2));
        assert_eq!(grid.get(2, 2), Some(6));
        assert_eq!(grid.get(1, 2), Some(UNDEFINED_HEIGHT));
    }

    #[test]
    fn parse_hgt_rejects_non_square() {
        assert!(parse_hgt(&[0u8; 7]).is_err());
        assert!(parse_hgt(&[0u8; 12]).is_err());
        assert!(parse_hgt(&[0u8; 2]).is_err());
    }

    #[test]
    fn origin_from_file_name() {
        assert_eq!(hgt_origin(Path::new("/data/N47E008.hgt")), Some((47, 8)));
        assert_eq!(hgt_origin(Path::new("S12W077.hgt")), Some((-12, -77)));
        assert_eq!(hgt_origin(Path::new("tile.hgt")), None);
    }

    #[test]
    fn map_units() {
        assert_eq!(degrees_to_map_units(0.0), 0);
        assert_eq!(degrees_to_map_units(90.0), 1 << 30);
        assert_eq!(degrees_to_map_units(-180.0), i32::MIN);
    }

    #[test]
    fn resample_at_native_spacing_is_identity() {
        let grid = ElevationMatrix::from_fn(7, 7, |r, c| {
            if (r, c) == (3, 4) { UNDEFINED_HEIGHT } else { (r * 7 + c) as i32 }
        })
        .unwrap();
        assert_eq!(resample(&grid, 160, 160).unwrap(), grid);
    }

    #[test]
    fn resample_whole_multiples_pick_samples() {
        let grid = ElevationMatrix::from_fn(5, 5, |r, c| (r * 5 + c) as i32).unwrap();
        let sub = resample(&grid, 160, 320).unwrap();
        assert_eq!((sub.width(), sub.height()), (3, 3));
        assert_eq!(sub.samples(), &[0, 2, 4, 10, 12, 14, 20, 22, 24]);
        // 4 rows of 160 hold 3 steps of 192; the rest of the raster is cut.
        assert_eq!(resample(&grid, 160, 192).unwrap().width(), 4);
    }

    #[test]
    fn resample_interpolates_planes_exactly() {
        // h = 3 * row + 5 * col, sampled every 1.5 rows and columns.
        let grid = ElevationMatrix::from_fn(7, 7, |r, c| (3 * r + 5 * c) as i32).unwrap();
        let out = resample(&grid, 32, 48).unwrap();
        assert_eq!(out.width(), 5);
        for r in 0..5 {
            for c in 0..5 {
                let exact = 4.5 * r as f64 + 7.5 * c as f64;
                assert_eq!(out.get(r, c), Some((exact + 0.5).floor() as i32), "({r}, {c})");
            }
        }
    }

    #[test]
    fn resample_voids_fall_back_to_cell_mean() {
        let mut grid = ElevationMatrix::from_fn(4, 4, |r, c| (3 * r + 5 * c) as i32).unwrap();
        grid.set(1, 1, UNDEFINED_HEIGHT).unwrap();
        let out = resample(&grid, 32, 48).unwrap();
        // (1.5, 1.5) lies in the north-west half, whose corner (1, 1) is
        // void: mean of 13, 11 and 16.
        assert_eq!(out.get(1, 1), Some(13));
        // A cell with one defined corner stays void.
        let mut sparse = ElevationMatrix::filled(4, 4, UNDEFINED_HEIGHT).unwrap();
        sparse.set(0, 0, 10).unwrap();
        assert_eq!(resample(&sparse, 32, 48).unwrap().get(0, 0), Some(10));
        assert_eq!(resample(&sparse, 32, 48).unwrap().get(1, 1), Some(UNDEFINED_HEIGHT));
    }

    #[test]
    fn resample_rejects_finer_spacing() {
        let grid = ElevationMatrix::filled(5, 5, 1).unwrap();
        assert!(resample(&grid, 160, 150).is_err());
        assert!(resample(&grid, 0, 150).is_err());
    }

    #[test]
    fn zoom_level_headers_match_their_samples() {
        let hgt = HgtGrid {
            grid: ElevationMatrix::from_fn(121, 121, |r, c| (r * 2 + c) as i32).unwrap(),
            resolution: 120,
            origin: Some((47, 8)),
        };
        let native = default_point_distance(120);
        let extent = 120 * i64::from(native);
        let requested = [
            None,
            Some(native * 2),
            Some(native * 3 / 2),
            Some(native * 2 + 5),
            Some(native * 7),
            Some(12_345_678),
        ];
        let levels = zoom_levels(&hgt, &requested).unwrap();
        for (d, level) in requested.iter().zip(&levels) {
            let distance = level.geometry.points_distance_lat;
            assert_eq!(distance % 16, 0, "{d:?}");
            assert_eq!(distance, level.geometry.points_distance_lon);
            assert_eq!(level.grid.width(), level.grid.height());
            let covered = i64::from(distance) * (level.grid.width() as i64 - 1);
            assert!(covered <= extent && extent - covered < i64::from(distance), "{d:?}");
            assert_eq!(level.geometry.top, degrees_to_map_units(48.0));
            assert_eq!(level.geometry.left, degrees_to_map_units(8.0));
        }
        // Distances that divide the raster cover it exactly.
        for level in &levels[..3] {
            let distance = i64::from(level.geometry.points_distance_lat);
            assert_eq!(distance * (level.grid.width() as i64 - 1), extent);
        }
        assert_eq!(levels[0].grid, hgt.grid);
        assert_eq!(levels[1].grid.width(), 61);
        assert_eq!(levels[2].grid.width(), 81);
        assert_eq!(levels[3].geometry.points_distance_lat, native * 2);
        assert_eq!(levels[3].grid, levels[1].grid);
        assert_eq!(levels[4].grid.width(), 18);
        assert_eq!(levels[5].grid.width(), 1);

        assert!(zoom_levels(&hgt, &[Some(100)]).is_err());
        assert!(zoom_levels(&hgt, &[Some(0)]).is_err());
    }

    #[test]
    fn encode_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("N47E008.hgt");
        let output = dir.path().join("out.dem");
        let raster = hgt_bytes(121, |r, c| ((r * 17 + c * 5) % 400) as i16 + 300);
        std::fs::write(&input, raster).unwrap();

        let coarse = default_point_distance(120) * 2;
        let stats = encode_hgt_file(&input, &output, &[None, Some(coarse)], &opts()).unwrap();
        assert_eq!(stats.input_size, 121 * 121 * 2);
        assert_eq!(stats.sections, 2);
        assert!(stats.coded_tiles > 0);

        let bytes = std::fs::read(&output).unwrap();
        assert_eq!(bytes.len() as u64, stats.output_size);
        #[cfg(feature = "file-io")]
        assert_eq!(stats.output_sha256, Some(sha256(&bytes)));

        let reader = DemReader::parse(&bytes).unwrap();
        let expected = load_hgt(&input).unwrap().grid;
        assert_eq!(reader.decode_section(0).unwrap(), expected);
        assert_eq!(reader.sections()[0].top, degrees_to_map_units(48.0));
        assert_eq!(reader.sections()[1].points_distance_lat, coarse);
        assert_eq!(
            reader.decode_section(1).unwrap(),
            resample(&expected, coarse / 2, coarse).unwrap()
        );
    }
}
