// One zoom level of a DEM file.
//
// Protocol: encode every tile, derive the section-wide field widths from all
// of them, then write the tile header table followed by the tile bodies.
// Widths are only known after the last tile, so a section is never written
// while tiles are still being encoded.

use std::io::Write;

use log::debug;

use crate::codec::{ElevationMatrix, EncodingType, Tile};
use crate::error::{DemError, Result};

use super::header::{POINTS_PER_TILE, RecordDescriptor, SectionHeader, TileHeader};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

const TILE: usize = POINTS_PER_TILE as usize;

// ---------------------------------------------------------------------------
// Tile layout
// ---------------------------------------------------------------------------

/// Split of a zoom-level grid into tiles.
///
/// Every tile is 64 samples wide and high except the last column and the
/// last row, whose sizes are `non_std_width` and `non_std_height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    pub tiles_lat: usize,
    pub tiles_lon: usize,
    pub non_std_height: usize,
    pub non_std_width: usize,
}

impl TileLayout {
    /// Layout for a grid of `width × height` samples.
    pub fn for_grid(width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(DemError::InvalidInput(format!(
                "zoom level grid must be non-empty, got {width}x{height}"
            )));
        }
        let tiles_lat = (height - 1).div_ceil(TILE).max(1);
        let non_std_height = height - (tiles_lat - 1) * TILE;

        let mut tiles_lon = ((width - 1) / TILE).max(1);
        let mut non_std_width = width - (tiles_lon - 1) * TILE;
        if non_std_width >= 2 * TILE {
            tiles_lon += 1;
            non_std_width -= TILE;
        }

        Ok(Self {
            tiles_lat,
            tiles_lon,
            non_std_height,
            non_std_width,
        })
    }

    pub fn tile_count(&self) -> usize {
        self.tiles_lat * self.tiles_lon
    }

    /// Height of the tiles in tile row `m`.
    pub fn tile_height(&self, m: usize) -> usize {
        if m + 1 == self.tiles_lat { self.non_std_height } else { TILE }
    }

    /// Width of the tiles in tile column `n`.
    pub fn tile_width(&self, n: usize) -> usize {
        if n + 1 == self.tiles_lon { self.non_std_width } else { TILE }
    }

    /// Tile coordinates `(m, n)` in file order: rows top to bottom, each row
    /// left to right.
    pub fn tiles(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.tiles_lat).flat_map(move |m| (0..self.tiles_lon).map(move |n| (m, n)))
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Position and sample spacing of a zoom level, in 32-bit map units
/// (2^32 units per full circle).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionGeometry {
    /// Latitude of the first sample row.
    pub top: i32,
    /// Longitude of the first sample column.
    pub left: i32,
    pub points_distance_lat: i32,
    pub points_distance_lon: i32,
}

impl SectionGeometry {
    /// Geometry with the same spacing in both directions.
    pub fn square(top: i32, left: i32, distance: i32) -> Self {
        Self {
            top,
            left,
            points_distance_lat: distance,
            points_distance_lon: distance,
        }
    }
}

/// Round a point distance to the nearest multiple of 16.
pub fn align_distance(distance: i32) -> i32 {
    (distance.saturating_add(8) / 16) * 16
}

/// Point distance matching a source raster with `resolution` samples per
/// degree (1200 for 3″ data, 3600 for 1″ data).
pub fn default_point_distance(resolution: u32) -> i32 {
    let exact = f64::from(1u32 << 29) / (f64::from(resolution) * 45.0);
    align_distance(exact.round() as i32)
}

// ---------------------------------------------------------------------------
// Section
// ---------------------------------------------------------------------------

/// An encoded zoom level: header plus tiles in file order.
#[derive(Debug, Clone)]
pub struct Section {
    header: SectionHeader,
    tiles: Vec<Tile>,
    data_len: usize,
}

impl Section {
    /// Encode `grid` (row 0 = `geometry.top`) as zoom level `zoom_level`.
    ///
    /// With `parallel` set and the `parallel` feature enabled, tiles are
    /// encoded on the rayon pool; the output is identical either way.
    pub fn encode(
        zoom_level: u8,
        grid: &ElevationMatrix,
        geometry: SectionGeometry,
        parallel: bool,
    ) -> Result<Self> {
        let layout = TileLayout::for_grid(grid.width(), grid.height())?;
        let tiles = encode_tiles(grid, &layout, parallel)?;
        let section = Self::from_tiles(zoom_level, layout, geometry, tiles)?;
        debug!(
            "section {zoom_level}: {}x{} tiles, {} body bytes, heights {}..={}",
            layout.tiles_lon,
            layout.tiles_lat,
            section.data_len,
            section.header.min_height,
            section.header.max_height
        );
        Ok(section)
    }

    /// Derive the section widths from already encoded tiles in file order.
    pub fn from_tiles(
        zoom_level: u8,
        layout: TileLayout,
        geometry: SectionGeometry,
        tiles: Vec<Tile>,
    ) -> Result<Self> {
        if tiles.len() != layout.tile_count() {
            return Err(DemError::InvalidInput(format!(
                "layout needs {} tiles, got {}",
                layout.tile_count(),
                tiles.len()
            )));
        }

        let data_len: usize = tiles.iter().map(|t| t.bitstream().len()).sum();
        let offset_size = match data_len {
            0..0x100 => 1,
            0x100..0x1_0000 => 2,
            0x1_0000..0x100_0000 => 3,
            _ => 4,
        };
        let base_fits_byte = tiles
            .iter()
            .all(|t| -128 < t.base_height() && t.base_height() < 128);
        let record = RecordDescriptor {
            offset_size,
            base_size: if base_fits_byte { 1 } else { 2 },
            difference_size: if tiles.iter().any(|t| t.difference_height() > 255) { 2 } else { 1 },
            has_extra: tiles
                .iter()
                .any(|t| t.encoding_type() != EncodingType::Normal),
        };

        for tile in &tiles {
            let base = i64::from(tile.base_height());
            if !(-(1 << 15)..1 << 15).contains(&base) {
                return Err(DemError::FieldOverflow {
                    field: "baseHeight",
                    value: base,
                    size: 2,
                });
            }
            let difference = i64::from(tile.difference_height());
            if difference >= 1 << 16 {
                return Err(DemError::FieldOverflow {
                    field: "differenceHeight",
                    value: difference,
                    size: 2,
                });
            }
        }

        let coded = tiles.iter().filter(|t| !t.bitstream().is_empty());
        let (min_height, max_height) = coded.fold(None, |acc: Option<(i32, i32)>, t| {
            let (lo, hi) = acc.unwrap_or((i32::MAX, i32::MIN));
            Some((lo.min(t.base_height()), hi.max(t.max_height())))
        })
        .unwrap_or((0, 0));

        let header = SectionHeader {
            zoom_level,
            points_per_lat: POINTS_PER_TILE as i32,
            points_per_lon: POINTS_PER_TILE as i32,
            non_std_height: to_i32("nonStdHeight", layout.non_std_height)?,
            non_std_width: to_i32("nonStdWidth", layout.non_std_width)?,
            tiles_lon: to_i32("tilesLon", layout.tiles_lon)?,
            tiles_lat: to_i32("tilesLat", layout.tiles_lat)?,
            record,
            data_offset: 0,
            data_offset2: 0,
            left: geometry.left,
            top: geometry.top,
            points_distance_lat: geometry.points_distance_lat,
            points_distance_lon: geometry.points_distance_lon,
            min_height: to_i16("minHeight", min_height)?,
            max_height: to_i16("maxHeight", max_height)?,
        };

        Ok(Self {
            header,
            tiles,
            data_len,
        })
    }

    pub fn header(&self) -> &SectionHeader {
        &self.header
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Total length of all tile bodies.
    pub fn data_len(&self) -> usize {
        self.data_len
    }

    /// Length of the tile header table.
    pub fn table_len(&self) -> usize {
        self.tiles.len() * self.header.record.tile_desc_size()
    }

    /// Bytes written by [`write_body`](Self::write_body).
    pub fn body_len(&self) -> usize {
        self.table_len() + self.data_len
    }

    /// Fix the absolute file position of the body.
    pub fn place(&mut self, body_offset: usize) -> Result<()> {
        self.header.data_offset = to_i32("dataOffset", body_offset)?;
        self.header.data_offset2 = to_i32("dataOffset2", body_offset + self.table_len())?;
        Ok(())
    }

    /// Write the 60-byte section header.
    pub fn write_header<W: Write>(&self, w: &mut W) -> Result<()> {
        self.header.encode(w)?;
        Ok(())
    }

    /// Write the tile header table followed by all tile bodies.
    pub fn write_body<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut offset = 0usize;
        for tile in &self.tiles {
            let th = TileHeader {
                offset: offset as u32,
                base_height: tile.base_height(),
                difference_height: tile.difference_height(),
                encoding_type: tile.encoding_type(),
            };
            self.header.record.encode_tile(w, &th)?;
            offset += tile.bitstream().len();
        }
        for tile in &self.tiles {
            w.write_all(tile.bitstream())?;
        }
        Ok(())
    }
}

fn encode_tiles(grid: &ElevationMatrix, layout: &TileLayout, parallel: bool) -> Result<Vec<Tile>> {
    let coords: Vec<(usize, usize)> = layout.tiles().collect();
    let encode_one = |&(m, n): &(usize, usize)| {
        let window = grid.window(m * TILE, n * TILE, layout.tile_width(n), layout.tile_height(m))?;
        Tile::encode(&window)
    };

    if parallel {
        #[cfg(feature = "parallel")]
        return coords.par_iter().map(encode_one).collect();
    }
    coords.iter().map(encode_one).collect()
}

fn to_i32(field: &'static str, value: usize) -> Result<i32> {
    i32::try_from(value).map_err(|_| DemError::FieldOverflow {
        field,
        value: value as i64,
        size: 4,
    })
}

fn to_i16(field: &'static str, value: i32) -> Result<i16> {
    i16::try_from(value).map_err(|_| DemError::FieldOverflow {
        field,
        value: i64::from(value),
        size: 2,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::UNDEFINED_HEIGHT;

    fn geometry() -> SectionGeometry {
        SectionGeometry::square(0x0040_0000, 0x0010_0000, 3312)
    }

    #[test]
    fn layout_rows() {
        assert_eq!(TileLayout::for_grid(10, 1).unwrap().tiles_lat, 1);
        let l = TileLayout::for_grid(10, 65).unwrap();
        assert_eq!((l.tiles_lat, l.non_std_height), (1, 65));
        let l = TileLayout::for_grid(10, 66).unwrap();
        assert_eq!((l.tiles_lat, l.non_std_height), (2, 2));
        let l = TileLayout::for_grid(10, 129).unwrap();
        assert_eq!((l.tiles_lat, l.non_std_height), (2, 65));
    }

    #[test]
    fn layout_columns() {
        let l = TileLayout::for_grid(65, 10).unwrap();
        assert_eq!((l.tiles_lon, l.non_std_width), (1, 65));
        let l = TileLayout::for_grid(127, 10).unwrap();
        assert_eq!((l.tiles_lon, l.non_std_width), (1, 127));
        let l = TileLayout::for_grid(128, 10).unwrap();
        assert_eq!((l.tiles_lon, l.non_std_width), (2, 64));
        let l = TileLayout::for_grid(1201, 10).unwrap();
        assert_eq!((l.tiles_lon, l.non_std_width), (18, 113));
        assert!(TileLayout::for_grid(0, 10).is_err());
    }

    #[test]
    fn layout_covers_grid() {
        for (w, h) in [(1, 1), (64, 64), (65, 65), (200, 130), (1201, 1201)] {
            let l = TileLayout::for_grid(w, h).unwrap();
            let total_w: usize = (0..l.tiles_lon).map(|n| l.tile_width(n)).sum();
            let total_h: usize = (0..l.tiles_lat).map(|m| l.tile_height(m)).sum();
            assert_eq!((total_w, total_h), (w, h));
        }
    }

    #[test]
    fn point_distance_defaults() {
        assert_eq!(default_point_distance(3600), 3312);
        assert_eq!(default_point_distance(1200), 9936);
        assert_eq!(align_distance(9942), 9936);
        assert_eq!(align_distance(3320), 3328);
        assert_eq!(align_distance(i32::MAX), i32::MAX - 15);
    }

    #[test]
    fn flat_section_widths() {
        let grid = ElevationMatrix::filled(130, 70, 12).unwrap();
        let s = Section::encode(0, &grid, geometry(), false).unwrap();
        let h = s.header();
        assert_eq!((h.tiles_lon, h.tiles_lat), (2, 2));
        assert_eq!(h.record.offset_size, 1);
        assert_eq!(h.record.base_size, 1);
        assert_eq!(h.record.difference_size, 1);
        assert!(!h.record.has_extra);
        assert_eq!((h.min_height, h.max_height), (0, 0));
        assert_eq!(s.data_len(), 0);
        assert_eq!(s.body_len(), 4 * 3);
    }

    #[test]
    fn widths_follow_worst_tile() {
        let grid = ElevationMatrix::from_fn(128, 64, |r, c| {
            if c < 64 { (r + c) as i32 } else { 400 + ((r * c) % 700) as i32 }
        })
        .unwrap();
        let s = Section::encode(0, &grid, geometry(), false).unwrap();
        let h = s.header();
        assert_eq!(h.record.base_size, 2);
        assert_eq!(h.record.difference_size, 2);
        assert_eq!(h.min_height, 0);
        assert_eq!(h.max_height as i32, s.tiles()[1].max_height());
        assert!(h.record.offset_size >= 2);
    }

    #[test]
    fn undefined_samples_set_extra_byte() {
        let mut grid = ElevationMatrix::filled(64, 64, 5).unwrap();
        grid.set(3, 3, UNDEFINED_HEIGHT).unwrap();
        let s = Section::encode(1, &grid, geometry(), false).unwrap();
        assert!(s.header().record.has_extra);
        assert_eq!(s.header().record.tile_desc_size(), 4);
    }

    #[test]
    fn body_layout() {
        let grid = ElevationMatrix::from_fn(128, 64, |r, c| ((r * 7 + c * 3) % 50) as i32).unwrap();
        let mut s = Section::encode(0, &grid, geometry(), false).unwrap();
        s.place(1000).unwrap();
        assert_eq!(s.header().data_offset, 1000);
        assert_eq!(s.header().data_offset2 as usize, 1000 + s.table_len());

        let mut body = Vec::new();
        s.write_body(&mut body).unwrap();
        assert_eq!(body.len(), s.body_len());

        // Second tile header starts with the first tile's body length.
        let rd = s.header().record;
        let second = rd.decode_tile(&mut &body[rd.tile_desc_size()..]).unwrap();
        assert_eq!(second.offset as usize, s.tiles()[0].bitstream().len());
        let stream = &body[s.table_len()..];
        assert!(stream.starts_with(s.tiles()[0].bitstream()));
    }

    #[test]
    fn narrow_field_overflow_is_fatal() {
        let layout = TileLayout::for_grid(1, 1).unwrap();
        let tile = Tile::encode(&ElevationMatrix::filled(1, 1, 40_000).unwrap()).unwrap();
        let err = Section::from_tiles(0, layout, geometry(), vec![tile]).unwrap_err();
        assert!(err.is_overflow());
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_matches_sequential() {
        let grid = ElevationMatrix::from_fn(300, 200, |r, c| ((r * c) % 1500) as i32).unwrap();
        let a = Section::encode(0, &grid, geometry(), false).unwrap();
        let b = Section::encode(0, &grid, geometry(), true).unwrap();
        assert_eq!(a.tiles(), b.tiles());
        assert_eq!(a.header(), b.header());
    }
}
