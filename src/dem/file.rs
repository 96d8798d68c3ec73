// DEM file assembly and parsing.
//
// Layout of a written file:
//
//   [41-byte file header][N × 60-byte section headers]
//   [section 0: tile header table, tile bodies] ... [section N-1: ...]
//
// All offsets stored in headers are absolute file positions; they are fixed
// arithmetically before a single byte is written.

use std::io::Write;

use log::debug;

use crate::codec::{decode_tile, ElevationMatrix, Tile};
use crate::error::{DemError, Result};

use super::header::{
    CreationTime, DEM_HEADER_LEN, DemHeader, POINTS_PER_TILE, SECTION_HEADER_LEN, SectionHeader,
    TileHeader,
};
use super::section::{Section, SectionGeometry, TileLayout};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for writing a DEM file.
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Encode the tiles of each zoom level on the rayon pool (needs the
    /// `parallel` feature; ignored otherwise).
    pub parallel: bool,
    /// Timestamp stored in the file header. `None` uses the current time.
    pub creation_time: Option<CreationTime>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            parallel: cfg!(feature = "parallel"),
            creation_time: None,
        }
    }
}

/// Input of one zoom level.
#[derive(Debug, Clone)]
pub struct ZoomLevel {
    pub grid: ElevationMatrix,
    pub geometry: SectionGeometry,
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// A complete DEM file: header plus placed sections.
#[derive(Debug, Clone)]
pub struct DemFile {
    header: DemHeader,
    sections: Vec<Section>,
}

impl DemFile {
    /// Encode every zoom level (level index = zoom level) and lay the file
    /// out. Any overflow aborts the whole file.
    pub fn encode(levels: &[ZoomLevel], opts: &EncodeOptions) -> Result<Self> {
        let mut sections = Vec::with_capacity(levels.len());
        for (zoom, level) in levels.iter().enumerate() {
            let zoom = u8::try_from(zoom).map_err(|_| {
                DemError::InvalidInput(format!("too many zoom levels ({})", levels.len()))
            })?;
            sections.push(Section::encode(zoom, &level.grid, level.geometry, opts.parallel)?);
        }
        Self::from_sections(sections, opts.creation_time.unwrap_or_else(CreationTime::now))
    }

    /// Place already encoded sections behind the headers.
    pub fn from_sections(mut sections: Vec<Section>, creation_time: CreationTime) -> Result<Self> {
        if sections.is_empty() {
            return Err(DemError::InvalidInput("a DEM file needs at least one section".into()));
        }
        let count = u16::try_from(sections.len()).map_err(|_| {
            DemError::InvalidInput(format!("too many sections ({})", sections.len()))
        })?;

        let mut offset = DEM_HEADER_LEN + sections.len() * SECTION_HEADER_LEN;
        for section in &mut sections {
            section.place(offset)?;
            offset += section.body_len();
        }
        i32::try_from(offset).map_err(|_| DemError::FieldOverflow {
            field: "fileLength",
            value: offset as i64,
            size: 4,
        })?;

        debug!("DEM file: {count} section(s), {offset} bytes");
        Ok(Self {
            header: DemHeader::new(count, creation_time),
            sections,
        })
    }

    pub fn header(&self) -> &DemHeader {
        &self.header
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Total file length in bytes.
    pub fn len(&self) -> usize {
        DEM_HEADER_LEN
            + self
                .sections
                .iter()
                .map(|s| SECTION_HEADER_LEN + s.body_len())
                .sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Write header, all section headers, then all section bodies.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        self.header.encode(w)?;
        for section in &self.sections {
            section.write_header(w)?;
        }
        for section in &self.sections {
            section.write_body(w)?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.len());
        self.write(&mut out)?;
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Parsed view of a DEM file held in memory.
#[derive(Debug, Clone)]
pub struct DemReader<'a> {
    data: &'a [u8],
    header: DemHeader,
    sections: Vec<SectionHeader>,
}

impl<'a> DemReader<'a> {
    /// Parse the file header and all section headers.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let header = DemHeader::decode(&mut &data[..])?;
        let start = usize::try_from(header.sections_offset)
            .map_err(|_| DemError::InvalidInput("negative section header offset".into()))?;
        let mut sections = Vec::with_capacity(usize::from(header.section_count));
        for i in 0..usize::from(header.section_count) {
            let pos = start + i * SECTION_HEADER_LEN;
            let mut slice = data
                .get(pos..pos + SECTION_HEADER_LEN)
                .ok_or(DemError::Truncated("section header"))?;
            sections.push(SectionHeader::decode(&mut slice)?);
        }
        Ok(Self {
            data,
            header,
            sections,
        })
    }

    pub fn header(&self) -> &DemHeader {
        &self.header
    }

    pub fn sections(&self) -> &[SectionHeader] {
        &self.sections
    }

    fn section(&self, index: usize) -> Result<&SectionHeader> {
        self.sections.get(index).ok_or_else(|| {
            DemError::InvalidInput(format!(
                "section {index} out of range ({} sections)",
                self.sections.len()
            ))
        })
    }

    /// Tile header table of section `index`, in file order.
    pub fn tile_headers(&self, index: usize) -> Result<Vec<TileHeader>> {
        let sh = self.section(index)?;
        let layout = layout_of(sh)?;
        let count = layout.tile_count();
        let start = sh.data_offset.max(0) as usize;
        let mut table = count
            .checked_mul(sh.record.tile_desc_size())
            .and_then(|len| self.data.get(start..start.checked_add(len)?))
            .ok_or(DemError::Truncated("tile header table"))?;
        (0..count).map(|_| sh.record.decode_tile(&mut table)).collect()
    }

    /// Tiles of section `index` with their bodies.
    pub fn tiles(&self, index: usize) -> Result<Vec<Tile>> {
        let sh = self.section(index)?;
        let layout = layout_of(sh)?;
        let headers = self.tile_headers(index)?;
        let body_start = sh.data_offset2.max(0) as usize;
        // Bodies run up to the next section's table or the end of the file.
        let body_end = self
            .sections
            .get(index + 1)
            .map_or(self.data.len(), |next| next.data_offset.max(0) as usize);

        let coords: Vec<(usize, usize)> = layout.tiles().collect();
        let mut tiles = Vec::with_capacity(headers.len());
        for (i, (th, &(m, n))) in headers.iter().zip(&coords).enumerate() {
            let from = body_start + th.offset as usize;
            let to = headers
                .get(i + 1)
                .map_or(body_end, |next| body_start + next.offset as usize);
            let body = self
                .data
                .get(from..to)
                .ok_or(DemError::Truncated("tile body"))?;
            tiles.push(Tile::from_parts(
                layout.tile_width(n),
                layout.tile_height(m),
                th.base_height,
                th.difference_height,
                th.encoding_type,
                body.to_vec(),
            ));
        }
        Ok(tiles)
    }

    /// Decode every tile of section `index` and reassemble the grid.
    pub fn decode_section(&self, index: usize) -> Result<ElevationMatrix> {
        let sh = self.section(index)?;
        let layout = layout_of(sh)?;
        let tile = POINTS_PER_TILE as usize;
        let width = (layout.tiles_lon - 1) * tile + layout.non_std_width;
        let height = (layout.tiles_lat - 1) * tile + layout.non_std_height;

        // Reading the tiles first bounds the grid by the file size.
        let tiles = self.tiles(index)?;
        let mut samples = vec![0i32; width * height];
        for (t, (m, n)) in tiles.iter().zip(layout.tiles()) {
            let block = decode_tile(t)?;
            for r in 0..block.height() {
                let dst = (m * tile + r) * width + n * tile;
                let src = &block.samples()[r * block.width()..(r + 1) * block.width()];
                samples[dst..dst + block.width()].copy_from_slice(src);
            }
        }
        ElevationMatrix::new(width, height, samples)
    }
}

fn layout_of(sh: &SectionHeader) -> Result<TileLayout> {
    let positive = |field: &str, v: i32| {
        usize::try_from(v)
            .ok()
            .filter(|&v| v > 0)
            .ok_or_else(|| DemError::InvalidInput(format!("section {field} {v} must be positive")))
    };
    let layout = TileLayout {
        tiles_lat: positive("tilesLat", sh.tiles_lat)?,
        tiles_lon: positive("tilesLon", sh.tiles_lon)?,
        non_std_height: positive("nonStdHeight", sh.non_std_height)?,
        non_std_width: positive("nonStdWidth", sh.non_std_width)?,
    };
    // A last tile never spans two full tiles.
    let limit = 2 * POINTS_PER_TILE as usize;
    if layout.non_std_height >= limit || layout.non_std_width >= limit {
        return Err(DemError::InvalidInput(format!(
            "last tile {}x{} is larger than two tiles",
            layout.non_std_width, layout.non_std_height
        )));
    }
    layout
        .tiles_lat
        .checked_mul(layout.tiles_lon)
        .ok_or_else(|| DemError::InvalidInput("tile count overflows".into()))?;
    Ok(layout)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
