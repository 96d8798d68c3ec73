// DEM file header, section header and tile header encoding/decoding.
//
// All multi-byte integers are little-endian. The file header is the 21-byte
// common header shared by Garmin subfiles followed by the DEM-specific part.

use std::io::{self, Read, Write};

use bitflags::bitflags;
use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::codec::EncodingType;
use crate::error::{DemError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Subfile type stored in the common header.
pub const DEM_MAGIC: [u8; 10] = *b"GARMIN DEM";

/// Length of the file header.
pub const DEM_HEADER_LEN: usize = 41;

/// Length of one section header.
pub const SECTION_HEADER_LEN: usize = 60;

/// Samples per standard tile edge.
pub const POINTS_PER_TILE: u32 = 64;

/// File flag: elevations are in meters (feet otherwise).
pub const FLAG_METERS: i32 = 1;

// ---------------------------------------------------------------------------
// Little-endian helpers
// ---------------------------------------------------------------------------

fn put_u16<W: Write>(w: &mut W, v: u16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn put_i32<W: Write>(w: &mut W, v: i32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn get_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

fn get_u16<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_le_bytes(b))
}

fn get_i32<R: Read>(r: &mut R) -> io::Result<i32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(i32::from_le_bytes(b))
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

// ---------------------------------------------------------------------------
// Creation time
// ---------------------------------------------------------------------------

/// Calendar timestamp of the common header (7 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreationTime {
    pub year: u16,
    /// 1..=12
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl CreationTime {
    /// Calendar fields of a UTC date-time. Years outside `0..=65535` are
    /// clamped to the two-byte field.
    pub fn from_datetime(t: &DateTime<Utc>) -> Self {
        Self {
            year: t.year().clamp(0, i32::from(u16::MAX)) as u16,
            month: t.month() as u8,
            day: t.day() as u8,
            hour: t.hour() as u8,
            minute: t.minute() as u8,
            second: t.second() as u8,
        }
    }

    /// UTC calendar time of a Unix timestamp; out-of-range timestamps map to
    /// the epoch.
    pub fn from_unix(secs: i64) -> Self {
        Self::from_datetime(&DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }

    /// Current UTC time.
    pub fn now() -> Self {
        Self::from_datetime(&Utc::now())
    }

    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        put_u16(w, self.year)?;
        w.write_all(&[self.month, self.day, self.hour, self.minute, self.second])
    }

    pub fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let year = get_u16(r)?;
        let mut b = [0u8; 5];
        r.read_exact(&mut b)?;
        Ok(Self {
            year,
            month: b[0],
            day: b[1],
            hour: b[2],
            minute: b[3],
            second: b[4],
        })
    }
}

// ---------------------------------------------------------------------------
// File header
// ---------------------------------------------------------------------------

/// The 41-byte header at offset 0 of a DEM file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemHeader {
    pub creation_time: CreationTime,
    /// Non-zero means the file is locked.
    pub lock_flag: u8,
    /// Bit 0: elevations in meters.
    pub flags: i32,
    pub section_count: u16,
    /// Absolute offset of the first section header.
    pub sections_offset: i32,
}

impl DemHeader {
    pub fn new(section_count: u16, creation_time: CreationTime) -> Self {
        Self {
            creation_time,
            lock_flag: 0,
            flags: FLAG_METERS,
            section_count,
            sections_offset: DEM_HEADER_LEN as i32,
        }
    }

    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        put_u16(w, DEM_HEADER_LEN as u16)?;
        w.write_all(&DEM_MAGIC)?;
        w.write_all(&[1, self.lock_flag])?;
        self.creation_time.encode(w)?;

        put_i32(w, self.flags)?;
        put_u16(w, self.section_count)?;
        put_i32(w, 0)?;
        put_u16(w, SECTION_HEADER_LEN as u16)?;
        put_i32(w, self.sections_offset)?;
        put_i32(w, 1)
    }

    pub fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let header_len = get_u16(r)?;
        if usize::from(header_len) < DEM_HEADER_LEN {
            return Err(invalid(format!("DEM header length {header_len} too short")));
        }
        let mut magic = [0u8; 10];
        r.read_exact(&mut magic)?;
        if magic != DEM_MAGIC {
            return Err(invalid(format!(
                "not a DEM file: type {:?}",
                String::from_utf8_lossy(&magic)
            )));
        }
        let _unknown = get_u8(r)?;
        let lock_flag = get_u8(r)?;
        let creation_time = CreationTime::decode(r)?;

        let flags = get_i32(r)?;
        let section_count = get_u16(r)?;
        let _reserved = get_i32(r)?;
        let section_len = get_u16(r)?;
        if usize::from(section_len) != SECTION_HEADER_LEN {
            return Err(invalid(format!(
                "unsupported section header length {section_len}"
            )));
        }
        let sections_offset = get_i32(r)?;
        let _one = get_i32(r)?;

        // Skip header bytes newer writers may have appended.
        io::copy(
            &mut r.by_ref().take((usize::from(header_len) - DEM_HEADER_LEN) as u64),
            &mut io::sink(),
        )?;

        Ok(Self {
            creation_time,
            lock_flag,
            flags,
            section_count,
            sections_offset,
        })
    }
}

// ---------------------------------------------------------------------------
// Record descriptor
// ---------------------------------------------------------------------------

bitflags! {
    /// Size flags above the 2-bit offset-size field of the record descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RecordFlags: u16 {
        const BASE_TWO_BYTES = 1 << 2;
        const DIFFERENCE_TWO_BYTES = 1 << 3;
        const HAS_EXTRA = 1 << 4;
    }
}

/// Byte widths of the tile header fields of one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordDescriptor {
    /// 1..=4
    pub offset_size: usize,
    /// 1 or 2
    pub base_size: usize,
    /// 1 or 2
    pub difference_size: usize,
    /// Whether each tile header ends with an encoding type byte.
    pub has_extra: bool,
}

impl RecordDescriptor {
    /// Bytes per tile header.
    pub fn tile_desc_size(&self) -> usize {
        self.offset_size + self.base_size + self.difference_size + usize::from(self.has_extra)
    }

    pub fn to_bits(&self) -> u16 {
        let mut flags = RecordFlags::empty();
        flags.set(RecordFlags::BASE_TWO_BYTES, self.base_size > 1);
        flags.set(RecordFlags::DIFFERENCE_TWO_BYTES, self.difference_size > 1);
        flags.set(RecordFlags::HAS_EXTRA, self.has_extra);
        (self.offset_size as u16 - 1) & 0b11 | flags.bits()
    }

    pub fn from_bits(bits: u16) -> Self {
        let flags = RecordFlags::from_bits_truncate(bits);
        Self {
            offset_size: usize::from(bits & 0b11) + 1,
            base_size: if flags.contains(RecordFlags::BASE_TWO_BYTES) { 2 } else { 1 },
            difference_size: if flags.contains(RecordFlags::DIFFERENCE_TWO_BYTES) { 2 } else { 1 },
            has_extra: flags.contains(RecordFlags::HAS_EXTRA),
        }
    }

    /// Write one tile header with these widths.
    ///
    /// Fails with [`DemError::FieldOverflow`] when a value does not fit.
    pub fn encode_tile<W: Write>(&self, w: &mut W, tile: &TileHeader) -> Result<()> {
        put_unsigned(w, "offset", i64::from(tile.offset), self.offset_size)?;
        put_signed(w, "baseHeight", i64::from(tile.base_height), self.base_size)?;
        put_unsigned(w, "differenceHeight", i64::from(tile.difference_height), self.difference_size)?;
        if self.has_extra {
            w.write_all(&[tile.encoding_type.as_byte()])?;
        }
        Ok(())
    }

    /// Read one tile header with these widths.
    pub fn decode_tile<R: Read>(&self, r: &mut R) -> Result<TileHeader> {
        let offset = get_le(r, self.offset_size)? as u32;
        let raw_base = get_le(r, self.base_size)?;
        let shift = 64 - 8 * self.base_size as u32;
        let base_height = ((raw_base << shift) as i64 >> shift) as i32;
        let difference_height = get_le(r, self.difference_size)? as i32;
        let encoding_type = if self.has_extra {
            EncodingType::try_from(get_u8(r)?)?
        } else {
            EncodingType::Normal
        };
        Ok(TileHeader {
            offset,
            base_height,
            difference_height,
            encoding_type,
        })
    }
}

fn put_unsigned<W: Write>(w: &mut W, field: &'static str, value: i64, size: usize) -> Result<()> {
    if value < 0 || value >= 1i64 << (8 * size) {
        return Err(DemError::FieldOverflow { field, value, size });
    }
    w.write_all(&value.to_le_bytes()[..size])?;
    Ok(())
}

fn put_signed<W: Write>(w: &mut W, field: &'static str, value: i64, size: usize) -> Result<()> {
    let half = 1i64 << (8 * size - 1);
    if value < -half || value >= half {
        return Err(DemError::FieldOverflow { field, value, size });
    }
    w.write_all(&value.to_le_bytes()[..size])?;
    Ok(())
}

fn get_le<R: Read>(r: &mut R, size: usize) -> io::Result<u64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b[..size])?;
    Ok(u64::from_le_bytes(b))
}

/// Header fields of one tile as stored in the section's tile table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileHeader {
    /// Body offset relative to the section's `data_offset2`.
    pub offset: u32,
    pub base_height: i32,
    pub difference_height: i32,
    pub encoding_type: EncodingType,
}

// ---------------------------------------------------------------------------
// Section header
// ---------------------------------------------------------------------------

/// One 60-byte section header (one zoom level).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    pub zoom_level: u8,
    pub points_per_lat: i32,
    pub points_per_lon: i32,
    /// Rows of the last tile row.
    pub non_std_height: i32,
    /// Columns of the last tile column.
    pub non_std_width: i32,
    pub tiles_lon: i32,
    pub tiles_lat: i32,
    pub record: RecordDescriptor,
    /// Absolute offset of the tile header table.
    pub data_offset: i32,
    /// Absolute offset of the first tile body.
    pub data_offset2: i32,
    pub left: i32,
    pub top: i32,
    pub points_distance_lat: i32,
    pub points_distance_lon: i32,
    pub min_height: i16,
    pub max_height: i16,
}

impl SectionHeader {
    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&[0, self.zoom_level])?;
        put_i32(w, self.points_per_lat)?;
        put_i32(w, self.points_per_lon)?;
        put_i32(w, self.non_std_height - 1)?;
        put_i32(w, self.non_std_width - 1)?;
        put_u16(w, 0)?;
        put_i32(w, self.tiles_lon - 1)?;
        put_i32(w, self.tiles_lat - 1)?;
        put_u16(w, self.record.to_bits())?;
        put_u16(w, self.record.tile_desc_size() as u16)?;
        put_i32(w, self.data_offset)?;
        put_i32(w, self.data_offset2)?;
        put_i32(w, self.left)?;
        put_i32(w, self.top)?;
        put_i32(w, self.points_distance_lat)?;
        put_i32(w, self.points_distance_lon)?;
        w.write_all(&self.min_height.to_le_bytes())?;
        w.write_all(&self.max_height.to_le_bytes())
    }

    pub fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let _reserved = get_u8(r)?;
        let zoom_level = get_u8(r)?;
        let points_per_lat = get_i32(r)?;
        let points_per_lon = get_i32(r)?;
        let non_std_height = get_i32(r)?.wrapping_add(1);
        let non_std_width = get_i32(r)?.wrapping_add(1);
        let _flags = get_u16(r)?;
        let tiles_lon = get_i32(r)?.wrapping_add(1);
        let tiles_lat = get_i32(r)?.wrapping_add(1);
        let record = RecordDescriptor::from_bits(get_u16(r)?);
        let tile_desc_size = get_u16(r)?;
        if usize::from(tile_desc_size) != record.tile_desc_size() {
            return Err(invalid(format!(
                "tile descriptor size {tile_desc_size} disagrees with record descriptor ({})",
                record.tile_desc_size()
            )));
        }
        Ok(Self {
            zoom_level,
            points_per_lat,
            points_per_lon,
            non_std_height,
            non_std_width,
            tiles_lon,
            tiles_lat,
            record,
            data_offset: get_i32(r)?,
            data_offset2: get_i32(r)?,
            left: get_i32(r)?,
            top: get_i32(r)?,
            points_distance_lat: get_i32(r)?,
            points_distance_lon: get_i32(r)?,
            min_height: get_u16(r)? as i16,
            max_height: get_u16(r)? as i16,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
