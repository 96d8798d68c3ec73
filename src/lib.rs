//! garmin-dem: Garmin DEM (hill-shading elevation) files in Rust.
//!
//! The crate provides:
//! - The per-tile elevation bitstream codec (`codec`), encoder and decoder
//! - Bit-level primitives shared by both directions (`bits`)
//! - The DEM container: file header, zoom-level sections and tile tables (`dem`)
//! - File-oriented helpers for SRTM `.hgt` input (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use garmin_dem::codec::{decode_tile, ElevationMatrix, Tile};
//!
//! let grid = ElevationMatrix::from_fn(65, 65, |r, c| (r * 3 + c) as i32).unwrap();
//! let tile = Tile::encode(&grid).unwrap();
//! assert_eq!(decode_tile(&tile).unwrap(), grid);
//! ```

pub mod bits;
pub mod codec;
pub mod dem;
pub mod error;
pub mod io;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{DemError, Result};
