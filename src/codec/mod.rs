// Per-tile elevation codec.
//
// A tile is encoded independently of every other tile: heights become deltas
// against the tile minimum, and the deltas are scanned row by row with three
// coding paths (plateau runs, the sample following a run, and standard
// samples predicted from their neighbors).
//
// # Modules
//
// - `tables`    : fixed plateau tables and per-tile limits
// - `matrix`    : ElevationMatrix input grid and the undefined sentinel
// - `plateau`   : plateau run-length coder with its table cursor
// - `predictor` : adaptive hybrid/length value predictor
// - `tile`      : tile encoder (scan loop, header fields)
// - `decoder`   : tile decoder, the inverse scan

pub mod decoder;
pub mod matrix;
pub mod plateau;
pub mod predictor;
pub mod tables;
pub mod tile;

pub use decoder::decode_tile;
pub use matrix::{ElevationMatrix, UNDEFINED_HEIGHT};
pub use tile::{EncodingType, Tile};
