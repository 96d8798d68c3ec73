// Bit-level I/O for DEM tile bitstreams.
//
// Tile bodies are packed MSB-first: the first bit written becomes bit 7 of the
// first byte. Every value primitive of the format is defined here so that the
// encoder and the decoder share one definition of each bit layout.
//
// # Modules
//
// - `writer` : BitWriter (bit sink) plus binary/unary/hybrid/escape writers
// - `reader` : BitReader, the mirror image used by the tile decoder

pub mod reader;
pub mod writer;

pub use reader::BitReader;
pub use writer::BitWriter;
