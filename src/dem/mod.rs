// Garmin DEM container: file header, zoom-level sections and tile tables.
//
// # Modules
//
// - `header`  : file/section/tile header layouts and the record descriptor
// - `section` : tile layout, geometry, width derivation and section output
// - `file`    : file assembly (DemFile) and the in-memory reader (DemReader)

pub mod file;
pub mod header;
pub mod section;

pub use file::{DemFile, DemReader, EncodeOptions, ZoomLevel};
pub use header::{CreationTime, DemHeader, RecordDescriptor, SectionHeader, TileHeader};
pub use section::{Section, SectionGeometry, TileLayout};
