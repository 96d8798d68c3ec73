#![no_main]
use garmin_dem::codec::{decode_tile, EncodingType, Tile};
use garmin_dem::dem::DemReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Whole files: the reader must never panic, only return errors.
    if let Ok(reader) = DemReader::parse(data) {
        for i in 0..reader.sections().len() {
            let _ = reader.decode_section(i);
        }
    }

    // Single tile bodies behind a fuzzed header.
    if data.len() >= 4 {
        let width = 1 + data[0] as usize % 127;
        let height = 1 + data[1] as usize % 65;
        let difference = i32::from(u16::from_le_bytes([data[2], data[3]]));
        let encoding_type = if difference % 2 == 0 {
            EncodingType::Normal
        } else {
            EncodingType::HighestIsUndefined
        };
        let tile = Tile::from_parts(width, height, 0, difference, encoding_type, data[4..].to_vec());
        let _ = decode_tile(&tile);
    }
});
