#![no_main]
use garmin_dem::codec::{decode_tile, ElevationMatrix, Tile, UNDEFINED_HEIGHT};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }

    // First bytes pick the shape and the height scale.
    let width = 1 + data[0] as usize % 80;
    let scale = 1 + i32::from(data[1] % 64);
    let payload = &data[2..];
    let height = payload.len().div_ceil(width).clamp(1, 80);

    let grid = ElevationMatrix::from_fn(width, height, |r, c| {
        match payload.get(r * width + c) {
            Some(255) => UNDEFINED_HEIGHT,
            Some(&b) => i32::from(b) * scale - 500,
            None => 0,
        }
    })
    .unwrap();

    let tile = Tile::encode(&grid).unwrap();
    assert_eq!(decode_tile(&tile).unwrap(), grid);
});
