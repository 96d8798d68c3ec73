// Fixed tables and per-tile constants of the DEM bitstream format.
//
// All step functions are keyed by the tile's difference height (max - min).

/// Run-length units consumed per `1` bit of a plateau length.
pub const PLATEAU_UNIT: [usize; 23] = [
    1, 1, 1, 1, 2, 2, 2, 2, 4, 4, 4, 4, 8, 8, 8, 8, 16, 16, 32, 32, 64, 64, 128,
];

/// Width of the binary remainder that closes a plateau length.
pub const PLATEAU_BIN_BITS: [u32; 23] = [
    0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 5, 5, 6, 6, 7, 8,
];

/// Last valid plateau table index; the cursor saturates here.
pub const PLATEAU_TABLE_LAST: usize = PLATEAU_UNIT.len() - 1;

/// Longest run of zero bits that still denotes a valid length part.
pub fn max_length_zero_bits(difference_height: i32) -> u32 {
    match difference_height {
        i32::MIN..2 => 15,
        2..4 => 16,
        4..8 => 17,
        8..16 => 18,
        16..32 => 19,
        32..64 => 20,
        64..128 => 21,
        128..256 => 22,
        256..512 => 25,
        512..1024 => 28,
        1024..2048 => 31,
        2048..4096 => 34,
        4096..8192 => 37,
        8192..16384 => 40,
        _ => 43,
    }
}

/// Initial hybrid unit of every predictor of a tile.
pub fn start_hunit(difference_height: i32) -> i32 {
    match difference_height {
        i32::MIN..0x9f => 1,
        0x9f..0x11f => 2,
        0x11f..0x21f => 4,
        0x21f..0x41f => 8,
        0x41f..0x81f => 16,
        0x81f..0x101f => 32,
        0x101f..0x201f => 64,
        0x201f..0x401f => 128,
        _ => 256,
    }
}

/// Round down to the nearest power of two; 0 for non-positive input.
pub fn normalize_hunit(hu: i32) -> i32 {
    if hu > 0 { 1 << (31 - hu.leading_zeros()) } else { 0 }
}

/// Bias added to the hybrid statistics of a tile.
pub fn unit_delta(difference_height: i32) -> i32 {
    (difference_height - 0x5f).max(0) / 0x40
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_parallel() {
        assert_eq!(PLATEAU_UNIT.len(), PLATEAU_BIN_BITS.len());
        // A remainder after stepping back one slot always fits the width of
        // that slot.
        for pos in 1..PLATEAU_UNIT.len() {
            let rest_max = PLATEAU_UNIT[pos] - 1;
            assert!(rest_max < 1usize << PLATEAU_BIN_BITS[pos - 1], "slot {pos}");
        }
    }

    #[test]
    fn zero_bit_limits() {
        assert_eq!(max_length_zero_bits(0), 15);
        assert_eq!(max_length_zero_bits(1), 15);
        assert_eq!(max_length_zero_bits(3), 16);
        assert_eq!(max_length_zero_bits(255), 22);
        assert_eq!(max_length_zero_bits(256), 25);
        assert_eq!(max_length_zero_bits(16383), 40);
        assert_eq!(max_length_zero_bits(16384), 43);
    }

    #[test]
    fn start_units() {
        assert_eq!(start_hunit(3), 1);
        assert_eq!(start_hunit(0x9e), 1);
        assert_eq!(start_hunit(0x9f), 2);
        assert_eq!(start_hunit(0x401e), 128);
        assert_eq!(start_hunit(0x401f), 256);
    }

    #[test]
    fn hunit_normalisation() {
        assert_eq!(normalize_hunit(-5), 0);
        assert_eq!(normalize_hunit(0), 0);
        assert_eq!(normalize_hunit(1), 1);
        assert_eq!(normalize_hunit(3), 2);
        assert_eq!(normalize_hunit(64), 64);
        assert_eq!(normalize_hunit(127), 64);
    }

    #[test]
    fn unit_delta_bias() {
        assert_eq!(unit_delta(0), 0);
        assert_eq!(unit_delta(0x5f + 0x3f), 0);
        assert_eq!(unit_delta(0x5f + 0x40), 1);
        assert_eq!(unit_delta(1000), (1000 - 0x5f) / 0x40);
    }
}
