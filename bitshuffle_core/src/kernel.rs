//! The bit-matrix kernel: transposes of 8x8 bit matrices.
//!
//! A [`Tile`] is sixteen bytes, the width of one SSE register, viewed as two
//! independent 8x8 bit matrices (bytes `0..8` and `8..16`). Row `j` of a
//! matrix is byte `j`, column `i` is bit `i` (bit 0 is the least significant).
//! Transposing a half means output byte `i` has bit `j` set iff input byte `j`
//! has bit `i` set.
//!
//! Every backend provides its own tile transpose; they must all agree with
//! [`transpose_tile_reference`].

/// Bytes in one kernel tile.
pub const TILE_BYTES: usize = 16;

pub type Tile = [u8; TILE_BYTES];

/// Transpose an 8x8 bit matrix packed little-endian into a `u64`
/// (byte `j` of the integer is row `j`). The transpose is its own inverse.
///
/// Three rounds of delta swaps, from Hacker's Delight.
#[inline]
pub fn trans_bit_8x8(mut x: u64) -> u64 {
    let mut t;
    t = (x ^ (x >> 7)) & 0x00AA_00AA_00AA_00AA;
    x = x ^ t ^ (t << 7);
    t = (x ^ (x >> 14)) & 0x0000_CCCC_0000_CCCC;
    x = x ^ t ^ (t << 14);
    t = (x ^ (x >> 28)) & 0x0000_0000_F0F0_F0F0;
    x ^ t ^ (t << 28)
}

/// Bit-by-bit transpose of eight rows.
#[inline]
pub fn transpose_8x8_reference(rows: &[u8; 8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    for (i, col) in out.iter_mut().enumerate() {
        for (j, row) in rows.iter().enumerate() {
            *col |= ((row >> i) & 1) << j;
        }
    }
    out
}

/// Reference tile transpose, one bit at a time.
pub fn transpose_tile_reference(tile: &Tile) -> Tile {
    let mut out = [0u8; TILE_BYTES];
    for half in 0..2 {
        let base = half * 8;
        let mut rows = [0u8; 8];
        rows.copy_from_slice(&tile[base..base + 8]);
        out[base..base + 8].copy_from_slice(&transpose_8x8_reference(&rows));
    }
    out
}
