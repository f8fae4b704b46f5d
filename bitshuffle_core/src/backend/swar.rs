//! Portable eight-lane kernels (the `Wide8` backend).
//!
//! Eight bytes are treated as one `u64` register: the bit transpose of an
//! 8-element window is a single [`trans_bit_8x8`], and the byte transpose is
//! unrolled over groups of eight elements. Available on every target.
//!
//! The `*_from` variants start partway through the data and finish it
//! element by element; the SIMD backends use them for their remainders.

use crate::kernel::{trans_bit_8x8, Tile, TILE_BYTES};

pub(crate) fn transpose_tile(tile: &Tile) -> Tile {
    let mut out = [0u8; TILE_BYTES];
    for (src, dst) in tile.chunks_exact(8).zip(out.chunks_exact_mut(8)) {
        let mut half = [0u8; 8];
        half.copy_from_slice(src);
        dst.copy_from_slice(&trans_bit_8x8(u64::from_le_bytes(half)).to_le_bytes());
    }
    out
}

pub(crate) fn trans_byte_elem(input: &[u8], out: &mut [u8], n: usize, s: usize) {
    trans_byte_elem_from(input, out, n, s, 0);
}

pub(crate) fn untrans_byte_elem(input: &[u8], out: &mut [u8], n: usize, s: usize) {
    untrans_byte_elem_from(input, out, n, s, 0);
}

/// Byte transpose of elements `start..n`.
pub(crate) fn trans_byte_elem_from(input: &[u8], out: &mut [u8], n: usize, s: usize, start: usize) {
    let mut ii = start;
    // Split so the compiler can unroll the inner loop.
    while ii + 8 <= n {
        for jj in 0..s {
            let row = &mut out[jj * n + ii..jj * n + ii + 8];
            for (kk, dst) in row.iter_mut().enumerate() {
                *dst = input[(ii + kk) * s + jj];
            }
        }
        ii += 8;
    }
    for i in ii..n {
        for jj in 0..s {
            out[jj * n + i] = input[i * s + jj];
        }
    }
}

pub(crate) fn untrans_byte_elem_from(
    input: &[u8],
    out: &mut [u8],
    n: usize,
    s: usize,
    start: usize,
) {
    let mut ii = start;
    while ii + 8 <= n {
        for jj in 0..s {
            let row = &input[jj * n + ii..jj * n + ii + 8];
            for (kk, &src) in row.iter().enumerate() {
                out[(ii + kk) * s + jj] = src;
            }
        }
        ii += 8;
    }
    for i in ii..n {
        for jj in 0..s {
            out[i * s + jj] = input[jj * n + i];
        }
    }
}

pub(crate) fn trans_bit_plane(plane: &[u8], out: &mut [u8]) {
    trans_bit_plane_from(plane, out, 0);
}

pub(crate) fn untrans_bit_plane(input: &[u8], plane: &mut [u8]) {
    untrans_bit_plane_from(input, plane, 0);
}

/// Bit transpose of plane windows `start..len / 8`, one `u64` per window.
pub(crate) fn trans_bit_plane_from(plane: &[u8], out: &mut [u8], start: usize) {
    let nw = plane.len() / 8;
    for w in start..nw {
        let mut rows = [0u8; 8];
        rows.copy_from_slice(&plane[8 * w..8 * w + 8]);
        let cols = trans_bit_8x8(u64::from_le_bytes(rows)).to_le_bytes();
        for (b, &col) in cols.iter().enumerate() {
            out[b * nw + w] = col;
        }
    }
}

pub(crate) fn untrans_bit_plane_from(input: &[u8], plane: &mut [u8], start: usize) {
    let nw = plane.len() / 8;
    for w in start..nw {
        let mut cols = [0u8; 8];
        for (b, col) in cols.iter_mut().enumerate() {
            *col = input[b * nw + w];
        }
        let rows = trans_bit_8x8(u64::from_le_bytes(cols)).to_le_bytes();
        plane[8 * w..8 * w + 8].copy_from_slice(&rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::scalar;

    #[test]
    fn byte_transpose_matches_scalar_for_odd_counts() {
        for &(n, s) in &[(1usize, 3usize), (7, 5), (8, 1), (17, 2), (33, 12)] {
            let input: Vec<u8> = (0..n * s).map(|i| (i * 31 + 7) as u8).collect();
            let mut fast = vec![0u8; n * s];
            let mut slow = vec![0u8; n * s];
            trans_byte_elem(&input, &mut fast, n, s);
            scalar::trans_byte_elem(&input, &mut slow, n, s);
            assert_eq!(fast, slow, "n={n} s={s}");

            let mut back = vec![0u8; n * s];
            untrans_byte_elem(&fast, &mut back, n, s);
            assert_eq!(back, input, "n={n} s={s}");
        }
    }

    #[test]
    fn bit_plane_matches_scalar() {
        let plane: Vec<u8> = (0..96u32).map(|i| (i * 97 ^ 0x33) as u8).collect();
        let mut fast = vec![0u8; plane.len()];
        let mut slow = vec![0u8; plane.len()];
        trans_bit_plane(&plane, &mut fast);
        scalar::trans_bit_plane(&plane, &mut slow);
        assert_eq!(fast, slow);

        let mut back = vec![0u8; plane.len()];
        untrans_bit_plane(&fast, &mut back);
        assert_eq!(back, plane);
    }
}
