//! Bit-by-bit reference kernels.
//!
//! Nothing here tries to be fast. These loops define the layout the other
//! backends must reproduce exactly, and they handle every `n`, including the
//! trailing `n % 8` elements that the wide paths hand back.

use crate::kernel::{transpose_tile_reference, Tile};

pub(crate) fn transpose_tile(tile: &Tile) -> Tile {
    transpose_tile_reference(tile)
}

/// `out[k * n + i] = input[i * s + k]`.
pub(crate) fn trans_byte_elem(input: &[u8], out: &mut [u8], n: usize, s: usize) {
    for i in 0..n {
        for k in 0..s {
            out[k * n + i] = input[i * s + k];
        }
    }
}

/// `out[i * s + k] = input[k * n + i]`.
pub(crate) fn untrans_byte_elem(input: &[u8], out: &mut [u8], n: usize, s: usize) {
    for i in 0..n {
        for k in 0..s {
            out[i * s + k] = input[k * n + i];
        }
    }
}

/// Bit transpose of one byte plane whose length is a multiple of 8.
///
/// Bit `b` of plane byte `e` lands in output byte `b * (len / 8) + e / 8`,
/// bit `e % 8`.
pub(crate) fn trans_bit_plane(plane: &[u8], out: &mut [u8]) {
    let nw = plane.len() / 8;
    out.fill(0);
    for (e, &byte) in plane.iter().enumerate() {
        for b in 0..8 {
            if (byte >> b) & 1 != 0 {
                out[b * nw + e / 8] |= 1 << (e % 8);
            }
        }
    }
}

pub(crate) fn untrans_bit_plane(input: &[u8], plane: &mut [u8]) {
    let nw = plane.len() / 8;
    for (e, dst) in plane.iter_mut().enumerate() {
        let mut byte = 0u8;
        for b in 0..8 {
            byte |= ((input[b * nw + e / 8] >> (e % 8)) & 1) << b;
        }
        *dst = byte;
    }
}

/// Full bit transpose for any `n`, straight from the index formula.
pub(crate) fn trans_bit_elem(input: &[u8], out: &mut [u8], n: usize, s: usize) {
    let n8 = n - n % 8;
    let nw = n8 / 8;
    let main = n8 * s;
    out[..main].fill(0);
    for e in 0..n8 {
        for k in 0..s {
            let byte = input[e * s + k];
            for b in 0..8 {
                if (byte >> b) & 1 != 0 {
                    out[k * n8 + b * nw + e / 8] |= 1 << (e % 8);
                }
            }
        }
    }
    trans_bit_tail(&input[main..], &mut out[main..], n % 8, s);
}

pub(crate) fn untrans_bit_elem(input: &[u8], out: &mut [u8], n: usize, s: usize) {
    let n8 = n - n % 8;
    let nw = n8 / 8;
    let main = n8 * s;
    for e in 0..n8 {
        for k in 0..s {
            let mut byte = 0u8;
            for b in 0..8 {
                byte |= ((input[k * n8 + b * nw + e / 8] >> (e % 8)) & 1) << b;
            }
            out[e * s + k] = byte;
        }
    }
    untrans_bit_tail(&input[main..], &mut out[main..], n % 8, s);
}

/// Bit transpose of the last `t < 8` elements.
///
/// Same plane-then-bit-then-element order as the main region, packed with
/// `t` bits per (plane, bit) row instead of eight: element `e`, byte `k`,
/// bit `b` goes to tail bit `(k * 8 + b) * t + e`, LSB first.
pub(crate) fn trans_bit_tail(input: &[u8], out: &mut [u8], t: usize, s: usize) {
    debug_assert!(t < 8);
    out.fill(0);
    for e in 0..t {
        for k in 0..s {
            let byte = input[e * s + k];
            for b in 0..8 {
                if (byte >> b) & 1 != 0 {
                    let q = (k * 8 + b) * t + e;
                    out[q / 8] |= 1 << (q % 8);
                }
            }
        }
    }
}

pub(crate) fn untrans_bit_tail(input: &[u8], out: &mut [u8], t: usize, s: usize) {
    debug_assert!(t < 8);
    for e in 0..t {
        for k in 0..s {
            let mut byte = 0u8;
            for b in 0..8 {
                let q = (k * 8 + b) * t + e;
                byte |= ((input[q / 8] >> (q % 8)) & 1) << b;
            }
            out[e * s + k] = byte;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_element_tail_keeps_bit_order() {
        // With one element, tail bit (k * 8 + b) is bit b of byte k: identity.
        let input = [0xA5u8, 0x3C, 0x01];
        let mut out = [0u8; 3];
        trans_bit_tail(&input, &mut out, 1, 3);
        assert_eq!(out, input);
    }

    #[test]
    fn tail_of_two_interleaves_bits() {
        // Element 0 = 0xFF, element 1 = 0x00: bits alternate 1,0,1,0...
        let input = [0xFFu8, 0x00];
        let mut out = [0u8; 2];
        trans_bit_tail(&input, &mut out, 2, 1);
        assert_eq!(out, [0x55, 0x55]);

        let mut back = [0u8; 2];
        untrans_bit_tail(&out, &mut back, 2, 1);
        assert_eq!(back, input);
    }

    #[test]
    fn plane_roundtrip() {
        let plane: Vec<u8> = (0..64u8).map(|x| x.wrapping_mul(37) ^ 0x5A).collect();
        let mut bits = vec![0u8; 64];
        trans_bit_plane(&plane, &mut bits);
        let mut back = vec![0u8; 64];
        untrans_bit_plane(&bits, &mut back);
        assert_eq!(back, plane);
    }

    #[test]
    fn byte_transpose_groups_planes() {
        let input = [1u8, 2, 3, 4, 5, 6];
        let mut out = [0u8; 6];
        trans_byte_elem(&input, &mut out, 3, 2);
        assert_eq!(out, [1, 3, 5, 2, 4, 6]);
        let mut back = [0u8; 6];
        untrans_byte_elem(&out, &mut back, 3, 2);
        assert_eq!(back, input);
    }
}
