//! Bit transpose: within every byte plane, gather bit `b` of eight
//! consecutive elements into one output byte.
//!
//! The first `n8 = n - n % 8` elements form the main region. Bit `b` of byte
//! `k` of element `e` lands in byte `k * n8 + b * (n8 / 8) + e / 8`, bit
//! `e % 8`. The wide backends get there in two steps: a byte transpose into
//! planes, then a per-plane bit transpose built from 8x8 tiles.
//!
//! The last `n % 8` elements follow the main region and are always handled
//! by the scalar tail code.

use crate::backend::{scalar, Backend};
use crate::byte_transpose::validate;
use crate::error::Result;

/// Forward bit transpose of `n` elements into `out`. Lengths are the
/// caller's responsibility and `backend` must already be resolved.
pub(crate) fn trans_bit_elem_into(
    backend: Backend,
    input: &[u8],
    out: &mut [u8],
    n: usize,
    itemsize: usize,
) {
    if backend == Backend::Scalar {
        scalar::trans_bit_elem(input, out, n, itemsize);
        return;
    }
    let n8 = n - n % 8;
    let main = n8 * itemsize;
    if n8 > 0 {
        let mut planes = vec![0u8; main];
        backend.trans_byte_elem(&input[..main], &mut planes, n8, itemsize);
        for (plane, dst) in planes.chunks_exact(n8).zip(out[..main].chunks_exact_mut(n8)) {
            backend.trans_bit_plane(plane, dst);
        }
    }
    scalar::trans_bit_tail(&input[main..], &mut out[main..], n % 8, itemsize);
}

pub(crate) fn untrans_bit_elem_into(
    backend: Backend,
    input: &[u8],
    out: &mut [u8],
    n: usize,
    itemsize: usize,
) {
    if backend == Backend::Scalar {
        scalar::untrans_bit_elem(input, out, n, itemsize);
        return;
    }
    let n8 = n - n % 8;
    let main = n8 * itemsize;
    if n8 > 0 {
        let mut planes = vec![0u8; main];
        for (src, plane) in input[..main].chunks_exact(n8).zip(planes.chunks_exact_mut(n8)) {
            backend.untrans_bit_plane(src, plane);
        }
        backend.untrans_byte_elem(&planes, &mut out[..main], n8, itemsize);
    }
    scalar::untrans_bit_tail(&input[main..], &mut out[main..], n % 8, itemsize);
}

pub(crate) fn transpose_bits(
    backend: Backend,
    input: &[u8],
    n: usize,
    itemsize: usize,
) -> Result<Vec<u8>> {
    validate(input.len(), n, itemsize)?;
    let mut out = vec![0u8; input.len()];
    trans_bit_elem_into(backend.resolve(), input, &mut out, n, itemsize);
    Ok(out)
}

pub(crate) fn untranspose_bits(
    backend: Backend,
    input: &[u8],
    n: usize,
    itemsize: usize,
) -> Result<Vec<u8>> {
    validate(input.len(), n, itemsize)?;
    let mut out = vec![0u8; input.len()];
    untrans_bit_elem_into(backend.resolve(), input, &mut out, n, itemsize);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcg_bytes(len: usize, seed: u64) -> Vec<u8> {
        let mut rng = seed;
        (0..len)
            .map(|_| {
                rng = rng
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                (rng >> 56) as u8
            })
            .collect()
    }

    #[test]
    fn counting_u16_fixture() {
        let input: Vec<u8> = (0..32).collect();
        let expected: [u8; 32] = [
            // Low bytes 0, 2, .., 30: one row per bit, two windows per row.
            0x00, 0x00, 0xAA, 0xAA, 0xCC, 0xCC, 0xF0, 0xF0, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, //
            // High bytes 1, 3, .., 31.
            0xFF, 0xFF, 0xAA, 0xAA, 0xCC, 0xCC, 0xF0, 0xF0, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ];
        for b in Backend::available() {
            let out = transpose_bits(b, &input, 16, 2).unwrap();
            assert_eq!(out, expected, "{b}");
            assert_eq!(untranspose_bits(b, &out, 16, 2).unwrap(), input, "{b}");
        }
    }

    #[test]
    fn backends_match_scalar_with_tails() {
        for &s in &[1usize, 2, 3, 4, 8, 12, 16] {
            for &n in &[1usize, 7, 8, 9, 23, 64, 65, 130] {
                let input = lcg_bytes(n * s, (n * 7 + s) as u64);
                let expected = transpose_bits(Backend::Scalar, &input, n, s).unwrap();
                for b in Backend::available() {
                    let out = transpose_bits(b, &input, n, s).unwrap();
                    assert_eq!(out, expected, "{b} n={n} s={s}");
                    assert_eq!(untranspose_bits(b, &out, n, s).unwrap(), input, "{b} n={n} s={s}");
                }
            }
        }
    }

    #[test]
    fn tail_only_input() {
        // Three 1-byte elements never reach the wide kernels.
        let input = [0xFFu8, 0x00, 0xFF];
        let out = transpose_bits(Backend::best(), &input, 3, 1).unwrap();
        // Tail bit (b * 3 + e) is set for e in {0, 2}: 0b101 repeated.
        assert_eq!(out, [0b0110_1101, 0b1101_1011, 0b1011_0110]);
        assert_eq!(untranspose_bits(Backend::best(), &out, 3, 1).unwrap(), input);
    }

    #[test]
    fn zeros_stay_zero() {
        let input = vec![0u8; 8 * 100];
        for b in Backend::available() {
            assert!(transpose_bits(b, &input, 100, 8).unwrap().iter().all(|&x| x == 0));
        }
    }

    #[test]
    fn empty_input() {
        for b in Backend::available() {
            assert!(transpose_bits(b, &[], 0, 4).unwrap().is_empty());
            assert!(untranspose_bits(b, &[], 0, 4).unwrap().is_empty());
        }
    }
}
