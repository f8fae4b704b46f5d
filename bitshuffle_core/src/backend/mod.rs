//! Instruction-set specific implementations of the transpose kernels.
//!
//! | Backend  | Lane width | Requires        |
//! |----------|------------|-----------------|
//! | `Scalar` | 1 bit      | nothing         |
//! | `Wide8`  | 8 bytes    | nothing (SWAR)  |
//! | `Wide16` | 16 bytes   | x86 SSE2        |
//! | `Wide32` | 32 bytes   | x86 AVX2 + SSE2 |
//!
//! Every backend produces bit-for-bit the same output as `Scalar`.

pub(crate) mod scalar;
pub(crate) mod swar;

#[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
pub(crate) mod avx2;
#[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
pub(crate) mod sse2;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cpu_detect;
use crate::kernel::Tile;

/// A concrete transpose implementation, ordered from narrowest to widest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Scalar,
    Wide8,
    Wide16,
    Wide32,
}

impl Backend {
    /// All backends, narrowest first.
    pub const ALL: [Backend; 4] = [
        Backend::Scalar,
        Backend::Wide8,
        Backend::Wide16,
        Backend::Wide32,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Backend::Scalar => "scalar",
            Backend::Wide8 => "wide8",
            Backend::Wide16 => "wide16",
            Backend::Wide32 => "wide32",
        }
    }

    /// Whether the running CPU can execute this backend.
    pub fn is_available(self) -> bool {
        match self {
            Backend::Scalar | Backend::Wide8 => true,
            Backend::Wide16 => cpu_detect::has_sse2(),
            Backend::Wide32 => cpu_detect::has_avx2() && cpu_detect::has_sse2(),
        }
    }

    /// Backends usable on this CPU, narrowest first.
    pub fn available() -> Vec<Backend> {
        Self::ALL.into_iter().filter(|b| b.is_available()).collect()
    }

    /// The widest usable backend.
    pub fn best() -> Backend {
        Backend::Wide32.resolve()
    }

    /// `self` if it is usable, otherwise the next narrower backend that is.
    pub fn resolve(self) -> Backend {
        Self::ALL
            .into_iter()
            .rev()
            .filter(|b| *b <= self)
            .find(|b| b.is_available())
            .unwrap_or(Backend::Scalar)
    }

    pub(crate) fn transpose_tile(self, tile: &Tile) -> Tile {
        debug_assert!(self.is_available());
        match self {
            Backend::Scalar => scalar::transpose_tile(tile),
            #[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
            Backend::Wide16 | Backend::Wide32 => {
                // SAFETY: only resolved backends reach here, so SSE2 is present.
                unsafe { sse2::transpose_tile(tile) }
            }
            _ => swar::transpose_tile(tile),
        }
    }

    /// Byte transpose of `n` elements of `s` bytes: `out[k * n + i] = input[i * s + k]`.
    pub(crate) fn trans_byte_elem(self, input: &[u8], out: &mut [u8], n: usize, s: usize) {
        debug_assert!(self.is_available());
        debug_assert!(input.len() == n * s && out.len() == n * s);
        match self {
            Backend::Scalar => scalar::trans_byte_elem(input, out, n, s),
            #[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
            Backend::Wide16 | Backend::Wide32 => {
                // SAFETY: only resolved backends reach here, so SSE2 is present.
                unsafe { sse2::trans_byte_elem(input, out, n, s) }
            }
            _ => swar::trans_byte_elem(input, out, n, s),
        }
    }

    pub(crate) fn untrans_byte_elem(self, input: &[u8], out: &mut [u8], n: usize, s: usize) {
        debug_assert!(self.is_available());
        debug_assert!(input.len() == n * s && out.len() == n * s);
        match self {
            Backend::Scalar => scalar::untrans_byte_elem(input, out, n, s),
            #[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
            Backend::Wide16 | Backend::Wide32 => {
                // SAFETY: only resolved backends reach here, so SSE2 is present.
                unsafe { sse2::untrans_byte_elem(input, out, n, s) }
            }
            _ => swar::untrans_byte_elem(input, out, n, s),
        }
    }

    /// Bit transpose of one byte plane; `plane.len()` must be a multiple of 8.
    pub(crate) fn trans_bit_plane(self, plane: &[u8], out: &mut [u8]) {
        debug_assert!(self.is_available());
        debug_assert!(plane.len() % 8 == 0 && out.len() == plane.len());
        match self {
            Backend::Scalar => scalar::trans_bit_plane(plane, out),
            #[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
            Backend::Wide32 => {
                // SAFETY: Wide32 resolves only when AVX2 is present.
                unsafe { avx2::trans_bit_plane(plane, out) }
            }
            #[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
            Backend::Wide16 => {
                // SAFETY: Wide16 resolves only when SSE2 is present.
                unsafe { sse2::trans_bit_plane(plane, out) }
            }
            _ => swar::trans_bit_plane(plane, out),
        }
    }

    pub(crate) fn untrans_bit_plane(self, input: &[u8], plane: &mut [u8]) {
        debug_assert!(self.is_available());
        debug_assert!(plane.len() % 8 == 0 && input.len() == plane.len());
        match self {
            Backend::Scalar => scalar::untrans_bit_plane(input, plane),
            #[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
            Backend::Wide16 | Backend::Wide32 => {
                // SAFETY: only resolved backends reach here, so SSE2 is present.
                unsafe { sse2::untrans_bit_plane(input, plane) }
            }
            _ => swar::untrans_bit_plane(input, plane),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scalar" => Ok(Backend::Scalar),
            "wide8" | "swar" => Ok(Backend::Wide8),
            "wide16" | "sse2" => Ok(Backend::Wide16),
            "wide32" | "avx2" => Ok(Backend::Wide32),
            other => Err(format!(
                "unknown backend '{other}' (expected scalar, wide8, wide16 or wide32)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::transpose_tile_reference;

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
    fn scalar_and_wide8_always_available() {
        let avail = Backend::available();
        assert!(avail.contains(&Backend::Scalar));
        assert!(avail.contains(&Backend::Wide8));
    }

    #[test]
    fn resolve_never_widens() {
        for b in Backend::ALL {
            let r = b.resolve();
            assert!(r <= b);
            assert!(r.is_available());
        }
        assert_eq!(Backend::Scalar.resolve(), Backend::Scalar);
        assert_eq!(Backend::Wide8.resolve(), Backend::Wide8);
    }

    #[test]
    fn best_is_widest_available() {
        let avail = Backend::available();
        assert_eq!(Some(&Backend::best()), avail.last());
    }

    #[test]
    fn parse_names_and_aliases() {
        for b in Backend::ALL {
            assert_eq!(b.name().parse::<Backend>().unwrap(), b);
            assert_eq!(b.to_string(), b.name());
        }
        assert_eq!("SSE2".parse::<Backend>().unwrap(), Backend::Wide16);
        assert_eq!(" avx2 ".parse::<Backend>().unwrap(), Backend::Wide32);
        assert!("neon".parse::<Backend>().is_err());
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&Backend::Wide16).unwrap();
        assert_eq!(json, "\"wide16\"");
        let back: Backend = serde_json::from_str("\"wide32\"").unwrap();
        assert_eq!(back, Backend::Wide32);
    }

    #[test]
    fn tiles_agree_across_backends() {
        let data = lcg_bytes(16 * 64, 3);
        for tile in data.chunks_exact(16) {
            let tile: Tile = tile.try_into().unwrap();
            let expected = transpose_tile_reference(&tile);
            for b in Backend::available() {
                assert_eq!(b.transpose_tile(&tile), expected, "{b}");
            }
        }
    }

    #[test]
    fn byte_transpose_agrees_across_backends() {
        // Sizes hit the unpack ladders, the chunked paths and the byte loop.
        for &s in &[1usize, 2, 3, 4, 5, 8, 12, 16, 24, 48] {
            for &n in &[0usize, 1, 15, 16, 17, 40, 131] {
                let input = lcg_bytes(n * s, (n * 31 + s) as u64);
                let mut expected = vec![0u8; n * s];
                scalar::trans_byte_elem(&input, &mut expected, n, s);
                for b in Backend::available() {
                    let mut out = vec![0u8; n * s];
                    b.trans_byte_elem(&input, &mut out, n, s);
                    assert_eq!(out, expected, "{b} n={n} s={s}");

                    let mut back = vec![0u8; n * s];
                    b.untrans_byte_elem(&out, &mut back, n, s);
                    assert_eq!(back, input, "{b} n={n} s={s}");
                }
            }
        }
    }

    #[test]
    fn bit_planes_agree_across_backends() {
        // Window counts below, at and past the 2/4/16-window strides.
        for &nw in &[1usize, 2, 3, 4, 5, 15, 16, 17, 33, 100] {
            let plane = lcg_bytes(8 * nw, nw as u64);
            let mut expected = vec![0u8; plane.len()];
            scalar::trans_bit_plane(&plane, &mut expected);
            for b in Backend::available() {
                let mut out = vec![0u8; plane.len()];
                b.trans_bit_plane(&plane, &mut out);
                assert_eq!(out, expected, "{b} nw={nw}");

                let mut back = vec![0u8; plane.len()];
                b.untrans_bit_plane(&out, &mut back);
                assert_eq!(back, plane, "{b} nw={nw}");
            }
        }
    }
}
