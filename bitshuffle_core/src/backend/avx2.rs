//! 256-bit AVX2 kernels (the `Wide32` backend).
//!
//! Only the forward bit transpose gains from the wider register; byte
//! transposes and the inverse bit transpose reuse the SSE2 paths, which the
//! CPU is guaranteed to have whenever AVX2 is present.

#[cfg(target_arch = "x86")]
use core::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use core::arch::x86_64::*;

use super::swar;

/// Four windows per register, written as one little-endian `u32` per bit row.
#[target_feature(enable = "avx2")]
pub(crate) unsafe fn trans_bit_plane(plane: &[u8], out: &mut [u8]) {
    let nw = plane.len() / 8;
    let mut w = 0;
    while w + 4 <= nw {
        debug_assert!(8 * w + 32 <= plane.len());
        let mut ymm = _mm256_loadu_si256(plane.as_ptr().add(8 * w) as *const __m256i);
        for kk in 0..8 {
            let bits = _mm256_movemask_epi8(ymm) as u32;
            ymm = _mm256_slli_epi16(ymm, 1);
            let at = (7 - kk) * nw + w;
            out[at..at + 4].copy_from_slice(&bits.to_le_bytes());
        }
        w += 4;
    }
    swar::trans_bit_plane_from(plane, out, w);
}
