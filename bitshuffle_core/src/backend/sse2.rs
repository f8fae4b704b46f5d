//! 128-bit SSE2 kernels (the `Wide16` backend).
//!
//! Byte transposes for 2, 4 and 8 byte items work on sixteen elements per
//! iteration with `unpack` ladders; item sizes that are multiples of 4 or 8
//! are transposed hierarchically on top of those. Bit transposes use
//! `movemask` to pull one bit out of sixteen bytes at once.
//!
//! Every function here requires SSE2; callers go through
//! [`Backend`](super::Backend), which only selects this module after the CPU
//! probe succeeds.

#[cfg(target_arch = "x86")]
use core::arch::x86::*;
#[cfg(target_arch = "x86_64")]
use core::arch::x86_64::*;

use super::swar;
use crate::byte_transpose::trans_elem;
use crate::kernel::{Tile, TILE_BYTES};

#[inline]
#[target_feature(enable = "sse2")]
unsafe fn load(src: &[u8], at: usize) -> __m128i {
    debug_assert!(at + 16 <= src.len());
    _mm_loadu_si128(src.as_ptr().add(at) as *const __m128i)
}

#[inline]
#[target_feature(enable = "sse2")]
unsafe fn store(dst: &mut [u8], at: usize, v: __m128i) {
    debug_assert!(at + 16 <= dst.len());
    _mm_storeu_si128(dst.as_mut_ptr().add(at) as *mut __m128i, v)
}

#[target_feature(enable = "sse2")]
pub(crate) unsafe fn transpose_tile(tile: &Tile) -> Tile {
    let mut out = [0u8; TILE_BYTES];
    let mut xmm = load(tile, 0);
    for kk in 0..8 {
        // Sign bits are bit (7 - kk) of the original bytes.
        let bits = _mm_movemask_epi8(xmm) as u16;
        xmm = _mm_slli_epi16(xmm, 1);
        out[7 - kk] = bits as u8;
        out[15 - kk] = (bits >> 8) as u8;
    }
    out
}

// ── Byte transpose ─────────────────────────────────────────────────────────

#[target_feature(enable = "sse2")]
pub(crate) unsafe fn trans_byte_elem(input: &[u8], out: &mut [u8], n: usize, s: usize) {
    match s {
        1 => out.copy_from_slice(input),
        2 => trans_byte_elem_16(input, out, n),
        4 => trans_byte_elem_32(input, out, n),
        8 => trans_byte_elem_64(input, out, n),
        // Odd sizes (and odd multiples of 2) are faster byte by byte.
        _ if s % 4 != 0 => swar::trans_byte_elem(input, out, n, s),
        _ if s % 8 == 0 => trans_byte_elem_chunked(input, out, n, s, 8),
        _ => trans_byte_elem_chunked(input, out, n, s, 4),
    }
}

#[target_feature(enable = "sse2")]
pub(crate) unsafe fn untrans_byte_elem(input: &[u8], out: &mut [u8], n: usize, s: usize) {
    match s {
        1 => out.copy_from_slice(input),
        2 => untrans_byte_elem_16(input, out, n),
        4 => untrans_byte_elem_32(input, out, n),
        8 => untrans_byte_elem_64(input, out, n),
        _ if s % 4 != 0 => swar::untrans_byte_elem(input, out, n, s),
        _ if s % 8 == 0 => untrans_byte_elem_chunked(input, out, n, s, 8),
        _ => untrans_byte_elem_chunked(input, out, n, s, 4),
    }
}

/// Items of `s = m * chunk` bytes: treat each item as `m` chunk-sized
/// sub-items, byte-transpose those with the fixed-width kernel, then regroup
/// the resulting planes into item-byte order.
#[target_feature(enable = "sse2")]
unsafe fn trans_byte_elem_chunked(input: &[u8], out: &mut [u8], n: usize, s: usize, chunk: usize) {
    let m = s / chunk;
    let mut by_chunk = vec![0u8; n * s];
    trans_elem(input, &mut by_chunk, n, m, chunk);
    let mut planes = vec![0u8; n * s];
    if chunk == 8 {
        trans_byte_elem_64(&by_chunk, &mut planes, n * m);
    } else {
        trans_byte_elem_32(&by_chunk, &mut planes, n * m);
    }
    trans_elem(&planes, out, chunk, m, n);
}

#[target_feature(enable = "sse2")]
unsafe fn untrans_byte_elem_chunked(
    input: &[u8],
    out: &mut [u8],
    n: usize,
    s: usize,
    chunk: usize,
) {
    let m = s / chunk;
    let mut planes = vec![0u8; n * s];
    trans_elem(input, &mut planes, m, chunk, n);
    let mut by_chunk = vec![0u8; n * s];
    if chunk == 8 {
        untrans_byte_elem_64(&planes, &mut by_chunk, n * m);
    } else {
        untrans_byte_elem_32(&planes, &mut by_chunk, n * m);
    }
    trans_elem(&by_chunk, out, m, n, chunk);
}

#[target_feature(enable = "sse2")]
unsafe fn trans_byte_elem_16(input: &[u8], out: &mut [u8], n: usize) {
    let mut ii = 0;
    while ii + 16 <= n {
        let a0 = load(input, 2 * ii);
        let b0 = load(input, 2 * ii + 16);

        let a1 = _mm_unpacklo_epi8(a0, b0);
        let b1 = _mm_unpackhi_epi8(a0, b0);

        let a0 = _mm_unpacklo_epi8(a1, b1);
        let b0 = _mm_unpackhi_epi8(a1, b1);

        let a1 = _mm_unpacklo_epi8(a0, b0);
        let b1 = _mm_unpackhi_epi8(a0, b0);

        let a0 = _mm_unpacklo_epi8(a1, b1);
        let b0 = _mm_unpackhi_epi8(a1, b1);

        store(out, ii, a0);
        store(out, n + ii, b0);
        ii += 16;
    }
    swar::trans_byte_elem_from(input, out, n, 2, ii);
}

#[target_feature(enable = "sse2")]
unsafe fn trans_byte_elem_32(input: &[u8], out: &mut [u8], n: usize) {
    let mut ii = 0;
    while ii + 16 <= n {
        let a0 = load(input, 4 * ii);
        let b0 = load(input, 4 * ii + 16);
        let c0 = load(input, 4 * ii + 32);
        let d0 = load(input, 4 * ii + 48);

        let a1 = _mm_unpacklo_epi8(a0, b0);
        let b1 = _mm_unpackhi_epi8(a0, b0);
        let c1 = _mm_unpacklo_epi8(c0, d0);
        let d1 = _mm_unpackhi_epi8(c0, d0);

        let a0 = _mm_unpacklo_epi8(a1, b1);
        let b0 = _mm_unpackhi_epi8(a1, b1);
        let c0 = _mm_unpacklo_epi8(c1, d1);
        let d0 = _mm_unpackhi_epi8(c1, d1);

        let a1 = _mm_unpacklo_epi8(a0, b0);
        let b1 = _mm_unpackhi_epi8(a0, b0);
        let c1 = _mm_unpacklo_epi8(c0, d0);
        let d1 = _mm_unpackhi_epi8(c0, d0);

        let a0 = _mm_unpacklo_epi64(a1, c1);
        let b0 = _mm_unpackhi_epi64(a1, c1);
        let c0 = _mm_unpacklo_epi64(b1, d1);
        let d0 = _mm_unpackhi_epi64(b1, d1);

        store(out, ii, a0);
        store(out, n + ii, b0);
        store(out, 2 * n + ii, c0);
        store(out, 3 * n + ii, d0);
        ii += 16;
    }
    swar::trans_byte_elem_from(input, out, n, 4, ii);
}

#[target_feature(enable = "sse2")]
unsafe fn trans_byte_elem_64(input: &[u8], out: &mut [u8], n: usize) {
    let mut ii = 0;
    while ii + 16 <= n {
        let a0 = load(input, 8 * ii);
        let b0 = load(input, 8 * ii + 16);
        let c0 = load(input, 8 * ii + 32);
        let d0 = load(input, 8 * ii + 48);
        let e0 = load(input, 8 * ii + 64);
        let f0 = load(input, 8 * ii + 80);
        let g0 = load(input, 8 * ii + 96);
        let h0 = load(input, 8 * ii + 112);

        let a1 = _mm_unpacklo_epi8(a0, b0);
        let b1 = _mm_unpackhi_epi8(a0, b0);
        let c1 = _mm_unpacklo_epi8(c0, d0);
        let d1 = _mm_unpackhi_epi8(c0, d0);
        let e1 = _mm_unpacklo_epi8(e0, f0);
        let f1 = _mm_unpackhi_epi8(e0, f0);
        let g1 = _mm_unpacklo_epi8(g0, h0);
        let h1 = _mm_unpackhi_epi8(g0, h0);

        let a0 = _mm_unpacklo_epi8(a1, b1);
        let b0 = _mm_unpackhi_epi8(a1, b1);
        let c0 = _mm_unpacklo_epi8(c1, d1);
        let d0 = _mm_unpackhi_epi8(c1, d1);
        let e0 = _mm_unpacklo_epi8(e1, f1);
        let f0 = _mm_unpackhi_epi8(e1, f1);
        let g0 = _mm_unpacklo_epi8(g1, h1);
        let h0 = _mm_unpackhi_epi8(g1, h1);

        let a1 = _mm_unpacklo_epi32(a0, c0);
        let b1 = _mm_unpackhi_epi32(a0, c0);
        let c1 = _mm_unpacklo_epi32(b0, d0);
        let d1 = _mm_unpackhi_epi32(b0, d0);
        let e1 = _mm_unpacklo_epi32(e0, g0);
        let f1 = _mm_unpackhi_epi32(e0, g0);
        let g1 = _mm_unpacklo_epi32(f0, h0);
        let h1 = _mm_unpackhi_epi32(f0, h0);

        let a0 = _mm_unpacklo_epi64(a1, e1);
        let b0 = _mm_unpackhi_epi64(a1, e1);
        let c0 = _mm_unpacklo_epi64(b1, f1);
        let d0 = _mm_unpackhi_epi64(b1, f1);
        let e0 = _mm_unpacklo_epi64(c1, g1);
        let f0 = _mm_unpackhi_epi64(c1, g1);
        let g0 = _mm_unpacklo_epi64(d1, h1);
        let h0 = _mm_unpackhi_epi64(d1, h1);

        store(out, ii, a0);
        store(out, n + ii, b0);
        store(out, 2 * n + ii, c0);
        store(out, 3 * n + ii, d0);
        store(out, 4 * n + ii, e0);
        store(out, 5 * n + ii, f0);
        store(out, 6 * n + ii, g0);
        store(out, 7 * n + ii, h0);
        ii += 16;
    }
    swar::trans_byte_elem_from(input, out, n, 8, ii);
}

#[target_feature(enable = "sse2")]
unsafe fn untrans_byte_elem_16(input: &[u8], out: &mut [u8], n: usize) {
    let mut ii = 0;
    while ii + 16 <= n {
        let a = load(input, ii);
        let b = load(input, n + ii);
        store(out, 2 * ii, _mm_unpacklo_epi8(a, b));
        store(out, 2 * ii + 16, _mm_unpackhi_epi8(a, b));
        ii += 16;
    }
    swar::untrans_byte_elem_from(input, out, n, 2, ii);
}

#[target_feature(enable = "sse2")]
unsafe fn untrans_byte_elem_32(input: &[u8], out: &mut [u8], n: usize) {
    let mut ii = 0;
    while ii + 16 <= n {
        let a = load(input, ii);
        let b = load(input, n + ii);
        let c = load(input, 2 * n + ii);
        let d = load(input, 3 * n + ii);

        let ab_lo = _mm_unpacklo_epi8(a, b);
        let ab_hi = _mm_unpackhi_epi8(a, b);
        let cd_lo = _mm_unpacklo_epi8(c, d);
        let cd_hi = _mm_unpackhi_epi8(c, d);

        store(out, 4 * ii, _mm_unpacklo_epi16(ab_lo, cd_lo));
        store(out, 4 * ii + 16, _mm_unpackhi_epi16(ab_lo, cd_lo));
        store(out, 4 * ii + 32, _mm_unpacklo_epi16(ab_hi, cd_hi));
        store(out, 4 * ii + 48, _mm_unpackhi_epi16(ab_hi, cd_hi));
        ii += 16;
    }
    swar::untrans_byte_elem_from(input, out, n, 4, ii);
}

/// Interleave eight plane pairs covering eight elements into 64 output bytes.
#[inline]
#[target_feature(enable = "sse2")]
unsafe fn store_eight_elems(
    ab: __m128i,
    cd: __m128i,
    ef: __m128i,
    gh: __m128i,
    out: &mut [u8],
    at: usize,
) {
    let abcd_lo = _mm_unpacklo_epi16(ab, cd);
    let abcd_hi = _mm_unpackhi_epi16(ab, cd);
    let efgh_lo = _mm_unpacklo_epi16(ef, gh);
    let efgh_hi = _mm_unpackhi_epi16(ef, gh);

    store(out, at, _mm_unpacklo_epi32(abcd_lo, efgh_lo));
    store(out, at + 16, _mm_unpackhi_epi32(abcd_lo, efgh_lo));
    store(out, at + 32, _mm_unpacklo_epi32(abcd_hi, efgh_hi));
    store(out, at + 48, _mm_unpackhi_epi32(abcd_hi, efgh_hi));
}

#[target_feature(enable = "sse2")]
unsafe fn untrans_byte_elem_64(input: &[u8], out: &mut [u8], n: usize) {
    let mut ii = 0;
    while ii + 16 <= n {
        let a = load(input, ii);
        let b = load(input, n + ii);
        let c = load(input, 2 * n + ii);
        let d = load(input, 3 * n + ii);
        let e = load(input, 4 * n + ii);
        let f = load(input, 5 * n + ii);
        let g = load(input, 6 * n + ii);
        let h = load(input, 7 * n + ii);

        store_eight_elems(
            _mm_unpacklo_epi8(a, b),
            _mm_unpacklo_epi8(c, d),
            _mm_unpacklo_epi8(e, f),
            _mm_unpacklo_epi8(g, h),
            out,
            8 * ii,
        );
        store_eight_elems(
            _mm_unpackhi_epi8(a, b),
            _mm_unpackhi_epi8(c, d),
            _mm_unpackhi_epi8(e, f),
            _mm_unpackhi_epi8(g, h),
            out,
            8 * ii + 64,
        );
        ii += 16;
    }
    swar::untrans_byte_elem_from(input, out, n, 8, ii);
}

// ── Bit transpose ──────────────────────────────────────────────────────────

/// Two windows per register: the sixteen sign bits of one shift step are bit
/// `b` of windows `w` and `w + 1`, which sit next to each other in the output.
#[target_feature(enable = "sse2")]
pub(crate) unsafe fn trans_bit_plane(plane: &[u8], out: &mut [u8]) {
    let nw = plane.len() / 8;
    let mut w = 0;
    while w + 2 <= nw {
        let mut xmm = load(plane, 8 * w);
        for kk in 0..8 {
            let bits = _mm_movemask_epi8(xmm) as u16;
            xmm = _mm_slli_epi16(xmm, 1);
            let at = (7 - kk) * nw + w;
            out[at..at + 2].copy_from_slice(&bits.to_le_bytes());
        }
        w += 2;
    }
    swar::trans_bit_plane_from(plane, out, w);
}

/// Sixteen windows per iteration: gather the eight bit rows into per-window
/// groups of eight bytes with an unpack ladder, then peel bits off with
/// `movemask` two windows at a time.
#[target_feature(enable = "sse2")]
pub(crate) unsafe fn untrans_bit_plane(input: &[u8], plane: &mut [u8]) {
    let nw = plane.len() / 8;
    let mut w = 0;
    while w + 16 <= nw {
        let r0 = load(input, w);
        let r1 = load(input, nw + w);
        let r2 = load(input, 2 * nw + w);
        let r3 = load(input, 3 * nw + w);
        let r4 = load(input, 4 * nw + w);
        let r5 = load(input, 5 * nw + w);
        let r6 = load(input, 6 * nw + w);
        let r7 = load(input, 7 * nw + w);

        let r01_lo = _mm_unpacklo_epi8(r0, r1);
        let r23_lo = _mm_unpacklo_epi8(r2, r3);
        let r45_lo = _mm_unpacklo_epi8(r4, r5);
        let r67_lo = _mm_unpacklo_epi8(r6, r7);
        let r01_hi = _mm_unpackhi_epi8(r0, r1);
        let r23_hi = _mm_unpackhi_epi8(r2, r3);
        let r45_hi = _mm_unpackhi_epi8(r4, r5);
        let r67_hi = _mm_unpackhi_epi8(r6, r7);

        // Rows 0-3 and 4-7 of windows 0-3, 4-7, 8-11, 12-15.
        let lo_0_3 = _mm_unpacklo_epi16(r01_lo, r23_lo);
        let hi_0_3 = _mm_unpacklo_epi16(r45_lo, r67_lo);
        let lo_4_7 = _mm_unpackhi_epi16(r01_lo, r23_lo);
        let hi_4_7 = _mm_unpackhi_epi16(r45_lo, r67_lo);
        let lo_8_11 = _mm_unpacklo_epi16(r01_hi, r23_hi);
        let hi_8_11 = _mm_unpacklo_epi16(r45_hi, r67_hi);
        let lo_12_15 = _mm_unpackhi_epi16(r01_hi, r23_hi);
        let hi_12_15 = _mm_unpackhi_epi16(r45_hi, r67_hi);

        let pairs = [
            _mm_unpacklo_epi32(lo_0_3, hi_0_3),
            _mm_unpackhi_epi32(lo_0_3, hi_0_3),
            _mm_unpacklo_epi32(lo_4_7, hi_4_7),
            _mm_unpackhi_epi32(lo_4_7, hi_4_7),
            _mm_unpacklo_epi32(lo_8_11, hi_8_11),
            _mm_unpackhi_epi32(lo_8_11, hi_8_11),
            _mm_unpacklo_epi32(lo_12_15, hi_12_15),
            _mm_unpackhi_epi32(lo_12_15, hi_12_15),
        ];

        for (m, &pair) in pairs.iter().enumerate() {
            let base = 8 * (w + 2 * m);
            let mut xmm = pair;
            for kk in 0..8 {
                let bits = _mm_movemask_epi8(xmm) as u16;
                xmm = _mm_slli_epi16(xmm, 1);
                plane[base + 7 - kk] = bits as u8;
                plane[base + 15 - kk] = (bits >> 8) as u8;
            }
        }
        w += 16;
    }
    swar::untrans_bit_plane_from(input, plane, w);
}
