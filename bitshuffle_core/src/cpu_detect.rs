//! Runtime CPU feature probes.
//!
//! Each probe runs CPUID once; later calls load a cached flag.

/// Whether SSE2 is usable. Always `false` off x86.
#[inline]
pub fn has_sse2() -> bool {
    #[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
    {
        cpufeatures::new!(cpuid_sse2, "sse2");
        cpuid_sse2::get()
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
    {
        false
    }
}

/// Whether AVX2 is usable. Always `false` off x86.
#[inline]
pub fn has_avx2() -> bool {
    #[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
    {
        cpufeatures::new!(cpuid_avx2, "avx2");
        cpuid_avx2::get()
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avx2_implies_sse2() {
        if has_avx2() {
            assert!(has_sse2());
        }
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn sse2_is_baseline_on_x86_64() {
        assert!(has_sse2());
    }
}
