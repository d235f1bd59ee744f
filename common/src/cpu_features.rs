//! CPU feature detection for runtime SIMD dispatch.
//!
//! Detection runs once and is cached. Use these functions instead of the
//! `is_*_feature_detected!` macros so kernels do not repeat CPUID calls.

use std::sync::OnceLock;

/// CPU feature flags detected once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuFeatures {
    pub sse4_1: bool,
    pub avx2: bool,
    pub avx512f: bool,
    pub avx512bw: bool,
    pub neon: bool,
}

static FEATURES: OnceLock<CpuFeatures> = OnceLock::new();

/// Get cached CPU features (detected once on first call).
#[cfg(target_arch = "x86_64")]
#[inline]
pub fn get() -> CpuFeatures {
    *FEATURES.get_or_init(|| CpuFeatures {
        sse4_1: is_x86_feature_detected!("sse4.1"),
        avx2: is_x86_feature_detected!("avx2"),
        avx512f: is_x86_feature_detected!("avx512f"),
        avx512bw: is_x86_feature_detected!("avx512bw"),
        neon: false,
    })
}

/// Get cached CPU features (detected once on first call).
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn get() -> CpuFeatures {
    *FEATURES.get_or_init(|| CpuFeatures {
        neon: std::arch::is_aarch64_feature_detected!("neon"),
        ..CpuFeatures::default()
    })
}

/// Get cached CPU features - stub for platforms without SIMD kernels.
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[inline]
pub fn get() -> CpuFeatures {
    *FEATURES.get_or_init(CpuFeatures::default)
}

/// Check if SSE4.1 is available.
#[inline]
pub fn has_sse4_1() -> bool {
    get().sse4_1
}

/// Check if AVX2 is available.
#[inline]
pub fn has_avx2() -> bool {
    get().avx2
}

/// Check if AVX-512F and AVX-512BW are both available.
#[inline]
pub fn has_avx512bw() -> bool {
    let f = get();
    f.avx512f && f.avx512bw
}

/// Check if NEON is available.
#[inline]
pub fn has_neon() -> bool {
    get().neon
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_features_are_cached() {
        assert_eq!(get(), get());
    }

    #[test]
    fn test_avx2_implies_sse4_1() {
        if has_avx2() {
            assert!(has_sse4_1());
        }
    }

    #[cfg(target_arch = "aarch64")]
    #[test]
    fn test_neon_on_aarch64() {
        assert!(has_neon());
        assert!(!has_avx2());
    }
}
