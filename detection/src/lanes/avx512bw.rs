//! AVX-512 (F + BW) lanes: 16 x 32-bit and 32 x 16-bit.
//!
//! Comparisons produce `k` registers directly, and the row tail is handled
//! with masked loads instead of an overlapping block.

use std::arch::x86_64::*;

use super::{LBP_BIT_WEIGHTS, Lanes16, Lanes32, LiveMask, MaskRow, lanes_mask};

#[derive(Debug, Clone, Copy)]
pub struct Avx512F32;

#[derive(Debug, Clone, Copy)]
pub struct Avx512I16;

unsafe impl MaskRow for Avx512F32 {
    type Elem = u32;
    const LANES: usize = 16;
    const MASKED_TAIL: bool = true;

    #[inline(always)]
    unsafe fn unpack_mask(src: &[u8], dst: &mut [u32]) {
        let n = src.len().min(dst.len());
        let mut i = 0;
        unsafe {
            let one = _mm512_set1_epi32(1);
            while i + 16 <= n {
                let bytes = _mm_loadu_si128(src[i..i + 16].as_ptr() as *const __m128i);
                let words = _mm512_min_epu32(_mm512_cvtepu8_epi32(bytes), one);
                _mm512_storeu_epi32(dst[i..i + 16].as_mut_ptr() as *mut i32, words);
                i += 16;
            }
        }
        for (d, &s) in dst[i..n].iter_mut().zip(&src[i..n]) {
            *d = (s != 0) as u32;
        }
    }

    #[inline(always)]
    unsafe fn pack_result(src: &[u32], dst: &mut [u8]) {
        let n = src.len().min(dst.len());
        let mut i = 0;
        unsafe {
            while i + 16 <= n {
                let words = Self::load(src, i);
                _mm_storeu_si128(
                    dst[i..i + 16].as_mut_ptr() as *mut __m128i,
                    _mm512_cvtepi32_epi8(words),
                );
                i += 16;
            }
        }
        for (d, &s) in dst[i..n].iter_mut().zip(&src[i..n]) {
            *d = (s != 0) as u8;
        }
    }

    #[inline(always)]
    unsafe fn live_bits(m: &[u32], at: usize, lanes: usize) -> LiveMask {
        unsafe {
            let v = Self::load_partial(m, at, lanes);
            _mm512_test_epi32_mask(v, v) as LiveMask
        }
    }
}

unsafe impl Lanes32 for Avx512F32 {
    type U = __m512i;
    type F = __m512;
    type M = __mmask16;

    #[inline(always)]
    unsafe fn load(src: &[u32], at: usize) -> __m512i {
        let src = &src[at..at + 16];
        unsafe { _mm512_loadu_epi32(src.as_ptr() as *const i32) }
    }

    #[inline(always)]
    unsafe fn load_partial(src: &[u32], at: usize, count: usize) -> __m512i {
        let src = &src[at..at + count];
        unsafe { _mm512_maskz_loadu_epi32(lanes_mask(count) as __mmask16, src.as_ptr() as *const i32) }
    }

    #[inline(always)]
    unsafe fn load_even(src: &[u32], at: usize) -> __m512i {
        if at + 32 <= src.len() {
            unsafe {
                let lo = Self::load(src, at);
                let hi = Self::load(src, at + 16);
                let index = _mm512_setr_epi32(0, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 22, 24, 26, 28, 30);
                _mm512_permutex2var_epi32(lo, index, hi)
            }
        } else {
            unsafe { Self::load_even_partial(src, at, 16) }
        }
    }

    #[inline(always)]
    unsafe fn store(v: __m512i, dst: &mut [u32]) {
        let dst = &mut dst[..16];
        unsafe { _mm512_storeu_epi32(dst.as_mut_ptr() as *mut i32, v) }
    }

    #[inline(always)]
    unsafe fn store_f(v: __m512, dst: &mut [f32]) {
        let dst = &mut dst[..16];
        unsafe { _mm512_storeu_ps(dst.as_mut_ptr(), v) }
    }

    #[inline(always)]
    unsafe fn rect_sum(p0: __m512i, p1: __m512i, p2: __m512i, p3: __m512i) -> __m512i {
        unsafe { _mm512_add_epi32(_mm512_sub_epi32(_mm512_sub_epi32(p0, p1), p2), p3) }
    }

    #[inline(always)]
    unsafe fn ge_u(a: __m512i, b: __m512i) -> __mmask16 {
        unsafe { _mm512_cmpge_epu32_mask(a, b) }
    }

    #[inline(always)]
    unsafe fn to_f(v: __m512i) -> __m512 {
        unsafe { _mm512_cvtepi32_ps(v) }
    }

    #[inline(always)]
    unsafe fn splat_f(v: f32) -> __m512 {
        unsafe { _mm512_set1_ps(v) }
    }

    #[inline(always)]
    unsafe fn add_f(a: __m512, b: __m512) -> __m512 {
        unsafe { _mm512_add_ps(a, b) }
    }

    #[inline(always)]
    unsafe fn sub_f(a: __m512, b: __m512) -> __m512 {
        unsafe { _mm512_sub_ps(a, b) }
    }

    #[inline(always)]
    unsafe fn mul_f(a: __m512, b: __m512) -> __m512 {
        unsafe { _mm512_mul_ps(a, b) }
    }

    #[inline(always)]
    unsafe fn sqrt_or_one(v: __m512) -> __m512 {
        unsafe {
            let positive = _mm512_cmp_ps_mask::<_CMP_GT_OQ>(v, _mm512_setzero_ps());
            _mm512_mask_blend_ps(positive, _mm512_set1_ps(1.0), _mm512_sqrt_ps(v))
        }
    }

    #[inline(always)]
    unsafe fn lt_f(a: __m512, b: __m512) -> __mmask16 {
        unsafe { _mm512_cmp_ps_mask::<_CMP_LT_OQ>(a, b) }
    }

    #[inline(always)]
    unsafe fn select_f(m: __mmask16, if_set: __m512, if_clear: __m512) -> __m512 {
        unsafe { _mm512_mask_blend_ps(m, if_clear, if_set) }
    }

    #[inline(always)]
    unsafe fn movemask(m: __mmask16) -> LiveMask {
        m as LiveMask
    }

    #[inline(always)]
    unsafe fn mask_from_bits(bits: LiveMask) -> __mmask16 {
        bits as __mmask16
    }

    #[inline(always)]
    unsafe fn lbp_lookup(ge: &[__mmask16; 8], subset: &[u32; 8]) -> __mmask16 {
        unsafe {
            let mut code = _mm512_setzero_si512();
            for (&m, &w) in ge.iter().zip(&LBP_BIT_WEIGHTS) {
                code = _mm512_or_si512(code, _mm512_maskz_mov_epi32(m, _mm512_set1_epi32(w as i32)));
            }
            let table = _mm512_broadcast_i64x4(_mm256_loadu_si256(subset.as_ptr() as *const __m256i));
            let word = _mm512_permutexvar_epi32(_mm512_srli_epi32::<5>(code), table);
            let shift = _mm512_and_si512(code, _mm512_set1_epi32(31));
            _mm512_test_epi32_mask(_mm512_srlv_epi32(word, shift), _mm512_set1_epi32(1))
        }
    }
}

unsafe impl MaskRow for Avx512I16 {
    type Elem = u16;
    const LANES: usize = 32;
    const MASKED_TAIL: bool = true;

    #[inline(always)]
    unsafe fn unpack_mask(src: &[u8], dst: &mut [u16]) {
        let n = src.len().min(dst.len());
        let mut i = 0;
        unsafe {
            let one = _mm512_set1_epi16(1);
            while i + 32 <= n {
                let bytes = _mm256_loadu_si256(src[i..i + 32].as_ptr() as *const __m256i);
                let words = _mm512_min_epu16(_mm512_cvtepu8_epi16(bytes), one);
                _mm512_storeu_epi16(dst[i..i + 32].as_mut_ptr() as *mut i16, words);
                i += 32;
            }
        }
        for (d, &s) in dst[i..n].iter_mut().zip(&src[i..n]) {
            *d = (s != 0) as u16;
        }
    }

    #[inline(always)]
    unsafe fn pack_result(src: &[u16], dst: &mut [u8]) {
        let n = src.len().min(dst.len());
        let mut i = 0;
        unsafe {
            while i + 32 <= n {
                let words = Self::load(src, i);
                _mm256_storeu_si256(
                    dst[i..i + 32].as_mut_ptr() as *mut __m256i,
                    _mm512_cvtepi16_epi8(words),
                );
                i += 32;
            }
        }
        for (d, &s) in dst[i..n].iter_mut().zip(&src[i..n]) {
            *d = (s != 0) as u8;
        }
    }

    #[inline(always)]
    unsafe fn live_bits(m: &[u16], at: usize, lanes: usize) -> LiveMask {
        unsafe {
            let v = Self::load_partial(m, at, lanes);
            _mm512_test_epi16_mask(v, v) as LiveMask
        }
    }
}

unsafe impl Lanes16 for Avx512I16 {
    type V = __m512i;
    type M = __mmask32;

    #[inline(always)]
    unsafe fn load(src: &[u16], at: usize) -> __m512i {
        let src = &src[at..at + 32];
        unsafe { _mm512_loadu_epi16(src.as_ptr() as *const i16) }
    }

    #[inline(always)]
    unsafe fn load_partial(src: &[u16], at: usize, count: usize) -> __m512i {
        let src = &src[at..at + count];
        unsafe { _mm512_maskz_loadu_epi16(lanes_mask(count) as __mmask32, src.as_ptr() as *const i16) }
    }

    #[inline(always)]
    unsafe fn store(v: __m512i, dst: &mut [u16]) {
        let dst = &mut dst[..32];
        unsafe { _mm512_storeu_epi16(dst.as_mut_ptr() as *mut i16, v) }
    }

    #[inline(always)]
    unsafe fn rect_sum(p0: __m512i, p1: __m512i, p2: __m512i, p3: __m512i) -> __m512i {
        unsafe { _mm512_add_epi16(_mm512_sub_epi16(_mm512_sub_epi16(p0, p1), p2), p3) }
    }

    #[inline(always)]
    unsafe fn ge_u(a: __m512i, b: __m512i) -> __mmask32 {
        unsafe { _mm512_cmpge_epu16_mask(a, b) }
    }

    #[inline(always)]
    unsafe fn splat(v: i16) -> __m512i {
        unsafe { _mm512_set1_epi16(v) }
    }

    #[inline(always)]
    unsafe fn add(a: __m512i, b: __m512i) -> __m512i {
        unsafe { _mm512_add_epi16(a, b) }
    }

    #[inline(always)]
    unsafe fn lt_i(a: __m512i, b: __m512i) -> __mmask32 {
        unsafe { _mm512_cmplt_epi16_mask(a, b) }
    }

    #[inline(always)]
    unsafe fn select(m: __mmask32, if_set: __m512i, if_clear: __m512i) -> __m512i {
        unsafe { _mm512_mask_blend_epi16(m, if_clear, if_set) }
    }

    #[inline(always)]
    unsafe fn movemask(m: __mmask32) -> LiveMask {
        m as LiveMask
    }

    #[inline(always)]
    unsafe fn mask_from_bits(bits: LiveMask) -> __mmask32 {
        bits as __mmask32
    }

    /// 16-bit variant of the permute lookup: halfword `code >> 4`, bit `code & 15`.
    #[inline(always)]
    unsafe fn lbp_lookup(ge: &[__mmask32; 8], subset: &[u32; 8]) -> __mmask32 {
        unsafe {
            let mut code = _mm512_setzero_si512();
            for (&m, &w) in ge.iter().zip(&LBP_BIT_WEIGHTS) {
                code = _mm512_or_si512(code, _mm512_maskz_mov_epi16(m, _mm512_set1_epi16(w as i16)));
            }
            let table = _mm512_broadcast_i64x4(_mm256_loadu_si256(subset.as_ptr() as *const __m256i));
            let word = _mm512_permutexvar_epi16(_mm512_srli_epi16::<4>(code), table);
            let shift = _mm512_and_si512(code, _mm512_set1_epi16(15));
            _mm512_test_epi16_mask(_mm512_srlv_epi16(word, shift), _mm512_set1_epi16(1))
        }
    }
}
