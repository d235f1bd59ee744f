//! AVX2 lanes: 8 x 32-bit and 16 x 16-bit.

use std::arch::x86_64::*;

use super::{LBP_BIT_WEIGHTS, Lanes16, Lanes32, LiveMask, MaskRow, pack_even, unpack_even};

#[derive(Debug, Clone, Copy)]
pub struct Avx2F32;

#[derive(Debug, Clone, Copy)]
pub struct Avx2I16;

/// Lane-crossing fix-up after `packs`/`shuffle_ps`: 64-bit blocks 0, 2, 1, 3.
const INTERLEAVE_FIX: i32 = 0b11_01_10_00;

/// Bytes `0, 2, ..., 30` of `src[..32]` as sixteen 16-bit `0`/`1` flags.
#[inline(always)]
unsafe fn even_flags(src: &[u8]) -> __m256i {
    let src = &src[..32];
    unsafe {
        let bytes = _mm256_loadu_si256(src.as_ptr() as *const __m256i);
        _mm256_and_si256(_mm256_min_epu8(bytes, _mm256_set1_epi8(1)), _mm256_set1_epi16(1))
    }
}

unsafe impl MaskRow for Avx2F32 {
    type Elem = u32;
    const LANES: usize = 8;

    #[inline(always)]
    unsafe fn unpack_mask(src: &[u8], dst: &mut [u32]) {
        let n = src.len().min(dst.len());
        let mut i = 0;
        unsafe {
            let one = _mm256_set1_epi32(1);
            while i + 8 <= n {
                let bytes = _mm_loadl_epi64(src[i..i + 8].as_ptr() as *const __m128i);
                let words = _mm256_min_epu32(_mm256_cvtepu8_epi32(bytes), one);
                _mm256_storeu_si256(dst[i..i + 8].as_mut_ptr() as *mut __m256i, words);
                i += 8;
            }
        }
        for (d, &s) in dst[i..n].iter_mut().zip(&src[i..n]) {
            *d = (s != 0) as u32;
        }
    }

    #[inline(always)]
    unsafe fn unpack_mask_even(src: &[u8], dst: &mut [u32]) {
        let mut j = 0;
        unsafe {
            while j + 8 <= dst.len() && 2 * j + 16 <= src.len() {
                let bytes = _mm_loadu_si128(src[2 * j..2 * j + 16].as_ptr() as *const __m128i);
                let flags = _mm_and_si128(_mm_min_epu8(bytes, _mm_set1_epi8(1)), _mm_set1_epi16(1));
                _mm256_storeu_si256(
                    dst[j..j + 8].as_mut_ptr() as *mut __m256i,
                    _mm256_cvtepu16_epi32(flags),
                );
                j += 8;
            }
        }
        unpack_even(&src[(2 * j).min(src.len())..], &mut dst[j..]);
    }

    #[inline(always)]
    unsafe fn pack_result_even(src: &[u32], dst: &mut [u8]) {
        let mut j = 0;
        unsafe {
            while j + 8 <= src.len() && 2 * j + 16 <= dst.len() {
                let words = Self::load(src, j);
                let packed = _mm_packs_epi32(
                    _mm256_castsi256_si128(words),
                    _mm256_extracti128_si256::<1>(words),
                );
                _mm_storeu_si128(dst[2 * j..2 * j + 16].as_mut_ptr() as *mut __m128i, packed);
                j += 8;
            }
        }
        let dst_len = dst.len();
        pack_even(&src[j..], &mut dst[(2 * j).min(dst_len)..]);
    }

    #[inline(always)]
    unsafe fn live_bits(m: &[u32], at: usize, lanes: usize) -> LiveMask {
        if lanes != Self::LANES {
            return m[at..at + lanes]
                .iter()
                .enumerate()
                .fold(0, |bits, (k, &v)| bits | (((v != 0) as LiveMask) << k));
        }
        unsafe {
            let zero = _mm256_cmpeq_epi32(Self::load(m, at), _mm256_setzero_si256());
            (!_mm256_movemask_ps(_mm256_castsi256_ps(zero)) & 0xFF) as LiveMask
        }
    }
}

unsafe impl Lanes32 for Avx2F32 {
    type U = __m256i;
    type F = __m256;
    type M = __m256;

    #[inline(always)]
    unsafe fn load(src: &[u32], at: usize) -> __m256i {
        let src = &src[at..at + 8];
        unsafe { _mm256_loadu_si256(src.as_ptr() as *const __m256i) }
    }

    #[inline(always)]
    unsafe fn load_even(src: &[u32], at: usize) -> __m256i {
        if at + 16 <= src.len() {
            unsafe {
                let lo = _mm256_castsi256_ps(Self::load(src, at));
                let hi = _mm256_castsi256_ps(Self::load(src, at + 8));
                let even = _mm256_castps_si256(_mm256_shuffle_ps::<0b10_00_10_00>(lo, hi));
                _mm256_permute4x64_epi64::<INTERLEAVE_FIX>(even)
            }
        } else {
            unsafe { Self::load_even_partial(src, at, 8) }
        }
    }

    #[inline(always)]
    unsafe fn store(v: __m256i, dst: &mut [u32]) {
        let dst = &mut dst[..8];
        unsafe { _mm256_storeu_si256(dst.as_mut_ptr() as *mut __m256i, v) }
    }

    #[inline(always)]
    unsafe fn store_f(v: __m256, dst: &mut [f32]) {
        let dst = &mut dst[..8];
        unsafe { _mm256_storeu_ps(dst.as_mut_ptr(), v) }
    }

    #[inline(always)]
    unsafe fn rect_sum(p0: __m256i, p1: __m256i, p2: __m256i, p3: __m256i) -> __m256i {
        unsafe { _mm256_add_epi32(_mm256_sub_epi32(_mm256_sub_epi32(p0, p1), p2), p3) }
    }

    #[inline(always)]
    unsafe fn ge_u(a: __m256i, b: __m256i) -> __m256 {
        unsafe { _mm256_castsi256_ps(_mm256_cmpeq_epi32(_mm256_max_epu32(a, b), a)) }
    }

    #[inline(always)]
    unsafe fn to_f(v: __m256i) -> __m256 {
        unsafe { _mm256_cvtepi32_ps(v) }
    }

    #[inline(always)]
    unsafe fn splat_f(v: f32) -> __m256 {
        unsafe { _mm256_set1_ps(v) }
    }

    #[inline(always)]
    unsafe fn add_f(a: __m256, b: __m256) -> __m256 {
        unsafe { _mm256_add_ps(a, b) }
    }

    #[inline(always)]
    unsafe fn sub_f(a: __m256, b: __m256) -> __m256 {
        unsafe { _mm256_sub_ps(a, b) }
    }

    #[inline(always)]
    unsafe fn mul_f(a: __m256, b: __m256) -> __m256 {
        unsafe { _mm256_mul_ps(a, b) }
    }

    #[inline(always)]
    unsafe fn sqrt_or_one(v: __m256) -> __m256 {
        unsafe {
            let positive = _mm256_cmp_ps::<_CMP_GT_OQ>(v, _mm256_setzero_ps());
            _mm256_blendv_ps(_mm256_set1_ps(1.0), _mm256_sqrt_ps(v), positive)
        }
    }

    #[inline(always)]
    unsafe fn lt_f(a: __m256, b: __m256) -> __m256 {
        unsafe { _mm256_cmp_ps::<_CMP_LT_OQ>(a, b) }
    }

    #[inline(always)]
    unsafe fn select_f(m: __m256, if_set: __m256, if_clear: __m256) -> __m256 {
        unsafe { _mm256_blendv_ps(if_clear, if_set, m) }
    }

    #[inline(always)]
    unsafe fn movemask(m: __m256) -> LiveMask {
        unsafe { (_mm256_movemask_ps(m) & 0xFF) as LiveMask }
    }

    #[inline(always)]
    unsafe fn mask_from_bits(bits: LiveMask) -> __m256 {
        unsafe {
            let weights = _mm256_setr_epi32(1, 2, 4, 8, 16, 32, 64, 128);
            let set = _mm256_and_si256(_mm256_set1_epi32(bits as i32), weights);
            _mm256_castsi256_ps(_mm256_cmpeq_epi32(set, weights))
        }
    }

    /// Word lookup with a variable permute, then a variable shift to the bit.
    #[inline(always)]
    unsafe fn lbp_lookup(ge: &[__m256; 8], subset: &[u32; 8]) -> __m256 {
        unsafe {
            let mut code = _mm256_setzero_si256();
            for (&m, &w) in ge.iter().zip(&LBP_BIT_WEIGHTS) {
                code = _mm256_or_si256(
                    code,
                    _mm256_and_si256(_mm256_castps_si256(m), _mm256_set1_epi32(w as i32)),
                );
            }
            let table = _mm256_loadu_si256(subset.as_ptr() as *const __m256i);
            let word = _mm256_permutevar8x32_epi32(table, _mm256_srli_epi32::<5>(code));
            let shift = _mm256_and_si256(code, _mm256_set1_epi32(31));
            let bit = _mm256_and_si256(_mm256_srlv_epi32(word, shift), _mm256_set1_epi32(1));
            let miss = _mm256_cmpeq_epi32(bit, _mm256_setzero_si256());
            _mm256_castsi256_ps(_mm256_xor_si256(miss, _mm256_set1_epi32(-1)))
        }
    }
}

unsafe impl MaskRow for Avx2I16 {
    type Elem = u16;
    const LANES: usize = 16;

    #[inline(always)]
    unsafe fn unpack_mask(src: &[u8], dst: &mut [u16]) {
        let n = src.len().min(dst.len());
        let mut i = 0;
        unsafe {
            let one = _mm256_set1_epi16(1);
            while i + 16 <= n {
                let bytes = _mm_loadu_si128(src[i..i + 16].as_ptr() as *const __m128i);
                let words = _mm256_min_epu16(_mm256_cvtepu8_epi16(bytes), one);
                _mm256_storeu_si256(dst[i..i + 16].as_mut_ptr() as *mut __m256i, words);
                i += 16;
            }
        }
        for (d, &s) in dst[i..n].iter_mut().zip(&src[i..n]) {
            *d = (s != 0) as u16;
        }
    }

    #[inline(always)]
    unsafe fn unpack_mask_even(src: &[u8], dst: &mut [u16]) {
        let mut j = 0;
        unsafe {
            while j + 16 <= dst.len() && 2 * j + 32 <= src.len() {
                let flags = even_flags(&src[2 * j..]);
                _mm256_storeu_si256(dst[j..j + 16].as_mut_ptr() as *mut __m256i, flags);
                j += 16;
            }
        }
        unpack_even(&src[(2 * j).min(src.len())..], &mut dst[j..]);
    }

    /// Flags of `0`/`1` are already the little-endian byte pairs `[v, 0]`.
    #[inline(always)]
    unsafe fn pack_result_even(src: &[u16], dst: &mut [u8]) {
        let mut j = 0;
        unsafe {
            while j + 16 <= src.len() && 2 * j + 32 <= dst.len() {
                let words = Self::load(src, j);
                _mm256_storeu_si256(dst[2 * j..2 * j + 32].as_mut_ptr() as *mut __m256i, words);
                j += 16;
            }
        }
        let dst_len = dst.len();
        pack_even(&src[j..], &mut dst[(2 * j).min(dst_len)..]);
    }

    #[inline(always)]
    unsafe fn live_bits(m: &[u16], at: usize, lanes: usize) -> LiveMask {
        if lanes != Self::LANES {
            return m[at..at + lanes]
                .iter()
                .enumerate()
                .fold(0, |bits, (k, &v)| bits | (((v != 0) as LiveMask) << k));
        }
        unsafe {
            let zero = _mm256_cmpeq_epi16(Self::load(m, at), _mm256_setzero_si256());
            !Self::movemask(zero) & 0xFFFF
        }
    }
}

unsafe impl Lanes16 for Avx2I16 {
    type V = __m256i;
    type M = __m256i;

    #[inline(always)]
    unsafe fn load(src: &[u16], at: usize) -> __m256i {
        let src = &src[at..at + 16];
        unsafe { _mm256_loadu_si256(src.as_ptr() as *const __m256i) }
    }

    #[inline(always)]
    unsafe fn store(v: __m256i, dst: &mut [u16]) {
        let dst = &mut dst[..16];
        unsafe { _mm256_storeu_si256(dst.as_mut_ptr() as *mut __m256i, v) }
    }

    #[inline(always)]
    unsafe fn rect_sum(p0: __m256i, p1: __m256i, p2: __m256i, p3: __m256i) -> __m256i {
        unsafe { _mm256_add_epi16(_mm256_sub_epi16(_mm256_sub_epi16(p0, p1), p2), p3) }
    }

    #[inline(always)]
    unsafe fn ge_u(a: __m256i, b: __m256i) -> __m256i {
        unsafe { _mm256_cmpeq_epi16(_mm256_max_epu16(a, b), a) }
    }

    #[inline(always)]
    unsafe fn splat(v: i16) -> __m256i {
        unsafe { _mm256_set1_epi16(v) }
    }

    #[inline(always)]
    unsafe fn add(a: __m256i, b: __m256i) -> __m256i {
        unsafe { _mm256_add_epi16(a, b) }
    }

    #[inline(always)]
    unsafe fn lt_i(a: __m256i, b: __m256i) -> __m256i {
        unsafe { _mm256_cmpgt_epi16(b, a) }
    }

    #[inline(always)]
    unsafe fn select(m: __m256i, if_set: __m256i, if_clear: __m256i) -> __m256i {
        unsafe { _mm256_blendv_epi8(if_clear, if_set, m) }
    }

    #[inline(always)]
    unsafe fn movemask(m: __m256i) -> LiveMask {
        unsafe {
            let packed = _mm256_packs_epi16(m, _mm256_setzero_si256());
            let ordered = _mm256_permute4x64_epi64::<INTERLEAVE_FIX>(packed);
            (_mm256_movemask_epi8(ordered) as u32 & 0xFFFF) as LiveMask
        }
    }

    #[inline(always)]
    unsafe fn mask_from_bits(bits: LiveMask) -> __m256i {
        unsafe {
            let weights = _mm256_setr_epi16(
                1,
                2,
                4,
                8,
                16,
                32,
                64,
                128,
                256,
                512,
                1024,
                2048,
                4096,
                8192,
                16384,
                i16::MIN,
            );
            let set = _mm256_and_si256(_mm256_set1_epi16(bits as u16 as i16), weights);
            _mm256_cmpeq_epi16(set, weights)
        }
    }

    /// Byte shuffle into the subset, one 16-byte half per 128-bit lane.
    #[inline(always)]
    unsafe fn lbp_lookup(ge: &[__m256i; 8], subset: &[u32; 8]) -> __m256i {
        unsafe {
            let mut code = _mm256_setzero_si256();
            for (&m, &w) in ge.iter().zip(&LBP_BIT_WEIGHTS) {
                code = _mm256_or_si256(code, _mm256_and_si256(m, _mm256_set1_epi16(w as i16)));
            }
            let lo = _mm256_broadcastsi128_si256(_mm_loadu_si128(
                subset[0..4].as_ptr() as *const __m128i
            ));
            let hi = _mm256_broadcastsi128_si256(_mm_loadu_si128(
                subset[4..8].as_ptr() as *const __m128i
            ));
            let fill = _mm256_set1_epi16(0xFF00u16 as i16);
            let index = _mm256_or_si256(
                _mm256_and_si256(_mm256_srli_epi16::<3>(code), _mm256_set1_epi16(0x0F)),
                fill,
            );
            let shuffle_bits = _mm256_setr_epi8(
                1, 2, 4, 8, 16, 32, 64, -128, 1, 2, 4, 8, 16, 32, 64, -128, 1, 2, 4, 8, 16, 32,
                64, -128, 1, 2, 4, 8, 16, 32, 64, -128,
            );
            let bit = _mm256_shuffle_epi8(
                shuffle_bits,
                _mm256_or_si256(_mm256_and_si256(code, _mm256_set1_epi16(7)), fill),
            );
            let v0 = _mm256_and_si256(_mm256_shuffle_epi8(lo, index), bit);
            let v1 = _mm256_and_si256(_mm256_shuffle_epi8(hi, index), bit);
            let bytes = _mm256_blendv_epi8(v0, v1, ge[0]);
            let miss = _mm256_cmpeq_epi16(bytes, _mm256_setzero_si256());
            _mm256_xor_si256(miss, _mm256_set1_epi16(-1))
        }
    }
}
