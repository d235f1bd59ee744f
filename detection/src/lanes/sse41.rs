//! SSE4.1 lanes: 4 x 32-bit and 8 x 16-bit.

use std::arch::x86_64::*;

use super::{LBP_BIT_WEIGHTS, Lanes16, Lanes32, LiveMask, MaskRow, pack_even, unpack_even};

#[derive(Debug, Clone, Copy)]
pub struct Sse41F32;

#[derive(Debug, Clone, Copy)]
pub struct Sse41I16;

/// `1 << i` in byte `i & 7`.
#[inline(always)]
unsafe fn shuffle_bits() -> __m128i {
    unsafe { _mm_setr_epi8(1, 2, 4, 8, 16, 32, 64, -128, 1, 2, 4, 8, 16, 32, 64, -128) }
}

/// Bytes `0, 2, ..., 14` of `src[..16]` as eight 16-bit `0`/`1` flags.
#[inline(always)]
unsafe fn even_flags(src: &[u8]) -> __m128i {
    let src = &src[..16];
    unsafe {
        let bytes = _mm_loadu_si128(src.as_ptr() as *const __m128i);
        _mm_and_si128(_mm_min_epu8(bytes, _mm_set1_epi8(1)), _mm_set1_epi16(1))
    }
}

/// Byte-table subset lookup shared by both lane widths.
///
/// `code` holds one LBP code per lane and `shifted` the same codes shifted
/// right by 3. `fill` sets every byte of a lane except the lowest; `high`
/// selects the upper 16 bytes of the subset.
#[inline(always)]
unsafe fn lookup_bytes(
    code: __m128i,
    shifted: __m128i,
    fill: __m128i,
    high: __m128i,
    subset: &[u32; 8],
) -> __m128i {
    unsafe {
        let lo = _mm_loadu_si128(subset[0..4].as_ptr() as *const __m128i);
        let hi = _mm_loadu_si128(subset[4..8].as_ptr() as *const __m128i);
        let index = _mm_or_si128(_mm_and_si128(shifted, _mm_set1_epi8(0x0F)), fill);
        let bit = _mm_shuffle_epi8(
            shuffle_bits(),
            _mm_or_si128(_mm_and_si128(code, _mm_set1_epi8(7)), fill),
        );
        let v0 = _mm_and_si128(_mm_shuffle_epi8(lo, index), bit);
        let v1 = _mm_and_si128(_mm_shuffle_epi8(hi, index), bit);
        _mm_blendv_epi8(v0, v1, high)
    }
}

unsafe impl MaskRow for Sse41F32 {
    type Elem = u32;
    const LANES: usize = 4;

    #[inline(always)]
    unsafe fn unpack_mask(src: &[u8], dst: &mut [u32]) {
        let n = src.len().min(dst.len());
        let mut i = 0;
        unsafe {
            let one = _mm_set1_epi8(1);
            while i + 16 <= n {
                let bytes = _mm_min_epu8(
                    _mm_loadu_si128(src[i..i + 16].as_ptr() as *const __m128i),
                    one,
                );
                let out = dst[i..i + 16].as_mut_ptr() as *mut __m128i;
                _mm_storeu_si128(out, _mm_cvtepu8_epi32(bytes));
                _mm_storeu_si128(out.add(1), _mm_cvtepu8_epi32(_mm_srli_si128::<4>(bytes)));
                _mm_storeu_si128(out.add(2), _mm_cvtepu8_epi32(_mm_srli_si128::<8>(bytes)));
                _mm_storeu_si128(out.add(3), _mm_cvtepu8_epi32(_mm_srli_si128::<12>(bytes)));
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
                let p = src[i..i + 16].as_ptr() as *const __m128i;
                let lo = _mm_packs_epi32(_mm_loadu_si128(p), _mm_loadu_si128(p.add(1)));
                let hi = _mm_packs_epi32(_mm_loadu_si128(p.add(2)), _mm_loadu_si128(p.add(3)));
                _mm_storeu_si128(
                    dst[i..i + 16].as_mut_ptr() as *mut __m128i,
                    _mm_packus_epi16(lo, hi),
                );
                i += 16;
            }
        }
        for (d, &s) in dst[i..n].iter_mut().zip(&src[i..n]) {
            *d = (s != 0) as u8;
        }
    }

    #[inline(always)]
    unsafe fn unpack_mask_even(src: &[u8], dst: &mut [u32]) {
        let mut j = 0;
        unsafe {
            while j + 8 <= dst.len() && 2 * j + 16 <= src.len() {
                let flags = even_flags(&src[2 * j..]);
                let out = dst[j..j + 8].as_mut_ptr() as *mut __m128i;
                _mm_storeu_si128(out, _mm_cvtepu16_epi32(flags));
                _mm_storeu_si128(out.add(1), _mm_cvtepu16_epi32(_mm_srli_si128::<8>(flags)));
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
                let p = src[j..j + 8].as_ptr() as *const __m128i;
                let words = _mm_packs_epi32(_mm_loadu_si128(p), _mm_loadu_si128(p.add(1)));
                _mm_storeu_si128(dst[2 * j..2 * j + 16].as_mut_ptr() as *mut __m128i, words);
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
            let v = Self::load(m, at);
            let zero = _mm_cmpeq_epi32(v, _mm_setzero_si128());
            (!_mm_movemask_ps(_mm_castsi128_ps(zero)) & 0xF) as LiveMask
        }
    }
}

unsafe impl Lanes32 for Sse41F32 {
    type U = __m128i;
    type F = __m128;
    type M = __m128;

    #[inline(always)]
    unsafe fn load(src: &[u32], at: usize) -> __m128i {
        let src = &src[at..at + 4];
        unsafe { _mm_loadu_si128(src.as_ptr() as *const __m128i) }
    }

    #[inline(always)]
    unsafe fn load_even(src: &[u32], at: usize) -> __m128i {
        if at + 8 <= src.len() {
            unsafe {
                let lo = _mm_castsi128_ps(Self::load(src, at));
                let hi = _mm_castsi128_ps(Self::load(src, at + 4));
                _mm_castps_si128(_mm_shuffle_ps::<0b10_00_10_00>(lo, hi))
            }
        } else {
            unsafe { Self::load_even_partial(src, at, 4) }
        }
    }

    #[inline(always)]
    unsafe fn store(v: __m128i, dst: &mut [u32]) {
        let dst = &mut dst[..4];
        unsafe { _mm_storeu_si128(dst.as_mut_ptr() as *mut __m128i, v) }
    }

    #[inline(always)]
    unsafe fn store_f(v: __m128, dst: &mut [f32]) {
        let dst = &mut dst[..4];
        unsafe { _mm_storeu_ps(dst.as_mut_ptr(), v) }
    }

    #[inline(always)]
    unsafe fn rect_sum(p0: __m128i, p1: __m128i, p2: __m128i, p3: __m128i) -> __m128i {
        unsafe { _mm_add_epi32(_mm_sub_epi32(_mm_sub_epi32(p0, p1), p2), p3) }
    }

    #[inline(always)]
    unsafe fn ge_u(a: __m128i, b: __m128i) -> __m128 {
        unsafe { _mm_castsi128_ps(_mm_cmpeq_epi32(_mm_max_epu32(a, b), a)) }
    }

    #[inline(always)]
    unsafe fn to_f(v: __m128i) -> __m128 {
        unsafe { _mm_cvtepi32_ps(v) }
    }

    #[inline(always)]
    unsafe fn splat_f(v: f32) -> __m128 {
        unsafe { _mm_set1_ps(v) }
    }

    #[inline(always)]
    unsafe fn add_f(a: __m128, b: __m128) -> __m128 {
        unsafe { _mm_add_ps(a, b) }
    }

    #[inline(always)]
    unsafe fn sub_f(a: __m128, b: __m128) -> __m128 {
        unsafe { _mm_sub_ps(a, b) }
    }

    #[inline(always)]
    unsafe fn mul_f(a: __m128, b: __m128) -> __m128 {
        unsafe { _mm_mul_ps(a, b) }
    }

    #[inline(always)]
    unsafe fn sqrt_or_one(v: __m128) -> __m128 {
        unsafe {
            let positive = _mm_cmpgt_ps(v, _mm_setzero_ps());
            _mm_blendv_ps(_mm_set1_ps(1.0), _mm_sqrt_ps(v), positive)
        }
    }

    #[inline(always)]
    unsafe fn lt_f(a: __m128, b: __m128) -> __m128 {
        unsafe { _mm_cmplt_ps(a, b) }
    }

    #[inline(always)]
    unsafe fn select_f(m: __m128, if_set: __m128, if_clear: __m128) -> __m128 {
        unsafe { _mm_blendv_ps(if_clear, if_set, m) }
    }

    #[inline(always)]
    unsafe fn movemask(m: __m128) -> LiveMask {
        unsafe { (_mm_movemask_ps(m) & 0xF) as LiveMask }
    }

    #[inline(always)]
    unsafe fn mask_from_bits(bits: LiveMask) -> __m128 {
        unsafe {
            let weights = _mm_setr_epi32(1, 2, 4, 8);
            let set = _mm_and_si128(_mm_set1_epi32(bits as i32), weights);
            _mm_castsi128_ps(_mm_cmpeq_epi32(set, weights))
        }
    }

    #[inline(always)]
    unsafe fn lbp_lookup(ge: &[__m128; 8], subset: &[u32; 8]) -> __m128 {
        unsafe {
            let mut code = _mm_setzero_si128();
            for (&m, &w) in ge.iter().zip(&LBP_BIT_WEIGHTS) {
                code = _mm_or_si128(
                    code,
                    _mm_and_si128(_mm_castps_si128(m), _mm_set1_epi32(w as i32)),
                );
            }
            let fill = _mm_set1_epi32(0xFFFF_FF00u32 as i32);
            let bytes = lookup_bytes(
                code,
                _mm_srli_epi32::<3>(code),
                fill,
                _mm_castps_si128(ge[0]),
                subset,
            );
            let miss = _mm_cmpeq_epi32(bytes, _mm_setzero_si128());
            _mm_castsi128_ps(_mm_xor_si128(miss, _mm_set1_epi32(-1)))
        }
    }
}

unsafe impl MaskRow for Sse41I16 {
    type Elem = u16;
    const LANES: usize = 8;

    #[inline(always)]
    unsafe fn unpack_mask(src: &[u8], dst: &mut [u16]) {
        let n = src.len().min(dst.len());
        let mut i = 0;
        unsafe {
            let one = _mm_set1_epi8(1);
            while i + 16 <= n {
                let bytes = _mm_min_epu8(
                    _mm_loadu_si128(src[i..i + 16].as_ptr() as *const __m128i),
                    one,
                );
                let out = dst[i..i + 16].as_mut_ptr() as *mut __m128i;
                _mm_storeu_si128(out, _mm_cvtepu8_epi16(bytes));
                _mm_storeu_si128(out.add(1), _mm_cvtepu8_epi16(_mm_srli_si128::<8>(bytes)));
                i += 16;
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
            while i + 16 <= n {
                let p = src[i..i + 16].as_ptr() as *const __m128i;
                let packed = _mm_packus_epi16(_mm_loadu_si128(p), _mm_loadu_si128(p.add(1)));
                _mm_storeu_si128(dst[i..i + 16].as_mut_ptr() as *mut __m128i, packed);
                i += 16;
            }
        }
        for (d, &s) in dst[i..n].iter_mut().zip(&src[i..n]) {
            *d = (s != 0) as u8;
        }
    }

    #[inline(always)]
    unsafe fn unpack_mask_even(src: &[u8], dst: &mut [u16]) {
        let mut j = 0;
        unsafe {
            while j + 8 <= dst.len() && 2 * j + 16 <= src.len() {
                let flags = even_flags(&src[2 * j..]);
                _mm_storeu_si128(dst[j..j + 8].as_mut_ptr() as *mut __m128i, flags);
                j += 8;
            }
        }
        unpack_even(&src[(2 * j).min(src.len())..], &mut dst[j..]);
    }

    /// Flags of `0`/`1` are already the little-endian byte pairs `[v, 0]`.
    #[inline(always)]
    unsafe fn pack_result_even(src: &[u16], dst: &mut [u8]) {
        let mut j = 0;
        unsafe {
            while j + 8 <= src.len() && 2 * j + 16 <= dst.len() {
                let words = Self::load(src, j);
                _mm_storeu_si128(dst[2 * j..2 * j + 16].as_mut_ptr() as *mut __m128i, words);
                j += 8;
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
            let zero = _mm_cmpeq_epi16(Self::load(m, at), _mm_setzero_si128());
            !Self::movemask(zero) & 0xFF
        }
    }
}

unsafe impl Lanes16 for Sse41I16 {
    type V = __m128i;
    type M = __m128i;

    #[inline(always)]
    unsafe fn load(src: &[u16], at: usize) -> __m128i {
        let src = &src[at..at + 8];
        unsafe { _mm_loadu_si128(src.as_ptr() as *const __m128i) }
    }

    #[inline(always)]
    unsafe fn store(v: __m128i, dst: &mut [u16]) {
        let dst = &mut dst[..8];
        unsafe { _mm_storeu_si128(dst.as_mut_ptr() as *mut __m128i, v) }
    }

    #[inline(always)]
    unsafe fn rect_sum(p0: __m128i, p1: __m128i, p2: __m128i, p3: __m128i) -> __m128i {
        unsafe { _mm_add_epi16(_mm_sub_epi16(_mm_sub_epi16(p0, p1), p2), p3) }
    }

    #[inline(always)]
    unsafe fn ge_u(a: __m128i, b: __m128i) -> __m128i {
        unsafe { _mm_cmpeq_epi16(_mm_max_epu16(a, b), a) }
    }

    #[inline(always)]
    unsafe fn splat(v: i16) -> __m128i {
        unsafe { _mm_set1_epi16(v) }
    }

    #[inline(always)]
    unsafe fn add(a: __m128i, b: __m128i) -> __m128i {
        unsafe { _mm_add_epi16(a, b) }
    }

    #[inline(always)]
    unsafe fn lt_i(a: __m128i, b: __m128i) -> __m128i {
        unsafe { _mm_cmplt_epi16(a, b) }
    }

    #[inline(always)]
    unsafe fn select(m: __m128i, if_set: __m128i, if_clear: __m128i) -> __m128i {
        unsafe { _mm_blendv_epi8(if_clear, if_set, m) }
    }

    #[inline(always)]
    unsafe fn movemask(m: __m128i) -> LiveMask {
        unsafe { (_mm_movemask_epi8(_mm_packs_epi16(m, _mm_setzero_si128())) & 0xFF) as LiveMask }
    }

    #[inline(always)]
    unsafe fn mask_from_bits(bits: LiveMask) -> __m128i {
        unsafe {
            let weights = _mm_setr_epi16(1, 2, 4, 8, 16, 32, 64, 128);
            let set = _mm_and_si128(_mm_set1_epi16(bits as i16), weights);
            _mm_cmpeq_epi16(set, weights)
        }
    }

    #[inline(always)]
    unsafe fn lbp_lookup(ge: &[__m128i; 8], subset: &[u32; 8]) -> __m128i {
        unsafe {
            let mut code = _mm_setzero_si128();
            for (&m, &w) in ge.iter().zip(&LBP_BIT_WEIGHTS) {
                code = _mm_or_si128(code, _mm_and_si128(m, _mm_set1_epi16(w as i16)));
            }
            let fill = _mm_set1_epi16(0xFF00u16 as i16);
            let bytes = lookup_bytes(code, _mm_srli_epi16::<3>(code), fill, ge[0], subset);
            let miss = _mm_cmpeq_epi16(bytes, _mm_setzero_si128());
            _mm_xor_si128(miss, _mm_set1_epi16(-1))
        }
    }
}
