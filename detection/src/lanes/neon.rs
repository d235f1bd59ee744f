//! NEON lanes: 4 x 32-bit and 8 x 16-bit.

use std::arch::aarch64::*;

use super::{LBP_BIT_WEIGHTS, Lanes16, Lanes32, LiveMask, MaskRow, pack_even, unpack_even};

#[derive(Debug, Clone, Copy)]
pub struct NeonF32;

#[derive(Debug, Clone, Copy)]
pub struct NeonI16;

const WEIGHTS32: [u32; 4] = [1, 2, 4, 8];
const WEIGHTS16: [u16; 8] = [1, 2, 4, 8, 16, 32, 64, 128];

/// The 32-byte subset as a two-register table for `vqtbl2q_u8`.
#[inline(always)]
unsafe fn subset_table(subset: &[u32; 8]) -> uint8x16x2_t {
    unsafe {
        uint8x16x2_t(
            vreinterpretq_u8_u32(vld1q_u32(subset[0..4].as_ptr())),
            vreinterpretq_u8_u32(vld1q_u32(subset[4..8].as_ptr())),
        )
    }
}

/// Bytes `0, 2, ..., 14` of `src[..16]` as eight 16-bit `0`/`1` flags.
#[inline(always)]
unsafe fn even_flags(src: &[u8]) -> uint16x8_t {
    let src = &src[..16];
    unsafe { vminq_u16(vmovl_u8(vld2_u8(src.as_ptr()).0), vdupq_n_u16(1)) }
}

unsafe impl MaskRow for NeonF32 {
    type Elem = u32;
    const LANES: usize = 4;

    #[inline(always)]
    unsafe fn unpack_mask_even(src: &[u8], dst: &mut [u32]) {
        let mut j = 0;
        unsafe {
            while j + 8 <= dst.len() && 2 * j + 16 <= src.len() {
                let flags = even_flags(&src[2 * j..]);
                let out = dst[j..j + 8].as_mut_ptr();
                vst1q_u32(out, vmovl_u16(vget_low_u16(flags)));
                vst1q_u32(out.add(4), vmovl_u16(vget_high_u16(flags)));
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
                let words = vcombine_u16(
                    vmovn_u32(Self::load(src, j)),
                    vmovn_u32(Self::load(src, j + 4)),
                );
                vst1q_u8(dst[2 * j..2 * j + 16].as_mut_ptr(), vreinterpretq_u8_u16(words));
                j += 8;
            }
        }
        let dst_len = dst.len();
        pack_even(&src[j..], &mut dst[(2 * j).min(dst_len)..]);
    }
}

unsafe impl Lanes32 for NeonF32 {
    type U = uint32x4_t;
    type F = float32x4_t;
    type M = uint32x4_t;

    #[inline(always)]
    unsafe fn load(src: &[u32], at: usize) -> uint32x4_t {
        let src = &src[at..at + 4];
        unsafe { vld1q_u32(src.as_ptr()) }
    }

    #[inline(always)]
    unsafe fn load_even(src: &[u32], at: usize) -> uint32x4_t {
        if at + 8 <= src.len() {
            let src = &src[at..at + 8];
            unsafe { vld2q_u32(src.as_ptr()).0 }
        } else {
            unsafe { Self::load_even_partial(src, at, 4) }
        }
    }

    #[inline(always)]
    unsafe fn store(v: uint32x4_t, dst: &mut [u32]) {
        let dst = &mut dst[..4];
        unsafe { vst1q_u32(dst.as_mut_ptr(), v) }
    }

    #[inline(always)]
    unsafe fn store_f(v: float32x4_t, dst: &mut [f32]) {
        let dst = &mut dst[..4];
        unsafe { vst1q_f32(dst.as_mut_ptr(), v) }
    }

    #[inline(always)]
    unsafe fn rect_sum(p0: uint32x4_t, p1: uint32x4_t, p2: uint32x4_t, p3: uint32x4_t) -> uint32x4_t {
        unsafe { vaddq_u32(vsubq_u32(vsubq_u32(p0, p1), p2), p3) }
    }

    #[inline(always)]
    unsafe fn ge_u(a: uint32x4_t, b: uint32x4_t) -> uint32x4_t {
        unsafe { vcgeq_u32(a, b) }
    }

    #[inline(always)]
    unsafe fn to_f(v: uint32x4_t) -> float32x4_t {
        unsafe { vcvtq_f32_s32(vreinterpretq_s32_u32(v)) }
    }

    #[inline(always)]
    unsafe fn splat_f(v: f32) -> float32x4_t {
        unsafe { vdupq_n_f32(v) }
    }

    #[inline(always)]
    unsafe fn add_f(a: float32x4_t, b: float32x4_t) -> float32x4_t {
        unsafe { vaddq_f32(a, b) }
    }

    #[inline(always)]
    unsafe fn sub_f(a: float32x4_t, b: float32x4_t) -> float32x4_t {
        unsafe { vsubq_f32(a, b) }
    }

    #[inline(always)]
    unsafe fn mul_f(a: float32x4_t, b: float32x4_t) -> float32x4_t {
        unsafe { vmulq_f32(a, b) }
    }

    #[inline(always)]
    unsafe fn sqrt_or_one(v: float32x4_t) -> float32x4_t {
        unsafe {
            let positive = vcgtq_f32(v, vdupq_n_f32(0.0));
            vbslq_f32(positive, vsqrtq_f32(v), vdupq_n_f32(1.0))
        }
    }

    #[inline(always)]
    unsafe fn lt_f(a: float32x4_t, b: float32x4_t) -> uint32x4_t {
        unsafe { vcltq_f32(a, b) }
    }

    #[inline(always)]
    unsafe fn select_f(m: uint32x4_t, if_set: float32x4_t, if_clear: float32x4_t) -> float32x4_t {
        unsafe { vbslq_f32(m, if_set, if_clear) }
    }

    #[inline(always)]
    unsafe fn movemask(m: uint32x4_t) -> LiveMask {
        unsafe { vaddvq_u32(vandq_u32(m, vld1q_u32(WEIGHTS32.as_ptr()))) as LiveMask }
    }

    #[inline(always)]
    unsafe fn mask_from_bits(bits: LiveMask) -> uint32x4_t {
        unsafe { vtstq_u32(vdupq_n_u32(bits as u32), vld1q_u32(WEIGHTS32.as_ptr())) }
    }

    /// Table lookup of byte `code >> 3`, then shift bit `code & 7` down.
    #[inline(always)]
    unsafe fn lbp_lookup(ge: &[uint32x4_t; 8], subset: &[u32; 8]) -> uint32x4_t {
        unsafe {
            let mut code = vdupq_n_u32(0);
            for (&m, &w) in ge.iter().zip(&LBP_BIT_WEIGHTS) {
                code = vorrq_u32(code, vandq_u32(m, vdupq_n_u32(w)));
            }
            let index = vorrq_u32(vshrq_n_u32::<3>(code), vdupq_n_u32(0xFFFF_FF00));
            let bytes = vqtbl2q_u8(subset_table(subset), vreinterpretq_u8_u32(index));
            let shift = vnegq_s32(vreinterpretq_s32_u32(vandq_u32(code, vdupq_n_u32(7))));
            let bit = vshlq_u32(vreinterpretq_u32_u8(bytes), shift);
            vtstq_u32(bit, vdupq_n_u32(1))
        }
    }
}

unsafe impl MaskRow for NeonI16 {
    type Elem = u16;
    const LANES: usize = 8;

    #[inline(always)]
    unsafe fn unpack_mask_even(src: &[u8], dst: &mut [u16]) {
        let mut j = 0;
        unsafe {
            while j + 8 <= dst.len() && 2 * j + 16 <= src.len() {
                vst1q_u16(dst[j..j + 8].as_mut_ptr(), even_flags(&src[2 * j..]));
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
                vst1q_u8(dst[2 * j..2 * j + 16].as_mut_ptr(), vreinterpretq_u8_u16(words));
                j += 8;
            }
        }
        let dst_len = dst.len();
        pack_even(&src[j..], &mut dst[(2 * j).min(dst_len)..]);
    }
}

unsafe impl Lanes16 for NeonI16 {
    type V = uint16x8_t;
    type M = uint16x8_t;

    #[inline(always)]
    unsafe fn load(src: &[u16], at: usize) -> uint16x8_t {
        let src = &src[at..at + 8];
        unsafe { vld1q_u16(src.as_ptr()) }
    }

    #[inline(always)]
    unsafe fn store(v: uint16x8_t, dst: &mut [u16]) {
        let dst = &mut dst[..8];
        unsafe { vst1q_u16(dst.as_mut_ptr(), v) }
    }

    #[inline(always)]
    unsafe fn rect_sum(p0: uint16x8_t, p1: uint16x8_t, p2: uint16x8_t, p3: uint16x8_t) -> uint16x8_t {
        unsafe { vaddq_u16(vsubq_u16(vsubq_u16(p0, p1), p2), p3) }
    }

    #[inline(always)]
    unsafe fn ge_u(a: uint16x8_t, b: uint16x8_t) -> uint16x8_t {
        unsafe { vcgeq_u16(a, b) }
    }

    #[inline(always)]
    unsafe fn splat(v: i16) -> uint16x8_t {
        unsafe { vdupq_n_u16(v as u16) }
    }

    #[inline(always)]
    unsafe fn add(a: uint16x8_t, b: uint16x8_t) -> uint16x8_t {
        unsafe { vaddq_u16(a, b) }
    }

    #[inline(always)]
    unsafe fn lt_i(a: uint16x8_t, b: uint16x8_t) -> uint16x8_t {
        unsafe { vcltq_s16(vreinterpretq_s16_u16(a), vreinterpretq_s16_u16(b)) }
    }

    #[inline(always)]
    unsafe fn select(m: uint16x8_t, if_set: uint16x8_t, if_clear: uint16x8_t) -> uint16x8_t {
        unsafe { vbslq_u16(m, if_set, if_clear) }
    }

    #[inline(always)]
    unsafe fn movemask(m: uint16x8_t) -> LiveMask {
        unsafe { vaddvq_u16(vandq_u16(m, vld1q_u16(WEIGHTS16.as_ptr()))) as LiveMask }
    }

    #[inline(always)]
    unsafe fn mask_from_bits(bits: LiveMask) -> uint16x8_t {
        unsafe { vtstq_u16(vdupq_n_u16(bits as u16), vld1q_u16(WEIGHTS16.as_ptr())) }
    }

    #[inline(always)]
    unsafe fn lbp_lookup(ge: &[uint16x8_t; 8], subset: &[u32; 8]) -> uint16x8_t {
        unsafe {
            let mut code = vdupq_n_u16(0);
            for (&m, &w) in ge.iter().zip(&LBP_BIT_WEIGHTS) {
                code = vorrq_u16(code, vandq_u16(m, vdupq_n_u16(w as u16)));
            }
            let index = vorrq_u16(vshrq_n_u16::<3>(code), vdupq_n_u16(0xFF00));
            let bytes = vqtbl2q_u8(subset_table(subset), vreinterpretq_u8_u16(index));
            let shift = vnegq_s16(vreinterpretq_s16_u16(vandq_u16(code, vdupq_n_u16(7))));
            let bit = vshlq_u16(vreinterpretq_u16_u8(bytes), shift);
            vtstq_u16(bit, vdupq_n_u16(1))
        }
    }
}
