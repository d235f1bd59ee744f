//! Array-backed lanes of any width. Compiles everywhere and serves as the
//! reference for the intrinsic backends.

use std::array;

use super::{Lanes16, Lanes32, LiveMask, MAX_LANES, MaskRow};

/// `N` 32-bit lanes.
#[derive(Debug, Clone, Copy)]
pub struct Portable<const N: usize>;

/// `N` 16-bit lanes.
#[derive(Debug, Clone, Copy)]
pub struct Portable16<const N: usize>;

#[inline(always)]
fn movemask<const N: usize>(m: [bool; N]) -> LiveMask {
    m.iter()
        .enumerate()
        .fold(0, |bits, (k, &set)| bits | ((set as LiveMask) << k))
}

#[inline(always)]
fn from_bits<const N: usize>(bits: LiveMask) -> [bool; N] {
    array::from_fn(|k| (bits >> k) & 1 != 0)
}

unsafe impl<const N: usize> MaskRow for Portable<N> {
    type Elem = u32;
    const LANES: usize = N;
}

unsafe impl<const N: usize> Lanes32 for Portable<N> {
    type U = [u32; N];
    type F = [f32; N];
    type M = [bool; N];

    #[inline(always)]
    unsafe fn load(src: &[u32], at: usize) -> [u32; N] {
        debug_assert!(N <= MAX_LANES);
        let src = &src[at..at + N];
        array::from_fn(|k| src[k])
    }

    #[inline(always)]
    unsafe fn load_even(src: &[u32], at: usize) -> [u32; N] {
        array::from_fn(|k| src[at + 2 * k])
    }

    #[inline(always)]
    unsafe fn store(v: [u32; N], dst: &mut [u32]) {
        dst[..N].copy_from_slice(&v);
    }

    #[inline(always)]
    unsafe fn store_f(v: [f32; N], dst: &mut [f32]) {
        dst[..N].copy_from_slice(&v);
    }

    #[inline(always)]
    unsafe fn rect_sum(p0: [u32; N], p1: [u32; N], p2: [u32; N], p3: [u32; N]) -> [u32; N] {
        array::from_fn(|k| {
            p0[k]
                .wrapping_sub(p1[k])
                .wrapping_sub(p2[k])
                .wrapping_add(p3[k])
        })
    }

    #[inline(always)]
    unsafe fn ge_u(a: [u32; N], b: [u32; N]) -> [bool; N] {
        array::from_fn(|k| a[k] >= b[k])
    }

    #[inline(always)]
    unsafe fn to_f(v: [u32; N]) -> [f32; N] {
        v.map(|x| x as i32 as f32)
    }

    #[inline(always)]
    unsafe fn splat_f(v: f32) -> [f32; N] {
        [v; N]
    }

    #[inline(always)]
    unsafe fn add_f(a: [f32; N], b: [f32; N]) -> [f32; N] {
        array::from_fn(|k| a[k] + b[k])
    }

    #[inline(always)]
    unsafe fn sub_f(a: [f32; N], b: [f32; N]) -> [f32; N] {
        array::from_fn(|k| a[k] - b[k])
    }

    #[inline(always)]
    unsafe fn mul_f(a: [f32; N], b: [f32; N]) -> [f32; N] {
        array::from_fn(|k| a[k] * b[k])
    }

    #[inline(always)]
    unsafe fn sqrt_or_one(v: [f32; N]) -> [f32; N] {
        v.map(|x| if x > 0.0 { x.sqrt() } else { 1.0 })
    }

    #[inline(always)]
    unsafe fn lt_f(a: [f32; N], b: [f32; N]) -> [bool; N] {
        array::from_fn(|k| a[k] < b[k])
    }

    #[inline(always)]
    unsafe fn select_f(m: [bool; N], if_set: [f32; N], if_clear: [f32; N]) -> [f32; N] {
        array::from_fn(|k| if m[k] { if_set[k] } else { if_clear[k] })
    }

    #[inline(always)]
    unsafe fn movemask(m: [bool; N]) -> LiveMask {
        movemask(m)
    }

    #[inline(always)]
    unsafe fn mask_from_bits(bits: LiveMask) -> [bool; N] {
        from_bits(bits)
    }
}

unsafe impl<const N: usize> MaskRow for Portable16<N> {
    type Elem = u16;
    const LANES: usize = N;
}

unsafe impl<const N: usize> Lanes16 for Portable16<N> {
    type V = [u16; N];
    type M = [bool; N];

    #[inline(always)]
    unsafe fn load(src: &[u16], at: usize) -> [u16; N] {
        debug_assert!(N <= MAX_LANES);
        let src = &src[at..at + N];
        array::from_fn(|k| src[k])
    }

    #[inline(always)]
    unsafe fn store(v: [u16; N], dst: &mut [u16]) {
        dst[..N].copy_from_slice(&v);
    }

    #[inline(always)]
    unsafe fn rect_sum(p0: [u16; N], p1: [u16; N], p2: [u16; N], p3: [u16; N]) -> [u16; N] {
        array::from_fn(|k| {
            p0[k]
                .wrapping_sub(p1[k])
                .wrapping_sub(p2[k])
                .wrapping_add(p3[k])
        })
    }

    #[inline(always)]
    unsafe fn ge_u(a: [u16; N], b: [u16; N]) -> [bool; N] {
        array::from_fn(|k| a[k] >= b[k])
    }

    #[inline(always)]
    unsafe fn splat(v: i16) -> [u16; N] {
        [v as u16; N]
    }

    #[inline(always)]
    unsafe fn add(a: [u16; N], b: [u16; N]) -> [u16; N] {
        array::from_fn(|k| a[k].wrapping_add(b[k]))
    }

    #[inline(always)]
    unsafe fn lt_i(a: [u16; N], b: [u16; N]) -> [bool; N] {
        array::from_fn(|k| (a[k] as i16) < (b[k] as i16))
    }

    #[inline(always)]
    unsafe fn select(m: [bool; N], if_set: [u16; N], if_clear: [u16; N]) -> [u16; N] {
        array::from_fn(|k| if m[k] { if_set[k] } else { if_clear[k] })
    }

    #[inline(always)]
    unsafe fn movemask(m: [bool; N]) -> LiveMask {
        movemask(m)
    }

    #[inline(always)]
    unsafe fn mask_from_bits(bits: LiveMask) -> [bool; N] {
        from_bits(bits)
    }
}
