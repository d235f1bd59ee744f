//! Fixed-width lane model the cascade evaluators are written against.
//!
//! A backend is a zero-sized type implementing [`MaskRow`] plus either
//! [`Lanes32`] (u32 sums, f32 scores) or [`Lanes16`] (u16 sums, i16 scores).
//! All methods are `#[inline(always)]` so they fold into the
//! `#[target_feature]` entry points of each backend module; calling them
//! outside such a function on a CPU without the instructions is undefined
//! behaviour, hence `unsafe`.
//!
//! Each lane is one candidate window. The set of windows still under
//! consideration is a [`LiveMask`] with bit `k` for lane `k`.

pub mod portable;

#[cfg(target_arch = "x86_64")]
pub mod sse41;

#[cfg(target_arch = "x86_64")]
pub mod avx2;

#[cfg(target_arch = "x86_64")]
pub mod avx512bw;

#[cfg(target_arch = "aarch64")]
pub mod neon;

#[cfg(test)]
mod tests;

/// Bit `k` set while lane `k` is live.
pub type LiveMask = u64;

/// Upper bound on the lane count of any backend.
pub const MAX_LANES: usize = 64;

/// Lane element of the unpacked mask and result rows.
pub trait LaneElem: Copy + Default + Eq + Send + Sync + 'static {
    const ONE: Self;
}

impl LaneElem for u32 {
    const ONE: u32 = 1;
}

impl LaneElem for u16 {
    const ONE: u16 = 1;
}

/// Bits `0..count` set.
#[inline(always)]
pub fn lanes_mask(count: usize) -> LiveMask {
    if count >= LiveMask::BITS as usize {
        LiveMask::MAX
    } else {
        (1 << count) - 1
    }
}

/// Scalar body of [`MaskRow::unpack_mask_even`], also used for row tails.
#[inline(always)]
pub(crate) fn unpack_even<T: LaneElem>(src: &[u8], dst: &mut [T]) {
    for (d, &s) in dst.iter_mut().zip(src.iter().step_by(2)) {
        *d = if s != 0 { T::ONE } else { T::default() };
    }
}

/// Scalar body of [`MaskRow::pack_result_even`], also used for row tails.
#[inline(always)]
pub(crate) fn pack_even<T: LaneElem>(src: &[T], dst: &mut [u8]) {
    for (pair, &s) in dst.chunks_mut(2).zip(src) {
        pair[0] = (s != T::default()) as u8;
        if let Some(odd) = pair.get_mut(1) {
            *odd = 0;
        }
    }
}

/// Per-row mask handling shared by both lane widths.
///
/// # Safety
///
/// Implementors may use any instruction of their backend; callers must run
/// on a CPU that supports it.
pub unsafe trait MaskRow {
    type Elem: LaneElem;

    const LANES: usize;

    /// Evaluate the row tail as one partial block instead of an overlapping
    /// full block.
    const MASKED_TAIL: bool = false;

    /// `dst[i] = (src[i] != 0) as Elem` for the common length.
    #[inline(always)]
    unsafe fn unpack_mask(src: &[u8], dst: &mut [Self::Elem]) {
        for (d, &s) in dst.iter_mut().zip(src) {
            *d = if s != 0 {
                Self::Elem::ONE
            } else {
                Self::Elem::default()
            };
        }
    }

    /// `dst[i] = (src[i] != 0) as u8` for the common length.
    #[inline(always)]
    unsafe fn pack_result(src: &[Self::Elem], dst: &mut [u8]) {
        for (d, &s) in dst.iter_mut().zip(src) {
            *d = (s != Self::Elem::default()) as u8;
        }
    }

    /// `dst[j] = (src[2 * j] != 0) as Elem` for every `j` with `2 * j` in
    /// `src`.
    #[inline(always)]
    unsafe fn unpack_mask_even(src: &[u8], dst: &mut [Self::Elem]) {
        unpack_even(src, dst);
    }

    /// `dst[2 * j] = (src[j] != 0) as u8` and `dst[2 * j + 1] = 0`, as far
    /// as `dst` reaches.
    ///
    /// `src` holds only `0` and `ONE`.
    #[inline(always)]
    unsafe fn pack_result_even(src: &[Self::Elem], dst: &mut [u8]) {
        pack_even(src, dst);
    }

    /// Live bits of `m[at..at + lanes]`.
    #[inline(always)]
    unsafe fn live_bits(m: &[Self::Elem], at: usize, lanes: usize) -> LiveMask {
        m[at..at + lanes]
            .iter()
            .enumerate()
            .fold(0, |bits, (k, &v)| {
                bits | (((v != Self::Elem::default()) as LiveMask) << k)
            })
    }
}

/// 32-bit lanes: u32 integral sums, f32 scores.
///
/// # Safety
///
/// See [`MaskRow`].
pub unsafe trait Lanes32: MaskRow<Elem = u32> {
    /// Integer lanes.
    type U: Copy;
    /// Float lanes.
    type F: Copy;
    /// Per-lane comparison result.
    type M: Copy;

    /// `src[at..at + LANES]`.
    unsafe fn load(src: &[u32], at: usize) -> Self::U;

    /// `src[at + 2k]` for every lane `k`.
    unsafe fn load_even(src: &[u32], at: usize) -> Self::U;

    unsafe fn store(v: Self::U, dst: &mut [u32]);

    unsafe fn store_f(v: Self::F, dst: &mut [f32]);

    /// First `count` lanes from `src[at..]`, the rest zero.
    #[inline(always)]
    unsafe fn load_partial(src: &[u32], at: usize, count: usize) -> Self::U {
        let mut tmp = [0u32; MAX_LANES];
        tmp[..count].copy_from_slice(&src[at..at + count]);
        unsafe { Self::load(&tmp, 0) }
    }

    /// First `count` lanes from `src[at + 2k]`, the rest zero.
    #[inline(always)]
    unsafe fn load_even_partial(src: &[u32], at: usize, count: usize) -> Self::U {
        let mut tmp = [0u32; MAX_LANES];
        for (k, t) in tmp[..count].iter_mut().enumerate() {
            *t = src[at + 2 * k];
        }
        unsafe { Self::load(&tmp, 0) }
    }

    /// `p0 - p1 - p2 + p3`, wrapping.
    unsafe fn rect_sum(p0: Self::U, p1: Self::U, p2: Self::U, p3: Self::U) -> Self::U;

    /// Unsigned `a >= b`.
    unsafe fn ge_u(a: Self::U, b: Self::U) -> Self::M;

    /// Lanes reinterpreted as `i32` and converted to `f32`.
    unsafe fn to_f(v: Self::U) -> Self::F;

    unsafe fn splat_f(v: f32) -> Self::F;

    unsafe fn add_f(a: Self::F, b: Self::F) -> Self::F;

    unsafe fn sub_f(a: Self::F, b: Self::F) -> Self::F;

    unsafe fn mul_f(a: Self::F, b: Self::F) -> Self::F;

    /// `sqrt(v)` where `v > 0`, else `1.0`.
    unsafe fn sqrt_or_one(v: Self::F) -> Self::F;

    /// Ordered `a < b`.
    unsafe fn lt_f(a: Self::F, b: Self::F) -> Self::M;

    /// `if_set` where `m` holds, else `if_clear`.
    unsafe fn select_f(m: Self::M, if_set: Self::F, if_clear: Self::F) -> Self::F;

    unsafe fn movemask(m: Self::M) -> LiveMask;

    unsafe fn mask_from_bits(bits: LiveMask) -> Self::M;

    /// Lanes whose LBP code is a member of `subset`.
    ///
    /// `ge[0]` is code bit 7, `ge[7]` code bit 0.
    #[inline(always)]
    unsafe fn lbp_lookup(ge: &[Self::M; 8], subset: &[u32; 8]) -> Self::M {
        let mut bits = [0 as LiveMask; 8];
        for (b, &m) in bits.iter_mut().zip(ge) {
            *b = unsafe { Self::movemask(m) };
        }
        let hits = lookup_lanes(&bits, subset, Self::LANES);
        unsafe { Self::mask_from_bits(hits) }
    }
}

/// 16-bit lanes: u16 integral sums, i16 scores.
///
/// # Safety
///
/// See [`MaskRow`].
pub unsafe trait Lanes16: MaskRow<Elem = u16> {
    type V: Copy;
    type M: Copy;

    /// `src[at..at + LANES]`.
    unsafe fn load(src: &[u16], at: usize) -> Self::V;

    unsafe fn store(v: Self::V, dst: &mut [u16]);

    /// First `count` lanes from `src[at..]`, the rest zero.
    #[inline(always)]
    unsafe fn load_partial(src: &[u16], at: usize, count: usize) -> Self::V {
        let mut tmp = [0u16; MAX_LANES];
        tmp[..count].copy_from_slice(&src[at..at + count]);
        unsafe { Self::load(&tmp, 0) }
    }

    /// `p0 - p1 - p2 + p3`, wrapping.
    unsafe fn rect_sum(p0: Self::V, p1: Self::V, p2: Self::V, p3: Self::V) -> Self::V;

    /// Unsigned `a >= b`.
    unsafe fn ge_u(a: Self::V, b: Self::V) -> Self::M;

    unsafe fn splat(v: i16) -> Self::V;

    /// Wrapping add.
    unsafe fn add(a: Self::V, b: Self::V) -> Self::V;

    /// Signed `a < b`.
    unsafe fn lt_i(a: Self::V, b: Self::V) -> Self::M;

    unsafe fn select(m: Self::M, if_set: Self::V, if_clear: Self::V) -> Self::V;

    unsafe fn movemask(m: Self::M) -> LiveMask;

    unsafe fn mask_from_bits(bits: LiveMask) -> Self::M;

    /// Lanes whose LBP code is a member of `subset`.
    ///
    /// `ge[0]` is code bit 7, `ge[7]` code bit 0.
    #[inline(always)]
    unsafe fn lbp_lookup(ge: &[Self::M; 8], subset: &[u32; 8]) -> Self::M {
        let mut bits = [0 as LiveMask; 8];
        for (b, &m) in bits.iter_mut().zip(ge) {
            *b = unsafe { Self::movemask(m) };
        }
        let hits = lookup_lanes(&bits, subset, Self::LANES);
        unsafe { Self::mask_from_bits(hits) }
    }
}

/// Scalar subset lookup over per-bit lane masks, most significant bit first.
#[inline(always)]
fn lookup_lanes(bits: &[LiveMask; 8], subset: &[u32; 8], lanes: usize) -> LiveMask {
    let mut hits = 0;
    for k in 0..lanes {
        let code = bits
            .iter()
            .fold(0usize, |code, &b| (code << 1) | ((b >> k) & 1) as usize);
        if subset_contains(subset, code) {
            hits |= 1 << k;
        }
    }
    hits
}

/// `true` if LBP `code` is a member of the 256-bit `subset`.
#[inline(always)]
pub fn subset_contains(subset: &[u32; 8], code: usize) -> bool {
    (subset[code >> 5] >> (code & 31)) & 1 != 0
}

/// Code bit weights in `ge` order: bit 7 first.
pub(crate) const LBP_BIT_WEIGHTS: [u32; 8] = [128, 64, 32, 16, 8, 4, 2, 1];
