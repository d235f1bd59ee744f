//! Lane-parallel cascade evaluation with early exit.
//!
//! Each call evaluates a block of `lanes` adjacent windows. After every
//! stage the rejected lanes are cleared from the live mask; the block stops
//! as soon as no lane is live, and a single survivor is finished by the
//! scalar evaluator from the next stage on.

use crate::cascade::{HaarCascade, HaarRect, LbpCascade};
use crate::lanes::{Lanes16, Lanes32, LiveMask, MAX_LANES};
use crate::scalar;

#[inline(always)]
unsafe fn fetch32<V: Lanes32>(src: &[u32], at: usize, lanes: usize) -> V::U {
    unsafe {
        if lanes == V::LANES {
            V::load(src, at)
        } else {
            V::load_partial(src, at, lanes)
        }
    }
}

#[inline(always)]
unsafe fn fetch_even32<V: Lanes32>(src: &[u32], at: usize, lanes: usize) -> V::U {
    unsafe {
        if lanes == V::LANES {
            V::load_even(src, at)
        } else {
            V::load_even_partial(src, at, lanes)
        }
    }
}

#[inline(always)]
unsafe fn fetch16<V: Lanes16>(src: &[u16], at: usize, lanes: usize) -> V::V {
    unsafe {
        if lanes == V::LANES {
            V::load(src, at)
        } else {
            V::load_partial(src, at, lanes)
        }
    }
}

#[inline(always)]
unsafe fn corner_sum32<V: Lanes32>(
    src: &[u32],
    at: usize,
    corners: &[usize; 4],
    lanes: usize,
    even: bool,
) -> V::U {
    unsafe {
        let [p0, p1, p2, p3] = corners.map(|c| {
            if even {
                fetch_even32::<V>(src, at + c, lanes)
            } else {
                fetch32::<V>(src, at + c, lanes)
            }
        });
        V::rect_sum(p0, p1, p2, p3)
    }
}

/// Variance normalisers of `lanes` windows. Lane `k` is the window at
/// `at + k * step` in the progressive tables.
///
/// # Safety
///
/// `V`'s instructions must be available.
#[inline(always)]
pub unsafe fn haar_norm<V: Lanes32>(
    cascade: &HaarCascade,
    sum: &[u32],
    sqsum: &[u32],
    at: usize,
    lanes: usize,
    interlaced: bool,
) -> V::F {
    unsafe {
        let s = V::to_f(corner_sum32::<V>(sum, at, &cascade.p, lanes, interlaced));
        let q = V::to_f(corner_sum32::<V>(sqsum, at, &cascade.pq, lanes, interlaced));
        let v = V::sub_f(V::mul_f(q, V::splat_f(cascade.window_area)), V::mul_f(s, s));
        V::sqrt_or_one(v)
    }
}

#[inline(always)]
unsafe fn weighted<V: Lanes32>(features: &[u32], at: usize, rect: &HaarRect, lanes: usize) -> V::F {
    unsafe {
        let sum = V::to_f(corner_sum32::<V>(features, at, &rect.corners, lanes, false));
        V::mul_f(sum, V::splat_f(rect.weight))
    }
}

/// Evaluates the windows at `at..at + lanes` of `features` whose bits are
/// set in `live`, returning the accepted ones.
///
/// # Safety
///
/// `V`'s instructions must be available.
#[inline(always)]
pub unsafe fn haar_block<V: Lanes32>(
    cascade: &HaarCascade,
    features: &[u32],
    at: usize,
    norm: V::F,
    mut live: LiveMask,
    lanes: usize,
) -> LiveMask {
    unsafe {
        for (index, stage) in cascade.stages.iter().enumerate() {
            if stage.can_skip {
                continue;
            }
            let mut stage_sum = V::splat_f(0.0);
            for n in stage.nodes() {
                let node = &cascade.nodes[n];
                let feature = &cascade.features[node.feature];
                let mut sum = V::add_f(
                    weighted::<V>(features, at, &feature.rects[0], lanes),
                    weighted::<V>(features, at, &feature.rects[1], lanes),
                );
                if stage.has_three
                    && let Some(third) = &feature.third
                {
                    sum = V::add_f(sum, weighted::<V>(features, at, third, lanes));
                }
                let below = V::lt_f(sum, V::mul_f(V::splat_f(node.threshold), norm));
                let leaf = V::select_f(
                    below,
                    V::splat_f(cascade.leaves[2 * n]),
                    V::splat_f(cascade.leaves[2 * n + 1]),
                );
                stage_sum = V::add_f(stage_sum, leaf);
            }
            live &= !V::movemask(V::lt_f(stage_sum, V::splat_f(stage.threshold)));

            match live.count_ones() {
                0 => return 0,
                1 => {
                    let lane = live.trailing_zeros() as usize;
                    let mut norms = [0.0f32; MAX_LANES];
                    V::store_f(norm, &mut norms);
                    let outcome =
                        scalar::haar_window(cascade, features, at + lane, index + 1, norms[lane]);
                    return if outcome.is_accepted() { live } else { 0 };
                }
                _ => {}
            }
        }
        live
    }
}

/// Membership masks for the eight neighbour cells, code bit 7 first.
#[inline(always)]
unsafe fn lbp_ge32<V: Lanes32>(sum: &[u32], at: usize, corners: &[usize; 16], lanes: usize) -> [V::M; 8] {
    unsafe {
        let p: [V::U; 16] = corners.map(|c| fetch32::<V>(sum, at + c, lanes));
        let cell = |a: usize| V::rect_sum(p[a], p[a + 1], p[a + 4], p[a + 5]);
        let central = cell(5);
        [0, 1, 2, 6, 10, 9, 8, 4].map(|a| V::ge_u(cell(a), central))
    }
}

#[inline(always)]
unsafe fn lbp_ge16<V: Lanes16>(sum: &[u16], at: usize, corners: &[usize; 16], lanes: usize) -> [V::M; 8] {
    unsafe {
        let p: [V::V; 16] = corners.map(|c| fetch16::<V>(sum, at + c, lanes));
        let cell = |a: usize| V::rect_sum(p[a], p[a + 1], p[a + 4], p[a + 5]);
        let central = cell(5);
        [0, 1, 2, 6, 10, 9, 8, 4].map(|a| V::ge_u(cell(a), central))
    }
}

/// LBP counterpart of [`haar_block`] with f32 leaves.
///
/// # Safety
///
/// `V`'s instructions must be available.
#[inline(always)]
pub unsafe fn lbp32_block<V: Lanes32>(
    cascade: &LbpCascade<f32>,
    sum: &[u32],
    at: usize,
    mut live: LiveMask,
    lanes: usize,
) -> LiveMask {
    unsafe {
        for (index, stage) in cascade.stages.iter().enumerate() {
            if stage.can_skip {
                continue;
            }
            let mut stage_sum = V::splat_f(0.0);
            for n in stage.nodes() {
                let ge = lbp_ge32::<V>(sum, at, &cascade.features[cascade.nodes[n]], lanes);
                let member = V::lbp_lookup(&ge, &cascade.subsets[n]);
                let leaf = V::select_f(
                    member,
                    V::splat_f(cascade.leaves[2 * n]),
                    V::splat_f(cascade.leaves[2 * n + 1]),
                );
                stage_sum = V::add_f(stage_sum, leaf);
            }
            live &= !V::movemask(V::lt_f(stage_sum, V::splat_f(stage.threshold)));

            match live.count_ones() {
                0 => return 0,
                1 => {
                    let lane = live.trailing_zeros() as usize;
                    let outcome = scalar::lbp_window(cascade, sum, at + lane, index + 1);
                    return if outcome.is_accepted() { live } else { 0 };
                }
                _ => {}
            }
        }
        live
    }
}

/// LBP evaluation with 16-bit sums and wrapping i16 stage accumulation.
///
/// # Safety
///
/// `V`'s instructions must be available.
#[inline(always)]
pub unsafe fn lbp16_block<V: Lanes16>(
    cascade: &LbpCascade<i16>,
    sum: &[u16],
    at: usize,
    mut live: LiveMask,
    lanes: usize,
) -> LiveMask {
    unsafe {
        for (index, stage) in cascade.stages.iter().enumerate() {
            if stage.can_skip {
                continue;
            }
            let mut stage_sum = V::splat(0);
            for n in stage.nodes() {
                let ge = lbp_ge16::<V>(sum, at, &cascade.features[cascade.nodes[n]], lanes);
                let member = V::lbp_lookup(&ge, &cascade.subsets[n]);
                let leaf = V::select(
                    member,
                    V::splat(cascade.leaves[2 * n]),
                    V::splat(cascade.leaves[2 * n + 1]),
                );
                stage_sum = V::add(stage_sum, leaf);
            }
            live &= !V::movemask(V::lt_i(stage_sum, V::splat(stage.threshold)));

            match live.count_ones() {
                0 => return 0,
                1 => {
                    let lane = live.trailing_zeros() as usize;
                    let outcome = scalar::lbp_window(cascade, sum, at + lane, index + 1);
                    return if outcome.is_accepted() { live } else { 0 };
                }
                _ => {}
            }
        }
        live
    }
}
