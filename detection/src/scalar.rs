//! One-window-at-a-time cascade evaluation.
//!
//! This is both the reference the lane kernels must reproduce bit for bit
//! and the continuation used once a block is down to a single live window.
//! Every floating-point operation is performed in the same order as in the
//! lane evaluators.

use crate::cascade::{HaarCascade, HaarRect, LbpCascade, LbpLeaf, SumElem};
use crate::lanes::subset_contains;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    /// The window failed stage `stage`.
    Rejected { stage: usize },
}

impl Outcome {
    #[inline]
    pub fn is_accepted(self) -> bool {
        self == Outcome::Accepted
    }
}

#[inline(always)]
fn corner_sum<S: SumElem>(sum: &[S], offset: usize, corners: &[usize; 4]) -> S {
    S::rect_sum(
        sum[offset + corners[0]],
        sum[offset + corners[1]],
        sum[offset + corners[2]],
        sum[offset + corners[3]],
    )
}

#[inline(always)]
fn weighted(sum: &[u32], offset: usize, rect: &HaarRect) -> f32 {
    corner_sum(sum, offset, &rect.corners) as i32 as f32 * rect.weight
}

/// Variance normaliser of the window at `offset` in the progressive tables.
#[inline]
pub fn haar_norm(cascade: &HaarCascade, sum: &[u32], sqsum: &[u32], offset: usize) -> f32 {
    let s = corner_sum(sum, offset, &cascade.p) as i32 as f32;
    let q = corner_sum(sqsum, offset, &cascade.pq) as i32 as f32;
    let v = q * cascade.window_area - s * s;
    if v > 0.0 { v.sqrt() } else { 1.0 }
}

/// Runs stages `start_stage..` of `cascade` on the window whose features sit
/// at `offset` in `features`.
pub fn haar_window(
    cascade: &HaarCascade,
    features: &[u32],
    offset: usize,
    start_stage: usize,
    norm: f32,
) -> Outcome {
    for (index, stage) in cascade.stages.iter().enumerate().skip(start_stage) {
        if stage.can_skip {
            continue;
        }
        let mut stage_sum = 0.0f32;
        for n in stage.nodes() {
            let node = &cascade.nodes[n];
            let feature = &cascade.features[node.feature];
            let mut sum = weighted(features, offset, &feature.rects[0])
                + weighted(features, offset, &feature.rects[1]);
            if stage.has_three
                && let Some(third) = &feature.third
            {
                sum += weighted(features, offset, third);
            }
            let leaf = if sum < node.threshold * norm { 2 * n } else { 2 * n + 1 };
            stage_sum += cascade.leaves[leaf];
        }
        if stage_sum < stage.threshold {
            return Outcome::Rejected { stage: index };
        }
    }
    Outcome::Accepted
}

/// 8-bit LBP code of the 3x3 cell grid whose corners are `corners`.
#[inline(always)]
pub fn lbp_code<S: SumElem>(sum: &[S], offset: usize, corners: &[usize; 16]) -> usize {
    let p = |i: usize| sum[offset + corners[i]];
    let cell = |a: usize| S::rect_sum(p(a), p(a + 1), p(a + 4), p(a + 5));
    let central = cell(5);
    // Clockwise from the top-left cell, most significant bit first.
    [0, 1, 2, 6, 10, 9, 8, 4]
        .iter()
        .fold(0, |code, &a| (code << 1) | (cell(a) >= central) as usize)
}

/// Runs stages `start_stage..` of `cascade` on the window at `offset`.
pub fn lbp_window<L: LbpLeaf>(
    cascade: &LbpCascade<L>,
    sum: &[L::Sum],
    offset: usize,
    start_stage: usize,
) -> Outcome {
    for (index, stage) in cascade.stages.iter().enumerate().skip(start_stage) {
        if stage.can_skip {
            continue;
        }
        let mut stage_sum = L::ZERO;
        for n in stage.nodes() {
            let code = lbp_code(sum, offset, &cascade.features[cascade.nodes[n]]);
            let leaf = if subset_contains(&cascade.subsets[n], code) { 2 * n } else { 2 * n + 1 };
            stage_sum = stage_sum.accumulate(cascade.leaves[leaf]);
        }
        if stage_sum < stage.threshold {
            return Outcome::Rejected { stage: index };
        }
    }
    Outcome::Accepted
}
