use std::fmt::Debug;

use super::{Stage, SumLayout};
use crate::error::Result;
use crate::geometry::Size;
use crate::model::{CascadeData, LBP_SUBSET_WORDS};

/// Integral table element.
pub trait SumElem: Copy + Ord + Default + Debug + Send + Sync + 'static {
    /// `p0 - p1 - p2 + p3`, wrapping.
    fn rect_sum(p0: Self, p1: Self, p2: Self, p3: Self) -> Self;
}

impl SumElem for u32 {
    #[inline(always)]
    fn rect_sum(p0: u32, p1: u32, p2: u32, p3: u32) -> u32 {
        p0.wrapping_sub(p1).wrapping_sub(p2).wrapping_add(p3)
    }
}

impl SumElem for u16 {
    #[inline(always)]
    fn rect_sum(p0: u16, p1: u16, p2: u16, p3: u16) -> u16 {
        p0.wrapping_sub(p1).wrapping_sub(p2).wrapping_add(p3)
    }
}

/// Leaf value type of an LBP cascade, with the integral element it reads.
pub trait LbpLeaf: Copy + PartialOrd + Debug + Send + Sync + 'static {
    type Sum: SumElem;

    const ZERO: Self;

    /// Stage accumulation; wraps for integer leaves.
    fn accumulate(self, leaf: Self) -> Self;

    /// Converts one stage's threshold and leaves.
    fn quantize(threshold: f32, leaves: &[f32]) -> (Self, Vec<Self>);
}

impl LbpLeaf for f32 {
    type Sum = u32;

    const ZERO: f32 = 0.0;

    #[inline(always)]
    fn accumulate(self, leaf: f32) -> f32 {
        self + leaf
    }

    fn quantize(threshold: f32, leaves: &[f32]) -> (f32, Vec<f32>) {
        (threshold, leaves.to_vec())
    }
}

impl LbpLeaf for i16 {
    type Sum = u16;

    const ZERO: i16 = 0;

    #[inline(always)]
    fn accumulate(self, leaf: i16) -> i16 {
        self.wrapping_add(leaf)
    }

    /// Scales the stage so its extreme reachable sum lands at 90% of the
    /// `i16` range.
    fn quantize(threshold: f32, leaves: &[f32]) -> (i16, Vec<i16>) {
        let (lo, hi) = leaves
            .chunks_exact(2)
            .fold((0.0f32, 0.0f32), |(lo, hi), pair| {
                (lo + pair[0].min(pair[1]), hi + pair[0].max(pair[1]))
            });
        let extreme = lo.abs().max(hi.abs());
        let k = if extreme > 0.0 {
            i16::MAX as f32 * 0.9 / extreme
        } else {
            1.0
        };
        let leaves = leaves.iter().map(|&l| (l * k).round() as i16).collect();
        let threshold = (threshold * k)
            .round()
            .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        (threshold, leaves)
    }
}

#[derive(Debug, Clone)]
pub struct LbpCascade<L> {
    pub window: Size,
    pub layout: SumLayout,
    pub stages: Vec<Stage<L>>,
    /// Feature index per node.
    pub nodes: Vec<usize>,
    /// Two per node: taken when the code is in the subset, else.
    pub leaves: Vec<L>,
    pub subsets: Vec<[u32; LBP_SUBSET_WORDS]>,
    /// 4x4 grid corners, row-major.
    pub features: Vec<[usize; 16]>,
}

impl<L: LbpLeaf> LbpCascade<L> {
    pub fn compile(data: &CascadeData, layout: SumLayout) -> Result<LbpCascade<L>> {
        let features = data
            .lbp_features
            .iter()
            .map(|f| {
                let (x, y) = (f.rect.x as usize, f.rect.y as usize);
                let (w, h) = (f.rect.width as usize, f.rect.height as usize);
                std::array::from_fn(|i| layout.offset(x + w * (i % 4), y + h * (i / 4)))
            })
            .collect();

        let subsets = data
            .subsets
            .chunks_exact(LBP_SUBSET_WORDS)
            .map(|words| std::array::from_fn(|i| words[i]))
            .collect();

        let mut leaves = Vec::with_capacity(data.leaves.len());
        let mut stages = Vec::with_capacity(data.stages.len());
        for s in &data.stages {
            let (threshold, stage_leaves) =
                L::quantize(s.threshold, &data.leaves[2 * s.first..2 * (s.first + s.ntrees)]);
            let floor = stage_leaves
                .chunks_exact(2)
                .fold(L::ZERO, |sum, pair| {
                    let low = if pair[0] < pair[1] { pair[0] } else { pair[1] };
                    sum.accumulate(low)
                });
            stages.push(Stage {
                first: s.first,
                ntrees: s.ntrees,
                threshold,
                has_three: false,
                can_skip: floor >= threshold,
            });
            leaves.extend(stage_leaves);
        }

        Ok(LbpCascade {
            window: data.window,
            layout,
            stages,
            nodes: data.nodes.iter().map(|n| n.feature).collect(),
            leaves,
            subsets,
            features,
        })
    }
}
