use super::{Stage, SumLayout};
use crate::error::{Error, Result};
use crate::geometry::Size;
use crate::model::{CascadeData, FeatureRect, WeightedRect};

/// A rectangle resolved to corner offsets: top-left, top-right,
/// bottom-left, bottom-right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HaarRect {
    pub corners: [usize; 4],
    pub weight: f32,
}

impl HaarRect {
    fn compile(rect: &WeightedRect, layout: &SumLayout) -> HaarRect {
        HaarRect {
            corners: corners(&rect.rect, layout),
            weight: rect.weight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HaarFeature {
    pub rects: [HaarRect; 2],
    pub third: Option<HaarRect>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HaarNode {
    pub feature: usize,
    /// Split threshold, scaled by the window norm at evaluation time.
    pub threshold: f32,
}

#[derive(Debug, Clone)]
pub struct HaarCascade {
    pub window: Size,
    pub layout: SumLayout,
    pub stages: Vec<Stage<f32>>,
    pub nodes: Vec<HaarNode>,
    /// Two per node: taken when the feature is below the threshold, else.
    pub leaves: Vec<f32>,
    pub features: Vec<HaarFeature>,
    /// Variance rectangle `(1, 1)..(w - 1, h - 1)` in the progressive sum.
    pub p: [usize; 4],
    /// Same rectangle in the squared sum.
    pub pq: [usize; 4],
    pub window_area: f32,
}

impl HaarCascade {
    pub fn compile(data: &CascadeData, layout: SumLayout) -> Result<HaarCascade> {
        if data.has_tilted() {
            return Err(Error::TiltedFeatures);
        }

        let features = data
            .haar_features
            .iter()
            .map(|f| HaarFeature {
                rects: [
                    HaarRect::compile(&f.rects[0], &layout),
                    HaarRect::compile(&f.rects[1], &layout),
                ],
                third: f
                    .has_third()
                    .then(|| HaarRect::compile(&f.rects[2], &layout)),
            })
            .collect::<Vec<_>>();

        let nodes = data
            .nodes
            .iter()
            .map(|n| HaarNode {
                feature: n.feature,
                threshold: n.threshold,
            })
            .collect::<Vec<_>>();

        let stages = data
            .stages
            .iter()
            .map(|s| {
                let range = s.first..s.first + s.ntrees;
                let has_three = range
                    .clone()
                    .any(|n| features[nodes[n].feature].third.is_some());
                let floor = range
                    .fold(0.0f32, |sum, n| sum + data.leaves[2 * n].min(data.leaves[2 * n + 1]));
                Stage {
                    first: s.first,
                    ntrees: s.ntrees,
                    threshold: s.threshold,
                    has_three,
                    can_skip: floor >= s.threshold,
                }
            })
            .collect();

        let variance = Size::new(data.window.width - 2, data.window.height - 2);
        let variance_rect = FeatureRect::new(1, 1, variance.width as i32, variance.height as i32);
        let progressive = SumLayout {
            mode: super::ScanMode::Progressive,
            ..layout
        };
        let p = corners(&variance_rect, &progressive);
        let window_area = variance.area() as f32;

        Ok(HaarCascade {
            window: data.window,
            layout,
            stages,
            nodes,
            leaves: data.leaves.clone(),
            features,
            p,
            pq: p,
            window_area,
        })
    }
}

fn corners(rect: &FeatureRect, layout: &SumLayout) -> [usize; 4] {
    let (x, y) = (rect.x as usize, rect.y as usize);
    let (w, h) = (rect.width as usize, rect.height as usize);
    [
        layout.offset(x, y),
        layout.offset(x + w, y),
        layout.offset(x, y + h),
        layout.offset(x + w, y + h),
    ]
}
