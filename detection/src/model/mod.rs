//! Parsed, layout-independent cascade model.
//!
//! [`CascadeData`] is what the XML loader produces. It is compiled into a
//! runtime cascade bound to one integral-image layout by
//! [`Cascade::compile`](crate::cascade::Cascade::compile).

mod loader;


use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::Size;

/// Number of rectangles a Haar feature can combine.
pub const HAAR_RECT_COUNT: usize = 3;

/// 32-bit words per LBP node subset (256 codes).
pub const LBP_SUBSET_WORDS: usize = 8;

/// Largest LBP cell (in pixels) whose sum still fits into 16 bits.
pub const LBP_INT16_CELL_AREA: i32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureType {
    Haar,
    Lbp,
}

bitflags! {
    /// Capabilities of a loaded cascade.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DetectionFlags: u32 {
        /// At least one Haar feature is rotated by 45 degrees.
        const HAS_TILTED = 1 << 2;
        /// Every LBP cell is small enough for the 16-bit kernels.
        const CAN_INT16 = 1 << 3;
    }
}

/// Summary of a loaded cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionInfo {
    pub window: Size,
    pub feature_type: FeatureType,
    pub flags: DetectionFlags,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageData {
    /// Index of the stage's first tree in [`CascadeData::nodes`].
    pub first: usize,
    pub ntrees: usize,
    /// Stage threshold, already biased by the loader.
    pub threshold: f32,
}

/// Root node of a stump tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeData {
    pub feature: usize,
    pub left: i32,
    pub right: i32,
    /// Haar split threshold; unused (zero) for LBP.
    pub threshold: f32,
}

/// Feature rectangle in window coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl FeatureRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightedRect {
    pub rect: FeatureRect,
    /// Zero weight marks an absent rectangle.
    pub weight: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HaarFeature {
    pub rects: [WeightedRect; HAAR_RECT_COUNT],
    pub tilted: bool,
}

impl HaarFeature {
    /// Feature built from up to three `(rect, weight)` pairs.
    pub fn new(rects: &[(FeatureRect, f32)]) -> Self {
        assert!(rects.len() <= HAAR_RECT_COUNT, "too many Haar rectangles");
        let mut feature = HaarFeature::default();
        for (dst, &(rect, weight)) in feature.rects.iter_mut().zip(rects) {
            *dst = WeightedRect { rect, weight };
        }
        feature
    }

    #[inline]
    pub fn has_third(&self) -> bool {
        self.rects[2].weight != 0.0
    }
}

/// LBP feature: a 3x3 grid of `rect`-sized cells anchored at `rect.x, rect.y`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LbpFeature {
    pub rect: FeatureRect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CascadeData {
    pub feature_type: FeatureType,
    pub window: Size,
    pub stages: Vec<StageData>,
    pub nodes: Vec<NodeData>,
    /// Two leaves per node: pass, fail.
    pub leaves: Vec<f32>,
    /// [`LBP_SUBSET_WORDS`] words per node for LBP cascades, empty for Haar.
    pub subsets: Vec<u32>,
    pub haar_features: Vec<HaarFeature>,
    pub lbp_features: Vec<LbpFeature>,
}

impl CascadeData {
    pub fn info(&self) -> DetectionInfo {
        let mut flags = DetectionFlags::empty();
        flags.set(DetectionFlags::HAS_TILTED, self.has_tilted());
        flags.set(DetectionFlags::CAN_INT16, self.can_int16());
        DetectionInfo {
            window: self.window,
            feature_type: self.feature_type,
            flags,
        }
    }

    pub fn has_tilted(&self) -> bool {
        self.feature_type == FeatureType::Haar && self.haar_features.iter().any(|f| f.tilted)
    }

    pub fn can_int16(&self) -> bool {
        self.feature_type == FeatureType::Lbp
            && self
                .lbp_features
                .iter()
                .all(|f| f.rect.width * f.rect.height <= LBP_INT16_CELL_AREA)
    }

    /// Checks the structural invariants the compiled cascades rely on.
    pub fn validate(&self) -> Result<()> {
        if self.window.width < 3 || self.window.height < 3 {
            return Err(Error::InvalidWindow {
                width: self.window.width,
                height: self.window.height,
            });
        }

        let mut next = 0;
        for stage in &self.stages {
            if stage.first != next || stage.first + stage.ntrees > self.nodes.len() {
                return Err(invalid("stages", format!("{stage:?}")));
            }
            next = stage.first + stage.ntrees;
        }
        if next != self.nodes.len() {
            return Err(invalid("stages", format!("{next} of {} trees", self.nodes.len())));
        }
        if self.leaves.len() != self.nodes.len() * 2 {
            return Err(invalid("leafValues", self.leaves.len().to_string()));
        }

        let feature_count = match self.feature_type {
            FeatureType::Haar => self.haar_features.len(),
            FeatureType::Lbp => {
                if self.subsets.len() != self.nodes.len() * LBP_SUBSET_WORDS {
                    return Err(invalid("internalNodes", "LBP subset size".to_string()));
                }
                self.lbp_features.len()
            }
        };
        for (node, data) in self.nodes.iter().enumerate() {
            if data.feature >= feature_count {
                return Err(Error::FeatureIndex {
                    node,
                    feature: data.feature,
                    count: feature_count,
                });
            }
        }

        match self.feature_type {
            FeatureType::Haar => {
                for (index, feature) in self.haar_features.iter().enumerate() {
                    if feature.tilted {
                        continue;
                    }
                    let fits = feature
                        .rects
                        .iter()
                        .filter(|r| r.weight != 0.0)
                        .all(|r| rect_fits(&r.rect, 1, self.window));
                    if !fits {
                        return Err(Error::FeatureOutOfWindow {
                            feature: index,
                            window: self.window,
                        });
                    }
                }
            }
            FeatureType::Lbp => {
                for (index, feature) in self.lbp_features.iter().enumerate() {
                    if !rect_fits(&feature.rect, 3, self.window) {
                        return Err(Error::FeatureOutOfWindow {
                            feature: index,
                            window: self.window,
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

/// `true` if a `cells x cells` grid of `rect` lies inside `window`.
fn rect_fits(rect: &FeatureRect, cells: i32, window: Size) -> bool {
    rect.x >= 0
        && rect.y >= 0
        && rect.width > 0
        && rect.height > 0
        && (rect.x + rect.width * cells) as usize <= window.width
        && (rect.y + rect.height * cells) as usize <= window.height
}

fn invalid(element: &str, value: String) -> Error {
    Error::InvalidValue {
        element: element.to_string(),
        value,
    }
}
