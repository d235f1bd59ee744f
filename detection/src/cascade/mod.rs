//! Cascades compiled against one integral-image layout.
//!
//! Compilation resolves every feature rectangle into flat offsets into the
//! integral table, so evaluating a window at offset `o` only adds `o` to each
//! precomputed corner. Offsets depend on the table width and on the scan
//! mode, which is why a compiled cascade is bound to its [`SumLayout`].

mod haar;
mod lbp;


pub use haar::{HaarCascade, HaarFeature, HaarNode, HaarRect};
pub use lbp::{LbpCascade, LbpLeaf, SumElem};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::Size;
use crate::model::{CascadeData, FeatureType};

/// Which columns of each row are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanMode {
    /// Every row and every column.
    Progressive,
    /// Every second row and every second column. Features read a
    /// deinterleaved copy of the integral table where even columns come
    /// first and odd columns follow at `(width + 1) / 2`.
    Interlaced,
}

impl ScanMode {
    /// Distance between evaluated rows and columns.
    #[inline]
    pub fn step(self) -> usize {
        match self {
            ScanMode::Progressive => 1,
            ScanMode::Interlaced => 2,
        }
    }
}

/// Integral-table geometry a cascade is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SumLayout {
    /// Integral table width (image width + 1); also the row stride.
    pub width: usize,
    pub height: usize,
    pub mode: ScanMode,
}

impl SumLayout {
    pub fn new(size: Size, mode: ScanMode) -> Self {
        Self {
            width: size.width,
            height: size.height,
            mode,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Physical column of integral column `x` in the feature table.
    #[inline]
    pub fn column(&self, x: usize) -> usize {
        match self.mode {
            ScanMode::Progressive => x,
            ScanMode::Interlaced if x & 1 == 0 => x / 2,
            ScanMode::Interlaced => x / 2 + self.width.div_ceil(2),
        }
    }

    /// Flat offset of integral point `(x, y)` in the feature table.
    #[inline]
    pub fn offset(&self, x: usize, y: usize) -> usize {
        y * self.width + self.column(x)
    }

    /// Number of window origins per row and column for `window`: one per
    /// image pixel whose window lies inside the image.
    pub fn window_grid(&self, window: Size) -> Size {
        Size::new(
            self.width.saturating_sub(window.width),
            self.height.saturating_sub(window.height),
        )
    }
}

/// Leaf and threshold arithmetic for LBP cascades.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Precision {
    /// 16-bit kernels when the cascade allows them, otherwise 32-bit.
    #[default]
    Auto,
    Float32,
    /// Fails over to 32-bit when some LBP cell is too large.
    Int16,
}

/// Per-stage evaluation record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stage<T> {
    /// Index of the first tree in the cascade's node arrays.
    pub first: usize,
    pub ntrees: usize,
    pub threshold: T,
    /// Some feature in the stage has a third rectangle.
    pub has_three: bool,
    /// The stage sum cannot fall below `threshold` whatever the leaves.
    pub can_skip: bool,
}

impl<T> Stage<T> {
    #[inline]
    pub fn nodes(&self) -> std::ops::Range<usize> {
        self.first..self.first + self.ntrees
    }
}

/// A compiled cascade of any supported flavour.
#[derive(Debug, Clone)]
pub enum Cascade {
    Haar(HaarCascade),
    Lbp32(LbpCascade<f32>),
    Lbp16(LbpCascade<i16>),
}

impl Cascade {
    /// Compiles `data` for integral tables shaped like `layout`.
    pub fn compile(data: &CascadeData, layout: SumLayout, precision: Precision) -> Result<Cascade> {
        data.validate()?;
        let image = Size::new(layout.width.saturating_sub(1), layout.height.saturating_sub(1));
        if !data.window.fits_in(image) {
            return Err(Error::WindowExceedsLayout {
                window: data.window,
                layout: layout.size(),
            });
        }

        let cascade = match data.feature_type {
            FeatureType::Haar => Cascade::Haar(HaarCascade::compile(data, layout)?),
            FeatureType::Lbp => match precision {
                Precision::Float32 => Cascade::Lbp32(LbpCascade::compile(data, layout)?),
                Precision::Auto | Precision::Int16 if data.can_int16() => {
                    Cascade::Lbp16(LbpCascade::compile(data, layout)?)
                }
                Precision::Auto | Precision::Int16 => {
                    tracing::debug!(
                        ?precision,
                        "LBP cells too large for 16-bit sums, using 32-bit kernels"
                    );
                    Cascade::Lbp32(LbpCascade::compile(data, layout)?)
                }
            },
        };
        Ok(cascade)
    }

    pub fn layout(&self) -> SumLayout {
        match self {
            Cascade::Haar(c) => c.layout,
            Cascade::Lbp32(c) => c.layout,
            Cascade::Lbp16(c) => c.layout,
        }
    }

    pub fn window(&self) -> Size {
        match self {
            Cascade::Haar(c) => c.window,
            Cascade::Lbp32(c) => c.window,
            Cascade::Lbp16(c) => c.window,
        }
    }

    pub fn feature_type(&self) -> FeatureType {
        match self {
            Cascade::Haar(_) => FeatureType::Haar,
            Cascade::Lbp32(_) | Cascade::Lbp16(_) => FeatureType::Lbp,
        }
    }

    pub fn stage_count(&self) -> usize {
        match self {
            Cascade::Haar(c) => c.stages.len(),
            Cascade::Lbp32(c) => c.stages.len(),
            Cascade::Lbp16(c) => c.stages.len(),
        }
    }
}
