//! Detection - boosted Haar/LBP cascade object detection.
//!
//! The crate provides:
//! - OpenCV cascade XML loading into a layout-independent model
//! - Cascades compiled against one integral-image layout
//! - Lane-parallel evaluation with early exit, on every supported instruction
//!   set, all producing identical results
//! - A multi-scale detection session with hit grouping
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use detection::{Detector, DetectorConfig, Size};
//!
//! let mut detector = Detector::new(DetectorConfig::default())?;
//! detector.load("haarcascade_frontalface_default.xml", 0)?;
//! detector.init(Size::new(640, 480), None)?;
//!
//! let objects = detector.detect(&gray)?;
//! println!("Found {} faces", objects.len());
//! ```

pub mod cascade;
mod config;
mod detector;
pub mod driver;
mod error;
pub(crate) mod eval;
mod geometry;
mod group;
pub mod imgproc;
pub mod integral;
pub mod kernels;
pub(crate) mod lanes;
pub mod model;
pub mod scalar;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Session
// ============================================================================

pub use config::DetectorConfig;
pub use detector::{Detector, LevelInfo};
pub use error::{Error, Result};
pub use group::{Object, Tag, group_objects, partition, similar};

// ============================================================================
// Cascades and kernels
// ============================================================================

pub use cascade::{Cascade, Precision, ScanMode, SumLayout};
pub use driver::RowBand;
pub use geometry::{Rect, Size};
pub use integral::Integral;
pub use kernels::{Isa, Kernels};
pub use model::{CascadeData, DetectionFlags, DetectionInfo, FeatureType};
