//! Error types for cascade loading, compilation and detection sessions.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::geometry::Size;
use crate::kernels::Isa;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading a cascade or running a detector.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read cascade file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed cascade XML at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("Cascade XML is missing element '{0}'")]
    MissingElement(String),

    #[error("Invalid value for '{element}': {value:?}")]
    InvalidValue { element: String, value: String },

    #[error("Unsupported cascade stage type '{0}', only BOOST is supported")]
    UnsupportedStageType(String),

    #[error("Unsupported cascade feature type '{0}'")]
    UnsupportedFeatureType(String),

    #[error("Tree cascades (max depth {0}) are not supported, only stumps")]
    TreeCascade(usize),

    #[error("Tilted Haar features are not supported")]
    TiltedFeatures,

    #[error("Invalid cascade window {width}x{height}")]
    InvalidWindow { width: usize, height: usize },

    #[error("Node {node} references feature {feature}, but the cascade has {count} features")]
    FeatureIndex {
        node: usize,
        feature: usize,
        count: usize,
    },

    #[error("Feature {feature} does not fit into the {window:?} window")]
    FeatureOutOfWindow { feature: usize, window: Size },

    #[error("Cascade window {window:?} does not fit into integral image {layout:?}")]
    WindowExceedsLayout { window: Size, layout: Size },

    #[error("No cascades loaded")]
    NoCascades,

    #[error("Detector is not initialized")]
    NotInitialized,

    #[error("Image size mismatch: expected {expected:?}, got {actual:?}")]
    ImageSize { expected: Size, actual: Size },

    #[error("Kernels for {0:?} are not available on this CPU")]
    UnsupportedIsa(Isa),

    #[error("Failed to build detection thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_element_message() {
        let err = Error::MissingElement("stageThreshold".to_string());
        assert_eq!(
            err.to_string(),
            "Cascade XML is missing element 'stageThreshold'"
        );
    }

    #[test]
    fn test_io_error_keeps_source() {
        use std::error::Error as _;

        let err = Error::Io {
            path: PathBuf::from("missing.xml"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().starts_with("Failed to read cascade file 'missing.xml'"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_image_size_message() {
        let err = Error::ImageSize {
            expected: Size::new(640, 480),
            actual: Size::new(320, 240),
        };
        assert_eq!(
            err.to_string(),
            "Image size mismatch: expected Size { width: 640, height: 480 }, got Size { width: 320, height: 240 }"
        );
    }
}
