use serde::{Deserialize, Serialize};

use crate::cascade::Precision;
use crate::geometry::Size;
use crate::kernels::Isa;

/// Detection session parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Pyramid step between levels; must be > 1.
    pub scale_factor: f64,
    /// Smallest object size reported.
    pub min_size: Size,
    /// Largest object size reported.
    pub max_size: Size,
    /// Minimum raw hits per reported object; 0 disables reporting.
    pub group_size_min: usize,
    /// Relative edge tolerance when clustering hits.
    pub size_difference_max: f64,
    /// Worker threads for row bands; 0 = rayon default, 1 = sequential.
    pub threads: usize,
    pub precision: Precision,
    /// Forced kernel family; `None` picks the best the CPU supports.
    pub isa: Option<Isa>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_size: Size::new(0, 0),
            max_size: Size::MAX,
            group_size_min: 3,
            size_difference_max: 0.2,
            threads: 0,
            precision: Precision::Auto,
            isa: None,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) {
        assert!(
            self.scale_factor.is_finite() && self.scale_factor > 1.0,
            "scale_factor must be > 1.0, got {}",
            self.scale_factor
        );
        assert!(
            self.min_size.fits_in(self.max_size),
            "min_size {:?} exceeds max_size {:?}",
            self.min_size,
            self.max_size
        );
        assert!(
            self.size_difference_max.is_finite() && self.size_difference_max >= 0.0,
            "size_difference_max must be >= 0, got {}",
            self.size_difference_max
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = DetectorConfig::default();
        config.validate();
        assert_eq!(config.scale_factor, 1.1);
        assert_eq!(config.group_size_min, 3);
        assert_eq!(config.max_size, Size::MAX);
        assert_eq!(config.isa, None);
    }

    #[test]
    #[should_panic(expected = "scale_factor must be > 1.0")]
    fn test_validate_rejects_unit_scale() {
        DetectorConfig {
            scale_factor: 1.0,
            ..DetectorConfig::default()
        }
        .validate();
    }

    #[test]
    #[should_panic(expected = "exceeds max_size")]
    fn test_validate_rejects_inverted_sizes() {
        DetectorConfig {
            min_size: Size::new(100, 100),
            max_size: Size::new(50, 50),
            ..DetectorConfig::default()
        }
        .validate();
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "scale_factor: 1.25\nthreads: 1\nprecision: Float32\nisa: Base\n";
        let config: DetectorConfig = serde_yml::from_str(yaml).unwrap();

        assert_eq!(config.scale_factor, 1.25);
        assert_eq!(config.threads, 1);
        assert_eq!(config.precision, Precision::Float32);
        assert_eq!(config.isa, Some(Isa::Base));
        assert_eq!(config.group_size_min, 3);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = DetectorConfig {
            min_size: Size::new(24, 24),
            group_size_min: 1,
            ..DetectorConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: DetectorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
