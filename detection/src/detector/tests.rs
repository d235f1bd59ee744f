use super::*;
use crate::kernels::Isa;
use crate::model::{FeatureRect, HaarFeature, NodeData, StageData};
use crate::testing::{HAAR_XML, LBP_XML, init_tracing, random_haar, random_image, random_lbp, rng};

const BACKGROUND: u8 = 20;
const SQUARE: u8 = 200;

/// 12x12 Haar stump that fires on a bright 6x6 square centred in the window.
fn square_cascade() -> CascadeData {
    let whole = FeatureRect::new(0, 0, 12, 12);
    let inner = FeatureRect::new(3, 3, 6, 6);
    CascadeData {
        feature_type: FeatureType::Haar,
        window: Size::new(12, 12),
        stages: vec![StageData {
            first: 0,
            ntrees: 1,
            threshold: 0.0,
        }],
        nodes: vec![NodeData {
            feature: 0,
            left: 0,
            right: -1,
            threshold: 0.5,
        }],
        leaves: vec![-1.0, 1.0],
        subsets: Vec::new(),
        haar_features: vec![HaarFeature::new(&[(whole, -1.0), (inner, 4.0)])],
        lbp_features: Vec::new(),
    }
}

/// Flat image with bright 6x6 squares at the given top-left corners.
fn squares(width: usize, height: usize, corners: &[(usize, usize)]) -> Buffer2<u8> {
    let mut image = Buffer2::new_filled(width, height, BACKGROUND);
    for &(x, y) in corners {
        for row in y..y + 6 {
            image.row_mut(row)[x..x + 6].fill(SQUARE);
        }
    }
    image
}

/// Single-scale configuration for the square cascade.
fn square_config() -> DetectorConfig {
    DetectorConfig {
        max_size: Size::new(12, 12),
        threads: 1,
        ..DetectorConfig::default()
    }
}

// ============================================================================
// Setup errors
// ============================================================================

#[test]
fn test_unsupported_isa() {
    let Some(isa) = Isa::ALL.into_iter().find(|isa| !isa.is_supported()) else {
        eprintln!("every kernel family is supported here, skipping test");
        return;
    };
    let err = Detector::new(DetectorConfig {
        isa: Some(isa),
        ..DetectorConfig::default()
    })
    .unwrap_err();
    assert!(matches!(err, Error::UnsupportedIsa(i) if i == isa), "{err}");
}

#[test]
fn test_forced_isa_is_used() {
    let detector = Detector::new(DetectorConfig {
        isa: Some(Isa::Portable),
        ..DetectorConfig::default()
    })
    .unwrap();
    assert_eq!(detector.kernels().isa, Isa::Portable);
}

#[test]
fn test_init_without_cascades() {
    let mut detector = Detector::new(DetectorConfig::default()).unwrap();
    let err = detector.init(Size::new(64, 48), None).unwrap_err();
    assert!(matches!(err, Error::NoCascades), "{err}");
}

#[test]
fn test_detect_requires_init() {
    let mut detector = Detector::new(DetectorConfig::default()).unwrap();
    detector.load_xml(HAAR_XML, 0).unwrap();
    let err = detector.detect(&Buffer2::new_default(64, 48)).unwrap_err();
    assert!(matches!(err, Error::NotInitialized), "{err}");
}

#[test]
fn test_adding_cascade_resets_init() {
    let mut detector = Detector::new(DetectorConfig::default()).unwrap();
    detector.load_xml(HAAR_XML, 0).unwrap();
    detector.init(Size::new(64, 48), None).unwrap();
    assert!(!detector.levels().is_empty());

    detector.load_xml(LBP_XML, 1).unwrap();
    assert_eq!(detector.cascade_count(), 2);
    assert!(detector.levels().is_empty());
    let err = detector.detect(&Buffer2::new_default(64, 48)).unwrap_err();
    assert!(matches!(err, Error::NotInitialized), "{err}");
}

#[test]
fn test_image_size_mismatch() {
    let mut detector = Detector::new(DetectorConfig::default()).unwrap();
    detector.load_xml(HAAR_XML, 0).unwrap();

    let roi = Buffer2::new_filled(30, 40, 255u8);
    let err = detector.init(Size::new(40, 30), Some(&roi)).unwrap_err();
    assert!(
        matches!(err, Error::ImageSize { expected, actual } if expected == Size::new(40, 30) && actual == Size::new(30, 40)),
        "{err}"
    );

    detector.init(Size::new(40, 30), None).unwrap();
    let err = detector.detect(&Buffer2::new_default(41, 30)).unwrap_err();
    assert!(matches!(err, Error::ImageSize { .. }), "{err}");
}

#[test]
fn test_tilted_cascade_rejected() {
    let mut detector = Detector::new(DetectorConfig::default()).unwrap();
    let xml = HAAR_XML.replace("<tilted>0</tilted>", "<tilted>1</tilted>");
    let err = detector.load_xml(&xml, 0).unwrap_err();
    assert!(matches!(err, Error::TiltedFeatures), "{err}");
    assert_eq!(detector.cascade_count(), 0);
}

// ============================================================================
// Pyramid
// ============================================================================

#[test]
fn test_pyramid_levels() {
    init_tracing();
    let mut detector = Detector::new(DetectorConfig {
        scale_factor: 1.5,
        ..DetectorConfig::default()
    })
    .unwrap();
    detector.load_xml(HAAR_XML, 0).unwrap();
    detector.init(Size::new(40, 30), None).unwrap();

    let levels = detector.levels();
    let scales: Vec<f64> = levels.iter().map(|l| l.scale).collect();
    let sizes: Vec<Size> = levels.iter().map(|l| l.size).collect();
    let modes: Vec<ScanMode> = levels.iter().map(|l| l.mode).collect();
    // The 8x6 window scaled by 5.0625 is 41 wide and no longer fits.
    assert_eq!(scales, vec![1.0, 1.5, 2.25, 3.375]);
    assert_eq!(
        sizes,
        vec![Size::new(40, 30), Size::new(27, 20), Size::new(18, 13), Size::new(12, 9)]
    );
    assert_eq!(
        modes,
        vec![ScanMode::Interlaced, ScanMode::Interlaced, ScanMode::Progressive, ScanMode::Progressive]
    );
    assert!(levels.iter().all(|l| l.cascades == 1));
}

#[test]
fn test_min_size_skips_small_levels() {
    let mut detector = Detector::new(DetectorConfig {
        scale_factor: 1.5,
        min_size: Size::new(15, 15),
        ..DetectorConfig::default()
    })
    .unwrap();
    detector.load_xml(HAAR_XML, 0).unwrap();
    detector.init(Size::new(40, 30), None).unwrap();

    let levels = detector.levels();
    assert_eq!(levels.len(), 1);
    assert_eq!(levels[0].scale, 3.375);
}

#[test]
fn test_mixed_cascades_share_levels() {
    let mut detector = Detector::new(DetectorConfig {
        scale_factor: 1.5,
        ..DetectorConfig::default()
    })
    .unwrap();
    detector.load_xml(HAAR_XML, 0).unwrap();
    detector.load_xml(LBP_XML, 1).unwrap();
    detector.init(Size::new(40, 30), None).unwrap();

    let counts: Vec<usize> = detector.levels().iter().map(|l| l.cascades).collect();
    assert_eq!(counts, vec![2, 2, 2, 2]);
    assert!(detector.detect(&Buffer2::new_filled(40, 30, 90)).is_ok());
}

// ============================================================================
// Detection
// ============================================================================

#[test]
fn test_detects_square() {
    init_tracing();
    let mut detector = Detector::new(square_config()).unwrap();
    detector.add_cascade(square_cascade(), 7).unwrap();
    detector.init(Size::new(48, 40), None).unwrap();
    assert_eq!(detector.levels().len(), 1);

    let objects = detector.detect(&squares(48, 40, &[(21, 15)])).unwrap();
    // Hits at even offsets -2..=2 around the centred origin average back to it.
    assert_eq!(objects, vec![Object::new(Rect::new(18, 12, 30, 24), 9, 7)]);

    let none = detector.detect(&Buffer2::new_filled(48, 40, BACKGROUND)).unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_group_size_min_filters_objects() {
    let mut detector = Detector::new(DetectorConfig {
        group_size_min: 10,
        ..square_config()
    })
    .unwrap();
    detector.add_cascade(square_cascade(), 0).unwrap();
    detector.init(Size::new(48, 40), None).unwrap();
    assert!(detector.detect(&squares(48, 40, &[(21, 15)])).unwrap().is_empty());
}

#[test]
fn test_roi_limits_window_centres() {
    let image = squares(120, 40, &[(21, 15), (81, 15)]);
    let mut detector = Detector::new(square_config()).unwrap();
    detector.add_cascade(square_cascade(), 0).unwrap();

    detector.init(Size::new(120, 40), None).unwrap();
    let all = detector.detect(&image).unwrap();
    assert_eq!(all.len(), 2);

    let mut roi = Buffer2::new_default(120, 40);
    for y in 0..40 {
        roi.row_mut(y)[..60].fill(255);
    }
    detector.init(Size::new(120, 40), Some(&roi)).unwrap();
    let left = detector.detect(&image).unwrap();
    assert_eq!(left, vec![Object::new(Rect::new(18, 12, 30, 24), 9, 0)]);
}

#[test]
fn test_objects_grouped_per_tag() {
    let mut detector = Detector::new(square_config()).unwrap();
    detector.add_cascade(square_cascade(), 3).unwrap();
    detector.add_cascade(square_cascade(), -1).unwrap();
    detector.init(Size::new(48, 40), None).unwrap();

    let objects = detector.detect(&squares(48, 40, &[(21, 15)])).unwrap();
    let tags: Vec<Tag> = objects.iter().map(|o| o.tag).collect();
    assert_eq!(tags, vec![-1, 3]);
    assert!(objects.iter().all(|o| o.rect == Rect::new(18, 12, 30, 24) && o.weight == 9));
}

/// Runs both random cascades on one random image under `config`.
fn detect_random(config: DetectorConfig) -> Vec<Object> {
    let mut rng = rng(0xDE7);
    let image = random_image(&mut rng, 200, 180);
    let mut detector = Detector::new(config).unwrap();
    detector.add_cascade(random_haar(&mut rng, Size::new(12, 10), 5, 4), 1).unwrap();
    detector.add_cascade(random_lbp(&mut rng, Size::new(12, 12), 5, 4), 2).unwrap();
    detector.init(Size::new(200, 180), None).unwrap();
    detector.detect(&image).unwrap()
}

#[test]
fn test_threads_and_kernels_do_not_change_results() {
    init_tracing();
    let base = DetectorConfig {
        scale_factor: 1.3,
        group_size_min: 1,
        max_size: Size::new(40, 40),
        threads: 1,
        ..DetectorConfig::default()
    };
    let expected = detect_random(DetectorConfig {
        isa: Some(Isa::Base),
        ..base
    });
    assert!(!expected.is_empty());

    assert_eq!(detect_random(base), expected, "best kernels");
    assert_eq!(
        detect_random(DetectorConfig { threads: 3, ..base }),
        expected,
        "three threads"
    );
    assert_eq!(
        detect_random(DetectorConfig { threads: 0, ..base }),
        expected,
        "default pool"
    );
}

#[test]
fn test_motion_regions_limit_window_centres() {
    let image = squares(120, 40, &[(21, 15), (81, 15)]);
    let left = Object::new(Rect::new(18, 12, 30, 24), 9, 0);
    let right = Object::new(Rect::new(78, 12, 90, 24), 9, 0);
    let mut detector = Detector::new(square_config()).unwrap();
    detector.add_cascade(square_cascade(), 0).unwrap();
    detector.init(Size::new(120, 40), None).unwrap();

    let objects = detector.detect_in(&image, &[Rect::new(60, 0, 120, 40)]).unwrap();
    assert_eq!(objects, vec![right]);

    let objects = detector
        .detect_in(&image, &[Rect::new(0, 0, 40, 40), Rect::new(70, 5, 100, 35)])
        .unwrap();
    assert_eq!(objects, vec![left, right]);

    assert!(detector.detect_in(&image, &[]).unwrap().is_empty());
    // Regions outside the image select nothing.
    assert!(detector.detect_in(&image, &[Rect::new(130, 0, 200, 40)]).unwrap().is_empty());

    // A motion-restricted call leaves plain detection untouched.
    assert_eq!(detector.detect(&image).unwrap(), vec![left, right]);
}

#[test]
fn test_motion_regions_intersect_roi() {
    let image = squares(120, 40, &[(21, 15), (81, 15)]);
    let mut roi = Buffer2::new_default(120, 40);
    for y in 0..40 {
        roi.row_mut(y)[..60].fill(255);
    }
    let mut detector = Detector::new(square_config()).unwrap();
    detector.add_cascade(square_cascade(), 0).unwrap();
    detector.init(Size::new(120, 40), Some(&roi)).unwrap();

    let objects = detector.detect_in(&image, &[Rect::new(60, 0, 120, 40)]).unwrap();
    assert!(objects.is_empty(), "{objects:?}");

    let objects = detector.detect_in(&image, &[Rect::new(0, 0, 120, 40)]).unwrap();
    assert_eq!(objects, vec![Object::new(Rect::new(18, 12, 30, 24), 9, 0)]);
}

#[test]
fn test_motion_regions_scale_with_level() {
    let mut detector = Detector::new(DetectorConfig {
        scale_factor: 2.0,
        ..DetectorConfig::default()
    })
    .unwrap();
    detector.load_xml(HAAR_XML, 0).unwrap();
    detector.init(Size::new(80, 60), None).unwrap();
    detector.detect_in(&Buffer2::new_filled(80, 60, 90), &[Rect::new(20, 10, 60, 50)]).unwrap();

    let level = &detector.levels[1];
    assert_eq!(level.scale, 2.0);
    assert_eq!(level.motion_region, Rect::new(10, 5, 30, 25));
    assert_eq!(*level.motion.get(10, 5), 255);
    assert_eq!(*level.motion.get(9, 5), 0);
    assert_eq!(*level.motion.get(29, 24), 255);
    assert_eq!(*level.motion.get(30, 24), 0);
    // 8x6 window: origins sit half a window up-left of their centres.
    assert_eq!(level.cascades[0].motion_rect, Rect::new(6, 2, 26, 22));
}

#[test]
fn test_equalization_follows_level_cascades() {
    let config = DetectorConfig {
        max_size: Size::new(16, 16),
        threads: 1,
        ..DetectorConfig::default()
    };
    let mut rng = rng(0xE0);
    let gray = Buffer2::new(40, 30, (0..30).flat_map(|y| (0..40).map(move |x| (x * 3 + y) as u8)).collect());

    // The Haar window never fits max_size, so only LBP reaches the levels.
    let mut detector = Detector::new(config).unwrap();
    detector.load_xml(LBP_XML, 0).unwrap();
    detector.add_cascade(random_haar(&mut rng, Size::new(20, 20), 2, 2), 1).unwrap();
    detector.init(Size::new(40, 30), None).unwrap();
    assert!(!detector.equalize);
    detector.detect(&gray).unwrap();
    assert_eq!(detector.levels[0].image, gray);

    detector.load_xml(HAAR_XML, 2).unwrap();
    detector.init(Size::new(40, 30), None).unwrap();
    assert!(detector.equalize);
    detector.detect(&gray).unwrap();
    assert_ne!(detector.levels[0].image, gray);
}

#[test]
fn test_bands_follow_centre_region_area() {
    assert!(runs_in_bands(0, FeatureType::Haar, 100 * 100));
    assert!(runs_in_bands(4, FeatureType::Haar, 100 * 100));
    assert!(!runs_in_bands(0, FeatureType::Haar, 99 * 100));
    assert!(!runs_in_bands(1, FeatureType::Haar, 1000 * 1000));
    assert!(runs_in_bands(0, FeatureType::Lbp, 150 * 200));
    assert!(!runs_in_bands(0, FeatureType::Lbp, 149 * 200));
}
