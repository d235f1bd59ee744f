//! Testing utilities: tracing setup, sample cascades and seeded random
//! cascades and images.

#![allow(dead_code)]

use common::Buffer2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geometry::Size;
use crate::model::{
    CascadeData, FeatureRect, FeatureType, HaarFeature, LBP_SUBSET_WORDS, LbpFeature, NodeData,
    StageData,
};

/// Initialize tracing subscriber for tests.
/// Safe to call multiple times - will only initialize once.
/// Respects RUST_LOG env var, defaults to "info".
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Two-stage Haar cascade in OpenCV's format, 8x6 window.
pub const HAAR_XML: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier">
  <stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>6</height>
  <width>8</width>
  <stageParams>
    <maxWeakCount>2</maxWeakCount></stageParams>
  <featureParams>
    <maxCatCount>0</maxCatCount></featureParams>
  <stageNum>2</stageNum>
  <stages>
    <!-- stage 0 -->
    <_>
      <maxWeakCount>2</maxWeakCount>
      <stageThreshold>-0.5</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 1.5e-02</internalNodes>
          <leafValues>
            -0.75 0.5</leafValues></_>
        <_>
          <internalNodes>
            0 -1 1 -2.0e-03</internalNodes>
          <leafValues>
            0.25 -0.5</leafValues></_></weakClassifiers></_>
    <!-- stage 1 -->
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.125</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 2 0.</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 8 6 -1.</_>
        <_>
          2 1 4 4 3.</_></rects></_>
    <_>
      <rects>
        <_>
          0 0 4 6 -1.</_>
        <_>
          4 0 4 6 1.</_></rects>
      <tilted>0</tilted></_>
    <_>
      <rects>
        <_>
          0 0 8 6 -1.</_>
        <_>
          0 2 8 2 2.</_>
        <_>
          0 4 8 2 1.</_></rects></_></features></cascade>
</opencv_storage>
"#;

/// One-stage LBP cascade in OpenCV's format, 9x9 window.
pub const LBP_XML: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade>
  <stageType>BOOST</stageType>
  <featureType>LBP</featureType>
  <height>9</height>
  <width>9</width>
  <stageParams>
    <maxDepth>1</maxDepth>
    <maxWeakCount>2</maxWeakCount></stageParams>
  <featureParams>
    <maxCatCount>256</maxCatCount>
    <featSize>1</featSize></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <_>
      <maxWeakCount>2</maxWeakCount>
      <stageThreshold>-0.25</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 1 -1 0 255 -16777216 1 0 0 -2147483648</internalNodes>
          <leafValues>
            -0.5 0.75</leafValues></_>
        <_>
          <internalNodes>
            0 -1 0 0 0 0 0 0 0 0 0</internalNodes>
          <leafValues>
            0.5 -0.25</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rect>
        0 0 3 3</rect></_>
    <_>
      <rect>
        1 2 2 2</rect></_></features></cascade>
</opencv_storage>
"#;

/// Gray image with smooth random blobs over noise, so windows vary from
/// flat to strongly textured.
pub fn random_image(rng: &mut StdRng, width: usize, height: usize) -> Buffer2<u8> {
    let blobs: Vec<(f32, f32, f32, f32)> = (0..6)
        .map(|_| {
            (
                rng.random_range(0.0..width as f32),
                rng.random_range(0.0..height as f32),
                rng.random_range(2.0..8.0f32),
                rng.random_range(-120.0..120.0f32),
            )
        })
        .collect();
    let mut pixels = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let mut v = 128.0 + rng.random_range(-24.0..24.0f32);
            for &(cx, cy, r, amp) in &blobs {
                let d2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
                v += amp * (-d2 / (2.0 * r * r)).exp();
            }
            pixels.push(v.clamp(0.0, 255.0) as u8);
        }
    }
    Buffer2::new(width, height, pixels)
}

/// Mask with roughly `live` of the positions set to 255.
pub fn random_mask(rng: &mut StdRng, width: usize, height: usize, live: f64) -> Buffer2<u8> {
    let pixels = (0..width * height)
        .map(|_| if rng.random_bool(live) { 255 } else { 0 })
        .collect();
    Buffer2::new(width, height, pixels)
}

fn random_rect(rng: &mut StdRng, window: Size, cells: usize) -> FeatureRect {
    let max_w = (window.width / cells).min(6);
    let max_h = (window.height / cells).min(6);
    let w = rng.random_range(1..=max_w);
    let h = rng.random_range(1..=max_h);
    let x = rng.random_range(0..=window.width - w * cells);
    let y = rng.random_range(0..=window.height - h * cells);
    FeatureRect::new(x as i32, y as i32, w as i32, h as i32)
}

/// Stages whose thresholds sit near the middle of their reachable range;
/// every fourth stage can never reject.
fn random_stages(rng: &mut StdRng, stages: usize, trees: usize, leaves: &mut Vec<f32>) -> Vec<StageData> {
    (0..stages)
        .map(|s| {
            let first = s * trees;
            let mut mid = 0.0f32;
            let mut floor = 0.0f32;
            for _ in 0..trees {
                let a = rng.random_range(-1.0..1.0f32);
                let b = rng.random_range(-1.0..1.0f32);
                mid += (a + b) * 0.5;
                floor += a.min(b);
                leaves.extend([a, b]);
            }
            let threshold = if s % 4 == 3 {
                floor - 0.5
            } else {
                mid + rng.random_range(-0.2..0.2f32)
            };
            StageData {
                first,
                ntrees: trees,
                threshold,
            }
        })
        .collect()
}

/// Random stump Haar cascade with one feature per tree: two equally sized
/// rectangles of opposite weight, and on about a third of the features a
/// small third term.
pub fn random_haar(rng: &mut StdRng, window: Size, stages: usize, trees: usize) -> CascadeData {
    let mut leaves = Vec::new();
    let stage_data = random_stages(rng, stages, trees, &mut leaves);
    let count = stages * trees;

    let haar_features = (0..count)
        .map(|_| {
            let first = random_rect(rng, window, 1);
            let x = rng.random_range(0..=window.width - first.width as usize);
            let y = rng.random_range(0..=window.height - first.height as usize);
            let second = FeatureRect::new(x as i32, y as i32, first.width, first.height);
            let mut rects = vec![(first, -1.0), (second, 1.0)];
            if rng.random_bool(0.35) {
                let weight = if rng.random_bool(0.5) { 0.5 } else { -0.5 };
                rects.push((random_rect(rng, window, 1), weight));
            }
            HaarFeature::new(&rects)
        })
        .collect();
    let nodes = (0..count)
        .map(|n| NodeData {
            feature: n,
            left: 0,
            right: -1,
            threshold: rng.random_range(-0.08..0.08f32),
        })
        .collect();

    CascadeData {
        feature_type: FeatureType::Haar,
        window,
        stages: stage_data,
        nodes,
        leaves,
        subsets: Vec::new(),
        haar_features,
        lbp_features: Vec::new(),
    }
}

/// Random stump LBP cascade. Features are shared between trees and subsets
/// hold about half the codes.
pub fn random_lbp(rng: &mut StdRng, window: Size, stages: usize, trees: usize) -> CascadeData {
    let mut leaves = Vec::new();
    let stage_data = random_stages(rng, stages, trees, &mut leaves);
    let count = stages * trees;

    let lbp_features: Vec<LbpFeature> = (0..count.div_ceil(2).max(1))
        .map(|_| LbpFeature {
            rect: random_rect(rng, window, 3),
        })
        .collect();
    let nodes = (0..count)
        .map(|_| NodeData {
            feature: rng.random_range(0..lbp_features.len()),
            left: -1,
            right: -2,
            threshold: 0.0,
        })
        .collect();
    let subsets = (0..count * LBP_SUBSET_WORDS).map(|_| rng.random::<u32>()).collect();

    CascadeData {
        feature_type: FeatureType::Lbp,
        window,
        stages: stage_data,
        nodes,
        leaves,
        subsets,
        haar_features: Vec::new(),
        lbp_features,
    }
}

/// One stage, one tree: a whole-window rectangle with weight 1 against
/// threshold 0, so every window with a positive sum is accepted.
pub fn whole_window_haar(window: Size) -> CascadeData {
    let rect = FeatureRect::new(0, 0, window.width as i32, window.height as i32);
    CascadeData {
        feature_type: FeatureType::Haar,
        window,
        stages: vec![StageData {
            first: 0,
            ntrees: 1,
            threshold: 0.0,
        }],
        nodes: vec![NodeData {
            feature: 0,
            left: 0,
            right: -1,
            threshold: 0.0,
        }],
        leaves: vec![-1.0, 1.0],
        subsets: Vec::new(),
        haar_features: vec![HaarFeature::new(&[(rect, 1.0), (rect, 0.0)])],
        lbp_features: Vec::new(),
    }
}
