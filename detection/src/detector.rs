//! Multi-scale detection session.
//!
//! [`Detector::init`] lays out an image pyramid for a fixed input size and
//! compiles every loaded cascade for each level it fits; [`Detector::detect`]
//! then only resizes, integrates and runs the kernels. [`Detector::detect_in`]
//! further restricts the scan to windows centred in given motion regions.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::path::Path;

use common::Buffer2;
use common::parallel::rows_per_band;
use rayon::prelude::*;

use crate::cascade::{Cascade, ScanMode, SumLayout};
use crate::config::DetectorConfig;
use crate::driver::RowBand;
use crate::error::{Error, Result};
use crate::geometry::{Rect, Size};
use crate::group::{Object, Tag, group_objects};
use crate::imgproc;
use crate::integral::Integral;
use crate::kernels::Kernels;
use crate::model::{CascadeData, FeatureType};

/// Levels at or below this scale are scanned interlaced.
const INTERLACED_MAX_SCALE: f64 = 2.0;

/// Minimum region area worth splitting into parallel row bands.
const HAAR_PARALLEL_AREA: usize = 10_000;
const LBP_PARALLEL_AREA: usize = 30_000;

#[derive(Debug)]
struct Loaded {
    data: CascadeData,
    tag: Tag,
}

/// One cascade compiled for one level.
#[derive(Debug)]
struct LevelCascade {
    cascade: Cascade,
    tag: Tag,
    /// Window-origin mask: the ROI sampled at each window's centre.
    mask: Buffer2<u8>,
    /// Window origins to scan.
    rect: Rect,
    /// Origin mask and rect of the last motion-restricted call.
    motion_mask: Buffer2<u8>,
    motion_rect: Rect,
}

#[derive(Debug)]
struct Level {
    scale: f64,
    image: Buffer2<u8>,
    integral: Integral,
    dst: Buffer2<u8>,
    /// Binarized ROI at level resolution, indexed by window centre.
    roi: Buffer2<u8>,
    /// Bounding box of `roi`.
    region: Rect,
    /// `roi` restricted to the motion regions of the last call.
    motion: Buffer2<u8>,
    motion_region: Rect,
    cascades: Vec<LevelCascade>,
}

impl Level {
    fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }

    /// Restricts the level to window centres inside `regions`, given in
    /// image coordinates, and inside the ROI.
    fn fill_motion(&mut self, regions: &[Rect]) {
        let size = self.size();
        let bounds = Rect::from_size(size);
        self.motion.fill(0);
        let mut union = Rect::default();
        for region in regions {
            let r = region.scaled(1.0 / self.scale).intersection(&bounds);
            if r.is_empty() {
                continue;
            }
            union = union.union(&r);
            for y in r.top..r.bottom {
                self.motion.row_mut(y)[r.left..r.right].fill(255);
            }
        }
        for (m, &roi) in self.motion.pixels_mut().iter_mut().zip(self.roi.pixels()) {
            *m &= roi;
        }
        self.motion_region = union.intersection(&self.region);

        for hid in self.cascades.iter_mut() {
            let window = hid.cascade.window();
            window_origins(&self.motion, window, &mut hid.motion_mask);
            hid.motion_rect = origin_rect(self.motion_region, window, size);
        }
    }
}

/// Summary of one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelInfo {
    pub scale: f64,
    pub size: Size,
    pub mode: ScanMode,
    pub cascades: usize,
}

pub struct Detector {
    config: DetectorConfig,
    kernels: Kernels,
    pool: Option<rayon::ThreadPool>,
    cascades: Vec<Loaded>,
    image_size: Option<Size>,
    levels: Vec<Level>,
    /// Histogram-equalize the input; set when a level holds a Haar cascade.
    equalize: bool,
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("config", &self.config)
            .field("kernels", &self.kernels)
            .field("cascades", &self.cascades.len())
            .field("image_size", &self.image_size)
            .field("levels", &self.levels.len())
            .finish()
    }
}

impl Detector {
    /// Creates an empty detector.
    ///
    /// # Panics
    ///
    /// Panics if `config` is invalid (see [`DetectorConfig::validate`]).
    pub fn new(config: DetectorConfig) -> Result<Detector> {
        config.validate();

        let kernels = match config.isa {
            Some(isa) => Kernels::for_isa(isa).ok_or(Error::UnsupportedIsa(isa))?,
            None => *Kernels::best(),
        };
        let pool = if config.threads > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .thread_name(|idx| format!("detection-{idx}"))
                    .num_threads(config.threads)
                    .build()?,
            )
        } else {
            None
        };

        tracing::debug!(isa = ?kernels.isa, threads = config.threads, "Created detector");
        Ok(Detector {
            config,
            kernels,
            pool,
            cascades: Vec::new(),
            image_size: None,
            levels: Vec::new(),
            equalize: false,
        })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn kernels(&self) -> &Kernels {
        &self.kernels
    }

    /// Adds a parsed cascade. Invalidates a previous [`init`](Self::init).
    pub fn add_cascade(&mut self, data: CascadeData, tag: Tag) -> Result<()> {
        data.validate()?;
        if data.has_tilted() {
            return Err(Error::TiltedFeatures);
        }
        self.cascades.push(Loaded { data, tag });
        self.reset();
        Ok(())
    }

    /// Loads and adds an OpenCV XML cascade file.
    pub fn load(&mut self, path: impl AsRef<Path>, tag: Tag) -> Result<()> {
        let data = CascadeData::load(path)?;
        self.add_cascade(data, tag)
    }

    /// Parses and adds an OpenCV XML cascade string.
    pub fn load_xml(&mut self, xml: &str, tag: Tag) -> Result<()> {
        let data = CascadeData::from_xml_str(xml)?;
        self.add_cascade(data, tag)
    }

    pub fn cascade_count(&self) -> usize {
        self.cascades.len()
    }

    fn reset(&mut self) {
        self.image_size = None;
        self.levels.clear();
        self.equalize = false;
    }

    /// Builds the pyramid for `image_size`.
    ///
    /// `roi`, when given, must have the image size; windows are scanned only
    /// where the ROI pixel under the window centre is nonzero.
    pub fn init(&mut self, image_size: Size, roi: Option<&Buffer2<u8>>) -> Result<()> {
        self.reset();
        if self.cascades.is_empty() {
            return Err(Error::NoCascades);
        }
        if let Some(roi) = roi {
            let actual = Size::new(roi.width(), roi.height());
            if actual != image_size {
                return Err(Error::ImageSize {
                    expected: image_size,
                    actual,
                });
            }
        }

        let mut levels = Vec::new();
        let mut scale = 1.0f64;
        loop {
            let mut any_fits = false;
            let mut compiled = Vec::new();
            let size = Size::new(
                (image_size.width as f64 / scale).round() as usize,
                (image_size.height as f64 / scale).round() as usize,
            );
            let mode = if scale <= INTERLACED_MAX_SCALE {
                ScanMode::Interlaced
            } else {
                ScanMode::Progressive
            };

            for loaded in &self.cascades {
                let window = loaded.data.window.scaled(scale);
                if !window.fits_in(self.config.max_size) || !window.fits_in(image_size) {
                    continue;
                }
                any_fits = true;
                if !self.config.min_size.fits_in(window) || !loaded.data.window.fits_in(size) {
                    continue;
                }
                let layout = SumLayout::new(Size::new(size.width + 1, size.height + 1), mode);
                let cascade = Cascade::compile(&loaded.data, layout, self.config.precision)?;
                compiled.push((cascade, loaded.tag));
            }
            if !any_fits {
                break;
            }
            if !compiled.is_empty() {
                levels.push(Self::build_level(scale, size, roi, compiled));
            }
            scale *= self.config.scale_factor;
        }

        tracing::info!(
            ?image_size,
            levels = levels.len(),
            cascades = self.cascades.len(),
            "Initialized detection pyramid"
        );
        self.equalize = levels.iter().any(|level| {
            level
                .cascades
                .iter()
                .any(|hid| hid.cascade.feature_type() == FeatureType::Haar)
        });
        self.levels = levels;
        self.image_size = Some(image_size);
        Ok(())
    }

    fn build_level(
        scale: f64,
        size: Size,
        roi: Option<&Buffer2<u8>>,
        compiled: Vec<(Cascade, Tag)>,
    ) -> Level {
        let roi = match roi {
            Some(roi) => {
                let mut scaled = imgproc::resize_bilinear(roi, size);
                imgproc::binarize(&mut scaled);
                scaled
            }
            None => Buffer2::new_filled(size.width, size.height, 255),
        };
        let region = imgproc::bounding_rect(&roi, 255, Rect::from_size(size));

        let cascades = compiled
            .into_iter()
            .map(|(cascade, tag)| {
                let window = cascade.window();
                let mut mask = Buffer2::new_default(size.width, size.height);
                window_origins(&roi, window, &mut mask);
                let rect = origin_rect(region, window, size);

                LevelCascade {
                    cascade,
                    tag,
                    mask,
                    rect,
                    motion_mask: Buffer2::new_default(size.width, size.height),
                    motion_rect: Rect::default(),
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!(scale, ?size, ?region, cascades = cascades.len(), "Pyramid level");
        let image = Buffer2::new_default(size.width, size.height);
        Level {
            scale,
            integral: Integral::new(&image),
            image,
            dst: Buffer2::new_default(size.width, size.height),
            roi,
            region,
            motion: Buffer2::new_default(size.width, size.height),
            motion_region: Rect::default(),
            cascades,
        }
    }

    /// Pyramid levels laid out by the last [`init`](Self::init).
    pub fn levels(&self) -> Vec<LevelInfo> {
        self.levels
            .iter()
            .map(|level| LevelInfo {
                scale: level.scale,
                size: level.size(),
                mode: level
                    .cascades
                    .first()
                    .map_or(ScanMode::Progressive, |c| c.cascade.layout().mode),
                cascades: level.cascades.len(),
            })
            .collect()
    }

    /// Detects objects in `gray`, which must have the initialized size.
    pub fn detect(&mut self, gray: &Buffer2<u8>) -> Result<Vec<Object>> {
        self.run(gray, None)
    }

    /// Like [`detect`](Self::detect), but scans only windows whose centre
    /// lies inside one of `motion` (image coordinates) as well as the ROI.
    /// An empty `motion` scans nothing.
    pub fn detect_in(&mut self, gray: &Buffer2<u8>, motion: &[Rect]) -> Result<Vec<Object>> {
        self.run(gray, Some(motion))
    }

    fn run(&mut self, gray: &Buffer2<u8>, motion: Option<&[Rect]>) -> Result<Vec<Object>> {
        let Some(expected) = self.image_size else {
            return Err(Error::NotInitialized);
        };
        let actual = Size::new(gray.width(), gray.height());
        if actual != expected {
            return Err(Error::ImageSize { expected, actual });
        }

        self.fill_levels(gray);
        if let Some(motion) = motion {
            for level in self.levels.iter_mut() {
                level.fill_motion(motion);
            }
        }

        let Detector {
            config,
            kernels,
            pool,
            levels,
            ..
        } = self;
        let (config, kernels) = (&*config, &*kernels);
        let mut candidates: BTreeMap<Tag, Vec<Object>> = BTreeMap::new();
        for level in levels.iter_mut() {
            let region = if motion.is_some() {
                level.motion_region
            } else {
                level.region
            };
            for hid in &level.cascades {
                let scan = match motion {
                    Some(_) => Scan {
                        mask: &hid.motion_mask,
                        rect: hid.motion_rect,
                        region,
                    },
                    None => Scan {
                        mask: &hid.mask,
                        rect: hid.rect,
                        region,
                    },
                };
                if scan.rect.is_empty() {
                    continue;
                }
                let (integral, dst) = (&level.integral, &mut level.dst);
                match pool {
                    Some(pool) => pool.install(|| run_cascade(kernels, config.threads, hid, &scan, integral, dst)),
                    None => run_cascade(kernels, config.threads, hid, &scan, integral, dst),
                }
                collect_hits(candidates.entry(hid.tag).or_default(), hid, scan.rect, &level.dst, level.scale);
            }
        }

        let mut objects = Vec::new();
        for (tag, hits) in &candidates {
            let grouped = group_objects(hits, config.group_size_min, config.size_difference_max);
            tracing::trace!(tag, hits = hits.len(), objects = grouped.len(), "Grouped detections");
            objects.extend(grouped);
        }
        tracing::debug!(objects = objects.len(), "Detection finished");
        Ok(objects)
    }

    /// Resizes `gray` into every level and recomputes the integral tables.
    fn fill_levels(&mut self, gray: &Buffer2<u8>) {
        let equalize = self.equalize;
        let Some((first, rest)) = self.levels.split_first_mut() else {
            return;
        };

        imgproc::resize_bilinear_into(gray, &mut first.image);
        if equalize {
            imgproc::equalize_histogram(&mut first.image);
        }
        for level in rest.iter_mut() {
            imgproc::resize_bilinear_into(&first.image, &mut level.image);
        }

        for level in self.levels.iter_mut() {
            level.integral.compute(&level.image);
            for hid in &level.cascades {
                level.integral.prepare(&hid.cascade);
            }
        }
    }
}

/// Copies `centres` into `mask` shifted so that each window origin reads the
/// pixel under its window's centre. Only the window grid of `mask` is written.
fn window_origins(centres: &Buffer2<u8>, window: Size, mask: &mut Buffer2<u8>) {
    let (cx, cy) = (window.width / 2, window.height / 2);
    let grid = Size::new(
        centres.width().saturating_sub(window.width),
        centres.height().saturating_sub(window.height),
    );
    for y in 0..grid.height {
        let src = &centres.row(y + cy)[cx..cx + grid.width];
        mask.row_mut(y)[..grid.width].copy_from_slice(src);
    }
}

/// Window origins whose centres lie in `region`, clipped to the window grid
/// of a `size` level.
fn origin_rect(region: Rect, window: Size, size: Size) -> Rect {
    let grid = Size::new(
        size.width.saturating_sub(window.width),
        size.height.saturating_sub(window.height),
    );
    region
        .shifted_back(window.width / 2, window.height / 2)
        .intersection(&Rect::from_size(grid))
}

/// Mask and origins one cascade scans, and the centre region they came from.
#[derive(Debug)]
struct Scan<'a> {
    mask: &'a Buffer2<u8>,
    rect: Rect,
    region: Rect,
}

/// `true` when a scan over `region_area` window centres is worth splitting
/// into row bands.
fn runs_in_bands(threads: usize, feature_type: FeatureType, region_area: usize) -> bool {
    let min_area = match feature_type {
        FeatureType::Haar => HAAR_PARALLEL_AREA,
        FeatureType::Lbp => LBP_PARALLEL_AREA,
    };
    threads != 1 && region_area >= min_area
}

/// Runs one compiled cascade over its level, in row bands when the region
/// is large enough.
fn run_cascade(
    kernels: &Kernels,
    threads: usize,
    hid: &LevelCascade,
    scan: &Scan<'_>,
    integral: &Integral,
    dst: &mut Buffer2<u8>,
) {
    dst.fill(0);
    if !runs_in_bands(threads, hid.cascade.feature_type(), scan.region.area()) {
        kernels.detect(&hid.cascade, integral, scan.mask, scan.rect, &mut RowBand::whole(dst));
        return;
    }

    let width = dst.width();
    let align = hid.cascade.layout().mode.step();
    let rows = rows_per_band(dst.height(), threads, align);
    dst.pixels_mut()
        .par_chunks_mut(rows * width)
        .enumerate()
        .for_each(|(index, chunk)| {
            let mut band = RowBand::new(chunk, width, index * rows);
            kernels.detect(&hid.cascade, integral, scan.mask, scan.rect, &mut band);
        });
}

fn collect_hits(hits: &mut Vec<Object>, hid: &LevelCascade, rect: Rect, dst: &Buffer2<u8>, scale: f64) {
    let window = hid.cascade.window();
    let step = hid.cascade.layout().mode.step();
    for row in (rect.top..rect.bottom).step_by(step) {
        let line = dst.row(row);
        for col in rect.left..rect.right {
            if line[col] != 0 {
                let r = Rect::new(col, row, col + window.width, row + window.height);
                hits.push(Object::new(r.scaled(scale), 1, hid.tag));
            }
        }
    }
}
