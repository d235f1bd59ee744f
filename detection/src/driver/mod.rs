//! Row drivers: walk a rectangle of window origins, feed the lane
//! evaluators in aligned blocks and write one byte per evaluated origin.
//!
//! Output convention for every driver: within `rect`, each visited row gets
//! `1` at accepted origins and `0` at every other column of the rectangle.
//! Interlaced drivers visit rows `top, top + 2, ...` and evaluate even
//! absolute columns only; rows they skip are left untouched.


use std::ops::Range;

use common::Buffer2;

use crate::cascade::{HaarCascade, LbpCascade, LbpLeaf, ScanMode, SumLayout};
use crate::eval;
use crate::geometry::{Rect, Size};
use crate::integral::Integral;
use crate::lanes::{LaneElem, Lanes16, Lanes32, LiveMask, MaskRow};
use crate::scalar;

/// A horizontal band of the output image. Rows outside the band are never
/// written, which lets bands be processed on separate threads.
#[derive(Debug)]
pub struct RowBand<'a> {
    data: &'a mut [u8],
    width: usize,
    first_row: usize,
}

impl<'a> RowBand<'a> {
    pub fn new(data: &'a mut [u8], width: usize, first_row: usize) -> Self {
        assert!(width > 0, "band width must be > 0");
        assert_eq!(data.len() % width, 0, "band must hold whole rows");
        Self {
            data,
            width,
            first_row,
        }
    }

    /// The whole of `dst` as one band.
    pub fn whole(dst: &'a mut Buffer2<u8>) -> Self {
        let width = dst.width().max(1);
        Self::new(dst.pixels_mut(), width, 0)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Absolute rows covered by the band.
    #[inline]
    pub fn rows(&self) -> Range<usize> {
        self.first_row..self.first_row + self.data.len() / self.width
    }

    #[inline]
    fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let start = (y - self.first_row) * self.width;
        &mut self.data[start..start + self.width]
    }
}

/// Unpacked mask (`m`) and result (`d`) of the row being evaluated, one
/// element per evaluated origin.
#[derive(Debug)]
pub(crate) struct RowBuffer<T> {
    pub m: Vec<T>,
    pub d: Vec<T>,
}

impl<T: LaneElem> RowBuffer<T> {
    pub fn new(len: usize) -> Self {
        Self {
            m: vec![T::default(); len],
            d: vec![T::default(); len],
        }
    }
}

/// Rows and columns one driver call visits.
#[derive(Debug, Clone, Copy)]
struct Scan {
    mode: ScanMode,
    rect: Rect,
    /// First evaluated column; even in interlaced mode.
    first_col: usize,
    /// Evaluated columns per row.
    count: usize,
    rows: (usize, usize),
}

impl Scan {
    fn new(rect: Rect, mode: ScanMode, band: Range<usize>) -> Scan {
        if rect.is_empty() {
            return Scan {
                mode,
                rect: Rect::default(),
                first_col: 0,
                count: 0,
                rows: (0, 0),
            };
        }
        let step = mode.step();
        let first_col = rect.left.next_multiple_of(step);
        let count = rect.right.saturating_sub(first_col).div_ceil(step);
        let start = band.start.max(rect.top);
        let first_row = rect.top + (start - rect.top).next_multiple_of(step);
        let end = band.end.min(rect.bottom);
        Scan {
            mode,
            rect,
            first_col,
            count,
            rows: (first_row, end),
        }
    }

    fn rows(&self) -> impl Iterator<Item = usize> {
        let (first, end) = self.rows;
        (first..end.max(first)).step_by(self.mode.step())
    }

    #[inline]
    fn step(&self) -> usize {
        self.mode.step()
    }

    #[inline]
    fn interlaced(&self) -> bool {
        self.mode == ScanMode::Interlaced
    }

    /// Offset of origin `(first_col, row)` in the feature table.
    #[inline]
    fn feature_base(&self, layout: &SumLayout, row: usize) -> usize {
        row * layout.width + layout.column(self.first_col)
    }

    /// Offset of origin `(first_col, row)` in the progressive tables.
    #[inline]
    fn norm_base(&self, layout: &SumLayout, row: usize) -> usize {
        row * layout.width + self.first_col
    }
}

/// Checks every precondition shared by the drivers.
fn check_region(
    layout: &SumLayout,
    window: Size,
    mode: ScanMode,
    mask: &Buffer2<u8>,
    rect: Rect,
    band: &RowBand<'_>,
) {
    assert_eq!(layout.mode, mode, "cascade compiled for another scan mode");
    assert_eq!(band.width(), mask.width(), "output width differs from mask");
    assert!(
        rect.right <= mask.width() && rect.bottom <= mask.height(),
        "rect {rect:?} exceeds the {}x{} mask",
        mask.width(),
        mask.height()
    );
    if !rect.is_empty() {
        let grid = layout.window_grid(window);
        assert!(
            rect.right <= grid.width && rect.bottom <= grid.height,
            "rect {rect:?} has windows outside the integral image"
        );
    }
}

fn check_table<T>(table: &Buffer2<T>, layout: &SumLayout) {
    assert!(
        table.width() == layout.width && table.height() == layout.height,
        "integral table is {}x{}, cascade expects {}x{}",
        table.width(),
        table.height(),
        layout.width,
        layout.height
    );
}

/// Visits every block of `count` origins: aligned full blocks, then the
/// tail as a masked block, an overlapping full block, or single windows.
#[inline(always)]
fn for_each_block<S>(
    state: &mut S,
    count: usize,
    lanes: usize,
    masked_tail: bool,
    mut block: impl FnMut(&mut S, usize, usize),
    mut single: impl FnMut(&mut S, usize),
) {
    let aligned = count / lanes * lanes;
    for at in (0..aligned).step_by(lanes) {
        block(state, at, lanes);
    }
    if aligned < count {
        if masked_tail {
            block(state, aligned, count - aligned);
        } else if count >= lanes {
            block(state, count - lanes, lanes);
        } else {
            for k in aligned..count {
                single(state, k);
            }
        }
    }
}

#[inline(always)]
fn store_live<T: LaneElem>(dst: &mut [T], live: LiveMask) {
    for (k, d) in dst.iter_mut().enumerate() {
        *d = if (live >> k) & 1 != 0 { T::ONE } else { T::default() };
    }
}

/// Shared row loop: unpack the mask row, let `evaluate` fill `buf.d`, pack
/// the result into the band.
#[inline(always)]
unsafe fn scan_rows<V: MaskRow>(
    scan: &Scan,
    mask: &Buffer2<u8>,
    band: &mut RowBand<'_>,
    mut evaluate: impl FnMut(usize, &mut RowBuffer<V::Elem>),
) {
    let Scan {
        rect,
        first_col,
        count,
        ..
    } = *scan;
    let mut buf = RowBuffer::<V::Elem>::new(count);
    for row in scan.rows() {
        let src = mask.row(row);
        if scan.interlaced() {
            unsafe { V::unpack_mask_even(&src[first_col..rect.right], &mut buf.m) };
        } else {
            unsafe { V::unpack_mask(&src[rect.left..rect.right], &mut buf.m) };
        }
        buf.d.fill(V::Elem::default());

        evaluate(row, &mut buf);

        let dst = &mut band.row_mut(row)[rect.left..rect.right];
        if scan.interlaced() {
            let (lead, evaluated) = dst.split_at_mut(first_col - rect.left);
            lead.fill(0);
            unsafe { V::pack_result_even(&buf.d, evaluated) };
        } else {
            unsafe { V::pack_result(&buf.d, dst) };
        }
    }
}

/// Haar detection over `rect` with lanes `V`.
///
/// # Safety
///
/// `V`'s instructions must be available.
#[inline(always)]
pub(crate) unsafe fn haar_rows<V: Lanes32>(
    cascade: &HaarCascade,
    integral: &Integral,
    mask: &Buffer2<u8>,
    rect: Rect,
    band: &mut RowBand<'_>,
    mode: ScanMode,
) {
    let layout = cascade.layout;
    check_region(&layout, cascade.window, mode, mask, rect, band);
    let features = integral.features32(layout);
    check_table(features, &layout);
    let (features, sum, sqsum) = (
        features.pixels(),
        integral.sum().pixels(),
        integral.sqsum().pixels(),
    );

    let scan = Scan::new(rect, mode, band.rows());
    let (step, interlaced) = (scan.step(), scan.interlaced());
    unsafe {
        scan_rows::<V>(&scan, mask, band, |row, buf| {
            let feature_base = scan.feature_base(&layout, row);
            let norm_base = scan.norm_base(&layout, row);
            for_each_block(
                buf,
                scan.count,
                V::LANES,
                V::MASKED_TAIL,
                |buf, at, lanes| {
                    let live = unsafe { V::live_bits(&buf.m, at, lanes) };
                    if live == 0 {
                        return;
                    }
                    let accepted = unsafe {
                        let norm = eval::haar_norm::<V>(
                            cascade,
                            sum,
                            sqsum,
                            norm_base + at * step,
                            lanes,
                            interlaced,
                        );
                        eval::haar_block::<V>(cascade, features, feature_base + at, norm, live, lanes)
                    };
                    store_live(&mut buf.d[at..at + lanes], accepted);
                },
                |buf, k| {
                    if buf.m[k] == 0 {
                        return;
                    }
                    let norm = scalar::haar_norm(cascade, sum, sqsum, norm_base + k * step);
                    if scalar::haar_window(cascade, features, feature_base + k, 0, norm).is_accepted() {
                        buf.d[k] = 1;
                    }
                },
            );
        });
    }
}

/// LBP detection with 32-bit sums and f32 leaves over `rect` with lanes `V`.
///
/// # Safety
///
/// `V`'s instructions must be available.
#[inline(always)]
pub(crate) unsafe fn lbp32_rows<V: Lanes32>(
    cascade: &LbpCascade<f32>,
    integral: &Integral,
    mask: &Buffer2<u8>,
    rect: Rect,
    band: &mut RowBand<'_>,
    mode: ScanMode,
) {
    let layout = cascade.layout;
    check_region(&layout, cascade.window, mode, mask, rect, band);
    let sum = integral.features32(layout);
    check_table(sum, &layout);
    let sum = sum.pixels();

    let scan = Scan::new(rect, mode, band.rows());
    unsafe {
        scan_rows::<V>(&scan, mask, band, |row, buf| {
            let base = scan.feature_base(&layout, row);
            for_each_block(
                buf,
                scan.count,
                V::LANES,
                V::MASKED_TAIL,
                |buf, at, lanes| {
                    let live = unsafe { V::live_bits(&buf.m, at, lanes) };
                    if live == 0 {
                        return;
                    }
                    let accepted = unsafe { eval::lbp32_block::<V>(cascade, sum, base + at, live, lanes) };
                    store_live(&mut buf.d[at..at + lanes], accepted);
                },
                |buf, k| {
                    if buf.m[k] != 0 && scalar::lbp_window(cascade, sum, base + k, 0).is_accepted() {
                        buf.d[k] = 1;
                    }
                },
            );
        });
    }
}

/// LBP detection with 16-bit sums and i16 leaves over `rect` with lanes `V`.
///
/// # Safety
///
/// `V`'s instructions must be available.
#[inline(always)]
pub(crate) unsafe fn lbp16_rows<V: Lanes16>(
    cascade: &LbpCascade<i16>,
    integral: &Integral,
    mask: &Buffer2<u8>,
    rect: Rect,
    band: &mut RowBand<'_>,
    mode: ScanMode,
) {
    let layout = cascade.layout;
    check_region(&layout, cascade.window, mode, mask, rect, band);
    let sum = integral.features16(layout);
    check_table(sum, &layout);
    let sum = sum.pixels();

    let scan = Scan::new(rect, mode, band.rows());
    unsafe {
        scan_rows::<V>(&scan, mask, band, |row, buf| {
            let base = scan.feature_base(&layout, row);
            for_each_block(
                buf,
                scan.count,
                V::LANES,
                V::MASKED_TAIL,
                |buf, at, lanes| {
                    let live = unsafe { V::live_bits(&buf.m, at, lanes) };
                    if live == 0 {
                        return;
                    }
                    let accepted = unsafe { eval::lbp16_block::<V>(cascade, sum, base + at, live, lanes) };
                    store_live(&mut buf.d[at..at + lanes], accepted);
                },
                |buf, k| {
                    if buf.m[k] != 0 && scalar::lbp_window(cascade, sum, base + k, 0).is_accepted() {
                        buf.d[k] = 1;
                    }
                },
            );
        });
    }
}

// ============================================================================
// Scalar sweeps
// ============================================================================

/// Visits every evaluated origin of `rect` in `band` one at a time.
fn sweep(
    scan: &Scan,
    mask: &Buffer2<u8>,
    band: &mut RowBand<'_>,
    mut accept: impl FnMut(usize, usize) -> bool,
) {
    let rect = scan.rect;
    for row in scan.rows() {
        let src = mask.row(row);
        let dst = band.row_mut(row);
        dst[rect.left..rect.right].fill(0);
        for j in 0..scan.count {
            let col = scan.first_col + j * scan.step();
            if src[col] != 0 && accept(row, col) {
                dst[col] = 1;
            }
        }
    }
}

/// Haar detection one window at a time.
pub fn haar_rows_base(
    cascade: &HaarCascade,
    integral: &Integral,
    mask: &Buffer2<u8>,
    rect: Rect,
    band: &mut RowBand<'_>,
    mode: ScanMode,
) {
    let layout = cascade.layout;
    check_region(&layout, cascade.window, mode, mask, rect, band);
    let features = integral.features32(layout);
    check_table(features, &layout);
    let (features, sum, sqsum) = (
        features.pixels(),
        integral.sum().pixels(),
        integral.sqsum().pixels(),
    );

    let scan = Scan::new(rect, mode, band.rows());
    sweep(&scan, mask, band, |row, col| {
        let norm = scalar::haar_norm(cascade, sum, sqsum, row * layout.width + col);
        scalar::haar_window(cascade, features, layout.offset(col, row), 0, norm).is_accepted()
    });
}

/// LBP detection with f32 leaves one window at a time.
pub fn lbp32_rows_base(
    cascade: &LbpCascade<f32>,
    integral: &Integral,
    mask: &Buffer2<u8>,
    rect: Rect,
    band: &mut RowBand<'_>,
    mode: ScanMode,
) {
    lbp_rows_base(cascade, integral.features32(cascade.layout), mask, rect, band, mode);
}

/// LBP detection with i16 leaves one window at a time.
pub fn lbp16_rows_base(
    cascade: &LbpCascade<i16>,
    integral: &Integral,
    mask: &Buffer2<u8>,
    rect: Rect,
    band: &mut RowBand<'_>,
    mode: ScanMode,
) {
    lbp_rows_base(cascade, integral.features16(cascade.layout), mask, rect, band, mode);
}

fn lbp_rows_base<L: LbpLeaf>(
    cascade: &LbpCascade<L>,
    sum: &Buffer2<L::Sum>,
    mask: &Buffer2<u8>,
    rect: Rect,
    band: &mut RowBand<'_>,
    mode: ScanMode,
) {
    let layout = cascade.layout;
    check_region(&layout, cascade.window, mode, mask, rect, band);
    check_table(sum, &layout);
    let sum = sum.pixels();

    let scan = Scan::new(rect, mode, band.rows());
    sweep(&scan, mask, band, |row, col| {
        scalar::lbp_window(cascade, sum, layout.offset(col, row), 0).is_accepted()
    });
}
