//! Integral images and the derived tables the kernels read.
//!
//! `sum[(x, y)]` is the sum of all pixels above and left of `(x, y)`, so the
//! table is one larger than the image in each dimension. Sums wrap on
//! overflow; rectangle sums recovered with wrapping arithmetic stay exact as
//! long as the rectangle's true sum fits the element type.

use common::Buffer2;

use crate::cascade::{Cascade, ScanMode, SumLayout};
use crate::geometry::{Rect, Size};

/// Sum and squared-sum tables of one image, plus the prepared copies the
/// interlaced and 16-bit kernels need.
///
/// The prepared copies keep their allocations across [`compute`](Self::compute)
/// calls of the same size; only their validity is reset.
#[derive(Debug, Clone)]
pub struct Integral {
    sum: Buffer2<u32>,
    sqsum: Buffer2<u32>,
    through_column: Buffer2<u32>,
    through_ready: bool,
    sum16: Buffer2<u16>,
    /// Layout `sum16` currently holds, if any.
    sum16_mode: Option<ScanMode>,
}

impl Integral {
    pub fn new(gray: &Buffer2<u8>) -> Integral {
        let mut integral = Integral {
            sum: Buffer2::new_default(0, 0),
            sqsum: Buffer2::new_default(0, 0),
            through_column: Buffer2::new_default(0, 0),
            through_ready: false,
            sum16: Buffer2::new_default(0, 0),
            sum16_mode: None,
        };
        integral.compute(gray);
        integral
    }

    /// Recomputes the tables for `gray`, reusing allocations when the size
    /// is unchanged. Prepared copies are invalidated.
    pub fn compute(&mut self, gray: &Buffer2<u8>) {
        let (width, height) = (gray.width() + 1, gray.height() + 1);
        if self.sum.width() != width || self.sum.height() != height {
            self.sum = Buffer2::new_default(width, height);
            self.sqsum = Buffer2::new_default(width, height);
        }
        self.through_ready = false;
        self.sum16_mode = None;

        self.sum.row_mut(0).fill(0);
        self.sqsum.row_mut(0).fill(0);
        for y in 0..gray.height() {
            let src = gray.row(y);
            let (above, row) = self.sum.pixels_mut().split_at_mut((y + 1) * width);
            let above = &above[y * width..];
            let row = &mut row[..width];
            let (above_sq, row_sq) = self.sqsum.pixels_mut().split_at_mut((y + 1) * width);
            let above_sq = &above_sq[y * width..];
            let row_sq = &mut row_sq[..width];

            row[0] = 0;
            row_sq[0] = 0;
            let mut line = 0u32;
            let mut line_sq = 0u32;
            for (x, &p) in src.iter().enumerate() {
                let p = p as u32;
                line = line.wrapping_add(p);
                line_sq = line_sq.wrapping_add(p * p);
                row[x + 1] = above[x + 1].wrapping_add(line);
                row_sq[x + 1] = above_sq[x + 1].wrapping_add(line_sq);
            }
        }
    }

    /// Table size: image size plus one.
    pub fn size(&self) -> Size {
        Size::new(self.sum.width(), self.sum.height())
    }

    pub fn sum(&self) -> &Buffer2<u32> {
        &self.sum
    }

    pub fn sqsum(&self) -> &Buffer2<u32> {
        &self.sqsum
    }

    /// Pixel sum over `rect` in image coordinates.
    pub fn rect_sum(&self, rect: Rect) -> u32 {
        let s = &self.sum;
        s[(rect.left, rect.top)]
            .wrapping_sub(s[(rect.right, rect.top)])
            .wrapping_sub(s[(rect.left, rect.bottom)])
            .wrapping_add(s[(rect.right, rect.bottom)])
    }

    /// Builds the derived tables `cascade` reads. Idempotent until the next
    /// [`compute`](Self::compute).
    pub fn prepare(&mut self, cascade: &Cascade) {
        let layout = cascade.layout();
        assert_eq!(
            layout.size(),
            self.size(),
            "cascade compiled for a different integral size"
        );
        let (width, height) = (self.sum.width(), self.sum.height());
        match cascade {
            Cascade::Haar(_) | Cascade::Lbp32(_) => {
                if layout.mode == ScanMode::Interlaced && !self.through_ready {
                    fit(&mut self.through_column, width, height);
                    through_column(&self.sum, &mut self.through_column);
                    self.through_ready = true;
                }
            }
            Cascade::Lbp16(_) => {
                if self.sum16_mode == Some(layout.mode) {
                    return;
                }
                fit(&mut self.sum16, width, height);
                let narrow = |v: u32| v as u16;
                match layout.mode {
                    ScanMode::Progressive => {
                        for (d, &v) in self.sum16.pixels_mut().iter_mut().zip(self.sum.pixels()) {
                            *d = narrow(v);
                        }
                    }
                    ScanMode::Interlaced => through_column_map(&self.sum, &mut self.sum16, narrow),
                }
                self.sum16_mode = Some(layout.mode);
            }
        }
    }

    /// 32-bit table holding feature corners for `layout`.
    ///
    /// Panics if an interlaced table was not [prepared](Self::prepare).
    pub fn features32(&self, layout: SumLayout) -> &Buffer2<u32> {
        match layout.mode {
            ScanMode::Progressive => &self.sum,
            ScanMode::Interlaced => {
                assert!(self.through_ready, "interlaced sum not prepared");
                &self.through_column
            }
        }
    }

    /// 16-bit table holding feature corners for `layout`.
    ///
    /// Panics if it was not [prepared](Self::prepare) for `layout.mode`.
    pub fn features16(&self, layout: SumLayout) -> &Buffer2<u16> {
        assert_eq!(
            self.sum16_mode,
            Some(layout.mode),
            "16-bit sum not prepared for {:?}",
            layout.mode
        );
        &self.sum16
    }
}

/// Reallocates `table` only when its size differs.
fn fit<T: Copy + Default>(table: &mut Buffer2<T>, width: usize, height: usize) {
    if table.width() != width || table.height() != height {
        *table = Buffer2::new_default(width, height);
    }
}

/// Deinterleaves every row of `src`: even columns to the front, odd columns
/// from `(width + 1) / 2`.
pub fn through_column<T: Copy>(src: &Buffer2<T>, dst: &mut Buffer2<T>) {
    through_column_map(src, dst, |v| v);
}

/// [`through_column`] converting each element with `f` on the way.
pub fn through_column_map<S: Copy, T: Copy>(src: &Buffer2<S>, dst: &mut Buffer2<T>, f: impl Fn(S) -> T) {
    assert_eq!(src.width(), dst.width(), "through-column width mismatch");
    assert_eq!(src.height(), dst.height(), "through-column height mismatch");
    let half = src.width().div_ceil(2);
    for y in 0..src.height() {
        let (from, to) = (src.row(y), dst.row_mut(y));
        for (x, &v) in from.iter().enumerate() {
            let column = if x & 1 == 0 { x / 2 } else { x / 2 + half };
            to[column] = f(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::Precision;
    use crate::testing::{random_image, random_lbp, rng};

    fn gray(width: usize, height: usize, f: impl Fn(usize, usize) -> u8) -> Buffer2<u8> {
        let pixels = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Buffer2::new(width, height, pixels)
    }

    #[test]
    fn test_integral_of_ones_counts_pixels() {
        let integral = Integral::new(&gray(5, 4, |_, _| 1));

        assert_eq!(integral.size(), Size::new(6, 5));
        assert_eq!(integral.sum()[(0, 3)], 0);
        assert_eq!(integral.sum()[(3, 0)], 0);
        assert_eq!(integral.sum()[(5, 4)], 20);
        assert_eq!(integral.sum()[(2, 3)], 6);
        assert_eq!(integral.sqsum()[(5, 4)], 20);
    }

    #[test]
    fn test_rect_sum_matches_direct_sum() {
        let image = gray(9, 7, |x, y| ((x * 31 + y * 17) % 256) as u8);
        let integral = Integral::new(&image);
        let rect = Rect::new(2, 1, 7, 6);

        let direct: u32 = (rect.top..rect.bottom)
            .flat_map(|y| (rect.left..rect.right).map(move |x| (x, y)))
            .map(|(x, y)| image[(x, y)] as u32)
            .sum();
        assert_eq!(integral.rect_sum(rect), direct);
    }

    #[test]
    fn test_squared_sum() {
        let integral = Integral::new(&gray(3, 3, |x, _| x as u8 * 10));
        // Each row: 0 + 100 + 400.
        assert_eq!(integral.sqsum()[(3, 3)], 1500);
    }

    #[test]
    fn test_recompute_reuses_size_and_updates_values() {
        let mut integral = Integral::new(&gray(4, 4, |_, _| 1));
        integral.compute(&gray(4, 4, |_, _| 2));
        assert_eq!(integral.sum()[(4, 4)], 32);

        integral.compute(&gray(2, 3, |_, _| 1));
        assert_eq!(integral.size(), Size::new(3, 4));
        assert_eq!(integral.sum()[(2, 3)], 6);
    }

    #[test]
    fn test_prepared_tables_are_reused() {
        let mut rng = rng(0x1e);
        let data = random_lbp(&mut rng, Size::new(9, 9), 2, 2);
        let (width, height) = (21, 17);
        let compile = |mode, precision| {
            let layout = SumLayout::new(Size::new(width + 1, height + 1), mode);
            (Cascade::compile(&data, layout, precision).unwrap(), layout)
        };
        let (lbp16, interlaced) = compile(ScanMode::Interlaced, Precision::Int16);
        let (lbp32, _) = compile(ScanMode::Interlaced, Precision::Float32);
        let (lbp16_progressive, progressive) = compile(ScanMode::Progressive, Precision::Int16);
        assert!(matches!(lbp16, Cascade::Lbp16(_)));
        assert!(matches!(lbp32, Cascade::Lbp32(_)));

        let first = random_image(&mut rng, width, height);
        let second = random_image(&mut rng, width, height);
        let mut integral = Integral::new(&first);
        integral.prepare(&lbp16);
        integral.prepare(&lbp32);
        let table16 = integral.features16(interlaced).pixels().as_ptr();
        let table32 = integral.features32(interlaced).pixels().as_ptr();

        integral.compute(&second);
        integral.prepare(&lbp16);
        integral.prepare(&lbp32);
        assert_eq!(integral.features16(interlaced).pixels().as_ptr(), table16);
        assert_eq!(integral.features32(interlaced).pixels().as_ptr(), table32);

        let mut fresh = Integral::new(&second);
        fresh.prepare(&lbp16);
        fresh.prepare(&lbp32);
        assert_eq!(integral.features16(interlaced), fresh.features16(interlaced));
        assert_eq!(integral.features32(interlaced), fresh.features32(interlaced));

        // Switching the 16-bit layout rewrites the same table.
        integral.prepare(&lbp16_progressive);
        assert_eq!(integral.features16(progressive).pixels().as_ptr(), table16);
        let narrow: Vec<u16> = fresh.sum().pixels().iter().map(|&v| v as u16).collect();
        assert_eq!(integral.features16(progressive).pixels(), &narrow[..]);
    }

    #[test]
    #[should_panic(expected = "interlaced sum not prepared")]
    fn test_recompute_invalidates_prepared_tables() {
        let mut rng = rng(0x1f);
        let data = random_lbp(&mut rng, Size::new(9, 9), 2, 2);
        let layout = SumLayout::new(Size::new(17, 13), ScanMode::Interlaced);
        let cascade = Cascade::compile(&data, layout, Precision::Float32).unwrap();
        let image = random_image(&mut rng, 16, 12);

        let mut integral = Integral::new(&image);
        integral.prepare(&cascade);
        integral.compute(&image);
        integral.features32(layout);
    }

    #[test]
    fn test_through_column_odd_width() {
        let src = Buffer2::new(5, 1, vec![10, 11, 12, 13, 14]);
        let mut dst = Buffer2::new_default(5, 1);
        through_column(&src, &mut dst);
        assert_eq!(dst.pixels(), &[10, 12, 14, 11, 13]);
    }

    #[test]
    fn test_through_column_even_width() {
        let src = Buffer2::new(4, 2, vec![0, 1, 2, 3, 4, 5, 6, 7]);
        let mut dst = Buffer2::new_default(4, 2);
        through_column(&src, &mut dst);
        assert_eq!(dst.pixels(), &[0, 2, 1, 3, 4, 6, 5, 7]);
    }
}
