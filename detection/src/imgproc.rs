//! Gray-image helpers used to build the detection pyramid.

use common::Buffer2;

use crate::geometry::{Rect, Size};

/// Bilinear resize of `src` into a new `size` image.
///
/// Source and destination pixel centres are aligned, so a same-size resize
/// is an exact copy.
pub fn resize_bilinear(src: &Buffer2<u8>, size: Size) -> Buffer2<u8> {
    let mut dst = Buffer2::new_default(size.width, size.height);
    resize_bilinear_into(src, &mut dst);
    dst
}

/// [`resize_bilinear`] into an existing buffer whose size is the target.
pub fn resize_bilinear_into(src: &Buffer2<u8>, dst: &mut Buffer2<u8>) {
    let (src_width, src_height) = (src.width(), src.height());
    let (dst_width, dst_height) = (dst.width(), dst.height());
    if dst.is_empty() {
        return;
    }
    if src.is_empty() {
        dst.fill(0);
        return;
    }
    if src_width == dst_width && src_height == dst_height {
        dst.pixels_mut().copy_from_slice(src.pixels());
        return;
    }

    let scale_x = src_width as f32 / dst_width as f32;
    let scale_y = src_height as f32 / dst_height as f32;
    let taps = |d: usize, scale: f32, len: usize| {
        let f = ((d as f32 + 0.5) * scale - 0.5).max(0.0);
        let i0 = (f.floor() as usize).min(len - 1);
        let i1 = (i0 + 1).min(len - 1);
        (i0, i1, f - i0 as f32)
    };
    let columns: Vec<(usize, usize, f32)> = (0..dst_width).map(|dx| taps(dx, scale_x, src_width)).collect();

    for dy in 0..dst_height {
        let (y0, y1, wy) = taps(dy, scale_y, src_height);
        let (top_row, bottom_row) = (src.row(y0), src.row(y1));
        let out = dst.row_mut(dy);
        for (value, &(x0, x1, wx)) in out.iter_mut().zip(&columns) {
            let top = top_row[x0] as f32 + (top_row[x1] as f32 - top_row[x0] as f32) * wx;
            let bottom = bottom_row[x0] as f32 + (bottom_row[x1] as f32 - bottom_row[x0] as f32) * wx;
            *value = (top + (bottom - top) * wy).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Stretches the gray levels of `image` so their cumulative histogram is
/// linear.
pub fn equalize_histogram(image: &mut Buffer2<u8>) {
    let total = image.len() as u64;
    if total == 0 {
        return;
    }
    let mut histogram = [0u64; 256];
    for &p in image.pixels() {
        histogram[p as usize] += 1;
    }
    let mut lut = [0u8; 256];
    let mut cumulative = 0u64;
    for (level, &count) in histogram.iter().enumerate() {
        cumulative += count;
        lut[level] = ((cumulative * 255 + total / 2) / total) as u8;
    }
    for p in image.pixels_mut() {
        *p = lut[*p as usize];
    }
}

/// Sets every nonzero pixel to 255.
pub fn binarize(image: &mut Buffer2<u8>) {
    for p in image.pixels_mut() {
        if *p != 0 {
            *p = 255;
        }
    }
}

/// Tight bounding box of the pixels equal to `value` inside `rect`; empty if
/// there are none.
pub fn bounding_rect(image: &Buffer2<u8>, value: u8, rect: Rect) -> Rect {
    let rect = rect.intersection(&Rect::new(0, 0, image.width(), image.height()));
    let mut bounds: Option<Rect> = None;
    for y in rect.top..rect.bottom {
        let row = &image.row(y)[rect.left..rect.right];
        let Some(first) = row.iter().position(|&p| p == value) else {
            continue;
        };
        let last = row.iter().rposition(|&p| p == value).unwrap_or(first);
        let (left, right) = (rect.left + first, rect.left + last + 1);
        bounds = Some(match bounds {
            None => Rect::new(left, y, right, y + 1),
            Some(b) => Rect::new(b.left.min(left), b.top, b.right.max(right), y + 1),
        });
    }
    bounds.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_same_size_is_copy() {
        let src = Buffer2::new(3, 2, vec![1, 2, 3, 4, 5, 6]);
        let dst = resize_bilinear(&src, Size::new(3, 2));
        assert_eq!(dst.pixels(), src.pixels());
    }

    #[test]
    fn test_resize_constant_image_stays_constant() {
        let src = Buffer2::new_filled(17, 11, 93u8);
        let dst = resize_bilinear(&src, Size::new(7, 5));
        assert!(dst.pixels().iter().all(|&p| p == 93));
    }

    #[test]
    fn test_resize_halves_horizontal_ramp() {
        let src = Buffer2::new(4, 1, vec![0, 100, 200, 250]);
        let dst = resize_bilinear(&src, Size::new(2, 1));
        // Centres of 2 destination pixels fall between source pixels 0/1 and 2/3.
        assert_eq!(dst.pixels(), &[50, 225]);
    }

    #[test]
    fn test_resize_empty_target() {
        let src = Buffer2::new_filled(4, 4, 1u8);
        let dst = resize_bilinear(&src, Size::new(0, 3));
        assert!(dst.is_empty());
    }

    #[test]
    fn test_equalize_spreads_two_levels() {
        let mut image = Buffer2::new(4, 1, vec![10, 10, 20, 20]);
        equalize_histogram(&mut image);
        assert_eq!(image.pixels(), &[128, 128, 255, 255]);
    }

    #[test]
    fn test_binarize() {
        let mut image = Buffer2::new(4, 1, vec![0, 1, 128, 255]);
        binarize(&mut image);
        assert_eq!(image.pixels(), &[0, 255, 255, 255]);
    }

    #[test]
    fn test_bounding_rect() {
        let mut image = Buffer2::new_default(8, 6);
        image[(2, 1)] = 255;
        image[(5, 3)] = 255;
        image[(3, 4)] = 255;

        let all = Rect::new(0, 0, 8, 6);
        assert_eq!(bounding_rect(&image, 255, all), Rect::new(2, 1, 6, 5));
        assert_eq!(bounding_rect(&image, 255, Rect::new(3, 0, 8, 6)), Rect::new(3, 3, 6, 5));
        assert!(bounding_rect(&image, 7, all).is_empty());
    }
}
