//! Sizes and half-open rectangles on the detection grid.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: usize,
    pub height: usize,
}

impl Size {
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Unbounded size, used as the default maximum object size.
    pub const MAX: Size = Size::new(usize::MAX, usize::MAX);

    #[inline]
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    /// `self` scaled by `scale`, rounded to nearest.
    pub fn scaled(&self, scale: f64) -> Size {
        Size::new(
            (self.width as f64 * scale).round() as usize,
            (self.height as f64 * scale).round() as usize,
        )
    }

    /// `true` if both dimensions are `<=` the other's.
    #[inline]
    pub fn fits_in(&self, other: Size) -> bool {
        self.width <= other.width && self.height <= other.height
    }
}

/// Half-open rectangle `[left, right) x [top, bottom)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left: usize,
    pub top: usize,
    pub right: usize,
    pub bottom: usize,
}

impl Rect {
    pub const fn new(left: usize, top: usize, right: usize, bottom: usize) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle covering `[0, size.width) x [0, size.height)`.
    pub const fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.right.saturating_sub(self.left)
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.bottom.saturating_sub(self.top)
    }

    #[inline]
    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn intersection(&self, other: &Rect) -> Rect {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right.min(other.right).max(left);
        let bottom = self.bottom.min(other.bottom).max(top);
        Rect::new(left, top, right, bottom)
    }

    /// Smallest rectangle covering both; an empty operand is ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    /// Moves the rectangle up-left by `(dx, dy)`, clamping at zero.
    pub fn shifted_back(&self, dx: usize, dy: usize) -> Rect {
        Rect::new(
            self.left.saturating_sub(dx),
            self.top.saturating_sub(dy),
            self.right.saturating_sub(dx),
            self.bottom.saturating_sub(dy),
        )
    }

    /// `true` if `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Rect) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }

    /// Every coordinate multiplied by `scale`, rounded to nearest.
    pub fn scaled(&self, scale: f64) -> Rect {
        let s = |v: usize| (v as f64 * scale).round() as usize;
        Rect::new(s(self.left), s(self.top), s(self.right), s(self.bottom))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection_of_disjoint_rects_is_empty() {
        let a = Rect::new(0, 0, 4, 4);
        let b = Rect::new(6, 6, 9, 9);
        assert!(a.intersection(&b).is_empty());
    }

    #[test]
    fn test_intersection_overlap() {
        let a = Rect::new(0, 2, 10, 8);
        let b = Rect::new(3, 0, 12, 5);
        assert_eq!(a.intersection(&b), Rect::new(3, 2, 10, 5));
    }

    #[test]
    fn test_union_skips_empty_rects() {
        let a = Rect::new(2, 3, 6, 5);
        let b = Rect::new(10, 0, 12, 4);
        assert_eq!(a.union(&b), Rect::new(2, 0, 12, 5));
        assert_eq!(Rect::default().union(&a), a);
        assert_eq!(a.union(&Rect::new(40, 40, 40, 50)), a);
    }

    #[test]
    fn test_shifted_back_clamps_at_zero() {
        let r = Rect::new(2, 5, 20, 30);
        assert_eq!(r.shifted_back(3, 3), Rect::new(0, 2, 17, 27));
    }

    #[test]
    fn test_scaled_rounds() {
        let r = Rect::new(1, 2, 3, 4);
        assert_eq!(r.scaled(1.5), Rect::new(2, 3, 5, 6));
        assert_eq!(Size::new(24, 24).scaled(1.1), Size::new(26, 26));
    }

    #[test]
    fn test_contains() {
        let outer = Rect::new(0, 0, 10, 10);
        assert!(outer.contains(&Rect::new(2, 2, 10, 9)));
        assert!(!outer.contains(&Rect::new(2, 2, 11, 9)));
    }
}
