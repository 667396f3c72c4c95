//! Integer device-pixel rectangles and regions.

use kurbo::{Point, Rect};

/// A point in integer device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct IntPoint {
    /// Horizontal coordinate.
    pub x: i32,
    /// Vertical coordinate.
    pub y: i32,
}

impl IntPoint {
    /// Construct from coordinates.
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// An axis-aligned rectangle in integer device pixels, closed on the
/// min side and open on the max side. Always non-degenerate when produced
/// by the constructors returning `Option`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntRect {
    /// Left edge.
    pub x0: i32,
    /// Top edge.
    pub y0: i32,
    /// Right edge (exclusive).
    pub x1: i32,
    /// Bottom edge (exclusive).
    pub y1: i32,
}

impl IntRect {
    /// A rectangle large enough to contain any drawing, without risking
    /// arithmetic overflow.
    pub const INFINITE: Self = Self {
        x0: -(1 << 30),
        y0: -(1 << 30),
        x1: 1 << 30,
        y1: 1 << 30,
    };

    /// Construct from edges; callers must pass `x0 <= x1`, `y0 <= y1`.
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        debug_assert!(x0 <= x1 && y0 <= y1, "degenerate IntRect");
        Self { x0, y0, x1, y1 }
    }

    /// Construct from position and size.
    pub fn from_xywh(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self::new(x, y, x + w, y + h)
    }

    /// Width in pixels.
    pub fn width(&self) -> i32 {
        self.x1 - self.x0
    }

    /// Height in pixels.
    pub fn height(&self) -> i32 {
        self.y1 - self.y0
    }

    /// Area in pixels.
    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    /// Top-left corner.
    pub fn min(&self) -> IntPoint {
        IntPoint::new(self.x0, self.y0)
    }

    /// Centre point, rounded down.
    pub fn midpoint(&self) -> IntPoint {
        IntPoint::new(
            self.x0 + self.width() / 2,
            self.y0 + self.height() / 2,
        )
    }

    /// Whether the rectangle has zero area.
    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    /// Whether `other` lies entirely within this rectangle.
    pub fn contains(&self, other: &Self) -> bool {
        self.x0 <= other.x0 && self.y0 <= other.y0 && self.x1 >= other.x1 && self.y1 >= other.y1
    }

    /// Whether the point lies within this rectangle.
    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.x0 as f64 && p.x < self.x1 as f64 && p.y >= self.y0 as f64 && p.y < self.y1 as f64
    }

    /// Whether the rectangles overlap.
    pub fn intersects(&self, other: &Self) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.y0 < other.y1 && other.y0 < self.y1
    }

    /// Intersection, `None` when empty.
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let r = Self {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        };
        (!r.is_empty()).then_some(r)
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Grow on all sides.
    pub fn expanded(&self, by: i32) -> Self {
        Self {
            x0: self.x0 - by,
            y0: self.y0 - by,
            x1: self.x1 + by,
            y1: self.y1 + by,
        }
    }

    /// Grow or shrink so that each dimension is multiplied by `scale`,
    /// keeping the centre.
    pub fn expanded_by_scale(&self, scale: f64) -> Self {
        let fraction = (scale - 1.0) / 2.0;
        let dx = (self.width() as f64 * fraction).round() as i32;
        let dy = (self.height() as f64 * fraction).round() as i32;
        Self {
            x0: self.x0 - dx,
            y0: self.y0 - dy,
            x1: self.x1 + dx,
            y1: self.y1 + dy,
        }
    }

    /// Expand just enough to contain the given point.
    pub fn expanded_to(&self, p: IntPoint) -> Self {
        Self {
            x0: self.x0.min(p.x),
            y0: self.y0.min(p.y),
            x1: self.x1.max(p.x + 1),
            y1: self.y1.max(p.y + 1),
        }
    }

    /// Translate by integer offsets.
    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self {
            x0: self.x0 + dx,
            y0: self.y0 + dy,
            x1: self.x1 + dx,
            y1: self.y1 + dy,
        }
    }

    /// The point on the rectangle's boundary nearest to `p`.
    pub fn nearest_edge_point(&self, p: IntPoint) -> IntPoint {
        IntPoint::new(
            p.x.clamp(self.x0, self.x1 - 1),
            p.y.clamp(self.y0, self.y1 - 1),
        )
    }

    /// Convert to a float rectangle.
    pub fn to_rect(&self) -> Rect {
        Rect::new(self.x0 as f64, self.y0 as f64, self.x1 as f64, self.y1 as f64)
    }

    /// Round a float rectangle outwards to pixels; `None` when degenerate
    /// or non-finite.
    pub fn round_outwards(r: Rect) -> Option<Self> {
        if !r.x0.is_finite() || !r.y0.is_finite() || !r.x1.is_finite() || !r.y1.is_finite() {
            return None;
        }
        let out = Self {
            x0: r.x0.floor().max(Self::INFINITE.x0 as f64) as i32,
            y0: r.y0.floor().max(Self::INFINITE.y0 as f64) as i32,
            x1: r.x1.ceil().min(Self::INFINITE.x1 as f64) as i32,
            y1: r.y1.ceil().min(Self::INFINITE.y1 as f64) as i32,
        };
        (!out.is_empty()).then_some(out)
    }
}

/// Union of the two optional rectangles.
pub(crate) fn opt_union(a: Option<IntRect>, b: Option<IntRect>) -> Option<IntRect> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.union(&b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Intersection of the two optional rectangles (`None` is empty).
pub(crate) fn opt_intersect(a: Option<IntRect>, b: Option<IntRect>) -> Option<IntRect> {
    a.and_then(|a| b.and_then(|b| a.intersect(&b)))
}

/// A set of pixels stored as disjoint rectangles.
///
/// Keeps track of cache clean areas and pattern dirty areas. The rectangle
/// list stays disjoint under all operations; it is not kept minimal.
#[derive(Debug, Clone, Default)]
pub struct Region {
    rects: Vec<IntRect>,
}

impl Region {
    /// The empty region.
    pub fn new() -> Self {
        Self::default()
    }

    /// A region covering one rectangle.
    pub fn from_rect(rect: IntRect) -> Self {
        Self { rects: vec![rect] }
    }

    /// Whether no pixels are covered.
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// The disjoint rectangles making up the region.
    pub fn rects(&self) -> &[IntRect] {
        &self.rects
    }

    /// Total number of covered pixels.
    pub fn area(&self) -> i64 {
        self.rects.iter().map(IntRect::area).sum()
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.rects.clear();
    }

    /// Add a rectangle to the region.
    pub fn add(&mut self, rect: IntRect) {
        if rect.is_empty() {
            return;
        }
        // Keep disjointness by only adding the parts not already covered.
        let mut missing = vec![rect];
        for existing in &self.rects {
            let mut next = Vec::with_capacity(missing.len());
            for part in missing {
                subtract_rect(&part, existing, &mut next);
            }
            missing = next;
            if missing.is_empty() {
                return;
            }
        }
        self.rects.extend(missing);
    }

    /// Remove a rectangle from the region.
    pub fn subtract(&mut self, rect: &IntRect) {
        let mut out = Vec::with_capacity(self.rects.len());
        for existing in &self.rects {
            subtract_rect(existing, rect, &mut out);
        }
        self.rects = out;
    }

    /// Drop everything outside the given rectangle.
    pub fn intersect_with(&mut self, rect: &IntRect) {
        self.rects = self
            .rects
            .iter()
            .filter_map(|r| r.intersect(rect))
            .collect();
    }

    /// Translate the whole region.
    pub fn translate(&mut self, dx: i32, dy: i32) {
        for r in &mut self.rects {
            *r = r.translated(dx, dy);
        }
    }

    /// Whether the rectangle is fully covered.
    pub fn contains(&self, rect: &IntRect) -> bool {
        let mut missing = vec![*rect];
        for existing in &self.rects {
            let mut next = Vec::with_capacity(missing.len());
            for part in missing {
                subtract_rect(&part, existing, &mut next);
            }
            missing = next;
            if missing.is_empty() {
                return true;
            }
        }
        missing.is_empty()
    }

    /// The parts of `rect` not covered by the region.
    pub fn uncovered(&self, rect: IntRect) -> Vec<IntRect> {
        let mut missing = vec![rect];
        for existing in &self.rects {
            let mut next = Vec::with_capacity(missing.len());
            for part in missing {
                subtract_rect(&part, existing, &mut next);
            }
            missing = next;
            if missing.is_empty() {
                break;
            }
        }
        missing
    }
}

/// Append `a - b` (up to four rectangles) to `out`.
fn subtract_rect(a: &IntRect, b: &IntRect, out: &mut Vec<IntRect>) {
    let Some(overlap) = a.intersect(b) else {
        out.push(*a);
        return;
    };
    if overlap.y0 > a.y0 {
        out.push(IntRect::new(a.x0, a.y0, a.x1, overlap.y0));
    }
    if overlap.y1 < a.y1 {
        out.push(IntRect::new(a.x0, overlap.y1, a.x1, a.y1));
    }
    if overlap.x0 > a.x0 {
        out.push(IntRect::new(a.x0, overlap.y0, overlap.x0, overlap.y1));
    }
    if overlap.x1 < a.x1 {
        out.push(IntRect::new(overlap.x1, overlap.y0, a.x1, overlap.y1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_basics() {
        let r = IntRect::from_xywh(1, 2, 10, 20);
        assert_eq!(r.width(), 10);
        assert_eq!(r.height(), 20);
        assert_eq!(r.area(), 200);
        assert!(r.intersects(&IntRect::new(5, 5, 30, 30)));
        assert_eq!(
            r.intersect(&IntRect::new(5, 5, 30, 30)),
            Some(IntRect::new(5, 5, 11, 22))
        );
        assert!(r.intersect(&IntRect::new(100, 100, 101, 101)).is_none());
    }

    #[test]
    fn round_outwards_rejects_degenerate() {
        assert!(IntRect::round_outwards(Rect::new(0.0, 0.0, 0.0, 0.0)).is_none());
        assert_eq!(
            IntRect::round_outwards(Rect::new(0.2, 0.7, 3.1, 4.0)),
            Some(IntRect::new(0, 0, 4, 4))
        );
    }

    #[test]
    fn region_add_and_subtract() {
        let mut region = Region::new();
        region.add(IntRect::new(0, 0, 10, 10));
        region.add(IntRect::new(5, 5, 15, 15));
        assert_eq!(region.area(), 100 + 75);
        assert!(region.contains(&IntRect::new(0, 0, 10, 10)));
        assert!(region.contains(&IntRect::new(12, 12, 15, 15)));
        assert!(!region.contains(&IntRect::new(12, 0, 15, 3)));

        region.subtract(&IntRect::new(0, 0, 15, 15));
        assert!(region.is_empty());
    }

    #[test]
    fn region_uncovered_reports_holes() {
        let mut region = Region::new();
        region.add(IntRect::new(0, 0, 10, 10));
        let holes = region.uncovered(IntRect::new(0, 0, 20, 10));
        assert_eq!(holes.iter().map(IntRect::area).sum::<i64>(), 100);
    }

    #[test]
    fn region_stays_disjoint() {
        let mut region = Region::new();
        region.add(IntRect::new(0, 0, 10, 10));
        region.add(IntRect::new(0, 0, 10, 10));
        assert_eq!(region.area(), 100);
        for (i, a) in region.rects().iter().enumerate() {
            for b in &region.rects()[i + 1..] {
                assert!(!a.intersects(b));
            }
        }
    }
}
