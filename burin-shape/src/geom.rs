//! The rounding grid and small vector helpers.

use kurbo::{Point, Vec2};

/// Snap a coordinate to the rounding grid (multiples of 1/512).
///
/// All result coordinates of the sweep pass through this; the grid is what
/// keeps intersection handling stable against floating point noise.
#[inline]
pub fn round_coord(x: f64) -> f64 {
    (x * 512.0).round() / 512.0
}

/// Snap both coordinates of a point to the rounding grid.
#[inline]
pub fn round_point(p: Point) -> Point {
    Point::new(round_coord(p.x), round_coord(p.y))
}

/// Scale a value down to the rounding grid (divide by 512).
#[inline]
pub fn half_round(x: f64) -> f64 {
    x / 512.0
}

/// Scale a value up from the rounding grid (multiply by 512).
#[inline]
pub fn ihalf_round(x: f64) -> f64 {
    x * 512.0
}

/// The integer grid key of a rounded point.
///
/// Rounded coordinates are exact multiples of 1/512, so multiplying by 512
/// yields exact integers; two rounded points are equal iff their keys are.
#[inline]
pub(crate) fn grid_key(p: Point) -> (i64, i64) {
    ((p.x * 512.0).round() as i64, (p.y * 512.0).round() as i64)
}

/// Sweep order: by y, then by x.
#[inline]
pub(crate) fn sweep_cmp(a: Point, b: Point) -> std::cmp::Ordering {
    (a.y, a.x)
        .partial_cmp(&(b.y, b.x))
        .unwrap_or(std::cmp::Ordering::Equal)
}

/// Compare two direction vectors in clockwise order around a vertex.
///
/// The order starts at the upward axis and proceeds clockwise on screen
/// (y grows downward): up, right, down, left. Exactly parallel directions
/// compare equal; antiparallel ones always fall in different half-planes.
pub(crate) fn cmp_clockwise(a: Vec2, b: Vec2) -> std::cmp::Ordering {
    let half = |v: Vec2| -> u8 {
        // Right half-plane including straight up.
        if v.x > 0.0 || (v.x == 0.0 && v.y < 0.0) { 0 } else { 1 }
    };
    match half(a).cmp(&half(b)) {
        std::cmp::Ordering::Equal => {
            let cross = a.cross(b);
            // cross > 0: b is clockwise of a, so a sorts first.
            if cross > 0.0 {
                std::cmp::Ordering::Less
            } else if cross < 0.0 {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_snaps_to_grid() {
        assert_eq!(round_coord(0.0), 0.0);
        assert_eq!(round_coord(1.0), 1.0);
        let r = round_coord(0.1234567);
        assert_eq!(r * 512.0, (r * 512.0).round());
        assert!((r - 0.1234567).abs() <= 1.0 / 1024.0);
    }

    #[test]
    fn clockwise_order_from_up() {
        let up = Vec2::new(0.0, -1.0);
        let right = Vec2::new(1.0, 0.0);
        let down = Vec2::new(0.0, 1.0);
        let left = Vec2::new(-1.0, 0.0);
        let mut dirs = vec![left, down, right, up];
        dirs.sort_by(|a, b| cmp_clockwise(*a, *b));
        assert_eq!(dirs, vec![up, right, down, left]);
    }

    #[test]
    fn antiparallel_directions_are_ordered() {
        let a = Vec2::new(1.0, 1.0);
        let b = Vec2::new(-1.0, -1.0);
        assert_ne!(cmp_clockwise(a, b), std::cmp::Ordering::Equal);
    }
}
