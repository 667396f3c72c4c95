//! Contour offsetting and tweak displacement.
//!
//! Both produce raw graphs that generally self-intersect; callers feed the
//! result back through [`Shape::convert_to_shape`] to obtain a clean
//! polygon.

use crate::forme::extract_contours;
use crate::shape::{BackData, Shape, ShapeKind};
use crate::ShapeError;
use kurbo::{Point, Vec2};

/// How consecutive offset segments are connected at a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// A straight line between the two offset endpoints.
    Straight,
    /// A circular arc around the vertex, approximated by short segments.
    Round,
    /// A miter, falling back to a straight join past the miter limit.
    Miter,
}

/// The displacement modes of [`Shape::make_tweak`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TweakMode {
    /// Offset along the outward normal, scaled by the profile.
    Grow,
    /// Translate along a fixed vector, scaled by the profile.
    Push,
    /// Displace away from the tweak centre, scaled by the profile.
    Repel,
    /// Displace along the normal by a deterministic jitter.
    Roughen,
}

/// Maximum angular step when approximating a round join.
const ROUND_STEP: f64 = 0.2;

/// The outward normal of a contour edge, given the inside lies on the
/// traversal left.
fn outward_normal(d: Vec2) -> Vec2 {
    let len = d.hypot();
    Vec2::new(-d.y, d.x) / len
}

struct OffsetBuilder {
    shape: Shape,
    join: JoinType,
    miter_limit: f64,
}

impl OffsetBuilder {
    fn new(want_back: bool, join: JoinType, miter_limit: f64) -> Self {
        let mut shape = Shape::new();
        shape.make_back_data(want_back);
        Self {
            shape,
            join,
            miter_limit,
        }
    }

    fn emit(&mut self, points: &[Point], backs: &[Option<BackData>]) {
        if points.len() < 2 {
            return;
        }
        let ids: Vec<usize> = points.iter().map(|&p| self.shape.add_point(p)).collect();
        for i in 0..ids.len() {
            let j = (i + 1) % ids.len();
            if let Some(edge) = self.shape.add_edge(ids[i], ids[j]) {
                if let Some(Some(data)) = backs.get(i) {
                    self.shape.set_back_data(edge, *data);
                }
            }
        }
    }

    /// Join from offset point `a` to `b` around vertex `p`, where both lie
    /// at distance `|dec|` from `p`. Returns the intermediate points.
    fn join_points(&self, p: Point, a: Point, b: Point, dec: f64) -> Vec<Point> {
        let va = a - p;
        let vb = b - p;
        match self.join {
            JoinType::Straight => Vec::new(),
            JoinType::Round => {
                let dot = (va.dot(vb) / (va.hypot() * vb.hypot())).clamp(-1.0, 1.0);
                let angle = dot.acos();
                let steps = (angle / ROUND_STEP).ceil() as usize;
                if steps < 2 {
                    return Vec::new();
                }
                let sign = if va.cross(vb) >= 0.0 { 1.0 } else { -1.0 };
                let step = sign * angle / steps as f64;
                let (sin, cos) = step.sin_cos();
                let mut v = va;
                let mut out = Vec::with_capacity(steps - 1);
                for _ in 1..steps {
                    v = Vec2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos);
                    out.push(p + v);
                }
                out
            }
            JoinType::Miter => {
                // Intersect the two offset lines; the join degenerates to a
                // straight one past the miter limit.
                let da = Vec2::new(-va.y, va.x);
                let db = Vec2::new(-vb.y, vb.x);
                let denom = da.cross(db);
                if denom.abs() < 1e-12 {
                    return Vec::new();
                }
                let t = (b - a).cross(db) / denom;
                let m = a + t * da;
                if (m - p).hypot() <= self.miter_limit * dec.abs() {
                    vec![m]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

impl Shape {
    /// Offset every contour of a polygon by `dec` (positive grows the fill,
    /// negative shrinks it), connecting segments with the given join.
    ///
    /// The result is a raw graph that usually self-intersects near concave
    /// corners; convert it to obtain the final polygon.
    pub fn make_offset(
        &self,
        dec: f64,
        join: JoinType,
        miter_limit: f64,
    ) -> Result<Self, ShapeError> {
        self.expect_polygon()?;
        if dec == 0.0 {
            return Err(ShapeError::NothingToDo);
        }

        let mut builder = OffsetBuilder::new(self.has_back_data(), join, miter_limit);
        for contour in extract_contours(self) {
            let n = contour.len();
            if n < 2 {
                continue;
            }
            let mut points = Vec::new();
            let mut backs = Vec::new();
            for i in 0..n {
                let edge = contour[i];
                let next = contour[(i + 1) % n];
                let e = self.edge(edge);
                let st = self.point(e.st as usize).x;
                let en = self.point(e.en as usize).x;
                let normal = outward_normal(e.dx);
                let data = self.back_data(edge).copied();

                points.push(st + dec * normal);
                backs.push(data);
                points.push(en + dec * normal);
                backs.push(data.map(|bd| BackData {
                    t_start: bd.t_end,
                    ..bd
                }));

                // Join towards the next edge's offset start.
                let ne = self.edge(next);
                let vertex = en;
                let next_start = vertex + dec * outward_normal(ne.dx);
                let turn = e.dx.cross(ne.dx);
                if turn * dec.signum() < 0.0 {
                    let a = en + dec * normal;
                    for jp in builder.join_points(vertex, a, next_start, dec) {
                        points.push(jp);
                        backs.push(data.map(|bd| BackData {
                            t_start: bd.t_end,
                            ..bd
                        }));
                    }
                }
            }
            builder.emit(&points, &backs);
        }

        let mut result = builder.shape;
        result.set_kind(ShapeKind::Graph);
        Ok(result)
    }

    /// Displace every contour of a polygon according to a tweak mode.
    ///
    /// The displacement magnitude is `dec` scaled by a smooth radial profile
    /// centred on `center` with the given `radius` (a radius of zero applies
    /// the full displacement everywhere). Like
    /// [`make_offset`](Self::make_offset) this produces a raw graph.
    pub fn make_tweak(
        &self,
        mode: TweakMode,
        dec: f64,
        join: JoinType,
        miter_limit: f64,
        center: Point,
        vector: Vec2,
        radius: f64,
    ) -> Result<Self, ShapeError> {
        self.expect_polygon()?;
        if dec == 0.0 {
            return Err(ShapeError::NothingToDo);
        }

        let profile = |p: Point| -> f64 {
            if radius <= 0.0 {
                return 1.0;
            }
            let d = (p - center).hypot() / radius;
            if d >= 1.0 {
                0.0
            } else {
                // Smoothstep falloff from the centre to the radius.
                let x = 1.0 - d;
                x * x * (3.0 - 2.0 * x)
            }
        };

        let displace = |p: Point, normal: Vec2, edge_index: usize| -> Vec2 {
            let amount = dec * profile(p);
            match mode {
                TweakMode::Grow => amount * normal,
                TweakMode::Push => amount * vector / vector.hypot().max(1e-12),
                TweakMode::Repel => {
                    let away = p - center;
                    let len = away.hypot();
                    if len < 1e-12 {
                        Vec2::ZERO
                    } else {
                        amount * away / len
                    }
                }
                TweakMode::Roughen => {
                    // Deterministic jitter derived from the position and
                    // edge index, in [-1, 1].
                    let h = (p.x * 511.0 + p.y * 127.0 + edge_index as f64 * 31.0).sin();
                    amount * h * normal
                }
            }
        };

        let mut builder = OffsetBuilder::new(self.has_back_data(), join, miter_limit);
        for contour in extract_contours(self) {
            let n = contour.len();
            if n < 2 {
                continue;
            }
            let mut points = Vec::new();
            let mut backs = Vec::new();
            for i in 0..n {
                let edge = contour[i];
                let e = self.edge(edge);
                let st = self.point(e.st as usize).x;
                let en = self.point(e.en as usize).x;
                let normal = outward_normal(e.dx);
                let data = self.back_data(edge).copied();
                points.push(st + displace(st, normal, edge));
                backs.push(data);
                points.push(en + displace(en, normal, edge));
                backs.push(data.map(|bd| BackData {
                    t_start: bd.t_end,
                    ..bd
                }));
            }
            builder.emit(&points, &backs);
        }

        let mut result = builder.shape;
        result.set_kind(ShapeKind::Graph);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FillRule;

    fn unit_square_polygon() -> Shape {
        let mut shape = Shape::new();
        let a = shape.add_point(Point::new(0.0, 0.0));
        let b = shape.add_point(Point::new(0.0, 10.0));
        let c = shape.add_point(Point::new(10.0, 10.0));
        let d = shape.add_point(Point::new(10.0, 0.0));
        shape.add_edge(a, b).unwrap();
        shape.add_edge(b, c).unwrap();
        shape.add_edge(c, d).unwrap();
        shape.add_edge(d, a).unwrap();
        shape.sort_edges();
        shape.force_to_polygon();
        shape
    }

    #[test]
    fn zero_offset_is_nothing_to_do() {
        let square = unit_square_polygon();
        assert_eq!(
            square.make_offset(0.0, JoinType::Round, 4.0).unwrap_err(),
            ShapeError::NothingToDo
        );
    }

    #[test]
    fn offset_rectangle_grows_bbox() {
        let square = unit_square_polygon();
        let raw = square.make_offset(2.0, JoinType::Round, 4.0).unwrap();
        let poly = raw.convert_to_shape(FillRule::Positive, false).unwrap();
        assert!(poly.is_eulerian());
        let bbox = poly.bounding_box().unwrap();
        assert!((bbox.x0 - -2.0).abs() < 0.01, "x0 = {}", bbox.x0);
        assert!((bbox.y0 - -2.0).abs() < 0.01, "y0 = {}", bbox.y0);
        assert!((bbox.x1 - 12.0).abs() < 0.01, "x1 = {}", bbox.x1);
        assert!((bbox.y1 - 12.0).abs() < 0.01, "y1 = {}", bbox.y1);
    }

    #[test]
    fn inset_rectangle_shrinks_bbox() {
        let square = unit_square_polygon();
        let raw = square.make_offset(-2.0, JoinType::Miter, 4.0).unwrap();
        let poly = raw.convert_to_shape(FillRule::Positive, false).unwrap();
        let bbox = poly.bounding_box().unwrap();
        assert!((bbox.x0 - 2.0).abs() < 0.01);
        assert!((bbox.x1 - 8.0).abs() < 0.01);
    }

    #[test]
    fn grow_tweak_expands() {
        let square = unit_square_polygon();
        let raw = square
            .make_tweak(
                TweakMode::Grow,
                1.0,
                JoinType::Straight,
                4.0,
                Point::new(5.0, 5.0),
                Vec2::ZERO,
                0.0,
            )
            .unwrap();
        let poly = raw.convert_to_shape(FillRule::Positive, false).unwrap();
        let bbox = poly.bounding_box().unwrap();
        assert!(bbox.x0 < 0.0 && bbox.x1 > 10.0);
    }
}
