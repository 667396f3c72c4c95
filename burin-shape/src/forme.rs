//! Conversion between [`Shape`] graphs and [`kurbo::BezPath`] contours.

use crate::shape::Shape;
use kurbo::{BezPath, ParamCurve, ParamCurveArclen, PathEl, PathSeg, Point};

/// A closed contour extracted from a polygon, with its nesting parent.
#[derive(Debug, Clone)]
pub struct Contour {
    /// The contour outline as a closed path.
    pub path: BezPath,
    /// Index of the innermost contour containing this one, `None` for
    /// top-level contours.
    pub parent: Option<usize>,
}

/// Walk the faces of a polygon, returning each contour as a list of edge
/// indices in traversal order. Every edge belongs to exactly one contour.
///
/// At every vertex the walk continues with the clockwise-next edge after
/// the arriving one, which keeps the same filled face on the left.
pub(crate) fn extract_contours(shape: &Shape) -> Vec<Vec<usize>> {
    let mut used = vec![false; shape.num_edges()];
    let mut contours = Vec::new();

    for start in 0..shape.num_edges() {
        if used[start] {
            continue;
        }
        let mut contour = Vec::new();
        let mut cur = start;
        loop {
            used[cur] = true;
            contour.push(cur);
            let v = shape.edge(cur).en;
            if v < 0 {
                break;
            }
            let v = v as usize;
            // Continue with the clockwise-next edge; skip edges that are
            // already used or arrive at the vertex.
            let mut next = shape.cycle_next_at(v, cur);
            let mut guard = shape.point(v).total_degree().max(1);
            while next >= 0
                && (used[next as usize] || shape.edge(next as usize).st != v as i32)
                && guard > 0
            {
                next = shape.cycle_next_at(v, next as usize);
                guard -= 1;
            }
            if next < 0 || used[next as usize] || shape.edge(next as usize).st != v as i32 {
                break;
            }
            cur = next as usize;
            if cur == start {
                break;
            }
        }
        if contour.len() >= 2 {
            contours.push(contour);
        }
    }
    contours
}

fn contour_path(shape: &Shape, contour: &[usize]) -> BezPath {
    let mut path = BezPath::new();
    let first = shape.edge(contour[0]);
    path.move_to(shape.point(first.st as usize).x);
    for &edge in contour {
        let en = shape.edge(edge).en;
        path.line_to(shape.point(en as usize).x);
    }
    path.push(PathEl::ClosePath);
    path
}

/// Signed shoelace sum of a contour; negative for contours whose filled
/// side is the left of each edge (y grows downward).
fn contour_shoelace(shape: &Shape, contour: &[usize]) -> f64 {
    let mut sum = 0.0;
    for &edge in contour {
        let e = shape.edge(edge);
        let a = shape.point(e.st as usize).x;
        let b = shape.point(e.en as usize).x;
        sum += a.x * b.y - b.x * a.y;
    }
    sum
}

impl Shape {
    /// Extract the contours of a polygon as closed paths.
    pub fn convert_to_forme(&self) -> Vec<BezPath> {
        extract_contours(self)
            .iter()
            .map(|contour| contour_path(self, contour))
            .collect()
    }

    /// Extract contours, merging runs of consecutive edges that subdivide
    /// the same original path piece back into single segments.
    ///
    /// Requires back data; without it this is
    /// [`convert_to_forme`](Self::convert_to_forme).
    pub fn convert_to_forme_with_back_data(&self) -> Vec<BezPath> {
        if !self.has_back_data() {
            return self.convert_to_forme();
        }
        extract_contours(self)
            .iter()
            .map(|contour| {
                let mut path = BezPath::new();
                let first = self.edge(contour[0]);
                path.move_to(self.point(first.st as usize).x);
                let mut run: Option<(i32, i32, f64)> = None;
                let mut pending: Option<Point> = None;
                for &edge in contour {
                    let e = self.edge(edge);
                    let en = self.point(e.en as usize).x;
                    let data = self.back_data(edge).copied();
                    let cont = run.zip(data).is_some_and(|((pid, piece, t_end), bd)| {
                        bd.path_id == pid
                            && bd.piece_id == piece
                            && (bd.t_start - t_end).abs() < 1e-9
                    });
                    if !cont {
                        if let Some(p) = pending.take() {
                            path.line_to(p);
                        }
                    }
                    pending = Some(en);
                    run = data.map(|bd| (bd.path_id, bd.piece_id, bd.t_end));
                }
                if let Some(p) = pending {
                    path.line_to(p);
                }
                path.push(PathEl::ClosePath);
                path
            })
            .collect()
    }

    /// Extract contours together with their nesting: every contour records
    /// the innermost other contour containing it, so holes can be matched
    /// to their outlines.
    pub fn convert_to_forme_nested(&self) -> Vec<Contour> {
        let contours = extract_contours(self);
        let paths: Vec<BezPath> = contours
            .iter()
            .map(|contour| contour_path(self, contour))
            .collect();
        let areas: Vec<f64> = contours
            .iter()
            .map(|contour| contour_shoelace(self, contour).abs() * 0.5)
            .collect();

        let mut parents: Vec<Option<usize>> = vec![None; contours.len()];
        for (i, contour) in contours.iter().enumerate() {
            // Probe with the contour's first vertex; the probe winds
            // non-zero against every contour that contains it.
            let probe = self.point(self.edge(contour[0]).st as usize).x;
            let mut best: Option<usize> = None;
            for (j, other) in contours.iter().enumerate() {
                if i == j {
                    continue;
                }
                let winding = contour_winding(self, other, probe);
                if winding != 0 && best.is_none_or(|b| areas[j] < areas[b]) {
                    best = Some(j);
                }
            }
            parents[i] = best;
        }

        paths
            .into_iter()
            .zip(parents)
            .map(|(path, parent)| Contour { path, parent })
            .collect()
    }

    /// Build a raw graph from a path, flattening curves to line segments
    /// within `tolerance`. Subpaths are closed. When `with_back_data` is
    /// set, every edge records `path_id`, the index of the path element it
    /// came from and its parametric range within that element.
    pub fn from_path(
        path: &BezPath,
        tolerance: f64,
        path_id: i32,
        with_back_data: bool,
    ) -> Self {
        let mut shape = Self::new();
        shape.make_back_data(with_back_data);
        let tolerance = tolerance.max(1e-4);

        let mut subpath_start: Option<usize> = None;
        let mut last: Option<(usize, Point)> = None;
        let mut close = |shape: &mut Self,
                         last: &mut Option<(usize, Point)>,
                         start: Option<usize>,
                         piece: i32| {
            if let (Some((from, from_pt)), Some(start)) = (*last, start) {
                if from != start && from_pt != shape.point(start).x {
                    let edge = shape.add_edge(from, start);
                    if let Some(edge) = edge {
                        shape.set_back_data(
                            edge,
                            crate::BackData {
                                path_id,
                                piece_id: piece,
                                t_start: 0.0,
                                t_end: 1.0,
                            },
                        );
                    }
                }
            }
            *last = None;
        };

        for (piece, el) in path.elements().iter().enumerate() {
            let piece_id = piece as i32;
            match *el {
                PathEl::MoveTo(p) => {
                    close(&mut shape, &mut last, subpath_start, piece_id);
                    let id = shape.add_point(p);
                    subpath_start = Some(id);
                    last = Some((id, p));
                }
                PathEl::LineTo(p) => {
                    if let Some((from, _)) = last {
                        let id = endpoint_id(&mut shape, subpath_start, p);
                        if let Some(edge) = shape.add_edge(from, id) {
                            shape.set_back_data(
                                edge,
                                crate::BackData {
                                    path_id,
                                    piece_id,
                                    t_start: 0.0,
                                    t_end: 1.0,
                                },
                            );
                        }
                        last = Some((id, p));
                    }
                }
                PathEl::QuadTo(c, p) => {
                    if let Some((from, from_pt)) = last {
                        let seg = PathSeg::Quad(kurbo::QuadBez::new(from_pt, c, p));
                        last = Some(flatten_seg(
                            &mut shape,
                            seg,
                            from,
                            subpath_start,
                            path_id,
                            piece_id,
                            tolerance,
                        ));
                    }
                }
                PathEl::CurveTo(c1, c2, p) => {
                    if let Some((from, from_pt)) = last {
                        let seg = PathSeg::Cubic(kurbo::CubicBez::new(from_pt, c1, c2, p));
                        last = Some(flatten_seg(
                            &mut shape,
                            seg,
                            from,
                            subpath_start,
                            path_id,
                            piece_id,
                            tolerance,
                        ));
                    }
                }
                PathEl::ClosePath => {
                    close(&mut shape, &mut last, subpath_start, piece_id);
                    subpath_start = None;
                }
            }
        }
        // An unclosed trailing subpath is closed, as fills require.
        close(&mut shape, &mut last, subpath_start, path.elements().len() as i32);
        shape
    }
}

/// A subpath returning exactly to its start must reuse the start point, or
/// the graph ends up with two coincident vertices of unbalanced degree.
fn endpoint_id(shape: &mut Shape, subpath_start: Option<usize>, p: Point) -> usize {
    match subpath_start {
        Some(start) if shape.point(start).x == p => start,
        _ => shape.add_point(p),
    }
}

/// Flatten one curve segment into edges, tracking parametric positions for
/// back data. Returns the last point added.
fn flatten_seg(
    shape: &mut Shape,
    seg: PathSeg,
    from: usize,
    subpath_start: Option<usize>,
    path_id: i32,
    piece_id: i32,
    tolerance: f64,
) -> (usize, Point) {
    let arclen = seg.arclen(0.1);
    let steps = ((0.5 * (arclen / tolerance).sqrt()).ceil() as usize).clamp(1, 256);
    let mut prev = (from, seg.eval(0.0));
    for i in 1..=steps {
        let t0 = (i - 1) as f64 / steps as f64;
        let t1 = i as f64 / steps as f64;
        let p = seg.eval(t1);
        let id = if i == steps {
            endpoint_id(shape, subpath_start, p)
        } else {
            shape.add_point(p)
        };
        if let Some(edge) = shape.add_edge(prev.0, id) {
            shape.set_back_data(
                edge,
                crate::BackData {
                    path_id,
                    piece_id,
                    t_start: t0,
                    t_end: t1,
                },
            );
        }
        prev = (id, p);
    }
    prev
}

/// Winding of a point against a single contour of the shape; the same
/// upward-ray count as [`Shape::winding`], restricted to the contour's
/// edges.
fn contour_winding(shape: &Shape, contour: &[usize], px: Point) -> i32 {
    let mut lr = 0i32;
    let mut ll = 0i32;
    let mut rr = 0i32;
    for &edge in contour {
        let e = shape.edge(edge);
        let ast = shape.point(e.st as usize).x;
        let aen = shape.point(e.en as usize).x;
        if ast.x < aen.x {
            if ast.x > px.x || aen.x < px.x {
                continue;
            }
        } else if ast.x < px.x || aen.x > px.x {
            continue;
        }
        if ast.x == px.x {
            if ast.y >= px.y || aen.x == px.x {
                continue;
            }
            if aen.x < px.x {
                ll += 1;
            } else {
                rr -= 1;
            }
            continue;
        }
        if aen.x == px.x {
            if aen.y >= px.y || ast.x == px.x {
                continue;
            }
            if ast.x < px.x {
                ll -= 1;
            } else {
                rr += 1;
            }
            continue;
        }
        if ast.y.min(aen.y) >= px.y {
            continue;
        }
        let cote = e.dx.cross(px - ast);
        if cote == 0.0 {
            continue;
        }
        if cote < 0.0 {
            if ast.x > px.x {
                lr += 1;
            }
        } else if ast.x < px.x {
            lr -= 1;
        }
    }
    lr + (ll + rr) / 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FillRule;
    use kurbo::Rect;

    fn rect_path(r: Rect) -> BezPath {
        kurbo::Shape::to_path(&r, 0.1)
    }

    #[test]
    fn from_path_round_trips_a_rectangle() {
        let path = rect_path(Rect::new(0.0, 0.0, 10.0, 10.0));
        let raw = Shape::from_path(&path, 0.1, 0, true);
        assert!(raw.is_eulerian());
        let poly = raw.convert_to_shape(FillRule::NonZero, false).unwrap();
        assert_eq!(poly.winding(kurbo::Point::new(5.0, 5.0)).abs(), 1);

        let contours = poly.convert_to_forme();
        assert_eq!(contours.len(), 1);
    }

    #[test]
    fn nested_contours_find_their_parent() {
        let mut path = rect_path(Rect::new(0.0, 0.0, 20.0, 20.0));
        path.extend(rect_path(Rect::new(5.0, 5.0, 15.0, 15.0)));
        let raw = Shape::from_path(&path, 0.1, 0, false);
        let poly = raw.convert_to_shape(FillRule::EvenOdd, false).unwrap();
        let contours = poly.convert_to_forme_nested();
        assert_eq!(contours.len(), 2);
        let inner = contours
            .iter()
            .position(|c| c.parent.is_some())
            .expect("one contour nests in the other");
        let outer = contours[inner].parent.unwrap();
        assert!(contours[outer].parent.is_none());
    }

    #[test]
    fn back_data_merge_restores_long_segments() {
        // A rectangle cut by nothing: the merged forme has one segment per
        // original piece even though flattening may have subdivided.
        let path = rect_path(Rect::new(0.0, 0.0, 10.0, 10.0));
        let raw = Shape::from_path(&path, 0.1, 7, true);
        let poly = raw.convert_to_shape(FillRule::NonZero, false).unwrap();
        let formes = poly.convert_to_forme_with_back_data();
        assert_eq!(formes.len(), 1);
        // MoveTo + 4 lines + close.
        assert!(formes[0].elements().len() <= 6);
    }
}
