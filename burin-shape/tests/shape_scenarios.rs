//! End-to-end scenarios for the shape engine.

use burin_shape::{BooleanOp, FillRule, JoinType, Shape};
use kurbo::{BezPath, Point, Rect, Shape as _};

fn polygon_from_rect(r: Rect) -> Shape {
    let raw = Shape::from_path(&r.to_path(0.1), 0.1, 0, false);
    raw.convert_to_shape(FillRule::NonZero, false).unwrap()
}

/// Multiset of edges as coordinate pairs, for order-insensitive comparison.
fn edge_set(shape: &Shape) -> Vec<((i64, i64), (i64, i64))> {
    let key = |p: Point| ((p.x * 512.0).round() as i64, (p.y * 512.0).round() as i64);
    let mut edges: Vec<_> = (0..shape.num_edges())
        .map(|i| {
            let e = shape.edge(i);
            (
                key(shape.point(e.st as usize).x),
                key(shape.point(e.en as usize).x),
            )
        })
        .collect();
    edges.sort();
    edges
}

#[test]
fn union_with_shared_edge_dissolves_it() {
    let a = polygon_from_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
    let b = polygon_from_rect(Rect::new(10.0, 0.0, 20.0, 10.0));
    let union = Shape::booleen(&a, &b, BooleanOp::Union, -1).unwrap();

    assert!(union.is_eulerian());
    let bbox = union.bounding_box().unwrap();
    assert_eq!(bbox, Rect::new(0.0, 0.0, 20.0, 10.0));

    // The shared edge at x = 10 cancels; a single outline remains.
    let contours = union.convert_to_forme();
    assert_eq!(contours.len(), 1);
    assert_eq!(union.winding(Point::new(5.0, 5.0)), 1);
    assert_eq!(union.winding(Point::new(15.0, 5.0)), 1);
    assert_eq!(union.winding(Point::new(25.0, 5.0)), 0);
    for i in 0..union.num_edges() {
        let e = union.edge(i);
        let mid = shape_midpoint(&union, i);
        assert_ne!(mid.x, 10.0, "edge {i} lies on the dissolved boundary: {e:?}");
    }
}

fn shape_midpoint(shape: &Shape, edge: usize) -> Point {
    let e = shape.edge(edge);
    let a = shape.point(e.st as usize).x;
    let b = shape.point(e.en as usize).x;
    Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
}

#[test]
fn intersection_of_overlapping_rects() {
    let a = polygon_from_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
    let b = polygon_from_rect(Rect::new(5.0, 0.0, 15.0, 10.0));
    let inter = Shape::booleen(&a, &b, BooleanOp::Intersection, -1).unwrap();
    assert_eq!(inter.bounding_box().unwrap(), Rect::new(5.0, 0.0, 10.0, 10.0));
    assert_eq!(inter.winding(Point::new(7.5, 5.0)), 1);
    assert_eq!(inter.winding(Point::new(2.5, 5.0)), 0);
}

#[test]
fn difference_cuts_a_hole() {
    let a = polygon_from_rect(Rect::new(0.0, 0.0, 20.0, 20.0));
    let b = polygon_from_rect(Rect::new(5.0, 5.0, 15.0, 15.0));
    let diff = Shape::booleen(&a, &b, BooleanOp::Difference, -1).unwrap();
    assert!(diff.is_eulerian());
    assert_eq!(diff.winding(Point::new(2.0, 10.0)), 1);
    assert_eq!(diff.winding(Point::new(10.0, 10.0)), 0);
    let contours = diff.convert_to_forme_nested();
    assert_eq!(contours.len(), 2);
    assert_eq!(contours.iter().filter(|c| c.parent.is_some()).count(), 1);
}

#[test]
fn symmetric_difference_of_overlapping_rects() {
    let a = polygon_from_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
    let b = polygon_from_rect(Rect::new(5.0, 0.0, 15.0, 10.0));
    let xor = Shape::booleen(&a, &b, BooleanOp::SymmetricDifference, -1).unwrap();
    assert_eq!(xor.winding(Point::new(2.5, 5.0)), 1);
    assert_eq!(xor.winding(Point::new(7.5, 5.0)), 0);
    assert_eq!(xor.winding(Point::new(12.5, 5.0)), 1);
}

#[test]
fn bowtie_splits_into_two_triangles() {
    let mut path = BezPath::new();
    path.move_to(Point::new(0.0, 0.0));
    path.line_to(Point::new(10.0, 10.0));
    path.line_to(Point::new(10.0, 0.0));
    path.line_to(Point::new(0.0, 10.0));
    path.close_path();

    let raw = Shape::from_path(&path, 0.1, 0, false);
    let poly = raw.convert_to_shape(FillRule::NonZero, false).unwrap();

    assert_eq!(poly.num_points(), 5);
    assert_eq!(poly.num_edges(), 6);
    assert!(poly.is_eulerian());
    // The centre vertex joins the two triangles.
    let centre = (0..poly.num_points())
        .find(|&i| poly.point(i).x == Point::new(5.0, 5.0))
        .expect("centre vertex exists");
    assert_eq!(poly.point(centre).total_degree(), 4);

    // Half-crossing rule: the centre itself winds zero, the triangle
    // interiors wind one.
    assert_eq!(poly.winding(Point::new(5.0, 5.0)), 0);
    assert_eq!(poly.winding(Point::new(2.5, 5.0)), 1);
    assert_eq!(poly.winding(Point::new(7.5, 5.0)), 1);

    let contours = poly.convert_to_forme();
    assert_eq!(contours.len(), 2);
}

#[test]
fn convert_is_idempotent() {
    let mut path = BezPath::new();
    path.move_to(Point::new(0.0, 0.0));
    path.line_to(Point::new(10.0, 10.0));
    path.line_to(Point::new(10.0, 0.0));
    path.line_to(Point::new(0.0, 10.0));
    path.close_path();
    let raw = Shape::from_path(&path, 0.1, 0, false);
    let once = raw.convert_to_shape(FillRule::NonZero, false).unwrap();
    let twice = once.convert_to_shape(FillRule::NonZero, false).unwrap();
    assert_eq!(edge_set(&once), edge_set(&twice));
}

#[test]
fn winding_consistency_along_edges() {
    let a = polygon_from_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
    let b = polygon_from_rect(Rect::new(5.0, 5.0, 15.0, 15.0));
    let union = Shape::booleen(&a, &b, BooleanOp::Union, -1).unwrap();
    let windings = union.get_windings(|_| None);
    for (i, &(le, ri)) in windings.iter().enumerate() {
        assert_eq!(ri, le - union.edge(i).weight, "edge {i}");
    }
}

#[test]
fn offset_rectangle_round_join() {
    let poly = polygon_from_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
    let raw = poly.make_offset(2.0, JoinType::Round, 4.0).unwrap();
    let out = raw.convert_to_shape(FillRule::Positive, false).unwrap();
    assert!(out.is_eulerian());
    let bbox = out.bounding_box().unwrap();
    assert!((bbox.x0 + 2.0).abs() < 0.01);
    assert!((bbox.y0 + 2.0).abs() < 0.01);
    assert!((bbox.x1 - 12.0).abs() < 0.01);
    assert!((bbox.y1 - 12.0).abs() < 0.01);
    // No self-intersections survive conversion: a single outline.
    assert_eq!(out.convert_to_forme().len(), 1);
}

#[test]
fn non_eulerian_input_is_rejected() {
    let mut shape = Shape::new();
    let a = shape.add_point(Point::new(0.0, 0.0));
    let b = shape.add_point(Point::new(10.0, 0.0));
    shape.add_edge(a, b).unwrap();
    assert!(shape.convert_to_shape(FillRule::NonZero, false).is_err());
    // The "just don't" rule tolerates open graphs.
    assert!(shape.convert_to_shape(FillRule::JustDont, false).is_ok());
}

#[test]
fn empty_input_produces_empty_polygon() {
    let shape = Shape::new();
    let out = shape.convert_to_shape(FillRule::NonZero, false).unwrap();
    assert_eq!(out.num_points(), 0);
    assert_eq!(out.num_edges(), 0);
}

#[test]
fn slice_subdivides_without_keeping_cut_edges() {
    let a = polygon_from_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
    // A vertical cut line through the middle.
    let mut cut = Shape::new();
    let p0 = cut.add_point(Point::new(5.0, -5.0));
    let p1 = cut.add_point(Point::new(5.0, 15.0));
    cut.add_edge(p0, p1).unwrap();

    let sliced = Shape::booleen(&a, &cut, BooleanOp::Slice, 99).unwrap();
    assert!(sliced.is_eulerian());
    // The outline gained vertices at (5, 0) and (5, 10) but no new edges
    // through the interior.
    assert!(
        (0..sliced.num_points()).any(|i| sliced.point(i).x == Point::new(5.0, 0.0)),
        "top edge subdivided"
    );
    assert!(
        (0..sliced.num_points()).any(|i| sliced.point(i).x == Point::new(5.0, 10.0)),
        "bottom edge subdivided"
    );
    assert_eq!(sliced.winding(Point::new(2.5, 5.0)), 1);
}

#[test]
fn cut_duplicates_the_cutting_edges() {
    let a = polygon_from_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
    let mut cut = Shape::new();
    let p0 = cut.add_point(Point::new(5.0, -5.0));
    let p1 = cut.add_point(Point::new(5.0, 15.0));
    cut.add_edge(p0, p1).unwrap();

    let result = Shape::booleen(&a, &cut, BooleanOp::Cut, 99).unwrap();
    assert!(result.is_eulerian());
    // Every edge along x = 5 appears twice, once per direction.
    let mut on_cut = 0;
    for i in 0..result.num_edges() {
        if shape_midpoint(&result, i).x == 5.0 {
            on_cut += 1;
        }
    }
    assert!(on_cut >= 2);
    assert_eq!(on_cut % 2, 0, "cut edges come in oriented pairs");
}
