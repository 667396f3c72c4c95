//! Update-pass behaviour of the drawing tree.

use burin_display::{
    Color, Drawing, DrawingOptions, Filter, FilterInfo, IntRect, ItemId, RenderContext,
    ShapeStyle, StateFlags,
};
use kurbo::{Affine, BezPath, Rect};
use std::sync::Arc;

fn rect_path(r: Rect) -> Arc<BezPath> {
    let mut path = BezPath::new();
    path.move_to((r.x0, r.y0));
    path.line_to((r.x1, r.y0));
    path.line_to((r.x1, r.y1));
    path.line_to((r.x0, r.y1));
    path.close_path();
    Arc::new(path)
}

fn add_rect_shape(drawing: &mut Drawing, parent: ItemId, r: Rect) -> ItemId {
    let shape = drawing.new_shape();
    drawing.set_path(shape, Some(rect_path(r)));
    drawing.set_style(shape, ShapeStyle::filled(Color::BLACK));
    drawing.append_child(parent, shape);
    shape
}

fn full_update(drawing: &mut Drawing) {
    drawing
        .update(
            IntRect::INFINITE,
            Affine::IDENTITY,
            StateFlags::ALL,
            StateFlags::empty(),
        )
        .unwrap();
}

#[test]
fn group_drawbox_is_union_of_children() {
    let mut drawing = Drawing::new(DrawingOptions::default());
    let root = drawing.new_group();
    drawing.set_root(Some(root));
    let group = drawing.new_group();
    drawing.append_child(root, group);
    let a = add_rect_shape(&mut drawing, group, Rect::new(0.0, 0.0, 10.0, 10.0));
    let b = add_rect_shape(&mut drawing, group, Rect::new(20.0, 5.0, 30.0, 25.0));
    full_update(&mut drawing);

    let da = drawing.drawbox(a).unwrap();
    let db = drawing.drawbox(b).unwrap();
    assert_eq!(drawing.drawbox(group), Some(da.union(&db)));
}

#[test]
fn update_is_idempotent() {
    let mut drawing = Drawing::new(DrawingOptions::default());
    let root = drawing.new_group();
    drawing.set_root(Some(root));
    let a = add_rect_shape(&mut drawing, root, Rect::new(0.0, 0.0, 10.0, 10.0));
    let group = drawing.new_group();
    drawing.append_child(root, group);
    let b = add_rect_shape(&mut drawing, group, Rect::new(5.0, 5.0, 50.0, 50.0));
    drawing.set_transform(group, Affine::translate((3.0, 4.0)));

    full_update(&mut drawing);
    let snapshot = |d: &Drawing| {
        [root, a, group, b].map(|id| (d.bbox(id), d.drawbox(id), d.ctm(id)))
    };
    let first = snapshot(&drawing);
    full_update(&mut drawing);
    assert_eq!(first, snapshot(&drawing));
}

#[test]
fn transform_moves_the_bbox() {
    let mut drawing = Drawing::new(DrawingOptions::default());
    let root = drawing.new_group();
    drawing.set_root(Some(root));
    let shape = add_rect_shape(&mut drawing, root, Rect::new(0.0, 0.0, 10.0, 10.0));
    full_update(&mut drawing);
    assert_eq!(drawing.bbox(shape), Some(IntRect::new(0, 0, 10, 10)));

    drawing.set_transform(shape, Affine::translate((100.0, 0.0)));
    full_update(&mut drawing);
    assert_eq!(drawing.bbox(shape), Some(IntRect::new(100, 0, 110, 10)));
}

#[test]
fn small_items_are_not_cache_candidates() {
    let mut drawing = Drawing::new(DrawingOptions {
        cache_budget: 1 << 30,
        ..DrawingOptions::default()
    });
    drawing.set_cache_limit(Some(IntRect::new(-1000, -1000, 1000, 1000)));
    let root = drawing.new_group();
    drawing.set_root(Some(root));
    // 100x100 pixels: a score of 10 000, well under the threshold.
    let small = add_rect_shape(&mut drawing, root, Rect::new(0.0, 0.0, 100.0, 100.0));
    full_update(&mut drawing);
    assert!(!drawing.is_cached(small));
}

#[test]
fn cache_budget_limits_cached_items() {
    // Two 300x300 shapes score 90 000 each and want 360 000 bytes each.
    let mut drawing = Drawing::new(DrawingOptions {
        cache_budget: 360_000,
        ..DrawingOptions::default()
    });
    drawing.set_cache_limit(Some(IntRect::new(-1000, -1000, 1000, 1000)));
    let root = drawing.new_group();
    drawing.set_root(Some(root));
    let a = add_rect_shape(&mut drawing, root, Rect::new(0.0, 0.0, 300.0, 300.0));
    let b = add_rect_shape(&mut drawing, root, Rect::new(300.0, 0.0, 600.0, 300.0));
    full_update(&mut drawing);

    let cached = [a, b].iter().filter(|&&id| drawing.is_cached(id)).count();
    assert_eq!(cached, 1, "exactly one shape fits the budget");

    // Doubling the budget fits both.
    drawing.set_cache_budget(720_000);
    assert_eq!(
        [a, b].iter().filter(|&&id| drawing.is_cached(id)).count(),
        2
    );
}

struct SixfoldFilter;

impl Filter for SixfoldFilter {
    fn render(
        &self,
        _info: &FilterInfo,
        _dc: &mut dyn burin_display::DrawingContext,
        _background: Option<&burin_display::Surface>,
        _rc: &RenderContext,
    ) {
    }

    fn area_enlarge(&self, area: IntRect, _info: &FilterInfo) -> IntRect {
        area
    }

    fn filter_effect_area(&self, item_bbox: Option<Rect>) -> Option<Rect> {
        item_bbox
    }

    fn complexity(&self, _ctm: Affine) -> f64 {
        6.0
    }
}

#[test]
fn filtered_items_are_cached_persistently() {
    let mut drawing = Drawing::new(DrawingOptions::default());
    drawing.set_cache_limit(Some(IntRect::new(-1000, -1000, 1000, 1000)));
    let root = drawing.new_group();
    drawing.set_root(Some(root));
    let shape = add_rect_shape(&mut drawing, root, Rect::new(0.0, 0.0, 100.0, 100.0));
    drawing.set_item_bounds(shape, Some(Rect::new(0.0, 0.0, 100.0, 100.0)));
    drawing.set_filter_renderer(shape, Some(Box::new(SixfoldFilter)));
    full_update(&mut drawing);
    // The forced cache appears once the drawbox is known, i.e. from the
    // second update pass on.
    drawing
        .update(
            IntRect::INFINITE,
            Affine::IDENTITY,
            StateFlags::ALL,
            StateFlags::ALL,
        )
        .unwrap();

    // Even with a zero budget, filtered items keep a cache: filters are
    // too expensive to re-render every frame.
    assert!(drawing.is_cached(shape));
}

#[test]
fn picking_respects_groups_and_sensitivity() {
    let mut drawing = Drawing::new(DrawingOptions::default());
    let root = drawing.new_group();
    drawing.set_root(Some(root));
    let shape = add_rect_shape(&mut drawing, root, Rect::new(0.0, 0.0, 10.0, 10.0));
    full_update(&mut drawing);

    let flags = burin_display::PickFlags::empty();
    // Groups swallow the pick by default.
    assert_eq!(
        drawing.pick(kurbo::Point::new(5.0, 5.0), 0.5, flags),
        Some(root)
    );
    drawing.set_pick_children(root, true);
    assert_eq!(
        drawing.pick(kurbo::Point::new(5.0, 5.0), 0.5, flags),
        Some(shape)
    );
    assert_eq!(drawing.pick(kurbo::Point::new(50.0, 50.0), 0.5, flags), None);

    drawing.set_sensitive(shape, false);
    assert_eq!(drawing.pick(kurbo::Point::new(5.0, 5.0), 0.5, flags), None);
}

#[test]
fn invisible_subtrees_short_circuit() {
    let mut drawing = Drawing::new(DrawingOptions::default());
    let root = drawing.new_group();
    drawing.set_root(Some(root));
    let group = drawing.new_group();
    drawing.append_child(root, group);
    add_rect_shape(&mut drawing, group, Rect::new(0.0, 0.0, 10.0, 10.0));
    drawing.set_visible(group, false);
    full_update(&mut drawing);
    // The invisible group contributes nothing to the root.
    assert_eq!(drawing.drawbox(root), None);
}
