//! The pattern tile engine: wrapped-tile rasterisation cache for fills.
//!
//! A pattern's tile is rendered on demand into surfaces addressed in tile
//! coordinate space, under the torus identification `(x, y) ~ (x+W, y+H)`
//! with `(W, H)` the tile resolution. Requests are served from cached
//! surfaces when a wrapped copy already covers them; otherwise touching
//! surfaces are merged, the missing parts are rendered (split across the
//! wrap-around), and the result is kept for the next request.

use crate::context::{DrawingContext, RenderContext, TilePattern};
use crate::drawing::Drawing;
use crate::item::{ItemData, ItemId, TileSurface};
use crate::pixelgeom::{IntPoint, IntRect, Region};
use crate::surface::Surface;
use crate::types::RenderFlags;
use kurbo::Affine;

fn rounddown(a: i32, b: i32) -> i32 {
    a.div_euclid(b) * b
}

fn roundup(a: i32, b: i32) -> i32 {
    -rounddown(-a, b)
}

/// Translate a rectangle into its canonical representative under the
/// periodic tiling: dimensions spanning a whole period snap to `[0, P]`,
/// others shift into `[0, P)`.
fn canonicalised(mut rect: IntRect, period: IntPoint) -> IntRect {
    if rect.width() >= period.x {
        rect.x0 = 0;
        rect.x1 = period.x;
    } else {
        let shift = rounddown(rect.x0, period.x);
        rect.x0 -= shift;
        rect.x1 -= shift;
    }
    if rect.height() >= period.y {
        rect.y0 = 0;
        rect.y1 = period.y;
    } else {
        let shift = rounddown(rect.y0, period.y);
        rect.y0 -= shift;
        rect.y1 -= shift;
    }
    rect
}

/// Whether the periodic tiling of `a` contains the periodic tiling of `b`.
fn wrapped_contains(a: &IntRect, b: &IntRect, period: IntPoint) -> bool {
    let check = |a0: i32, a1: i32, b0: i32, b1: i32, period: i32| {
        if a1 - a0 >= period {
            return true;
        }
        if b1 - b0 > a1 - a0 {
            return false;
        }
        rounddown(b0 - a0, period) >= b1 - a1
    };
    check(a.x0, a.x1, b.x0, b.x1, period.x) && check(a.y0, a.y1, b.y0, b.y1, period.y)
}

/// Whether the periodic tilings of `a` and `b` overlap or touch.
fn wrapped_touches(a: &IntRect, b: &IntRect, period: IntPoint) -> bool {
    let check = |a0: i32, a1: i32, b0: i32, b1: i32, period: i32| {
        if a1 - a0 >= period || b1 - b0 >= period {
            return true;
        }
        rounddown(b1 - a0, period) >= b0 - a1
    };
    check(a.x0, a.x1, b.x0, b.x1, period.x) && check(a.y0, a.y1, b.y0, b.y1, period.y)
}

/// The minimal and maximal period translates of `a` that overlap `b`.
fn overlapping_translates(a: &IntRect, b: &IntRect, period: IntPoint) -> (IntPoint, IntPoint) {
    (
        IntPoint::new(
            roundup(b.x0 - a.x1 + 1, period.x),
            roundup(b.y0 - a.y1 + 1, period.y),
        ),
        IntPoint::new(
            rounddown(b.x1 - a.x0 - 1, period.x),
            rounddown(b.y1 - a.y0 - 1, period.y),
        ),
    )
}

impl Drawing {
    /// Produce a repeat-extend source covering `area` (device pixels) with
    /// the pattern's tiling. Returns `None` for invisible or degenerate
    /// patterns.
    pub(crate) fn render_pattern(
        &self,
        id: ItemId,
        dc: &mut dyn DrawingContext,
        rc: RenderContext,
        area: IntRect,
        opacity: f32,
        device_scale: i32,
    ) -> Option<TilePattern> {
        if opacity < 1e-3 {
            return None;
        }

        let (tile_rect, pattern_to_user, overflow, resolution, tiles) = {
            let item = self.item(id);
            let ItemData::Pattern(_, pattern) = &item.data else {
                return None;
            };
            let tile_rect = pattern.tile_rect.filter(|r| r.area() != 0.0)?;
            (
                tile_rect,
                pattern.pattern_to_user,
                pattern.overflow,
                pattern.resolution,
                pattern.tiles.clone(),
            )
        };
        if resolution.x <= 0 || resolution.y <= 0 {
            return None;
        }
        let ctm = self.item(id).ctm;

        // user -> tile: move the tile rect to the origin, stretch to the
        // tile resolution.
        let dt = Affine::scale_non_uniform(
            resolution.x as f64 / tile_rect.width(),
            resolution.y as f64 / tile_rect.height(),
        ) * Affine::translate((-tile_rect.x0, -tile_rect.y0));
        let idt = dt.inverse();
        let pattern_to_tile = match pattern_to_user {
            Some(p2u) => dt * p2u.inverse(),
            None => dt,
        };
        let screen_to_tile = pattern_to_tile * ctm.inverse();

        let area_orig =
            IntRect::round_outwards(screen_to_tile.transform_rect_bbox(area.to_rect()))?;
        let area_tile = canonicalised(area_orig, resolution);

        // The cache mutex serialises all pattern rendering; patterns are
        // typically not the bottleneck.
        let mut tiles = tiles.lock().ok()?;

        // Use a surface whose wrapped copies already contain the area.
        let found = tiles
            .iter()
            .position(|s| wrapped_contains(&s.rect, &area_tile, resolution));

        let (index, mut dirty) = match found {
            Some(index) => (index, Region::new()),
            None => {
                // Merge the requested area with every touching surface,
                // iterating until stable.
                let mut expanded = area_tile;
                let mut merged = Vec::new();
                loop {
                    let mut modified = false;
                    let mut i = 0;
                    while i < tiles.len() {
                        if wrapped_touches(&expanded, &tiles[i].rect, resolution) {
                            let taken = tiles.swap_remove(i);
                            let shift = IntPoint::new(
                                rounddown(expanded.x1 - taken.rect.x0, resolution.x),
                                rounddown(expanded.y1 - taken.rect.y0, resolution.y),
                            );
                            expanded =
                                expanded.union(&taken.rect.translated(shift.x, shift.y));
                            merged.push(taken);
                            modified = true;
                        } else {
                            i += 1;
                        }
                    }
                    if !modified {
                        break;
                    }
                }

                // Keeps the coordinates from wandering off over time.
                let expanded = canonicalised(expanded, resolution);

                let mut surface = Surface::new(expanded, device_scale);
                let mut dirty = Region::from_rect(expanded);
                for old in &merged {
                    let (min, max) = overlapping_translates(&old.rect, &expanded, resolution);
                    let mut x = min.x;
                    while x <= max.x {
                        let mut y = min.y;
                        while y <= max.y {
                            surface.blit_translated(&old.surface, x, y);
                            dirty.subtract(&old.rect.translated(x, y));
                            y += resolution.y;
                        }
                        x += resolution.x;
                    }
                }
                tiles.push(TileSurface {
                    rect: expanded,
                    surface,
                });
                (tiles.len() - 1, dirty)
            }
        };

        // Render the pattern contents into the still-dirty parts, splitting
        // each rectangle across the torus wrap-around.
        let dirty_rects: Vec<IntRect> = dirty.rects().to_vec();
        dirty.clear();
        for rect in dirty_rects {
            for wx in 0..=1 {
                for wy in 0..=1 {
                    let wrap = IntPoint::new(resolution.x * wx, resolution.y * wy);
                    let cell = IntRect::new(wrap.x, wrap.y, wrap.x + resolution.x, wrap.y + resolution.y);
                    let Some(piece) = rect.intersect(&cell) else {
                        continue;
                    };
                    let local = piece.translated(-wrap.x, -wrap.y);
                    let mut tile_dc = dc.create_similar(local);
                    if overflow.steps <= 1 {
                        self.render_item(id, &mut *tile_dc, rc, local, RenderFlags::empty(), None);
                    } else {
                        // Overflow transforms act in pattern space; conjugate
                        // them into tile space before stepping.
                        let initial = dt * overflow.initial * idt;
                        let step = dt * overflow.step * idt;
                        tile_dc.transform(initial);
                        for _ in 0..overflow.steps {
                            // The stepped transforms defeat per-node caches.
                            self.render_item(
                                id,
                                &mut *tile_dc,
                                rc,
                                local,
                                RenderFlags::BYPASS_CACHE,
                                None,
                            );
                            tile_dc.transform(step);
                        }
                    }
                    let mut rendered = tile_dc.finish();
                    if opacity < 1.0 - 1e-3 {
                        rendered.apply_opacity(opacity);
                    }
                    tiles[index]
                        .surface
                        .blit_translated(&rendered, wrap.x, wrap.y);
                }
            }
        }

        // Build the repeating source: its transform maps user space into
        // the surface's pixel space, shifted so the requested area lands on
        // the right wrapped copy.
        let surface_rect = tiles[index].rect;
        let shift = IntPoint::new(
            surface_rect.x0 + rounddown(area_orig.x0 - surface_rect.x0, resolution.x),
            surface_rect.y0 + rounddown(area_orig.y0 - surface_rect.y0, resolution.y),
        );
        Some(TilePattern {
            surface: tiles[index].surface.clone(),
            transform: Affine::translate((-(shift.x as f64), -(shift.y as f64)))
                * pattern_to_tile,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::recording::RecordingContext;
    use crate::drawing::DrawingOptions;
    use crate::style::{Color, ShapeStyle};
    use crate::types::StateFlags;
    use kurbo::Rect;
    use std::sync::Arc;

    const P: IntPoint = IntPoint { x: 10, y: 10 };

    #[test]
    fn canonical_rects_land_in_the_base_cell() {
        assert_eq!(
            canonicalised(IntRect::new(23, -17, 28, -12), P),
            IntRect::new(3, 3, 8, 8)
        );
        // Spanning a full period snaps to the whole cell.
        assert_eq!(
            canonicalised(IntRect::new(-3, 0, 11, 4), P),
            IntRect::new(0, 0, 10, 4)
        );
    }

    #[test]
    fn wrapped_containment() {
        let a = IntRect::new(0, 0, 10, 10);
        assert!(wrapped_contains(&a, &IntRect::new(102, 55, 104, 58), P));
        let small = IntRect::new(2, 2, 6, 6);
        assert!(wrapped_contains(&small, &IntRect::new(13, 13, 15, 15), P));
        assert!(!wrapped_contains(&small, &IntRect::new(7, 2, 9, 6), P));
    }

    #[test]
    fn wrapped_touching() {
        let a = IntRect::new(0, 0, 4, 4);
        // Touches its own wrapped copy's neighbourhood.
        assert!(wrapped_touches(&a, &IntRect::new(12, 2, 14, 3), P));
        assert!(!wrapped_touches(&a, &IntRect::new(5, 5, 9, 9), P));
    }

    fn pattern_drawing() -> (Drawing, ItemId) {
        let mut drawing = Drawing::new(DrawingOptions::default());
        let root = drawing.new_group();
        drawing.set_root(Some(root));
        let owner = drawing.new_shape();
        let mut path = kurbo::BezPath::new();
        path.move_to((0.0, 0.0));
        path.line_to((100.0, 0.0));
        path.line_to((100.0, 100.0));
        path.close_path();
        drawing.set_path(owner, Some(Arc::new(path)));
        let mut style = ShapeStyle::filled(Color::BLACK);
        style.fill = crate::style::PaintSource::Pattern;
        drawing.set_style(owner, style);
        drawing.append_child(root, owner);

        let pattern = drawing.new_pattern();
        drawing.set_tile_rect(pattern, Some(Rect::new(0.0, 0.0, 16.0, 16.0)));
        let tile_shape = drawing.new_shape();
        let mut tile_path = kurbo::BezPath::new();
        tile_path.move_to((2.0, 2.0));
        tile_path.line_to((14.0, 2.0));
        tile_path.line_to((14.0, 14.0));
        tile_path.close_path();
        drawing.set_path(tile_shape, Some(Arc::new(tile_path)));
        drawing.set_style(tile_shape, ShapeStyle::filled(Color::BLACK));
        drawing.append_child(pattern, tile_shape);
        drawing.set_fill_pattern(owner, Some(pattern));

        drawing
            .update(
                IntRect::INFINITE,
                Affine::IDENTITY,
                StateFlags::ALL,
                StateFlags::empty(),
            )
            .unwrap();
        (drawing, pattern)
    }

    #[test]
    fn repeated_requests_reuse_the_tile_cache() {
        let (drawing, pattern) = pattern_drawing();
        let mut dc = RecordingContext::new();
        let rc = RenderContext::default();
        let area = IntRect::new(0, 0, 40, 40);

        let tile = drawing
            .render_pattern(pattern, &mut dc, rc, area, 1.0, 1)
            .expect("pattern renders");
        // Tile resolution matches the update's computation.
        assert_eq!(tile.surface.area(), IntRect::new(0, 0, 16, 16));

        let tiles = {
            let ItemData::Pattern(_, data) = &drawing.item(pattern).data else {
                unreachable!()
            };
            data.tiles.clone()
        };
        assert_eq!(tiles.lock().unwrap().len(), 1);

        // A second request, shifted by whole tiles, is served from cache.
        let shifted = IntRect::new(160, 160, 200, 200);
        drawing
            .render_pattern(pattern, &mut dc, rc, shifted, 1.0, 1)
            .expect("pattern renders");
        assert_eq!(tiles.lock().unwrap().len(), 1);
    }

    #[test]
    fn update_drops_the_tile_cache() {
        let (mut drawing, pattern) = pattern_drawing();
        let mut dc = RecordingContext::new();
        let rc = RenderContext::default();
        drawing
            .render_pattern(pattern, &mut dc, rc, IntRect::new(0, 0, 8, 8), 1.0, 1)
            .expect("pattern renders");
        let tiles = {
            let ItemData::Pattern(_, data) = &drawing.item(pattern).data else {
                unreachable!()
            };
            data.tiles.clone()
        };
        assert_eq!(tiles.lock().unwrap().len(), 1);

        // Force a full re-update; the pattern drops its tile cache.
        drawing
            .update(
                IntRect::INFINITE,
                Affine::IDENTITY,
                StateFlags::ALL,
                StateFlags::ALL,
            )
            .unwrap();
        assert!(tiles.lock().unwrap().is_empty());
    }
}
