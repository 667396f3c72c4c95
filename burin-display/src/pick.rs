//! Hit-testing.

use crate::drawing::Drawing;
use crate::item::{ItemData, ItemId, ItemKind};
use crate::types::{PickFlags, StateFlags};
use crate::update::max_expansion;
use kurbo::{ParamCurveNearest, Point, Shape as _};
use std::time::Instant;

/// Picks slower than this (microseconds) arm the repick throttle.
const SLOW_PICK_US: u128 = 10_000;

impl Drawing {
    /// Find the topmost sensitive, visible item whose visual extent
    /// contains `p` within `delta` device pixels.
    pub fn pick(&mut self, p: Point, delta: f64, flags: PickFlags) -> Option<ItemId> {
        let root = self.root()?;
        self.pick_item(root, p, delta, flags)
    }

    pub(crate) fn pick_item(
        &mut self,
        id: ItemId,
        p: Point,
        delta: f64,
        flags: PickFlags,
    ) -> Option<ItemId> {
        let (state, visible, sensitive, clip, mask, bbox, drawbox) = {
            let item = self.item(id);
            (
                item.state,
                item.visible,
                item.sensitive,
                item.clip,
                item.mask,
                item.bbox,
                item.drawbox,
            )
        };
        if !state.contains(StateFlags::BBOX) || !state.contains(StateFlags::PICK) {
            log::warn!("pick on an item with stale state");
            return None;
        }
        if !flags.contains(PickFlags::STICKY) && !(visible && sensitive) {
            return None;
        }

        let outline = flags.contains(PickFlags::OUTLINE);
        if !outline {
            // A point outside the clip or mask is clipped away.
            if let Some(clip) = clip {
                self.pick_item(clip, p, delta, flags | PickFlags::AS_CLIP)?;
            }
            if let Some(mask) = mask {
                self.pick_item(mask, p, delta, flags)?;
            }
        }

        let bbox = if outline || flags.contains(PickFlags::AS_CLIP) {
            bbox
        } else {
            drawbox
        }?;
        let expanded = bbox.to_rect().inflate(delta, delta);
        if !expanded.contains(p) {
            return None;
        }
        self.pick_kind(id, p, delta, flags)
    }

    fn pick_kind(&mut self, id: ItemId, p: Point, delta: f64, flags: PickFlags) -> Option<ItemId> {
        match self.item(id).data.kind() {
            ItemKind::Group | ItemKind::Pattern | ItemKind::Text => {
                let children = self.item(id).children.clone();
                let pick_children = self
                    .item(id)
                    .data
                    .group()
                    .is_some_and(|g| g.pick_children);
                for &child in children.iter().rev() {
                    if let Some(picked) = self.pick_item(child, p, delta, flags) {
                        return Some(if pick_children { picked } else { id });
                    }
                }
                None
            }
            ItemKind::Shape => self.pick_shape(id, p, delta, flags),
            ItemKind::Glyph => {
                // Reached via the text parent; the bbox test above is the
                // hit test.
                Some(id)
            }
            ItemKind::Image => self.pick_image(id, p, flags),
        }
    }

    fn pick_shape(
        &mut self,
        id: ItemId,
        p: Point,
        delta: f64,
        flags: PickFlags,
    ) -> Option<ItemId> {
        // Expensive picks arm a short-circuit for the next few calls.
        {
            let ItemData::Shape(shape) = &mut self.item_mut(id).data else {
                return None;
            };
            if shape.repick_after > 0 {
                shape.repick_after -= 1;
                if shape.repick_after > 0 {
                    return shape.last_pick;
                }
            }
        }

        let outline = flags.contains(PickFlags::OUTLINE);
        let as_clip = flags.contains(PickFlags::AS_CLIP);
        let select_zero = self.options().select_zero_opacity;

        let (path, style, ctm) = {
            let item = self.item(id);
            let ItemData::Shape(shape) = &item.data else {
                return None;
            };
            let path = shape.path.clone()?;
            (path, shape.style.clone(), item.ctm)
        };

        if self.item(id).opacity == 0.0 && !outline && !as_clip && !select_zero {
            // Fully transparent; not pickable outside outline mode.
            return None;
        }

        let start = Instant::now();

        let width = if as_clip {
            0.0
        } else if outline {
            0.5
        } else if style.stroke.is_some() && (style.stroke_opacity > 1e-3 || select_zero) {
            let scale = max_expansion(ctm);
            ((style.stroke_style.width as f64 * scale).max(0.125)) / 2.0
        } else {
            0.0
        };

        let needfill = as_clip
            || (style.fill.is_some() && (style.fill_opacity > 1e-3 || select_zero) && !outline);
        let wind_evenodd = style.fill_rule == crate::style::FillRule::EvenOdd;

        let device_path = ctm * (*path).clone();
        let wind = if needfill { device_path.winding(p) } else { 0 };
        let mut dist = f64::INFINITY;
        for seg in device_path.segments() {
            let nearest = seg.nearest(p, 0.25);
            dist = dist.min(nearest.distance_sq.sqrt());
        }

        let elapsed = start.elapsed().as_micros();
        if elapsed > SLOW_PICK_US {
            if let ItemData::Shape(shape) = &mut self.item_mut(id).data {
                shape.repick_after = (elapsed / 5_000) as u32;
            }
        }

        let mut record = |result: Option<ItemId>, drawing: &mut Self| {
            if let ItemData::Shape(shape) = &mut drawing.item_mut(id).data {
                shape.last_pick = result;
            }
            result
        };

        if needfill {
            let inside = if wind_evenodd {
                wind & 1 != 0
            } else {
                wind != 0
            };
            if inside {
                return record(Some(id), self);
            }
        }

        // Near the edge, as defined by the stroke width and delta. Dashing
        // is ignored and caps behave as if round.
        if (needfill || width > 0.0) && dist - width < delta {
            return record(Some(id), self);
        }

        // Markers.
        let children = self.item(id).children.clone();
        for &child in &children {
            if self
                .pick_item(child, p, delta, flags & !PickFlags::STICKY)
                .is_some()
            {
                return record(Some(id), self);
            }
        }

        record(None, self)
    }

    fn pick_image(&mut self, id: ItemId, p: Point, flags: PickFlags) -> Option<ItemId> {
        let item = self.item(id);
        let ItemData::Image(image) = &item.data else {
            return None;
        };
        if flags.contains(PickFlags::OUTLINE) || flags.contains(PickFlags::AS_CLIP) {
            return Some(id);
        }
        // Transparent image pixels do not pick.
        let local = item.ctm.inverse() * p;
        if !image.dest_rect.contains(local) {
            return None;
        }
        let fx = (local.x - image.dest_rect.x0) / image.dest_rect.width();
        let fy = (local.y - image.dest_rect.y0) / image.dest_rect.height();
        let px = ((fx * image.pixels.pixel_width() as f64) as u32)
            .min(image.pixels.pixel_width().saturating_sub(1));
        let py = ((fy * image.pixels.pixel_height() as f64) as u32)
            .min(image.pixels.pixel_height().saturating_sub(1));
        let alpha = image.pixels.pixel(px, py)[3];
        (alpha > 0).then_some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drawing::{Drawing, DrawingOptions};
    use crate::pixelgeom::IntRect;
    use crate::style::{Color, ShapeStyle};
    use kurbo::{Affine, BezPath};
    use std::sync::Arc;

    /// A triangle whose bounding box has a large region that neither fills
    /// nor comes near an edge, so bbox-passing misses reach the shape pick.
    fn triangle_drawing() -> (Drawing, ItemId) {
        let mut drawing = Drawing::new(DrawingOptions::default());
        let root = drawing.new_group();
        drawing.set_root(Some(root));
        drawing.set_pick_children(root, true);
        let shape = drawing.new_shape();
        let mut path = BezPath::new();
        path.move_to((0.0, 0.0));
        path.line_to((10.0, 0.0));
        path.line_to((0.0, 10.0));
        path.close_path();
        drawing.set_path(shape, Some(Arc::new(path)));
        drawing.set_style(shape, ShapeStyle::filled(Color::BLACK));
        drawing.append_child(root, shape);
        drawing
            .update(
                IntRect::INFINITE,
                Affine::IDENTITY,
                crate::types::StateFlags::ALL,
                crate::types::StateFlags::empty(),
            )
            .unwrap();
        (drawing, shape)
    }

    fn shape_data(drawing: &Drawing, id: ItemId) -> (u32, Option<ItemId>) {
        let ItemData::Shape(shape) = &drawing.item(id).data else {
            unreachable!()
        };
        (shape.repick_after, shape.last_pick)
    }

    #[test]
    fn picks_record_their_result() {
        let (mut drawing, shape) = triangle_drawing();
        let flags = PickFlags::empty();

        let hit = Point::new(2.0, 2.0);
        let miss = Point::new(8.0, 8.0); // in the bbox, far from the fill
        assert_eq!(drawing.pick(hit, 0.5, flags), Some(shape));
        assert_eq!(shape_data(&drawing, shape).1, Some(shape));
        assert_eq!(drawing.pick(miss, 0.5, flags), None);
        assert_eq!(shape_data(&drawing, shape).1, None);
    }

    #[test]
    fn armed_throttle_short_circuits_to_the_last_result() {
        let (mut drawing, shape) = triangle_drawing();
        let flags = PickFlags::empty();
        let miss = Point::new(8.0, 8.0);

        // Arm the counter the way a slow pick does, with a stale hit as
        // the remembered result.
        {
            let ItemData::Shape(data) = &mut drawing.item_mut(shape).data else {
                unreachable!()
            };
            data.repick_after = 3;
            data.last_pick = Some(shape);
        }

        // The next two picks skip the geometry and repeat the stale hit,
        // even though the probe point misses the triangle.
        assert_eq!(drawing.pick(miss, 0.5, flags), Some(shape));
        assert_eq!(drawing.pick(miss, 0.5, flags), Some(shape));
        // The throttle has run out; the real pick resumes and corrects
        // the remembered result.
        assert_eq!(drawing.pick(miss, 0.5, flags), None);
        assert_eq!(shape_data(&drawing, shape), (0, None));
    }

    #[test]
    fn throttled_misses_repeat_too() {
        let (mut drawing, shape) = triangle_drawing();
        let flags = PickFlags::empty();
        let hit = Point::new(2.0, 2.0);

        assert_eq!(drawing.pick(Point::new(8.0, 8.0), 0.5, flags), None);
        {
            let ItemData::Shape(data) = &mut drawing.item_mut(shape).data else {
                unreachable!()
            };
            data.repick_after = 2;
        }
        // One short-circuit repeating the remembered miss, even on a
        // point that would hit.
        assert_eq!(drawing.pick(hit, 0.5, flags), None);
        assert_eq!(shape_data(&drawing, shape).0, 1);
        // Expired: the hit goes through again.
        assert_eq!(drawing.pick(hit, 0.5, flags), Some(shape));
        assert_eq!(shape_data(&drawing, shape).1, Some(shape));
    }
}
