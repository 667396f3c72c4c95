//! The update traversal: recompute transforms, bounding boxes and cache
//! eligibility with minimal work.

use crate::drawing::{affine_near, Drawing, DrawingError};
use crate::filter::FilterInfo;
use crate::item::{ChildType, ItemData, ItemId, ItemKind};
use crate::pixelgeom::{opt_intersect, opt_union, IntPoint, IntRect};
use crate::types::{RenderMode, StateFlags};
use kurbo::{Affine, Shape as _};

/// Candidate caches below this score are not worth the memory.
pub(crate) const CACHE_SCORE_THRESHOLD: f64 = 50_000.0;

/// Nodes at least this complex totally invalidate their subtree's caches
/// when their transform changes, instead of diffing.
const TOTAL_INVALIDATION_COMPLEXITY: u32 = 20;

#[derive(Debug, Clone, Copy)]
pub(crate) struct UpdateContext {
    pub(crate) ctm: Affine,
}

impl Drawing {
    /// Recompute the derived data named by `flags` for everything
    /// intersecting `area`, with `affine` as the root transform. `reset`
    /// forces the given state bits stale first.
    pub fn update(
        &mut self,
        area: IntRect,
        affine: Affine,
        flags: StateFlags,
        reset: StateFlags,
    ) -> Result<(), DrawingError> {
        if let Some(root) = self.root() {
            self.update_item(root, area, UpdateContext { ctm: affine }, flags, reset)?;
        }
        if flags.contains(StateFlags::CACHE) {
            // Process the updated cache scores.
            self.pick_items_for_caching();
        }
        Ok(())
    }

    pub(crate) fn update_item(
        &mut self,
        id: ItemId,
        area: IntRect,
        ctx: UpdateContext,
        flags: StateFlags,
        mut reset: StateFlags,
    ) -> Result<(), DrawingError> {
        // What is not visible needs no update; edits will re-invalidate.
        if !self.item(id).visible {
            self.item_mut(id).state = StateFlags::ALL;
            return Ok(());
        }

        let outline = self.outline_mode();
        let filters = self.render_mode != RenderMode::NoFilters;
        let forcecache = self.item(id).filter.is_some() && filters;

        let state = {
            let item = self.item_mut(id);
            reset |= item.propagate_state;
            item.propagate_state = StateFlags::empty();
            item.state &= !reset;
            item.state
        };

        if (flags & !state).is_empty() {
            return Ok(()); // nothing to do
        }

        if state.contains(StateFlags::BBOX) {
            let item = self.item(id);
            let current = if outline { item.bbox } else { item.drawbox };
            if !current.is_some_and(|b| area.intersects(&b)) {
                return Ok(());
            }
        }

        let to_update = state ^ flags;

        // Background accumulation has to be settled before recursing.
        if to_update.contains(StateFlags::BACKGROUND) {
            let parent_accumulates = {
                let item = self.item(id);
                item.child_type == ChildType::Normal
                    && item
                        .parent
                        .is_some_and(|p| self.item(p).background_accumulate)
            };
            let item = self.item_mut(id);
            item.background_accumulate = item.background_new || parent_accumulates;
        }

        let mut child_ctm = {
            let item = self.item(id);
            match item.transform {
                Some(t) => ctx.ctm * t,
                None => ctx.ctm,
            }
        };

        // Vector effects.
        {
            let item = self.item(id);
            let coeffs = child_ctm.as_coeffs();
            if item.vector_effect_fixed {
                child_ctm = Affine::new([coeffs[0], coeffs[1], coeffs[2], coeffs[3], 0.0, 0.0]);
            }
            let coeffs = child_ctm.as_coeffs();
            if item.vector_effect_size {
                let value = descrim(child_ctm);
                if value > 0.0 {
                    child_ctm = Affine::new([
                        coeffs[0] / value,
                        coeffs[1] / value,
                        coeffs[2] / value,
                        coeffs[3] / value,
                        coeffs[4],
                        coeffs[5],
                    ]);
                }
            }
            let coeffs = child_ctm.as_coeffs();
            if item.vector_effect_rotate {
                let value = descrim(child_ctm);
                child_ctm = Affine::new([value, 0.0, 0.0, value, coeffs[4], coeffs[5]]);
            }
        }

        // Detect whether the total transform materially changed.
        let (affine_changed, ctm_change) = {
            let old = self.item(id).ctm;
            if affine_near(old, child_ctm, 1e-6) {
                (false, Affine::IDENTITY)
            } else {
                (true, child_ctm * old.inverse())
            }
        };
        self.item_mut(id).ctm = child_ctm;

        let totally_invalidated = reset.contains(StateFlags::TOTAL_INV);
        if totally_invalidated {
            // The invalidation a _markForRendering would have done, had it
            // not been overshadowed by a totally-invalidating ancestor.
            if let Some(slot) = self.cache_slot(id) {
                if let Ok(mut guard) = slot.lock() {
                    if let Some(cache) = guard.as_mut() {
                        cache.mark_dirty(IntRect::INFINITE);
                    }
                }
            }
            self.drop_pattern_cache(id);
        }

        let totally_invalidate = self.item(id).update_complexity
            >= TOTAL_INVALIDATION_COMPLEXITY
            && affine_changed;
        if totally_invalidate {
            reset |= StateFlags::TOTAL_INV;
        }

        // Recalculate complexity; the per-kind update adds the children.
        {
            let aux = {
                let item = self.item(id);
                [item.clip, item.mask, item.fill_pattern, item.stroke_pattern]
            };
            let extra: u32 = aux
                .into_iter()
                .flatten()
                .map(|c| self.item(c).update_complexity)
                .sum();
            let item = self.item_mut(id);
            item.update_complexity = 1 + extra;
            item.contains_unisolated_blend = false;
        }

        // Filtered items are always cached when they can be.
        if forcecache {
            let has_rect = self.cache_rect(id).is_some();
            self.ensure_cached_persistent(id, has_rect);
        }

        let child_ctx = UpdateContext { ctm: child_ctm };
        let new_state = self.update_kind(id, area, child_ctx, flags, reset)?;
        self.item_mut(id).state = new_state;

        if let Some(filter) = &mut self.item_mut(id).filter {
            filter.update();
        }

        if to_update.contains(StateFlags::BBOX) {
            // Compute the drawbox: the filter's effect region when
            // filtered, the plain bbox otherwise.
            let drawbox = {
                let item = self.item(id);
                if item.filter.is_some() && filters {
                    let filter = item.filter.as_ref().map(|f| {
                        f.filter_effect_area(item.item_bbox)
                            .map(|r| item.ctm.transform_rect_bbox(r))
                    });
                    filter.flatten().and_then(IntRect::round_outwards)
                } else {
                    item.bbox
                }
            };
            self.item_mut(id).drawbox = drawbox;

            let (clip, mask) = {
                let item = self.item(id);
                (item.clip, item.mask)
            };
            if let Some(clip) = clip {
                self.update_item(clip, area, child_ctx, flags, reset)?;
                let clip_bbox = self.item(clip).bbox;
                let item = self.item_mut(id);
                if outline {
                    item.bbox = opt_union(item.bbox, clip_bbox);
                } else {
                    item.drawbox = opt_intersect(item.drawbox, clip_bbox);
                }
            }
            if let Some(mask) = mask {
                self.update_item(mask, area, child_ctx, flags, reset)?;
                let item_boxes = {
                    let m = self.item(mask);
                    (m.bbox, m.drawbox)
                };
                let item = self.item_mut(id);
                if outline {
                    item.bbox = opt_union(item.bbox, item_boxes.0);
                } else {
                    // Masking needs the mask's full drawbox.
                    item.drawbox = opt_intersect(item.drawbox, item_boxes.1);
                }
            }
            if self.outline_overlay() {
                let item = self.item_mut(id);
                item.bbox = opt_union(item.bbox, item.drawbox);
            }
        }

        if to_update.contains(StateFlags::CACHE) {
            self.remove_cache_candidate(id);

            let cacheable = {
                let item = self.item(id);
                !item.contains_unisolated_blend || item.is_isolated()
            };

            let score = self.cache_score(id);
            if score >= CACHE_SCORE_THRESHOLD && cacheable {
                // A positive score implies the cache rect exists.
                let cache_size = self
                    .cache_rect(id)
                    .map(|r| r.area() as usize * 4)
                    .unwrap_or(0);
                self.insert_cache_candidate(id, score, cache_size);
            }

            if let Some(slot) = self.cache_slot(id) {
                let has_surface = slot.lock().is_ok_and(|guard| guard.is_some());
                if has_surface {
                    let rect = self.cache_rect(id);
                    let keep = self.item(id).visible
                        && rect.is_some()
                        && self.item(id).has_cache_candidate;
                    if keep {
                        // Tell the cache how to move at the next render;
                        // deferring keeps the memory use inside the budget
                        // if caching is turned off before then.
                        if let Ok(mut guard) = slot.lock() {
                            if let Some(cache) = guard.as_mut() {
                                if let Some(rect) = rect {
                                    cache.schedule_transform(rect, ctm_change);
                                }
                            }
                        }
                    } else {
                        self.set_cached(id, false, true);
                    }
                }
            }
        }

        if to_update.contains(StateFlags::RENDER) {
            let (fill_pattern, stroke_pattern) = {
                let item = self.item(id);
                (item.fill_pattern, item.stroke_pattern)
            };
            if let Some(p) = fill_pattern {
                self.update_item(p, area, child_ctx, flags, reset)?;
            }
            if let Some(p) = stroke_pattern {
                self.update_item(p, area, child_ctx, flags, reset)?;
            }
            if !totally_invalidated {
                let plain_group = matches!(
                    self.item(id).data.kind(),
                    ItemKind::Group | ItemKind::Pattern | ItemKind::Text
                );
                if !plain_group || forcecache || totally_invalidate {
                    self.mark_for_rendering(id);
                }
            }
        }

        Ok(())
    }

    /// The kind-specific part of the update; returns the new state bits.
    fn update_kind(
        &mut self,
        id: ItemId,
        area: IntRect,
        ctx: UpdateContext,
        flags: StateFlags,
        reset: StateFlags,
    ) -> Result<StateFlags, DrawingError> {
        let outline = self.outline_mode();
        match self.item(id).data.kind() {
            ItemKind::Group | ItemKind::Text => {
                if self.item(id).data.kind() == ItemKind::Text {
                    let ok = self
                        .item(id)
                        .children
                        .iter()
                        .all(|&c| self.item(c).data.kind() == ItemKind::Glyph);
                    if !ok {
                        return Err(DrawingError::InvalidItem);
                    }
                }
                self.update_children(id, area, ctx, flags, reset, outline)?;
                Ok(StateFlags::ALL)
            }
            ItemKind::Pattern => {
                self.drop_pattern_cache(id);
                let Some((tile_rect, pattern_to_user)) = ({
                    let ItemData::Pattern(_, pattern) = &self.item(id).data else {
                        unreachable!()
                    };
                    pattern
                        .tile_rect
                        .filter(|r| r.area() != 0.0)
                        .map(|r| (r, pattern.pattern_to_user))
                }) else {
                    return Ok(StateFlags::empty());
                };

                // Desired tile resolution in device pixels under the
                // current ctm.
                let det_ctm = ctx.ctm.determinant();
                let det_p2u = pattern_to_user.map_or(1.0, |a| a.determinant());
                let scale = (det_ctm * det_p2u).abs().sqrt();
                let resolution = IntPoint::new(
                    (tile_rect.width() * scale).ceil().max(1.0) as i32,
                    (tile_rect.height() * scale).ceil().max(1.0) as i32,
                );
                if let ItemData::Pattern(_, pattern) = &mut self.item_mut(id).data {
                    pattern.resolution = resolution;
                }

                // Map the tile rect to the origin and stretch it to the
                // resolution; the pattern subtree renders in this space.
                let dt = Affine::scale_non_uniform(
                    resolution.x as f64 / tile_rect.width(),
                    resolution.y as f64 / tile_rect.height(),
                ) * Affine::translate((-tile_rect.x0, -tile_rect.y0));
                self.update_children(
                    id,
                    IntRect::INFINITE,
                    UpdateContext { ctm: dt },
                    flags,
                    reset,
                    outline,
                )?;
                Ok(StateFlags::ALL)
            }
            ItemKind::Shape => {
                self.update_shape_bbox(id, outline);
                // Markers attached to the shape update as children.
                self.update_children_boxes_only(id, area, ctx, flags, reset, outline)?;
                Ok(StateFlags::ALL)
            }
            ItemKind::Glyph => {
                let bbox = {
                    let ItemData::Glyph(glyph) = &self.item(id).data else {
                        unreachable!()
                    };
                    let path_bbox = if glyph.path.elements().is_empty() {
                        glyph.reference_path.as_ref().map(|p| p.bounding_box())
                    } else {
                        Some(glyph.path.bounding_box())
                    };
                    path_bbox
                        .map(|b| self.item(id).ctm.transform_rect_bbox(b))
                        .and_then(IntRect::round_outwards)
                };
                let item = self.item_mut(id);
                item.bbox = bbox;
                item.drawbox = bbox;
                Ok(StateFlags::ALL)
            }
            ItemKind::Image => {
                let bbox = {
                    let ItemData::Image(image) = &self.item(id).data else {
                        unreachable!()
                    };
                    IntRect::round_outwards(self.item(id).ctm.transform_rect_bbox(image.dest_rect))
                };
                let item = self.item_mut(id);
                item.bbox = bbox;
                item.drawbox = bbox;
                Ok(StateFlags::ALL)
            }
        }
    }

    fn update_children(
        &mut self,
        id: ItemId,
        area: IntRect,
        ctx: UpdateContext,
        flags: StateFlags,
        reset: StateFlags,
        outline: bool,
    ) -> Result<(), DrawingError> {
        let child_ctx = {
            match self.item(id).data.group().and_then(|g| g.child_transform) {
                Some(t) => UpdateContext { ctm: ctx.ctm * t },
                None => ctx,
            }
        };
        self.item_mut(id).bbox = None;
        let children = self.item(id).children.clone();
        for child in children {
            self.update_item(child, area, child_ctx, flags, reset)?;
            let (visible, child_box, complexity, unisolated) = {
                let c = self.item(child);
                (
                    c.visible,
                    if outline { c.bbox } else { c.drawbox },
                    c.update_complexity,
                    c.unisolated_blend(),
                )
            };
            let item = self.item_mut(id);
            if visible {
                item.bbox = opt_union(item.bbox, child_box);
            }
            item.update_complexity += complexity;
            item.contains_unisolated_blend |= unisolated;
        }
        Ok(())
    }

    /// Children of shapes are markers: update them and grow the bbox.
    fn update_children_boxes_only(
        &mut self,
        id: ItemId,
        area: IntRect,
        ctx: UpdateContext,
        flags: StateFlags,
        reset: StateFlags,
        outline: bool,
    ) -> Result<(), DrawingError> {
        let children = self.item(id).children.clone();
        for child in children {
            self.update_item(child, area, ctx, flags, reset)?;
            let (visible, child_box, complexity) = {
                let c = self.item(child);
                (c.visible, if outline { c.bbox } else { c.drawbox }, c.update_complexity)
            };
            let item = self.item_mut(id);
            if visible {
                item.bbox = opt_union(item.bbox, child_box);
            }
            item.update_complexity += complexity;
        }
        Ok(())
    }

    fn update_shape_bbox(&mut self, id: ItemId, outline: bool) {
        let bbox = {
            let item = self.item(id);
            let ItemData::Shape(shape) = &item.data else {
                unreachable!()
            };
            shape.path.as_ref().and_then(|path| {
                let device_bbox = item.ctm.transform_rect_bbox(path.bounding_box());
                let expand = if outline {
                    0.5
                } else if shape.style.stroke.is_some() {
                    let scale = max_expansion(item.ctm);
                    let mut w = if shape.style.stroke_style.hairline {
                        1.0
                    } else {
                        shape.style.stroke_style.width as f64 * scale
                    };
                    // Miter joins can poke out up to the miter limit.
                    if shape.style.stroke_style.join == kurbo::Join::Miter {
                        w *= shape.style.stroke_style.miter_limit.max(1.0) as f64;
                    }
                    w / 2.0
                } else {
                    0.0
                };
                IntRect::round_outwards(device_bbox.inflate(expand, expand))
            })
        };
        let item = self.item_mut(id);
        item.bbox = bbox;
    }

    /// The caching score: the estimated per-render cost this cache would
    /// save. Pixels of the cache rect, multiplied by filter cost, plus
    /// clip and mask surcharges.
    pub(crate) fn cache_score(&self, id: ItemId) -> f64 {
        let Some(cache_rect) = self.cache_rect(id) else {
            return -1.0;
        };
        let item = self.item(id);
        let mut score = cache_rect.area() as f64;
        if item.filter.is_some() && self.render_mode != RenderMode::NoFilters {
            if let Some(filter) = &item.filter {
                score *= filter.complexity(item.ctm);
                let info = FilterInfo {
                    ctm: item.ctm,
                    item_bbox: item.item_bbox,
                };
                let ref_area = IntRect::new(0, 0, 16, 16);
                let test_area = filter.area_enlarge(ref_area, &info);
                // Cap the vertical growth so one-dimensional blurs do not
                // produce absurd scores.
                let limit = IntRect::new(0, IntRect::INFINITE.y0, 16, IntRect::INFINITE.y1);
                if let Some(clamped) = test_area.intersect(&limit) {
                    score *= clamped.area() as f64 / ref_area.area() as f64;
                }
            }
        }
        if let Some(clip) = item.clip {
            if let Some(clip_bbox) = self.item(clip).bbox {
                score += clip_bbox.area() as f64 * 0.5;
            }
        }
        if let Some(mask) = item.mask {
            score += self.cache_score(mask);
        }
        score
    }

    /// The rectangle an item's cache covers: its drawbox intersected with
    /// the drawing-wide cache limit. Filtered items get the rectangle
    /// grown so that enough of the unfiltered item stays inside to render
    /// correctly near the viewport edge.
    pub(crate) fn cache_rect(&self, id: ItemId) -> Option<IntRect> {
        let item = self.item(id);
        let limit = self.cache_limit()?;
        let r = opt_intersect(item.drawbox, Some(limit))?;
        if item.filter.is_some()
            && self.render_mode != RenderMode::NoFilters
            && Some(r) != item.drawbox
        {
            let canvas = r.expanded_by_scale(0.5);
            let valid = opt_intersect(Some(canvas), item.bbox);
            if valid.is_none() {
                if let Some(bbox) = item.bbox {
                    let shrunk = bbox.expanded_by_scale(0.5);
                    let nearest = shrunk.nearest_edge_point(limit.midpoint());
                    let grown = r.expanded_to(nearest);
                    return opt_intersect(item.drawbox, Some(grown));
                }
            }
            return opt_intersect(item.drawbox, Some(r));
        }
        Some(r)
    }
}

/// The square root of the absolute determinant; a scalar measure of how
/// much an affine expands areas.
fn descrim(affine: Affine) -> f64 {
    affine.determinant().abs().sqrt()
}

/// The largest singular value of the linear part; how much a distance can
/// grow under the affine.
pub(crate) fn max_expansion(affine: Affine) -> f64 {
    let c = affine.as_coeffs();
    let (a, b, cc, d) = (c[0], c[1], c[2], c[3]);
    // Singular values of [[a, c], [b, d]] via the trace trick.
    let e = (a * a + b * b + cc * cc + d * d) / 2.0;
    let f = ((a * a + b * b - cc * cc - d * d) / 2.0).hypot(a * cc + b * d);
    (e + f).max(0.0).sqrt()
}
