//! The render traversal: caches, intermediate compositing and the
//! kind-specific painting.

use crate::context::{CompositeOp, DrawingContext, RenderContext};
use crate::drawing::Drawing;
use crate::filter::FilterInfo;
use crate::item::{ChildType, ItemData, ItemId, ItemKind};
use crate::pixelgeom::{opt_intersect, IntRect};
use crate::style::{Antialias, BlendMode, Color, PaintOrder, PaintSource};
use crate::surface::{DrawingCache, Surface};
use crate::types::{ColorMode, RenderFlags, RenderOutcome};
use kurbo::{Affine, Rect, Vec2};

impl Drawing {
    /// Render the drawing into a context, restricted to `area` (in device
    /// pixels).
    pub fn render(
        &self,
        dc: &mut dyn DrawingContext,
        area: IntRect,
        flags: RenderFlags,
        antialias_override: Option<Antialias>,
    ) {
        let Some(root) = self.root() else {
            return;
        };
        let antialias = antialias_override.unwrap_or(self.item(root).antialias);
        dc.set_antialias(antialias);

        let rc = RenderContext {
            outline_color: 0xff,
            dithering: self.options.dithering,
        };
        let flags = flags | self.render_mode.render_flags();

        if let Some(clip) = &self.clip {
            dc.save();
            dc.path(&(self.item(root).ctm * clip.clone()));
            dc.clip();
        }
        self.render_item(root, dc, rc, area, flags, None);
        if self.clip.is_some() {
            dc.restore();
        }
    }

    /// Render the drawing into a fresh surface and return its average
    /// colour as straight RGBA.
    ///
    /// The context for the surface is produced by `make_context` from the
    /// caller's backend.
    pub fn average_color(
        &self,
        make_context: impl FnOnce(IntRect) -> Box<dyn DrawingContext>,
        area: IntRect,
    ) -> (f64, f64, f64, f64) {
        let mut dc = make_context(area);
        self.render(&mut *dc, area, RenderFlags::empty(), None);
        dc.finish().average_color()
    }

    pub(crate) fn render_item(
        &self,
        id: ItemId,
        dc: &mut dyn DrawingContext,
        rc: RenderContext,
        area: IntRect,
        flags: RenderFlags,
        stop_at: Option<ItemId>,
    ) -> RenderOutcome {
        let outline = flags.contains(RenderFlags::OUTLINE);
        let render_filters = !flags.contains(RenderFlags::NO_FILTERS);

        // stop_at is handled by groups, but a filtered item with a
        // background-accessing filter can be its own background root.
        if stop_at == Some(id) {
            return RenderOutcome::Stop;
        }

        let item = self.item(id);
        if !item.visible {
            return RenderOutcome::Ok;
        }
        if item.ctm.determinant().abs() < 1e-18 {
            return RenderOutcome::Ok;
        }
        let forcecache = item.filter.is_some() && render_filters;

        if outline {
            self.render_outline(id, dc, rc, area, flags);
            return RenderOutcome::Ok;
        }

        let Some(mut carea) = opt_intersect(Some(area), item.drawbox) else {
            return RenderOutcome::Ok;
        };

        // Filters consume surroundings; render their full dependent area.
        if forcecache {
            let iarea = self.cache_rect(id).or_else(|| {
                let info = FilterInfo {
                    ctm: item.ctm,
                    item_bbox: item.item_bbox,
                };
                let enlarged = item
                    .filter
                    .as_ref()
                    .map(|f| f.area_enlarge(carea, &info))?;
                opt_intersect(Some(enlarged), item.drawbox)
            });
            if let Some(iarea) = iarea {
                match opt_intersect(Some(iarea), item.drawbox) {
                    Some(expanded) => carea = expanded,
                    None => return RenderOutcome::Ok,
                }
            }
        }

        let device_scale = dc.device_scale();

        // Paint whatever the cache already has, shrinking the area to the
        // still-dirty part.
        let cache_slot = if flags.contains(RenderFlags::BYPASS_CACHE) {
            None
        } else {
            item.cache.clone()
        };
        let mut held_guard = None;
        let mut carea_opt = Some(carea);
        if let Some(slot) = cache_slot.as_ref() {
            if let Ok(mut guard) = slot.lock() {
                if let Some(cache) = guard.as_mut() {
                    if cache.surface().device_scale() != device_scale {
                        cache.mark_dirty(IntRect::INFINITE);
                    }
                    cache.prepare();
                    dc.set_operator(CompositeOp::Blend(item.blend_mode));
                    cache.paint_from_cache(dc, &mut carea_opt, forcecache);
                    if carea_opt.is_none() {
                        return RenderOutcome::Ok;
                    }
                } else {
                    // No surface yet: caching was enabled after the last
                    // update, or the item was off-canvas before.
                    let rect = self.cache_rect(id).unwrap_or(carea);
                    *guard = Some(DrawingCache::new(rect, device_scale));
                }
                if forcecache {
                    // Filter passes need the cache contents to stay put
                    // for the whole render.
                    held_guard = Some(guard);
                }
            }
        }
        let carea = match carea_opt {
            Some(c) => c,
            None => return RenderOutcome::Ok,
        };

        let greyscale = self.color_mode() == ColorMode::Grayscale && !outline;
        let isolate_root = item.contains_unisolated_blend || greyscale;
        let needs_intermediate = item.clip.is_some()
            || item.mask.is_some()
            || (item.filter.is_some() && render_filters)
            || item.opacity < 0.995
            || item.blend_mode != BlendMode::Normal
            || item.isolation
            || (item.child_type == ChildType::Root && isolate_root)
            || item.cache.is_some();

        // Clipping, masking, filters and opacity do not apply when
        // rendering the ancestors of a filtered element for its backdrop.
        if flags.contains(RenderFlags::FILTER_BACKGROUND) || !needs_intermediate {
            dc.set_operator(CompositeOp::Blend(BlendMode::Normal));
            return self.render_kind(
                id,
                dc,
                rc,
                carea,
                flags & !RenderFlags::FILTER_BACKGROUND,
                stop_at,
            );
        }

        // Clipping, masking and opacity are applied by rendering them into
        // an intermediate surface and compositing the item's own rendering
        // onto it with the IN operator.
        let mut ict = dc.create_similar(carea);
        ict.set_antialias(item.antialias);

        // 1. The base layer: the opacity, restricted by the clip. SOURCE
        // instead of OVER so overlapping clip children stay correct.
        ict.set_source_color(Color::rgba(0.0, 0.0, 0.0, item.opacity));
        ict.set_operator(CompositeOp::Source);
        ict.paint();
        if let Some(clip) = item.clip {
            ict.push_group();
            self.clip_item(clip, &mut *ict, rc, carea);
            ict.pop_group_to_source();
            ict.set_operator(CompositeOp::In);
            ict.paint();
        }
        ict.set_operator(CompositeOp::Over);

        // 2. The mask, its premultiplied luminance turned into alpha.
        if let Some(mask) = item.mask {
            ict.push_group();
            self.render_item(mask, &mut *ict, rc, carea, flags, None);
            ict.filter_group_target(&mut luminance_to_alpha);
            ict.pop_group_to_source();
            ict.set_operator(CompositeOp::In);
            ict.paint();
            ict.set_operator(CompositeOp::Over);
        }

        // 3. The item itself.
        ict.push_group();
        let render_result = self.render_kind(id, &mut *ict, rc, carea, flags, stop_at);

        // 4. The filter, with the rendered backdrop when it wants one.
        if render_filters {
            if let Some(filter) = &item.filter {
                let info = FilterInfo {
                    ctm: item.ctm,
                    item_bbox: item.item_bbox,
                };
                let mut background = None;
                if filter.uses_background() && item.background_accumulate {
                    // The nearest ancestor that either starts a background
                    // or interrupts accumulation with its own filter.
                    let mut bg_root = item.parent;
                    while let Some(b) = bg_root {
                        let bi = self.item(b);
                        if bi.background_new || bi.filter.is_some() {
                            break;
                        }
                        bg_root = bi.parent;
                    }
                    if let Some(bg_root) = bg_root {
                        let mut bg_dc = dc.create_similar(carea);
                        self.render_item(
                            bg_root,
                            &mut *bg_dc,
                            rc,
                            carea,
                            flags | RenderFlags::FILTER_BACKGROUND,
                            Some(id),
                        );
                        background = Some(bg_dc.finish());
                    }
                }
                filter.render(&info, &mut *ict, background.as_ref(), &rc);
            }
        }

        // 4b. Grayscale conversion at the root.
        if greyscale && item.child_type == ChildType::Root {
            let matrix = self.options.grayscale_matrix;
            ict.filter_group_target(&mut |surface| apply_color_matrix(surface, &matrix));
        }

        // 5. Compose against the accumulated clip+mask+opacity alpha.
        ict.pop_group_to_source();
        ict.set_operator(CompositeOp::In);
        ict.paint();

        let intermediate = ict.finish();

        // 6. Blit into the cache and mark the area clean.
        if let Some(slot) = cache_slot.as_ref() {
            let guard = match held_guard.take() {
                Some(guard) => Some(guard),
                None => slot.lock().ok(),
            };
            if let Some(mut guard) = guard {
                if let Some(cache) = guard.as_mut() {
                    cache.surface_mut().copy_rect_from(&intermediate, carea);
                    cache.mark_clean(carea);
                }
            }
        }

        // 7. Paint onto the base context with the item's blend mode.
        if !flags.contains(RenderFlags::CACHE_ONLY) {
            dc.rectangle(carea.to_rect());
            dc.set_source_surface(&intermediate);
            dc.set_operator(CompositeOp::Blend(item.blend_mode));
            dc.fill();
        }

        render_result
    }

    fn render_kind(
        &self,
        id: ItemId,
        dc: &mut dyn DrawingContext,
        rc: RenderContext,
        area: IntRect,
        flags: RenderFlags,
        stop_at: Option<ItemId>,
    ) -> RenderOutcome {
        match self.item(id).data.kind() {
            ItemKind::Group | ItemKind::Pattern => {
                self.render_group_children(id, dc, rc, area, flags, stop_at)
            }
            ItemKind::Shape => {
                self.render_shape(id, dc, rc, area, flags);
                RenderOutcome::Ok
            }
            ItemKind::Text => {
                self.render_text(id, dc, rc, area, flags);
                RenderOutcome::Ok
            }
            // Glyphs are painted by their text parent.
            ItemKind::Glyph => RenderOutcome::Ok,
            ItemKind::Image => {
                self.render_image(id, dc);
                RenderOutcome::Ok
            }
        }
    }

    fn render_group_children(
        &self,
        id: ItemId,
        dc: &mut dyn DrawingContext,
        rc: RenderContext,
        area: IntRect,
        flags: RenderFlags,
        stop_at: Option<ItemId>,
    ) -> RenderOutcome {
        let children = &self.item(id).children;
        match stop_at {
            None => {
                for &child in children {
                    self.render_item(child, dc, rc, area, flags, stop_at);
                }
            }
            Some(stop) => {
                // Background rendering: draw everything below the stopped
                // item; its ancestors render bare, the item not at all.
                for &child in children {
                    if child == stop {
                        return RenderOutcome::Ok;
                    }
                    if self.is_ancestor_of(child, stop) {
                        self.render_item(
                            child,
                            dc,
                            rc,
                            area,
                            flags | RenderFlags::FILTER_BACKGROUND,
                            stop_at,
                        );
                        return RenderOutcome::Ok;
                    }
                    self.render_item(child, dc, rc, area, flags, stop_at);
                }
            }
        }
        RenderOutcome::Ok
    }

    fn render_shape(
        &self,
        id: ItemId,
        dc: &mut dyn DrawingContext,
        rc: RenderContext,
        area: IntRect,
        flags: RenderFlags,
    ) {
        let item = self.item(id);
        let ItemData::Shape(shape) = &item.data else {
            return;
        };
        let Some(path) = &shape.path else {
            return;
        };
        if path.elements().is_empty() {
            return;
        }
        dc.set_antialias(item.antialias);

        let style = &shape.style;
        for layer in style.paint_order {
            match layer {
                PaintOrder::Fill if style.fill.is_some() => {
                    dc.save();
                    dc.transform(item.ctm);
                    dc.path(path);
                    dc.set_fill_rule(style.fill_rule);
                    self.set_paint(dc, rc, id, &style.fill, style.fill_opacity, false, area);
                    dc.fill();
                    dc.restore();
                }
                PaintOrder::Stroke if style.stroke.is_some() => {
                    dc.save();
                    dc.transform(item.ctm);
                    dc.path(path);
                    let stroke = &style.stroke_style;
                    if stroke.hairline {
                        if flags.contains(RenderFlags::VISIBLE_HAIRLINES) {
                            let px = dc.device_to_user_distance(Vec2::new(1.0, 0.0));
                            dc.set_line_width(px.hypot());
                        } else {
                            dc.set_hairline();
                        }
                    } else {
                        dc.set_line_width(stroke.width as f64);
                    }
                    dc.set_line_cap(stroke.cap);
                    dc.set_line_join(stroke.join);
                    dc.set_miter_limit(stroke.miter_limit as f64);
                    dc.set_dash(&stroke.dash, stroke.dash_offset);
                    self.set_paint(dc, rc, id, &style.stroke, style.stroke_opacity, true, area);
                    dc.stroke();
                    dc.restore();
                }
                PaintOrder::Markers => {
                    for &marker in &item.children {
                        self.render_item(marker, dc, rc, area, flags, None);
                    }
                }
                _ => {}
            }
        }
    }

    fn render_text(
        &self,
        id: ItemId,
        dc: &mut dyn DrawingContext,
        rc: RenderContext,
        area: IntRect,
        _flags: RenderFlags,
    ) {
        let item = self.item(id);
        let ItemData::Text(_, text) = &item.data else {
            return;
        };
        dc.set_antialias(item.antialias);
        let style = &text.style;

        for layer in style.paint_order {
            match layer {
                PaintOrder::Fill if style.fill.is_some() => {
                    for &gid in &item.children {
                        let glyph_item = self.item(gid);
                        let ItemData::Glyph(glyph) = &glyph_item.data else {
                            continue;
                        };
                        if glyph.path.elements().is_empty() {
                            continue;
                        }
                        dc.save();
                        dc.transform(glyph_item.ctm);
                        dc.path(&glyph.path);
                        dc.set_fill_rule(style.fill_rule);
                        self.set_paint(dc, rc, id, &style.fill, style.fill_opacity, false, area);
                        dc.fill();
                        dc.restore();
                    }
                }
                PaintOrder::Stroke if style.stroke.is_some() => {
                    for &gid in &item.children {
                        let glyph_item = self.item(gid);
                        let ItemData::Glyph(glyph) = &glyph_item.data else {
                            continue;
                        };
                        if glyph.path.elements().is_empty() {
                            continue;
                        }
                        dc.save();
                        dc.transform(glyph_item.ctm);
                        dc.path(&glyph.path);
                        let stroke = &style.stroke_style;
                        dc.set_line_width(stroke.width as f64);
                        dc.set_line_cap(stroke.cap);
                        dc.set_line_join(stroke.join);
                        dc.set_miter_limit(stroke.miter_limit as f64);
                        dc.set_dash(&stroke.dash, stroke.dash_offset);
                        self.set_paint(dc, rc, id, &style.stroke, style.stroke_opacity, true, area);
                        dc.stroke();
                        dc.restore();
                    }
                }
                _ => {}
            }
        }

        self.render_text_decorations(id, dc, rc, area);
    }

    fn render_text_decorations(
        &self,
        id: ItemId,
        dc: &mut dyn DrawingContext,
        rc: RenderContext,
        area: IntRect,
    ) {
        let item = self.item(id);
        let ItemData::Text(_, text) = &item.data else {
            return;
        };
        let deco = &text.decorations;
        if !(deco.underline || deco.overline || deco.line_through) {
            return;
        }
        let thickness = if deco.thickness > 0.0 {
            deco.thickness
        } else {
            0.05
        };
        let paint = match deco.color {
            Some(c) => PaintSource::Color(c),
            None => text.style.fill,
        };

        for &gid in &item.children {
            let glyph_item = self.item(gid);
            let ItemData::Glyph(glyph) = &glyph_item.data else {
                continue;
            };
            // Decoration positions in glyph space: the baseline at y = 0,
            // ascent above it.
            let mut lines = Vec::new();
            if deco.underline {
                lines.push(glyph.descent * 0.5);
            }
            if deco.overline {
                lines.push(-glyph.ascent);
            }
            if deco.line_through {
                lines.push(-glyph.ascent * 0.4);
            }
            for y in lines {
                dc.save();
                dc.transform(glyph_item.ctm);
                dc.rectangle(Rect::new(
                    0.0,
                    y - thickness / 2.0,
                    glyph.advance,
                    y + thickness / 2.0,
                ));
                self.set_paint(dc, rc, id, &paint, 1.0, false, area);
                dc.fill();
                dc.restore();
            }
        }
    }

    fn render_image(&self, id: ItemId, dc: &mut dyn DrawingContext) {
        let item = self.item(id);
        let ItemData::Image(image) = &item.data else {
            return;
        };
        let src = image.pixels.area();
        if src.is_empty() || image.dest_rect.area() == 0.0 {
            return;
        }
        dc.save();
        dc.set_antialias(item.antialias);
        // Map the surface's pixel rectangle onto the placement rectangle.
        let fit = Affine::translate((image.dest_rect.x0, image.dest_rect.y0))
            * Affine::scale_non_uniform(
                image.dest_rect.width() / src.width() as f64,
                image.dest_rect.height() / src.height() as f64,
            )
            * Affine::translate((-src.x0 as f64, -src.y0 as f64));
        dc.transform(item.ctm * fit);
        dc.rectangle(src.to_rect());
        dc.set_source_surface(&image.pixels);
        dc.fill();
        dc.restore();
    }

    /// Set the source for a fill or stroke, consulting the pattern engine
    /// for patterned paints.
    fn set_paint(
        &self,
        dc: &mut dyn DrawingContext,
        rc: RenderContext,
        id: ItemId,
        paint: &PaintSource,
        opacity: f32,
        stroke: bool,
        area: IntRect,
    ) {
        match paint {
            PaintSource::None => {}
            PaintSource::Color(color) => dc.set_source_color(color.with_opacity(opacity)),
            PaintSource::Pattern => {
                let item = self.item(id);
                let pattern = if stroke {
                    item.stroke_pattern
                } else {
                    item.fill_pattern
                };
                let device_scale = dc.device_scale();
                let tile = pattern.and_then(|pid| {
                    self.render_pattern(pid, dc, rc, area, opacity, device_scale)
                });
                match tile {
                    Some(tile) => dc.set_source_tile(&tile),
                    None => dc.set_source_color(Color::rgba(0.0, 0.0, 0.0, 0.0)),
                }
            }
        }
    }

    /// Outline rendering: structure only, painted in the wireframe colours.
    fn render_outline(
        &self,
        id: ItemId,
        dc: &mut dyn DrawingContext,
        rc: RenderContext,
        area: IntRect,
        flags: RenderFlags,
    ) {
        let item = self.item(id);
        if let Some(clip) = item.clip {
            let clip_rc = RenderContext {
                outline_color: self.options.clip_outline_color,
                ..rc
            };
            self.render_outline(clip, dc, clip_rc, area, flags);
        }
        if let Some(mask) = item.mask {
            let mask_rc = RenderContext {
                outline_color: self.options.mask_outline_color,
                ..rc
            };
            self.render_outline(mask, dc, mask_rc, area, flags);
        }

        match &item.data {
            ItemData::Group(_) | ItemData::Pattern(..) => {
                for &child in &item.children {
                    self.render_item(child, dc, rc, area, flags, None);
                }
            }
            ItemData::Text(..) => {
                for &gid in &item.children {
                    let glyph_item = self.item(gid);
                    if let ItemData::Glyph(glyph) = &glyph_item.data {
                        if glyph.path.elements().is_empty() {
                            continue;
                        }
                        stroke_outline(dc, glyph_item.ctm, &glyph.path, rc.outline_color);
                    }
                }
            }
            ItemData::Shape(shape) => {
                if let Some(path) = &shape.path {
                    if !path.elements().is_empty() {
                        stroke_outline(dc, item.ctm, path, rc.outline_color);
                    }
                }
            }
            ItemData::Glyph(glyph) => {
                if !glyph.path.elements().is_empty() {
                    stroke_outline(dc, item.ctm, &glyph.path, rc.outline_color);
                }
            }
            ItemData::Image(image) => {
                if self.options.image_outline_mode {
                    self.render_image(id, dc);
                } else {
                    dc.save();
                    dc.transform(item.ctm);
                    dc.rectangle(image.dest_rect);
                    dc.set_source_color(Color::from_rgba32(self.options.image_outline_color));
                    let px = dc.device_to_user_distance(Vec2::new(1.0, 0.0));
                    dc.set_line_width(px.hypot() * 0.5);
                    dc.stroke();
                    dc.restore();
                }
            }
        }
    }

    /// Paint the clip geometry of an item: shapes fill with their clip
    /// rule, containers recurse.
    pub(crate) fn clip_item(
        &self,
        id: ItemId,
        dc: &mut dyn DrawingContext,
        rc: RenderContext,
        area: IntRect,
    ) {
        let item = self.item(id);
        if !item.visible {
            return;
        }
        match &item.data {
            ItemData::Shape(shape) => {
                if let Some(path) = &shape.path {
                    // The item's own clip restricts its clipping effect.
                    if let Some(nested) = item.clip {
                        dc.push_group();
                        dc.save();
                        dc.transform(item.ctm);
                        dc.path(path);
                        dc.set_fill_rule(shape.style.fill_rule);
                        dc.set_source_color(Color::BLACK);
                        dc.fill();
                        dc.restore();
                        dc.push_group();
                        self.clip_item(nested, dc, rc, area);
                        dc.pop_group_to_source();
                        dc.set_operator(CompositeOp::In);
                        dc.paint();
                        dc.pop_group_to_source();
                        dc.set_operator(CompositeOp::Over);
                        dc.paint();
                    } else {
                        dc.save();
                        dc.transform(item.ctm);
                        dc.path(path);
                        dc.set_fill_rule(shape.style.fill_rule);
                        dc.set_source_color(Color::BLACK);
                        dc.fill();
                        dc.restore();
                    }
                }
            }
            ItemData::Group(_) | ItemData::Pattern(..) | ItemData::Text(..) => {
                for &child in &item.children {
                    self.clip_item(child, dc, rc, area);
                }
            }
            _ => {}
        }
    }
}

fn stroke_outline(dc: &mut dyn DrawingContext, ctm: Affine, path: &kurbo::BezPath, color: u32) {
    dc.save();
    dc.transform(ctm);
    dc.path(path);
    dc.set_source_color(Color::from_rgba32(color));
    let px = dc.device_to_user_distance(Vec2::new(1.0, 0.0));
    dc.set_line_width(px.hypot() * 0.5);
    dc.stroke();
    dc.restore();
}

/// Convert premultiplied luminance to alpha, in place.
///
/// The operation unpremul -> luminance-to-alpha -> multiply-by-alpha is
/// equivalent to luminance-to-alpha on the premultiplied values; the
/// integer coefficients add up to 512.
pub(crate) fn luminance_to_alpha(surface: &mut Surface) {
    surface.filter_pixels(|[r, g, b, _]| {
        let ao = r as u32 * 109 + g as u32 * 366 + b as u32 * 37;
        [0, 0, 0, ((ao + 256) >> 9) as u8]
    });
}

/// Apply a 4x5 colour matrix to straight RGBA, in place.
pub(crate) fn apply_color_matrix(surface: &mut Surface, m: &[f64; 20]) {
    surface.filter_pixels(|[r, g, b, a]| {
        if a == 0 {
            return [0, 0, 0, 0];
        }
        let af = a as f64 / 255.0;
        // Unpremultiply, transform, re-premultiply.
        let rf = r as f64 / 255.0 / af;
        let gf = g as f64 / 255.0 / af;
        let bf = b as f64 / 255.0 / af;
        let nr = m[0] * rf + m[1] * gf + m[2] * bf + m[3] * af + m[4];
        let ng = m[5] * rf + m[6] * gf + m[7] * bf + m[8] * af + m[9];
        let nb = m[10] * rf + m[11] * gf + m[12] * bf + m[13] * af + m[14];
        let na = (m[15] * rf + m[16] * gf + m[17] * bf + m[18] * af + m[19]).clamp(0.0, 1.0);
        [
            ((nr * na).clamp(0.0, 1.0) * 255.0).round() as u8,
            ((ng * na).clamp(0.0, 1.0) * 255.0).round() as u8,
            ((nb * na).clamp(0.0, 1.0) * 255.0).round() as u8,
            (na * 255.0).round() as u8,
        ]
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::recording::{Call, RecordingContext};
    use crate::drawing::DrawingOptions;
    use crate::style::ShapeStyle;
    use crate::types::StateFlags;
    use std::rc::Rc;
    use std::sync::Arc;

    fn simple_drawing() -> (Drawing, ItemId, ItemId) {
        let mut drawing = Drawing::new(DrawingOptions::default());
        let root = drawing.new_group();
        drawing.set_root(Some(root));
        let shape = drawing.new_shape();
        let mut path = kurbo::BezPath::new();
        path.move_to((0.0, 0.0));
        path.line_to((10.0, 0.0));
        path.line_to((10.0, 10.0));
        path.close_path();
        drawing.set_path(shape, Some(Arc::new(path)));
        drawing.set_style(shape, ShapeStyle::filled(Color::BLACK));
        drawing.append_child(root, shape);
        (drawing, root, shape)
    }

    #[test]
    fn invisible_items_render_nothing() {
        let (mut drawing, _root, shape) = simple_drawing();
        drawing
            .update(IntRect::INFINITE, Affine::IDENTITY, StateFlags::ALL, StateFlags::empty())
            .unwrap();
        drawing.set_visible(shape, false);

        let mut dc = RecordingContext::new();
        let calls = Rc::clone(&dc.calls);
        drawing.render(&mut dc, IntRect::new(0, 0, 100, 100), RenderFlags::empty(), None);
        assert!(!calls.borrow().contains(&Call::Fill));
    }

    #[test]
    fn plain_fill_avoids_intermediate_surfaces() {
        let (mut drawing, _root, _shape) = simple_drawing();
        drawing
            .update(IntRect::INFINITE, Affine::IDENTITY, StateFlags::ALL, StateFlags::empty())
            .unwrap();
        let mut dc = RecordingContext::new();
        let calls = Rc::clone(&dc.calls);
        drawing.render(&mut dc, IntRect::new(0, 0, 100, 100), RenderFlags::empty(), None);
        let calls = calls.borrow();
        assert!(calls.contains(&Call::Fill));
        assert!(!calls.contains(&Call::PushGroup));
    }

    #[test]
    fn opacity_forces_intermediate_rendering() {
        let (mut drawing, _root, shape) = simple_drawing();
        drawing.set_opacity(shape, 0.5);
        drawing
            .update(IntRect::INFINITE, Affine::IDENTITY, StateFlags::ALL, StateFlags::empty())
            .unwrap();
        let mut dc = RecordingContext::new();
        let calls = Rc::clone(&dc.calls);
        drawing.render(&mut dc, IntRect::new(0, 0, 100, 100), RenderFlags::empty(), None);
        let calls = calls.borrow();
        // The opacity base layer is painted with the SOURCE operator.
        assert!(calls.contains(&Call::SetOperator(CompositeOp::Source)));
        assert!(calls.contains(&Call::PushGroup));
    }

    #[test]
    fn singular_ctm_is_a_noop() {
        let (mut drawing, _root, shape) = simple_drawing();
        drawing.set_transform(shape, Affine::scale(0.0));
        drawing
            .update(IntRect::INFINITE, Affine::IDENTITY, StateFlags::ALL, StateFlags::empty())
            .unwrap();
        let mut dc = RecordingContext::new();
        let calls = Rc::clone(&dc.calls);
        drawing.render(&mut dc, IntRect::new(0, 0, 100, 100), RenderFlags::empty(), None);
        assert!(!calls.borrow().contains(&Call::Fill));
    }

    #[test]
    fn luminance_formula_matches_integer_coefficients() {
        let mut surface = Surface::new(IntRect::new(0, 0, 1, 1), 1);
        surface.set_pixel(0, 0, [255, 255, 255, 255]);
        luminance_to_alpha(&mut surface);
        // White premul luminance: (255*109 + 255*366 + 255*37 + 256) >> 9.
        let expected = ((255u32 * 512 + 256) >> 9) as u8;
        assert_eq!(surface.pixel(0, 0), [0, 0, 0, expected]);
    }
}
