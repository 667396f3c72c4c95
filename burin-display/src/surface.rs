//! Premultiplied-RGBA raster surfaces and the per-item render cache.

use crate::pixelgeom::{IntRect, Region};
use bytemuck::{Pod, Zeroable};
use kurbo::Affine;

/// A premultiplied RGBA8 pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable, Default)]
#[repr(C)]
pub(crate) struct PremulRgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// A raster surface that remembers its device-pixel origin.
///
/// Pixels are premultiplied RGBA8 in row-major order. The surface covers
/// the logical rectangle `area()` of the drawing's device-pixel space; on
/// hidpi outputs each logical pixel is `device_scale` physical pixels wide.
#[derive(Debug, Clone)]
pub struct Surface {
    area: IntRect,
    device_scale: i32,
    buf: Vec<PremulRgba8>,
}

impl Surface {
    /// Create a transparent surface covering `area`.
    pub fn new(area: IntRect, device_scale: i32) -> Self {
        let device_scale = device_scale.max(1);
        let len = (area.area() * (device_scale as i64) * (device_scale as i64)) as usize;
        Self {
            area,
            device_scale,
            buf: vec![PremulRgba8::default(); len],
        }
    }

    /// The logical device-pixel rectangle the surface covers.
    pub fn area(&self) -> IntRect {
        self.area
    }

    /// Physical pixels per logical pixel.
    pub fn device_scale(&self) -> i32 {
        self.device_scale
    }

    /// Physical width in pixels.
    pub fn pixel_width(&self) -> u32 {
        (self.area.width() * self.device_scale) as u32
    }

    /// Physical height in pixels.
    pub fn pixel_height(&self) -> u32 {
        (self.area.height() * self.device_scale) as u32
    }

    /// The raw pixel bytes, `[r, g, b, a]` premultiplied, row-major.
    pub fn data(&self) -> &[u8] {
        bytemuck::cast_slice(&self.buf)
    }

    /// Mutable access to the raw pixel bytes.
    pub fn data_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.buf)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * self.pixel_width() as usize + x as usize
    }

    /// Read one physical pixel as `[r, g, b, a]`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let p = self.buf[self.index(x, y)];
        [p.r, p.g, p.b, p.a]
    }

    /// Write one physical pixel.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let i = self.index(x, y);
        self.buf[i] = PremulRgba8 {
            r: rgba[0],
            g: rgba[1],
            b: rgba[2],
            a: rgba[3],
        };
    }

    /// Clear to transparent.
    pub fn clear(&mut self) {
        self.buf.fill(PremulRgba8::default());
    }

    /// Apply a function to every pixel.
    pub fn filter_pixels(&mut self, mut f: impl FnMut([u8; 4]) -> [u8; 4]) {
        for p in &mut self.buf {
            let [r, g, b, a] = f([p.r, p.g, p.b, p.a]);
            *p = PremulRgba8 { r, g, b, a };
        }
    }

    /// Multiply every pixel by an opacity; the premultiplied equivalent of
    /// compositing `(0, 0, 0, opacity)` with the DEST_IN operator.
    pub fn apply_opacity(&mut self, opacity: f32) {
        let opacity = opacity.clamp(0.0, 1.0);
        let scale = (opacity * 256.0) as u32;
        self.filter_pixels(|[r, g, b, a]| {
            [
                ((r as u32 * scale) >> 8) as u8,
                ((g as u32 * scale) >> 8) as u8,
                ((b as u32 * scale) >> 8) as u8,
                ((a as u32 * scale) >> 8) as u8,
            ]
        });
    }

    /// Copy the pixels of `rect` (in logical coordinates, which must lie in
    /// both surfaces) from another surface of the same device scale.
    pub fn copy_rect_from(&mut self, src: &Self, rect: IntRect) {
        debug_assert_eq!(self.device_scale, src.device_scale);
        let Some(rect) = rect
            .intersect(&self.area)
            .and_then(|r| r.intersect(&src.area))
        else {
            return;
        };
        let scale = self.device_scale;
        let w = (rect.width() * scale) as usize;
        for row in 0..(rect.height() * scale) as u32 {
            let sy = ((rect.y0 - src.area.y0) * scale) as u32 + row;
            let dy = ((rect.y0 - self.area.y0) * scale) as u32 + row;
            let sx = ((rect.x0 - src.area.x0) * scale) as u32;
            let dx = ((rect.x0 - self.area.x0) * scale) as u32;
            let si = src.index(sx, sy);
            let di = self.index(dx, dy);
            let (src_row, dst_row) = (&src.buf[si..si + w], &mut self.buf[di..di + w]);
            dst_row.copy_from_slice(src_row);
        }
    }

    /// Composite another surface over this one with its area translated by
    /// whole pixels; source pixels replace destination pixels.
    pub fn blit_translated(&mut self, src: &Self, dx: i32, dy: i32) {
        debug_assert_eq!(self.device_scale, src.device_scale);
        let shifted_area = src.area.translated(dx, dy);
        let Some(overlap) = shifted_area.intersect(&self.area) else {
            return;
        };
        let scale = self.device_scale;
        let w = (overlap.width() * scale) as usize;
        for row in 0..(overlap.height() * scale) as u32 {
            let sy = ((overlap.y0 - shifted_area.y0) * scale) as u32 + row;
            let dy_row = ((overlap.y0 - self.area.y0) * scale) as u32 + row;
            let sx = ((overlap.x0 - shifted_area.x0) * scale) as u32;
            let dx_col = ((overlap.x0 - self.area.x0) * scale) as u32;
            let si = src.index(sx, sy);
            let di = self.index(dx_col, dy_row);
            let (src_row, dst_row) = (&src.buf[si..si + w], &mut self.buf[di..di + w]);
            dst_row.copy_from_slice(src_row);
        }
    }

    /// Average colour over the whole surface, returned as straight
    /// (unpremultiplied) RGBA in `[0, 1]`.
    pub fn average_color(&self) -> (f64, f64, f64, f64) {
        let mut sum = [0f64; 4];
        for p in &self.buf {
            sum[0] += p.r as f64;
            sum[1] += p.g as f64;
            sum[2] += p.b as f64;
            sum[3] += p.a as f64;
        }
        let n = self.buf.len().max(1) as f64;
        let a = sum[3] / n / 255.0;
        if a <= 0.0 {
            return (0.0, 0.0, 0.0, 0.0);
        }
        // Undo premultiplication on the averages.
        (
            (sum[0] / n / 255.0) / a,
            (sum[1] / n / 255.0) / a,
            (sum[2] / n / 255.0) / a,
            a,
        )
    }

    /// Encode the surface as a PNG.
    pub fn to_png(&self) -> Vec<u8> {
        use image::{codecs::png::PngEncoder, ExtendedColorType, ImageEncoder};
        let mut out = Vec::new();
        let encoder = PngEncoder::new(std::io::Cursor::new(&mut out));
        // PNG wants straight alpha.
        let mut straight = self.data().to_vec();
        for px in straight.chunks_exact_mut(4) {
            let a = px[3] as u32;
            if a > 0 && a < 255 {
                px[0] = (px[0] as u32 * 255 / a).min(255) as u8;
                px[1] = (px[1] as u32 * 255 / a).min(255) as u8;
                px[2] = (px[2] as u32 * 255 / a).min(255) as u8;
            }
        }
        encoder
            .write_image(
                &straight,
                self.pixel_width(),
                self.pixel_height(),
                ExtendedColorType::Rgba8,
            )
            .expect("in-memory png encoding cannot fail");
        out
    }
}

/// Whether an affine is a whole-pixel translation.
fn integer_translation(affine: Affine) -> Option<(i32, i32)> {
    let c = affine.as_coeffs();
    let linear_identity = (c[0] - 1.0).abs() < 1e-9
        && c[1].abs() < 1e-9
        && c[2].abs() < 1e-9
        && (c[3] - 1.0).abs() < 1e-9;
    if !linear_identity {
        return None;
    }
    let (dx, dy) = (c[4].round(), c[5].round());
    if (c[4] - dx).abs() < 1e-6 && (c[5] - dy).abs() < 1e-6 {
        Some((dx as i32, dy as i32))
    } else {
        None
    }
}

/// A cached rendering of one item: a surface plus the record of which of
/// its pixels currently hold valid output.
///
/// Transforms scheduled during update are deferred to
/// [`prepare`](Self::prepare) at render time, so an item whose caching is
/// turned off before the next render never pays for the move.
#[derive(Debug)]
pub struct DrawingCache {
    surface: Surface,
    clean: Region,
    pending: Option<(IntRect, Affine)>,
}

impl DrawingCache {
    /// Create a cache covering `area`, entirely dirty.
    pub fn new(area: IntRect, device_scale: i32) -> Self {
        Self {
            surface: Surface::new(area, device_scale),
            clean: Region::new(),
            pending: None,
        }
    }

    /// The cached surface.
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Mutable access to the cached surface, for painting rendered results
    /// into it.
    pub fn surface_mut(&mut self) -> &mut Surface {
        &mut self.surface
    }

    /// The currently valid region, always a subset of the surface's pixel
    /// rectangle.
    pub fn clean_region(&self) -> &Region {
        &self.clean
    }

    /// Invalidate an area (or everything, with [`IntRect::INFINITE`]).
    pub fn mark_dirty(&mut self, area: IntRect) {
        self.clean.subtract(&area);
    }

    /// Declare an area of the surface valid.
    pub fn mark_clean(&mut self, area: IntRect) {
        let Some(area) = area.intersect(&self.surface.area()) else {
            return;
        };
        self.clean.add(area);
    }

    /// Record that, at the next render, the cache contents should move to
    /// `new_area` under `transform`.
    pub fn schedule_transform(&mut self, new_area: IntRect, transform: Affine) {
        let combined = match self.pending {
            Some((_, prior)) => transform * prior,
            None => transform,
        };
        self.pending = Some((new_area, combined));
    }

    /// Apply any scheduled transform. Whole-pixel translations slide the
    /// surface contents and clean region; anything else dirties everything.
    pub fn prepare(&mut self) {
        let Some((new_area, transform)) = self.pending.take() else {
            return;
        };
        if new_area == self.surface.area() && transform == Affine::IDENTITY {
            return;
        }
        if let Some((dx, dy)) = integer_translation(transform) {
            let mut moved = Surface::new(new_area, self.surface.device_scale());
            let old_shifted = self.surface.area().translated(dx, dy);
            if let Some(overlap) = old_shifted.intersect(&new_area) {
                // Copy via a temporary translated surface to keep the
                // copy's coordinate spaces aligned.
                let mut shifted = Surface::new(old_shifted, self.surface.device_scale());
                shifted.buf = std::mem::take(&mut self.surface.buf);
                moved.copy_rect_from(&shifted, overlap);
            }
            self.surface = moved;
            self.clean.translate(dx, dy);
            self.clean.intersect_with(&new_area);
        } else {
            self.surface = Surface::new(new_area, self.surface.device_scale());
            self.clean.clear();
        }
    }

    /// Paint the clean parts of `area` from the cache into `dc` (with the
    /// operator the caller set), then shrink `area` to the part still in
    /// need of rendering. Filters cannot use partial results, so for
    /// filtered items a partially-dirty area stays whole.
    pub fn paint_from_cache(
        &mut self,
        dc: &mut dyn crate::DrawingContext,
        area: &mut Option<IntRect>,
        is_filter: bool,
    ) {
        let Some(request) = *area else {
            return;
        };
        let uncovered = self.clean.uncovered(request);
        if uncovered.is_empty() {
            dc.rectangle(request.to_rect());
            dc.set_source_surface(&self.surface);
            dc.fill();
            *area = None;
        } else if !is_filter {
            let mut covered = Region::from_rect(request);
            for hole in &uncovered {
                covered.subtract(hole);
            }
            for rect in covered.rects() {
                dc.rectangle(rect.to_rect());
                dc.set_source_surface(&self.surface);
                dc.fill();
            }
            let dirty = uncovered
                .iter()
                .skip(1)
                .fold(uncovered[0], |acc, r| acc.union(r));
            *area = Some(dirty);
        }
    }

    /// Size of the backing pixels in bytes.
    pub fn size_bytes(&self) -> usize {
        self.surface.buf.len() * 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_region_stays_inside_surface() {
        let mut cache = DrawingCache::new(IntRect::new(0, 0, 10, 10), 1);
        cache.mark_clean(IntRect::new(-5, -5, 20, 20));
        for r in cache.clean_region().rects() {
            assert!(cache.surface().area().contains(r));
        }
        assert_eq!(cache.clean_region().area(), 100);
    }

    #[test]
    fn integer_translation_slides_clean_region() {
        let mut cache = DrawingCache::new(IntRect::new(0, 0, 10, 10), 1);
        cache.mark_clean(IntRect::new(0, 0, 10, 10));
        cache.schedule_transform(IntRect::new(3, 0, 13, 10), Affine::translate((3.0, 0.0)));
        cache.prepare();
        assert_eq!(cache.surface().area(), IntRect::new(3, 0, 13, 10));
        assert_eq!(cache.clean_region().area(), 70);
    }

    #[test]
    fn non_translation_dirties_everything() {
        let mut cache = DrawingCache::new(IntRect::new(0, 0, 10, 10), 1);
        cache.mark_clean(IntRect::new(0, 0, 10, 10));
        cache.schedule_transform(IntRect::new(0, 0, 20, 20), Affine::scale(2.0));
        cache.prepare();
        assert!(cache.clean_region().is_empty());
    }

    #[test]
    fn surface_copy_and_opacity() {
        let mut a = Surface::new(IntRect::new(0, 0, 4, 4), 1);
        a.set_pixel(1, 1, [100, 50, 25, 200]);
        let mut b = Surface::new(IntRect::new(0, 0, 4, 4), 1);
        b.copy_rect_from(&a, IntRect::new(0, 0, 4, 4));
        assert_eq!(b.pixel(1, 1), [100, 50, 25, 200]);

        b.apply_opacity(0.5);
        let [r, _, _, a8] = b.pixel(1, 1);
        assert!(r.abs_diff(50) <= 1);
        assert!(a8.abs_diff(100) <= 1);
    }

    #[test]
    fn average_color_unpremultiplies() {
        let mut s = Surface::new(IntRect::new(0, 0, 2, 1), 1);
        // One pixel of 50% red, one transparent.
        s.set_pixel(0, 0, [128, 0, 0, 128]);
        let (r, _, _, a) = s.average_color();
        assert!((a - 0.25).abs() < 0.01);
        assert!((r - 1.0).abs() < 0.02);
    }
}
