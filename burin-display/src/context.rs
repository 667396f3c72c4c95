//! The abstract rasterisation context the display tree renders into.

use crate::pixelgeom::IntRect;
use crate::style::{Antialias, BlendMode, Color, FillRule};
use crate::surface::Surface;
use kurbo::{Affine, BezPath, Cap, Join, Rect, Vec2};

/// Ambient per-pass state threaded through rendering.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext {
    /// The colour outlines are drawn with in outline mode.
    pub outline_color: u32,
    /// Whether the backend should dither gradients.
    pub dithering: bool,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self {
            outline_color: 0xff,
            dithering: false,
        }
    }
}

/// A compositing operator.
///
/// The display tree only needs the Porter-Duff subset listed here plus the
/// CSS blend modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositeOp {
    /// Source over destination.
    #[default]
    Over,
    /// Source where the destination is opaque.
    In,
    /// Replace the destination.
    Source,
    /// Keep the destination where the source is opaque.
    DestIn,
    /// Blend with a CSS blend mode (Normal is equivalent to `Over`).
    Blend(BlendMode),
}

/// A repeating tile source produced by the pattern engine.
///
/// The backend should treat the surface as periodically extended, with
/// `transform` mapping user space to the surface's pixel space.
pub struct TilePattern {
    /// The tile pixels.
    pub surface: Surface,
    /// User space to tile pixel space.
    pub transform: Affine,
}

/// A stateful drawing sink: path construction, fill/stroke, group stack,
/// sources and compositing.
///
/// This is the seam between the display tree and the rasteriser. An
/// implementation wraps a real drawing backend; the tree drives it and
/// composites intermediate results through [`push_group`] /
/// [`pop_group_to_source`] exactly the way a Cairo-style group stack works.
///
/// [`push_group`]: Self::push_group
/// [`pop_group_to_source`]: Self::pop_group_to_source
pub trait DrawingContext {
    /// Save the current graphics state (transform, clip, operator).
    fn save(&mut self);
    /// Restore the last saved graphics state.
    fn restore(&mut self);
    /// Pre-multiply the current transform.
    fn transform(&mut self, affine: Affine);

    /// Begin rendering into a temporary group surface.
    fn push_group(&mut self);
    /// End the current group and set it as the source for painting.
    fn pop_group_to_source(&mut self);
    /// Run a pixel pass over the current group's target surface.
    fn filter_group_target(&mut self, f: &mut dyn FnMut(&mut Surface));

    /// Set the compositing operator for subsequent paints.
    fn set_operator(&mut self, op: CompositeOp);
    /// Use a solid colour as the source.
    fn set_source_color(&mut self, color: Color);
    /// Use a surface as the source, positioned at its own origin.
    fn set_source_surface(&mut self, surface: &Surface);
    /// Use a repeating tile as the source.
    fn set_source_tile(&mut self, pattern: &TilePattern);

    /// Paint the current source through the clip.
    fn paint(&mut self);
    /// Append a rectangle to the current path.
    fn rectangle(&mut self, rect: Rect);
    /// Append a path.
    fn path(&mut self, path: &BezPath);
    /// Fill the current path and clear it.
    fn fill(&mut self);
    /// Fill the current path, keeping it.
    fn fill_preserve(&mut self);
    /// Stroke the current path and clear it.
    fn stroke(&mut self);
    /// Stroke the current path, keeping it.
    fn stroke_preserve(&mut self);
    /// Intersect the clip with the current path and clear the path.
    fn clip(&mut self);

    /// Set the fill rule for subsequent fills.
    fn set_fill_rule(&mut self, rule: FillRule);
    /// Set the antialiasing quality.
    fn set_antialias(&mut self, antialias: Antialias);
    /// Set the stroke width in user units.
    fn set_line_width(&mut self, width: f64);
    /// Stroke subsequent paths with exactly one device pixel.
    fn set_hairline(&mut self);
    /// Set the line cap.
    fn set_line_cap(&mut self, cap: Cap);
    /// Set the line join.
    fn set_line_join(&mut self, join: Join);
    /// Set the miter limit.
    fn set_miter_limit(&mut self, limit: f64);
    /// Set the dash pattern; an empty slice disables dashing.
    fn set_dash(&mut self, dashes: &[f64], offset: f64);

    /// Physical pixels per logical pixel of the target.
    fn device_scale(&self) -> i32;
    /// Transform a distance vector from device to user space.
    fn device_to_user_distance(&self, v: Vec2) -> Vec2;

    /// Create an offscreen context over a fresh RGBA surface covering
    /// `area`, sharing this context's device scale.
    fn create_similar(&self, area: IntRect) -> Box<dyn DrawingContext>;
    /// Finish an offscreen context, yielding its surface.
    fn finish(self: Box<Self>) -> Surface;
}

#[cfg(test)]
pub(crate) mod recording {
    //! A context that records calls, for traversal tests.

    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// One recorded call, condensed to what tests assert on.
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        PushGroup,
        PopGroup,
        SetOperator(CompositeOp),
        SourceColor(Color),
        SourceSurface,
        SourceTile,
        Paint,
        Path,
        Rectangle,
        Fill,
        Stroke,
        Clip,
        FilterTarget,
    }

    pub(crate) struct RecordingContext {
        pub(crate) calls: Rc<RefCell<Vec<Call>>>,
        area: IntRect,
    }

    impl RecordingContext {
        pub(crate) fn new() -> Self {
            Self {
                calls: Rc::new(RefCell::new(Vec::new())),
                area: IntRect::new(-(1 << 20), -(1 << 20), 1 << 20, 1 << 20),
            }
        }

        fn log(&self, call: Call) {
            self.calls.borrow_mut().push(call);
        }
    }

    impl DrawingContext for RecordingContext {
        fn save(&mut self) {}
        fn restore(&mut self) {}
        fn transform(&mut self, _affine: Affine) {}

        fn push_group(&mut self) {
            self.log(Call::PushGroup);
        }
        fn pop_group_to_source(&mut self) {
            self.log(Call::PopGroup);
        }
        fn filter_group_target(&mut self, f: &mut dyn FnMut(&mut Surface)) {
            self.log(Call::FilterTarget);
            let mut scratch = Surface::new(IntRect::new(0, 0, 1, 1), 1);
            f(&mut scratch);
        }

        fn set_operator(&mut self, op: CompositeOp) {
            self.log(Call::SetOperator(op));
        }
        fn set_source_color(&mut self, color: Color) {
            self.log(Call::SourceColor(color));
        }
        fn set_source_surface(&mut self, _surface: &Surface) {
            self.log(Call::SourceSurface);
        }
        fn set_source_tile(&mut self, _pattern: &TilePattern) {
            self.log(Call::SourceTile);
        }

        fn paint(&mut self) {
            self.log(Call::Paint);
        }
        fn rectangle(&mut self, _rect: Rect) {
            self.log(Call::Rectangle);
        }
        fn path(&mut self, _path: &BezPath) {
            self.log(Call::Path);
        }
        fn fill(&mut self) {
            self.log(Call::Fill);
        }
        fn fill_preserve(&mut self) {
            self.log(Call::Fill);
        }
        fn stroke(&mut self) {
            self.log(Call::Stroke);
        }
        fn stroke_preserve(&mut self) {
            self.log(Call::Stroke);
        }
        fn clip(&mut self) {
            self.log(Call::Clip);
        }

        fn set_fill_rule(&mut self, _rule: FillRule) {}
        fn set_antialias(&mut self, _antialias: Antialias) {}
        fn set_line_width(&mut self, _width: f64) {}
        fn set_hairline(&mut self) {}
        fn set_line_cap(&mut self, _cap: Cap) {}
        fn set_line_join(&mut self, _join: Join) {}
        fn set_miter_limit(&mut self, _limit: f64) {}
        fn set_dash(&mut self, _dashes: &[f64], _offset: f64) {}

        fn device_scale(&self) -> i32 {
            1
        }
        fn device_to_user_distance(&self, v: Vec2) -> Vec2 {
            v
        }

        fn create_similar(&self, area: IntRect) -> Box<dyn DrawingContext> {
            // Offscreen calls land in the same log.
            Box::new(Self {
                calls: Rc::clone(&self.calls),
                area,
            })
        }

        fn finish(self: Box<Self>) -> Surface {
            Surface::new(self.area, 1)
        }
    }
}
