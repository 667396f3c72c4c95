//! The seam to the filter-effects runtime.

use crate::context::{DrawingContext, RenderContext};
use crate::pixelgeom::IntRect;
use crate::surface::Surface;
use kurbo::{Affine, Rect};

/// What a filter implementation may ask about the item it is attached to.
#[derive(Debug, Clone, Copy)]
pub struct FilterInfo {
    /// Total transform from item space to device pixels.
    pub ctm: Affine,
    /// Geometric bounding box in item space, for filter effect regions in
    /// object-bounding-box units.
    pub item_bbox: Option<Rect>,
}

/// A filter-effects renderer attached to a drawing item.
///
/// The display tree calls these hooks; the filter pipeline itself lives in
/// a collaborating crate.
pub trait Filter {
    /// Refresh internal data after the item was updated.
    fn update(&mut self) {}

    /// Apply the filter to the current group target of `dc`. When the
    /// filter consumes the backdrop, `background` holds the rendered
    /// ancestors up to the background root.
    fn render(
        &self,
        info: &FilterInfo,
        dc: &mut dyn DrawingContext,
        background: Option<&Surface>,
        rc: &RenderContext,
    );

    /// Grow `area` to everything the filter might touch when the given
    /// area changes. Never shrinks.
    fn area_enlarge(&self, area: IntRect, info: &FilterInfo) -> IntRect;

    /// The filter effect region for an item bbox, in item space.
    fn filter_effect_area(&self, item_bbox: Option<Rect>) -> Option<Rect>;

    /// Whether the filter reads the backdrop.
    fn uses_background(&self) -> bool {
        false
    }

    /// A cost multiplier for cache scoring; 1 means as cheap as a plain
    /// group.
    fn complexity(&self, _ctm: Affine) -> f64 {
        1.0
    }
}
