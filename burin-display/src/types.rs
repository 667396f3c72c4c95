//! Flag bitsets and rendering modes.

use bitflags::bitflags;

bitflags! {
    /// Options for a render pass.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RenderFlags: u32 {
        /// Only render into caches, not the target context.
        const CACHE_ONLY = 1 << 0;
        /// Ignore caches entirely for this pass.
        const BYPASS_CACHE = 1 << 1;
        /// Render ancestors of a filtered item for a background-consuming
        /// filter: clips, masks, filters and opacity are skipped.
        const FILTER_BACKGROUND = 1 << 2;
        /// Outline mode: draw outlines only.
        const OUTLINE = 1 << 3;
        /// Disable filters.
        const NO_FILTERS = 1 << 4;
        /// Stroke hairlines with a visible one-pixel width.
        const VISIBLE_HAIRLINES = 1 << 5;
    }
}

bitflags! {
    /// Which derived data of an item are up to date.
    ///
    /// A set bit always means the corresponding data is current; mutators
    /// clear bits, only [`update`](crate::Drawing::update) sets them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StateFlags: u32 {
        /// Bounding boxes are up to date.
        const BBOX = 1 << 0;
        /// Cache extents and clean area are up to date.
        const CACHE = 1 << 1;
        /// Pick requests can be processed.
        const PICK = 1 << 2;
        /// The item can be rendered.
        const RENDER = 1 << 3;
        /// Filter background data is up to date.
        const BACKGROUND = 1 << 4;
        /// All of the above.
        const ALL = (1 << 5) - 1;
        /// Used as a reset flag only: the node's caches are wholly invalid.
        const TOTAL_INV = 1 << 5;
    }
}

bitflags! {
    /// Options for picking.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PickFlags: u32 {
        /// Ignore visibility and sensitivity.
        const STICKY = 1 << 0;
        /// Pick with no stroke and opaque fill, regardless of style.
        const AS_CLIP = 1 << 1;
        /// Pick in outline mode.
        const OUTLINE = 1 << 2;
    }
}

/// The overall rendering mode of a drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Full rendering.
    #[default]
    Normal,
    /// Outlines only.
    Outline,
    /// Full rendering with filters disabled.
    NoFilters,
    /// Full rendering with hairlines visibly stroked.
    VisibleHairlines,
}

impl RenderMode {
    pub(crate) fn render_flags(self) -> RenderFlags {
        match self {
            Self::Normal => RenderFlags::empty(),
            Self::Outline => RenderFlags::OUTLINE,
            Self::NoFilters => RenderFlags::NO_FILTERS,
            Self::VisibleHairlines => RenderFlags::VISIBLE_HAIRLINES,
        }
    }
}

/// The colour mode of a drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorMode {
    /// Normal colours.
    #[default]
    Normal,
    /// The whole drawing is converted through the grayscale matrix.
    Grayscale,
}

/// Result of rendering a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RenderOutcome {
    /// Rendering proceeded normally.
    Ok,
    /// The `stop_at` item was reached.
    Stop,
}
