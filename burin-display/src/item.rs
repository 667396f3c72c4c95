//! Drawing items: the nodes of the display tree.

use crate::pixelgeom::{IntPoint, IntRect};
use crate::style::{Antialias, BlendMode, Color, ShapeStyle};
use crate::surface::{DrawingCache, Surface};
use crate::types::StateFlags;
use kurbo::{Affine, BezPath, Rect};
use std::sync::{Arc, Mutex};

/// A stable handle to an item in a [`Drawing`](crate::Drawing).
///
/// Handles are generational: after an item is destroyed, handles to it go
/// stale instead of silently aliasing a newcomer in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// How an item is attached to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChildType {
    /// Not attached anywhere.
    #[default]
    Orphan,
    /// An ordinary child, present in the parent's child sequence.
    Normal,
    /// Attached as the parent's clip.
    Clip,
    /// Attached as the parent's mask.
    Mask,
    /// Attached as the parent's fill pattern.
    Fill,
    /// Attached as the parent's stroke pattern.
    Stroke,
    /// The root of the drawing.
    Root,
}

/// The public discriminant of an item's kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// A transparent container.
    Group,
    /// A styled path.
    Shape,
    /// A tileable subtree used as a paint.
    Pattern,
    /// A group of glyphs with a text style.
    Text,
    /// A single glyph.
    Glyph,
    /// A placed raster image.
    Image,
}

/// Pre-tiling for `overflow: visible` patterns: the tile contents are
/// stamped `steps` times, starting at `initial` and advancing by `step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverflowSpec {
    /// Transform applied before the first copy.
    pub initial: Affine,
    /// Number of copies; 1 disables pre-tiling.
    pub steps: u32,
    /// Transform between consecutive copies.
    pub step: Affine,
}

impl Default for OverflowSpec {
    fn default() -> Self {
        Self {
            initial: Affine::IDENTITY,
            steps: 1,
            step: Affine::IDENTITY,
        }
    }
}

/// Text decoration descriptors carried by a text item's style.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TextDecorations {
    /// Draw a line under the baseline.
    pub underline: bool,
    /// Draw a line over the ascenders.
    pub overline: bool,
    /// Draw a line through the glyphs.
    pub line_through: bool,
    /// Decoration colour; when `None`, the fill paint is used.
    pub color: Option<Color>,
    /// Line thickness in item units.
    pub thickness: f64,
}

/// The immutable data of a glyph item.
#[derive(Debug, Clone)]
pub struct GlyphData {
    /// The glyph outline, shared with the font cache.
    pub path: Arc<BezPath>,
    /// Fallback outline used for the bounding box when the glyph itself is
    /// empty (whitespace).
    pub reference_path: Option<Arc<BezPath>>,
    /// Pre-rendered colour glyph, if the font provides one.
    pub bitmap: Option<Arc<Surface>>,
    /// Advance width in item units.
    pub advance: f64,
    /// Ascent above the baseline.
    pub ascent: f64,
    /// Descent below the baseline.
    pub descent: f64,
    /// Accumulated advance at this glyph, for phasing dashed decorations.
    pub phase_length: f64,
}

/// The data of an image item.
#[derive(Debug, Clone)]
pub struct ImageData {
    /// The pixels.
    pub pixels: Arc<Surface>,
    /// Placement rectangle in item coordinates.
    pub dest_rect: Rect,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct GroupData {
    /// Additional transform applied to children (markers, clip paths).
    pub(crate) child_transform: Option<Affine>,
    /// Whether picking returns the hit child instead of the group.
    pub(crate) pick_children: bool,
}

#[derive(Debug, Default)]
pub(crate) struct ShapeData {
    pub(crate) path: Option<Arc<BezPath>>,
    pub(crate) style: ShapeStyle,
    /// Hit-testing throttle: when a pick was expensive, the next few picks
    /// short-circuit to the previous result.
    pub(crate) repick_after: u32,
    pub(crate) last_pick: Option<ItemId>,
}

pub(crate) struct TileSurface {
    /// Covered rectangle in tile coordinate space.
    pub(crate) rect: IntRect,
    pub(crate) surface: Surface,
}

#[derive(Default)]
pub(crate) struct PatternData {
    pub(crate) tile_rect: Option<Rect>,
    pub(crate) pattern_to_user: Option<Affine>,
    pub(crate) overflow: OverflowSpec,
    /// Tile resolution in device pixels, recomputed each update.
    pub(crate) resolution: IntPoint,
    /// Rendered tile pieces, keyed by tile-space rectangles. Shared with
    /// render passes on other threads.
    pub(crate) tiles: Arc<Mutex<Vec<TileSurface>>>,
}

#[derive(Debug, Default)]
pub(crate) struct TextData {
    pub(crate) style: ShapeStyle,
    pub(crate) decorations: TextDecorations,
}

pub(crate) enum ItemData {
    Group(GroupData),
    Shape(ShapeData),
    Pattern(GroupData, PatternData),
    Text(GroupData, TextData),
    Glyph(GlyphData),
    Image(ImageData),
}

impl ItemData {
    pub(crate) fn kind(&self) -> ItemKind {
        match self {
            Self::Group(..) => ItemKind::Group,
            Self::Shape(..) => ItemKind::Shape,
            Self::Pattern(..) => ItemKind::Pattern,
            Self::Text(..) => ItemKind::Text,
            Self::Glyph(..) => ItemKind::Glyph,
            Self::Image(..) => ItemKind::Image,
        }
    }

    /// The group payload for the container kinds.
    pub(crate) fn group(&self) -> Option<&GroupData> {
        match self {
            Self::Group(g) | Self::Pattern(g, _) | Self::Text(g, _) => Some(g),
            _ => None,
        }
    }
}

/// The per-item cache slot; the surface is created lazily at render time.
pub(crate) type CacheSlot = Arc<Mutex<Option<DrawingCache>>>;

/// One node of the display tree.
pub(crate) struct Item {
    pub(crate) parent: Option<ItemId>,
    pub(crate) child_type: ChildType,
    /// Ordinary children in z-order; front of the list is the bottom.
    pub(crate) children: Vec<ItemId>,
    pub(crate) clip: Option<ItemId>,
    pub(crate) mask: Option<ItemId>,
    pub(crate) fill_pattern: Option<ItemId>,
    pub(crate) stroke_pattern: Option<ItemId>,
    pub(crate) filter: Option<Box<dyn crate::Filter>>,

    /// Incremental transform from the parent's coordinates; `None` is the
    /// identity.
    pub(crate) transform: Option<Affine>,
    /// Total transform from item coordinates to device pixels.
    pub(crate) ctm: Affine,
    /// Geometric bounding box in device pixels, including stroke.
    pub(crate) bbox: Option<IntRect>,
    /// Visual bounding box: enlarged by filters, shrunk by clip and mask.
    pub(crate) drawbox: Option<IntRect>,
    /// Bounding box in item space, for object-bounding-box paint servers
    /// and filter regions.
    pub(crate) item_bbox: Option<Rect>,

    pub(crate) opacity: f32,
    pub(crate) blend_mode: BlendMode,
    pub(crate) isolation: bool,
    pub(crate) antialias: Antialias,
    pub(crate) visible: bool,
    pub(crate) sensitive: bool,

    pub(crate) vector_effect_fixed: bool,
    pub(crate) vector_effect_size: bool,
    pub(crate) vector_effect_rotate: bool,

    pub(crate) state: StateFlags,
    pub(crate) propagate_state: StateFlags,
    pub(crate) background_new: bool,
    pub(crate) background_accumulate: bool,

    pub(crate) update_complexity: u32,
    pub(crate) contains_unisolated_blend: bool,

    pub(crate) cache: Option<CacheSlot>,
    pub(crate) cached_persistent: bool,
    /// Whether this item currently sits in the drawing's cache candidate
    /// list.
    pub(crate) has_cache_candidate: bool,

    pub(crate) data: ItemData,
}

impl Item {
    pub(crate) fn new(data: ItemData) -> Self {
        Self {
            parent: None,
            child_type: ChildType::Orphan,
            children: Vec::new(),
            clip: None,
            mask: None,
            fill_pattern: None,
            stroke_pattern: None,
            filter: None,
            transform: None,
            ctm: Affine::IDENTITY,
            bbox: None,
            drawbox: None,
            item_bbox: None,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            isolation: false,
            antialias: Antialias::Good,
            visible: true,
            sensitive: true,
            vector_effect_fixed: false,
            vector_effect_size: false,
            vector_effect_rotate: false,
            state: StateFlags::empty(),
            propagate_state: StateFlags::empty(),
            background_new: false,
            background_accumulate: false,
            update_complexity: 0,
            contains_unisolated_blend: false,
            cache: None,
            cached_persistent: false,
            has_cache_candidate: false,
            data,
        }
    }

    /// Whether the item carries a blend mode that leaks through its
    /// ancestors.
    pub(crate) fn unisolated_blend(&self) -> bool {
        if self.blend_mode != BlendMode::Normal {
            true
        } else if self.mask.is_some()
            || self.filter.is_some()
            || self.opacity < 0.995
            || self.isolation
        {
            false
        } else {
            self.contains_unisolated_blend
        }
    }

    /// Whether rendering this item must go through an intermediate
    /// surface even without caching.
    pub(crate) fn is_isolated(&self) -> bool {
        self.mask.is_some()
            || self.filter.is_some()
            || self.opacity < 0.995
            || self.blend_mode != BlendMode::Normal
            || self.isolation
            || self.child_type == ChildType::Root
    }
}
