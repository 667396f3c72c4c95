//! The drawing: item storage, deferred mutation, modes and cache policy.

use crate::item::{
    CacheSlot, ChildType, GlyphData, GroupData, ImageData, Item, ItemData, ItemId, ItemKind,
    OverflowSpec, PatternData, ShapeData, TextData, TextDecorations,
};
use crate::pixelgeom::IntRect;
use crate::style::{Antialias, BlendMode, ShapeStyle};
use crate::surface::DrawingCache;
use crate::types::{ColorMode, RenderMode, StateFlags};
use kurbo::{Affine, BezPath, Rect};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by tree operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DrawingError {
    /// A parent/child type precondition was violated, e.g. a text item
    /// containing a non-glyph.
    #[error("invalid item in drawing")]
    InvalidItem,
}

/// The default grayscale conversion, a luminance matrix.
const GRAYSCALE_MATRIX: [f64; 20] = [
    0.21, 0.72, 0.072, 0.0, 0.0, //
    0.21, 0.72, 0.072, 0.0, 0.0, //
    0.21, 0.72, 0.072, 0.0, 0.0, //
    0.0, 0.0, 0.0, 1.0, 0.0,
];

fn default_filter_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Injected configuration of a drawing.
///
/// These are the process-wide knobs of the original design (grayscale
/// matrix, filter thread count) plus the preference-backed options, carried
/// per drawing instead of as globals.
#[derive(Debug, Clone)]
pub struct DrawingOptions {
    /// The 4x5 colour matrix applied in grayscale mode.
    pub grayscale_matrix: [f64; 20],
    /// Worker threads filter rendering may use.
    pub filter_threads: usize,
    /// Outline colour for clips (0xRRGGBBAA).
    pub clip_outline_color: u32,
    /// Outline colour for masks.
    pub mask_outline_color: u32,
    /// Outline colour for images.
    pub image_outline_color: u32,
    /// Draw images as images even in outline mode.
    pub image_outline_mode: bool,
    /// Filter quality knob, higher is better.
    pub filter_quality: i32,
    /// Blur quality knob.
    pub blur_quality: i32,
    /// Whether gradients should dither.
    pub dithering: bool,
    /// Picking tolerance in pixels.
    pub cursor_tolerance: f64,
    /// Whether fully transparent items are still pickable.
    pub select_zero_opacity: bool,
    /// Cache budget in bytes; zero disables caching.
    pub cache_budget: usize,
}

impl Default for DrawingOptions {
    fn default() -> Self {
        Self {
            grayscale_matrix: GRAYSCALE_MATRIX,
            filter_threads: default_filter_threads(),
            clip_outline_color: 0x00ff00ff,
            mask_outline_color: 0x0000ffff,
            image_outline_color: 0xff0000ff,
            image_outline_mode: false,
            filter_quality: 0,
            blur_quality: 0,
            dithering: true,
            cursor_tolerance: 1.0,
            select_zero_opacity: false,
            cache_budget: 0,
        }
    }
}

impl DrawingOptions {
    /// Options for an interactive canvas: like the defaults, but with a
    /// 64 MiB cache budget.
    pub fn interactive() -> Self {
        Self {
            cache_budget: 64 << 20,
            ..Self::default()
        }
    }
}

/// A single typed option change, as delivered by a preferences observer.
#[derive(Debug, Clone, Copy)]
pub enum OptionUpdate {
    /// Change the clip outline colour.
    ClipOutlineColor(u32),
    /// Change the mask outline colour.
    MaskOutlineColor(u32),
    /// Change the image outline colour.
    ImageOutlineColor(u32),
    /// Toggle drawing images in outline mode.
    ImageOutlineMode(bool),
    /// Change filter quality.
    FilterQuality(i32),
    /// Change blur quality.
    BlurQuality(i32),
    /// Toggle dithering.
    Dithering(bool),
    /// Change the picking tolerance.
    CursorTolerance(f64),
    /// Toggle picking of fully transparent items.
    SelectZeroOpacity(bool),
    /// Change the cache budget in bytes.
    CacheBudget(usize),
    /// Change the filter thread count.
    FilterThreads(usize),
}

pub(crate) struct CacheRecord {
    pub(crate) score: f64,
    pub(crate) cache_size: usize,
    pub(crate) item: ItemId,
}

struct Slot {
    generation: u32,
    item: Option<Item>,
}

type DeferredFn = Box<dyn FnOnce(&mut Drawing)>;

/// A complete drawing: a tree of items plus the drawing-wide rendering
/// modes and cache policy.
pub struct Drawing {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: Option<ItemId>,

    pub(crate) render_mode: RenderMode,
    pub(crate) color_mode: ColorMode,
    pub(crate) outline_overlay: bool,
    pub(crate) options: DrawingOptions,
    pub(crate) cache_limit: Option<IntRect>,
    pub(crate) clip: Option<BezPath>,

    pub(crate) cached_items: FxHashSet<ItemId>,
    /// Cache-eligible items, ordered by decreasing score.
    pub(crate) candidates: Vec<CacheRecord>,

    snapshotted: bool,
    funclog: Vec<DeferredFn>,

    redraw_callback: Option<Box<dyn Fn(IntRect)>>,
}

impl Drawing {
    /// Create an empty drawing.
    pub fn new(options: DrawingOptions) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: None,
            render_mode: RenderMode::Normal,
            color_mode: ColorMode::Normal,
            outline_overlay: false,
            options,
            cache_limit: None,
            clip: None,
            cached_items: FxHashSet::default(),
            candidates: Vec::new(),
            snapshotted: false,
            funclog: Vec::new(),
            redraw_callback: None,
        }
    }

    // ------------------------------------------------------------------
    // Item storage.

    fn alloc(&mut self, data: ItemData) -> ItemId {
        let item = Item::new(data);
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.item = Some(item);
            ItemId {
                index,
                generation: slot.generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                item: Some(item),
            });
            ItemId {
                index: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        }
    }

    pub(crate) fn get(&self, id: ItemId) -> Option<&Item> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.item.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.item.as_mut()
    }

    /// Internal access; panics on stale ids, which would mean a tree
    /// invariant was broken.
    pub(crate) fn item(&self, id: ItemId) -> &Item {
        self.get(id).unwrap_or_else(|| panic!("stale item id {id:?}"))
    }

    pub(crate) fn item_mut(&mut self, id: ItemId) -> &mut Item {
        self.get_mut(id)
            .unwrap_or_else(|| panic!("stale item id {id:?}"))
    }

    /// Destroy an item and its whole subtree, including the auxiliary
    /// children and any cache state.
    fn destroy_subtree(&mut self, id: ItemId) {
        let Some(item) = self.get_mut(id) else {
            return;
        };
        let children = std::mem::take(&mut item.children);
        let aux = [
            item.clip.take(),
            item.mask.take(),
            item.fill_pattern.take(),
            item.stroke_pattern.take(),
        ];
        for child in children.into_iter().chain(aux.into_iter().flatten()) {
            self.destroy_subtree(child);
        }
        self.remove_cache_candidate(id);
        self.cached_items.remove(&id);
        let slot = &mut self.slots[id.index as usize];
        slot.item = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
    }

    // ------------------------------------------------------------------
    // Item construction.

    /// Create a group item.
    pub fn new_group(&mut self) -> ItemId {
        self.alloc(ItemData::Group(GroupData::default()))
    }

    /// Create a shape item.
    pub fn new_shape(&mut self) -> ItemId {
        self.alloc(ItemData::Shape(ShapeData::default()))
    }

    /// Create a pattern item.
    pub fn new_pattern(&mut self) -> ItemId {
        self.alloc(ItemData::Pattern(
            GroupData::default(),
            PatternData::default(),
        ))
    }

    /// Create a text item.
    pub fn new_text(&mut self) -> ItemId {
        self.alloc(ItemData::Text(GroupData::default(), TextData::default()))
    }

    /// Create a glyph item.
    pub fn new_glyph(&mut self, data: GlyphData) -> ItemId {
        self.alloc(ItemData::Glyph(data))
    }

    /// Create an image item.
    pub fn new_image(&mut self, data: ImageData) -> ItemId {
        self.alloc(ItemData::Image(data))
    }

    // ------------------------------------------------------------------
    // Read access.

    /// The root item.
    pub fn root(&self) -> Option<ItemId> {
        self.root
    }

    /// The kind of an item.
    pub fn kind(&self, id: ItemId) -> Option<ItemKind> {
        self.get(id).map(|item| item.data.kind())
    }

    /// The parent of an item.
    pub fn parent(&self, id: ItemId) -> Option<ItemId> {
        self.get(id)?.parent
    }

    /// The ordinary children of an item, bottom-most first.
    pub fn children(&self, id: ItemId) -> &[ItemId] {
        self.get(id).map(|item| item.children.as_slice()).unwrap_or(&[])
    }

    /// How an item is attached to its parent.
    pub fn child_type(&self, id: ItemId) -> Option<ChildType> {
        self.get(id).map(|item| item.child_type)
    }

    /// Geometric bounding box in device pixels.
    pub fn bbox(&self, id: ItemId) -> Option<IntRect> {
        self.get(id)?.bbox
    }

    /// Visual bounding box in device pixels.
    pub fn drawbox(&self, id: ItemId) -> Option<IntRect> {
        self.get(id)?.drawbox
    }

    /// Total transform from item coordinates to device pixels.
    pub fn ctm(&self, id: ItemId) -> Option<Affine> {
        self.get(id).map(|item| item.ctm)
    }

    /// Whether the item is visible.
    pub fn visible(&self, id: ItemId) -> bool {
        self.get(id).is_some_and(|item| item.visible)
    }

    /// The item's update complexity from the last update pass.
    pub fn update_complexity(&self, id: ItemId) -> u32 {
        self.get(id).map_or(0, |item| item.update_complexity)
    }

    /// Whether the item currently holds a render cache.
    pub fn is_cached(&self, id: ItemId) -> bool {
        self.get(id).is_some_and(|item| item.cache.is_some())
    }

    /// Whether `ancestor` is an ancestor of `item`.
    pub fn is_ancestor_of(&self, ancestor: ItemId, item: ItemId) -> bool {
        let mut cur = self.parent(item);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.parent(c);
        }
        false
    }

    /// The current render mode.
    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    /// The current colour mode.
    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    /// Whether the outline overlay is active.
    pub fn outline_overlay(&self) -> bool {
        self.outline_overlay
    }

    /// The drawing options currently in force.
    pub fn options(&self) -> &DrawingOptions {
        &self.options
    }

    /// The cache limit rectangle (usually the viewport, enlarged).
    pub fn cache_limit(&self) -> Option<IntRect> {
        self.cache_limit
    }

    pub(crate) fn outline_mode(&self) -> bool {
        self.render_mode == RenderMode::Outline || self.outline_overlay
    }

    // ------------------------------------------------------------------
    // Deferred mutation.

    /// Run `f` now, or after [`unsnapshot`](Self::unsnapshot) if the
    /// drawing is snapshotted.
    pub(crate) fn defer(&mut self, f: impl FnOnce(&mut Self) + 'static) {
        if self.snapshotted {
            self.funclog.push(Box::new(f));
        } else {
            f(self);
        }
    }

    /// Freeze the tree: all mutations are queued until
    /// [`unsnapshot`](Self::unsnapshot). Used while a background renderer
    /// reads the tree.
    pub fn snapshot(&mut self) {
        debug_assert!(!self.snapshotted, "nested snapshot");
        self.snapshotted = true;
    }

    /// Thaw the tree and replay all queued mutations in order.
    pub fn unsnapshot(&mut self) {
        debug_assert!(self.snapshotted, "unsnapshot without snapshot");
        // Unsnapshot before replaying so the replayed calls are not
        // deferred again.
        self.snapshotted = false;
        let log = std::mem::take(&mut self.funclog);
        for f in log {
            f(self);
        }
    }

    /// Whether mutations are currently being deferred.
    pub fn snapshotted(&self) -> bool {
        self.snapshotted
    }

    // ------------------------------------------------------------------
    // Structure mutation.

    /// Install `root` as the drawing's root, destroying any previous root.
    pub fn set_root(&mut self, root: Option<ItemId>) {
        if let Some(old) = self.root.take() {
            self.destroy_subtree(old);
        }
        self.root = root;
        if let Some(root) = root {
            debug_assert_eq!(self.item(root).child_type, ChildType::Orphan);
            self.item_mut(root).child_type = ChildType::Root;
        }
    }

    fn attach(&mut self, parent: ItemId, child: ItemId, child_type: ChildType) {
        debug_assert_eq!(self.item(child).child_type, ChildType::Orphan);
        let item = self.item_mut(child);
        item.parent = Some(parent);
        item.child_type = child_type;
    }

    /// Append `child` on top of `parent`'s ordinary children.
    pub fn append_child(&mut self, parent: ItemId, child: ItemId) {
        // The child is not part of the rendering tree yet, so the links
        // can be set immediately.
        self.attach(parent, child, ChildType::Normal);
        self.defer(move |d| {
            d.item_mut(parent).children.push(child);
            d.item_mut(child).state = StateFlags::ALL;
            d.mark_for_update(child, StateFlags::ALL, true);
        });
    }

    /// Insert `child` at the bottom of `parent`'s ordinary children.
    pub fn prepend_child(&mut self, parent: ItemId, child: ItemId) {
        self.attach(parent, child, ChildType::Normal);
        self.defer(move |d| {
            d.item_mut(parent).children.insert(0, child);
            d.item_mut(child).state = StateFlags::ALL;
            d.mark_for_update(child, StateFlags::ALL, true);
        });
    }

    /// Destroy all ordinary children of an item.
    pub fn clear_children(&mut self, id: ItemId) {
        self.defer(move |d| {
            if d.item(id).children.is_empty() {
                return;
            }
            d.mark_for_rendering(id);
            let children = std::mem::take(&mut d.item_mut(id).children);
            for child in children {
                d.destroy_subtree(child);
            }
            d.mark_for_update(id, StateFlags::ALL, false);
        });
    }

    /// Attach a clip to an item, replacing and destroying any previous one.
    pub fn set_clip_child(&mut self, id: ItemId, clip: Option<ItemId>) {
        if let Some(clip) = clip {
            self.attach(id, clip, ChildType::Clip);
        }
        self.defer(move |d| {
            d.mark_for_rendering(id);
            if let Some(old) = d.item_mut(id).clip.take() {
                d.destroy_subtree(old);
            }
            d.item_mut(id).clip = clip;
            d.mark_for_update(id, StateFlags::ALL, true);
        });
    }

    /// Attach a mask, replacing and destroying any previous one.
    pub fn set_mask_child(&mut self, id: ItemId, mask: Option<ItemId>) {
        if let Some(mask) = mask {
            self.attach(id, mask, ChildType::Mask);
        }
        self.defer(move |d| {
            d.mark_for_rendering(id);
            if let Some(old) = d.item_mut(id).mask.take() {
                d.destroy_subtree(old);
            }
            d.item_mut(id).mask = mask;
            d.mark_for_update(id, StateFlags::ALL, true);
        });
    }

    /// Attach a fill pattern, replacing and destroying any previous one.
    pub fn set_fill_pattern(&mut self, id: ItemId, pattern: Option<ItemId>) {
        if let Some(pattern) = pattern {
            debug_assert_eq!(self.kind(pattern), Some(ItemKind::Pattern));
            self.attach(id, pattern, ChildType::Fill);
        }
        self.defer(move |d| {
            d.mark_for_rendering(id);
            if let Some(old) = d.item_mut(id).fill_pattern.take() {
                d.destroy_subtree(old);
            }
            d.item_mut(id).fill_pattern = pattern;
            d.mark_for_update(id, StateFlags::ALL, false);
        });
    }

    /// Attach a stroke pattern, replacing and destroying any previous one.
    pub fn set_stroke_pattern(&mut self, id: ItemId, pattern: Option<ItemId>) {
        if let Some(pattern) = pattern {
            debug_assert_eq!(self.kind(pattern), Some(ItemKind::Pattern));
            self.attach(id, pattern, ChildType::Stroke);
        }
        self.defer(move |d| {
            d.mark_for_rendering(id);
            if let Some(old) = d.item_mut(id).stroke_pattern.take() {
                d.destroy_subtree(old);
            }
            d.item_mut(id).stroke_pattern = pattern;
            d.mark_for_update(id, StateFlags::ALL, false);
        });
    }

    /// Move an item to the given position in its parent's z-order. No-op
    /// for items that are not ordinary children.
    pub fn set_z_order(&mut self, id: ItemId, z_order: usize) {
        if self.child_type(id) != Some(ChildType::Normal) {
            return;
        }
        self.defer(move |d| {
            let Some(parent) = d.item(id).parent else {
                return;
            };
            let children = &mut d.item_mut(parent).children;
            let Some(pos) = children.iter().position(|&c| c == id) else {
                return;
            };
            children.remove(pos);
            let at = z_order.min(children.len());
            children.insert(at, id);
            d.mark_for_rendering(id);
        });
    }

    /// Remove an item from its parent and destroy it with its subtree.
    pub fn unlink(&mut self, id: ItemId) {
        self.defer(move |d| {
            if d.get(id).is_none() {
                return;
            }
            if d.item(id).parent.is_some() {
                d.mark_for_rendering(id);
            }
            let parent = d.item(id).parent;
            let child_type = d.item(id).child_type;
            if let Some(parent) = parent {
                let p = d.item_mut(parent);
                match child_type {
                    ChildType::Normal => p.children.retain(|&c| c != id),
                    ChildType::Clip => p.clip = None,
                    ChildType::Mask => p.mask = None,
                    ChildType::Fill => p.fill_pattern = None,
                    ChildType::Stroke => p.stroke_pattern = None,
                    _ => {}
                }
                let propagate =
                    child_type == ChildType::Clip || child_type == ChildType::Mask;
                d.mark_for_update(parent, StateFlags::ALL, propagate);
            } else if child_type == ChildType::Root && d.root == Some(id) {
                d.root = None;
            }
            d.destroy_subtree(id);
        });
    }

    // ------------------------------------------------------------------
    // Attribute mutation.

    /// Set the item's incremental transform.
    pub fn set_transform(&mut self, id: ItemId, transform: Affine) {
        const EPS: f64 = 1e-18;
        self.defer(move |d| {
            let current = d.item(id).transform.unwrap_or(Affine::IDENTITY);
            if affine_near(transform, current, EPS) {
                return;
            }
            d.mark_for_rendering(id);
            // Storing the identity would only cause extra work later.
            d.item_mut(id).transform =
                (!affine_near(transform, Affine::IDENTITY, EPS)).then_some(transform);
            d.mark_for_update(id, StateFlags::ALL, true);
        });
    }

    /// Set the item's opacity.
    pub fn set_opacity(&mut self, id: ItemId, opacity: f32) {
        self.defer(move |d| {
            if opacity == d.item(id).opacity {
                return;
            }
            d.item_mut(id).opacity = opacity;
            d.mark_for_rendering(id);
        });
    }

    /// Set the antialiasing quality.
    pub fn set_antialias(&mut self, id: ItemId, antialias: Antialias) {
        self.defer(move |d| {
            if antialias == d.item(id).antialias {
                return;
            }
            d.item_mut(id).antialias = antialias;
            d.mark_for_rendering(id);
        });
    }

    /// Set CSS isolation.
    pub fn set_isolation(&mut self, id: ItemId, isolation: bool) {
        self.defer(move |d| {
            if isolation == d.item(id).isolation {
                return;
            }
            d.item_mut(id).isolation = isolation;
            d.mark_for_rendering(id);
        });
    }

    /// Set the blend mode.
    pub fn set_blend_mode(&mut self, id: ItemId, blend_mode: BlendMode) {
        self.defer(move |d| {
            if blend_mode == d.item(id).blend_mode {
                return;
            }
            d.item_mut(id).blend_mode = blend_mode;
            d.mark_for_rendering(id);
        });
    }

    /// Show or hide the item.
    pub fn set_visible(&mut self, id: ItemId, visible: bool) {
        self.defer(move |d| {
            if visible == d.item(id).visible {
                return;
            }
            d.item_mut(id).visible = visible;
            d.mark_for_rendering(id);
        });
    }

    /// Set whether the item responds to picking.
    pub fn set_sensitive(&mut self, id: ItemId, sensitive: bool) {
        self.defer(move |d| {
            d.item_mut(id).sensitive = sensitive;
        });
    }

    /// Set whether the item accumulates a filter background
    /// (`enable-background: new`).
    pub fn set_background_new(&mut self, id: ItemId, background_new: bool) {
        self.defer(move |d| {
            if background_new == d.item(id).background_new {
                return;
            }
            d.item_mut(id).background_new = background_new;
            d.mark_for_update(id, StateFlags::BACKGROUND, true);
        });
    }

    /// Set the vector effect flags resolved from the style.
    pub fn set_vector_effects(&mut self, id: ItemId, fixed: bool, size: bool, rotate: bool) {
        self.defer(move |d| {
            let item = d.item_mut(id);
            item.vector_effect_fixed = fixed;
            item.vector_effect_size = size;
            item.vector_effect_rotate = rotate;
            d.mark_for_rendering(id);
            d.mark_for_update(id, StateFlags::ALL, true);
        });
    }

    /// Snapshot a resolved style into a shape or text item.
    pub fn set_style(&mut self, id: ItemId, style: ShapeStyle) {
        self.defer(move |d| {
            // The cascade re-delivers snapshots freely; identical content
            // must not invalidate anything.
            let current = match &d.item(id).data {
                ItemData::Shape(shape) => Some(shape.style.content_key()),
                ItemData::Text(_, text) => Some(text.style.content_key()),
                _ => None,
            };
            if current == Some(style.content_key()) {
                return;
            }
            d.mark_for_rendering(id);
            match &mut d.item_mut(id).data {
                ItemData::Shape(shape) => shape.style = style,
                ItemData::Text(_, text) => text.style = style,
                _ => {
                    log::warn!("style set on an item that has none; ignored");
                    return;
                }
            }
            d.mark_for_update(id, StateFlags::ALL, false);
        });
    }

    /// Set the item-space bounds used for object-bounding-box paints and
    /// filter regions.
    pub fn set_item_bounds(&mut self, id: ItemId, bounds: Option<Rect>) {
        self.defer(move |d| {
            d.item_mut(id).item_bbox = bounds;
        });
    }

    /// Attach or remove the filter renderer.
    pub fn set_filter_renderer(&mut self, id: ItemId, filter: Option<Box<dyn crate::Filter>>) {
        self.defer(move |d| {
            d.item_mut(id).filter = filter;
            d.mark_for_rendering(id);
        });
    }

    /// Set a shape's path geometry.
    pub fn set_path(&mut self, id: ItemId, path: Option<Arc<BezPath>>) {
        self.defer(move |d| {
            d.mark_for_rendering(id);
            if let ItemData::Shape(shape) = &mut d.item_mut(id).data {
                shape.path = path;
            }
            d.mark_for_update(id, StateFlags::ALL, false);
        });
    }

    /// Set a group's extra child transform (markers, clip paths).
    pub fn set_child_transform(&mut self, id: ItemId, transform: Affine) {
        const EPS: f64 = 1e-18;
        self.defer(move |d| {
            let Some(group) = d.item(id).data.group() else {
                return;
            };
            let current = group.child_transform.unwrap_or(Affine::IDENTITY);
            if affine_near(transform, current, EPS) {
                return;
            }
            d.mark_for_rendering(id);
            let stored = (!affine_near(transform, Affine::IDENTITY, EPS)).then_some(transform);
            if let ItemData::Group(g) | ItemData::Pattern(g, _) | ItemData::Text(g, _) =
                &mut d.item_mut(id).data
            {
                g.child_transform = stored;
            }
            d.mark_for_update(id, StateFlags::ALL, true);
        });
    }

    /// Set whether a group's pick returns the hit child instead of the
    /// group itself.
    pub fn set_pick_children(&mut self, id: ItemId, pick_children: bool) {
        self.defer(move |d| {
            if let ItemData::Group(g) | ItemData::Pattern(g, _) | ItemData::Text(g, _) =
                &mut d.item_mut(id).data
            {
                g.pick_children = pick_children;
            }
        });
    }

    /// Set a pattern's tile rectangle in user coordinates.
    pub fn set_tile_rect(&mut self, id: ItemId, tile_rect: Option<Rect>) {
        self.defer(move |d| {
            if let ItemData::Pattern(_, pattern) = &mut d.item_mut(id).data {
                pattern.tile_rect = tile_rect;
            }
            d.mark_for_update(id, StateFlags::ALL, true);
        });
    }

    /// Set a pattern's pattern-to-user transform.
    pub fn set_pattern_to_user(&mut self, id: ItemId, transform: Affine) {
        const EPS: f64 = 1e-18;
        self.defer(move |d| {
            let ItemData::Pattern(_, pattern) = &d.item(id).data else {
                return;
            };
            let current = pattern.pattern_to_user.unwrap_or(Affine::IDENTITY);
            if affine_near(transform, current, EPS) {
                return;
            }
            d.mark_for_rendering(id);
            if let ItemData::Pattern(_, pattern) = &mut d.item_mut(id).data {
                pattern.pattern_to_user =
                    (!affine_near(transform, Affine::IDENTITY, EPS)).then_some(transform);
            }
            d.mark_for_update(id, StateFlags::ALL, true);
        });
    }

    /// Set a pattern's overflow pre-tiling.
    pub fn set_overflow(&mut self, id: ItemId, overflow: OverflowSpec) {
        self.defer(move |d| {
            if let ItemData::Pattern(_, pattern) = &mut d.item_mut(id).data {
                pattern.overflow = overflow;
            }
        });
    }

    /// Replace an image item's pixels and placement.
    pub fn set_image(&mut self, id: ItemId, data: ImageData) {
        self.defer(move |d| {
            d.mark_for_rendering(id);
            if let ItemData::Image(image) = &mut d.item_mut(id).data {
                *image = data;
            }
            d.mark_for_update(id, StateFlags::ALL, false);
        });
    }

    /// Set a text item's decorations.
    pub fn set_text_decorations(&mut self, id: ItemId, decorations: TextDecorations) {
        self.defer(move |d| {
            if let ItemData::Text(_, text) = &mut d.item_mut(id).data {
                text.decorations = decorations;
            }
            d.mark_for_rendering(id);
        });
    }

    // ------------------------------------------------------------------
    // Drawing-wide modes and options.

    /// Switch the render mode.
    pub fn set_render_mode(&mut self, mode: RenderMode) {
        self.defer(move |d| {
            if mode == d.render_mode {
                return;
            }
            if let Some(root) = d.root {
                d.mark_for_rendering(root);
            }
            d.render_mode = mode;
            if let Some(root) = d.root {
                d.mark_for_update(root, StateFlags::ALL, true);
            }
            d.clear_cache();
        });
    }

    /// Switch the colour mode.
    pub fn set_color_mode(&mut self, mode: ColorMode) {
        self.defer(move |d| {
            if mode == d.color_mode {
                return;
            }
            d.color_mode = mode;
            if d.render_mode != RenderMode::Outline || d.options.image_outline_mode {
                if let Some(root) = d.root {
                    d.mark_for_rendering(root);
                }
            }
        });
    }

    /// Toggle the outline overlay.
    pub fn set_outline_overlay(&mut self, outline_overlay: bool) {
        self.defer(move |d| {
            if outline_overlay == d.outline_overlay {
                return;
            }
            d.outline_overlay = outline_overlay;
            if let Some(root) = d.root {
                d.mark_for_update(root, StateFlags::ALL, true);
            }
        });
    }

    /// Replace the grayscale conversion matrix.
    pub fn set_grayscale_matrix(&mut self, matrix: [f64; 20]) {
        self.defer(move |d| {
            d.options.grayscale_matrix = matrix;
            if d.render_mode != RenderMode::Outline {
                if let Some(root) = d.root {
                    d.mark_for_rendering(root);
                }
            }
        });
    }

    /// Set the cache budget in bytes.
    pub fn set_cache_budget(&mut self, bytes: usize) {
        self.defer(move |d| {
            d.options.cache_budget = bytes;
            d.pick_items_for_caching();
        });
    }

    /// Set the cache limit rectangle (usually the enlarged viewport).
    pub fn set_cache_limit(&mut self, rect: Option<IntRect>) {
        self.defer(move |d| {
            d.cache_limit = rect;
            let cached: Vec<ItemId> = d.cached_items.iter().copied().collect();
            for id in cached {
                d.mark_for_update(id, StateFlags::CACHE, false);
            }
        });
    }

    /// Set a drawing-wide clip path applied around the root.
    pub fn set_clip(&mut self, clip: Option<BezPath>) {
        self.defer(move |d| {
            if clip == d.clip {
                return;
            }
            d.clip = clip;
            if let Some(root) = d.root {
                d.mark_for_rendering(root);
            }
        });
    }

    /// Apply a typed option change, the way a preferences observer
    /// delivers them.
    pub fn apply_option_update(&mut self, update: OptionUpdate) {
        match update {
            OptionUpdate::ClipOutlineColor(c) => self.defer(move |d| {
                d.options.clip_outline_color = c;
                d.invalidate_outline_colors();
            }),
            OptionUpdate::MaskOutlineColor(c) => self.defer(move |d| {
                d.options.mask_outline_color = c;
                d.invalidate_outline_colors();
            }),
            OptionUpdate::ImageOutlineColor(c) => self.defer(move |d| {
                d.options.image_outline_color = c;
                if d.outline_mode() && !d.options.image_outline_mode {
                    if let Some(root) = d.root {
                        d.mark_for_rendering(root);
                    }
                }
            }),
            OptionUpdate::ImageOutlineMode(enabled) => self.defer(move |d| {
                d.options.image_outline_mode = enabled;
                d.invalidate_outline_colors();
            }),
            OptionUpdate::FilterQuality(q) => self.defer(move |d| {
                d.options.filter_quality = q;
                d.invalidate_filtered();
            }),
            OptionUpdate::BlurQuality(q) => self.defer(move |d| {
                d.options.blur_quality = q;
                d.invalidate_filtered();
            }),
            OptionUpdate::Dithering(enabled) => self.defer(move |d| {
                d.options.dithering = enabled;
                if d.render_mode != RenderMode::Outline {
                    if let Some(root) = d.root {
                        d.mark_for_update(root, StateFlags::ALL, true);
                    }
                    d.clear_cache();
                }
            }),
            OptionUpdate::CursorTolerance(tol) => self.defer(move |d| {
                d.options.cursor_tolerance = tol;
            }),
            OptionUpdate::SelectZeroOpacity(enabled) => self.defer(move |d| {
                d.options.select_zero_opacity = enabled;
            }),
            OptionUpdate::CacheBudget(bytes) => self.set_cache_budget(bytes),
            OptionUpdate::FilterThreads(threads) => self.defer(move |d| {
                d.options.filter_threads = threads.max(1);
            }),
        }
    }

    fn invalidate_outline_colors(&mut self) {
        if self.outline_mode() {
            if let Some(root) = self.root {
                self.mark_for_rendering(root);
            }
        }
    }

    fn invalidate_filtered(&mut self) {
        if !matches!(self.render_mode, RenderMode::Outline | RenderMode::NoFilters) {
            if let Some(root) = self.root {
                self.mark_for_update(root, StateFlags::ALL, true);
            }
            self.clear_cache();
        }
    }

    /// Set the outline colour used for clips in outline mode.
    pub fn set_clip_outline_color(&mut self, color: u32) {
        self.apply_option_update(OptionUpdate::ClipOutlineColor(color));
    }

    /// Set the outline colour used for masks in outline mode.
    pub fn set_mask_outline_color(&mut self, color: u32) {
        self.apply_option_update(OptionUpdate::MaskOutlineColor(color));
    }

    /// Set the outline colour used for images in outline mode.
    pub fn set_image_outline_color(&mut self, color: u32) {
        self.apply_option_update(OptionUpdate::ImageOutlineColor(color));
    }

    /// Draw images as images even in outline mode.
    pub fn set_image_outline_mode(&mut self, enabled: bool) {
        self.apply_option_update(OptionUpdate::ImageOutlineMode(enabled));
    }

    /// Set the filter quality knob.
    pub fn set_filter_quality(&mut self, quality: i32) {
        self.apply_option_update(OptionUpdate::FilterQuality(quality));
    }

    /// Set the blur quality knob.
    pub fn set_blur_quality(&mut self, quality: i32) {
        self.apply_option_update(OptionUpdate::BlurQuality(quality));
    }

    /// Enable or disable dithering.
    pub fn set_dithering(&mut self, enabled: bool) {
        self.apply_option_update(OptionUpdate::Dithering(enabled));
    }

    /// Set the picking tolerance in pixels.
    pub fn set_cursor_tolerance(&mut self, tolerance: f64) {
        self.apply_option_update(OptionUpdate::CursorTolerance(tolerance));
    }

    /// Allow picking of fully transparent items.
    pub fn set_select_zero_opacity(&mut self, enabled: bool) {
        self.apply_option_update(OptionUpdate::SelectZeroOpacity(enabled));
    }

    /// High quality options for export: best filter and blur quality.
    pub fn set_exact(&mut self) {
        self.defer(|d| {
            d.options.filter_quality = i32::MAX;
            d.options.blur_quality = i32::MAX;
            d.invalidate_filtered();
        });
    }

    /// Install a hook invoked with every screen area invalidated by a
    /// mutation; an interactive canvas uses this to request redraws.
    pub fn set_redraw_callback(&mut self, callback: impl Fn(IntRect) + 'static) {
        self.redraw_callback = Some(Box::new(callback));
    }

    // ------------------------------------------------------------------
    // Invalidation.

    /// Dirty the item's current visual rectangle: ancestor caches are
    /// invalidated (enlarged by their filters on the way up), pattern
    /// caches dropped, and the redraw hook notified.
    ///
    /// All mutation happens behind per-cache mutexes, so walking the
    /// ancestors needs no exclusive access to the tree.
    pub(crate) fn mark_for_rendering(&self, id: ItemId) {
        let outline = self.outline_mode();
        let item = self.item(id);
        let Some(mut dirty) = (if outline { item.bbox } else { item.drawbox }) else {
            return;
        };

        let mut background_root = None;
        let mut cur = Some(id);
        while let Some(cid) = cur {
            let item = self.item(cid);
            if cid != id {
                if let Some(filter) = &item.filter {
                    let info = crate::FilterInfo {
                        ctm: item.ctm,
                        item_bbox: item.item_bbox,
                    };
                    dirty = filter.area_enlarge(dirty, &info);
                }
            }
            if let Some(cache) = &item.cache {
                if let Ok(mut slot) = cache.lock() {
                    if let Some(cache) = slot.as_mut() {
                        cache.mark_dirty(dirty);
                    }
                }
            }
            if item.background_accumulate {
                background_root = Some(cid);
            }
            self.drop_pattern_cache(cid);
            cur = item.parent;
        }

        if let Some(background_root) = background_root {
            let above_grandparent = self
                .parent(background_root)
                .and_then(|p| self.parent(p))
                .is_some();
            if above_grandparent {
                self.invalidate_filter_background(background_root, dirty);
            }
        }

        if let Some(callback) = &self.redraw_callback {
            callback(dirty);
        }
    }

    fn invalidate_filter_background(&self, id: ItemId, area: IntRect) {
        let item = self.item(id);
        if !item.drawbox.is_some_and(|db| db.intersects(&area)) {
            return;
        }
        let uses_background = item.filter.as_ref().is_some_and(|f| f.uses_background());
        if uses_background {
            if let Some(cache) = &item.cache {
                if let Ok(mut slot) = cache.lock() {
                    if let Some(cache) = slot.as_mut() {
                        cache.mark_dirty(area);
                    }
                }
            }
        }
        for &child in &item.children {
            self.invalidate_filter_background(child, area);
        }
    }

    /// Clear the given state bits and bubble the invalidation to the
    /// ancestors; with `propagate`, also force the bits to be reset in all
    /// descendants during the next update.
    pub(crate) fn mark_for_update(&mut self, id: ItemId, flags: StateFlags, propagate: bool) {
        let (changed, parent) = {
            let item = self.item_mut(id);
            if propagate {
                item.propagate_state |= flags;
            }
            if item.state.intersects(flags) {
                let old = item.state;
                item.state &= !flags;
                (old != item.state, item.parent)
            } else {
                (false, None)
            }
        };
        if changed {
            if let Some(parent) = parent {
                self.mark_for_update(parent, flags, false);
            }
        }
    }

    pub(crate) fn drop_pattern_cache(&self, id: ItemId) {
        if let ItemData::Pattern(_, pattern) = &self.item(id).data {
            if let Ok(mut tiles) = pattern.tiles.lock() {
                tiles.clear();
            }
        }
    }

    // ------------------------------------------------------------------
    // Cache policy.

    pub(crate) fn remove_cache_candidate(&mut self, id: ItemId) {
        if let Some(item) = self.get_mut(id) {
            if !item.has_cache_candidate {
                return;
            }
            item.has_cache_candidate = false;
        }
        self.candidates.retain(|rec| rec.item != id);
    }

    pub(crate) fn insert_cache_candidate(&mut self, id: ItemId, score: f64, cache_size: usize) {
        let record = CacheRecord {
            score,
            cache_size,
            item: id,
        };
        let at = self
            .candidates
            .partition_point(|rec| rec.score >= record.score);
        self.candidates.insert(at, record);
        self.item_mut(id).has_cache_candidate = true;
    }

    /// Turn caching on or off for one item. Persistent caches (filtered
    /// items) survive budget eviction until turned off persistently.
    pub(crate) fn set_cached(&mut self, id: ItemId, cached: bool, persistent: bool) {
        {
            let item = self.item_mut(id);
            if item.cached_persistent && !persistent {
                return;
            }
            item.cached_persistent = cached && persistent;
            if cached == item.cache.is_some() {
                return;
            }
            item.cache = cached.then(CacheSlot::default);
        }
        if cached {
            self.cached_items.insert(id);
        } else {
            self.cached_items.remove(&id);
            self.mark_for_update(id, StateFlags::CACHE, false);
        }
    }

    /// Walk the candidate list in score order and flip items cached or
    /// uncached until the budget is filled.
    pub(crate) fn pick_items_for_caching(&mut self) {
        let mut to_cache: FxHashSet<ItemId> = FxHashSet::default();
        let mut used = 0usize;
        for rec in &self.candidates {
            if used + rec.cache_size > self.options.cache_budget {
                break;
            }
            to_cache.insert(rec.item);
            used += rec.cache_size;
        }
        let to_uncache: Vec<ItemId> = self
            .cached_items
            .iter()
            .copied()
            .filter(|id| !to_cache.contains(id))
            .collect();
        for id in to_uncache {
            self.set_cached(id, false, false);
        }
        for id in to_cache {
            self.set_cached(id, true, false);
        }
    }

    /// Drop all caches, including persistent ones.
    pub(crate) fn clear_cache(&mut self) {
        let cached: Vec<ItemId> = self.cached_items.iter().copied().collect();
        for id in cached {
            self.set_cached(id, false, true);
        }
    }

    /// The per-item cache slot, if the item is cached.
    pub(crate) fn cache_slot(&self, id: ItemId) -> Option<CacheSlot> {
        self.get(id)?.cache.clone()
    }

    /// Create a cache for an item, used when the update pass forces
    /// caching for filtered items.
    pub(crate) fn ensure_cached_persistent(&mut self, id: ItemId, on: bool) {
        self.set_cached(id, on, true);
    }

    /// Total bytes of cache surfaces currently allocated.
    pub fn cache_bytes_in_use(&self) -> usize {
        self.cached_items
            .iter()
            .filter_map(|&id| self.get(id))
            .filter_map(|item| item.cache.as_ref())
            .filter_map(|slot| slot.lock().ok())
            .filter_map(|slot| slot.as_ref().map(DrawingCache::size_bytes))
            .sum()
    }
}

pub(crate) fn affine_near(a: Affine, b: Affine, eps: f64) -> bool {
    let (a, b) = (a.as_coeffs(), b.as_coeffs());
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= eps)
}
