/*!
The display core of a vector drawing editor.

This crate maintains an in-memory tree of drawable items mirroring a
document for interactive display: incremental updates of derived data
(transforms, bounding boxes, invalidation regions), layered compositing
with clips, masks, filters, opacity, blending and patterns, per-node raster
caching under a fixed memory budget, and hit-testing.

Rendering is expressed against an abstract [`DrawingContext`]; clients plug
in their rasteriser of choice. The crate's own [`Surface`] type carries the
premultiplied-RGBA pixels used for caches, pattern tiles and intermediate
compositing.
*/

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod context;
mod drawing;
mod filter;
mod item;
mod pattern;
mod pick;
mod pixelgeom;
mod render;
mod style;
mod surface;
mod types;
mod update;

pub use context::{CompositeOp, DrawingContext, RenderContext, TilePattern};
pub use drawing::{Drawing, DrawingError, DrawingOptions, OptionUpdate};
pub use filter::{Filter, FilterInfo};
pub use item::{ChildType, GlyphData, ImageData, ItemId, ItemKind, OverflowSpec, TextDecorations};
pub use pixelgeom::{IntPoint, IntRect, Region};
pub use style::{
    Antialias, BlendMode, Color, FillRule, PaintOrder, PaintSource, ShapeStyle, StrokeStyle,
};
pub use surface::{DrawingCache, Surface};
pub use types::*;
