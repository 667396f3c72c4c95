//! Resolved style data for drawable items.
//!
//! Styles arriving from the document's cascade are snapshotted into these
//! plain structs when set, so the render thread never touches live style
//! objects.

use kurbo::{Cap, Join};
use siphasher::sip128::{Hasher128, SipHasher13};
use smallvec::SmallVec;
use std::hash::{Hash, Hasher};

/// A straight (non-premultiplied) RGBA colour.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color {
    /// Red, in `[0, 1]`.
    pub r: f32,
    /// Green, in `[0, 1]`.
    pub g: f32,
    /// Blue, in `[0, 1]`.
    pub b: f32,
    /// Alpha, in `[0, 1]`.
    pub a: f32,
}

impl Color {
    /// Opaque black.
    pub const BLACK: Self = Self::rgba(0.0, 0.0, 0.0, 1.0);

    /// Construct from components.
    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Construct from a packed 0xRRGGBBAA value.
    pub fn from_rgba32(packed: u32) -> Self {
        Self {
            r: ((packed >> 24) & 0xff) as f32 / 255.0,
            g: ((packed >> 16) & 0xff) as f32 / 255.0,
            b: ((packed >> 8) & 0xff) as f32 / 255.0,
            a: (packed & 0xff) as f32 / 255.0,
        }
    }

    /// This colour with its alpha multiplied by `opacity`.
    pub fn with_opacity(self, opacity: f32) -> Self {
        Self {
            a: self.a * opacity,
            ..self
        }
    }
}

/// A blend mode, matching the CSS compositing set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Normal blending (default).
    #[default]
    Normal,
    /// Multiply.
    Multiply,
    /// Screen.
    Screen,
    /// Overlay.
    Overlay,
    /// Darken.
    Darken,
    /// Lighten.
    Lighten,
    /// Colour dodge.
    ColorDodge,
    /// Colour burn.
    ColorBurn,
    /// Hard light.
    HardLight,
    /// Soft light.
    SoftLight,
    /// Difference.
    Difference,
    /// Exclusion.
    Exclusion,
    /// Hue.
    Hue,
    /// Saturation.
    Saturation,
    /// Colour.
    Color,
    /// Luminosity.
    Luminosity,
}

/// A fill rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillRule {
    /// Non-zero winding.
    #[default]
    NonZero,
    /// Even-odd winding.
    EvenOdd,
}

/// Antialiasing quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Antialias {
    /// No antialiasing.
    None,
    /// Fast but low quality.
    Fast,
    /// The default quality.
    #[default]
    Good,
    /// Best quality.
    Best,
}

/// What a paint is made of.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PaintSource {
    /// Not painted.
    #[default]
    None,
    /// A solid colour.
    Color(Color),
    /// The pattern item attached to the drawing item's fill or stroke
    /// pattern slot.
    Pattern,
}

impl PaintSource {
    /// Whether anything would be painted.
    pub fn is_some(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// The order fill, stroke and markers are painted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaintOrder {
    /// The fill layer.
    #[default]
    Fill,
    /// The stroke layer.
    Stroke,
    /// The marker layer.
    Markers,
}

/// Resolved stroke parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeStyle {
    /// Width in user units.
    pub width: f32,
    /// Whether the stroke is a hairline: exactly one device pixel wide,
    /// regardless of transform.
    pub hairline: bool,
    /// Line cap.
    pub cap: Cap,
    /// Line join.
    pub join: Join,
    /// Miter limit.
    pub miter_limit: f32,
    /// Dash lengths; empty for a solid stroke.
    pub dash: SmallVec<[f64; 4]>,
    /// Offset into the dash pattern.
    pub dash_offset: f64,
}

impl Default for StrokeStyle {
    fn default() -> Self {
        Self {
            width: 1.0,
            hairline: false,
            cap: Cap::Butt,
            join: Join::Miter,
            miter_limit: 4.0,
            dash: SmallVec::new(),
            dash_offset: 0.0,
        }
    }
}

/// The resolved style of a shape or text item.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShapeStyle {
    /// Fill paint.
    pub fill: PaintSource,
    /// Fill opacity in `[0, 1]`.
    pub fill_opacity: f32,
    /// Fill rule.
    pub fill_rule: FillRule,
    /// Stroke paint.
    pub stroke: PaintSource,
    /// Stroke opacity in `[0, 1]`.
    pub stroke_opacity: f32,
    /// Stroke geometry.
    pub stroke_style: StrokeStyle,
    /// Layer paint order.
    pub paint_order: [PaintOrder; 3],
}

impl ShapeStyle {
    /// A style filling with the given colour and no stroke.
    pub fn filled(color: Color) -> Self {
        Self {
            fill: PaintSource::Color(color),
            fill_opacity: 1.0,
            stroke_opacity: 1.0,
            paint_order: [PaintOrder::Fill, PaintOrder::Stroke, PaintOrder::Markers],
            ..Default::default()
        }
    }

    /// A 128-bit content key identifying this style snapshot.
    pub fn content_key(&self) -> u128 {
        let mut hasher = SipHasher13::new();
        let hash_paint = |paint: &PaintSource, hasher: &mut SipHasher13| match paint {
            PaintSource::None => 0u8.hash(hasher),
            PaintSource::Color(c) => {
                1u8.hash(hasher);
                c.r.to_bits().hash(hasher);
                c.g.to_bits().hash(hasher);
                c.b.to_bits().hash(hasher);
                c.a.to_bits().hash(hasher);
            }
            PaintSource::Pattern => 2u8.hash(hasher),
        };
        hash_paint(&self.fill, &mut hasher);
        self.fill_opacity.to_bits().hash(&mut hasher);
        (self.fill_rule == FillRule::EvenOdd).hash(&mut hasher);
        hash_paint(&self.stroke, &mut hasher);
        self.stroke_opacity.to_bits().hash(&mut hasher);
        self.stroke_style.width.to_bits().hash(&mut hasher);
        self.stroke_style.hairline.hash(&mut hasher);
        let cap = match self.stroke_style.cap {
            Cap::Butt => 0u8,
            Cap::Round => 1,
            Cap::Square => 2,
        };
        cap.hash(&mut hasher);
        let join = match self.stroke_style.join {
            Join::Bevel => 0u8,
            Join::Miter => 1,
            Join::Round => 2,
        };
        join.hash(&mut hasher);
        self.stroke_style.miter_limit.to_bits().hash(&mut hasher);
        for d in &self.stroke_style.dash {
            d.to_bits().hash(&mut hasher);
        }
        self.stroke_style.dash_offset.to_bits().hash(&mut hasher);
        for layer in self.paint_order {
            let layer = match layer {
                PaintOrder::Fill => 0u8,
                PaintOrder::Stroke => 1,
                PaintOrder::Markers => 2,
            };
            layer.hash(&mut hasher);
        }
        hasher.finish128().as_u128()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_color_unpacks() {
        let c = Color::from_rgba32(0xff800040);
        assert!((c.r - 1.0).abs() < 1e-6);
        assert!((c.g - 128.0 / 255.0).abs() < 1e-6);
        assert!((c.b - 0.0).abs() < 1e-6);
        assert!((c.a - 64.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn content_key_tracks_style_changes() {
        let a = ShapeStyle::filled(Color::BLACK);
        let mut b = a.clone();
        assert_eq!(a.content_key(), b.content_key());
        b.fill_opacity = 0.5;
        assert_ne!(a.content_key(), b.content_key());
    }
}
