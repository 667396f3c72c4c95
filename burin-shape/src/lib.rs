/*!
Intersection-free polygon construction via a sweepline.

This crate stores directed planar graphs ([`Shape`]) and turns arbitrary,
possibly self-intersecting input graphs into clean polygons: all
intersections resolved into vertices, every vertex Eulerian, and every edge
oriented so the filled interior lies on its left. On top of that single
primitive ([`Shape::convert_to_shape`]) it builds boolean operations
([`Shape::booleen`]), contour offsetting ([`Shape::make_offset`]), shape
tweaking, winding queries and contour extraction back into
[`kurbo::BezPath`]s.

Coordinates are snapped to a fixed-precision grid (1/512 of a unit) so that
intersection handling stays stable against floating point noise.
*/

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod forme;
mod geom;
mod offset;
mod shape;
mod sweep;

pub use forme::Contour;
pub use geom::{half_round, ihalf_round, round_coord, round_point};
pub use offset::{JoinType, TweakMode};
pub use shape::{BackData, Shape, ShapeKind, SweepEdge, SweepPoint};

use thiserror::Error;

/// Errors produced by the shape engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShapeError {
    /// The input graph does not satisfy the preconditions of the operation,
    /// e.g. it is not Eulerian or not a polygon.
    #[error("invalid input graph")]
    InvalidInput,
    /// The computation produced a non-Eulerian graph. This is a numerical
    /// limit case; the output shape is cleared.
    #[error("result graph is not eulerian")]
    EulerFailure,
    /// The operation had nothing to do (zero offset, empty input).
    #[error("nothing to do")]
    NothingToDo,
}

/// The fill rule used to decide which regions of a graph are inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillRule {
    /// Regions with odd winding are inside.
    EvenOdd,
    /// Regions with non-zero winding are inside.
    #[default]
    NonZero,
    /// Regions with positive winding are inside.
    Positive,
    /// Do not touch edge orientations; only drop degenerate edges.
    JustDont,
}

/// A boolean operation mode for [`Shape::booleen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
    /// Regions inside either input.
    Union,
    /// Regions inside both inputs.
    Intersection,
    /// Regions inside the first input but not the second.
    Difference,
    /// Regions inside exactly one input.
    SymmetricDifference,
    /// Keep the first input whole, duplicating the second input's edges as
    /// slits so each face can be pulled apart.
    Cut,
    /// Subdivide the first input's edges wherever the second input crosses
    /// them, discarding the cutting edges themselves.
    Slice,
}
