//! opat-lattice: N-dimensional interpolation over OPAT containers
//!
//! A loaded container stores tables only at its cataloged parameter vectors.
//! This crate synthesizes tables anywhere inside the convex hull of those
//! vectors:
//!
//! - [`Triangulation`] builds an N-dimensional Delaunay triangulation over
//!   the stored vectors, with simplex adjacency
//! - [`Interpolator`] locates a query point by walking adjacent simplices
//!   from a warm start, computes barycentric weights with a small LU solve,
//!   and blends the corner cards' tables element-wise
//!
//! Only linear blending is implemented; the quadratic and cubic modes are
//! declared but rejected at construction.
//!
//! # Example
//!
//! ```no_run
//! use opat_format::Opat;
//! use opat_lattice::Interpolator;
//!
//! let opat = Opat::open("gs98hz.opat")?;
//! let lattice = Interpolator::new(&opat)?;
//! let card = lattice.get(&[0.275, 0.06])?;
//! let table = card.get("data")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]

use std::fmt;

pub mod delaunay;
pub mod interp;
pub mod solve;

pub use delaunay::{Triangulation, NO_NEIGHBOR};
pub use interp::{Interpolator, Location};
pub use solve::solve;

/// Blending scheme between the corners of a containing simplex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationMode {
    /// Barycentric linear blend (the only implemented mode)
    Linear,
    /// Declared but not implemented
    Quadratic,
    /// Declared but not implemented
    Cubic,
}

impl fmt::Display for InterpolationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::Quadratic => write!(f, "quadratic"),
            Self::Cubic => write!(f, "cubic"),
        }
    }
}

/// Interpolation error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Query vector dimensionality differs from the container's
    #[error("query has {actual} dimensions, the lattice has {expected}")]
    DimensionMismatch {
        /// Dimensions the container indexes by
        expected: usize,
        /// Dimensions the query supplied
        actual: usize,
    },

    /// Query component outside the stored per-dimension bounds
    #[error("query outside the stored parameter bounds: {0}")]
    OutOfBounds(String),

    /// Query inside the bounds box but outside the convex hull
    #[error("query outside the convex hull: {0}")]
    OutOfHull(String),

    /// A linear system with no usable pivot
    #[error("singular linear system")]
    Singular,

    /// Simplex vertices are collinear/coplanar
    #[error("degenerate simplex: {0}")]
    DegenerateSimplex(String),

    /// Corner cards disagree on a table's shape or axes
    #[error("tables are not congruent across simplex corners: {0}")]
    InconsistentSimplex(String),

    /// Walk cycled or exceeded its step cap (corrupt adjacency or a bug)
    #[error("point location failed: {0}")]
    WalkFailed(String),

    /// Triangulation could not be built over the stored vectors
    #[error("triangulation failed: {0}")]
    Triangulation(String),

    /// Requested blending mode is declared but not implemented
    #[error("{0} interpolation is not implemented")]
    Unimplemented(InterpolationMode),

    /// Error from the underlying container
    #[error("container error: {0}")]
    Format(#[from] opat_format::Error),

    /// I/O failure writing a debug dump
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for interpolation operations
pub type Result<T> = std::result::Result<T, Error>;
