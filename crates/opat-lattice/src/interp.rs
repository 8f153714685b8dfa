//! Point location and table blending over a loaded container

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;

use nalgebra::{DMatrix, DVector};
use opat_format::{DataCard, Opat, Table};
use opat_index::IndexVector;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::delaunay::{Triangulation, NO_NEIGHBOR};
use crate::solve::solve;
use crate::{Error, InterpolationMode, Result};

/// Barycentric weights this close to zero count as on-boundary
const WEIGHT_TOLERANCE: f64 = 1e-8;

/// A located query: the containing simplex and its barycentric weights
///
/// Weights are ordered like the simplex's vertex list and sum to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    /// Id of the containing simplex
    pub simplex: usize,
    /// One weight per simplex vertex
    pub weights: Vec<f64>,
}

/// Interpolates tables anywhere inside the convex hull of a container's
/// stored parameter vectors
///
/// Construction builds a Delaunay triangulation over the catalog keys;
/// queries walk the triangulation's adjacency from the previously located
/// simplex (consumers typically query along smooth parameter trajectories,
/// making the walk O(1) amortized). The warm-start slot is the only mutable
/// state and sits behind a lock; callers that want no shared state pass
/// their own hint to [`Interpolator::locate_with_hint`] or construct one
/// interpolator per thread.
pub struct Interpolator<'a> {
    opat: &'a Opat,
    keys: Vec<IndexVector>,
    tri: Triangulation,
    mode: InterpolationMode,
    last_found: Mutex<Option<usize>>,
}

impl<'a> Interpolator<'a> {
    /// Build a linear interpolator over every card in the container
    ///
    /// # Errors
    ///
    /// [`Error::Triangulation`] when the stored vectors cannot be
    /// triangulated (too few cards, or a degenerate set).
    pub fn new(opat: &'a Opat) -> Result<Self> {
        Self::with_mode(opat, InterpolationMode::Linear)
    }

    /// Build an interpolator with an explicit blending mode
    ///
    /// # Errors
    ///
    /// [`Error::Unimplemented`] for any mode other than
    /// [`InterpolationMode::Linear`]; otherwise as [`Interpolator::new`].
    pub fn with_mode(opat: &'a Opat, mode: InterpolationMode) -> Result<Self> {
        if mode != InterpolationMode::Linear {
            return Err(Error::Unimplemented(mode));
        }

        let keys: Vec<IndexVector> = opat.keys().cloned().collect();
        let points: Vec<Vec<f64>> = keys.iter().map(|key| key.values().to_vec()).collect();
        let tri = Triangulation::build(&points)?;
        debug!(
            cards = keys.len(),
            simplices = tri.len(),
            "interpolator ready"
        );

        Ok(Self {
            opat,
            keys,
            tri,
            mode,
            last_found: Mutex::new(None),
        })
    }

    /// The active blending mode
    pub fn mode(&self) -> InterpolationMode {
        self.mode
    }

    /// Switch the blending mode
    ///
    /// # Errors
    ///
    /// [`Error::Unimplemented`] for any mode other than
    /// [`InterpolationMode::Linear`].
    pub fn set_mode(&mut self, mode: InterpolationMode) -> Result<()> {
        if mode != InterpolationMode::Linear {
            return Err(Error::Unimplemented(mode));
        }
        self.mode = mode;
        Ok(())
    }

    /// The triangulation the interpolator walks
    pub fn triangulation(&self) -> &Triangulation {
        &self.tri
    }

    /// Synthesize a card at `query`
    ///
    /// Locates the containing simplex, then blends every table of the
    /// simplex's corner cards with the barycentric weights. The result
    /// carries the anchor corner's card header and table index; axes are
    /// validated to be congruent across all corners first. NaN cells
    /// propagate positionally: if any corner holds NaN at a cell, the
    /// synthesized cell is NaN.
    ///
    /// # Errors
    ///
    /// Everything [`Interpolator::locate`] returns, plus
    /// [`Error::InconsistentSimplex`] when corner tables disagree on shape
    /// or axes.
    pub fn get(&self, query: &[f64]) -> Result<DataCard> {
        let location = self.locate(query)?;
        self.blend(&location)
    }

    /// Locate the simplex containing `query`, warm-starting from the last
    /// successful locate
    ///
    /// # Errors
    ///
    /// - [`Error::DimensionMismatch`] for a query of the wrong dimension
    /// - [`Error::OutOfBounds`] for a component outside the stored
    ///   per-dimension bounds
    /// - [`Error::OutOfHull`] when the walk exits the hull (in bounds is
    ///   necessary but not sufficient for hull containment)
    /// - [`Error::WalkFailed`] on a cycle or step-cap overrun
    ///
    /// A failed locate leaves the warm-start slot untouched.
    pub fn locate(&self, query: &[f64]) -> Result<Location> {
        self.validate(query)?;
        let hint = *self.last_found.lock();
        let location = self.walk(query, hint)?;
        *self.last_found.lock() = Some(location.simplex);
        Ok(location)
    }

    /// Locate with a caller-provided starting simplex, bypassing the shared
    /// warm-start slot entirely
    ///
    /// # Errors
    ///
    /// As [`Interpolator::locate`]; an out-of-range hint falls back to
    /// simplex 0.
    pub fn locate_with_hint(&self, query: &[f64], hint: Option<usize>) -> Result<Location> {
        self.validate(query)?;
        self.walk(query, hint)
    }

    /// Write the triangulation as two ASCII files: the point cloud and the
    /// simplex vertex lists
    ///
    /// # Errors
    ///
    /// [`Error::Io`] on any write failure.
    pub fn dump_ascii(
        &self,
        points_path: impl AsRef<Path>,
        simplices_path: impl AsRef<Path>,
    ) -> Result<()> {
        let mut points = String::from("# id");
        for d in 0..self.tri.dim() {
            let _ = write!(points, " x{d}");
        }
        points.push('\n');
        for (id, point) in self.tri.points().iter().enumerate() {
            let _ = write!(points, "{id}");
            for value in point {
                let _ = write!(points, " {value:.8}");
            }
            points.push('\n');
        }

        let mut simplices = String::from("# simplex vertices (by point id)\n");
        for simplex in self.tri.simplices() {
            for vid in simplex {
                let _ = write!(simplices, "{vid} ");
            }
            simplices.push('\n');
        }

        std::fs::write(points_path, points)?;
        std::fs::write(simplices_path, simplices)?;
        Ok(())
    }

    fn validate(&self, query: &[f64]) -> Result<()> {
        let expected = self.opat.num_index() as usize;
        if query.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: query.len(),
            });
        }
        for (dim, (&value, bounds)) in query.iter().zip(self.opat.bounds()).enumerate() {
            if !bounds.contains(value) {
                return Err(Error::OutOfBounds(format!(
                    "component {dim} is {value}, stored values span {bounds}"
                )));
            }
        }
        Ok(())
    }

    /// Barycentric weights of `query` in simplex `sid`
    ///
    /// Column `j` of the system is `v_{j+1} - v_0`; the solved coordinates
    /// become weights 1..=N and the anchor takes the remainder, so the
    /// weights always sum to exactly 1.
    fn barycentric(&self, query: &[f64], sid: usize) -> Result<Vec<f64>> {
        let dim = self.tri.dim();
        let simplex = self.tri.simplex(sid);
        let v0 = self.tri.point(simplex[0]);

        let mut m = DMatrix::zeros(dim, dim);
        let mut b = DVector::zeros(dim);
        for i in 0..dim {
            b[i] = query[i] - v0[i];
            for j in 0..dim {
                let vj = self.tri.point(simplex[j + 1]);
                m[(i, j)] = vj[i] - v0[i];
            }
        }

        let lambda = solve(m, b).map_err(|e| match e {
            Error::Singular => {
                Error::DegenerateSimplex(format!("simplex {sid} has collapsed vertices"))
            }
            other => other,
        })?;

        let mut weights = vec![0.0; dim + 1];
        let mut sum = 0.0;
        for j in 0..dim {
            weights[j + 1] = lambda[j];
            sum += lambda[j];
        }
        weights[0] = 1.0 - sum;
        Ok(weights)
    }

    fn walk(&self, query: &[f64], hint: Option<usize>) -> Result<Location> {
        let mut current = hint.filter(|&sid| sid < self.tri.len()).unwrap_or(0);
        let step_cap = 2 * self.tri.len() + 10;
        let mut visited = HashSet::new();

        for step in 0..step_cap {
            if !visited.insert(current) {
                return Err(Error::WalkFailed(format!(
                    "walk revisited simplex {current}"
                )));
            }

            let weights = self.barycentric(query, current)?;

            let mut exit: Option<(usize, f64)> = None;
            for (k, &weight) in weights.iter().enumerate() {
                if weight < exit.map_or(0.0, |(_, most_negative)| most_negative) {
                    exit = Some((k, weight));
                }
            }

            match exit {
                Some((k, weight)) if weight < -WEIGHT_TOLERANCE => {
                    // The query lies across the face opposite vertex k
                    let neighbor = self.tri.neighbors_of(current)[k];
                    if neighbor == NO_NEIGHBOR {
                        return Err(Error::OutOfHull(format!(
                            "walk reached hull simplex {current} with weight {weight:.3e} \
                             across its boundary face"
                        )));
                    }
                    current = neighbor;
                }
                _ => {
                    trace!(simplex = current, steps = step, "query located");
                    return Ok(Location {
                        simplex: current,
                        weights,
                    });
                }
            }
        }

        Err(Error::WalkFailed(format!(
            "no containing simplex within {step_cap} steps"
        )))
    }

    /// Blend the corner cards of a located simplex into one synthesized card
    fn blend(&self, location: &Location) -> Result<DataCard> {
        let simplex = self.tri.simplex(location.simplex);
        let mut corners = Vec::with_capacity(simplex.len());
        for &vid in simplex {
            corners.push(self.opat.get(&self.keys[vid])?);
        }
        let anchor = corners[0];

        let mut tables = HashMap::with_capacity(anchor.tags().len());
        for tag in anchor.tags() {
            let base = anchor.get(tag)?;
            self.check_congruence(tag, base, &corners, location.simplex)?;

            let mut data = vec![0.0; base.data().len()];
            for (corner, &weight) in corners.iter().zip(&location.weights) {
                let corner_data = corner.get(tag)?.data();
                for (acc, &value) in data.iter_mut().zip(corner_data) {
                    *acc += weight * value;
                }
            }

            tables.insert(
                tag.clone(),
                Table::new(
                    base.row_values().to_vec(),
                    base.column_values().to_vec(),
                    data,
                    base.vector_size(),
                )?,
            );
        }

        Ok(DataCard::from_parts(
            anchor.header().clone(),
            anchor.index().clone(),
            tables,
        )?)
    }

    /// Every corner of the simplex must carry `tag` with the anchor's shape
    /// and axes
    fn check_congruence(
        &self,
        tag: &str,
        base: &Table,
        corners: &[&DataCard],
        sid: usize,
    ) -> Result<()> {
        for (local, corner) in corners.iter().enumerate().skip(1) {
            let table = corner.get(tag).map_err(|_| {
                Error::InconsistentSimplex(format!(
                    "corner {local} of simplex {sid} has no table {tag:?}"
                ))
            })?;
            if table.size() != base.size() || table.vector_size() != base.vector_size() {
                return Err(Error::InconsistentSimplex(format!(
                    "table {tag:?} is {:?}x{} at corner {local} of simplex {sid} \
                     but {:?}x{} at the anchor",
                    table.size(),
                    table.vector_size(),
                    base.size(),
                    base.vector_size()
                )));
            }
            if table.row_values() != base.row_values()
                || table.column_values() != base.column_values()
            {
                return Err(Error::InconsistentSimplex(format!(
                    "table {tag:?} axes differ between corner {local} and the anchor \
                     of simplex {sid}"
                )));
            }
        }
        Ok(())
    }
}
