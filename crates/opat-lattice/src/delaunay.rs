//! Incremental N-dimensional Delaunay triangulation with adjacency
//!
//! Built by Bowyer-Watson insertion: every point is added to a triangulation
//! seeded with one enclosing super-simplex, the simplices whose circumsphere
//! the point violates are carved out, and the cavity boundary is re-joined to
//! the point. Simplices touching the super-simplex are dropped at the end,
//! leaving a triangulation of the convex hull, and adjacency is derived from
//! the shared-face map.
//!
//! The build is O(n^2) in the point count and runs once per interpolator;
//! OPAT catalogs hold tens to low thousands of cards, so construction cost
//! is dominated by reading the file in the first place.

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::solve::solve;
use crate::{Error, Result};

/// Neighbor slot value for a face on the convex hull
pub const NO_NEIGHBOR: usize = usize::MAX;

/// Relative slack in the in-circumsphere test; keeps cospherical point sets
/// (regular grids) from flip-flopping on ties.
const INSPHERE_SLACK: f64 = 1e-10;

/// A Delaunay triangulation over a fixed point set
///
/// Vertex ids index the point slice the triangulation was built from.
/// `neighbors()[s][k]` is the simplex sharing the face opposite local vertex
/// `k` of simplex `s`, or [`NO_NEIGHBOR`] when that face lies on the hull.
#[derive(Debug, Clone)]
pub struct Triangulation {
    dim: usize,
    points: Vec<Vec<f64>>,
    simplices: Vec<Vec<usize>>,
    neighbors: Vec<Vec<usize>>,
}

impl Triangulation {
    /// Triangulate `points` (each of the same dimension)
    ///
    /// # Errors
    ///
    /// [`Error::Triangulation`] when there are fewer than `dim + 1` points,
    /// dimensions are ragged, the point set is degenerate (no
    /// full-dimensional simplex survives), or the face structure comes out
    /// inconsistent.
    pub fn build(points: &[Vec<f64>]) -> Result<Self> {
        let dim = match points.first() {
            Some(first) if !first.is_empty() => first.len(),
            _ => {
                return Err(Error::Triangulation(
                    "cannot triangulate an empty point set".into(),
                ))
            }
        };
        if points.iter().any(|p| p.len() != dim) {
            return Err(Error::Triangulation(
                "points have inconsistent dimensions".into(),
            ));
        }
        if points.len() < dim + 1 {
            return Err(Error::Triangulation(format!(
                "{} points cannot span {} dimensions ({} needed)",
                points.len(),
                dim,
                dim + 1
            )));
        }

        let mut vertices = points.to_vec();
        let super_ids = push_super_simplex(&mut vertices, dim);
        let mut simplices: Vec<Vec<usize>> = vec![super_ids];

        for pid in 0..points.len() {
            let point = vertices[pid].clone();
            insert_point(&vertices, &mut simplices, pid, &point, dim)?;
        }

        // Everything touching the super-simplex is outside the hull
        simplices.retain(|s| s.iter().all(|&v| v < points.len()));
        if simplices.is_empty() {
            return Err(Error::Triangulation(
                "point set is degenerate: no full-dimensional simplex survives".into(),
            ));
        }

        let neighbors = build_adjacency(&simplices, dim)?;
        debug!(
            points = points.len(),
            dim,
            simplices = simplices.len(),
            "triangulation built"
        );

        Ok(Self {
            dim,
            points: points.to_vec(),
            simplices,
            neighbors,
        })
    }

    /// Spatial dimension
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of simplices
    pub fn len(&self) -> usize {
        self.simplices.len()
    }

    /// True when the triangulation holds no simplices (never after `build`)
    pub fn is_empty(&self) -> bool {
        self.simplices.is_empty()
    }

    /// The points the triangulation was built over
    pub fn points(&self) -> &[Vec<f64>] {
        &self.points
    }

    /// Coordinates of vertex `id`
    pub fn point(&self, id: usize) -> &[f64] {
        &self.points[id]
    }

    /// All simplices as `dim + 1` sorted vertex ids each
    pub fn simplices(&self) -> &[Vec<usize>] {
        &self.simplices
    }

    /// Vertex ids of simplex `sid`
    pub fn simplex(&self, sid: usize) -> &[usize] {
        &self.simplices[sid]
    }

    /// Full adjacency table
    pub fn neighbors(&self) -> &[Vec<usize>] {
        &self.neighbors
    }

    /// Neighbor slots of simplex `sid`, one per local vertex
    pub fn neighbors_of(&self, sid: usize) -> &[usize] {
        &self.neighbors[sid]
    }
}

/// Append `dim + 1` vertices forming a right-angle simplex that strictly
/// contains every existing vertex, returning their ids
fn push_super_simplex(vertices: &mut Vec<Vec<f64>>, dim: usize) -> Vec<usize> {
    let mut lo = vec![f64::INFINITY; dim];
    let mut hi = vec![f64::NEG_INFINITY; dim];
    for point in vertices.iter() {
        for d in 0..dim {
            lo[d] = lo[d].min(point[d]);
            hi[d] = hi[d].max(point[d]);
        }
    }
    let span = lo
        .iter()
        .zip(&hi)
        .map(|(l, h)| h - l)
        .fold(1.0f64, f64::max);
    let margin = 3.0 * span + 1.0;

    // The simplex {x : x_d >= base_d, sum(x_d - base_d) <= reach} has its
    // right-angle corner at base; every data point keeps at least `margin`
    // of slack on each face.
    let base: Vec<f64> = lo.iter().map(|l| l - margin).collect();
    let reach = dim as f64 * (margin + span) + margin;

    let first = vertices.len();
    vertices.push(base.clone());
    for d in 0..dim {
        let mut v = base.clone();
        v[d] += reach;
        vertices.push(v);
    }
    (first..first + dim + 1).collect()
}

/// One Bowyer-Watson insertion step
fn insert_point(
    vertices: &[Vec<f64>],
    simplices: &mut Vec<Vec<usize>>,
    pid: usize,
    point: &[f64],
    dim: usize,
) -> Result<()> {
    let mut violated = Vec::new();
    for (sid, simplex) in simplices.iter().enumerate() {
        if in_circumsphere(vertices, simplex, point)? {
            violated.push(sid);
        }
    }
    if violated.is_empty() {
        // The super-simplex contains every point, so this means the
        // predicate broke down.
        return Err(Error::Triangulation(format!(
            "insertion point {pid} violates no circumsphere"
        )));
    }

    // A cavity face kept by exactly one violated simplex is on the cavity
    // boundary; faces counted twice are interior and vanish with it.
    let mut face_counts: BTreeMap<Vec<usize>, usize> = BTreeMap::new();
    for &sid in &violated {
        for k in 0..=dim {
            let mut face = simplices[sid].clone();
            face.remove(k);
            *face_counts.entry(face).or_insert(0) += 1;
        }
    }

    let mut next: Vec<Vec<usize>> = Vec::with_capacity(simplices.len());
    for (sid, simplex) in simplices.drain(..).enumerate() {
        if !violated.contains(&sid) {
            next.push(simplex);
        }
    }
    for (face, count) in face_counts {
        if count == 1 {
            let mut simplex = face;
            simplex.push(pid);
            simplex.sort_unstable();
            next.push(simplex);
        }
    }
    *simplices = next;
    Ok(())
}

/// Does `point` lie strictly inside the circumsphere of `simplex`?
///
/// A degenerate (flat) simplex has no circumsphere; it is reported as
/// violated so insertion carves it away.
fn in_circumsphere(vertices: &[Vec<f64>], simplex: &[usize], point: &[f64]) -> Result<bool> {
    let dim = point.len();
    let v0 = &vertices[simplex[0]];

    // Circumcenter c (relative to v0) solves 2 (v_i - v0) . c = |v_i - v0|^2
    let mut m = DMatrix::zeros(dim, dim);
    let mut rhs = DVector::zeros(dim);
    for i in 0..dim {
        let vi = &vertices[simplex[i + 1]];
        let mut norm2 = 0.0;
        for d in 0..dim {
            let diff = vi[d] - v0[d];
            m[(i, d)] = 2.0 * diff;
            norm2 += diff * diff;
        }
        rhs[i] = norm2;
    }

    let center = match solve(m, rhs) {
        Ok(center) => center,
        Err(Error::Singular) => return Ok(true),
        Err(e) => return Err(e),
    };

    let mut radius2 = 0.0;
    let mut dist2 = 0.0;
    for d in 0..dim {
        radius2 += center[d] * center[d];
        let diff = point[d] - v0[d] - center[d];
        dist2 += diff * diff;
    }
    Ok(dist2 < radius2 * (1.0 - INSPHERE_SLACK))
}

/// Derive `neighbors[s][k]` from the shared-face map
fn build_adjacency(simplices: &[Vec<usize>], dim: usize) -> Result<Vec<Vec<usize>>> {
    let mut face_map: BTreeMap<Vec<usize>, Vec<(usize, usize)>> = BTreeMap::new();
    for (sid, simplex) in simplices.iter().enumerate() {
        for k in 0..=dim {
            let mut face = simplex.clone();
            face.remove(k);
            face_map.entry(face).or_default().push((sid, k));
        }
    }

    let mut neighbors = vec![vec![NO_NEIGHBOR; dim + 1]; simplices.len()];
    for (face, sharers) in face_map {
        match sharers[..] {
            [_] => {} // hull face
            [(s1, k1), (s2, k2)] => {
                neighbors[s1][k1] = s2;
                neighbors[s2][k2] = s1;
            }
            _ => {
                return Err(Error::Triangulation(format!(
                    "face {face:?} is shared by {} simplices",
                    sharers.len()
                )))
            }
        }
    }
    Ok(neighbors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Volume of simplex `sid`: |det(v_i - v_0)| / dim!
    fn volume(tri: &Triangulation, sid: usize) -> f64 {
        let dim = tri.dim();
        let simplex = tri.simplex(sid);
        let v0 = tri.point(simplex[0]);
        let mut m = DMatrix::zeros(dim, dim);
        for j in 0..dim {
            let vj = tri.point(simplex[j + 1]);
            for i in 0..dim {
                m[(i, j)] = vj[i] - v0[i];
            }
        }
        let factorial: f64 = (1..=dim).map(|k| k as f64).product();
        m.determinant().abs() / factorial
    }

    fn total_volume(tri: &Triangulation) -> f64 {
        (0..tri.len()).map(|sid| volume(tri, sid)).sum()
    }

    fn assert_adjacency_consistent(tri: &Triangulation) {
        for (sid, slots) in tri.neighbors().iter().enumerate() {
            assert_eq!(slots.len(), tri.dim() + 1);
            for (k, &neighbor) in slots.iter().enumerate() {
                if neighbor == NO_NEIGHBOR {
                    continue;
                }
                // The shared face is this simplex minus local vertex k
                let mut face = tri.simplex(sid).to_vec();
                face.remove(k);
                let other = tri.simplex(neighbor);
                assert!(
                    face.iter().all(|v| other.contains(v)),
                    "neighbor {neighbor} of {sid} does not share the face opposite vertex {k}"
                );
                // And the relation is symmetric
                assert!(tri.neighbors_of(neighbor).contains(&sid));
            }
        }
    }

    #[test]
    fn test_segments_on_a_line() {
        let points: Vec<Vec<f64>> = (0..4).map(|i| vec![i as f64]).collect();
        let tri = Triangulation::build(&points).unwrap();

        assert_eq!(tri.dim(), 1);
        assert_eq!(tri.len(), 3);
        assert_adjacency_consistent(&tri);
        assert_relative_eq!(total_volume(&tri), 3.0, epsilon = 1e-9);

        // Interior segments touch two neighbors, end segments one
        let hull_faces: usize = tri
            .neighbors()
            .iter()
            .map(|slots| slots.iter().filter(|&&n| n == NO_NEIGHBOR).count())
            .sum();
        assert_eq!(hull_faces, 2);
    }

    #[test]
    fn test_unit_square() {
        let points = vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 1.0],
        ];
        let tri = Triangulation::build(&points).unwrap();

        // Either diagonal is a valid Delaunay split of a square
        assert_eq!(tri.len(), 2);
        assert_adjacency_consistent(&tri);
        assert_relative_eq!(total_volume(&tri), 1.0, epsilon = 1e-9);

        // Exactly one interior face: each triangle has one real neighbor
        for slots in tri.neighbors() {
            let real = slots.iter().filter(|&&n| n != NO_NEIGHBOR).count();
            assert_eq!(real, 1);
        }
    }

    #[test]
    fn test_grid_two_d() {
        let mut points = Vec::new();
        for x in 0..4 {
            for y in 0..3 {
                points.push(vec![x as f64 * 0.15 + 0.2, y as f64 * 0.03]);
            }
        }
        let tri = Triangulation::build(&points).unwrap();

        // A triangulated m x n grid always has 2(m-1)(n-1) triangles
        assert_eq!(tri.len(), 12);
        assert_adjacency_consistent(&tri);
        assert_relative_eq!(total_volume(&tri), 3.0 * 0.15 * 2.0 * 0.03, epsilon = 1e-9);
    }

    #[test]
    fn test_unit_cube() {
        let mut points = Vec::new();
        for x in 0..2 {
            for y in 0..2 {
                for z in 0..2 {
                    points.push(vec![x as f64, y as f64, z as f64]);
                }
            }
        }
        let tri = Triangulation::build(&points).unwrap();

        assert_eq!(tri.dim(), 3);
        assert!(tri.len() >= 5, "a cube needs at least 5 tetrahedra");
        assert_adjacency_consistent(&tri);
        assert_relative_eq!(total_volume(&tri), 1.0, epsilon = 1e-9);

        for (sid, simplex) in tri.simplices().iter().enumerate() {
            assert_eq!(simplex.len(), 4);
            assert!(volume(&tri, sid) > 0.0);
        }
    }

    #[test]
    fn test_rejects_too_few_points() {
        let points = vec![vec![0.0, 0.0], vec![1.0, 1.0]];
        assert!(matches!(
            Triangulation::build(&points),
            Err(Error::Triangulation(_))
        ));
    }

    #[test]
    fn test_rejects_collinear_set() {
        let points: Vec<Vec<f64>> = (0..5).map(|i| vec![i as f64, 2.0 * i as f64]).collect();
        assert!(matches!(
            Triangulation::build(&points),
            Err(Error::Triangulation(_))
        ));
    }

    #[test]
    fn test_rejects_ragged_points() {
        let points = vec![vec![0.0, 0.0], vec![1.0]];
        assert!(matches!(
            Triangulation::build(&points),
            Err(Error::Triangulation(_))
        ));
    }

    #[test]
    fn test_vertex_ids_index_the_input() {
        let points = vec![
            vec![0.0, 0.0],
            vec![2.0, 0.0],
            vec![1.0, 1.5],
        ];
        let tri = Triangulation::build(&points).unwrap();

        assert_eq!(tri.len(), 1);
        assert_eq!(tri.simplex(0), &[0, 1, 2]);
        assert_eq!(tri.point(2), &[1.0, 1.5]);
        assert_eq!(tri.neighbors_of(0), &[NO_NEIGHBOR; 3]);
    }
}
