//! Point-neighbor graph with per-point surface normals.
//!
//! The graph is stored struct-of-arrays: normals, CSR adjacency, a
//! "used" flag (claimed by an accepted shape) and a visit marker per
//! point. The visit marker is an integer compared against a
//! monotonically increasing search generation instead of a bool that
//! would need an O(n) clear before every match attempt.
//!
//! Edges are built from a k-nearest query per point and are therefore
//! not guaranteed perfectly symmetric; consumers only ever expand along
//! edges, never assume symmetry.

pub mod search;

pub use search::{BruteForceSearch, KdTreeSearch, NearestNeighbor, Neighbor, SearchError};

use thiserror::Error;

use crate::config::GraphConfig;
use crate::core::math::fit_plane_normal;
use crate::core::Point3D;

/// Graph construction failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphBuildError {
    /// The nearest-neighbor collaborator failed; the whole pass fails
    /// (this signals malformed input, not a per-point condition).
    #[error("nearest neighbor search failed: {0}")]
    Search(#[from] SearchError),
}

/// Neighbor graph over a point cloud (struct-of-arrays).
///
/// Index `i` in every array corresponds to point `i` of the cloud the
/// graph was built from; lengths always equal the cloud size.
#[derive(Clone, Debug, Default)]
pub struct NeighborGraph {
    /// Approximate unit surface normal per point; zero when the point
    /// had fewer than 2 neighbors. Sign is arbitrary and not globally
    /// consistent.
    pub normals: Vec<Point3D>,
    /// CSR adjacency: neighbors of point `i` are
    /// `neighbor_targets[neighbor_offsets[i]..neighbor_offsets[i + 1]]`.
    pub neighbor_offsets: Vec<u32>,
    /// Flattened neighbor indices.
    pub neighbor_targets: Vec<u32>,
    /// Whether the point is claimed by an accepted shape.
    pub used: Vec<bool>,
    /// Visit marker, compared against the current search generation.
    pub visited: Vec<u64>,
    /// Monotonically increasing search generation; bumped per match
    /// attempt instead of clearing `visited`.
    generation: u64,
}

impl NeighborGraph {
    /// Number of points in the graph.
    #[inline]
    pub fn len(&self) -> usize {
        self.normals.len()
    }

    /// Whether the graph is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.normals.is_empty()
    }

    /// Neighbor indices of a point.
    #[inline]
    pub fn neighbors_of(&self, index: u32) -> &[u32] {
        let start = self.neighbor_offsets[index as usize] as usize;
        let end = self.neighbor_offsets[index as usize + 1] as usize;
        &self.neighbor_targets[start..end]
    }

    /// Start a new expansion search; returns the fresh generation value.
    #[inline]
    pub fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}

/// Build the neighbor graph for a cloud.
///
/// For every point, queries the provider for up to `k` neighbors within
/// `max_neighbor_distance` (excluding the point itself) and fits a
/// least-squares plane through the point and its neighbors for the
/// normal; points with fewer than 2 neighbors get a zero normal.
///
/// The provider is (re)loaded via `set_points`, so repeated builds on
/// different clouds leave no stale state behind.
pub fn build_graph(
    cloud: &[Point3D],
    provider: &mut dyn NearestNeighbor,
    config: &GraphConfig,
) -> Result<NeighborGraph, GraphBuildError> {
    provider.set_points(cloud)?;

    let mut graph = NeighborGraph {
        normals: Vec::with_capacity(cloud.len()),
        neighbor_offsets: Vec::with_capacity(cloud.len() + 1),
        neighbor_targets: Vec::new(),
        used: vec![false; cloud.len()],
        visited: vec![0; cloud.len()],
        generation: 0,
    };
    graph.neighbor_offsets.push(0);

    let mut patch: Vec<Point3D> = Vec::with_capacity(config.k + 1);

    for (i, &p) in cloud.iter().enumerate() {
        // Ask for one extra: the query point itself comes back at
        // distance zero and is dropped.
        let found = provider.find_nearest(p, config.max_neighbor_distance, config.k + 1)?;

        patch.clear();
        patch.push(p);
        for neighbor in &found {
            if neighbor.index as usize == i {
                continue;
            }
            if graph.neighbor_targets.len()
                - graph.neighbor_offsets[i] as usize
                >= config.k
            {
                break;
            }
            graph.neighbor_targets.push(neighbor.index);
            patch.push(cloud[neighbor.index as usize]);
        }
        graph.neighbor_offsets.push(graph.neighbor_targets.len() as u32);

        // Normal from the local patch; needs at least 2 neighbors.
        let normal = if patch.len() >= 3 {
            fit_plane_normal(&patch).unwrap_or(Point3D::ZERO)
        } else {
            Point3D::ZERO
        };
        graph.normals.push(normal);
    }

    Ok(graph)
}
