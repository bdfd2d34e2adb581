//! Pluggable nearest-neighbor search.
//!
//! The graph builder depends only on the narrow [`NearestNeighbor`]
//! contract, never on a concrete spatial structure: any KD-tree,
//! ball-tree or brute-force provider satisfies it. The default provider
//! wraps a kiddo k-d tree.

use kiddo::{KdTree, SquaredEuclidean};
use thiserror::Error;

use crate::core::Point3D;

/// Nearest-neighbor search failure.
///
/// Search failures are hard errors for the whole graph build pass: they
/// signal malformed input (NaN coordinates) or a broken provider, not a
/// recoverable per-point condition.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("point {index} has a non-finite coordinate")]
    NonFiniteCoordinate { index: usize },

    #[error("query point has a non-finite coordinate")]
    NonFiniteQuery,

    #[error("search invoked before set_points")]
    NotInitialized,
}

/// One neighbor returned by a search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    /// Index of the neighbor in the point set passed to `set_points`.
    pub index: u32,
    /// Euclidean distance from the query.
    pub distance: f64,
}

/// Narrow nearest-neighbor provider contract.
///
/// `set_points` (re)initializes the provider and must fully replace any
/// prior state; `find_nearest` returns up to `k` neighbors within
/// `max_distance` of the query, closest first.
pub trait NearestNeighbor {
    /// Load a point set, replacing any previous one.
    fn set_points(&mut self, points: &[Point3D]) -> Result<(), SearchError>;

    /// Up to `k` nearest points within `max_distance`, closest first.
    fn find_nearest(
        &self,
        query: Point3D,
        max_distance: f64,
        k: usize,
    ) -> Result<Vec<Neighbor>, SearchError>;
}

/// KD-tree provider backed by kiddo.
#[derive(Default)]
pub struct KdTreeSearch {
    tree: Option<KdTree<f64, 3>>,
}

impl KdTreeSearch {
    /// Create an empty provider; call `set_points` before searching.
    pub fn new() -> Self {
        Self::default()
    }
}

impl NearestNeighbor for KdTreeSearch {
    fn set_points(&mut self, points: &[Point3D]) -> Result<(), SearchError> {
        let mut tree: KdTree<f64, 3> = KdTree::new();
        for (i, p) in points.iter().enumerate() {
            if !p.is_finite() {
                return Err(SearchError::NonFiniteCoordinate { index: i });
            }
            tree.add(&p.to_array(), i as u64);
        }
        self.tree = Some(tree);
        Ok(())
    }

    fn find_nearest(
        &self,
        query: Point3D,
        max_distance: f64,
        k: usize,
    ) -> Result<Vec<Neighbor>, SearchError> {
        let tree = self.tree.as_ref().ok_or(SearchError::NotInitialized)?;
        if !query.is_finite() {
            return Err(SearchError::NonFiniteQuery);
        }

        let max_dist_sq = max_distance * max_distance;
        let found = tree.nearest_n::<SquaredEuclidean>(&query.to_array(), k);
        Ok(found
            .into_iter()
            .filter(|n| n.distance <= max_dist_sq)
            .map(|n| Neighbor {
                index: n.item as u32,
                distance: n.distance.sqrt(),
            })
            .collect())
    }
}

/// Brute-force provider; O(n) per query, useful for tests and small clouds.
#[derive(Default)]
pub struct BruteForceSearch {
    points: Vec<Point3D>,
    initialized: bool,
}

impl BruteForceSearch {
    /// Create an empty provider; call `set_points` before searching.
    pub fn new() -> Self {
        Self::default()
    }
}

impl NearestNeighbor for BruteForceSearch {
    fn set_points(&mut self, points: &[Point3D]) -> Result<(), SearchError> {
        for (i, p) in points.iter().enumerate() {
            if !p.is_finite() {
                return Err(SearchError::NonFiniteCoordinate { index: i });
            }
        }
        self.points.clear();
        self.points.extend_from_slice(points);
        self.initialized = true;
        Ok(())
    }

    fn find_nearest(
        &self,
        query: Point3D,
        max_distance: f64,
        k: usize,
    ) -> Result<Vec<Neighbor>, SearchError> {
        if !self.initialized {
            return Err(SearchError::NotInitialized);
        }
        if !query.is_finite() {
            return Err(SearchError::NonFiniteQuery);
        }

        let mut found: Vec<Neighbor> = self
            .points
            .iter()
            .enumerate()
            .filter_map(|(i, &p)| {
                let distance = p.distance(query);
                (distance <= max_distance).then_some(Neighbor {
                    index: i as u32,
                    distance,
                })
            })
            .collect();
        found.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        found.truncate(k);
        Ok(found)
    }
}
