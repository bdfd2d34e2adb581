//! Top-level primitive-shape detector.
//!
//! Owns the long-lived structures (octree with its node pool, the
//! nearest-neighbor provider) and runs the full pipeline per call:
//! neighbor graph → octree → RANSAC matching → refinement →
//! merge → false-shape filter.

use std::time::Instant;

use log::debug;
use thiserror::Error;

use crate::config::{ConfigError, DetectorConfig};
use crate::core::{Bounds, Point3D};
use crate::graph::{build_graph, GraphBuildError, KdTreeSearch, NearestNeighbor, NeighborGraph};
use crate::matching::{refine, MatcherStats, RobustMatcher};
use crate::octree::Octree;
use crate::postprocess::{filter_false_shapes, merge_shapes, FilterStats, MergeStats};
use crate::shapes::{FoundShape, ShapeDescriptor};

/// Detection failure.
///
/// Sample-level degeneracies are recovered inside the matcher and never
/// surface here; a run that finds zero shapes is a legitimate success.
#[derive(Error, Debug)]
pub enum DetectError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("neighbor graph construction failed: {0}")]
    Graph(#[from] GraphBuildError),
}

/// Per-phase timing breakdown (all times in microseconds).
#[derive(Clone, Debug, Default)]
pub struct DetectionTiming {
    /// Neighbor graph construction (µs).
    pub graph_us: u64,
    /// Octree construction (µs).
    pub octree_us: u64,
    /// RANSAC matching (µs).
    pub matching_us: u64,
    /// Standalone refinement pass (µs).
    pub refine_us: u64,
    /// Merge pass (µs).
    pub merge_us: u64,
    /// False-shape filter pass (µs).
    pub filter_us: u64,
    /// Total detection time (µs).
    pub total_us: u64,
}

/// Statistics for one detection run.
#[derive(Clone, Debug, Default)]
pub struct DetectionStats {
    /// Matcher counters.
    pub matcher: MatcherStats,
    /// Merge counters.
    pub merge: MergeStats,
    /// Filter counters.
    pub filter: FilterStats,
    /// Shapes refined by the standalone refinement pass.
    pub refined: usize,
    /// Timing breakdown.
    pub timing: DetectionTiming,
}

/// Result of one detection run.
#[derive(Clone, Debug)]
pub struct DetectionResult {
    /// Detected shapes after post-processing, in acceptance order.
    pub shapes: Vec<FoundShape>,
    /// Indices of points claimed by no surviving shape (ascending).
    pub unmatched: Vec<u32>,
    /// Run statistics.
    pub stats: DetectionStats,
}

/// Primitive-shape detector over static 3D point clouds.
///
/// Batch and one-shot: `detect` runs the whole pipeline over the given
/// cloud. The detector is reusable; the octree pool is recycled between
/// runs and identical input + configuration (including the seed)
/// reproduces identical output.
///
/// # Usage
///
/// ```rust,no_run
/// use rupa_detect::{DetectorConfig, PrimitiveDetector};
/// use rupa_detect::core::Point3D;
///
/// let config = DetectorConfig::default();
/// let mut detector = PrimitiveDetector::new(config).unwrap();
///
/// let cloud: Vec<Point3D> = load_points();
/// let result = detector.detect(&cloud).unwrap();
/// for shape in &result.shapes {
///     println!("{:?} with {} member points", shape.kind, shape.len());
/// }
/// # fn load_points() -> Vec<Point3D> { Vec::new() }
/// ```
pub struct PrimitiveDetector {
    config: DetectorConfig,
    octree: Octree,
    search: Box<dyn NearestNeighbor>,
}

impl PrimitiveDetector {
    /// Create a detector with the default KD-tree search provider.
    ///
    /// Fails fast on an invalid configuration.
    pub fn new(config: DetectorConfig) -> Result<Self, ConfigError> {
        Self::with_search(config, Box::new(KdTreeSearch::new()))
    }

    /// Create a detector with a custom nearest-neighbor provider.
    pub fn with_search(
        config: DetectorConfig,
        search: Box<dyn NearestNeighbor>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let octree = Octree::new(config.octree.split_policy);
        Ok(Self {
            config,
            octree,
            search,
        })
    }

    /// Current configuration.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detect primitive shapes in a cloud.
    ///
    /// The cloud is borrowed for the call and never mutated; shape
    /// members reference it by index. Partial results are always
    /// returned, even when the budget was mostly consumed by wasted
    /// attempts.
    pub fn detect(&mut self, cloud: &[Point3D]) -> Result<DetectionResult, DetectError> {
        let run_start = Instant::now();
        let mut stats = DetectionStats::default();

        if cloud.is_empty() {
            return Ok(DetectionResult {
                shapes: Vec::new(),
                unmatched: Vec::new(),
                stats,
            });
        }

        // Neighbor graph (hard failure on a broken collaborator or NaN
        // input).
        let phase = Instant::now();
        let mut graph = build_graph(cloud, self.search.as_mut(), &self.config.graph)?;
        stats.timing.graph_us = phase.elapsed().as_micros() as u64;

        // Octree over the same points; the pool from the previous run is
        // recycled.
        let phase = Instant::now();
        self.octree.initialize(Bounds::from_points(cloud));
        for i in 0..cloud.len() {
            self.octree.add_point(cloud, i as u32);
        }
        stats.timing.octree_us = phase.elapsed().as_micros() as u64;

        // RANSAC matching.
        let phase = Instant::now();
        let descriptors: Vec<ShapeDescriptor> = self
            .config
            .matcher
            .shape_kinds
            .iter()
            .map(|&kind| ShapeDescriptor::new(kind, self.config.shapes.for_kind(kind)))
            .collect();
        let mut matcher = RobustMatcher::new(cloud, &self.octree, &descriptors, &self.config.matcher);
        let (mut shapes, matcher_stats) = matcher.run(&mut graph);
        stats.matcher = matcher_stats;
        stats.timing.matching_us = phase.elapsed().as_micros() as u64;

        // Standalone quality pass: refine each accepted shape. The
        // unrestricted re-match deliberately lets detections of the same
        // surface grow into overlapping memberships, which is what the
        // merger's overlap test arbitrates next.
        let phase = Instant::now();
        if self.config.refine_accepted {
            for shape in &mut shapes {
                let descriptor =
                    ShapeDescriptor::new(shape.kind, self.config.shapes.for_kind(shape.kind));
                let result = refine(
                    cloud,
                    &mut graph,
                    &descriptor,
                    &shape.points,
                    shape.model,
                    false,
                    false,
                    &self.config.refiner,
                );
                if result.points.is_empty() {
                    continue;
                }
                shape.points = result.points;
                shape.model = result.model;
                stats.refined += 1;
            }
        }
        stats.timing.refine_us = phase.elapsed().as_micros() as u64;

        // Merge overlapping detections of the same surface.
        let phase = Instant::now();
        let (shapes, merge_stats) = merge_shapes(
            cloud,
            &mut graph,
            shapes,
            &self.config.shapes,
            &self.config.merge,
            &self.config.refiner,
        );
        stats.merge = merge_stats;
        stats.timing.merge_us = phase.elapsed().as_micros() as u64;

        // Drop shapes that are artifacts of sampling randomness.
        let phase = Instant::now();
        let (mut shapes, filter_stats) = filter_false_shapes(
            cloud,
            &graph,
            shapes,
            &self.config.shapes,
            &self.config.filter,
        );
        stats.filter = filter_stats;
        stats.timing.filter_us = phase.elapsed().as_micros() as u64;

        // A point may appear in exactly one surviving shape: residual
        // overlaps the merger left behind are assigned to the shape that
        // explains the point best.
        resolve_ownership(cloud, &graph, &self.config, &mut shapes);

        let unmatched = unmatched_indices(cloud.len(), &shapes);
        stats.timing.total_us = run_start.elapsed().as_micros() as u64;
        debug!(
            "detected {} shapes, {} unmatched points in {}us",
            shapes.len(),
            unmatched.len(),
            stats.timing.total_us
        );

        Ok(DetectionResult {
            shapes,
            unmatched,
            stats,
        })
    }
}

/// Assign every multiply-claimed point to its best-explaining shape.
///
/// Shapes whose memberships still overlap after merging (close surfaces
/// below the merge thresholds) each keep only the points their own
/// model explains at least as well as any other survivor's; earlier
/// shapes win exact ties.
fn resolve_ownership(
    cloud: &[Point3D],
    graph: &NeighborGraph,
    config: &DetectorConfig,
    shapes: &mut Vec<FoundShape>,
) {
    // (owner shape index, residual) per point; only filled where claims
    // exist.
    let mut owner: Vec<Option<(usize, f64)>> = vec![None; cloud.len()];
    for (si, shape) in shapes.iter().enumerate() {
        let descriptor = ShapeDescriptor::new(shape.kind, config.shapes.for_kind(shape.kind));
        for &p in &shape.points {
            let residual = descriptor.distance(
                &shape.model,
                cloud[p as usize],
                graph.normals[p as usize],
            );
            match owner[p as usize] {
                Some((_, best)) if best <= residual => {}
                _ => owner[p as usize] = Some((si, residual)),
            }
        }
    }
    for (si, shape) in shapes.iter_mut().enumerate() {
        shape
            .points
            .retain(|&p| matches!(owner[p as usize], Some((s, _)) if s == si));
    }
    // A shape stripped of every point has nothing left to report.
    shapes.retain(|shape| !shape.is_empty());
}

/// Indices of cloud points claimed by no shape, ascending.
fn unmatched_indices(cloud_len: usize, shapes: &[FoundShape]) -> Vec<u32> {
    let mut claimed = vec![false; cloud_len];
    for shape in shapes {
        for &p in &shape.points {
            claimed[p as usize] = true;
        }
    }
    claimed
        .iter()
        .enumerate()
        .filter_map(|(i, &c)| (!c).then_some(i as u32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GraphConfig, SplitPolicy};
    use crate::graph::BruteForceSearch;
    use crate::shapes::ShapeKind;

    fn plane_cloud() -> Vec<Point3D> {
        let mut cloud = Vec::new();
        for i in 0..12 {
            for j in 0..12 {
                cloud.push(Point3D::new(i as f64 * 0.1, j as f64 * 0.1, 0.5));
            }
        }
        cloud
    }

    fn test_config() -> DetectorConfig {
        let mut config = DetectorConfig::new();
        config.graph = GraphConfig::new().with_k(8).with_max_neighbor_distance(0.3);
        config.octree.split_policy = SplitPolicy::EqualCount { max_points: 16 };
        config.matcher.shape_kinds = vec![ShapeKind::Plane];
        config.matcher.min_model_accept = 20;
        config.matcher.base_iterations = 300;
        config.matcher.seed = 9;
        config
    }

    #[test]
    fn test_invalid_config_fails_at_construction() {
        let mut config = test_config();
        config.matcher.base_iterations = 0;
        assert!(PrimitiveDetector::new(config).is_err());
    }

    #[test]
    fn test_empty_cloud_is_not_an_error() {
        let mut detector = PrimitiveDetector::new(test_config()).unwrap();
        let result = detector.detect(&[]).unwrap();
        assert!(result.shapes.is_empty());
        assert!(result.unmatched.is_empty());
    }

    #[test]
    fn test_detects_plane_with_unmatched_outliers() {
        let mut cloud = plane_cloud();
        // Far-away stragglers no shape can claim.
        cloud.push(Point3D::new(50.0, 0.0, 0.0));
        cloud.push(Point3D::new(0.0, 50.0, 0.0));

        let mut detector =
            PrimitiveDetector::with_search(test_config(), Box::new(BruteForceSearch::new()))
                .unwrap();
        let result = detector.detect(&cloud).unwrap();

        assert_eq!(result.shapes.len(), 1);
        assert_eq!(result.shapes[0].kind, ShapeKind::Plane);
        assert_eq!(result.shapes[0].len(), 144);
        assert_eq!(
            result.unmatched,
            vec![144, 145],
            "outliers are reported, not dropped"
        );
    }

    #[test]
    fn test_nan_input_is_hard_error() {
        let mut cloud = plane_cloud();
        cloud[5] = Point3D::new(f64::NAN, 0.0, 0.0);
        let mut detector = PrimitiveDetector::new(test_config()).unwrap();
        assert!(matches!(
            detector.detect(&cloud),
            Err(DetectError::Graph(_))
        ));
    }

    #[test]
    fn test_determinism_across_runs() {
        // Identical cloud + seed + config, with the octree pool
        // recycled in between, reproduces identical output.
        let cloud = plane_cloud();
        let mut detector =
            PrimitiveDetector::with_search(test_config(), Box::new(BruteForceSearch::new()))
                .unwrap();

        let first = detector.detect(&cloud).unwrap();
        let second = detector.detect(&cloud).unwrap();

        assert_eq!(first.shapes, second.shapes);
        assert_eq!(first.unmatched, second.unmatched);
    }
}
