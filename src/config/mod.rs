//! Detector configuration.
//!
//! All options are serde-serializable, carry documented defaults, and
//! offer builder-style setters. Validation happens once, at detector
//! construction: a bad configuration is a [`ConfigError`], never a
//! mid-run surprise.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shapes::{ShapeKind, MIN_SAMPLE_SIZE};

/// Configuration validation error.
///
/// Returned by [`DetectorConfig::validate`] and detector construction.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error(
        "octree split threshold {threshold} is smaller than the minimal sample size {minimum}"
    )]
    SplitThresholdTooSmall { threshold: usize, minimum: usize },

    #[error("octree cell-size split extent must be positive, got {0}")]
    InvalidCellExtent(f64),

    #[error("neighbor count k must be at least 1")]
    ZeroNeighborCount,

    #[error("neighbor max distance must be positive, got {0}")]
    InvalidNeighborDistance(f64),

    #[error("minimum model acceptance {accept} is smaller than the minimal sample size {minimum}")]
    AcceptanceTooSmall { accept: usize, minimum: usize },

    #[error("iteration budget must be at least 1")]
    ZeroIterationBudget,

    #[error(
        "hard iteration ceiling {ceiling} is smaller than the base iteration budget {base}"
    )]
    CeilingBelowBudget { ceiling: usize, base: usize },

    #[error("no shape kinds configured for detection")]
    NoShapeKinds,

    #[error("{kind:?} {name} must be positive, got {value}")]
    InvalidTolerance {
        kind: ShapeKind,
        name: &'static str,
        value: f64,
    },

    #[error("{kind:?} angle tolerance {value} must be below pi/2 radians")]
    AngleToleranceTooLarge { kind: ShapeKind, value: f64 },

    #[error("refiner max iterations must be at least 1")]
    ZeroRefinerIterations,

    #[error("refiner convergence threshold must be positive, got {0}")]
    InvalidConvergenceThreshold(f64),

    #[error("merge {name} must be in (0, 1], got {value}")]
    InvalidMergeFraction { name: &'static str, value: f64 },

    #[error("false-shape discard ratio must be in (0, 1), got {0}")]
    InvalidDiscardRatio(f64),
}

/// Octree split policy.
///
/// Both policies are interchangeable at construction; the matcher only
/// sees leaves and ancestor chains.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SplitPolicy {
    /// Split a leaf when it accumulates more than `max_points` points.
    EqualCount { max_points: usize },
    /// Split a leaf whose largest extent exceeds `max_extent` meters,
    /// independent of point count.
    CellSize { max_extent: f64 },
}

impl Default for SplitPolicy {
    fn default() -> Self {
        SplitPolicy::EqualCount { max_points: 32 }
    }
}

/// Neighbor graph construction settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Neighbors requested per point (excluding the point itself).
    /// Default: 10
    pub k: usize,

    /// Maximum neighbor distance (meters). Points farther apart are never
    /// connected, which is what bounds match-set expansion spatially.
    /// Default: 0.5m
    pub max_neighbor_distance: f64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            k: 10,
            max_neighbor_distance: 0.5,
        }
    }
}

impl GraphConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for the neighbor count.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Builder-style setter for the maximum neighbor distance.
    pub fn with_max_neighbor_distance(mut self, meters: f64) -> Self {
        self.max_neighbor_distance = meters;
        self
    }
}

/// Octree settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OctreeConfig {
    /// Leaf split policy.
    /// Default: equal-count with 32 points per leaf.
    pub split_policy: SplitPolicy,
}

impl OctreeConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for the split policy.
    pub fn with_split_policy(mut self, policy: SplitPolicy) -> Self {
        self.split_policy = policy;
        self
    }
}

/// RANSAC matcher settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Shape kinds to generate candidates for, one candidate per kind per
    /// attempt. Default: all three kinds.
    pub shape_kinds: Vec<ShapeKind>,

    /// Minimum match-set size for a candidate to be accepted.
    /// Default: 30
    pub min_model_accept: usize,

    /// Base iteration budget.
    /// Default: 1000
    pub base_iterations: usize,

    /// Budget extension granted per accepted shape: finding a shape is
    /// treated as evidence that more remain.
    /// Default: 200
    pub budget_extension: usize,

    /// Hard absolute iteration ceiling. The self-extending budget never
    /// pushes past this, which guarantees termination.
    /// Default: 100000
    pub max_total_iterations: usize,

    /// Random seed for leaf/scale/sample selection. Identical seed,
    /// cloud and configuration reproduce identical output.
    /// Default: 0 (a valid deterministic seed)
    pub seed: u64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            shape_kinds: vec![ShapeKind::Plane, ShapeKind::Sphere, ShapeKind::Cylinder],
            min_model_accept: 30,
            base_iterations: 1000,
            budget_extension: 200,
            max_total_iterations: 100_000,
            seed: 0,
        }
    }
}

impl MatcherConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for the shape kinds.
    pub fn with_shape_kinds(mut self, kinds: Vec<ShapeKind>) -> Self {
        self.shape_kinds = kinds;
        self
    }

    /// Builder-style setter for the minimum acceptance count.
    pub fn with_min_model_accept(mut self, count: usize) -> Self {
        self.min_model_accept = count;
        self
    }

    /// Builder-style setter for the base iteration budget.
    pub fn with_base_iterations(mut self, iterations: usize) -> Self {
        self.base_iterations = iterations;
        self
    }

    /// Builder-style setter for the per-acceptance budget extension.
    pub fn with_budget_extension(mut self, iterations: usize) -> Self {
        self.budget_extension = iterations;
        self
    }

    /// Builder-style setter for the hard iteration ceiling.
    pub fn with_max_total_iterations(mut self, iterations: usize) -> Self {
        self.max_total_iterations = iterations;
        self
    }

    /// Builder-style setter for the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Per-shape-kind tolerances.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ShapeTolerances {
    /// Maximum angle (radians) between a point's measured normal and the
    /// model-implied normal at that point. Applied symmetrically to both
    /// normal signs. Default: 0.15 rad (~8.6°)
    pub angle_tolerance: f64,

    /// Agreement tolerance (meters) for derived scalar quantities inside
    /// candidate generation (e.g. the radius implied by different sample
    /// points). Default: 0.05m
    pub distance_tolerance: f64,

    /// Inlier distance threshold (meters) used by match-set expansion and
    /// refinement. Default: 0.02m
    pub fit_threshold: f64,
}

impl Default for ShapeTolerances {
    fn default() -> Self {
        Self {
            angle_tolerance: 0.15,
            distance_tolerance: 0.05,
            fit_threshold: 0.02,
        }
    }
}

impl ShapeTolerances {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for the normal angle tolerance.
    pub fn with_angle_tolerance(mut self, radians: f64) -> Self {
        self.angle_tolerance = radians;
        self
    }

    /// Builder-style setter for the derived-scalar agreement tolerance.
    pub fn with_distance_tolerance(mut self, meters: f64) -> Self {
        self.distance_tolerance = meters;
        self
    }

    /// Builder-style setter for the inlier fit threshold.
    pub fn with_fit_threshold(mut self, meters: f64) -> Self {
        self.fit_threshold = meters;
        self
    }
}

/// Tolerances for each shape kind.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ShapesConfig {
    /// Plane tolerances.
    #[serde(default)]
    pub plane: ShapeTolerances,
    /// Sphere tolerances.
    #[serde(default)]
    pub sphere: ShapeTolerances,
    /// Cylinder tolerances.
    #[serde(default)]
    pub cylinder: ShapeTolerances,
}

impl ShapesConfig {
    /// Tolerances for a given shape kind.
    #[inline]
    pub fn for_kind(&self, kind: ShapeKind) -> ShapeTolerances {
        match kind {
            ShapeKind::Plane => self.plane,
            ShapeKind::Sphere => self.sphere,
            ShapeKind::Cylinder => self.cylinder,
        }
    }

    /// Apply the same tolerances to every kind.
    pub fn uniform(tolerances: ShapeTolerances) -> Self {
        Self {
            plane: tolerances,
            sphere: tolerances,
            cylinder: tolerances,
        }
    }
}

/// Local refiner settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefinerConfig {
    /// Convergence threshold on the mean absolute per-parameter change
    /// between iterations. Default: 1e-6
    pub convergence_threshold: f64,

    /// Maximum refinement iterations. Hitting the cap is not an error;
    /// the best result so far is returned. Default: 10
    pub max_iterations: usize,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            convergence_threshold: 1e-6,
            max_iterations: 10,
        }
    }
}

impl RefinerConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for the convergence threshold.
    pub fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    /// Builder-style setter for the iteration cap.
    pub fn with_max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }
}

/// Merger settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Cheap-test gate: minimum shared-point fraction
    /// |A∩B| / max(|A|,|B|) before the rigorous test runs.
    /// Default: 0.1
    pub minimum_overlap: f64,

    /// Rigorous-test gate: fraction of one shape's points the other
    /// shape's model must explain for absorption.
    /// Default: 0.8
    pub fraction_merge: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            minimum_overlap: 0.1,
            fraction_merge: 0.8,
        }
    }
}

impl MergeConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for the overlap gate.
    pub fn with_minimum_overlap(mut self, fraction: f64) -> Self {
        self.minimum_overlap = fraction;
        self
    }

    /// Builder-style setter for the explained-fraction gate.
    pub fn with_fraction_merge(mut self, fraction: f64) -> Self {
        self.fraction_merge = fraction;
        self
    }
}

/// False-shape filter settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterConfig {
    /// A shape is dropped when more than this fraction of its own points
    /// have a strictly smaller residual under another shape's model.
    /// Default: 0.5
    pub discard_ratio: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self { discard_ratio: 0.5 }
    }
}

impl FilterConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for the discard ratio.
    pub fn with_discard_ratio(mut self, ratio: f64) -> Self {
        self.discard_ratio = ratio;
        self
    }
}

/// Full detector configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Neighbor graph settings.
    #[serde(default)]
    pub graph: GraphConfig,

    /// Octree settings.
    #[serde(default)]
    pub octree: OctreeConfig,

    /// RANSAC matcher settings.
    #[serde(default)]
    pub matcher: MatcherConfig,

    /// Per-shape tolerances.
    #[serde(default)]
    pub shapes: ShapesConfig,

    /// Local refiner settings.
    #[serde(default)]
    pub refiner: RefinerConfig,

    /// Merger settings.
    #[serde(default)]
    pub merge: MergeConfig,

    /// False-shape filter settings.
    #[serde(default)]
    pub filter: FilterConfig,

    /// Run a standalone refinement pass over each accepted shape before
    /// post-processing. Default: true
    #[serde(default = "default_refine_pass")]
    pub refine_accepted: bool,
}

fn default_refine_pass() -> bool {
    true
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            graph: GraphConfig::default(),
            octree: OctreeConfig::default(),
            matcher: MatcherConfig::default(),
            shapes: ShapesConfig::default(),
            refiner: RefinerConfig::default(),
            merge: MergeConfig::default(),
            filter: FilterConfig::default(),
            refine_accepted: true,
        }
    }
}

impl DetectorConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the whole configuration.
    ///
    /// Called by detector construction so that invalid settings fail fast
    /// instead of surfacing mid-run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.graph.k == 0 {
            return Err(ConfigError::ZeroNeighborCount);
        }
        if !(self.graph.max_neighbor_distance > 0.0) {
            return Err(ConfigError::InvalidNeighborDistance(
                self.graph.max_neighbor_distance,
            ));
        }

        match self.octree.split_policy {
            SplitPolicy::EqualCount { max_points } => {
                if max_points < MIN_SAMPLE_SIZE {
                    return Err(ConfigError::SplitThresholdTooSmall {
                        threshold: max_points,
                        minimum: MIN_SAMPLE_SIZE,
                    });
                }
            }
            SplitPolicy::CellSize { max_extent } => {
                if !(max_extent > 0.0) {
                    return Err(ConfigError::InvalidCellExtent(max_extent));
                }
            }
        }

        if self.matcher.shape_kinds.is_empty() {
            return Err(ConfigError::NoShapeKinds);
        }
        if self.matcher.min_model_accept < MIN_SAMPLE_SIZE {
            return Err(ConfigError::AcceptanceTooSmall {
                accept: self.matcher.min_model_accept,
                minimum: MIN_SAMPLE_SIZE,
            });
        }
        if self.matcher.base_iterations == 0 {
            return Err(ConfigError::ZeroIterationBudget);
        }
        if self.matcher.max_total_iterations < self.matcher.base_iterations {
            return Err(ConfigError::CeilingBelowBudget {
                ceiling: self.matcher.max_total_iterations,
                base: self.matcher.base_iterations,
            });
        }

        for kind in [ShapeKind::Plane, ShapeKind::Sphere, ShapeKind::Cylinder] {
            let t = self.shapes.for_kind(kind);
            for (name, value) in [
                ("angle tolerance", t.angle_tolerance),
                ("distance tolerance", t.distance_tolerance),
                ("fit threshold", t.fit_threshold),
            ] {
                if !(value > 0.0) {
                    return Err(ConfigError::InvalidTolerance { kind, name, value });
                }
            }
            if t.angle_tolerance >= std::f64::consts::FRAC_PI_2 {
                return Err(ConfigError::AngleToleranceTooLarge {
                    kind,
                    value: t.angle_tolerance,
                });
            }
        }

        if self.refiner.max_iterations == 0 {
            return Err(ConfigError::ZeroRefinerIterations);
        }
        if !(self.refiner.convergence_threshold > 0.0) {
            return Err(ConfigError::InvalidConvergenceThreshold(
                self.refiner.convergence_threshold,
            ));
        }

        for (name, value) in [
            ("minimum_overlap", self.merge.minimum_overlap),
            ("fraction_merge", self.merge.fraction_merge),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::InvalidMergeFraction { name, value });
            }
        }

        if !(self.filter.discard_ratio > 0.0 && self.filter.discard_ratio < 1.0) {
            return Err(ConfigError::InvalidDiscardRatio(self.filter.discard_ratio));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(DetectorConfig::new().validate().is_ok());
    }

    #[test]
    fn test_split_threshold_below_sample_size() {
        let mut config = DetectorConfig::new();
        config.octree.split_policy = SplitPolicy::EqualCount { max_points: 2 };
        assert_eq!(
            config.validate(),
            Err(ConfigError::SplitThresholdTooSmall {
                threshold: 2,
                minimum: MIN_SAMPLE_SIZE
            })
        );
    }

    #[test]
    fn test_ceiling_below_budget() {
        let mut config = DetectorConfig::new();
        config.matcher.base_iterations = 500;
        config.matcher.max_total_iterations = 100;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::CeilingBelowBudget { .. })
        ));
    }

    #[test]
    fn test_empty_shape_kinds_rejected() {
        let mut config = DetectorConfig::new();
        config.matcher.shape_kinds.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoShapeKinds));
    }

    #[test]
    fn test_bad_tolerance_rejected() {
        let mut config = DetectorConfig::new();
        config.shapes.sphere.fit_threshold = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTolerance {
                kind: ShapeKind::Sphere,
                ..
            })
        ));
    }

    #[test]
    fn test_discard_ratio_bounds() {
        let mut config = DetectorConfig::new();
        config.filter.discard_ratio = 1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDiscardRatio(_))
        ));
    }

    #[test]
    fn test_builder_setters() {
        let config = MatcherConfig::new()
            .with_seed(42)
            .with_min_model_accept(10)
            .with_base_iterations(200)
            .with_budget_extension(50)
            .with_max_total_iterations(5000);
        assert_eq!(config.seed, 42);
        assert_eq!(config.min_model_accept, 10);
        assert_eq!(config.base_iterations, 200);
        assert_eq!(config.budget_extension, 50);
        assert_eq!(config.max_total_iterations, 5000);
    }
}
