//! # Rupa-Detect: Primitive Shape Detection in 3D Point Clouds
//!
//! Detects planes, spheres and cylinders in static point clouds with a
//! robust multi-model RANSAC search. Two structures make the search
//! cheap and scale-free:
//!
//! - **Octree sampling**: candidates are seeded from a uniformly random
//!   leaf, then a uniformly random ancestor of that leaf, so shapes get
//!   discovered at whichever spatial scale the draw lands on; no scale
//!   parameter exists.
//! - **Graph-bounded matching**: candidate support is collected by
//!   flooding a k-nearest-neighbor graph outward from the seed points
//!   instead of scanning the whole cloud, so one attempt costs only the
//!   locally connected inlier region and disjoint look-alike patches
//!   stay separate.
//!
//! Accepted shapes pass through local refinement, cross-shape merging
//! and a false-shape filter before the final list is returned together
//! with the unmatched points.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rupa_detect::{DetectorConfig, PrimitiveDetector};
//! use rupa_detect::core::Point3D;
//!
//! let mut config = DetectorConfig::default();
//! config.matcher.seed = 42; // explicit seed: runs are reproducible
//!
//! let cloud: Vec<Point3D> = load_points();
//! let mut detector = PrimitiveDetector::new(config).unwrap();
//! let result = detector.detect(&cloud).unwrap();
//!
//! for shape in &result.shapes {
//!     println!("{:?}: {} points", shape.kind, shape.len());
//! }
//! println!("{} points unmatched", result.unmatched.len());
//! # fn load_points() -> Vec<Point3D> { Vec::new() }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into modules:
//!
//! - [`core`]: Fundamental types (Point3D, Bounds, shared math)
//! - [`config`]: Configuration types and fail-fast validation
//! - [`octree`]: Arena-based multiscale spatial index
//! - [`graph`]: Neighbor graph, normals, pluggable nearest-neighbor search
//! - [`shapes`]: Shape models and per-kind operation bundles
//! - [`matching`]: RANSAC core loop and local refiner
//! - [`postprocess`]: Merge and false-shape arbitration
//! - [`detector`]: Top-level pipeline
//!
//! ## Data Flow
//!
//! ```text
//!      ┌─────────────┐
//!      │ Point cloud │
//!      └──────┬──────┘
//!             │
//!      ┌──────┴──────────┐
//!      ▼                 ▼
//! ┌──────────┐    ┌────────────┐
//! │  Octree  │    │  Neighbor  │
//! │ (scales) │    │   graph    │
//! └────┬─────┘    └─────┬──────┘
//!      │                │
//!      └───────┬────────┘
//!              ▼
//!     ┌────────────────┐   sample → generate → match
//!     │ RobustMatcher  │   → score → accept/discard,
//!     │ (RANSAC loop)  │   budget self-extends per accept
//!     └───────┬────────┘
//!             ▼
//!     ┌────────────────┐
//!     │  LocalRefiner  │   re-fit ⇄ re-match to convergence
//!     └───────┬────────┘
//!             ▼
//!     ┌────────────────┐
//!     │    Merger      │   overlap gate + explained-fraction
//!     │ FalseShapeFilter│  arbitration, residual majority vote
//!     └───────┬────────┘
//!             ▼
//!   shapes + unmatched points
//! ```
//!
//! ## Guarantees and non-goals
//!
//! Single-threaded, CPU-bound, deterministic under a fixed seed. The
//! decomposition is a randomized heuristic, not a global optimum;
//! normal signs are not made globally consistent (every consumer treats
//! ±normal symmetrically); operation is batch, not streaming.

pub mod config;
pub mod core;
pub mod detector;
pub mod graph;
pub mod matching;
pub mod octree;
pub mod postprocess;
pub mod shapes;

// Re-export main types at crate root
pub use config::{ConfigError, DetectorConfig, ShapeTolerances, SplitPolicy};
pub use detector::{DetectError, DetectionResult, DetectionStats, PrimitiveDetector};
pub use graph::{BruteForceSearch, KdTreeSearch, NearestNeighbor, Neighbor, SearchError};
pub use shapes::{FoundShape, ShapeKind, ShapeModel};
