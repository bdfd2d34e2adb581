//! Robust matching: the RANSAC core loop, the graph-expansion match-set
//! search it is built on, and the local refiner shared with
//! post-processing.

mod expansion;
pub mod matcher;
pub mod refiner;

pub use matcher::{MatcherStats, RobustMatcher};
pub use refiner::{refine, RefineResult};
