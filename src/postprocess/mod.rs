//! Post-processing arbitration over the detected shape list.

pub mod filter;
pub mod merger;

pub use filter::{filter_false_shapes, FilterStats};
pub use merger::{merge_shapes, MergeStats};
