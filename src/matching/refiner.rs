//! Local shape refinement.
//!
//! Alternates least-squares re-fitting with a graph-expansion re-match
//! until the encoded parameters stop moving. Used standalone as a
//! quality pass over freshly accepted shapes (where the re-match may
//! recruit any consistent point, deliberately letting memberships of
//! same-surface detections overlap for the merger to arbitrate), and by
//! the merger to re-derive the parameters of a merged point set (where
//! the re-match is restricted to the merged union, so merging never
//! inflates membership).
//!
//! Non-convergence is not an error: the result at the iteration cap is
//! returned as-is.

use crate::config::RefinerConfig;
use crate::core::Point3D;
use crate::graph::NeighborGraph;
use crate::shapes::{ShapeDescriptor, ShapeModel};

use super::expansion::{expand_match_set, Admit};

/// Result of a refinement run.
#[derive(Clone, Debug)]
pub struct RefineResult {
    /// Final matched point set (last re-match of the final model).
    pub points: Vec<u32>,
    /// Refined model parameters.
    pub model: ShapeModel,
    /// Iterations consumed.
    pub iterations: usize,
    /// Whether the parameter delta fell below the convergence threshold
    /// (false when the iteration cap cut the loop short).
    pub converged: bool,
}

/// Iteratively re-fit and re-match a shape.
///
/// `fit_first = false` skips the fit on the very first pass, for callers
/// that already trust `initial_model` (the matcher just fitted it).
///
/// `restrict_to_initial = true` confines the re-match to the initial
/// point set (membership can shrink but never grow); `false` lets the
/// re-match recruit every consistent, graph-reachable point.
pub fn refine(
    cloud: &[Point3D],
    graph: &mut NeighborGraph,
    descriptor: &ShapeDescriptor,
    initial_points: &[u32],
    initial_model: ShapeModel,
    fit_first: bool,
    restrict_to_initial: bool,
    config: &RefinerConfig,
) -> RefineResult {
    let mut points: Vec<u32> = initial_points.to_vec();
    let mut model = initial_model;

    let mut initial_mask = Vec::new();
    if restrict_to_initial {
        initial_mask = vec![false; graph.len()];
        for &i in initial_points {
            initial_mask[i as usize] = true;
        }
    }

    let mut previous = Vec::new();
    let mut current = Vec::new();
    model.encode(&mut previous);

    let mut fit_points: Vec<Point3D> = Vec::with_capacity(points.len());
    let mut fit_normals: Vec<Point3D> = Vec::with_capacity(points.len());
    let mut stack = Vec::new();
    let mut matched = Vec::new();

    let mut iterations = 0;
    let mut converged = false;

    while iterations < config.max_iterations {
        iterations += 1;

        // (1) Re-fit to the current point set (skippable on pass one).
        if fit_first || iterations > 1 {
            fit_points.clear();
            fit_normals.clear();
            for &i in &points {
                fit_points.push(cloud[i as usize]);
                fit_normals.push(graph.normals[i as usize]);
            }
            if let Some(refit) = descriptor.fit(&fit_points, &fit_normals, &model) {
                model = refit;
            }
        }

        // (2) Re-match the refit model from the current set.
        let admit = if restrict_to_initial {
            Admit::Restricted(&initial_mask)
        } else {
            Admit::All
        };
        expand_match_set(
            cloud,
            graph,
            descriptor,
            &model,
            &points,
            admit,
            &mut stack,
            &mut matched,
        );
        if matched.is_empty() {
            // The refit model lost its own support; keep the previous
            // point set and stop.
            break;
        }
        std::mem::swap(&mut points, &mut matched);

        // (3) Converged when the mean absolute per-parameter change
        // drops below the threshold.
        model.encode(&mut current);
        let delta = mean_abs_delta(&previous, &current);
        if delta <= config.convergence_threshold {
            converged = true;
            break;
        }
        std::mem::swap(&mut previous, &mut current);
    }

    RefineResult {
        points,
        model,
        iterations,
        converged,
    }
}

#[inline]
fn mean_abs_delta(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    if a.is_empty() {
        return 0.0;
    }
    let sum: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum();
    sum / a.len() as f64
}
