//! Cross-shape merge arbitration.
//!
//! Randomized, windowed sampling means one physical surface is often
//! detected as several overlapping shapes. The merger reconciles them in
//! a single quadratic pass: a cheap shared-point overlap test gates a
//! rigorous symmetric explained-fraction test, and the better-explaining
//! side absorbs the other. Parameters are always re-fit on the merged
//! point set through the local refiner.

use log::debug;

use crate::config::{MergeConfig, RefinerConfig, ShapesConfig};
use crate::core::Point3D;
use crate::graph::NeighborGraph;
use crate::matching::refine;
use crate::shapes::{FoundShape, ShapeDescriptor};

/// Counters for one merge pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Shape pairs whose cheap overlap test ran.
    pub pairs_tested: usize,
    /// Pairs that reached the rigorous explained-fraction test.
    pub rigorous_tests: usize,
    /// Absorptions performed.
    pub merged: usize,
}

/// Merge overlapping shapes; returns the surviving list in input order.
///
/// The post-merge re-fit is restricted to the merged union, so merging
/// never increases total membership beyond the sum of the inputs and
/// never introduces duplicate members.
pub fn merge_shapes(
    cloud: &[Point3D],
    graph: &mut NeighborGraph,
    shapes: Vec<FoundShape>,
    shapes_config: &ShapesConfig,
    merge_config: &MergeConfig,
    refiner_config: &RefinerConfig,
) -> (Vec<FoundShape>, MergeStats) {
    let mut stats = MergeStats::default();
    let mut shapes = shapes;
    let n = shapes.len();
    let mut alive = vec![true; n];
    let mut mask = vec![false; cloud.len()];

    for i in 0..n {
        if !alive[i] {
            continue;
        }
        for j in (i + 1)..n {
            if !alive[i] {
                break;
            }
            if !alive[j] {
                continue;
            }
            stats.pairs_tested += 1;

            // Cheap test: shared-point fraction over the larger shape.
            for &p in &shapes[i].points {
                mask[p as usize] = true;
            }
            let shared = shapes[j]
                .points
                .iter()
                .filter(|&&p| mask[p as usize])
                .count();
            for &p in &shapes[i].points {
                mask[p as usize] = false;
            }

            let larger = shapes[i].len().max(shapes[j].len());
            if larger == 0 || (shared as f64) / (larger as f64) <= merge_config.minimum_overlap {
                continue;
            }

            // Rigorous test: how much of each shape the other's model
            // explains, over *all* of its points (not just the shared
            // ones).
            stats.rigorous_tests += 1;
            let i_explains_j = explained_fraction(cloud, graph, shapes_config, &shapes[i], &shapes[j]);
            let j_explains_i = explained_fraction(cloud, graph, shapes_config, &shapes[j], &shapes[i]);
            if i_explains_j <= merge_config.fraction_merge
                && j_explains_i <= merge_config.fraction_merge
            {
                continue;
            }

            // The side explaining more of the other absorbs.
            let (winner, loser) = if i_explains_j >= j_explains_i {
                (i, j)
            } else {
                (j, i)
            };
            debug!(
                "merging {:?}({} pts) into {:?}({} pts)",
                shapes[loser].kind,
                shapes[loser].len(),
                shapes[winner].kind,
                shapes[winner].len()
            );
            absorb(
                cloud,
                graph,
                &mut shapes,
                winner,
                loser,
                &mut mask,
                shapes_config,
                refiner_config,
            );
            alive[loser] = false;
            stats.merged += 1;
        }
    }

    let survivors = shapes
        .into_iter()
        .zip(alive)
        .filter_map(|(shape, keep)| keep.then_some(shape))
        .collect();
    (survivors, stats)
}

/// Fraction of `target`'s points explained by `explainer`'s model under
/// the explainer kind's own distance function and fit threshold.
fn explained_fraction(
    cloud: &[Point3D],
    graph: &NeighborGraph,
    shapes_config: &ShapesConfig,
    explainer: &FoundShape,
    target: &FoundShape,
) -> f64 {
    if target.is_empty() {
        return 0.0;
    }
    let descriptor = ShapeDescriptor::new(explainer.kind, shapes_config.for_kind(explainer.kind));
    let threshold = descriptor.fit_threshold();
    let explained = target
        .points
        .iter()
        .filter(|&&p| {
            descriptor.distance(
                &explainer.model,
                cloud[p as usize],
                graph.normals[p as usize],
            ) < threshold
        })
        .count();
    explained as f64 / target.len() as f64
}

/// Union the loser's points into the winner (deduplicated) and re-fit
/// parameters on the merged set.
fn absorb(
    cloud: &[Point3D],
    graph: &mut NeighborGraph,
    shapes: &mut [FoundShape],
    winner: usize,
    loser: usize,
    mask: &mut [bool],
    shapes_config: &ShapesConfig,
    refiner_config: &RefinerConfig,
) {
    // Deduplicated union, winner's points first.
    let mut union = std::mem::take(&mut shapes[winner].points);
    for &p in &union {
        mask[p as usize] = true;
    }
    for &p in &shapes[loser].points {
        if !mask[p as usize] {
            mask[p as usize] = true;
            union.push(p);
        }
    }
    for &p in &union {
        mask[p as usize] = false;
    }

    // Always re-fit on the merged set; the restricted re-match can drop
    // stragglers the merged model no longer explains, but never recruit
    // beyond the union.
    let descriptor = ShapeDescriptor::new(
        shapes[winner].kind,
        shapes_config.for_kind(shapes[winner].kind),
    );
    let result = refine(
        cloud,
        graph,
        &descriptor,
        &union,
        shapes[winner].model,
        true,
        true,
        refiner_config,
    );

    let (points, model) = if result.points.is_empty() {
        // Degenerate refit: keep the plain union and the winner's params.
        (union, shapes[winner].model)
    } else {
        (result.points, result.model)
    };

    shapes[winner].model = model;
    shapes[winner].points = points;
    shapes[loser].points = Vec::new();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::graph::{build_graph, BruteForceSearch};
    use crate::shapes::{Plane, ShapeModel};

    fn flat_cloud(n: usize, spacing: f64) -> Vec<Point3D> {
        let mut cloud = Vec::new();
        for i in 0..n {
            for j in 0..n {
                cloud.push(Point3D::new(i as f64 * spacing, j as f64 * spacing, 0.0));
            }
        }
        cloud
    }

    fn graph_for(cloud: &[Point3D]) -> NeighborGraph {
        let mut provider = BruteForceSearch::new();
        let config = GraphConfig::new().with_k(8).with_max_neighbor_distance(0.3);
        build_graph(cloud, &mut provider, &config).unwrap()
    }

    fn plane_shape(points: Vec<u32>) -> FoundShape {
        FoundShape::new(
            ShapeModel::Plane(Plane {
                normal: Point3D::new(0.0, 0.0, 1.0),
                offset: 0.0,
            }),
            points,
        )
    }

    #[test]
    fn test_overlapping_detections_merge_to_one() {
        let cloud = flat_cloud(10, 0.1);
        let mut graph = graph_for(&cloud);

        // Two overlapping halves of the same plane.
        let a: Vec<u32> = (0..60).collect();
        let b: Vec<u32> = (40..100).collect();
        let shapes = vec![plane_shape(a), plane_shape(b)];

        let (merged, stats) = merge_shapes(
            &cloud,
            &mut graph,
            shapes,
            &ShapesConfig::default(),
            &MergeConfig::default(),
            &RefinerConfig::default(),
        );

        assert_eq!(merged.len(), 1);
        assert_eq!(stats.merged, 1);
        assert_eq!(merged[0].len(), 100);

        // No duplicates in the merged member list.
        let unique: std::collections::HashSet<u32> = merged[0].points.iter().copied().collect();
        assert_eq!(unique.len(), merged[0].len());
    }

    #[test]
    fn test_disjoint_shapes_not_merged() {
        let cloud = flat_cloud(10, 0.1);
        let mut graph = graph_for(&cloud);

        // Same infinite plane, zero shared points: the cheap overlap
        // test must gate the merge off.
        let a: Vec<u32> = (0..50).collect();
        let b: Vec<u32> = (50..100).collect();
        let shapes = vec![plane_shape(a), plane_shape(b)];

        let (merged, stats) = merge_shapes(
            &cloud,
            &mut graph,
            shapes,
            &ShapesConfig::default(),
            &MergeConfig::default(),
            &RefinerConfig::default(),
        );

        assert_eq!(merged.len(), 2);
        assert_eq!(stats.merged, 0);
        assert_eq!(stats.rigorous_tests, 0);
    }

    #[test]
    fn test_merge_membership_not_inflated() {
        // Merging never increases total membership beyond the sum of
        // the inputs, even though the whole cloud is coplanar and an
        // unrestricted re-match could recruit it all.
        let cloud = flat_cloud(10, 0.1);
        let mut graph = graph_for(&cloud);

        let a: Vec<u32> = (0..30).collect();
        let b: Vec<u32> = (20..50).collect();
        let total: usize = a.len() + b.len();
        let shapes = vec![plane_shape(a), plane_shape(b)];

        let (merged, _) = merge_shapes(
            &cloud,
            &mut graph,
            shapes,
            &ShapesConfig::default(),
            &MergeConfig::default(),
            &RefinerConfig::default(),
        );

        assert_eq!(merged.len(), 1);
        // Merge never increases total membership beyond the input sum.
        assert!(merged[0].len() <= total);
        let unique: std::collections::HashSet<u32> = merged[0].points.iter().copied().collect();
        assert_eq!(unique.len(), merged[0].len());
    }
}
