//! Graph-expansion match-set search.
//!
//! The key deviation from classical RANSAC: instead of scanning the
//! whole cloud against the fit threshold, candidate support is collected
//! by flooding outward from the seed points along neighbor-graph edges.
//! The cost of one attempt is bounded by the locally connected inlier
//! region, and a model that happens to fit two physically disjoint
//! patches only ever captures the patch reachable from its seed.

use crate::core::Point3D;
use crate::graph::NeighborGraph;
use crate::shapes::{ShapeDescriptor, ShapeModel};

/// Which points an expansion may recruit (beyond passing the gated
/// distance test).
///
/// The matcher only recruits unclaimed points; the standalone refiner
/// recruits anything consistent (overlapping memberships are resolved by
/// the merge/ownership passes); the merger's post-merge refit is
/// restricted to the merged union so a merge never inflates membership.
#[derive(Clone, Copy)]
pub(crate) enum Admit<'a> {
    /// Only points not flagged `used` in the graph.
    Unused,
    /// Every point.
    All,
    /// Only points marked in the mask.
    Restricted(&'a [bool]),
}

impl Admit<'_> {
    #[inline]
    fn allows(&self, graph: &NeighborGraph, i: u32) -> bool {
        match self {
            Admit::Unused => !graph.used[i as usize],
            Admit::All => true,
            Admit::Restricted(mask) => mask[i as usize],
        }
    }
}

/// Flood the neighbor graph from `seeds`, collecting every reachable
/// point within the descriptor's fit threshold into `out`.
///
/// A fresh search generation is drawn from the graph; every evaluated
/// point is stamped with it (visited-but-excluded points included), so
/// no per-attempt clearing of visit state ever happens.
pub(crate) fn expand_match_set(
    cloud: &[Point3D],
    graph: &mut NeighborGraph,
    descriptor: &ShapeDescriptor,
    model: &ShapeModel,
    seeds: &[u32],
    admit: Admit<'_>,
    stack: &mut Vec<u32>,
    out: &mut Vec<u32>,
) {
    let generation = graph.next_generation();
    let threshold = descriptor.fit_threshold();
    stack.clear();
    out.clear();

    let eligible = |graph: &NeighborGraph, i: u32| -> bool {
        admit.allows(graph, i)
            && descriptor.distance(model, cloud[i as usize], graph.normals[i as usize]) < threshold
    };

    for &seed in seeds {
        if graph.visited[seed as usize] == generation {
            continue;
        }
        graph.visited[seed as usize] = generation;
        if eligible(graph, seed) {
            out.push(seed);
            stack.push(seed);
        }
    }

    while let Some(current) = stack.pop() {
        let start = graph.neighbor_offsets[current as usize] as usize;
        let end = graph.neighbor_offsets[current as usize + 1] as usize;
        for k in start..end {
            let neighbor = graph.neighbor_targets[k];
            if graph.visited[neighbor as usize] == generation {
                continue;
            }
            graph.visited[neighbor as usize] = generation;
            if eligible(graph, neighbor) {
                out.push(neighbor);
                stack.push(neighbor);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GraphConfig, ShapeTolerances};
    use crate::graph::{build_graph, BruteForceSearch};
    use crate::shapes::{Plane, ShapeKind};

    /// Two coplanar 5x5 patches separated by a gap wider than the
    /// neighbor distance: no graph edge crosses the gap.
    fn split_plane_cloud() -> Vec<Point3D> {
        let mut cloud = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                cloud.push(Point3D::new(i as f64 * 0.1, j as f64 * 0.1, 0.0));
            }
        }
        for i in 0..5 {
            for j in 0..5 {
                cloud.push(Point3D::new(10.0 + i as f64 * 0.1, j as f64 * 0.1, 0.0));
            }
        }
        cloud
    }

    fn graph_for(cloud: &[Point3D]) -> NeighborGraph {
        let mut provider = BruteForceSearch::new();
        let config = GraphConfig::new().with_k(6).with_max_neighbor_distance(0.3);
        build_graph(cloud, &mut provider, &config).unwrap()
    }

    fn flat_model() -> (ShapeDescriptor, ShapeModel) {
        (
            ShapeDescriptor::new(ShapeKind::Plane, ShapeTolerances::default()),
            ShapeModel::Plane(Plane {
                normal: Point3D::new(0.0, 0.0, 1.0),
                offset: 0.0,
            }),
        )
    }

    #[test]
    fn test_expansion_stays_within_component() {
        let cloud = split_plane_cloud();
        let mut graph = graph_for(&cloud);
        let (descriptor, model) = flat_model();

        let mut stack = Vec::new();
        let mut out = Vec::new();
        expand_match_set(
            &cloud,
            &mut graph,
            &descriptor,
            &model,
            &[0],
            Admit::All,
            &mut stack,
            &mut out,
        );

        // The model fits all 50 points, but only the 25 reachable from
        // the seed are captured.
        assert_eq!(out.len(), 25);
        assert!(out.iter().all(|&i| (i as usize) < 25));
    }

    #[test]
    fn test_admit_policies() {
        let cloud = split_plane_cloud();
        let mut graph = graph_for(&cloud);
        let (descriptor, model) = flat_model();

        // Claim half of the first patch.
        for i in 0..12 {
            graph.used[i] = true;
        }

        let mut stack = Vec::new();
        let mut unclaimed_only = Vec::new();
        expand_match_set(
            &cloud,
            &mut graph,
            &descriptor,
            &model,
            &[20],
            Admit::Unused,
            &mut stack,
            &mut unclaimed_only,
        );
        assert!(unclaimed_only.iter().all(|&i| !(0..12).contains(&(i as usize))));

        let mut everything = Vec::new();
        expand_match_set(
            &cloud,
            &mut graph,
            &descriptor,
            &model,
            &[20],
            Admit::All,
            &mut stack,
            &mut everything,
        );
        assert_eq!(everything.len(), 25);

        // Restriction wins over consistency: only masked points join.
        let mut mask = vec![false; cloud.len()];
        for i in 0..5 {
            mask[i] = true;
        }
        let mut restricted = Vec::new();
        expand_match_set(
            &cloud,
            &mut graph,
            &descriptor,
            &model,
            &[0],
            Admit::Restricted(&mask),
            &mut stack,
            &mut restricted,
        );
        assert!(restricted.iter().all(|&i| (i as usize) < 5));
    }

    #[test]
    fn test_generations_isolate_attempts() {
        let cloud = split_plane_cloud();
        let mut graph = graph_for(&cloud);
        let (descriptor, model) = flat_model();

        let mut stack = Vec::new();
        let mut first = Vec::new();
        let mut second = Vec::new();
        expand_match_set(&cloud, &mut graph, &descriptor, &model, &[0], Admit::All, &mut stack, &mut first);
        // A second attempt from the same seed sees fresh visit state.
        expand_match_set(&cloud, &mut graph, &descriptor, &model, &[0], Admit::All, &mut stack, &mut second);
        assert_eq!(first.len(), second.len());
    }
}
