//! RANSAC core loop over the octree and neighbor graph.
//!
//! One attempt runs SAMPLE → GENERATE → MATCH → SCORE and either accepts
//! the best candidate or discards the round. The sampling scale is not a
//! parameter: a uniformly random leaf is drawn, then a uniformly random
//! node from its ancestor chain, so candidates get generated and
//! verified at whichever spatial scale the draw lands on.
//!
//! The iteration budget is self-extending: every acceptance is treated
//! as evidence that more shapes remain and buys `budget_extension` more
//! rounds, bounded by the hard `max_total_iterations` ceiling.

use log::debug;

use crate::config::MatcherConfig;
use crate::core::Point3D;
use crate::graph::NeighborGraph;
use crate::octree::Octree;
use crate::shapes::{FoundShape, ShapeDescriptor, ShapeModel, MIN_SAMPLE_SIZE};

use super::expansion::{expand_match_set, Admit};

/// Simple LCG random number generator for deterministic behavior.
///
/// Reproducibility is a requirement, not a nicety: the seed is always an
/// explicit configuration parameter and every seed (including 0) is
/// deterministic.
pub(crate) struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    pub(crate) fn new(seed: u64) -> Self {
        // Mix the seed so small seeds do not start in a low-entropy
        // region of the LCG orbit.
        Self {
            state: seed ^ 0x9E37_79B9_7F4A_7C15,
        }
    }

    fn next(&mut self) -> u64 {
        // LCG parameters from Numerical Recipes
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        self.state
    }

    pub(crate) fn gen_range(&mut self, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        (self.next() % (max as u64)) as usize
    }
}

/// Counters for one matcher run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatcherStats {
    /// Attempts consumed (including wasted ones).
    pub iterations: usize,
    /// Attempts that found fewer than 3 unused points in the sampled node.
    pub insufficient_samples: usize,
    /// Candidate generations that failed a consistency check.
    pub failed_generations: usize,
    /// Candidates whose match set fell below the acceptance count.
    pub rejected_candidates: usize,
    /// Shapes accepted.
    pub accepted: usize,
    /// Final (extended) iteration budget at termination.
    pub final_budget: usize,
}

/// RANSAC matcher over a prepared octree and neighbor graph.
pub struct RobustMatcher<'a> {
    cloud: &'a [Point3D],
    octree: &'a Octree,
    descriptors: &'a [ShapeDescriptor],
    config: &'a MatcherConfig,
    rng: SimpleRng,
    // Reused per-attempt buffers.
    chain: Vec<usize>,
    candidates: Vec<u32>,
    inliers: Vec<u32>,
    best_inliers: Vec<u32>,
    stack: Vec<u32>,
    fit_points: Vec<Point3D>,
    fit_normals: Vec<Point3D>,
}

impl<'a> RobustMatcher<'a> {
    /// Create a matcher; the octree must already hold the cloud.
    pub fn new(
        cloud: &'a [Point3D],
        octree: &'a Octree,
        descriptors: &'a [ShapeDescriptor],
        config: &'a MatcherConfig,
    ) -> Self {
        Self {
            cloud,
            octree,
            descriptors,
            config,
            rng: SimpleRng::new(config.seed),
            chain: Vec::new(),
            candidates: Vec::new(),
            inliers: Vec::new(),
            best_inliers: Vec::new(),
            stack: Vec::new(),
            fit_points: Vec::new(),
            fit_normals: Vec::new(),
        }
    }

    /// Run the loop to budget exhaustion, claiming matched points in the
    /// graph. Returns accepted shapes in acceptance order.
    pub fn run(&mut self, graph: &mut NeighborGraph) -> (Vec<FoundShape>, MatcherStats) {
        let mut shapes = Vec::new();
        let mut stats = MatcherStats::default();
        let leaf_ids = self.octree.leaf_ids();

        let mut budget = self
            .config
            .base_iterations
            .min(self.config.max_total_iterations);

        if leaf_ids.is_empty() || graph.is_empty() {
            stats.final_budget = budget;
            return (shapes, stats);
        }

        while stats.iterations < budget {
            stats.iterations += 1;

            // SAMPLE: random leaf, then random node from its ancestor
            // chain (leaf included).
            let leaf = leaf_ids[self.rng.gen_range(leaf_ids.len())];
            self.octree.ancestor_chain(leaf, &mut self.chain);
            let node = self.chain[self.rng.gen_range(self.chain.len())];

            self.candidates.clear();
            self.candidates.extend(
                self.octree
                    .points_of(node)
                    .iter()
                    .filter(|&&i| !graph.used[i as usize]),
            );
            if self.candidates.len() < MIN_SAMPLE_SIZE {
                // Exhausted region: charge the round and move on rather
                // than spinning on it.
                stats.insufficient_samples += 1;
                continue;
            }

            // GENERATE: minimal sample, one candidate per configured kind.
            let sample = self.draw_sample();
            let sample_points = [
                self.cloud[sample[0] as usize],
                self.cloud[sample[1] as usize],
                self.cloud[sample[2] as usize],
            ];
            let sample_normals = [
                graph.normals[sample[0] as usize],
                graph.normals[sample[1] as usize],
                graph.normals[sample[2] as usize],
            ];

            // MATCH each viable candidate by graph expansion; keep the
            // best-supported one.
            let mut best: Option<(ShapeModel, usize)> = None;
            self.best_inliers.clear();
            for (descriptor_idx, descriptor) in self.descriptors.iter().enumerate() {
                let Some(model) = descriptor.generate(&sample_points, &sample_normals) else {
                    stats.failed_generations += 1;
                    continue;
                };
                expand_match_set(
                    self.cloud,
                    graph,
                    descriptor,
                    &model,
                    &sample,
                    Admit::Unused,
                    &mut self.stack,
                    &mut self.inliers,
                );
                if self.inliers.len() > self.best_inliers.len() {
                    std::mem::swap(&mut self.best_inliers, &mut self.inliers);
                    best = Some((model, descriptor_idx));
                }
            }

            // SCORE.
            let Some((model, descriptor_idx)) = best else {
                continue;
            };
            if self.best_inliers.len() < self.config.min_model_accept {
                stats.rejected_candidates += 1;
                continue;
            }

            // ACCEPT: re-fit on the match set, claim the points, extend
            // the budget.
            let descriptor = &self.descriptors[descriptor_idx];
            self.fit_points.clear();
            self.fit_normals.clear();
            for &i in &self.best_inliers {
                self.fit_points.push(self.cloud[i as usize]);
                self.fit_normals.push(graph.normals[i as usize]);
            }
            let refined = descriptor
                .fit(&self.fit_points, &self.fit_normals, &model)
                .unwrap_or(model);

            for &i in &self.best_inliers {
                graph.used[i as usize] = true;
            }

            budget = (budget + self.config.budget_extension)
                .min(self.config.max_total_iterations);
            stats.accepted += 1;
            debug!(
                "accepted {:?} with {} inliers at iteration {} (budget now {})",
                refined.kind(),
                self.best_inliers.len(),
                stats.iterations,
                budget
            );
            shapes.push(FoundShape::new(refined, std::mem::take(&mut self.best_inliers)));
        }

        stats.final_budget = budget;
        (shapes, stats)
    }

    /// Draw 3 distinct unused points from the current candidate set.
    fn draw_sample(&mut self) -> [u32; 3] {
        let n = self.candidates.len();
        let a = self.rng.gen_range(n);
        let mut b = self.rng.gen_range(n);
        while b == a {
            b = self.rng.gen_range(n);
        }
        let mut c = self.rng.gen_range(n);
        while c == a || c == b {
            c = self.rng.gen_range(n);
        }
        [self.candidates[a], self.candidates[b], self.candidates[c]]
    }
}
