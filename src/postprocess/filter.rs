//! False-shape arbitration.
//!
//! RANSAC randomness occasionally accepts a shape whose points really
//! belong to a better model found later. The filter compares, for every
//! member point of every shape, the residual under its own model against
//! the best residual under every other candidate's model; a shape that
//! loses a strict majority of its own points is judged spurious and
//! dropped entirely.
//!
//! A single pass: comparisons run against the full candidate list,
//! including shapes that are themselves dropped in the same pass.

use log::debug;

use crate::config::{FilterConfig, ShapesConfig};
use crate::core::Point3D;
use crate::graph::NeighborGraph;
use crate::shapes::{FoundShape, ShapeDescriptor};

/// Counters for one filter pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Shapes examined.
    pub examined: usize,
    /// Shapes dropped as spurious.
    pub dropped: usize,
}

/// Drop shapes whose points are mostly better explained elsewhere.
///
/// Members of a dropped shape simply stop being claimed; the caller's
/// final accounting reports them as unmatched unless another surviving
/// shape covers them.
pub fn filter_false_shapes(
    cloud: &[Point3D],
    graph: &NeighborGraph,
    shapes: Vec<FoundShape>,
    shapes_config: &ShapesConfig,
    filter_config: &FilterConfig,
) -> (Vec<FoundShape>, FilterStats) {
    let mut stats = FilterStats {
        examined: shapes.len(),
        ..FilterStats::default()
    };
    if shapes.len() < 2 {
        return (shapes, stats);
    }

    let descriptors: Vec<ShapeDescriptor> = shapes
        .iter()
        .map(|s| ShapeDescriptor::new(s.kind, shapes_config.for_kind(s.kind)))
        .collect();

    let mut drop = vec![false; shapes.len()];
    for (i, shape) in shapes.iter().enumerate() {
        if shape.is_empty() {
            continue;
        }
        let own_descriptor = &descriptors[i];

        let mut better_elsewhere = 0usize;
        for &p in &shape.points {
            let point = cloud[p as usize];
            let normal = graph.normals[p as usize];
            let own = own_descriptor.distance(&shape.model, point, normal);

            let mut best_other = f64::INFINITY;
            for (j, other) in shapes.iter().enumerate() {
                if j == i {
                    continue;
                }
                let d = descriptors[j].distance(&other.model, point, normal);
                if d < best_other {
                    best_other = d;
                }
            }

            if best_other < own {
                better_elsewhere += 1;
            }
        }

        if (better_elsewhere as f64) > filter_config.discard_ratio * shape.len() as f64 {
            debug!(
                "dropping spurious {:?} ({} of {} points better explained elsewhere)",
                shape.kind,
                better_elsewhere,
                shape.len()
            );
            drop[i] = true;
            stats.dropped += 1;
        }
    }

    let survivors = shapes
        .into_iter()
        .zip(drop)
        .filter_map(|(shape, dropped)| (!dropped).then_some(shape))
        .collect();
    (survivors, stats)
}
