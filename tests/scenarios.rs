//! End-to-end detection scenarios.
//!
//! Clouds are constructed exactly on their surfaces (zero noise) with
//! deterministic layouts, so the assertions can be exact about shape
//! counts, memberships and recovered parameters.

use approx::assert_relative_eq;

use rupa_detect::config::{GraphConfig, MergeConfig, ShapeTolerances, SplitPolicy};
use rupa_detect::core::Point3D;
use rupa_detect::graph::{build_graph, BruteForceSearch};
use rupa_detect::postprocess::merge_shapes;
use rupa_detect::shapes::{FoundShape, ShapeModel, Sphere};
use rupa_detect::{DetectorConfig, PrimitiveDetector, ShapeKind};

/// Quasi-uniform sphere sampling (Fibonacci lattice).
fn sphere_cloud(center: Point3D, radius: f64, n: usize) -> Vec<Point3D> {
    let golden = std::f64::consts::PI * (3.0 - 5.0_f64.sqrt());
    (0..n)
        .map(|i| {
            let z = 1.0 - 2.0 * (i as f64 + 0.5) / n as f64;
            let ring = (1.0 - z * z).sqrt();
            let theta = golden * i as f64;
            center + Point3D::new(ring * theta.cos(), ring * theta.sin(), z) * radius
        })
        .collect()
}

/// Regular grid on the plane z = `z`, anchored at `(x0, y0)`.
fn plane_cloud(x0: f64, y0: f64, z: f64, n: usize, spacing: f64) -> Vec<Point3D> {
    let mut cloud = Vec::new();
    for i in 0..n {
        for j in 0..n {
            cloud.push(Point3D::new(
                x0 + i as f64 * spacing,
                y0 + j as f64 * spacing,
                z,
            ));
        }
    }
    cloud
}

/// Shared scenario configuration: tolerances tight enough that curvature
/// rejects plane candidates on spheres, and sphere tolerances loose
/// enough that estimated (not exact) normals pass their gates.
fn scenario_config(seed: u64) -> DetectorConfig {
    let mut config = DetectorConfig::new();
    config.graph = GraphConfig::new().with_k(10).with_max_neighbor_distance(1.6);
    config.octree.split_policy = SplitPolicy::EqualCount { max_points: 32 };
    config.matcher.min_model_accept = 30;
    config.matcher.base_iterations = 3000;
    config.matcher.budget_extension = 500;
    config.matcher.max_total_iterations = 50_000;
    config.matcher.seed = seed;
    config.shapes.plane = ShapeTolerances::new()
        .with_angle_tolerance(0.08)
        .with_distance_tolerance(0.05)
        .with_fit_threshold(0.005);
    config.shapes.sphere = ShapeTolerances::new()
        .with_angle_tolerance(0.15)
        .with_distance_tolerance(0.1)
        .with_fit_threshold(0.01);
    config.shapes.cylinder = ShapeTolerances::new()
        .with_angle_tolerance(0.15)
        .with_distance_tolerance(0.1)
        .with_fit_threshold(0.01);
    config
}

#[test]
fn scenario_single_exact_sphere() {
    // 400 points exactly on a sphere centered (1,2,3) with radius 4:
    // exactly one Sphere covering every point, parameters recovered to
    // 1e-8.
    let center = Point3D::new(1.0, 2.0, 3.0);
    let cloud = sphere_cloud(center, 4.0, 400);

    let mut detector = PrimitiveDetector::new(scenario_config(7)).unwrap();
    let result = detector.detect(&cloud).unwrap();

    assert_eq!(result.shapes.len(), 1, "exactly one shape");
    let shape = &result.shapes[0];
    assert_eq!(shape.kind, ShapeKind::Sphere);
    assert_eq!(shape.len(), 400, "every point is a member");
    assert!(result.unmatched.is_empty());

    let ShapeModel::Sphere(sphere) = shape.model else {
        panic!("expected sphere parameters");
    };
    assert_relative_eq!(sphere.center.x, 1.0, epsilon = 1e-8);
    assert_relative_eq!(sphere.center.y, 2.0, epsilon = 1e-8);
    assert_relative_eq!(sphere.center.z, 3.0, epsilon = 1e-8);
    assert_relative_eq!(sphere.radius, 4.0, epsilon = 1e-8);
}

#[test]
fn scenario_disjoint_sphere_and_plane() {
    // A 400-point sphere and a spatially disjoint 400-point plane:
    // exactly two shapes, correctly typed, each with exactly its own
    // points and zero cross-membership.
    let mut cloud = sphere_cloud(Point3D::new(1.0, 2.0, 3.0), 4.0, 400);
    cloud.extend(plane_cloud(30.0, 0.0, -10.0, 20, 0.25));
    assert_eq!(cloud.len(), 800);

    let mut detector = PrimitiveDetector::new(scenario_config(13)).unwrap();
    let result = detector.detect(&cloud).unwrap();

    assert_eq!(result.shapes.len(), 2, "exactly two shapes");
    assert!(result.unmatched.is_empty());

    let sphere_shape = result
        .shapes
        .iter()
        .find(|s| s.kind == ShapeKind::Sphere)
        .expect("a sphere must be detected");
    let plane_shape = result
        .shapes
        .iter()
        .find(|s| s.kind == ShapeKind::Plane)
        .expect("a plane must be detected");

    assert_eq!(sphere_shape.len(), 400);
    assert_eq!(plane_shape.len(), 400);
    assert!(
        sphere_shape.points.iter().all(|&i| i < 400),
        "sphere members are sphere points only"
    );
    assert!(
        plane_shape.points.iter().all(|&i| i >= 400),
        "plane members are plane points only"
    );
}

#[test]
fn scenario_sliced_sphere_merges_to_one() {
    // N = 5 detections of the same 300-point sphere, each covering a
    // different slice with slight boundary overlap: after the merger,
    // one shape containing all 300 points exactly once.
    let cloud = sphere_cloud(Point3D::ZERO, 2.0, 300);
    let config = scenario_config(0);

    let mut provider = BruteForceSearch::new();
    let mut graph = build_graph(&cloud, &mut provider, &config.graph).unwrap();

    // The Fibonacci lattice is ordered by z, so index ranges are
    // z-bands; stride 56 with width 76 gives 20 shared points per
    // consecutive pair.
    let model = ShapeModel::Sphere(Sphere {
        center: Point3D::ZERO,
        radius: 2.0,
    });
    let slices: Vec<FoundShape> = (0..5)
        .map(|i| {
            let start = i * 56;
            let end = (start + 76).min(300);
            FoundShape::new(model, (start as u32..end as u32).collect())
        })
        .collect();
    assert!(slices.iter().all(|s| s.len() == 76));

    let merge_config = MergeConfig::new()
        .with_minimum_overlap(0.05)
        .with_fraction_merge(0.8);
    let (merged, stats) = merge_shapes(
        &cloud,
        &mut graph,
        slices,
        &config.shapes,
        &merge_config,
        &config.refiner,
    );

    assert_eq!(merged.len(), 1, "all slices collapse into one shape");
    assert_eq!(stats.merged, 4);
    assert_eq!(merged[0].len(), 300, "every point exactly once");
    let unique: std::collections::HashSet<u32> = merged[0].points.iter().copied().collect();
    assert_eq!(unique.len(), 300);

    let ShapeModel::Sphere(sphere) = merged[0].model else {
        panic!("expected sphere parameters");
    };
    assert_relative_eq!(sphere.radius, 2.0, epsilon = 1e-9);
    assert_relative_eq!(sphere.center.x, 0.0, epsilon = 1e-9);
}

#[test]
fn scenario_graph_disconnected_patches_stay_separate() {
    // Two coplanar patches with no graph edges between them are
    // detected as two shapes; neither post-processing pass may fuse
    // them (zero shared points, tie residuals).
    let mut cloud = plane_cloud(0.0, 0.0, 1.0, 12, 0.25);
    cloud.extend(plane_cloud(100.0, 0.0, 1.0, 12, 0.25));

    let mut config = scenario_config(21);
    config.matcher.shape_kinds = vec![ShapeKind::Plane];
    let mut detector = PrimitiveDetector::new(config).unwrap();
    let result = detector.detect(&cloud).unwrap();

    assert_eq!(result.shapes.len(), 2, "patches must not fuse across the gap");
    assert_eq!(result.shapes[0].len(), 144);
    assert_eq!(result.shapes[1].len(), 144);
    assert!(result.unmatched.is_empty());

    let first: std::collections::HashSet<u32> =
        result.shapes[0].points.iter().copied().collect();
    assert!(result.shapes[1].points.iter().all(|i| !first.contains(i)));
}

#[test]
fn scenario_cylinder_detection() {
    // Points exactly on a cylinder along +z: one Cylinder shape with
    // the radius recovered closely (normals are estimated from the
    // local patches, so the axis carries a tiny estimation error).
    let radius = 1.0;
    let mut cloud = Vec::new();
    for k in 0..12 {
        for a in 0..30 {
            let angle = a as f64 * std::f64::consts::TAU / 30.0;
            cloud.push(Point3D::new(
                2.0 + radius * angle.cos(),
                -1.0 + radius * angle.sin(),
                k as f64 * 0.33,
            ));
        }
    }

    let mut config = scenario_config(5);
    config.graph = GraphConfig::new().with_k(10).with_max_neighbor_distance(0.8);
    // A single 30-point ring of this cylinder lies exactly on a sphere
    // too; the acceptance count is set above the ring size so such
    // degenerate candidates can never be accepted.
    config.matcher.min_model_accept = 45;
    let mut detector = PrimitiveDetector::new(config).unwrap();
    let result = detector.detect(&cloud).unwrap();

    assert_eq!(result.shapes.len(), 1);
    let shape = &result.shapes[0];
    assert_eq!(shape.kind, ShapeKind::Cylinder);
    assert_eq!(shape.len(), cloud.len());

    let ShapeModel::Cylinder(cylinder) = shape.model else {
        panic!("expected cylinder parameters");
    };
    assert_relative_eq!(cylinder.radius, radius, epsilon = 1e-3);
    assert!(cylinder.axis.z.abs() > 0.9999, "axis along z");
}

#[test]
fn scenario_determinism() {
    // Identical cloud, seed and configuration: bit-identical shape
    // lists across repeated runs of one detector (pool recycled in
    // between) and across a freshly built detector.
    let mut cloud = sphere_cloud(Point3D::new(1.0, 2.0, 3.0), 4.0, 400);
    cloud.extend(plane_cloud(30.0, 0.0, -10.0, 20, 0.25));

    let mut detector = PrimitiveDetector::new(scenario_config(99)).unwrap();
    let first = detector.detect(&cloud).unwrap();
    let second = detector.detect(&cloud).unwrap();
    assert_eq!(first.shapes, second.shapes);
    assert_eq!(first.unmatched, second.unmatched);

    let mut fresh = PrimitiveDetector::new(scenario_config(99)).unwrap();
    let third = fresh.detect(&cloud).unwrap();
    assert_eq!(first.shapes, third.shapes);
}

#[test]
fn scenario_zero_shapes_is_success() {
    // A cloud too sparse for any neighbor edges produces zero shapes
    // and a full unmatched list, not an error.
    let cloud: Vec<Point3D> = (0..50)
        .map(|i| Point3D::new((i % 7) as f64 * 40.0, (i % 5) as f64 * 55.0, i as f64 * 9.0))
        .collect();

    let mut detector = PrimitiveDetector::new(scenario_config(1)).unwrap();
    let result = detector.detect(&cloud).unwrap();

    assert!(result.shapes.is_empty());
    assert_eq!(result.unmatched.len(), cloud.len());
    assert_eq!(result.stats.matcher.accepted, 0);
}
