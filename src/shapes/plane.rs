//! Infinite plane model.

use serde::{Deserialize, Serialize};

use crate::config::ShapeTolerances;
use crate::core::math::{compute_centroid, compute_scatter, smallest_eigenvector};
use crate::core::Point3D;

/// Plane in Hesse normal form: `normal · p = offset`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    /// Unit normal (sign arbitrary).
    pub normal: Point3D,
    /// Signed distance of the plane from the origin along the normal.
    pub offset: f64,
}

impl Plane {
    /// Perpendicular distance from a point to the plane.
    #[inline]
    pub fn distance_to_point(&self, p: Point3D) -> f64 {
        (self.normal.dot(p) - self.offset).abs()
    }

    /// Model-implied surface normal (constant over the plane).
    #[inline]
    pub fn implied_normal(&self, _p: Point3D) -> Point3D {
        self.normal
    }
}

/// Generate a plane candidate from a minimal sample.
///
/// The three points define the plane; the sample is rejected when the
/// points are (near-)collinear or when any sample normal deviates from
/// the plane normal beyond the angle tolerance (both signs accepted).
pub fn generate(
    points: &[Point3D; 3],
    normals: &[Point3D; 3],
    tolerances: &ShapeTolerances,
) -> Option<Plane> {
    let edge_a = points[1] - points[0];
    let edge_b = points[2] - points[0];
    let cross = edge_a.cross(edge_b);

    // Collinear samples span no plane. The threshold is scaled by the
    // edge lengths so it is unit-independent.
    let scale = edge_a.norm() * edge_b.norm();
    if scale <= 0.0 || cross.norm() < 1e-9 * scale {
        return None;
    }

    let normal = cross.normalized();
    let min_dot = tolerances.angle_tolerance.cos();
    for n in normals {
        if !n.is_zero() && n.dot(normal).abs() < min_dot {
            return None;
        }
    }

    let centroid = compute_centroid(points);
    Some(Plane {
        normal,
        offset: normal.dot(centroid),
    })
}

/// Least-squares plane fit (total least squares through the centroid).
///
/// Returns `None` for degenerate sets (fewer than 3 points, collinear).
pub fn fit(points: &[Point3D]) -> Option<Plane> {
    if points.len() < 3 {
        return None;
    }
    let centroid = compute_centroid(points);
    let scatter = compute_scatter(points, centroid);
    let normal = smallest_eigenvector(&scatter);
    if normal.is_zero() {
        return None;
    }
    Some(Plane {
        normal,
        offset: normal.dot(centroid),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn default_tolerances() -> ShapeTolerances {
        ShapeTolerances::default()
    }

    #[test]
    fn test_generate_xy_plane() {
        let points = [
            Point3D::new(0.0, 0.0, 2.0),
            Point3D::new(1.0, 0.0, 2.0),
            Point3D::new(0.0, 1.0, 2.0),
        ];
        let up = Point3D::new(0.0, 0.0, 1.0);
        let normals = [up, up, -up]; // one flipped sign: still valid

        let plane = generate(&points, &normals, &default_tolerances()).unwrap();
        assert_relative_eq!(plane.normal.z.abs(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(plane.offset.abs(), 2.0, epsilon = 1e-12);

        // Sample points are on the generated model.
        for p in &points {
            assert_relative_eq!(plane.distance_to_point(*p), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_generate_rejects_collinear() {
        let points = [
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(1.0, 0.0, 0.0),
            Point3D::new(2.0, 0.0, 0.0),
        ];
        let normals = [Point3D::ZERO; 3];
        assert!(generate(&points, &normals, &default_tolerances()).is_none());
    }

    #[test]
    fn test_generate_rejects_incompatible_normal() {
        let points = [
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(1.0, 0.0, 0.0),
            Point3D::new(0.0, 1.0, 0.0),
        ];
        // Second normal points along x: 90° off the plane normal.
        let normals = [
            Point3D::new(0.0, 0.0, 1.0),
            Point3D::new(1.0, 0.0, 0.0),
            Point3D::new(0.0, 0.0, 1.0),
        ];
        assert!(generate(&points, &normals, &default_tolerances()).is_none());
    }

    #[test]
    fn test_fit_recovers_plane() {
        // Noise-free grid on x + 2y - z = 3, i.e. z = x + 2y - 3.
        let mut points = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                let x = i as f64 * 0.2;
                let y = j as f64 * 0.2;
                points.push(Point3D::new(x, y, x + 2.0 * y - 3.0));
            }
        }
        let plane = fit(&points).unwrap();
        for p in &points {
            assert_relative_eq!(plane.distance_to_point(*p), 0.0, epsilon = 1e-9);
        }
        let expected = Point3D::new(1.0, 2.0, -1.0).normalized();
        assert_relative_eq!(plane.normal.dot(expected).abs(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fit_degenerate() {
        assert!(fit(&[Point3D::ZERO, Point3D::new(1.0, 0.0, 0.0)]).is_none());
    }
}
