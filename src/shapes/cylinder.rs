//! Infinite cylinder model.

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::config::ShapeTolerances;
use crate::core::math::{fit_circle_2d, smallest_eigenvector};
use crate::core::Point3D;

/// Cylinder by an axis point, unit axis direction and radius.
///
/// `point` is the axis point closest to the origin (`point · axis = 0`),
/// which makes the parameterization unique up to the axis sign.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cylinder {
    /// Point on the axis closest to the origin.
    pub point: Point3D,
    /// Unit axis direction (sign arbitrary).
    pub axis: Point3D,
    /// Radius in meters.
    pub radius: f64,
}

impl Cylinder {
    /// Radial distance from a point to the cylinder surface.
    #[inline]
    pub fn distance_to_point(&self, p: Point3D) -> f64 {
        (self.axis_distance(p) - self.radius).abs()
    }

    /// Distance from a point to the cylinder axis.
    #[inline]
    pub fn axis_distance(&self, p: Point3D) -> f64 {
        let d = p - self.point;
        (d - self.axis * d.dot(self.axis)).norm()
    }

    /// Model-implied surface normal at a point (radial direction).
    ///
    /// Zero for a point on the axis.
    #[inline]
    pub fn implied_normal(&self, p: Point3D) -> Point3D {
        let d = p - self.point;
        (d - self.axis * d.dot(self.axis)).normalized()
    }

    /// Re-anchor an axis point to the canonical closest-to-origin form.
    fn canonical_point(point: Point3D, axis: Point3D) -> Point3D {
        point - axis * point.dot(axis)
    }
}

/// Orthonormal basis (u, v) of the plane perpendicular to a unit axis.
fn axis_basis(axis: Point3D) -> (Point3D, Point3D) {
    let pick = if axis.x.abs() < 0.9 {
        Point3D::new(1.0, 0.0, 0.0)
    } else {
        Point3D::new(0.0, 1.0, 0.0)
    };
    let u = axis.cross(pick).normalized();
    let v = axis.cross(u);
    (u, v)
}

/// Generate a cylinder candidate from a minimal sample.
///
/// The axis direction is the cross product of the first two sample
/// normals; both points are projected into the axis-orthogonal plane
/// where their (projected) normal lines intersect at the axis. The third
/// point cross-checks the radius. Rejected when the normals are
/// near-parallel, the projected lines do not intersect cleanly, the
/// per-point radii disagree, or any sample normal deviates from the
/// radial direction beyond the angle tolerance.
pub fn generate(
    points: &[Point3D; 3],
    normals: &[Point3D; 3],
    tolerances: &ShapeTolerances,
) -> Option<Cylinder> {
    if normals[0].is_zero() || normals[1].is_zero() {
        return None;
    }

    let cross = normals[0].cross(normals[1]);
    if cross.norm() < 1e-6 {
        return None;
    }
    let axis = cross.normalized();
    let (u, v) = axis_basis(axis);

    // Project the two seed points and their normals into the
    // axis-orthogonal plane.
    let q0 = (points[0].dot(u), points[0].dot(v));
    let q1 = (points[1].dot(u), points[1].dot(v));
    let m0 = normalize_2d((normals[0].dot(u), normals[0].dot(v)))?;
    let m1 = normalize_2d((normals[1].dot(u), normals[1].dot(v)))?;

    // Intersect q0 + t·m0 with q1 + s·m1.
    let denom = m0.0 * m1.1 - m0.1 * m1.0;
    if denom.abs() < 1e-9 {
        return None;
    }
    let t = ((q1.0 - q0.0) * m1.1 - (q1.1 - q0.1) * m1.0) / denom;
    let center2 = (q0.0 + t * m0.0, q0.1 + t * m0.1);

    let r0 = dist_2d(q0, center2);
    let r1 = dist_2d(q1, center2);
    if (r0 - r1).abs() > tolerances.distance_tolerance {
        return None;
    }
    let radius = (r0 + r1) * 0.5;
    if radius <= 0.0 {
        return None;
    }

    let point = Cylinder::canonical_point(u * center2.0 + v * center2.1, axis);
    let candidate = Cylinder {
        point,
        axis,
        radius,
    };

    // Third point cross-checks the radius.
    if (candidate.axis_distance(points[2]) - radius).abs() > tolerances.distance_tolerance {
        return None;
    }

    let min_dot = tolerances.angle_tolerance.cos();
    for (p, n) in points.iter().zip(normals.iter()) {
        if n.is_zero() {
            continue;
        }
        let implied = candidate.implied_normal(*p);
        if implied.is_zero() || n.dot(implied).abs() < min_dot {
            return None;
        }
    }

    Some(candidate)
}

#[inline]
fn normalize_2d(v: (f64, f64)) -> Option<(f64, f64)> {
    let n = (v.0 * v.0 + v.1 * v.1).sqrt();
    if n < 1e-9 {
        return None;
    }
    Some((v.0 / n, v.1 / n))
}

#[inline]
fn dist_2d(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}

/// Least-squares cylinder fit.
///
/// The axis is the least-represented direction of the inlier normals
/// (their scatter about the origin is sign-invariant, so arbitrary
/// normal signs cannot bias it); the radius and axis position come from
/// an algebraic circle fit of the points projected along the axis.
/// Falls back to the initial axis when too few usable normals exist.
pub fn fit(points: &[Point3D], normals: &[Point3D], initial: &Cylinder) -> Option<Cylinder> {
    if points.len() < 3 {
        return None;
    }

    let mut scatter = Matrix3::zeros();
    let mut usable = 0usize;
    for n in normals {
        if n.is_zero() {
            continue;
        }
        let v = nalgebra::Vector3::new(n.x, n.y, n.z);
        scatter += v * v.transpose();
        usable += 1;
    }

    let axis = if usable >= 3 {
        let a = smallest_eigenvector(&scatter);
        if a.is_zero() { initial.axis } else { a }
    } else {
        initial.axis
    };

    let (u, v) = axis_basis(axis);
    let samples: Vec<(f64, f64)> = points.iter().map(|p| (p.dot(u), p.dot(v))).collect();
    let (cu, cv, radius) = fit_circle_2d(&samples)?;

    Some(Cylinder {
        point: Cylinder::canonical_point(u * cu + v * cv, axis),
        axis,
        radius,
    })
}
