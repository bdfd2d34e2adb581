//! Sphere model.

use nalgebra::{Matrix4, Vector4};
use serde::{Deserialize, Serialize};

use crate::config::ShapeTolerances;
use crate::core::Point3D;

/// Sphere by center and radius.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    /// Center.
    pub center: Point3D,
    /// Radius in meters.
    pub radius: f64,
}

impl Sphere {
    /// Radial distance from a point to the sphere surface.
    #[inline]
    pub fn distance_to_point(&self, p: Point3D) -> f64 {
        (p.distance(self.center) - self.radius).abs()
    }

    /// Model-implied surface normal at a point (radial direction).
    ///
    /// Zero for a point coincident with the center.
    #[inline]
    pub fn implied_normal(&self, p: Point3D) -> Point3D {
        (p - self.center).normalized()
    }
}

/// Closest-approach parameters of two lines `a + t·u` and `b + s·v`
/// (unit directions). Returns `None` when the lines are near-parallel.
fn line_line_closest(
    a: Point3D,
    u: Point3D,
    b: Point3D,
    v: Point3D,
) -> Option<(Point3D, Point3D)> {
    let w = a - b;
    let uv = u.dot(v);
    let denom = 1.0 - uv * uv;
    if denom < 1e-12 {
        return None;
    }
    let du = u.dot(w);
    let dv = v.dot(w);
    let t = (uv * dv - du) / denom;
    let s = (dv - uv * du) / denom;
    Some((a + u * t, b + v * s))
}

/// Generate a sphere candidate from a minimal sample.
///
/// The center is the closest-approach midpoint of the normal lines
/// through the first two sample points; the third point cross-checks the
/// radius. The sample is rejected when the normal lines are parallel or
/// skew beyond the distance tolerance, when the per-point radii
/// disagree, or when any sample normal deviates from the radial
/// direction beyond the angle tolerance.
pub fn generate(
    points: &[Point3D; 3],
    normals: &[Point3D; 3],
    tolerances: &ShapeTolerances,
) -> Option<Sphere> {
    if normals[0].is_zero() || normals[1].is_zero() {
        return None;
    }

    let (c0, c1) = line_line_closest(points[0], normals[0], points[1], normals[1])?;

    // The two normal lines must nearly intersect for a common center to
    // exist at all.
    if c0.distance(c1) > tolerances.distance_tolerance {
        return None;
    }
    let center = (c0 + c1) * 0.5;

    let radii = [
        points[0].distance(center),
        points[1].distance(center),
        points[2].distance(center),
    ];
    let radius = (radii[0] + radii[1] + radii[2]) / 3.0;
    if radius <= 0.0 {
        return None;
    }
    for r in radii {
        if (r - radius).abs() > tolerances.distance_tolerance {
            return None;
        }
    }

    let candidate = Sphere { center, radius };
    let min_dot = tolerances.angle_tolerance.cos();
    for (p, n) in points.iter().zip(normals.iter()) {
        if n.is_zero() {
            continue;
        }
        let implied = candidate.implied_normal(*p);
        if n.dot(implied).abs() < min_dot {
            return None;
        }
    }

    Some(candidate)
}

/// Algebraic (Kåsa) least-squares sphere fit.
///
/// Linear in the unknowns: solves the normal equations of
/// `‖p‖² = 2 p·c + (r² − ‖c‖²)`. Returns `None` for degenerate sets.
pub fn fit(points: &[Point3D]) -> Option<Sphere> {
    if points.len() < 4 {
        // A minimal RANSAC sample has 3 points; the normal-line
        // construction in `generate` covers that case. A least-squares
        // fit needs 4 non-coplanar points to be well-posed, so smaller
        // sets keep their generated parameters.
        return None;
    }

    let mut ata = Matrix4::zeros();
    let mut atb = Vector4::zeros();
    for p in points {
        let row = Vector4::new(2.0 * p.x, 2.0 * p.y, 2.0 * p.z, 1.0);
        let rhs = p.norm_squared();
        ata += row * row.transpose();
        atb += row * rhs;
    }

    let solution = ata.lu().solve(&atb)?;
    let center = Point3D::new(solution[0], solution[1], solution[2]);
    let r_sq = solution[3] + center.norm_squared();
    if !(r_sq.is_finite() && r_sq > 0.0) {
        return None;
    }
    Some(Sphere {
        center,
        radius: r_sq.sqrt(),
    })
}
