//! Shared estimation math: centroids, covariance, small eigen-solves.
//!
//! Surface normals and plane fits come from total least squares: the
//! normal is the eigenvector of the point scatter matrix with the
//! smallest eigenvalue (perpendicular distances are minimized, which is
//! the right error model for range-sensor data).

use nalgebra::{Matrix3, SymmetricEigen, Vector3};

use super::point::Point3D;

/// Centroid of a point set. Zero for an empty set.
pub fn compute_centroid(points: &[Point3D]) -> Point3D {
    if points.is_empty() {
        return Point3D::ZERO;
    }
    let mut sum = Point3D::ZERO;
    for &p in points {
        sum = sum + p;
    }
    sum * (1.0 / points.len() as f64)
}

/// 3x3 scatter (covariance, unnormalized) matrix of points about a centroid.
pub fn compute_scatter(points: &[Point3D], centroid: Point3D) -> Matrix3<f64> {
    let mut m = Matrix3::zeros();
    for &p in points {
        let d = p - centroid;
        let v = Vector3::new(d.x, d.y, d.z);
        m += v * v.transpose();
    }
    m
}

/// Eigenvector of a symmetric 3x3 matrix with the smallest eigenvalue.
///
/// Returns a unit vector; the sign is arbitrary.
pub fn smallest_eigenvector(m: &Matrix3<f64>) -> Point3D {
    let eigen = SymmetricEigen::new(*m);
    let mut min_idx = 0;
    for i in 1..3 {
        if eigen.eigenvalues[i] < eigen.eigenvalues[min_idx] {
            min_idx = i;
        }
    }
    let v = eigen.eigenvectors.column(min_idx);
    Point3D::new(v[0], v[1], v[2]).normalized()
}

/// Fit a plane normal through a point set by total least squares.
///
/// Returns `None` for fewer than 3 points or a rank-deficient scatter
/// (all points coincident or collinear), where no plane is defined.
pub fn fit_plane_normal(points: &[Point3D]) -> Option<Point3D> {
    if points.len() < 3 {
        return None;
    }
    let centroid = compute_centroid(points);
    let scatter = compute_scatter(points, centroid);

    // Collinear/coincident sets have (near-)zero scatter off the principal
    // axis; detect via the two largest eigenvalues.
    let eigen = SymmetricEigen::new(scatter);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[a]
            .partial_cmp(&eigen.eigenvalues[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mid = eigen.eigenvalues[order[1]];
    let max = eigen.eigenvalues[order[2]];
    if max <= 0.0 || mid / max < 1e-12 {
        return None;
    }

    let v = eigen.eigenvectors.column(order[0]);
    Some(Point3D::new(v[0], v[1], v[2]).normalized())
}

/// Algebraic (Kåsa) circle fit on 2D samples.
///
/// Solves the linear system for center (a, b) and radius r minimizing
/// Σ (x² + y² - 2ax - 2by - c)², with c = r² - a² - b².
///
/// Returns `(center_u, center_v, radius)`, or `None` when the samples are
/// degenerate (collinear or fewer than 3).
pub fn fit_circle_2d(samples: &[(f64, f64)]) -> Option<(f64, f64, f64)> {
    if samples.len() < 3 {
        return None;
    }

    // Normal equations for [2a, 2b, c].
    let mut ata = Matrix3::zeros();
    let mut atb = Vector3::zeros();
    for &(x, y) in samples {
        let row = Vector3::new(x, y, 1.0);
        let rhs = x * x + y * y;
        ata += row * row.transpose();
        atb += row * rhs;
    }

    let solution = ata.lu().solve(&atb)?;
    let a = solution[0] * 0.5;
    let b = solution[1] * 0.5;
    let r_sq = solution[2] + a * a + b * b;
    if !(r_sq.is_finite() && r_sq > 0.0) {
        return None;
    }
    Some((a, b, r_sq.sqrt()))
}
