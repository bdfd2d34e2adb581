//! Primitive shape models and their per-kind operation bundle.
//!
//! Shape polymorphism is a tagged union ([`ShapeModel`]) dispatched with
//! `match`: adding a kind means adding an enum variant and its arms, not
//! a class hierarchy. [`ShapeDescriptor`] packages the five operations
//! (generate, distance, fit, encode, accept) with the kind's tolerances.
//!
//! Normal-sign invariance is a hard rule here: measured normals have
//! arbitrary sign, so every comparison against a model-implied normal
//! goes through `|dot|`, and codecs canonicalize sign before encoding.

pub mod cylinder;
pub mod plane;
pub mod sphere;

pub use cylinder::Cylinder;
pub use plane::Plane;
pub use sphere::Sphere;

use serde::{Deserialize, Serialize};

use crate::config::ShapeTolerances;
use crate::core::Point3D;

/// Points in a minimal RANSAC sample; identical for all shape kinds, and
/// the matcher relies on that when drawing from an octree node.
pub const MIN_SAMPLE_SIZE: usize = 3;

/// Shape kind tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    Plane,
    Sphere,
    Cylinder,
}

/// Shape model parameters (tagged union).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ShapeModel {
    Plane(Plane),
    Sphere(Sphere),
    Cylinder(Cylinder),
}

impl ShapeModel {
    /// Kind tag of this model.
    #[inline]
    pub fn kind(&self) -> ShapeKind {
        match self {
            ShapeModel::Plane(_) => ShapeKind::Plane,
            ShapeModel::Sphere(_) => ShapeKind::Sphere,
            ShapeModel::Cylinder(_) => ShapeKind::Cylinder,
        }
    }

    /// Positional residual of a point (no normal gating).
    #[inline]
    pub fn distance_to_point(&self, p: Point3D) -> f64 {
        match self {
            ShapeModel::Plane(m) => m.distance_to_point(p),
            ShapeModel::Sphere(m) => m.distance_to_point(p),
            ShapeModel::Cylinder(m) => m.distance_to_point(p),
        }
    }

    /// Model-implied surface normal at a point.
    #[inline]
    pub fn implied_normal(&self, p: Point3D) -> Point3D {
        match self {
            ShapeModel::Plane(m) => m.implied_normal(p),
            ShapeModel::Sphere(m) => m.implied_normal(p),
            ShapeModel::Cylinder(m) => m.implied_normal(p),
        }
    }

    /// Encode the parameters into a flat vector for convergence
    /// measurement. The encoding is sign-canonical: a model and its
    /// normal/axis-flipped twin encode identically, so refinement
    /// convergence cannot be defeated by a sign flip between iterations.
    pub fn encode(&self, out: &mut Vec<f64>) {
        out.clear();
        match self {
            ShapeModel::Plane(m) => {
                let (n, offset) = canonical_direction(m.normal, m.offset);
                out.extend_from_slice(&[n.x, n.y, n.z, offset]);
            }
            ShapeModel::Sphere(m) => {
                out.extend_from_slice(&[m.center.x, m.center.y, m.center.z, m.radius]);
            }
            ShapeModel::Cylinder(m) => {
                let (axis, _) = canonical_direction(m.axis, 0.0);
                out.extend_from_slice(&[
                    m.point.x, m.point.y, m.point.z, axis.x, axis.y, axis.z, m.radius,
                ]);
            }
        }
    }

    /// Parameter sanity check: everything finite, radii positive and
    /// directions unit-length.
    pub fn accept(&self) -> bool {
        match self {
            ShapeModel::Plane(m) => {
                m.normal.is_finite() && m.offset.is_finite() && unit_length(m.normal)
            }
            ShapeModel::Sphere(m) => {
                m.center.is_finite() && m.radius.is_finite() && m.radius > 0.0
            }
            ShapeModel::Cylinder(m) => {
                m.point.is_finite()
                    && m.axis.is_finite()
                    && m.radius.is_finite()
                    && m.radius > 0.0
                    && unit_length(m.axis)
            }
        }
    }
}

#[inline]
fn unit_length(v: Point3D) -> bool {
    (v.norm() - 1.0).abs() < 1e-6
}

/// Flip a direction (and a coupled scalar) so the first component of
/// meaningful magnitude is positive.
fn canonical_direction(direction: Point3D, coupled: f64) -> (Point3D, f64) {
    let lead = if direction.x.abs() > 1e-9 {
        direction.x
    } else if direction.y.abs() > 1e-9 {
        direction.y
    } else {
        direction.z
    };
    if lead < 0.0 {
        (-direction, -coupled)
    } else {
        (direction, coupled)
    }
}

/// Per-kind operation bundle: tolerances plus the generator, distance
/// function, fitter, codec and acceptance check for one shape kind.
#[derive(Clone, Copy, Debug)]
pub struct ShapeDescriptor {
    /// Shape kind this descriptor drives.
    pub kind: ShapeKind,
    /// Kind-specific tolerances.
    pub tolerances: ShapeTolerances,
}

impl ShapeDescriptor {
    /// Create a descriptor for a kind.
    pub fn new(kind: ShapeKind, tolerances: ShapeTolerances) -> Self {
        Self { kind, tolerances }
    }

    /// Minimal sample size; the generator and the matcher must agree.
    #[inline]
    pub fn min_sample_size(&self) -> usize {
        MIN_SAMPLE_SIZE
    }

    /// Inlier distance threshold for match-set expansion.
    #[inline]
    pub fn fit_threshold(&self) -> f64 {
        self.tolerances.fit_threshold
    }

    /// Generate a candidate model from a minimal sample, or fail.
    ///
    /// Failure is the cheap path: a nonsense sample is rejected by the
    /// generator's internal consistency checks before any matching work.
    pub fn generate(&self, points: &[Point3D; 3], normals: &[Point3D; 3]) -> Option<ShapeModel> {
        let model = match self.kind {
            ShapeKind::Plane => ShapeModel::Plane(plane::generate(points, normals, &self.tolerances)?),
            ShapeKind::Sphere => {
                ShapeModel::Sphere(sphere::generate(points, normals, &self.tolerances)?)
            }
            ShapeKind::Cylinder => {
                ShapeModel::Cylinder(cylinder::generate(points, normals, &self.tolerances)?)
            }
        };
        model.accept().then_some(model)
    }

    /// Distance of a point to the model, gated by normal compatibility.
    ///
    /// Returns `f64::INFINITY` when the point's measured normal deviates
    /// from the model-implied normal beyond the angle tolerance (both
    /// signs accepted), regardless of positional proximity. Points with
    /// a zero (unknown) normal are gated out the same way.
    pub fn distance(&self, model: &ShapeModel, p: Point3D, normal: Point3D) -> f64 {
        let implied = model.implied_normal(p);
        if normal.is_zero() || implied.is_zero() {
            return f64::INFINITY;
        }
        if normal.dot(implied).abs() < self.tolerances.angle_tolerance.cos() {
            return f64::INFINITY;
        }
        model.distance_to_point(p)
    }

    /// Batched distance evaluation into a caller-provided buffer.
    pub fn distance_batch(
        &self,
        model: &ShapeModel,
        points: &[Point3D],
        normals: &[Point3D],
        out: &mut Vec<f64>,
    ) {
        out.clear();
        out.extend(
            points
                .iter()
                .zip(normals.iter())
                .map(|(&p, &n)| self.distance(model, p, n)),
        );
    }

    /// Least-squares re-fit of the model to an inlier set.
    ///
    /// Returns `None` when the set is degenerate for this kind; callers
    /// keep the previous parameters in that case.
    pub fn fit(
        &self,
        points: &[Point3D],
        normals: &[Point3D],
        initial: &ShapeModel,
    ) -> Option<ShapeModel> {
        let model = match (self.kind, initial) {
            (ShapeKind::Plane, _) => ShapeModel::Plane(plane::fit(points)?),
            (ShapeKind::Sphere, _) => ShapeModel::Sphere(sphere::fit(points)?),
            (ShapeKind::Cylinder, ShapeModel::Cylinder(c)) => {
                ShapeModel::Cylinder(cylinder::fit(points, normals, c)?)
            }
            // A cylinder fit without cylinder initial parameters has no
            // fallback axis; reject rather than guess.
            (ShapeKind::Cylinder, _) => return None,
        };
        model.accept().then_some(model)
    }
}

/// An accepted shape detection: kind, parameters and the ordered member
/// point indices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FoundShape {
    /// Kind tag.
    pub kind: ShapeKind,
    /// Fitted model parameters.
    pub model: ShapeModel,
    /// Member point indices into the input cloud, in match order.
    pub points: Vec<u32>,
}

impl FoundShape {
    /// Create a shape record.
    pub fn new(model: ShapeModel, points: Vec<u32>) -> Self {
        Self {
            kind: model.kind(),
            model,
            points,
        }
    }

    /// Number of member points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the shape has no members.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
