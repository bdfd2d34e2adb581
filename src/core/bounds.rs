//! Axis-aligned bounding box in 3D.
//!
//! Used for the octree root volume and for cheap containment checks.
//! The empty box uses the inverted-infinity convention so that
//! `expand_to_include` works without a special first-point case.

use serde::{Deserialize, Serialize};

use super::point::Point3D;

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Minimum corner (smallest x, y, z).
    pub min: Point3D,
    /// Maximum corner (largest x, y, z).
    pub max: Point3D,
}

impl Bounds {
    /// Create a bounding box from min and max corners.
    #[inline]
    pub const fn new(min: Point3D, max: Point3D) -> Self {
        Self { min, max }
    }

    /// Create an empty (inverted) bounding box that expands to fit any point.
    #[inline]
    pub fn empty() -> Self {
        Self {
            min: Point3D::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3D::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Check whether the box is empty (inverted).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Compute the bounding box of a point set (empty box for an empty set).
    pub fn from_points(points: &[Point3D]) -> Self {
        let mut bounds = Self::empty();
        for &p in points {
            bounds.expand_to_include(p);
        }
        bounds
    }

    /// Grow the box to contain a point.
    #[inline]
    pub fn expand_to_include(&mut self, p: Point3D) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    /// Grow the box by a margin on every side.
    #[inline]
    pub fn inflated(&self, margin: f64) -> Bounds {
        Bounds::new(
            Point3D::new(self.min.x - margin, self.min.y - margin, self.min.z - margin),
            Point3D::new(self.max.x + margin, self.max.y + margin, self.max.z + margin),
        )
    }

    /// Containment check (inclusive on all faces).
    #[inline]
    pub fn contains(&self, p: Point3D) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Center of the box.
    #[inline]
    pub fn center(&self) -> Point3D {
        Point3D::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }

    /// Size along each axis.
    #[inline]
    pub fn size(&self) -> Point3D {
        self.max - self.min
    }

    /// Largest axis extent.
    #[inline]
    pub fn max_extent(&self) -> f64 {
        let s = self.size();
        s.x.max(s.y).max(s.z)
    }

    /// The octant sub-box selected by a 0-7 child index.
    ///
    /// Bit 0 selects the upper x half, bit 1 the upper y half, bit 2 the
    /// upper z half, matching the octant index computed from sign
    /// comparisons against the center.
    pub fn octant(&self, index: usize) -> Bounds {
        let c = self.center();
        let (min_x, max_x) = if index & 1 != 0 {
            (c.x, self.max.x)
        } else {
            (self.min.x, c.x)
        };
        let (min_y, max_y) = if index & 2 != 0 {
            (c.y, self.max.y)
        } else {
            (self.min.y, c.y)
        };
        let (min_z, max_z) = if index & 4 != 0 {
            (c.z, self.max.z)
        } else {
            (self.min.z, c.z)
        };
        Bounds::new(
            Point3D::new(min_x, min_y, min_z),
            Point3D::new(max_x, max_y, max_z),
        )
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::empty()
    }
}
