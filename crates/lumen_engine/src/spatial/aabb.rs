//! Axis-aligned bounding box

use crate::foundation::math::{Mat4, Point3, Vec3};

/// Axis-Aligned Bounding Box for spatial queries
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box
    pub min: Vec3,
    /// Maximum corner of the bounding box
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max points
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// An empty box that grows to fit the first point added to it
    pub fn empty() -> Self {
        Self {
            min: Vec3::repeat(f32::INFINITY),
            max: Vec3::repeat(f32::NEG_INFINITY),
        }
    }

    /// True when no point has ever been added
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Grow the box to contain a point
    pub fn grow(&mut self, point: Vec3) {
        self.min = self.min.inf(&point);
        self.max = self.max.sup(&point);
    }

    /// Grow the box to contain another box
    pub fn merge(&mut self, other: &Aabb) {
        if !other.is_empty() {
            self.grow(other.min);
            self.grow(other.max);
        }
    }

    /// Transform all eight corners and fit a new box around them
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let mut result = Aabb::empty();
        for i in 0..8 {
            let corner = Point3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            result.grow(matrix.transform_point(&corner).coords);
        }
        result
    }

    /// Test ray intersection using the slab method
    ///
    /// Returns the distance to the entry point if the ray intersects
    /// (0 when the origin is inside the box), `None` otherwise.
    pub fn intersect_ray(&self, origin: Vec3, direction: Vec3) -> Option<f32> {
        let inv_dir = Vec3::new(
            if direction.x != 0.0 { 1.0 / direction.x } else { f32::INFINITY },
            if direction.y != 0.0 { 1.0 / direction.y } else { f32::INFINITY },
            if direction.z != 0.0 { 1.0 / direction.z } else { f32::INFINITY },
        );

        let t1 = (self.min.x - origin.x) * inv_dir.x;
        let t2 = (self.max.x - origin.x) * inv_dir.x;
        let t3 = (self.min.y - origin.y) * inv_dir.y;
        let t4 = (self.max.y - origin.y) * inv_dir.y;
        let t5 = (self.min.z - origin.z) * inv_dir.z;
        let t6 = (self.max.z - origin.z) * inv_dir.z;

        let tmin = t1.min(t2).max(t3.min(t4)).max(t5.min(t6));
        let tmax = t1.max(t2).min(t3.max(t4)).min(t5.max(t6));

        if tmax >= tmin && tmax >= 0.0 {
            Some(tmin.max(0.0))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_and_center() {
        let mut aabb = Aabb::empty();
        assert!(aabb.is_empty());

        aabb.grow(Vec3::new(-1.0, 0.0, 0.0));
        aabb.grow(Vec3::new(1.0, 2.0, 4.0));
        assert!(!aabb.is_empty());
        assert_eq!(aabb.center(), Vec3::new(0.0, 1.0, 2.0));
    }

    #[test]
    fn ray_hits_box() {
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));

        let hit = aabb.intersect_ray(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(hit, Some(4.0));

        let miss = aabb.intersect_ray(Vec3::new(0.0, 5.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(miss, None);
    }

    #[test]
    fn ray_from_inside_reports_zero_entry() {
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let hit = aabb.intersect_ray(Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(hit, Some(0.0));
    }

    #[test]
    fn transformed_fits_rotated_corners() {
        use crate::foundation::math::{Quat, Transform, Vec3};

        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0));
        let matrix = Transform {
            position: Vec3::new(10.0, 0.0, 0.0),
            rotation: Quat::identity(),
            scale: Vec3::new(2.0, 1.0, 1.0),
        }
        .to_matrix();

        let moved = aabb.transformed(&matrix);
        assert_eq!(moved.min, Vec3::new(8.0, -1.0, -1.0));
        assert_eq!(moved.max, Vec3::new(12.0, 1.0, 1.0));
    }
}
