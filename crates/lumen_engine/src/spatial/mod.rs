//! Spatial acceleration structures
//!
//! Bounding volumes and the triangle BVH used by raycasting.

mod aabb;
mod bvh;

pub use aabb::Aabb;
pub use bvh::{Bvh, BvhNode, BvhParams, Intersection, RAY_EPSILON};
