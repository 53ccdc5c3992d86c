//! Scene raycasting
//!
//! Rays are intersected against each renderable's geometry BVH in local
//! space: the ray is transformed through the node's inverse world matrix,
//! and hit positions and normals are mapped back to world space. Results
//! are fresh per query and sorted ascending by world distance.

use bitflags::bitflags;
use log::trace;

use crate::foundation::math::{normal_matrix, Mat4, Vec3};

use super::node::NodeRef;

/// A world-space ray
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// Origin point
    pub origin: Vec3,
    /// Direction, unit length for world rays
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray from an origin and direction
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Point at parameter `t` along the ray
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// This ray mapped through a matrix (origin as point, direction as
    /// vector, not renormalized)
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let origin = matrix.transform_point(&self.origin.into());
        let direction = matrix.transform_vector(&self.direction);
        Self {
            origin: origin.coords,
            direction,
        }
    }
}

bitflags! {
    /// Query behavior flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RaycastOptions: u32 {
        /// Descend into children instead of testing only the given roots
        const RECURSIVE = 1 << 0;
        /// Test invisible nodes too
        const INVISIBLE = 1 << 1;
        /// Stop at the first object that reports any hit, in traversal
        /// order; this is not necessarily the globally nearest object
        const FIRST_HIT = 1 << 2;
    }
}

impl Default for RaycastOptions {
    fn default() -> Self {
        Self::RECURSIVE
    }
}

/// One ray/renderable intersection
#[derive(Clone)]
pub struct RaycastResult {
    /// The node that was hit
    pub node: NodeRef,
    /// World-space distance from the ray origin
    pub distance: f32,
    /// World-space hit position
    pub position: Vec3,
    /// World-space surface normal at the hit
    pub normal: Vec3,
    /// Barycentric coordinates inside the hit triangle
    pub barycentric: Vec3,
    /// Index of the hit triangle in the node's geometry
    pub primitive_index: u32,
}

/// Cast a ray against the subtrees under `roots`
///
/// Returns every intersection sorted ascending by distance. With
/// [`RaycastOptions::FIRST_HIT`] traversal stops at the first node that
/// reports hits and only that node's intersections are returned.
pub fn raycast(ray: &Ray, roots: &[NodeRef], options: RaycastOptions) -> Vec<RaycastResult> {
    let mut results = Vec::new();
    'roots: for root in roots {
        let mut stack = vec![root.clone()];
        while let Some(node) = stack.pop() {
            if !options.contains(RaycastOptions::INVISIBLE) && !node.visible() {
                continue;
            }
            let had_hits = intersect_node(ray, &node, &mut results);
            if had_hits && options.contains(RaycastOptions::FIRST_HIT) {
                break 'roots;
            }
            if options.contains(RaycastOptions::RECURSIVE) {
                let mut children = node.children();
                // Children are pushed reversed so the stack pops pre-order.
                children.reverse();
                stack.extend(children);
            }
        }
    }
    results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    results
}

fn intersect_node(ray: &Ray, node: &NodeRef, out: &mut Vec<RaycastResult>) -> bool {
    let Some(bvh) = node.with_renderable(|renderable| renderable.geometry.bvh()) else {
        return false;
    };
    let world = node.world_matrix();
    let Some(inverse) = world.try_inverse() else {
        trace!("skipping '{}': singular world matrix", node.label());
        return false;
    };

    let local_ray = ray.transformed(&inverse);
    let hits = bvh.intersect(local_ray.origin, local_ray.direction);
    if hits.is_empty() {
        return false;
    }

    let normal_to_world = normal_matrix(&world);
    for hit in hits {
        let position = world.transform_point(&hit.position.into()).coords;
        out.push(RaycastResult {
            node: node.clone(),
            distance: (position - ray.origin).magnitude(),
            position,
            normal: (normal_to_world * hit.normal).normalize(),
            barycentric: hit.barycentric,
            primitive_index: hit.primitive_index,
        });
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::material::Material;
    use crate::scene::node::{Node, Renderable};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn quad_node(label: &str, z: f32) -> NodeRef {
        let node = Node::new(label);
        node.set_position(Vec3::new(0.0, 0.0, z));
        node.set_renderable(Renderable::new(
            Arc::new(Geometry::quad(2.0, 2.0)),
            Material::unlit(label, "src"),
        ));
        node
    }

    fn toward_negative_z() -> Ray {
        Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, -1.0))
    }

    #[test]
    fn hits_are_sorted_by_distance() {
        let far = quad_node("far", -5.0);
        let near = quad_node("near", 0.0);
        let results = raycast(
            &toward_negative_z(),
            &[far, near.clone()],
            RaycastOptions::default(),
        );

        assert_eq!(results.len(), 2);
        assert!(Arc::ptr_eq(&results[0].node, &near));
        assert_relative_eq!(results[0].distance, 10.0, epsilon = 1e-4);
        assert_relative_eq!(results[1].distance, 15.0, epsilon = 1e-4);
        assert_relative_eq!(
            results[0].normal,
            Vec3::new(0.0, 0.0, 1.0),
            epsilon = 1e-4
        );
    }

    #[test]
    fn invisible_nodes_are_skipped_unless_requested() {
        let node = quad_node("hidden", 0.0);
        node.set_visible(false);

        assert!(raycast(&toward_negative_z(), &[node.clone()], RaycastOptions::default()).is_empty());
        let results = raycast(
            &toward_negative_z(),
            &[node],
            RaycastOptions::RECURSIVE | RaycastOptions::INVISIBLE,
        );
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn first_hit_stops_at_the_first_object_in_traversal_order() {
        // The traversal order puts the farther quad first; FIRST_HIT keeps
        // its hit even though a nearer object exists.
        let far = quad_node("far", -5.0);
        let near = quad_node("near", 0.0);
        let results = raycast(
            &toward_negative_z(),
            &[far.clone(), near],
            RaycastOptions::default() | RaycastOptions::FIRST_HIT,
        );

        assert_eq!(results.len(), 1);
        assert!(Arc::ptr_eq(&results[0].node, &far));
    }

    #[test]
    fn non_recursive_queries_ignore_children() {
        let root = Node::new("root");
        let child = quad_node("child", 0.0);
        root.add_child(&child);

        assert!(raycast(&toward_negative_z(), &[root.clone()], RaycastOptions::empty()).is_empty());
        assert_eq!(
            raycast(&toward_negative_z(), &[root], RaycastOptions::RECURSIVE).len(),
            1
        );
    }

    #[test]
    fn hits_respect_the_node_transform() {
        let node = quad_node("offset", 0.0);
        node.set_position(Vec3::new(5.0, 0.0, 0.0));

        let miss = raycast(&toward_negative_z(), &[node.clone()], RaycastOptions::default());
        assert!(miss.is_empty());

        let ray = Ray::new(Vec3::new(5.0, 0.0, 10.0), Vec3::new(0.0, 0.0, -1.0));
        let results = raycast(&ray, &[node], RaycastOptions::default());
        assert_eq!(results.len(), 1);
        assert_relative_eq!(
            results[0].position,
            Vec3::new(5.0, 0.0, 0.0),
            epsilon = 1e-4
        );
    }

    #[test]
    fn scaled_nodes_report_world_distance() {
        let node = quad_node("scaled", 0.0);
        node.set_scale(Vec3::new(0.5, 0.5, 0.5));

        let results = raycast(&toward_negative_z(), &[node], RaycastOptions::default());
        assert_eq!(results.len(), 1);
        assert_relative_eq!(results[0].distance, 10.0, epsilon = 1e-4);
    }
}
