//! Bounding volume hierarchy over a triangle soup
//!
//! Built once per geometry and rebuilt when the geometry is marked dirty.
//! Nodes are stored in a flat array: `nodes[0]` is the root, an internal
//! node's children live at `left_first` and `left_first + 1`, and a leaf
//! references a contiguous range of the remapped triangle-ID array.

use log::error;

use super::Aabb;
use crate::foundation::math::Vec3;

/// Hits closer than this along the ray are rejected, so intersections at or
/// behind the ray origin never count.
pub const RAY_EPSILON: f32 = 1e-6;

// Two hits within this distance of each other are the same surface point
// reported by adjacent triangles.
const SHARED_EDGE_EPSILON: f32 = 1e-4;

/// Build tuning parameters
#[derive(Debug, Clone, Copy)]
pub struct BvhParams {
    /// A node with at most this many triangles becomes a leaf
    pub leaf_size: u32,
    /// Recursion stops at this depth regardless of triangle count
    pub max_depth: u32,
}

impl Default for BvhParams {
    fn default() -> Self {
        Self {
            leaf_size: 4,
            max_depth: 32,
        }
    }
}

/// A single BVH node
///
/// `tri_count > 0` marks a leaf; `left_first` is then the index of the
/// leaf's first entry in the triangle-ID array. For internal nodes
/// `left_first` is the index of the first of two children.
#[derive(Debug, Clone, Copy)]
pub struct BvhNode {
    /// Bounds of every triangle under this node
    pub aabb: Aabb,
    /// Child index (internal) or first triangle-ID index (leaf)
    pub left_first: u32,
    /// Number of triangles in the leaf, zero for internal nodes
    pub tri_count: u32,
}

impl BvhNode {
    /// Whether this node is a leaf
    pub fn is_leaf(&self) -> bool {
        self.tri_count > 0
    }
}

/// A ray/triangle intersection in the BVH's local space
#[derive(Debug, Clone, Copy)]
pub struct Intersection {
    /// Barycentric coordinates of the hit inside the triangle
    pub barycentric: Vec3,
    /// Distance from the ray origin to the hit
    pub distance: f32,
    /// Geometric (unnormalized-winding) triangle normal, normalized
    pub normal: Vec3,
    /// Hit position
    pub position: Vec3,
    /// Index of the hit triangle in the source geometry
    pub primitive_index: u32,
}

/// Bounding volume hierarchy over an indexed triangle list
#[derive(Debug)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    tri_ids: Vec<u32>,
    centroids: Vec<Vec3>,
    positions: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
}

impl Bvh {
    /// Build a BVH over the given vertex positions and triangle indices
    ///
    /// An empty triangle list produces a degenerate root that reports no
    /// hits for every query. Triangle indices that exceed the vertex count
    /// degrade the whole geometry to that same empty hierarchy, with an
    /// error logged.
    pub fn build(positions: Vec<Vec3>, triangles: Vec<[u32; 3]>, params: BvhParams) -> Self {
        let triangles = if triangles
            .iter()
            .all(|tri| tri.iter().all(|&index| (index as usize) < positions.len()))
        {
            triangles
        } else {
            error!(
                "triangle indices exceed the {} available vertices, ignoring geometry",
                positions.len()
            );
            Vec::new()
        };
        let tri_count = triangles.len();

        let centroids: Vec<Vec3> = triangles
            .iter()
            .map(|tri| {
                (positions[tri[0] as usize] + positions[tri[1] as usize]
                    + positions[tri[2] as usize])
                    / 3.0
            })
            .collect();

        let mut bvh = Self {
            nodes: Vec::with_capacity(tri_count.max(1) * 2),
            tri_ids: (0..tri_count as u32).collect(),
            centroids,
            positions,
            triangles,
        };

        bvh.nodes.push(BvhNode {
            aabb: Aabb::empty(),
            left_first: 0,
            tri_count: tri_count as u32,
        });

        if tri_count > 0 {
            bvh.update_node_bounds(0);
            bvh.subdivide(0, 0, params);
        }

        bvh
    }

    /// Number of nodes in the hierarchy
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Root bounds, empty for degenerate geometry
    pub fn bounds(&self) -> Aabb {
        self.nodes[0].aabb
    }

    fn update_node_bounds(&mut self, node_index: usize) {
        let node = self.nodes[node_index];
        let mut aabb = Aabb::empty();
        for i in 0..node.tri_count {
            let tri = self.triangles[self.tri_ids[(node.left_first + i) as usize] as usize];
            aabb.grow(self.positions[tri[0] as usize]);
            aabb.grow(self.positions[tri[1] as usize]);
            aabb.grow(self.positions[tri[2] as usize]);
        }
        self.nodes[node_index].aabb = aabb;
    }

    fn subdivide(&mut self, node_index: usize, depth: u32, params: BvhParams) {
        let node = self.nodes[node_index];
        if node.tri_count <= params.leaf_size || depth >= params.max_depth {
            return;
        }

        // Split on the axis with the greatest centroid spread, at the middle
        // of that spread.
        let mut spread_min = Vec3::repeat(f32::INFINITY);
        let mut spread_max = Vec3::repeat(f32::NEG_INFINITY);
        for i in 0..node.tri_count {
            let centroid = self.centroids[self.tri_ids[(node.left_first + i) as usize] as usize];
            spread_min = spread_min.inf(&centroid);
            spread_max = spread_max.sup(&centroid);
        }
        let spread = spread_max - spread_min;
        let axis = spread.imax();
        let split = spread_min[axis] + spread[axis] * 0.5;

        // Partition the node's triangle-ID range in place.
        let mut left = node.left_first as usize;
        let mut right = left + node.tri_count as usize - 1;
        while left <= right {
            if self.centroids[self.tri_ids[left] as usize][axis] < split {
                left += 1;
            } else {
                self.tri_ids.swap(left, right);
                if right == 0 {
                    break;
                }
                right -= 1;
            }
        }

        let left_count = left as u32 - node.left_first;
        if left_count == 0 || left_count == node.tri_count {
            // Degenerate split (all centroids on one side); keep the leaf.
            return;
        }

        let left_child = self.nodes.len() as u32;
        self.nodes.push(BvhNode {
            aabb: Aabb::empty(),
            left_first: node.left_first,
            tri_count: left_count,
        });
        self.nodes.push(BvhNode {
            aabb: Aabb::empty(),
            left_first: left as u32,
            tri_count: node.tri_count - left_count,
        });

        self.nodes[node_index].left_first = left_child;
        self.nodes[node_index].tri_count = 0;

        self.update_node_bounds(left_child as usize);
        self.update_node_bounds(left_child as usize + 1);
        self.subdivide(left_child as usize, depth + 1, params);
        self.subdivide(left_child as usize + 1, depth + 1, params);
    }

    /// Collect every triangle intersection along a ray, in traversal order
    ///
    /// A ray crossing an edge or vertex shared by adjacent triangles passes
    /// the boundary-inclusive triangle test once per triangle; only the
    /// first of those coincident hits is kept.
    pub fn intersect(&self, origin: Vec3, direction: Vec3) -> Vec<Intersection> {
        let mut intersections: Vec<Intersection> = Vec::new();
        self.intersect_node(0, origin, direction, &mut intersections);

        let mut unique: Vec<Intersection> = Vec::with_capacity(intersections.len());
        for hit in intersections {
            let coincident = unique.iter().any(|kept| {
                (kept.distance - hit.distance).abs() <= SHARED_EDGE_EPSILON
                    && (kept.position - hit.position).norm_squared()
                        <= SHARED_EDGE_EPSILON * SHARED_EDGE_EPSILON
            });
            if !coincident {
                unique.push(hit);
            }
        }
        unique
    }

    /// Whether the ray touches the root bounds at all
    pub fn intersects(&self, origin: Vec3, direction: Vec3) -> bool {
        let root = self.nodes[0];
        !root.aabb.is_empty() && root.aabb.intersect_ray(origin, direction).is_some()
    }

    fn intersect_node(
        &self,
        node_index: u32,
        origin: Vec3,
        direction: Vec3,
        out: &mut Vec<Intersection>,
    ) {
        let node = self.nodes[node_index as usize];
        if node.aabb.is_empty() || node.aabb.intersect_ray(origin, direction).is_none() {
            return;
        }
        if node.is_leaf() {
            self.intersect_triangles(&node, origin, direction, out);
        } else {
            self.intersect_node(node.left_first, origin, direction, out);
            self.intersect_node(node.left_first + 1, origin, direction, out);
        }
    }

    fn intersect_triangles(
        &self,
        node: &BvhNode,
        origin: Vec3,
        direction: Vec3,
        out: &mut Vec<Intersection>,
    ) {
        for i in 0..node.tri_count {
            let primitive_index = self.tri_ids[(node.left_first + i) as usize];
            let tri = self.triangles[primitive_index as usize];
            let a = self.positions[tri[0] as usize];
            let b = self.positions[tri[1] as usize];
            let c = self.positions[tri[2] as usize];

            if let Some((t, u, v)) = ray_triangle_intersection(origin, direction, a, b, c) {
                let position = origin + direction * t;
                out.push(Intersection {
                    barycentric: Vec3::new(1.0 - u - v, u, v),
                    distance: (position - origin).magnitude(),
                    normal: (b - a).cross(&(c - a)).normalize(),
                    position,
                    primitive_index,
                });
            }
        }
    }
}

/// Möller–Trumbore ray/triangle intersection
///
/// Returns `(t, u, v)` where `t` is the ray parameter and `(u, v)` the
/// barycentric coordinates of vertices `b` and `c`. Hits with
/// `t <= RAY_EPSILON` are rejected.
fn ray_triangle_intersection(
    origin: Vec3,
    direction: Vec3,
    a: Vec3,
    b: Vec3,
    c: Vec3,
) -> Option<(f32, f32, f32)> {
    let edge1 = b - a;
    let edge2 = c - a;
    let p = direction.cross(&edge2);
    let det = edge1.dot(&p);
    if det.abs() < f32::EPSILON {
        return None;
    }

    let inv_det = 1.0 / det;
    let s = origin - a;
    let u = s.dot(&p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(&edge1);
    let v = direction.dot(&q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(&q) * inv_det;
    if t > RAY_EPSILON {
        Some((t, u, v))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_quad() -> (Vec<Vec3>, Vec<[u32; 3]>) {
        // Two triangles spanning [-1, 1]^2 in the XY plane at z = 0.
        let positions = vec![
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
        ];
        let triangles = vec![[0, 1, 2], [0, 2, 3]];
        (positions, triangles)
    }

    #[test]
    fn empty_geometry_reports_no_hits() {
        let bvh = Bvh::build(Vec::new(), Vec::new(), BvhParams::default());
        assert_eq!(bvh.node_count(), 1);
        assert!(!bvh.intersects(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0)));
        assert!(bvh
            .intersect(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0))
            .is_empty());
    }

    #[test]
    fn quad_center_ray_hits_once() {
        let (positions, triangles) = unit_quad();
        let bvh = Bvh::build(positions, triangles, BvhParams::default());

        let hits = bvh.intersect(Vec3::new(0.5, -0.5, 5.0), Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(hits.len(), 1);

        let hit = &hits[0];
        assert_eq!(hit.primitive_index, 0);
        assert_relative_eq!(hit.distance, 5.0, epsilon = 1e-5);
        assert_relative_eq!(
            hit.barycentric.x + hit.barycentric.y + hit.barycentric.z,
            1.0,
            epsilon = 1e-5
        );
    }

    #[test]
    fn shared_edge_crossing_counts_once() {
        // The quad's diagonal runs through the origin; a ray down that edge
        // satisfies both triangles' boundary-inclusive tests.
        let (positions, triangles) = unit_quad();
        let bvh = Bvh::build(positions, triangles, BvhParams::default());

        let hits = bvh.intersect(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(hits.len(), 1);
        assert_relative_eq!(hits[0].distance, 5.0, epsilon = 1e-5);

        // A shared vertex behaves the same way.
        let corner = bvh.intersect(Vec3::new(-1.0, -1.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(corner.len(), 1);
    }

    #[test]
    fn out_of_range_indices_degrade_to_empty() {
        let positions = vec![
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
        ];
        let bvh = Bvh::build(positions, vec![[0, 1, 9]], BvhParams::default());

        assert_eq!(bvh.node_count(), 1);
        assert!(bvh
            .intersect(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -1.0))
            .is_empty());
    }

    #[test]
    fn hits_behind_origin_are_rejected() {
        let (positions, triangles) = unit_quad();
        let bvh = Bvh::build(positions, triangles, BvhParams::default());

        // Pointing away from the quad: no intersection.
        let hits = bvh.intersect(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, 1.0));
        assert!(hits.is_empty());
    }

    #[test]
    fn centroid_nudge_rays_hit_their_triangle() {
        // A small grid of triangles; every ray cast at a triangle centroid
        // from along its normal must report that primitive.
        let mut positions = Vec::new();
        let mut triangles = Vec::new();
        for row in 0..4u32 {
            for col in 0..4u32 {
                let base = positions.len() as u32;
                let x = col as f32 * 2.0;
                let y = row as f32 * 2.0;
                positions.push(Vec3::new(x, y, 0.0));
                positions.push(Vec3::new(x + 1.0, y, 0.0));
                positions.push(Vec3::new(x, y + 1.0, 0.0));
                triangles.push([base, base + 1, base + 2]);
            }
        }

        let bvh = Bvh::build(positions.clone(), triangles.clone(), BvhParams::default());
        assert!(bvh.node_count() > 1);

        for (index, tri) in triangles.iter().enumerate() {
            let centroid = (positions[tri[0] as usize]
                + positions[tri[1] as usize]
                + positions[tri[2] as usize])
                / 3.0;
            let hits = bvh.intersect(centroid + Vec3::new(0.0, 0.0, 3.0), Vec3::new(0.0, 0.0, -1.0));
            assert_eq!(hits.len(), 1, "triangle {index}");
            assert_eq!(hits[0].primitive_index, index as u32);
            assert!(hits[0].distance >= 0.0);
        }
    }

    #[test]
    fn leaf_ranges_cover_all_triangles() {
        let (positions, triangles) = unit_quad();
        let bvh = Bvh::build(positions, triangles, BvhParams { leaf_size: 1, max_depth: 8 });

        let mut seen = vec![false; 2];
        for node in &bvh.nodes {
            if node.is_leaf() {
                for i in 0..node.tri_count {
                    seen[bvh.tri_ids[(node.left_first + i) as usize] as usize] = true;
                }
            }
        }
        assert!(seen.iter().all(|&s| s));
    }
}
