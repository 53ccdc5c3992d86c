//! Geometry: vertex attribute buffers, index data and derived spatial data
//!
//! Geometry arrives from the host application as already-parsed attribute
//! arrays; no import formats are owned here. Derived data (bounds, BVH) is
//! computed lazily and invalidated when the geometry is marked dirty.

use std::sync::{Arc, Mutex};

use log::warn;

use crate::foundation::math::Vec3;
use crate::spatial::{Aabb, Bvh, BvhParams};

/// Well-known and custom vertex attribute names
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeName {
    /// Vertex positions, three components
    Position,
    /// Vertex normals
    Normal,
    /// Texture coordinates
    Texcoord,
    /// Tangents
    Tangent,
    /// Vertex colors
    Color,
    /// Application-defined attribute
    Custom(String),
}

/// One vertex attribute array
#[derive(Debug, Clone)]
pub struct VertexAttribute {
    /// Attribute name, matched against material vertex layouts
    pub name: AttributeName,
    /// Components per vertex (3 for positions, 2 for texcoords, ...)
    pub components: u32,
    /// Tightly packed attribute data
    pub data: Vec<f32>,
}

impl VertexAttribute {
    /// Number of vertices in this attribute
    pub fn vertex_count(&self) -> usize {
        if self.components == 0 {
            0
        } else {
            self.data.len() / self.components as usize
        }
    }
}

/// The set of attributes a shader's vertex stage consumes, in slot order
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexLayout {
    /// Required attribute names; the slot index is the position in this list
    pub attributes: Vec<AttributeName>,
}

impl VertexLayout {
    /// Layout with positions only
    pub fn position_only() -> Self {
        Self {
            attributes: vec![AttributeName::Position],
        }
    }

    /// Standard layout: position + normal
    pub fn position_normal() -> Self {
        Self {
            attributes: vec![AttributeName::Position, AttributeName::Normal],
        }
    }
}

#[derive(Debug, Default)]
struct DerivedData {
    bounds: Option<Aabb>,
    bvh: Option<Arc<Bvh>>,
}

/// Vertex attribute buffers plus an optional index buffer
#[derive(Debug)]
pub struct Geometry {
    attributes: Vec<VertexAttribute>,
    indices: Option<Vec<u32>>,
    bvh_params: BvhParams,
    derived: Mutex<DerivedData>,
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new()
    }
}

impl Geometry {
    /// Create an empty geometry
    pub fn new() -> Self {
        Self {
            attributes: Vec::new(),
            indices: None,
            bvh_params: BvhParams::default(),
            derived: Mutex::new(DerivedData::default()),
        }
    }

    /// Add or replace an attribute array
    pub fn set_attribute(&mut self, name: AttributeName, components: u32, data: Vec<f32>) {
        self.attributes.retain(|attribute| attribute.name != name);
        self.attributes.push(VertexAttribute {
            name,
            components,
            data,
        });
        self.mark_dirty();
    }

    /// Set the index buffer
    pub fn set_indices(&mut self, indices: Vec<u32>) {
        self.indices = Some(indices);
        self.mark_dirty();
    }

    /// Override the BVH build parameters
    pub fn set_bvh_params(&mut self, params: BvhParams) {
        self.bvh_params = params;
        self.mark_dirty();
    }

    /// Invalidate derived data after mutating attribute or index arrays
    pub fn mark_dirty(&self) {
        let mut derived = self.derived.lock().unwrap();
        derived.bounds = None;
        derived.bvh = None;
    }

    /// Look up an attribute by name
    pub fn attribute(&self, name: &AttributeName) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| &a.name == name)
    }

    /// All attributes, in insertion order
    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// The index buffer, if any
    pub fn indices(&self) -> Option<&[u32]> {
        self.indices.as_deref()
    }

    /// Number of vertices, from the position attribute
    pub fn vertex_count(&self) -> usize {
        self.attribute(&AttributeName::Position)
            .map_or(0, VertexAttribute::vertex_count)
    }

    /// True when every attribute the layout requires is present
    pub fn satisfies(&self, layout: &VertexLayout) -> bool {
        layout
            .attributes
            .iter()
            .all(|name| self.attribute(name).is_some())
    }

    /// Vertex positions as points
    ///
    /// Position attributes need at least three components; anything smaller
    /// is rejected with a warning rather than misread.
    pub fn positions(&self) -> Vec<Vec3> {
        self.attribute(&AttributeName::Position).map_or_else(Vec::new, |attribute| {
            if attribute.components < 3 {
                warn!(
                    "position attribute has {} components, expected at least 3",
                    attribute.components
                );
                return Vec::new();
            }
            attribute
                .data
                .chunks_exact(attribute.components as usize)
                .map(|chunk| Vec3::new(chunk[0], chunk[1], chunk[2]))
                .collect()
        })
    }

    /// Triangles as index triples, from the index buffer or sequential order
    pub fn triangles(&self) -> Vec<[u32; 3]> {
        match &self.indices {
            Some(indices) => indices
                .chunks_exact(3)
                .map(|chunk| [chunk[0], chunk[1], chunk[2]])
                .collect(),
            None => {
                let count = self.vertex_count() as u32;
                (0..count / 3)
                    .map(|i| [i * 3, i * 3 + 1, i * 3 + 2])
                    .collect()
            }
        }
    }

    /// Local-space bounds, cached until the geometry is marked dirty
    pub fn bounds(&self) -> Aabb {
        let mut derived = self.derived.lock().unwrap();
        if derived.bounds.is_none() {
            let mut aabb = Aabb::empty();
            for position in self.positions() {
                aabb.grow(position);
            }
            derived.bounds = Some(aabb);
        }
        derived.bounds.unwrap()
    }

    /// The geometry's BVH, built on first use and cached until dirty
    pub fn bvh(&self) -> Arc<Bvh> {
        let mut derived = self.derived.lock().unwrap();
        if derived.bvh.is_none() {
            derived.bvh = Some(Arc::new(Bvh::build(
                self.positions(),
                self.triangles(),
                self.bvh_params,
            )));
        }
        Arc::clone(derived.bvh.as_ref().unwrap())
    }

    /// A quad in the XY plane centered at the origin, facing +Z
    pub fn quad(width: f32, height: f32) -> Self {
        let hw = width * 0.5;
        let hh = height * 0.5;
        let mut geometry = Self::new();
        geometry.set_attribute(
            AttributeName::Position,
            3,
            vec![
                -hw, -hh, 0.0, //
                hw, -hh, 0.0, //
                hw, hh, 0.0, //
                -hw, hh, 0.0,
            ],
        );
        geometry.set_attribute(
            AttributeName::Normal,
            3,
            vec![
                0.0, 0.0, 1.0, //
                0.0, 0.0, 1.0, //
                0.0, 0.0, 1.0, //
                0.0, 0.0, 1.0,
            ],
        );
        geometry.set_indices(vec![0, 1, 2, 0, 2, 3]);
        geometry
    }

    /// A single triangle, mostly useful in tests
    pub fn triangle(a: Vec3, b: Vec3, c: Vec3) -> Self {
        let mut geometry = Self::new();
        geometry.set_attribute(
            AttributeName::Position,
            3,
            vec![a.x, a.y, a.z, b.x, b.y, b.z, c.x, c.y, c.z],
        );
        geometry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quad_has_two_triangles_and_unit_bounds() {
        let quad = Geometry::quad(2.0, 2.0);
        assert_eq!(quad.vertex_count(), 4);
        assert_eq!(quad.triangles().len(), 2);

        let bounds = quad.bounds();
        assert_eq!(bounds.min, Vec3::new(-1.0, -1.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn layout_satisfaction() {
        let quad = Geometry::quad(1.0, 1.0);
        assert!(quad.satisfies(&VertexLayout::position_normal()));

        let tri = Geometry::triangle(Vec3::zeros(), Vec3::x(), Vec3::y());
        assert!(tri.satisfies(&VertexLayout::position_only()));
        assert!(!tri.satisfies(&VertexLayout::position_normal()));
    }

    #[test]
    fn bvh_cache_invalidated_by_mark_dirty() {
        let mut quad = Geometry::quad(2.0, 2.0);
        let first = quad.bvh();
        assert!(Arc::ptr_eq(&first, &quad.bvh()));

        quad.set_indices(vec![0, 1, 2]);
        let rebuilt = quad.bvh();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
    }

    #[test]
    fn empty_geometry_is_harmless() {
        let geometry = Geometry::new();
        assert_eq!(geometry.vertex_count(), 0);
        assert!(geometry.triangles().is_empty());
        assert!(geometry.bounds().is_empty());
        assert!(geometry
            .bvh()
            .intersect(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0))
            .is_empty());
    }

    #[test]
    fn two_component_positions_are_rejected() {
        let mut geometry = Geometry::new();
        geometry.set_attribute(AttributeName::Position, 2, vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);

        assert!(geometry.positions().is_empty());
        assert!(geometry.bounds().is_empty());
        assert!(geometry
            .bvh()
            .intersect(Vec3::new(0.25, 0.25, 5.0), Vec3::new(0.0, 0.0, -1.0))
            .is_empty());
    }

    #[test]
    fn non_indexed_triangles_are_sequential() {
        let tri = Geometry::triangle(Vec3::zeros(), Vec3::x(), Vec3::y());
        assert_eq!(tri.triangles(), vec![[0, 1, 2]]);
    }
}
