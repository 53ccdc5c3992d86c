//! Scene graph nodes
//!
//! A node owns its children through `Arc` and observes its parent through a
//! `Weak` back-reference, so dropping a subtree's root drops the subtree.
//! Local and world matrices are cached lazily behind a per-node mutex and
//! invalidated down the subtree on any transform mutation. Rather than
//! subclassing, a node carries optional capability records: a [`Renderable`]
//! makes it drawable, a [`Light`] makes it illuminate.
//!
//! Lock ordering: a children lock is never acquired while a transform state
//! lock is held. `world_matrix` resolves the parent chain before locking its
//! own state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use log::{debug, error, warn};

use crate::foundation::math::{normal_matrix, Mat3, Mat4, Quat, Transform, Vec3};
use crate::geometry::Geometry;
use crate::material::{CullMode, FillMode, Material, Winding};
use crate::render::{GpuGeometry, RenderContext, RenderError};

use super::light::Light;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Shared handle to a node
pub type NodeRef = Arc<Node>;

/// Drawable capability attached to a node
pub struct Renderable {
    /// Shared vertex data
    pub geometry: Arc<Geometry>,
    /// Shading state
    pub material: Material,
    /// Triangle cull mode for this renderable
    pub cull_mode: CullMode,
    /// Front-face winding
    pub winding: Winding,
    /// Fill mode
    pub fill_mode: FillMode,
    /// Draw ordering key; higher draws later. Ties keep insertion order.
    pub render_order: i32,
    /// Whether this renderable is drawn into shadow maps
    pub cast_shadow: bool,
    /// Whether the main pass samples shadow maps for this renderable
    pub receive_shadow: bool,
    /// Per-instance transforms; empty means one non-instanced draw
    pub instance_transforms: Vec<Mat4>,
    pub(crate) gpu: Option<GpuGeometry>,
}

impl Renderable {
    /// Create a renderable from shared geometry and a material
    pub fn new(geometry: Arc<Geometry>, material: Material) -> Self {
        Self {
            geometry,
            material,
            cull_mode: CullMode::default(),
            winding: Winding::default(),
            fill_mode: FillMode::default(),
            render_order: 0,
            cast_shadow: true,
            receive_shadow: true,
            instance_transforms: Vec::new(),
            gpu: None,
        }
    }

    /// True when the geometry satisfies the material's vertex layout
    pub fn is_drawable(&self) -> bool {
        self.geometry.satisfies(&self.material.vertex_layout)
    }

    /// Whether this renderable draws multiple instances
    pub fn is_instanced(&self) -> bool {
        !self.instance_transforms.is_empty()
    }

    /// Instances on the draw call, at least one
    pub fn instance_count(&self) -> u32 {
        (self.instance_transforms.len() as u32).max(1)
    }

    pub(crate) fn ensure_uploaded(&mut self, context: &RenderContext) -> Result<(), RenderError> {
        if self.gpu.is_some() {
            return Ok(());
        }
        if !self.is_drawable() {
            debug!(
                "renderable '{}' is missing required vertex attributes, skipping upload",
                self.material.label
            );
            return Ok(());
        }
        self.gpu = Some(GpuGeometry::upload(
            context,
            &self.geometry,
            &self.material.vertex_layout,
            self.instance_count(),
            self.is_instanced(),
            &self.material.uniforms,
        )?);
        Ok(())
    }
}

#[derive(Debug)]
struct TransformState {
    local: Transform,
    local_matrix: Option<Mat4>,
    world_matrix: Option<Mat4>,
    normal_matrix: Option<Mat3>,
}

/// A scene graph node
pub struct Node {
    // Weak self-handle so `&self` methods can hand out `NodeRef`s and wire
    // parent back-references.
    self_ref: Weak<Node>,
    id: u64,
    label: String,
    visible: AtomicBool,
    transform: Mutex<TransformState>,
    parent: Mutex<Weak<Node>>,
    children: Mutex<Vec<NodeRef>>,
    renderable: Mutex<Option<Renderable>>,
    light: Mutex<Option<Light>>,
    context: Mutex<Weak<RenderContext>>,
}

impl Node {
    /// Create a detached node with an identity transform
    pub fn new(label: impl Into<String>) -> NodeRef {
        let label = label.into();
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            label,
            visible: AtomicBool::new(true),
            transform: Mutex::new(TransformState {
                local: Transform::identity(),
                local_matrix: None,
                world_matrix: None,
                normal_matrix: None,
            }),
            parent: Mutex::new(Weak::new()),
            children: Mutex::new(Vec::new()),
            renderable: Mutex::new(None),
            light: Mutex::new(None),
            context: Mutex::new(Weak::new()),
        })
    }

    /// Unique node id, monotonically assigned
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Node label
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The node's own visibility flag, ignoring ancestors
    pub fn visible(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }

    /// Set the node's own visibility flag
    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Relaxed);
    }

    /// Effective visibility: own flag AND every ancestor's flag
    pub fn is_visible(&self) -> bool {
        if !self.visible() {
            return false;
        }
        match self.parent.lock().unwrap().upgrade() {
            Some(parent) => parent.is_visible(),
            None => true,
        }
    }

    /// Copy of the local transform
    pub fn local_transform(&self) -> Transform {
        self.transform.lock().unwrap().local.clone()
    }

    /// Replace the local transform
    pub fn set_transform(&self, transform: Transform) {
        {
            let mut state = self.transform.lock().unwrap();
            state.local = transform;
            state.local_matrix = None;
        }
        self.invalidate_world();
    }

    /// Set the local position
    pub fn set_position(&self, position: Vec3) {
        {
            let mut state = self.transform.lock().unwrap();
            state.local.position = position;
            state.local_matrix = None;
        }
        self.invalidate_world();
    }

    /// Set the local rotation
    pub fn set_rotation(&self, rotation: Quat) {
        {
            let mut state = self.transform.lock().unwrap();
            state.local.rotation = rotation;
            state.local_matrix = None;
        }
        self.invalidate_world();
    }

    /// Set the local scale
    pub fn set_scale(&self, scale: Vec3) {
        {
            let mut state = self.transform.lock().unwrap();
            state.local.scale = scale;
            state.local_matrix = None;
        }
        self.invalidate_world();
    }

    // A node whose world matrix is already invalid has invalid descendants,
    // so the cascade stops there.
    fn invalidate_world(&self) {
        let was_dirty = {
            let mut state = self.transform.lock().unwrap();
            let was_dirty = state.world_matrix.is_none();
            state.world_matrix = None;
            state.normal_matrix = None;
            was_dirty
        };
        if was_dirty {
            return;
        }
        let children = self.children.lock().unwrap().clone();
        for child in children {
            child.invalidate_world();
        }
    }

    /// Local transform matrix, computed on first read after a mutation
    pub fn local_matrix(&self) -> Mat4 {
        let mut state = self.transform.lock().unwrap();
        match state.local_matrix {
            Some(matrix) => matrix,
            None => {
                let matrix = state.local.to_matrix();
                state.local_matrix = Some(matrix);
                matrix
            }
        }
    }

    /// World matrix: the parent's world matrix times the local matrix
    ///
    /// A detached node's world matrix equals its local matrix. The result is
    /// cached until this node or an ancestor mutates its transform.
    pub fn world_matrix(&self) -> Mat4 {
        if let Some(world) = self.transform.lock().unwrap().world_matrix {
            return world;
        }
        let parent_world = self
            .parent
            .lock()
            .unwrap()
            .upgrade()
            .map(|parent| parent.world_matrix());

        let mut state = self.transform.lock().unwrap();
        let local = match state.local_matrix {
            Some(matrix) => matrix,
            None => {
                let matrix = state.local.to_matrix();
                state.local_matrix = Some(matrix);
                matrix
            }
        };
        let world = parent_world.map_or(local, |parent| parent * local);
        state.world_matrix = Some(world);
        state.normal_matrix = Some(normal_matrix(&world));
        world
    }

    /// Inverse-transpose of the world matrix's upper 3x3
    pub fn normal_matrix(&self) -> Mat3 {
        let world = self.world_matrix();
        self.transform
            .lock()
            .unwrap()
            .normal_matrix
            .unwrap_or_else(|| normal_matrix(&world))
    }

    /// World-space position of the node's origin
    pub fn world_position(&self) -> Vec3 {
        let world = self.world_matrix();
        Vec3::new(world.m14, world.m24, world.m34)
    }

    /// Attach a child, detaching it from any previous parent first
    pub fn add_child(&self, child: &NodeRef) {
        if child.id == self.id || child.is_ancestor_of(self) {
            warn!("refusing to attach '{}' under itself", child.label);
            return;
        }
        child.detach();
        *child.parent.lock().unwrap() = self.self_ref.clone();
        self.children.lock().unwrap().push(Arc::clone(child));
        child.invalidate_world();

        // Subtrees attached under an already-set-up node get their GPU
        // resources immediately.
        let context = self.context.lock().unwrap().upgrade();
        if let Some(context) = context {
            if let Err(err) = child.setup(&context) {
                error!("deferred setup of '{}' failed: {err}", child.label);
            }
        }
    }

    fn is_ancestor_of(&self, node: &Self) -> bool {
        let mut current = node.parent();
        while let Some(ancestor) = current {
            if ancestor.id == self.id {
                return true;
            }
            current = ancestor.parent();
        }
        false
    }

    /// Remove this node from its parent, if it has one
    pub fn detach(&self) {
        let parent = self.parent.lock().unwrap().upgrade();
        if let Some(parent) = parent {
            parent
                .children
                .lock()
                .unwrap()
                .retain(|child| child.id != self.id);
            *self.parent.lock().unwrap() = Weak::new();
            self.invalidate_world();
        }
    }

    /// Remove a direct child; nodes not under this parent are left alone
    pub fn remove_child(&self, child: &NodeRef) {
        let removed = {
            let mut children = self.children.lock().unwrap();
            let before = children.len();
            children.retain(|c| !Arc::ptr_eq(c, child));
            children.len() != before
        };
        if removed {
            *child.parent.lock().unwrap() = Weak::new();
            child.invalidate_world();
        }
    }

    /// Remove every child
    pub fn remove_all(&self) {
        let children = std::mem::take(&mut *self.children.lock().unwrap());
        for child in children {
            *child.parent.lock().unwrap() = Weak::new();
            child.invalidate_world();
        }
    }

    /// The parent node, if attached
    pub fn parent(&self) -> Option<NodeRef> {
        self.parent.lock().unwrap().upgrade()
    }

    /// Snapshot of the direct children
    pub fn children(&self) -> Vec<NodeRef> {
        self.children.lock().unwrap().clone()
    }

    /// Depth-first pre-order traversal over the whole subtree
    pub fn visit(&self, visitor: &mut dyn FnMut(&NodeRef)) {
        if let Some(me) = self.self_ref.upgrade() {
            visitor(&me);
        }
        let children = self.children.lock().unwrap().clone();
        for child in &children {
            child.visit(visitor);
        }
    }

    /// Pre-order traversal skipping invisible subtrees
    pub fn visit_visible(&self, visitor: &mut dyn FnMut(&NodeRef)) {
        if !self.visible() {
            return;
        }
        if let Some(me) = self.self_ref.upgrade() {
            visitor(&me);
        }
        let children = self.children.lock().unwrap().clone();
        for child in &children {
            child.visit_visible(visitor);
        }
    }

    /// Find the first descendant with the given label, pre-order
    pub fn find_child(&self, label: &str) -> Option<NodeRef> {
        let children = self.children.lock().unwrap().clone();
        for child in &children {
            if child.label == label {
                return Some(Arc::clone(child));
            }
            if let Some(found) = child.find_child(label) {
                return Some(found);
            }
        }
        None
    }

    /// Resolve every cached matrix in the subtree
    pub fn update(&self) {
        let _ = self.world_matrix();
        let children = self.children.lock().unwrap().clone();
        for child in children {
            child.update();
        }
    }

    /// Attach a renderable capability; GPU resources are created lazily
    pub fn set_renderable(&self, renderable: Renderable) {
        *self.renderable.lock().unwrap() = Some(renderable);
    }

    /// Detach and return the renderable capability
    pub fn take_renderable(&self) -> Option<Renderable> {
        self.renderable.lock().unwrap().take()
    }

    /// Whether this node carries a renderable capability
    pub fn has_renderable(&self) -> bool {
        self.renderable.lock().unwrap().is_some()
    }

    /// Run a closure against the renderable capability, if present
    pub fn with_renderable<R>(&self, f: impl FnOnce(&mut Renderable) -> R) -> Option<R> {
        self.renderable.lock().unwrap().as_mut().map(f)
    }

    /// Attach a light capability
    pub fn set_light(&self, light: Light) {
        *self.light.lock().unwrap() = Some(light);
    }

    /// The light capability, if present
    pub fn light(&self) -> Option<Light> {
        *self.light.lock().unwrap()
    }

    /// Create GPU resources for the subtree and remember the context
    ///
    /// Safe to call again; already-uploaded renderables are left alone.
    pub fn setup(&self, context: &Arc<RenderContext>) -> Result<(), RenderError> {
        *self.context.lock().unwrap() = Arc::downgrade(context);
        {
            let mut slot = self.renderable.lock().unwrap();
            if let Some(renderable) = slot.as_mut() {
                renderable.ensure_uploaded(context)?;
            }
        }
        let children = self.children.lock().unwrap().clone();
        for child in &children {
            child.setup(context)?;
        }
        Ok(())
    }

    /// Release GPU resources for the subtree; safe to call more than once
    pub fn cleanup(&self) {
        let context = self.context.lock().unwrap().upgrade();
        {
            let mut slot = self.renderable.lock().unwrap();
            if let Some(renderable) = slot.as_mut() {
                if let Some(gpu) = renderable.gpu.take() {
                    match &context {
                        Some(context) => gpu.destroy(context.device.as_ref()),
                        None => debug!(
                            "cleanup of '{}' after its context was dropped",
                            self.label
                        ),
                    }
                }
            }
        }
        *self.context.lock().unwrap() = Weak::new();
        let children = self.children.lock().unwrap().clone();
        for child in children {
            child.cleanup();
        }
    }
}
