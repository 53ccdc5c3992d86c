//! # Lumen Engine
//!
//! The device-agnostic core of a real-time 3D renderer: a scene graph with
//! lazily cached transforms, BVH-accelerated raycasting, and multi-pass
//! frame composition (shadow, main, post-process) over an abstract graphics
//! device.
//!
//! ## Features
//!
//! - **Scene Graph**: `Arc`-shared nodes with cached local/world matrices
//!   and dirty propagation down the subtree
//! - **Capabilities**: nodes become drawable or illuminating through
//!   attached `Renderable` / `Light` records, not subclassing
//! - **Raycasting**: per-geometry BVH queried in local space, results in
//!   world space sorted by distance
//! - **Render Lists**: per-frame gathering with a stable `render_order` sort
//! - **State Diffing**: redundant encoder binds elided by handle identity
//! - **Headless Testing**: a recording `GraphicsDevice` so every pass is
//!   assertable without a GPU
//!
//! ## Quick Start
//!
//! ```rust
//! use lumen_engine::prelude::*;
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), RenderError> {
//!     let device = Arc::new(HeadlessDevice::new());
//!     let compiler = Arc::new(HeadlessCompiler::new());
//!     let context = RenderContext::new(device, compiler, RendererSettings::default())?;
//!     let mut renderer = Renderer::new(Arc::clone(&context), 800, 600)?;
//!
//!     let root = Node::new("root");
//!     let quad = Node::new("quad");
//!     quad.set_renderable(Renderable::new(
//!         Arc::new(Geometry::quad(1.0, 1.0)),
//!         Material::unlit("flat", "shader source"),
//!     ));
//!     root.add_child(&quad);
//!     root.setup(&context)?;
//!
//!     let camera = Camera::default();
//!     renderer.render(&[root.clone()], &camera)?;
//!     root.cleanup();
//!     renderer.teardown();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod geometry;
pub mod material;
pub mod render;
pub mod scene;
pub mod spatial;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::RendererSettings,
        foundation::math::{Mat4, Quat, Transform, Vec2, Vec3},
        geometry::{AttributeName, Geometry, VertexLayout},
        material::{BlendMode, CullMode, Material, ShaderFeatures},
        render::{
            GraphicsDevice, HeadlessCompiler, HeadlessDevice, RenderContext, RenderError,
            Renderer, ShaderCompiler,
        },
        scene::{raycast, Camera, Light, Node, NodeRef, Ray, RaycastOptions, Renderable},
    };
}
