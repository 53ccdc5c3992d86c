//! Materials and shader configuration
//!
//! A material owns everything that affects how a renderable is shaded:
//! blending, depth state and the shader configuration used as the cache key
//! for compiled pipeline objects. Pipelines themselves are cached externally
//! in [`crate::render::PipelineCache`], keyed by [`ShaderConfiguration`].

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::geometry::VertexLayout;

/// Blending mode applied by a material's pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlendMode {
    /// Opaque, no blending
    #[default]
    Opaque,
    /// Premultiplied alpha blending
    Alpha,
    /// Additive blending
    Additive,
}

/// Triangle cull mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CullMode {
    /// No culling
    None,
    /// Cull front faces
    Front,
    /// Cull back faces
    #[default]
    Back,
}

/// Front-face winding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Winding {
    /// Counter-clockwise front faces
    #[default]
    CounterClockwise,
    /// Clockwise front faces
    Clockwise,
}

/// Triangle fill mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FillMode {
    /// Solid triangles
    #[default]
    Fill,
    /// Wireframe
    Lines,
}

/// Depth bias applied while encoding (used by shadow passes)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DepthBias {
    /// Constant bias
    pub bias: f32,
    /// Slope-scaled bias
    pub slope: f32,
    /// Bias clamp
    pub clamp: f32,
}

bitflags! {
    /// Compile-time feature flags, part of the pipeline cache key
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderFeatures: u32 {
        /// Per-instance transform buffer is bound
        const INSTANCING = 1 << 0;
        /// Lighting uniforms are consumed
        const LIGHTING = 1 << 1;
        /// Shadow maps are sampled
        const SHADOWS = 1 << 2;
        /// Depth-only shadow variant (no fragment stage)
        const SHADOW_PASS = 1 << 3;
    }
}

/// The full set of compile-time-affecting shader parameters
///
/// Used as the cache key for compiled pipeline objects; two materials with
/// equal configurations share one pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderConfiguration {
    /// Human-readable label, also used in diagnostics
    pub label: String,
    /// Vertex stage entry point
    pub vertex_entry: String,
    /// Fragment stage entry point, empty for depth-only variants
    pub fragment_entry: String,
    /// Blending mode baked into the pipeline
    pub blending: BlendMode,
    /// Vertex attributes the pipeline consumes, in slot order
    pub vertex_layout: VertexLayout,
    /// Feature flags
    pub features: ShaderFeatures,
    /// Preprocessor defines, sorted by name for stable hashing
    pub defines: Vec<(String, String)>,
}

impl ShaderConfiguration {
    /// Derive the depth-only variant used by shadow passes
    pub fn shadow_variant(&self) -> Self {
        Self {
            label: format!("{} (shadow)", self.label),
            fragment_entry: String::new(),
            features: (self.features | ShaderFeatures::SHADOW_PASS)
                - (ShaderFeatures::LIGHTING | ShaderFeatures::SHADOWS),
            ..self.clone()
        }
    }
}

/// Shading state for a renderable
#[derive(Debug, Clone)]
pub struct Material {
    /// Label used for pipelines compiled from this material
    pub label: String,
    /// Shader source handed to the shader compiler collaborator
    pub source: String,
    /// Blending mode; transparent materials should also raise the
    /// renderable's `render_order` so they draw after opaque objects
    pub blending: BlendMode,
    /// Depth bias while encoding
    pub depth_bias: Option<DepthBias>,
    /// Vertex attributes this material's shader requires
    pub vertex_layout: VertexLayout,
    /// Feature flags
    pub features: ShaderFeatures,
    /// Preprocessor defines
    defines: Vec<(String, String)>,
    /// Raw bytes of the material's uniform block
    pub uniforms: Vec<u8>,
}

impl Material {
    /// Create a material from a label and shader source
    pub fn new(label: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
            blending: BlendMode::Opaque,
            depth_bias: None,
            vertex_layout: VertexLayout::position_normal(),
            features: ShaderFeatures::LIGHTING,
            defines: Vec::new(),
            uniforms: Vec::new(),
        }
    }

    /// Flat-shaded material with no lighting
    pub fn unlit(label: impl Into<String>, source: impl Into<String>) -> Self {
        let mut material = Self::new(label, source);
        material.vertex_layout = VertexLayout::position_only();
        material.features = ShaderFeatures::empty();
        material
    }

    /// Set or replace a preprocessor define, keeping the list sorted
    ///
    /// Changing a define changes the shader configuration, which invalidates
    /// the cached pipeline on next lookup.
    pub fn set_define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.defines.retain(|(existing, _)| existing != &name);
        self.defines.push((name, value.into()));
        self.defines.sort();
    }

    /// Current defines, sorted by name
    pub fn defines(&self) -> &[(String, String)] {
        &self.defines
    }

    /// Whether this material blends (draws after opaque geometry)
    pub fn is_transparent(&self) -> bool {
        self.blending != BlendMode::Opaque
    }

    /// The pipeline cache key for this material
    pub fn shader_config(&self, instanced: bool) -> ShaderConfiguration {
        let mut features = self.features;
        if instanced {
            features |= ShaderFeatures::INSTANCING;
        }
        ShaderConfiguration {
            label: self.label.clone(),
            vertex_entry: "vertex_main".to_string(),
            fragment_entry: "fragment_main".to_string(),
            blending: self.blending,
            vertex_layout: self.vertex_layout.clone(),
            features,
            defines: self.defines.clone(),
        }
    }
}
