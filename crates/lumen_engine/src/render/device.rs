//! Graphics device collaborator boundary
//!
//! The concrete GPU API lives outside this crate. Everything the engine
//! needs from it is expressed through these capability traits: buffer and
//! texture creation, pipeline creation from compiled shader configurations,
//! and command encoding. Handles are opaque and compared by identity; the
//! state-diffing layer relies on that.

use thiserror::Error;

use crate::material::{CullMode, DepthBias, FillMode, ShaderConfiguration, Winding};

/// Errors surfaced by a graphics device
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Resource allocation failed; fatal at construction time
    #[error("out of device memory allocating {0}")]
    OutOfMemory(String),
    /// A handle did not refer to a live resource
    #[error("invalid {kind} handle")]
    InvalidHandle {
        /// Resource kind, for diagnostics
        kind: &'static str,
    },
}

/// Errors from shader compilation / pipeline creation
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The shader source failed to compile
    #[error("shader compilation failed for '{label}': {message}")]
    Compilation {
        /// Configuration label
        label: String,
        /// Compiler diagnostics
        message: String,
    },
    /// The device rejected the pipeline configuration
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Opaque GPU buffer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Opaque GPU texture handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Opaque compiled pipeline handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineHandle(pub u64);

/// Texture usage requested at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureUsage {
    /// Color render target, sampleable afterwards
    ColorTarget,
    /// Depth render target, sampleable afterwards (shadow maps)
    DepthTarget,
}

/// Description of a texture to create
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    /// Debug label
    pub label: String,
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// MSAA sample count
    pub sample_count: u32,
    /// Usage
    pub usage: TextureUsage,
}

/// Attachments and clear values for one encoding pass
#[derive(Debug, Clone)]
pub struct PassDescriptor {
    /// Debug label for the pass
    pub label: String,
    /// Color attachment; `None` for depth-only passes
    pub color: Option<TextureHandle>,
    /// Depth attachment
    pub depth: Option<TextureHandle>,
    /// Clear color applied on load when set
    pub clear_color: Option<[f32; 4]>,
    /// Clear depth applied on load when set
    pub clear_depth: Option<f32>,
}

/// A single encoded draw's worth of state-setting and draw calls
///
/// Calls are intentionally unconditional; redundant-state elimination is the
/// job of [`crate::render::EncoderState`], which wraps this trait.
pub trait RenderEncoder {
    /// Bind a compiled pipeline
    fn set_pipeline(&mut self, pipeline: PipelineHandle);
    /// Set the cull mode
    fn set_cull_mode(&mut self, mode: CullMode);
    /// Set the front-face winding
    fn set_winding(&mut self, winding: Winding);
    /// Set the triangle fill mode
    fn set_fill_mode(&mut self, mode: FillMode);
    /// Set the depth bias
    fn set_depth_bias(&mut self, bias: DepthBias);
    /// Bind a vertex buffer to a slot
    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle);
    /// Bind the index buffer
    fn set_index_buffer(&mut self, buffer: BufferHandle);
    /// Bind a uniform buffer to a slot
    fn set_uniform_buffer(&mut self, slot: u32, buffer: BufferHandle);
    /// Bind a texture to a slot
    fn set_texture(&mut self, slot: u32, texture: TextureHandle);
    /// Draw non-indexed geometry
    fn draw(&mut self, vertex_count: u32, instance_count: u32);
    /// Draw indexed geometry
    fn draw_indexed(&mut self, index_count: u32, instance_count: u32);
}

/// Capability interface over the host's GPU API
pub trait GraphicsDevice: Send + Sync {
    /// Create a buffer with initial contents
    fn create_buffer(&self, label: &str, contents: &[u8]) -> Result<BufferHandle, DeviceError>;
    /// Replace a buffer's contents
    fn update_buffer(&self, buffer: BufferHandle, contents: &[u8]) -> Result<(), DeviceError>;
    /// Release a buffer; unknown handles are ignored
    fn destroy_buffer(&self, buffer: BufferHandle);
    /// Create a texture
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureHandle, DeviceError>;
    /// Release a texture; unknown handles are ignored
    fn destroy_texture(&self, texture: TextureHandle);
    /// Begin encoding a pass against the given attachments
    fn begin_encoding(&self, pass: &PassDescriptor) -> Box<dyn RenderEncoder>;
    /// Submit an encoded pass for execution
    fn submit(&self, encoder: Box<dyn RenderEncoder>);
}

/// One reflected shader parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderParameter {
    /// Parameter name
    pub name: String,
    /// Size of the parameter in bytes
    pub byte_size: u32,
}

/// Parameter schema reflected from a compiled shader
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSchema {
    /// Reflected parameters in declaration order
    pub parameters: Vec<ShaderParameter>,
}

/// A compiled shader program plus its reflected parameters
#[derive(Debug, Clone)]
pub struct CompiledShader {
    /// Pipeline object usable with [`RenderEncoder::set_pipeline`]
    pub pipeline: PipelineHandle,
    /// Reflected parameter schema
    pub schema: ParameterSchema,
}

/// Shader compiler collaborator
///
/// Invoked lazily on first use of a configuration and cached by the
/// [`crate::render::PipelineCache`]; re-invoked when a configuration's
/// source or defines change.
pub trait ShaderCompiler: Send + Sync {
    /// Compile source with the configuration's defines and entry points
    fn compile(
        &self,
        source: &str,
        config: &ShaderConfiguration,
    ) -> Result<CompiledShader, PipelineError>;
}
