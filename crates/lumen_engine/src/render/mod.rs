//! Rendering: device boundary, pipeline cache, per-frame composition
//!
//! The concrete GPU API lives behind the [`GraphicsDevice`] and
//! [`ShaderCompiler`] traits. Everything above them (render lists, state
//! diffing, uniform rings, pass composition) is device-agnostic and is
//! exercised in tests through the recording [`HeadlessDevice`].

pub mod device;
pub mod encoder_state;
pub mod headless;
pub mod list;
pub mod pipeline;
pub mod renderer;
pub mod target;
pub mod uniforms;

pub use device::{
    BufferHandle, CompiledShader, DeviceError, GraphicsDevice, ParameterSchema, PassDescriptor,
    PipelineError, PipelineHandle, RenderEncoder, ShaderCompiler, ShaderParameter,
    TextureDescriptor, TextureHandle, TextureUsage,
};
pub use encoder_state::EncoderState;
pub use headless::{Command, HeadlessCompiler, HeadlessDevice, PassRecord};
pub use list::RenderList;
pub use pipeline::PipelineCache;
pub use renderer::{
    GpuGeometry, RenderContext, RenderError, Renderer, UNIFORM_SLOT_LIGHTS, UNIFORM_SLOT_MATERIAL,
    UNIFORM_SLOT_OBJECT,
};
pub use target::RenderTarget;
pub use uniforms::{GpuMat4, LightUniforms, ObjectUniforms, UniformRing};
