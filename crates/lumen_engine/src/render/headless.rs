//! Headless graphics device
//!
//! A recording implementation of the device boundary with no GPU behind it.
//! Resources live in slotmaps, encoded passes are kept as command lists, so
//! tests can assert on exactly which binds and draws were issued.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use slotmap::{Key, KeyData, SlotMap};

use super::device::{
    BufferHandle, CompiledShader, DeviceError, GraphicsDevice, ParameterSchema, PassDescriptor,
    PipelineError, PipelineHandle, RenderEncoder, ShaderCompiler, ShaderParameter,
    TextureDescriptor, TextureHandle,
};
use crate::material::{CullMode, DepthBias, FillMode, ShaderConfiguration, Winding};

slotmap::new_key_type! {
    struct BufferKey;
    struct TextureKey;
}

/// A single recorded encoder call
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Pipeline bind
    SetPipeline(PipelineHandle),
    /// Cull mode change
    SetCullMode(CullMode),
    /// Winding change
    SetWinding(Winding),
    /// Fill mode change
    SetFillMode(FillMode),
    /// Depth bias change
    SetDepthBias(DepthBias),
    /// Vertex buffer bind
    SetVertexBuffer {
        /// Slot index
        slot: u32,
        /// Bound buffer
        buffer: BufferHandle,
    },
    /// Index buffer bind
    SetIndexBuffer(BufferHandle),
    /// Uniform buffer bind
    SetUniformBuffer {
        /// Slot index
        slot: u32,
        /// Bound buffer
        buffer: BufferHandle,
    },
    /// Texture bind
    SetTexture {
        /// Slot index
        slot: u32,
        /// Bound texture
        texture: TextureHandle,
    },
    /// Non-indexed draw
    Draw {
        /// Vertices per instance
        vertex_count: u32,
        /// Instances
        instance_count: u32,
    },
    /// Indexed draw
    DrawIndexed {
        /// Indices per instance
        index_count: u32,
        /// Instances
        instance_count: u32,
    },
}

/// One submitted pass and everything encoded into it
#[derive(Debug, Clone)]
pub struct PassRecord {
    /// Pass label from the descriptor
    pub label: String,
    /// Whether the pass had a color attachment
    pub has_color: bool,
    /// Recorded calls in submission order
    pub commands: Vec<Command>,
}

impl PassRecord {
    /// Count recorded commands matching a predicate
    pub fn count(&self, predicate: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|c| predicate(c)).count()
    }

    /// Number of draw calls (indexed or not) in this pass
    pub fn draw_count(&self) -> usize {
        self.count(|c| matches!(c, Command::Draw { .. } | Command::DrawIndexed { .. }))
    }
}

#[derive(Debug)]
struct BufferResource {
    #[allow(dead_code)]
    label: String,
    contents: Vec<u8>,
}

/// Recording device used by tests and host applications without a GPU
#[derive(Default)]
pub struct HeadlessDevice {
    buffers: Mutex<SlotMap<BufferKey, BufferResource>>,
    textures: Mutex<SlotMap<TextureKey, TextureDescriptor>>,
    passes: Arc<Mutex<Vec<PassRecord>>>,
}

impl HeadlessDevice {
    /// Create an empty device
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all passes submitted since the last call
    pub fn take_passes(&self) -> Vec<PassRecord> {
        std::mem::take(&mut *self.passes.lock().unwrap())
    }

    /// Number of live buffers
    pub fn buffer_count(&self) -> usize {
        self.buffers.lock().unwrap().len()
    }

    /// Number of live textures
    pub fn texture_count(&self) -> usize {
        self.textures.lock().unwrap().len()
    }

    /// Current contents of a buffer, for assertions
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<Vec<u8>> {
        self.buffers
            .lock()
            .unwrap()
            .get(BufferKey::from(KeyData::from_ffi(buffer.0)))
            .map(|resource| resource.contents.clone())
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_buffer(&self, label: &str, contents: &[u8]) -> Result<BufferHandle, DeviceError> {
        let key = self.buffers.lock().unwrap().insert(BufferResource {
            label: label.to_string(),
            contents: contents.to_vec(),
        });
        Ok(BufferHandle(key.data().as_ffi()))
    }

    fn update_buffer(&self, buffer: BufferHandle, contents: &[u8]) -> Result<(), DeviceError> {
        let mut buffers = self.buffers.lock().unwrap();
        let resource = buffers
            .get_mut(BufferKey::from(KeyData::from_ffi(buffer.0)))
            .ok_or(DeviceError::InvalidHandle { kind: "buffer" })?;
        resource.contents = contents.to_vec();
        Ok(())
    }

    fn destroy_buffer(&self, buffer: BufferHandle) {
        self.buffers
            .lock()
            .unwrap()
            .remove(BufferKey::from(KeyData::from_ffi(buffer.0)));
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureHandle, DeviceError> {
        let key = self.textures.lock().unwrap().insert(descriptor.clone());
        Ok(TextureHandle(key.data().as_ffi()))
    }

    fn destroy_texture(&self, texture: TextureHandle) {
        self.textures
            .lock()
            .unwrap()
            .remove(TextureKey::from(KeyData::from_ffi(texture.0)));
    }

    fn begin_encoding(&self, pass: &PassDescriptor) -> Box<dyn RenderEncoder> {
        Box::new(HeadlessEncoder {
            record: PassRecord {
                label: pass.label.clone(),
                has_color: pass.color.is_some() || pass.clear_color.is_some(),
                commands: Vec::new(),
            },
            log: Arc::clone(&self.passes),
        })
    }

    fn submit(&self, encoder: Box<dyn RenderEncoder>) {
        // The encoder flushes its record into the shared log on drop.
        drop(encoder);
    }
}

struct HeadlessEncoder {
    record: PassRecord,
    log: Arc<Mutex<Vec<PassRecord>>>,
}

impl Drop for HeadlessEncoder {
    fn drop(&mut self) {
        let record = PassRecord {
            label: std::mem::take(&mut self.record.label),
            has_color: self.record.has_color,
            commands: std::mem::take(&mut self.record.commands),
        };
        self.log.lock().unwrap().push(record);
    }
}

impl RenderEncoder for HeadlessEncoder {
    fn set_pipeline(&mut self, pipeline: PipelineHandle) {
        self.record.commands.push(Command::SetPipeline(pipeline));
    }

    fn set_cull_mode(&mut self, mode: CullMode) {
        self.record.commands.push(Command::SetCullMode(mode));
    }

    fn set_winding(&mut self, winding: Winding) {
        self.record.commands.push(Command::SetWinding(winding));
    }

    fn set_fill_mode(&mut self, mode: FillMode) {
        self.record.commands.push(Command::SetFillMode(mode));
    }

    fn set_depth_bias(&mut self, bias: DepthBias) {
        self.record.commands.push(Command::SetDepthBias(bias));
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle) {
        self.record
            .commands
            .push(Command::SetVertexBuffer { slot, buffer });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle) {
        self.record.commands.push(Command::SetIndexBuffer(buffer));
    }

    fn set_uniform_buffer(&mut self, slot: u32, buffer: BufferHandle) {
        self.record
            .commands
            .push(Command::SetUniformBuffer { slot, buffer });
    }

    fn set_texture(&mut self, slot: u32, texture: TextureHandle) {
        self.record.commands.push(Command::SetTexture { slot, texture });
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        self.record.commands.push(Command::Draw {
            vertex_count,
            instance_count,
        });
    }

    fn draw_indexed(&mut self, index_count: u32, instance_count: u32) {
        self.record.commands.push(Command::DrawIndexed {
            index_count,
            instance_count,
        });
    }
}

/// Shader compiler that accepts everything except sources containing
/// `#error`, reflecting defines as the parameter schema
///
/// Tracks how many times it ran so cache tests can assert single-compile
/// behavior.
#[derive(Default)]
pub struct HeadlessCompiler {
    next_pipeline: AtomicU64,
    compile_count: AtomicU64,
}

impl HeadlessCompiler {
    /// Create a compiler
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of compile invocations
    pub fn compile_count(&self) -> u64 {
        self.compile_count.load(Ordering::Relaxed)
    }
}

impl ShaderCompiler for HeadlessCompiler {
    fn compile(
        &self,
        source: &str,
        config: &ShaderConfiguration,
    ) -> Result<CompiledShader, PipelineError> {
        self.compile_count.fetch_add(1, Ordering::Relaxed);

        if source.contains("#error") {
            return Err(PipelineError::Compilation {
                label: config.label.clone(),
                message: "source contains #error".to_string(),
            });
        }

        let pipeline = PipelineHandle(self.next_pipeline.fetch_add(1, Ordering::Relaxed) + 1);
        let schema = ParameterSchema {
            parameters: config
                .defines
                .iter()
                .map(|(name, _)| ShaderParameter {
                    name: name.clone(),
                    byte_size: 4,
                })
                .collect(),
        };

        Ok(CompiledShader { pipeline, schema })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_roundtrip() {
        let device = HeadlessDevice::new();
        let buffer = device.create_buffer("test", &[1, 2, 3]).unwrap();
        assert_eq!(device.buffer_contents(buffer), Some(vec![1, 2, 3]));

        device.update_buffer(buffer, &[9]).unwrap();
        assert_eq!(device.buffer_contents(buffer), Some(vec![9]));

        device.destroy_buffer(buffer);
        assert_eq!(device.buffer_count(), 0);
        assert!(device.update_buffer(buffer, &[0]).is_err());
    }

    #[test]
    fn submitted_passes_are_recorded() {
        let device = HeadlessDevice::new();
        let mut encoder = device.begin_encoding(&PassDescriptor {
            label: "main".to_string(),
            color: None,
            depth: None,
            clear_color: Some([0.0; 4]),
            clear_depth: Some(1.0),
        });
        encoder.draw(3, 1);
        device.submit(encoder);

        let passes = device.take_passes();
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].label, "main");
        assert_eq!(passes[0].draw_count(), 1);
        assert!(device.take_passes().is_empty());
    }

    #[test]
    fn compiler_rejects_error_sources() {
        let compiler = HeadlessCompiler::new();
        let config = crate::material::Material::new("bad", "#error nope").shader_config(false);
        assert!(compiler.compile("#error nope", &config).is_err());
        assert_eq!(compiler.compile_count(), 1);
    }
}
