//! Redundant state-change elimination
//!
//! Wraps a [`RenderEncoder`] and tracks the last value bound for every
//! stateful slot. Re-binding an identical value is a no-op, so the driver
//! only sees real changes. A fresh wrapper is created for every pass; state
//! never leaks across pass boundaries.

use std::collections::HashMap;

use super::device::{BufferHandle, PipelineHandle, RenderEncoder, TextureHandle};
use crate::material::{CullMode, DepthBias, FillMode, Winding};

/// State-diffing wrapper around a pass encoder
pub struct EncoderState<'a> {
    encoder: &'a mut dyn RenderEncoder,
    pipeline: Option<PipelineHandle>,
    cull_mode: Option<CullMode>,
    winding: Option<Winding>,
    fill_mode: Option<FillMode>,
    depth_bias: Option<DepthBias>,
    index_buffer: Option<BufferHandle>,
    vertex_buffers: HashMap<u32, BufferHandle>,
    uniform_buffers: HashMap<u32, BufferHandle>,
    textures: HashMap<u32, TextureHandle>,
}

impl<'a> EncoderState<'a> {
    /// Wrap an encoder at the start of a pass; nothing is considered bound
    pub fn new(encoder: &'a mut dyn RenderEncoder) -> Self {
        Self {
            encoder,
            pipeline: None,
            cull_mode: None,
            winding: None,
            fill_mode: None,
            depth_bias: None,
            index_buffer: None,
            vertex_buffers: HashMap::new(),
            uniform_buffers: HashMap::new(),
            textures: HashMap::new(),
        }
    }

    /// Bind a pipeline unless it is already bound
    pub fn set_pipeline(&mut self, pipeline: PipelineHandle) {
        if self.pipeline != Some(pipeline) {
            self.encoder.set_pipeline(pipeline);
            self.pipeline = Some(pipeline);
        }
    }

    /// Set the cull mode unless unchanged
    pub fn set_cull_mode(&mut self, mode: CullMode) {
        if self.cull_mode != Some(mode) {
            self.encoder.set_cull_mode(mode);
            self.cull_mode = Some(mode);
        }
    }

    /// Set the winding unless unchanged
    pub fn set_winding(&mut self, winding: Winding) {
        if self.winding != Some(winding) {
            self.encoder.set_winding(winding);
            self.winding = Some(winding);
        }
    }

    /// Set the fill mode unless unchanged
    pub fn set_fill_mode(&mut self, mode: FillMode) {
        if self.fill_mode != Some(mode) {
            self.encoder.set_fill_mode(mode);
            self.fill_mode = Some(mode);
        }
    }

    /// Set the depth bias unless unchanged
    pub fn set_depth_bias(&mut self, bias: DepthBias) {
        if self.depth_bias != Some(bias) {
            self.encoder.set_depth_bias(bias);
            self.depth_bias = Some(bias);
        }
    }

    /// Bind a vertex buffer to a slot unless the identical buffer is there
    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle) {
        if self.vertex_buffers.get(&slot) != Some(&buffer) {
            self.encoder.set_vertex_buffer(slot, buffer);
            self.vertex_buffers.insert(slot, buffer);
        }
    }

    /// Bind the index buffer unless unchanged
    pub fn set_index_buffer(&mut self, buffer: BufferHandle) {
        if self.index_buffer != Some(buffer) {
            self.encoder.set_index_buffer(buffer);
            self.index_buffer = Some(buffer);
        }
    }

    /// Bind a uniform buffer to a slot unless the identical buffer is there
    pub fn set_uniform_buffer(&mut self, slot: u32, buffer: BufferHandle) {
        if self.uniform_buffers.get(&slot) != Some(&buffer) {
            self.encoder.set_uniform_buffer(slot, buffer);
            self.uniform_buffers.insert(slot, buffer);
        }
    }

    /// Bind a texture to a slot unless the identical texture is there
    pub fn set_texture(&mut self, slot: u32, texture: TextureHandle) {
        if self.textures.get(&slot) != Some(&texture) {
            self.encoder.set_texture(slot, texture);
            self.textures.insert(slot, texture);
        }
    }

    /// Issue a non-indexed draw (never elided)
    pub fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        self.encoder.draw(vertex_count, instance_count);
    }

    /// Issue an indexed draw (never elided)
    pub fn draw_indexed(&mut self, index_count: u32, instance_count: u32) {
        self.encoder.draw_indexed(index_count, instance_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::device::{GraphicsDevice, PassDescriptor};
    use crate::render::headless::{Command, HeadlessDevice};

    fn pass() -> PassDescriptor {
        PassDescriptor {
            label: "test".to_string(),
            color: None,
            depth: None,
            clear_color: None,
            clear_depth: None,
        }
    }

    #[test]
    fn identical_rebinds_are_elided() {
        let device = HeadlessDevice::new();
        let buffer = device.create_buffer("vb", &[0]).unwrap();
        let mut encoder = device.begin_encoding(&pass());

        {
            let mut state = EncoderState::new(encoder.as_mut());
            state.set_pipeline(PipelineHandle(7));
            state.set_pipeline(PipelineHandle(7));
            state.set_vertex_buffer(0, buffer);
            state.set_vertex_buffer(0, buffer);
            state.set_cull_mode(CullMode::Back);
            state.set_cull_mode(CullMode::Back);
            state.draw(3, 1);
            state.draw(3, 1);
        }
        device.submit(encoder);

        let passes = device.take_passes();
        let record = &passes[0];
        assert_eq!(
            record.count(|c| matches!(c, Command::SetPipeline(_))),
            1,
            "second pipeline bind must be skipped"
        );
        assert_eq!(
            record.count(|c| matches!(c, Command::SetVertexBuffer { .. })),
            1
        );
        assert_eq!(record.count(|c| matches!(c, Command::SetCullMode(_))), 1);
        // Draws are always issued.
        assert_eq!(record.draw_count(), 2);
    }

    #[test]
    fn changed_values_are_rebound() {
        let device = HeadlessDevice::new();
        let mut encoder = device.begin_encoding(&pass());

        {
            let mut state = EncoderState::new(encoder.as_mut());
            state.set_pipeline(PipelineHandle(1));
            state.set_pipeline(PipelineHandle(2));
            state.set_pipeline(PipelineHandle(1));
        }
        device.submit(encoder);

        let passes = device.take_passes();
        assert_eq!(passes[0].count(|c| matches!(c, Command::SetPipeline(_))), 3);
    }

    #[test]
    fn state_does_not_leak_across_passes() {
        let device = HeadlessDevice::new();

        for _ in 0..2 {
            let mut encoder = device.begin_encoding(&pass());
            {
                let mut state = EncoderState::new(encoder.as_mut());
                state.set_pipeline(PipelineHandle(7));
            }
            device.submit(encoder);
        }

        // A fresh EncoderState per pass re-binds even identical values.
        let passes = device.take_passes();
        assert_eq!(passes[0].count(|c| matches!(c, Command::SetPipeline(_))), 1);
        assert_eq!(passes[1].count(|c| matches!(c, Command::SetPipeline(_))), 1);
    }
}
