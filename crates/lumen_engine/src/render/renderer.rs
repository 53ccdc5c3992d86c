//! Frame composition
//!
//! One frame is three kinds of pass, in order: a depth-only shadow pass per
//! shadow-casting light (up to the configured maximum), the main color+depth
//! pass, and an optional post-process pass drawing a fullscreen triangle
//! that samples the main color target. Per-object problems (failed pipeline,
//! missing resources) skip that renderable; the frame keeps going.

use std::sync::Arc;

use log::{debug, error, trace, warn};
use thiserror::Error;

use super::device::{
    BufferHandle, DeviceError, GraphicsDevice, PassDescriptor, ShaderCompiler,
};
use super::encoder_state::EncoderState;
use super::list::RenderList;
use super::pipeline::PipelineCache;
use super::target::RenderTarget;
use super::uniforms::{mat4_to_gpu, GpuMat4, LightUniforms, ObjectUniforms, UniformRing};
use crate::config::{ConfigError, RendererSettings};
use crate::foundation::math::{Mat4, Vec3};
use crate::geometry::{Geometry, VertexLayout};
use crate::material::{Material, ShaderFeatures};
use crate::scene::camera::Camera;
use crate::scene::light::Light;
use crate::scene::node::NodeRef;

/// Uniform slot for the per-object block
pub const UNIFORM_SLOT_OBJECT: u32 = 0;
/// Uniform slot for the light array
pub const UNIFORM_SLOT_LIGHTS: u32 = 1;
/// Uniform slot for the material's own block
pub const UNIFORM_SLOT_MATERIAL: u32 = 2;

/// Errors surfaced by the renderer
#[derive(Debug, Error)]
pub enum RenderError {
    /// The graphics device failed
    #[error(transparent)]
    Device(#[from] DeviceError),
    /// The renderer settings were invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Shared state every render collaborator needs: the device, the pipeline
/// cache and the validated settings
pub struct RenderContext {
    /// Graphics device collaborator
    pub device: Arc<dyn GraphicsDevice>,
    /// Compiled pipeline cache, keyed by shader configuration
    pub pipelines: PipelineCache,
    /// Validated renderer settings
    pub settings: RendererSettings,
}

impl RenderContext {
    /// Build a context; invalid settings are a hard error
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        compiler: Arc<dyn ShaderCompiler>,
        settings: RendererSettings,
    ) -> Result<Arc<Self>, RenderError> {
        settings.validate()?;
        Ok(Arc::new(Self {
            device,
            pipelines: PipelineCache::new(compiler),
            settings,
        }))
    }
}

/// Device resources backing one renderable
pub struct GpuGeometry {
    /// Vertex buffers in the material layout's slot order
    pub vertex_buffers: Vec<BufferHandle>,
    /// Index buffer, when the geometry is indexed
    pub index_buffer: Option<BufferHandle>,
    /// Indices per instance
    pub index_count: u32,
    /// Vertices per instance, for non-indexed draws
    pub vertex_count: u32,
    /// Per-instance matrix buffer, instanced renderables only
    pub instance_buffer: Option<BufferHandle>,
    /// Instances the instance buffer can hold
    pub instance_capacity: u32,
    /// Material uniform block, when the material carries one
    pub material_buffer: Option<BufferHandle>,
    /// Ring of per-object uniform buffers, one per frame in flight
    pub uniforms: UniformRing,
}

impl GpuGeometry {
    /// Create device buffers for a geometry under a material's layout
    pub fn upload(
        context: &RenderContext,
        geometry: &Geometry,
        layout: &VertexLayout,
        instance_count: u32,
        instanced: bool,
        material_bytes: &[u8],
    ) -> Result<Self, DeviceError> {
        let device = context.device.as_ref();

        let mut vertex_buffers = Vec::with_capacity(layout.attributes.len());
        for name in &layout.attributes {
            let Some(attribute) = geometry.attribute(name) else {
                continue;
            };
            vertex_buffers.push(
                device.create_buffer(&format!("{name:?}"), bytemuck::cast_slice(&attribute.data))?,
            );
        }

        let (index_buffer, index_count) = match geometry.indices() {
            Some(indices) => (
                Some(device.create_buffer("indices", bytemuck::cast_slice(indices))?),
                indices.len() as u32,
            ),
            None => (None, 0),
        };

        let instance_buffer = if instanced {
            let zeroed = vec![0u8; instance_count as usize * std::mem::size_of::<GpuMat4>()];
            Some(device.create_buffer("instances", &zeroed)?)
        } else {
            None
        };

        let material_buffer = if material_bytes.is_empty() {
            None
        } else {
            Some(device.create_buffer("material uniforms", material_bytes)?)
        };

        let uniforms = UniformRing::new(
            device,
            "object uniforms",
            std::mem::size_of::<ObjectUniforms>(),
            context.settings.frames_in_flight,
        )?;

        Ok(Self {
            vertex_buffers,
            index_buffer,
            index_count,
            vertex_count: geometry.vertex_count() as u32,
            instance_buffer,
            instance_capacity: if instanced { instance_count } else { 0 },
            material_buffer,
            uniforms,
        })
    }

    /// Release every buffer
    pub fn destroy(&self, device: &dyn GraphicsDevice) {
        for buffer in &self.vertex_buffers {
            device.destroy_buffer(*buffer);
        }
        if let Some(buffer) = self.index_buffer {
            device.destroy_buffer(buffer);
        }
        if let Some(buffer) = self.instance_buffer {
            device.destroy_buffer(buffer);
        }
        if let Some(buffer) = self.material_buffer {
            device.destroy_buffer(buffer);
        }
        self.uniforms.destroy(device);
    }
}

/// Multi-pass frame renderer
pub struct Renderer {
    context: Arc<RenderContext>,
    main_target: RenderTarget,
    shadow_targets: Vec<RenderTarget>,
    lights_ring: UniformRing,
    post_material: Option<Material>,
    frame: u64,
    torn_down: bool,
}

impl Renderer {
    /// Create a renderer with a main target of the given extent
    pub fn new(context: Arc<RenderContext>, width: u32, height: u32) -> Result<Self, RenderError> {
        let device = context.device.as_ref();
        let main_target = RenderTarget::new(
            device,
            "main",
            width,
            height,
            context.settings.sample_count,
            true,
            true,
        )?;
        let lights_ring = UniformRing::new(
            device,
            "lights",
            context.settings.max_lights as usize * std::mem::size_of::<LightUniforms>(),
            context.settings.frames_in_flight,
        )?;
        Ok(Self {
            context,
            main_target,
            shadow_targets: Vec::new(),
            lights_ring,
            post_material: None,
            frame: 0,
            torn_down: false,
        })
    }

    /// The shared render context
    pub fn context(&self) -> &Arc<RenderContext> {
        &self.context
    }

    /// Frames rendered so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// The main pass color target, for hosts that present it themselves
    pub fn main_target(&self) -> &RenderTarget {
        &self.main_target
    }

    /// Install or remove the post-process material
    ///
    /// When set, a final pass draws one fullscreen triangle with this
    /// material, sampling the main color target at texture slot 0.
    pub fn set_post_material(&mut self, material: Option<Material>) {
        self.post_material = material;
    }

    /// Resize the main target; completes before returning, so the next
    /// `render` call encodes at the new extent
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if self.torn_down {
            warn!("resize called after teardown");
            return Ok(());
        }
        let context = Arc::clone(&self.context);
        if self.main_target.resize(context.device.as_ref(), width, height)? {
            debug!("main target resized to {width}x{height}");
        }
        Ok(())
    }

    /// Encode and submit one frame
    pub fn render(&mut self, roots: &[NodeRef], camera: &Camera) -> Result<(), RenderError> {
        if self.torn_down {
            warn!("render called after teardown");
            return Ok(());
        }
        let context = Arc::clone(&self.context);
        let device = context.device.as_ref();
        let frame = self.frame;
        let settings = &context.settings;

        let list = RenderList::gather(roots);
        trace!("frame {frame}: {} drawables", list.len());

        // Lights and their shadow map slots.
        let lights = gather_lights(roots, settings.max_lights as usize);
        let shadow_lights: Vec<(Light, Mat4)> = lights
            .iter()
            .filter(|(light, _)| light.cast_shadow)
            .take(settings.max_shadow_maps as usize)
            .copied()
            .collect();
        self.upload_lights(&lights, &shadow_lights, frame)?;
        let lights_buffer = self.lights_ring.buffer(frame);

        // Per-renderable uploads: GPU resources, instance matrices, object
        // uniforms for the main camera.
        let view = camera.view_matrix();
        let projection = camera.projection_matrix();
        for node in list.nodes() {
            let world = node.world_matrix();
            let result = node.with_renderable(|renderable| {
                prepare_renderable(&context, renderable, &world, &view, &projection, frame)
            });
            if let Some(Err(err)) = result {
                error!("skipping '{}': {err}", node.label());
            }
        }

        // Shadow passes, one depth-only pass per casting light. Each light's
        // shadow matrix reaches the vertex stage through the light uniform
        // array uploaded above.
        for slot in 0..shadow_lights.len() {
            if self.shadow_targets.len() <= slot {
                self.shadow_targets.push(RenderTarget::shadow_map(
                    device,
                    format!("shadow {slot}"),
                    settings.shadow_map_size,
                )?);
            }
            let depth = self.shadow_targets[slot].depth();

            let mut encoder = device.begin_encoding(&PassDescriptor {
                label: format!("shadow {slot}"),
                color: None,
                depth,
                clear_color: None,
                clear_depth: Some(settings.clear_depth),
            });
            {
                let mut state = EncoderState::new(encoder.as_mut());
                for node in list.shadow_casters() {
                    node.with_renderable(|renderable| {
                        encode_renderable(
                            &context,
                            &mut state,
                            renderable,
                            lights_buffer,
                            frame,
                            PassKind::Shadow,
                        );
                    });
                }
            }
            device.submit(encoder);
        }

        // Main pass.
        {
            let mut encoder = device.begin_encoding(&PassDescriptor {
                label: "main".to_string(),
                color: self.main_target.color(),
                depth: self.main_target.depth(),
                clear_color: Some(settings.clear_color),
                clear_depth: Some(settings.clear_depth),
            });
            {
                let mut state = EncoderState::new(encoder.as_mut());
                for (slot, target) in self.shadow_targets.iter().enumerate().take(shadow_lights.len())
                {
                    if let Some(depth) = target.depth() {
                        state.set_texture(slot as u32, depth);
                    }
                }
                for node in list.nodes() {
                    node.with_renderable(|renderable| {
                        encode_renderable(
                            &context,
                            &mut state,
                            renderable,
                            lights_buffer,
                            frame,
                            PassKind::Main {
                                shadow_count: shadow_lights.len() as u32,
                            },
                        );
                    });
                }
            }
            device.submit(encoder);
        }

        // Post-process pass, sampling the main color target.
        if let Some(post) = &self.post_material {
            let mut encoder = device.begin_encoding(&PassDescriptor {
                label: "post".to_string(),
                color: None,
                depth: None,
                clear_color: Some(settings.clear_color),
                clear_depth: None,
            });
            {
                let mut state = EncoderState::new(encoder.as_mut());
                let config = post.shader_config(false);
                if let Some(pipeline) = context.pipelines.get_or_compile(&post.source, &config) {
                    state.set_pipeline(pipeline);
                    if let Some(color) = self.main_target.color() {
                        state.set_texture(0, color);
                    }
                    state.draw(3, 1);
                }
            }
            device.submit(encoder);
        }

        self.frame += 1;
        Ok(())
    }

    fn upload_lights(
        &self,
        lights: &[(Light, Mat4)],
        shadow_lights: &[(Light, Mat4)],
        frame: u64,
    ) -> Result<(), RenderError> {
        let settings = &self.context.settings;
        let mut data = vec![LightUniforms::default(); settings.max_lights as usize];
        let mut shadow_slot = 0u32;
        for (uniform, (light, world)) in data.iter_mut().zip(lights) {
            let position = Vec3::new(world.m14, world.m24, world.m34);
            let w = match light.light_type {
                crate::scene::light::LightType::Directional => 0.0,
                crate::scene::light::LightType::Point => 1.0,
            };
            let direction = Light::direction(world);
            uniform.position = [position.x, position.y, position.z, w];
            uniform.direction = [direction.x, direction.y, direction.z, 0.0];
            uniform.color = [light.color[0], light.color[1], light.color[2], light.intensity];
            if light.cast_shadow && (shadow_slot as usize) < shadow_lights.len() {
                uniform.shadow_matrix = mat4_to_gpu(&light.shadow_matrix(world));
                uniform.params = [shadow_slot as f32, 0.0, 0.0, 0.0];
                shadow_slot += 1;
            } else {
                uniform.shadow_matrix = mat4_to_gpu(&Mat4::identity());
                uniform.params = [-1.0, 0.0, 0.0, 0.0];
            }
        }
        self.lights_ring
            .write(self.context.device.as_ref(), frame, bytemuck::cast_slice(&data))?;
        Ok(())
    }

    /// Release renderer-owned GPU resources; safe to call more than once
    ///
    /// Node resources are released separately through `Node::cleanup`.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        let device = self.context.device.as_ref();
        self.main_target.release(device);
        for target in &mut self.shadow_targets {
            target.release(device);
        }
        self.lights_ring.destroy(device);
        self.torn_down = true;
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.teardown();
    }
}

enum PassKind {
    Shadow,
    Main { shadow_count: u32 },
}

fn gather_lights(roots: &[NodeRef], max_lights: usize) -> Vec<(Light, Mat4)> {
    let mut lights = Vec::new();
    for root in roots {
        root.visit_visible(&mut |node| {
            if lights.len() >= max_lights {
                return;
            }
            if let Some(light) = node.light() {
                lights.push((light, node.world_matrix()));
            }
        });
    }
    lights
}

fn prepare_renderable(
    context: &RenderContext,
    renderable: &mut crate::scene::node::Renderable,
    world: &Mat4,
    view: &Mat4,
    projection: &Mat4,
    frame: u64,
) -> Result<(), RenderError> {
    renderable.ensure_uploaded(context)?;

    let device = context.device.as_ref();
    let instanced = renderable.is_instanced();
    let instance_count = renderable.instance_count();
    let matrices: Vec<GpuMat4> = renderable
        .instance_transforms
        .iter()
        .map(mat4_to_gpu)
        .collect();
    let material_bytes = renderable.material.uniforms.clone();

    let Some(gpu) = renderable.gpu.as_mut() else {
        return Ok(());
    };

    if instanced {
        if instance_count > gpu.instance_capacity {
            if let Some(old) = gpu.instance_buffer.take() {
                device.destroy_buffer(old);
            }
            gpu.instance_buffer =
                Some(device.create_buffer("instances", bytemuck::cast_slice(&matrices))?);
            gpu.instance_capacity = instance_count;
        } else if let Some(buffer) = gpu.instance_buffer {
            device.update_buffer(buffer, bytemuck::cast_slice(&matrices))?;
        }
    }

    let uniforms = ObjectUniforms::new(world, view, projection);
    gpu.uniforms
        .write(device, frame, bytemuck::bytes_of(&uniforms))?;

    if let Some(buffer) = gpu.material_buffer {
        device.update_buffer(buffer, &material_bytes)?;
    }
    Ok(())
}

fn encode_renderable(
    context: &RenderContext,
    state: &mut EncoderState<'_>,
    renderable: &crate::scene::node::Renderable,
    lights_buffer: BufferHandle,
    frame: u64,
    pass: PassKind,
) {
    let Some(gpu) = renderable.gpu.as_ref() else {
        return;
    };

    let mut config = renderable.material.shader_config(renderable.is_instanced());
    match pass {
        PassKind::Shadow => config = config.shadow_variant(),
        PassKind::Main { shadow_count } => {
            if renderable.receive_shadow && shadow_count > 0 {
                config.features |= ShaderFeatures::SHADOWS;
            }
        }
    }
    let Some(pipeline) = context
        .pipelines
        .get_or_compile(&renderable.material.source, &config)
    else {
        // The cache logged the compile failure once already.
        return;
    };

    state.set_pipeline(pipeline);
    state.set_cull_mode(renderable.cull_mode);
    state.set_winding(renderable.winding);
    state.set_fill_mode(renderable.fill_mode);
    if let Some(bias) = renderable.material.depth_bias {
        state.set_depth_bias(bias);
    }

    for (slot, buffer) in gpu.vertex_buffers.iter().enumerate() {
        state.set_vertex_buffer(slot as u32, *buffer);
    }
    if let Some(instances) = gpu.instance_buffer {
        state.set_vertex_buffer(gpu.vertex_buffers.len() as u32, instances);
    }

    state.set_uniform_buffer(UNIFORM_SLOT_OBJECT, gpu.uniforms.buffer(frame));
    state.set_uniform_buffer(UNIFORM_SLOT_LIGHTS, lights_buffer);
    if let Some(material_buffer) = gpu.material_buffer {
        state.set_uniform_buffer(UNIFORM_SLOT_MATERIAL, material_buffer);
    }

    let instance_count = renderable.instance_count();
    if let Some(index_buffer) = gpu.index_buffer {
        state.set_index_buffer(index_buffer);
        state.draw_indexed(gpu.index_count, instance_count);
    } else {
        state.draw(gpu.vertex_count, instance_count);
    }
}
