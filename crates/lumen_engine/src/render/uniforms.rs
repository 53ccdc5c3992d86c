//! GPU uniform blocks and per-frame ring buffering
//!
//! Uniform structs are `repr(C)` plain-old-data, converted to bytes with
//! bytemuck. A [`UniformRing`] holds one buffer per frame in flight so the
//! CPU never overwrites uniforms the GPU is still reading.

use bytemuck::{Pod, Zeroable};

use super::device::{BufferHandle, DeviceError, GraphicsDevice};
use crate::foundation::math::{normal_matrix, Mat4};

/// Column-major 4x4 matrix as shaders consume it
pub type GpuMat4 = [[f32; 4]; 4];

/// Repack a matrix into the column-major array layout
pub fn mat4_to_gpu(matrix: &Mat4) -> GpuMat4 {
    let mut out = [[0.0; 4]; 4];
    for (column, values) in out.iter_mut().enumerate() {
        for (row, value) in values.iter_mut().enumerate() {
            *value = matrix[(row, column)];
        }
    }
    out
}

/// Per-object uniform block uploaded before every draw
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectUniforms {
    /// World matrix
    pub model: GpuMat4,
    /// Camera view matrix
    pub view: GpuMat4,
    /// Camera projection matrix
    pub projection: GpuMat4,
    /// Premultiplied projection * view * model
    pub model_view_projection: GpuMat4,
    /// Inverse-transpose of the world's upper 3x3, padded to vec4 columns
    pub normal: [[f32; 4]; 3],
}

impl ObjectUniforms {
    /// Assemble the block from world and camera matrices
    pub fn new(model: &Mat4, view: &Mat4, projection: &Mat4) -> Self {
        let normal3 = normal_matrix(model);
        let mut normal = [[0.0; 4]; 3];
        for (column, values) in normal.iter_mut().enumerate() {
            for (row, value) in values.iter_mut().take(3).enumerate() {
                *value = normal3[(row, column)];
            }
        }
        Self {
            model: mat4_to_gpu(model),
            view: mat4_to_gpu(view),
            projection: mat4_to_gpu(projection),
            model_view_projection: mat4_to_gpu(&(projection * view * model)),
            normal,
        }
    }
}

/// One light's worth of uniform data
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct LightUniforms {
    /// World position; w = 1 for point lights, 0 for directional
    pub position: [f32; 4],
    /// Direction toward the scene, normalized; w unused
    pub direction: [f32; 4],
    /// Linear RGB color; w carries the intensity
    pub color: [f32; 4],
    /// Matrix mapping world space into this light's shadow map
    pub shadow_matrix: GpuMat4,
    /// x = shadow map index or -1, remaining components unused
    pub params: [f32; 4],
}

/// A fixed-depth ring of device buffers, one slot per frame in flight
///
/// The slot for a frame is the frame counter modulo the ring depth, so a
/// buffer is only rewritten once the GPU is guaranteed done with it.
pub struct UniformRing {
    buffers: Vec<BufferHandle>,
    byte_len: usize,
}

impl UniformRing {
    /// Allocate `frames_in_flight` zeroed buffers of `byte_len` bytes
    pub fn new(
        device: &dyn GraphicsDevice,
        label: &str,
        byte_len: usize,
        frames_in_flight: u32,
    ) -> Result<Self, DeviceError> {
        let zeroed = vec![0u8; byte_len];
        let buffers = (0..frames_in_flight.max(1))
            .map(|slot| device.create_buffer(&format!("{label}[{slot}]"), &zeroed))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { buffers, byte_len })
    }

    /// The buffer backing the given frame
    pub fn buffer(&self, frame: u64) -> BufferHandle {
        self.buffers[(frame % self.buffers.len() as u64) as usize]
    }

    /// Write bytes into the slot for the given frame
    pub fn write(
        &self,
        device: &dyn GraphicsDevice,
        frame: u64,
        bytes: &[u8],
    ) -> Result<(), DeviceError> {
        device.update_buffer(self.buffer(frame), bytes)
    }

    /// Size each slot was allocated with
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Release all slots
    pub fn destroy(&self, device: &dyn GraphicsDevice) {
        for buffer in &self.buffers {
            device.destroy_buffer(*buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Transform, Vec3};
    use crate::render::headless::HeadlessDevice;
    use approx::assert_relative_eq;

    #[test]
    fn gpu_matrices_are_column_major() {
        let translation = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let gpu = mat4_to_gpu(&translation);
        // The translation lives in the last column.
        assert_eq!(gpu[3][0], 1.0);
        assert_eq!(gpu[3][1], 2.0);
        assert_eq!(gpu[3][2], 3.0);
        assert_eq!(gpu[0][3], 0.0);
    }

    #[test]
    fn object_uniforms_premultiply_mvp() {
        let model = Transform::from_position(Vec3::new(0.0, 1.0, 0.0)).to_matrix();
        let view = Mat4::new_translation(&Vec3::new(0.0, 0.0, -5.0));
        let projection = Mat4::identity();

        let uniforms = ObjectUniforms::new(&model, &view, &projection);
        let expected = mat4_to_gpu(&(projection * view * model));
        for column in 0..4 {
            for row in 0..4 {
                assert_relative_eq!(
                    uniforms.model_view_projection[column][row],
                    expected[column][row]
                );
            }
        }
    }

    #[test]
    fn ring_slots_repeat_modulo_depth() {
        let device = HeadlessDevice::new();
        let ring = UniformRing::new(&device, "object", 64, 3).unwrap();

        assert_eq!(ring.buffer(0), ring.buffer(3));
        assert_eq!(ring.buffer(1), ring.buffer(4));
        assert_ne!(ring.buffer(0), ring.buffer(1));
        assert_eq!(device.buffer_count(), 3);

        ring.destroy(&device);
        assert_eq!(device.buffer_count(), 0);
    }

    #[test]
    fn writes_land_in_the_frame_slot() {
        let device = HeadlessDevice::new();
        let ring = UniformRing::new(&device, "object", 4, 2).unwrap();

        ring.write(&device, 0, &[1, 1, 1, 1]).unwrap();
        ring.write(&device, 1, &[2, 2, 2, 2]).unwrap();
        // Frame 2 reuses slot 0.
        ring.write(&device, 2, &[3, 3, 3, 3]).unwrap();

        assert_eq!(device.buffer_contents(ring.buffer(0)), Some(vec![3; 4]));
        assert_eq!(device.buffer_contents(ring.buffer(1)), Some(vec![2; 4]));
    }
}
