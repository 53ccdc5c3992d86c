//! Math utilities and types
//!
//! Provides fundamental math types for 3D graphics built on nalgebra.

use serde::{Deserialize, Serialize};

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and scale
///
/// Matrix composition is always translation * rotation * scale, so scale is
/// applied first and translation last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform with position and rotation
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    /// Convert to a transformation matrix (TRS order)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Create a transform from a transformation matrix (decompose TRS)
    pub fn from_matrix(matrix: Mat4) -> Self {
        let position = Vec3::new(matrix.m14, matrix.m24, matrix.m34);

        let scale_x = Vec3::new(matrix.m11, matrix.m21, matrix.m31).magnitude();
        let scale_y = Vec3::new(matrix.m12, matrix.m22, matrix.m32).magnitude();
        let scale_z = Vec3::new(matrix.m13, matrix.m23, matrix.m33).magnitude();
        let scale = Vec3::new(scale_x, scale_y, scale_z);

        let rotation_matrix = Matrix3::new(
            matrix.m11 / scale_x,
            matrix.m12 / scale_y,
            matrix.m13 / scale_z,
            matrix.m21 / scale_x,
            matrix.m22 / scale_y,
            matrix.m23 / scale_z,
            matrix.m31 / scale_x,
            matrix.m32 / scale_y,
            matrix.m33 / scale_z,
        );
        let rotation = Quat::from_matrix(&rotation_matrix);

        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Combine this transform with a child transform
    pub fn combine(&self, other: &Transform) -> Transform {
        Transform {
            position: self.position + self.rotation * self.scale.component_mul(&other.position),
            rotation: self.rotation * other.rotation,
            scale: self.scale.component_mul(&other.scale),
        }
    }

    /// Get the inverse transform
    pub fn inverse(&self) -> Transform {
        let inv_scale = Vec3::new(1.0 / self.scale.x, 1.0 / self.scale.y, 1.0 / self.scale.z);
        let inv_rotation = self.rotation.inverse();
        let inv_position = inv_rotation * (-self.position.component_mul(&inv_scale));

        Transform {
            position: inv_position,
            rotation: inv_rotation,
            scale: inv_scale,
        }
    }
}

/// Inverse-transpose of the upper 3x3 of a world matrix
///
/// Falls back to the plain upper 3x3 when the matrix is singular
/// (degenerate zero scale), so normals stay finite.
pub fn normal_matrix(world: &Mat4) -> Mat3 {
    let upper = world.fixed_view::<3, 3>(0, 0).into_owned();
    upper
        .try_inverse()
        .map_or(upper, |inverse| inverse.transpose())
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Pi / 2
    pub const HALF_PI: f32 = PI * 0.5;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;

    /// Radians to degrees conversion factor
    pub const RAD_TO_DEG: f32 = 180.0 / PI;
}

/// Math utility functions
pub mod utils {
    use super::constants;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }

    /// Convert radians to degrees
    pub fn rad_to_deg(radians: f32) -> f32 {
        radians * constants::RAD_TO_DEG
    }
}

/// Extension trait for Mat4 with graphics convenience methods
pub trait Mat4Ext {
    /// Create a perspective projection matrix mapping depth to [0, 1]
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Create an orthographic projection matrix mapping depth to [0, 1]
    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4;

    /// Create a right-handed look-at view matrix
    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let tan_half_fovy = (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = far / (near - far);
        result[(2, 3)] = (near * far) / (near - far);
        result[(3, 2)] = -1.0;
        result
    }

    fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
        let mut result = Mat4::identity();
        result[(0, 0)] = 2.0 / (right - left);
        result[(1, 1)] = 2.0 / (top - bottom);
        result[(2, 2)] = 1.0 / (near - far);
        result[(0, 3)] = -(right + left) / (right - left);
        result[(1, 3)] = -(top + bottom) / (top - bottom);
        result[(2, 3)] = near / (near - far);
        result
    }

    fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let forward = (target - eye).normalize();
        let right = forward.cross(&up).normalize();
        let camera_up = right.cross(&forward);

        let translation = Mat4::new_translation(&(-eye));
        let rotation = Mat4::new(
            right.x, right.y, right.z, 0.0, //
            camera_up.x, camera_up.y, camera_up.z, 0.0, //
            -forward.x, -forward.y, -forward.z, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        );

        rotation * translation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn transform_matrix_is_trs_order() {
        let transform = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_axis_angle(&Vec3::y_axis(), constants::HALF_PI),
            scale: Vec3::new(2.0, 2.0, 2.0),
        };

        // Scale first, then rotate, then translate: local +X ends up at -Z * 2.
        let matrix = transform.to_matrix();
        let transformed = matrix.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(transformed, Point3::new(1.0, 2.0, 1.0), epsilon = EPSILON);
    }

    #[test]
    fn transform_matrix_roundtrip() {
        let original = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_axis_angle(&Unit::new_normalize(Vec3::new(1.0, 1.0, 1.0)), 0.5),
            scale: Vec3::new(2.0, 1.5, 0.8),
        };

        let reconstructed = Transform::from_matrix(original.to_matrix());
        assert_relative_eq!(reconstructed.position, original.position, epsilon = EPSILON);
        assert_relative_eq!(reconstructed.scale, original.scale, epsilon = EPSILON);

        // Quaternions may flip sign while representing the same rotation.
        let dot = original.rotation.coords.dot(&reconstructed.rotation.coords);
        assert!(dot.abs() > 0.999, "rotation mismatch, dot = {dot}");
    }

    #[test]
    fn transform_inverse_combines_to_identity() {
        let transform = Transform {
            position: Vec3::new(2.0, 3.0, 1.0),
            rotation: Quat::from_axis_angle(&Vec3::y_axis(), 0.785),
            scale: Vec3::new(2.0, 2.0, 2.0),
        };

        let identity = transform.combine(&transform.inverse());
        assert_relative_eq!(identity.position, Vec3::zeros(), epsilon = EPSILON);
        assert_relative_eq!(identity.scale, Vec3::new(1.0, 1.0, 1.0), epsilon = EPSILON);
    }

    #[test]
    fn transform_serde_roundtrip_preserves_matrix() {
        let original = Transform {
            position: Vec3::new(-0.7, 1.0, 0.3),
            rotation: Quat::from_axis_angle(&Vec3::x_axis(), 1.2),
            scale: Vec3::new(1.0, 2.0, 3.0),
        };

        let text = ron::to_string(&original).unwrap();
        let decoded: Transform = ron::from_str(&text).unwrap();

        assert_relative_eq!(
            decoded.to_matrix(),
            original.to_matrix(),
            epsilon = f32::EPSILON
        );
    }

    #[test]
    fn normal_matrix_undoes_nonuniform_scale() {
        let world = Transform {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(2.0, 1.0, 1.0),
        }
        .to_matrix();

        // A plane normal must be rescaled, not stretched with the surface.
        let n = normal_matrix(&world) * Vec3::new(1.0, 0.0, 0.0);
        assert_relative_eq!(n.normalize(), Vec3::new(1.0, 0.0, 0.0), epsilon = EPSILON);
        assert_relative_eq!(n.x, 0.5, epsilon = EPSILON);
    }
}
