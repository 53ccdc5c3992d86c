//! Light capability
//!
//! A light is a capability record attached to a node rather than a node
//! subclass. The node's world transform supplies the light's position and
//! direction; the record carries the photometric parameters and the shadow
//! projection used by the shadow pass.

use serde::{Deserialize, Serialize};

use crate::foundation::math::{Mat4, Mat4Ext, Vec3};

/// Kind of light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LightType {
    /// Parallel rays along the node's -Z axis
    #[default]
    Directional,
    /// Omnidirectional from the node's position
    Point,
}

/// Light parameters attached to a node
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Light {
    /// Kind of light
    pub light_type: LightType,
    /// Linear RGB color
    pub color: [f32; 3],
    /// Scalar intensity multiplied into the color
    pub intensity: f32,
    /// Whether this light renders a shadow map
    pub cast_shadow: bool,
    /// Half-extent of the directional shadow's orthographic volume
    pub shadow_extent: f32,
    /// Near plane of the shadow projection
    pub shadow_near: f32,
    /// Far plane of the shadow projection
    pub shadow_far: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            light_type: LightType::Directional,
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
            cast_shadow: false,
            shadow_extent: 10.0,
            shadow_near: 0.1,
            shadow_far: 100.0,
        }
    }
}

impl Light {
    /// Directional light with the given color and intensity
    pub fn directional(color: [f32; 3], intensity: f32) -> Self {
        Self {
            color,
            intensity,
            ..Self::default()
        }
    }

    /// Point light with the given color and intensity
    pub fn point(color: [f32; 3], intensity: f32) -> Self {
        Self {
            light_type: LightType::Point,
            color,
            intensity,
            ..Self::default()
        }
    }

    /// World direction the light shines toward, from the node's world matrix
    ///
    /// Lights shine along their node's local -Z axis.
    pub fn direction(world: &Mat4) -> Vec3 {
        let forward = world.fixed_view::<3, 3>(0, 0) * Vec3::new(0.0, 0.0, -1.0);
        forward.normalize()
    }

    /// View-projection matrix mapping world space into this light's shadow map
    pub fn shadow_matrix(&self, world: &Mat4) -> Mat4 {
        let position = Vec3::new(world.m14, world.m24, world.m34);
        let direction = Self::direction(world);
        let up = if direction.y.abs() > 0.99 {
            Vec3::x()
        } else {
            Vec3::y()
        };
        let view = Mat4::look_at(position, position + direction, up);
        let projection = match self.light_type {
            LightType::Directional => Mat4::orthographic(
                -self.shadow_extent,
                self.shadow_extent,
                -self.shadow_extent,
                self.shadow_extent,
                self.shadow_near,
                self.shadow_far,
            ),
            LightType::Point => Mat4::perspective(
                crate::foundation::math::constants::HALF_PI,
                1.0,
                self.shadow_near,
                self.shadow_far,
            ),
        };
        projection * view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Quat, Transform};
    use approx::assert_relative_eq;

    #[test]
    fn default_direction_is_negative_z() {
        let world = Mat4::identity();
        assert_relative_eq!(
            Light::direction(&world),
            Vec3::new(0.0, 0.0, -1.0),
            epsilon = 1e-6
        );
    }

    #[test]
    fn direction_follows_node_rotation() {
        let world = Transform {
            position: Vec3::zeros(),
            rotation: Quat::from_axis_angle(
                &Vec3::x_axis(),
                crate::foundation::math::constants::HALF_PI,
            ),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
        .to_matrix();

        // Rotating -Z by +90 degrees about X points the light up +Y.
        assert_relative_eq!(
            Light::direction(&world),
            Vec3::new(0.0, 1.0, 0.0),
            epsilon = 1e-5
        );
    }

    #[test]
    fn shadow_matrix_centers_on_the_light() {
        let light = Light::directional([1.0, 1.0, 1.0], 1.0);
        let world = Transform::from_position(Vec3::new(0.0, 5.0, 0.0)).to_matrix();
        let matrix = light.shadow_matrix(&world);

        // A point straight ahead of the light projects to the map center.
        let position = Vec3::new(world.m14, world.m24, world.m34);
        let ahead = position + Light::direction(&world) * 1.0;
        let projected = matrix * ahead.push(1.0);
        assert_relative_eq!(projected.x / projected.w, 0.0, epsilon = 1e-4);
        assert_relative_eq!(projected.y / projected.w, 0.0, epsilon = 1e-4);
    }
}
