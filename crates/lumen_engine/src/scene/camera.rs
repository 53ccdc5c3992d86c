//! Camera collaborator
//!
//! The camera is owned by the host and handed in per frame. It supplies the
//! view and projection matrices consumed by the renderer and the inverse
//! view-projection used to unproject screen points into rays.

use super::raycast::Ray;
use crate::foundation::math::{Mat4, Mat4Ext, Vec2, Vec3, Vec4};

/// Projection kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Perspective with a vertical field of view in radians
    Perspective {
        /// Vertical field of view, radians
        fov_y: f32,
    },
    /// Orthographic with explicit planes
    Orthographic {
        /// Left plane
        left: f32,
        /// Right plane
        right: f32,
        /// Bottom plane
        bottom: f32,
        /// Top plane
        top: f32,
    },
}

/// View and projection state
#[derive(Debug, Clone)]
pub struct Camera {
    /// Eye position in world space
    pub position: Vec3,
    /// Point the camera looks at
    pub target: Vec3,
    /// Up direction hint
    pub up: Vec3,
    /// Projection kind
    pub projection: Projection,
    /// Width over height of the viewport
    pub aspect: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::zeros(),
            up: Vec3::y(),
            projection: Projection::Perspective {
                fov_y: std::f32::consts::FRAC_PI_3,
            },
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    /// Perspective camera at a position, looking at a target
    pub fn perspective(position: Vec3, target: Vec3, fov_y: f32, aspect: f32) -> Self {
        Self {
            position,
            target,
            projection: Projection::Perspective { fov_y },
            aspect,
            ..Self::default()
        }
    }

    /// Point the camera at a new target
    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
    }

    /// Update the aspect ratio after a viewport resize
    pub fn set_aspect(&mut self, width: u32, height: u32) {
        if height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// World-space eye position
    pub fn world_position(&self) -> Vec3 {
        self.position
    }

    /// World-to-camera matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at(self.position, self.target, self.up)
    }

    /// Camera-to-clip matrix, depth mapped to [0, 1]
    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective { fov_y } => {
                Mat4::perspective(fov_y, self.aspect, self.near, self.far)
            }
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
            } => Mat4::orthographic(left, right, bottom, top, self.near, self.far),
        }
    }

    /// Combined projection * view
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Unproject a normalized-device-coordinate point into a world-space ray
    ///
    /// `ndc` is in [-1, 1] on both axes with +Y up. Returns `None` when the
    /// view-projection is not invertible (degenerate camera state).
    pub fn unproject(&self, ndc: Vec2) -> Option<Ray> {
        let inverse = self.view_projection().try_inverse()?;

        let near = inverse * Vec4::new(ndc.x, ndc.y, 0.0, 1.0);
        let far = inverse * Vec4::new(ndc.x, ndc.y, 1.0, 1.0);
        if near.w.abs() < f32::EPSILON || far.w.abs() < f32::EPSILON {
            return None;
        }

        let near = near.xyz() / near.w;
        let far = far.xyz() / far.w;
        Some(Ray::new(near, (far - near).normalize()))
    }
}
