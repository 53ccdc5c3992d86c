//! Offscreen render targets
//!
//! A render target owns the color and depth textures for one pass. Resizing
//! to the current dimensions is a no-op; textures are only reallocated when
//! the extent or sample count actually changes.

use log::debug;

use super::device::{
    DeviceError, GraphicsDevice, TextureDescriptor, TextureHandle, TextureUsage,
};

/// Attachment set for one pass, reallocated on demand
pub struct RenderTarget {
    label: String,
    width: u32,
    height: u32,
    sample_count: u32,
    wants_color: bool,
    wants_depth: bool,
    color: Option<TextureHandle>,
    depth: Option<TextureHandle>,
}

impl RenderTarget {
    /// Create a target and allocate its attachments
    pub fn new(
        device: &dyn GraphicsDevice,
        label: impl Into<String>,
        width: u32,
        height: u32,
        sample_count: u32,
        wants_color: bool,
        wants_depth: bool,
    ) -> Result<Self, DeviceError> {
        let mut target = Self {
            label: label.into(),
            width,
            height,
            sample_count,
            wants_color,
            wants_depth,
            color: None,
            depth: None,
        };
        target.allocate(device)?;
        Ok(target)
    }

    /// Depth-only target, sized square, for shadow maps
    pub fn shadow_map(
        device: &dyn GraphicsDevice,
        label: impl Into<String>,
        size: u32,
    ) -> Result<Self, DeviceError> {
        Self::new(device, label, size, size, 1, false, true)
    }

    fn allocate(&mut self, device: &dyn GraphicsDevice) -> Result<(), DeviceError> {
        self.release(device);
        if self.wants_color {
            self.color = Some(device.create_texture(&TextureDescriptor {
                label: format!("{} color", self.label),
                width: self.width,
                height: self.height,
                sample_count: self.sample_count,
                usage: TextureUsage::ColorTarget,
            })?);
        }
        if self.wants_depth {
            self.depth = Some(device.create_texture(&TextureDescriptor {
                label: format!("{} depth", self.label),
                width: self.width,
                height: self.height,
                sample_count: self.sample_count,
                usage: TextureUsage::DepthTarget,
            })?);
        }
        Ok(())
    }

    /// Resize the target; returns true when attachments were reallocated
    pub fn resize(
        &mut self,
        device: &dyn GraphicsDevice,
        width: u32,
        height: u32,
    ) -> Result<bool, DeviceError> {
        if width == self.width && height == self.height {
            return Ok(false);
        }
        debug!(
            "reallocating target '{}': {}x{} -> {width}x{height}",
            self.label, self.width, self.height
        );
        self.width = width;
        self.height = height;
        self.allocate(device)?;
        Ok(true)
    }

    /// Change the sample count; returns true when attachments were reallocated
    pub fn set_sample_count(
        &mut self,
        device: &dyn GraphicsDevice,
        sample_count: u32,
    ) -> Result<bool, DeviceError> {
        if sample_count == self.sample_count {
            return Ok(false);
        }
        self.sample_count = sample_count;
        self.allocate(device)?;
        Ok(true)
    }

    /// Current width in texels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Current height in texels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The color attachment, if this target has one
    pub fn color(&self) -> Option<TextureHandle> {
        self.color
    }

    /// The depth attachment, if this target has one
    pub fn depth(&self) -> Option<TextureHandle> {
        self.depth
    }

    /// Release attachments; safe to call more than once
    pub fn release(&mut self, device: &dyn GraphicsDevice) {
        if let Some(color) = self.color.take() {
            device.destroy_texture(color);
        }
        if let Some(depth) = self.depth.take() {
            device.destroy_texture(depth);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::headless::HeadlessDevice;

    #[test]
    fn resize_to_same_extent_keeps_textures() {
        let device = HeadlessDevice::new();
        let mut target = RenderTarget::new(&device, "main", 800, 600, 1, true, true).unwrap();
        let color = target.color().unwrap();

        assert!(!target.resize(&device, 800, 600).unwrap());
        assert_eq!(target.color(), Some(color));

        assert!(target.resize(&device, 1024, 768).unwrap());
        assert_ne!(target.color(), Some(color));
        assert_eq!(target.width(), 1024);

        target.release(&device);
    }

    #[test]
    fn release_is_idempotent() {
        let device = HeadlessDevice::new();
        let mut target = RenderTarget::new(&device, "main", 64, 64, 1, true, true).unwrap();
        assert_eq!(device.texture_count(), 2);

        target.release(&device);
        target.release(&device);
        assert_eq!(device.texture_count(), 0);
    }

    #[test]
    fn shadow_map_is_depth_only() {
        let device = HeadlessDevice::new();
        let mut target = RenderTarget::shadow_map(&device, "shadow 0", 1024).unwrap();
        assert!(target.color().is_none());
        assert!(target.depth().is_some());
        assert_eq!(target.width(), 1024);
        target.release(&device);
    }
}
