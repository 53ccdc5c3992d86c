//! Renderer configuration
//!
//! Plain-data settings with serde defaults, loadable from TOML. Hosts can
//! construct [`RendererSettings`] directly or parse it from a config file.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from loading or validating settings
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML text failed to parse
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
    /// A field value is out of range
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Settings consumed by [`crate::render::Renderer`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    /// Uniform ring depth; the number of frames the CPU may run ahead of
    /// the GPU
    pub frames_in_flight: u32,
    /// Maximum shadow maps consumed by the main pass
    pub max_shadow_maps: u32,
    /// Maximum lights uploaded per frame
    pub max_lights: u32,
    /// MSAA sample count for the main pass
    pub sample_count: u32,
    /// Clear color for the main pass
    pub clear_color: [f32; 4],
    /// Clear depth for the main and shadow passes
    pub clear_depth: f32,
    /// Shadow map edge length in texels
    pub shadow_map_size: u32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            max_shadow_maps: 4,
            max_lights: 8,
            sample_count: 1,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_depth: 1.0,
            shadow_map_size: 1024,
        }
    }
}

impl RendererSettings {
    /// Parse settings from TOML text, applying defaults for missing fields
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check field ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frames_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        if self.sample_count == 0 {
            return Err(ConfigError::Invalid(
                "sample_count must be at least 1".to_string(),
            ));
        }
        if self.shadow_map_size == 0 {
            return Err(ConfigError::Invalid(
                "shadow_map_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RendererSettings::default().validate().is_ok());
    }

    #[test]
    fn toml_overrides_defaults() {
        let settings = RendererSettings::from_toml(
            "frames_in_flight = 2\nclear_color = [0.1, 0.2, 0.3, 1.0]\n",
        )
        .unwrap();
        assert_eq!(settings.frames_in_flight, 2);
        assert_eq!(settings.clear_color, [0.1, 0.2, 0.3, 1.0]);
        // Untouched fields keep their defaults.
        assert_eq!(settings.max_shadow_maps, 4);
    }

    #[test]
    fn zero_ring_depth_is_rejected() {
        assert!(RendererSettings::from_toml("frames_in_flight = 0").is_err());
    }
}
