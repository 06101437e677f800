use serde::{Deserialize, Serialize};

use crate::error::{StereoError, StereoResult};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TextureConfig {
    /// Per-eye texture width in pixels.
    pub width: u32,
    /// Per-eye texture height in pixels.
    pub height: u32,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
        }
    }
}

/// How the host delivers compressed frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// One compressed image per eye.
    PerEye,
    /// One compressed image holding the left eye in its left half and the right eye in its right half.
    SideBySide,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Rescale images whose dimensions differ from the texture size instead of rejecting them.
    pub scale_mismatched: bool,
    /// Largest accepted source width or height.
    pub max_dimension: u32,
    /// Grey level of the neutral image shown before the first good frame.
    pub placeholder_gray: u8,
    pub delivery: DeliveryMode,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            scale_mismatched: true,
            max_dimension: 8192,
            placeholder_gray: 128,
            delivery: DeliveryMode::PerEye,
        }
    }
}

/// Texture sampling filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    Linear,
    Nearest,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// RGBA clear color, each channel in 0..=1.
    pub clear_color: [f32; 4],
    /// Pace presentation to the display refresh.
    pub vsync: bool,
    /// Depth buffer bits: 0, 16 or 24.
    pub depth_bits: u8,
    /// Multisample count: 1 or 4.
    pub msaa_samples: u32,
    /// Vignette strength; 0 leaves the uploaded pixels untouched.
    pub vignette: f32,
    pub filter: FilterMode,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vsync: true,
            depth_bits: 16,
            msaa_samples: 4,
            vignette: 0.0,
            filter: FilterMode::Linear,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Largest accepted compressed payload in a VRHP packet.
    pub max_payload_bytes: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` env-filter directive used when `RUST_LOG` is not set.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ViewerConfig {
    #[serde(default)]
    pub textures: TextureConfig,
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ViewerConfig {
    pub fn load_from_file(path: &std::path::Path) -> StereoResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate a TOML document. An empty document yields the defaults.
    pub fn from_toml_str(contents: &str) -> StereoResult<Self> {
        let config: ViewerConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no backend can honor.
    pub fn validate(&self) -> StereoResult<()> {
        if self.textures.width == 0 || self.textures.height == 0 {
            return Err(StereoError::Configuration(format!(
                "texture size must be positive, got {}x{}",
                self.textures.width, self.textures.height
            )));
        }
        if self.textures.width > self.decoder.max_dimension
            || self.textures.height > self.decoder.max_dimension
        {
            return Err(StereoError::Configuration(format!(
                "texture size {}x{} exceeds max_dimension {}",
                self.textures.width, self.textures.height, self.decoder.max_dimension
            )));
        }
        if !matches!(self.display.depth_bits, 0 | 16 | 24) {
            return Err(StereoError::Configuration(format!(
                "depth_bits must be 0, 16 or 24, got {}",
                self.display.depth_bits
            )));
        }
        if !matches!(self.display.msaa_samples, 1 | 4) {
            return Err(StereoError::Configuration(format!(
                "msaa_samples must be 1 or 4, got {}",
                self.display.msaa_samples
            )));
        }
        if !(0.0..=1.0).contains(&self.display.vignette) {
            return Err(StereoError::Configuration(format!(
                "vignette must be within 0..=1, got {}",
                self.display.vignette
            )));
        }
        if self.stream.max_payload_bytes == 0 {
            return Err(StereoError::Configuration(
                "max_payload_bytes must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_headset_layout() {
        let config = ViewerConfig::default();
        assert_eq!(config.textures.width, 1024);
        assert_eq!(config.textures.height, 1024);
        assert_eq!(config.display.msaa_samples, 4);
        assert_eq!(config.display.depth_bits, 16);
        assert!(config.display.vsync);
        assert_eq!(config.display.vignette, 0.0);
        assert_eq!(config.decoder.delivery, DeliveryMode::PerEye);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = ViewerConfig::from_toml_str("").unwrap();
        assert_eq!(config.textures.width, 1024);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = ViewerConfig::from_toml_str(
            r#"
            [textures]
            width = 512

            [decoder]
            delivery = "side_by_side"

            [display]
            msaa_samples = 1
            filter = "nearest"
            "#,
        )
        .unwrap();
        assert_eq!(config.textures.width, 512);
        assert_eq!(config.textures.height, 1024);
        assert_eq!(config.decoder.delivery, DeliveryMode::SideBySide);
        assert_eq!(config.display.msaa_samples, 1);
        assert_eq!(config.display.filter, FilterMode::Nearest);
        assert!(config.display.vsync);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ViewerConfig::from_toml_str("[display]\nmsaa_samples = 2").is_err());
        assert!(ViewerConfig::from_toml_str("[display]\ndepth_bits = 8").is_err());
        assert!(ViewerConfig::from_toml_str("[textures]\nwidth = 0").is_err());
        assert!(ViewerConfig::from_toml_str("[display]\nvignette = 1.5").is_err());
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = ViewerConfig::from_toml_str("[textures\nwidth = 1").unwrap_err();
        assert!(matches!(err, StereoError::Config(_)));
    }
}
