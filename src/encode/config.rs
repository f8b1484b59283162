//! Encoder configuration

use crate::encode::alpha::AlphaColorMode;
use crate::encode::partition::MAX_BLOCK_SIZE;
use crate::image::planes::ColorModel;

pub const DEFAULT_QUALITY: f32 = 80.0;
pub const DEFAULT_ALPHA_QUALITY: f32 = 80.0;
pub const DEFAULT_SPEED: u8 = 4;
pub const DEFAULT_BLOCK_SIZE: u32 = 64;
pub const MIN_BLOCK_SIZE: u32 = 8;

/// Configuration for one encode call
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeConfig {
    /// Color quality (1-100, higher is better quality)
    pub quality: f32,
    /// Alpha quality (1-100), independent of the color quality
    pub alpha_quality: f32,
    /// Effort (1-10, 1 searches the most coding modes, 10 the fewest)
    pub speed: u8,
    /// Worker threads; `None` or `Some(0)` uses every available core
    pub threads: Option<usize>,
    /// Color handling under transparent pixels
    pub alpha_color_mode: AlphaColorMode,
    /// Internal color representation of the coded planes
    pub color_model: ColorModel,
    /// Edge of the square coding blocks, in pixels
    pub block_size: u32,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            alpha_quality: DEFAULT_ALPHA_QUALITY,
            speed: DEFAULT_SPEED,
            threads: None,
            alpha_color_mode: AlphaColorMode::UnassociatedClean, // dirty alpha off
            color_model: ColorModel::YCoCg,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl EncodeConfig {
    /// Whether color under fully transparent pixels is kept.
    pub fn dirty_alpha(&self) -> bool {
        self.alpha_color_mode.is_dirty()
    }

    /// Returns a copy with every field forced into its valid range.
    pub fn clamped(&self) -> Self {
        Self {
            quality: clamp_quality(self.quality, DEFAULT_QUALITY),
            alpha_quality: clamp_quality(self.alpha_quality, DEFAULT_ALPHA_QUALITY),
            speed: self.speed.clamp(1, 10),
            threads: self.threads.filter(|&n| n > 0),
            alpha_color_mode: self.alpha_color_mode,
            color_model: self.color_model,
            block_size: self.block_size.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE),
        }
    }
}

/// Clamps a quality value to [1, 100]; non-finite values fall back to `default`.
pub fn clamp_quality(quality: f32, default: f32) -> f32 {
    if quality.is_finite() {
        quality.clamp(1.0, 100.0)
    } else {
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EncodeConfig::default();
        assert_eq!(config.quality, 80.0);
        assert_eq!(config.alpha_quality, 80.0);
        assert_eq!(config.speed, 4);
        assert_eq!(config.threads, None);
        assert!(!config.dirty_alpha());
        assert_eq!(config.color_model, ColorModel::YCoCg);
        assert_eq!(config.block_size, 64);
        assert_eq!(config.clamped(), config);
    }

    #[test]
    fn test_clamped() {
        let config = EncodeConfig {
            quality: 250.0,
            alpha_quality: f32::NAN,
            speed: 0,
            threads: Some(0),
            block_size: 1000,
            ..EncodeConfig::default()
        }
        .clamped();
        assert_eq!(config.quality, 100.0);
        assert_eq!(config.alpha_quality, DEFAULT_ALPHA_QUALITY);
        assert_eq!(config.speed, 1);
        assert_eq!(config.threads, None);
        assert_eq!(config.block_size, MAX_BLOCK_SIZE);

        let low = EncodeConfig {
            quality: -5.0,
            speed: 42,
            block_size: 2,
            ..EncodeConfig::default()
        }
        .clamped();
        assert_eq!(low.quality, 1.0);
        assert_eq!(low.speed, 10);
        assert_eq!(low.block_size, MIN_BLOCK_SIZE);
    }
}
