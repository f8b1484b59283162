// src/encode/rate.rs

//! Maps user-facing quality and speed onto quantizer steps and search effort.
//!
//! Everything here is a pure function of its inputs, which is what keeps the
//! encoder output reproducible byte for byte.

use crate::encode::block::coder::BlockMode;
use crate::encode::block::transform::Orientation;
use crate::encode::config::EncodeConfig;
use log::debug;

/// Step of 1.0 sample in the 1/16 fixed-point step units.
pub const UNIT_STEP_Q4: u32 = 16;

/// Maps quality in [1, 100] to a quantizer index in [0, 255] (0 is best).
pub fn quality_to_qindex(quality: f32) -> u8 {
    let q = (quality / 100.0).clamp(0.0, 1.0);
    let normalized = if q >= 0.85 {
        (1.0 - q) * 3.0
    } else if q > 0.25 {
        0.875 - q * 0.5
    } else {
        1.0 - q
    };
    (normalized * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Base quantizer step for `qindex`, in 1/16 sample units.
///
/// qindex 0 is the unit step at every depth, so the reversible wavelet path
/// stays lossless there. Otherwise the step is scaled with the sample depth.
pub fn qindex_to_step(qindex: u8, bit_depth: u8) -> u32 {
    if qindex == 0 {
        return UNIT_STEP_Q4;
    }
    let base = (16.0 * (f64::from(qindex) / 36.0).exp2()).round() as u32;
    base << bit_depth.saturating_sub(8)
}

/// Relative step weight (16 = base step) of a wavelet subband.
pub fn wavelet_band_weight(level: u8, orientation: Orientation) -> u32 {
    match (level, orientation) {
        (_, Orientation::LL) => 12,
        (l, _) if l >= 3 => 14,
        (2, _) => 16,
        (_, Orientation::HH) => 22,
        _ => 18,
    }
}

/// Relative step weight of a DCT zigzag bucket (four buckets of 16).
pub fn dct_bucket_weight(bucket: usize) -> u32 {
    const WEIGHTS: [u32; 4] = [12, 16, 18, 22];
    WEIGHTS[bucket.min(3)]
}

/// Quantization parameters for one batch of planes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizationParams {
    pub qindex: u8,
    /// Base step in 1/16 sample units.
    pub step_q4: u32,
    /// Rate-distortion multiplier, squared sample units per bit.
    pub lambda: f64,
}

impl QuantizationParams {
    pub fn derive(quality: f32, bit_depth: u8) -> Self {
        let qindex = quality_to_qindex(quality);
        let step_q4 = qindex_to_step(qindex, bit_depth);
        let lambda = if qindex == 0 {
            0.0
        } else {
            let step = f64::from(step_q4) / f64::from(UNIT_STEP_Q4);
            0.18 * step * step
        };
        Self {
            qindex,
            step_q4,
            lambda,
        }
    }

    #[inline]
    pub fn is_lossless(&self) -> bool {
        self.qindex == 0
    }

    /// Step for a band with the given weight, collapsing to the unit step when
    /// the base step is the unit step.
    #[inline]
    pub fn band_step(&self, weight: u32) -> u32 {
        let extra = self.step_q4 - UNIT_STEP_Q4;
        UNIT_STEP_Q4 + extra * weight / 16
    }
}

/// Candidate space explored by mode decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchEffort {
    pub modes: Vec<BlockMode>,
    /// Rounding offsets in 1/16 of a step; 8 rounds to nearest.
    pub rounding_biases: Vec<u32>,
    pub wavelet_levels: Vec<u8>,
}

impl SearchEffort {
    pub fn for_speed(speed: u8) -> Self {
        use BlockMode::*;
        let (modes, biases, levels): (&[BlockMode], &[u32], &[u8]) = match speed.clamp(1, 10) {
            1..=2 => (&[Flat, Wavelet, Planar, Dct], &[8, 6, 5, 4], &[3, 4, 5]),
            3..=4 => (&[Flat, Wavelet, Planar, Dct], &[8, 6, 5], &[4]),
            5..=6 => (&[Flat, Wavelet, Dct], &[6], &[4]),
            7..=8 => (&[Flat, Wavelet], &[6], &[4]),
            _ => (&[Wavelet], &[6], &[4]),
        };
        Self {
            modes: modes.to_vec(),
            rounding_biases: biases.to_vec(),
            wavelet_levels: levels.to_vec(),
        }
    }

    /// Number of candidates tried per block.
    pub fn candidates(&self) -> usize {
        let transformed = self.rounding_biases.len() * self.wavelet_levels.len();
        self.modes
            .iter()
            .map(|mode| match mode {
                BlockMode::Flat => 1,
                BlockMode::Wavelet | BlockMode::Planar => transformed,
                BlockMode::Dct => self.rounding_biases.len(),
            })
            .sum()
    }
}

/// Derives the parameters of both batches from an [`EncodeConfig`].
#[derive(Debug, Clone)]
pub struct RateController {
    color: QuantizationParams,
    alpha: QuantizationParams,
    effort: SearchEffort,
}

impl RateController {
    pub fn new(config: &EncodeConfig, bit_depth: u8) -> Self {
        let color = QuantizationParams::derive(config.quality, bit_depth);
        let alpha = QuantizationParams::derive(config.alpha_quality, bit_depth);
        let effort = SearchEffort::for_speed(config.speed);
        debug!(
            "Rate params: color qindex {} step {}/16, alpha qindex {} step {}/16, {} candidates per block",
            color.qindex,
            color.step_q4,
            alpha.qindex,
            alpha.step_q4,
            effort.candidates()
        );
        Self {
            color,
            alpha,
            effort,
        }
    }

    #[inline]
    pub fn color(&self) -> &QuantizationParams {
        &self.color
    }

    #[inline]
    pub fn alpha(&self) -> &QuantizationParams {
        &self.alpha
    }

    #[inline]
    pub fn effort(&self) -> &SearchEffort {
        &self.effort
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qindex_endpoints() {
        assert_eq!(quality_to_qindex(100.0), 0);
        assert_eq!(quality_to_qindex(1.0), 252);
        // 0.875 - 0.25 = 0.625
        assert_eq!(quality_to_qindex(50.0), 159);
    }

    #[test]
    fn test_step_is_monotonic_in_quality() {
        for depth in [8, 10] {
            let mut prev = u32::MAX;
            for q in 1..=100 {
                let step = QuantizationParams::derive(q as f32, depth).step_q4;
                assert!(step <= prev, "step grew at quality {}", q);
                prev = step;
            }
        }
    }

    #[test]
    fn test_derive_is_pure() {
        for q in [1.0, 33.3, 80.0, 100.0] {
            assert_eq!(
                QuantizationParams::derive(q, 8),
                QuantizationParams::derive(q, 8)
            );
        }
    }

    #[test]
    fn test_lossless_params() {
        let params = QuantizationParams::derive(100.0, 10);
        assert!(params.is_lossless());
        assert_eq!(params.step_q4, UNIT_STEP_Q4);
        assert_eq!(params.lambda, 0.0);
        for w in [12, 16, 22] {
            assert_eq!(params.band_step(w), UNIT_STEP_Q4);
        }
    }

    #[test]
    fn test_band_steps_grow_with_frequency() {
        let params = QuantizationParams::derive(40.0, 8);
        let ll = params.band_step(wavelet_band_weight(4, Orientation::LL));
        let coarse = params.band_step(wavelet_band_weight(4, Orientation::HL));
        let fine = params.band_step(wavelet_band_weight(1, Orientation::HL));
        let finest = params.band_step(wavelet_band_weight(1, Orientation::HH));
        assert!(ll < coarse && coarse < fine && fine < finest);
        assert_eq!(params.band_step(16), params.step_q4);
    }

    #[test]
    fn test_lower_speed_searches_superset() {
        for speed in 1..10u8 {
            let slow = SearchEffort::for_speed(speed);
            let fast = SearchEffort::for_speed(speed + 1);
            assert!(fast.modes.iter().all(|m| slow.modes.contains(m)));
            assert!(
                fast.rounding_biases.iter().all(|b| slow.rounding_biases.contains(b)),
                "speed {} misses a rounding bias of speed {}",
                speed,
                speed + 1
            );
            assert!(
                fast.wavelet_levels.iter().all(|l| slow.wavelet_levels.contains(l)),
                "speed {} misses a wavelet level of speed {}",
                speed,
                speed + 1
            );
            assert!(slow.candidates() >= fast.candidates());
        }
        assert_eq!(SearchEffort::for_speed(10).modes, vec![BlockMode::Wavelet]);
        assert_eq!(SearchEffort::for_speed(0), SearchEffort::for_speed(1));
    }

    #[test]
    fn test_controller_splits_color_and_alpha() {
        let config = EncodeConfig {
            quality: 100.0,
            alpha_quality: 20.0,
            ..EncodeConfig::default()
        };
        let rc = RateController::new(&config, 8);
        assert!(rc.color().is_lossless());
        assert!(!rc.alpha().is_lossless());
        assert_eq!(rc.effort(), &SearchEffort::for_speed(config.speed));
    }
}
