// src/encode/block/coder.rs

//! Per-block transform coding with rate-distortion mode decision.
//!
//! Every candidate permitted by the [`SearchEffort`] is quantized and
//! reconstructed. Its distortion is the squared error against the source
//! samples, and its rate comes from running the entropy coder in counting
//! mode. The candidate with the lowest `D + lambda * R` is then coded for
//! real. Blocks are coded with fresh contexts and never reference each other.

use crate::encode::block::dct::{self, DCTSIZE2, ZIGZAG};
use crate::encode::block::quant::{dequantize, dequantize_f64, quantize, quantize_f64};
use crate::encode::block::transform::{self, ScanOrder};
use crate::encode::entropy::bool_coder::{BitSink, BoolEncoder, CostCounter, COST_SCALE};
use crate::encode::entropy::coeff_coder::{encode_coefficients, CoeffContexts, Segment, BUCKET_SIZE};
use crate::encode::partition::{Block, BlockRect, MAX_BLOCK_SIZE};
use crate::encode::rate::{dct_bucket_weight, wavelet_band_weight, QuantizationParams, SearchEffort};
use crate::image::planes::{Plane, PlaneId};
use crate::utils::error::{EncodeError, Result};

#[cfg(feature = "block-trace")]
use log::trace;

/// Coding mode of a block, signalled with two raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockMode {
    /// Quantized block mean only.
    Flat,
    /// Multi-level 5/3 wavelet of the samples.
    Wavelet,
    /// Least-squares plane prediction, wavelet of the residual.
    Planar,
    /// 8x8 DCT tiles.
    Dct,
}

impl BlockMode {
    pub fn to_bits(self) -> u32 {
        match self {
            BlockMode::Flat => 0,
            BlockMode::Wavelet => 1,
            BlockMode::Planar => 2,
            BlockMode::Dct => 3,
        }
    }
}

/// Compressed payload of one [`Block`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodedBlock {
    pub index: usize,
    pub plane: PlaneId,
    pub rect: BlockRect,
    pub mode: BlockMode,
    pub payload: Vec<u8>,
    /// Squared error of the reconstruction, in sample units.
    pub distortion: u64,
}

impl CodedBlock {
    #[inline]
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// One fully quantized coding choice.
struct Candidate {
    mode: BlockMode,
    levels: u8,
    params: Vec<i32>,
    coeffs: Vec<i32>,
    segments: Vec<Segment>,
    distortion: u64,
}

impl Candidate {
    fn write<S: BitSink>(&self, sink: &mut S) {
        let mut ctx = CoeffContexts::new();
        sink.encode_literal(self.mode.to_bits(), 2);
        if matches!(self.mode, BlockMode::Wavelet | BlockMode::Planar) {
            sink.encode_literal(u32::from(self.levels), 3);
        }
        for &p in &self.params {
            ctx.encode_param(sink, p);
        }
        encode_coefficients(sink, &mut ctx, &self.coeffs, &self.segments);
    }

    fn rate(&self) -> u64 {
        let mut counter = CostCounter::new();
        self.write(&mut counter);
        counter.cost()
    }
}

/// Source samples of one block, widened and row-major.
struct BlockSamples {
    w: usize,
    h: usize,
    data: Vec<i32>,
    lo: i32,
    hi: i32,
}

impl BlockSamples {
    fn distortion(&self, recon: &[i32]) -> u64 {
        self.data
            .iter()
            .zip(recon)
            .map(|(&s, &r)| {
                let d = i64::from(s - r.clamp(self.lo, self.hi));
                (d * d) as u64
            })
            .sum()
    }
}

/// Codes blocks of one batch with fixed quantization parameters.
pub struct TransformCoder<'a> {
    params: &'a QuantizationParams,
    effort: &'a SearchEffort,
}

impl<'a> TransformCoder<'a> {
    pub fn new(params: &'a QuantizationParams, effort: &'a SearchEffort) -> Self {
        Self { params, effort }
    }

    /// Transforms, quantizes and entropy codes `block` of `plane`.
    ///
    /// Fails with [`EncodeError::EncodeFailure`] when the block geometry does
    /// not fit the plane.
    pub fn encode_block(&self, block: &Block, plane: &Plane) -> Result<CodedBlock> {
        let (chosen, _) = self.decide(block, plane)?;

        let mut encoder = BoolEncoder::new();
        chosen.write(&mut encoder);

        Ok(CodedBlock {
            index: block.index,
            plane: block.plane,
            rect: block.rect,
            mode: chosen.mode,
            payload: encoder.finish(),
            distortion: chosen.distortion,
        })
    }

    /// Runs the mode decision and returns the winner with its `D + lambda * R`.
    fn decide(&self, block: &Block, plane: &Plane) -> Result<(Candidate, f64)> {
        let samples = self.load(block, plane)?;

        let mut best: Option<(Candidate, f64, u64)> = None;
        let mut consider = |candidate: Candidate| {
            let rate = candidate.rate();
            let bits = rate as f64 / f64::from(COST_SCALE);
            let cost = candidate.distortion as f64 + self.params.lambda * bits;
            #[cfg(feature = "block-trace")]
            trace!(
                "block {} {:?} levels {}: D={} R={:.1} J={:.1}",
                block.index,
                candidate.mode,
                candidate.levels,
                candidate.distortion,
                bits,
                cost
            );
            let better = match &best {
                None => true,
                Some((_, best_cost, best_rate)) => {
                    cost < *best_cost || (cost == *best_cost && rate < *best_rate)
                }
            };
            if better {
                best = Some((candidate, cost, rate));
            }
        };

        let mut levels: Vec<u8> = self
            .effort
            .wavelet_levels
            .iter()
            .map(|&l| transform::effective_levels(samples.w, samples.h, l))
            .collect();
        levels.dedup();

        for &mode in &self.effort.modes {
            match mode {
                BlockMode::Flat => consider(self.flat(&samples)),
                BlockMode::Wavelet => {
                    for &l in &levels {
                        for &bias in &self.effort.rounding_biases {
                            consider(self.wavelet(&samples, l, bias));
                        }
                    }
                }
                BlockMode::Planar => {
                    let fit = PlaneFit::solve(&samples);
                    for &l in &levels {
                        for &bias in &self.effort.rounding_biases {
                            consider(self.planar(&samples, &fit, l, bias));
                        }
                    }
                }
                BlockMode::Dct => {
                    if self.params.is_lossless() {
                        continue;
                    }
                    for &bias in &self.effort.rounding_biases {
                        consider(self.dct(&samples, bias));
                    }
                }
            }
        }

        best.map(|(chosen, cost, _)| (chosen, cost)).ok_or_else(|| {
            EncodeError::EncodeFailure(format!("no coding mode available for block {}", block.index))
        })
    }

    fn load(&self, block: &Block, plane: &Plane) -> Result<BlockSamples> {
        let r = block.rect;
        if r.width == 0 || r.height == 0 {
            return Err(EncodeError::EncodeFailure(format!(
                "block {} is empty ({}x{})",
                block.index, r.width, r.height
            )));
        }
        if r.width > MAX_BLOCK_SIZE || r.height > MAX_BLOCK_SIZE {
            return Err(EncodeError::EncodeFailure(format!(
                "block {} is {}x{}, larger than {}",
                block.index, r.width, r.height, MAX_BLOCK_SIZE
            )));
        }
        if block.plane != plane.id() || r.right() > plane.width() || r.bottom() > plane.height() {
            return Err(EncodeError::EncodeFailure(format!(
                "block {} at ({}, {}) {}x{} lies outside {:?} plane {}x{}",
                block.index,
                r.x,
                r.y,
                r.width,
                r.height,
                plane.id(),
                plane.width(),
                plane.height()
            )));
        }

        let mut data = Vec::with_capacity(r.area());
        for y in r.y..r.bottom() {
            let row = plane.row(y);
            data.extend(row[r.x as usize..r.right() as usize].iter().map(|&s| i32::from(s)));
        }
        let (lo, hi) = plane.sample_range();
        Ok(BlockSamples {
            w: r.width as usize,
            h: r.height as usize,
            data,
            lo,
            hi,
        })
    }

    fn flat(&self, samples: &BlockSamples) -> Candidate {
        let n = samples.data.len() as i64;
        let sum: i64 = samples.data.iter().map(|&s| i64::from(s)).sum();
        let mean = (2 * sum + n).div_euclid(2 * n) as i32;
        let step = self.params.band_step(wavelet_band_weight(0, transform::Orientation::LL));
        let level = quantize(mean, step, 8);
        let recon = vec![dequantize(level, step); samples.data.len()];
        Candidate {
            mode: BlockMode::Flat,
            levels: 0,
            params: vec![level],
            coeffs: Vec::new(),
            segments: Vec::new(),
            distortion: samples.distortion(&recon),
        }
    }

    /// Quantizes `input` in the wavelet domain and returns the reconstruction.
    fn wavelet_pass(
        &self,
        input: &[i32],
        w: usize,
        h: usize,
        levels: u8,
        bias: u32,
    ) -> (Vec<i32>, Vec<Segment>, Vec<i32>) {
        let mut buf = input.to_vec();
        transform::forward(&mut buf, w, h, levels);

        let scan = ScanOrder::new(w, h, levels);
        let mut coeffs = Vec::with_capacity(buf.len());
        let mut recon = vec![0i32; buf.len()];
        let mut segments = Vec::with_capacity(scan.bands().len());

        for band in scan.bands() {
            let step = self.params.band_step(wavelet_band_weight(band.level, band.orientation));
            for &pos in &scan.positions()[band.start..band.start + band.len] {
                let q = quantize(buf[pos], step, bias);
                coeffs.push(q);
                recon[pos] = dequantize(q, step);
            }
            segments.push(Segment {
                start: band.start,
                len: band.len,
                class: band.class(),
            });
        }

        transform::backward(&mut recon, w, h, levels);
        (coeffs, segments, recon)
    }

    fn wavelet(&self, samples: &BlockSamples, levels: u8, bias: u32) -> Candidate {
        let (coeffs, segments, recon) =
            self.wavelet_pass(&samples.data, samples.w, samples.h, levels, bias);
        Candidate {
            mode: BlockMode::Wavelet,
            levels,
            params: Vec::new(),
            coeffs,
            segments,
            distortion: samples.distortion(&recon),
        }
    }

    fn planar(&self, samples: &BlockSamples, fit: &PlaneFit, levels: u8, bias: u32) -> Candidate {
        let residual: Vec<i32> = samples
            .data
            .iter()
            .zip(&fit.prediction)
            .map(|(&s, &p)| s - p)
            .collect();
        let (coeffs, segments, mut recon) =
            self.wavelet_pass(&residual, samples.w, samples.h, levels, bias);
        for (r, &p) in recon.iter_mut().zip(&fit.prediction) {
            *r += p;
        }
        Candidate {
            mode: BlockMode::Planar,
            levels,
            params: vec![fit.a, fit.b, fit.c],
            coeffs,
            segments,
            distortion: samples.distortion(&recon),
        }
    }

    fn dct(&self, samples: &BlockSamples, bias: u32) -> Candidate {
        let (w, h) = (samples.w, samples.h);
        let mut coeffs = Vec::new();
        let mut segments = Vec::new();
        let mut recon = vec![0i32; samples.data.len()];

        for (tx, ty) in dct::tile_origins(w, h) {
            let tile = dct::load_tile(&samples.data, w, h, tx, ty);
            let freq = dct::forward_dct_8x8(&tile);
            let mut dq = [0.0; DCTSIZE2];
            let start = coeffs.len();
            for (k, &natural) in ZIGZAG.iter().enumerate() {
                let step = self.params.band_step(dct_bucket_weight(k / BUCKET_SIZE));
                let q = quantize_f64(freq[natural], step, bias);
                coeffs.push(q);
                dq[natural] = dequantize_f64(q, step);
            }
            for bucket in 0..DCTSIZE2 / BUCKET_SIZE {
                segments.push(Segment {
                    start: start + bucket * BUCKET_SIZE,
                    len: BUCKET_SIZE,
                    class: bucket as u8,
                });
            }
            dct::store_tile(&dct::inverse_dct_8x8(&dq), &mut recon, w, h, tx, ty);
        }

        Candidate {
            mode: BlockMode::Dct,
            levels: 0,
            params: Vec::new(),
            coeffs,
            segments,
            distortion: samples.distortion(&recon),
        }
    }
}

/// Least-squares plane `a + b*u + c*v` over centered coordinates
/// `u = 2x - (w - 1)`, `v = 2y - (h - 1)`, with `b` and `c` in 1/128 units.
struct PlaneFit {
    a: i32,
    b: i32,
    c: i32,
    prediction: Vec<i32>,
}

impl PlaneFit {
    const SLOPE_LIMIT: i32 = 1 << 15;

    fn solve(samples: &BlockSamples) -> Self {
        let (w, h) = (samples.w, samples.h);
        let n = samples.data.len() as i64;
        let u = |x: usize| 2 * x as i64 - (w as i64 - 1);
        let v = |y: usize| 2 * y as i64 - (h as i64 - 1);

        let mut sum = 0i64;
        let mut su = 0i64;
        let mut sv = 0i64;
        for y in 0..h {
            for x in 0..w {
                let s = i64::from(samples.data[y * w + x]);
                sum += s;
                su += s * u(x);
                sv += s * v(y);
            }
        }
        let uu: i64 = (0..w).map(|x| u(x) * u(x)).sum::<i64>() * h as i64;
        let vv: i64 = (0..h).map(|y| v(y) * v(y)).sum::<i64>() * w as i64;

        let a = (2 * sum + n).div_euclid(2 * n) as i32;
        let slope = |num: i64, den: i64| -> i32 {
            if den == 0 {
                0
            } else {
                let scaled = (num * 128) as f64 / den as f64;
                (scaled.round() as i64).clamp(-i64::from(Self::SLOPE_LIMIT), i64::from(Self::SLOPE_LIMIT))
                    as i32
            }
        };
        let b = slope(su, uu);
        let c = slope(sv, vv);

        let mut prediction = Vec::with_capacity(samples.data.len());
        for y in 0..h {
            for x in 0..w {
                let t = i64::from(b) * u(x) + i64::from(c) * v(y);
                prediction.push(a + ((t + 64) >> 7) as i32);
            }
        }

        Self { a, b, c, prediction }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane_from_fn(w: u32, h: u32, f: impl Fn(u32, u32) -> i16) -> Plane {
        let mut samples = Vec::with_capacity((w * h) as usize);
        for y in 0..h {
            for x in 0..w {
                samples.push(f(x, y));
            }
        }
        Plane::new(PlaneId::Y, w, h, 8, samples)
    }

    fn whole(plane: &Plane) -> Block {
        Block {
            index: 0,
            plane: plane.id(),
            rect: BlockRect {
                x: 0,
                y: 0,
                width: plane.width(),
                height: plane.height(),
            },
        }
    }

    fn texture(x: u32, y: u32) -> i16 {
        (((x * 37 + y * 53 + x * y * 7) % 200) as i16) - 100
    }

    #[test]
    fn test_flat_block_is_cheap() {
        let plane = plane_from_fn(16, 16, |_, _| 42);
        let effort = SearchEffort::for_speed(1);

        // Lossless: every exact candidate has zero distortion, the mean alone is cheapest.
        let params = QuantizationParams::derive(100.0, 8);
        let coded = TransformCoder::new(&params, &effort)
            .encode_block(&whole(&plane), &plane)
            .unwrap();
        assert_eq!(coded.mode, BlockMode::Flat);
        assert_eq!(coded.distortion, 0);
        assert!(coded.size() < 12);

        let params = QuantizationParams::derive(60.0, 8);
        let coded = TransformCoder::new(&params, &effort)
            .encode_block(&whole(&plane), &plane)
            .unwrap();
        assert!(coded.size() < 12);
    }

    #[test]
    fn test_lossless_has_no_distortion() {
        let plane = plane_from_fn(23, 17, texture);
        let params = QuantizationParams::derive(100.0, 8);
        for speed in [1, 5, 10] {
            let effort = SearchEffort::for_speed(speed);
            let coded = TransformCoder::new(&params, &effort)
                .encode_block(&whole(&plane), &plane)
                .unwrap();
            assert_eq!(coded.distortion, 0, "speed {}", speed);
            assert_ne!(coded.mode, BlockMode::Dct);
        }
    }

    #[test]
    fn test_ramp_prefers_prediction() {
        let plane = plane_from_fn(32, 32, |x, y| (x as i16 * 3 + y as i16 * 2) - 80);
        let params = QuantizationParams::derive(70.0, 8);
        let effort = SearchEffort::for_speed(3);
        let coded = TransformCoder::new(&params, &effort)
            .encode_block(&whole(&plane), &plane)
            .unwrap();
        assert_ne!(coded.mode, BlockMode::Flat);
        // The ramp spans 153 levels; a good fit keeps the mean error small.
        assert!(coded.distortion < 32 * 32 * 16, "distortion {}", coded.distortion);
    }

    #[test]
    fn test_quality_trades_size() {
        let plane = plane_from_fn(64, 64, texture);
        let effort = SearchEffort::for_speed(5);
        let block = whole(&plane);
        let low = QuantizationParams::derive(10.0, 8);
        let high = QuantizationParams::derive(95.0, 8);
        let small = TransformCoder::new(&low, &effort).encode_block(&block, &plane).unwrap();
        let large = TransformCoder::new(&high, &effort).encode_block(&block, &plane).unwrap();
        assert!(large.size() > small.size());
        assert!(large.distortion < small.distortion);
    }

    #[test]
    fn test_slower_speed_never_costs_more() {
        let planes = [
            plane_from_fn(32, 32, texture),
            plane_from_fn(32, 32, |x, y| ((x * 5 + y * 3) % 64) as i16 - 32 + texture(x, y) / 8),
            plane_from_fn(24, 16, |x, y| if (x / 4 + y / 4) % 2 == 0 { 90 } else { -70 }),
        ];
        for quality in [30.0, 50.0, 70.0] {
            let params = QuantizationParams::derive(quality, 8);
            for plane in &planes {
                for speed in 1..10u8 {
                    let slow = SearchEffort::for_speed(speed);
                    let fast = SearchEffort::for_speed(speed + 1);
                    let (_, slow_cost) = TransformCoder::new(&params, &slow)
                        .decide(&whole(plane), plane)
                        .unwrap();
                    let (_, fast_cost) = TransformCoder::new(&params, &fast)
                        .decide(&whole(plane), plane)
                        .unwrap();
                    assert!(
                        slow_cost <= fast_cost,
                        "q{} speed {} cost {} above speed {} cost {}",
                        quality,
                        speed,
                        slow_cost,
                        speed + 1,
                        fast_cost
                    );
                }
            }
        }
    }

    #[test]
    fn test_deterministic_payload() {
        let plane = plane_from_fn(40, 24, texture);
        let params = QuantizationParams::derive(50.0, 8);
        let effort = SearchEffort::for_speed(2);
        let coder = TransformCoder::new(&params, &effort);
        let a = coder.encode_block(&whole(&plane), &plane).unwrap();
        let b = coder.encode_block(&whole(&plane), &plane).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_bad_geometry_fails() {
        let plane = plane_from_fn(16, 16, texture);
        let params = QuantizationParams::derive(50.0, 8);
        let effort = SearchEffort::for_speed(9);
        let coder = TransformCoder::new(&params, &effort);

        let mut outside = whole(&plane);
        outside.rect.x = 8;
        assert!(matches!(
            coder.encode_block(&outside, &plane),
            Err(EncodeError::EncodeFailure(_))
        ));

        let mut empty = whole(&plane);
        empty.rect.height = 0;
        assert!(matches!(
            coder.encode_block(&empty, &plane),
            Err(EncodeError::EncodeFailure(_))
        ));

        let mut wrong_plane = whole(&plane);
        wrong_plane.plane = PlaneId::Alpha;
        assert!(matches!(
            coder.encode_block(&wrong_plane, &plane),
            Err(EncodeError::EncodeFailure(_))
        ));

        let big = plane_from_fn(300, 4, texture);
        assert!(matches!(
            coder.encode_block(&whole(&big), &big),
            Err(EncodeError::EncodeFailure(_))
        ));
    }

    #[test]
    fn test_sub_block_and_tiny_blocks() {
        let plane = plane_from_fn(20, 20, texture);
        let params = QuantizationParams::derive(80.0, 8);
        let effort = SearchEffort::for_speed(1);
        let coder = TransformCoder::new(&params, &effort);
        for (x, y, w, h) in [(0, 0, 1, 1), (19, 0, 1, 20), (4, 7, 9, 5), (12, 12, 8, 8)] {
            let block = Block {
                index: 3,
                plane: PlaneId::Y,
                rect: BlockRect {
                    x,
                    y,
                    width: w,
                    height: h,
                },
            };
            let coded = coder.encode_block(&block, &plane).unwrap();
            assert_eq!(coded.index, 3);
            assert_eq!(coded.rect, block.rect);
            assert!(!coded.payload.is_empty());
        }
    }
}
