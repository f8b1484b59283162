//! Top-level encoder: plane extraction, block dispatch and muxing.

use crate::container::muxer::{Bitstream, BitstreamMuxer, ImageMeta};
use crate::encode::alpha::{alpha_plane, AlphaCoder, AlphaColorMode};
use crate::encode::block::coder::{CodedBlock, TransformCoder};
use crate::encode::config::{clamp_quality, EncodeConfig, DEFAULT_ALPHA_QUALITY, DEFAULT_QUALITY};
use crate::encode::partition::{partition, plane_blocks, Block};
use crate::encode::rate::RateController;
use crate::image::pixel_buffer::Image;
use crate::image::planes::{color_planes, ColorModel, Plane, PlaneId};
use crate::utils::error::{EncodeError, Result};
use crate::utils::threads::WorkScheduler;
use log::{debug, info};
use std::sync::atomic::AtomicBool;

/// Output of [`Encoder::encode_image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// The complete container.
    pub bitstream: Bitstream,
    /// Payload bytes of the color planes.
    pub color_byte_size: usize,
    /// Payload bytes of the alpha plane (0 when no alpha was coded).
    pub alpha_byte_size: usize,
}

/// A reusable encoder.
///
/// Use `Encoder::new()` for the defaults and adjust them with the `with_*`
/// methods. Every setter clamps its value into the valid range.
#[derive(Debug, Clone, Default)]
pub struct Encoder {
    config: EncodeConfig,
    muxer: BitstreamMuxer,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an encoder from an existing configuration, clamping it.
    pub fn from_config(config: EncodeConfig) -> Self {
        Self {
            config: config.clamped(),
            muxer: BitstreamMuxer::new(),
        }
    }

    /// The effective configuration.
    pub fn config(&self) -> &EncodeConfig {
        &self.config
    }

    /// Color quality, 1-100.
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.config.quality = clamp_quality(quality, DEFAULT_QUALITY);
        self
    }

    /// Alpha quality, 1-100.
    pub fn with_alpha_quality(mut self, quality: f32) -> Self {
        self.config.alpha_quality = clamp_quality(quality, DEFAULT_ALPHA_QUALITY);
        self
    }

    /// Speed, 1 (slowest, smallest) to 10 (fastest).
    pub fn with_speed(mut self, speed: u8) -> Self {
        self.config.speed = speed.clamp(1, 10);
        self
    }

    /// Worker threads. `None` or `Some(0)` uses every available core.
    pub fn with_num_threads(mut self, threads: Option<usize>) -> Self {
        self.config.threads = threads.filter(|&n| n > 0);
        self
    }

    /// Keep color under fully transparent pixels (`true`) or reset it (`false`).
    pub fn with_dirty_alpha(mut self, dirty: bool) -> Self {
        self.config.alpha_color_mode = AlphaColorMode::from_dirty_alpha(dirty);
        self
    }

    pub fn with_alpha_color_mode(mut self, mode: AlphaColorMode) -> Self {
        self.config.alpha_color_mode = mode;
        self
    }

    pub fn with_color_model(mut self, model: ColorModel) -> Self {
        self.config.color_model = model;
        self
    }

    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.config.block_size = EncodeConfig {
            block_size,
            ..EncodeConfig::default()
        }
        .clamped()
        .block_size;
        self
    }

    /// Lowers the maximum container size; larger results fail with `MuxOverflow`.
    pub fn with_output_limit(mut self, limit: u64) -> Self {
        self.muxer = self.muxer.with_size_limit(limit);
        self
    }

    /// Encodes `image` into a container.
    pub fn encode_image(&self, image: &Image) -> Result<EncodedImage> {
        let config = &self.config;
        let (width, height) = image.dimensions();
        let pixels = image.pixels();
        let bit_depth = image.depth().bits();

        let rects = partition(width, height, config.block_size)?;
        let rate = RateController::new(config, bit_depth);
        let scheduler = WorkScheduler::new(config.threads)?;

        info!(
            "Encoding {}x{} {:?} {}-bit image: quality {}, alpha quality {}, speed {}, {} threads",
            width,
            height,
            image.layout(),
            bit_depth,
            config.quality,
            config.alpha_quality,
            config.speed,
            scheduler.threads()
        );

        let (planes, alpha) = scheduler.join(
            || color_planes(&pixels, config.alpha_color_mode, config.color_model),
            || alpha_plane(&pixels),
        );

        let color_blocks = plane_blocks(&rects, &PlaneId::COLOR, 0);
        let coder = TransformCoder::new(rate.color(), rate.effort());
        let alpha_coder = AlphaCoder::new(rate.alpha(), rate.effort());

        let cancelled = AtomicBool::new(false);
        let (color_result, alpha_result) = scheduler.join(
            || encode_color(&scheduler, &cancelled, &coder, &color_blocks, &planes),
            || {
                alpha
                    .as_ref()
                    .map(|plane| {
                        let first = color_blocks.len();
                        alpha_coder.encode_alpha(&scheduler, &cancelled, plane, &rects, first)
                    })
                    .transpose()
            },
        );
        let (color, alpha) = settle(color_result, alpha_result)?;

        let color_byte_size: usize = color.iter().map(CodedBlock::size).sum();
        let alpha_byte_size: usize = alpha
            .as_ref()
            .map_or(0, |blocks| blocks.iter().map(CodedBlock::size).sum());
        let alpha_qindex = if alpha.is_some() { rate.alpha().qindex } else { 0 };

        let meta = ImageMeta {
            width,
            height,
            bit_depth,
            block_size: config.block_size,
            color_model: config.color_model,
            color_qindex: rate.color().qindex,
            alpha_qindex,
        };
        let bitstream = self.muxer.mux(color, alpha, &meta)?;

        Ok(EncodedImage {
            bitstream,
            color_byte_size,
            alpha_byte_size,
        })
    }
}

/// Combines the outcomes of the two batches. A batch that was only cancelled
/// never hides the failure that cancelled it.
fn settle<C, A>(color: Result<C>, alpha: Result<A>) -> Result<(C, A)> {
    match (color, alpha) {
        (Ok(color), Ok(alpha)) => Ok((color, alpha)),
        (Err(EncodeError::Cancelled { .. }), Err(err)) | (Err(err), _) | (_, Err(err)) => Err(err),
    }
}

/// Codes every color block on the scheduler, results in block order.
fn encode_color(
    scheduler: &WorkScheduler,
    cancelled: &AtomicBool,
    coder: &TransformCoder<'_>,
    blocks: &[Block],
    planes: &[Plane; 3],
) -> Result<Vec<CodedBlock>> {
    let coded = scheduler.run_parallel_with(cancelled, blocks, |block| {
        let plane = planes.iter().find(|p| p.id() == block.plane).ok_or_else(|| {
            EncodeError::EncodeFailure(format!(
                "block {} refers to {:?}, which is not a color plane",
                block.index, block.plane
            ))
        })?;
        coder.encode_block(block, plane)
    })?;
    debug!(
        "Color batch: {} blocks, {} bytes",
        coded.len(),
        coded.iter().map(CodedBlock::size).sum::<usize>()
    );
    Ok(coded)
}

/// Encodes `image` with `config` and returns the container bytes.
pub fn encode(image: &Image, config: &EncodeConfig) -> Result<Bitstream> {
    Encoder::from_config(config.clone())
        .encode_image(image)
        .map(|encoded| encoded.bitstream)
}
