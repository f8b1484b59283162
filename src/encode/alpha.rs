// src/encode/alpha.rs

//! Alpha channel handling: the color policy applied under transparent pixels
//! and the alpha plane's own encode batch.

use crate::encode::block::coder::{CodedBlock, TransformCoder};
use crate::encode::partition::{plane_blocks, BlockRect};
use crate::encode::rate::{QuantizationParams, SearchEffort};
use crate::image::pixel_buffer::PixelBuffer;
use crate::image::planes::{Plane, PlaneId};
use crate::utils::error::Result;
use crate::utils::threads::WorkScheduler;
use log::debug;
use std::sync::atomic::AtomicBool;

/// How color is stored relative to alpha.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AlphaColorMode {
    /// Color under fully transparent pixels is kept verbatim ("dirty alpha").
    UnassociatedDirty,
    /// Color under fully transparent pixels is reset to black before coding.
    #[default]
    UnassociatedClean,
    /// Color is multiplied by alpha. Implies the clean policy.
    Premultiplied,
}

impl AlphaColorMode {
    /// Maps the `dirty_alpha` switch onto a mode.
    pub fn from_dirty_alpha(dirty: bool) -> Self {
        if dirty {
            AlphaColorMode::UnassociatedDirty
        } else {
            AlphaColorMode::UnassociatedClean
        }
    }

    #[inline]
    pub fn is_dirty(self) -> bool {
        matches!(self, AlphaColorMode::UnassociatedDirty)
    }
}

/// Color of an `[r, g, b, a]` pixel as it will be coded under `mode`.
#[inline]
pub fn resolve_color(px: [u16; 4], mode: AlphaColorMode, max: u16) -> [u16; 3] {
    let [r, g, b, a] = px;
    match mode {
        AlphaColorMode::UnassociatedDirty => [r, g, b],
        _ if a == 0 => [0, 0, 0],
        AlphaColorMode::UnassociatedClean => [r, g, b],
        AlphaColorMode::Premultiplied => {
            if a >= max {
                return [r, g, b];
            }
            let (a, max) = (u32::from(a), u32::from(max));
            [r, g, b].map(|c| ((u32::from(c) * a + max / 2) / max) as u16)
        }
    }
}

/// Extracts the centered alpha plane, or `None` when there is nothing to
/// code (no alpha channel, or every pixel fully opaque).
pub fn alpha_plane(pixels: &PixelBuffer<'_>) -> Option<Plane> {
    if !pixels.layout().has_alpha() {
        return None;
    }
    let depth = pixels.depth();
    let max = depth.max_value();
    let mid = depth.mid_value();
    let (w, h) = (pixels.width(), pixels.height());

    let mut opaque = true;
    let mut samples = Vec::with_capacity(w as usize * h as usize);
    for y in 0..h {
        pixels.for_each_in_row(y, |_, px| {
            opaque &= px[3] == max;
            samples.push((i32::from(px[3]) - mid) as i16);
        });
    }

    if opaque {
        debug!("Alpha channel is fully opaque, dropping it");
        return None;
    }
    Some(Plane::new(PlaneId::Alpha, w, h, depth.bits(), samples))
}

/// Encodes the alpha plane as an independent batch of blocks.
pub struct AlphaCoder<'a> {
    coder: TransformCoder<'a>,
}

impl<'a> AlphaCoder<'a> {
    pub fn new(params: &'a QuantizationParams, effort: &'a SearchEffort) -> Self {
        Self {
            coder: TransformCoder::new(params, effort),
        }
    }

    /// Codes every block of `plane` on `scheduler`, numbering blocks from
    /// `first_index`. Results come back in block order.
    ///
    /// `cancelled` is shared with the color batch of the same encode call.
    pub fn encode_alpha(
        &self,
        scheduler: &WorkScheduler,
        cancelled: &AtomicBool,
        plane: &Plane,
        rects: &[BlockRect],
        first_index: usize,
    ) -> Result<Vec<CodedBlock>> {
        let blocks = plane_blocks(rects, &[PlaneId::Alpha], first_index);
        let coded = scheduler.run_parallel_with(cancelled, &blocks, |block| {
            self.coder.encode_block(block, plane)
        })?;
        debug!(
            "Alpha batch: {} blocks, {} bytes",
            coded.len(),
            coded.iter().map(CodedBlock::size).sum::<usize>()
        );
        Ok(coded)
    }
}
