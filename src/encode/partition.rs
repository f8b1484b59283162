// src/encode/partition.rs

//! Splits an image into the grid of independently coded blocks.

use crate::image::planes::PlaneId;
use crate::utils::error::{EncodeError, Result};
use log::debug;

/// Largest block edge the block coder accepts.
pub const MAX_BLOCK_SIZE: u32 = 256;

/// A rectangle of the image grid, in plane sample coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BlockRect {
    #[inline]
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// One unit of work: a rectangle of one plane with its global coding index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub index: usize,
    pub plane: PlaneId,
    pub rect: BlockRect,
}

/// Tiles a `width` x `height` image with `block_size` squares in raster order.
///
/// Blocks on the right and bottom edges are truncated to the image, so the
/// result covers the image exactly once.
pub fn partition(width: u32, height: u32, block_size: u32) -> Result<Vec<BlockRect>> {
    if width == 0 || height == 0 {
        return Err(EncodeError::InvalidDimension { width, height });
    }
    if block_size == 0 {
        return Err(EncodeError::InvalidArgument(
            "block size must be non-zero".to_string(),
        ));
    }

    let cols = width.div_ceil(block_size);
    let rows = height.div_ceil(block_size);
    let mut rects = Vec::with_capacity(cols as usize * rows as usize);

    for by in 0..rows {
        let y = by * block_size;
        let h = block_size.min(height - y);
        for bx in 0..cols {
            let x = bx * block_size;
            let w = block_size.min(width - x);
            rects.push(BlockRect {
                x,
                y,
                width: w,
                height: h,
            });
        }
    }

    debug!(
        "Partitioned {}x{} into {} blocks ({}x{} grid, block size {})",
        width,
        height,
        rects.len(),
        cols,
        rows,
        block_size
    );
    Ok(rects)
}

/// Enumerates `rects` for every plane, plane-major, numbering blocks from
/// `first_index`.
pub fn plane_blocks(rects: &[BlockRect], planes: &[PlaneId], first_index: usize) -> Vec<Block> {
    planes
        .iter()
        .flat_map(|&plane| rects.iter().map(move |&rect| (plane, rect)))
        .enumerate()
        .map(|(i, (plane, rect))| Block {
            index: first_index + i,
            plane,
            rect,
        })
        .collect()
}
