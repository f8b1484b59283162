// src/container/muxer.rs

//! Assembles coded blocks into the final container and parses it back.
//!
//! The box structure follows ISOBMFF, but the payload is this crate's own
//! block codec, not AV1. The private `avbk` brand keeps AVIF and HEIF
//! readers from mistaking the file for one they can decode.
//!
//! Layout:
//! ```text
//! ftyp  major 'avbk', compatible 'avbk'
//! meta  (full box)
//!   ispe  width, height
//!   pixi  channel count, bits per channel
//!   bhdr  block size, color model, color qindex, alpha qindex, flags
//!   btab  color block count, alpha block count, payload size of every block
//! mdat  color payloads in block order, then alpha payloads
//! ```

use crate::container::boxes::{BoxReader, BoxWriter, BOX_HEADER_SIZE, FULL_BOX_EXTRA};
use crate::encode::block::coder::CodedBlock;
use crate::image::planes::ColorModel;
use crate::utils::error::{EncodeError, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info};
use std::io::{Cursor, Read, Write};

/// Major brand of the container.
pub const BRAND: [u8; 4] = *b"avbk";
const COMPATIBLE_BRANDS: [[u8; 4]; 1] = [BRAND];

const FLAG_ALPHA: u8 = 0x01;

/// Image-level fields written into the header boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMeta {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub block_size: u32,
    pub color_model: ColorModel,
    pub color_qindex: u8,
    pub alpha_qindex: u8,
}

/// The finished, read-only output of an encode call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitstream {
    data: Vec<u8>,
}

impl Bitstream {
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Writes the whole bitstream to `writer`.
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.data)?;
        writer.flush()?;
        Ok(())
    }
}

impl AsRef<[u8]> for Bitstream {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Lays out header boxes and block payloads.
#[derive(Debug, Clone)]
pub struct BitstreamMuxer {
    limit: u64,
}

impl Default for BitstreamMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl BitstreamMuxer {
    /// Muxer with the 32-bit box size ceiling.
    pub fn new() -> Self {
        Self {
            limit: u64::from(u32::MAX),
        }
    }

    /// Lowers the output ceiling. Values above the 32-bit box size limit are
    /// capped to it.
    pub fn with_size_limit(mut self, limit: u64) -> Self {
        self.limit = limit.min(u64::from(u32::MAX));
        self
    }

    #[inline]
    pub fn size_limit(&self) -> u64 {
        self.limit
    }

    /// Assembles the container.
    ///
    /// Blocks may arrive in any order; they are sorted by index. Color indices
    /// must be exactly `0..n` and alpha indices `n..n + m`.
    pub fn mux(
        &self,
        mut color: Vec<CodedBlock>,
        alpha: Option<Vec<CodedBlock>>,
        meta: &ImageMeta,
    ) -> Result<Bitstream> {
        if color.is_empty() {
            return Err(EncodeError::EncodeFailure("no color blocks to mux".to_string()));
        }
        color.sort_by_key(|b| b.index);
        check_indices(&color, 0, "color")?;

        let mut alpha = alpha.unwrap_or_default();
        alpha.sort_by_key(|b| b.index);
        check_indices(&alpha, color.len(), "alpha")?;
        let has_alpha = !alpha.is_empty();

        let color_bytes: u64 = color.iter().map(|b| b.payload.len() as u64).sum();
        let alpha_bytes: u64 = alpha.iter().map(|b| b.payload.len() as u64).sum();
        let channels: u8 = if has_alpha { 4 } else { 3 };

        let ftyp_size = BOX_HEADER_SIZE + 8 + 4 * COMPATIBLE_BRANDS.len() as u64;
        let ispe_size = BOX_HEADER_SIZE + FULL_BOX_EXTRA + 8;
        let pixi_size = BOX_HEADER_SIZE + FULL_BOX_EXTRA + 1 + u64::from(channels);
        let bhdr_size = BOX_HEADER_SIZE + 6;
        let btab_size = BOX_HEADER_SIZE + 8 + 4 * (color.len() + alpha.len()) as u64;
        let meta_size = BOX_HEADER_SIZE + FULL_BOX_EXTRA + ispe_size + pixi_size + bhdr_size + btab_size;
        let mdat_size = BOX_HEADER_SIZE + color_bytes + alpha_bytes;
        let total = ftyp_size + meta_size + mdat_size;

        if total > self.limit {
            return Err(EncodeError::MuxOverflow {
                size: total,
                limit: self.limit,
            });
        }

        let mut writer = BoxWriter::new(Cursor::new(Vec::with_capacity(total as usize)));

        writer.open_box(b"ftyp")?;
        writer.write_all(&BRAND)?;
        writer.write_u32::<BigEndian>(0)?;
        for brand in &COMPATIBLE_BRANDS {
            writer.write_all(brand)?;
        }
        writer.close_box()?;

        writer.open_full_box(b"meta", 0, 0)?;

        writer.open_full_box(b"ispe", 0, 0)?;
        writer.write_u32::<BigEndian>(meta.width)?;
        writer.write_u32::<BigEndian>(meta.height)?;
        writer.close_box()?;

        writer.open_full_box(b"pixi", 0, 0)?;
        writer.write_u8(channels)?;
        for _ in 0..channels {
            writer.write_u8(meta.bit_depth)?;
        }
        writer.close_box()?;

        writer.open_box(b"bhdr")?;
        writer.write_u16::<BigEndian>(meta.block_size as u16)?;
        writer.write_u8(meta.color_model.to_byte())?;
        writer.write_u8(meta.color_qindex)?;
        writer.write_u8(meta.alpha_qindex)?;
        writer.write_u8(if has_alpha { FLAG_ALPHA } else { 0 })?;
        writer.close_box()?;

        writer.open_box(b"btab")?;
        writer.write_u32::<BigEndian>(color.len() as u32)?;
        writer.write_u32::<BigEndian>(alpha.len() as u32)?;
        for block in color.iter().chain(alpha.iter()) {
            writer.write_u32::<BigEndian>(block.payload.len() as u32)?;
        }
        writer.close_box()?;

        writer.close_box()?; // meta

        writer.open_box(b"mdat")?;
        for block in color.iter().chain(alpha.iter()) {
            writer.write_all(&block.payload)?;
        }
        writer.close_box()?;

        let data = writer.into_inner()?.into_inner();
        if data.len() as u64 != total {
            return Err(EncodeError::EncodeFailure(format!(
                "muxed {} bytes, expected {}",
                data.len(),
                total
            )));
        }

        info!(
            "Muxed {}x{}: {} color blocks ({} bytes), {} alpha blocks ({} bytes), {} bytes total",
            meta.width,
            meta.height,
            color.len(),
            color_bytes,
            alpha.len(),
            alpha_bytes,
            total
        );
        Ok(Bitstream { data })
    }
}

fn check_indices(blocks: &[CodedBlock], first: usize, batch: &str) -> Result<()> {
    for (i, block) in blocks.iter().enumerate() {
        if block.index != first + i {
            return Err(EncodeError::EncodeFailure(format!(
                "{} block order broken: expected index {}, found {}",
                batch,
                first + i,
                block.index
            )));
        }
    }
    Ok(())
}

/// Header fields recovered from a muxed container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub bit_depth: u8,
    pub block_size: u32,
    pub color_model: ColorModel,
    pub color_qindex: u8,
    pub alpha_qindex: u8,
    pub has_alpha: bool,
    pub color_block_sizes: Vec<u32>,
    pub alpha_block_sizes: Vec<u32>,
    /// Offset of the first payload byte in the container.
    pub mdat_offset: u64,
    pub mdat_len: u64,
}

impl ContainerInfo {
    /// Payload of block `index` (color blocks first, then alpha) inside `data`.
    pub fn payload<'a>(&self, data: &'a [u8], index: usize) -> Option<&'a [u8]> {
        let sizes: Vec<u32> = self
            .color_block_sizes
            .iter()
            .chain(self.alpha_block_sizes.iter())
            .copied()
            .collect();
        let len = *sizes.get(index)? as usize;
        let skip: u64 = sizes[..index].iter().map(|&s| u64::from(s)).sum();
        let start = (self.mdat_offset + skip) as usize;
        data.get(start..start + len)
    }
}

#[derive(Default)]
struct MetaFields {
    dims: Option<(u32, u32)>,
    pixi: Option<(u8, u8)>,
    bhdr: Option<(u32, ColorModel, u8, u8, bool)>,
    btab: Option<(Vec<u32>, Vec<u32>)>,
}

/// Parses the header boxes of a container produced by [`BitstreamMuxer`].
pub fn read_container(data: &[u8]) -> Result<ContainerInfo> {
    let mut reader = BoxReader::new(Cursor::new(data));
    let mut saw_ftyp = false;
    let mut fields = MetaFields::default();
    let mut mdat = None;

    while let Some(header) = reader.next_box()? {
        match &header.kind {
            b"ftyp" => {
                let payload = reader.read_payload(&header)?;
                if payload.get(0..4) != Some(&BRAND[..]) {
                    return Err(EncodeError::MalformedContainer(
                        "major brand is not 'avbk'".to_string(),
                    ));
                }
                saw_ftyp = true;
            }
            b"meta" => {
                let payload = reader.read_payload(&header)?;
                fields = parse_meta(&payload)?;
            }
            b"mdat" => {
                let offset = reader.skip_payload(&header)?;
                mdat = Some((offset, header.payload_size()));
            }
            _ => {
                debug!("Skipping unknown box '{}'", header.kind_str());
                reader.skip_payload(&header)?;
            }
        }
    }

    if !saw_ftyp {
        return Err(EncodeError::MalformedContainer("missing 'ftyp' box".to_string()));
    }
    let missing = |name: &str| EncodeError::MalformedContainer(format!("missing '{}' box", name));
    let (width, height) = fields.dims.ok_or_else(|| missing("ispe"))?;
    let (channels, bit_depth) = fields.pixi.ok_or_else(|| missing("pixi"))?;
    let (block_size, color_model, color_qindex, alpha_qindex, has_alpha) =
        fields.bhdr.ok_or_else(|| missing("bhdr"))?;
    let (color_block_sizes, alpha_block_sizes) = fields.btab.ok_or_else(|| missing("btab"))?;
    let (mdat_offset, mdat_len) = mdat.ok_or_else(|| missing("mdat"))?;

    let listed: u64 = color_block_sizes
        .iter()
        .chain(alpha_block_sizes.iter())
        .map(|&s| u64::from(s))
        .sum();
    if listed != mdat_len {
        return Err(EncodeError::MalformedContainer(format!(
            "block table lists {} bytes but 'mdat' holds {}",
            listed, mdat_len
        )));
    }

    Ok(ContainerInfo {
        width,
        height,
        channels,
        bit_depth,
        block_size,
        color_model,
        color_qindex,
        alpha_qindex,
        has_alpha,
        color_block_sizes,
        alpha_block_sizes,
        mdat_offset,
        mdat_len,
    })
}

fn parse_meta(payload: &[u8]) -> Result<MetaFields> {
    let mut reader = BoxReader::new(Cursor::new(payload));
    reader.read_full_box_fields()?;
    let mut fields = MetaFields::default();

    while let Some(header) = reader.next_box()? {
        let body = reader.read_payload(&header)?;
        let mut r = Cursor::new(&body[..]);
        let truncated = |_| {
            EncodeError::MalformedContainer(format!("box '{}' is truncated", header.kind_str()))
        };
        match &header.kind {
            b"ispe" => {
                r.read_u32::<BigEndian>().map_err(truncated)?;
                let w = r.read_u32::<BigEndian>().map_err(truncated)?;
                let h = r.read_u32::<BigEndian>().map_err(truncated)?;
                fields.dims = Some((w, h));
            }
            b"pixi" => {
                r.read_u32::<BigEndian>().map_err(truncated)?;
                let channels = r.read_u8().map_err(truncated)?;
                let mut depths = vec![0u8; usize::from(channels)];
                r.read_exact(&mut depths).map_err(truncated)?;
                let depth = depths.first().copied().unwrap_or(0);
                fields.pixi = Some((channels, depth));
            }
            b"bhdr" => {
                let block_size = u32::from(r.read_u16::<BigEndian>().map_err(truncated)?);
                let model_byte = r.read_u8().map_err(truncated)?;
                let model = ColorModel::from_byte(model_byte).ok_or_else(|| {
                    EncodeError::MalformedContainer(format!("unknown color model {}", model_byte))
                })?;
                let color_q = r.read_u8().map_err(truncated)?;
                let alpha_q = r.read_u8().map_err(truncated)?;
                let flags = r.read_u8().map_err(truncated)?;
                fields.bhdr = Some((block_size, model, color_q, alpha_q, flags & FLAG_ALPHA != 0));
            }
            b"btab" => {
                let n_color = r.read_u32::<BigEndian>().map_err(truncated)? as usize;
                let n_alpha = r.read_u32::<BigEndian>().map_err(truncated)? as usize;
                if (n_color + n_alpha) * 4 > body.len() {
                    return Err(EncodeError::MalformedContainer(format!(
                        "block table lists {} blocks in {} bytes",
                        n_color + n_alpha,
                        body.len()
                    )));
                }
                let mut sizes = Vec::with_capacity(n_color + n_alpha);
                for _ in 0..n_color + n_alpha {
                    sizes.push(r.read_u32::<BigEndian>().map_err(truncated)?);
                }
                let alpha = sizes.split_off(n_color);
                fields.btab = Some((sizes, alpha));
            }
            _ => debug!("Skipping unknown meta child '{}'", header.kind_str()),
        }
    }
    Ok(fields)
}
