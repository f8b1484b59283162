// src/container/boxes.rs

//! Reading and writing ISOBMFF-style boxes.
//!
//! A box is a 32-bit big-endian size (header included) followed by a
//! four-character type and the payload. Full boxes add a version byte and
//! 24 bits of flags in front of the payload.
//! - `BoxReader`: walks boxes on any `Read + Seek` source.
//! - `BoxWriter`: nests boxes on any `Write + Seek` destination and patches
//!   their sizes when they are closed.

use crate::utils::error::{EncodeError, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};

/// Size of the plain box header (size + type).
pub const BOX_HEADER_SIZE: u64 = 8;

/// Size of the version and flags fields of a full box.
pub const FULL_BOX_EXTRA: u64 = 4;

/// Header of one box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    /// Four-character type, e.g. `ftyp`.
    pub kind: [u8; 4],
    /// Total size including the 8-byte header.
    pub size: u32,
}

impl BoxHeader {
    #[inline]
    pub fn payload_size(&self) -> u64 {
        u64::from(self.size).saturating_sub(BOX_HEADER_SIZE)
    }

    /// Type as text, for diagnostics.
    pub fn kind_str(&self) -> String {
        String::from_utf8_lossy(&self.kind).into_owned()
    }
}

/// A reader for box-structured data.
pub struct BoxReader<R: Read + Seek> {
    reader: R,
}

impl<R: Read + Seek> BoxReader<R> {
    #[inline]
    pub fn new(reader: R) -> Self {
        BoxReader { reader }
    }

    /// Reads the next box header.
    ///
    /// Returns `Ok(None)` at a clean end of stream. The reader is left at the
    /// start of the payload; the caller must consume it with
    /// [`read_payload`](Self::read_payload) or [`skip_payload`](Self::skip_payload).
    pub fn next_box(&mut self) -> Result<Option<BoxHeader>> {
        let mut size_buf = [0u8; 4];
        match self.reader.read_exact(&mut size_buf) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let size = u32::from_be_bytes(size_buf);

        let mut kind = [0u8; 4];
        self.reader.read_exact(&mut kind).map_err(|_| {
            EncodeError::MalformedContainer("truncated box header".to_string())
        })?;

        if u64::from(size) < BOX_HEADER_SIZE {
            return Err(EncodeError::MalformedContainer(format!(
                "box '{}' declares size {}",
                String::from_utf8_lossy(&kind),
                size
            )));
        }
        Ok(Some(BoxHeader { kind, size }))
    }

    /// Reads the whole payload of `header`.
    pub fn read_payload(&mut self, header: &BoxHeader) -> Result<Vec<u8>> {
        let mut payload = vec![0u8; header.payload_size() as usize];
        self.reader.read_exact(&mut payload).map_err(|_| {
            EncodeError::MalformedContainer(format!("box '{}' is truncated", header.kind_str()))
        })?;
        Ok(payload)
    }

    /// Skips the payload of `header` and returns the offset where it started.
    pub fn skip_payload(&mut self, header: &BoxHeader) -> Result<u64> {
        let start = self.reader.stream_position()?;
        let end = self.reader.seek(SeekFrom::Current(header.payload_size() as i64))?;
        let len = self.reader.seek(SeekFrom::End(0))?;
        if end > len {
            return Err(EncodeError::MalformedContainer(format!(
                "box '{}' runs past the end of the data",
                header.kind_str()
            )));
        }
        self.reader.seek(SeekFrom::Start(end))?;
        Ok(start)
    }

    /// Reads the version and flags of a full box.
    pub fn read_full_box_fields(&mut self) -> Result<(u8, u32)> {
        let version = self.reader.read_u8()?;
        let flags = self.reader.read_u24::<BigEndian>()?;
        Ok((version, flags))
    }
}

/// A writer for nested boxes. The destination must implement `Seek` so box
/// sizes can be patched once their content is known.
pub struct BoxWriter<W: Write + Seek> {
    writer: W,
    // Offset of the size field of every open box.
    box_stack: Vec<u64>,
}

impl<W: Write + Seek> BoxWriter<W> {
    #[inline]
    pub fn new(writer: W) -> Self {
        BoxWriter {
            writer,
            box_stack: Vec::new(),
        }
    }

    /// Begins a box of type `kind`.
    pub fn open_box(&mut self, kind: &[u8; 4]) -> Result<()> {
        let size_pos = self.writer.stream_position()?;
        self.box_stack.push(size_pos);
        self.writer.write_u32::<BigEndian>(0)?;
        self.writer.write_all(kind)?;
        Ok(())
    }

    /// Begins a full box with the given version and 24-bit flags.
    pub fn open_full_box(&mut self, kind: &[u8; 4], version: u8, flags: u32) -> Result<()> {
        self.open_box(kind)?;
        self.writer.write_u8(version)?;
        self.writer.write_u24::<BigEndian>(flags & 0x00ff_ffff)?;
        Ok(())
    }

    /// Finishes the most recently opened box and patches its size.
    pub fn close_box(&mut self) -> Result<()> {
        let size_pos = self.box_stack.pop().ok_or_else(|| {
            EncodeError::EncodeFailure("cannot close box: no box is open".to_string())
        })?;

        let end_pos = self.writer.stream_position()?;
        let size = end_pos - size_pos;
        let size = u32::try_from(size).map_err(|_| EncodeError::MuxOverflow {
            size,
            limit: u64::from(u32::MAX),
        })?;

        self.writer.seek(SeekFrom::Start(size_pos))?;
        self.writer.write_u32::<BigEndian>(size)?;
        self.writer.seek(SeekFrom::Start(end_pos))?;
        Ok(())
    }

    /// Writes a complete box whose payload is already known.
    pub fn put_box(&mut self, kind: &[u8; 4], payload: &[u8]) -> Result<()> {
        self.open_box(kind)?;
        self.writer.write_all(payload)?;
        self.close_box()
    }

    /// Number of boxes still open.
    #[inline]
    pub fn depth(&self) -> usize {
        self.box_stack.len()
    }

    /// Returns the destination. Fails if a box is still open.
    pub fn into_inner(self) -> Result<W> {
        if !self.box_stack.is_empty() {
            return Err(EncodeError::EncodeFailure(format!(
                "{} box(es) left open",
                self.box_stack.len()
            )));
        }
        Ok(self.writer)
    }
}

impl<W: Write + Seek> Write for BoxWriter<W> {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write(buf)
    }

    #[inline]
    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}
