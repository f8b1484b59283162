//! Decoded raster input: an owned [`Image`] and its borrowed [`PixelBuffer`] view.

use crate::utils::error::{EncodeError, Result};

/// Interleaved channel layout of the input samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Rgb,
    Rgba,
}

impl ChannelLayout {
    #[inline]
    pub fn channels(self) -> usize {
        match self {
            ChannelLayout::Rgb => 3,
            ChannelLayout::Rgba => 4,
        }
    }

    #[inline]
    pub fn has_alpha(self) -> bool {
        matches!(self, ChannelLayout::Rgba)
    }
}

/// Bits per sample of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleDepth {
    Eight,
    Ten,
}

impl SampleDepth {
    #[inline]
    pub fn bits(self) -> u8 {
        match self {
            SampleDepth::Eight => 8,
            SampleDepth::Ten => 10,
        }
    }

    /// Largest representable sample value (255 or 1023).
    #[inline]
    pub fn max_value(self) -> u16 {
        (1u16 << self.bits()) - 1
    }

    /// Mid-scale value used to center samples around zero.
    #[inline]
    pub fn mid_value(self) -> i32 {
        1i32 << (self.bits() - 1)
    }
}

/// Owned sample storage. 8-bit images use `U8`, 10-bit images `U16`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Samples {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl Samples {
    fn len(&self) -> usize {
        match self {
            Samples::U8(v) => v.len(),
            Samples::U16(v) => v.len(),
        }
    }
}

/// A decoded image. Read-only once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    layout: ChannelLayout,
    depth: SampleDepth,
    /// Distance between row starts, in samples.
    stride: usize,
    samples: Samples,
}

impl Image {
    /// Creates an image from row-major interleaved samples.
    ///
    /// `stride` is measured in samples and must cover at least one full row.
    /// The final row may omit the stride padding.
    pub fn new(
        width: u32,
        height: u32,
        layout: ChannelLayout,
        depth: SampleDepth,
        stride: usize,
        samples: Samples,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(EncodeError::InvalidDimension { width, height });
        }

        match (&samples, depth) {
            (Samples::U8(_), SampleDepth::Eight) | (Samples::U16(_), SampleDepth::Ten) => {}
            _ => {
                return Err(EncodeError::InvalidArgument(format!(
                    "sample storage does not match {}-bit depth",
                    depth.bits()
                )));
            }
        }

        let row_len = width as usize * layout.channels();
        if stride < row_len {
            return Err(EncodeError::InvalidBuffer {
                expected: row_len,
                actual: stride,
            });
        }

        let expected = stride * (height as usize - 1) + row_len;
        if samples.len() < expected {
            return Err(EncodeError::InvalidBuffer {
                expected,
                actual: samples.len(),
            });
        }

        Ok(Self {
            width,
            height,
            layout,
            depth,
            stride,
            samples,
        })
    }

    pub fn from_rgb8(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let stride = width as usize * 3;
        Self::new(
            width,
            height,
            ChannelLayout::Rgb,
            SampleDepth::Eight,
            stride,
            Samples::U8(data),
        )
    }

    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let stride = width as usize * 4;
        Self::new(
            width,
            height,
            ChannelLayout::Rgba,
            SampleDepth::Eight,
            stride,
            Samples::U8(data),
        )
    }

    /// 10-bit RGB samples stored in `u16`.
    pub fn from_rgb16(width: u32, height: u32, data: Vec<u16>) -> Result<Self> {
        let stride = width as usize * 3;
        Self::new(
            width,
            height,
            ChannelLayout::Rgb,
            SampleDepth::Ten,
            stride,
            Samples::U16(data),
        )
    }

    /// 10-bit RGBA samples stored in `u16`.
    pub fn from_rgba16(width: u32, height: u32, data: Vec<u16>) -> Result<Self> {
        let stride = width as usize * 4;
        Self::new(
            width,
            height,
            ChannelLayout::Rgba,
            SampleDepth::Ten,
            stride,
            Samples::U16(data),
        )
    }

    /// 8-bit grayscale, expanded to opaque RGB.
    pub fn from_gray8(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let rgb = expand_gray(&data, width, height, 1)?;
        Self::from_rgb8(width, height, rgb)
    }

    /// 8-bit grayscale with alpha, expanded to RGBA.
    pub fn from_graya8(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let rgba = expand_gray(&data, width, height, 2)?;
        Self::from_rgba8(width, height, rgba)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    #[inline]
    pub fn depth(&self) -> SampleDepth {
        self.depth
    }

    /// Borrowed view over the samples, shared by all workers of an encode call.
    pub fn pixels(&self) -> PixelBuffer<'_> {
        let samples = match &self.samples {
            Samples::U8(v) => SampleSlice::U8(v),
            Samples::U16(v) => SampleSlice::U16(v),
        };
        PixelBuffer {
            width: self.width,
            height: self.height,
            layout: self.layout,
            depth: self.depth,
            stride: self.stride,
            samples,
        }
    }
}

/// Replicates the gray sample of each pixel into R, G and B. `channels` is
/// 1 for gray and 2 for gray plus alpha.
fn expand_gray<T: Copy>(data: &[T], width: u32, height: u32, channels: usize) -> Result<Vec<T>> {
    let expected = width as usize * height as usize * channels;
    if data.len() < expected {
        return Err(EncodeError::InvalidBuffer {
            expected,
            actual: data.len(),
        });
    }
    let mut out = Vec::with_capacity(expected / channels * (channels + 2));
    for px in data[..expected].chunks_exact(channels) {
        out.extend_from_slice(&[px[0], px[0], px[0]]);
        out.extend_from_slice(&px[1..]);
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy)]
enum SampleSlice<'a> {
    U8(&'a [u8]),
    U16(&'a [u16]),
}

/// Immutable view over an image's interleaved samples.
#[derive(Debug, Clone, Copy)]
pub struct PixelBuffer<'a> {
    width: u32,
    height: u32,
    layout: ChannelLayout,
    depth: SampleDepth,
    stride: usize,
    samples: SampleSlice<'a>,
}

impl<'a> PixelBuffer<'a> {
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    #[inline]
    pub fn depth(&self) -> SampleDepth {
        self.depth
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns `[r, g, b, a]` at `(x, y)`. RGB images report an opaque alpha.
    /// 10-bit samples above the depth's maximum are clamped.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u16; 4] {
        let max = self.depth.max_value();
        let channels = self.layout.channels();
        let base = y as usize * self.stride + x as usize * channels;
        let mut px = [max; 4];
        match self.samples {
            SampleSlice::U8(data) => {
                for (c, v) in data[base..base + channels].iter().enumerate() {
                    px[c] = u16::from(*v);
                }
            }
            SampleSlice::U16(data) => {
                for (c, v) in data[base..base + channels].iter().enumerate() {
                    px[c] = (*v).min(max);
                }
            }
        }
        px
    }

    /// Visits every pixel of row `y` in order.
    pub fn for_each_in_row<F: FnMut(u32, [u16; 4])>(&self, y: u32, mut f: F) {
        let max = self.depth.max_value();
        let row_len = self.width as usize * self.layout.channels();
        let start = y as usize * self.stride;
        match self.samples {
            SampleSlice::U8(data) => {
                let row = &data[start..start + row_len];
                match self.layout {
                    ChannelLayout::Rgba => {
                        let pixels: &[[u8; 4]] = bytemuck::cast_slice(row);
                        for (x, p) in pixels.iter().enumerate() {
                            f(x as u32, p.map(u16::from));
                        }
                    }
                    ChannelLayout::Rgb => {
                        let pixels: &[[u8; 3]] = bytemuck::cast_slice(row);
                        for (x, p) in pixels.iter().enumerate() {
                            let [r, g, b] = p.map(u16::from);
                            f(x as u32, [r, g, b, max]);
                        }
                    }
                }
            }
            SampleSlice::U16(data) => {
                let row = &data[start..start + row_len];
                match self.layout {
                    ChannelLayout::Rgba => {
                        let pixels: &[[u16; 4]] = bytemuck::cast_slice(row);
                        for (x, p) in pixels.iter().enumerate() {
                            f(x as u32, p.map(|v| v.min(max)));
                        }
                    }
                    ChannelLayout::Rgb => {
                        let pixels: &[[u16; 3]] = bytemuck::cast_slice(row);
                        for (x, p) in pixels.iter().enumerate() {
                            let [r, g, b] = p.map(|v| v.min(max));
                            f(x as u32, [r, g, b, max]);
                        }
                    }
                }
            }
        }
    }
}
