// src/image/convert.rs

//! Interop with the `image` crate: normalizing already decoded images to the
//! encoder's sample layout, and resizing.
//!
//! Anything the encoder does not take natively is brought to 8-bit RGB or
//! RGBA. Grayscale is replicated into the three color channels and 16-bit
//! samples keep their high byte.

use crate::image::pixel_buffer::{ChannelLayout, Image, SampleDepth};
use crate::utils::error::{EncodeError, Result};
use ::image::imageops::FilterType;
use ::image::{DynamicImage, ImageBuffer, Rgb, Rgba};
use log::debug;

/// Resampling filter used by [`Image::resize`].
pub const RESIZE_FILTER: FilterType = FilterType::Triangle;

#[inline]
fn high_byte(v: u16) -> u8 {
    (v >> 8) as u8
}

impl Image {
    /// Converts any decoded image into an 8-bit RGB or RGBA [`Image`].
    ///
    /// 16-bit gray, gray-alpha, RGB and RGBA inputs are reduced to their high
    /// byte. Float and other layouts go through the `image` crate's own
    /// 8-bit conversion.
    pub fn from_dynamic(img: &DynamicImage) -> Result<Self> {
        let (w, h) = (img.width(), img.height());
        match img {
            DynamicImage::ImageRgb8(buf) => Self::from_rgb8(w, h, buf.as_raw().clone()),
            DynamicImage::ImageRgba8(buf) => Self::from_rgba8(w, h, buf.as_raw().clone()),
            DynamicImage::ImageLuma8(buf) => Self::from_gray8(w, h, buf.as_raw().clone()),
            DynamicImage::ImageLumaA8(buf) => Self::from_graya8(w, h, buf.as_raw().clone()),
            DynamicImage::ImageLuma16(buf) => {
                Self::from_gray8(w, h, buf.as_raw().iter().copied().map(high_byte).collect())
            }
            DynamicImage::ImageLumaA16(buf) => {
                Self::from_graya8(w, h, buf.as_raw().iter().copied().map(high_byte).collect())
            }
            DynamicImage::ImageRgb16(buf) => {
                Self::from_rgb8(w, h, buf.as_raw().iter().copied().map(high_byte).collect())
            }
            DynamicImage::ImageRgba16(buf) => {
                Self::from_rgba8(w, h, buf.as_raw().iter().copied().map(high_byte).collect())
            }
            other if other.color().has_alpha() => {
                Self::from_rgba8(w, h, other.to_rgba8().into_raw())
            }
            other => Self::from_rgb8(w, h, other.to_rgb8().into_raw()),
        }
    }

    /// Scales the image to fit inside `max_width` x `max_height`, keeping the
    /// aspect ratio, with a triangle (bilinear) filter. Layout and depth are
    /// preserved.
    pub fn resize(&self, max_width: u32, max_height: u32) -> Result<Self> {
        if max_width == 0 || max_height == 0 {
            return Err(EncodeError::InvalidDimension {
                width: max_width,
                height: max_height,
            });
        }
        let (width, height) = fit_dimensions(self.dimensions(), (max_width, max_height));
        if (width, height) == self.dimensions() {
            return Ok(self.clone());
        }

        let scaled = self.to_dynamic()?.resize_exact(width, height, RESIZE_FILTER);
        debug!(
            "Resized {}x{} to {}x{}",
            self.width(),
            self.height(),
            width,
            height
        );
        let (w, h) = (scaled.width(), scaled.height());
        match (scaled, self.depth()) {
            (DynamicImage::ImageRgb16(buf), SampleDepth::Ten) => {
                Self::from_rgb16(w, h, buf.into_raw())
            }
            (DynamicImage::ImageRgba16(buf), SampleDepth::Ten) => {
                Self::from_rgba16(w, h, buf.into_raw())
            }
            (other, _) => Self::from_dynamic(&other),
        }
    }

    /// Tightly packed copy in the `image` crate's representation. 10-bit
    /// samples are stored unscaled in 16-bit buffers.
    fn to_dynamic(&self) -> Result<DynamicImage> {
        let pixels = self.pixels();
        let (w, h) = self.dimensions();
        let channels = self.layout().channels();
        let mut packed: Vec<u16> = Vec::with_capacity(w as usize * h as usize * channels);
        for y in 0..h {
            pixels.for_each_in_row(y, |_, px| packed.extend_from_slice(&px[..channels]));
        }

        let missing = || EncodeError::EncodeFailure(format!("cannot pack {}x{} image", w, h));
        let dynamic = match (self.layout(), self.depth()) {
            (ChannelLayout::Rgb, SampleDepth::Eight) => DynamicImage::ImageRgb8(
                ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, narrow(&packed)).ok_or_else(missing)?,
            ),
            (ChannelLayout::Rgba, SampleDepth::Eight) => DynamicImage::ImageRgba8(
                ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, narrow(&packed)).ok_or_else(missing)?,
            ),
            (ChannelLayout::Rgb, SampleDepth::Ten) => DynamicImage::ImageRgb16(
                ImageBuffer::<Rgb<u16>, _>::from_raw(w, h, packed).ok_or_else(missing)?,
            ),
            (ChannelLayout::Rgba, SampleDepth::Ten) => DynamicImage::ImageRgba16(
                ImageBuffer::<Rgba<u16>, _>::from_raw(w, h, packed).ok_or_else(missing)?,
            ),
        };
        Ok(dynamic)
    }
}

/// Largest size with the source aspect ratio that fits inside `bounds`.
fn fit_dimensions(size: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let ratio_w = f64::from(bounds.0) / f64::from(size.0);
    let ratio_h = f64::from(bounds.1) / f64::from(size.1);
    let ratio = ratio_w.min(ratio_h);
    let scale = |v: u32| ((f64::from(v) * ratio).round() as u32).clamp(1, u32::MAX);
    (scale(size.0).min(bounds.0), scale(size.1).min(bounds.1))
}

/// 8-bit samples held in `u16` back to bytes.
fn narrow(samples: &[u16]) -> Vec<u8> {
    samples.iter().map(|&v| v as u8).collect()
}
