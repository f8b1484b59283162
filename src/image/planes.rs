// src/image/planes.rs

//! Planar, zero-centered sample buffers extracted from a [`PixelBuffer`].
//!
//! Planes are built once per encode call and then shared read-only by every
//! block worker.

use crate::encode::alpha::{AlphaColorMode, resolve_color};
use crate::image::pixel_buffer::PixelBuffer;
use log::debug;

/// Internal color representation of the encoded planes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColorModel {
    /// Reversible YCoCg-R. Chroma planes carry one extra bit.
    #[default]
    YCoCg,
    /// Untransformed RGB, stored in G, B, R plane order.
    Rgb,
}

impl ColorModel {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            ColorModel::YCoCg => 0,
            ColorModel::Rgb => 1,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(ColorModel::YCoCg),
            1 => Some(ColorModel::Rgb),
            _ => None,
        }
    }
}

/// Role of a plane in the coding pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneKind {
    Luma,
    Chroma,
    Alpha,
}

/// Identity of a plane. With [`ColorModel::Rgb`], `Y`, `U` and `V` hold G, B and R.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaneId {
    Y,
    U,
    V,
    Alpha,
}

impl PlaneId {
    pub const COLOR: [PlaneId; 3] = [PlaneId::Y, PlaneId::U, PlaneId::V];

    #[inline]
    pub fn kind(self) -> PlaneKind {
        match self {
            PlaneId::Y => PlaneKind::Luma,
            PlaneId::U | PlaneId::V => PlaneKind::Chroma,
            PlaneId::Alpha => PlaneKind::Alpha,
        }
    }
}

/// One image plane, samples centered around zero (sample minus mid-scale).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    id: PlaneId,
    width: u32,
    height: u32,
    bit_depth: u8,
    /// Signed width of the stored samples, `bit_depth` or one more for wide chroma.
    sample_bits: u8,
    samples: Vec<i16>,
}

impl Plane {
    pub fn new(id: PlaneId, width: u32, height: u32, bit_depth: u8, samples: Vec<i16>) -> Self {
        debug_assert_eq!(samples.len(), width as usize * height as usize);
        Self {
            id,
            width,
            height,
            bit_depth,
            sample_bits: bit_depth,
            samples,
        }
    }

    /// Widens the admissible sample range to `bit_depth + 1` signed bits.
    pub fn with_extra_bit(mut self) -> Self {
        self.sample_bits = self.bit_depth + 1;
        self
    }

    #[inline]
    pub fn id(&self) -> PlaneId {
        self.id
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
    pub fn bit_depth(&self) -> u8 {
        self.bit_depth
    }

    /// Smallest and largest sample value the plane can hold.
    #[inline]
    pub fn sample_range(&self) -> (i32, i32) {
        let half = 1i32 << (self.sample_bits - 1);
        (-half, half - 1)
    }

    #[inline]
    pub fn sample(&self, x: u32, y: u32) -> i16 {
        self.samples[y as usize * self.width as usize + x as usize]
    }

    #[inline]
    pub fn row(&self, y: u32) -> &[i16] {
        let w = self.width as usize;
        let start = y as usize * w;
        &self.samples[start..start + w]
    }

    #[inline]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }
}

/// Forward YCoCg-R lifting of one RGB triple. Luma is centered on `mid`,
/// chroma spans one bit more than the input.
#[inline]
pub fn rgb_to_ycocg(rgb: [u16; 3], mid: i32) -> (i16, i16, i16) {
    let r = i32::from(rgb[0]);
    let g = i32::from(rgb[1]);
    let b = i32::from(rgb[2]);

    let co = r - b;
    let t = b + (co >> 1);
    let cg = g - t;
    let y = t + (cg >> 1);

    ((y - mid) as i16, co as i16, cg as i16)
}

/// Exact inverse of [`rgb_to_ycocg`].
#[inline]
pub fn ycocg_to_rgb(ycocg: (i16, i16, i16), mid: i32) -> [u16; 3] {
    let (y, co, cg) = (i32::from(ycocg.0) + mid, i32::from(ycocg.1), i32::from(ycocg.2));
    let t = y - (cg >> 1);
    let g = cg + t;
    let b = t - (co >> 1);
    let r = b + co;
    [r as u16, g as u16, b as u16]
}

/// Builds the three color planes, applying the alpha color policy first.
pub fn color_planes(
    pixels: &PixelBuffer<'_>,
    alpha_mode: AlphaColorMode,
    model: ColorModel,
) -> [Plane; 3] {
    let (w, h) = (pixels.width(), pixels.height());
    let depth = pixels.depth();
    let max = depth.max_value();
    let mid = depth.mid_value();
    let npix = w as usize * h as usize;

    let mut p0 = Vec::with_capacity(npix);
    let mut p1 = Vec::with_capacity(npix);
    let mut p2 = Vec::with_capacity(npix);

    for y in 0..h {
        pixels.for_each_in_row(y, |_, px| {
            let rgb = resolve_color(px, alpha_mode, max);
            match model {
                ColorModel::YCoCg => {
                    let (luma, co, cg) = rgb_to_ycocg(rgb, mid);
                    p0.push(luma);
                    p1.push(co);
                    p2.push(cg);
                }
                ColorModel::Rgb => {
                    p0.push((i32::from(rgb[1]) - mid) as i16);
                    p1.push((i32::from(rgb[2]) - mid) as i16);
                    p2.push((i32::from(rgb[0]) - mid) as i16);
                }
            }
        });
    }

    debug!(
        "Extracted {:?} planes for {}x{} image ({:?})",
        model, w, h, alpha_mode
    );

    let bits = depth.bits();
    let mut u = Plane::new(PlaneId::U, w, h, bits, p1);
    let mut v = Plane::new(PlaneId::V, w, h, bits, p2);
    if model == ColorModel::YCoCg {
        u = u.with_extra_bit();
        v = v.with_extra_bit();
    }
    [Plane::new(PlaneId::Y, w, h, bits, p0), u, v]
}
