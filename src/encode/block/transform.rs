// src/encode/block/transform.rs

//! Reversible integer 5/3 lifting wavelet, computed in place.
//!
//! Level `l` works on the samples whose coordinates are multiples of
//! `scale = 2^(l-1)`: rows first, then columns. After `L` levels the
//! positions that are multiples of `2^L` hold the coarsest LL band, and every
//! other position holds a detail coefficient of the level that touched it last.
//! Edges use whole-sample symmetric extension.

/// Deepest decomposition the block coder signals (3 bits in the payload).
pub const MAX_LEVELS: u8 = 5;

/// Subband orientation. `HL` is horizontal detail (odd columns).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    LL,
    HL,
    LH,
    HH,
}

/// A contiguous run of coefficients of one subband in [`ScanOrder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subband {
    pub level: u8,
    pub orientation: Orientation,
    pub start: usize,
    pub len: usize,
}

impl Subband {
    /// Frequency class used for entropy contexts: 0 for the LL band, then 1
    /// for coarse detail (level 3 and up), 2 for level 2 and 3 for level 1.
    pub fn class(&self) -> u8 {
        match (self.orientation, self.level) {
            (Orientation::LL, _) => 0,
            (_, l) if l >= 3 => 1,
            (_, 2) => 2,
            _ => 3,
        }
    }
}

/// Number of levels actually applied to a `w` x `h` block when `requested`
/// are asked for. Stops once the LL band is a single sample.
pub fn effective_levels(w: usize, h: usize, requested: u8) -> u8 {
    let mut levels = 0u8;
    let mut scale = 1usize;
    while levels < requested.min(MAX_LEVELS) {
        let cols = (w - 1) / scale + 1;
        let rows = (h - 1) / scale + 1;
        if cols <= 1 && rows <= 1 {
            break;
        }
        levels += 1;
        scale *= 2;
    }
    levels
}

/// Predict and update steps along one strided line of `count` samples.
fn lift_forward(p: &mut [i32], base: usize, step: usize, count: usize) {
    if count < 2 {
        return;
    }
    let at = |k: usize| base + k * step;

    // 1-Predict
    for k in (1..count).step_by(2) {
        let left = p[at(k - 1)];
        let right = if k + 1 < count { p[at(k + 1)] } else { left };
        p[at(k)] -= (left + right) >> 1;
    }

    // 2-Update
    for k in (0..count).step_by(2) {
        let (left, right) = detail_neighbours(p, &at, k, count);
        p[at(k)] += (left + right + 2) >> 2;
    }
}

fn lift_backward(p: &mut [i32], base: usize, step: usize, count: usize) {
    if count < 2 {
        return;
    }
    let at = |k: usize| base + k * step;

    for k in (0..count).step_by(2) {
        let (left, right) = detail_neighbours(p, &at, k, count);
        p[at(k)] -= (left + right + 2) >> 2;
    }

    for k in (1..count).step_by(2) {
        let left = p[at(k - 1)];
        let right = if k + 1 < count { p[at(k + 1)] } else { left };
        p[at(k)] += (left + right) >> 1;
    }
}

#[inline]
fn detail_neighbours(p: &[i32], at: &impl Fn(usize) -> usize, k: usize, count: usize) -> (i32, i32) {
    let right = if k + 1 < count { Some(p[at(k + 1)]) } else { None };
    let left = if k > 0 { Some(p[at(k - 1)]) } else { None };
    match (left, right) {
        (Some(l), Some(r)) => (l, r),
        (Some(l), None) => (l, l),
        (None, Some(r)) => (r, r),
        (None, None) => (0, 0),
    }
}

/// Forward horizontal filter at `scale`.
pub fn filter_fh(p: &mut [i32], w: usize, h: usize, scale: usize) {
    let count = (w - 1) / scale + 1;
    for y in (0..h).step_by(scale) {
        lift_forward(p, y * w, scale, count);
    }
}

/// Forward vertical filter at `scale`.
pub fn filter_fv(p: &mut [i32], w: usize, h: usize, scale: usize) {
    let count = (h - 1) / scale + 1;
    for x in (0..w).step_by(scale) {
        lift_forward(p, x, scale * w, count);
    }
}

/// Inverse of [`filter_fh`].
pub fn filter_bh(p: &mut [i32], w: usize, h: usize, scale: usize) {
    let count = (w - 1) / scale + 1;
    for y in (0..h).step_by(scale) {
        lift_backward(p, y * w, scale, count);
    }
}

/// Inverse of [`filter_fv`].
pub fn filter_bv(p: &mut [i32], w: usize, h: usize, scale: usize) {
    let count = (h - 1) / scale + 1;
    for x in (0..w).step_by(scale) {
        lift_backward(p, x, scale * w, count);
    }
}

/// Applies `levels` decomposition levels to a row-major `w` x `h` buffer.
pub fn forward(p: &mut [i32], w: usize, h: usize, levels: u8) {
    debug_assert_eq!(p.len(), w * h);
    let mut scale = 1;
    for _ in 0..levels {
        filter_fh(p, w, h, scale);
        filter_fv(p, w, h, scale);
        scale *= 2;
    }
}

/// Exact inverse of [`forward`] with the same `levels`.
pub fn backward(p: &mut [i32], w: usize, h: usize, levels: u8) {
    debug_assert_eq!(p.len(), w * h);
    if levels == 0 {
        return;
    }
    let mut scale = 1 << (levels - 1);
    loop {
        filter_bv(p, w, h, scale);
        filter_bh(p, w, h, scale);
        if scale == 1 {
            break;
        }
        scale /= 2;
    }
}

/// Coefficient visiting order for a transformed block: coarsest LL first,
/// then HL, LH and HH of each level from coarse to fine, each in raster order.
#[derive(Debug, Clone)]
pub struct ScanOrder {
    positions: Vec<usize>,
    bands: Vec<Subband>,
}

impl ScanOrder {
    pub fn new(w: usize, h: usize, levels: u8) -> Self {
        let mut positions = Vec::with_capacity(w * h);
        let mut bands = Vec::new();

        let coarse = 1usize << levels;
        push_band(&mut positions, &mut bands, (w, h), levels, Orientation::LL, coarse, |x, y| {
            x % coarse == 0 && y % coarse == 0
        });
        for level in (1..=levels).rev() {
            let s = 1usize << (level - 1);
            let s2 = 2 * s;
            push_band(&mut positions, &mut bands, (w, h), level, Orientation::HL, s, |x, y| {
                x % s2 == s && y % s2 == 0
            });
            push_band(&mut positions, &mut bands, (w, h), level, Orientation::LH, s, |x, y| {
                x % s2 == 0 && y % s2 == s
            });
            push_band(&mut positions, &mut bands, (w, h), level, Orientation::HH, s, |x, y| {
                x % s2 == s && y % s2 == s
            });
        }

        Self { positions, bands }
    }

    /// Buffer offsets in scan order.
    #[inline]
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    #[inline]
    pub fn bands(&self) -> &[Subband] {
        &self.bands
    }
}

fn push_band<F: Fn(usize, usize) -> bool>(
    positions: &mut Vec<usize>,
    bands: &mut Vec<Subband>,
    (w, h): (usize, usize),
    level: u8,
    orientation: Orientation,
    scale: usize,
    pick: F,
) {
    let start = positions.len();
    for y in (0..h).step_by(scale) {
        for x in (0..w).step_by(scale) {
            if pick(x, y) {
                positions.push(y * w + x);
            }
        }
    }
    let len = positions.len() - start;
    if len > 0 {
        bands.push(Subband {
            level,
            orientation,
            start,
            len,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_pattern(w: usize, h: usize) -> Vec<i32> {
        (0..w * h)
            .map(|i| {
                let x = (i % w) as i32;
                let y = (i / w) as i32;
                ((x * 37 + y * 91 + x * y * 13) % 511) - 256
            })
            .collect()
    }

    #[test]
    fn test_round_trip_is_lossless() {
        for (w, h) in [(1, 1), (1, 7), (7, 1), (2, 2), (13, 9), (32, 32), (64, 33)] {
            for levels in 0..=MAX_LEVELS {
                let levels = effective_levels(w, h, levels);
                let original = test_pattern(w, h);
                let mut buf = original.clone();
                forward(&mut buf, w, h, levels);
                backward(&mut buf, w, h, levels);
                assert_eq!(buf, original, "{}x{} with {} levels", w, h, levels);
            }
        }
    }

    #[test]
    fn test_constant_block_has_no_detail() {
        let (w, h) = (16, 12);
        let mut buf = vec![-40; w * h];
        forward(&mut buf, w, h, 3);
        let scan = ScanOrder::new(w, h, 3);
        for band in scan.bands() {
            for &pos in &scan.positions()[band.start..band.start + band.len] {
                match band.orientation {
                    Orientation::LL => assert_eq!(buf[pos], -40),
                    _ => assert_eq!(buf[pos], 0),
                }
            }
        }
    }

    #[test]
    fn test_scan_order_is_permutation() {
        for (w, h, levels) in [(1, 1, 0), (5, 3, 2), (64, 64, 4), (40, 17, 5)] {
            let levels = effective_levels(w, h, levels);
            let scan = ScanOrder::new(w, h, levels);
            let mut seen = vec![false; w * h];
            for &p in scan.positions() {
                assert!(!seen[p]);
                seen[p] = true;
            }
            assert!(seen.iter().all(|&s| s));
            let covered: usize = scan.bands().iter().map(|b| b.len).sum();
            assert_eq!(covered, w * h);
        }
    }

    #[test]
    fn test_scan_band_layout() {
        let scan = ScanOrder::new(8, 8, 2);
        let summary: Vec<(u8, Orientation, usize)> = scan
            .bands()
            .iter()
            .map(|b| (b.level, b.orientation, b.len))
            .collect();
        assert_eq!(
            summary,
            vec![
                (2, Orientation::LL, 4),
                (2, Orientation::HL, 4),
                (2, Orientation::LH, 4),
                (2, Orientation::HH, 4),
                (1, Orientation::HL, 16),
                (1, Orientation::LH, 16),
                (1, Orientation::HH, 16),
            ]
        );
        assert_eq!(scan.bands()[0].class(), 0);
        assert_eq!(scan.bands()[1].class(), 2);
        assert_eq!(scan.bands()[6].class(), 3);
    }

    #[test]
    fn test_effective_levels() {
        assert_eq!(effective_levels(1, 1, 4), 0);
        assert_eq!(effective_levels(2, 1, 4), 1);
        assert_eq!(effective_levels(64, 64, 4), 4);
        assert_eq!(effective_levels(64, 64, 9), MAX_LEVELS);
        assert_eq!(effective_levels(4, 64, 5), 5);
        assert_eq!(effective_levels(3, 3, 5), 2);
    }
}
