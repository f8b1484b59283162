// src/encode/block/dct.rs

//! 8x8 orthonormal DCT-II over block tiles.
//!
//! Tiles that run past the block edge are filled by replicating the last
//! column and row; reconstruction only writes back the samples inside the
//! block.

use std::sync::OnceLock;

pub const DCTSIZE: usize = 8;
pub const DCTSIZE2: usize = 64;

/// Natural-order index of the i-th coefficient in zigzag order.
pub const ZIGZAG: [usize; DCTSIZE2] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27, 20,
    13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58, 59,
    52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// `basis[u][x] = c(u) * cos((2x + 1) * u * pi / 16)`.
fn basis() -> &'static [[f64; DCTSIZE]; DCTSIZE] {
    static BASIS: OnceLock<[[f64; DCTSIZE]; DCTSIZE]> = OnceLock::new();
    BASIS.get_or_init(|| {
        let mut table = [[0.0; DCTSIZE]; DCTSIZE];
        for (u, row) in table.iter_mut().enumerate() {
            let scale = if u == 0 {
                (1.0 / DCTSIZE as f64).sqrt()
            } else {
                (2.0 / DCTSIZE as f64).sqrt()
            };
            for (x, v) in row.iter_mut().enumerate() {
                let angle = (2 * x + 1) as f64 * u as f64 * std::f64::consts::PI / 16.0;
                *v = scale * angle.cos();
            }
        }
        table
    })
}

/// Forward transform of one tile in natural (row-major) order.
pub fn forward_dct_8x8(samples: &[f64; DCTSIZE2]) -> [f64; DCTSIZE2] {
    let b = basis();
    let mut tmp = [0.0; DCTSIZE2];
    for y in 0..DCTSIZE {
        for u in 0..DCTSIZE {
            tmp[y * DCTSIZE + u] = (0..DCTSIZE).map(|x| b[u][x] * samples[y * DCTSIZE + x]).sum();
        }
    }
    let mut out = [0.0; DCTSIZE2];
    for v in 0..DCTSIZE {
        for u in 0..DCTSIZE {
            out[v * DCTSIZE + u] = (0..DCTSIZE).map(|y| b[v][y] * tmp[y * DCTSIZE + u]).sum();
        }
    }
    out
}

/// Inverse of [`forward_dct_8x8`].
pub fn inverse_dct_8x8(coeffs: &[f64; DCTSIZE2]) -> [f64; DCTSIZE2] {
    let b = basis();
    let mut tmp = [0.0; DCTSIZE2];
    for y in 0..DCTSIZE {
        for u in 0..DCTSIZE {
            tmp[y * DCTSIZE + u] = (0..DCTSIZE).map(|v| b[v][y] * coeffs[v * DCTSIZE + u]).sum();
        }
    }
    let mut out = [0.0; DCTSIZE2];
    for y in 0..DCTSIZE {
        for x in 0..DCTSIZE {
            out[y * DCTSIZE + x] = (0..DCTSIZE).map(|u| b[u][x] * tmp[y * DCTSIZE + u]).sum();
        }
    }
    out
}

/// Origins of the 8x8 tiles covering a `w` x `h` block, raster order.
pub fn tile_origins(w: usize, h: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..h)
        .step_by(DCTSIZE)
        .flat_map(move |ty| (0..w).step_by(DCTSIZE).map(move |tx| (tx, ty)))
}

/// Copies the tile at `(tx, ty)` out of a row-major block, replicating edges.
pub fn load_tile(samples: &[i32], w: usize, h: usize, tx: usize, ty: usize) -> [f64; DCTSIZE2] {
    let mut tile = [0.0; DCTSIZE2];
    for y in 0..DCTSIZE {
        let sy = (ty + y).min(h - 1);
        for x in 0..DCTSIZE {
            let sx = (tx + x).min(w - 1);
            tile[y * DCTSIZE + x] = f64::from(samples[sy * w + sx]);
        }
    }
    tile
}

/// Writes the in-block part of a reconstructed tile back, rounding to integers.
pub fn store_tile(tile: &[f64; DCTSIZE2], out: &mut [i32], w: usize, h: usize, tx: usize, ty: usize) {
    for y in 0..DCTSIZE.min(h - ty) {
        for x in 0..DCTSIZE.min(w - tx) {
            out[(ty + y) * w + tx + x] = tile[y * DCTSIZE + x].round() as i32;
        }
    }
}
