// src/encode/block/quant.rs

//! Dead-zone scalar quantizer. Steps are in 1/16 sample units.

/// Quantizes `coeff` with `step_q4`. `bias` is the rounding offset in 1/16 of
/// a step: 8 rounds to nearest, smaller values widen the dead zone.
#[inline]
pub fn quantize(coeff: i32, step_q4: u32, bias: u32) -> i32 {
    let mag = u64::from(coeff.unsigned_abs()) * 16 + u64::from(bias) * u64::from(step_q4) / 16;
    let q = (mag / u64::from(step_q4)) as i32;
    if coeff < 0 { -q } else { q }
}

/// Reconstruction value of a quantized level.
#[inline]
pub fn dequantize(level: i32, step_q4: u32) -> i32 {
    let mag = (u64::from(level.unsigned_abs()) * u64::from(step_q4) + 8) >> 4;
    let mag = mag as i32;
    if level < 0 { -mag } else { mag }
}

/// Float variant used by the DCT path.
#[inline]
pub fn quantize_f64(coeff: f64, step_q4: u32, bias: u32) -> i32 {
    let step = f64::from(step_q4) / 16.0;
    let q = (coeff.abs() / step + f64::from(bias) / 16.0).floor() as i32;
    if coeff < 0.0 { -q } else { q }
}

#[inline]
pub fn dequantize_f64(level: i32, step_q4: u32) -> f64 {
    f64::from(level) * f64::from(step_q4) / 16.0
}
