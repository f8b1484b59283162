// src/encode/entropy/coeff_coder.rs

//! Context modelling for quantized coefficients and header integers.
//!
//! Coefficients arrive in scan order, split into segments that share a
//! frequency class. Each segment is coded in buckets of 16: a bucket flag says
//! whether anything in the bucket is nonzero, then every coefficient of an
//! active bucket gets a significance bit, a raw sign and its magnitude.

use super::bool_coder::{BitContext, BitSink};

/// Coefficients per bucket.
pub const BUCKET_SIZE: usize = 16;

/// Number of frequency classes (0 is the lowest band).
pub const FREQ_CLASSES: usize = 4;

const REM_CONTEXTS: usize = 16;
const PARAM_CONTEXTS: usize = 16;

/// A run of coefficients in scan order that share a frequency class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: usize,
    pub len: usize,
    pub class: u8,
}

/// Adaptive contexts for one independently coded block.
#[derive(Debug, Clone)]
pub struct CoeffContexts {
    bucket: [[BitContext; 2]; FREQ_CLASSES],
    zero: [[BitContext; 3]; FREQ_CLASSES],
    gt1: [[BitContext; 2]; FREQ_CLASSES],
    gt2: [BitContext; FREQ_CLASSES],
    rem: [[BitContext; REM_CONTEXTS]; FREQ_CLASSES],
    params: [BitContext; PARAM_CONTEXTS],
}

impl Default for CoeffContexts {
    fn default() -> Self {
        Self::new()
    }
}

impl CoeffContexts {
    pub fn new() -> Self {
        let ctx = BitContext::default();
        Self {
            bucket: [[ctx; 2]; FREQ_CLASSES],
            zero: [[ctx; 3]; FREQ_CLASSES],
            gt1: [[ctx; 2]; FREQ_CLASSES],
            gt2: [ctx; FREQ_CLASSES],
            rem: [[ctx; REM_CONTEXTS]; FREQ_CLASSES],
            params: [ctx; PARAM_CONTEXTS],
        }
    }

    /// Codes a signed header value (block mean, plane slopes).
    pub fn encode_param<S: BitSink>(&mut self, sink: &mut S, value: i32) {
        encode_sint(sink, &mut self.params, value);
    }
}

/// Exp-Golomb code for `value` whose unary prefix uses adaptive contexts.
pub fn encode_uint<S: BitSink>(sink: &mut S, ctxs: &mut [BitContext], value: u32) {
    let last = ctxs.len() - 1;
    let v = u64::from(value) + 1;
    let nbits = 63 - v.leading_zeros() as usize;
    for i in 0..nbits {
        sink.encode(true, &mut ctxs[i.min(last)]);
    }
    sink.encode(false, &mut ctxs[nbits.min(last)]);
    for i in (0..nbits).rev() {
        sink.encode_raw((v >> i) & 1 != 0);
    }
}

/// Signed variant of [`encode_uint`] using zigzag mapping.
pub fn encode_sint<S: BitSink>(sink: &mut S, ctxs: &mut [BitContext], value: i32) {
    let zigzag = ((value << 1) ^ (value >> 31)) as u32;
    encode_uint(sink, ctxs, zigzag);
}

/// Codes all coefficients of a block.
///
/// `coeffs` is in scan order and `segments` must cover it without overlap.
pub fn encode_coefficients<S: BitSink>(
    sink: &mut S,
    ctx: &mut CoeffContexts,
    coeffs: &[i32],
    segments: &[Segment],
) {
    for seg in segments {
        let class = usize::from(seg.class).min(FREQ_CLASSES - 1);
        let mut prev_active = false;

        for bucket in coeffs[seg.start..seg.start + seg.len].chunks(BUCKET_SIZE) {
            let active = bucket.iter().any(|&c| c != 0);
            sink.encode(active, &mut ctx.bucket[class][usize::from(prev_active)]);
            prev_active = active;
            if !active {
                continue;
            }

            let mut seen_nonzero = false;
            let mut recent = [false; 2];
            for (i, &c) in bucket.iter().enumerate() {
                let nonzero = c != 0;
                // The last coefficient of an active bucket with nothing before it
                // must be nonzero.
                let implied = i + 1 == bucket.len() && !seen_nonzero;
                if !implied {
                    let nbr = usize::from(recent[0]) + usize::from(recent[1]);
                    sink.encode(nonzero, &mut ctx.zero[class][nbr]);
                }
                if nonzero {
                    sink.encode_raw(c < 0);
                    let mag = c.unsigned_abs();
                    sink.encode(mag > 1, &mut ctx.gt1[class][usize::from(seen_nonzero)]);
                    if mag > 1 {
                        sink.encode(mag > 2, &mut ctx.gt2[class]);
                        if mag > 2 {
                            encode_uint(sink, &mut ctx.rem[class], mag - 3);
                        }
                    }
                    seen_nonzero = true;
                }
                recent = [nonzero, recent[0]];
            }
        }
    }
}
