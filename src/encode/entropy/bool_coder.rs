// src/encode/entropy/bool_coder.rs

//! Adaptive binary arithmetic coding.
//!
//! [`BoolEncoder`] is a boolean range coder with carry propagation into the
//! already emitted bytes. [`CostCounter`] accepts the same calls but only
//! accumulates the ideal code length, which is what mode decision needs.
//! Both sit behind [`BitSink`] so the coefficient coder is written once.

use std::sync::OnceLock;

/// Adaptation speed of the context probabilities (larger is slower).
const ADAPT_SHIFT: u32 = 5;

/// Fractional bits per whole bit in [`CostCounter`] results.
pub const COST_SCALE: u32 = 256;

/// Statistical context for one binary decision. Holds the probability that the
/// next bit is `false`, in 1/65536 units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitContext(u16);

impl Default for BitContext {
    fn default() -> Self {
        BitContext(0x8000)
    }
}

impl BitContext {
    /// 8-bit probability of `false` used by the coder, never 0.
    #[inline(always)]
    pub fn prob(self) -> u8 {
        ((self.0 >> 8) as u8).max(1)
    }

    #[inline(always)]
    fn update(&mut self, bit: bool) {
        if bit {
            self.0 -= self.0 >> ADAPT_SHIFT;
        } else {
            self.0 += (0xffff - self.0) >> ADAPT_SHIFT;
        }
    }
}

/// Destination for coded decisions.
pub trait BitSink {
    /// Codes `bit` under `ctx` and adapts the context.
    fn encode(&mut self, bit: bool, ctx: &mut BitContext);

    /// Codes `bit` at a fixed probability of one half.
    fn encode_raw(&mut self, bit: bool);

    /// Codes the low `bits` bits of `value`, most significant first.
    fn encode_literal(&mut self, value: u32, bits: u32) {
        for i in (0..bits).rev() {
            self.encode_raw((value >> i) & 1 != 0);
        }
    }
}

/// Boolean arithmetic encoder producing a byte payload.
pub struct BoolEncoder {
    output: Vec<u8>,
    range: u32,
    low: u32,
    count: i32,
}

impl Default for BoolEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BoolEncoder {
    pub fn new() -> Self {
        Self {
            output: Vec::new(),
            range: 255,
            low: 0,
            count: -24,
        }
    }

    /// Number of whole bytes emitted so far.
    #[inline]
    pub fn tell_bytes(&self) -> usize {
        self.output.len()
    }

    /// Codes `bit` where `prob` is the probability of `false` in 1/256 units.
    pub fn encode_bool(&mut self, bit: bool, prob: u8) {
        let split = 1 + (((self.range - 1) * u32::from(prob)) >> 8);
        if bit {
            self.low += split;
            self.range -= split;
        } else {
            self.range = split;
        }

        let mut shift = self.range.leading_zeros() as i32 - 24;
        self.range <<= shift;
        self.count += shift;

        if self.count >= 0 {
            let offset = shift - self.count;
            if (self.low << (offset - 1)) & 0x8000_0000 != 0 {
                self.propagate_carry();
            }
            self.output.push((self.low >> (24 - offset)) as u8);
            self.low = (self.low << offset) & 0x00ff_ffff;
            shift = self.count;
            self.count -= 8;
        }

        self.low <<= shift;
    }

    fn propagate_carry(&mut self) {
        let mut x = self.output.len();
        while x > 0 && self.output[x - 1] == 0xff {
            self.output[x - 1] = 0;
            x -= 1;
        }
        if x > 0 {
            self.output[x - 1] += 1;
        }
    }

    /// Flushes the coder state and returns the payload.
    pub fn finish(mut self) -> Vec<u8> {
        for _ in 0..32 {
            self.encode_bool(false, 128);
        }
        self.output
    }
}

impl BitSink for BoolEncoder {
    #[inline(always)]
    fn encode(&mut self, bit: bool, ctx: &mut BitContext) {
        self.encode_bool(bit, ctx.prob());
        ctx.update(bit);
    }

    #[inline(always)]
    fn encode_raw(&mut self, bit: bool) {
        self.encode_bool(bit, 128);
    }
}

/// `-log2(p / 256) * COST_SCALE` for every 8-bit probability.
fn cost_table() -> &'static [u32; 256] {
    static TABLE: OnceLock<[u32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u32; 256];
        for (p, entry) in table.iter_mut().enumerate().skip(1) {
            let bits = -(p as f64 / 256.0).log2();
            *entry = (bits * f64::from(COST_SCALE)).round() as u32;
        }
        table[0] = table[1];
        table
    })
}

/// Rate estimator with the same interface as [`BoolEncoder`].
#[derive(Debug, Default, Clone)]
pub struct CostCounter {
    cost: u64,
}

impl CostCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulated cost in 1/[`COST_SCALE`] bits.
    #[inline]
    pub fn cost(&self) -> u64 {
        self.cost
    }

    #[inline]
    pub fn bits(&self) -> f64 {
        self.cost as f64 / f64::from(COST_SCALE)
    }
}

impl BitSink for CostCounter {
    #[inline(always)]
    fn encode(&mut self, bit: bool, ctx: &mut BitContext) {
        let p = ctx.prob();
        let table = cost_table();
        self.cost += u64::from(if bit {
            table[256 - usize::from(p)]
        } else {
            table[usize::from(p)]
        });
        ctx.update(bit);
    }

    #[inline(always)]
    fn encode_raw(&mut self, _bit: bool) {
        self.cost += u64::from(COST_SCALE);
    }
}
