//! Seeded pseudo-random generator.
//!
//! A 48-bit style linear congruential generator over wrapping 64-bit state.
//! The output is a pure function of the seed and the call sequence, which is
//! what makes recorded decisions replayable offline.

const MULTIPLIER: u64 = 0x5_DEEC_E66D;
const INCREMENT: u64 = 11;
const UNIT_BITS: u32 = 24;

#[derive(Debug, Clone)]
pub struct Prg {
    state: u64,
}

impl Prg {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn step(&mut self) -> u64 {
        self.state = MULTIPLIER
            .wrapping_mul(self.state)
            .wrapping_add(INCREMENT);
        self.state
    }

    /// Uniform float in `[0, 1)` with 24 bits of resolution.
    pub fn uniform_unit_interval(&mut self) -> f32 {
        let bits = (self.step() >> 25) & ((1 << UNIT_BITS) - 1);
        bits as f32 / (1u32 << UNIT_BITS) as f32
    }

    /// Uniform integer in `[low, high]`.
    ///
    /// `low > high` is treated as the single value `low`.
    pub fn uniform_int(&mut self, low: u32, high: u32) -> u32 {
        if high <= low {
            let _ = self.step();
            return low;
        }
        let span = u64::from(high - low) + 1;
        let r = f64::from(self.uniform_unit_interval());
        let offset = ((span as f64) * r) as u64;
        low + offset.min(span - 1) as u32
    }
}
