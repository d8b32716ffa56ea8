//! Deterministic hashing helpers.
//!
//! Everything in here is a pure function of its input so that re-rendering a
//! frame, or replaying a session, never moves a letter.

/// Maps an arbitrary string key to a stable value in `[0, 1)`.
///
/// Rolling 31-multiplier over UTF-16 code units with 32-bit wraparound, then a
/// small xorshift finish so keys that differ only in a suffix spread out.
pub fn hash_to_unit(key: &str) -> f64 {
    let mut h: u32 = 0;
    for unit in key.encode_utf16() {
        h = h.wrapping_mul(31).wrapping_add(u32::from(unit));
    }
    h ^= h >> 13;
    h ^= h << 7;
    f64::from(h) / (f64::from(u32::MAX) + 1.0)
}

/// [`hash_to_unit`] of `key` followed by `suffix`, without allocating.
pub fn hash_with_suffix(key: &str, suffix: &str) -> f64 {
    let mut h: u32 = 0;
    for unit in key.encode_utf16().chain(suffix.encode_utf16()) {
        h = h.wrapping_mul(31).wrapping_add(u32::from(unit));
    }
    h ^= h >> 13;
    h ^= h << 7;
    f64::from(h) / (f64::from(u32::MAX) + 1.0)
}

pub fn hash_u64(mut value: u64) -> u64 {
    value ^= value >> 33;
    value = value.wrapping_mul(0xff51_afd7_ed55_8ccd);
    value ^= value >> 33;
    value = value.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    value ^= value >> 33;
    value
}

pub fn unit_from_hash(hash: u64) -> f32 {
    ((hash >> 40) as f32) / ((1_u64 << 24) as f32)
}

/// Seeded generator for procedural layouts. Same seed, same sequence.
#[derive(Debug, Clone)]
pub struct SeededRng {
    state: u64,
}

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed ^ 0x9E37_79B9_7F4A_7C15,
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        hash_u64(self.state)
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        unit_from_hash(self.next_u64())
    }

    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        min + self.next_f32() * (max - min)
    }

    /// Uniform in `[-half_span, half_span)`.
    pub fn centered(&mut self, half_span: f32) -> f32 {
        (self.next_f32() - 0.5) * 2.0 * half_span
    }

    pub fn chance(&mut self, probability: f32) -> bool {
        self.next_f32() < probability.clamp(0.0, 1.0)
    }
}
