use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha12Rng;

/// A reseedable stream of independent uniform draws strictly inside (0, 1).
///
/// Zero and one are both excluded: zero would make `-ln(u)` infinite and either
/// endpoint lands exactly on a cumulative-sum boundary in the event search.
pub trait UniformSource {
    fn next_unit_open_interval(&mut self) -> f64;

    fn reseed(&mut self, seed: u64);
}

/// Create a deterministic RNG from a seed.
pub fn create_rng(seed: u64) -> ChaCha12Rng {
    ChaCha12Rng::seed_from_u64(seed)
}

/// Derive the seed of one repeat from the experiment's base seed.
pub fn derive_run_seed(base_seed: u64, run_index: usize) -> u64 {
    base_seed.wrapping_add((run_index as u64).wrapping_mul(crate::constants::RNG_DERIVATION_PRIME))
}

/// ChaCha12-backed [`UniformSource`], one per run.
#[derive(Clone, Debug)]
pub struct ChaChaSource {
    rng: ChaCha12Rng,
}

impl ChaChaSource {
    const SCALE: f64 = 1.0 / (1u64 << 53) as f64;

    pub fn new(seed: u64) -> Self {
        Self {
            rng: create_rng(seed),
        }
    }

    pub fn for_run(base_seed: u64, run_index: usize) -> Self {
        Self::new(derive_run_seed(base_seed, run_index))
    }
}

impl UniformSource for ChaChaSource {
    fn next_unit_open_interval(&mut self) -> f64 {
        // 53 random bits, shifted half a step off zero: min 2^-54, max 1 - 2^-54.
        ((self.rng.next_u64() >> 11) as f64 + 0.5) * Self::SCALE
    }

    fn reseed(&mut self, seed: u64) {
        self.rng = create_rng(seed);
    }
}
