/// Largest exponent accepted by `exp` when computing migration weights.
/// `exp(709.78)` is the last finite `f64`; staying below it leaves headroom
/// for the `1 +` and the later division by the weight sum.
pub const EXP_OVERFLOW_BOUND: f64 = 700.0;

/// Upper bound on `rows * cols`. Keeps the per-run record buffers addressable.
pub const MAX_PATCHES: usize = 1_000_000;

/// Upper bound on snapshots per run (`max_time / record_interval`).
pub const MAX_RECORDS: usize = 10_000_000;

/// Prime multiplier used to derive per-run RNG streams from a base seed.
/// Chosen so streams for consecutive run indices have minimal overlap.
pub const RNG_DERIVATION_PRIME: u64 = 7919;

/// Events between full re-summations of the rate table, unless configured.
pub const DEFAULT_SUM_REFRESH_INTERVAL: u64 = 10_000;

/// Relative tolerance used when comparing incrementally maintained sums
/// against fresh recomputations.
pub const RATE_TOLERANCE: f64 = 1e-9;
