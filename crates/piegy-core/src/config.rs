use serde::{Deserialize, Serialize};

/// Edge handling of the patch grid.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryMode {
    /// Zero-flux edges: patches on the rim have 2 or 3 neighbors.
    #[default]
    #[serde(alias = "zero_flux")]
    OpenEdge,
    /// Toroidal grid: indices wrap, every patch has 4 neighbors.
    #[serde(alias = "periodic")]
    WrapAround,
}

/// Initial population of one patch.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Population {
    pub u: u32,
    pub v: u32,
}

impl Population {
    pub const fn new(u: u32, v: u32) -> Self {
        Self { u, v }
    }
}

/// The 2x2 interaction matrix of one patch, flattened row-major.
///
/// `uu` is what a U individual earns against U, `uv` against V, and so on.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct PayoffMatrix {
    pub uu: f64,
    pub uv: f64,
    pub vu: f64,
    pub vv: f64,
}

impl PayoffMatrix {
    pub const fn new(uu: f64, uv: f64, vu: f64, vv: f64) -> Self {
        Self { uu, uv, vu, vv }
    }

    pub fn is_finite(&self) -> bool {
        self.uu.is_finite() && self.uv.is_finite() && self.vu.is_finite() && self.vv.is_finite()
    }

    pub fn max_abs_entry(&self) -> f64 {
        self.uu.abs().max(self.uv.abs()).max(self.vu.abs()).max(self.vv.abs())
    }
}

impl From<[f64; 4]> for PayoffMatrix {
    fn from(x: [f64; 4]) -> Self {
        Self::new(x[0], x[1], x[2], x[3])
    }
}

impl From<PayoffMatrix> for [f64; 4] {
    fn from(m: PayoffMatrix) -> Self {
        [m.uu, m.uv, m.vu, m.vv]
    }
}

impl Default for PayoffMatrix {
    fn default() -> Self {
        Self::new(-1.0, 4.0, 0.0, 2.0)
    }
}

/// Per-patch rate coefficients.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchParams {
    /// Migration rate coefficient of U.
    pub mu_u: f64,
    /// Migration rate coefficient of V.
    pub mu_v: f64,
    /// Selection strength of U towards neighbor payoff.
    pub w_u: f64,
    /// Selection strength of V towards neighbor payoff.
    pub w_v: f64,
    /// Carrying-capacity death coefficient of U.
    pub kappa_u: f64,
    /// Carrying-capacity death coefficient of V.
    pub kappa_v: f64,
}

impl Default for PatchParams {
    fn default() -> Self {
        Self {
            mu_u: 0.5,
            mu_v: 0.5,
            w_u: 10.0,
            w_v: 10.0,
            kappa_u: 0.001,
            kappa_v: 0.001,
        }
    }
}

impl PatchParams {
    /// Reason the coefficients are unusable, if any.
    pub fn defect(&self) -> Option<&'static str> {
        if !(self.mu_u.is_finite() && self.mu_u >= 0.0 && self.mu_v.is_finite() && self.mu_v >= 0.0)
        {
            return Some("migration coefficients must be finite and non-negative");
        }
        if !(self.kappa_u.is_finite()
            && self.kappa_u >= 0.0
            && self.kappa_v.is_finite()
            && self.kappa_v >= 0.0)
        {
            return Some("capacity coefficients must be finite and non-negative");
        }
        if !(self.w_u.is_finite() && self.w_v.is_finite()) {
            return Some("selection coefficients must be finite");
        }
        None
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Base seed for reproducible experiments. `None` draws one from OS entropy.
    pub seed: Option<u64>,
    /// Number of grid rows (N).
    pub rows: usize,
    /// Number of grid columns (M).
    pub cols: usize,
    /// Simulated time horizon of every run.
    pub max_time: f64,
    /// Spacing of recorded snapshots in simulated time.
    pub record_interval: f64,
    /// Number of independent repeats.
    pub runs: usize,
    /// Edge handling of the grid.
    pub boundary: BoundaryMode,
    /// Initial populations, one per patch in row-major order, or a single entry for all.
    pub initial: Vec<Population>,
    /// Interaction matrices, one per patch or a single entry for all.
    pub payoff: Vec<PayoffMatrix>,
    /// Rate coefficients, one per patch or a single entry for all.
    pub params: Vec<PatchParams>,
    /// Events between full re-summations of the rate table (0 = never).
    pub sum_refresh_interval: u64,
    /// Log progress every this many percent of `max_time` (0 = silent).
    pub progress_pct: u32,
    /// Execute repeats on the rayon pool.
    pub parallel: bool,
    /// Reject, before any run, selection strengths that could overflow a migration weight.
    pub check_overflow: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: Some(36),
            rows: 1,
            cols: 100,
            max_time: 100.0,
            record_interval: 0.1,
            runs: 5,
            boundary: BoundaryMode::OpenEdge,
            initial: vec![Population::new(400, 200)],
            payoff: vec![PayoffMatrix::default()],
            params: vec![PatchParams::default()],
            sum_refresh_interval: crate::constants::DEFAULT_SUM_REFRESH_INTERVAL,
            progress_pct: 0,
            parallel: false,
            check_overflow: true,
        }
    }
}

macro_rules! define_sim_config_error {
    (
        $(
            $variant:ident $( { $($field:ident : $type:ty),* } )? => $fmt:literal $(, $arg:expr)*
        );* $(;)?
    ) => {
        #[derive(Debug, Clone, PartialEq)]
        pub enum SimConfigError {
            $(
                $variant $( { $($field : $type),* } )?,
            )*
        }

        impl std::fmt::Display for SimConfigError {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        Self::$variant $( { $($field),* } )? => write!(f, $fmt $(, $arg)*),
                    )*
                }
            }
        }
    };
}

define_sim_config_error! {
    InvalidDimensions { rows: usize, cols: usize } => "grid dimensions must be positive, got {}x{}", rows, cols;
    TooManyPatches { max: usize, actual: usize } => "Too many patches: {} > max {}", actual, max;
    InvalidMaxTime => "max_time must be positive and finite";
    InvalidRecordInterval => "record_interval must be positive and finite";
    TooManyRecords { max: usize, actual: usize } => "max_time / record_interval yields {} records > max {}", actual, max;
    InvalidRuns => "runs must be greater than 0";
    InitialLengthMismatch { expected: usize, actual: usize } => "initial must have 1 or {expected} entries, got {actual}";
    PayoffLengthMismatch { expected: usize, actual: usize } => "payoff must have 1 or {expected} entries, got {actual}";
    ParamsLengthMismatch { expected: usize, actual: usize } => "params must have 1 or {expected} entries, got {actual}";
    NonFinitePayoff { patch: usize } => "payoff matrix of patch {} must be finite", patch;
    InvalidPatchParams { patch: usize, reason: &'static str } => "params of patch {}: {}", patch, reason;
    InvalidProgressPct => "progress_pct must be within [0,100]";
    OverflowRisk { patch: usize, exponent: f64 } => "patch {}: |w| * max|payoff| = {} exceeds {}; lower the selection strength", patch, exponent, crate::constants::EXP_OVERFLOW_BOUND;
}

impl std::error::Error for SimConfigError {}

impl SimConfig {
    pub const MAX_PATCHES: usize = crate::constants::MAX_PATCHES;

    pub const MAX_RECORDS: usize = crate::constants::MAX_RECORDS;

    pub fn validate(&self) -> Result<(), SimConfigError> {
        self.validate_dimensions()?;
        self.validate_time()?;
        self.validate_runs()?;
        self.validate_patch_vectors()?;
        if self.check_overflow {
            self.validate_overflow()?;
        }
        Ok(())
    }

    pub fn patch_count(&self) -> usize {
        self.rows.saturating_mul(self.cols)
    }

    /// Number of snapshots a completed run stores.
    pub fn max_record(&self) -> usize {
        record_count(self.max_time, self.record_interval)
    }

    /// Initial populations expanded to one entry per patch.
    pub fn initial_populations(&self) -> Vec<Population> {
        broadcast(&self.initial, self.patch_count())
    }

    /// Interaction matrices expanded to one entry per patch.
    pub fn payoff_matrices(&self) -> Vec<PayoffMatrix> {
        broadcast(&self.payoff, self.patch_count())
    }

    /// Rate coefficients expanded to one entry per patch.
    pub fn patch_params(&self) -> Vec<PatchParams> {
        broadcast(&self.params, self.patch_count())
    }

    fn validate_dimensions(&self) -> Result<(), SimConfigError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(SimConfigError::InvalidDimensions {
                rows: self.rows,
                cols: self.cols,
            });
        }
        let patches = self
            .rows
            .checked_mul(self.cols)
            .unwrap_or(usize::MAX);
        if patches > Self::MAX_PATCHES {
            return Err(SimConfigError::TooManyPatches {
                max: Self::MAX_PATCHES,
                actual: patches,
            });
        }
        Ok(())
    }

    fn validate_time(&self) -> Result<(), SimConfigError> {
        if !(self.max_time.is_finite() && self.max_time > 0.0) {
            return Err(SimConfigError::InvalidMaxTime);
        }
        if !(self.record_interval.is_finite() && self.record_interval > 0.0) {
            return Err(SimConfigError::InvalidRecordInterval);
        }
        let records = self.max_record();
        if records > Self::MAX_RECORDS {
            return Err(SimConfigError::TooManyRecords {
                max: Self::MAX_RECORDS,
                actual: records,
            });
        }
        Ok(())
    }

    fn validate_runs(&self) -> Result<(), SimConfigError> {
        if self.runs == 0 {
            return Err(SimConfigError::InvalidRuns);
        }
        if self.progress_pct > 100 {
            return Err(SimConfigError::InvalidProgressPct);
        }
        Ok(())
    }

    fn validate_patch_vectors(&self) -> Result<(), SimConfigError> {
        let expected = self.patch_count();
        let fits = |len: usize| len == 1 || len == expected;
        if !fits(self.initial.len()) {
            return Err(SimConfigError::InitialLengthMismatch {
                expected,
                actual: self.initial.len(),
            });
        }
        if !fits(self.payoff.len()) {
            return Err(SimConfigError::PayoffLengthMismatch {
                expected,
                actual: self.payoff.len(),
            });
        }
        if !fits(self.params.len()) {
            return Err(SimConfigError::ParamsLengthMismatch {
                expected,
                actual: self.params.len(),
            });
        }
        if let Some(patch) = self.payoff.iter().position(|m| !m.is_finite()) {
            return Err(SimConfigError::NonFinitePayoff { patch });
        }
        for (patch, params) in self.params.iter().enumerate() {
            if let Some(reason) = params.defect() {
                return Err(SimConfigError::InvalidPatchParams { patch, reason });
            }
        }
        Ok(())
    }

    /// Payoffs are weighted averages of matrix entries, so `|w| * max|entry|`
    /// bounds every exponent a run can reach.
    fn validate_overflow(&self) -> Result<(), SimConfigError> {
        let matrices = self.payoff_matrices();
        let params = self.patch_params();
        for (patch, (matrix, params)) in matrices.iter().zip(&params).enumerate() {
            let exponent = params.w_u.abs().max(params.w_v.abs()) * matrix.max_abs_entry();
            if !exponent.is_finite() || exponent > crate::constants::EXP_OVERFLOW_BOUND {
                return Err(SimConfigError::OverflowRisk { patch, exponent });
            }
        }
        Ok(())
    }
}

/// `floor(max_time / record_interval)`, nudged so exact multiples are not lost to rounding.
pub fn record_count(max_time: f64, record_interval: f64) -> usize {
    if !(max_time.is_finite() && record_interval.is_finite() && record_interval > 0.0) {
        return 0;
    }
    let ratio = max_time / record_interval;
    if ratio <= 0.0 {
        return 0;
    }
    (ratio * (1.0 + f64::EPSILON * 4.0)).floor() as usize
}

fn broadcast<T: Copy>(values: &[T], count: usize) -> Vec<T> {
    match values {
        [single] => vec![*single; count],
        _ => values.to_vec(),
    }
}
