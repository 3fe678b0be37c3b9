use crate::config::{
    BoundaryMode, PatchParams, PayoffMatrix, Population, SimConfig, SimConfigError,
};
use crate::event::Event;
use crate::patch::{NeighborPayoffs, Patch, WeightOverflow};
use crate::rates::RateTable;
use crate::topology::Topology;
use std::{error::Error, fmt};

/// A migration weight of `patch` overflowed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatchOverflow {
    pub patch: usize,
    pub cause: WeightOverflow,
}

/// The sampler could not turn a pair of draws into an event.
///
/// Only reachable when the rate bookkeeping is inconsistent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SampleMiss {
    NoPatch { total: f64 },
    NoEvent { patch: usize },
    OffGrid { patch: usize, event: Event },
}

impl fmt::Display for SampleMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleMiss::NoPatch { total } => {
                write!(f, "no patch selectable with total rate {total}")
            }
            SampleMiss::NoEvent { patch } => write!(f, "patch {patch} has no selectable event"),
            SampleMiss::OffGrid { patch, event } => {
                write!(f, "event {event:?} of patch {patch} leaves the grid")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    Config(SimConfigError),
    InvalidDimensions { rows: usize, cols: usize },
    InvalidParameters { patch: usize, reason: &'static str },
    ParameterCountMismatch { expected: usize, actual: usize },
    PopulationCountMismatch { expected: usize, actual: usize },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridError::Config(e) => write!(f, "{}", e),
            GridError::InvalidDimensions { rows, cols } => {
                write!(f, "grid dimensions must be positive, got {rows}x{cols}")
            }
            GridError::InvalidParameters { patch, reason } => {
                write!(f, "invalid parameters for patch {patch}: {reason}")
            }
            GridError::ParameterCountMismatch { expected, actual } => write!(
                f,
                "expected {expected} per-patch parameter entries, got {actual}"
            ),
            GridError::PopulationCountMismatch { expected, actual } => write!(
                f,
                "expected {expected} initial populations, got {actual}"
            ),
        }
    }
}

impl From<SimConfigError> for GridError {
    fn from(err: SimConfigError) -> Self {
        GridError::Config(err)
    }
}

impl Error for GridError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GridError::Config(e) => Some(e),
            _ => None,
        }
    }
}

/// The patch grid of one run: topology, per-patch coefficients, patch state and rate table.
///
/// Topology and coefficients are fixed at construction; populations and rates are
/// replaced on every [`Grid::set_populations`] + [`Grid::recompute_rates`].
#[derive(Clone, Debug)]
pub struct Grid {
    topology: Topology,
    payoff: Vec<PayoffMatrix>,
    params: Vec<PatchParams>,
    patches: Vec<Patch>,
    rates: RateTable,
}

/// Build a grid with all populations at zero.
pub fn build_grid(
    rows: usize,
    cols: usize,
    boundary: BoundaryMode,
    payoff: Vec<PayoffMatrix>,
    params: Vec<PatchParams>,
) -> Result<Grid, GridError> {
    Grid::new(rows, cols, boundary, payoff, params)
}

impl Grid {
    pub fn new(
        rows: usize,
        cols: usize,
        boundary: BoundaryMode,
        payoff: Vec<PayoffMatrix>,
        params: Vec<PatchParams>,
    ) -> Result<Self, GridError> {
        let topology = Topology::build(rows, cols, boundary)
            .ok_or(GridError::InvalidDimensions { rows, cols })?;
        let expected = topology.len();
        for len in [payoff.len(), params.len()] {
            if len != expected {
                return Err(GridError::ParameterCountMismatch {
                    expected,
                    actual: len,
                });
            }
        }
        if let Some(patch) = payoff.iter().position(|m| !m.is_finite()) {
            return Err(GridError::InvalidParameters {
                patch,
                reason: "interaction matrix entries must be finite",
            });
        }
        for (patch, p) in params.iter().enumerate() {
            if let Some(reason) = p.defect() {
                return Err(GridError::InvalidParameters { patch, reason });
            }
        }

        Ok(Self {
            topology,
            payoff,
            params,
            patches: vec![Patch::default(); expected],
            rates: RateTable::new(rows, cols),
        })
    }

    /// Validate `config` and build its grid. Populations are not loaded.
    pub fn from_config(config: &SimConfig) -> Result<Self, GridError> {
        config.validate()?;
        Self::new(
            config.rows,
            config.cols,
            config.boundary,
            config.payoff_matrices(),
            config.patch_params(),
        )
    }

    pub fn rows(&self) -> usize {
        self.topology.rows()
    }

    pub fn cols(&self) -> usize {
        self.topology.cols()
    }

    pub fn boundary(&self) -> BoundaryMode {
        self.topology.boundary()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }

    pub fn patch(&self, i: usize, j: usize) -> &Patch {
        &self.patches[self.topology.index(i, j)]
    }

    pub fn params(&self, idx: usize) -> &PatchParams {
        &self.params[idx]
    }

    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    /// Load initial counts and clear all derived values.
    pub fn set_populations(&mut self, initial: &[Population]) -> Result<(), GridError> {
        if initial.len() != self.patches.len() {
            return Err(GridError::PopulationCountMismatch {
                expected: self.patches.len(),
                actual: initial.len(),
            });
        }
        for (patch, &population) in self.patches.iter_mut().zip(initial) {
            patch.reset(population);
        }
        self.rates = RateTable::new(self.rows(), self.cols());
        Ok(())
    }

    /// Recompute every payoff, weight and rate from the current counts.
    ///
    /// Payoffs of all patches are refreshed before any weight, since weights read
    /// neighbor payoffs.
    pub fn recompute_rates(&mut self) -> Result<(), PatchOverflow> {
        for (idx, patch) in self.patches.iter_mut().enumerate() {
            patch.update_payoff(&self.payoff[idx], &self.params[idx]);
        }
        for idx in 0..self.patches.len() {
            let neighbors = self.neighbor_payoffs(idx);
            self.patches[idx]
                .update_migration_all(&self.params[idx], &neighbors)
                .map_err(|cause| PatchOverflow { patch: idx, cause })?;
        }
        self.rates.load(self.patches.iter().map(Patch::total_rate));
        Ok(())
    }

    /// Re-sum the rate table from its patch entries. Returns the drift removed.
    pub fn refresh_rates(&mut self) -> f64 {
        self.rates.refresh()
    }

    /// Largest disagreement between the bookkeeping layers, relative to the grand total.
    ///
    /// Covers table entries vs patch totals, row sums vs re-summed rows, and the
    /// grand total vs the sum of all patch totals.
    pub fn rate_inconsistency(&self) -> f64 {
        let scale = self.rates.total().abs().max(1.0);
        let mut worst: f64 = 0.0;
        for (idx, patch) in self.patches.iter().enumerate() {
            let (i, j) = self.topology.coord(idx);
            worst = worst.max((self.rates.patch_rate(i, j) - patch.total_rate()).abs());
        }
        for (i, &row_sum) in self.rates.row_sums().iter().enumerate() {
            let fresh: f64 = self.rates.row(i).iter().sum();
            worst = worst.max((row_sum - fresh).abs());
        }
        let patch_total: f64 = self.patches.iter().map(Patch::total_rate).sum();
        worst = worst.max((self.rates.total() - patch_total).abs());
        worst / scale
    }

    fn neighbor_payoffs(&self, idx: usize) -> [Option<NeighborPayoffs>; 4] {
        let links = *self.topology.neighbors(idx);
        links.map(|nb| nb.map(|n| self.patches[n].payoffs()))
    }
}

mod phases;
#[cfg(test)]
mod tests;
