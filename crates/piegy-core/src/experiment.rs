//! Repeated runs of one configuration and their aggregation.

use crate::config::{Population, SimConfig};
use crate::grid::{Grid, GridError};
use crate::metrics::ExperimentSummary;
use crate::outcome::{RunFailure, RunOutcome};
use crate::record::Trajectory;
use crate::rng::ChaChaSource;
use crate::simulation::{RunSettings, Simulation};
use rayon::prelude::*;
use tracing::info;

/// Result of one repeat, before aggregation.
#[derive(Clone, Debug, PartialEq)]
pub struct RunResult {
    pub run_index: usize,
    pub outcome: RunOutcome,
    pub trajectory: Option<Trajectory>,
    pub events: u64,
}

/// A validated configuration, its grid template and the base seed of all repeats.
#[derive(Clone, Debug)]
pub struct Experiment {
    config: SimConfig,
    template: Grid,
    initial: Vec<Population>,
    settings: RunSettings,
    seed: u64,
}

impl Experiment {
    /// Validate `config` and build the grid once. A missing seed is drawn from OS entropy.
    pub fn new(config: SimConfig) -> Result<Self, GridError> {
        let template = Grid::from_config(&config)?;
        let initial = config.initial_populations();
        let settings = RunSettings::from(&config);
        let seed = config.seed.unwrap_or_else(rand::random);
        Ok(Self {
            config,
            template,
            initial,
            settings,
            seed,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn grid(&self) -> &Grid {
        &self.template
    }

    /// Run repeat `run_index` on a private copy of the grid.
    pub fn run_single(&self, run_index: usize) -> RunResult {
        let mut grid = self.template.clone();
        let mut rng = ChaChaSource::for_run(self.seed, run_index);
        let mut trajectory = Trajectory::new(
            grid.rows(),
            grid.cols(),
            self.settings.max_record(),
            self.settings.record_interval,
        );
        let mut sim = Simulation::new(&mut grid, self.settings);
        let outcome = sim
            .run(&self.initial, run_index, &mut rng, &mut trajectory)
            .unwrap_or_else(|e| RunFailure::general(e.to_string()).into());
        let events = sim.events();
        RunResult {
            run_index,
            trajectory: outcome.is_completed().then_some(trajectory),
            outcome,
            events,
        }
    }

    /// Run every repeat and average the completed ones.
    ///
    /// Results are folded in run-index order, so sequential and parallel
    /// execution give the same summary.
    pub fn run(&self) -> ExperimentSummary {
        let runs = self.config.runs;
        info!(
            runs,
            parallel = self.config.parallel,
            seed = self.seed,
            rows = self.config.rows,
            cols = self.config.cols,
            "experiment started"
        );
        let results: Vec<RunResult> = if self.config.parallel {
            (0..runs)
                .into_par_iter()
                .map(|r| self.run_single(r))
                .collect()
        } else {
            (0..runs).map(|r| self.run_single(r)).collect()
        };

        let mut summary = ExperimentSummary::empty(
            self.config.rows,
            self.config.cols,
            self.settings.max_time,
            self.settings.record_interval,
            self.settings.max_record(),
            self.seed,
            runs,
        );
        for result in results {
            match (result.outcome, result.trajectory) {
                (RunOutcome::Completed, Some(trajectory)) => {
                    summary.accumulate(&trajectory, result.events);
                }
                (RunOutcome::Failed { failure }, _) => {
                    summary.record_failure(result.run_index, failure);
                }
                (RunOutcome::Completed, None) => {}
            }
        }
        summary.finish();
        info!(
            completed = summary.completed_runs,
            failed = summary.failures.len(),
            events = summary.total_events,
            "experiment finished"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoundaryMode, PatchParams, PayoffMatrix, SimConfigError};

    fn small_config() -> SimConfig {
        SimConfig {
            seed: Some(12),
            rows: 2,
            cols: 2,
            max_time: 2.0,
            record_interval: 0.5,
            runs: 4,
            boundary: BoundaryMode::WrapAround,
            initial: vec![Population::new(30, 20)],
            ..SimConfig::default()
        }
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = SimConfig {
            rows: 0,
            ..small_config()
        };
        assert!(Experiment::new(config).is_err());
    }

    #[test]
    fn parallel_and_sequential_summaries_match() {
        let sequential = Experiment::new(small_config()).unwrap().run();
        let parallel = Experiment::new(SimConfig {
            parallel: true,
            ..small_config()
        })
        .unwrap()
        .run();
        assert_eq!(sequential, parallel);
        assert_eq!(sequential.completed_runs, 4);
        assert_eq!(sequential.max_record, 4);
    }

    #[test]
    fn repeats_use_distinct_streams() {
        let exp = Experiment::new(small_config()).unwrap();
        let a = exp.run_single(0);
        let b = exp.run_single(1);
        assert!(a.outcome.is_completed());
        assert_ne!(a.trajectory, b.trajectory);
        assert_eq!(a, exp.run_single(0));
    }

    #[test]
    fn first_snapshot_mean_is_the_initial_state() {
        let summary = Experiment::new(small_config()).unwrap().run();
        for i in 0..2 {
            for j in 0..2 {
                assert_eq!(summary.u_at(0, i, j), 30.0);
                assert_eq!(summary.v_at(0, i, j), 20.0);
            }
        }
    }

    #[test]
    fn overflow_check_rejects_before_any_run() {
        let config = SimConfig {
            payoff: vec![PayoffMatrix::new(1.0, 1.0, 1.0, 1.0)],
            params: vec![PatchParams {
                w_u: 1000.0,
                ..PatchParams::default()
            }],
            ..small_config()
        };
        assert!(matches!(
            Experiment::new(config),
            Err(GridError::Config(SimConfigError::OverflowRisk { patch: 0, .. }))
        ));
    }

    #[test]
    fn failed_runs_are_listed_and_excluded() {
        let config = SimConfig {
            payoff: vec![PayoffMatrix::new(1.0, 1.0, 1.0, 1.0)],
            params: vec![PatchParams {
                w_u: 1000.0,
                ..PatchParams::default()
            }],
            check_overflow: false,
            ..small_config()
        };
        let summary = Experiment::new(config).unwrap().run();
        assert_eq!(summary.completed_runs, 0);
        assert_eq!(summary.failures.len(), 4);
        assert!(summary.failures.iter().all(|f| f.failure.code() == 3));
        let indices: Vec<usize> = summary.failures.iter().map(|f| f.run_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }
}
