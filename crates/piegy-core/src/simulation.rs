//! The event loop of a single run.

use crate::config::{record_count, Population, SimConfig};
use crate::constants::{DEFAULT_SUM_REFRESH_INTERVAL, RATE_TOLERANCE};
use crate::grid::{Grid, GridError};
use crate::outcome::{RunFailure, RunOutcome};
use crate::record::{RecordSink, Trajectory};
use crate::rng::{ChaChaSource, UniformSource};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Time horizon and housekeeping cadence of a run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    pub max_time: f64,
    pub record_interval: f64,
    /// Re-sum the rate table every this many events; 0 disables.
    pub sum_refresh_interval: u64,
    /// Log progress every this many percent of `max_time`; 0 disables.
    pub progress_pct: u32,
}

impl RunSettings {
    pub fn new(max_time: f64, record_interval: f64) -> Self {
        Self {
            max_time,
            record_interval,
            sum_refresh_interval: DEFAULT_SUM_REFRESH_INTERVAL,
            progress_pct: 0,
        }
    }

    pub fn max_record(&self) -> usize {
        record_count(self.max_time, self.record_interval)
    }
}

impl From<&SimConfig> for RunSettings {
    fn from(config: &SimConfig) -> Self {
        Self {
            max_time: config.max_time,
            record_interval: config.record_interval,
            sum_refresh_interval: config.sum_refresh_interval,
            progress_pct: config.progress_pct,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Ready,
    Running,
    Completed,
    Failed,
}

/// Drives one grid through runs. Each [`Simulation::run`] starts from fresh populations.
pub struct Simulation<'g> {
    grid: &'g mut Grid,
    settings: RunSettings,
    state: RunState,
    time: f64,
    events: u64,
    next_record: usize,
}

impl<'g> Simulation<'g> {
    pub fn new(grid: &'g mut Grid, settings: RunSettings) -> Self {
        Self {
            grid,
            settings,
            state: RunState::Ready,
            time: 0.0,
            events: 0,
            next_record: 0,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Simulated time reached by the last run.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Events applied by the last run.
    pub fn events(&self) -> u64 {
        self.events
    }

    /// Snapshots emitted by the last run.
    pub fn records(&self) -> usize {
        self.next_record
    }

    pub fn grid(&self) -> &Grid {
        &*self.grid
    }

    /// Reset to `initial` and simulate until `max_time` or until every rate is zero.
    ///
    /// Snapshots go to `sink` as they are passed. When the run fails, whatever
    /// the sink received is incomplete.
    pub fn run<R, S>(
        &mut self,
        initial: &[Population],
        run_index: usize,
        rng: &mut R,
        sink: &mut S,
    ) -> Result<RunOutcome, GridError>
    where
        R: UniformSource + ?Sized,
        S: RecordSink + ?Sized,
    {
        self.grid.set_populations(initial)?;
        self.state = RunState::Running;
        self.time = 0.0;
        self.events = 0;
        self.next_record = 0;

        info!(
            run = run_index,
            rows = self.grid.rows(),
            cols = self.grid.cols(),
            max_time = self.settings.max_time,
            "run started"
        );
        match self.advance(run_index, rng, sink) {
            Ok(()) => {
                self.state = RunState::Completed;
                info!(
                    run = run_index,
                    events = self.events,
                    time = self.time,
                    "run completed"
                );
                Ok(RunOutcome::Completed)
            }
            Err(failure) => {
                self.state = RunState::Failed;
                warn!(
                    run = run_index,
                    code = failure.code(),
                    events = self.events,
                    time = self.time,
                    "run failed: {failure}"
                );
                Ok(failure.into())
            }
        }
    }

    fn advance<R, S>(&mut self, run_index: usize, rng: &mut R, sink: &mut S) -> Result<(), RunFailure>
    where
        R: UniformSource + ?Sized,
        S: RecordSink + ?Sized,
    {
        let RunSettings {
            max_time,
            record_interval,
            sum_refresh_interval,
            progress_pct,
        } = self.settings;
        let max_record = self.settings.max_record();
        if max_record == 0 {
            return Err(RunFailure::SmallMaxtime {
                max_time,
                record_interval,
            });
        }
        self.grid.recompute_rates()?;

        let progress_step = if progress_pct > 0 {
            max_time * f64::from(progress_pct) / 100.0
        } else {
            f64::INFINITY
        };
        let mut next_progress = progress_step;
        let mut peak_total = self.grid.rates().total();

        loop {
            let mut total = self.grid.rates().total();
            peak_total = peak_total.max(total);
            if total < RATE_TOLERANCE * peak_total.max(1.0) {
                // Delta drift scales with the largest sums seen; it can leave a
                // residue where every patch is silent.
                self.grid.refresh_rates();
                total = self.grid.rates().total();
            }
            if !total.is_finite() || total < 0.0 {
                return Err(RunFailure::general(format!("total rate became {total}")));
            }
            if total == 0.0 {
                debug!(run = run_index, time = self.time, "all rates zero, state frozen");
                break;
            }

            let dt = -rng.next_unit_open_interval().ln() / total;
            let next_time = self.time + dt;
            self.record_before(next_time, max_record, run_index, sink);
            if next_time >= max_time {
                self.time = max_time;
                break;
            }
            self.time = next_time;

            let patch_draw = rng.next_unit_open_interval();
            let event_draw = rng.next_unit_open_interval();
            self.grid.fire(patch_draw, event_draw)?;
            self.events += 1;

            if sum_refresh_interval > 0 && self.events % sum_refresh_interval == 0 {
                let drift = self.grid.refresh_rates();
                debug!(run = run_index, events = self.events, drift, "rate sums refreshed");
            }
            if self.time >= next_progress {
                info!(
                    run = run_index,
                    percent = (self.time / max_time * 100.0).floor() as u32,
                    "progress"
                );
                while next_progress <= self.time {
                    next_progress += progress_step;
                }
            }
        }

        // Remaining boundaries see the final state.
        self.record_before(f64::INFINITY, max_record, run_index, sink);
        Ok(())
    }

    /// Emit every pending snapshot whose time is strictly before `limit`.
    fn record_before<S>(&mut self, limit: f64, max_record: usize, run_index: usize, sink: &mut S)
    where
        S: RecordSink + ?Sized,
    {
        let interval = self.settings.record_interval;
        while self.next_record < max_record && (self.next_record as f64) * interval < limit {
            for (idx, patch) in self.grid.patches().iter().enumerate() {
                sink.record(
                    run_index,
                    self.next_record,
                    idx,
                    patch.u,
                    patch.v,
                    patch.u_pi,
                    patch.v_pi,
                );
            }
            self.next_record += 1;
        }
    }
}

/// Result of [`run`]: the trajectory is present only for completed runs.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub trajectory: Option<Trajectory>,
    pub events: u64,
}

/// Run `grid` once from `initial` with a ChaCha stream seeded by `seed`.
pub fn run(
    grid: &mut Grid,
    initial: &[Population],
    max_time: f64,
    record_interval: f64,
    seed: u64,
) -> Result<RunReport, GridError> {
    run_with_settings(grid, initial, RunSettings::new(max_time, record_interval), 0, seed)
}

pub fn run_with_settings(
    grid: &mut Grid,
    initial: &[Population],
    settings: RunSettings,
    run_index: usize,
    seed: u64,
) -> Result<RunReport, GridError> {
    let mut trajectory = Trajectory::new(
        grid.rows(),
        grid.cols(),
        settings.max_record(),
        settings.record_interval,
    );
    let mut rng = ChaChaSource::new(seed);
    let mut sim = Simulation::new(grid, settings);
    let outcome = sim.run(initial, run_index, &mut rng, &mut trajectory)?;
    let events = sim.events();
    Ok(RunReport {
        trajectory: outcome.is_completed().then_some(trajectory),
        outcome,
        events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoundaryMode, PatchParams, PayoffMatrix};
    use crate::grid::build_grid;
    use crate::record::NullSink;

    fn grid(rows: usize, cols: usize, boundary: BoundaryMode) -> Grid {
        let n = rows * cols;
        build_grid(
            rows,
            cols,
            boundary,
            vec![PayoffMatrix::default(); n],
            vec![PatchParams::default(); n],
        )
        .unwrap()
    }

    /// Replays a fixed list of draws, then repeats the last one.
    struct Scripted {
        draws: Vec<f64>,
        pos: usize,
    }

    impl UniformSource for Scripted {
        fn next_unit_open_interval(&mut self) -> f64 {
            let x = self.draws[self.pos.min(self.draws.len() - 1)];
            self.pos += 1;
            x
        }

        fn reseed(&mut self, _seed: u64) {
            self.pos = 0;
        }
    }

    #[test]
    fn short_horizon_fails_before_recording() {
        let mut g = grid(1, 2, BoundaryMode::OpenEdge);
        let mut sim = Simulation::new(&mut g, RunSettings::new(0.05, 0.1));
        let mut traj = Trajectory::new(1, 2, 0, 0.1);
        let outcome = sim
            .run(&[Population::new(5, 5); 2], 0, &mut ChaChaSource::new(1), &mut traj)
            .unwrap();
        assert_eq!(outcome.code(), 2);
        assert_eq!(sim.state(), RunState::Failed);
        assert_eq!(sim.records(), 0);
    }

    #[test]
    fn population_length_mismatch_is_an_error_not_an_outcome() {
        let mut g = grid(2, 2, BoundaryMode::OpenEdge);
        let err = run(&mut g, &[Population::new(1, 1)], 1.0, 0.1, 0).unwrap_err();
        assert!(matches!(err, GridError::PopulationCountMismatch { .. }));
    }

    #[test]
    fn empty_grid_replicates_initial_state() {
        let mut g = grid(2, 2, BoundaryMode::WrapAround);
        let report = run(&mut g, &[Population::default(); 4], 1.0, 0.25, 3).unwrap();
        assert!(report.outcome.is_completed());
        assert_eq!(report.events, 0);
        let traj = report.trajectory.unwrap();
        assert_eq!(traj.len(), 4);
        for t in 0..4 {
            assert_eq!(traj.u_snapshot(t), &[0, 0, 0, 0]);
        }
    }

    #[test]
    fn records_use_state_before_the_crossing_event() {
        // Single patch, one U individual: only capacity death fires (payoff is 0).
        // Total rate kappa_u * 1 * 1 = 0.001; the first draw gives dt = -ln(0.5) / 0.001.
        let mut g = grid(1, 1, BoundaryMode::OpenEdge);
        let mut rng = Scripted {
            draws: vec![0.5, 0.5, 0.5],
            pos: 0,
        };
        let mut traj = Trajectory::new(1, 1, 10, 100.0);
        let mut sim = Simulation::new(&mut g, RunSettings::new(1000.0, 100.0));
        let outcome = sim
            .run(&[Population::new(1, 0)], 0, &mut rng, &mut traj)
            .unwrap();
        assert!(outcome.is_completed());
        assert_eq!(sim.events(), 1);
        // dt = 693.1...: records 0..=6 before the death, 7..=9 after.
        for t in 0..=6 {
            assert_eq!(traj.u_at(t, 0), 1, "t = {t}");
        }
        for t in 7..10 {
            assert_eq!(traj.u_at(t, 0), 0, "t = {t}");
        }
        assert!((sim.time() - 2f64.ln() / 0.001).abs() < 1e-9);
    }

    #[test]
    fn run_ends_at_max_time_without_applying_the_crossing_event() {
        let mut g = grid(1, 1, BoundaryMode::OpenEdge);
        // dt = -ln(0.01) / 0.001 ~ 4605 > max_time.
        let mut rng = Scripted {
            draws: vec![0.01],
            pos: 0,
        };
        let mut sim = Simulation::new(&mut g, RunSettings::new(10.0, 1.0));
        let mut traj = Trajectory::new(1, 1, 10, 1.0);
        sim.run(&[Population::new(1, 0)], 0, &mut rng, &mut traj)
            .unwrap();
        assert_eq!(sim.events(), 0);
        assert_eq!(sim.time(), 10.0);
        assert_eq!(sim.records(), 10);
        assert!((0..10).all(|t| traj.u_at(t, 0) == 1));
    }

    #[test]
    fn rerun_after_reset_is_reproducible() {
        let mut g = grid(2, 3, BoundaryMode::WrapAround);
        let initial = [Population::new(20, 10); 6];
        let a = run(&mut g, &initial, 2.0, 0.1, 77).unwrap();
        let b = run(&mut g, &initial, 2.0, 0.1, 77).unwrap();
        assert!(a.outcome.is_completed());
        assert_eq!(a, b);
        let c = run(&mut g, &initial, 2.0, 0.1, 78).unwrap();
        assert_ne!(a.trajectory, c.trajectory);
    }

    #[test]
    fn overflow_fails_the_run_and_drops_the_trajectory() {
        let params = PatchParams {
            w_u: 1000.0,
            ..PatchParams::default()
        };
        let mut g = build_grid(
            1,
            2,
            BoundaryMode::OpenEdge,
            vec![PayoffMatrix::new(1.0, 1.0, 1.0, 1.0); 2],
            vec![params; 2],
        )
        .unwrap();
        let report = run(&mut g, &[Population::new(10, 10); 2], 1.0, 0.1, 0).unwrap();
        assert_eq!(report.outcome.code(), 3);
        assert!(report.trajectory.is_none());
    }

    #[test]
    fn refresh_and_progress_do_not_change_the_path() {
        let initial = [Population::new(30, 30); 4];
        let mut g = grid(2, 2, BoundaryMode::OpenEdge);
        let plain = run(&mut g, &initial, 3.0, 0.5, 5).unwrap();
        let settings = RunSettings {
            sum_refresh_interval: 0,
            progress_pct: 10,
            ..RunSettings::new(3.0, 0.5)
        };
        let other = run_with_settings(&mut g, &initial, settings, 0, 5).unwrap();
        assert_eq!(plain.events, other.events);
        let (a, b) = (plain.trajectory.unwrap(), other.trajectory.unwrap());
        assert_eq!(a.total_u(), b.total_u());
        assert_eq!(a.total_v(), b.total_v());
    }

    #[test]
    fn extinction_freezes_without_periodic_refresh() {
        // Migration churn leaves delta drift in the table by the time the last
        // individual dies; the horizon is long enough that a residue would be sampled.
        let n = 20;
        let params = PatchParams {
            mu_u: 1.0,
            mu_v: 1.0,
            w_u: 1.0,
            w_v: 1.0,
            kappa_u: 0.5,
            kappa_v: 0.5,
        };
        let mut g = build_grid(
            1,
            n,
            BoundaryMode::OpenEdge,
            vec![PayoffMatrix::new(0.0, 0.0, 0.0, 0.0); n],
            vec![params; n],
        )
        .unwrap();
        let settings = RunSettings {
            sum_refresh_interval: 0,
            ..RunSettings::new(1e12, 1e11)
        };
        let initial = vec![Population::new(5, 5); n];
        for seed in 0..20 {
            let report = run_with_settings(&mut g, &initial, settings, 0, seed).unwrap();
            assert!(report.outcome.is_completed(), "seed {seed}: {:?}", report.outcome);
            assert!(report.events >= 200);
            let traj = report.trajectory.unwrap();
            assert_eq!(traj.total_u()[9], 0, "seed {seed}");
            assert_eq!(traj.total_v()[9], 0, "seed {seed}");
            assert_eq!(g.rates().total(), 0.0);
        }
    }

    #[test]
    fn null_sink_runs_count_events() {
        let mut g = grid(1, 3, BoundaryMode::OpenEdge);
        let mut sim = Simulation::new(&mut g, RunSettings::new(1.0, 0.5));
        let outcome = sim
            .run(
                &[Population::new(50, 50); 3],
                0,
                &mut ChaChaSource::new(9),
                &mut NullSink,
            )
            .unwrap();
        assert!(outcome.is_completed());
        assert!(sim.events() > 0);
        assert_eq!(sim.records(), 2);
    }
}
