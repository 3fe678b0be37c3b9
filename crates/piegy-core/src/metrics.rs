use crate::outcome::RunFailure;
use crate::record::Trajectory;
use serde::{Deserialize, Serialize};

fn default_schema_version() -> u32 {
    1
}

fn default_compress_itv() -> usize {
    1
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailedRun {
    pub run_index: usize,
    pub failure: RunFailure,
}

/// Per-snapshot means over the completed runs of an experiment.
///
/// Buffers are flat in `[time][patch]` order, patches row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub rows: usize,
    pub cols: usize,
    pub max_time: f64,
    pub record_interval: f64,
    pub max_record: usize,
    /// Raw snapshots averaged into each stored one; 1 when never compressed.
    #[serde(default = "default_compress_itv")]
    pub compress_itv: usize,
    pub seed: u64,
    pub runs: usize,
    pub completed_runs: usize,
    #[serde(default)]
    pub failures: Vec<FailedRun>,
    #[serde(default)]
    pub total_events: u64,
    pub u: Vec<f64>,
    pub v: Vec<f64>,
    pub u_pi: Vec<f64>,
    pub v_pi: Vec<f64>,
}

impl ExperimentSummary {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn empty(
        rows: usize,
        cols: usize,
        max_time: f64,
        record_interval: f64,
        max_record: usize,
        seed: u64,
        runs: usize,
    ) -> Self {
        let len = rows * cols * max_record;
        Self {
            schema_version: default_schema_version(),
            rows,
            cols,
            max_time,
            record_interval,
            max_record,
            compress_itv: default_compress_itv(),
            seed,
            runs,
            completed_runs: 0,
            failures: Vec::new(),
            total_events: 0,
            u: vec![0.0; len],
            v: vec![0.0; len],
            u_pi: vec![0.0; len],
            v_pi: vec![0.0; len],
        }
    }

    /// Add one completed run. Buffers hold sums until [`ExperimentSummary::finish`].
    pub(crate) fn accumulate(&mut self, trajectory: &Trajectory, events: u64) {
        let n = self.rows * self.cols;
        for t in 0..self.max_record.min(trajectory.len()) {
            for p in 0..n {
                let slot = t * n + p;
                self.u[slot] += f64::from(trajectory.u_at(t, p));
                self.v[slot] += f64::from(trajectory.v_at(t, p));
                self.u_pi[slot] += trajectory.u_pi_at(t, p);
                self.v_pi[slot] += trajectory.v_pi_at(t, p);
            }
        }
        self.completed_runs += 1;
        self.total_events += events;
    }

    pub(crate) fn record_failure(&mut self, run_index: usize, failure: RunFailure) {
        self.failures.push(FailedRun { run_index, failure });
    }

    /// Turn accumulated sums into means. No-op when nothing completed.
    pub(crate) fn finish(&mut self) {
        if self.completed_runs == 0 {
            return;
        }
        let scale = 1.0 / self.completed_runs as f64;
        for buf in [&mut self.u, &mut self.v, &mut self.u_pi, &mut self.v_pi] {
            buf.iter_mut().for_each(|x| *x *= scale);
        }
    }

    pub fn patch_count(&self) -> usize {
        self.rows * self.cols
    }

    fn slot(&self, t: usize, i: usize, j: usize) -> usize {
        t * self.patch_count() + i * self.cols + j
    }

    pub fn time(&self, t: usize) -> f64 {
        t as f64 * self.record_interval
    }

    pub fn u_at(&self, t: usize, i: usize, j: usize) -> f64 {
        self.u[self.slot(t, i, j)]
    }

    pub fn v_at(&self, t: usize, i: usize, j: usize) -> f64 {
        self.v[self.slot(t, i, j)]
    }

    pub fn u_pi_at(&self, t: usize, i: usize, j: usize) -> f64 {
        self.u_pi[self.slot(t, i, j)]
    }

    pub fn v_pi_at(&self, t: usize, i: usize, j: usize) -> f64 {
        self.v_pi[self.slot(t, i, j)]
    }

    /// Time-averaged mean U of patch `(i, j)`.
    pub fn patch_mean_u(&self, i: usize, j: usize) -> f64 {
        self.patch_mean(&self.u, i, j)
    }

    pub fn patch_mean_v(&self, i: usize, j: usize) -> f64 {
        self.patch_mean(&self.v, i, j)
    }

    fn patch_mean(&self, buf: &[f64], i: usize, j: usize) -> f64 {
        if self.max_record == 0 {
            return 0.0;
        }
        let sum: f64 = (0..self.max_record).map(|t| buf[self.slot(t, i, j)]).sum();
        sum / self.max_record as f64
    }

    /// Mean total U over the grid, per snapshot.
    pub fn total_u_series(&self) -> Vec<f64> {
        total_series(&self.u, self.patch_count())
    }

    pub fn total_v_series(&self) -> Vec<f64> {
        total_series(&self.v, self.patch_count())
    }

    /// Sum of the mean U payoffs over the grid, per snapshot.
    pub fn total_u_pi_series(&self) -> Vec<f64> {
        total_series(&self.u_pi, self.patch_count())
    }

    pub fn total_v_pi_series(&self) -> Vec<f64> {
        total_series(&self.v_pi, self.patch_count())
    }

    /// Average every `itv` consecutive snapshots into one.
    ///
    /// The record interval grows by `itv` and a trailing partial window is
    /// dropped. `None` when `itv` is 0 or longer than the stored series.
    pub fn compress(&self, itv: usize) -> Option<Self> {
        if itv == 0 || itv > self.max_record {
            return None;
        }
        let n = self.patch_count();
        let max_record = self.max_record / itv;
        let window = |buf: &[f64]| -> Vec<f64> {
            let mut out = vec![0.0; max_record * n];
            for (k, chunk) in out.chunks_exact_mut(n.max(1)).enumerate() {
                for t in k * itv..(k + 1) * itv {
                    for (p, slot) in chunk.iter_mut().enumerate() {
                        *slot += buf[t * n + p];
                    }
                }
                chunk.iter_mut().for_each(|x| *x /= itv as f64);
            }
            out
        };
        Some(Self {
            record_interval: self.record_interval * itv as f64,
            max_record,
            compress_itv: self.compress_itv * itv,
            failures: self.failures.clone(),
            u: window(&self.u),
            v: window(&self.v),
            u_pi: window(&self.u_pi),
            v_pi: window(&self.v_pi),
            ..*self
        })
    }
}

fn total_series(buf: &[f64], patches: usize) -> Vec<f64> {
    buf.chunks_exact(patches.max(1))
        .map(|snap| snap.iter().sum())
        .collect()
}
