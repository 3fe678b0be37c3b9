use serde::{Deserialize, Serialize};

/// Destination of periodic snapshots.
///
/// Called once per patch for every record boundary `time_index * record_interval`.
pub trait RecordSink {
    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        run_index: usize,
        time_index: usize,
        patch_index: usize,
        u: u32,
        v: u32,
        u_pi: f64,
        v_pi: f64,
    );
}

/// Snapshots of a single run, flat in `[time][patch]` order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub rows: usize,
    pub cols: usize,
    pub record_interval: f64,
    max_record: usize,
    u: Vec<u32>,
    v: Vec<u32>,
    u_pi: Vec<f64>,
    v_pi: Vec<f64>,
}

impl Trajectory {
    /// Zero-filled storage for `max_record` snapshots of a `rows x cols` grid.
    pub fn new(rows: usize, cols: usize, max_record: usize, record_interval: f64) -> Self {
        let len = rows * cols * max_record;
        Self {
            rows,
            cols,
            record_interval,
            max_record,
            u: vec![0; len],
            v: vec![0; len],
            u_pi: vec![0.0; len],
            v_pi: vec![0.0; len],
        }
    }

    pub fn patch_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Number of snapshot slots.
    pub fn len(&self) -> usize {
        self.max_record
    }

    pub fn is_empty(&self) -> bool {
        self.max_record == 0
    }

    /// Time of snapshot `t`.
    pub fn time(&self, t: usize) -> f64 {
        t as f64 * self.record_interval
    }

    fn slot(&self, t: usize, patch: usize) -> usize {
        t * self.patch_count() + patch
    }

    pub fn u_at(&self, t: usize, patch: usize) -> u32 {
        self.u[self.slot(t, patch)]
    }

    pub fn v_at(&self, t: usize, patch: usize) -> u32 {
        self.v[self.slot(t, patch)]
    }

    pub fn u_pi_at(&self, t: usize, patch: usize) -> f64 {
        self.u_pi[self.slot(t, patch)]
    }

    pub fn v_pi_at(&self, t: usize, patch: usize) -> f64 {
        self.v_pi[self.slot(t, patch)]
    }

    /// U counts of every patch at snapshot `t`.
    pub fn u_snapshot(&self, t: usize) -> &[u32] {
        let n = self.patch_count();
        &self.u[t * n..(t + 1) * n]
    }

    pub fn v_snapshot(&self, t: usize) -> &[u32] {
        let n = self.patch_count();
        &self.v[t * n..(t + 1) * n]
    }

    /// `(U, V)` of one patch across all snapshots.
    pub fn patch_series(&self, patch: usize) -> Vec<(u32, u32)> {
        (0..self.max_record)
            .map(|t| (self.u_at(t, patch), self.v_at(t, patch)))
            .collect()
    }

    /// Total U over the grid at each snapshot.
    pub fn total_u(&self) -> Vec<u64> {
        self.u
            .chunks_exact(self.patch_count().max(1))
            .map(|snap| snap.iter().map(|&x| x as u64).sum())
            .collect()
    }

    pub fn total_v(&self) -> Vec<u64> {
        self.v
            .chunks_exact(self.patch_count().max(1))
            .map(|snap| snap.iter().map(|&x| x as u64).sum())
            .collect()
    }
}

impl RecordSink for Trajectory {
    fn record(
        &mut self,
        _run_index: usize,
        time_index: usize,
        patch_index: usize,
        u: u32,
        v: u32,
        u_pi: f64,
        v_pi: f64,
    ) {
        if time_index >= self.max_record || patch_index >= self.patch_count() {
            return;
        }
        let slot = self.slot(time_index, patch_index);
        self.u[slot] = u;
        self.v[slot] = v;
        self.u_pi[slot] = u_pi;
        self.v_pi[slot] = v_pi;
    }
}

/// Discards every snapshot.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl RecordSink for NullSink {
    fn record(&mut self, _: usize, _: usize, _: usize, _: u32, _: u32, _: f64, _: f64) {}
}
