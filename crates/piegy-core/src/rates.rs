/// Hierarchical sum of patch rates: per patch, per row, and the grand total.
///
/// Updates adjust the row sum and the total by the delta, so touching one patch is O(1).
/// Deltas accumulate rounding error; [`RateTable::refresh`] re-sums from the patch table.
#[derive(Clone, Debug, PartialEq)]
pub struct RateTable {
    rows: usize,
    cols: usize,
    patch_rates: Vec<f64>,
    row_sums: Vec<f64>,
    total: f64,
}

impl RateTable {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            patch_rates: vec![0.0; rows * cols],
            row_sums: vec![0.0; rows],
            total: 0.0,
        }
    }

    /// Replace every patch rate and re-sum.
    pub fn load(&mut self, rates: impl IntoIterator<Item = f64>) {
        for (slot, rate) in self.patch_rates.iter_mut().zip(rates) {
            *slot = rate;
        }
        self.refresh();
    }

    pub fn update(&mut self, i: usize, j: usize, new_rate: f64) {
        let slot = &mut self.patch_rates[i * self.cols + j];
        let delta = new_rate - *slot;
        *slot = new_rate;
        self.row_sums[i] += delta;
        self.total += delta;
    }

    pub fn update_index(&mut self, idx: usize, new_rate: f64) {
        self.update(idx / self.cols, idx % self.cols, new_rate);
    }

    /// Overwrite a row sum without touching its patches.
    #[cfg(test)]
    pub(crate) fn force_row_sum(&mut self, i: usize, value: f64) {
        self.row_sums[i] = value;
    }

    /// Recompute row sums and the total from scratch. Returns how far the total had drifted.
    pub fn refresh(&mut self) -> f64 {
        let cols = self.cols;
        for (row_sum, row) in self.row_sums.iter_mut().zip(self.patch_rates.chunks_exact(cols)) {
            *row_sum = row.iter().sum();
        }
        let fresh: f64 = self.row_sums.iter().sum();
        let drift = (fresh - self.total).abs();
        self.total = fresh;
        drift
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn row_sums(&self) -> &[f64] {
        &self.row_sums
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.patch_rates[i * self.cols..(i + 1) * self.cols]
    }

    pub fn patch_rate(&self, i: usize, j: usize) -> f64 {
        self.patch_rates[i * self.cols + j]
    }

    pub fn patch_rates(&self) -> &[f64] {
        &self.patch_rates
    }
}
