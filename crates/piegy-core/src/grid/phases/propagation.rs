use super::super::{Grid, PatchOverflow};
use crate::event::Signal;
use crate::topology::Direction;

impl Grid {
    /// Apply the population changes of `signal` and bring every affected rate up to date.
    ///
    /// Touched patches get payoffs and all four weights recomputed. Their other
    /// neighbors only see one weight change, the one pointing back at the touched patch.
    pub fn apply_signal(&mut self, signal: Signal) -> Result<(), PatchOverflow> {
        let (first, second) = signal.changes();
        self.patches[first.patch].apply(first.kind, first.species);
        if let Some(change) = second {
            self.patches[change.patch].apply(change.kind, change.species);
        }
        self.propagate(signal.touched())
    }

    pub(in crate::grid) fn propagate(
        &mut self,
        (first, second): (usize, Option<usize>),
    ) -> Result<(), PatchOverflow> {
        let touched = [Some(first), second];
        let is_touched = |idx: usize| idx == first || second == Some(idx);

        for &idx in touched.iter().flatten() {
            self.patches[idx].update_payoff(&self.payoff[idx], &self.params[idx]);
        }

        for &idx in touched.iter().flatten() {
            let neighbors = self.neighbor_payoffs(idx);
            self.patches[idx]
                .update_migration_all(&self.params[idx], &neighbors)
                .map_err(|cause| PatchOverflow { patch: idx, cause })?;
        }

        for &idx in touched.iter().flatten() {
            let payoffs = self.patches[idx].payoffs();
            for dir in Direction::ALL {
                let Some(nb) = self.topology.neighbor(idx, dir) else {
                    continue;
                };
                if is_touched(nb) {
                    continue;
                }
                self.patches[nb]
                    .update_migration_one(&self.params[nb], dir.opposite(), Some(payoffs))
                    .map_err(|cause| PatchOverflow { patch: nb, cause })?;
                self.rates.update_index(nb, self.patches[nb].total_rate());
            }
        }

        for &idx in touched.iter().flatten() {
            self.rates.update_index(idx, self.patches[idx].total_rate());
        }
        Ok(())
    }
}
