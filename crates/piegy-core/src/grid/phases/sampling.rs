use super::super::{Grid, SampleMiss};
use crate::event::{make_signal, Signal};
use crate::outcome::RunFailure;
use crate::sampler::{find_event, find_patch};

impl Grid {
    /// Select the next event: a patch by `patch_draw`, then one of its events by `event_draw`.
    pub fn sample_signal(&self, patch_draw: f64, event_draw: f64) -> Result<Signal, SampleMiss> {
        let pick = find_patch(&self.rates, patch_draw).ok_or(SampleMiss::NoPatch {
            total: self.rates.total(),
        })?;
        let patch = self.topology.index(pick.i, pick.j);
        let event =
            find_event(&self.patches[patch], event_draw).ok_or(SampleMiss::NoEvent { patch })?;
        make_signal(
            self.rows(),
            self.cols(),
            self.boundary(),
            pick.i,
            pick.j,
            event,
        )
        .ok_or(SampleMiss::OffGrid { patch, event })
    }

    /// Sample one event and apply it. Returns the applied signal.
    pub fn fire(&mut self, patch_draw: f64, event_draw: f64) -> Result<Signal, RunFailure> {
        let signal = match self.sample_signal(patch_draw, event_draw) {
            Ok(signal) => signal,
            Err(_) => {
                // Drifted row sums can point into a silent row; retry on exact sums.
                self.refresh_rates();
                self.sample_signal(patch_draw, event_draw)?
            }
        };
        self.apply_signal(signal)?;
        Ok(signal)
    }
}
