//! Inverse-CDF selection of the next patch and event.
//!
//! Rates are scanned linearly. A scan starts from whichever end of the
//! cumulative distribution is closer to the target, which halves the expected
//! scan length. Both directions select the same entry: the first index whose
//! cumulative sum reaches the target.

use crate::event::Event;
use crate::patch::Patch;
use crate::rates::RateTable;

/// A located entry and the cumulative sum of everything before it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Located {
    pub index: usize,
    pub before: f64,
}

/// Find the first index `k` with `sum(values[..=k]) >= target`, skipping zero-rate entries.
///
/// `total` is the caller's (possibly drifted) sum of `values`. A target past the
/// true sum clamps to the last positive entry, a target at or below zero to the
/// first. `None` means every entry is zero.
pub fn locate(values: &[f64], total: f64, target: f64) -> Option<Located> {
    if target < total * 0.5 {
        locate_forward(values, target)
    } else {
        locate_backward(values, total, target)
    }
}

fn locate_forward(values: &[f64], target: f64) -> Option<Located> {
    let mut cumulative = 0.0;
    for (index, &v) in values.iter().enumerate() {
        if v > 0.0 && cumulative + v >= target {
            return Some(Located {
                index,
                before: cumulative,
            });
        }
        cumulative += v;
    }
    last_positive(values)
}

fn locate_backward(values: &[f64], total: f64, target: f64) -> Option<Located> {
    let mut cumulative = total;
    for (index, &v) in values.iter().enumerate().rev() {
        let before = cumulative - v;
        if v > 0.0 && before < target {
            return Some(Located { index, before });
        }
        cumulative = before;
    }
    first_positive(values)
}

fn last_positive(values: &[f64]) -> Option<Located> {
    let index = values.iter().rposition(|&v| v > 0.0)?;
    Some(Located {
        index,
        before: values[..index].iter().sum(),
    })
}

fn first_positive(values: &[f64]) -> Option<Located> {
    values
        .iter()
        .position(|&v| v > 0.0)
        .map(|index| Located { index, before: 0.0 })
}

/// Coordinates of the selected patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchPick {
    pub i: usize,
    pub j: usize,
}

/// Select a patch with probability proportional to its rate. `draw` must lie in (0, 1).
pub fn find_patch(table: &RateTable, draw: f64) -> Option<PatchPick> {
    let target = draw * table.total();
    let row = locate(table.row_sums(), table.total(), target)?;
    let row_sum = table.row_sums()[row.index];
    let col = locate(table.row(row.index), row_sum, target - row.before)?;
    Some(PatchPick {
        i: row.index,
        j: col.index,
    })
}

/// Select one of the 12 events of `patch`. `draw` must lie in (0, 1).
pub fn find_event(patch: &Patch, draw: f64) -> Option<Event> {
    let target = draw * patch.total_rate();
    let death_sum = patch.sum_pi_death_rates();
    let death = |t: f64| locate(patch.pi_death_rates(), death_sum, t).map(|l| l.index);
    let migration = |t: f64| {
        locate(patch.mig_rates(), patch.sum_mig_rates(), t - death_sum).map(|l| l.index + 4)
    };

    let index = if target < death_sum {
        death(target).or_else(|| migration(target))
    } else {
        migration(target).or_else(|| death(target))
    }?;
    Event::from_index(index)
}
