//! The 12 raw events a patch can fire and their translation into population changes.

use crate::config::BoundaryMode;
use crate::patch::Species;
use crate::topology::{neighbor_coord, Direction};

/// One of the 12 events of a patch, in rate-array order:
/// 0–1 payoff-driven (U, V), 2–3 capacity death (U, V),
/// 4–7 U migration (up, down, left, right), 8–11 V migration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    Payoff(Species),
    Capacity(Species),
    Migrate(Species, Direction),
}

impl Event {
    pub const COUNT: usize = 12;

    pub fn from_index(index: usize) -> Option<Self> {
        let species_of = |k: usize| if k == 0 { Species::U } else { Species::V };
        match index {
            0 | 1 => Some(Event::Payoff(species_of(index))),
            2 | 3 => Some(Event::Capacity(species_of(index - 2))),
            4..=11 => {
                let k = index - 4;
                Direction::from_index(k % 4).map(|dir| Event::Migrate(species_of(k / 4), dir))
            }
            _ => None,
        }
    }

    pub fn index(self) -> usize {
        let offset = |s: Species| match s {
            Species::U => 0,
            Species::V => 1,
        };
        match self {
            Event::Payoff(s) => offset(s),
            Event::Capacity(s) => 2 + offset(s),
            Event::Migrate(s, dir) => 4 + 4 * offset(s) + dir.index(),
        }
    }
}

/// How a population count changes. Together with [`Species`] this gives the six change kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// +1 if the species' payoff is positive, otherwise -1 (floored at 0).
    Natural,
    /// -1 floored at 0: capacity death or an emigrant leaving.
    Decrement,
    /// +1: an immigrant arriving.
    Arrival,
}

/// A concrete change to one patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Change {
    pub patch: usize,
    pub kind: ChangeKind,
    pub species: Species,
}

/// An event resolved against the grid. A migration always carries both ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    Adjust { patch: usize, species: Species },
    CapacityDeath { patch: usize, species: Species },
    Migrate { from: usize, to: usize, species: Species },
}

impl Signal {
    /// The first change, and the second one for migrations.
    pub fn changes(self) -> (Change, Option<Change>) {
        match self {
            Signal::Adjust { patch, species } => (
                Change {
                    patch,
                    kind: ChangeKind::Natural,
                    species,
                },
                None,
            ),
            Signal::CapacityDeath { patch, species } => (
                Change {
                    patch,
                    kind: ChangeKind::Decrement,
                    species,
                },
                None,
            ),
            Signal::Migrate { from, to, species } => (
                Change {
                    patch: from,
                    kind: ChangeKind::Decrement,
                    species,
                },
                Some(Change {
                    patch: to,
                    kind: ChangeKind::Arrival,
                    species,
                }),
            ),
        }
    }

    /// Patches whose state the signal touches; a self-migration touches one.
    pub fn touched(self) -> (usize, Option<usize>) {
        match self {
            Signal::Adjust { patch, .. } | Signal::CapacityDeath { patch, .. } => (patch, None),
            Signal::Migrate { from, to, .. } if from == to => (from, None),
            Signal::Migrate { from, to, .. } => (from, Some(to)),
        }
    }
}

/// Translate `event` fired at `(i, j)` into a [`Signal`].
///
/// Returns `None` only for a migration across an open edge, which a consistent
/// rate table never selects since such a direction has zero rate.
pub fn make_signal(
    rows: usize,
    cols: usize,
    boundary: BoundaryMode,
    i: usize,
    j: usize,
    event: Event,
) -> Option<Signal> {
    let patch = i * cols + j;
    match event {
        Event::Payoff(species) => Some(Signal::Adjust { patch, species }),
        Event::Capacity(species) => Some(Signal::CapacityDeath { patch, species }),
        Event::Migrate(species, dir) => neighbor_coord(rows, cols, boundary, i, j, dir).map(
            |(ni, nj)| Signal::Migrate {
                from: patch,
                to: ni * cols + nj,
                species,
            },
        ),
    }
}
