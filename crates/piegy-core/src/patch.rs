use crate::config::{PatchParams, PayoffMatrix, Population};
use crate::constants::EXP_OVERFLOW_BOUND;
use crate::event::ChangeKind;
use crate::topology::Direction;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Species {
    U,
    V,
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Species::U => write!(f, "U"),
            Species::V => write!(f, "V"),
        }
    }
}

/// Payoffs `(U_pi, V_pi)` of a neighboring patch, as seen by migration weights.
pub type NeighborPayoffs = (f64, f64);

/// `exp(selection * payoff)` would leave the finite range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightOverflow {
    pub species: Species,
    pub direction: Direction,
    pub exponent: f64,
}

/// State of one grid cell: populations, payoffs and all event rates.
///
/// Rate layout: `pi_death_rates = [U payoff, V payoff, U capacity, V capacity]`,
/// `mig_rates = [U up, down, left, right, V up, down, left, right]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Patch {
    pub u: u32,
    pub v: u32,
    pub u_pi: f64,
    pub v_pi: f64,
    pi_death_rates: [f64; 4],
    sum_pi_death_rates: f64,
    mig_rates: [f64; 8],
    sum_mig_rates: f64,
    u_weight: [f64; 4],
    v_weight: [f64; 4],
    sum_u_weight: f64,
    sum_v_weight: f64,
}

impl Patch {
    pub fn new(population: Population) -> Self {
        Self {
            u: population.u,
            v: population.v,
            ..Self::default()
        }
    }

    /// Reset populations and clear every derived value.
    pub fn reset(&mut self, population: Population) {
        *self = Self::new(population);
    }

    pub fn population(&self, species: Species) -> u32 {
        match species {
            Species::U => self.u,
            Species::V => self.v,
        }
    }

    pub fn payoff(&self, species: Species) -> f64 {
        match species {
            Species::U => self.u_pi,
            Species::V => self.v_pi,
        }
    }

    pub fn payoffs(&self) -> NeighborPayoffs {
        (self.u_pi, self.v_pi)
    }

    pub fn pi_death_rates(&self) -> &[f64; 4] {
        &self.pi_death_rates
    }

    pub fn sum_pi_death_rates(&self) -> f64 {
        self.sum_pi_death_rates
    }

    pub fn mig_rates(&self) -> &[f64; 8] {
        &self.mig_rates
    }

    pub fn sum_mig_rates(&self) -> f64 {
        self.sum_mig_rates
    }

    pub fn weights(&self, species: Species) -> &[f64; 4] {
        match species {
            Species::U => &self.u_weight,
            Species::V => &self.v_weight,
        }
    }

    /// Rate of any event firing in this patch.
    pub fn total_rate(&self) -> f64 {
        self.sum_pi_death_rates + self.sum_mig_rates
    }

    /// Recompute both payoffs and the four payoff/capacity rates from the current counts.
    pub fn update_payoff(&mut self, matrix: &PayoffMatrix, params: &PatchParams) {
        let u = self.u as f64;
        let v = self.v as f64;
        let sum_minus_1 = u + v - 1.0;

        if sum_minus_1 > 0.0 {
            self.u_pi = if self.u != 0 {
                ((u - 1.0) / sum_minus_1) * matrix.uu + (v / sum_minus_1) * matrix.uv
            } else {
                0.0
            };
            self.v_pi = if self.v != 0 {
                (u / sum_minus_1) * matrix.vu + ((v - 1.0) / sum_minus_1) * matrix.vv
            } else {
                0.0
            };
        } else {
            self.u_pi = 0.0;
            self.v_pi = 0.0;
        }

        // Magnitude only: the payoff sign picks birth or death when the event is applied.
        self.pi_death_rates[0] = (u * self.u_pi).abs();
        self.pi_death_rates[1] = (v * self.v_pi).abs();
        self.pi_death_rates[2] = params.kappa_u * u * (sum_minus_1 + 1.0);
        self.pi_death_rates[3] = params.kappa_v * v * (sum_minus_1 + 1.0);
        self.sum_pi_death_rates = self.pi_death_rates.iter().sum();
    }

    /// Recompute the weights of all four directions; used after this patch's own counts changed.
    pub fn update_migration_all(
        &mut self,
        params: &PatchParams,
        neighbors: &[Option<NeighborPayoffs>; 4],
    ) -> Result<(), WeightOverflow> {
        let mut u_weight = [0.0; 4];
        let mut v_weight = [0.0; 4];
        for dir in Direction::ALL {
            if let Some((nb_u_pi, nb_v_pi)) = neighbors[dir.index()] {
                u_weight[dir.index()] = migration_weight(params.w_u, nb_u_pi, Species::U, dir)?;
                v_weight[dir.index()] = migration_weight(params.w_v, nb_v_pi, Species::V, dir)?;
            }
        }
        self.u_weight = u_weight;
        self.v_weight = v_weight;
        self.refresh_migration_rates(params);
        Ok(())
    }

    /// Recompute the weight of a single direction; used when only that neighbor's payoff changed.
    pub fn update_migration_one(
        &mut self,
        params: &PatchParams,
        dir: Direction,
        neighbor: Option<NeighborPayoffs>,
    ) -> Result<(), WeightOverflow> {
        let (u_w, v_w) = match neighbor {
            Some((nb_u_pi, nb_v_pi)) => (
                migration_weight(params.w_u, nb_u_pi, Species::U, dir)?,
                migration_weight(params.w_v, nb_v_pi, Species::V, dir)?,
            ),
            None => (0.0, 0.0),
        };
        self.u_weight[dir.index()] = u_w;
        self.v_weight[dir.index()] = v_w;
        self.refresh_migration_rates(params);
        Ok(())
    }

    /// Apply one population change. Decrements never take a count below zero.
    pub fn apply(&mut self, kind: ChangeKind, species: Species) {
        let payoff = self.payoff(species);
        let count = match species {
            Species::U => &mut self.u,
            Species::V => &mut self.v,
        };
        match kind {
            ChangeKind::Arrival => *count = count.saturating_add(1),
            ChangeKind::Decrement => *count = count.saturating_sub(1),
            ChangeKind::Natural => {
                if payoff > 0.0 {
                    *count = count.saturating_add(1);
                } else {
                    *count = count.saturating_sub(1);
                }
            }
        }
    }

    fn refresh_migration_rates(&mut self, params: &PatchParams) {
        self.sum_u_weight = self.u_weight.iter().sum();
        self.sum_v_weight = self.v_weight.iter().sum();

        let mu_u = params.mu_u * self.u as f64;
        let mu_v = params.mu_v * self.v as f64;
        // No neighbors means nowhere to go.
        let (u_share, u_total) = if self.sum_u_weight > 0.0 {
            (mu_u / self.sum_u_weight, mu_u)
        } else {
            (0.0, 0.0)
        };
        let (v_share, v_total) = if self.sum_v_weight > 0.0 {
            (mu_v / self.sum_v_weight, mu_v)
        } else {
            (0.0, 0.0)
        };

        for k in 0..4 {
            self.mig_rates[k] = u_share * self.u_weight[k];
            self.mig_rates[k + 4] = v_share * self.v_weight[k];
        }
        self.sum_mig_rates = u_total + v_total;
    }
}

fn migration_weight(
    selection: f64,
    payoff: f64,
    species: Species,
    direction: Direction,
) -> Result<f64, WeightOverflow> {
    let exponent = selection * payoff;
    if exponent > EXP_OVERFLOW_BOUND || exponent.is_nan() {
        return Err(WeightOverflow {
            species,
            direction,
            exponent,
        });
    }
    Ok(1.0 + exponent.exp())
}
