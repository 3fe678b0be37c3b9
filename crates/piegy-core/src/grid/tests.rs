use super::*;
use crate::event::Signal;
use crate::patch::Species;
use crate::rng::{ChaChaSource, UniformSource};
use crate::topology::Direction;

fn make_grid(rows: usize, cols: usize, boundary: BoundaryMode) -> Grid {
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

fn seeded(grid: &mut Grid, seed: u64) -> Vec<Population> {
    let mut source = ChaChaSource::new(seed);
    let initial: Vec<Population> = (0..grid.patches().len())
        .map(|_| {
            let u = (source.next_unit_open_interval() * 40.0) as u32;
            let v = (source.next_unit_open_interval() * 40.0) as u32;
            Population::new(u, v)
        })
        .collect();
    grid.set_populations(&initial).unwrap();
    grid.recompute_rates().unwrap();
    initial
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

fn assert_matches_fresh_recompute(grid: &Grid) {
    let populations: Vec<Population> = grid
        .patches()
        .iter()
        .map(|p| Population::new(p.u, p.v))
        .collect();
    let mut fresh = grid.clone();
    fresh.set_populations(&populations).unwrap();
    fresh.recompute_rates().unwrap();
    for (idx, (inc, full)) in grid.patches().iter().zip(fresh.patches()).enumerate() {
        assert_eq!(inc.u_pi, full.u_pi, "patch {idx} u_pi");
        assert_eq!(inc.v_pi, full.v_pi, "patch {idx} v_pi");
        for k in 0..8 {
            assert!(
                close(inc.mig_rates()[k], full.mig_rates()[k]),
                "patch {idx} mig rate {k}: {} vs {}",
                inc.mig_rates()[k],
                full.mig_rates()[k]
            );
        }
        assert!(close(inc.total_rate(), full.total_rate()), "patch {idx} total");
    }
    assert!(close(grid.rates().total(), fresh.rates().total()));
}

fn assert_migration_sums(grid: &Grid) {
    for (idx, patch) in grid.patches().iter().enumerate() {
        let params = grid.params(idx);
        let expected = if grid.topology().neighbor_count(idx) > 0 {
            params.mu_u * patch.u as f64 + params.mu_v * patch.v as f64
        } else {
            0.0
        };
        assert!(
            close(patch.sum_mig_rates(), expected),
            "patch {idx}: {} vs {expected}",
            patch.sum_mig_rates()
        );
    }
}

#[test]
fn new_rejects_zero_dimensions() {
    let err = build_grid(0, 4, BoundaryMode::OpenEdge, vec![], vec![]).unwrap_err();
    assert_eq!(err, GridError::InvalidDimensions { rows: 0, cols: 4 });
}

#[test]
fn new_rejects_wrong_parameter_count() {
    let err = build_grid(
        2,
        2,
        BoundaryMode::OpenEdge,
        vec![PayoffMatrix::default(); 3],
        vec![PatchParams::default(); 4],
    )
    .unwrap_err();
    assert_eq!(
        err,
        GridError::ParameterCountMismatch {
            expected: 4,
            actual: 3
        }
    );
}

#[test]
fn new_rejects_negative_rate_coefficients() {
    let mut params = vec![PatchParams::default(); 2];
    params[1].mu_v = -0.5;
    let err = build_grid(
        1,
        2,
        BoundaryMode::OpenEdge,
        vec![PayoffMatrix::default(); 2],
        params,
    )
    .unwrap_err();
    assert!(matches!(err, GridError::InvalidParameters { patch: 1, .. }));
}

#[test]
fn from_config_surfaces_config_errors() {
    let config = SimConfig {
        runs: 0,
        ..SimConfig::default()
    };
    assert!(matches!(
        Grid::from_config(&config),
        Err(GridError::Config(SimConfigError::InvalidRuns))
    ));
}

#[test]
fn set_populations_checks_length() {
    let mut grid = make_grid(2, 3, BoundaryMode::OpenEdge);
    let err = grid
        .set_populations(&[Population::new(1, 1); 5])
        .unwrap_err();
    assert_eq!(
        err,
        GridError::PopulationCountMismatch {
            expected: 6,
            actual: 5
        }
    );
}

#[test]
fn single_open_patch_never_migrates() {
    let mut grid = make_grid(1, 1, BoundaryMode::OpenEdge);
    grid.set_populations(&[Population::new(100, 100)]).unwrap();
    grid.recompute_rates().unwrap();
    let patch = grid.patch(0, 0);
    assert_eq!(patch.sum_mig_rates(), 0.0);
    assert!(grid.rates().total() > 0.0);
    assert_eq!(grid.rates().total(), patch.sum_pi_death_rates());
}

#[test]
fn recompute_loads_rate_table() {
    let mut grid = make_grid(3, 4, BoundaryMode::WrapAround);
    seeded(&mut grid, 5);
    assert!(grid.rate_inconsistency() < 1e-12);
    assert_migration_sums(&grid);
}

#[test]
fn recompute_reports_overflowing_patch() {
    let n = 4;
    let mut params = vec![PatchParams::default(); n];
    params[2].w_u = 1000.0;
    let mut grid = build_grid(
        2,
        2,
        BoundaryMode::OpenEdge,
        vec![PayoffMatrix::new(1.0, 1.0, 1.0, 1.0); n],
        params,
    )
    .unwrap();
    grid.set_populations(&[Population::new(10, 10); 4]).unwrap();
    let overflow = grid.recompute_rates().unwrap_err();
    assert_eq!(overflow.patch, 2);
    assert_eq!(overflow.cause.species, Species::U);
}

#[test]
fn migration_moves_one_individual_between_neighbors() {
    let mut grid = make_grid(2, 2, BoundaryMode::OpenEdge);
    grid.set_populations(&[Population::new(5, 5); 4]).unwrap();
    grid.recompute_rates().unwrap();
    grid.apply_signal(Signal::Migrate {
        from: 0,
        to: 1,
        species: Species::V,
    })
    .unwrap();
    assert_eq!(grid.patches()[0].v, 4);
    assert_eq!(grid.patches()[1].v, 6);
    assert_eq!(grid.patches()[0].u, 5);
    assert_matches_fresh_recompute(&grid);
}

#[test]
fn distant_patches_are_untouched_by_local_events() {
    let mut grid = make_grid(5, 5, BoundaryMode::OpenEdge);
    seeded(&mut grid, 11);
    let before = grid.clone();
    let center = grid.topology().index(2, 2);
    grid.apply_signal(Signal::Adjust {
        patch: center,
        species: Species::U,
    })
    .unwrap();
    let affected = [(2, 2), (1, 2), (3, 2), (2, 1), (2, 3)];
    for i in 0..5 {
        for j in 0..5 {
            if affected.contains(&(i, j)) {
                continue;
            }
            assert_eq!(grid.patch(i, j), before.patch(i, j), "patch ({i}, {j})");
        }
    }
    assert_matches_fresh_recompute(&grid);
}

#[test]
fn self_migration_on_one_column_wrap_is_neutral() {
    let mut grid = make_grid(3, 1, BoundaryMode::WrapAround);
    grid.set_populations(&[Population::new(10, 3); 3]).unwrap();
    grid.recompute_rates().unwrap();
    let before = grid.clone();
    grid.apply_signal(Signal::Migrate {
        from: 1,
        to: 1,
        species: Species::U,
    })
    .unwrap();
    assert_eq!(grid.patches()[1].u, 10);
    assert_eq!(grid.patches(), before.patches());
}

#[test]
fn incremental_updates_match_full_recompute_along_random_path() {
    for boundary in [BoundaryMode::OpenEdge, BoundaryMode::WrapAround] {
        let mut grid = make_grid(4, 5, boundary);
        seeded(&mut grid, 23);
        let mut source = ChaChaSource::new(99);
        for step in 0..2_000 {
            if grid.rates().total() <= 0.0 {
                break;
            }
            let a = source.next_unit_open_interval();
            let b = source.next_unit_open_interval();
            let signal = grid
                .fire(a, b)
                .unwrap_or_else(|e| panic!("step {step} ({boundary:?}): {e}"));
            if let Signal::Migrate { from, to, .. } = signal {
                let dirs: Vec<Direction> = Direction::ALL
                    .into_iter()
                    .filter(|&d| grid.topology().neighbor(from, d) == Some(to))
                    .collect();
                assert!(!dirs.is_empty(), "migration {from} -> {to} is not a link");
            }
            assert!(
                grid.rate_inconsistency() < 1e-9,
                "step {step}: inconsistency {}",
                grid.rate_inconsistency()
            );
            assert_migration_sums(&grid);
            if step % 200 == 0 {
                assert_matches_fresh_recompute(&grid);
            }
        }
        assert_matches_fresh_recompute(&grid);
    }
}

#[test]
fn refresh_rates_leaves_consistent_totals() {
    let mut grid = make_grid(3, 3, BoundaryMode::WrapAround);
    seeded(&mut grid, 3);
    let mut source = ChaChaSource::new(4);
    for _ in 0..500 {
        if grid.rates().total() <= 0.0 {
            break;
        }
        let a = source.next_unit_open_interval();
        let b = source.next_unit_open_interval();
        grid.fire(a, b).unwrap();
    }
    let drift = grid.refresh_rates();
    assert!(drift < 1e-6);
    let exact: f64 = grid.patches().iter().map(|p| p.total_rate()).sum();
    assert!(close(grid.rates().total(), exact));
}

#[test]
fn empty_grid_has_nothing_to_sample() {
    let mut grid = make_grid(2, 2, BoundaryMode::OpenEdge);
    grid.set_populations(&[Population::default(); 4]).unwrap();
    grid.recompute_rates().unwrap();
    assert_eq!(grid.rates().total(), 0.0);
    assert!(matches!(
        grid.sample_signal(0.5, 0.5),
        Err(SampleMiss::NoPatch { .. })
    ));
}

#[test]
fn fire_retries_on_exact_sums_after_a_stale_row() {
    let mut grid = make_grid(2, 1, BoundaryMode::OpenEdge);
    grid.set_populations(&[Population::new(10, 10), Population::default()])
        .unwrap();
    grid.recompute_rates().unwrap();
    let total = grid.rates().total();
    assert!(total > 0.0);

    // Row sums claim the weight sits in the empty row.
    grid.rates.force_row_sum(0, 0.0);
    grid.rates.force_row_sum(1, total);
    assert!(matches!(
        grid.sample_signal(0.3, 0.6),
        Err(SampleMiss::NoPatch { .. })
    ));

    let signal = grid.fire(0.3, 0.6).unwrap();
    assert_eq!(signal.touched().0, 0);
    assert!(grid.rate_inconsistency() < 1e-9);
    // One death, one birth or one migration.
    let population: u32 = grid.patches().iter().map(|p| p.u + p.v).sum();
    assert!((19..=21).contains(&population));
}

#[test]
fn fire_fails_when_exact_sums_still_miss() {
    let mut grid = make_grid(1, 2, BoundaryMode::OpenEdge);
    grid.set_populations(&[Population::default(); 2]).unwrap();
    grid.recompute_rates().unwrap();

    // The table holds a rate the silent patch cannot back with an event.
    grid.rates.update_index(1, 5.0);
    let err = grid.fire(0.5, 0.5).unwrap_err();
    assert_eq!(err.code(), 1);
    assert!(err.to_string().contains("patch 1 has no selectable event"));
    assert!(grid.patches().iter().all(|p| p.u == 0 && p.v == 0));
}
