//! Properties of the shipped calibration data and the solvers built on it.

mod common;

use common::{config, epu, store};
use esm_mono::calibration::{Branch, Grating, Polarization, TableMode};
use esm_mono::error::MonoError;
use esm_mono::optics::{AngleSolver, FocusPolicy, UndulatorSolver};

fn energies_inside(min: f64, max: f64, n: usize) -> impl Iterator<Item = f64> {
    (1..n).map(move |i| min + (max - min) * i as f64 / n as f64)
}

// =============================================================================
// Angle solver
// =============================================================================

#[test]
fn test_grating_equation_identity_with_fixed_c() {
    let store = store(&config());
    let solver = AngleSolver::new(store.clone());

    for profile in store.gratings() {
        let c = profile.branch_a.nominal_c;
        let range = profile.energy_range;
        for energy in energies_inside(range.min(), range.max(), 25) {
            let angles = solver
                .solve(energy, profile.grating, Branch::A, None, Some(c))
                .unwrap();
            let lhs = angles.beta.to_radians().cos();
            let rhs = c * angles.alpha.to_radians().cos();
            assert!(
                (lhs - rhs).abs() < 1e-9,
                "{} at {energy} eV: cos(beta)={lhs}, c*cos(alpha)={rhs}",
                profile.grating
            );
            assert_eq!(angles.c, c);
        }
    }
}

#[test]
fn test_calculated_c_is_solvable_over_every_range() {
    let store = store(&config());
    let solver = AngleSolver::new(store.clone());

    for profile in store.gratings() {
        let range = profile.energy_range;
        for energy in energies_inside(range.min(), range.max(), 25) {
            let angles = solver
                .solve(energy, profile.grating, Branch::A, None, None)
                .unwrap();
            assert!(angles.c > 1.0);
            assert!(angles.alpha > angles.beta);
        }
    }
}

#[test]
fn test_out_of_range_energy_is_rejected() {
    let store = store(&config());
    let solver = AngleSolver::new(store.clone());

    for profile in store.gratings() {
        let range = profile.energy_range;
        for energy in [range.min() - 1.0, range.max() + 1.0, 0.5 * range.min()] {
            let err = solver
                .solve(energy, profile.grating, Branch::A, None, None)
                .unwrap_err();
            assert!(
                matches!(err, MonoError::Range { .. }),
                "{} at {energy} eV gave {err}",
                profile.grating
            );
        }
    }
}

#[test]
fn test_undulator_range_also_applies() {
    let store = store(&config());
    let solver = AngleSolver::new(store);
    // Inside the 800 l/mm range but below EPU57's
    let err = solver
        .solve(100.0, Grating::L800, Branch::A, Some(&epu("57")), None)
        .unwrap_err();
    match err {
        MonoError::Range { domain, .. } => assert_eq!(domain, "EPU57"),
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_800_branch_a_at_500ev() {
    let config = config();
    let store = store(&config);
    let solver = AngleSolver::new(store.clone());

    let angles = solver
        .solve_with_policy(500.0, Grating::L800, Branch::A, None, FocusPolicy::Calculated)
        .unwrap();
    let nominal = store.grating(Grating::L800).unwrap().branch_a.nominal_c;

    assert!(
        (angles.c - nominal).abs() / nominal < 0.01,
        "calculated c {} vs nominal {nominal}",
        angles.c
    );
    assert!((angles.gamma - 87.48).abs() < 0.01, "gamma = {}", angles.gamma);
    assert!((angles.alpha - 88.774).abs() < 0.001);
    assert!((angles.beta - 86.188).abs() < 0.001);
}

#[test]
fn test_m3_pitch_working_range() {
    let store = store(&config());
    let epu105 = epu("105");
    for grating in [Grating::L300, Grating::L600, Grating::L800] {
        for energy in [40.0, 100.0, 250.0, 400.0] {
            let pitch = store.m3_pitch_for_energy(grating, &epu105, energy).unwrap();
            assert!(
                (-0.72..=-0.70).contains(&pitch),
                "{grating} at {energy} eV: M3 pitch {pitch}"
            );
        }
    }
    assert!(matches!(
        store.m3_pitch_for_energy(Grating::L1200, &epu105, 200.0),
        Err(MonoError::MissingTable { .. })
    ));
}

// =============================================================================
// Undulator tables
// =============================================================================

#[test]
fn test_epu57_gap_at_700ev() {
    let solver = UndulatorSolver::new(store(&config()));
    let gap = solver.gap_for(700.0, &epu("57"), Polarization::LH).unwrap();
    assert!(gap > 16.0 && gap < 60.0, "gap = {gap}");

    let err = solver
        .gap_for(2000.0, &epu("57"), Polarization::LH)
        .unwrap_err();
    assert!(matches!(err, MonoError::Range { .. }));
}

#[test]
fn test_table_nodes_round_trip() {
    let config = config();
    let store = store(&config);

    for undulator in &config.undulators {
        for (mode, _) in undulator.tables.entries() {
            let table = store.table(&undulator.id, mode).unwrap();
            for (energy, gap) in table.rows() {
                assert_eq!(table.gap_for_energy(energy).unwrap(), gap);
                assert_eq!(table.energy_for_gap(gap).unwrap(), energy);
            }
        }
    }
}

#[test]
fn test_interpolation_is_monotonic() {
    let config = config();
    let store = store(&config);

    for undulator in &config.undulators {
        for (mode, _) in undulator.tables.entries() {
            let table = store.table(&undulator.id, mode).unwrap();
            let (min, max) = table.energy_domain();
            let gaps: Vec<f64> = (0..=400)
                .map(|i| (min + (max - min) * f64::from(i) / 400.0).min(max))
                .map(|e| table.gap_for_energy(e).unwrap())
                .collect();
            assert!(
                gaps.windows(2).all(|w| w[0] <= w[1]),
                "{} is not monotonic",
                table.name()
            );
        }
    }
}

#[test]
fn test_every_undulator_has_all_modes() {
    let config = config();
    let store = store(&config);
    for undulator in &config.undulators {
        for mode in [TableMode::Lh, TableMode::Lv, TableMode::Circular] {
            assert!(store.table(&undulator.id, mode).is_ok());
        }
        assert!(store.table(&undulator.id, TableMode::Circular).unwrap().has_phase());
    }
}

#[test]
fn test_polarization_phases() {
    let solver = UndulatorSolver::new(store(&config()));
    let id = epu("105");
    let energy = 200.0;

    assert_eq!(solver.phase_for(energy, &id, Polarization::LH).unwrap(), 0.0);
    assert_eq!(solver.phase_for(energy, &id, Polarization::LV).unwrap(), 52.5);

    let left = solver.phase_for(energy, &id, Polarization::CL).unwrap();
    let right = solver.phase_for(energy, &id, Polarization::CR).unwrap();
    assert_eq!(left, -right);
    assert_eq!(
        solver.gap_for(energy, &id, Polarization::CL).unwrap(),
        solver.gap_for(energy, &id, Polarization::CR).unwrap()
    );
}

#[test]
fn test_energy_for_gap_inverts_gap_for_energy() {
    let solver = UndulatorSolver::new(store(&config()));
    let id = epu("57");
    for energy in [300.0, 650.0, 1000.0] {
        let gap = solver.gap_for(energy, &id, Polarization::LH).unwrap();
        let back = solver.energy_for(gap, &id, Polarization::LH).unwrap();
        assert!((back - energy).abs() < 1e-6, "{energy} -> {gap} -> {back}");
    }
}
