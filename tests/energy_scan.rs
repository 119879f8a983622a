//! Energy scans executed by the run engine against mock axes

mod common;

use common::{epu, mock_beamline};
use esm_mono::calibration::{Grating, Polarization};
use esm_mono::error::MonoError;
use esm_mono::experiment::{collect_commands, EnergyScan, Plan, PlanCommand, RunEngine};
use esm_mono::hardware::MOCK_DETECTOR;
use esm_mono::motion::{MoveRequest, PitchReadback};

#[tokio::test]
async fn test_energy_scan_run() {
    let (mover, registry, log) = mock_beamline();
    let base = MoveRequest::new(500.0, Grating::L800).with_undulator(epu("57"), Polarization::LV);

    let energies = EnergyScan::energies_from_step(500.0, 520.0, 5.0).unwrap();
    assert_eq!(energies, vec![500.0, 505.0, 510.0, 515.0, 520.0]);

    let start = mover.read_pitch(&registry).await.unwrap();
    let mut scan = EnergyScan::new(&mover, &base, &energies, start)
        .unwrap()
        .with_detector(MOCK_DETECTOR);
    let engine = RunEngine::new(registry.clone(), mover.settle_timeout());
    let summary = engine.run(&mut scan).await.unwrap();

    assert_eq!(summary.plan_type, "energy_scan");
    assert_eq!(summary.events.len(), energies.len());
    for (event, energy) in summary.events.iter().zip(&energies) {
        assert_eq!(event.positions["pgm_energy"], *energy);
        assert_eq!(event.data[MOCK_DETECTOR], 1.0);
        assert!(event.positions.contains_key("epu57_gap"));
    }

    // Final state is the last point's move
    let last = scan.sequences().last().unwrap();
    assert_eq!(registry.position("pgm_energy").await.unwrap(), 520.0);
    assert_eq!(
        registry.position("pgm_mirror_pitch").await.unwrap(),
        last.angles().gamma
    );
    assert_eq!(registry.position("epu57_phase").await.unwrap(), 28.5);
    assert_eq!(log.targets_for("pgm_energy"), energies);
}

#[test]
fn test_consecutive_points_chain_pitch() {
    let (mover, _, _) = mock_beamline();
    let base = MoveRequest::new(400.0, Grating::L800);
    let start = PitchReadback {
        mirror: 80.0,
        grating: 80.0,
    };

    let scan = EnergyScan::new(&mover, &base, &[400.0, 401.0, 402.0], start).unwrap();
    let sequences = scan.sequences();

    assert!(sequences[0].pitch_steps() > 1);
    // Small energy steps need no intermediate pitch points
    assert_eq!(sequences[1].pitch_steps(), 1);
    assert_eq!(sequences[2].pitch_steps(), 1);
    for pair in sequences.windows(2) {
        assert_ne!(pair[0].final_pitch(), pair[1].final_pitch());
    }
}

#[test]
fn test_out_of_range_energy_rejects_whole_scan() {
    let (mover, _, _) = mock_beamline();
    let base = MoveRequest::new(400.0, Grating::L600);

    let err = EnergyScan::new(
        &mover,
        &base,
        &[400.0, 410.0, 430.0],
        PitchReadback {
            mirror: 88.0,
            grating: 86.0,
        },
    )
    .unwrap_err();
    assert!(matches!(err, MonoError::Range { value, .. } if value == 430.0));
}

#[test]
fn test_empty_scan_rejected() {
    let (mover, _, _) = mock_beamline();
    let base = MoveRequest::new(400.0, Grating::L800);
    let start = PitchReadback {
        mirror: 88.0,
        grating: 86.0,
    };
    assert!(matches!(
        EnergyScan::new(&mover, &base, &[], start),
        Err(MonoError::Plan(_))
    ));
}

#[test]
fn test_scan_commands_per_point() {
    let (mover, _, _) = mock_beamline();
    let base = MoveRequest::new(300.0, Grating::L300);
    let start = PitchReadback {
        mirror: 88.0,
        grating: 86.0,
    };
    let mut scan = EnergyScan::new(&mover, &base, &[300.0, 310.0], start)
        .unwrap()
        .with_detector(MOCK_DETECTOR);

    let commands = collect_commands(&mut scan);
    let reads = commands
        .iter()
        .filter(|c| matches!(c, PlanCommand::Read { .. }))
        .count();
    let events = commands
        .iter()
        .filter(|c| matches!(c, PlanCommand::EmitEvent { .. }))
        .count();
    assert_eq!(reads, 2);
    assert_eq!(events, 2);

    // The first command of the scan is the first point's offsets step
    let first_step = &scan.sequences()[0].steps()[0];
    assert_eq!(
        commands[0],
        PlanCommand::MoveTogether {
            targets: first_step.targets.clone()
        }
    );

    scan.reset();
    assert_eq!(scan.next_command(), Some(commands[0].clone()));
}
