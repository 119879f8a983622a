//! Coordinated monochromator + undulator move.
//!
//! A move is planned completely before anything is commanded:
//!
//! ```text
//! VALIDATE → SET_OFFSETS → SET_TRANSLATION → STEP_PITCH → SET_FOCUS_AND_ENERGY → SET_UNDULATOR
//! ```
//!
//! [`CoordinatedMover::plan_move`] is pure and returns a [`MoveSequence`]: a finite list of
//! steps, each a set of axis targets commanded together. [`CoordinatedMover::move_to`] reads the
//! current pitch, plans, then executes the steps in order. Range and grating-equation errors
//! surface from planning, so they never leave an axis half-moved. Failures during execution are
//! returned as [`MonoError::Motion`] with no rollback.
//!
//! # Example
//!
//! ```rust,ignore
//! let mover = CoordinatedMover::from_config(&config, store)?;
//! let request = MoveRequest::new(500.0, Grating::L800).with_undulator(epu57, Polarization::LH);
//! let report = mover.move_to(&registry, &request).await?;
//! println!("gamma = {:.4}", report.angles.gamma);
//! ```

use super::request::{MoveRequest, PitchReadback};
use crate::calibration::{CalibrationStore, UndulatorId};
use crate::config::{BeamlineConfig, MotionConfig, PgmAxisNames, UndulatorAxisNames};
use crate::error::{MonoError, MonoResult};
use crate::experiment::{linspace, AxisTarget, Plan, PlanCommand};
use crate::hardware::AxisRegistry;
use crate::optics::{AngleSolver, SolvedAngles, UndulatorMoveOrder, UndulatorSetpoints, UndulatorSolver};
use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

/// Stage of a coordinated move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveStage {
    /// Pitch offsets and line density of the selected grating/branch
    SetOffsets,
    /// Grating translation stage
    SetTranslation,
    /// Mirror and grating pitch ramp
    StepPitch,
    /// Fixed-focus constant and energy readbacks
    SetFocusAndEnergy,
    /// Undulator phase and gap
    SetUndulator,
}

impl fmt::Display for MoveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MoveStage::SetOffsets => "SET_OFFSETS",
            MoveStage::SetTranslation => "SET_TRANSLATION",
            MoveStage::StepPitch => "STEP_PITCH",
            MoveStage::SetFocusAndEnergy => "SET_FOCUS_AND_ENERGY",
            MoveStage::SetUndulator => "SET_UNDULATOR",
        };
        f.write_str(name)
    }
}

/// One combined move
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveStep {
    /// Stage the step belongs to
    pub stage: MoveStage,
    /// Axes commanded together
    pub targets: Vec<AxisTarget>,
}

impl MoveStep {
    fn new(stage: MoveStage, targets: Vec<AxisTarget>) -> Self {
        Self { stage, targets }
    }
}

/// Fully planned coordinated move
///
/// Also a [`Plan`]: each step becomes one `MoveTo` or `MoveTogether` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveSequence {
    request: MoveRequest,
    angles: SolvedAngles,
    undulator: Option<UndulatorSetpoints>,
    steps: Vec<MoveStep>,
    #[serde(skip)]
    cursor: usize,
}

impl MoveSequence {
    /// Request the sequence was planned for
    pub fn request(&self) -> &MoveRequest {
        &self.request
    }

    /// Solved angles
    pub fn angles(&self) -> &SolvedAngles {
        &self.angles
    }

    /// Undulator setpoints, when an undulator was requested
    pub fn undulator(&self) -> Option<&UndulatorSetpoints> {
        self.undulator.as_ref()
    }

    /// Steps in execution order
    pub fn steps(&self) -> &[MoveStep] {
        &self.steps
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Never true for a planned move
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of intermediate pitch points
    pub fn pitch_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.stage == MoveStage::StepPitch)
            .count()
    }

    /// Pitch after the sequence has run
    pub fn final_pitch(&self) -> PitchReadback {
        PitchReadback {
            mirror: self.angles.gamma,
            grating: self.angles.beta,
        }
    }

    /// Every axis the sequence commands, in first-use order
    pub fn axes(&self) -> Vec<String> {
        let mut axes: Vec<String> = Vec::new();
        for target in self.steps.iter().flat_map(|s| &s.targets) {
            if !axes.contains(&target.axis) {
                axes.push(target.axis.clone());
            }
        }
        axes
    }
}

impl Plan for MoveSequence {
    fn plan_type(&self) -> &str {
        "move_to"
    }

    fn plan_name(&self) -> &str {
        "Coordinated Move"
    }

    fn plan_args(&self) -> HashMap<String, String> {
        let mut args = HashMap::from([
            ("energy".to_string(), self.request.energy.to_string()),
            ("grating".to_string(), self.request.grating.to_string()),
            ("branch".to_string(), self.request.branch.to_string()),
            ("focus".to_string(), self.request.focus.to_string()),
        ]);
        if let Some(undulator) = &self.request.undulator {
            args.insert("undulator".to_string(), undulator.to_string());
            args.insert(
                "polarization".to_string(),
                self.request.polarization.to_string(),
            );
        }
        args
    }

    fn movers(&self) -> Vec<String> {
        self.axes()
    }

    fn detectors(&self) -> Vec<String> {
        Vec::new()
    }

    fn num_points(&self) -> usize {
        self.steps.len()
    }

    fn next_command(&mut self) -> Option<PlanCommand> {
        let step = self.steps.get(self.cursor)?;
        self.cursor += 1;
        PlanCommand::move_to(step.targets.clone())
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }
}

/// Outcome of an executed move
#[derive(Debug, Clone, Serialize)]
pub struct MoveReport {
    /// Executed request
    pub request: MoveRequest,
    /// Solved angles
    pub angles: SolvedAngles,
    /// Undulator setpoints, if driven
    pub undulator: Option<UndulatorSetpoints>,
    /// Pitch readback before the move
    pub start_pitch: PitchReadback,
    /// Steps executed
    pub steps: usize,
    /// Intermediate pitch points
    pub pitch_steps: usize,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Duration in seconds
    pub elapsed_secs: f64,
}

/// Number of pitch points for a ramp
///
/// `max(round(|Δgamma| / step), round(|Δbeta| / (2 step)))`, never less than 1.
///
/// # Errors
/// `Domain` when either excursion is not finite, `Range` when the ramp would need more than
/// `max_steps` points.
pub fn pitch_step_count(
    delta_gamma: f64,
    delta_beta: f64,
    step: f64,
    max_steps: usize,
) -> MonoResult<usize> {
    if !(delta_gamma.is_finite() && delta_beta.is_finite()) {
        return Err(MonoError::Domain(format!(
            "pitch excursion (gamma {delta_gamma}, beta {delta_beta}) is not finite"
        )));
    }
    let mirror = (delta_gamma.abs() / step).round();
    let grating = (delta_beta.abs() / (2.0 * step)).round();
    let n = mirror.max(grating).max(1.0);
    if n > max_steps as f64 {
        return Err(MonoError::Range {
            quantity: "pitch ramp points",
            value: n,
            min: 1.0,
            max: max_steps as f64,
            domain: "pitch ramp".to_string(),
        });
    }
    Ok(n as usize)
}

/// Plans and executes coordinated moves
#[derive(Debug, Clone)]
pub struct CoordinatedMover {
    store: Arc<CalibrationStore>,
    angles: AngleSolver,
    undulators: UndulatorSolver,
    axes: PgmAxisNames,
    undulator_axes: HashMap<UndulatorId, UndulatorAxisNames>,
    pitch_step_deg: f64,
    max_pitch_steps: usize,
    settle_timeout: Duration,
}

impl CoordinatedMover {
    /// Mover for the monochromator axes in `axes`; add undulators with
    /// [`with_undulator_axes`](Self::with_undulator_axes)
    pub fn new(store: Arc<CalibrationStore>, axes: PgmAxisNames, motion: &MotionConfig) -> Self {
        Self {
            angles: AngleSolver::new(store.clone()),
            undulators: UndulatorSolver::new(store.clone()),
            store,
            axes,
            undulator_axes: HashMap::new(),
            pitch_step_deg: motion.pitch_step_deg,
            max_pitch_steps: motion.max_pitch_steps,
            settle_timeout: motion.settle_timeout(),
        }
    }

    /// Register the gap and phase axes of an undulator
    pub fn with_undulator_axes(mut self, id: UndulatorId, axes: UndulatorAxisNames) -> Self {
        self.undulator_axes.insert(id, axes);
        self
    }

    /// Mover with every axis named in the configuration
    pub fn from_config(config: &BeamlineConfig, store: Arc<CalibrationStore>) -> MonoResult<Self> {
        if !(config.motion.pitch_step_deg.is_finite() && config.motion.pitch_step_deg > 0.0) {
            return Err(MonoError::Configuration(format!(
                "pitch_step_deg must be positive, got {}",
                config.motion.pitch_step_deg
            )));
        }
        if config.motion.max_pitch_steps == 0 {
            return Err(MonoError::Configuration(
                "max_pitch_steps must be at least 1".to_string(),
            ));
        }
        let mover = config.undulators.iter().fold(
            Self::new(store, config.axes.clone(), &config.motion),
            |mover, u| mover.with_undulator_axes(u.id.clone(), u.axes.clone()),
        );
        Ok(mover)
    }

    /// Monochromator axis names
    pub fn axes(&self) -> &PgmAxisNames {
        &self.axes
    }

    /// Shared calibration store
    pub fn store(&self) -> &Arc<CalibrationStore> {
        &self.store
    }

    /// Angle solver
    pub fn angle_solver(&self) -> &AngleSolver {
        &self.angles
    }

    /// Undulator solver
    pub fn undulator_solver(&self) -> &UndulatorSolver {
        &self.undulators
    }

    /// Per-axis settle timeout
    pub fn settle_timeout(&self) -> Duration {
        self.settle_timeout
    }

    /// Plan the full sequence for `request` starting from `readback`
    ///
    /// # Errors
    /// `Range` / `Domain` when the request cannot be satisfied, `UnknownGrating` /
    /// `UnknownUndulator` / `MissingTable` when the calibration lacks the data, `Read` when a
    /// pitch readback is not finite.
    pub fn plan_move(&self, request: &MoveRequest, readback: PitchReadback) -> MonoResult<MoveSequence> {
        self.check_readback(readback)?;
        let undulator = request.undulator.as_ref();
        let angles = self.angles.solve_with_policy(
            request.energy,
            request.grating,
            request.branch,
            undulator,
            request.focus,
        )?;
        let setpoints = undulator
            .map(|id| self.undulators.setpoints(request.energy, id, request.polarization))
            .transpose()?;
        let profile = self.store.grating(request.grating)?;
        let offsets = profile.offsets(request.branch);

        let mut steps = vec![
            MoveStep::new(
                MoveStage::SetOffsets,
                vec![
                    AxisTarget::new(self.axes.mirror_pitch_offset.as_str(), offsets.mirror_offset_deg),
                    AxisTarget::new(self.axes.grating_pitch_offset.as_str(), offsets.grating_offset_deg),
                    AxisTarget::new(
                        self.axes.grating_lines.as_str(),
                        f64::from(request.grating.lines_per_mm()),
                    ),
                ],
            ),
            MoveStep::new(
                MoveStage::SetTranslation,
                vec![AxisTarget::new(
                    self.axes.grating_translation.as_str(),
                    profile.translation_mm,
                )],
            ),
        ];

        let n = pitch_step_count(
            angles.gamma - readback.mirror,
            angles.beta - readback.grating,
            self.pitch_step_deg,
            self.max_pitch_steps,
        )?;
        let (mirror, grating) = if n == 1 {
            (vec![angles.gamma], vec![angles.beta])
        } else {
            (
                linspace(readback.mirror, angles.gamma, n),
                linspace(readback.grating, angles.beta, n),
            )
        };
        steps.extend(mirror.into_iter().zip(grating).map(|(m, g)| {
            MoveStep::new(
                MoveStage::StepPitch,
                vec![
                    AxisTarget::new(self.axes.mirror_pitch.as_str(), m),
                    AxisTarget::new(self.axes.grating_pitch.as_str(), g),
                ],
            )
        }));

        steps.push(MoveStep::new(
            MoveStage::SetFocusAndEnergy,
            vec![
                AxisTarget::new(self.axes.focus_constant.as_str(), angles.c),
                AxisTarget::new(self.axes.energy.as_str(), request.energy),
            ],
        ));

        if let Some(setpoints) = &setpoints {
            steps.extend(self.undulator_steps(setpoints)?);
        }

        debug!(
            request = %request,
            steps = steps.len(),
            pitch_steps = n,
            "Planned coordinated move"
        );

        Ok(MoveSequence {
            request: request.clone(),
            angles,
            undulator: setpoints,
            steps,
            cursor: 0,
        })
    }

    fn check_readback(&self, readback: PitchReadback) -> MonoResult<()> {
        for (axis, value) in [
            (&self.axes.mirror_pitch, readback.mirror),
            (&self.axes.grating_pitch, readback.grating),
        ] {
            if !value.is_finite() {
                return Err(MonoError::Read {
                    device: axis.clone(),
                    source: anyhow!("readback {value} is not a finite angle"),
                });
            }
        }
        Ok(())
    }

    fn undulator_steps(&self, setpoints: &UndulatorSetpoints) -> MonoResult<Vec<MoveStep>> {
        let axes = self
            .undulator_axes
            .get(&setpoints.device)
            .ok_or_else(|| MonoError::UnknownUndulator(setpoints.device.to_string()))?;
        let gap = |value| MoveStep::new(MoveStage::SetUndulator, vec![AxisTarget::new(axes.gap.as_str(), value)]);
        let phase = MoveStep::new(
            MoveStage::SetUndulator,
            vec![AxisTarget::new(axes.phase.as_str(), setpoints.phase)],
        );
        Ok(match setpoints.order {
            UndulatorMoveOrder::PhaseThenGap => vec![phase, gap(setpoints.gap)],
            UndulatorMoveOrder::OpenGapPhaseGap { open_gap_mm } => {
                vec![gap(open_gap_mm), phase, gap(setpoints.gap)]
            }
        })
    }

    /// Current mirror and grating pitch
    pub async fn read_pitch(&self, registry: &AxisRegistry) -> MonoResult<PitchReadback> {
        Ok(PitchReadback {
            mirror: registry.position(&self.axes.mirror_pitch).await?,
            grating: registry.position(&self.axes.grating_pitch).await?,
        })
    }

    /// Execute a planned sequence, one step at a time
    ///
    /// Every axis is checked for registration before the first step.
    pub async fn execute(&self, registry: &AxisRegistry, sequence: &MoveSequence) -> MonoResult<()> {
        for step in sequence.steps() {
            registry.check_targets(&step.targets)?;
        }

        let mut stage = None;
        for step in sequence.steps() {
            if stage != Some(step.stage) {
                info!(stage = %step.stage, "Entering stage");
                stage = Some(step.stage);
            }
            registry
                .move_together(&step.targets, self.settle_timeout)
                .await?;
        }
        Ok(())
    }

    /// Bring the monochromator (and undulator) to `request`
    ///
    /// # Errors
    /// Validation errors are returned before any axis is commanded. `Motion` errors leave the
    /// axes wherever the failing step stopped them.
    pub async fn move_to(&self, registry: &AxisRegistry, request: &MoveRequest) -> MonoResult<MoveReport> {
        let span = info_span!(
            "move_to",
            energy = request.energy,
            grating = %request.grating
        );
        async {
            let started_at = Utc::now();
            let clock = Instant::now();

            let start_pitch = self.read_pitch(registry).await?;
            let sequence = self.plan_move(request, start_pitch).inspect_err(|e| {
                warn!(error = %e, "Rejected move request");
            })?;

            self.execute(registry, &sequence).await?;

            let report = MoveReport {
                request: request.clone(),
                angles: *sequence.angles(),
                undulator: sequence.undulator().cloned(),
                start_pitch,
                steps: sequence.len(),
                pitch_steps: sequence.pitch_steps(),
                started_at,
                elapsed_secs: clock.elapsed().as_secs_f64(),
            };
            info!(
                gamma = report.angles.gamma,
                beta = report.angles.beta,
                c = report.angles.c,
                steps = report.steps,
                "Move complete"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{Branch, Grating, Polarization};
    use crate::hardware::{create_mock_registry, MotionLog};
    use crate::optics::FocusPolicy;
    use std::path::Path;
    use tracing_test::traced_test;

    fn shipped() -> (BeamlineConfig, CoordinatedMover) {
        let root = Path::new(env!("CARGO_MANIFEST_DIR"));
        let config = BeamlineConfig::load_from(root.join("config/beamline.toml")).unwrap();
        let store = Arc::new(CalibrationStore::load(&config, root).unwrap());
        let mover = CoordinatedMover::from_config(&config, store).unwrap();
        (config, mover)
    }

    fn epu57() -> UndulatorId {
        "EPU57".parse().unwrap()
    }

    #[test]
    fn test_pitch_step_count() {
        assert_eq!(pitch_step_count(0.0, 0.0, 1.0, 100).unwrap(), 1);
        assert_eq!(pitch_step_count(0.4, 0.9, 1.0, 100).unwrap(), 1);
        assert_eq!(pitch_step_count(3.4, 1.0, 1.0, 100).unwrap(), 3);
        assert_eq!(pitch_step_count(-1.0, 9.0, 1.0, 100).unwrap(), 5);
        assert_eq!(pitch_step_count(2.0, 0.0, 0.5, 100).unwrap(), 4);
        assert_eq!(pitch_step_count(2.0, 0.0, 0.5, 4).unwrap(), 4);
        assert!(matches!(
            pitch_step_count(2.0, 0.0, 0.5, 3),
            Err(MonoError::Range { value, .. }) if value == 4.0
        ));
        assert!(matches!(
            pitch_step_count(f64::NAN, 1.0, 1.0, 100),
            Err(MonoError::Domain(_))
        ));
        assert!(matches!(
            pitch_step_count(1.0, f64::INFINITY, 1.0, 100),
            Err(MonoError::Domain(_))
        ));
    }

    #[test]
    fn test_plan_stage_order() {
        let (_, mover) = shipped();
        let request = MoveRequest::new(500.0, Grating::L800).with_undulator(epu57(), Polarization::LH);
        let readback = PitchReadback {
            mirror: 84.0,
            grating: 84.0,
        };
        let sequence = mover.plan_move(&request, readback).unwrap();

        let stages: Vec<MoveStage> = sequence.steps().iter().map(|s| s.stage).collect();
        let n = sequence.pitch_steps();
        assert!(n >= 3);
        assert_eq!(stages[0], MoveStage::SetOffsets);
        assert_eq!(stages[1], MoveStage::SetTranslation);
        assert!(stages[2..2 + n].iter().all(|s| *s == MoveStage::StepPitch));
        assert_eq!(stages[2 + n], MoveStage::SetFocusAndEnergy);
        assert_eq!(&stages[3 + n..], &[MoveStage::SetUndulator, MoveStage::SetUndulator]);

        // Ramp starts at the readback and ends on the solved angles
        let first = &sequence.steps()[2].targets;
        assert_eq!(first[0].position, 84.0);
        let last = &sequence.steps()[1 + n].targets;
        assert_eq!(last[0].position, sequence.angles().gamma);
        assert_eq!(last[1].position, sequence.angles().beta);

        // LH: phase 0, then gap
        let phase = &sequence.steps()[3 + n].targets[0];
        assert_eq!(phase.axis, "epu57_phase");
        assert_eq!(phase.position, 0.0);
        assert_eq!(sequence.steps()[4 + n].targets[0].axis, "epu57_gap");
    }

    #[test]
    fn test_single_pitch_step_uses_target() {
        let (_, mover) = shipped();
        let request = MoveRequest::new(500.0, Grating::L800);
        let first = mover
            .plan_move(&request, PitchReadback { mirror: 0.0, grating: 0.0 })
            .unwrap();
        let at_target = mover.plan_move(&request, first.final_pitch()).unwrap();
        assert_eq!(at_target.pitch_steps(), 1);
        assert_eq!(at_target.len(), 4);
    }

    #[test]
    fn test_non_finite_readback_rejected() {
        let (_, mover) = shipped();
        let request = MoveRequest::new(500.0, Grating::L800);
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = mover
                .plan_move(&request, PitchReadback { mirror: bad, grating: 86.0 })
                .unwrap_err();
            assert!(matches!(err, MonoError::Read { ref device, .. } if device == "pgm_mirror_pitch"));

            let err = mover
                .plan_move(&request, PitchReadback { mirror: 87.0, grating: bad })
                .unwrap_err();
            assert!(matches!(err, MonoError::Read { ref device, .. } if device == "pgm_grating_pitch"));
        }
    }

    #[test]
    fn test_runaway_pitch_ramp_rejected() {
        let (_, mover) = shipped();
        let request = MoveRequest::new(500.0, Grating::L800);
        let err = mover
            .plan_move(&request, PitchReadback { mirror: 1e12, grating: 86.0 })
            .unwrap_err();
        assert!(matches!(err, MonoError::Range { max, .. } if max == 500.0));
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_garbage_readback_moves_nothing() {
        let (config, mover) = shipped();
        let log = MotionLog::new();
        let registry = create_mock_registry(&config, &log).unwrap();
        registry
            .movable("pgm_grating_pitch")
            .unwrap()
            .move_abs(f64::NAN)
            .await
            .unwrap();
        log.clear();

        let err = mover
            .move_to(&registry, &MoveRequest::new(500.0, Grating::L800))
            .await
            .unwrap_err();
        assert!(matches!(err, MonoError::Read { .. }));
        assert!(log.is_empty());
    }

    #[test]
    fn test_offsets_follow_branch() {
        let (config, mover) = shipped();
        let request = MoveRequest::new(500.0, Grating::L800).with_branch(Branch::B);
        let sequence = mover
            .plan_move(&request, PitchReadback { mirror: 87.0, grating: 86.0 })
            .unwrap();
        let offsets = &sequence.steps()[0].targets;
        let profile = config.gratings.iter().find(|g| g.grating == Grating::L800).unwrap();
        assert_eq!(offsets[0].position, profile.branch_b.mirror_offset_deg);
        assert_eq!(offsets[1].position, profile.branch_b.grating_offset_deg);
        assert_eq!(offsets[2].position, 800.0);
    }

    #[test]
    fn test_circular_parks_gap_first() {
        let (_, mover) = shipped();
        let request = MoveRequest::new(500.0, Grating::L800).with_undulator(epu57(), Polarization::CR);
        let sequence = mover
            .plan_move(&request, PitchReadback { mirror: 87.5, grating: 86.2 })
            .unwrap();
        let tail: Vec<&AxisTarget> = sequence
            .steps()
            .iter()
            .filter(|s| s.stage == MoveStage::SetUndulator)
            .map(|s| &s.targets[0])
            .collect();
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].axis, "epu57_gap");
        assert_eq!(tail[0].position, 100.0);
        assert_eq!(tail[1].axis, "epu57_phase");
        assert!(tail[1].position <= 0.0);
        assert_eq!(tail[2].axis, "epu57_gap");
    }

    #[test]
    fn test_nominal_focus_uses_stored_constant() {
        let (_, mover) = shipped();
        let request = MoveRequest::new(500.0, Grating::L800).with_focus(FocusPolicy::Nominal);
        let sequence = mover
            .plan_move(&request, PitchReadback { mirror: 87.5, grating: 86.2 })
            .unwrap();
        assert_eq!(sequence.angles().c, 3.1);
    }

    #[test]
    fn test_sequence_as_plan() {
        let (_, mover) = shipped();
        let request = MoveRequest::new(500.0, Grating::L800);
        let mut sequence = mover
            .plan_move(&request, PitchReadback { mirror: 87.5, grating: 86.2 })
            .unwrap();
        let commands = crate::experiment::collect_commands(&mut sequence);
        assert_eq!(commands.len(), sequence.len());
        assert!(matches!(commands[1], PlanCommand::MoveTo { .. }));
        assert!(matches!(commands[0], PlanCommand::MoveTogether { .. }));

        sequence.reset();
        assert!(sequence.next_command().is_some());
    }

    #[tokio::test]
    async fn test_out_of_range_moves_nothing() {
        let (config, mover) = shipped();
        let log = MotionLog::new();
        let registry = create_mock_registry(&config, &log).unwrap();

        let request = MoveRequest::new(500.0, Grating::L600);
        let err = mover.move_to(&registry, &request).await.unwrap_err();
        assert!(matches!(err, MonoError::Range { .. }));
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_move_to_reaches_targets() {
        let (config, mover) = shipped();
        let log = MotionLog::new();
        let registry = create_mock_registry(&config, &log).unwrap();

        let request = MoveRequest::new(700.0, Grating::L800).with_undulator(epu57(), Polarization::LV);
        let report = mover.move_to(&registry, &request).await.unwrap();

        assert_eq!(registry.position("pgm_energy").await.unwrap(), 700.0);
        assert_eq!(
            registry.position("pgm_mirror_pitch").await.unwrap(),
            report.angles.gamma
        );
        assert_eq!(registry.position("epu57_phase").await.unwrap(), 28.5);
        let gap = registry.position("epu57_gap").await.unwrap();
        assert_eq!(Some(gap), report.undulator.map(|u| u.gap));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_move_logs_stages() {
        let (config, mover) = shipped();
        let log = MotionLog::new();
        let registry = create_mock_registry(&config, &log).unwrap();

        let request = MoveRequest::new(400.0, Grating::L800).with_undulator(epu57(), Polarization::CL);
        mover.move_to(&registry, &request).await.unwrap();

        assert!(logs_contain("Entering stage"));
        assert!(logs_contain("STEP_PITCH"));
        assert!(logs_contain("SET_UNDULATOR"));
        assert!(logs_contain("Move complete"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_rejected_move_is_logged() {
        let (config, mover) = shipped();
        let log = MotionLog::new();
        let registry = create_mock_registry(&config, &log).unwrap();

        let request = MoveRequest::new(2000.0, Grating::L800);
        assert!(mover.move_to(&registry, &request).await.is_err());
        assert!(logs_contain("Rejected move request"));
        assert!(!logs_contain("Entering stage"));
    }
}
