//! Plan system for scans
//!
//! Plans are lazy generators that yield commands for the [`RunEngine`](super::RunEngine) to
//! execute. They never touch hardware themselves: a plan only describes what should happen,
//! which also makes a plan's full command list inspectable before anything moves.
//!
//! # Plan Commands
//!
//! - `MoveTo` - Move one axis to a position
//! - `MoveTogether` - Move several axes concurrently and wait for all of them
//! - `Read` - Read a value from a detector
//! - `Wait` - Wait for a duration
//! - `Checkpoint` - Mark a point boundary
//! - `EmitEvent` - Record the readings of one point
//!
//! # Example Plan
//!
//! ```rust,ignore
//! let plan = LineScan::new("slit_x", 0.0, 10.0, 11).with_detector("diode");
//!
//! // MoveTo("slit_x", 0.0)
//! // Checkpoint
//! // Read("diode")
//! // EmitEvent { positions: { slit_x: 0.0 } }
//! // MoveTo("slit_x", 1.0)
//! // ...
//! ```

use super::trajectory::{self, AxisSweep};
use crate::error::{MonoError, MonoResult};
use crate::motion::{CoordinatedMover, MoveRequest, MoveSequence, PitchReadback};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One axis and its commanded position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisTarget {
    /// Axis name
    pub axis: String,
    /// Target position
    pub position: f64,
}

impl AxisTarget {
    /// New target
    pub fn new(axis: impl Into<String>, position: f64) -> Self {
        Self {
            axis: axis.into(),
            position,
        }
    }
}

/// Commands that plans yield for the RunEngine to execute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum PlanCommand {
    /// Move an axis to an absolute position
    MoveTo {
        /// Axis to move
        device_id: String,
        /// Target position
        position: f64,
    },
    /// Move several axes at once; complete when every axis has settled
    MoveTogether {
        /// Targets, commanded concurrently
        targets: Vec<AxisTarget>,
    },
    /// Read a value from a detector
    Read {
        /// Detector to read
        device_id: String,
    },
    /// Wait for a duration in seconds
    Wait {
        /// Duration in seconds
        seconds: f64,
    },
    /// Point boundary
    Checkpoint {
        /// Checkpoint label
        label: String,
    },
    /// Emit an event with the readings collected since the last event
    EmitEvent {
        /// Stream name (e.g., "primary")
        stream: String,
        /// Nominal positions of the point
        positions: HashMap<String, f64>,
    },
}

impl PlanCommand {
    /// Single-axis or multi-axis move, whichever fits `targets`.
    pub fn move_to(mut targets: Vec<AxisTarget>) -> Option<Self> {
        match targets.len() {
            0 => None,
            1 => targets.pop().map(|t| PlanCommand::MoveTo {
                device_id: t.axis,
                position: t.position,
            }),
            _ => Some(PlanCommand::MoveTogether { targets }),
        }
    }
}

/// Plan trait - all plans implement this to generate commands
pub trait Plan: Send + Sync {
    /// Plan type identifier (e.g., "line_scan", "grid_scan")
    fn plan_type(&self) -> &str;

    /// Human-readable plan name
    fn plan_name(&self) -> &str;

    /// Plan arguments for documentation
    fn plan_args(&self) -> HashMap<String, String>;

    /// Axes that will be moved
    fn movers(&self) -> Vec<String>;

    /// Detectors that will be read
    fn detectors(&self) -> Vec<String>;

    /// Total number of points
    fn num_points(&self) -> usize;

    /// Generate the next command, returning None when complete
    fn next_command(&mut self) -> Option<PlanCommand>;

    /// Reset the plan to start from the beginning
    fn reset(&mut self);
}

/// Drain a plan into its full command list.
pub fn collect_commands(plan: &mut dyn Plan) -> Vec<PlanCommand> {
    std::iter::from_fn(|| plan.next_command()).collect()
}

// =============================================================================
// Point cursor shared by the scan plans
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum PointStep {
    Move,
    Settle,
    Checkpoint,
    Read { detector_idx: usize },
    Emit,
    Pause,
}

/// Per-point state machine: move, settle, checkpoint, read each detector, emit, pause.
#[derive(Debug, Clone)]
struct PointCursor {
    label: &'static str,
    detectors: Vec<String>,
    settle_time: f64,
    pause_time: f64,
    point: usize,
    step: PointStep,
}

impl PointCursor {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            detectors: Vec::new(),
            settle_time: 0.0,
            pause_time: 0.0,
            point: 0,
            step: PointStep::Move,
        }
    }

    fn reset(&mut self) {
        self.point = 0;
        self.step = PointStep::Move;
    }

    fn next<M, P>(&mut self, num_points: usize, moves: M, positions: P) -> Option<PlanCommand>
    where
        M: Fn(usize) -> Vec<AxisTarget>,
        P: Fn(usize) -> Vec<AxisTarget>,
    {
        loop {
            if self.point >= num_points {
                return None;
            }
            match self.step {
                PointStep::Move => {
                    let command = PlanCommand::move_to(moves(self.point));
                    self.step = match (&command, self.settle_time > 0.0) {
                        (Some(_), true) => PointStep::Settle,
                        _ => PointStep::Checkpoint,
                    };
                    if command.is_some() {
                        return command;
                    }
                }
                PointStep::Settle => {
                    self.step = PointStep::Checkpoint;
                    return Some(PlanCommand::Wait {
                        seconds: self.settle_time,
                    });
                }
                PointStep::Checkpoint => {
                    self.step = PointStep::Read { detector_idx: 0 };
                    return Some(PlanCommand::Checkpoint {
                        label: format!("{}_{}", self.label, self.point),
                    });
                }
                PointStep::Read { detector_idx } => match self.detectors.get(detector_idx) {
                    Some(det) => {
                        self.step = PointStep::Read {
                            detector_idx: detector_idx + 1,
                        };
                        return Some(PlanCommand::Read {
                            device_id: det.clone(),
                        });
                    }
                    None => self.step = PointStep::Emit,
                },
                PointStep::Emit => {
                    let positions = positions(self.point)
                        .into_iter()
                        .map(|t| (t.axis, t.position))
                        .collect();
                    self.point += 1;
                    self.step = if self.pause_time > 0.0 && self.point < num_points {
                        PointStep::Pause
                    } else {
                        PointStep::Move
                    };
                    return Some(PlanCommand::EmitEvent {
                        stream: "primary".to_string(),
                        positions,
                    });
                }
                PointStep::Pause => {
                    self.step = PointStep::Move;
                    return Some(PlanCommand::Wait {
                        seconds: self.pause_time,
                    });
                }
            }
        }
    }
}

/// `i`-th of `n` evenly spaced points from `start` to `stop` inclusive.
pub fn linspace_at(start: f64, stop: f64, n: usize, i: usize) -> f64 {
    if n <= 1 {
        start
    } else if i + 1 == n {
        stop
    } else {
        start + (stop - start) * i as f64 / (n - 1) as f64
    }
}

/// `n` evenly spaced points from `start` to `stop` inclusive.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| linspace_at(start, stop, n, i)).collect()
}

// =============================================================================
// Count
// =============================================================================

/// Count plan - take N readings at the current position
#[derive(Debug, Clone)]
pub struct Count {
    num_points: usize,
    cursor: PointCursor,
}

impl Count {
    /// Create a new Count plan
    pub fn new(num_points: usize) -> Self {
        Self {
            num_points,
            cursor: PointCursor::new("count"),
        }
    }

    /// Add a detector
    pub fn with_detector(mut self, detector: &str) -> Self {
        self.cursor.detectors.push(detector.to_string());
        self
    }

    /// Set delay between readings in seconds
    pub fn with_delay(mut self, seconds: f64) -> Self {
        self.cursor.pause_time = seconds;
        self
    }
}

impl Plan for Count {
    fn plan_type(&self) -> &str {
        "count"
    }

    fn plan_name(&self) -> &str {
        "Count"
    }

    fn plan_args(&self) -> HashMap<String, String> {
        HashMap::from([
            ("num_points".to_string(), self.num_points.to_string()),
            ("delay".to_string(), self.cursor.pause_time.to_string()),
        ])
    }

    fn movers(&self) -> Vec<String> {
        Vec::new()
    }

    fn detectors(&self) -> Vec<String> {
        self.cursor.detectors.clone()
    }

    fn num_points(&self) -> usize {
        self.num_points
    }

    fn next_command(&mut self) -> Option<PlanCommand> {
        self.cursor.next(self.num_points, |_| Vec::new(), |_| Vec::new())
    }

    fn reset(&mut self) {
        self.cursor.reset();
    }
}

// =============================================================================
// LineScan
// =============================================================================

/// Line scan - scan a single axis with one or more detectors
#[derive(Debug, Clone)]
pub struct LineScan {
    axis: String,
    start: f64,
    stop: f64,
    num_points: usize,
    cursor: PointCursor,
}

impl LineScan {
    /// Create a new LineScan over `num_points` points from `start` to `stop`
    pub fn new(axis: &str, start: f64, stop: f64, num_points: usize) -> Self {
        Self {
            axis: axis.to_string(),
            start,
            stop,
            num_points,
            cursor: PointCursor::new("point"),
        }
    }

    /// Create a LineScan from a step size
    ///
    /// The last point is the one closest to `end` on the `start + k * step` grid.
    pub fn with_step_size(axis: &str, start: f64, end: f64, step: f64) -> MonoResult<Self> {
        let sweep = AxisSweep::new(axis, start, end, step)?;
        Ok(Self::new(axis, start, sweep.stop(), sweep.steps() + 1))
    }

    /// Add a detector to the scan
    pub fn with_detector(mut self, detector: &str) -> Self {
        self.cursor.detectors.push(detector.to_string());
        self
    }

    /// Add multiple detectors to the scan
    pub fn with_detectors(mut self, detectors: &[&str]) -> Self {
        self.cursor
            .detectors
            .extend(detectors.iter().map(|s| s.to_string()));
        self
    }

    /// Set settle time in seconds
    pub fn with_settle_time(mut self, seconds: f64) -> Self {
        self.cursor.settle_time = seconds;
        self
    }

    /// Last point
    pub fn stop(&self) -> f64 {
        self.stop
    }
}

impl Plan for LineScan {
    fn plan_type(&self) -> &str {
        "line_scan"
    }

    fn plan_name(&self) -> &str {
        "Line Scan"
    }

    fn plan_args(&self) -> HashMap<String, String> {
        HashMap::from([
            ("axis".to_string(), self.axis.clone()),
            ("start".to_string(), self.start.to_string()),
            ("stop".to_string(), self.stop.to_string()),
            ("num_points".to_string(), self.num_points.to_string()),
            ("detectors".to_string(), self.cursor.detectors.join(",")),
        ])
    }

    fn movers(&self) -> Vec<String> {
        vec![self.axis.clone()]
    }

    fn detectors(&self) -> Vec<String> {
        self.cursor.detectors.clone()
    }

    fn num_points(&self) -> usize {
        self.num_points
    }

    fn next_command(&mut self) -> Option<PlanCommand> {
        let (axis, start, stop, n) = (&self.axis, self.start, self.stop, self.num_points);
        let at = |i| vec![AxisTarget::new(axis.as_str(), linspace_at(start, stop, n, i))];
        self.cursor.next(n, at, at)
    }

    fn reset(&mut self) {
        self.cursor.reset();
    }
}

// =============================================================================
// GridScan
// =============================================================================

/// Grid scan - outer product of two axes, raster or snake
#[derive(Debug, Clone)]
pub struct GridScan {
    axis_outer: String,
    outer_start: f64,
    outer_stop: f64,
    outer_points: usize,

    axis_inner: String,
    inner_start: f64,
    inner_stop: f64,
    inner_points: usize,

    snake: bool,
    cursor: PointCursor,
}

impl GridScan {
    /// Create a grid scan; snake (bidirectional) by default
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        axis_outer: &str,
        outer_start: f64,
        outer_stop: f64,
        outer_points: usize,
        axis_inner: &str,
        inner_start: f64,
        inner_stop: f64,
        inner_points: usize,
    ) -> Self {
        Self {
            axis_outer: axis_outer.to_string(),
            outer_start,
            outer_stop,
            outer_points,
            axis_inner: axis_inner.to_string(),
            inner_start,
            inner_stop,
            inner_points,
            snake: true,
            cursor: PointCursor::new("point"),
        }
    }

    /// Add a detector to the scan
    pub fn with_detector(mut self, detector: &str) -> Self {
        self.cursor.detectors.push(detector.to_string());
        self
    }

    /// Set settle time in seconds
    pub fn with_settle_time(mut self, seconds: f64) -> Self {
        self.cursor.settle_time = seconds;
        self
    }

    /// Set snake mode (bidirectional scanning)
    pub fn with_snake(mut self, snake: bool) -> Self {
        self.snake = snake;
        self
    }
}

/// Grid indices `(outer, inner)` of point `i`.
fn grid_indices(i: usize, inner_points: usize, snake: bool) -> (usize, usize) {
    let outer = i / inner_points;
    let along = i % inner_points;
    let inner = if snake && outer % 2 == 1 {
        inner_points - 1 - along
    } else {
        along
    };
    (outer, inner)
}

impl Plan for GridScan {
    fn plan_type(&self) -> &str {
        "grid_scan"
    }

    fn plan_name(&self) -> &str {
        "Grid Scan"
    }

    fn plan_args(&self) -> HashMap<String, String> {
        HashMap::from([
            ("axis_outer".to_string(), self.axis_outer.clone()),
            ("outer_start".to_string(), self.outer_start.to_string()),
            ("outer_stop".to_string(), self.outer_stop.to_string()),
            ("outer_points".to_string(), self.outer_points.to_string()),
            ("axis_inner".to_string(), self.axis_inner.clone()),
            ("inner_start".to_string(), self.inner_start.to_string()),
            ("inner_stop".to_string(), self.inner_stop.to_string()),
            ("inner_points".to_string(), self.inner_points.to_string()),
            ("snake".to_string(), self.snake.to_string()),
        ])
    }

    fn movers(&self) -> Vec<String> {
        vec![self.axis_outer.clone(), self.axis_inner.clone()]
    }

    fn detectors(&self) -> Vec<String> {
        self.cursor.detectors.clone()
    }

    fn num_points(&self) -> usize {
        self.outer_points * self.inner_points
    }

    fn next_command(&mut self) -> Option<PlanCommand> {
        let n = self.num_points();
        let inner_points = self.inner_points.max(1);
        let snake = self.snake;
        let outer = |i| {
            AxisTarget::new(
                self.axis_outer.as_str(),
                linspace_at(self.outer_start, self.outer_stop, self.outer_points, i),
            )
        };
        let inner = |i| {
            AxisTarget::new(
                self.axis_inner.as_str(),
                linspace_at(self.inner_start, self.inner_stop, self.inner_points, i),
            )
        };
        let moves = |i| {
            let (o, k) = grid_indices(i, inner_points, snake);
            // The outer axis only moves at the start of a row
            if i % inner_points == 0 {
                vec![outer(o), inner(k)]
            } else {
                vec![inner(k)]
            }
        };
        let positions = |i| {
            let (o, k) = grid_indices(i, inner_points, snake);
            vec![outer(o), inner(k)]
        };
        self.cursor.next(n, moves, positions)
    }

    fn reset(&mut self) {
        self.cursor.reset();
    }
}

// =============================================================================
// InnerProductScan
// =============================================================================

/// Two axes moved together along a line, one point per step
#[derive(Debug, Clone)]
pub struct InnerProductScan {
    first: (String, f64, f64),
    second: (String, f64, f64),
    num_points: usize,
    cursor: PointCursor,
}

impl InnerProductScan {
    /// Both axes go from their start to their stop in `num_points` points
    pub fn new(
        first: (&str, f64, f64),
        second: (&str, f64, f64),
        num_points: usize,
    ) -> Self {
        Self {
            first: (first.0.to_string(), first.1, first.2),
            second: (second.0.to_string(), second.1, second.2),
            num_points,
            cursor: PointCursor::new("point"),
        }
    }

    /// Add a detector to the scan
    pub fn with_detector(mut self, detector: &str) -> Self {
        self.cursor.detectors.push(detector.to_string());
        self
    }
}

impl Plan for InnerProductScan {
    fn plan_type(&self) -> &str {
        "inner_product_scan"
    }

    fn plan_name(&self) -> &str {
        "Inner Product Scan"
    }

    fn plan_args(&self) -> HashMap<String, String> {
        HashMap::from([
            ("axis_1".to_string(), self.first.0.clone()),
            ("start_1".to_string(), self.first.1.to_string()),
            ("stop_1".to_string(), self.first.2.to_string()),
            ("axis_2".to_string(), self.second.0.clone()),
            ("start_2".to_string(), self.second.1.to_string()),
            ("stop_2".to_string(), self.second.2.to_string()),
            ("num_points".to_string(), self.num_points.to_string()),
        ])
    }

    fn movers(&self) -> Vec<String> {
        vec![self.first.0.clone(), self.second.0.clone()]
    }

    fn detectors(&self) -> Vec<String> {
        self.cursor.detectors.clone()
    }

    fn num_points(&self) -> usize {
        self.num_points
    }

    fn next_command(&mut self) -> Option<PlanCommand> {
        let n = self.num_points;
        let (first, second) = (&self.first, &self.second);
        let at = |i| {
            vec![
                AxisTarget::new(first.0.as_str(), linspace_at(first.1, first.2, n, i)),
                AxisTarget::new(second.0.as_str(), linspace_at(second.1, second.2, n, i)),
            ]
        };
        self.cursor.next(n, at, at)
    }

    fn reset(&mut self) {
        self.cursor.reset();
    }
}

// =============================================================================
// PathScan
// =============================================================================

/// Two axes visiting an explicit list of points (spiral trajectories)
#[derive(Debug, Clone)]
pub struct PathScan {
    plan_type: String,
    x_axis: String,
    y_axis: String,
    points: Vec<(f64, f64)>,
    cursor: PointCursor,
}

impl PathScan {
    /// Scan `points` as `(x, y)` pairs
    pub fn new(plan_type: &str, x_axis: &str, y_axis: &str, points: Vec<(f64, f64)>) -> Self {
        Self {
            plan_type: plan_type.to_string(),
            x_axis: x_axis.to_string(),
            y_axis: y_axis.to_string(),
            points,
            cursor: PointCursor::new("point"),
        }
    }

    /// Add a detector to the scan
    pub fn with_detector(mut self, detector: &str) -> Self {
        self.cursor.detectors.push(detector.to_string());
        self
    }

    /// Points in visiting order
    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }
}

impl Plan for PathScan {
    fn plan_type(&self) -> &str {
        &self.plan_type
    }

    fn plan_name(&self) -> &str {
        "Path Scan"
    }

    fn plan_args(&self) -> HashMap<String, String> {
        HashMap::from([
            ("x_axis".to_string(), self.x_axis.clone()),
            ("y_axis".to_string(), self.y_axis.clone()),
            ("num_points".to_string(), self.points.len().to_string()),
        ])
    }

    fn movers(&self) -> Vec<String> {
        vec![self.x_axis.clone(), self.y_axis.clone()]
    }

    fn detectors(&self) -> Vec<String> {
        self.cursor.detectors.clone()
    }

    fn num_points(&self) -> usize {
        self.points.len()
    }

    fn next_command(&mut self) -> Option<PlanCommand> {
        let (x_axis, y_axis, points) = (&self.x_axis, &self.y_axis, &self.points);
        let at = |i: usize| {
            let (x, y) = points[i];
            vec![
                AxisTarget::new(x_axis.as_str(), x),
                AxisTarget::new(y_axis.as_str(), y),
            ]
        };
        self.cursor.next(points.len(), at, at)
    }

    fn reset(&mut self) {
        self.cursor.reset();
    }
}

// =============================================================================
// Two-axis scan builder
// =============================================================================

/// Trajectory of a two-axis step-size scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern2D {
    /// Outer product, every row in the same direction
    Raster,
    /// Outer product, alternating row direction
    Snake,
    /// Both axes together along a line
    Concurrent,
    /// Concentric-ring spiral
    Spiral,
    /// Fermat spiral
    FermatSpiral,
    /// Square spiral
    SquareSpiral,
}

/// Build a two-axis scan from step sizes.
///
/// `first` is the slow (y) axis, `second` the fast (x) axis. Spiral patterns are centred on the
/// middle of both intervals and take their radial step from `second.step`.
pub fn scan_2d(
    first: &AxisSweep,
    second: &AxisSweep,
    pattern: Pattern2D,
    detectors: &[&str],
) -> MonoResult<Box<dyn Plan>> {
    let with_detectors = |plan: PathScan| {
        detectors
            .iter()
            .fold(plan, |plan, det| plan.with_detector(det))
    };

    let plan: Box<dyn Plan> = match pattern {
        Pattern2D::Raster | Pattern2D::Snake => {
            let grid = GridScan::new(
                &first.axis,
                first.start,
                first.stop(),
                first.steps() + 1,
                &second.axis,
                second.start,
                second.stop(),
                second.steps() + 1,
            )
            .with_snake(pattern == Pattern2D::Snake);
            Box::new(
                detectors
                    .iter()
                    .fold(grid, |plan, det| plan.with_detector(det)),
            )
        }
        Pattern2D::Concurrent => {
            let steps = first.steps();
            if steps == 0 {
                return Err(MonoError::Plan(format!(
                    "{}: concurrent scan needs at least one step",
                    first.axis
                )));
            }
            let scan = InnerProductScan::new(
                (&first.axis, first.start, first.stop()),
                (&second.axis, second.start, second.end),
                steps + 1,
            );
            Box::new(
                detectors
                    .iter()
                    .fold(scan, |plan, det| plan.with_detector(det)),
            )
        }
        Pattern2D::Spiral | Pattern2D::FermatSpiral => {
            let nth = trajectory::num_theta(second.step.abs(), first.step.abs(), second.range().abs())?;
            let points = if pattern == Pattern2D::Spiral {
                trajectory::spiral(
                    second.centre(),
                    first.centre(),
                    second.range(),
                    first.range(),
                    second.step.abs(),
                    nth,
                )?
            } else {
                trajectory::fermat_spiral(
                    second.centre(),
                    first.centre(),
                    second.range(),
                    first.range(),
                    second.step.abs(),
                    nth / 2.0,
                )?
            };
            let name = if pattern == Pattern2D::Spiral {
                "spiral"
            } else {
                "fermat_spiral"
            };
            Box::new(with_detectors(PathScan::new(
                name,
                &second.axis,
                &first.axis,
                points,
            )))
        }
        Pattern2D::SquareSpiral => {
            let x_num = ((second.range()) / second.step).round().abs() as usize + 1;
            let y_num = ((first.range()) / first.step).round().abs() as usize + 1;
            let points = trajectory::square_spiral(
                second.centre(),
                first.centre(),
                second.range(),
                first.range(),
                x_num,
                y_num,
            )?;
            Box::new(with_detectors(PathScan::new(
                "square_spiral",
                &second.axis,
                &first.axis,
                points,
            )))
        }
    };

    if plan.num_points() == 0 {
        return Err(MonoError::Plan(format!(
            "{pattern:?} scan of {} and {} has no points",
            first.axis, second.axis
        )));
    }
    Ok(plan)
}

// =============================================================================
// EnergyScan
// =============================================================================

/// Photon-energy scan: for each energy, the coordinated move then one read of every detector
///
/// Every energy is validated and planned when the scan is built, so an out-of-range energy
/// anywhere in the list fails before the first axis moves.
#[derive(Debug, Clone)]
pub struct EnergyScan {
    energy_axis: String,
    energies: Vec<f64>,
    sequences: Vec<MoveSequence>,
    cursor: PointCursor,
    // Position inside the current point's move sequence
    in_sequence: bool,
}

impl EnergyScan {
    /// Plan a scan over `energies`, starting from the pitch readbacks in `start`
    ///
    /// `base` supplies grating, branch, undulator, polarization and focus policy; its energy is
    /// replaced by each scan energy. Each step after the first starts from the previous step's
    /// pitch targets.
    pub fn new(
        mover: &CoordinatedMover,
        base: &MoveRequest,
        energies: &[f64],
        start: PitchReadback,
    ) -> MonoResult<Self> {
        if energies.is_empty() {
            return Err(MonoError::Plan("energy scan needs at least one energy".to_string()));
        }
        let mut readback = start;
        let mut sequences = Vec::with_capacity(energies.len());
        for &energy in energies {
            let request = MoveRequest {
                energy,
                ..base.clone()
            };
            let sequence = mover.plan_move(&request, readback)?;
            readback = sequence.final_pitch();
            sequences.push(sequence);
        }
        Ok(Self {
            energy_axis: mover.axes().energy.clone(),
            energies: energies.to_vec(),
            sequences,
            cursor: PointCursor::new("energy"),
            in_sequence: false,
        })
    }

    /// Build the energy list the way a step-size scan does
    pub fn energies_from_step(start: f64, end: f64, step: f64) -> MonoResult<Vec<f64>> {
        let sweep = AxisSweep::new("energy", start, end, step)?;
        Ok(linspace(start, sweep.stop(), sweep.steps() + 1))
    }

    /// Add a detector to the scan
    pub fn with_detector(mut self, detector: &str) -> Self {
        self.cursor.detectors.push(detector.to_string());
        self
    }

    /// Planned move sequences, one per energy
    pub fn sequences(&self) -> &[MoveSequence] {
        &self.sequences
    }
}

impl Plan for EnergyScan {
    fn plan_type(&self) -> &str {
        "energy_scan"
    }

    fn plan_name(&self) -> &str {
        "Energy Scan"
    }

    fn plan_args(&self) -> HashMap<String, String> {
        let energies: Vec<String> = self.energies.iter().map(f64::to_string).collect();
        HashMap::from([
            ("energies".to_string(), energies.join(",")),
            ("num_points".to_string(), self.energies.len().to_string()),
        ])
    }

    fn movers(&self) -> Vec<String> {
        let mut axes: Vec<String> = self
            .sequences
            .first()
            .map(|s| s.axes())
            .unwrap_or_default();
        axes.sort();
        axes.dedup();
        axes
    }

    fn detectors(&self) -> Vec<String> {
        self.cursor.detectors.clone()
    }

    fn num_points(&self) -> usize {
        self.energies.len()
    }

    fn next_command(&mut self) -> Option<PlanCommand> {
        let point = self.cursor.point;
        let sequence = self.sequences.get_mut(point)?;

        // Drain the coordinated move before handing over to the point cursor
        if self.cursor.step == PointStep::Move {
            if !self.in_sequence {
                sequence.reset();
                self.in_sequence = true;
            }
            if let Some(command) = sequence.next_command() {
                return Some(command);
            }
            self.in_sequence = false;
            self.cursor.step = PointStep::Checkpoint;
        }

        let (energy_axis, energies) = (&self.energy_axis, &self.energies);
        self.cursor.next(
            energies.len(),
            |_| Vec::new(),
            |i| vec![AxisTarget::new(energy_axis.as_str(), energies[i])],
        )
    }

    fn reset(&mut self) {
        self.cursor.reset();
        self.in_sequence = false;
        for sequence in &mut self.sequences {
            sequence.reset();
        }
    }
}
