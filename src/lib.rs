//! # ESM Monochromator Core Library
//!
//! Calibration data, grating-equation and undulator solvers, and coordinated motion for the
//! plane-grating monochromator and the two elliptically polarizing undulators of the ESM soft
//! X-ray beamline. The library holds every piece of logic; the `esm-mono` binary is a thin
//! command-line front end over it.
//!
//! ## Crate Structure
//!
//! - **`calibration`**: Grating and undulator profiles and the gap/phase tables, loaded once at
//!   startup into an immutable, `Arc`-shared `CalibrationStore`.
//! - **`optics`**: The grating-equation solver (`AngleSolver`) and the undulator gap/phase solver
//!   (`UndulatorSolver`).
//! - **`motion`**: The `CoordinatedMover`, which plans a complete move as a `MoveSequence` and
//!   executes it against the axis registry.
//! - **`experiment`**: Lazy scan plans (count, line, grid, spiral, energy scans), trajectories
//!   and a sequential `RunEngine`.
//! - **`hardware`**: `Movable` / `Readable` capability traits, the `AxisRegistry`, and mock axes.
//! - **`config`**: Beamline configuration loaded with Figment from TOML and `ESM_` environment
//!   variables.
//! - **`logging`**: `tracing-subscriber` initialisation.
//! - **`error`**: The `MonoError` enum shared by every module.

pub mod calibration;
pub mod config;
pub mod error;
pub mod experiment;
pub mod hardware;
pub mod logging;
pub mod motion;
pub mod optics;

pub use calibration::{Branch, CalibrationStore, Grating, Polarization, UndulatorId};
pub use config::BeamlineConfig;
pub use error::{MonoError, MonoResult};
pub use motion::{CoordinatedMover, MoveRequest};
pub use optics::{AngleSolver, FocusPolicy, SolvedAngles, UndulatorSolver};
