//! Optics solvers: grating angles and undulator gap/phase.

pub mod angles;
pub mod undulator;

pub use angles::{AngleSolver, FocusPolicy, GratingEquation, SolvedAngles};
pub use undulator::{UndulatorMoveOrder, UndulatorSetpoints, UndulatorSolver};
