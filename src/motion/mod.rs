//! Coordinated motion of the monochromator and undulators.

pub mod mover;
pub mod request;

pub use mover::{pitch_step_count, CoordinatedMover, MoveReport, MoveSequence, MoveStage, MoveStep};
pub use request::{FocusPolicy, MoveRequest, PitchReadback};
