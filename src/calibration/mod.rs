//! Calibration data: grating profiles, undulator profiles and gap/phase tables.

pub mod device;
pub mod grating;
pub mod store;
pub mod table;

pub use device::{Polarization, UndulatorId, UndulatorProfile};
pub use grating::{Branch, BranchOffsets, EnergyRange, Grating, GratingProfile};
pub use store::{CalibrationStore, CalibrationStoreBuilder, Geometry};
pub use table::{interpolate, CalibrationTable, Curve, TableMode, TableSource};
