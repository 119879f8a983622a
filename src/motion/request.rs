//! Inputs to a coordinated move.

use crate::calibration::{Branch, Grating, Polarization, UndulatorId};
pub use crate::optics::FocusPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One request to bring the monochromator (and optionally an undulator) to a photon energy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Photon energy (eV)
    pub energy: f64,
    /// Grating to use
    pub grating: Grating,
    /// Beamline branch
    #[serde(default)]
    pub branch: Branch,
    /// Undulator to drive, if any
    #[serde(default)]
    pub undulator: Option<UndulatorId>,
    /// Polarization mode of the undulator
    #[serde(default)]
    pub polarization: Polarization,
    /// Fixed-focus constant selection
    #[serde(default)]
    pub focus: FocusPolicy,
}

impl MoveRequest {
    /// Monochromator-only request on branch A with the calculated focus constant.
    pub fn new(energy: f64, grating: Grating) -> Self {
        Self {
            energy,
            grating,
            branch: Branch::default(),
            undulator: None,
            polarization: Polarization::default(),
            focus: FocusPolicy::default(),
        }
    }

    /// Select the branch
    pub fn with_branch(mut self, branch: Branch) -> Self {
        self.branch = branch;
        self
    }

    /// Also drive `undulator` in `polarization`
    pub fn with_undulator(mut self, undulator: UndulatorId, polarization: Polarization) -> Self {
        self.undulator = Some(undulator);
        self.polarization = polarization;
        self
    }

    /// Select the focus policy
    pub fn with_focus(mut self, focus: FocusPolicy) -> Self {
        self.focus = focus;
        self
    }
}

impl fmt::Display for MoveRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} eV, {} grating, branch {}", self.energy, self.grating, self.branch)?;
        if let Some(undulator) = &self.undulator {
            write!(f, ", {undulator} {}", self.polarization)?;
        }
        write!(f, ", focus {}", self.focus)
    }
}

/// Current mirror and grating pitch, the starting point of the pitch ramp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchReadback {
    /// Mirror pitch (degrees)
    pub mirror: f64,
    /// Grating pitch (degrees)
    pub grating: f64,
}
