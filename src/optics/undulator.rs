//! Undulator gap and phase for a photon energy and polarization.
//!
//! | mode | gap table | phase                      | move order            |
//! |------|-----------|----------------------------|-----------------------|
//! | LH   | LH        | 0                          | phase, gap            |
//! | LV   | LV        | period / 2                 | phase, gap            |
//! | CL   | circular  | table phase                | open gap, phase, gap  |
//! | CR   | circular  | negated table phase        | open gap, phase, gap  |

use crate::calibration::{CalibrationStore, Polarization, UndulatorId};
use crate::error::MonoResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Order in which the gap and phase axes must be driven.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndulatorMoveOrder {
    /// Set the phase, then the gap.
    PhaseThenGap,
    /// Park the gap at `open_gap_mm`, set the phase, then set the gap.
    OpenGapPhaseGap {
        /// Parking gap (mm)
        open_gap_mm: f64,
    },
}

/// Target gap and phase for one undulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndulatorSetpoints {
    /// Device the setpoints are for
    pub device: UndulatorId,
    /// Requested polarization
    pub polarization: Polarization,
    /// Gap (mm)
    pub gap: f64,
    /// Phase (mm)
    pub phase: f64,
    /// Required move order
    pub order: UndulatorMoveOrder,
}

/// Gap/phase solver over the calibration store.
#[derive(Debug, Clone)]
pub struct UndulatorSolver {
    store: Arc<CalibrationStore>,
}

impl UndulatorSolver {
    /// Solver over a shared store.
    pub fn new(store: Arc<CalibrationStore>) -> Self {
        Self { store }
    }

    fn check_range(&self, energy: f64, device: &UndulatorId) -> MonoResult<()> {
        self.store
            .undulator(device)?
            .energy_range
            .check(energy, device)
    }

    /// Gap (mm) for `energy` (eV).
    pub fn gap_for(&self, energy: f64, device: &UndulatorId, mode: Polarization) -> MonoResult<f64> {
        self.check_range(energy, device)?;
        self.store.gap_for_energy(device, energy, mode)
    }

    /// Phase (mm) for `energy` (eV).
    pub fn phase_for(
        &self,
        energy: f64,
        device: &UndulatorId,
        mode: Polarization,
    ) -> MonoResult<f64> {
        self.check_range(energy, device)?;
        match mode {
            Polarization::LH => Ok(0.0),
            Polarization::LV => Ok(self.store.undulator(device)?.linear_vertical_phase()),
            Polarization::CL => self.store.phase_for_energy(device, energy, mode),
            Polarization::CR => Ok(-self.store.phase_for_energy(device, energy, mode)?),
        }
    }

    /// Photon energy (eV) the device delivers at `gap` (mm).
    pub fn energy_for(&self, gap: f64, device: &UndulatorId, mode: Polarization) -> MonoResult<f64> {
        self.store.energy_for_gap(device, gap, mode)
    }

    /// Gap, phase and move order for `energy`.
    pub fn setpoints(
        &self,
        energy: f64,
        device: &UndulatorId,
        mode: Polarization,
    ) -> MonoResult<UndulatorSetpoints> {
        let gap = self.gap_for(energy, device, mode)?;
        let phase = self.phase_for(energy, device, mode)?;
        let order = if mode.is_circular() {
            UndulatorMoveOrder::OpenGapPhaseGap {
                open_gap_mm: self.store.undulator(device)?.open_gap_mm,
            }
        } else {
            UndulatorMoveOrder::PhaseThenGap
        };
        Ok(UndulatorSetpoints {
            device: device.clone(),
            polarization: mode,
            gap,
            phase,
            order,
        })
    }
}
