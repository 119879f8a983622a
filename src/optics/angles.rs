//! Grating-equation solver for the variable-line-spacing plane-grating monochromator.
//!
//! For a photon energy `E` (eV) and a grating of line density `k` (lines/mm) the solver returns
//! the incidence angle `alpha`, the diffraction angle `beta` (both measured from the grating
//! normal) and the mirror pitch setpoint `gamma = (alpha + beta) / 2`, all in degrees, together
//! with the fixed-focus constant `c = cos(beta) / cos(alpha)` that was used.
//!
//! With `lambda = 1.24e-3 / E` (mm), `A0 = k * lambda`, `b2 = -a1 / (2k)`,
//! `A2 = A0 * rb * b2` and `r = rb / ra`:
//!
//! ```text
//! alpha = asin(-A0 / (c^2 - 1) + sqrt(1 + (c * A0)^2 / (c^2 - 1)^2))
//! beta  = acos(c * cos(alpha))
//! ```
//!
//! When no `c` is given, the focus condition of the VLS grating fixes it in closed form (see
//! [`fixed_focus_constant`]). Every square root, division and inverse trigonometric argument is
//! checked; infeasible inputs produce [`MonoError::Domain`] and are never clamped.

use crate::calibration::{Branch, CalibrationStore, Grating, UndulatorId};
use crate::error::{MonoError, MonoResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// `h * c` in eV·mm.
const HC_EV_MM: f64 = 1.24e-3;

/// How the fixed-focus constant is chosen for a move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "policy", content = "c", rename_all = "snake_case")]
pub enum FocusPolicy {
    /// Solve the focus condition for the current energy and source distance.
    #[default]
    Calculated,
    /// Use the constant stored for the grating/branch pair.
    Nominal,
    /// Use a caller-supplied constant.
    Explicit(f64),
}

impl fmt::Display for FocusPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FocusPolicy::Calculated => write!(f, "calculated"),
            FocusPolicy::Nominal => write!(f, "nominal"),
            FocusPolicy::Explicit(c) => write!(f, "explicit c={c}"),
        }
    }
}

/// Result of one solve, angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolvedAngles {
    /// Incidence angle on the grating
    pub alpha: f64,
    /// Diffraction angle
    pub beta: f64,
    /// Mirror pitch setpoint, `(alpha + beta) / 2`
    pub gamma: f64,
    /// Fixed-focus constant used
    pub c: f64,
}

/// Grating constants entering the equation for one solve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GratingEquation {
    /// Line density (lines/mm)
    pub lines_per_mm: f64,
    /// Quadratic VLS coefficient
    pub b2: f64,
    /// Grating to exit slit distance (mm)
    pub exit_slit_distance_mm: f64,
    /// Source to grating distance (mm)
    pub source_distance_mm: f64,
}

impl GratingEquation {
    /// `A0 = k * lambda` for photon energy `energy` (eV).
    pub fn a0(&self, energy: f64) -> f64 {
        self.lines_per_mm * HC_EV_MM / energy
    }

    /// `A2 = A0 * rb * b2`.
    pub fn a2(&self, energy: f64) -> f64 {
        self.a0(energy) * self.exit_slit_distance_mm * self.b2
    }

    /// Distance ratio `r = rb / ra`.
    pub fn r(&self) -> f64 {
        self.exit_slit_distance_mm / self.source_distance_mm
    }

    /// Solve for the angles at `energy`, with `c` calculated when `None`.
    ///
    /// Performs no range checks on `energy` beyond positivity.
    pub fn solve(&self, energy: f64, c: Option<f64>) -> MonoResult<SolvedAngles> {
        if !(energy.is_finite() && energy > 0.0) {
            return Err(MonoError::Domain(format!(
                "photon energy must be positive, got {energy}"
            )));
        }
        let a0 = self.a0(energy);
        let a2 = self.a2(energy);
        let c = match c {
            Some(c) => c,
            None => fixed_focus_constant(a0, a2, self.r())?,
        };
        angles_for(a0, c)
    }
}

fn finite(label: &str, value: f64) -> MonoResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MonoError::Domain(format!("{label} is not finite ({value})")))
    }
}

fn checked_sqrt(label: &str, radicand: f64) -> MonoResult<f64> {
    if finite(label, radicand)? < 0.0 {
        return Err(MonoError::Domain(format!(
            "{label} has a negative radicand ({radicand})"
        )));
    }
    Ok(radicand.sqrt())
}

fn checked_div(label: &str, numerator: f64, denominator: f64) -> MonoResult<f64> {
    if denominator == 0.0 {
        return Err(MonoError::Domain(format!("{label} has a zero denominator")));
    }
    finite(label, numerator / denominator)
}

fn check_unit_interval(label: &str, value: f64) -> MonoResult<f64> {
    if !(-1.0..=1.0).contains(&finite(label, value)?) {
        return Err(MonoError::Domain(format!(
            "{label} argument {value} is outside [-1, 1]"
        )));
    }
    Ok(value)
}

/// Closed-form fixed-focus constant for given `A0`, `A2` and `r`.
pub fn fixed_focus_constant(a0: f64, a2: f64, r: f64) -> MonoResult<f64> {
    let ratio = checked_div("A2/A0", a2, a0)?;
    let inner = checked_sqrt(
        "focus condition",
        (1.0 + r).powi(2) + 2.0 * a2 * (1.0 + r) - r * a0 * a0,
    )?;
    let numerator = 2.0 * a2 + 4.0 * ratio * ratio + (4.0 + 2.0 * a2 - a0 * a0) * r
        - 4.0 * ratio * inner;
    let denominator = -4.0 + a0 * a0 - 4.0 * a2 + 4.0 * ratio * ratio;
    checked_sqrt("c^2", checked_div("c^2", numerator, denominator)?)
}

/// Angles for a given `A0` and fixed-focus constant `c`.
pub fn angles_for(a0: f64, c: f64) -> MonoResult<SolvedAngles> {
    if !(c.is_finite() && c > 0.0) {
        return Err(MonoError::Domain(format!(
            "fixed-focus constant must be positive, got {c}"
        )));
    }
    let c2m1 = c * c - 1.0;
    let root = checked_sqrt("alpha", 1.0 + checked_div("alpha", (c * a0).powi(2), c2m1 * c2m1)?)?;
    let sin_alpha = check_unit_interval("asin", checked_div("alpha", -a0, c2m1)? + root)?;
    let alpha = sin_alpha.asin();
    let cos_beta = check_unit_interval("acos", c * alpha.cos())?;
    let beta = cos_beta.acos();

    Ok(SolvedAngles {
        alpha: alpha.to_degrees(),
        beta: beta.to_degrees(),
        gamma: ((alpha + beta) / 2.0).to_degrees(),
        c,
    })
}

/// Range-checked grating-equation solver backed by the calibration store.
#[derive(Debug, Clone)]
pub struct AngleSolver {
    store: Arc<CalibrationStore>,
}

impl AngleSolver {
    /// Solver over a shared store.
    pub fn new(store: Arc<CalibrationStore>) -> Self {
        Self { store }
    }

    /// Underlying calibration store.
    pub fn store(&self) -> &Arc<CalibrationStore> {
        &self.store
    }

    /// Equation constants for `grating` with light from `undulator`.
    pub fn equation(
        &self,
        grating: Grating,
        undulator: Option<&UndulatorId>,
    ) -> MonoResult<GratingEquation> {
        let profile = self.store.grating(grating)?;
        Ok(GratingEquation {
            lines_per_mm: f64::from(grating.lines_per_mm()),
            b2: profile.b2(),
            exit_slit_distance_mm: self.store.geometry().exit_slit_distance_mm,
            source_distance_mm: self.store.source_distance(undulator)?,
        })
    }

    /// Check `energy` against the grating range and, if given, the undulator range.
    pub fn check_range(
        &self,
        energy: f64,
        grating: Grating,
        undulator: Option<&UndulatorId>,
    ) -> MonoResult<()> {
        self.store
            .grating(grating)?
            .energy_range
            .check(energy, format!("{grating} grating"))?;
        if let Some(id) = undulator {
            self.store
                .undulator(id)?
                .energy_range
                .check(energy, id)?;
        }
        Ok(())
    }

    /// Solve for the angles at `energy`.
    ///
    /// `c = None` solves the focus condition. `branch` does not enter the equation; it is
    /// accepted so callers can pass a complete request.
    pub fn solve(
        &self,
        energy: f64,
        grating: Grating,
        branch: Branch,
        undulator: Option<&UndulatorId>,
        c: Option<f64>,
    ) -> MonoResult<SolvedAngles> {
        self.check_range(energy, grating, undulator)?;
        let angles = self.equation(grating, undulator)?.solve(energy, c)?;
        debug!(
            energy,
            %grating,
            %branch,
            alpha = angles.alpha,
            beta = angles.beta,
            gamma = angles.gamma,
            c = angles.c,
            "Solved grating equation"
        );
        Ok(angles)
    }

    /// Solve with the fixed-focus constant chosen by `policy`.
    pub fn solve_with_policy(
        &self,
        energy: f64,
        grating: Grating,
        branch: Branch,
        undulator: Option<&UndulatorId>,
        policy: FocusPolicy,
    ) -> MonoResult<SolvedAngles> {
        let c = match policy {
            FocusPolicy::Calculated => None,
            FocusPolicy::Nominal => Some(self.store.grating(grating)?.offsets(branch).nominal_c),
            FocusPolicy::Explicit(c) => Some(c),
        };
        self.solve(energy, grating, branch, undulator, c)
    }
}
