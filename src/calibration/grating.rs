//! Grating identities, branches and per-grating calibration profiles.

use crate::error::{MonoError, MonoResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the four installed plane gratings, identified by line density.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Grating {
    /// 300 lines/mm
    L300,
    /// 600 lines/mm
    L600,
    /// 800 lines/mm
    L800,
    /// 1200 lines/mm
    L1200,
}

impl Grating {
    /// All gratings in ascending line density.
    pub const ALL: [Grating; 4] = [Grating::L300, Grating::L600, Grating::L800, Grating::L1200];

    /// Line density in lines per mm.
    pub fn lines_per_mm(self) -> u32 {
        match self {
            Grating::L300 => 300,
            Grating::L600 => 600,
            Grating::L800 => 800,
            Grating::L1200 => 1200,
        }
    }
}

impl TryFrom<u32> for Grating {
    type Error = MonoError;

    fn try_from(lines: u32) -> MonoResult<Self> {
        match lines {
            300 => Ok(Grating::L300),
            600 => Ok(Grating::L600),
            800 => Ok(Grating::L800),
            1200 => Ok(Grating::L1200),
            other => Err(MonoError::UnknownGrating(format!("{other} l/mm"))),
        }
    }
}

impl From<Grating> for u32 {
    fn from(grating: Grating) -> u32 {
        grating.lines_per_mm()
    }
}

impl FromStr for Grating {
    type Err = MonoError;

    fn from_str(s: &str) -> MonoResult<Self> {
        let digits = s.trim().trim_end_matches("l/mm").trim();
        let lines: u32 = digits
            .parse()
            .map_err(|_| MonoError::UnknownGrating(s.to_string()))?;
        Grating::try_from(lines)
    }
}

impl fmt::Display for Grating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} l/mm", self.lines_per_mm())
    }
}

/// Downstream beam path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Branch {
    /// Branch A
    #[default]
    A,
    /// Branch B
    B,
}

impl FromStr for Branch {
    type Err = MonoError;

    fn from_str(s: &str) -> MonoResult<Self> {
        match s.trim() {
            "A" | "a" => Ok(Branch::A),
            "B" | "b" => Ok(Branch::B),
            other => Err(MonoError::Configuration(format!(
                "Unknown branch '{other}', expected A or B"
            ))),
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::A => write!(f, "A"),
            Branch::B => write!(f, "B"),
        }
    }
}

/// Closed photon-energy interval in eV.
///
/// Deserializes from a two-element array `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 2]", into = "[f64; 2]")]
pub struct EnergyRange {
    min: f64,
    max: f64,
}

impl EnergyRange {
    /// Build a range; `min` must be below `max` and both positive and finite.
    pub fn new(min: f64, max: f64) -> MonoResult<Self> {
        if !(min.is_finite() && max.is_finite()) || min <= 0.0 || min >= max {
            return Err(MonoError::Configuration(format!(
                "Invalid energy range [{min}, {max}]"
            )));
        }
        Ok(Self { min, max })
    }

    /// Lower bound (eV).
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Upper bound (eV).
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Inclusive containment. NaN is never contained.
    pub fn contains(&self, energy: f64) -> bool {
        energy >= self.min && energy <= self.max
    }

    /// Fail with `Range` unless `energy` lies within the interval.
    pub fn check(&self, energy: f64, domain: impl fmt::Display) -> MonoResult<()> {
        if self.contains(energy) {
            Ok(())
        } else {
            Err(MonoError::Range {
                quantity: "photon energy",
                value: energy,
                min: self.min,
                max: self.max,
                domain: domain.to_string(),
            })
        }
    }
}

impl TryFrom<[f64; 2]> for EnergyRange {
    type Error = MonoError;

    fn try_from([min, max]: [f64; 2]) -> MonoResult<Self> {
        EnergyRange::new(min, max)
    }
}

impl From<EnergyRange> for [f64; 2] {
    fn from(range: EnergyRange) -> [f64; 2] {
        [range.min, range.max]
    }
}

impl fmt::Display for EnergyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}] eV", self.min, self.max)
    }
}

/// Angular offsets and nominal focus constant of one grating on one branch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BranchOffsets {
    /// Mirror pitch offset (degrees)
    pub mirror_offset_deg: f64,
    /// Grating pitch offset (degrees)
    pub grating_offset_deg: f64,
    /// Stored fixed-focus constant
    pub nominal_c: f64,
}

/// Immutable calibration of one grating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GratingProfile {
    /// Which grating this profile describes
    #[serde(rename = "lines_per_mm")]
    pub grating: Grating,
    /// Valid photon-energy range
    pub energy_range: EnergyRange,
    /// Grating translation stage setpoint (mm)
    pub translation_mm: f64,
    /// First VLS coefficient; the quadratic term is `-a1 / (2k)`
    pub vls_a1: f64,
    /// Offsets for branch A
    pub branch_a: BranchOffsets,
    /// Offsets for branch B
    pub branch_b: BranchOffsets,
}

impl GratingProfile {
    /// Offsets for the requested branch.
    pub fn offsets(&self, branch: Branch) -> &BranchOffsets {
        match branch {
            Branch::A => &self.branch_a,
            Branch::B => &self.branch_b,
        }
    }

    /// Quadratic VLS coefficient `b2 = -a1 / (2k)`.
    pub fn b2(&self) -> f64 {
        -self.vls_a1 / (2.0 * f64::from(self.grating.lines_per_mm()))
    }
}
