//! Undulator identities, profiles and polarization modes.

use super::grating::EnergyRange;
use super::table::TableMode;
use crate::error::MonoError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Insertion device identifier, normalised to upper case (`EPU57`, `EPU105`).
///
/// Bare numbers are accepted as shorthand: `"57"` parses to `EPU57`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UndulatorId(String);

impl UndulatorId {
    /// Identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for UndulatorId {
    type Err = MonoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(MonoError::UnknownUndulator(s.to_string()));
        }
        if s.chars().all(|c| c.is_ascii_digit()) {
            Ok(Self(format!("EPU{s}")))
        } else {
            Ok(Self(s.to_ascii_uppercase()))
        }
    }
}

impl TryFrom<String> for UndulatorId {
    type Error = MonoError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<UndulatorId> for String {
    fn from(id: UndulatorId) -> String {
        id.0
    }
}

impl fmt::Display for UndulatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Photon polarization selected through the undulator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Polarization {
    /// Linear horizontal, phase 0
    #[default]
    LH,
    /// Linear vertical, phase = half period
    LV,
    /// Circular left, tabulated phase
    CL,
    /// Circular right, negated tabulated phase
    CR,
}

impl Polarization {
    /// Table family holding the gap curve for this polarization.
    pub fn table_mode(self) -> TableMode {
        match self {
            Polarization::LH => TableMode::Lh,
            Polarization::LV => TableMode::Lv,
            Polarization::CL | Polarization::CR => TableMode::Circular,
        }
    }

    /// Whether the gap has to be opened before the phase is changed.
    pub fn is_circular(self) -> bool {
        matches!(self, Polarization::CL | Polarization::CR)
    }
}

impl From<Polarization> for TableMode {
    fn from(pol: Polarization) -> TableMode {
        pol.table_mode()
    }
}

impl FromStr for Polarization {
    type Err = MonoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LH" => Ok(Polarization::LH),
            "LV" => Ok(Polarization::LV),
            "CL" => Ok(Polarization::CL),
            "CR" => Ok(Polarization::CR),
            other => Err(MonoError::Configuration(format!(
                "Unknown polarization '{other}', expected one of LH, LV, CL, CR"
            ))),
        }
    }
}

impl fmt::Display for Polarization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Polarization::LH => "LH",
            Polarization::LV => "LV",
            Polarization::CL => "CL",
            Polarization::CR => "CR",
        };
        f.write_str(s)
    }
}

/// Static description of one elliptically polarizing undulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndulatorProfile {
    /// Device identifier
    pub id: UndulatorId,
    /// Photon energies the device may be asked for
    pub energy_range: EnergyRange,
    /// Magnetic period (mm)
    pub period_mm: f64,
    /// Distance from the source point to the monochromator (mm)
    pub source_distance_mm: f64,
    /// Gap the device is parked at while the phase changes in circular mode (mm)
    pub open_gap_mm: f64,
}

impl UndulatorProfile {
    /// Phase that produces linear vertical light.
    pub fn linear_vertical_phase(&self) -> f64 {
        self.period_mm / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undulator_id_shorthand() {
        assert_eq!("57".parse::<UndulatorId>().unwrap().as_str(), "EPU57");
        assert_eq!("epu105".parse::<UndulatorId>().unwrap().as_str(), "EPU105");
        assert!("".parse::<UndulatorId>().is_err());
        assert!("EPU 57".parse::<UndulatorId>().is_err());
    }

    #[test]
    fn test_polarization_modes() {
        assert_eq!("cr".parse::<Polarization>().unwrap(), Polarization::CR);
        assert_eq!(Polarization::CL.table_mode(), TableMode::Circular);
        assert_eq!(Polarization::CR.table_mode(), TableMode::Circular);
        assert_eq!(TableMode::from(Polarization::LV), TableMode::Lv);
        assert!(!Polarization::LH.is_circular());
        assert!("LX".parse::<Polarization>().is_err());
    }

    #[test]
    fn test_linear_vertical_phase() {
        let profile = UndulatorProfile {
            id: "57".parse().unwrap(),
            energy_range: EnergyRange::new(140.0, 1390.0).unwrap(),
            period_mm: 57.0,
            source_distance_mm: 42302.0,
            open_gap_mm: 100.0,
        };
        assert_eq!(profile.linear_vertical_phase(), 28.5);
    }
}
