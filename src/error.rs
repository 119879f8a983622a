//! Custom error types for the crate.
//!
//! This module defines the primary error type, `MonoError`. Using the `thiserror` crate, it
//! provides a centralized way to report everything that can go wrong between loading the
//! calibration data and driving the monochromator axes.
//!
//! ## Error Hierarchy
//!
//! - **`Range`**: A requested photon energy (or gap) lies outside the valid domain of a grating,
//!   an undulator or a calibration table. Always raised before any axis is commanded.
//! - **`Domain`**: The grating equation has no real solution for the supplied or derived
//!   fixed-focus constant. Never clamped, never replaced by a fallback constant.
//! - **`Motion`**: An axis failed to reach its commanded setpoint. The underlying hardware error is
//!   kept as the source. The mover performs no rollback.
//! - **`Calibration`**: Calibration data failed its load-time checks (non-monotonic energies,
//!   too few rows, non-finite values).
//! - **`Read`**: An axis readback or a detector failed to return a value.
//! - **`Plan`**: Scan parameters that cannot produce a finite, non-empty point list.
//! - **`Config`** / **`Configuration`**: Parsing and semantic validation of the beamline
//!   configuration file.
//! - **`Io`** / **`Csv`**: Reading calibration files.
//!
//! By using `#[from]`, `MonoError` can be created from the underlying error types with the `?`
//! operator.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type MonoResult<T> = std::result::Result<T, MonoError>;

#[derive(Error, Debug)]
pub enum MonoError {
    #[error("{quantity} {value} is outside the valid range [{min}, {max}] of {domain}")]
    Range {
        quantity: &'static str,
        value: f64,
        min: f64,
        max: f64,
        domain: String,
    },

    #[error("Grating equation has no real solution: {0}")]
    Domain(String),

    #[error("Axis '{axis}' failed to reach {target}: {source}")]
    Motion {
        axis: String,
        target: f64,
        #[source]
        source: anyhow::Error,
    },

    #[error("Calibration table '{table}' is invalid: {reason}")]
    Calibration { table: String, reason: String },

    #[error("No {mode} calibration table loaded for {device}")]
    MissingTable { device: String, mode: String },

    #[error("Unknown undulator '{0}'")]
    UnknownUndulator(String),

    #[error("No profile configured for the {0} grating")]
    UnknownGrating(String),

    #[error("Axis '{0}' is not registered")]
    UnknownAxis(String),

    #[error("Reading '{device}' failed: {source}")]
    Read {
        device: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid scan parameters: {0}")]
    Plan(String),

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl MonoError {
    /// True for errors raised by input validation (range or grating-equation domain).
    ///
    /// These are guaranteed to have been raised before any axis was commanded.
    pub fn is_validation(&self) -> bool {
        matches!(self, MonoError::Range { .. } | MonoError::Domain(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_error_message_names_domain() {
        let err = MonoError::Range {
            quantity: "photon energy",
            value: 500.0,
            min: 15.0,
            max: 420.0,
            domain: "600 l/mm grating".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "photon energy 500 is outside the valid range [15, 420] of 600 l/mm grating"
        );
        assert!(err.is_validation());
    }

    #[test]
    fn motion_error_keeps_source() {
        let err = MonoError::Motion {
            axis: "pgm_mirror_pitch".to_string(),
            target: 87.5,
            source: anyhow::anyhow!("limit switch"),
        };
        assert!(!err.is_validation());
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("limit switch"));
    }
}
