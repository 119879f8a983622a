//! Beamline configuration using Figment
//!
//! Configuration is loaded from:
//! 1. `config/beamline.toml` (base configuration)
//! 2. Environment variables prefixed with `ESM_`, using `__` to separate nested keys
//!
//! # Example
//! ```no_run
//! use esm_mono::config::BeamlineConfig;
//!
//! let config = BeamlineConfig::load()?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), esm_mono::error::MonoError>(())
//! ```
//!
//! Override a single key from the shell:
//! `ESM_MOTION__PITCH_STEP_DEG=0.5 esm-mono simulate 500 --grating 800`

use crate::calibration::{Geometry, Grating, GratingProfile, TableMode, TableSource, UndulatorId, UndulatorProfile};
use crate::calibration::EnergyRange;
use crate::error::{MonoError, MonoResult};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/beamline.toml";

/// Top-level beamline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeamlineConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Motion sequencing settings
    #[serde(default)]
    pub motion: MotionConfig,
    /// Monochromator geometry
    #[serde(default)]
    pub geometry: Geometry,
    /// Calibration file locations
    #[serde(default)]
    pub calibration: CalibrationFiles,
    /// Grating profiles
    pub gratings: Vec<GratingProfile>,
    /// Undulator definitions
    #[serde(default)]
    pub undulators: Vec<UndulatorConfig>,
    /// M3 pitch curves
    #[serde(default)]
    pub m3_tables: Vec<M3TableConfig>,
    /// Monochromator axis names
    #[serde(default)]
    pub axes: PgmAxisNames,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Motion sequencing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionConfig {
    /// Largest mirror pitch excursion per intermediate step (degrees)
    #[serde(default = "default_pitch_step")]
    pub pitch_step_deg: f64,
    /// Per-move settle timeout in seconds
    #[serde(default = "default_settle_timeout")]
    pub settle_timeout_secs: f64,
    /// Upper bound on intermediate pitch points in one ramp
    #[serde(default = "default_max_pitch_steps")]
    pub max_pitch_steps: usize,
}

/// Calibration data directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationFiles {
    /// Directory holding the gap/phase CSV tables
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// One undulator as described in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndulatorConfig {
    /// Device identifier
    pub id: UndulatorId,
    /// Valid photon-energy range
    pub energy_range: EnergyRange,
    /// Magnetic period (mm)
    pub period_mm: f64,
    /// Source point to monochromator distance (mm)
    pub source_distance_mm: f64,
    /// Gap used while changing phase in circular mode (mm)
    #[serde(default = "default_open_gap")]
    pub open_gap_mm: f64,
    /// Theory table file names, relative to the calibration data directory
    #[serde(default)]
    pub tables: UndulatorTableFiles,
    /// Measured table file names; preferred over theory for the same mode
    #[serde(default)]
    pub measured_tables: UndulatorTableFiles,
    /// Modes pinned to one table source regardless of what else is loaded
    #[serde(default)]
    pub table_sources: TableSourcePins,
    /// Gap and phase axis names
    pub axes: UndulatorAxisNames,
}

impl UndulatorConfig {
    /// Static device profile.
    pub fn profile(&self) -> UndulatorProfile {
        UndulatorProfile {
            id: self.id.clone(),
            energy_range: self.energy_range,
            period_mm: self.period_mm,
            source_distance_mm: self.source_distance_mm,
            open_gap_mm: self.open_gap_mm,
        }
    }
}

/// Per-mode table file names. Modes without a file simply have no table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UndulatorTableFiles {
    /// Linear horizontal table
    pub lh: Option<PathBuf>,
    /// Linear vertical table
    pub lv: Option<PathBuf>,
    /// Circular table (shared by CL and CR)
    pub circular: Option<PathBuf>,
}

impl UndulatorTableFiles {
    /// Configured `(mode, file)` pairs.
    pub fn entries(&self) -> impl Iterator<Item = (TableMode, &PathBuf)> {
        [
            (TableMode::Lh, self.lh.as_ref()),
            (TableMode::Lv, self.lv.as_ref()),
            (TableMode::Circular, self.circular.as_ref()),
        ]
        .into_iter()
        .filter_map(|(mode, file)| file.map(|f| (mode, f)))
    }
}

/// Per-mode table source overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSourcePins {
    /// Linear horizontal
    pub lh: Option<TableSource>,
    /// Linear vertical
    pub lv: Option<TableSource>,
    /// Circular
    pub circular: Option<TableSource>,
}

impl TableSourcePins {
    /// Pinned `(mode, source)` pairs.
    pub fn entries(&self) -> impl Iterator<Item = (TableMode, TableSource)> {
        [
            (TableMode::Lh, self.lh),
            (TableMode::Lv, self.lv),
            (TableMode::Circular, self.circular),
        ]
        .into_iter()
        .filter_map(|(mode, source)| source.map(|s| (mode, s)))
    }
}

/// Axis names of one undulator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndulatorAxisNames {
    /// Gap axis
    pub gap: String,
    /// Phase axis
    pub phase: String,
}

/// M3 pitch curve definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct M3TableConfig {
    /// Grating the curve applies to
    #[serde(rename = "lines_per_mm")]
    pub grating: Grating,
    /// Undulator the curve was measured with
    pub undulator: UndulatorId,
    /// Photon energies (eV), strictly increasing
    pub energy: Vec<f64>,
    /// M3 pitch (degrees) at each energy
    pub pitch_deg: Vec<f64>,
}

/// Names of the monochromator axes in the axis registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgmAxisNames {
    /// Mirror pitch
    #[serde(default = "default_mirror_pitch")]
    pub mirror_pitch: String,
    /// Grating pitch
    #[serde(default = "default_grating_pitch")]
    pub grating_pitch: String,
    /// Mirror pitch offset
    #[serde(default = "default_mirror_pitch_offset")]
    pub mirror_pitch_offset: String,
    /// Grating pitch offset
    #[serde(default = "default_grating_pitch_offset")]
    pub grating_pitch_offset: String,
    /// Grating line density readback
    #[serde(default = "default_grating_lines")]
    pub grating_lines: String,
    /// Grating translation stage
    #[serde(default = "default_grating_translation")]
    pub grating_translation: String,
    /// Fixed-focus constant readback
    #[serde(default = "default_focus_constant")]
    pub focus_constant: String,
    /// Photon energy readback
    #[serde(default = "default_energy")]
    pub energy: String,
}

impl PgmAxisNames {
    /// Every axis name, in declaration order.
    pub fn all(&self) -> [&str; 8] {
        [
            &self.mirror_pitch,
            &self.grating_pitch,
            &self.mirror_pitch_offset,
            &self.grating_pitch_offset,
            &self.grating_lines,
            &self.grating_translation,
            &self.focus_constant,
            &self.energy,
        ]
    }
}

impl Default for PgmAxisNames {
    fn default() -> Self {
        Self {
            mirror_pitch: default_mirror_pitch(),
            grating_pitch: default_grating_pitch(),
            mirror_pitch_offset: default_mirror_pitch_offset(),
            grating_pitch_offset: default_grating_pitch_offset(),
            grating_lines: default_grating_lines(),
            grating_translation: default_grating_translation(),
            focus_constant: default_focus_constant(),
            energy: default_energy(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_pitch_step() -> f64 {
    1.0
}

fn default_settle_timeout() -> f64 {
    30.0
}

fn default_max_pitch_steps() -> usize {
    500
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("calibration")
}

fn default_open_gap() -> f64 {
    100.0
}

fn default_mirror_pitch() -> String {
    "pgm_mirror_pitch".to_string()
}

fn default_grating_pitch() -> String {
    "pgm_grating_pitch".to_string()
}

fn default_mirror_pitch_offset() -> String {
    "pgm_mirror_pitch_off".to_string()
}

fn default_grating_pitch_offset() -> String {
    "pgm_grating_pitch_off".to_string()
}

fn default_grating_lines() -> String {
    "pgm_grating_lines".to_string()
}

fn default_grating_translation() -> String {
    "pgm_grating_trans".to_string()
}

fn default_focus_constant() -> String {
    "pgm_focus_const".to_string()
}

fn default_energy() -> String {
    "pgm_energy".to_string()
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            pitch_step_deg: default_pitch_step(),
            settle_timeout_secs: default_settle_timeout(),
            max_pitch_steps: default_max_pitch_steps(),
        }
    }
}

impl Default for CalibrationFiles {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl MotionConfig {
    /// Settle timeout as a `Duration`.
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.settle_timeout_secs)
    }
}

impl BeamlineConfig {
    /// Load configuration from `config/beamline.toml` and environment variables
    ///
    /// Environment variables override the file with prefix `ESM_`.
    /// Example: `ESM_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> MonoResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> MonoResult<Self> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("ESM_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if !(self.motion.pitch_step_deg.is_finite() && self.motion.pitch_step_deg > 0.0) {
            return Err(format!(
                "Invalid pitch_step_deg {}. Must be positive",
                self.motion.pitch_step_deg
            ));
        }

        if !(self.motion.settle_timeout_secs.is_finite() && self.motion.settle_timeout_secs > 0.0) {
            return Err(format!(
                "Invalid settle_timeout_secs {}. Must be positive",
                self.motion.settle_timeout_secs
            ));
        }

        if self.motion.max_pitch_steps == 0 {
            return Err("Invalid max_pitch_steps 0. Must be at least 1".to_string());
        }

        if self.gratings.is_empty() {
            return Err("At least one grating must be configured".to_string());
        }

        let mut gratings = HashSet::new();
        for profile in &self.gratings {
            if !gratings.insert(profile.grating) {
                return Err(format!("Duplicate grating: {}", profile.grating));
            }
        }

        let mut ids = HashSet::new();
        for undulator in &self.undulators {
            if !ids.insert(&undulator.id) {
                return Err(format!("Duplicate undulator ID: {}", undulator.id));
            }
        }

        for m3 in &self.m3_tables {
            if !ids.contains(&m3.undulator) {
                return Err(format!(
                    "M3 table for {} references unknown undulator {}",
                    m3.grating, m3.undulator
                ));
            }
        }

        // Every axis must map to exactly one registry entry
        let mut axes = HashSet::new();
        let undulator_axes = self
            .undulators
            .iter()
            .flat_map(|u| [u.axes.gap.as_str(), u.axes.phase.as_str()]);
        for name in self.axes.all().into_iter().chain(undulator_axes) {
            if !axes.insert(name) {
                return Err(format!("Axis name '{name}' is used more than once"));
            }
        }

        Ok(())
    }

    /// Load and validate in one step, mapping validation failures into `MonoError`.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> MonoResult<Self> {
        let config = Self::load_from(path)?;
        config.validate().map_err(MonoError::Configuration)?;
        Ok(config)
    }

    /// Configuration of one undulator.
    pub fn undulator(&self, id: &UndulatorId) -> MonoResult<&UndulatorConfig> {
        self.undulators
            .iter()
            .find(|u| &u.id == id)
            .ok_or_else(|| MonoError::UnknownUndulator(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const MINIMAL: &str = r#"
        [application]
        name = "Test"

        [[gratings]]
        lines_per_mm = 800
        energy_range = [15.0, 1500.0]
        translation_mm = -21.7
        vls_a1 = 0.123453
        branch_a = { mirror_offset_deg = 0.0, grating_offset_deg = 0.0, nominal_c = 3.1 }
        branch_b = { mirror_offset_deg = 0.0, grating_offset_deg = 0.0, nominal_c = 3.1 }

        [[undulators]]
        id = "57"
        energy_range = [140.0, 1390.0]
        period_mm = 57.0
        source_distance_mm = 42302.0
        axes = { gap = "epu57_gap", phase = "epu57_phase" }
    "#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    #[serial]
    fn test_load_shipped_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let config = BeamlineConfig::load_from(path).unwrap();
        assert_eq!(config.application.name, "ESM PGM");
        assert_eq!(config.gratings.len(), 4);
        assert_eq!(config.undulators.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_defaults_applied() {
        let file = write_config(MINIMAL);
        let config = BeamlineConfig::load_from(file.path()).unwrap();
        assert_eq!(config.application.log_level, "info");
        assert_eq!(config.motion.pitch_step_deg, 1.0);
        assert_eq!(config.motion.settle_timeout(), Duration::from_secs(30));
        assert_eq!(config.geometry.exit_slit_distance_mm, 15000.0);
        assert_eq!(config.axes, PgmAxisNames::default());
        assert_eq!(config.undulators[0].id.as_str(), "EPU57");
        assert_eq!(config.undulators[0].open_gap_mm, 100.0);
        assert_eq!(config.undulators[0].tables.entries().count(), 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_measured_tables_preferred_at_load() {
        use crate::calibration::{CalibrationStore, Polarization};

        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, contents: &str| {
            std::fs::write(dir.path().join(name), contents).unwrap();
        };
        write("lh_theory.csv", "Energy,Gap\n140,16\n700,36\n1390,60\n");
        write("lh_measured.csv", "Energy,Gap\n140,16\n700,35.2\n1390,60\n");
        write("lv_theory.csv", "Energy,Gap\n140,16\n700,30\n1390,60\n");
        write("lv_measured.csv", "Energy,Gap\n140,16\n700,29\n1390,60\n");
        write(
            "beamline.toml",
            &(MINIMAL.replace(
                "axes = { gap = \"epu57_gap\", phase = \"epu57_phase\" }",
                r#"axes = { gap = "epu57_gap", phase = "epu57_phase" }
                tables = { lh = "lh_theory.csv", lv = "lv_theory.csv" }
                measured_tables = { lh = "lh_measured.csv", lv = "lv_measured.csv" }
                table_sources = { lv = "theory" }
                "#,
            ) + "\n[calibration]\ndata_dir = \".\"\n"),
        );

        let config = BeamlineConfig::load_from(dir.path().join("beamline.toml")).unwrap();
        assert!(config.validate().is_ok());
        let undulator = &config.undulators[0];
        assert_eq!(undulator.measured_tables.entries().count(), 2);
        assert_eq!(
            undulator.table_sources.entries().collect::<Vec<_>>(),
            vec![(TableMode::Lv, TableSource::Theory)]
        );

        let store = CalibrationStore::load(&config, dir.path()).unwrap();
        let id = undulator.id.clone();
        assert_eq!(store.gap_for_energy(&id, 700.0, Polarization::LH).unwrap(), 35.2);
        assert_eq!(store.gap_for_energy(&id, 700.0, Polarization::LV).unwrap(), 30.0);
    }

    #[test]
    #[serial]
    fn test_env_override() {
        let file = write_config(MINIMAL);
        std::env::set_var("ESM_MOTION__PITCH_STEP_DEG", "0.5");
        std::env::set_var("ESM_APPLICATION__LOG_LEVEL", "debug");
        let result = BeamlineConfig::load_from(file.path());
        std::env::remove_var("ESM_MOTION__PITCH_STEP_DEG");
        std::env::remove_var("ESM_APPLICATION__LOG_LEVEL");

        let config = result.unwrap();
        assert_eq!(config.motion.pitch_step_deg, 0.5);
        assert_eq!(config.application.log_level, "debug");
    }

    #[test]
    #[serial]
    fn test_invalid_log_level() {
        let file = write_config(MINIMAL);
        let mut config = BeamlineConfig::load_from(file.path()).unwrap();
        config.application.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_duplicate_axis_names() {
        let file = write_config(MINIMAL);
        let mut config = BeamlineConfig::load_from(file.path()).unwrap();
        config.axes.energy = config.axes.mirror_pitch.clone();
        let err = config.validate().unwrap_err();
        assert!(err.contains("used more than once"));
    }

    #[test]
    #[serial]
    fn test_non_positive_pitch_step() {
        let file = write_config(MINIMAL);
        let mut config = BeamlineConfig::load_from(file.path()).unwrap();
        config.motion.pitch_step_deg = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_max_pitch_steps() {
        let file = write_config(MINIMAL);
        let mut config = BeamlineConfig::load_from(file.path()).unwrap();
        assert_eq!(config.motion.max_pitch_steps, 500);
        config.motion.max_pitch_steps = 0;
        let err = config.validate().unwrap_err();
        assert!(err.contains("max_pitch_steps"));
    }

    #[test]
    #[serial]
    fn test_unknown_grating_rejected_at_load() {
        let file = write_config(&MINIMAL.replace("lines_per_mm = 800", "lines_per_mm = 500"));
        assert!(matches!(
            BeamlineConfig::load_from(file.path()),
            Err(MonoError::Config(_))
        ));
    }
}
