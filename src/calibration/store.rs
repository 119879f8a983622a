//! The process-wide, read-only calibration store.
//!
//! Holds every grating profile, undulator profile, gap/phase table and M3 pitch curve.
//! Built once at startup (from configuration via [`CalibrationStore::load`], or by hand with
//! [`CalibrationStoreBuilder`]) and then shared behind an `Arc`. All lookups are pure.
//!
//! A device may carry both a theory and a measured table for the same polarization family.
//! Lookups use the measured one when it exists unless the mode is pinned to a source.

use super::device::{UndulatorId, UndulatorProfile};
use super::grating::{Grating, GratingProfile};
use super::table::{CalibrationTable, Curve, TableMode, TableSource};
use crate::config::BeamlineConfig;
use crate::error::{MonoError, MonoResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Fixed monochromator geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// Grating to exit slit distance `rb` (mm)
    #[serde(default = "default_exit_slit_distance")]
    pub exit_slit_distance_mm: f64,
    /// Source distance `ra` used when no undulator is named (mm)
    #[serde(default = "default_source_distance")]
    pub default_source_distance_mm: f64,
}

fn default_exit_slit_distance() -> f64 {
    15000.0
}

fn default_source_distance() -> f64 {
    40000.0
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            exit_slit_distance_mm: default_exit_slit_distance(),
            default_source_distance_mm: default_source_distance(),
        }
    }
}

/// Immutable calibration data for the whole monochromator/undulator system.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    geometry: Geometry,
    gratings: HashMap<Grating, GratingProfile>,
    undulators: HashMap<UndulatorId, UndulatorProfile>,
    tables: HashMap<(UndulatorId, TableMode, TableSource), CalibrationTable>,
    pinned: HashMap<(UndulatorId, TableMode), TableSource>,
    m3_pitch: HashMap<(Grating, UndulatorId), Curve>,
}

impl CalibrationStore {
    /// Start building a store by hand.
    pub fn builder() -> CalibrationStoreBuilder {
        CalibrationStoreBuilder::default()
    }

    /// Load every table named in `config`.
    ///
    /// Table file names are resolved against `base_dir.join(config.calibration.data_dir)`.
    /// Any missing file, malformed row or non-monotonic column fails here rather than at first
    /// use.
    pub fn load(config: &BeamlineConfig, base_dir: &Path) -> MonoResult<Self> {
        let data_dir = base_dir.join(&config.calibration.data_dir);
        let mut builder = Self::builder().geometry(config.geometry);

        for profile in &config.gratings {
            builder = builder.grating(profile.clone());
        }

        for undulator in &config.undulators {
            builder = builder.undulator(undulator.profile());
            let files = undulator
                .tables
                .entries()
                .map(|(mode, file)| (mode, file, TableSource::Theory))
                .chain(
                    undulator
                        .measured_tables
                        .entries()
                        .map(|(mode, file)| (mode, file, TableSource::Measured)),
                );
            for (mode, file, source) in files {
                let table =
                    CalibrationTable::from_path(data_dir.join(file), undulator.id.as_str(), mode)?
                        .with_source(source);
                let (e_min, e_max) = table.energy_domain();
                debug!(
                    device = %undulator.id,
                    %mode,
                    %source,
                    rows = table.rows().count(),
                    e_min,
                    e_max,
                    "Loaded calibration table"
                );
                builder = builder.table(undulator.id.clone(), table);
            }
            for (mode, source) in undulator.table_sources.entries() {
                builder = builder.pin_source(undulator.id.clone(), mode, source);
            }
        }

        for m3 in &config.m3_tables {
            let curve = Curve::new(
                format!("M3 pitch {} {}", m3.grating, m3.undulator),
                m3.energy.clone(),
                m3.pitch_deg.clone(),
            )?;
            builder = builder.m3_curve(m3.grating, m3.undulator.clone(), curve);
        }

        let store = builder.build()?;
        info!(
            gratings = store.gratings.len(),
            undulators = store.undulators.len(),
            tables = store.tables.len(),
            data_dir = %data_dir.display(),
            "Calibration store loaded"
        );
        Ok(store)
    }

    /// Monochromator geometry.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Profile of a grating.
    pub fn grating(&self, grating: Grating) -> MonoResult<&GratingProfile> {
        self.gratings
            .get(&grating)
            .ok_or_else(|| MonoError::UnknownGrating(grating.to_string()))
    }

    /// All configured grating profiles, in ascending line density.
    pub fn gratings(&self) -> Vec<&GratingProfile> {
        let mut profiles: Vec<_> = self.gratings.values().collect();
        profiles.sort_by_key(|p| p.grating);
        profiles
    }

    /// Profile of an undulator.
    pub fn undulator(&self, id: &UndulatorId) -> MonoResult<&UndulatorProfile> {
        self.undulators
            .get(id)
            .ok_or_else(|| MonoError::UnknownUndulator(id.to_string()))
    }

    /// All configured undulator profiles, sorted by id.
    pub fn undulators(&self) -> Vec<&UndulatorProfile> {
        let mut profiles: Vec<_> = self.undulators.values().collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        profiles
    }

    /// Source distance `ra` for the named undulator, or the default without one.
    pub fn source_distance(&self, undulator: Option<&UndulatorId>) -> MonoResult<f64> {
        match undulator {
            Some(id) => Ok(self.undulator(id)?.source_distance_mm),
            None => Ok(self.geometry.default_source_distance_mm),
        }
    }

    /// Table of `device` in `mode`: the pinned source if one is configured, otherwise the
    /// measured table, falling back to theory.
    pub fn table(&self, device: &UndulatorId, mode: impl Into<TableMode>) -> MonoResult<&CalibrationTable> {
        let mode = mode.into();
        self.undulator(device)?;
        if let Some(&source) = self.pinned.get(&(device.clone(), mode)) {
            return self.table_from(device, mode, source);
        }
        [TableSource::Measured, TableSource::Theory]
            .into_iter()
            .find_map(|source| self.tables.get(&(device.clone(), mode, source)))
            .ok_or_else(|| MonoError::MissingTable {
                device: device.to_string(),
                mode: mode.to_string(),
            })
    }

    /// Table of `device` in `mode` from exactly `source`.
    pub fn table_from(
        &self,
        device: &UndulatorId,
        mode: TableMode,
        source: TableSource,
    ) -> MonoResult<&CalibrationTable> {
        self.undulator(device)?;
        self.tables
            .get(&(device.clone(), mode, source))
            .ok_or_else(|| MonoError::MissingTable {
                device: device.to_string(),
                mode: format!("{mode} ({source})"),
            })
    }

    /// Interpolated gap (mm) for `energy` (eV).
    pub fn gap_for_energy(
        &self,
        device: &UndulatorId,
        energy: f64,
        mode: impl Into<TableMode>,
    ) -> MonoResult<f64> {
        self.table(device, mode)?.gap_for_energy(energy)
    }

    /// Interpolated energy (eV) for `gap` (mm).
    pub fn energy_for_gap(
        &self,
        device: &UndulatorId,
        gap: f64,
        mode: impl Into<TableMode>,
    ) -> MonoResult<f64> {
        self.table(device, mode)?.energy_for_gap(gap)
    }

    /// Interpolated phase (mm) for `energy` (eV), as stored in the table.
    pub fn phase_for_energy(
        &self,
        device: &UndulatorId,
        energy: f64,
        mode: impl Into<TableMode>,
    ) -> MonoResult<f64> {
        self.table(device, mode)?.phase_for_energy(energy)
    }

    /// M3 mirror pitch (degrees) for a grating/undulator pair at `energy` (eV).
    pub fn m3_pitch_for_energy(
        &self,
        grating: Grating,
        undulator: &UndulatorId,
        energy: f64,
    ) -> MonoResult<f64> {
        self.m3_pitch
            .get(&(grating, undulator.clone()))
            .ok_or_else(|| MonoError::MissingTable {
                device: undulator.to_string(),
                mode: format!("M3 pitch ({grating})"),
            })?
            .eval("photon energy", energy)
    }
}

/// Builder for [`CalibrationStore`].
#[derive(Debug, Default)]
pub struct CalibrationStoreBuilder {
    geometry: Geometry,
    gratings: Vec<GratingProfile>,
    undulators: Vec<UndulatorProfile>,
    tables: Vec<(UndulatorId, CalibrationTable)>,
    pinned: Vec<(UndulatorId, TableMode, TableSource)>,
    m3_pitch: Vec<(Grating, UndulatorId, Curve)>,
}

impl CalibrationStoreBuilder {
    /// Set the monochromator geometry.
    pub fn geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Add a grating profile.
    pub fn grating(mut self, profile: GratingProfile) -> Self {
        self.gratings.push(profile);
        self
    }

    /// Add an undulator profile.
    pub fn undulator(mut self, profile: UndulatorProfile) -> Self {
        self.undulators.push(profile);
        self
    }

    /// Add a gap/phase table for `device`; the table's own mode and source are the key.
    pub fn table(mut self, device: UndulatorId, table: CalibrationTable) -> Self {
        self.tables.push((device, table));
        self
    }

    /// Always use `source` for `device` in `mode`, even when the other source is loaded.
    pub fn pin_source(mut self, device: UndulatorId, mode: TableMode, source: TableSource) -> Self {
        self.pinned.push((device, mode, source));
        self
    }

    /// Add an M3 pitch curve.
    pub fn m3_curve(mut self, grating: Grating, undulator: UndulatorId, curve: Curve) -> Self {
        self.m3_pitch.push((grating, undulator, curve));
        self
    }

    /// Check cross references and freeze the store.
    pub fn build(self) -> MonoResult<CalibrationStore> {
        let geometry = self.geometry;
        if !(geometry.exit_slit_distance_mm > 0.0 && geometry.default_source_distance_mm > 0.0) {
            return Err(MonoError::Configuration(
                "Geometry distances must be positive".to_string(),
            ));
        }

        let mut gratings = HashMap::new();
        for profile in self.gratings {
            let grating = profile.grating;
            if gratings.insert(grating, profile).is_some() {
                return Err(MonoError::Configuration(format!(
                    "Duplicate profile for the {grating} grating"
                )));
            }
        }

        let mut undulators = HashMap::new();
        for profile in self.undulators {
            if !(profile.period_mm > 0.0 && profile.source_distance_mm > 0.0) {
                return Err(MonoError::Configuration(format!(
                    "{}: period and source distance must be positive",
                    profile.id
                )));
            }
            let id = profile.id.clone();
            if undulators.insert(id.clone(), profile).is_some() {
                return Err(MonoError::Configuration(format!(
                    "Duplicate undulator '{id}'"
                )));
            }
        }

        let mut tables = HashMap::new();
        for (device, table) in self.tables {
            if !undulators.contains_key(&device) {
                return Err(MonoError::UnknownUndulator(device.to_string()));
            }
            if table.mode() == TableMode::Circular && !table.has_phase() {
                return Err(MonoError::Calibration {
                    table: table.name().to_string(),
                    reason: "circular tables need a Phase column".to_string(),
                });
            }
            let key = (device, table.mode(), table.source());
            if tables.contains_key(&key) {
                return Err(MonoError::Configuration(format!(
                    "Duplicate {} {} table for {}",
                    key.2, key.1, key.0
                )));
            }
            tables.insert(key, table);
        }

        let mut pinned = HashMap::new();
        for (device, mode, source) in self.pinned {
            if !tables.contains_key(&(device.clone(), mode, source)) {
                return Err(MonoError::MissingTable {
                    device: device.to_string(),
                    mode: format!("{mode} ({source})"),
                });
            }
            pinned.insert((device, mode), source);
        }

        let mut m3_pitch = HashMap::new();
        for (grating, undulator, curve) in self.m3_pitch {
            if !undulators.contains_key(&undulator) {
                return Err(MonoError::UnknownUndulator(undulator.to_string()));
            }
            m3_pitch.insert((grating, undulator), curve);
        }

        Ok(CalibrationStore {
            geometry,
            gratings,
            undulators,
            tables,
            pinned,
            m3_pitch,
        })
    }
}
