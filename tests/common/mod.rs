//! Shared fixtures: the shipped beamline configuration and calibration tables.

#![allow(dead_code)]

use esm_mono::calibration::{CalibrationStore, UndulatorId};
use esm_mono::config::BeamlineConfig;
use esm_mono::hardware::{create_mock_registry, AxisRegistry, MotionLog};
use esm_mono::motion::CoordinatedMover;
use std::path::Path;
use std::sync::Arc;

pub fn crate_root() -> &'static Path {
    Path::new(env!("CARGO_MANIFEST_DIR"))
}

pub fn config() -> BeamlineConfig {
    BeamlineConfig::load_validated(crate_root().join("config/beamline.toml"))
        .expect("shipped configuration loads")
}

pub fn store(config: &BeamlineConfig) -> Arc<CalibrationStore> {
    Arc::new(CalibrationStore::load(config, crate_root()).expect("shipped calibration loads"))
}

pub fn mover() -> (BeamlineConfig, CoordinatedMover) {
    let config = config();
    let store = store(&config);
    let mover = CoordinatedMover::from_config(&config, store).unwrap();
    (config, mover)
}

pub fn mock_beamline() -> (CoordinatedMover, Arc<AxisRegistry>, MotionLog) {
    let (config, mover) = mover();
    let log = MotionLog::new();
    let registry = Arc::new(create_mock_registry(&config, &log).unwrap());
    (mover, registry, log)
}

pub fn epu(name: &str) -> UndulatorId {
    name.parse().unwrap()
}
