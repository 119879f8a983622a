//! Axis Registry
//!
//! Name-keyed handles to every axis and detector the monochromator core may command. The
//! mover and the run engine receive a registry instead of reaching into a global namespace;
//! axis names come from the `[axes]` and `[[undulators]]` sections of the configuration.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! let log = MotionLog::new();
//! let registry = create_mock_registry(&config, &log)?;
//! let pitch = registry.movable(&config.axes.mirror_pitch)?;
//! println!("mirror pitch at {}", pitch.position().await?);
//! ```

use crate::config::BeamlineConfig;
use crate::error::{MonoError, MonoResult};
use crate::experiment::AxisTarget;
use crate::hardware::capabilities::{Movable, Readable};
use crate::hardware::mock::{MockAxis, MockDetector, MotionLog};
use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Axis identifier
pub type AxisId = String;

/// Central registry of axes and detectors
#[derive(Default)]
pub struct AxisRegistry {
    axes: HashMap<AxisId, Arc<dyn Movable>>,
    detectors: HashMap<AxisId, Arc<dyn Readable>>,
}

impl AxisRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an axis
    ///
    /// # Errors
    /// Returns error if the name is already taken by an axis or a detector
    pub fn register_axis(&mut self, id: impl Into<AxisId>, axis: Arc<dyn Movable>) -> MonoResult<()> {
        let id = id.into();
        self.ensure_free(&id)?;
        self.axes.insert(id, axis);
        Ok(())
    }

    /// Register a detector
    ///
    /// # Errors
    /// Returns error if the name is already taken by an axis or a detector
    pub fn register_detector(
        &mut self,
        id: impl Into<AxisId>,
        detector: Arc<dyn Readable>,
    ) -> MonoResult<()> {
        let id = id.into();
        self.ensure_free(&id)?;
        self.detectors.insert(id, detector);
        Ok(())
    }

    fn ensure_free(&self, id: &str) -> MonoResult<()> {
        if self.contains(id) {
            return Err(MonoError::Configuration(format!(
                "Device '{id}' is already registered"
            )));
        }
        Ok(())
    }

    /// Remove an axis or detector; true if something was removed
    pub fn unregister(&mut self, id: &str) -> bool {
        self.axes.remove(id).is_some() || self.detectors.remove(id).is_some()
    }

    /// Check if a name is registered
    pub fn contains(&self, id: &str) -> bool {
        self.axes.contains_key(id) || self.detectors.contains_key(id)
    }

    /// Number of registered axes and detectors
    pub fn len(&self) -> usize {
        self.axes.len() + self.detectors.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.axes.is_empty() && self.detectors.is_empty()
    }

    /// Sorted axis names
    pub fn axis_names(&self) -> Vec<AxisId> {
        let mut names: Vec<_> = self.axes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Sorted detector names
    pub fn detector_names(&self) -> Vec<AxisId> {
        let mut names: Vec<_> = self.detectors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get an axis (if registered)
    pub fn get_movable(&self, id: &str) -> Option<Arc<dyn Movable>> {
        self.axes.get(id).cloned()
    }

    /// Get a detector (if registered)
    pub fn get_readable(&self, id: &str) -> Option<Arc<dyn Readable>> {
        self.detectors.get(id).cloned()
    }

    /// Get an axis or fail with `UnknownAxis`
    pub fn movable(&self, id: &str) -> MonoResult<Arc<dyn Movable>> {
        self.get_movable(id)
            .ok_or_else(|| MonoError::UnknownAxis(id.to_string()))
    }

    /// Get a detector or fail with `UnknownAxis`
    pub fn readable(&self, id: &str) -> MonoResult<Arc<dyn Readable>> {
        self.get_readable(id)
            .ok_or_else(|| MonoError::UnknownAxis(id.to_string()))
    }

    /// Fail with `UnknownAxis` for the first target whose axis is not registered
    pub fn check_targets(&self, targets: &[AxisTarget]) -> MonoResult<()> {
        match targets.iter().find(|t| !self.axes.contains_key(&t.axis)) {
            Some(missing) => Err(MonoError::UnknownAxis(missing.axis.clone())),
            None => Ok(()),
        }
    }

    /// Current position of an axis
    pub async fn position(&self, id: &str) -> MonoResult<f64> {
        self.movable(id)?
            .position()
            .await
            .map_err(|source| MonoError::Read {
                device: id.to_string(),
                source,
            })
    }

    /// Command every target concurrently and wait until all have settled
    ///
    /// # Errors
    /// The first axis to fail is reported as `MonoError::Motion`; axes already in flight are
    /// not stopped or restored.
    pub async fn move_together(&self, targets: &[AxisTarget], timeout: Duration) -> MonoResult<()> {
        self.check_targets(targets)?;
        let moves = targets.iter().map(|target| async move {
            let axis = self.movable(&target.axis)?;
            debug!(axis = %target.axis, target = target.position, "Commanding axis");
            axis.move_and_confirm(target.position, timeout)
                .await
                .map_err(|source| MonoError::Motion {
                    axis: target.axis.clone(),
                    target: target.position,
                    source,
                })
        });
        try_join_all(moves).await?;
        Ok(())
    }

    /// Read one detector
    pub async fn read(&self, id: &str) -> MonoResult<f64> {
        self.readable(id)?
            .read()
            .await
            .map_err(|source| MonoError::Read {
                device: id.to_string(),
                source,
            })
    }
}

/// Name of the detector registered by [`create_mock_registry`]
pub const MOCK_DETECTOR: &str = "mock_detector";

/// Create a registry of mock axes for every axis named in `config`
///
/// Pitch axes start near grazing incidence (mirror 88°, grating 86°), undulator gaps start
/// open, everything else at zero. One [`MockDetector`] is added under [`MOCK_DETECTOR`].
pub fn create_mock_registry(config: &BeamlineConfig, log: &MotionLog) -> MonoResult<AxisRegistry> {
    let mut registry = AxisRegistry::new();
    let axes = &config.axes;

    let initial = |name: &str| -> f64 {
        if name == axes.mirror_pitch {
            88.0
        } else if name == axes.grating_pitch {
            86.0
        } else {
            0.0
        }
    };
    for name in axes.all() {
        registry.register_axis(name, Arc::new(MockAxis::new(name, initial(name), log.clone())))?;
    }

    for undulator in &config.undulators {
        registry.register_axis(
            undulator.axes.gap.as_str(),
            Arc::new(MockAxis::new(
                undulator.axes.gap.as_str(),
                undulator.open_gap_mm,
                log.clone(),
            )),
        )?;
        registry.register_axis(
            undulator.axes.phase.as_str(),
            Arc::new(MockAxis::new(undulator.axes.phase.as_str(), 0.0, log.clone())),
        )?;
    }

    registry.register_detector(MOCK_DETECTOR, Arc::new(MockDetector::new(1.0)))?;
    Ok(registry)
}

// =============================================================================
// Tests
// =============================================================================
