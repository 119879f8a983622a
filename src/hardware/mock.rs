//! Mock Hardware Implementations
//!
//! Simulated axes and detectors for tests, benchmarks and the `simulate` command.
//! All mock devices use async-safe operations (tokio::time::sleep, not std::thread::sleep).
//!
//! # Available Mocks
//!
//! - `MockAxis` - Positionable axis that records every command into a shared [`MotionLog`]
//! - `MockDetector` - Scalar detector returning a fixed value and counting reads

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};
use tracing::trace;

use crate::hardware::capabilities::{Movable, Readable};

/// One `move_abs` command seen by a mock axis.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionRecord {
    /// Axis name
    pub axis: String,
    /// Commanded target
    pub target: f64,
}

/// Ordered record of every command issued to a set of mock axes.
///
/// Cloning shares the underlying log.
#[derive(Debug, Clone, Default)]
pub struct MotionLog {
    records: Arc<Mutex<Vec<MotionRecord>>>,
}

impl MotionLog {
    /// Empty log
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<MotionRecord>> {
        // A panicking test thread must not hide the commands issued before it
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, axis: &str, target: f64) {
        self.lock().push(MotionRecord {
            axis: axis.to_string(),
            target,
        });
    }

    /// Snapshot of all records in issue order
    pub fn records(&self) -> Vec<MotionRecord> {
        self.lock().clone()
    }

    /// Targets commanded to one axis, in order
    pub fn targets_for(&self, axis: &str) -> Vec<f64> {
        self.lock()
            .iter()
            .filter(|r| r.axis == axis)
            .map(|r| r.target)
            .collect()
    }

    /// Number of recorded commands
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if no command was ever issued
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forget all records
    pub fn clear(&self) {
        self.lock().clear();
    }
}

// =============================================================================
// MockAxis - Simulated positionable axis
// =============================================================================

/// Mock positionable axis
///
/// Simulates an axis with:
/// - Instant motion (optionally a fixed settle delay)
/// - Optional soft limits; a target outside them fails like a real controller fault
/// - Failure injection via [`MockAxis::set_failing`]
///
/// # Example
///
/// ```rust,ignore
/// let log = MotionLog::new();
/// let axis = MockAxis::new("pgm_mirror_pitch", 88.0, log.clone());
/// axis.move_abs(87.5).await?;
/// assert_eq!(log.targets_for("pgm_mirror_pitch"), vec![87.5]);
/// ```
pub struct MockAxis {
    name: String,
    position: RwLock<f64>,
    log: MotionLog,
    limits: Option<(f64, f64)>,
    settle_delay: Duration,
    failing: AtomicBool,
}

impl MockAxis {
    /// Create a mock axis at `initial_position`, recording into `log`
    pub fn new(name: impl Into<String>, initial_position: f64, log: MotionLog) -> Self {
        Self {
            name: name.into(),
            position: RwLock::new(initial_position),
            log,
            limits: None,
            settle_delay: Duration::ZERO,
            failing: AtomicBool::new(false),
        }
    }

    /// Reject targets outside `[min, max]`
    pub fn with_limits(mut self, min: f64, max: f64) -> Self {
        self.limits = Some((min, max));
        self
    }

    /// Sleep this long in `wait_settled`
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Make every subsequent move fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Axis name
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Movable for MockAxis {
    async fn move_abs(&self, target: f64) -> Result<()> {
        self.log.push(&self.name, target);

        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("{}: controller fault", self.name));
        }
        if let Some((min, max)) = self.limits {
            if !(min..=max).contains(&target) {
                return Err(anyhow!(
                    "{}: target {target} outside limits [{min}, {max}]",
                    self.name
                ));
            }
        }

        let mut position = self.position.write().await;
        trace!(axis = %self.name, from = *position, to = target, "MockAxis move");
        *position = target;
        Ok(())
    }

    async fn position(&self) -> Result<f64> {
        Ok(*self.position.read().await)
    }

    async fn wait_settled(&self) -> Result<()> {
        if !self.settle_delay.is_zero() {
            sleep(self.settle_delay).await;
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// MockDetector - Simulated scalar detector
// =============================================================================

/// Mock detector returning a fixed value
pub struct MockDetector {
    value: f64,
    reads: AtomicU64,
}

impl MockDetector {
    /// Create a detector that always reads `value`
    pub fn new(value: f64) -> Self {
        Self {
            value,
            reads: AtomicU64::new(0),
        }
    }

    /// Number of reads performed so far
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Readable for MockDetector {
    async fn read(&self) -> Result<f64> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_axis_records_moves() {
        let log = MotionLog::new();
        let axis = MockAxis::new("gap", 20.0, log.clone());
        axis.move_abs(30.0).await.unwrap();
        axis.move_abs(25.0).await.unwrap();

        assert_eq!(axis.position().await.unwrap(), 25.0);
        assert_eq!(log.targets_for("gap"), vec![30.0, 25.0]);
        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn test_mock_axis_limits() {
        let log = MotionLog::new();
        let axis = MockAxis::new("gap", 20.0, log.clone()).with_limits(16.0, 100.0);
        assert!(axis.move_abs(120.0).await.is_err());
        assert_eq!(axis.position().await.unwrap(), 20.0);
        // Failed commands are still recorded
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_axis_failure_injection() {
        let axis = MockAxis::new("phase", 0.0, MotionLog::new());
        axis.set_failing(true);
        assert!(axis.move_abs(1.0).await.is_err());
        axis.set_failing(false);
        assert!(axis.move_abs(1.0).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_axis_settle_delay() {
        let axis = MockAxis::new("phase", 0.0, MotionLog::new())
            .with_settle_delay(Duration::from_secs(2));
        let err = axis
            .move_and_confirm(1.0, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Timed out"));
    }

    #[tokio::test]
    async fn test_mock_detector() {
        let detector = MockDetector::new(4.2);
        assert_eq!(detector.read().await.unwrap(), 4.2);
        assert_eq!(detector.read().await.unwrap(), 4.2);
        assert_eq!(detector.read_count(), 2);
    }
}
