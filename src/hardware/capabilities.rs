//! Axis and detector capabilities
//!
//! The monochromator core only needs two things from the outside world:
//!
//! - [`Movable`]: a positionable axis (pitch motors, translation stage, undulator gap and phase,
//!   and the soft axes that hold offsets, line density, focus constant and energy)
//! - [`Readable`]: a scalar detector read at each scan point
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors; the mover wraps failures into `MonoError::Motion`
//!
//! # Example
//!
//! ```rust,ignore
//! async fn park<A: Movable>(axis: &A) -> anyhow::Result<()> {
//!     axis.move_and_confirm(100.0, Duration::from_secs(30)).await
//! }
//! ```

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Capability: Motion Control
///
/// # Contract
/// - Positions are in axis-native units (degrees, mm, eV, lines/mm)
/// - `move_abs` initiates motion and may return before completion
/// - `wait_settled` blocks until motion completes
/// - `position` returns the current readback (may be approximate during motion)
///
/// # Thread Safety
/// - All methods take `&self`; implementations use interior mutability
#[async_trait]
pub trait Movable: Send + Sync {
    /// Move to absolute position
    ///
    /// # Returns
    /// - Ok(()) if motion initiated successfully
    /// - Err if position is out of range or hardware error
    async fn move_abs(&self, position: f64) -> Result<()>;

    /// Get current position
    async fn position(&self) -> Result<f64>;

    /// Wait for motion to settle
    ///
    /// # Returns
    /// - Ok(()) when settled
    /// - Err on hardware error
    async fn wait_settled(&self) -> Result<()>;

    /// Stop motion immediately
    ///
    /// # Default Implementation
    /// Returns an error indicating stop is not supported.
    async fn stop(&self) -> Result<()> {
        anyhow::bail!("Stop not supported by this device")
    }

    /// Move to `target` and wait until settled, giving up after `timeout`
    ///
    /// This is the only completion contract the mover relies on; retries, if any, belong to
    /// the implementation.
    async fn move_and_confirm(&self, target: f64, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, async {
            self.move_abs(target).await?;
            self.wait_settled().await
        })
        .await
        .map_err(|_| anyhow!("Timed out after {timeout:?} moving to {target}"))?
    }
}

/// Capability: Scalar Readout
///
/// # Contract
/// - `read()` performs measurement and returns value
/// - Units are device-specific (document in implementation)
#[async_trait]
pub trait Readable: Send + Sync {
    /// Read current value
    async fn read(&self) -> Result<f64>;
}
