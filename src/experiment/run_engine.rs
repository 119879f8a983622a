//! RunEngine - sequential plan executor
//!
//! The RunEngine drains a [`Plan`] one command at a time against an [`AxisRegistry`]. Every move
//! waits for its axes to settle before the next command is issued; `MoveTogether` commands
//! drive their axes concurrently and wait for all of them.
//!
//! # Usage
//!
//! ```rust,ignore
//! let engine = RunEngine::new(Arc::new(registry), Duration::from_secs(30));
//! let mut plan = LineScan::new("slit_x", 0.0, 1.0, 11).with_detector("diode");
//! let summary = engine.run(&mut plan).await?;
//! for event in &summary.events {
//!     println!("{:?} {:?}", event.positions, event.data);
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::plans::{Plan, PlanCommand};
use crate::error::MonoResult;
use crate::hardware::AxisRegistry;

/// One recorded point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Sequence number within the run, from 0
    pub seq_num: u32,
    /// Time the event was emitted
    pub time: DateTime<Utc>,
    /// Stream name
    pub stream: String,
    /// Detector readings
    pub data: HashMap<String, f64>,
    /// Axis positions (last commanded targets merged with the plan's nominal positions)
    pub positions: HashMap<String, f64>,
}

/// Result of a completed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run identifier
    pub run_uid: String,
    /// Plan type identifier
    pub plan_type: String,
    /// Plan arguments
    pub plan_args: HashMap<String, String>,
    /// Run start
    pub start_time: DateTime<Utc>,
    /// Run end
    pub stop_time: DateTime<Utc>,
    /// Commands executed
    pub num_commands: usize,
    /// Recorded events
    pub events: Vec<Event>,
}

#[derive(Default)]
struct RunContext {
    collected_data: HashMap<String, f64>,
    current_positions: HashMap<String, f64>,
    events: Vec<Event>,
}

/// Plan executor
pub struct RunEngine {
    registry: Arc<AxisRegistry>,
    settle_timeout: Duration,
}

impl RunEngine {
    /// Engine over `registry`; each axis must settle within `settle_timeout`
    pub fn new(registry: Arc<AxisRegistry>, settle_timeout: Duration) -> Self {
        Self {
            registry,
            settle_timeout,
        }
    }

    /// Registry the engine drives
    pub fn registry(&self) -> &Arc<AxisRegistry> {
        &self.registry
    }

    /// Execute `plan` to completion
    ///
    /// # Errors
    /// The first failing command ends the run; its error is returned unchanged. Axes are left
    /// where the failure stopped them.
    pub async fn run(&self, plan: &mut dyn Plan) -> MonoResult<RunSummary> {
        let run_uid = Uuid::new_v4().to_string();
        let start_time = Utc::now();
        info!(
            run_uid = %run_uid,
            plan_type = %plan.plan_type(),
            num_points = plan.num_points(),
            "Starting run"
        );

        let mut ctx = RunContext::default();
        let mut num_commands = 0;
        while let Some(cmd) = plan.next_command() {
            if let Err(e) = self.process_command(cmd, &mut ctx).await {
                error!(run_uid = %run_uid, error = %e, "Run failed");
                return Err(e);
            }
            num_commands += 1;
        }

        info!(
            run_uid = %run_uid,
            num_events = ctx.events.len(),
            "Run complete"
        );
        Ok(RunSummary {
            run_uid,
            plan_type: plan.plan_type().to_string(),
            plan_args: plan.plan_args(),
            start_time,
            stop_time: Utc::now(),
            num_commands,
            events: ctx.events,
        })
    }

    async fn process_command(&self, cmd: PlanCommand, ctx: &mut RunContext) -> MonoResult<()> {
        debug!(?cmd, "Processing command");

        match cmd {
            PlanCommand::MoveTo {
                device_id,
                position,
            } => {
                let target = [super::AxisTarget::new(device_id.as_str(), position)];
                self.registry
                    .move_together(&target, self.settle_timeout)
                    .await?;
                ctx.current_positions.insert(device_id, position);
            }

            PlanCommand::MoveTogether { targets } => {
                self.registry
                    .move_together(&targets, self.settle_timeout)
                    .await?;
                ctx.current_positions
                    .extend(targets.into_iter().map(|t| (t.axis, t.position)));
            }

            PlanCommand::Read { device_id } => {
                let value = self.registry.read(&device_id).await?;
                ctx.collected_data.insert(device_id, value);
            }

            PlanCommand::Wait { seconds } => {
                sleep(Duration::from_secs_f64(seconds.max(0.0))).await;
            }

            PlanCommand::Checkpoint { label } => {
                debug!(label = %label, "Checkpoint");
            }

            PlanCommand::EmitEvent { stream, positions } => {
                let mut all_positions = ctx.current_positions.clone();
                all_positions.extend(positions);
                let event = Event {
                    seq_num: ctx.events.len() as u32,
                    time: Utc::now(),
                    stream,
                    data: std::mem::take(&mut ctx.collected_data),
                    positions: all_positions,
                };
                ctx.events.push(event);
            }
        }
        Ok(())
    }
}
