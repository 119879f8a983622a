//! Scan plans, trajectories and the plan runner.

pub mod plans;
pub mod run_engine;
pub mod trajectory;

pub use plans::{
    collect_commands, linspace, linspace_at, scan_2d, AxisTarget, Count, EnergyScan, GridScan,
    InnerProductScan, LineScan, PathScan, Pattern2D, Plan, PlanCommand,
};
pub use run_engine::{Event, RunEngine, RunSummary};
pub use trajectory::AxisSweep;
