//! CLI entry point for esm-mono
//!
//! Provides command-line access to the monochromator core:
//! - Solving grating angles and undulator gaps for a photon energy
//! - Printing the planned coordinated move as JSON
//! - Running a move against mock axes
//! - Checking a configuration file and its calibration tables
//!
//! # Usage
//!
//! ```bash
//! esm-mono angles 500 --grating 800 --branch A
//! esm-mono gap 700 --undulator 57 --polarization LV
//! esm-mono plan-move 500 --grating 800 --undulator 57
//! esm-mono simulate 500 --grating 800 --undulator 57 --polarization CL
//! esm-mono check-config --config config/beamline.toml
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use esm_mono::calibration::{Branch, CalibrationStore, Grating, Polarization, UndulatorId};
use esm_mono::config::{BeamlineConfig, DEFAULT_CONFIG_PATH};
use esm_mono::experiment::{EnergyScan, RunEngine};
use esm_mono::hardware::{create_mock_registry, MotionLog, MOCK_DETECTOR};
use esm_mono::logging::{self, LoggingConfig, OutputFormat};
use esm_mono::motion::{CoordinatedMover, FocusPolicy, MoveRequest, PitchReadback};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "esm-mono")]
#[command(about = "ESM monochromator and undulator calibration and coordinated motion", long_about = None)]
struct Cli {
    /// Beamline configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Directory the calibration data directory is resolved against
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true, default_value = "compact")]
    log_format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve the grating equation for a photon energy
    Angles(RequestArgs),

    /// Undulator gap and phase for a photon energy
    Gap {
        /// Photon energy (eV)
        energy: f64,
        /// Undulator (e.g. 57 or EPU105)
        #[arg(long)]
        undulator: UndulatorId,
        /// Polarization (LH, LV, CL, CR)
        #[arg(long, default_value = "LH")]
        polarization: Polarization,
    },

    /// Photon energy an undulator delivers at a gap
    Energy {
        /// Gap (mm)
        gap: f64,
        /// Undulator (e.g. 57 or EPU105)
        #[arg(long)]
        undulator: UndulatorId,
        /// Polarization (LH, LV, CL, CR)
        #[arg(long, default_value = "LH")]
        polarization: Polarization,
    },

    /// List the valid photon-energy ranges
    Ranges,

    /// Print the planned move sequence as JSON
    PlanMove {
        #[command(flatten)]
        request: RequestArgs,
        /// Current mirror pitch (degrees)
        #[arg(long, default_value_t = 88.0)]
        mirror_pitch: f64,
        /// Current grating pitch (degrees)
        #[arg(long, default_value_t = 86.0)]
        grating_pitch: f64,
    },

    /// Run a move (or an energy scan) against mock axes
    Simulate {
        #[command(flatten)]
        request: RequestArgs,
        /// Scan from the requested energy up to this energy
        #[arg(long, requires = "step")]
        scan_to: Option<f64>,
        /// Energy step of the scan (eV)
        #[arg(long)]
        step: Option<f64>,
    },

    /// Load and validate the configuration and calibration tables
    CheckConfig,
}

#[derive(Args)]
struct RequestArgs {
    /// Photon energy (eV)
    energy: f64,
    /// Grating line density (300, 600, 800, 1200)
    #[arg(long, default_value = "800")]
    grating: Grating,
    /// Beamline branch (A or B)
    #[arg(long, default_value = "A")]
    branch: Branch,
    /// Undulator to drive (e.g. 57 or EPU105)
    #[arg(long)]
    undulator: Option<UndulatorId>,
    /// Polarization (LH, LV, CL, CR)
    #[arg(long, default_value = "LH")]
    polarization: Polarization,
    /// Explicit fixed-focus constant
    #[arg(long, conflicts_with = "nominal")]
    c: Option<f64>,
    /// Use the stored fixed-focus constant of the grating/branch
    #[arg(long)]
    nominal: bool,
}

impl RequestArgs {
    fn focus(&self) -> FocusPolicy {
        match (self.c, self.nominal) {
            (Some(c), _) => FocusPolicy::Explicit(c),
            (None, true) => FocusPolicy::Nominal,
            (None, false) => FocusPolicy::Calculated,
        }
    }

    fn to_request(&self) -> MoveRequest {
        MoveRequest {
            energy: self.energy,
            grating: self.grating,
            branch: self.branch,
            undulator: self.undulator.clone(),
            polarization: self.polarization,
            focus: self.focus(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = BeamlineConfig::load_validated(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.application.log_level);
    let log_config = LoggingConfig::new(logging::parse_log_level(level).map_err(anyhow::Error::msg)?)
        .with_format(cli.log_format);
    logging::init(log_config).map_err(anyhow::Error::msg)?;

    let store = Arc::new(
        CalibrationStore::load(&config, &cli.root).context("loading calibration tables")?,
    );
    let mover = CoordinatedMover::from_config(&config, store.clone())?;

    match cli.command {
        Commands::Angles(args) => {
            let request = args.to_request();
            let angles = mover.angle_solver().solve_with_policy(
                request.energy,
                request.grating,
                request.branch,
                request.undulator.as_ref(),
                request.focus,
            )?;
            println!("{}", serde_json::to_string_pretty(&angles)?);
        }

        Commands::Gap {
            energy,
            undulator,
            polarization,
        } => {
            let setpoints = mover
                .undulator_solver()
                .setpoints(energy, &undulator, polarization)?;
            println!("{}", serde_json::to_string_pretty(&setpoints)?);
        }

        Commands::Energy {
            gap,
            undulator,
            polarization,
        } => {
            let energy = mover
                .undulator_solver()
                .energy_for(gap, &undulator, polarization)?;
            println!("{energy:.3}");
        }

        Commands::Ranges => print_ranges(&store),

        Commands::PlanMove {
            request,
            mirror_pitch,
            grating_pitch,
        } => {
            let readback = PitchReadback {
                mirror: mirror_pitch,
                grating: grating_pitch,
            };
            let sequence = mover.plan_move(&request.to_request(), readback)?;
            println!("{}", serde_json::to_string_pretty(&sequence)?);
        }

        Commands::Simulate {
            request,
            scan_to,
            step,
        } => simulate(&config, &mover, &request.to_request(), scan_to.zip(step)).await?,

        Commands::CheckConfig => {
            println!(
                "{}: {} gratings, {} undulators, calibration OK",
                cli.config.display(),
                store.gratings().len(),
                store.undulators().len()
            );
        }
    }

    Ok(())
}

fn print_ranges(store: &CalibrationStore) {
    for profile in store.gratings() {
        println!("{:>10} grating  {}", profile.grating, profile.energy_range);
    }
    for profile in store.undulators() {
        println!("{:>10}          {}", profile.id, profile.energy_range);
    }
}

async fn simulate(
    config: &BeamlineConfig,
    mover: &CoordinatedMover,
    request: &MoveRequest,
    scan: Option<(f64, f64)>,
) -> Result<()> {
    let log = MotionLog::new();
    let registry = Arc::new(create_mock_registry(config, &log)?);

    match scan {
        None => {
            let report = mover.move_to(&registry, request).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Some((end, step)) => {
            let energies = EnergyScan::energies_from_step(request.energy, end, step)?;
            let start = mover.read_pitch(&registry).await?;
            let mut plan =
                EnergyScan::new(mover, request, &energies, start)?.with_detector(MOCK_DETECTOR);
            let engine = RunEngine::new(registry.clone(), mover.settle_timeout());
            let summary = engine.run(&mut plan).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    info!(commands = log.len(), "Simulation finished");
    Ok(())
}
