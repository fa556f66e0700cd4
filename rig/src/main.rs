//! Command-line front-end for the tracking rig.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use rig::batch::{self, ReconstructOptions, TrackOptions};
use rig::simulate::{self, SimulateOptions};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rig", about = "Multi-camera volumetric tracking rig")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a simulated capture session into a data directory
    Run(RunArgs),
    /// Triangulate per-camera detections into 3D points
    Reconstruct(ReconstructArgs),
    /// Build persistent target trajectories from reconstructed points
    Track(TrackArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Session data directory
    #[arg(long)]
    data: PathBuf,
    /// Number of simulated cameras
    #[arg(long, default_value_t = 3)]
    cameras: usize,
    /// Number of simulated frames
    #[arg(long, default_value_t = 100)]
    frames: usize,
}

#[derive(Args)]
struct ReconstructArgs {
    /// Session data directory
    #[arg(long)]
    data: PathBuf,
    /// Drop detections with area at or below this value
    #[arg(long, default_value_t = 0.0)]
    area_filter: f64,
    /// Minimum number of observing cameras per output point
    #[arg(long, default_value_t = 3)]
    minimum_views: usize,
    /// Inclusive frame range
    #[arg(long, num_args = 2, value_names = ["START", "STOP"])]
    frame_range: Option<Vec<u64>>,
    /// Worker count for the frame-range partition
    #[arg(long, default_value_t = 4)]
    workers: usize,
}

#[derive(Args)]
struct TrackArgs {
    /// Session data directory
    #[arg(long)]
    data: PathBuf,
    /// Inclusive frame range
    #[arg(long, num_args = 2, value_names = ["START", "STOP"])]
    range: Option<Vec<u64>>,
    /// Drop points at or above this reconstruction error
    #[arg(long, default_value_t = 5.0)]
    max_reconstruction_error: f64,
    /// Association distance gate
    #[arg(long, default_value_t = 1.0)]
    max_distance: f64,
    /// Missed-observation ceiling
    #[arg(long, default_value_t = 20)]
    max_missed: u64,
    /// Kalman timestep in seconds
    #[arg(long, default_value_t = 0.01)]
    delta: f64,
}

fn pair(range: Option<Vec<u64>>) -> Option<(u64, u64)> {
    range.map(|r| (r[0], r[1]))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Run(args) => simulate::run_session(
            &args.data,
            &SimulateOptions {
                cameras: args.cameras,
                frames: args.frames,
            },
        ),
        Command::Reconstruct(args) => batch::run_reconstruction(
            &args.data,
            &ReconstructOptions {
                area_filter: args.area_filter,
                minimum_views: args.minimum_views,
                frame_range: pair(args.frame_range),
                workers: args.workers,
            },
        ),
        Command::Track(args) => batch::run_tracking(
            &args.data,
            &TrackOptions {
                range: pair(args.range),
                max_reconstruction_error: args.max_reconstruction_error,
                max_distance: args.max_distance,
                max_missed: args.max_missed,
                dt: args.delta,
            },
        ),
    }
}
