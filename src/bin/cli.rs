//! track-merger CLI - consolidate GPS track exports
//!
//! Usage:
//!   track-merger merge [--input <dir|glob>] [--output <file>]
//!   track-merger cull [--input <file>] [--output <file>] [--min-distance <m>]
//!   track-merger finalize [--input <file>] [--output <file>] [--remove-points]
//!   track-merger analyze [--input <file>]
//!   track-merger run [--input <dir|glob>] [--min-distance <m>] [--remove-points]
//!
//! Each stage writes one KML file; `run` chains merge -> cull -> finalize
//! through the default intermediate files.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::error;
use track_merger::{
    cull::{CullConfig, DEFAULT_MIN_DISTANCE_METERS},
    diagnostics::{IntervalConfig, DEFAULT_SHORT_INTERVAL_SECONDS},
    pipeline::{self, PipelineConfig},
    reassemble::{PointLayout, ReassemblyConfig, DEFAULT_GROUP_LABEL, DEFAULT_PATH_NAME},
    WriteOptions,
};

#[derive(Parser)]
#[command(name = "track-merger")]
#[command(about = "Merge, cull and finalize GPS tracks exported as KML", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge KML files into one deduplicated, time-ordered track
    Merge {
        /// Directory containing KML files, glob pattern, or single file
        #[arg(short, long, default_value = "input")]
        input: String,

        /// Path to output KML file
        #[arg(short, long, default_value = "output/merged.kml")]
        output: PathBuf,
    },

    /// Drop points closer than a minimum distance to the last kept point
    Cull {
        #[arg(short, long, default_value = "output/merged.kml")]
        input: PathBuf,

        #[arg(short, long, default_value = "output/culled.kml")]
        output: PathBuf,

        /// Minimum distance between kept points in meters
        #[arg(short, long, default_value_t = DEFAULT_MIN_DISTANCE_METERS)]
        min_distance: f64,
    },

    /// Name the path and group (or drop) the point markers
    Finalize {
        #[arg(short, long, default_value = "output/culled.kml")]
        input: PathBuf,

        #[arg(short, long, default_value = "output/final_track.kml")]
        output: PathBuf,

        #[command(flatten)]
        layout: LayoutArgs,
    },

    /// Print time-interval statistics of a KML file
    Analyze {
        #[arg(short, long, default_value = "output/merged.kml")]
        input: PathBuf,

        /// Intervals at or below this many seconds are counted as short
        #[arg(long, default_value_t = DEFAULT_SHORT_INTERVAL_SECONDS)]
        short_interval: f64,
    },

    /// Run merge, cull and finalize in sequence
    Run {
        /// Directory containing KML files, glob pattern, or single file
        #[arg(short, long, default_value = "input")]
        input: String,

        #[arg(long, default_value = "output/merged.kml")]
        merged: PathBuf,

        #[arg(long, default_value = "output/culled.kml")]
        culled: PathBuf,

        /// Path to the final KML file
        #[arg(short, long, default_value = "output/final_track.kml")]
        output: PathBuf,

        /// Minimum distance between kept points in meters
        #[arg(short, long, default_value_t = DEFAULT_MIN_DISTANCE_METERS)]
        min_distance: f64,

        /// Skip culling and finalize the merged track directly
        #[arg(long)]
        no_cull: bool,

        #[command(flatten)]
        layout: LayoutArgs,
    },
}

#[derive(clap::Args)]
struct LayoutArgs {
    /// Drop point markers entirely, keeping only the path
    #[arg(long)]
    remove_points: bool,

    /// Name of the folder that holds the point markers
    #[arg(long, default_value = DEFAULT_GROUP_LABEL)]
    folder_name: String,

    /// Name given to the path when it has none
    #[arg(long, default_value = DEFAULT_PATH_NAME)]
    path_name: String,
}

impl LayoutArgs {
    fn into_config(self) -> ReassemblyConfig {
        let layout = if self.remove_points {
            PointLayout::Suppressed
        } else {
            PointLayout::Grouped {
                label: self.folder_name,
            }
        };
        ReassemblyConfig {
            layout,
            default_path_name: Some(self.path_name),
            rebuild_path: false,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let options = WriteOptions::default();

    let outcome = match cli.command {
        Commands::Merge { input, output } => {
            pipeline::merge(&input, &output, &options).map(|r| r.to_string())
        }
        Commands::Cull {
            input,
            output,
            min_distance,
        } => {
            let config = CullConfig {
                min_distance_meters: min_distance,
            };
            pipeline::cull(&input, &output, &config, &options).map(|r| r.to_string())
        }
        Commands::Finalize {
            input,
            output,
            layout,
        } => pipeline::finalize(&input, &output, &layout.into_config(), &options)
            .map(|r| r.to_string()),
        Commands::Analyze {
            input,
            short_interval,
        } => {
            let config = IntervalConfig {
                short_interval_seconds: short_interval,
            };
            pipeline::analyze(&input, &config).map(|r| r.to_string())
        }
        Commands::Run {
            input,
            merged,
            culled,
            output,
            min_distance,
            no_cull,
            layout,
        } => {
            let config = PipelineConfig {
                input,
                merged_output: merged,
                culled_output: culled,
                final_output: output,
                cull: (!no_cull).then_some(CullConfig {
                    min_distance_meters: min_distance,
                }),
                finalize: layout.into_config(),
                write: options,
            };
            pipeline::run(&config).map(|r| r.to_string())
        }
    };

    match outcome {
        Ok(summary) => {
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
