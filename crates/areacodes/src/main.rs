//! Administrative-division code timeline builder.
//!
//! Usage:
//!   # Build result.csv and codes.json from data/ and diff/
//!   areacodes
//!
//!   # Check every diff file and list all problems
//!   areacodes validate
//!
//!   # How many change lines are annotated
//!   areacodes progress
//!
//!   # Write skeleton diff files for unannotated snapshot pairs
//!   areacodes scaffold [--force]
//!
//! Logs go to stderr; set RUST_LOG=debug to see every emitted edge.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use areacodes_core::consts::{DATA_DIRECTORY, DIFF_DIRECTORY, OUTPUT_CSV_PATH, OUTPUT_JSON_PATH};
use areacodes_core::{Layout, pipeline, scaffold};

/// Reconcile dated code snapshots and diff annotations into a timeline.
#[derive(Parser, Debug)]
#[command(name = "areacodes")]
#[command(about = "Build the administrative-division code timeline")]
struct Args {
    #[command(flatten)]
    paths: Paths,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Args, Debug)]
struct Paths {
    /// Directory of YYYY.txt snapshots
    #[arg(long, global = true, default_value = DATA_DIRECTORY)]
    data: PathBuf,

    /// Directory of SRC-DST.diff annotations
    #[arg(long, global = true, default_value = DIFF_DIRECTORY)]
    diff: PathBuf,

    /// Tabular report output
    #[arg(long, global = true, default_value = OUTPUT_CSV_PATH)]
    csv: PathBuf,

    /// Hierarchical report output
    #[arg(long, global = true, default_value = OUTPUT_JSON_PATH)]
    json: PathBuf,
}

impl From<Paths> for Layout {
    fn from(paths: Paths) -> Self {
        Layout {
            data_dir: paths.data,
            diff_dir: paths.diff,
            csv_path: paths.csv,
            json_path: paths.json,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build both reports (default)
    Build,
    /// Check every diff line without stopping at the first problem
    Validate,
    /// Count annotated change lines
    Progress,
    /// Write skeleton diff files for consecutive snapshot pairs
    Scaffold {
        /// Overwrite existing diff files
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let layout = Layout::from(args.paths);
    let start = Instant::now();

    match args.command.unwrap_or(Command::Build) {
        Command::Build => {
            let summary = pipeline::build(&layout)?;
            tracing::info!(
                snapshots = summary.snapshots,
                diff_files = summary.diff_files,
                edges = summary.edges,
                unclean_files = summary.unclean_files,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "finished"
            );
        }
        Command::Validate => {
            let problems = pipeline::validate(&layout)?;
            for problem in &problems {
                println!("{problem}");
            }
            if !problems.is_empty() {
                bail!("{} problem(s) found", problems.len());
            }
            tracing::info!("no problems found");
        }
        Command::Progress => {
            println!("{}", pipeline::progress(&layout.diff_dir)?);
        }
        Command::Scaffold { force } => {
            let written = scaffold::scaffold(&layout, force)?;
            tracing::info!(files = written.len(), "scaffold done");
        }
    }
    Ok(())
}
