use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use swaplist::common;
use swaplist::plan::SwapPlan;
use swaplist::plan_execution;
use swaplist::{inspect_archive, PlaylistEntry, Publisher, RecombinationPipeline};
use tracing::info;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(short, long, global = true)]
    log_level: Option<String>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Combine plates into one swap archive
    Merge {
        #[clap(short, long)]
        output: PathBuf,
        /// ARCHIVE[:PLATE[:COPIES]]
        #[clap(required = true)]
        entries: Vec<PlaylistEntry>,
    },
    Run {
        #[clap(short, long)]
        plan: PathBuf,
        #[clap(short, long)]
        watch: bool,
    },
    Init {
        #[clap(short, long)]
        plan: PathBuf,
    },
    /// List the plates of an archive as JSON
    Inspect {
        archive: PathBuf,
        /// Copy plate thumbnails into this directory
        #[clap(short, long)]
        thumbnails: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    setup_logging(&args.log_level);

    match args.command {
        Commands::Merge { output, entries } => {
            info!("Merging {} playlist entries", entries.len());
            let written = RecombinationPipeline::default().run(&entries, &output)?;
            info!("Swap archive written to {}", written.display());
        }
        Commands::Run { plan, watch } => {
            info!("Running plan: {}", plan.display());
            plan_execution::execute_plan(&plan, watch)?;
        }
        Commands::Init { plan } => {
            info!("Initializing plan: {}", plan.display());
            if plan.exists() {
                bail!("Refusing to overwrite existing plan {}", plan.display());
            }
            let serialized_plan = serde_yaml::to_string(&SwapPlan::default())?;
            common::write_string_to_file(&plan, &serialized_plan)?;
        }
        Commands::Inspect {
            archive,
            thumbnails,
        } => {
            let publisher = thumbnails.map(Publisher::new);
            let plates = inspect_archive(&archive, publisher.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&plates)?);
        }
    }

    Ok(())
}

fn setup_logging(log_level: &Option<String>) {
    let log_level = match log_level
        .as_deref()
        .unwrap_or("info")
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level.to_string()))
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}
