use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use actimerge::config::MergeConfig;
use actimerge::context::MergeContext;
use actimerge::merge;

/// Merge several activity-management databases into one.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to the merge configuration file.
    #[arg(short, long, default_value = "merge.json")]
    config: PathBuf,

    /// Assume all schemas are already up to date.
    #[arg(long)]
    skip_migrations: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let config = MergeConfig::load(&args.config)?;
    let mut ctx = MergeContext::open(config)?;
    merge::run(&mut ctx, args.skip_migrations)
}
