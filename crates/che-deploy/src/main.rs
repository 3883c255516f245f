//! Eclipse Che deploy action entry point.
//!
//! The runner invokes this binary for the main step and again for the post
//! step; the phase is recovered from the runner state unless forced.

use std::process::ExitCode;
use std::sync::Arc;

use che_deploy::{start, Phase, Workflow};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Deploy Eclipse Che on minikube and collect its logs.
#[derive(Parser)]
#[command(name = "che-deploy-action", version, about)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Run this phase instead of the one recorded in the runner state.
    #[arg(long, value_enum)]
    phase: Option<Phase>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let runner_debug = std::env::var("RUNNER_DEBUG").is_ok_and(|v| v == "1");
    let filter = if cli.verbose || runner_debug {
        EnvFilter::new("info,che_deploy=debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let workflow = Arc::new(Workflow::from_env());
    let started = start(workflow.clone(), workflow.clone(), cli.phase).await;

    if started && !workflow.has_failed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
