//! run-job CLI
//!
//! Runs one container image as a Kubernetes Job, waits for it to finish,
//! prints or saves its logs and deletes it.

mod config;
mod job_file;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use runjob_client::{KubeOrchestrator, Orchestrator};
use runjob_core::domain::run::RunId;
use runjob_core::domain::workload::WorkloadSpec;
use runjob_runner::service::{FileSink, ReportSink, StdoutSink};
use runjob_runner::{Config as RunnerConfig, RunContext, RunDriver, RunError, RunOutcome};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::job_file::{JobFile, JobFlags};
use crate::output::ConsoleProgress;

/// Exit code of a run cancelled by the operator or the deadline
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "run-job")]
#[command(about = "Run a single Kubernetes Job to completion and collect its logs", long_about = None)]
struct Cli {
    /// Namespace for the job [default: default]
    #[arg(long)]
    namespace: Option<String>,

    /// Name of the job [default: job1]
    #[arg(long)]
    name: Option<String>,

    /// Service account to use for the job
    #[arg(long)]
    sa: Option<String>,

    /// Image for the job
    #[arg(long)]
    image: Option<String>,

    /// File to write the logs to; standard output when omitted
    #[arg(long)]
    out: Option<PathBuf>,

    /// Path to the kubeconfig; in-cluster configuration is used when it does not exist
    #[arg(long, env = "KUBECONFIG", default_value = config::DEFAULT_KUBECONFIG)]
    kubeconfig: String,

    /// YAML job file; flags override its values
    #[arg(long, short = 'f')]
    file: Option<PathBuf>,

    /// Entrypoint override, one element per occurrence
    #[arg(long = "command", allow_hyphen_values = true)]
    command: Vec<String>,

    /// Give up after this many seconds, leaving the job in place
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Arguments passed to the container
    #[arg(last = true)]
    args: Vec<String>,
}

impl Cli {
    fn job_flags(&self) -> JobFlags {
        JobFlags {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            image: self.image.clone(),
            service_account: self.sa.clone(),
            command: self.command.clone(),
            args: self.args.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let file = match &cli.file {
        Some(path) => JobFile::load(path)?,
        None => JobFile::default(),
    };
    let spec = WorkloadSpec::build(file.merge(cli.job_flags()), RunId::new()).map_err(RunError::from)?;

    let runner_config = RunnerConfig::from_env().context("Invalid runner configuration")?;
    runner_config
        .validate()
        .context("Invalid runner configuration")?;

    let kubeconfig = config::resolve_kubeconfig(&cli.kubeconfig, config::home_dir().as_deref());
    let client = runjob_client::connect(&kubeconfig)
        .await
        .context("Failed to connect to the cluster")?;
    let orchestrator: Arc<dyn Orchestrator> =
        Arc::new(KubeOrchestrator::new(client, spec.namespace()));

    let sink: Arc<dyn ReportSink> = match &cli.out {
        Some(path) => Arc::new(FileSink::new(path)),
        None => Arc::new(StdoutSink),
    };
    let driver = RunDriver::new(orchestrator, runner_config, sink, Arc::new(ConsoleProgress::new()));

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());
    if let Some(seconds) = cli.timeout {
        spawn_deadline(cancel.clone(), Duration::from_secs(seconds));
    }

    let context = RunContext::from_spec(&spec);
    info!("Starting {}", context);

    Ok(match driver.run(spec, cancel).await? {
        RunOutcome::Succeeded(_) => ExitCode::SUCCESS,
        RunOutcome::Failed(_) => ExitCode::FAILURE,
        RunOutcome::Interrupted(status) => {
            output::print_interrupted(&context, status.as_ref());
            ExitCode::from(EXIT_INTERRUPTED)
        }
    })
}

/// Cancels the run on Ctrl-C
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, stopping");
                cancel.cancel();
            }
            Err(e) => warn!("Failed to listen for interrupts: {}", e),
        }
    });
}

/// Cancels the run once `deadline` has elapsed
fn spawn_deadline(cancel: CancellationToken, deadline: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(deadline) => {
                warn!("Deadline of {:?} reached, stopping", deadline);
                cancel.cancel();
            }
        }
    });
}
