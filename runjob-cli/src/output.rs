//! Console output
//!
//! Progress lines on stdout. Logs go to stderr through tracing.

use colored::*;
use runjob_core::domain::status::WorkloadStatus;
use runjob_runner::RunContext;
use runjob_runner::service::{ProgressReporter, status_line};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Progress reporter writing to stdout
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    /// A row of progress dots is open
    dots: AtomicBool,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ends an open row of dots
    fn end_dots(&self) {
        if self.dots.swap(false, Ordering::SeqCst) {
            println!();
        }
    }
}

impl ProgressReporter for ConsoleProgress {
    fn created(&self, context: &RunContext) {
        println!(
            "{} {} in namespace {} (run {})",
            "Created job".green(),
            context.name.bold(),
            context.namespace,
            context.run_id.to_string().dimmed()
        );
    }

    fn tick(&self) {
        self.dots.store(true, Ordering::SeqCst);
        print!(".");
        let _ = std::io::stdout().flush();
    }

    fn terminal(&self, context: &RunContext, status: &WorkloadStatus) {
        self.end_dots();
        let line = status_line(context, status);
        if status.failed {
            println!("{}", line.red().bold());
        } else {
            println!("{}", line.green().bold());
        }
    }

    fn deleted(&self, context: &RunContext) {
        self.end_dots();
        println!("Deleted job {}", context.name.bold());
    }

    fn report_written(&self, path: &Path) {
        println!("Logs written to file {}", path.display().to_string().cyan());
    }
}

/// Prints a fatal error with what is needed to clean up by hand
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if let Some(run) = err.downcast_ref::<runjob_runner::RunError>() {
        if let Some(context) = run.context() {
            eprintln!("  {} {}", "Failed step:".bold(), run.step());
            if run.leaves_resources() {
                eprintln!(
                    "  {} kubectl delete job {} -n {}",
                    "Job left behind, remove it with:".yellow(),
                    context.name,
                    context.namespace
                );
            }
        }
    }
}

/// Prints the notice for an interrupted run
pub fn print_interrupted(context: &RunContext, status: Option<&WorkloadStatus>) {
    println!();
    let last = status.map(|s| s.outcome()).unwrap_or("unknown");
    println!(
        "{} job {} in namespace {} may be left behind (run {}, last status: {})",
        "Interrupted:".yellow().bold(),
        context.name,
        context.namespace,
        context.run_id,
        last
    );
}
