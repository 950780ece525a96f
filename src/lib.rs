// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod runner;
pub mod service;
pub mod types;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, ServiceConfiguration};
use crate::exec::{ExecutionHandler, ExecutionStatus, LocalProcess};
use crate::runner::WorkRunner;
use crate::service::ServiceRunner;

/// Poll interval used by the binary when the config leaves `loop_delay` at 0.
pub const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(1);

/// What the binary is going to run, after CLI overrides are applied.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub command: String,
    pub run_dir: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub cancel_on_shutdown: bool,
    pub service: ServiceConfiguration,
}

impl RunPlan {
    /// Merge CLI arguments over the config file.
    pub fn resolve(args: &CliArgs, cfg: &ConfigFile) -> Result<Self> {
        let Some(command) = args.command_line().or_else(|| cfg.process.command.clone()) else {
            bail!("no command given: pass one after the options or set [process].command");
        };

        let mut service = cfg.service.clone();
        if !service.as_service() {
            debug!("monitoring a process needs the service loop; forcing as_service = true");
            service = service.with_as_service(true);
        }
        if service.loop_delay().is_zero() {
            service = service.with_loop_delay(DEFAULT_POLL_DELAY);
        }

        Ok(Self {
            command,
            run_dir: args.run_dir.clone().or_else(|| cfg.process.run_dir.clone()),
            output_file: args
                .output_file
                .clone()
                .or_else(|| cfg.process.output_file.clone()),
            cancel_on_shutdown: cfg.process.effective_cancel_on_shutdown(),
            service,
        })
    }

    fn local_process(&self) -> LocalProcess {
        let mut process = LocalProcess::new(self.command.clone());
        if let Some(dir) = &self.run_dir {
            process = process.with_run_path(dir.clone());
        }
        if let Some(file) = &self.output_file {
            process = process.with_output_file(file.clone());
        }
        process
    }
}

/// High-level entry point used by `main.rs`.
///
/// Runs the resolved command as a [`LocalProcess`] under a [`WorkRunner`]
/// service and returns the final status (`None` if nothing was launched,
/// e.g. on `--dry-run` or when the process could not be spawned).
pub async fn run(args: CliArgs, cfg: ConfigFile) -> Result<Option<ExecutionStatus>> {
    let plan = RunPlan::resolve(&args, &cfg).context("resolving what to run")?;

    if args.dry_run {
        print_dry_run(&plan);
        return Ok(None);
    }

    let mut pending = Some(plan.local_process());
    let work = WorkRunner::new(plan.command.clone(), move || {
        let mut process = pending
            .take()
            .context("local process was already launched")?;
        process.start()?;
        Ok(Box::new(process) as Box<dyn ExecutionHandler>)
    })
    .with_cancel_on_shutdown(plan.cancel_on_shutdown);

    let mut runner = ServiceRunner::new(work, plan.service.clone());
    runner.execute().await;

    let disposition = runner.service().disposition();
    info!(
        status = %disposition.map(|s| s.to_string()).unwrap_or_else(|| "not launched".into()),
        iterations = runner.iterations(),
        "simexec finished"
    );
    Ok(disposition)
}

/// Simple dry-run output: the resolved command and service settings.
fn print_dry_run(plan: &RunPlan) {
    let service = &plan.service;
    println!("simexec dry-run");
    println!("  command: {}", plan.command);
    if let Some(dir) = &plan.run_dir {
        println!("  run_dir: {}", dir.display());
    }
    if let Some(file) = &plan.output_file {
        println!("  output_file: {}", file.display());
    }
    println!("  cancel_on_shutdown: {}", plan.cancel_on_shutdown);
    println!();

    println!("service:");
    println!("  name: {}", service.name());
    println!("  loop_delay: {:?}", service.loop_delay());
    match service.health_check_frequency() {
        Some(freq) => println!("  health_check_frequency: {freq:?}"),
        None => println!("  health_check_frequency: disabled"),
    }
    println!(
        "  health_check_log_threshold: {}",
        service.health_check_log_threshold()
    );
    println!(
        "  max_health_check_latency: {:?}",
        service.max_health_check_latency()
    );
    println!("  log_level: {}", service.log_level());

    debug!("dry-run complete (no execution)");
}
