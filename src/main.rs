// src/main.rs

use simexec::exec::ExecutionStatus;
use simexec::{cli, config, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("simexec error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<i32> {
    let args = cli::parse();
    let cfg = config::load_or_default(args.config.as_deref())?;
    logging::init_logging(args.log_level, cfg.service.log_level())?;

    let dry_run = args.dry_run;
    let status = run(args, cfg).await?;
    Ok(match status {
        _ if dry_run => 0,
        Some(ExecutionStatus::Completed) => 0,
        _ => 1,
    })
}
