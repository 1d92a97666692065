//! # order-batch
//!
//! Launches `userJob` against a SQLite database.
//!
//! ```text
//! order-batch --config order-batch.toml date=2020-11
//! order-batch --restart 3 date=2020-11
//! ```
//!
//! Exits with status 0 when the run ends `COMPLETED`, 1 otherwise.

use std::{path::PathBuf, process::ExitCode, str::FromStr};

use anyhow::{Context, bail};
use clap::Parser;
use log::{error, info};
use order_batch::{
    config::BatchConfig,
    core::parameters::JobParameters,
    item::rdbc::SqliteJobRepository,
    order::{USER_JOB_NAME, UserJobLauncher, create_schema},
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

#[derive(Parser)]
#[command(name = "order-batch")]
#[command(about = "Level up users and export monthly order statistics")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Name of the job to launch
    #[arg(long, default_value = USER_JOB_NAME)]
    job_name: String,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Restart this failed run instead of starting a new one
    #[arg(long)]
    restart: Option<u64>,

    /// Job parameters, as key=value (e.g. date=2020-11)
    parameters: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match launch(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn launch(cli: Cli) -> anyhow::Result<bool> {
    if cli.job_name != USER_JOB_NAME {
        bail!("unknown job {}, only {} is available", cli.job_name, USER_JOB_NAME);
    }

    let mut config = match &cli.config {
        Some(path) => BatchConfig::from_file(path)?,
        None => BatchConfig::default(),
    };
    config.apply_env_overrides()?;
    config.validate()?;

    let parameters = JobParameters::from_assignments(&cli.parameters)?;

    let options = SqliteConnectOptions::from_str(&config.database_url)
        .with_context(|| format!("invalid database url {}", config.database_url))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .with_context(|| format!("cannot open {}", config.database_url))?;
    create_schema(&pool).await.context("cannot create tables")?;

    let repository = SqliteJobRepository::new(pool.clone());
    repository.initialize()?;

    let launcher = UserJobLauncher::new(&pool, &config, &repository);
    let execution = match cli.restart {
        Some(run_id) => launcher.restart(run_id, &parameters)?,
        None => launcher.run(&parameters)?,
    };

    for step_execution in &execution.step_executions {
        info!(
            "{}: {:?}, read {}, written {}, filtered {}",
            step_execution.name,
            step_execution.status,
            step_execution.read_count,
            step_execution.write_count,
            step_execution.filter_count
        );
    }
    if let Some(failure) = &execution.failure {
        error!(
            "Run {} of {} failed ({:?}): {}",
            execution.run_id,
            execution.job_name,
            failure.kind(),
            failure
        );
    }

    pool.close().await;
    Ok(execution.is_completed())
}
