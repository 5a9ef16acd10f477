//! ABOUTME: Entry point for the document pipeline CLI. Wires configuration, storage, and
//! ABOUTME: external-service clients into the orchestrator; the HTTP surface is out of scope.

mod cli;
mod collaborators;
mod migrations;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, TraceLevel};
use docflow_config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.trace);

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::ProcessDoc { source, user_id, filename } => {
            process_doc(&config, cli.local, &source, &user_id, filename).await
        }
        Command::ShowJob { job_id } => show_job(&config, cli.local, &job_id).await,
    }
}

async fn process_doc(
    config: &AppConfig,
    local: bool,
    source: &str,
    user_id: &str,
    filename: Option<String>,
) -> Result<()> {
    let collaborators = if local {
        collaborators::build_local(config)
    } else {
        let pool = build_pool(config)?;
        run_migrations(&pool).await?;
        collaborators::build_live(config, pool)
    };

    let job = collaborators
        .registry
        .create(user_id, source)
        .await
        .context("failed to create job record")?;

    docflow_pipeline::run_job(job.id, user_id, source, filename, &collaborators).await;

    let finished = collaborators
        .registry
        .get(job.id)
        .await
        .context("job vanished after run_job returned")?;
    println!("{}", serde_json::to_string_pretty(&finished)?);
    Ok(())
}

async fn show_job(config: &AppConfig, local: bool, job_id: &str) -> Result<()> {
    let id = job_id.parse().context("job id must be a UUID")?;
    let registry = if local {
        collaborators::build_local(config).registry
    } else {
        let pool = build_pool(config)?;
        collaborators::build_live(config, pool).registry
    };
    let job = registry.get(docflow_core::JobId::from_uuid(id)).await.context("job not found")?;
    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}

fn build_pool(config: &AppConfig) -> Result<deadpool_postgres::Pool> {
    let mut pg_config = deadpool_postgres::Config::new();
    pg_config.url = Some(config.database.url.clone());
    pg_config
        .create_pool(Some(deadpool_postgres::Runtime::Tokio1), tokio_postgres::NoTls)
        .context("failed to build the Postgres connection pool")
}

async fn run_migrations(pool: &deadpool_postgres::Pool) -> Result<()> {
    let mut client = pool.get().await.context("failed to reach the database for migrations")?;
    migrations::run(&mut client).await.context("failed to apply pending migrations")?;
    Ok(())
}

/// Priority: `RUST_LOG` > `--trace` > warn, matching the teacher CLI's
/// stderr-only tracing setup so pipeline output stays parseable on stdout.
fn setup_tracing(trace_level: TraceLevel) {
    use std::io;
    use tracing_subscriber::EnvFilter;

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(io::stderr)
            .with_target(false)
            .init();
    } else {
        let level: tracing::Level = trace_level.into();
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(io::stderr)
            .with_target(false)
            .init();
    }
}
