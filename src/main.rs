mod config;
mod core;
mod interfaces;
mod logging;

use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{error, info};

use crate::config::Config;
use crate::core::generator::{ContentGenerator, GatewayGenerator};
use crate::core::store::JobStore;
use crate::core::worker::run_worker_cycle;

fn print_help() {
    println!("pathforge - asynchronous learning path generation service");
    println!();
    println!("Usage: pathforge <command>");
    println!();
    println!("Commands:");
    println!("  serve                    Start the API server and job worker (default)");
    println!("  token <user_id> [name]   Mint an API token for a user");
    println!("  help                     Show this help");
}

#[tokio::main]
async fn main() {
    logging::init();
    if let Err(e) = run().await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        None | Some("serve") => serve().await,
        Some("token") => {
            let Some(user_id) = args.get(2) else {
                bail!("usage: pathforge token <user_id> [name]");
            };
            let name = args.get(3).map(String::as_str).unwrap_or("default");
            mint_token(user_id, name).await
        }
        Some("help") | Some("--help") | Some("-h") => {
            print_help();
            Ok(())
        }
        Some(other) => bail!("unknown command '{other}', try: pathforge help"),
    }
}

async fn serve() -> Result<()> {
    let config = Config::from_env()?;
    let store = JobStore::open(&config.database_path).await?;
    let generator: Arc<dyn ContentGenerator> = Arc::new(GatewayGenerator::new(
        config.gateway_base_url.clone(),
        config.gateway_api_key.clone(),
        config.gateway_model.clone(),
    ));

    start_worker_schedule(&config.worker_cron, store.clone(), generator.clone()).await?;

    interfaces::web::serve(
        &config.api_addr(),
        store,
        generator,
        config.internal_token.clone(),
    )
    .await
}

/// In-process cron driving the worker. An external scheduler hitting
/// `/api/worker/run` covers deployments where this process is not the only
/// worker host; overlapping cycles are safe either way.
async fn start_worker_schedule(
    cron: &str,
    store: JobStore,
    generator: Arc<dyn ContentGenerator>,
) -> Result<()> {
    let scheduler = tokio_cron_scheduler::JobScheduler::new().await?;
    let job = tokio_cron_scheduler::Job::new_async(cron, move |_uuid, mut _l| {
        let store = store.clone();
        let generator = generator.clone();
        Box::pin(async move {
            match run_worker_cycle(&store, generator.as_ref()).await {
                Ok(report) if report.processed > 0 => {
                    info!("Worker cycle processed {} jobs", report.processed);
                }
                Ok(_) => {}
                Err(e) => error!("Worker cycle failed: {e}"),
            }
        })
    })?;
    scheduler.add(job).await?;
    scheduler.start().await?;
    info!("Worker schedule started ({cron})");
    Ok(())
}

async fn mint_token(user_id: &str, name: &str) -> Result<()> {
    // Only needs the database, not the full gateway config.
    let db_path = std::env::var("PATHFORGE_DB_PATH")
        .unwrap_or_else(|_| config::DEFAULT_DB_PATH.to_string());
    let store = JobStore::open(&db_path).await?;
    let (raw, record) = store.create_api_token(user_id, name).await?;
    println!("Token created for user {} ({}):", record.user_id, record.name);
    println!("{raw}");
    println!("Save it now; only its hash is stored.");
    Ok(())
}
