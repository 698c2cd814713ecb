mod arch;
mod auth;
mod cli;
mod crawl;
mod error;
mod inventory;
mod models;
mod output;
mod plan;
mod reconcile;
mod registry;
#[cfg(test)]
mod testing;

use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, RunConfig};
use crawl::RegistryCrawl;
use models::UpdateRecord;
use reconcile::Reconciler;
use registry::{ClientOptions, RegistryClient};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "archsync=debug" } else { "archsync=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.to_config()?;

    let credentials = auth::resolve(cli.username.as_deref(), cli.password.as_deref(), &config.domain)
        .context("Failed to resolve registry credentials")?;
    let registry = Arc::new(RegistryClient::new(
        &config.domain,
        ClientOptions {
            plain_http: config.plain_http,
            timeout: config.timeout,
            credentials,
        },
    )?);

    let updates = audit(Arc::clone(&registry), &config)
        .await
        .with_context(|| format!("Failed to audit {}", config.domain))?;

    output::print_summary(updates.len());
    if updates.is_empty() {
        return Ok(());
    }
    if config.verbose {
        output::print_discrepancies(&updates);
    }

    output::print_plan(&plan::emit(&updates, registry.domain()));
    Ok(())
}

/// Inventory the registry, then reconcile every selected repository
async fn audit<R>(registry: Arc<R>, config: &RunConfig) -> error::Result<Vec<UpdateRecord>>
where
    R: RegistryCrawl + 'static,
{
    tracing::info!("processing architectures {:?}", config.archs.selected());
    let inventory = inventory::collect(Arc::clone(&registry), config.limits.tag_workers).await?;
    let tags: usize = inventory.values().map(Vec::len).sum();
    tracing::info!("{} repositories, {} tags", inventory.len(), tags);

    Reconciler::new(registry, config.archs.clone(), config.limits)
        .reconcile(&inventory)
        .await
}
