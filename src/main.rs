use std::{env, path::PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use rscloud_lifecycle::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Converges Auto Scaling lifecycle hooks and Location maps to a declared state.
#[derive(Parser, Debug)]
#[command(name = "rscloud-lifecycle", version, about)]
struct Args {
    /// Configuration file with the provider settings and declared resources
    #[arg(short, long, default_value = "rscloud.json")]
    file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create, update or replace declared resources and remove undeclared ones
    Apply,
    /// Re-read every stored resource from AWS
    Refresh,
    /// Delete every stored resource
    Destroy,
    /// Adopt an existing resource, e.g. `import LifecycleHook.drain web/drain`
    Import { address: String, id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rscloud_lifecycle=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::load(&args.file)
        .with_context(|| format!("Could not load {}", args.file.display()))?;
    let region = config.region(env::var(REGION_ENV).ok())?;
    info!(%region, store = %config.store.display(), "starting");

    let ctx = OperationContext {
        retry: config.retry.policy(),
        cancel: CancellationToken::new(),
    };
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling the running operation");
            cancel.cancel();
        }
    });

    let provider = AwsProvider::new(region, config.tag_policy()).await;
    let datastore = Datastore::new(FileStorage::new(&config.store));
    let mut cloud = Cloud::from_provider(&provider, datastore, ctx)
        .with_declarations(config.declarations()?);

    match args.command {
        Command::Apply => cloud
            .apply()
            .await
            .context("Could not apply cloud infrastructure"),
        Command::Refresh => cloud
            .refresh()
            .await
            .context("Could not refresh cloud infrastructure"),
        Command::Destroy => cloud
            .destroy()
            .await
            .context("Could not destroy cloud infrastructure"),
        Command::Import { address, id } => cloud
            .import(&address, &id)
            .await
            .with_context(|| format!("Could not import {} as {}", id, address)),
    }
}
