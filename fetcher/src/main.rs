//! Drive image fetcher daemon

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth;
mod config;
mod drive;
mod poll;

#[cfg(test)]
mod drive_stub;

use config::Config;

#[derive(Parser)]
#[command(name = "fetcher")]
#[command(about = "Polls Google Drive for new images and archives them", long_about = None)]
struct Cli {
    /// Run a single poll cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fetcher=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    if !config.credentials_path.exists() {
        tracing::error!(
            path = %config.credentials_path.display(),
            "credentials not found"
        );
        std::process::exit(1);
    }

    let key = auth::ServiceAccountKey::from_file(&config.credentials_path)?;
    let client = drive::DriveClient::new(key);

    if cli.once {
        poll::run_once(&client, &config).await?;
    } else {
        poll::run(&client, &config).await;
    }

    Ok(())
}
