use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;
use tracing_subscriber::filter::LevelFilter;

use pakio_engine::{CacheProxy, ProxyConfig};

mod cli;
mod error;
mod server;

use cli::CliArgs;
use error::AppError;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        // Log the full error for debugging
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();

    // Setup logging; verbosity follows the 0..4 scale
    let log_level = match args.log_level {
        0 => LevelFilter::OFF,
        1 => LevelFilter::ERROR,
        2 => LevelFilter::WARN,
        3 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_ansi(!args.no_color)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    let md_files = if args.md_files.is_empty() {
        vec!["repomd.xml".to_owned()]
    } else {
        args.md_files.clone()
    };

    let mut builder = ProxyConfig::builder()
        .with_cache_dir(&args.cache_dir)
        .with_metadata_files(md_files)
        .with_metadata_keep(Duration::from_secs(args.md_keep * 60))
        .with_wait_timeout(Duration::from_secs(args.wait_timeout))
        .with_timeout(Duration::from_secs(args.timeout))
        .with_connect_timeout(Duration::from_secs(args.connect_timeout));
    if let Some(user_agent) = &args.user_agent {
        builder = builder.with_user_agent(user_agent.clone());
    }
    let config = builder.build();

    tokio::fs::create_dir_all(&config.cache_dir).await?;

    info!(
        cache_dir = %config.cache_dir.display(),
        metadata_files = ?config.metadata_files,
        metadata_keep_min = config.metadata_keep.as_secs() / 60,
        "starting package cache proxy"
    );

    let proxy = Arc::new(CacheProxy::new(&config)?);
    server::run(args.listen, proxy).await?;
    Ok(())
}
