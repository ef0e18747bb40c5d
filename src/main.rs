pub mod config;
pub mod controller;

use crate::config::Config;
use crate::controller::WatcherHandle;
use color_eyre::{eyre::eyre, Result};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = Config::config_path();
    let loaded = Config::load(&config_path)
        .await
        .map_err(|e| eyre!("Failed to load configuration: {}", e))?;
    let config = loaded.clone().unwrap_or_default();

    let level = config
        .log_level()
        .map_err(|e| eyre!("Invalid configuration: {}", e))?;
    setup_logging_env(level);

    match loaded {
        Some(_) => info!("Loaded configuration from {}", config_path.display()),
        None => {
            info!("No configuration at {}, using defaults", config_path.display());
            if let Err(e) = config.save(&config_path).await {
                warn!("Could not write default configuration: {}", e);
            }
        }
    }
    debug!("Configuration: {:?}", config);

    let handle = WatcherHandle::spawn(config.watcher_settings())
        .map_err(|e| eyre!("Failed to spawn device watcher: {}", e))?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.map_err(|e| eyre!("Failed to listen for Ctrl-C: {}", e))?;
            info!("Received Ctrl-C, shutting down");
            Ok(())
        }
        e = handle.stopped() => {
            error!("Device watcher stopped: {}", e);
            Err(eyre!("Device watcher stopped: {}", e))
        }
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
