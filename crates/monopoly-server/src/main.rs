//! Monopoly multiplayer game server.

use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod actor;
mod banter;
mod config;
mod protocol;
mod server;
mod session;
mod store;

use actor::GameDirectory;
use banter::ScriptedCompletion;
use config::ServerConfig;
use store::{FileStore, MemoryStore, StateStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    info!("Starting Monopoly server...");

    let store: Arc<dyn StateStore> = match &config.data_dir {
        Some(dir) => {
            info!("Storing games under {}", dir.display());
            Arc::new(FileStore::open(dir.clone()).await?)
        }
        None => {
            info!("No DATA_DIR set, games are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let directory = Arc::new(GameDirectory::new(
        store,
        Arc::new(ScriptedCompletion),
        config.clone(),
    ));

    server::run_server(config.addr, directory).await
}
