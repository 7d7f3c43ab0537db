//! # Kasse Back Office Entry Point
//!
//! ## Startup Sequence
//! 1. Initialize tracing
//! 2. Load configuration (file, environment, defaults)
//! 3. Open the store, run migrations, ensure the cash account
//! 4. Build handler state (secret file, session keys, markers)
//! 5. Serve until Ctrl+C
//!
//! ## Usage
//! ```bash
//! kasse-back-office --config kasse.toml
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use kasse_back_office::{init_tracing, serve, AppState, SessionKeys};
use kasse_db::{AdminSecret, Database, DbConfig};
use kasse_sync::KasseConfig;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Kasse Back Office");
                println!();
                println!("Usage: kasse-back-office [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Config file (default: platform config dir)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    init_tracing();
    info!("Starting Kasse back office");

    let config = KasseConfig::load(config_path).context("loading configuration")?;
    std::fs::create_dir_all(&config.store.data_dir)
        .with_context(|| format!("creating {}", config.store.data_dir.display()))?;

    let db = Database::new(DbConfig::new(config.store.database_path()))
        .await
        .context("opening the store")?;
    db.bootstrap().await?;

    let secret = AdminSecret::new(config.store.admin_secret_path());
    if secret.is_factory_default() {
        warn!("Administrator secret is the factory default; change it via POST /password");
    }

    let state = AppState::new(
        db.clone(),
        secret,
        SessionKeys::from_settings(&config.back_office),
        Arc::new(config.store.markers()),
    );

    serve(state, &config.back_office.bind_addr, async {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
        info!("Shutting down");
    })
    .await?;

    db.close().await;
    Ok(())
}
