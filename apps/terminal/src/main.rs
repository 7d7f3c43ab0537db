//! # Kasse Terminal Entry Point
//!
//! ## Startup Sequence
//! 1. Initialize tracing
//! 2. Load configuration (file, environment, defaults)
//! 3. Open the store, run migrations, ensure the cash account
//! 4. Clear an exit marker left over from a previous run
//! 5. Start the token reader (console taps or a device)
//! 6. Run the event loop until exit
//!
//! ## Usage
//! ```bash
//! kasse-terminal                      # platform config file
//! kasse-terminal --config kasse.toml
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use kasse_core::SystemClock;
use kasse_db::{Database, DbConfig};
use kasse_sync::{KasseConfig, MarkerStore, RefreshNotifier, RefreshWatcher};
use kasse_terminal::app::spawn_stdin_lines;
use kasse_terminal::identity::{spawn_device_reader, token_channel};
use kasse_terminal::{console, init_tracing, Kiosk, Terminal, Timing};
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
                println!("Kasse Terminal");
                println!();
                println!("Usage: kasse-terminal [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Config file (default: platform config dir)");
                println!("  -h, --help           Show this help message");
                println!();
                println!("{}", console::HELP);
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    init_tracing();
    info!("Starting Kasse terminal");

    let config = KasseConfig::load(config_path).context("loading configuration")?;
    std::fs::create_dir_all(&config.store.data_dir)
        .with_context(|| format!("creating {}", config.store.data_dir.display()))?;

    let db = Database::new(DbConfig::new(config.store.database_path()))
        .await
        .context("opening the store")?;
    let cash_account_id = db.bootstrap().await?;
    info!(path = %config.store.database_path().display(), cash_account_id, "Store ready");

    let markers: Arc<dyn MarkerStore> = Arc::new(config.store.markers());
    if markers.exit_requested()? {
        warn!("Clearing exit marker left from a previous run");
        markers.clear_exit()?;
    }
    let watcher = RefreshWatcher::new(markers.clone())?;
    let ledger = db.ledger(Arc::new(SystemClock), Arc::new(RefreshNotifier::new(markers)));

    let mut kiosk = Kiosk::new(&db, ledger, cash_account_id, Timing::from(&config.terminal));
    kiosk.reload().await?;

    let (feed, reader) = token_channel();
    let mut terminal = Terminal::new(
        kiosk,
        reader,
        feed.clone(),
        watcher,
        config.sync.poll_interval(),
        config.terminal.currency_symbol.clone(),
    );

    if !config.terminal.uses_console_reader() {
        let path = PathBuf::from(&config.terminal.reader);
        spawn_device_reader(path.clone(), feed).with_context(|| format!("opening reader {}", path.display()))?;
        terminal = terminal.keep_running_without_console();
    }

    let lines = spawn_stdin_lines();
    tokio::select! {
        result = terminal.run(lines, std::io::stdout()) => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    db.close().await;
    Ok(())
}
