use std::io::BufReader;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use tracing_subscriber::EnvFilter;

use rollcall_core::{AttendanceStateMachine, IdentityStore, MatchEngine};
use rollcall_io::{scan_roster, CsvLedger, JsonlSource, SidecarExtractor};

mod config;
mod dbus_interface;
mod pipeline;

use pipeline::{spawn_pipeline, LogNotifier, PipelineHandle};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");
    let config = config::Config::from_env();

    let store = Arc::new(IdentityStore::new());
    std::fs::create_dir_all(&config.roster_dir)
        .with_context(|| format!("creating roster dir {}", config.roster_dir.display()))?;
    scan_roster(&config.roster_dir, &SidecarExtractor, &store)
        .with_context(|| format!("scanning roster dir {}", config.roster_dir.display()))?;

    if let Some(parent) = config.ledger_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating ledger dir {}", parent.display()))?;
    }

    let engine = MatchEngine::new(Arc::clone(&store), config.match_threshold);
    let machine = AttendanceStateMachine::new(Duration::seconds(config.cooldown_secs));
    let ledger = CsvLedger::new(&config.ledger_path);

    let handle: PipelineHandle = match &config.frame_feed {
        Some(path) => {
            tracing::info!(feed = %path.display(), "reading frame feed from file");
            spawn_pipeline(
                JsonlSource::open(path)?,
                Arc::clone(&store),
                engine,
                machine,
                ledger,
                Box::new(LogNotifier),
                config.register_frame_budget,
            )
        }
        None => {
            tracing::info!("reading frame feed from stdin");
            spawn_pipeline(
                JsonlSource::new(BufReader::new(std::io::stdin())),
                Arc::clone(&store),
                engine,
                machine,
                ledger,
                Box::new(LogNotifier),
                config.register_frame_budget,
            )
        }
    };

    let _conn = zbus::connection::Builder::session()?
        .name("org.rollcall.Rollcall1")?
        .serve_at(
            "/org/rollcall/Rollcall1",
            dbus_interface::RollcallService::new(handle, Arc::clone(&store)),
        )?
        .build()
        .await
        .context("registering on the session bus")?;

    tracing::info!("rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
