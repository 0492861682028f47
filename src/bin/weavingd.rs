//! weavingd - weaving inspection daemon
//!
//! This daemon:
//! 1. Opens the camera rig (fatal on failure)
//! 2. Samples surface velocity at a fixed rate
//! 3. Reports surface movement to the inspection server every cycle
//! 4. Captures both light conditions each time the fabric advances past the
//!    field-of-view threshold, and reports the batch

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use weaving_inspect::capture::write_placeholder_pictures;
use weaving_inspect::delivery::STATUS_NO_CONTENT;
use weaving_inspect::logging::{self, DEFAULT_LOG_FILE};
use weaving_inspect::{
    CaptureSynchronizer, ExposureRetriever, HttpTransport, Pipeline, RandomMetadata,
    SyntheticVelocityConfig, SyntheticVelocitySensor, WeavingConfig,
};

const PLACEHOLDER_WIDTH: u32 = 640;
const PLACEHOLDER_HEIGHT: u32 = 480;

#[derive(Parser, Debug)]
#[command(author, version, about = "Weaving inspection daemon")]
struct Args {
    /// JSON or TOML config file.
    #[arg(long, env = "WEAVING_CONFIG")]
    config: Option<PathBuf>,

    /// Log file appended alongside stderr (overrides the config file).
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Seed for the synthetic velocity sensor.
    #[arg(long)]
    seed: Option<u64>,

    /// Write placeholder pictures for any missing (position, condition) key.
    #[arg(long)]
    bootstrap_pictures: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if let Some(path) = &args.config {
        std::env::set_var("WEAVING_CONFIG", path);
    }
    let cfg = WeavingConfig::load()?;

    let log_file = args
        .log_file
        .clone()
        .or_else(|| cfg.log_file.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE));
    logging::init(Some(&log_file))?;
    log::info!("weavingd {} starting", env!("CARGO_PKG_VERSION"));

    let retriever = ExposureRetriever::new(
        cfg.pictures.dir.clone(),
        cfg.pictures.extension.clone(),
        Arc::new(RandomMetadata::new()),
    );
    let missing = retriever.missing_pictures();
    if !missing.is_empty() {
        if args.bootstrap_pictures {
            let written =
                write_placeholder_pictures(&retriever, PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT)?;
            log::info!(
                "wrote {} placeholder pictures to {}",
                written.len(),
                retriever.dir().display()
            );
        } else {
            for path in &missing {
                log::warn!("picture missing: {}", path.display());
            }
            log::warn!("captures will fail until every picture exists (see --bootstrap-pictures)");
        }
    }

    let synchronizer = Arc::new(CaptureSynchronizer::new(retriever, cfg.cameras));
    let source = SyntheticVelocitySensor::new(SyntheticVelocityConfig {
        seed: args.seed,
        ..cfg.velocity_config()
    });
    let transport = HttpTransport::new(&cfg.server_url, cfg.delivery.timeout)?;

    let handle = Pipeline::start(&cfg, Box::new(source), synchronizer, Box::new(transport))?;
    match handle.ping() {
        Ok(STATUS_NO_CONTENT) => log::info!("inspection server at {} is up", cfg.server_url),
        Ok(status) => log::warn!("unexpected ping response status code: {}", status),
        Err(err) => log::warn!("inspection server unreachable: {}", err),
    }

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("weavingd running. waiting for shutdown signal (Ctrl-C)...");
    loop {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                log::info!("shutdown signal received, stopping pipeline...");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                if !handle.is_running() {
                    log::error!("a pipeline worker exited, shutting down");
                    break;
                }
            }
        }
    }

    let summary = handle.stop()?;
    log::info!(
        "delivered {} reports ({} rejected, {} failed, {} dropped)",
        summary.delivery.delivered,
        summary.delivery.rejected,
        summary.delivery.failed,
        summary.delivery.dropped
    );
    Ok(())
}
