//! collector_stub - loopback inspection server for local runs
//!
//! Answers `POST /surface_movement` and `POST /pictures_batch` with 201 and
//! `GET /ping` with 204, logging every request it accepts.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::sync::mpsc;

use weaving_inspect::CollectorServer;

#[derive(Parser, Debug)]
#[command(author, version, about = "Loopback stand-in for the inspection server")]
struct Args {
    /// Listen address.
    #[arg(long, env = "WEAVING_COLLECTOR_ADDR", default_value = "127.0.0.1:5000")]
    addr: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let handle = CollectorServer::new(args.addr).spawn()?;
    log::info!("collector_stub serving {}", handle.url());

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("collector_stub waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    let received = handle.received().len();
    log::info!("shutdown signal received after {} requests, stopping...", received);
    handle.stop()?;
    Ok(())
}
