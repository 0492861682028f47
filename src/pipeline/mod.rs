//! Worker supervision.
//!
//! Three long-running workers, each on its own thread:
//!
//! - `velocity`: `VelocitySampler` feeding raw samples into an unbounded channel
//! - `dispatch`: `DispatchLoop` draining that channel once per cycle period
//! - `delivery`: `DeliveryClient` worker behind a bounded queue
//!
//! `PipelineHandle::stop()` raises the shared `Shutdown` signal, joins the
//! producers, then drains and joins delivery.

mod dispatch;

pub use dispatch::{CycleReport, DispatchLoop};

use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::capture::CaptureSynchronizer;
use crate::conditioning::SignalConditioner;
use crate::config::WeavingConfig;
use crate::delivery::{DeliveryClient, DeliveryStats, DeliveryTransport};
use crate::displacement::DisplacementAccumulator;
use crate::velocity::{VelocitySampler, VelocitySource};

const SLEEP_SLICE: Duration = Duration::from_millis(25);

/// Cloneable stop signal shared by every worker.
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    requested: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` in short slices.
    ///
    /// Returns false as soon as stop is requested, true once the full
    /// duration has elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// Totals reported by `PipelineHandle::stop`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub samples: u64,
    pub cycles: u64,
    pub delivery: DeliveryStats,
}

pub struct Pipeline;

impl Pipeline {
    /// Opens the cameras, then spawns the sampler, dispatch and delivery workers.
    ///
    /// A camera failure here is fatal: no worker is started.
    pub fn start(
        config: &WeavingConfig,
        source: Box<dyn VelocitySource>,
        synchronizer: Arc<CaptureSynchronizer>,
        transport: Box<dyn DeliveryTransport>,
    ) -> Result<PipelineHandle> {
        log::info!("opening cameras");
        synchronizer
            .open_cameras()
            .map_err(|err| anyhow!(err))
            .context("failed to open cameras")?;
        log::info!("cameras ready");

        let sampler = VelocitySampler::new(source, config.sampling.rate_hz)?;
        let delivery = DeliveryClient::start(transport, config.delivery.queue_capacity)?;
        let dispatch = DispatchLoop::new(
            SignalConditioner::new(config.surface.smoothing_window),
            DisplacementAccumulator::new(config.displacement_threshold_cm()),
            config.sampling.rate_hz,
            synchronizer,
            delivery.handle(),
        )?;

        let shutdown = Shutdown::new();
        let (tx, rx) = mpsc::channel();

        let sampler_shutdown = shutdown.clone();
        let sampler_join = std::thread::Builder::new()
            .name("velocity".to_string())
            .spawn(move || sampler.run(tx, sampler_shutdown))?;

        let dispatch_shutdown = shutdown.clone();
        let period = config.surface.cycle_period;
        let dispatch_join = std::thread::Builder::new()
            .name("dispatch".to_string())
            .spawn(move || dispatch.run(rx, dispatch_shutdown, period))?;

        log::info!(
            "pipeline started: {} Hz sampling, {:?} cycle, threshold {:.2} cm",
            config.sampling.rate_hz,
            period,
            config.displacement_threshold_cm()
        );

        Ok(PipelineHandle {
            shutdown,
            sampler: Some(sampler_join),
            dispatch: Some(dispatch_join),
            delivery: Some(delivery),
        })
    }
}

pub struct PipelineHandle {
    shutdown: Shutdown,
    sampler: Option<JoinHandle<Result<u64>>>,
    dispatch: Option<JoinHandle<Result<u64>>>,
    delivery: Option<DeliveryClient>,
}

impl PipelineHandle {
    pub fn shutdown_signal(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Liveness probe through the delivery worker.
    pub fn ping(&self) -> Result<u16> {
        match &self.delivery {
            Some(client) => client.handle().ping(),
            None => Err(anyhow!("delivery already stopped")),
        }
    }

    pub fn delivery_stats(&self) -> DeliveryStats {
        self.delivery
            .as_ref()
            .map(|client| client.handle().stats())
            .unwrap_or_default()
    }

    /// True while both the sampler and the dispatch loop are alive.
    pub fn is_running(&self) -> bool {
        let alive = |join: &Option<JoinHandle<Result<u64>>>| {
            join.as_ref().map(|j| !j.is_finished()).unwrap_or(false)
        };
        alive(&self.sampler) && alive(&self.dispatch)
    }

    /// Stops every worker and joins them.
    ///
    /// All workers are joined even when one failed; the first failure is
    /// returned.
    pub fn stop(mut self) -> Result<PipelineSummary> {
        self.shutdown.request();
        let samples = join_worker("velocity", self.sampler.take());
        let cycles = join_worker("dispatch", self.dispatch.take());
        let delivery = match self.delivery.take() {
            Some(client) => client.shutdown(),
            None => Ok(DeliveryStats::default()),
        };
        let summary = PipelineSummary {
            samples: samples?,
            cycles: cycles?,
            delivery: delivery?,
        };
        log::info!(
            "pipeline stopped: {} samples, {} cycles, {} deliveries",
            summary.samples,
            summary.cycles,
            summary.delivery.delivered
        );
        Ok(summary)
    }
}

fn join_worker(name: &str, join: Option<JoinHandle<Result<u64>>>) -> Result<u64> {
    match join {
        Some(join) => join
            .join()
            .map_err(|_| anyhow!("{} worker panicked", name))?
            .with_context(|| format!("{} worker failed", name)),
        None => Ok(0),
    }
}
