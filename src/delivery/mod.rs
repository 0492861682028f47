//! Outbound delivery to the inspection server.
//!
//! `DeliveryClient` owns a single worker thread fed by a bounded queue, so
//! network latency never paces the dispatch loop:
//!
//! - `POST surface_movement` with `{velocity, displacement}` every cycle
//! - `POST pictures_batch` with one entry per light condition after a capture
//! - `GET ping` liveness probe
//!
//! Success is 201 (204 for ping). Any other status or a transport error is
//! logged as a warning and counted. Requests are never retried, and a full
//! queue drops the request instead of blocking the caller.

mod http;

pub use http::HttpTransport;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::LightCondition;

pub const SURFACE_MOVEMENT_PATH: &str = "surface_movement";
pub const PICTURES_BATCH_PATH: &str = "pictures_batch";
pub const PING_PATH: &str = "ping";

pub const STATUS_CREATED: u16 = 201;
pub const STATUS_NO_CONTENT: u16 = 204;

const PING_TIMEOUT: Duration = Duration::from_secs(10);

// -------------------- Payloads --------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct SurfaceMovement {
    /// cm/min
    pub velocity: f64,
    /// cm
    pub displacement: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LightReport {
    pub light: LightCondition,
    pub surface_velocity: f64,
    pub surface_displacement: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PicturesBatch {
    pub lights: Vec<LightReport>,
}

impl PicturesBatch {
    /// One report per captured condition, all tagged with the triggering surface figures.
    pub fn new(
        conditions: impl IntoIterator<Item = LightCondition>,
        surface: SurfaceMovement,
    ) -> Self {
        let lights = conditions
            .into_iter()
            .map(|light| LightReport {
                light,
                surface_velocity: surface.velocity,
                surface_displacement: surface.displacement,
            })
            .collect();
        Self { lights }
    }
}

// -------------------- Transport --------------------

/// Wire transport used by the delivery worker.
pub trait DeliveryTransport: Send {
    /// POST a JSON body to `path` (relative to the server root); returns the status code.
    ///
    /// Non-success statuses are `Ok`; only transport failures are `Err`.
    fn post_json(&mut self, path: &str, body: &[u8]) -> Result<u16>;

    fn ping(&mut self) -> Result<u16>;
}

// -------------------- Client --------------------

enum DeliveryRequest {
    Surface(SurfaceMovement),
    Pictures(PicturesBatch),
    Ping(mpsc::Sender<Result<u16>>),
}

#[derive(Debug, Default)]
struct DeliveryCounters {
    delivered: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl DeliveryCounters {
    fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of delivery outcomes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Accepted with the expected status.
    pub delivered: u64,
    /// Answered with an unexpected status.
    pub rejected: u64,
    /// Transport or encoding failure.
    pub failed: u64,
    /// Not sent because the queue was full or closed.
    pub dropped: u64,
}

/// Cloneable sender side of the delivery queue.
#[derive(Clone)]
pub struct DeliveryHandle {
    tx: SyncSender<DeliveryRequest>,
    counters: Arc<DeliveryCounters>,
}

impl DeliveryHandle {
    /// Queues a surface movement report. Returns false when it was dropped.
    pub fn surface_movement(&self, body: SurfaceMovement) -> bool {
        self.enqueue(DeliveryRequest::Surface(body), SURFACE_MOVEMENT_PATH)
    }

    /// Queues a pictures batch report. Returns false when it was dropped.
    pub fn pictures_batch(&self, body: PicturesBatch) -> bool {
        self.enqueue(DeliveryRequest::Pictures(body), PICTURES_BATCH_PATH)
    }

    /// Liveness probe through the worker; waits for the answer.
    ///
    /// Fails at once when the queue is full instead of waiting behind it.
    pub fn ping(&self) -> Result<u16> {
        let (reply_tx, reply_rx) = mpsc::channel();
        match self.tx.try_send(DeliveryRequest::Ping(reply_tx)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Err(anyhow!("delivery queue full, ping not sent")),
            Err(TrySendError::Disconnected(_)) => return Err(anyhow!("delivery worker stopped")),
        }
        reply_rx
            .recv_timeout(PING_TIMEOUT)
            .map_err(|_| anyhow!("ping timed out"))?
    }

    pub fn stats(&self) -> DeliveryStats {
        self.counters.snapshot()
    }

    fn enqueue(&self, request: DeliveryRequest, path: &str) -> bool {
        match self.tx.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!("delivery queue full, dropping {} report", path);
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("delivery worker stopped, dropping {} report", path);
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

/// Owner of the delivery worker thread.
pub struct DeliveryClient {
    handle: DeliveryHandle,
    join: Option<JoinHandle<()>>,
}

impl DeliveryClient {
    /// Spawns the worker with a queue of `capacity` pending requests.
    pub fn start(transport: Box<dyn DeliveryTransport>, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(anyhow!("delivery queue capacity must be > 0"));
        }
        let (tx, rx) = mpsc::sync_channel(capacity);
        let counters = Arc::new(DeliveryCounters::default());
        let worker_counters = counters.clone();
        let join = std::thread::Builder::new()
            .name("delivery".to_string())
            .spawn(move || run_delivery(transport, rx, &worker_counters))?;
        Ok(Self {
            handle: DeliveryHandle { tx, counters },
            join: Some(join),
        })
    }

    pub fn handle(&self) -> DeliveryHandle {
        self.handle.clone()
    }

    /// Drains queued requests and joins the worker.
    ///
    /// Returns once every `DeliveryHandle` clone has been dropped.
    pub fn shutdown(mut self) -> Result<DeliveryStats> {
        let counters = self.handle.counters.clone();
        drop(self.handle);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("delivery worker thread panicked"))?;
        }
        Ok(counters.snapshot())
    }
}

fn run_delivery(
    mut transport: Box<dyn DeliveryTransport>,
    rx: Receiver<DeliveryRequest>,
    counters: &DeliveryCounters,
) {
    log::debug!("delivery worker starting");
    for request in rx {
        match request {
            DeliveryRequest::Surface(body) => {
                deliver(transport.as_mut(), SURFACE_MOVEMENT_PATH, &body, counters)
            }
            DeliveryRequest::Pictures(body) => {
                deliver(transport.as_mut(), PICTURES_BATCH_PATH, &body, counters)
            }
            DeliveryRequest::Ping(reply) => {
                let _ = reply.send(transport.ping());
            }
        }
    }
    log::debug!("delivery worker stopped");
}

fn deliver<T: Serialize>(
    transport: &mut dyn DeliveryTransport,
    path: &str,
    body: &T,
    counters: &DeliveryCounters,
) {
    let payload = match serde_json::to_vec(body) {
        Ok(payload) => payload,
        Err(err) => {
            log::error!("failed to encode {} report: {}", path, err);
            counters.failed.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };
    match transport.post_json(path, &payload) {
        Ok(STATUS_CREATED) => {
            log::info!("{} response status code: {}", path, STATUS_CREATED);
            counters.delivered.fetch_add(1, Ordering::Relaxed);
        }
        Ok(status) => {
            log::warn!("unexpected {} response status code: {}", path, status);
            counters.rejected.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            log::warn!("{} delivery failed: {}", path, err);
            counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}
