//! Camera capture synchronization.
//!
//! `CaptureSynchronizer` owns the trigger/collect handshake of the dual-light
//! camera rig:
//!
//! - A one-way readiness gate (`NOT_READY` → `READY`) set by `open_cameras()`.
//!   Every other operation fails with `CaptureError::NotReady` before that.
//! - One `ExposureState` per light condition: `Idle` → `Triggered` on
//!   `trigger()`, back to `Idle` on `collect()`.
//! - A trigger is consumable: a second trigger for the same condition before
//!   its collect is rejected (`TriggerFailed`), never queued or overwritten.
//!
//! Splitting trigger (fast shutter) from collect (slow bus read) lets both
//! light conditions fire back to back, so the two passes see nearly the same
//! fabric region.
//!
//! Lock order when nested: trigger lock, then selection lock. The readiness
//! lock is never held together with the others.

mod metadata;
mod retriever;
mod timing;

pub use metadata::{
    FixedMetadata, MetadataSource, PictureMetadata, RandomMetadata, APERTURES,
    EXPOSURE_TIME_MAX_S, EXPOSURE_TIME_MIN_S, ISOS,
};
pub use retriever::{
    write_placeholder_pictures, ExposurePair, ExposureRetriever, ImageWithMetadata,
    DEFAULT_PICTURE_EXTENSION,
};
pub use timing::{CameraTiming, SimulatedLatency};

use std::sync::{Mutex, MutexGuard};

use crate::{CaptureError, LightCondition};

/// Per-condition exposure state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExposureState {
    /// No exposure awaiting collection.
    Idle,
    /// Shutter fired, pictures waiting on the bus.
    Triggered,
}

#[derive(Debug)]
struct SelectionState {
    active: Option<LightCondition>,
    exposures: [ExposureState; 2],
}

/// Trigger/collect state machine for the camera rig.
///
/// Safe to share across threads (`Arc<CaptureSynchronizer>`), but the pending
/// invariant assumes a single capture-driving thread.
pub struct CaptureSynchronizer {
    ready: Mutex<bool>,
    trigger_lock: Mutex<()>,
    selection: Mutex<SelectionState>,
    retriever: ExposureRetriever,
    timing: CameraTiming,
}

impl CaptureSynchronizer {
    pub fn new(retriever: ExposureRetriever, timing: CameraTiming) -> Self {
        Self {
            ready: Mutex::new(false),
            trigger_lock: Mutex::new(()),
            selection: Mutex::new(SelectionState {
                active: None,
                exposures: [ExposureState::Idle; 2],
            }),
            retriever,
            timing,
        }
    }

    pub fn retriever(&self) -> &ExposureRetriever {
        &self.retriever
    }

    /// Boots the cameras. Blocks for the simulated firmware start-up.
    ///
    /// The readiness lock is held across the delay, so concurrent callers
    /// never observe a half-initialized rig. Calling again once ready is a no-op.
    pub fn open_cameras(&self) -> Result<(), CaptureError> {
        let mut ready = lock(&self.ready, "readiness")?;
        if *ready {
            log::debug!("cameras already open");
            return Ok(());
        }
        let delay = self.timing.open.wait();
        *ready = true;
        log::info!("cameras open (startup took {} ms)", delay.as_millis());
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready.lock().map(|ready| *ready).unwrap_or(false)
    }

    /// Selects the light condition used by the next `trigger()`.
    pub fn select_light_condition(&self, condition: LightCondition) -> Result<(), CaptureError> {
        self.ensure_ready()?;
        let mut selection = lock(&self.selection, "selection")?;
        selection.active = Some(condition);
        Ok(())
    }

    pub fn selected_light_condition(&self) -> Result<Option<LightCondition>, CaptureError> {
        Ok(lock(&self.selection, "selection")?.active)
    }

    /// Fires the shutter for the selected light condition.
    pub fn trigger(&self) -> Result<LightCondition, CaptureError> {
        self.ensure_ready()?;
        let _trigger = lock(&self.trigger_lock, "trigger")?;
        let mut selection = lock(&self.selection, "selection")?;
        let condition = selection.active.ok_or(CaptureError::LightConditionUnset)?;
        let slot = &mut selection.exposures[condition.index()];
        if *slot == ExposureState::Triggered {
            return Err(CaptureError::TriggerFailed(condition));
        }
        *slot = ExposureState::Triggered;
        log::debug!("triggered {} exposure", condition);
        Ok(condition)
    }

    /// Retrieves the pending exposure pair of `condition` and returns it to `Idle`.
    ///
    /// Only the targeted condition is affected. If retrieval fails the
    /// condition stays `Triggered`. The bus delay runs after the locks are
    /// released.
    pub fn collect(&self, condition: LightCondition) -> Result<ExposurePair, CaptureError> {
        self.ensure_ready()?;
        let pair = {
            let _trigger = lock(&self.trigger_lock, "trigger")?;
            let mut selection = lock(&self.selection, "selection")?;
            let slot = &mut selection.exposures[condition.index()];
            if *slot == ExposureState::Idle {
                return Err(CaptureError::PicturesNotAvailable(condition));
            }
            let pair = self.retriever.retrieve_pair(condition)?;
            *slot = ExposureState::Idle;
            pair
        };
        let delay = self.timing.collect.wait();
        log::debug!(
            "collected {} exposure pair (bus transfer {} ms)",
            condition,
            delay.as_millis()
        );
        Ok(pair)
    }

    /// Drops a pending exposure without reading it off the bus.
    ///
    /// Returns whether anything was pending.
    pub fn discard(&self, condition: LightCondition) -> Result<bool, CaptureError> {
        self.ensure_ready()?;
        let _trigger = lock(&self.trigger_lock, "trigger")?;
        let mut selection = lock(&self.selection, "selection")?;
        let slot = &mut selection.exposures[condition.index()];
        let was_pending = *slot == ExposureState::Triggered;
        *slot = ExposureState::Idle;
        if was_pending {
            log::debug!("discarded {} exposure", condition);
        }
        Ok(was_pending)
    }

    pub fn exposure_state(&self, condition: LightCondition) -> Result<ExposureState, CaptureError> {
        Ok(lock(&self.selection, "selection")?.exposures[condition.index()])
    }

    pub fn is_pending(&self, condition: LightCondition) -> Result<bool, CaptureError> {
        Ok(self.exposure_state(condition)? == ExposureState::Triggered)
    }

    fn ensure_ready(&self) -> Result<(), CaptureError> {
        if *lock(&self.ready, "readiness")? {
            Ok(())
        } else {
            Err(CaptureError::NotReady)
        }
    }
}

/// Triggers every condition back to back, then collects each in order.
///
/// If any step fails, every exposure this call triggered and has not yet
/// collected is discarded (best effort), so the next batch starts from `Idle`.
pub fn take_exposures(
    sync: &CaptureSynchronizer,
    conditions: &[LightCondition],
) -> Result<Vec<(LightCondition, ExposurePair)>, CaptureError> {
    let mut triggered = Vec::with_capacity(conditions.len());
    for &condition in conditions {
        log::info!("taking pictures for light condition {}", condition);
        let fired = sync
            .select_light_condition(condition)
            .and_then(|_| sync.trigger());
        if let Err(err) = fired {
            release_triggered(sync, &triggered);
            return Err(err);
        }
        triggered.push(condition);
    }

    let mut pairs = Vec::with_capacity(triggered.len());
    for (idx, &condition) in triggered.iter().enumerate() {
        log::info!("collecting pictures for light condition {}", condition);
        match sync.collect(condition) {
            Ok(pair) => pairs.push((condition, pair)),
            Err(err) => {
                release_triggered(sync, &triggered[idx..]);
                return Err(err);
            }
        }
    }
    Ok(pairs)
}

fn release_triggered(sync: &CaptureSynchronizer, conditions: &[LightCondition]) {
    for &condition in conditions {
        if let Err(err) = sync.discard(condition) {
            log::warn!("could not release {} exposure: {}", condition, err);
        }
    }
}

fn lock<'a, T>(
    mutex: &'a Mutex<T>,
    which: &'static str,
) -> Result<MutexGuard<'a, T>, CaptureError> {
    mutex.lock().map_err(|_| CaptureError::LockPoisoned(which))
}
