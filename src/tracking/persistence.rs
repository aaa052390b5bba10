use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::watch_state::WatchState;
use crate::backends::{BeaconStatus, ProgressStore};
use crate::models::{LessonContext, ProgressRecord};
use crate::utils::TrackerError;

/// What the guaranteed flush did.
#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    /// A flush already ran for this teardown
    AlreadyFlushed,
    /// Nothing to send: the duration was never known
    Skipped,
    /// Handed to the store's beacon transport
    Delivered(ProgressRecord),
    /// Beacon unavailable; an ordinary save was started instead
    FellBack(ProgressRecord),
}

impl FlushOutcome {
    pub fn record(&self) -> Option<&ProgressRecord> {
        match self {
            FlushOutcome::Delivered(record) | FlushOutcome::FellBack(record) => Some(record),
            _ => None,
        }
    }
}

/// Decides when progress is written and how. Throttled saves are
/// fire-and-forget; the final flush goes through the beacon transport.
#[derive(Debug)]
pub struct PersistenceManager {
    store: Arc<dyn ProgressStore>,
    flushed: bool,
    inflight: Vec<JoinHandle<()>>,
}

impl PersistenceManager {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self {
            store,
            flushed: false,
            inflight: Vec::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ProgressStore> {
        &self.store
    }

    pub fn has_flushed(&self) -> bool {
        self.flushed
    }

    /// Returns the record to save if the floored coverage percent strictly
    /// increased since the last save.
    pub fn throttled_update(
        &self,
        state: &mut WatchState,
        context: &LessonContext,
    ) -> Option<ProgressRecord> {
        state.duration()?;
        if !state.advance_saved_percent() {
            return None;
        }
        state.record(context)
    }

    /// Starts a save without waiting for it. Failures are logged only; the
    /// next increase or the final flush carries the newer state anyway.
    pub fn dispatch_update(&mut self, record: ProgressRecord) {
        self.inflight.retain(|handle| !handle.is_finished());

        let store = self.store.clone();
        let handle = tokio::spawn(async move {
            debug!(
                "Saving progress {}% for lesson {}",
                record.progress_percentage, record.lesson_id
            );
            if let Err(e) = store.save_progress(&record).await {
                let err = TrackerError::persistence(format!("{:#}", e));
                warn!("{}", err);
            }
        });
        self.inflight.push(handle);
    }

    /// Sends the latest record through the beacon transport, at most once
    /// until [`rearm`](Self::rearm) is called.
    ///
    /// Every flush aborts the throttled saves still in flight, including one
    /// caused only by the page losing visibility. An aborted save is never
    /// retried; the flushed record carries a state at least as new.
    pub fn final_flush(&mut self, state: &WatchState, context: &LessonContext) -> FlushOutcome {
        if self.flushed {
            return FlushOutcome::AlreadyFlushed;
        }
        self.flushed = true;

        let Some(record) = state.record(context) else {
            debug!("Duration never known for lesson {}, nothing to flush", context.lesson_id);
            return FlushOutcome::Skipped;
        };

        // Superseded by the record below.
        for handle in self.inflight.drain(..) {
            handle.abort();
        }

        match self.store.send_beacon(&record) {
            BeaconStatus::Queued => {
                info!(
                    "Flushed progress {}% ({}) for lesson {}",
                    record.progress_percentage,
                    if record.status.is_completed() { "completed" } else { "in progress" },
                    record.lesson_id
                );
                FlushOutcome::Delivered(record)
            }
            status => {
                warn!("Beacon {:?} for lesson {}, falling back to a save", status, record.lesson_id);
                let store = self.store.clone();
                let payload = record.clone();
                // Detached: must finish even if the session goes away.
                tokio::spawn(async move {
                    if let Err(e) = store.save_progress(&payload).await {
                        error!("{}", TrackerError::persistence(format!("{:#}", e)));
                    }
                });
                FlushOutcome::FellBack(record)
            }
        }
    }

    /// Allows another final flush, e.g. after the page becomes visible again.
    pub fn rearm(&mut self) {
        self.flushed = false;
    }
}

impl Drop for PersistenceManager {
    fn drop(&mut self) {
        // Throttled saves are best effort; anything important went out with
        // the final flush.
        self.inflight.retain(|handle| !handle.is_finished());
        if !self.inflight.is_empty() {
            debug!("{} progress saves still in flight at shutdown", self.inflight.len());
        }
    }
}
