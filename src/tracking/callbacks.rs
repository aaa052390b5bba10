use std::sync::{Arc, RwLock};
use tracing::warn;

use super::load_retry::LoadState;
use crate::models::ProgressRecord;

type ProgressUpdateFn = dyn Fn(u8, f64, f64, u64) + Send + Sync;
type DurationFn = dyn Fn(f64) + Send + Sync;
type CompleteFn = dyn Fn() + Send + Sync;
type EligibilityFn = dyn Fn(bool, u8) + Send + Sync;
type CompletionUpdateFn = dyn Fn(&ProgressRecord) + Send + Sync;
type LoadStateFn = dyn Fn(&LoadState) + Send + Sync;

#[derive(Default)]
struct Callbacks {
    on_progress_update: Option<Arc<ProgressUpdateFn>>,
    on_duration_received: Option<Arc<DurationFn>>,
    on_complete: Option<Arc<CompleteFn>>,
    on_completion_eligibility_change: Option<Arc<EligibilityFn>>,
    on_completion_update: Option<Arc<CompletionUpdateFn>>,
    on_load_state_change: Option<Arc<LoadStateFn>>,
}

/// Host callback registry: one current subscriber per event type.
///
/// Clones share the same registry, so the host can swap a callback at any
/// time and the session always invokes the latest one.
#[derive(Clone, Default)]
pub struct HostCallbacks {
    inner: Arc<RwLock<Callbacks>>,
}

impl std::fmt::Debug for HostCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostCallbacks")
            .field("inner", &"<Arc<RwLock<...>>>")
            .finish()
    }
}

impl HostCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_on_progress_update(&self, callback: impl Fn(u8, f64, f64, u64) + Send + Sync + 'static) {
        self.update(|c| c.on_progress_update = Some(Arc::new(callback)));
    }

    pub fn set_on_duration_received(&self, callback: impl Fn(f64) + Send + Sync + 'static) {
        self.update(|c| c.on_duration_received = Some(Arc::new(callback)));
    }

    pub fn set_on_complete(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.update(|c| c.on_complete = Some(Arc::new(callback)));
    }

    pub fn set_on_completion_eligibility_change(
        &self,
        callback: impl Fn(bool, u8) + Send + Sync + 'static,
    ) {
        self.update(|c| c.on_completion_eligibility_change = Some(Arc::new(callback)));
    }

    pub fn set_on_completion_update(
        &self,
        callback: impl Fn(&ProgressRecord) + Send + Sync + 'static,
    ) {
        self.update(|c| c.on_completion_update = Some(Arc::new(callback)));
    }

    pub fn set_on_load_state_change(&self, callback: impl Fn(&LoadState) + Send + Sync + 'static) {
        self.update(|c| c.on_load_state_change = Some(Arc::new(callback)));
    }

    fn update(&self, apply: impl FnOnce(&mut Callbacks)) {
        match self.inner.write() {
            Ok(mut callbacks) => apply(&mut callbacks),
            Err(_) => warn!("Callback registry poisoned, registration dropped"),
        }
    }

    // The Arc is cloned out before calling so a callback may re-register itself.
    fn current<T: ?Sized>(&self, pick: impl FnOnce(&Callbacks) -> Option<Arc<T>>) -> Option<Arc<T>> {
        self.inner.read().ok().and_then(|callbacks| pick(&callbacks))
    }

    pub(crate) fn progress_update(&self, percent: u8, position: f64, duration: f64, time_spent: u64) {
        if let Some(callback) = self.current(|c| c.on_progress_update.clone()) {
            callback(percent, position, duration, time_spent);
        }
    }

    pub(crate) fn duration_received(&self, duration: f64) {
        if let Some(callback) = self.current(|c| c.on_duration_received.clone()) {
            callback(duration);
        }
    }

    pub(crate) fn complete(&self) {
        if let Some(callback) = self.current(|c| c.on_complete.clone()) {
            callback();
        }
    }

    pub(crate) fn completion_eligibility_change(&self, can_complete: bool, watched_percent: u8) {
        if let Some(callback) = self.current(|c| c.on_completion_eligibility_change.clone()) {
            callback(can_complete, watched_percent);
        }
    }

    pub(crate) fn completion_update(&self, record: &ProgressRecord) {
        if let Some(callback) = self.current(|c| c.on_completion_update.clone()) {
            callback(record);
        }
    }

    pub(crate) fn load_state_change(&self, state: &LoadState) {
        if let Some(callback) = self.current(|c| c.on_load_state_change.clone()) {
            callback(state);
        }
    }
}
