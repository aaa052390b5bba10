use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::LoadingConfig;
use crate::models::ContentId;
use crate::utils::TrackerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorKind {
    /// Retries exhausted
    Load,
    /// Global load deadline elapsed
    Timeout,
    /// Runtime fault reported by the player after loading
    Playback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Loaded,
    Error { kind: LoadErrorKind, message: String },
}

impl LoadState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadState::Loaded)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LoadState::Error { .. })
    }
}

/// One load attempt sequence for a content id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadAttempt {
    pub content_id: ContentId,
    pub generation: u64,
    pub retry_count: u32,
}

#[derive(Debug)]
pub enum RetryDecision {
    /// The failure belongs to a superseded generation
    Stale,
    Retry { attempt: LoadAttempt, delay: Duration },
    Exhausted(TrackerError),
}

#[derive(Debug, Default)]
struct PendingTasks {
    load: Option<JoinHandle<()>>,
    retry: Option<JoinHandle<()>>,
    deadline: Option<JoinHandle<()>>,
    seek: Option<JoinHandle<()>>,
}

impl PendingTasks {
    fn abort_all(&mut self) {
        for handle in [
            self.load.take(),
            self.retry.take(),
            self.deadline.take(),
            self.seek.take(),
        ]
        .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }
}

/// Governs swapping the active content id: generations, bounded exponential
/// backoff (1s, 2s, 4s by default) and the global load deadline.
///
/// The manager decides; the session owns the clock and spawns the tasks whose
/// handles are parked here so they can be cancelled with their generation.
#[derive(Debug)]
pub struct LoadRetryManager {
    content_id: Option<ContentId>,
    generation: u64,
    retry_count: u32,
    max_retries: u32,
    base_delay: Duration,
    load_timeout: Duration,
    state: LoadState,
    tasks: PendingTasks,
}

impl LoadRetryManager {
    pub fn new(config: &LoadingConfig) -> Self {
        Self {
            content_id: None,
            generation: 0,
            retry_count: 0,
            max_retries: config.max_retries,
            base_delay: config.base_delay(),
            load_timeout: config.load_timeout(),
            state: LoadState::Idle,
            tasks: PendingTasks::default(),
        }
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn content_id(&self) -> Option<&ContentId> {
        self.content_id.as_ref()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.content_id.is_some()
    }

    /// Starts a new generation for `content_id`. Everything pending for the
    /// previous generation is cancelled.
    pub fn begin(&mut self, content_id: ContentId) -> LoadAttempt {
        self.tasks.abort_all();
        self.generation += 1;
        self.retry_count = 0;
        self.content_id = Some(content_id.clone());
        self.state = LoadState::Loading;
        debug!("Load generation {} for {}", self.generation, content_id);

        LoadAttempt {
            content_id,
            generation: self.generation,
            retry_count: 0,
        }
    }

    pub fn on_success(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) || self.state != LoadState::Loading {
            return false;
        }
        self.retry_count = 0;
        self.state = LoadState::Loaded;
        if let Some(deadline) = self.tasks.deadline.take() {
            deadline.abort();
        }
        true
    }

    pub fn on_failure(&mut self, generation: u64, message: &str) -> RetryDecision {
        if !self.is_current(generation) || self.state != LoadState::Loading {
            return RetryDecision::Stale;
        }
        let Some(content_id) = self.content_id.clone() else {
            return RetryDecision::Stale;
        };

        if self.retry_count >= self.max_retries {
            let attempts = self.retry_count + 1;
            self.state = LoadState::Error {
                kind: LoadErrorKind::Load,
                message: "Failed to load video after multiple attempts. Please try again later."
                    .to_string(),
            };
            self.tasks.abort_all();
            return RetryDecision::Exhausted(TrackerError::Load {
                content_id,
                attempts,
                message: message.to_string(),
            });
        }

        let delay = self.base_delay * 2_u32.saturating_pow(self.retry_count);
        self.retry_count += 1;
        info!("Scheduling load retry #{} after {:?}", self.retry_count, delay);

        RetryDecision::Retry {
            attempt: LoadAttempt {
                content_id,
                generation,
                retry_count: self.retry_count,
            },
            delay,
        }
    }

    /// The attempt to re-issue when a retry timer fires, or `None` if the
    /// timer belongs to a superseded generation.
    pub fn retry_due(&mut self, generation: u64) -> Option<LoadAttempt> {
        if !self.is_current(generation) || self.state != LoadState::Loading {
            return None;
        }
        self.tasks.retry = None;
        Some(LoadAttempt {
            content_id: self.content_id.clone()?,
            generation,
            retry_count: self.retry_count,
        })
    }

    pub fn on_deadline(&mut self, generation: u64) -> Option<TrackerError> {
        if !self.is_current(generation) || self.state != LoadState::Loading {
            return None;
        }
        let content_id = self.content_id.clone()?;
        self.state = LoadState::Error {
            kind: LoadErrorKind::Timeout,
            message: "The video is taking too long to load.".to_string(),
        };
        self.tasks.deadline = None;
        self.tasks.abort_all();
        Some(TrackerError::Timeout {
            content_id,
            seconds: self.load_timeout.as_secs(),
        })
    }

    /// A playback fault only surfaces once content is loaded; while loading,
    /// the failing load call drives the retry path instead.
    pub fn on_playback_error(&mut self, name: &str, message: &str) -> Option<TrackerError> {
        if !self.state.is_loaded() {
            return None;
        }
        self.state = LoadState::Error {
            kind: LoadErrorKind::Playback,
            message: "Playback failed. Please reload the lesson.".to_string(),
        };
        Some(TrackerError::Playback {
            name: name.to_string(),
            message: message.to_string(),
        })
    }

    pub fn load_timeout(&self) -> Duration {
        self.load_timeout
    }

    pub fn set_load_task(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.tasks.load.replace(handle)
            && !previous.is_finished()
        {
            debug!("Replacing an unfinished load task");
        }
    }

    pub fn set_retry_timer(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.tasks.retry.replace(handle) {
            previous.abort();
        }
    }

    pub fn set_deadline_timer(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.tasks.deadline.replace(handle) {
            previous.abort();
        }
    }

    /// Parks the resume seek so a new lesson or teardown abandons it.
    pub fn set_seek_task(&mut self, handle: JoinHandle<()>) {
        if let Some(previous) = self.tasks.seek.replace(handle) {
            previous.abort();
        }
    }

    /// Teardown: invalidates the current generation and cancels its timers.
    pub fn cancel(&mut self) {
        self.tasks.abort_all();
        self.generation += 1;
        self.content_id = None;
        self.retry_count = 0;
        self.state = LoadState::Idle;
    }
}

impl Drop for LoadRetryManager {
    fn drop(&mut self) {
        self.tasks.abort_all();
    }
}
