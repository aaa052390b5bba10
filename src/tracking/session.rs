use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};
use uuid::Uuid;

use super::callbacks::HostCallbacks;
use super::interval_tracker::Interval;
use super::load_retry::{LoadAttempt, LoadRetryManager, LoadState, RetryDecision};
use super::persistence::{FlushOutcome, PersistenceManager};
use super::watch_state::WatchState;
use crate::backends::ProgressStore;
use crate::config::Config;
use crate::models::{LessonContext, SavedProgress};
use crate::player::{PlayerAdapter, PlayerEvent};
use crate::utils::TrackerError;

/// Inputs processed by the session loop. The first group comes from the host
/// through [`SessionHandle`]; the rest are completions of work the session
/// spawned itself, tagged with the load generation they belong to.
#[derive(Debug)]
enum SessionInput {
    OpenLesson(LessonContext),
    Player(PlayerEvent),
    VisibilityChanged {
        visible: bool,
    },
    PageHide,
    Stop {
        respond_to: oneshot::Sender<()>,
    },
    Snapshot {
        respond_to: oneshot::Sender<Option<SessionSnapshot>>,
    },
    ProgressFetched {
        generation: u64,
        result: Result<Option<SavedProgress>>,
    },
    LoadFinished {
        generation: u64,
        result: Result<Option<f64>>,
    },
    RetryDue {
        generation: u64,
    },
    LoadDeadline {
        generation: u64,
    },
    ResumeFinished {
        generation: u64,
        position: f64,
        result: Result<()>,
    },
}

/// Point-in-time view of the active lesson, for hosts and diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub lesson: LessonContext,
    pub load_state: LoadState,
    pub duration: Option<f64>,
    pub last_position: f64,
    pub coverage_percent: u8,
    pub position_percent: u8,
    pub can_complete: bool,
    pub time_spent: u64,
    pub last_saved_percent: u8,
    pub playback_rate: f64,
    pub watched: Vec<Interval>,
}

#[derive(Debug)]
struct ActiveLesson {
    context: LessonContext,
    state: WatchState,
    resume_position: Option<f64>,
    progress_fetched: bool,
}

/// Owns the [`WatchState`] of the lesson being viewed and drives every
/// component from a single loop. Nothing else mutates the state.
pub struct WatchSession {
    id: Uuid,
    config: Config,
    player: Arc<dyn PlayerAdapter>,
    store: Arc<dyn ProgressStore>,
    callbacks: HostCallbacks,
    sender: mpsc::WeakUnboundedSender<SessionInput>,
    receiver: mpsc::UnboundedReceiver<SessionInput>,
    lesson: Option<ActiveLesson>,
    loader: LoadRetryManager,
    persistence: PersistenceManager,
}

impl WatchSession {
    pub fn new(
        config: &Config,
        player: Arc<dyn PlayerAdapter>,
        store: Arc<dyn ProgressStore>,
        callbacks: HostCallbacks,
    ) -> (SessionHandle, WatchSession) {
        let (sender, receiver) = mpsc::unbounded_channel();

        let session = WatchSession {
            id: Uuid::new_v4(),
            config: config.clone(),
            player,
            store: store.clone(),
            callbacks: callbacks.clone(),
            sender: sender.downgrade(),
            receiver,
            lesson: None,
            loader: LoadRetryManager::new(&config.loading),
            persistence: PersistenceManager::new(store),
        };
        let handle = SessionHandle { sender, callbacks };

        (handle, session)
    }

    /// Creates a session and runs it on the current tokio runtime.
    pub fn spawn(
        config: &Config,
        player: Arc<dyn PlayerAdapter>,
        store: Arc<dyn ProgressStore>,
        callbacks: HostCallbacks,
    ) -> SessionHandle {
        let (handle, session) = Self::new(config, player, store, callbacks);
        tokio::spawn(session.run());
        handle
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Processes inputs until the host stops the session or drops every
    /// handle. Either way the final flush runs exactly once.
    pub async fn run(mut self) {
        let span = info_span!("watch_session", session_id = %self.id);
        async move {
            debug!("Watch session started");

            while let Some(input) = self.receiver.recv().await {
                match input {
                    SessionInput::OpenLesson(context) => self.open_lesson(context),
                    SessionInput::Player(event) => self.handle_player_event(event),
                    SessionInput::VisibilityChanged { visible: false } => {
                        self.final_flush("visibility lost");
                    }
                    SessionInput::VisibilityChanged { visible: true } => {
                        trace!("Visible again, re-arming final flush");
                        self.persistence.rearm();
                    }
                    SessionInput::PageHide => self.final_flush("page hide"),
                    SessionInput::Stop { respond_to } => {
                        self.teardown("stop requested").await;
                        let _ = respond_to.send(());
                        return;
                    }
                    SessionInput::Snapshot { respond_to } => {
                        let _ = respond_to.send(self.snapshot());
                    }
                    SessionInput::ProgressFetched { generation, result } => {
                        self.on_progress_fetched(generation, result);
                    }
                    SessionInput::LoadFinished { generation, result } => {
                        self.on_load_finished(generation, result);
                    }
                    SessionInput::RetryDue { generation } => {
                        if let Some(attempt) = self.loader.retry_due(generation) {
                            self.spawn_load(attempt, false);
                        }
                    }
                    SessionInput::LoadDeadline { generation } => {
                        if let Some(err) = self.loader.on_deadline(generation) {
                            report_load_error(&err);
                            self.publish_load_state();
                        }
                    }
                    SessionInput::ResumeFinished {
                        generation,
                        position,
                        result,
                    } => self.on_resume_finished(generation, position, result),
                }
            }

            self.teardown("all handles dropped").await;
        }
        .instrument(span)
        .await
    }

    fn open_lesson(&mut self, context: LessonContext) {
        if let Some(active) = &self.lesson
            && active.context == context
        {
            trace!("Lesson {} already active", context.lesson_id);
            return;
        }

        if self.lesson.is_some() {
            self.final_flush("content change");
        }
        self.persistence.rearm();

        info!(
            "Opening lesson {} (enrollment {}, content {})",
            context.lesson_id, context.enrollment_id, context.content_id
        );
        let attempt = self.loader.begin(context.content_id.clone());
        self.lesson = Some(ActiveLesson {
            context: context.clone(),
            state: WatchState::new(&self.config.tracking),
            resume_position: None,
            progress_fetched: false,
        });
        self.publish_load_state();

        self.spawn_fetch(context, attempt.generation);
        self.spawn_deadline(attempt.generation);
        self.spawn_load(attempt, true);
    }

    fn spawn_fetch(&self, context: LessonContext, generation: u64) {
        let store = self.store.clone();
        let sender = self.sender.clone();
        tokio::spawn(
            async move {
                let result = store
                    .fetch_progress(&context.enrollment_id, &context.lesson_id)
                    .await;
                notify(&sender, SessionInput::ProgressFetched { generation, result });
            }
            .in_current_span(),
        );
    }

    /// The first attempt of a generation unloads whatever was loaded and waits
    /// out the grace period; retries re-issue the load directly.
    fn spawn_load(&mut self, attempt: LoadAttempt, unload_first: bool) {
        let player = self.player.clone();
        let sender = self.sender.clone();
        let grace_period = self.config.loading.grace_period();

        let handle = tokio::spawn(
            async move {
                if unload_first {
                    if let Err(e) = player.unload().await {
                        trace!("Unload before load failed: {}", e);
                    }
                    tokio::time::sleep(grace_period).await;
                }

                debug!(
                    "Loading {} (attempt {})",
                    attempt.content_id,
                    attempt.retry_count + 1
                );
                let result = match player.load_video(&attempt.content_id).await {
                    Ok(()) => Ok(player
                        .get_duration()
                        .await
                        .ok()
                        .filter(|duration| duration.is_finite() && *duration > 0.0)),
                    Err(e) => Err(e),
                };
                notify(
                    &sender,
                    SessionInput::LoadFinished {
                        generation: attempt.generation,
                        result,
                    },
                );
            }
            .in_current_span(),
        );
        self.loader.set_load_task(handle);
    }

    fn spawn_deadline(&mut self, generation: u64) {
        let sender = self.sender.clone();
        let timeout = self.loader.load_timeout();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            notify(&sender, SessionInput::LoadDeadline { generation });
        });
        self.loader.set_deadline_timer(handle);
    }

    fn on_load_finished(&mut self, generation: u64, result: Result<Option<f64>>) {
        match result {
            Ok(duration) => {
                if !self.loader.on_success(generation) {
                    trace!("Ignoring load result of generation {}", generation);
                    return;
                }
                info!("Content loaded");
                self.publish_load_state();
                if let Some(duration) = duration {
                    self.observe_duration(duration);
                }
                self.maybe_resume();
            }
            Err(e) => match self.loader.on_failure(generation, &format!("{:#}", e)) {
                RetryDecision::Stale => {
                    trace!("Ignoring load failure of generation {}", generation);
                }
                RetryDecision::Retry { attempt, delay } => {
                    warn!("Load failed: {:#}", e);
                    let sender = self.sender.clone();
                    let timer = tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        notify(
                            &sender,
                            SessionInput::RetryDue {
                                generation: attempt.generation,
                            },
                        );
                    });
                    self.loader.set_retry_timer(timer);
                }
                RetryDecision::Exhausted(err) => {
                    report_load_error(&err);
                    self.publish_load_state();
                }
            },
        }
    }

    fn on_progress_fetched(&mut self, generation: u64, result: Result<Option<SavedProgress>>) {
        if !self.loader.is_current(generation) {
            trace!("Ignoring progress fetched for generation {}", generation);
            return;
        }
        let Some(lesson) = self.lesson.as_mut() else {
            return;
        };

        match result {
            Ok(Some(saved)) => {
                debug!(
                    "Previous progress: {}% at {:.1}s, {}s spent",
                    saved.progress_percentage, saved.last_position, saved.time_spent
                );
                lesson.state.seed_time_spent(saved.time_spent);
                if saved.last_position.is_finite() && saved.last_position > 0.0 {
                    lesson.resume_position = Some(saved.last_position);
                }
            }
            Ok(None) => debug!("No previous progress for lesson {}", lesson.context.lesson_id),
            Err(e) => warn!("{}", TrackerError::persistence(format!("{:#}", e))),
        }
        lesson.progress_fetched = true;

        self.maybe_resume();
    }

    fn handle_player_event(&mut self, event: PlayerEvent) {
        let Some(lesson) = self.lesson.as_mut() else {
            trace!("No lesson open, ignoring {}", event.name());
            return;
        };
        if !self.loader.state().is_loaded() && !matches!(event, PlayerEvent::Error { .. }) {
            trace!("Content not loaded, ignoring {}", event.name());
            return;
        }

        let now = Instant::now();
        match event {
            PlayerEvent::Loaded => trace!("Player reported loaded"),
            PlayerEvent::Play => lesson.state.on_play(now),
            PlayerEvent::Pause => lesson.state.on_pause(now),
            PlayerEvent::TimeUpdate { seconds, duration } => {
                self.observe_duration(duration);
                if let Some(lesson) = self.lesson.as_mut() {
                    lesson.state.on_time_update(seconds, now);
                }
            }
            PlayerEvent::Seeked { seconds, duration } => {
                self.observe_duration(duration);
                if let Some(lesson) = self.lesson.as_mut() {
                    lesson.state.on_seeked(seconds, now);
                }
            }
            PlayerEvent::Ended => {
                lesson.state.on_ended(now);
                info!("Video ended");
                self.callbacks.complete();
            }
            PlayerEvent::PlaybackRateChange { playback_rate } => {
                debug!("Playback rate now {}", playback_rate);
                lesson.state.on_rate_change(playback_rate, now);
            }
            PlayerEvent::Error { name, message } => {
                match self.loader.on_playback_error(&name, &message) {
                    Some(err) => {
                        lesson.state.on_playback_error(now);
                        lesson.resume_position = None;
                        report_load_error(&err);
                        self.publish_load_state();
                    }
                    // The retry policy owns errors raised while loading.
                    None => warn!("Player error while loading: {}: {}", name, message),
                }
            }
        }

        self.after_progress_change();
        self.maybe_resume();
    }

    /// Fires `onDurationReceived` the first time the duration is known.
    fn observe_duration(&mut self, duration: f64) {
        let Some(lesson) = self.lesson.as_mut() else {
            return;
        };
        if lesson.state.observe_duration(duration) {
            debug!("Duration received: {:.1}s", duration);
            self.callbacks.duration_received(duration);
        }
    }

    fn after_progress_change(&mut self) {
        let Some(lesson) = self.lesson.as_mut() else {
            return;
        };

        let eligibility = lesson.state.evaluate();
        if eligibility.changed {
            info!(
                "Completion eligibility now {} at {}%",
                eligibility.can_complete, eligibility.coverage_percent
            );
            self.callbacks
                .completion_eligibility_change(eligibility.can_complete, eligibility.coverage_percent);
        }

        if let Some(record) = self
            .persistence
            .throttled_update(&mut lesson.state, &lesson.context)
        {
            self.callbacks.progress_update(
                record.progress_percentage,
                record.last_position,
                record.duration_seconds,
                record.time_spent,
            );
            self.persistence.dispatch_update(record);
        }
    }

    /// Seeks to the saved position once both the load and the progress fetch
    /// have completed, whichever comes last. The seek runs off the loop and
    /// reports back through [`SessionInput::ResumeFinished`].
    fn maybe_resume(&mut self) {
        if !self.loader.state().is_loaded() {
            return;
        }
        let Some(lesson) = self.lesson.as_mut() else {
            return;
        };
        if !lesson.progress_fetched || lesson.resume_position.is_none() {
            return;
        }
        let Some(duration) = lesson.state.duration() else {
            return;
        };
        let Some(position) = lesson.resume_position.take() else {
            return;
        };
        if position >= duration {
            debug!("Saved position {:.1}s is not before the end, not resuming", position);
            return;
        }

        info!("Resuming at {:.1}s", position);
        let player = self.player.clone();
        let sender = self.sender.clone();
        let generation = self.loader.generation();
        let handle = tokio::spawn(
            async move {
                let result = player.set_current_time(position).await;
                notify(
                    &sender,
                    SessionInput::ResumeFinished {
                        generation,
                        position,
                        result,
                    },
                );
            }
            .in_current_span(),
        );
        self.loader.set_seek_task(handle);
    }

    fn on_resume_finished(&mut self, generation: u64, position: f64, result: Result<()>) {
        if !self.loader.is_current(generation) {
            trace!("Ignoring resume seek of generation {}", generation);
            return;
        }
        if let Err(e) = result {
            warn!("Failed to resume at {:.1}s: {:#}", position, e);
            return;
        }
        if let Some(lesson) = self.lesson.as_mut() {
            lesson.state.on_seeked(position, Instant::now());
        }
        self.after_progress_change();
    }

    fn final_flush(&mut self, reason: &str) {
        let Some(lesson) = self.lesson.as_mut() else {
            return;
        };

        if self.persistence.has_flushed() {
            trace!("Final flush already done, ignoring {}", reason);
            return;
        }
        lesson.state.checkpoint(Instant::now());
        lesson.state.evaluate();

        debug!("Final flush ({})", reason);
        if let FlushOutcome::Delivered(record) =
            self.persistence.final_flush(&lesson.state, &lesson.context)
            && record.status.is_completed()
        {
            self.callbacks.completion_update(&record);
        }
    }

    async fn teardown(&mut self, reason: &str) {
        self.final_flush(reason);
        self.loader.cancel();
        if let Err(e) = self.player.destroy().await {
            debug!("Player destroy failed: {}", e);
        }
        info!("Watch session stopped ({})", reason);
    }

    fn publish_load_state(&self) {
        self.callbacks.load_state_change(self.loader.state());
    }

    fn snapshot(&mut self) -> Option<SessionSnapshot> {
        let lesson = self.lesson.as_mut()?;
        lesson.state.checkpoint(Instant::now());
        let state = &lesson.state;
        Some(SessionSnapshot {
            session_id: self.id,
            lesson: lesson.context.clone(),
            load_state: self.loader.state().clone(),
            duration: state.duration(),
            last_position: state.last_position(),
            coverage_percent: state.coverage_percent(),
            position_percent: state.position_percent(),
            can_complete: state.can_complete(),
            time_spent: state.time_spent_seconds(),
            last_saved_percent: state.last_saved_percent(),
            playback_rate: state.playback_rate(),
            watched: state.watched().intervals().to_vec(),
        })
    }
}

/// Logs an error that put the load state into `Error`.
fn report_load_error(err: &TrackerError) {
    if !err.is_user_visible() {
        warn!("{}", err);
    } else if err.is_timeout() {
        error!("Gave up waiting for content: {}", err);
    } else {
        error!("{}", err);
    }
}

fn notify(sender: &mpsc::WeakUnboundedSender<SessionInput>, input: SessionInput) {
    if let Some(sender) = sender.upgrade() {
        let _ = sender.send(input);
    }
}

/// Cloneable handle the host uses to drive a [`WatchSession`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    sender: mpsc::UnboundedSender<SessionInput>,
    callbacks: HostCallbacks,
}

impl SessionHandle {
    pub fn callbacks(&self) -> &HostCallbacks {
        &self.callbacks
    }

    /// Makes `context` the active lesson. Reopening the active lesson is a no-op.
    pub fn open_lesson(&self, context: LessonContext) -> Result<()> {
        self.send(SessionInput::OpenLesson(context))
    }

    pub fn player_event(&self, event: PlayerEvent) -> Result<()> {
        self.send(SessionInput::Player(event))
    }

    pub fn visibility_changed(&self, visible: bool) -> Result<()> {
        self.send(SessionInput::VisibilityChanged { visible })
    }

    pub fn page_hide(&self) -> Result<()> {
        self.send(SessionInput::PageHide)
    }

    /// Flushes and shuts the session down. Stopping an already stopped
    /// session succeeds.
    pub async fn stop(&self) -> Result<()> {
        let (respond_to, response) = oneshot::channel();
        if self.sender.send(SessionInput::Stop { respond_to }).is_err() {
            return Ok(());
        }
        let _ = response.await;
        Ok(())
    }

    pub async fn snapshot(&self) -> Result<Option<SessionSnapshot>> {
        let (respond_to, response) = oneshot::channel();
        self.send(SessionInput::Snapshot { respond_to })?;
        response
            .await
            .map_err(|_| anyhow::anyhow!("Failed to receive snapshot from watch session"))
    }

    fn send(&self, input: SessionInput) -> Result<()> {
        self.sender
            .send(input)
            .map_err(|_| anyhow::anyhow!("Watch session disconnected"))
    }
}
