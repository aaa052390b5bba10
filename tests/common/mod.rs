
use std::sync::{Arc, Mutex};
use std::time::Duration;
use watchtrack::config::Config;
use watchtrack::models::{LessonContext, ProgressRecord};
use watchtrack::player::PlayerEvent;
use watchtrack::tracking::{HostCallbacks, LoadState, SessionHandle, SessionSnapshot, WatchSession};

use mocks::{MockPlayer, RecordingStore};

/// Everything the host was told, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Progress {
        percent: u8,
        position: f64,
        duration: f64,
        time_spent: u64,
    },
    DurationReceived(f64),
    Complete,
    Eligibility {
        can_complete: bool,
        percent: u8,
    },
    CompletionUpdate(ProgressRecord),
    LoadState(LoadState),
}

pub struct TestContext {
    pub handle: SessionHandle,
    pub player: Arc<MockPlayer>,
    pub store: Arc<RecordingStore>,
    events: Arc<Mutex<Vec<HostEvent>>>,
}

impl TestContext {
    pub fn start(player: MockPlayer, store: RecordingStore) -> Self {
        let player = Arc::new(player);
        let store = Arc::new(store);
        let events = Arc::new(Mutex::new(Vec::new()));
        let callbacks = recording_callbacks(&events);

        let handle = WatchSession::spawn(
            &Config::default(),
            player.clone(),
            store.clone(),
            callbacks,
        );

        Self {
            handle,
            player,
            store,
            events,
        }
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn load_states(&self) -> Vec<LoadState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HostEvent::LoadState(state) => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn eligibility_changes(&self) -> Vec<(bool, u8)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HostEvent::Eligibility {
                    can_complete,
                    percent,
                } => Some((can_complete, percent)),
                _ => None,
            })
            .collect()
    }

    /// Opens `lesson` and waits past the unload grace period so the load has
    /// resolved.
    pub async fn open(&self, lesson: LessonContext) {
        self.handle.open_lesson(lesson).unwrap();
        settle(Duration::from_millis(200)).await;
    }

    pub fn send(&self, event: PlayerEvent) {
        self.handle.player_event(event).unwrap();
    }

    /// Plays from `from` to `to` with a tick every 250ms of wall time.
    pub async fn play_through(&self, from: f64, to: f64, duration: f64) {
        let mut position = from;
        while position < to {
            tokio::time::sleep(Duration::from_millis(250)).await;
            position = f64::min(position + 0.25, to);
            self.send(PlayerEvent::TimeUpdate {
                seconds: position,
                duration,
            });
        }
        settle(Duration::from_millis(1)).await;
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.handle.snapshot().await.unwrap().unwrap()
    }
}

pub fn lesson(content_id: &str) -> LessonContext {
    LessonContext::new("enr-1", "lesson-1", content_id)
}

/// Lets spawned work run. With a paused clock this advances virtual time.
pub async fn settle(duration: Duration) {
    tokio::time::sleep(duration).await;
}

fn recording_callbacks(events: &Arc<Mutex<Vec<HostEvent>>>) -> HostCallbacks {
    let callbacks = HostCallbacks::new();

    let sink = events.clone();
    callbacks.set_on_progress_update(move |percent, position, duration, time_spent| {
        sink.lock().unwrap().push(HostEvent::Progress {
            percent,
            position,
            duration,
            time_spent,
        });
    });
    let sink = events.clone();
    callbacks.set_on_duration_received(move |duration| {
        sink.lock().unwrap().push(HostEvent::DurationReceived(duration));
    });
    let sink = events.clone();
    callbacks.set_on_complete(move || {
        sink.lock().unwrap().push(HostEvent::Complete);
    });
    let sink = events.clone();
    callbacks.set_on_completion_eligibility_change(move |can_complete, percent| {
        sink.lock().unwrap().push(HostEvent::Eligibility {
            can_complete,
            percent,
        });
    });
    let sink = events.clone();
    callbacks.set_on_completion_update(move |record| {
        sink.lock().unwrap().push(HostEvent::CompletionUpdate(record.clone()));
    });
    let sink = events.clone();
    callbacks.set_on_load_state_change(move |state| {
        sink.lock().unwrap().push(HostEvent::LoadState(state.clone()));
    });

    callbacks
}
