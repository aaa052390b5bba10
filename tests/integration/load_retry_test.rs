use std::time::Duration;
use watchtrack::models::SavedProgress;
use watchtrack::player::PlayerEvent;
use watchtrack::tracking::{LoadErrorKind, LoadState};

use crate::common::mocks::{LoadBehavior, MockPlayer, RecordingStore};
use crate::common::{TestContext, lesson, settle};

fn offsets_from_first(loads: &[tokio::time::Instant]) -> Vec<Duration> {
    loads.iter().map(|at| *at - loads[0]).collect()
}

#[tokio::test(start_paused = true)]
async fn test_failing_content_retries_with_backoff_then_errors() {
    let ctx = TestContext::start(
        MockPlayer::new(120.0).with_behavior("broken", LoadBehavior::Fail),
        RecordingStore::new(),
    );
    ctx.handle.open_lesson(lesson("broken")).unwrap();
    settle(Duration::from_secs(10)).await;

    let loads = ctx.player.loads_of("broken");
    assert_eq!(
        offsets_from_first(&loads),
        vec![
            Duration::ZERO,
            Duration::from_secs(1),
            Duration::from_secs(3),
            Duration::from_secs(7)
        ]
    );
    assert!(matches!(
        ctx.load_states().last(),
        Some(LoadState::Error {
            kind: LoadErrorKind::Load,
            ..
        })
    ));

    // Neither another retry nor the deadline fires afterwards.
    settle(Duration::from_secs(60)).await;
    assert_eq!(ctx.player.loads_of("broken").len(), 4);
    assert_eq!(ctx.load_states().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_content_change_cancels_pending_retry() {
    let ctx = TestContext::start(
        MockPlayer::new(120.0).with_behavior("old", LoadBehavior::Fail),
        RecordingStore::new(),
    );
    ctx.handle.open_lesson(lesson("old")).unwrap();
    // First attempt at 0.1s, first retry at 1.1s, next one would be due at 3.1s.
    settle(Duration::from_millis(1500)).await;
    assert_eq!(ctx.player.loads_of("old").len(), 2);

    ctx.handle.open_lesson(lesson("new")).unwrap();
    settle(Duration::from_secs(10)).await;

    let old_loads = ctx.player.loads_of("old");
    let new_loads = ctx.player.loads_of("new");
    assert_eq!(old_loads.len(), 2);
    assert_eq!(new_loads.len(), 1);
    assert!(old_loads.iter().all(|at| *at < new_loads[0]));
    assert_eq!(ctx.load_states().last(), Some(&LoadState::Loaded));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_recover() {
    let ctx = TestContext::start(
        MockPlayer::new(120.0).with_behavior("flaky", LoadBehavior::FailTimes(2)),
        RecordingStore::new(),
    );
    ctx.handle.open_lesson(lesson("flaky")).unwrap();
    settle(Duration::from_secs(5)).await;

    assert_eq!(ctx.player.loads_of("flaky").len(), 3);
    assert_eq!(ctx.load_states(), vec![LoadState::Loading, LoadState::Loaded]);

    let snapshot = ctx.snapshot().await;
    assert_eq!(snapshot.duration, Some(120.0));
}

#[tokio::test(start_paused = true)]
async fn test_hanging_load_hits_the_deadline() {
    let ctx = TestContext::start(
        MockPlayer::new(120.0).with_behavior("stuck", LoadBehavior::Hang),
        RecordingStore::new(),
    );
    ctx.handle.open_lesson(lesson("stuck")).unwrap();

    settle(Duration::from_secs(29)).await;
    assert_eq!(ctx.load_states(), vec![LoadState::Loading]);

    settle(Duration::from_secs(2)).await;
    assert!(matches!(
        ctx.load_states().last(),
        Some(LoadState::Error {
            kind: LoadErrorKind::Timeout,
            ..
        })
    ));
    assert_eq!(ctx.player.loads_of("stuck").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_each_content_change_unloads_first() {
    let ctx = TestContext::start(MockPlayer::new(60.0), RecordingStore::new());
    ctx.open(lesson("a")).await;
    ctx.open(lesson("b")).await;

    assert_eq!(ctx.player.unload_count(), 2);
    assert_eq!(ctx.player.loads_of("a").len(), 1);
    assert_eq!(ctx.player.loads_of("b").len(), 1);

    // Reopening the active lesson does nothing.
    ctx.open(lesson("b")).await;
    assert_eq!(ctx.player.loads_of("b").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_events_before_load_are_ignored() {
    let ctx = TestContext::start(
        MockPlayer::new(120.0).with_behavior("stuck", LoadBehavior::Hang),
        RecordingStore::new(),
    );
    ctx.open(lesson("stuck")).await;

    ctx.send(PlayerEvent::Play);
    ctx.send(PlayerEvent::TimeUpdate {
        seconds: 30.0,
        duration: 120.0,
    });
    let snapshot = ctx.snapshot().await;
    assert_eq!(snapshot.duration, None);
    assert_eq!(snapshot.last_position, 0.0);
    assert_eq!(snapshot.load_state, LoadState::Loading);
}

#[tokio::test(start_paused = true)]
async fn test_playback_error_after_load_is_surfaced() {
    let ctx = TestContext::start(MockPlayer::new(120.0), RecordingStore::new());
    ctx.open(lesson("v1")).await;

    ctx.send(PlayerEvent::Error {
        name: "MediaError".to_string(),
        message: "decode failed".to_string(),
    });
    settle(Duration::from_millis(1)).await;

    assert!(matches!(
        ctx.load_states().last(),
        Some(LoadState::Error {
            kind: LoadErrorKind::Playback,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_error_while_loading_keeps_the_resume_seek() {
    let store = RecordingStore::new().with_previous(SavedProgress {
        time_spent: 30,
        last_position: 42.0,
        progress_percentage: 35,
        duration_seconds: 120.0,
    });
    let ctx = TestContext::start(
        MockPlayer::new(120.0).with_behavior("flaky", LoadBehavior::FailTimes(1)),
        store,
    );
    ctx.handle.open_lesson(lesson("flaky")).unwrap();
    settle(Duration::from_millis(50)).await;

    ctx.send(PlayerEvent::Error {
        name: "NetworkError".to_string(),
        message: "fetch aborted".to_string(),
    });
    settle(Duration::from_secs(3)).await;

    assert_eq!(ctx.player.loads_of("flaky").len(), 2);
    assert_eq!(ctx.load_states(), vec![LoadState::Loading, LoadState::Loaded]);
    assert_eq!(ctx.player.seeks(), vec![42.0]);
    assert_eq!(ctx.snapshot().await.last_position, 42.0);
}
