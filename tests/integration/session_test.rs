use std::time::Duration;
use watchtrack::models::SavedProgress;
use watchtrack::player::PlayerEvent;

use crate::common::mocks::{MockPlayer, RecordingStore};
use crate::common::{HostEvent, TestContext, lesson, settle};

#[tokio::test(start_paused = true)]
async fn test_duration_is_reported_once() {
    let ctx = TestContext::start(MockPlayer::new(100.0), RecordingStore::new());
    ctx.open(lesson("v1")).await;
    ctx.send(PlayerEvent::Play);
    ctx.play_through(0.0, 5.0, 100.0).await;

    let durations: Vec<_> = ctx
        .events()
        .into_iter()
        .filter(|event| matches!(event, HostEvent::DurationReceived(_)))
        .collect();
    assert_eq!(durations, vec![HostEvent::DurationReceived(100.0)]);
}

#[tokio::test(start_paused = true)]
async fn test_eligibility_notifies_once_when_crossing_threshold() {
    let ctx = TestContext::start(MockPlayer::new(100.0), RecordingStore::new());
    ctx.open(lesson("v1")).await;
    ctx.send(PlayerEvent::Play);

    ctx.play_through(0.0, 89.75, 100.0).await;
    assert!(ctx.eligibility_changes().is_empty());

    ctx.play_through(89.75, 100.0, 100.0).await;
    assert_eq!(ctx.eligibility_changes(), vec![(true, 90)]);
    assert!(ctx.snapshot().await.can_complete);
}

#[tokio::test(start_paused = true)]
async fn test_progress_updates_are_throttled_to_whole_percents() {
    let ctx = TestContext::start(MockPlayer::new(200.0), RecordingStore::new());
    ctx.open(lesson("v1")).await;
    ctx.send(PlayerEvent::Play);
    ctx.play_through(0.0, 20.0, 200.0).await;
    settle(Duration::from_millis(10)).await;

    let percents: Vec<u8> = ctx
        .events()
        .into_iter()
        .filter_map(|event| match event {
            HostEvent::Progress { percent, .. } => Some(percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents, (1..=10).collect::<Vec<u8>>());

    let saves = ctx.store.saves();
    assert_eq!(saves.len(), 10);
    let last = saves.last().unwrap();
    assert_eq!(last.progress_percentage, 10);
    assert_eq!(last.last_position, 20.0);
    assert_eq!(last.time_spent, 20);
}

#[tokio::test(start_paused = true)]
async fn test_seeking_ahead_does_not_count_as_watched() {
    let ctx = TestContext::start(MockPlayer::new(300.0), RecordingStore::new());
    ctx.open(lesson("v1")).await;
    ctx.send(PlayerEvent::Play);
    ctx.play_through(0.0, 50.0, 300.0).await;

    ctx.send(PlayerEvent::Seeked {
        seconds: 250.0,
        duration: 300.0,
    });
    ctx.play_through(250.0, 260.0, 300.0).await;
    ctx.send(PlayerEvent::Pause);

    let snapshot = ctx.snapshot().await;
    let watched: Vec<(f64, f64)> = snapshot
        .watched
        .iter()
        .map(|interval| (interval.start, interval.end))
        .collect();
    assert_eq!(watched, vec![(0.0, 50.0), (250.0, 260.0)]);
    assert_eq!(snapshot.coverage_percent, 20);
    assert_eq!(snapshot.position_percent, 87);
}

#[tokio::test(start_paused = true)]
async fn test_short_seek_announced_by_a_tick_is_not_credited() {
    let ctx = TestContext::start(MockPlayer::new(300.0), RecordingStore::new());
    ctx.open(lesson("v1")).await;
    ctx.send(PlayerEvent::Play);
    ctx.play_through(0.0, 50.0, 300.0).await;

    // Browsers emit a timeupdate at the target before seeked.
    settle(Duration::from_millis(250)).await;
    ctx.send(PlayerEvent::TimeUpdate {
        seconds: 54.5,
        duration: 300.0,
    });
    ctx.send(PlayerEvent::Seeked {
        seconds: 54.5,
        duration: 300.0,
    });
    ctx.play_through(54.5, 60.0, 300.0).await;
    ctx.send(PlayerEvent::Pause);

    let snapshot = ctx.snapshot().await;
    let watched: Vec<(f64, f64)> = snapshot
        .watched
        .iter()
        .map(|interval| (interval.start, interval.end))
        .collect();
    assert_eq!(watched, vec![(0.0, 50.0), (54.5, 60.0)]);
}

#[tokio::test(start_paused = true)]
async fn test_playback_rate_scales_time_spent() {
    let ctx = TestContext::start(MockPlayer::new(600.0), RecordingStore::new());
    ctx.open(lesson("v1")).await;
    ctx.send(PlayerEvent::PlaybackRateChange { playback_rate: 2.0 });
    ctx.send(PlayerEvent::Play);
    ctx.play_through(0.0, 30.0, 600.0).await;
    ctx.send(PlayerEvent::Pause);

    let snapshot = ctx.snapshot().await;
    assert_eq!(snapshot.playback_rate, 2.0);
    assert_eq!(snapshot.time_spent, 60);
}

#[tokio::test(start_paused = true)]
async fn test_resume_seeks_to_saved_position() {
    let store = RecordingStore::new().with_previous(SavedProgress {
        time_spent: 120,
        last_position: 42.0,
        progress_percentage: 35,
        duration_seconds: 120.0,
    });
    let ctx = TestContext::start(MockPlayer::new(120.0), store);
    ctx.open(lesson("v1")).await;

    assert_eq!(ctx.player.seeks(), vec![42.0]);
    let snapshot = ctx.snapshot().await;
    assert_eq!(snapshot.last_position, 42.0);
    assert_eq!(snapshot.time_spent, 120);

    // Only once, even as more events arrive.
    ctx.send(PlayerEvent::Seeked {
        seconds: 42.0,
        duration: 120.0,
    });
    settle(Duration::from_millis(1)).await;
    assert_eq!(ctx.player.seeks().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_resume_seek_does_not_block_the_session() {
    let store = RecordingStore::new().with_previous(SavedProgress {
        time_spent: 10,
        last_position: 42.0,
        progress_percentage: 35,
        duration_seconds: 120.0,
    });
    let ctx = TestContext::start(MockPlayer::new(120.0).with_hanging_seeks(), store);
    ctx.open(lesson("v1")).await;
    ctx.send(PlayerEvent::Play);
    assert_eq!(ctx.player.seeks(), vec![42.0]);

    let snapshot = tokio::time::timeout(Duration::from_secs(5), ctx.snapshot())
        .await
        .expect("snapshot answered while the seek hangs");
    assert_eq!(snapshot.last_position, 0.0);

    tokio::time::timeout(Duration::from_secs(5), ctx.handle.stop())
        .await
        .expect("stop answered while the seek hangs")
        .unwrap();
    assert_eq!(ctx.store.beacons().len(), 1);
    assert!(ctx.player.is_destroyed());
}

#[tokio::test(start_paused = true)]
async fn test_resume_never_seeks_to_the_end() {
    let store = RecordingStore::new().with_previous(SavedProgress {
        time_spent: 300,
        last_position: 120.0,
        progress_percentage: 100,
        duration_seconds: 120.0,
    });
    let ctx = TestContext::start(MockPlayer::new(120.0), store);
    ctx.open(lesson("v1")).await;

    assert!(ctx.player.seeks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_ended_fires_on_complete() {
    let ctx = TestContext::start(MockPlayer::new(10.0), RecordingStore::new());
    ctx.open(lesson("v1")).await;
    ctx.send(PlayerEvent::Play);
    ctx.play_through(0.0, 9.75, 10.0).await;
    ctx.send(PlayerEvent::Ended);
    settle(Duration::from_millis(1)).await;

    assert!(ctx.events().contains(&HostEvent::Complete));
    let snapshot = ctx.snapshot().await;
    assert_eq!(snapshot.coverage_percent, 100);
    assert!(snapshot.can_complete);
}

#[tokio::test(start_paused = true)]
async fn test_failed_saves_do_not_stop_tracking() {
    let ctx = TestContext::start(MockPlayer::new(100.0), RecordingStore::new().failing_saves());
    ctx.open(lesson("v1")).await;
    ctx.send(PlayerEvent::Play);
    ctx.play_through(0.0, 10.0, 100.0).await;

    assert!(ctx.store.saves().is_empty());
    assert_eq!(ctx.snapshot().await.coverage_percent, 10);

    ctx.handle.stop().await.unwrap();
    assert_eq!(ctx.store.beacons().len(), 1);
}
