use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use watchtrack::backends::MemoryProgressStore;
use watchtrack::config::Config;
use watchtrack::models::{ContentId, LessonContext};
use watchtrack::player::{AdapterOptions, PlayerEvent, ScriptedPlayer};
use watchtrack::tracking::{HostCallbacks, LoadState, SessionHandle, WatchSession};
use watchtrack::{TrackerError, TrackerResult};

const USAGE: &str = "usage: watchtrack <events.jsonl> [speed]";
const REPLAY_CONTENT: &str = "replay-video";

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Lifecycle {
    Hidden,
    Visible,
    PageHide,
}

/// One line of a recorded session.
#[derive(Debug, Deserialize)]
struct ReplayEntry {
    at_ms: u64,
    #[serde(flatten)]
    action: ReplayAction,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplayAction {
    Event { event: PlayerEvent },
    Lifecycle { lifecycle: Lifecycle },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("watchtrack=info".parse()?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let path = args.next().context(USAGE)?;
    let speed = parse_speed(args.next().as_deref())?;

    let config = Config::load().unwrap_or_else(|e| {
        warn!("Failed to load config, using defaults: {:#}", e);
        Config::default()
    });
    let entries = read_log(Path::new(&path))
        .with_context(|| format!("Failed to read replay log {}", path))?;
    info!("Replaying {} entries from {} at {}x", entries.len(), path, speed);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(replay(config, entries, speed))
}

fn parse_speed(value: Option<&str>) -> TrackerResult<f64> {
    let Some(value) = value else {
        return Ok(1.0);
    };
    match value.parse::<f64>() {
        Ok(speed) if speed.is_finite() && speed > 0.0 => Ok(speed),
        _ => Err(TrackerError::Configuration(format!(
            "speed must be a positive number, got {:?}",
            value
        ))),
    }
}

fn read_log(path: &Path) -> TrackerResult<Vec<ReplayEntry>> {
    let contents = fs::read_to_string(path)?;

    let mut entries = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let entry: ReplayEntry = serde_json::from_str(line)
            .inspect_err(|e| warn!("Invalid entry on line {}: {}", index + 1, e))?;
        entries.push(entry);
    }
    entries.sort_by_key(|entry| entry.at_ms);
    Ok(entries)
}

/// The longest duration any event reports; the scripted video is that long.
fn recorded_duration(entries: &[ReplayEntry]) -> Option<f64> {
    entries
        .iter()
        .filter_map(|entry| match &entry.action {
            ReplayAction::Event {
                event:
                    PlayerEvent::TimeUpdate { duration, .. } | PlayerEvent::Seeked { duration, .. },
            } => Some(*duration),
            _ => None,
        })
        .filter(|duration| duration.is_finite() && *duration > 0.0)
        .reduce(f64::max)
}

async fn replay(config: Config, entries: Vec<ReplayEntry>, speed: f64) -> Result<()> {
    let duration = recorded_duration(&entries).context("The log never reports a duration")?;
    let content_id = ContentId::new(REPLAY_CONTENT);
    let player = Arc::new(
        ScriptedPlayer::new(AdapterOptions::new("replay").with_content(content_id.clone()))
            .with_video(content_id.clone(), duration),
    );
    let store = Arc::new(MemoryProgressStore::new());

    let callbacks = HostCallbacks::new();
    callbacks.set_on_completion_eligibility_change(|can_complete, percent| {
        info!("Eligible to complete: {} ({}% watched)", can_complete, percent);
    });
    callbacks.set_on_complete(|| info!("Video reached its end"));

    let handle = WatchSession::spawn(&config, player, store.clone(), callbacks);
    let lesson = LessonContext::new("replay-enrollment", "replay-lesson", content_id);
    handle.open_lesson(lesson.clone())?;
    wait_until_loaded(&handle, config.loading.load_timeout()).await?;

    let start = tokio::time::Instant::now();
    for entry in entries {
        let due = start + Duration::from_secs_f64(entry.at_ms as f64 / 1000.0 / speed);
        tokio::time::sleep_until(due).await;

        match entry.action {
            ReplayAction::Event { event } => handle.player_event(event)?,
            ReplayAction::Lifecycle { lifecycle } => match lifecycle {
                Lifecycle::Hidden => handle.visibility_changed(false)?,
                Lifecycle::Visible => handle.visibility_changed(true)?,
                Lifecycle::PageHide => handle.page_hide()?,
            },
        }
    }

    handle.stop().await?;

    let record = store
        .get(&lesson.enrollment_id, &lesson.lesson_id)
        .context("No progress was recorded")?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn wait_until_loaded(handle: &SessionHandle, timeout: Duration) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match handle.snapshot().await?.map(|snapshot| snapshot.load_state) {
            Some(LoadState::Loaded) => return Ok(()),
            Some(LoadState::Error { message, .. }) => bail!("Content failed to load: {}", message),
            _ if tokio::time::Instant::now() >= deadline => bail!("Content never loaded"),
            _ => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
}
