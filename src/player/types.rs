/// Common types shared by player adapters and the tracking engine
use serde::{Deserialize, Serialize};

use crate::models::ContentId;

/// Events emitted by an embedded player. Seconds are offsets into the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PlayerEvent {
    Loaded,
    Play,
    Pause,
    TimeUpdate { seconds: f64, duration: f64 },
    Seeked { seconds: f64, duration: f64 },
    Ended,
    Error { name: String, message: String },
    PlaybackRateChange {
        #[serde(rename = "playbackRate")]
        playback_rate: f64,
    },
}

impl PlayerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::Loaded => "loaded",
            PlayerEvent::Play => "play",
            PlayerEvent::Pause => "pause",
            PlayerEvent::TimeUpdate { .. } => "timeupdate",
            PlayerEvent::Seeked { .. } => "seeked",
            PlayerEvent::Ended => "ended",
            PlayerEvent::Error { .. } => "error",
            PlayerEvent::PlaybackRateChange { .. } => "playbackratechange",
        }
    }
}

/// Options an adapter is constructed with.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterOptions {
    /// Opaque handle of the element the player renders into
    pub container: String,
    pub content_id: Option<ContentId>,
    /// Pause when another player on the page starts
    pub autopause: bool,
    pub controls: bool,
}

impl AdapterOptions {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            content_id: None,
            autopause: false,
            controls: true,
        }
    }

    pub fn with_content(mut self, content_id: ContentId) -> Self {
        self.content_id = Some(content_id);
        self
    }
}
