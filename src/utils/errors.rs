use thiserror::Error;

use crate::models::ContentId;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Failed to load content {content_id} after {attempts} attempts: {message}")]
    Load {
        content_id: ContentId,
        attempts: u32,
        message: String,
    },

    #[error("Playback error ({name}): {message}")]
    Playback { name: String, message: String },

    #[error("Timed out loading content {content_id} after {seconds}s")]
    Timeout { content_id: ContentId, seconds: u64 },

    #[error("Progress save failed: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TrackerError {
    /// Errors the learner should see. Persistence failures are only logged.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            TrackerError::Load { .. } | TrackerError::Playback { .. } | TrackerError::Timeout { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TrackerError::Timeout { .. })
    }

    pub fn persistence(err: impl std::fmt::Display) -> Self {
        TrackerError::Persistence(err.to_string())
    }
}

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;
