use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use super::{AdapterOptions, PlayerAdapter};
use crate::models::ContentId;

#[derive(Debug, Default)]
struct ScriptedState {
    loaded: Option<ContentId>,
    position: f64,
    destroyed: bool,
}

/// Headless adapter that "plays" a fixed catalog of videos. Events are not
/// generated here; whoever drives the script forwards them to the session.
#[derive(Debug)]
pub struct ScriptedPlayer {
    options: AdapterOptions,
    catalog: HashMap<ContentId, f64>,
    state: Mutex<ScriptedState>,
}

impl ScriptedPlayer {
    pub fn new(options: AdapterOptions) -> Self {
        Self {
            options,
            catalog: HashMap::new(),
            state: Mutex::new(ScriptedState::default()),
        }
    }

    /// Register a video and its duration in seconds.
    pub fn with_video(mut self, content_id: impl Into<ContentId>, duration: f64) -> Self {
        self.catalog.insert(content_id.into(), duration);
        self
    }

    pub fn options(&self) -> &AdapterOptions {
        &self.options
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, ScriptedState>> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow!("scripted player state poisoned"))?;
        if state.destroyed {
            return Err(anyhow!("player destroyed"));
        }
        Ok(state)
    }

    fn loaded_duration(&self, state: &ScriptedState) -> Result<f64> {
        let content_id = state.loaded.as_ref().ok_or_else(|| anyhow!("no video loaded"))?;
        self.catalog
            .get(content_id)
            .copied()
            .ok_or_else(|| anyhow!("unknown video {}", content_id))
    }
}

#[async_trait]
impl PlayerAdapter for ScriptedPlayer {
    async fn load_video(&self, content_id: &ContentId) -> Result<()> {
        let mut state = self.state()?;
        if !self.catalog.contains_key(content_id) {
            return Err(anyhow!("video {} not found", content_id));
        }
        debug!("Scripted player loaded {}", content_id);
        state.loaded = Some(content_id.clone());
        state.position = 0.0;
        Ok(())
    }

    async fn unload(&self) -> Result<()> {
        let mut state = self.state()?;
        if state.loaded.take().is_none() {
            return Err(anyhow!("nothing to unload"));
        }
        state.position = 0.0;
        Ok(())
    }

    async fn get_current_time(&self) -> Result<f64> {
        let state = self.state()?;
        self.loaded_duration(&state)?;
        Ok(state.position)
    }

    async fn get_duration(&self) -> Result<f64> {
        let state = self.state()?;
        self.loaded_duration(&state)
    }

    async fn set_current_time(&self, seconds: f64) -> Result<()> {
        let mut state = self.state()?;
        let duration = self.loaded_duration(&state)?;
        if !(0.0..=duration).contains(&seconds) {
            return Err(anyhow!("position {} outside 0..{}", seconds, duration));
        }
        state.position = seconds;
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("scripted player state poisoned"))?;
        state.loaded = None;
        state.destroyed = true;
        Ok(())
    }
}
