use anyhow::Result;
use async_trait::async_trait;

use crate::models::ContentId;

/// Control surface of an embedded video player.
///
/// Events flow the other way: the host forwards whatever the player emits to
/// the session as [`PlayerEvent`](super::PlayerEvent)s. Only the load/retry
/// state machine inside the session calls these methods.
#[async_trait]
pub trait PlayerAdapter: Send + Sync + std::fmt::Debug {
    async fn load_video(&self, content_id: &ContentId) -> Result<()>;
    /// May fail when nothing is loaded; callers ignore the error.
    async fn unload(&self) -> Result<()>;
    async fn get_current_time(&self) -> Result<f64>;
    async fn get_duration(&self) -> Result<f64>;
    async fn set_current_time(&self, seconds: f64) -> Result<()>;
    async fn destroy(&self) -> Result<()>;
}
