use anyhow::Result;
use async_trait::async_trait;

use crate::models::{EnrollmentId, LessonId, ProgressRecord, SavedProgress};

/// Outcome of handing a record to a store's guaranteed-delivery transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconStatus {
    /// Accepted by a transport that outlives the caller
    Queued,
    /// The transport exists but refused the payload
    Rejected,
    /// The store has no such transport
    Unsupported,
}

impl BeaconStatus {
    pub fn is_queued(self) -> bool {
        matches!(self, BeaconStatus::Queued)
    }
}

#[async_trait]
pub trait ProgressStore: Send + Sync + std::fmt::Debug {
    /// Returns `Ok(None)` the first time a lesson is viewed
    async fn fetch_progress(
        &self,
        enrollment_id: &EnrollmentId,
        lesson_id: &LessonId,
    ) -> Result<Option<SavedProgress>>;

    async fn save_progress(&self, record: &ProgressRecord) -> Result<()>;

    /// Fire-and-forget delivery usable while the caller is being torn down.
    /// Must not block and must not depend on the caller staying alive.
    fn send_beacon(&self, _record: &ProgressRecord) -> BeaconStatus {
        BeaconStatus::Unsupported
    }
}
