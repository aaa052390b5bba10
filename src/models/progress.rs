use serde::{Deserialize, Serialize};

use super::{ContentId, EnrollmentId, LessonId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    InProgress,
    Completed,
}

impl ProgressStatus {
    pub fn is_completed(self) -> bool {
        matches!(self, ProgressStatus::Completed)
    }
}

/// Snapshot of a learner's progress on one lesson, as persisted by the
/// progress store. Every save carries the full snapshot, never a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub enrollment_id: EnrollmentId,
    pub lesson_id: LessonId,
    pub progress_percentage: u8,
    pub last_position: f64,
    pub duration_seconds: f64,
    /// Whole seconds of rate-adjusted time on task.
    pub time_spent: u64,
    pub status: ProgressStatus,
}

/// Progress previously stored for an `(enrollment, lesson)` pair, fetched
/// when a lesson is opened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedProgress {
    #[serde(default)]
    pub time_spent: u64,
    #[serde(default)]
    pub last_position: f64,
    #[serde(default)]
    pub progress_percentage: u8,
    #[serde(default)]
    pub duration_seconds: f64,
}

/// Everything the engine needs to know about the lesson being viewed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonContext {
    pub enrollment_id: EnrollmentId,
    pub lesson_id: LessonId,
    pub content_id: ContentId,
}

impl LessonContext {
    pub fn new(
        enrollment_id: impl Into<EnrollmentId>,
        lesson_id: impl Into<LessonId>,
        content_id: impl Into<ContentId>,
    ) -> Self {
        Self {
            enrollment_id: enrollment_id.into(),
            lesson_id: lesson_id.into(),
            content_id: content_id.into(),
        }
    }
}
