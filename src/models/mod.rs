mod identifiers;
mod progress;

pub use identifiers::{ContentId, EnrollmentId, LessonId};
pub use progress::{LessonContext, ProgressRecord, ProgressStatus, SavedProgress};
