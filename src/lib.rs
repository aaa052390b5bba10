// Watch-progress tracking engine for embedded lesson players.
// The `watchtrack` binary in src/main.rs replays recorded player events through it.

pub mod backends;
pub mod config;
pub mod models;
pub mod player;
pub mod tracking;
pub mod utils;

pub use backends::{BeaconStatus, MemoryProgressStore, ProgressStore, RestProgressStore};
pub use config::Config;
pub use models::{ContentId, EnrollmentId, LessonContext, LessonId, ProgressRecord, ProgressStatus};
pub use player::{PlayerAdapter, PlayerEvent};
pub use tracking::{HostCallbacks, LoadState, SessionHandle, SessionSnapshot, WatchSession};
pub use utils::{TrackerError, TrackerResult};
