//! The watch-progress engine: interval coverage, completion eligibility,
//! time on task, persistence and the content load lifecycle, driven by one
//! [`WatchSession`] per mounted player.

pub mod callbacks;
pub mod eligibility;
pub mod interval_tracker;
pub mod load_retry;
pub mod persistence;
pub mod session;
pub mod time_spent;
pub mod watch_state;

pub use callbacks::HostCallbacks;
pub use eligibility::{Eligibility, EligibilityEvaluator};
pub use interval_tracker::{Interval, IntervalTracker, WatchedSet, coverage, merge_intervals};
pub use load_retry::{LoadAttempt, LoadErrorKind, LoadRetryManager, LoadState, RetryDecision};
pub use persistence::{FlushOutcome, PersistenceManager};
pub use session::{SessionHandle, SessionSnapshot, WatchSession};
pub use time_spent::TimeSpentAccumulator;
pub use watch_state::WatchState;
