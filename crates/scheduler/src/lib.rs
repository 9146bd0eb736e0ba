pub mod blackout;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod rate_limit;
pub mod schedule;
pub mod scheduler;
pub mod status;
pub mod trigger;

pub use blackout::BlackoutWindow;
pub use dispatch::QueuedExecutor;
pub use error::{AdmissionDecision, RejectReason, SchedulerError};
pub use executor::{CapacityStatus, CredentialSummary, Executor, TenantInfo};
pub use rate_limit::RateLimitTracker;
pub use schedule::{
    load_schedules, JobIntervalBounds, JobIntervals, RunEntry, ScheduleDocument, ScheduleEntry,
};
pub use scheduler::SmartScheduler;
pub use status::SchedulerStatus;
