pub mod config;
pub mod types;

pub use config::{
    load_dotenv, BlackoutConfig, QueueConfig, RateLimitConfig, RotationConfig, SchedulerConfig,
};
pub use types::{job_key, InvalidPriority, Priority, SubmitFlags, TaskRequest};
