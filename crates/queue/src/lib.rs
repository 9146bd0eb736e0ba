pub mod error;
pub mod manager;
pub mod priority_queue;
pub mod rotation;

pub use error::QueueError;
pub use manager::{ManagerStatus, QueueCounters, QueueManager};
pub use priority_queue::{OldestTask, PriorityQueue, QueueStats, TierCounts};
pub use rotation::{AccountRotation, FairnessStats, RotationStats};
