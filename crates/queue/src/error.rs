//! Queue error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    InvalidPriority(#[from] fleet_core::InvalidPriority),

    #[error("queue full (max: {0})")]
    QueueFull(usize),
}
