//! File-based task queue.
//!
//! One JSON file per task in a queue directory. Terminal tasks are moved,
//! file name unchanged, into an archive directory. A worker claims a task
//! with an exclusive `<file>.lock` sibling before touching it, so two
//! workers never process the same file.

pub mod error;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use queue::{QueueConfig, TaskClaim, TaskQueue, SCHEDULED_PREFIX, TASK_PREFIX};
