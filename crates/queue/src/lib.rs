//! # markwright queue
//!
//! A bounded-concurrency FIFO scheduler for asynchronous jobs, and the
//! broadcaster that publishes its status to live subscribers.
//!
//! ```no_run
//! # async fn demo() -> markwright_core::Result<()> {
//! use std::sync::Arc;
//! use markwright_queue::{QueueOptions, StatusBroadcaster, TaskQueue};
//!
//! let broadcaster = Arc::new(StatusBroadcaster::default());
//! let queue = TaskQueue::with_observer(QueueOptions::default(), broadcaster.clone());
//!
//! let points = queue.enqueue("submission-1", || async { Ok(8u32) }).await?;
//! assert_eq!(points, 8);
//! # Ok(())
//! # }
//! ```

pub mod scheduler;
pub mod status;

pub use scheduler::{JobHandle, QueueOptions, TaskQueue};
pub use status::{
    NoopObserver, QueueStatus, QueuedJob, StatusBroadcaster, StatusEvent, StatusObserver,
    StatusSubscription,
};
