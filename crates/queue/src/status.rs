//! Queue status snapshots and their broadcast to live subscribers.
//!
//! The scheduler reports every state change to a [`StatusObserver`].
//! [`StatusBroadcaster`] is the observer that deduplicates those reports on
//! `(queue_size, running_size)` and fans them out over a
//! `tokio::sync::broadcast` channel, tagging each emission with a strictly
//! increasing resumption token. There is no backlog: a subscriber only sees
//! what is emitted after it attaches.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

/// A waiting job, as reported in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: String,
}

/// Immutable snapshot of the scheduler, recomputed after every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub queue_size: usize,
    pub running_size: usize,
    pub max_concurrent: usize,
    pub queued_jobs: Vec<QueuedJob>,
}

impl QueueStatus {
    /// The pair that decides whether a snapshot is worth emitting.
    pub fn sizes(&self) -> (usize, usize) {
        (self.queue_size, self.running_size)
    }
}

/// Receives the scheduler's snapshots, in mutation order.
///
/// Called while the scheduler holds its state lock: implementations must not
/// block or call back into the queue.
pub trait StatusObserver: Send + Sync {
    fn on_status(&self, status: &QueueStatus);

    /// Whether a snapshot with these `(queue_size, running_size)` would be
    /// read at all. Returning `false` spares the scheduler from building it.
    fn wants_status(&self, _sizes: (usize, usize)) -> bool {
        true
    }
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl StatusObserver for NoopObserver {
    fn on_status(&self, _status: &QueueStatus) {}

    fn wants_status(&self, _sizes: (usize, usize)) -> bool {
        false
    }
}

/// One broadcast emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Resumption token; strictly increasing across emissions, starting at 1.
    pub token: u64,
    pub status: QueueStatus,
}

struct EmitState {
    last_sizes: Option<(usize, usize)>,
    next_token: u64,
}

/// Publishes deduplicated queue snapshots to any number of subscribers.
pub struct StatusBroadcaster {
    sender: broadcast::Sender<StatusEvent>,
    state: Mutex<EmitState>,
}

impl StatusBroadcaster {
    /// Create a broadcaster; `capacity` is the per-subscriber buffer.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            state: Mutex::new(EmitState {
                last_sizes: None,
                next_token: 1,
            }),
        }
    }

    /// Emit `status` unless its sizes equal the last emitted pair.
    ///
    /// Returns the token of the emitted event, or `None` when deduplicated.
    pub fn publish(&self, status: &QueueStatus) -> Option<u64> {
        let sizes = status.sizes();
        let token = self.advance(sizes)?;

        // No subscribers is fine; the token is still consumed.
        let receivers = self
            .sender
            .send(StatusEvent {
                token,
                status: status.clone(),
            })
            .unwrap_or(0);
        debug!(
            token,
            queue_size = sizes.0,
            running_size = sizes.1,
            receivers,
            "Queue status emitted"
        );
        Some(token)
    }

    /// Record an emission of `sizes`, returning its token, or `None` when
    /// the pair equals the last emitted one.
    fn advance(&self, sizes: (usize, usize)) -> Option<u64> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.last_sizes == Some(sizes) {
            return None;
        }
        state.last_sizes = Some(sizes);
        let token = state.next_token;
        state.next_token += 1;
        Some(token)
    }

    /// Attach a new subscriber. It receives only events emitted from now on.
    pub fn subscribe(&self) -> StatusSubscription {
        StatusSubscription {
            rx: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Token of the most recent emission (0 before the first one).
    pub fn last_token(&self) -> u64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.next_token - 1
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl StatusObserver for StatusBroadcaster {
    fn on_status(&self, status: &QueueStatus) {
        self.publish(status);
    }

    /// With nobody listening the emission is recorded without a snapshot,
    /// so tokens stay gapless for whoever subscribes next.
    fn wants_status(&self, sizes: (usize, usize)) -> bool {
        if self.sender.receiver_count() > 0 {
            return true;
        }
        if let Some(token) = self.advance(sizes) {
            debug!(
                token,
                queue_size = sizes.0,
                running_size = sizes.1,
                "Queue status emitted without subscribers"
            );
        }
        false
    }
}

/// A live attachment to a [`StatusBroadcaster`]. Dropping it detaches.
pub struct StatusSubscription {
    rx: broadcast::Receiver<StatusEvent>,
}

impl StatusSubscription {
    /// Wait for the next event. `None` once the broadcaster is gone.
    ///
    /// A subscriber that falls more than the channel capacity behind skips
    /// the lost events; the jump in `token` shows how many.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Status subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<StatusEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Status subscriber lagged, events dropped");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Turn the subscription into a stream, skipping lag notifications.
    pub fn into_stream(self) -> impl futures::Stream<Item = StatusEvent> + Send + 'static {
        BroadcastStream::new(self.rx).filter_map(|result| match result {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, "Status stream lagged, events dropped");
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(queue_size: usize, running_size: usize) -> QueueStatus {
        QueueStatus {
            queue_size,
            running_size,
            max_concurrent: 2,
            queued_jobs: (0..queue_size)
                .map(|i| QueuedJob { id: format!("job-{i}") })
                .collect(),
        }
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let json = serde_json::to_value(status(1, 2)).unwrap();
        assert_eq!(json["queueSize"], 1);
        assert_eq!(json["runningSize"], 2);
        assert_eq!(json["maxConcurrent"], 2);
        assert_eq!(json["queuedJobs"][0]["id"], "job-0");
    }

    #[test]
    fn first_snapshot_always_emitted() {
        let broadcaster = StatusBroadcaster::new(8);
        assert_eq!(broadcaster.publish(&status(0, 0)), Some(1));
    }

    #[test]
    fn unchanged_sizes_are_deduplicated() {
        let broadcaster = StatusBroadcaster::new(8);
        let mut sub = broadcaster.subscribe();

        assert_eq!(broadcaster.publish(&status(1, 0)), Some(1));
        let mut same_sizes = status(1, 0);
        same_sizes.queued_jobs[0].id = "other".into();
        assert_eq!(broadcaster.publish(&same_sizes), None);
        assert_eq!(broadcaster.publish(&status(0, 1)), Some(2));

        assert_eq!(sub.try_recv().map(|e| e.token), Some(1));
        assert_eq!(sub.try_recv().map(|e| e.token), Some(2));
        assert!(sub.try_recv().is_none());
        assert_eq!(broadcaster.last_token(), 2);
    }

    #[test]
    fn late_subscriber_gets_no_backlog() {
        let broadcaster = StatusBroadcaster::new(8);
        broadcaster.publish(&status(1, 0));
        broadcaster.publish(&status(0, 1));

        let mut late = broadcaster.subscribe();
        assert!(late.try_recv().is_none());

        broadcaster.publish(&status(0, 0));
        let event = late.try_recv().unwrap();
        assert_eq!(event.token, 3);
        assert_eq!(event.status.sizes(), (0, 0));
    }

    #[test]
    fn unobserved_emissions_still_consume_tokens() {
        let broadcaster = StatusBroadcaster::new(8);
        assert!(!broadcaster.wants_status((1, 0)));
        assert!(!broadcaster.wants_status((1, 0)));
        assert!(!broadcaster.wants_status((0, 1)));
        assert_eq!(broadcaster.last_token(), 2);

        let mut sub = broadcaster.subscribe();
        assert!(broadcaster.wants_status((0, 0)));
        assert_eq!(broadcaster.publish(&status(0, 1)), None);
        assert_eq!(broadcaster.publish(&status(0, 0)), Some(3));
        assert_eq!(sub.try_recv().map(|e| e.token), Some(3));
    }

    #[tokio::test]
    async fn dropping_one_subscriber_leaves_others() {
        let broadcaster = StatusBroadcaster::new(8);
        let first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        drop(first);
        assert_eq!(broadcaster.subscriber_count(), 1);

        broadcaster.publish(&status(2, 1));
        let event = second.recv().await.unwrap();
        assert_eq!(event.status.queue_size, 2);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_ahead() {
        let broadcaster = StatusBroadcaster::new(2);
        let mut sub = broadcaster.subscribe();
        for i in 0..5 {
            broadcaster.publish(&status(i + 1, 0));
        }
        // Capacity 2: tokens 1..=3 were overwritten.
        let event = sub.recv().await.unwrap();
        assert_eq!(event.token, 4);
        assert_eq!(sub.recv().await.unwrap().token, 5);
    }

    #[tokio::test]
    async fn stream_yields_events_in_token_order() {
        let broadcaster = StatusBroadcaster::new(8);
        let stream = broadcaster.subscribe().into_stream();
        broadcaster.publish(&status(1, 0));
        broadcaster.publish(&status(0, 1));
        broadcaster.publish(&status(0, 0));

        let tokens: Vec<u64> = stream.take(3).map(|e| e.token).collect().await;
        assert_eq!(tokens, vec![1, 2, 3]);
    }
}
