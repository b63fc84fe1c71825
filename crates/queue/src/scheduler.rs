//! Bounded-concurrency job scheduler.
//!
//! Jobs wait in a FIFO queue and are admitted to the running set while
//! `running < max_concurrent`. Each admitted job runs on its own tokio task;
//! when it finishes it leaves the running set, settles its [`JobHandle`], and
//! triggers another dispatch so a freed slot immediately pulls the next job.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{Instrument, debug, error, info_span, warn};

use markwright_core::error::{QueueError, panic_message};
use markwright_core::{Error, Result};

use crate::status::{NoopObserver, QueueStatus, QueuedJob, StatusObserver};

/// Scheduler limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// Jobs allowed in the running set at once.
    pub max_concurrent: usize,
    /// Waiting jobs allowed before `enqueue` starts rejecting; `None` is unbounded.
    pub max_pending: Option<usize>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            max_pending: None,
        }
    }
}

impl From<&markwright_config::QueueConfig> for QueueOptions {
    fn from(config: &markwright_config::QueueConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            max_pending: config.max_pending,
        }
    }
}

/// Delivers a job's result to its handle. Runs exactly once.
type Settle = Box<dyn FnOnce() + Send>;

struct PendingJob {
    seq: u64,
    id: String,
    body: BoxFuture<'static, Settle>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<PendingJob>,
    /// Admitted jobs by admission sequence.
    running: BTreeMap<u64, String>,
    next_seq: u64,
}

struct Shared {
    options: QueueOptions,
    state: Mutex<QueueState>,
    observer: Arc<dyn StatusObserver>,
}

/// A process-wide admission gate for asynchronous jobs.
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct TaskQueue {
    shared: Arc<Shared>,
}

impl TaskQueue {
    /// Create a queue that reports to nobody.
    pub fn new(options: QueueOptions) -> Self {
        Self::with_observer(options, Arc::new(NoopObserver))
    }

    /// Create a queue that reports every state change to `observer`.
    pub fn with_observer(options: QueueOptions, observer: Arc<dyn StatusObserver>) -> Self {
        let options = QueueOptions {
            max_concurrent: options.max_concurrent.max(1),
            ..options
        };
        Self {
            shared: Arc::new(Shared {
                options,
                state: Mutex::new(QueueState::default()),
                observer,
            }),
        }
    }

    pub fn options(&self) -> QueueOptions {
        self.shared.options
    }

    /// Submit a job. `execute` is called only once the job is admitted.
    ///
    /// The returned handle settles exactly once: with the job's result, its
    /// error, a [`QueueError::Panicked`] if the body panicked, or
    /// [`QueueError::Full`] right away if the pending queue is at capacity.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue<F, Fut, T>(&self, id: impl Into<String>, execute: F) -> JobHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let id = id.into();
        let (tx, rx) = oneshot::channel::<Result<T>>();

        let job_id = id.clone();
        let body = async move {
            let result = match AssertUnwindSafe(async move { execute().await })
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => {
                    let reason = panic_message(&*panic);
                    error!(job_id = %job_id, reason = %reason, "Job panicked");
                    Err(QueueError::Panicked { job_id, reason }.into())
                }
            };
            Box::new(move || {
                // The submitter may have dropped its handle; nothing to deliver then.
                let _ = tx.send(result);
            }) as Settle
        }
        .boxed();

        {
            let mut state = self.shared.lock();
            if let Some(capacity) = self.shared.options.max_pending {
                if state.pending.len() >= capacity {
                    warn!(job_id = %id, capacity, "Pending queue full, job rejected");
                    return JobHandle::rejected(id, QueueError::Full { capacity }.into());
                }
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.pending.push_back(PendingJob {
                seq,
                id: id.clone(),
                body,
            });
            debug!(job_id = %id, queue_size = state.pending.len(), "Job enqueued");
            self.shared.report(&state);
        }

        self.shared.dispatch();
        JobHandle::waiting(id, rx)
    }

    /// Current snapshot of the queue.
    pub fn status(&self) -> QueueStatus {
        let state = self.shared.lock();
        self.shared.snapshot(&state)
    }
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn snapshot(&self, state: &QueueState) -> QueueStatus {
        QueueStatus {
            queue_size: state.pending.len(),
            running_size: state.running.len(),
            max_concurrent: self.options.max_concurrent,
            queued_jobs: state
                .pending
                .iter()
                .map(|job| QueuedJob { id: job.id.clone() })
                .collect(),
        }
    }

    /// Report under the state lock so observers see mutations in order.
    ///
    /// The snapshot lists every pending id, so it is only built for an
    /// observer that will read it.
    fn report(&self, state: &QueueState) {
        let sizes = (state.pending.len(), state.running.len());
        if self.observer.wants_status(sizes) {
            self.observer.on_status(&self.snapshot(state));
        }
    }

    /// Admit jobs from the head of the queue while slots are free.
    fn dispatch(self: &Arc<Self>) {
        let mut admitted = Vec::new();
        {
            let mut state = self.lock();
            while state.running.len() < self.options.max_concurrent {
                let Some(job) = state.pending.pop_front() else {
                    break;
                };
                state.running.insert(job.seq, job.id.clone());
                debug!(
                    job_id = %job.id,
                    running_size = state.running.len(),
                    queue_size = state.pending.len(),
                    "Job admitted"
                );
                admitted.push(job);
            }
            if !admitted.is_empty() {
                self.report(&state);
            }
        }

        for job in admitted {
            self.spawn(job);
        }
    }

    fn spawn(self: &Arc<Self>, job: PendingJob) {
        let PendingJob { seq, id, body } = job;
        let shared = Arc::clone(self);
        let span = info_span!("job", job_id = %id);
        tokio::spawn(
            async move {
                let settle = body.await;
                shared.finish(seq);
                settle();
                shared.dispatch();
            }
            .instrument(span),
        );
    }

    fn finish(&self, seq: u64) {
        let mut state = self.lock();
        if let Some(id) = state.running.remove(&seq) {
            debug!(job_id = %id, running_size = state.running.len(), "Job finished");
        }
        self.report(&state);
    }
}

enum HandleState<T> {
    Waiting(oneshot::Receiver<Result<T>>),
    Rejected(Option<Error>),
}

/// The settle side of a submitted job. Resolves to the job's outcome.
pub struct JobHandle<T> {
    id: String,
    state: HandleState<T>,
}

impl<T> JobHandle<T> {
    fn waiting(id: String, rx: oneshot::Receiver<Result<T>>) -> Self {
        Self {
            id,
            state: HandleState::Waiting(rx),
        }
    }

    fn rejected(id: String, error: Error) -> Self {
        Self {
            id,
            state: HandleState::Rejected(Some(error)),
        }
    }

    /// The id the job was submitted with.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl<T> Unpin for JobHandle<T> {}

impl<T> Future for JobHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            HandleState::Waiting(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                // Sender dropped without settling: the job task was torn down.
                Poll::Ready(Err(_)) => Poll::Ready(Err(QueueError::Abandoned {
                    job_id: this.id.clone(),
                }
                .into())),
                Poll::Pending => Poll::Pending,
            },
            HandleState::Rejected(error) => Poll::Ready(Err(error.take().unwrap_or_else(|| {
                QueueError::Abandoned {
                    job_id: this.id.clone(),
                }
                .into()
            }))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusBroadcaster;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Records every snapshot it is shown.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(usize, usize)>>,
    }

    impl Recorder {
        fn trace(&self) -> Vec<(usize, usize)> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl StatusObserver for Recorder {
        fn on_status(&self, status: &QueueStatus) {
            self.seen.lock().unwrap().push(status.sizes());
        }
    }

    /// Declines every report, counting the snapshots it is still handed.
    #[derive(Default)]
    struct Uninterested {
        asked: AtomicUsize,
        built: AtomicUsize,
    }

    impl StatusObserver for Uninterested {
        fn on_status(&self, _status: &QueueStatus) {
            self.built.fetch_add(1, Ordering::SeqCst);
        }

        fn wants_status(&self, _sizes: (usize, usize)) -> bool {
            self.asked.fetch_add(1, Ordering::SeqCst);
            false
        }
    }

    fn options(max_concurrent: usize) -> QueueOptions {
        QueueOptions {
            max_concurrent,
            max_pending: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_durations_never_exceed_limit() {
        let recorder = Arc::new(Recorder::default());
        let queue = TaskQueue::with_observer(options(2), recorder.clone());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = [10u64, 20, 10, 5, 30]
            .into_iter()
            .enumerate()
            .map(|(i, units)| {
                let active = active.clone();
                let peak = peak.clone();
                queue.enqueue(format!("job-{i}"), move || async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(units)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(i)
                })
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        let settled: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(settled, vec![0, 1, 2, 3, 4]);

        assert!(peak.load(Ordering::SeqCst) <= 2);
        let trace = recorder.trace();
        assert!(trace.iter().all(|&(_, running)| running <= 2), "{trace:?}");
        assert_eq!(trace.last(), Some(&(0, 0)));
        assert_eq!(queue.status().running_size, 0);
    }

    #[tokio::test]
    async fn admission_is_fifo() {
        for limit in [1, 2] {
            let queue = TaskQueue::new(options(limit));
            let started = Arc::new(Mutex::new(Vec::new()));
            let handles: Vec<_> = (0..6)
                .map(|i| {
                    let started = started.clone();
                    queue.enqueue(format!("job-{i}"), move || async move {
                        started.lock().unwrap().push(i);
                        tokio::task::yield_now().await;
                        Ok(())
                    })
                })
                .collect();
            for handle in handles {
                handle.await.unwrap();
            }
            assert_eq!(*started.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
        }
    }

    #[tokio::test]
    async fn admission_happens_inside_enqueue() {
        let queue = TaskQueue::new(options(1));
        let (release, gate) = oneshot::channel::<()>();
        let first = queue.enqueue("first", move || async move {
            let _ = gate.await;
            Ok(1)
        });
        let second = queue.enqueue("second", || async { Ok(2) });

        let status = queue.status();
        assert_eq!(status.running_size, 1);
        assert_eq!(status.queue_size, 1);
        assert_eq!(status.queued_jobs, vec![QueuedJob { id: "second".into() }]);

        release.send(()).unwrap();
        assert_eq!(first.await.unwrap(), 1);
        assert_eq!(second.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let queue = TaskQueue::new(options(1));
        let failing = queue.enqueue("fails", || async {
            Err::<u32, _>(Error::Internal("grading exploded".into()))
        });
        let panicking = queue.enqueue("panics", || async {
            let points: Vec<u32> = Vec::new();
            Ok(points[1])
        });
        let healthy = queue.enqueue("healthy", || async { Ok(3u32) });

        assert!(matches!(failing.await, Err(Error::Internal(_))));
        match panicking.await {
            Err(Error::Queue(QueueError::Panicked { job_id, reason })) => {
                assert_eq!(job_id, "panics");
                assert!(reason.contains("index out of bounds"));
            }
            other => panic!("expected panic error, got {other:?}"),
        }
        assert_eq!(healthy.await.unwrap(), 3);
        assert_eq!(queue.status().running_size, 0);
    }

    #[tokio::test]
    async fn pending_cap_rejects_overflow() {
        let queue = TaskQueue::new(QueueOptions {
            max_concurrent: 1,
            max_pending: Some(1),
        });
        let (release, gate) = oneshot::channel::<()>();
        let running = queue.enqueue("running", move || async move {
            let _ = gate.await;
            Ok(())
        });
        let waiting = queue.enqueue("waiting", || async { Ok(()) });
        let rejected = queue.enqueue("rejected", || async { Ok(()) });

        assert_eq!(rejected.id(), "rejected");
        assert!(matches!(
            rejected.await,
            Err(Error::Queue(QueueError::Full { capacity: 1 }))
        ));
        assert_eq!(queue.status().queue_size, 1);

        release.send(()).unwrap();
        running.await.unwrap();
        waiting.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_handle_does_not_stall_queue() {
        let queue = TaskQueue::new(options(1));
        drop(queue.enqueue("ignored", || async { Ok(()) }));
        let next = queue.enqueue("next", || async { Ok("ran") });
        assert_eq!(next.await.unwrap(), "ran");
    }

    #[tokio::test]
    async fn independent_queues_do_not_share_capacity() {
        let a = TaskQueue::new(options(1));
        let b = TaskQueue::new(options(1));
        let (release, gate) = oneshot::channel::<()>();
        let blocker = a.enqueue("blocker", move || async move {
            let _ = gate.await;
            Ok(())
        });
        assert_eq!(b.enqueue("free", || async { Ok(7) }).await.unwrap(), 7);
        assert_eq!(a.status().running_size, 1);
        release.send(()).unwrap();
        blocker.await.unwrap();
    }

    #[tokio::test]
    async fn declined_reports_build_no_snapshot() {
        let observer = Arc::new(Uninterested::default());
        let queue = TaskQueue::with_observer(options(1), observer.clone());
        let (release, gate) = oneshot::channel::<()>();
        let blocker = queue.enqueue("blocker", move || async move {
            let _ = gate.await;
            Ok(())
        });
        let waiting: Vec<_> = (0..50)
            .map(|i| queue.enqueue(format!("job-{i}"), || async { Ok(()) }))
            .collect();

        // 51 enqueues plus the first admission.
        assert_eq!(observer.asked.load(Ordering::SeqCst), 52);
        assert_eq!(observer.built.load(Ordering::SeqCst), 0);
        // Explicit snapshots still list everything.
        assert_eq!(queue.status().queued_jobs.len(), 50);

        release.send(()).unwrap();
        blocker.await.unwrap();
        for handle in waiting {
            handle.await.unwrap();
        }
        assert_eq!(observer.built.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn late_subscriber_sees_only_new_transitions() {
        let broadcaster = Arc::new(StatusBroadcaster::new(16));
        let queue = TaskQueue::with_observer(options(1), broadcaster.clone());

        let (release_a, gate_a) = oneshot::channel::<()>();
        let (release_b, gate_b) = oneshot::channel::<()>();
        // Transitions 1 (enqueue A) and 2 (admit A).
        let a = queue.enqueue("a", move || async move {
            let _ = gate_a.await;
            Ok(())
        });
        // Transition 3 (enqueue B while A runs).
        let b = queue.enqueue("b", move || async move {
            let _ = gate_b.await;
            Ok(())
        });
        assert_eq!(broadcaster.last_token(), 3);

        let mut late = broadcaster.subscribe();
        assert!(late.try_recv().is_none());

        // Transitions 4 (A leaves) and 5 (B admitted).
        release_a.send(()).unwrap();
        a.await.unwrap();
        let fourth = late.recv().await.unwrap();
        assert_eq!(fourth.token, 4);
        assert_eq!(fourth.status.sizes(), (1, 0));
        let fifth = late.recv().await.unwrap();
        assert_eq!(fifth.token, 5);
        assert_eq!(fifth.status.sizes(), (0, 1));

        // Transition 6 (B leaves).
        release_b.send(()).unwrap();
        b.await.unwrap();
        let sixth = late.recv().await.unwrap();
        assert_eq!(sixth.token, 6);
        assert_eq!(sixth.status.sizes(), (0, 0));
    }
}
