//! Serial Job Queue
//!
//! Single-flight FIFO of deferred computations. Simulation, proving, note
//! mutations and synchronizer block processing all run here so that no two
//! of them interleave.
//!
//! ```text
//!  put(A) put(B) put(C)
//!     │      │      │
//!     ▼      ▼      ▼
//!  ┌──────────────────────┐      ┌────────┐
//!  │  mpsc<Job>      FIFO │─────▶│ worker │──▶ one job at a time
//!  └──────────────────────┘      └────────┘
//!            ▲                        │
//!        cancel(): close, drain,      └──▶ oneshot result per job
//!        await in-flight
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{PxeError, Result};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueState {
    /// Accepting jobs, worker not yet running them
    Idle,
    Running,
    Stopped,
}

pub struct SerialQueue {
    job_tx: mpsc::UnboundedSender<Job>,
    state_tx: watch::Sender<QueueState>,
    pending: Arc<AtomicUsize>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SerialQueue {
    /// Create a queue that accepts jobs; nothing runs until [`start`](Self::start).
    /// Must be called inside a tokio runtime.
    pub fn new() -> Self {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(QueueState::Idle);
        let pending = Arc::new(AtomicUsize::new(0));
        let worker = tokio::spawn(run_worker(job_rx, state_rx, pending.clone()));

        Self {
            job_tx,
            state_tx,
            pending,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Let the worker run queued jobs
    pub fn start(&self) {
        let started = self.state_tx.send_if_modified(|state| {
            if *state == QueueState::Idle {
                *state = QueueState::Running;
                true
            } else {
                false
            }
        });
        if started {
            debug!("Job queue started");
        }
    }

    /// Enqueue a unit of work
    ///
    /// The returned handle resolves with the job's result once it has run,
    /// with [`PxeError::Cancelled`] if the queue was cancelled first, or
    /// immediately with [`PxeError::QueueClosed`] after cancellation.
    pub fn put<F, T>(&self, task: F) -> JobHandle<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        if !self.is_accepting() {
            return JobHandle { rx: None };
        }

        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let result = task.await;
            // receiver may have been dropped by an uninterested caller
            let _ = tx.send(result);
        });

        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.job_tx.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return JobHandle { rx: None };
        }

        JobHandle { rx: Some(rx) }
    }

    /// Jobs waiting to start
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_accepting(&self) -> bool {
        *self.state_tx.borrow() != QueueState::Stopped
    }

    /// Stop accepting work, reject everything not yet started, and wait for
    /// the in-flight job (if any) to finish.
    pub async fn cancel(&self) {
        self.state_tx.send_replace(QueueState::Stopped);

        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!(error = %e, "Job queue worker failed");
            }
        }
    }
}

impl Default for SerialQueue {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_worker(
    mut jobs: mpsc::UnboundedReceiver<Job>,
    mut state: watch::Receiver<QueueState>,
    pending: Arc<AtomicUsize>,
) {
    // jobs put before start() wait in the channel
    let started = loop {
        let current = *state.borrow_and_update();
        match current {
            QueueState::Running => break true,
            QueueState::Stopped => break false,
            QueueState::Idle => {
                if state.changed().await.is_err() {
                    break false;
                }
            }
        }
    };

    while started {
        let stopped = *state.borrow_and_update() == QueueState::Stopped;
        if stopped {
            break;
        }

        tokio::select! {
            biased;

            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            next = jobs.recv() => match next {
                Some(job) => {
                    pending.fetch_sub(1, Ordering::SeqCst);
                    // spawned so a panicking job only fails its own handle
                    if let Err(e) = tokio::spawn(job).await {
                        error!(error = %e, "Queued job panicked");
                    }
                }
                None => break,
            },
        }
    }

    // dropping a job drops its reply sender, which rejects the handle
    jobs.close();
    let mut dropped = 0usize;
    while let Ok(job) = jobs.try_recv() {
        drop(job);
        dropped += 1;
    }
    pending.store(0, Ordering::SeqCst);

    info!(dropped, "Job queue cancelled");
    debug!("Job queue worker exited");
}

/// Completion handle of a queued job
#[must_use = "a job handle does nothing unless awaited"]
pub struct JobHandle<T> {
    rx: Option<oneshot::Receiver<Result<T>>>,
}

impl<T> Future for JobHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.rx.as_mut() {
            None => Poll::Ready(Err(PxeError::QueueClosed)),
            Some(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(PxeError::Cancelled))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn started() -> SerialQueue {
        let queue = SerialQueue::new();
        queue.start();
        queue
    }

    #[tokio::test]
    async fn test_jobs_complete_in_submission_order() {
        let queue = started();
        let log = Arc::new(StdMutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..10u64 {
            let log = log.clone();
            handles.push(queue.put(async move {
                // later jobs sleep less; order must still hold
                tokio::time::sleep(Duration::from_millis(10 - i)).await;
                log.lock().unwrap().push(i);
                Ok(i)
            }));
        }

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), i as u64);
        }
        assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_at_most_one_job_runs() {
        let queue = started();
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let running = running.clone();
                let max_seen = max_seen.clone();
                queue.put(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_job_waits_for_suspended_first() {
        let queue = started();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let b_started = Arc::new(AtomicUsize::new(0));

        let a = queue.put(async move {
            release_rx.await.ok();
            Ok("a")
        });
        let flag = b_started.clone();
        let b = queue.put(async move {
            flag.store(1, Ordering::SeqCst);
            Ok("b")
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(b_started.load(Ordering::SeqCst), 0);

        release_tx.send(()).unwrap();
        assert_eq!(a.await.unwrap(), "a");
        assert_eq!(b.await.unwrap(), "b");
        assert_eq!(b_started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_job_does_not_stop_queue() {
        let queue = started();
        let failing = queue.put(async { Err::<(), _>(PxeError::invalid_state("boom")) });
        let next = queue.put(async { Ok(7) });

        assert!(matches!(failing.await, Err(PxeError::InvalidState(_))));
        assert_eq!(next.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_panicking_job_is_isolated() {
        let queue = started();
        let panicking = queue.put(async {
            if true {
                panic!("job exploded");
            }
            Ok(())
        });
        let next = queue.put(async { Ok(1) });

        assert!(matches!(panicking.await, Err(PxeError::Cancelled)));
        assert_eq!(next.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancel_rejects_queued_and_finishes_running() {
        let queue = Arc::new(started());
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let running = queue.put(async move {
            started_tx.send(()).ok();
            release_rx.await.ok();
            Ok("done")
        });
        let queued = queue.put(async { Ok("never") });

        started_rx.await.unwrap();

        let canceller = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.cancel().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!canceller.is_finished());
        release_tx.send(()).unwrap();
        canceller.await.unwrap();

        assert_eq!(running.await.unwrap(), "done");
        assert!(matches!(queued.await, Err(PxeError::Cancelled)));
    }

    #[tokio::test]
    async fn test_put_after_cancel_is_closed() {
        let queue = started();
        queue.cancel().await;
        assert!(!queue.is_accepting());

        let handle = queue.put(async { Ok(()) });
        assert!(matches!(handle.await, Err(PxeError::QueueClosed)));
    }

    #[tokio::test]
    async fn test_jobs_wait_for_start() {
        let queue = SerialQueue::new();
        let handle = queue.put(async { Ok(3) });
        assert_eq!(queue.len(), 1);

        queue.start();
        assert_eq!(handle.await.unwrap(), 3);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_before_start_rejects_queued() {
        let queue = SerialQueue::new();
        let first = queue.put(async { Ok(1) });
        let second = queue.put(async { Ok(2) });

        queue.cancel().await;

        assert!(matches!(first.await, Err(PxeError::Cancelled)));
        assert!(matches!(second.await, Err(PxeError::Cancelled)));
        assert!(queue.is_empty());
    }
}
