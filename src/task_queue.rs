//! The Task Queue (spec §4.5): single-threaded cooperative scheduling of
//! every mutating operation plus the sync/push workers. Reads never enqueue.
//!
//! Modeled after the teacher's "one worker, channel-fed" shape, generalized
//! from a single operation kind to an arbitrary boxed closure so `put`,
//! `delete`, and the Sync Engine's workers all share one FIFO-with-unshift
//! queue and the same cancellation/drain machinery.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};

use crate::error::{GdbError, StateError};

pub type TaskId = u64;

/// The function a task runs; boxed because tasks close over heterogeneous
/// state (a `put` closes over a document body, a sync task over nothing).
type TaskFn = Box<dyn FnOnce() -> Result<TaskOutcome, GdbError> + Send>;

/// Type-erased result handed back to the caller's future. Callers downcast
/// via the `Any` methods on [`TaskOutcome`]; in practice each call site knows
/// exactly what it submitted and unwraps directly.
pub struct TaskOutcome(pub Box<dyn std::any::Any + Send>);

impl TaskOutcome {
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Self(Box::new(value))
    }

    pub fn downcast<T: Send + 'static>(self) -> Result<T, GdbError> {
        self.0.downcast::<T>().map(|b| *b).map_err(|_| {
            GdbError::State(StateError::UndefinedDb) // unreachable in practice: every call site controls both ends
        })
    }
}

/// Called synchronously the moment a task is accepted onto the queue (spec
/// §4.5 "the queue records `enqueueTime` and invokes `enqueueCallback`").
pub type EnqueueCallback = Box<dyn Fn(TaskId, &str, DateTime<Utc>) + Send + Sync>;

struct PendingTask {
    id: TaskId,
    label: String,
    func: TaskFn,
    result_tx: oneshot::Sender<Result<TaskOutcome, GdbError>>,
}

enum Command {
    Push { task: PendingTask, to_front: bool },
    Stop,
}

/// Handle used to submit work; cheap to clone, shared by `Database` and
/// every `Synchronizer`.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

struct Inner {
    tx: mpsc::UnboundedSender<Command>,
    next_id: AtomicU64,
    closing: std::sync::atomic::AtomicBool,
    idle: Arc<std::sync::atomic::AtomicBool>,
}

impl TaskQueue {
    /// Spawns the single worker task that drains the queue on the current
    /// Tokio runtime.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let idle = Arc::new(std::sync::atomic::AtomicBool::new(true));

        fn push(queue: &mut VecDeque<PendingTask>, task: PendingTask, to_front: bool) {
            if to_front {
                queue.push_front(task);
            } else {
                queue.push_back(task);
            }
        }

        let worker_idle = Arc::clone(&idle);
        tokio::spawn(async move {
            let mut queue: VecDeque<PendingTask> = VecDeque::new();
            'outer: loop {
                if queue.is_empty() {
                    worker_idle.store(true, Ordering::SeqCst);
                    match rx.recv().await {
                        Some(Command::Push { task, to_front }) => push(&mut queue, task, to_front),
                        Some(Command::Stop) | None => break 'outer,
                    }
                }

                worker_idle.store(false, Ordering::SeqCst);
                // Absorb anything already queued without blocking, so a
                // burst of unshifted sync tasks lands ahead of whatever is
                // still pending before the next pop (spec §4.5 ordering).
                while let Ok(cmd) = rx.try_recv() {
                    match cmd {
                        Command::Push { task, to_front } => push(&mut queue, task, to_front),
                        Command::Stop => {
                            queue.clear();
                            break 'outer;
                        }
                    }
                }

                if let Some(task) = queue.pop_front() {
                    debug!("task queue: running {} ({})", task.id, task.label);
                    let outcome = (task.func)();
                    let _ = task.result_tx.send(outcome);
                }
            }
            worker_idle.store(true, Ordering::SeqCst);
        });

        Self {
            inner: Arc::new(Inner {
                tx,
                next_id: AtomicU64::new(1),
                closing: std::sync::atomic::AtomicBool::new(false),
                idle,
            }),
        }
    }

    fn next_id(&self) -> TaskId {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Enqueues `f` at the tail (ordinary FIFO submission).
    pub async fn enqueue<F, T>(&self, label: &str, f: F) -> Result<T, GdbError>
    where
        F: FnOnce() -> Result<T, GdbError> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(label, f, false, None).await
    }

    /// Enqueues `f` at the head of the queue, ahead of everything except a
    /// task already running (spec §4.5 "unshifted" sync/push tasks).
    pub async fn enqueue_front<F, T>(&self, label: &str, f: F) -> Result<T, GdbError>
    where
        F: FnOnce() -> Result<T, GdbError> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(label, f, true, None).await
    }

    pub async fn enqueue_with_callback<F, T>(
        &self,
        label: &str,
        f: F,
        callback: &EnqueueCallback,
    ) -> Result<T, GdbError>
    where
        F: FnOnce() -> Result<T, GdbError> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(label, f, false, Some(callback)).await
    }

    async fn submit<F, T>(
        &self,
        label: &str,
        f: F,
        to_front: bool,
        callback: Option<&EnqueueCallback>,
    ) -> Result<T, GdbError>
    where
        F: FnOnce() -> Result<T, GdbError> + Send + 'static,
        T: Send + 'static,
    {
        if self.inner.closing.load(Ordering::SeqCst) {
            return Err(StateError::DatabaseClosing.into());
        }

        let id = self.next_id();
        let (result_tx, result_rx) = oneshot::channel();
        let task = PendingTask {
            id,
            label: label.to_string(),
            func: Box::new(move || f().map(TaskOutcome::new)),
            result_tx,
        };

        if let Some(cb) = callback {
            cb(id, label, Utc::now());
        }

        self.inner
            .tx
            .send(Command::Push { task, to_front })
            .map_err(|_| StateError::DatabaseClosing)?;

        match result_rx.await {
            Ok(outcome) => outcome.and_then(TaskOutcome::downcast),
            Err(_) => Err(StateError::TaskCancel.into()),
        }
    }

    /// `close({timeout})` (spec §4.5, §4.9): marks the queue closing so new
    /// submissions reject with `DatabaseClosing`, then waits up to
    /// `timeout_ms` for the current backlog to drain.
    pub async fn close(&self, timeout_ms: u64) -> Result<(), GdbError> {
        self.inner.closing.store(true, Ordering::SeqCst);

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(timeout_ms);
        loop {
            if self.inner.idle.load(Ordering::SeqCst) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(StateError::DatabaseCloseTimeout { timeout_ms }.into());
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    /// `stop()` / `close({force:true})` (spec §4.5, §5): drops every pending
    /// task without running it. The currently-running task (if any) is not
    /// interrupted — its result still reaches its caller normally.
    pub fn stop(&self) {
        self.inner.closing.store(true, Ordering::SeqCst);
        if self.inner.tx.send(Command::Stop).is_err() {
            warn!("task queue: stop() called after worker already exited");
        }
    }

    pub fn is_closing(&self) -> bool {
        self.inner.closing.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test(flavor = "multi_thread")]
    async fn tasks_complete_in_submission_order() {
        let queue = TaskQueue::spawn();
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let log = Arc::clone(&log);
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .enqueue("test", move || -> Result<(), GdbError> {
                        log.lock().unwrap().push(i);
                        Ok(())
                    })
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn close_rejects_new_submissions_with_database_closing() {
        let queue = TaskQueue::spawn();
        queue.close(1000).await.unwrap();

        let err = queue.enqueue("test", || -> Result<(), GdbError> { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, GdbError::State(StateError::DatabaseClosing)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn close_times_out_if_a_task_never_finishes() {
        let queue = TaskQueue::spawn();
        let queue2 = queue.clone();
        tokio::spawn(async move {
            let _ = queue2
                .enqueue("slow", || -> Result<(), GdbError> {
                    std::thread::sleep(std::time::Duration::from_millis(500));
                    Ok(())
                })
                .await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let err = queue.close(10).await.unwrap_err();
        assert!(matches!(err, GdbError::State(StateError::DatabaseCloseTimeout { .. })));
    }
}
