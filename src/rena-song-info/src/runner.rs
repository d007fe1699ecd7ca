//! Single-shot background tasks with results delivered back to the main context.
//!
//! [`AsyncTaskRunner::launch`] runs a worker on its own thread. When the
//! worker returns, its result is queued for the thread that owns the runner
//! and the completion callback only runs when that thread calls
//! [`AsyncTaskRunner::dispatch_pending`] (or one of the waiting helpers).
//! The runner is `!Sync`, so completions from one runner never overlap.
//!
//! Workers cannot be interrupted. Callers that need cancellation share a
//! flag with the worker or discard late results in the completion.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

const WORKER_THREAD_NAME: &str = "rena-info-worker";

type TaskId = u64;
type WorkerOutput = Box<dyn Any + Send>;
type Completion = Box<dyn FnOnce(WorkerOutput)>;

enum Message {
    Completed(TaskId, WorkerOutput),
    /// The worker panicked before producing a result.
    Abandoned(TaskId),
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(std::io::Error),
}

/// Handle to a launched worker thread.
#[derive(Debug)]
pub struct TaskHandle {
    join: JoinHandle<()>,
}

impl TaskHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Blocks until the worker thread exits. Returns `false` if it panicked.
    ///
    /// The completion may still be queued; it runs on the next dispatch.
    pub fn join(self) -> bool {
        self.join.join().is_ok()
    }
}

/// Completions stay on the runner's thread; only worker results cross threads,
/// so `on_complete` may capture thread-bound state such as `Rc`.
pub struct AsyncTaskRunner {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
    next_id: Cell<TaskId>,
    pending: RefCell<HashMap<TaskId, Completion>>,
}

impl std::fmt::Debug for AsyncTaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncTaskRunner")
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl Default for AsyncTaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncTaskRunner {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            next_id: Cell::new(0),
            pending: RefCell::new(HashMap::new()),
        }
    }

    /// Runs `worker` on a new thread; `on_complete` later receives its result
    /// on the thread that dispatches this runner.
    pub fn launch<W, R, F>(&self, worker: W, on_complete: F) -> Result<(), RunnerError>
    where
        W: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
        F: FnOnce(R) + 'static,
    {
        self.launch_joinable(worker, on_complete).map(drop)
    }

    /// Like [`launch`](Self::launch), returning a handle for callers that must
    /// wait for the worker thread (e.g. at shutdown).
    pub fn launch_joinable<W, R, F>(
        &self,
        worker: W,
        on_complete: F,
    ) -> Result<TaskHandle, RunnerError>
    where
        W: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
        F: FnOnce(R) + 'static,
    {
        let id = self.next_id.get();
        self.next_id.set(id.wrapping_add(1));
        let sender = self.sender.clone();

        let spawned = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let delivery = Delivery {
                    id,
                    sender: Some(sender),
                };
                let result = worker();
                delivery.complete(Box::new(result));
            });

        match spawned {
            Ok(join) => {
                let completion: Completion = Box::new(move |output: WorkerOutput| {
                    match output.downcast::<R>() {
                        Ok(result) => on_complete(*result),
                        Err(_) => tracing::error!(task = id, "worker result has an unexpected type"),
                    }
                });
                self.pending.borrow_mut().insert(id, completion);
                Ok(TaskHandle { join })
            }
            Err(e) => Err(RunnerError::Spawn(e)),
        }
    }

    /// Launched tasks whose completion has not been dispatched yet.
    pub fn in_flight(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Runs every completion already queued. Never blocks.
    pub fn dispatch_pending(&self) -> usize {
        let mut dispatched = 0;
        while let Ok(message) = self.receiver.try_recv() {
            self.dispatch(message);
            dispatched += 1;
        }
        dispatched
    }

    /// Blocks up to `timeout` for one completion and runs it.
    pub fn wait_for_completion(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => {
                self.dispatch(message);
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Dispatches completions until nothing is in flight. Returns `false` on timeout.
    pub fn run_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.in_flight() > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !self.wait_for_completion(remaining) {
                return false;
            }
        }
        true
    }

    fn dispatch(&self, message: Message) {
        match message {
            Message::Completed(id, output) => {
                // Released before the call: completions may launch new tasks.
                let completion = self.pending.borrow_mut().remove(&id);
                match completion {
                    Some(completion) => completion(output),
                    None => tracing::debug!(task = id, "result for unknown task dropped"),
                }
            }
            Message::Abandoned(id) => {
                self.pending.borrow_mut().remove(&id);
                tracing::warn!(task = id, "background task panicked; no result delivered");
            }
        }
    }
}

/// Sends exactly one message per task: the result, or `Abandoned` if the
/// worker unwinds first.
struct Delivery {
    id: TaskId,
    sender: Option<Sender<Message>>,
}

impl Delivery {
    fn complete(mut self, output: WorkerOutput) {
        if let Some(sender) = self.sender.take() {
            if sender.send(Message::Completed(self.id, output)).is_err() {
                tracing::debug!("task runner dropped before completion; result discarded");
            }
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Message::Abandoned(self.id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn completion_runs_on_dispatching_thread() {
        let runner = AsyncTaskRunner::new();
        let worker_thread = Arc::new(Mutex::new(None));
        let completion_thread = Arc::new(Mutex::new(None));

        let worker_slot = worker_thread.clone();
        let completion_slot = completion_thread.clone();
        runner
            .launch(
                move || {
                    *worker_slot.lock().unwrap() = Some(thread::current().id());
                    21 * 2
                },
                move |value| {
                    assert_eq!(value, 42);
                    *completion_slot.lock().unwrap() = Some(thread::current().id());
                },
            )
            .unwrap();

        assert!(runner.run_until_idle(TIMEOUT));
        let main = thread::current().id();
        assert_eq!(*completion_thread.lock().unwrap(), Some(main));
        assert_ne!(*worker_thread.lock().unwrap(), Some(main));
    }

    #[test]
    fn launch_returns_before_worker_finishes() {
        let runner = AsyncTaskRunner::new();
        let (release, gate) = mpsc::channel::<()>();
        let done = Arc::new(AtomicBool::new(false));

        let flag = done.clone();
        runner
            .launch(
                move || gate.recv().is_ok(),
                move |released| flag.store(released, Ordering::SeqCst),
            )
            .unwrap();

        assert_eq!(runner.in_flight(), 1);
        assert_eq!(runner.dispatch_pending(), 0);
        assert!(!done.load(Ordering::SeqCst));

        release.send(()).unwrap();
        assert!(runner.run_until_idle(TIMEOUT));
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn each_completion_runs_exactly_once_and_never_overlaps() {
        let runner = AsyncTaskRunner::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let busy = Arc::new(AtomicBool::new(false));

        for i in 0..8u64 {
            let calls = calls.clone();
            let busy = busy.clone();
            runner
                .launch(
                    move || {
                        thread::sleep(Duration::from_millis(8 - i));
                        i
                    },
                    move |_| {
                        assert!(!busy.swap(true, Ordering::SeqCst));
                        calls.fetch_add(1, Ordering::SeqCst);
                        busy.store(false, Ordering::SeqCst);
                    },
                )
                .unwrap();
        }

        assert!(runner.run_until_idle(TIMEOUT));
        assert_eq!(calls.load(Ordering::SeqCst), 8);
        assert_eq!(runner.dispatch_pending(), 0);
    }

    #[test]
    fn joinable_handle_waits_for_worker() {
        let runner = AsyncTaskRunner::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let slot = seen.clone();

        let handle = runner
            .launch_joinable(|| "done", move |_| {
                slot.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert!(handle.join());
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(runner.dispatch_pending(), 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_worker_does_not_leave_task_in_flight() {
        let runner = AsyncTaskRunner::new();
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();

        runner
            .launch(
                || -> u32 { panic!("worker failure") },
                move |_| flag.store(true, Ordering::SeqCst),
            )
            .unwrap();

        assert!(runner.run_until_idle(TIMEOUT));
        assert_eq!(runner.in_flight(), 0);
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn completion_may_hold_thread_bound_state() {
        let runner = AsyncTaskRunner::new();
        let seen = Rc::new(Cell::new(0));
        let slot = Rc::clone(&seen);

        runner.launch(|| 7, move |value| slot.set(value)).unwrap();

        assert!(runner.run_until_idle(TIMEOUT));
        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn completion_can_launch_follow_up_task() {
        let runner = Rc::new(AsyncTaskRunner::new());
        let results = Rc::new(RefCell::new(Vec::new()));

        let chained = Rc::clone(&runner);
        let sink = Rc::clone(&results);
        runner
            .launch(
                || 1,
                move |first| {
                    sink.borrow_mut().push(first);
                    let sink = Rc::clone(&sink);
                    chained
                        .launch(move || first + 1, move |second| sink.borrow_mut().push(second))
                        .unwrap();
                },
            )
            .unwrap();

        assert!(runner.run_until_idle(TIMEOUT));
        assert_eq!(*results.borrow(), vec![1, 2]);
    }

    #[test]
    fn idle_runner_returns_immediately() {
        let runner = AsyncTaskRunner::new();
        assert!(runner.run_until_idle(Duration::ZERO));
        assert!(!runner.wait_for_completion(Duration::from_millis(10)));
    }
}
