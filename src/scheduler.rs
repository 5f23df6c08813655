//! Serial delayed-task queues
//!
//! Touch-mode commands run on one dedicated queue: tasks run one at a time,
//! in deadline order, FIFO among equal deadlines. [`WorkerQueue`] backs the
//! queue with a real thread; [`VirtualScheduler`] runs the same contract
//! against a manually advanced clock.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait SerialScheduler: Send + Sync {
    /// Run `task` once `delay` has elapsed
    fn post_delayed(&self, delay: Duration, task: Task);
}

/// Heap entry ordered by (deadline, sequence), earliest first
struct Entry<T> {
    deadline: T,
    seq: u64,
    task: Task,
}

impl<T: Ord> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T: Ord> Eq for Entry<T> {}

impl<T: Ord> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Ord> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

enum Message {
    Post { deadline: Instant, task: Task },
    Shutdown,
}

/// Dedicated background thread running delayed tasks serially
///
/// Pending tasks are dropped unrun on shutdown.
pub struct WorkerQueue {
    sender: Sender<Message>,
    handle: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl WorkerQueue {
    pub fn spawn(name: &str) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Message>();
        let queue_name = name.to_string();
        let handle = thread::Builder::new()
            .name(queue_name.clone())
            .spawn(move || {
                info!(queue = %queue_name, "Worker queue started");
                let mut pending: BinaryHeap<Entry<Instant>> = BinaryHeap::new();
                let mut seq = 0u64;
                loop {
                    let message = match pending.peek() {
                        Some(next) => {
                            let wait = next.deadline.saturating_duration_since(Instant::now());
                            match receiver.recv_timeout(wait) {
                                Ok(message) => Some(message),
                                Err(RecvTimeoutError::Timeout) => None,
                                Err(RecvTimeoutError::Disconnected) => break,
                            }
                        }
                        None => match receiver.recv() {
                            Ok(message) => Some(message),
                            Err(_) => break,
                        },
                    };

                    match message {
                        Some(Message::Post { deadline, task }) => {
                            pending.push(Entry { deadline, seq, task });
                            seq += 1;
                        }
                        Some(Message::Shutdown) => break,
                        None => {}
                    }

                    let now = Instant::now();
                    while pending.peek().is_some_and(|next| next.deadline <= now) {
                        if let Some(entry) = pending.pop() {
                            (entry.task)();
                        }
                    }
                }
                debug!(queue = %queue_name, dropped = pending.len(), "Worker queue stopped");
            })?;
        let worker_id = handle.thread().id();

        Ok(Self {
            sender,
            handle: Some(handle),
            worker_id,
        })
    }
}

impl SerialScheduler for WorkerQueue {
    fn post_delayed(&self, delay: Duration, task: Task) {
        let deadline = Instant::now() + delay;
        if self.sender.send(Message::Post { deadline, task }).is_err() {
            error!("Worker queue has stopped, dropping task");
        }
    }
}

impl Drop for WorkerQueue {
    fn drop(&mut self) {
        let _ = self.sender.send(Message::Shutdown);
        // A task holding the last reference drops us on the worker itself
        if thread::current().id() == self.worker_id {
            return;
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("Worker queue thread panicked");
        }
    }
}

/// Deterministic scheduler driven by [`VirtualScheduler::advance`]
#[derive(Default)]
pub struct VirtualScheduler {
    state: Mutex<VirtualState>,
}

#[derive(Default)]
struct VirtualState {
    now: Duration,
    seq: u64,
    pending: BinaryHeap<Entry<Duration>>,
}

impl VirtualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Move time forward, running every task that falls due on the way
    ///
    /// Tasks run without the internal lock held, so they may post more tasks;
    /// those run too if they fall due before the target time.
    pub fn advance(&self, by: Duration) {
        let target = self.lock().now + by;
        loop {
            let next = {
                let mut state = self.lock();
                if state.pending.peek().is_some_and(|e| e.deadline <= target) {
                    state.pending.pop().map(|entry| {
                        state.now = entry.deadline;
                        entry.task
                    })
                } else {
                    None
                }
            };
            match next {
                Some(task) => task(),
                None => break,
            }
        }
        self.lock().now = target;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VirtualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SerialScheduler for VirtualScheduler {
    fn post_delayed(&self, delay: Duration, task: Task) {
        let mut state = self.lock();
        let deadline = state.now + delay;
        let seq = state.seq;
        state.seq += 1;
        state.pending.push(Entry { deadline, seq, task });
    }
}
