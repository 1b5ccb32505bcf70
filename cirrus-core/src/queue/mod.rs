//! Bounded FIFO work queue with a fixed worker pool.
//!
//! The pipeline thread enqueues one task per extracted utterance; the
//! workers execute the slow stages (resampling, inference, persistence) off
//! the time-critical path. The queue is deliberately bounded: when workers
//! fall behind, `enqueue` blocks the pipeline thread — backpressure, not an
//! error, and never memory growth. The capture callback never touches this
//! module.
//!
//! One mutex guards the task list and stop flag; two condvars signal
//! "task added" (wakes workers) and "task removed" (wakes a blocked
//! enqueuer). Workers drain everything already queued before honouring the
//! stop flag, so shutdown never discards accepted work.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use crate::error::{CirrusError, Result};

/// A unit of deferred work. Ownership of the captured state moves into the
/// queue at enqueue time and to the executing worker at dequeue time.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

struct QueueState {
    tasks: VecDeque<Task>,
    stop: bool,
}

/// Fixed-capacity task FIFO.
pub struct WorkQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    task_added: Condvar,
    task_removed: Condvar,
}

impl WorkQueue {
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            capacity,
            state: Mutex::new(QueueState {
                tasks: VecDeque::with_capacity(capacity),
                stop: false,
            }),
            task_added: Condvar::new(),
            task_removed: Condvar::new(),
        }
    }

    /// Append a task, blocking while the queue is full.
    ///
    /// # Errors
    /// `CirrusError::QueueClosed` once `shutdown` has been called.
    pub fn enqueue(&self, task: Task) -> Result<()> {
        let mut state = self.state.lock();
        loop {
            if state.stop {
                return Err(CirrusError::QueueClosed);
            }
            if state.tasks.len() < self.capacity {
                state.tasks.push_back(task);
                debug!(depth = state.tasks.len(), "task enqueued");
                self.task_added.notify_one();
                return Ok(());
            }
            // Full: wait for a worker to make room.
            self.task_removed.wait(&mut state);
        }
    }

    /// Worker side: blocking pop. Returns `None` only when the queue is
    /// stopped *and* empty — queued tasks are always drained first.
    fn dequeue(&self) -> Option<Task> {
        let mut state = self.state.lock();
        loop {
            if let Some(task) = state.tasks.pop_front() {
                debug!(depth = state.tasks.len(), "task dequeued");
                self.task_removed.notify_one();
                return Some(task);
            }
            if state.stop {
                return None;
            }
            self.task_added.wait(&mut state);
        }
    }

    /// Stop accepting tasks and wake every waiter, workers and enqueuers.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.stop = true;
        self.task_added.notify_all();
        self.task_removed.notify_all();
    }

    /// Current queue depth (diagnostic snapshot).
    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fixed set of OS threads servicing a shared `WorkQueue`.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `num_threads` workers. Thread count is fixed for the pool's
    /// lifetime — no dynamic growth.
    pub fn spawn(queue: Arc<WorkQueue>, num_threads: usize) -> Self {
        info!(num_threads, "starting worker pool");
        let workers = (0..num_threads)
            .map(|i| {
                let queue = Arc::clone(&queue);
                thread::Builder::new()
                    .name(format!("cirrus-worker-{i}"))
                    .spawn(move || {
                        while let Some(task) = queue.dequeue() {
                            task();
                        }
                        debug!(worker = i, "worker exiting");
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();
        Self { workers }
    }

    /// Wait for all workers to exit. Call after `WorkQueue::shutdown`;
    /// every task enqueued before shutdown will have executed.
    pub fn join(self) {
        for handle in self.workers {
            let _ = handle.join();
        }
        info!("worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;

    #[test]
    fn tasks_dequeue_in_enqueue_order() {
        let queue = Arc::new(WorkQueue::with_capacity(10));
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..8 {
            let order = Arc::clone(&order);
            queue
                .enqueue(Box::new(move || order.lock().push(i)))
                .expect("enqueue");
        }

        // A single worker preserves strict FIFO execution order.
        let pool = WorkerPool::spawn(Arc::clone(&queue), 1);
        queue.shutdown();
        pool.join();

        assert_eq!(&*order.lock(), &vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn all_tasks_run_exactly_once_with_multiple_workers() {
        let queue = Arc::new(WorkQueue::with_capacity(4));
        let executed = Arc::new(AtomicUsize::new(0));

        let pool = WorkerPool::spawn(Arc::clone(&queue), 3);
        for _ in 0..50 {
            let executed = Arc::clone(&executed);
            queue
                .enqueue(Box::new(move || {
                    executed.fetch_add(1, Ordering::SeqCst);
                }))
                .expect("enqueue");
        }
        queue.shutdown();
        pool.join();

        assert_eq!(executed.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn full_queue_blocks_enqueue_until_a_dequeue() {
        let queue = Arc::new(WorkQueue::with_capacity(2));
        queue.enqueue(Box::new(|| {})).expect("enqueue");
        queue.enqueue(Box::new(|| {})).expect("enqueue");

        let entered = Arc::new(AtomicBool::new(false));
        let blocked_enqueue = {
            let queue = Arc::clone(&queue);
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                entered.store(true, Ordering::SeqCst);
                queue.enqueue(Box::new(|| {})).expect("enqueue after room");
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(entered.load(Ordering::SeqCst));
        assert!(!blocked_enqueue.is_finished(), "enqueue should be blocked");
        assert_eq!(queue.len(), 2);

        // One dequeue makes room; the blocked enqueue must now complete.
        let task = queue.dequeue().expect("task available");
        task();
        blocked_enqueue.join().expect("enqueue thread panicked");
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn shutdown_drains_pending_tasks_before_workers_exit() {
        let queue = Arc::new(WorkQueue::with_capacity(10));
        let executed = Arc::new(AtomicUsize::new(0));

        // Workers not yet running — queue 5 tasks, then shut down.
        for _ in 0..5 {
            let executed = Arc::clone(&executed);
            queue
                .enqueue(Box::new(move || {
                    executed.fetch_add(1, Ordering::SeqCst);
                }))
                .expect("enqueue");
        }
        queue.shutdown();

        let pool = WorkerPool::spawn(Arc::clone(&queue), 2);
        pool.join();

        assert_eq!(executed.load(Ordering::SeqCst), 5);
        assert!(queue.is_empty());
    }

    #[test]
    fn enqueue_after_shutdown_is_rejected() {
        let queue = WorkQueue::with_capacity(2);
        queue.shutdown();
        let err = queue.enqueue(Box::new(|| {})).unwrap_err();
        assert!(matches!(err, CirrusError::QueueClosed));
    }

    #[test]
    fn shutdown_unblocks_a_full_queue_enqueuer() {
        let queue = Arc::new(WorkQueue::with_capacity(1));
        queue.enqueue(Box::new(|| {})).expect("enqueue");

        let blocked = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.enqueue(Box::new(|| {})))
        };
        thread::sleep(Duration::from_millis(30));
        queue.shutdown();

        let result = blocked.join().expect("enqueue thread panicked");
        assert!(matches!(result, Err(CirrusError::QueueClosed)));
    }
}
