//! Task Factory
//!
//! Bounded worker pool executing procedures in FIFO submission order.
//!
//! Workers are spawned on demand up to `max-threads` and retire after
//! `thread-timeout-ms` without work. Dropping the factory cancels every queued
//! task and blocks until all workers have exited.

use super::binding::{Binding, Task};
use super::model::{TaskDescriptor, TaskId};
use super::worker::Worker;
use crate::config::TaskFactoryConfig;
use crate::error::ConfigResult;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Pending tasks plus worker bookkeeping, guarded by one lock
pub(crate) struct PoolQueue {
    pub(crate) pending: VecDeque<Arc<Binding>>,
    /// Worker threads alive (busy or idle)
    pub(crate) live: usize,
    /// Workers parked waiting for work
    pub(crate) idle: usize,
}

/// Where a task was found when withdrawing it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Withdrawal {
    /// Removed from the pending queue
    Dequeued,
    /// Bound to a worker
    Processing,
    NotFound,
}

/// State shared between the factory, its workers and task bindings
pub(crate) struct Shared {
    pub(crate) queue: Mutex<PoolQueue>,
    /// Wakes idle workers; paired with `queue`
    pub(crate) work_available: Condvar,
    /// Signals a retired worker; paired with `queue`
    pub(crate) workers_finished: Condvar,
    processing: Mutex<HashMap<TaskId, Arc<Binding>>>,
    /// Worker cap; forced to zero on shutdown
    max_threads: AtomicUsize,
    pub(crate) thread_timeout: Duration,
    worker_index: AtomicUsize,
}

impl Shared {
    fn new(config: &TaskFactoryConfig) -> Self {
        Self {
            queue: Mutex::new(PoolQueue {
                pending: VecDeque::new(),
                live: 0,
                idle: 0,
            }),
            work_available: Condvar::new(),
            workers_finished: Condvar::new(),
            processing: Mutex::new(HashMap::new()),
            max_threads: AtomicUsize::new(config.max_threads()),
            thread_timeout: config.thread_timeout(),
            worker_index: AtomicUsize::new(0),
        }
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.max_threads.load(Ordering::Acquire) == 0
    }

    pub(crate) fn next_worker_index(&self) -> usize {
        self.worker_index.fetch_add(1, Ordering::Relaxed)
    }

    /// Pop the queue head and bind it to the calling worker
    ///
    /// The move into the processing map happens under the queue lock, so a
    /// task is never observed in both places or in neither.
    pub(crate) fn next_binding(&self) -> Option<Arc<Binding>> {
        let mut queue = self.queue.lock();
        if self.is_shut_down() {
            return None;
        }
        let binding = queue.pending.pop_front()?;
        self.processing
            .lock()
            .insert(binding.id(), Arc::clone(&binding));
        tracing::trace!(task_id = %binding.id(), pending = queue.pending.len(), "Task dequeued");
        Some(binding)
    }

    pub(crate) fn finish_processing(&self, id: TaskId) {
        self.processing.lock().remove(&id);
    }

    /// Remove a queued task, or report whether it is being processed
    pub(crate) fn withdraw(&self, id: TaskId) -> Withdrawal {
        let mut queue = self.queue.lock();
        if let Some(position) = queue.pending.iter().position(|binding| binding.id() == id) {
            queue.pending.remove(position);
            return Withdrawal::Dequeued;
        }
        if self.processing.lock().contains_key(&id) {
            Withdrawal::Processing
        } else {
            Withdrawal::NotFound
        }
    }
}

/// Bounded pool of worker threads executing submitted procedures
pub struct TaskFactory {
    shared: Arc<Shared>,
    config: TaskFactoryConfig,
}

impl TaskFactory {
    /// Create a factory from a validated configuration
    ///
    /// [`TaskFactoryConfig`] can only be built through its validating
    /// constructors, so the limits are already checked here.
    #[must_use]
    pub fn new(config: TaskFactoryConfig) -> Self {
        tracing::debug!(
            max_threads = config.max_threads(),
            thread_timeout_ms = config.thread_timeout().as_millis() as u64,
            "Task factory created"
        );
        Self {
            shared: Arc::new(Shared::new(&config)),
            config,
        }
    }

    /// Create a factory from `(key, value)` settings
    ///
    /// Recognizes `max-threads` (required, 1..=1000) and `thread-timeout-ms`
    /// (optional, > 0). Any other key fails construction.
    pub fn from_settings<K, V>(settings: &[(K, V)]) -> ConfigResult<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Ok(Self::new(TaskFactoryConfig::from_settings(settings)?))
    }

    #[must_use]
    pub fn config(&self) -> &TaskFactoryConfig {
        &self.config
    }

    /// Submit a task; returns immediately
    ///
    /// A worker is spawned when fewer than `max-threads` are alive and the
    /// idle ones cannot cover the queue.
    pub fn create_task(&self, descriptor: TaskDescriptor) -> Task {
        let binding = Arc::new(Binding::new(Arc::downgrade(&self.shared), descriptor));

        let spawn_worker = {
            let mut queue = self.shared.queue.lock();
            queue.pending.push_back(Arc::clone(&binding));
            let max_threads = self.shared.max_threads.load(Ordering::Acquire);
            if queue.live < max_threads && queue.idle < queue.pending.len() {
                queue.live += 1;
                true
            } else {
                false
            }
        };
        tracing::trace!(task_id = %binding.id(), spawn_worker, "Task queued");

        if spawn_worker {
            if let Err(e) = Worker::spawn(&self.shared) {
                tracing::error!(error = %e, "Failed to spawn worker thread");
                self.shared.queue.lock().live -= 1;
                self.shared.workers_finished.notify_all();
            }
        }

        self.shared.work_available.notify_one();
        Task::new(binding)
    }

    /// Snapshot of all queued and running tasks
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        let queue = self.shared.queue.lock();
        let processing = self.shared.processing.lock();
        queue
            .pending
            .iter()
            .chain(processing.values())
            .map(|binding| Task::new(Arc::clone(binding)))
            .collect()
    }

    /// Number of worker threads currently alive
    #[must_use]
    pub fn live_workers(&self) -> usize {
        self.shared.queue.lock().live
    }

    /// Number of worker threads parked waiting for work
    #[must_use]
    pub fn idle_workers(&self) -> usize {
        self.shared.queue.lock().idle
    }

    /// Number of tasks waiting for a worker
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.shared.queue.lock().pending.len()
    }

    /// Number of tasks bound to a worker
    #[must_use]
    pub fn processing_count(&self) -> usize {
        self.shared.processing.lock().len()
    }
}

impl Drop for TaskFactory {
    fn drop(&mut self) {
        let canceled: Vec<Arc<Binding>> = {
            let mut queue = self.shared.queue.lock();
            self.shared.max_threads.store(0, Ordering::Release);
            queue.pending.drain(..).collect()
        };
        tracing::debug!(canceled = canceled.len(), "Task factory shutting down");

        for binding in &canceled {
            binding.cancel_dequeued();
        }

        self.shared.work_available.notify_all();

        let mut queue = self.shared.queue.lock();
        self.shared
            .workers_finished
            .wait_while(&mut queue, |queue| queue.live > 0);
        tracing::debug!("Task factory stopped");
    }
}

impl fmt::Debug for TaskFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFactory")
            .field("max_threads", &self.config.max_threads())
            .field("thread_timeout", &self.config.thread_timeout())
            .field("live_workers", &self.live_workers())
            .field("queued", &self.queued_count())
            .field("processing", &self.processing_count())
            .finish()
    }
}
