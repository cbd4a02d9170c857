//! Task Worker
//!
//! A pool thread that drains the factory queue, parks while idle and retires
//! after the configured idle timeout or on shutdown.

use super::factory::Shared;
use std::io;
use std::sync::Arc;
use std::thread;

/// Pool worker bound to the shared factory state
pub(crate) struct Worker {
    shared: Arc<Shared>,
}

impl Worker {
    /// Start a detached worker thread
    ///
    /// The caller must already have counted the worker as live.
    pub(crate) fn spawn(shared: &Arc<Shared>) -> io::Result<()> {
        let worker = Worker {
            shared: Arc::clone(shared),
        };
        thread::Builder::new()
            .name(format!("jboot-task-{}", shared.next_worker_index()))
            .spawn(move || worker.run())?;
        Ok(())
    }

    fn run(self) {
        tracing::debug!("Worker started");

        loop {
            while let Some(binding) = self.shared.next_binding() {
                binding.run();
                self.shared.finish_processing(binding.id());
            }

            if !self.wait_for_work() {
                break;
            }
        }

        tracing::debug!("Worker retired");
    }

    /// Park until work arrives; returns `false` once the worker has retired
    ///
    /// Retirement is decided and accounted under the queue lock so a task
    /// enqueued concurrently always sees an accurate worker count.
    fn wait_for_work(&self) -> bool {
        let shared = &self.shared;
        let mut queue = shared.queue.lock();

        if queue.pending.is_empty() && !shared.is_shut_down() {
            queue.idle += 1;
            shared.work_available.wait_while_for(
                &mut queue,
                |queue| queue.pending.is_empty() && !shared.is_shut_down(),
                shared.thread_timeout,
            );
            queue.idle -= 1;
        }

        if shared.is_shut_down() || queue.pending.is_empty() {
            queue.live -= 1;
            shared.workers_finished.notify_all();
            return false;
        }
        true
    }
}
