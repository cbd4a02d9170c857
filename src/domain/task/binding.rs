//! Task Binding
//!
//! Per-task state machine and cancellation protocol, plus the [`Task`] handle
//! returned to callers.

use super::factory::{Shared, Withdrawal};
use super::model::{Procedure, StateCallback, Status, TaskDescriptor, TaskId, TaskState};
use crate::domain::object::Context;
use crate::error::TaskFailure;
use chrono::{DateTime, Utc};
use parking_lot::{Condvar, MappedMutexGuard, Mutex, MutexGuard};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use uuid::Uuid;

struct Lifecycle {
    state: TaskState,
    /// Set once the terminal status has been reported to the callback
    settled: bool,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

/// State of one submitted task
///
/// Shared between the caller's [`Task`] handle and the factory's queue or
/// processing map.
pub(crate) struct Binding {
    id: TaskId,
    /// Back-link to the owning factory; cleared once canceled or executed
    factory: Mutex<Option<Weak<Shared>>>,
    procedure: Arc<dyn Procedure>,
    on_state_changed: Option<StateCallback>,
    lifecycle: Mutex<Lifecycle>,
    settled: Condvar,
    /// Taken out by the worker while the procedure runs
    context: Mutex<Option<Context>>,
    created_at: DateTime<Utc>,
}

impl Binding {
    pub(crate) fn new(factory: Weak<Shared>, descriptor: TaskDescriptor) -> Self {
        let TaskDescriptor {
            procedure,
            context,
            on_state_changed,
        } = descriptor;

        Self {
            id: Uuid::new_v4(),
            factory: Mutex::new(Some(factory)),
            procedure,
            on_state_changed,
            lifecycle: Mutex::new(Lifecycle {
                state: TaskState::Waiting,
                settled: false,
                started_at: None,
                finished_at: None,
            }),
            settled: Condvar::new(),
            context: Mutex::new(context),
            created_at: Utc::now(),
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn status(&self) -> Status {
        self.lifecycle.lock().state.status()
    }

    /// Execute the procedure; called exactly once by the dequeuing worker
    ///
    /// Never panics: procedure errors and panics end in `Exception`.
    pub(crate) fn run(&self) {
        if !self.transition(TaskState::Running) {
            self.detach();
            return;
        }

        let mut context = self.context.lock().take().unwrap_or_default();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.procedure.run(&mut context)));
        *self.context.lock() = Some(context);

        let next = match outcome {
            Ok(Ok(())) => TaskState::Done,
            Ok(Err(err)) => TaskState::Exception(TaskFailure::from(err)),
            Err(payload) => TaskState::Exception(TaskFailure::from_panic(payload.as_ref())),
        };
        if let TaskState::Exception(failure) = &next {
            tracing::debug!(task_id = %self.id, error = %failure, "Procedure failed");
        }
        self.transition(next);
        self.detach();
    }

    /// Cancel the task
    ///
    /// A queued task is removed and marked `Canceled`. A running task gets its
    /// procedure's cancel hook invoked. Anything else is a no-op.
    pub(crate) fn cancel(&self) {
        let mut link = self.factory.lock();
        let Some(shared) = link.as_ref().and_then(Weak::upgrade) else {
            return;
        };

        match shared.withdraw(self.id) {
            Withdrawal::Dequeued => {
                *link = None;
                drop(link);
                tracing::debug!(task_id = %self.id, "Queued task canceled");
                self.transition(TaskState::Canceled);
            }
            Withdrawal::Processing => {
                tracing::debug!(task_id = %self.id, "Signaling cancellation to running procedure");
                self.procedure.cancel();
            }
            Withdrawal::NotFound => {}
        }
    }

    /// Mark a task the factory already removed from its queue as canceled
    pub(crate) fn cancel_dequeued(&self) {
        self.detach();
        self.transition(TaskState::Canceled);
    }

    fn detach(&self) {
        *self.factory.lock() = None;
    }

    /// Move to `next` if it is a forward step; returns whether the state changed
    fn transition(&self, next: TaskState) -> bool {
        let status = next.status();
        {
            let mut lifecycle = self.lifecycle.lock();
            if !lifecycle.state.status().can_transition_to(status) {
                return false;
            }
            let now = Utc::now();
            if status == Status::Running {
                lifecycle.started_at = Some(now);
            } else {
                lifecycle.finished_at = Some(now);
            }
            lifecycle.state = next;
        }

        tracing::trace!(task_id = %self.id, %status, "Task status changed");
        self.notify(status);

        if status.is_terminal() {
            self.lifecycle.lock().settled = true;
            self.settled.notify_all();
        }
        true
    }

    fn notify(&self, status: Status) {
        let Some(callback) = &self.on_state_changed else {
            return;
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(status))) {
            tracing::warn!(
                task_id = %self.id,
                %status,
                panic = %TaskFailure::from_panic(payload.as_ref()),
                "State change callback panicked"
            );
        }
    }
}

/// Handle to a submitted task
///
/// Cloning the handle shares the same task.
#[derive(Clone)]
pub struct Task {
    binding: Arc<Binding>,
}

impl Task {
    pub(crate) fn new(binding: Arc<Binding>) -> Self {
        Self { binding }
    }

    #[must_use]
    pub fn id(&self) -> TaskId {
        self.binding.id
    }

    /// Current status; safe to call from any thread at any time
    #[must_use]
    pub fn status(&self) -> Status {
        self.binding.status()
    }

    /// Cancel the task
    ///
    /// Still queued: it is removed and becomes `Canceled` without running.
    /// Running: the procedure's cancel hook is invoked and the task ends in
    /// whatever state the procedure unwinds to. Finished: no-op.
    pub fn cancel(&self) {
        self.binding.cancel();
    }

    /// Execution context, available once the task is terminal
    ///
    /// `None` while waiting or running, and for a task canceled before it ran
    /// without a context of its own.
    #[must_use]
    pub fn context(&self) -> Option<MappedMutexGuard<'_, Context>> {
        if !self.status().is_terminal() {
            return None;
        }
        MutexGuard::try_map(self.binding.context.lock(), Option::as_mut).ok()
    }

    /// Failure of the procedure; only present in `Exception`
    #[must_use]
    pub fn exception(&self) -> Option<TaskFailure> {
        self.binding.lifecycle.lock().state.failure().cloned()
    }

    /// Forward an event object to the procedure
    pub fn send_event(&self, event: &dyn Any) {
        self.binding.procedure.on_event(event);
    }

    /// Block until the task reached a terminal status
    pub fn wait(&self) -> Status {
        let mut lifecycle = self.binding.lifecycle.lock();
        self.binding
            .settled
            .wait_while(&mut lifecycle, |lifecycle| !lifecycle.settled);
        lifecycle.state.status()
    }

    /// Block until the task is terminal or `timeout` elapsed
    ///
    /// Returns the status observed when returning.
    pub fn wait_timeout(&self, timeout: Duration) -> Status {
        let deadline = Instant::now() + timeout;
        let mut lifecycle = self.binding.lifecycle.lock();
        while !lifecycle.settled {
            if self
                .binding
                .settled
                .wait_until(&mut lifecycle, deadline)
                .timed_out()
            {
                break;
            }
        }
        lifecycle.state.status()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.binding.created_at
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.binding.lifecycle.lock().started_at
    }

    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.binding.lifecycle.lock().finished_at
    }

    /// Get execution duration in milliseconds
    #[must_use]
    pub fn duration_ms(&self) -> Option<u64> {
        let lifecycle = self.binding.lifecycle.lock();
        match (lifecycle.started_at, lifecycle.finished_at) {
            (Some(start), Some(end)) => {
                let duration = end.signed_duration_since(start);
                Some(duration.num_milliseconds().max(0) as u64)
            }
            (Some(start), None) => {
                let duration = Utc::now().signed_duration_since(start);
                Some(duration.num_milliseconds().max(0) as u64)
            }
            _ => None,
        }
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.binding, &other.binding)
    }
}

impl Eq for Task {}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.binding.id)
            .field("status", &self.status())
            .finish()
    }
}
