//! Task Model
//!
//! Core data structures shared by the task factory, its bindings and workers.

use crate::domain::object::Context;
use crate::error::{ProcedureError, TaskFailure};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Task identifier
pub type TaskId = Uuid;

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Task is queued and waiting for a worker
    Waiting,
    /// Task is currently running on a worker
    Running,
    /// Procedure returned normally
    Done,
    /// Procedure failed
    Exception,
    /// Task was canceled before it started
    Canceled,
}

impl Status {
    /// Check if the task is in a terminal state
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Done | Status::Exception | Status::Canceled)
    }

    /// Whether moving from `self` to `next` is a forward lifecycle step
    #[must_use]
    pub fn can_transition_to(&self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Waiting, Status::Running)
                | (Status::Waiting, Status::Canceled)
                | (Status::Running, Status::Done)
                | (Status::Running, Status::Exception)
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Waiting => write!(f, "waiting"),
            Status::Running => write!(f, "running"),
            Status::Done => write!(f, "done"),
            Status::Exception => write!(f, "exception"),
            Status::Canceled => write!(f, "canceled"),
        }
    }
}

/// Lifecycle state of a task, failure included
///
/// A failure can only exist in the `Exception` state.
#[derive(Debug, Clone)]
pub enum TaskState {
    Waiting,
    Running,
    Done,
    Exception(TaskFailure),
    Canceled,
}

impl TaskState {
    #[must_use]
    pub fn status(&self) -> Status {
        match self {
            TaskState::Waiting => Status::Waiting,
            TaskState::Running => Status::Running,
            TaskState::Done => Status::Done,
            TaskState::Exception(_) => Status::Exception,
            TaskState::Canceled => Status::Canceled,
        }
    }

    #[must_use]
    pub fn failure(&self) -> Option<&TaskFailure> {
        match self {
            TaskState::Exception(failure) => Some(failure),
            _ => None,
        }
    }
}

/// A unit of work executed by the task factory
///
/// `cancel` may be called from another thread while `run` is executing and
/// should make `run` return early.
pub trait Procedure: Send + Sync {
    /// Execute the procedure against its context
    fn run(&self, context: &mut Context) -> Result<(), ProcedureError>;

    /// Request cooperative cancellation of a running `run`
    ///
    /// Called with the task's binding locked, so the task cannot finish while
    /// the hook runs. The hook must return promptly and must not call
    /// [`Task::cancel`](crate::Task::cancel) on its own task, which would
    /// deadlock.
    fn cancel(&self) {}

    /// Receive an event object sent through the task handle
    fn on_event(&self, _event: &dyn Any) {}
}

/// Procedure backed by a closure
pub struct FnProcedure<F> {
    func: F,
}

impl<F> FnProcedure<F>
where
    F: Fn(&mut Context) -> Result<(), ProcedureError> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Procedure for FnProcedure<F>
where
    F: Fn(&mut Context) -> Result<(), ProcedureError> + Send + Sync,
{
    fn run(&self, context: &mut Context) -> Result<(), ProcedureError> {
        (self.func)(context)
    }
}

impl<F> fmt::Debug for FnProcedure<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnProcedure").finish_non_exhaustive()
    }
}

/// Callback invoked on every status change
pub type StateCallback = Arc<dyn Fn(Status) + Send + Sync>;

/// Everything needed to submit a task
pub struct TaskDescriptor {
    /// Procedure to run
    pub procedure: Arc<dyn Procedure>,
    /// Pre-built context; an empty one is created at run time if absent
    pub context: Option<Context>,
    /// Status change callback
    pub on_state_changed: Option<StateCallback>,
}

impl TaskDescriptor {
    /// Create a descriptor for a procedure
    pub fn new(procedure: Arc<dyn Procedure>) -> Self {
        Self {
            procedure,
            context: None,
            on_state_changed: None,
        }
    }

    /// Create a descriptor from a closure
    pub fn from_fn<F>(func: F) -> Self
    where
        F: Fn(&mut Context) -> Result<(), ProcedureError> + Send + Sync + 'static,
    {
        Self::new(Arc::new(FnProcedure::new(func)))
    }

    /// Builder: set the execution context
    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    /// Builder: set the status change callback
    #[must_use]
    pub fn on_state_changed<F>(mut self, callback: F) -> Self
    where
        F: Fn(Status) + Send + Sync + 'static,
    {
        self.on_state_changed = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("context", &self.context)
            .field("on_state_changed", &self.on_state_changed.is_some())
            .finish_non_exhaustive()
    }
}
