//! Task Management
//!
//! Task model, per-task bindings, pool workers and the task factory.

pub mod binding;
pub mod factory;
pub mod model;
pub(crate) mod worker;

pub use binding::Task;
pub use factory::TaskFactory;
pub use model::{FnProcedure, Procedure, StateCallback, Status, TaskDescriptor, TaskId, TaskState};
