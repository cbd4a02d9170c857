//! JBoot Library
//!
//! Task execution engine of the JBoot bootstrap layer:
//! - Bounded, self-scaling pool of worker threads (`TaskFactory`)
//! - Per-task lifecycle tracking and cancellation (`Task`)
//! - Associative execution contexts handed to procedures (`Context`)
//!
//! # Example
//! ```no_run
//! use jboot::{Status, TaskDescriptor, TaskFactory};
//!
//! let factory = TaskFactory::from_settings(&[("max-threads", "4")])?;
//! let task = factory.create_task(TaskDescriptor::from_fn(|ctx| {
//!     ctx.add_object("greeting", String::from("hello"))?;
//!     Ok(())
//! }));
//! assert_eq!(task.wait(), Status::Done);
//! # Ok::<(), jboot::error::ConfigError>(())
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;

pub use config::TaskFactoryConfig;
pub use domain::object::Context;
pub use domain::task::{FnProcedure, Procedure, Status, Task, TaskDescriptor, TaskFactory, TaskId};
pub use error::{ConfigError, JBootError, ProcedureError, TaskFailure};
