//! Domain Layer
//!
//! Execution contexts and the task engine that runs procedures against them.

pub mod object;
pub mod task;
