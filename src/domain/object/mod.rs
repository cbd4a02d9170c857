//! Object Management
//!
//! Execution context shared between a procedure and the caller that submitted it.

pub mod context;

pub use context::Context;
