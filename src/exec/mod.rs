// src/exec/mod.rs

//! Job execution seam.
//!
//! - [`job`] defines the job handed to a transport and the result envelope
//!   that comes back.
//! - [`backend`] provides the [`JobDispatcher`] trait the dispatcher shell
//!   talks to.
//! - [`local`] is a `JobDispatcher` that runs implementations as local
//!   shell commands, used by the `taskgrid` binary.

pub mod backend;
pub mod job;
pub mod local;

pub use backend::{BoxFuture, JobDispatcher};
pub use job::{Job, JobResult};
pub use local::LocalProcessDispatcher;
