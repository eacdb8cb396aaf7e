// src/exec/backend.rs

//! Pluggable job transport.
//!
//! The dispatcher shell hands jobs to a [`JobDispatcher`] and never waits for
//! them to finish. Implementations report back asynchronously by sending
//! [`Request::JobCompleted`](crate::engine::Request::JobCompleted) or
//! [`Request::JobFailed`](crate::engine::Request::JobFailed) on the request
//! channel.
//!
//! - [`LocalProcessDispatcher`](super::local::LocalProcessDispatcher) runs
//!   each job as a local shell command.
//! - Tests plug in their own dispatcher that records jobs and decides when
//!   (and whether) they finish.

use std::future::Future;
use std::pin::Pin;

use crate::errors::Result;
use crate::exec::job::Job;
use crate::resources::worker::Worker;
use crate::types::JobId;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait JobDispatcher: Send {
    /// Start `job`. An `Err` means the job never left; the shell reports it
    /// as a failed job.
    fn dispatch(&mut self, job: Job) -> BoxFuture<'_, Result<()>>;

    /// Ask the worker to abort a running job. The job still reports back
    /// (typically as failed).
    fn cancel(&mut self, job: JobId) -> BoxFuture<'_, Result<()>>;

    /// Shut the given workers down.
    fn stop_workers(&mut self, workers: Vec<Worker>) -> BoxFuture<'_, Result<()>>;
}
