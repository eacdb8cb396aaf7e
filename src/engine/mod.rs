// src/engine/mod.rs

//! Task dispatcher.
//!
//! Every mutation of the graph, the pool and the per-worker schedulers is a
//! [`Request`] on one ordered channel, handled one at a time:
//! - the pure state machine lives in [`core`] (request handlers in
//!   [`event_handlers`]);
//! - the async shell that reads the channel and talks to transports and
//!   cloud providers is [`runtime`];
//! - submitters talk to it through [`handle`];
//! - [`workload`] is the status snapshot reported on query and shutdown.

use std::collections::BTreeSet;

use tokio::sync::oneshot;

use crate::exec::JobResult;
use crate::resources::description::ResourceDescription;
use crate::resources::update::{ResourceUpdate, UpdateCompleter};
use crate::resources::worker::Worker;
use crate::task::TaskDescription;
use crate::types::{ActionId, JobId, TaskId, UpdateId, WorkerId};

pub mod core;
pub mod event_handlers;
pub mod handle;
pub mod runtime;
pub mod workload;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use handle::DispatcherHandle;
pub use runtime::Runtime;
pub use workload::WorkloadStatus;

/// Default bound on dispatch attempts per action.
pub const DEFAULT_MAX_SCHEDULING_ATTEMPTS: usize = 2;

/// Options fixed for the lifetime of the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// Dispatch attempts per action, first attempt included.
    pub max_scheduling_attempts: usize,
    /// Cloud providers new workers may be requested from.
    pub providers: BTreeSet<String>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            max_scheduling_attempts: DEFAULT_MAX_SCHEDULING_ATTEMPTS,
            providers: BTreeSet::new(),
        }
    }
}

/// How a submitted task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// Notification sent to the submitter once a task reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEnd {
    pub task: TaskId,
    /// `None` when the task was rejected before an action was created.
    pub action: Option<ActionId>,
    pub outcome: TaskOutcome,
}

/// Requests handled by the dispatcher, in arrival order.
#[derive(Debug)]
pub enum Request {
    NewTask {
        task: TaskDescription,
    },
    JobCompleted {
        result: JobResult,
    },
    JobFailed {
        job_id: JobId,
        cause: String,
    },
    CancelTask {
        task: TaskId,
    },
    WorkerJoined {
        worker: Worker,
    },
    WorkerLost {
        worker: WorkerId,
    },
    ResourceUpdate {
        update: ResourceUpdate,
        completer: UpdateCompleter,
    },
    /// A cloud provider finished booting the worker requested by `update`.
    WorkerCreated {
        update: UpdateId,
        provider: String,
        name: String,
        description: ResourceDescription,
    },
    /// A cloud provider refused or failed the creation for `update`.
    WorkerCreationFailed {
        update: UpdateId,
        reason: String,
    },
    /// The requester stopped waiting for `update`.
    AbandonResourceUpdate {
        update: UpdateId,
    },
    WorkloadQuery {
        reply: oneshot::Sender<WorkloadStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<WorkloadStatus>,
    },
}

impl Request {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::NewTask { .. } => "new_task",
            Request::JobCompleted { .. } => "job_completed",
            Request::JobFailed { .. } => "job_failed",
            Request::CancelTask { .. } => "cancel_task",
            Request::WorkerJoined { .. } => "worker_joined",
            Request::WorkerLost { .. } => "worker_lost",
            Request::ResourceUpdate { .. } => "resource_update",
            Request::WorkerCreated { .. } => "worker_created",
            Request::WorkerCreationFailed { .. } => "worker_creation_failed",
            Request::AbandonResourceUpdate { .. } => "abandon_resource_update",
            Request::WorkloadQuery { .. } => "workload_query",
            Request::Shutdown { .. } => "shutdown",
        }
    }
}
