// src/engine/handle.rs

//! Submitter-side access to a running dispatcher.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::engine::{Request, WorkloadStatus};
use crate::errors::{Result, TaskgridError};
use crate::exec::JobResult;
use crate::resources::update::{ResourceUpdate, UpdateOutcome, UpdateTicket};
use crate::resources::worker::Worker;
use crate::task::TaskDescription;
use crate::types::{JobId, TaskId, WorkerId};

/// Cloneable sender of [`Request`]s.
///
/// Every method fails with [`TaskgridError::ShutdownInProgress`] once the
/// dispatcher has stopped.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<Request>,
    update_timeout: Duration,
}

impl DispatcherHandle {
    pub fn new(tx: mpsc::Sender<Request>, update_timeout: Duration) -> Self {
        Self { tx, update_timeout }
    }

    /// Underlying sender, for transports and providers reporting back.
    pub fn sender(&self) -> mpsc::Sender<Request> {
        self.tx.clone()
    }

    async fn send(&self, request: Request) -> Result<()> {
        self.tx
            .send(request)
            .await
            .map_err(|_| TaskgridError::ShutdownInProgress)
    }

    pub async fn submit_task(&self, task: TaskDescription) -> Result<()> {
        self.send(Request::NewTask { task }).await
    }

    pub async fn cancel_task(&self, task: TaskId) -> Result<()> {
        self.send(Request::CancelTask { task }).await
    }

    pub async fn worker_joined(&self, worker: Worker) -> Result<()> {
        self.send(Request::WorkerJoined { worker }).await
    }

    pub async fn worker_lost(&self, worker: WorkerId) -> Result<()> {
        self.send(Request::WorkerLost { worker }).await
    }

    pub async fn job_completed(&self, result: JobResult) -> Result<()> {
        self.send(Request::JobCompleted { result }).await
    }

    pub async fn job_failed(&self, job_id: JobId, cause: impl Into<String>) -> Result<()> {
        self.send(Request::JobFailed {
            job_id,
            cause: cause.into(),
        })
        .await
    }

    /// Queue an elasticity request and return the ticket to follow it.
    pub async fn request_resource_update(&self, update: ResourceUpdate) -> Result<UpdateTicket> {
        let (completer, ticket) = update.completion();
        self.send(Request::ResourceUpdate { update, completer }).await?;
        Ok(ticket)
    }

    /// Queue an elasticity request and wait for it, up to the configured
    /// timeout. On timeout the request is abandoned and the pool is left as
    /// it was.
    pub async fn apply_resource_update(&self, update: ResourceUpdate) -> Result<UpdateOutcome> {
        let mut ticket = self.request_resource_update(update).await?;
        match ticket.wait_for_completion(self.update_timeout).await {
            Err(TaskgridError::ResourceUpdateTimeout(id)) => {
                warn!(update = %id, timeout_ms = self.update_timeout.as_millis() as u64, "resource update timed out; abandoning");
                // A stopped dispatcher has nothing left to abandon.
                let _ = self
                    .send(Request::AbandonResourceUpdate { update: id })
                    .await;
                Err(TaskgridError::ResourceUpdateTimeout(id))
            }
            other => other,
        }
    }

    pub async fn workload(&self) -> Result<WorkloadStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::WorkloadQuery { reply }).await?;
        rx.await
            .map_err(|_| TaskgridError::Interrupted("dispatcher dropped workload query".to_string()))
    }

    /// Stop the dispatcher and return the final workload.
    pub async fn shutdown(&self) -> Result<WorkloadStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Shutdown { reply }).await?;
        rx.await.map_err(|_| TaskgridError::ShutdownInProgress)
    }
}
