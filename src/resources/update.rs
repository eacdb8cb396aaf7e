// src/resources/update.rs

//! Elasticity requests.
//!
//! A [`ResourceUpdate`] is created by whoever wants the pool to grow or
//! shrink. It travels to the dispatcher together with an
//! [`UpdateCompleter`], while the requester keeps the matching
//! [`UpdateTicket`] to poll or await completion. The dispatcher fulfils the
//! completer exactly once, after the change has been applied.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::errors::{Result, TaskgridError};
use crate::resources::description::ResourceDescription;
use crate::resources::worker::Worker;
use crate::types::{AppId, UpdateId, WorkerId};

static NEXT_UPDATE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Increase,
    Reduce,
}

/// What the update applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateTarget {
    /// Provision a brand new worker through the named cloud provider.
    NewWorker { provider: String },
    /// Register an already reachable worker.
    Join(Worker),
    /// Grow or shrink an existing worker.
    Worker(WorkerId),
}

/// How an update ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Applied; the worker it touched is returned (for creations, the new id).
    Applied(WorkerId),
    /// Rejected by the dispatcher (unknown worker, unknown provider, shutdown).
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUpdate {
    pub id: UpdateId,
    pub kind: UpdateKind,
    pub target: UpdateTarget,
    /// Capacity delta to add or remove.
    pub modification: ResourceDescription,
    pub app_id: Option<AppId>,
}

impl ResourceUpdate {
    fn new(
        kind: UpdateKind,
        target: UpdateTarget,
        modification: ResourceDescription,
        app_id: Option<AppId>,
    ) -> Self {
        Self {
            id: UpdateId(NEXT_UPDATE_ID.fetch_add(1, Ordering::Relaxed)),
            kind,
            target,
            modification,
            app_id,
        }
    }

    pub fn increase(
        target: UpdateTarget,
        modification: ResourceDescription,
        app_id: Option<AppId>,
    ) -> Self {
        Self::new(UpdateKind::Increase, target, modification, app_id)
    }

    pub fn reduce(worker: WorkerId, modification: ResourceDescription, app_id: Option<AppId>) -> Self {
        Self::new(
            UpdateKind::Reduce,
            UpdateTarget::Worker(worker),
            modification,
            app_id,
        )
    }

    /// Build the completion pair for this update.
    pub fn completion(&self) -> (UpdateCompleter, UpdateTicket) {
        let (tx, rx) = watch::channel(None);
        (
            UpdateCompleter { id: self.id, tx },
            UpdateTicket { id: self.id, rx },
        )
    }
}

/// Dispatcher-side half. Consumed on completion so it fires at most once.
#[derive(Debug)]
pub struct UpdateCompleter {
    id: UpdateId,
    tx: watch::Sender<Option<UpdateOutcome>>,
}

impl UpdateCompleter {
    pub fn complete(self, outcome: UpdateOutcome) {
        debug!(update = %self.id, ?outcome, "resource update completed");
        // Nobody listening is fine: the requester gave up waiting.
        let _ = self.tx.send(Some(outcome));
    }
}

/// Requester-side half.
#[derive(Debug, Clone)]
pub struct UpdateTicket {
    id: UpdateId,
    rx: watch::Receiver<Option<UpdateOutcome>>,
}

impl UpdateTicket {
    pub fn id(&self) -> UpdateId {
        self.id
    }

    /// Non-blocking: has the pool applied (or rejected) the change?
    pub fn check_completed(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// The outcome, if already known.
    pub fn outcome(&self) -> Option<UpdateOutcome> {
        self.rx.borrow().clone()
    }

    /// Wait until the dispatcher reports completion.
    ///
    /// A dispatcher that disappears before answering surfaces as the
    /// retryable [`TaskgridError::Interrupted`]; running out of time surfaces
    /// as [`TaskgridError::ResourceUpdateTimeout`].
    pub async fn wait_for_completion(&mut self, timeout: Duration) -> Result<UpdateOutcome> {
        let id = self.id;
        let waited = tokio::time::timeout(timeout, self.rx.wait_for(|o| o.is_some())).await;

        match waited {
            Ok(Ok(outcome)) => outcome
                .clone()
                .ok_or_else(|| TaskgridError::Interrupted(format!("{id} completed without outcome"))),
            Ok(Err(_)) => Err(TaskgridError::Interrupted(format!(
                "dispatcher dropped {id} before completing it"
            ))),
            Err(_) => Err(TaskgridError::ResourceUpdateTimeout(id)),
        }
    }
}
