// src/resources/provider.rs

//! Cloud provisioning seam.
//!
//! The dispatcher never talks to a cloud API directly. When an INCREASE
//! update asks for a brand new worker the core emits a creation command; the
//! async shell forwards it to the matching [`CloudProvider`], which later
//! reports back with [`Request::WorkerCreated`] on the request channel.
//!
//! [`SimulatedCloudProvider`] is the only driver shipped here: it "boots" a
//! VM after a configurable delay and enforces a VM quota.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::Request;
use crate::errors::{Result, TaskgridError};
use crate::resources::description::ResourceDescription;
use crate::resources::worker::Worker;
use crate::types::UpdateId;

/// A creation the provider accepted but has not finished yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCreation {
    pub update: UpdateId,
    pub provider: String,
    /// Name the worker will register under.
    pub name: String,
    pub description: ResourceDescription,
}

pub trait CloudProvider: Send {
    fn name(&self) -> &str;

    /// Start provisioning a worker with (at least) `description`.
    ///
    /// An empty description asks for the provider's default instance type.
    fn request_worker_creation(
        &mut self,
        update: UpdateId,
        description: ResourceDescription,
    ) -> Result<PendingCreation>;

    /// Release a worker previously created by this provider.
    fn request_worker_termination(&mut self, worker: &Worker) -> Result<()>;
}

/// Provider settings, as read from `[cloud.<name>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub name: String,
    /// Instance type handed out when the request does not specify one.
    pub instance: ResourceDescription,
    pub max_vms: usize,
    pub creation_delay: Duration,
}

/// In-process stand-in for a cloud driver.
pub struct SimulatedCloudProvider {
    settings: ProviderSettings,
    request_tx: mpsc::Sender<Request>,
    live: BTreeSet<String>,
    counter: u64,
}

impl SimulatedCloudProvider {
    pub fn new(settings: ProviderSettings, request_tx: mpsc::Sender<Request>) -> Self {
        Self {
            settings,
            request_tx,
            live: BTreeSet::new(),
            counter: 0,
        }
    }
}

impl CloudProvider for SimulatedCloudProvider {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn request_worker_creation(
        &mut self,
        update: UpdateId,
        description: ResourceDescription,
    ) -> Result<PendingCreation> {
        if self.live.len() >= self.settings.max_vms {
            return Err(TaskgridError::Other(anyhow::anyhow!(
                "provider '{}' reached its quota of {} VMs",
                self.settings.name,
                self.settings.max_vms
            )));
        }

        self.counter += 1;
        let name = format!("{}-vm{}", self.settings.name, self.counter);
        let description = if description.is_empty() {
            self.settings.instance
        } else {
            description
        };
        self.live.insert(name.clone());

        let pending = PendingCreation {
            update,
            provider: self.settings.name.clone(),
            name,
            description,
        };

        info!(
            provider = %pending.provider,
            vm = %pending.name,
            capacity = %pending.description,
            "requested VM creation"
        );

        let tx = self.request_tx.clone();
        let delay = self.settings.creation_delay;
        let created = pending.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let request = Request::WorkerCreated {
                update: created.update,
                provider: created.provider,
                name: created.name,
                description: created.description,
            };
            if tx.send(request).await.is_err() {
                debug!("request channel closed before VM came up");
            }
        });

        Ok(pending)
    }

    fn request_worker_termination(&mut self, worker: &Worker) -> Result<()> {
        if self.live.remove(&worker.name) {
            info!(provider = %self.settings.name, vm = %worker.name, "VM terminated");
        } else {
            warn!(
                provider = %self.settings.name,
                vm = %worker.name,
                "termination requested for a VM this provider does not own"
            );
        }
        Ok(())
    }
}
