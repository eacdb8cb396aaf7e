// src/resources/pool.rs

use std::collections::BTreeMap;

use tracing::info;

use crate::errors::{Result, TaskgridError};
use crate::resources::worker::Worker;
use crate::types::WorkerId;

/// Live pool membership.
///
/// Keyed by [`WorkerId`] so iteration is deterministic.
#[derive(Debug, Default)]
pub struct WorkerPool {
    workers: BTreeMap<WorkerId, Worker>,
    next_id: u32,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id for a worker that is about to be created.
    pub fn allocate_id(&mut self) -> WorkerId {
        loop {
            self.next_id += 1;
            let id = WorkerId(self.next_id);
            if !self.workers.contains_key(&id) {
                return id;
            }
        }
    }

    /// Insert a worker. Re-adding a known id replaces its record.
    pub fn add(&mut self, worker: Worker) {
        info!(
            worker = %worker.name,
            id = %worker.id,
            kind = %worker.kind,
            capacity = %worker.description,
            "worker added to pool"
        );
        self.next_id = self.next_id.max(worker.id.get());
        self.workers.insert(worker.id, worker);
    }

    pub fn remove(&mut self, id: WorkerId) -> Result<Worker> {
        let worker = self
            .workers
            .remove(&id)
            .ok_or(TaskgridError::UnknownWorker(id))?;
        info!(worker = %worker.name, id = %id, "worker removed from pool");
        Ok(worker)
    }

    pub fn get(&self, id: WorkerId) -> Option<&Worker> {
        self.workers.get(&id)
    }

    pub fn get_mut(&mut self, id: WorkerId) -> Option<&mut Worker> {
        self.workers.get_mut(&id)
    }

    pub fn workers(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
