// src/engine/workload.rs

use std::fmt;

/// Snapshot of what the dispatcher is holding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkloadStatus {
    /// Waiting on predecessors (including predecessors that failed).
    pub blocked: usize,
    /// Executable, waiting for a worker or for capacity on one.
    pub ready: usize,
    /// Executable actions no worker could take yet.
    pub unassigned: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub workers: usize,
    /// Elasticity requests not yet applied.
    pub pending_updates: usize,
}

impl WorkloadStatus {
    /// Actions that have not reached a terminal state.
    pub fn in_flight(&self) -> usize {
        self.blocked + self.ready + self.running
    }
}

impl fmt::Display for WorkloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "blocked={} ready={} (unassigned={}) running={} completed={} failed={} cancelled={} workers={} pending_updates={}",
            self.blocked,
            self.ready,
            self.unassigned,
            self.running,
            self.completed,
            self.failed,
            self.cancelled,
            self.workers,
            self.pending_updates
        )
    }
}
