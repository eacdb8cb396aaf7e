// src/resources/worker.rs

//! Worker records.
//!
//! Every worker kind shares one record; provenance is carried by
//! [`WorkerKind`] and behaviour that differs between kinds is decided by the
//! explicit checks below.

use std::fmt;

use crate::resources::description::{Constraints, ResourceDescription};
use crate::types::{AppId, WorkerId};

/// Where a worker came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerKind {
    /// Declared up front (cluster node). Never torn down by elasticity.
    Static,
    /// Joined at runtime; capacity may grow or shrink.
    Dynamic,
    /// Created through a cloud provider; torn down once its capacity is
    /// fully reduced.
    Cloud { provider: String },
}

impl WorkerKind {
    pub fn is_elastic(&self) -> bool {
        !matches!(self, WorkerKind::Static)
    }

    pub fn provider(&self) -> Option<&str> {
        match self {
            WorkerKind::Cloud { provider } => Some(provider.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerKind::Static => f.write_str("static"),
            WorkerKind::Dynamic => f.write_str("dynamic"),
            WorkerKind::Cloud { provider } => write!(f, "cloud({provider})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worker {
    pub id: WorkerId,
    pub name: String,
    /// Total capacity currently granted to this worker.
    pub description: ResourceDescription,
    /// Nodes grouped behind this worker (1 for a plain machine).
    pub nodes: u32,
    pub kind: WorkerKind,
    /// If set, only tasks of this application may run here.
    pub app_id: Option<AppId>,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        name: impl Into<String>,
        description: ResourceDescription,
        kind: WorkerKind,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description,
            nodes: 1,
            kind,
            app_id: None,
        }
    }

    pub fn with_nodes(mut self, nodes: u32) -> Self {
        self.nodes = nodes;
        self
    }

    pub fn with_app(mut self, app_id: Option<AppId>) -> Self {
        self.app_id = app_id;
        self
    }

    /// Whether an implementation with these constraints could ever run here,
    /// ignoring current occupation.
    pub fn can_run(&self, constraints: &Constraints) -> bool {
        constraints.nodes <= self.nodes
            && self.description.has_device(constraints.device)
            && self.description.contains(&constraints.slots)
    }

    /// Whether tasks of `app_id` may be placed here.
    pub fn accepts_app(&self, app_id: AppId) -> bool {
        self.app_id.is_none_or(|owner| owner == app_id)
    }

    /// Elastic workers whose capacity composition has become empty must be
    /// torn down.
    pub fn should_be_stopped(&self) -> bool {
        self.kind.is_elastic() && self.description.is_empty()
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.id)
    }
}
