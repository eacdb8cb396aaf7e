// src/resources/mod.rs

//! Workers, their capacity, and how the pool grows and shrinks.

pub mod description;
pub mod pool;
pub mod provider;
pub mod update;
pub mod worker;

pub use description::{Constraints, ResourceDescription};
pub use pool::WorkerPool;
pub use provider::{CloudProvider, PendingCreation, ProviderSettings, SimulatedCloudProvider};
pub use update::{
    ResourceUpdate, UpdateCompleter, UpdateKind, UpdateOutcome, UpdateTarget, UpdateTicket,
};
pub use worker::{Worker, WorkerKind};
