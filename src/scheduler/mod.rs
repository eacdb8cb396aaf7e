// src/scheduler/mod.rs

//! Placement of ready actions onto workers.
//!
//! - [`score`] is the lexicographic ranking used everywhere.
//! - [`resource_scheduler`] keeps one worker's capacity and queues.
//! - [`policy`] and [`ready_list`] rank actions and hold those still
//!   waiting for a worker.
//! - [`assignment`] picks the best `(worker, implementation)` pair.
//! - [`profile`] tracks execution times per implementation.

pub mod assignment;
pub mod policy;
pub mod profile;
pub mod ready_list;
pub mod resource_scheduler;
pub mod score;

pub use assignment::{Assignment, assign};
pub use policy::{Candidate, FifoPolicy, LifoPolicy, SchedulingPolicy, build_policy};
pub use profile::Profile;
pub use ready_list::ReadyList;
pub use resource_scheduler::{Placement, Queued, ResourceScheduler};
pub use score::Score;
