// src/dag/mod.rs

//! Dependency graph of schedulable actions.
//!
//! - [`action`] defines a single action and its lifecycle states.
//! - [`graph`] owns every action in an id-keyed arena and maintains the
//!   predecessor/successor edges between them.

pub mod action;
pub mod graph;

pub use action::{Action, ActionState};
pub use graph::ActionGraph;
