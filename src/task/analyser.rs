// src/task/analyser.rs

//! Data-dependency analysis.
//!
//! Every datum is versioned by its last writer. A task that reads a datum
//! depends on the action that last wrote it, as long as that action has not
//! completed. Writers never wait for earlier readers or writers: each write
//! produces a new version, so only read-after-write orders execution.

use std::collections::{BTreeMap, BTreeSet};

use tracing::trace;

use crate::task::Parameter;
use crate::types::{ActionId, DataType};

#[derive(Debug, Default)]
pub struct DataAnalyser {
    /// datum -> action producing its latest version.
    last_writer: BTreeMap<String, ActionId>,
    /// action -> data whose latest version it produces.
    writes: BTreeMap<ActionId, BTreeSet<String>>,
}

impl DataAnalyser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `action`'s parameters and return the actions it must wait for.
    pub fn analyse(&mut self, action: ActionId, parameters: &[Parameter]) -> BTreeSet<ActionId> {
        let mut deps = BTreeSet::new();

        for p in parameters.iter().filter(|p| tracks(p)) {
            if p.direction.reads()
                && let Some(&writer) = self.last_writer.get(&p.name)
                && writer != action
            {
                trace!(%action, %writer, datum = %p.name, "read-after-write dependency");
                deps.insert(writer);
            }
        }

        for p in parameters.iter().filter(|p| tracks(p) && p.direction.writes()) {
            if let Some(previous) = self.last_writer.insert(p.name.clone(), action)
                && let Some(set) = self.writes.get_mut(&previous)
            {
                set.remove(&p.name);
            }
            self.writes.entry(action).or_default().insert(p.name.clone());
        }

        deps
    }

    /// The action's outputs are available; readers no longer need to wait.
    pub fn data_available(&mut self, action: ActionId) {
        if let Some(data) = self.writes.remove(&action) {
            for datum in data {
                if self.last_writer.get(&datum) == Some(&action) {
                    self.last_writer.remove(&datum);
                }
            }
        }
    }

    /// Current producer of `datum`, if it is still pending.
    pub fn last_writer(&self, datum: &str) -> Option<ActionId> {
        self.last_writer.get(datum).copied()
    }

    pub fn tracked_data(&self) -> usize {
        self.last_writer.len()
    }
}

fn tracks(p: &Parameter) -> bool {
    p.data_type.is_dependency() && p.data_type != DataType::Stream && !p.stream
}
