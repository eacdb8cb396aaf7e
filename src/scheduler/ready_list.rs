// src/scheduler/ready_list.rs

//! Executable actions that have not found a worker yet.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use crate::scheduler::score::Score;
use crate::types::ActionId;

/// Score-ordered set of unassigned actions. Best score first; equal scores
/// fall back to the lower id.
#[derive(Debug, Default)]
pub struct ReadyList {
    ordered: BTreeSet<(Reverse<Score>, ActionId)>,
    index: BTreeMap<ActionId, Score>,
}

impl ReadyList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, action: ActionId, score: Score) {
        if let Some(old) = self.index.insert(action, score) {
            self.ordered.remove(&(Reverse(old), action));
        }
        self.ordered.insert((Reverse(score), action));
    }

    pub fn remove(&mut self, action: ActionId) -> bool {
        match self.index.remove(&action) {
            Some(score) => {
                self.ordered.remove(&(Reverse(score), action));
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, action: ActionId) -> bool {
        self.index.contains_key(&action)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Actions in score order.
    pub fn iter(&self) -> impl Iterator<Item = (ActionId, Score)> + '_ {
        self.ordered.iter().map(|(Reverse(s), a)| (*a, *s))
    }

    /// Remove and return everything, in score order.
    pub fn drain(&mut self) -> Vec<(ActionId, Score)> {
        let all: Vec<_> = self.iter().collect();
        self.ordered.clear();
        self.index.clear();
        all
    }
}
