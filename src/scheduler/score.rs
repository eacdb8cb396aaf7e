// src/scheduler/score.rs

use std::fmt;

/// Component that pushes a worker below every worker able to start now.
pub const CANNOT_RUN_NOW: i64 = -(i32::MAX as i64);

/// Ranking of a placement candidate. Higher wins; fields compare in order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Score {
    pub action_priority: i64,
    pub tie_break: i64,
    pub resource: i64,
    pub implementation: i64,
}

impl Score {
    pub const fn new(action_priority: i64, tie_break: i64, resource: i64, implementation: i64) -> Self {
        Self {
            action_priority,
            tie_break,
            resource,
            implementation,
        }
    }

    /// Same action-level components, new resource component.
    pub fn with_resource(self, resource: i64) -> Self {
        Self { resource, ..self }
    }

    pub fn with_implementation(self, implementation: i64) -> Self {
        Self {
            implementation,
            ..self
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.action_priority, self.tie_break, self.resource, self.implementation
        )
    }
}
