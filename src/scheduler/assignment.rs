// src/scheduler/assignment.rs

//! Choosing a `(worker, implementation)` pair for a ready action.

use std::collections::BTreeMap;

use tracing::trace;

use crate::errors::{Result, TaskgridError};
use crate::scheduler::resource_scheduler::ResourceScheduler;
use crate::scheduler::score::Score;
use crate::task::TaskDescription;
use crate::types::{ImplId, WorkerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub worker: WorkerId,
    pub implementation: ImplId,
    pub score: Score,
}

/// Pick the best placement for `task` among `schedulers`.
///
/// Workers bound to another application, listed in `exclude`, or unable to
/// run any implementation are skipped. Among the rest the highest score
/// wins; ties go to the lowest worker id, then the lowest implementation id.
pub fn assign(
    action_score: Score,
    task: &TaskDescription,
    schedulers: &BTreeMap<WorkerId, ResourceScheduler>,
    exclude: &[WorkerId],
) -> Result<Assignment> {
    let mut implementations: Vec<_> = task.implementations.iter().collect();
    implementations.sort_by_key(|i| i.id);

    let mut best: Option<Assignment> = None;

    for (worker_id, rs) in schedulers {
        if exclude.contains(worker_id) || !rs.accepts_app(task.app_id) {
            continue;
        }

        let capable: Vec<_> = implementations
            .iter()
            .filter(|i| rs.can_run(&i.constraints))
            .collect();
        if capable.is_empty() {
            continue;
        }

        let resource_score =
            rs.generate_resource_score(action_score, capable.iter().map(|i| &i.constraints));

        for implementation in capable {
            let signature = task.signature(implementation);
            let score = rs.generate_implementation_score(
                resource_score,
                &signature,
                &implementation.constraints,
            );
            trace!(worker = %worker_id, implementation = %implementation.id, %score, "candidate placement");

            if best.is_none_or(|b| score > b.score) {
                best = Some(Assignment {
                    worker: *worker_id,
                    implementation: implementation.id,
                    score,
                });
            }
        }
    }

    best.ok_or(TaskgridError::NoCapableWorker(task.id))
}

/// Whether any scheduler, ignoring `exclude`, could ever host `task`.
pub fn has_capable_worker(
    task: &TaskDescription,
    schedulers: &BTreeMap<WorkerId, ResourceScheduler>,
    exclude: &[WorkerId],
) -> bool {
    schedulers.iter().any(|(id, rs)| {
        !exclude.contains(id)
            && rs.accepts_app(task.app_id)
            && task.implementations.iter().any(|i| rs.can_run(&i.constraints))
    })
}
