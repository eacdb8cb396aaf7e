// tests/dag_graph.rs

use std::collections::BTreeSet;

use proptest::prelude::*;
use taskgrid::dag::{ActionGraph, ActionState};
use taskgrid::errors::TaskgridError;
use taskgrid::types::{ActionId, AppId, TaskId};

fn graph_with(n: u64) -> (ActionGraph, Vec<ActionId>) {
    let mut g = ActionGraph::new();
    let ids = (1..=n).map(|t| g.register(TaskId(t), AppId(1), 0)).collect();
    (g, ids)
}

fn preds(g: &ActionGraph, id: ActionId) -> BTreeSet<ActionId> {
    g.get(id).unwrap().predecessors().clone()
}

#[test]
fn linking_blocks_successor_and_records_both_ends() {
    let (mut g, ids) = graph_with(2);
    let (a, b) = (ids[0], ids[1]);

    assert!(g.add_predecessor(a, b).unwrap());
    assert_eq!(g.state(b), Some(ActionState::Blocked));
    assert!(g.get(a).unwrap().successors().contains(&b));
    assert!(g.get(b).unwrap().predecessors().contains(&a));
    assert!(!g.is_executable(b));

    // Same edge again is a no-op.
    assert!(!g.add_predecessor(a, b).unwrap());
    g.check_symmetry().unwrap();
}

#[test]
fn linking_behind_completed_or_cancelled_action_is_ignored() {
    let (mut g, ids) = graph_with(4);
    let (done, cancelled, s1, s2) = (ids[0], ids[1], ids[2], ids[3]);

    g.mark_ready(done).unwrap();
    g.mark_running(done).unwrap();
    g.complete(done).unwrap();
    g.cancel(cancelled).unwrap();

    assert!(!g.add_predecessor(done, s1).unwrap());
    assert!(!g.add_predecessor(cancelled, s2).unwrap());
    assert!(g.is_executable(s1));
    assert!(g.is_executable(s2));
    assert!(preds(&g, s1).is_empty());
}

#[test]
fn running_action_cannot_gain_predecessors() {
    let (mut g, ids) = graph_with(2);
    g.mark_ready(ids[1]).unwrap();
    g.mark_running(ids[1]).unwrap();

    let err = g.add_predecessor(ids[0], ids[1]).unwrap_err();
    assert!(matches!(err, TaskgridError::DependencyViolation(_)));
}

#[test]
fn unschedule_relinks_successors_without_duplicate_edges() {
    // a -> c, b -> c, c -> d, c -> e, b -> e
    let (mut g, ids) = graph_with(5);
    let (a, b, c, d, e) = (ids[0], ids[1], ids[2], ids[3], ids[4]);
    g.add_predecessor(a, c).unwrap();
    g.add_predecessor(b, c).unwrap();
    g.add_predecessor(c, d).unwrap();
    g.add_predecessor(c, e).unwrap();
    g.add_predecessor(b, e).unwrap();

    let freed = g.unschedule(c).unwrap();

    assert!(freed.is_empty());
    assert_eq!(preds(&g, d), BTreeSet::from([a, b]));
    assert_eq!(preds(&g, e), BTreeSet::from([a, b]));
    assert_eq!(
        g.get(b).unwrap().successors().clone(),
        BTreeSet::from([d, e])
    );
    assert!(preds(&g, c).is_empty());
    assert!(g.get(c).unwrap().successors().is_empty());
    g.check_symmetry().unwrap();
}

#[test]
fn unschedule_of_root_returns_freed_successors_in_id_order() {
    let (mut g, ids) = graph_with(4);
    let (root, x, y, z) = (ids[0], ids[1], ids[2], ids[3]);
    g.add_predecessor(root, z).unwrap();
    g.add_predecessor(root, x).unwrap();
    g.add_predecessor(root, y).unwrap();
    g.add_predecessor(x, y).unwrap();

    let freed = g.unschedule(root).unwrap();

    assert_eq!(freed, vec![x, z]);
    assert_eq!(g.state(x), Some(ActionState::Ready));
    assert_eq!(g.state(y), Some(ActionState::Blocked));
    assert_eq!(g.state(z), Some(ActionState::Ready));
}

#[test]
fn completion_releases_only_fully_unblocked_successors() {
    let (mut g, ids) = graph_with(3);
    let (a, b, c) = (ids[0], ids[1], ids[2]);
    g.add_predecessor(a, c).unwrap();
    g.add_predecessor(b, c).unwrap();

    for id in [a, b] {
        g.mark_ready(id).unwrap();
        g.mark_running(id).unwrap();
    }

    assert!(g.complete(a).unwrap().is_empty());
    assert_eq!(g.complete(b).unwrap(), vec![c]);
    assert_eq!(g.state(c), Some(ActionState::Ready));

    // Completing twice has no further effect.
    assert!(g.complete(b).unwrap().is_empty());
}

#[test]
fn failed_predecessor_keeps_dependents_blocked() {
    let (mut g, ids) = graph_with(3);
    let (a, b, c) = (ids[0], ids[1], ids[2]);
    g.add_predecessor(a, b).unwrap();
    g.add_predecessor(b, c).unwrap();

    g.mark_ready(a).unwrap();
    g.mark_running(a).unwrap();
    g.fail(a).unwrap();

    assert_eq!(g.state(a), Some(ActionState::Failed));
    assert_eq!(g.state(b), Some(ActionState::Blocked));
    assert!(!g.remove_terminal(a));
    assert_eq!(g.dependents_closure(a), BTreeSet::from([b, c]));
}

#[test]
fn cancel_refuses_running_actions() {
    let (mut g, ids) = graph_with(1);
    g.mark_ready(ids[0]).unwrap();
    g.mark_running(ids[0]).unwrap();
    assert!(g.cancel(ids[0]).is_err());

    g.requeue(ids[0]).unwrap();
    assert_eq!(g.state(ids[0]), Some(ActionState::Ready));
    assert!(g.cancel(ids[0]).unwrap().is_empty());
    assert!(g.remove_terminal(ids[0]));
    assert!(g.is_empty());
}

#[derive(Debug, Clone)]
enum Op {
    Link(usize, usize),
    Unschedule(usize),
    Complete(usize),
    Cancel(usize),
}

fn op_strategy(n: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..n, 0..n).prop_map(|(a, b)| Op::Link(a, b)),
        1 => (0..n).prop_map(Op::Unschedule),
        1 => (0..n).prop_map(Op::Complete),
        1 => (0..n).prop_map(Op::Cancel),
    ]
}

proptest! {
    #[test]
    fn edges_stay_symmetric_under_any_mutation(
        ops in proptest::collection::vec(op_strategy(8), 1..60)
    ) {
        let (mut g, ids) = graph_with(8);

        for op in ops {
            match op {
                // Only link forward so the graph stays acyclic.
                Op::Link(a, b) if a < b => {
                    let _ = g.add_predecessor(ids[a], ids[b]);
                }
                Op::Link(..) => {}
                Op::Unschedule(a) => {
                    let _ = g.unschedule(ids[a]);
                }
                Op::Complete(a) => {
                    if g.is_executable(ids[a]) {
                        let _ = g.mark_ready(ids[a]);
                        let _ = g.mark_running(ids[a]);
                        let _ = g.complete(ids[a]);
                    }
                }
                Op::Cancel(a) => {
                    let _ = g.cancel(ids[a]);
                }
            }
            prop_assert!(g.check_symmetry().is_ok());
        }

        for a in g.iter() {
            if a.state == ActionState::Ready {
                prop_assert!(a.predecessors().is_empty());
            }
        }
    }
}
