// tests/finalize.rs

use devgraph::errors::GraphError;
use devgraph::graph::{Graph, NodePayload, finalize};
use devgraph::types::{ContextId, DeviceId, ExecutionContext};
use devgraph_test_utils::{TraceExecutor, trace_queue};

fn ctx() -> ExecutionContext {
    ExecutionContext::new(DeviceId(0), ContextId(1))
}

fn empty() -> NodePayload {
    NodePayload::Empty
}

#[test]
fn schedule_respects_dependencies_and_breaks_ties_by_insertion_order() {
    let graph = Graph::new(ctx());
    let a = graph.add_node(empty(), []);
    let b = graph.add_node(empty(), []);
    let c = graph.add_node(empty(), [a.into()]);
    let d = graph.add_node(empty(), [b.into(), c.into()]);
    let e = graph.add_node(empty(), []);

    let exec = finalize(&graph).unwrap();

    assert_eq!(exec.schedule(), vec![a, b, c, d, e]);
    assert_eq!(exec.predecessors_of(d), vec![b, c]);
    assert_eq!(exec.source_graph(), graph.id());
    assert_eq!(exec.context(), ctx());
}

#[test]
fn later_nodes_can_be_scheduled_first_when_an_edge_demands_it() {
    let graph = Graph::new(ctx());
    let a = graph.add_node(empty(), []);
    let b = graph.add_node(empty(), []);
    graph.make_edge(b, a).unwrap();

    let exec = graph.finalize().unwrap();
    assert_eq!(exec.schedule(), vec![b, a]);
    assert_eq!(exec.position_of(a), Some(1));
}

#[test]
fn cycle_through_make_edge_is_reported_with_its_nodes() {
    let graph = Graph::new(ctx());
    let a = graph.add_node(empty(), []);
    let b = graph.add_node(empty(), [a.into()]);
    let c = graph.add_node(empty(), [b.into()]);
    let outside = graph.add_node(empty(), []);
    graph.make_edge(c, a).unwrap();

    match graph.finalize() {
        Err(GraphError::CyclicGraph { nodes }) => {
            assert_eq!(nodes, vec![a, b, c]);
            assert!(!nodes.contains(&outside));
        }
        other => panic!("expected CyclicGraph, got {other:?}"),
    }

    // The graph stays open and usable after a failed finalize.
    let d = graph.add_node(empty(), []);
    assert_eq!(graph.node_count(), 5);
    assert!(graph.node(d).is_some());
}

#[test]
fn self_edge_is_a_cycle() {
    let graph = Graph::new(ctx());
    let a = graph.add_node(empty(), []);
    graph.make_edge(a, a).unwrap();

    match graph.finalize() {
        Err(GraphError::CyclicGraph { nodes }) => assert_eq!(nodes, vec![a]),
        other => panic!("expected CyclicGraph, got {other:?}"),
    }
}

#[test]
fn dependency_on_another_graphs_node_is_dangling() {
    let unrelated = Graph::new(ctx());
    let foreign = unrelated.add_node(empty(), []);

    let graph = Graph::new(ctx());
    let ok = graph.add_node(empty(), []);
    let bad = graph.add_node(empty(), [ok.into(), foreign.into()]);

    match graph.finalize() {
        Err(GraphError::DanglingDependency { node, dependency }) => {
            assert_eq!(node, bad);
            assert_eq!(dependency, foreign);
        }
        other => panic!("expected DanglingDependency, got {other:?}"),
    }
}

#[tokio::test]
async fn dependency_on_a_handle_recorded_into_another_graph_is_dangling() {
    let exec = TraceExecutor::with_ids(0, 1);
    let queue = trace_queue(&exec);

    let unrelated = Graph::for_queue(&queue);
    unrelated.begin_recording(&queue).unwrap();
    let foreign = queue.submit(|_| {}).unwrap();
    unrelated.end_recording(&queue).unwrap();

    let graph = Graph::for_queue(&queue);
    let bad = graph.add_node(empty(), [foreign.clone().into()]);

    match graph.finalize() {
        Err(GraphError::DanglingDependency { node, dependency }) => {
            assert_eq!(node, bad);
            assert_eq!(Some(dependency), foreign.node());
        }
        other => panic!("expected DanglingDependency, got {other:?}"),
    }
    // The graph it was recorded into still finalizes.
    assert_eq!(unrelated.finalize().unwrap().len(), 1);
}

#[test]
fn make_edge_rejects_unknown_nodes() {
    let unrelated = Graph::new(ctx());
    let foreign = unrelated.add_node(empty(), []);

    let graph = Graph::new(ctx());
    let a = graph.add_node(empty(), []);

    assert!(matches!(
        graph.make_edge(a, foreign),
        Err(GraphError::DanglingDependency { dependency, .. }) if dependency == foreign
    ));
    assert!(matches!(
        graph.make_edge(foreign, a),
        Err(GraphError::DanglingDependency { dependency, .. }) if dependency == foreign
    ));
}

#[test]
fn finalizing_twice_yields_independent_equivalent_graphs() {
    let graph = Graph::new(ctx());
    let a = graph.add_node(empty(), []);
    let b = graph.add_node(empty(), [a.into()]);
    let _c = graph.add_node(empty(), [a.into()]);

    let first = graph.finalize().unwrap();
    let second = graph.finalize().unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(first.schedule(), second.schedule());
    for id in first.schedule() {
        assert_eq!(first.predecessors_of(id), second.predecessors_of(id));
    }

    // Later changes do not leak into an existing snapshot.
    graph.add_node(empty(), [b.into()]);
    assert_eq!(first.len(), 3);
    assert_eq!(graph.finalize().unwrap().len(), 4);
}

#[test]
fn empty_graph_finalizes_to_empty_schedule() {
    let graph = Graph::new(ctx());
    let exec = graph.finalize().unwrap();
    assert!(exec.is_empty());
    assert!(exec.schedule().is_empty());
}

#[test]
fn subgraph_for_another_context_is_rejected() {
    let other = ExecutionContext::new(DeviceId(1), ContextId(7));
    let child = Graph::new(other);
    child.add_node(empty(), []);
    let child_exec = child.finalize().unwrap();

    let parent = Graph::new(ctx());
    parent.add_node(NodePayload::SubGraph(child_exec), []);

    match parent.finalize() {
        Err(GraphError::ContextMismatch { expected, actual }) => {
            assert_eq!(expected, ctx());
            assert_eq!(actual, other);
        }
        other => panic!("expected ContextMismatch, got {other:?}"),
    }
}

#[test]
fn command_group_with_two_payloads_is_invalid() {
    let graph = Graph::new(ctx());
    let result = graph.add(|cg| {
        cg.parallel_for("one", 1, |_| {}).parallel_for("two", 1, |_| {});
    });
    assert!(matches!(result, Err(GraphError::InvalidCommandGroup(_))));
    assert_eq!(graph.node_count(), 0);

    let empty_node = graph.add(|_| {}).unwrap();
    assert!(matches!(
        graph.node(empty_node).unwrap().payload(),
        NodePayload::Empty
    ));
}

#[test]
fn node_ids_index_their_insertion_position() {
    let graph = Graph::new(ctx());
    let ids: Vec<_> = (0..300).map(|_| graph.add_node(empty(), [])).collect();

    for (i, id) in ids.iter().enumerate() {
        assert_eq!(id.index(), i);
        assert_eq!(id.graph(), graph.id());
        assert_eq!(graph.node(*id).map(|n| n.id()), Some(*id));
        assert_eq!(id.to_string(), format!("{}/n{i}", graph.id()));
    }
}
