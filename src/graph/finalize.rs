// src/graph/finalize.rs

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, info, warn};

use crate::errors::{GraphError, Result};
use crate::graph::builder::{Graph, GraphSnapshot};
use crate::graph::executable::{ExecutableGraph, ScheduledNode};
use crate::graph::node::NodePayload;
use crate::types::NodeId;

/// Validate `graph` and turn its current state into an [`ExecutableGraph`].
///
/// The graph is only locked while it is copied; validation and scheduling
/// work on the copy, and the graph stays open whatever the outcome.
///
/// Checks, in order:
/// - every node dependency belongs to this graph and exists;
/// - sub-graph payloads target the graph's execution context;
/// - the edge set is acyclic.
///
/// The schedule is a topological order in which ties are broken by node
/// insertion order, so finalizing an unchanged graph always yields the same
/// schedule.
pub fn finalize(graph: &Graph) -> Result<ExecutableGraph> {
    let snapshot = graph.snapshot();

    check_references(&snapshot)?;
    check_subgraph_contexts(&snapshot)?;

    let preds = collect_predecessors(&snapshot);
    let order = topological_order(&preds).map_err(|remaining| {
        let nodes = find_cycle(&snapshot, &preds, &remaining);
        warn!(graph = %snapshot.id, cycle = ?nodes, "finalize rejected cyclic graph");
        GraphError::CyclicGraph { nodes }
    })?;

    let mut position = vec![0usize; order.len()];
    for (pos, index) in order.iter().enumerate() {
        position[*index] = pos;
    }

    let scheduled: Vec<ScheduledNode> = order
        .iter()
        .map(|&index| {
            let node = &snapshot.nodes[index];
            let mut predecessors: Vec<usize> =
                preds[index].iter().map(|p| position[*p]).collect();
            predecessors.sort_unstable();
            ScheduledNode {
                id: node.id,
                payload: node.payload.clone(),
                predecessors,
                external: node.deps.signals.clone(),
                slot: node.slot.clone(),
            }
        })
        .collect();

    let exec = ExecutableGraph::new(snapshot.id, snapshot.context, scheduled);
    info!(
        graph = %snapshot.id,
        exec = %exec.id(),
        nodes = exec.len(),
        context = %snapshot.context,
        "graph finalized"
    );
    Ok(exec)
}

fn check_references(snapshot: &GraphSnapshot) -> Result<()> {
    let len = snapshot.nodes.len();
    let resolves = |id: NodeId| id.graph() == snapshot.id && id.index() < len;

    for node in &snapshot.nodes {
        for dep in &node.deps.nodes {
            if !resolves(*dep) {
                return Err(GraphError::DanglingDependency {
                    node: node.id,
                    dependency: *dep,
                });
            }
        }
    }

    for (from, to) in &snapshot.edges {
        if !resolves(*from) {
            return Err(GraphError::DanglingDependency {
                node: *to,
                dependency: *from,
            });
        }
        if !resolves(*to) {
            return Err(GraphError::DanglingDependency {
                node: *from,
                dependency: *to,
            });
        }
    }
    Ok(())
}

fn check_subgraph_contexts(snapshot: &GraphSnapshot) -> Result<()> {
    for node in &snapshot.nodes {
        if let NodePayload::SubGraph(child) = &node.payload
            && child.context() != snapshot.context
        {
            return Err(GraphError::ContextMismatch {
                expected: snapshot.context,
                actual: child.context(),
            });
        }
    }
    Ok(())
}

/// Predecessor indices per node, from declared dependencies and extra edges.
fn collect_predecessors(snapshot: &GraphSnapshot) -> Vec<BTreeSet<usize>> {
    let mut preds: Vec<BTreeSet<usize>> = snapshot
        .nodes
        .iter()
        .map(|node| node.deps.nodes.iter().map(|d| d.index()).collect())
        .collect();

    for (from, to) in &snapshot.edges {
        preds[to.index()].insert(from.index());
    }
    preds
}

/// Kahn's algorithm with a min-heap, so the ready node inserted first is
/// always scheduled first.
///
/// On a cycle, returns the indices that could not be scheduled.
fn topological_order(preds: &[BTreeSet<usize>]) -> std::result::Result<Vec<usize>, Vec<usize>> {
    let n = preds.len();
    let mut indegree: Vec<usize> = preds.iter().map(BTreeSet::len).collect();
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (node, ps) in preds.iter().enumerate() {
        for p in ps {
            successors[*p].push(node);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = indegree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for succ in &successors[node] {
            indegree[*succ] -= 1;
            if indegree[*succ] == 0 {
                ready.push(Reverse(*succ));
            }
        }
    }

    if order.len() == n {
        Ok(order)
    } else {
        let remaining = (0..n).filter(|i| indegree[*i] > 0).collect();
        Err(remaining)
    }
}

/// Name the nodes of one cycle among the unschedulable `remaining` nodes.
fn find_cycle(
    snapshot: &GraphSnapshot,
    preds: &[BTreeSet<usize>],
    remaining: &[usize],
) -> Vec<NodeId> {
    // Edge direction: predecessor -> node.
    let mut dag: DiGraph<usize, ()> = DiGraph::with_capacity(preds.len(), 0);
    let indices: Vec<NodeIndex> = (0..preds.len()).map(|i| dag.add_node(i)).collect();
    for (node, ps) in preds.iter().enumerate() {
        for p in ps {
            dag.add_edge(indices[*p], indices[node], ());
        }
    }

    let cycle = tarjan_scc(&dag)
        .into_iter()
        .find(|scc| scc.len() > 1 || (scc.len() == 1 && dag.contains_edge(scc[0], scc[0])));

    let mut members: Vec<usize> = match cycle {
        Some(scc) => scc.into_iter().map(|ix| dag[ix]).collect(),
        None => {
            debug!(graph = %snapshot.id, "no strongly connected component found; reporting all blocked nodes");
            remaining.to_vec()
        }
    };
    members.sort_unstable();
    members.into_iter().map(|i| snapshot.nodes[i].id).collect()
}
