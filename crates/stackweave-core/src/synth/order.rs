//! Deterministic apply order
//!
//! Kahn's algorithm over the dependency edges, always releasing the ready
//! node with the smallest creation ordinal. Whatever is left once no node
//! is ready sits on or behind a cycle; the cycles themselves are found as
//! strongly connected components.

use crate::error::Violation;
use crate::graph::Graph;
use crate::types::NodeId;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

/// Order nodes so every dependency precedes its dependents
///
/// Ties are broken by creation ordinal, so equal graphs always produce the
/// same order. Edges to undeclared nodes are ignored here; validation
/// reports them.
///
/// # Errors
/// One `CyclicDependency` per cyclic component, naming every node in it
/// by creation order.
pub fn stable_topological_order(graph: &Graph) -> Result<Vec<NodeId>, Vec<Violation>> {
    let count = graph.len();

    // (dependent, dependency) by ordinal, deduplicated across edge reasons
    let mut pairs: BTreeSet<(usize, usize)> = BTreeSet::new();
    for edge in graph.dependency_edges() {
        if let (Some(from), Some(to)) = (graph.node(&edge.from), graph.node(&edge.to)) {
            pairs.insert((from.ordinal(), to.ordinal()));
        }
    }

    let mut indegree = vec![0_usize; count];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    for &(from, to) in &pairs {
        indegree[from] += 1;
        dependents[to].push(from);
    }

    let mut ready: BinaryHeap<Reverse<usize>> = indegree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(ordinal, _)| Reverse(ordinal))
        .collect();

    let mut order: Vec<usize> = Vec::with_capacity(count);
    while let Some(Reverse(ordinal)) = ready.pop() {
        order.push(ordinal);
        for &dependent in &dependents[ordinal] {
            indegree[dependent] -= 1;
            if indegree[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() == count {
        return Ok(order
            .into_iter()
            .filter_map(|ordinal| graph.node_at(ordinal).map(|node| node.id().clone()))
            .collect());
    }

    let placed: BTreeSet<usize> = order.into_iter().collect();
    Err(find_cycles(graph, &pairs, &placed))
}

fn find_cycles(graph: &Graph, pairs: &BTreeSet<(usize, usize)>, placed: &BTreeSet<usize>) -> Vec<Violation> {
    let mut scc_graph: DiGraph<usize, ()> = DiGraph::new();
    let mut index: HashMap<usize, NodeIndex> = HashMap::new();
    for ordinal in (0..graph.len()).filter(|ordinal| !placed.contains(ordinal)) {
        index.insert(ordinal, scc_graph.add_node(ordinal));
    }
    for (from, to) in pairs {
        if let (Some(&a), Some(&b)) = (index.get(from), index.get(to)) {
            scc_graph.add_edge(a, b, ());
        }
    }

    let mut components: Vec<Vec<usize>> = tarjan_scc(&scc_graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1
                || component
                    .first()
                    .is_some_and(|node| scc_graph.find_edge(*node, *node).is_some())
        })
        .map(|component| {
            let mut ordinals: Vec<usize> = component.into_iter().map(|idx| scc_graph[idx]).collect();
            ordinals.sort_unstable();
            ordinals
        })
        .collect();
    components.sort_unstable();

    components
        .into_iter()
        .map(|ordinals| Violation::CyclicDependency {
            involved: ordinals
                .into_iter()
                .filter_map(|ordinal| graph.node_at(ordinal).map(|node| node.id().clone()))
                .collect(),
        })
        .collect()
}
