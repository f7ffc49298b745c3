//! Testing utilities for the Stackweave workspace
//!
//! Declaration shorthands, the reference data/role/fetcher/schedule graph,
//! and proptest strategies for arbitrary acyclic graphs.

#![allow(missing_docs)]

use proptest::prelude::*;
use stackweave_core::prelude::*;
use std::time::Duration;

pub const LAMBDA_PRINCIPAL: &str = "lambda.amazonaws.com";

pub fn secret(id: &str) -> NodeDeclaration {
    NodeDeclaration::new(ResourceKind::Secret, id).with_property("name", id)
}

pub fn bucket(id: &str) -> NodeDeclaration {
    NodeDeclaration::new(ResourceKind::ObjectStore, id).with_property("visibility", "private")
}

pub fn role(id: &str) -> NodeDeclaration {
    NodeDeclaration::new(ResourceKind::AccessRole, id).with_property("trustedPrincipal", LAMBDA_PRINCIPAL)
}

pub fn function(id: &str, role: &str) -> NodeDeclaration {
    NodeDeclaration::new(ResourceKind::ComputeFunction, id)
        .with_property("runtime", "python3.11")
        .with_property("handler", "index.handler")
        .with_property("role", Value::reference(role, "handle"))
}

pub fn api(id: &str) -> NodeDeclaration {
    NodeDeclaration::new(ResourceKind::PublicApi, id).with_property("name", id)
}

/// Object store `data`, role `role` with read/write on it, function
/// `fetcher` running as `role` with the bucket name in its environment,
/// and schedule `schedule` firing `fetcher` every 10 minutes
pub fn scenario_graph() -> Graph {
    let mut graph = Graph::new();
    graph.create_node(bucket("data")).unwrap();
    graph.create_node(role("role")).unwrap();
    AccessPolicyBuilder::attach(
        &mut graph,
        &"role".into(),
        &[Grant::on("data", ["read", "write"])],
        PolicyOrigin::Declared,
    )
    .unwrap();
    graph
        .create_node(function("fetcher", "role").with_property(
            "environment",
            Value::map([("DATA_BUCKET", Value::reference("data", "name"))]),
        ))
        .unwrap();
    ScheduleBinder::bind(&mut graph, "schedule", Duration::from_secs(600), "fetcher").unwrap();
    graph
}

/// Secrets `n0..n{count}` where each `(from, to)` pair makes `n{from}`
/// depend on `n{to}`
pub fn graph_from_edges(count: usize, edges: &[(usize, usize)]) -> Graph {
    let mut graph = Graph::new();
    for index in 0..count {
        let mut decl = secret(&format!("n{index}"));
        for (_, to) in edges.iter().filter(|(from, _)| *from == index) {
            decl = decl.with_dependency(format!("n{to}"));
        }
        graph.create_node(decl).unwrap();
    }
    graph
}

/// Node count plus edges that only point from later to earlier
/// declarations, so the graph is acyclic
pub fn arb_dag(max_nodes: usize) -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1..=max_nodes).prop_flat_map(|count| {
        let edges = proptest::collection::vec((0..count, 0..count), 0..count * 2).prop_map(|pairs| {
            pairs
                .into_iter()
                .filter(|(a, b)| a != b)
                .map(|(a, b)| (a.max(b), a.min(b)))
                .collect::<Vec<_>>()
        });
        (Just(count), edges)
    })
}

/// Same as [`arb_dag`] but edges may point in either direction; used to
/// check that dependency order, not declaration order, drives the artifact
pub fn arb_shuffled_dag(max_nodes: usize) -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    arb_dag(max_nodes).prop_flat_map(|(count, edges)| {
        Just((0..count).collect::<Vec<_>>())
            .prop_shuffle()
            .prop_map(move |perm| {
                let edges = edges.iter().map(|(a, b)| (perm[*a], perm[*b])).collect();
                (count, edges)
            })
    })
}

/// Every dependency of every node appears earlier in the artifact
pub fn assert_respects_edges(artifact: &Artifact) {
    for (position, node) in artifact.ordered_nodes.iter().enumerate() {
        for dep in &node.depends_on {
            let dep_position = artifact
                .position(dep.as_str())
                .unwrap_or_else(|| panic!("{dep} missing from artifact"));
            assert!(
                dep_position < position,
                "{} at {position} precedes its dependency {dep} at {dep_position}",
                node.id
            );
        }
    }
}
