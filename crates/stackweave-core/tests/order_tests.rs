use proptest::prelude::*;
use std::time::{Duration, Instant};
use stackweave_core::prelude::*;
use stackweave_core::synth::stable_topological_order;
use stackweave_test_utils::{arb_dag, arb_shuffled_dag, assert_respects_edges, graph_from_edges, secret};

proptest! {
    #[test]
    fn prop_synthesis_is_deterministic((count, edges) in arb_shuffled_dag(12)) {
        let first = synthesize(&graph_from_edges(count, &edges)).unwrap();
        let second = synthesize(&graph_from_edges(count, &edges)).unwrap();

        prop_assert_eq!(&first.digest, &second.digest);
        prop_assert_eq!(first.to_json_pretty().unwrap(), second.to_json_pretty().unwrap());
    }

    #[test]
    fn prop_order_respects_every_edge((count, edges) in arb_shuffled_dag(16)) {
        let artifact = synthesize(&graph_from_edges(count, &edges)).unwrap();
        prop_assert_eq!(artifact.ordered_nodes.len(), count);
        assert_respects_edges(&artifact);
    }

    #[test]
    fn prop_declaration_order_wins_ties((count, edges) in arb_dag(16)) {
        // all edges point backwards, so declaration order is already valid
        // and the smallest-ordinal rule must reproduce it exactly
        let graph = graph_from_edges(count, &edges);
        let order = stable_topological_order(&graph).unwrap();
        let expected: Vec<NodeId> = (0..count).map(|i| NodeId::new(format!("n{i}"))).collect();
        prop_assert_eq!(order, expected);
    }

    #[test]
    fn prop_closing_edge_reports_cycle((count, edges) in arb_dag(10)) {
        prop_assume!(count >= 2);
        // n0 and the last node depend on each other
        let mut edges = edges;
        edges.push((count - 1, 0));
        edges.push((0, count - 1));

        let err = synthesize(&graph_from_edges(count, &edges)).unwrap_err();
        prop_assert!(err.has_cycle());
        for violation in err.violations() {
            if let Violation::CyclicDependency { involved } = violation {
                prop_assert!(involved.len() >= 2);
            }
        }
    }
}

#[test]
fn test_unrelated_nodes_follow_declaration_order() {
    let mut graph = Graph::new();
    for id in ["zeta", "alpha", "mid"] {
        graph.create_node(secret(id)).unwrap();
    }
    let artifact = synthesize(&graph).unwrap();
    let ids: Vec<&str> = artifact.ordered_nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
}

#[test]
fn test_two_cycles_reported_separately() {
    let mut graph = Graph::new();
    graph.create_node(secret("a").with_dependency("b")).unwrap();
    graph.create_node(secret("b").with_dependency("a")).unwrap();
    graph.create_node(secret("c").with_dependency("d")).unwrap();
    graph.create_node(secret("d").with_dependency("c")).unwrap();

    let err = synthesize(&graph).unwrap_err();
    assert_eq!(
        err.violations(),
        &[
            Violation::CyclicDependency {
                involved: vec!["a".into(), "b".into()],
            },
            Violation::CyclicDependency {
                involved: vec!["c".into(), "d".into()],
            },
        ]
    );
}

#[test]
fn test_long_chain_assembles_quickly() {
    const LENGTH: usize = 5_000;
    let mut graph = Graph::new();
    graph.create_node(secret("n0")).unwrap();
    for index in 1..LENGTH {
        let previous = format!("n{}", index - 1);
        graph
            .create_node(
                secret(&format!("n{index}"))
                    .with_property("previous", Value::reference(previous.as_str(), "handle"))
                    .with_dependency(previous.as_str()),
            )
            .unwrap();
    }

    let started = Instant::now();
    let artifact = synthesize(&graph).unwrap();
    assert!(started.elapsed() < Duration::from_secs(10), "took {:?}", started.elapsed());

    assert_eq!(artifact.ordered_nodes.len(), LENGTH);
    // explicit and reference edges to the same node collapse to one dependency
    let last = artifact.node(&format!("n{}", LENGTH - 1)).unwrap();
    assert_eq!(last.depends_on, vec![NodeId::new(format!("n{}", LENGTH - 2))]);
    assert!(artifact.node("n0").unwrap().depends_on.is_empty());
    assert_eq!(artifact.edges.len(), 2 * (LENGTH - 1));
    assert_respects_edges(&artifact);
}
