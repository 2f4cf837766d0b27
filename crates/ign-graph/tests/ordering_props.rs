// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property tests for topological ordering and cycle diagnostics.

use ign_graph::{GraphBuilder, GraphError};
use proptest::prelude::*;

fn name(i: usize) -> String {
    format!("s{i}")
}

/// Edges that always point from a later registration to an earlier one,
/// which guarantees acyclicity.
fn forward_edges(nodes: usize) -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0..nodes, 0..nodes), 0..nodes * 2).prop_map(|pairs| {
        pairs
            .into_iter()
            .filter(|(from, to)| from > to)
            .collect::<Vec<_>>()
    })
}

proptest! {
    #[test]
    fn acyclic_graphs_always_build(edges in forward_edges(8)) {
        let mut builder = GraphBuilder::new();
        for i in 0..8 {
            builder.add_signal(name(i)).unwrap();
        }
        for &(from, to) in &edges {
            builder.depends_on(name(from), name(to));
        }
        let graph = builder.build().unwrap();
        prop_assert_eq!(graph.len(), 8);

        // Every dependency appears before its depender in the order.
        let order: Vec<&str> = graph.signals().collect();
        let position = |n: &str| order.iter().position(|&o| o == n).unwrap();
        for &(from, to) in &edges {
            prop_assert!(position(&name(to)) < position(&name(from)));
        }
    }

    #[test]
    fn arbitrary_graphs_build_or_report_a_real_cycle(
        edges in prop::collection::vec((0..6usize, 0..6usize), 0..12)
    ) {
        let mut builder = GraphBuilder::new();
        for i in 0..6 {
            builder.add_signal(name(i)).unwrap();
        }
        for &(from, to) in &edges {
            builder.depends_on(name(from), name(to));
        }
        match builder.build() {
            Ok(graph) => {
                let order: Vec<&str> = graph.signals().collect();
                prop_assert_eq!(order.len(), 6);
            }
            Err(GraphError::Cycle { path }) => {
                // The reported path must close on itself.
                let members: Vec<&str> = path.split(" -> ").collect();
                prop_assert!(members.len() >= 2);
                prop_assert_eq!(members.first(), members.last());
                // And every hop must be a declared dependency edge.
                for pair in members.windows(2) {
                    let from: usize = pair[0][1..].parse().unwrap();
                    let to: usize = pair[1][1..].parse().unwrap();
                    prop_assert!(edges.contains(&(from, to)));
                }
            }
            Err(other) => prop_assert!(false, "unexpected error: {other}"),
        }
    }

    #[test]
    fn roots_and_leaves_partition_consistently(edges in forward_edges(8)) {
        let mut builder = GraphBuilder::new();
        for i in 0..8 {
            builder.add_signal(name(i)).unwrap();
        }
        for &(from, to) in &edges {
            builder.depends_on(name(from), name(to));
        }
        let graph = builder.build().unwrap();
        for root in graph.roots() {
            prop_assert!(graph.dependencies(root).unwrap().is_empty());
        }
        for leaf in graph.leaves() {
            prop_assert!(graph.dependents(leaf).unwrap().is_empty());
        }
    }
}
