// SPDX-License-Identifier: MIT OR Apache-2.0
//! ign-graph
//!
//! Immutable dependency DAG over ignition signals. Built once from a
//! [`GraphBuilder`]; the topological order, dependency sets, and dependent
//! sets are all precomputed so every query is an O(1) lookup.
//!
//! Signals are identified by stable integer handles (their registration
//! index) internally; the public surface works with names.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::{HashMap, VecDeque};
use thiserror::Error;

/// Errors produced while assembling a [`SignalGraph`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The dependency relation contains a cycle. The path lists the cycle
    /// members in order, e.g. `s1 -> s2 -> s3 -> s1`.
    #[error("dependency cycle detected: {path}")]
    Cycle {
        /// The cycle rendered as `a -> b -> ... -> a`.
        path: String,
    },

    /// A dependency edge references a signal that was never registered.
    #[error("signal `{from}` depends on unknown signal `{to}`")]
    UnknownSignal {
        /// The depending signal.
        from: String,
        /// The missing dependency.
        to: String,
    },

    /// The same signal name was registered twice.
    #[error("duplicate signal `{name}` in graph")]
    DuplicateSignal {
        /// The repeated name.
        name: String,
    },
}

// ---------------------------------------------------------------------------
// GraphBuilder
// ---------------------------------------------------------------------------

/// Collects signals and dependency edges, then [`build`](Self::build)s an
/// immutable [`SignalGraph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    names: Vec<String>,
    index: HashMap<String, usize>,
    // (signal, dependency): dependency must complete before signal starts.
    edges: Vec<(String, String)>,
}

impl GraphBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a signal. Registration order is preserved and used to break
    /// ties in the topological order.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateSignal`] if the name was already added.
    pub fn add_signal(&mut self, name: impl Into<String>) -> Result<(), GraphError> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(GraphError::DuplicateSignal { name });
        }
        self.index.insert(name.clone(), self.names.len());
        self.names.push(name);
        Ok(())
    }

    /// Declare that `signal` depends on `dependency`.
    ///
    /// Both names are resolved against the registered signals at
    /// [`build`](Self::build) time, failing fast when either is absent.
    pub fn depends_on(&mut self, signal: impl Into<String>, dependency: impl Into<String>) {
        self.edges.push((signal.into(), dependency.into()));
    }

    /// Number of registered signals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` when no signals have been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Resolve edges, verify acyclicity, and produce the immutable graph.
    ///
    /// # Errors
    ///
    /// [`GraphError::UnknownSignal`] when an edge references an unregistered
    /// name; [`GraphError::Cycle`] with the exact cycle path when the
    /// relation is not a DAG.
    pub fn build(self) -> Result<SignalGraph, GraphError> {
        let n = self.names.len();
        let mut deps: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (from, to) in &self.edges {
            let Some(&from_ix) = self.index.get(from) else {
                return Err(GraphError::UnknownSignal {
                    from: from.clone(),
                    to: to.clone(),
                });
            };
            let Some(&to_ix) = self.index.get(to) else {
                return Err(GraphError::UnknownSignal {
                    from: from.clone(),
                    to: to.clone(),
                });
            };
            if !deps[from_ix].contains(&to_ix) {
                deps[from_ix].push(to_ix);
                dependents[to_ix].push(from_ix);
            }
        }

        let Some(topo) = kahn_order(n, &deps, &dependents) else {
            let path = find_cycle(&self.names, &deps);
            return Err(GraphError::Cycle { path });
        };

        Ok(SignalGraph {
            names: self.names,
            index: self.index,
            deps,
            dependents,
            topo,
        })
    }
}

/// Kahn's algorithm draining zero-in-degree signals in registration order.
///
/// Returns `None` when a cycle prevents a complete ordering (the caller then
/// runs the DFS diagnosis).
fn kahn_order(n: usize, deps: &[Vec<usize>], dependents: &[Vec<usize>]) -> Option<Vec<usize>> {
    let mut in_degree: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                queue.push_back(d);
            }
        }
    }

    (order.len() == n).then_some(order)
}

/// Locate one cycle by walking dependency edges from an unsorted node and
/// render it as `a -> b -> ... -> a`.
fn find_cycle(names: &[String], deps: &[Vec<usize>]) -> String {
    let n = names.len();
    // 0 = unvisited, 1 = on stack, 2 = done
    let mut state = vec![0u8; n];
    let mut stack: Vec<usize> = Vec::new();

    fn dfs(v: usize, deps: &[Vec<usize>], state: &mut [u8], stack: &mut Vec<usize>) -> Option<Vec<usize>> {
        state[v] = 1;
        stack.push(v);
        for &next in &deps[v] {
            match state[next] {
                0 => {
                    if let Some(cycle) = dfs(next, deps, state, stack) {
                        return Some(cycle);
                    }
                }
                1 => {
                    let start = stack.iter().position(|&s| s == next).unwrap_or(0);
                    let mut cycle: Vec<usize> = stack[start..].to_vec();
                    cycle.push(next);
                    return Some(cycle);
                }
                _ => {}
            }
        }
        stack.pop();
        state[v] = 2;
        None
    }

    for v in 0..n {
        if state[v] == 0
            && let Some(cycle) = dfs(v, deps, &mut state, &mut stack)
        {
            return cycle
                .iter()
                .map(|&i| names[i].as_str())
                .collect::<Vec<_>>()
                .join(" -> ");
        }
    }
    String::from("<unlocatable cycle>")
}

// ---------------------------------------------------------------------------
// SignalGraph
// ---------------------------------------------------------------------------

/// Immutable DAG over signals with precomputed ordering and index maps.
#[derive(Debug, Clone)]
pub struct SignalGraph {
    names: Vec<String>,
    index: HashMap<String, usize>,
    deps: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    topo: Vec<usize>,
}

impl SignalGraph {
    /// An empty graph (valid: every query returns nothing).
    #[must_use]
    pub fn empty() -> Self {
        GraphBuilder::new().build().expect("empty graph is acyclic")
    }

    /// Number of signals in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` when the graph has no signals.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns `true` when the graph contains the named signal.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Signal names in topological order (dependencies first, registration
    /// order breaking ties).
    pub fn signals(&self) -> impl Iterator<Item = &str> {
        self.topo.iter().map(|&i| self.names[i].as_str())
    }

    /// Names this signal depends on, in declaration order.
    ///
    /// Returns `None` for an unknown signal.
    #[must_use]
    pub fn dependencies(&self, name: &str) -> Option<Vec<&str>> {
        let &ix = self.index.get(name)?;
        Some(self.deps[ix].iter().map(|&d| self.names[d].as_str()).collect())
    }

    /// Names that depend on this signal.
    ///
    /// Returns `None` for an unknown signal.
    #[must_use]
    pub fn dependents(&self, name: &str) -> Option<Vec<&str>> {
        let &ix = self.index.get(name)?;
        Some(
            self.dependents[ix]
                .iter()
                .map(|&d| self.names[d].as_str())
                .collect(),
        )
    }

    /// Signals with no dependencies, in registration order.
    #[must_use]
    pub fn roots(&self) -> Vec<&str> {
        (0..self.names.len())
            .filter(|&i| self.deps[i].is_empty())
            .map(|i| self.names[i].as_str())
            .collect()
    }

    /// Signals nothing depends on, in registration order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&str> {
        (0..self.names.len())
            .filter(|&i| self.dependents[i].is_empty())
            .map(|i| self.names[i].as_str())
            .collect()
    }

    // Index-based accessors for the scheduler. Handles are registration
    // indices and stay valid for the life of the graph.

    /// Registration index of a signal name.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Name at a registration index.
    #[must_use]
    pub fn name_of(&self, ix: usize) -> Option<&str> {
        self.names.get(ix).map(String::as_str)
    }

    /// Dependency indices of the signal at `ix`.
    #[must_use]
    pub fn dep_indices(&self, ix: usize) -> &[usize] {
        &self.deps[ix]
    }

    /// Dependent indices of the signal at `ix`.
    #[must_use]
    pub fn dependent_indices(&self, ix: usize) -> &[usize] {
        &self.dependents[ix]
    }

    /// Registration indices in topological order.
    #[must_use]
    pub fn topo_indices(&self) -> &[usize] {
        &self.topo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder(names: &[&str], edges: &[(&str, &str)]) -> GraphBuilder {
        let mut b = GraphBuilder::new();
        for n in names {
            b.add_signal(*n).unwrap();
        }
        for (from, to) in edges {
            b.depends_on(*from, *to);
        }
        b
    }

    #[test]
    fn empty_graph_is_valid() {
        let g = SignalGraph::empty();
        assert!(g.is_empty());
        assert_eq!(g.signals().count(), 0);
        assert!(g.roots().is_empty());
        assert!(g.leaves().is_empty());
    }

    #[test]
    fn topological_order_respects_dependencies() {
        // c depends on b depends on a
        let g = builder(&["c", "b", "a"], &[("c", "b"), ("b", "a")])
            .build()
            .unwrap();
        let order: Vec<&str> = g.signals().collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn registration_order_breaks_ties() {
        let g = builder(&["z", "m", "a"], &[]).build().unwrap();
        let order: Vec<&str> = g.signals().collect();
        assert_eq!(order, vec!["z", "m", "a"]);
    }

    #[test]
    fn diamond_orders_interior_by_registration() {
        // d depends on b and c; b and c depend on a.
        let g = builder(
            &["a", "b", "c", "d"],
            &[("b", "a"), ("c", "a"), ("d", "b"), ("d", "c")],
        )
        .build()
        .unwrap();
        let order: Vec<&str> = g.signals().collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
        assert_eq!(g.roots(), vec!["a"]);
        assert_eq!(g.leaves(), vec!["d"]);
    }

    #[test]
    fn dependency_and_dependent_queries() {
        let g = builder(&["a", "b", "c"], &[("c", "a"), ("c", "b")])
            .build()
            .unwrap();
        assert_eq!(g.dependencies("c").unwrap(), vec!["a", "b"]);
        assert_eq!(g.dependents("a").unwrap(), vec!["c"]);
        assert!(g.dependencies("nope").is_none());
    }

    #[test]
    fn duplicate_edges_collapse() {
        let g = builder(&["a", "b"], &[("b", "a"), ("b", "a")]).build().unwrap();
        assert_eq!(g.dependencies("b").unwrap(), vec!["a"]);
        assert_eq!(g.dependents("a").unwrap(), vec!["b"]);
    }

    #[test]
    fn unknown_dependency_fails_fast() {
        let err = builder(&["a"], &[("a", "ghost")]).build().unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownSignal {
                from: "a".into(),
                to: "ghost".into()
            }
        );
    }

    #[test]
    fn unknown_depender_fails_fast() {
        let err = builder(&["a"], &[("ghost", "a")]).build().unwrap_err();
        assert!(matches!(err, GraphError::UnknownSignal { .. }));
    }

    #[test]
    fn duplicate_signal_rejected() {
        let mut b = GraphBuilder::new();
        b.add_signal("a").unwrap();
        let err = b.add_signal("a").unwrap_err();
        assert_eq!(err, GraphError::DuplicateSignal { name: "a".into() });
    }

    #[test]
    fn three_cycle_reports_exact_path() {
        let err = builder(
            &["s1", "s2", "s3"],
            &[("s1", "s2"), ("s2", "s3"), ("s3", "s1")],
        )
        .build()
        .unwrap_err();
        let GraphError::Cycle { path } = &err else {
            panic!("expected cycle, got {err:?}");
        };
        assert_eq!(path, "s1 -> s2 -> s3 -> s1");
        assert!(err.to_string().contains("s1 -> s2 -> s3 -> s1"));
    }

    #[test]
    fn self_cycle_reports_path() {
        let err = builder(&["solo"], &[("solo", "solo")]).build().unwrap_err();
        let GraphError::Cycle { path } = err else {
            panic!("expected cycle");
        };
        assert_eq!(path, "solo -> solo");
    }

    #[test]
    fn cycle_in_larger_graph_only_reports_cycle_members() {
        let err = builder(
            &["ok", "s1", "s2"],
            &[("s1", "s2"), ("s2", "s1"), ("s1", "ok")],
        )
        .build()
        .unwrap_err();
        let GraphError::Cycle { path } = err else {
            panic!("expected cycle");
        };
        assert!(!path.contains("ok"), "acyclic member leaked into path: {path}");
    }
}
