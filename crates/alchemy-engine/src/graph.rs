//! Dependency graph
//!
//! Directed edges `A → B` mean "A's construction reads B's output".
//! The graph yields one valid linear execution ordering (every
//! dependency before its dependents) or fails on the first cycle it
//! meets. Nodes without ordering constraints keep declaration order,
//! which keeps runs deterministic for fixtures; the engine only relies
//! on the weaker guarantee that dependencies complete first.

use crate::error::{EngineError, Result};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Dependency graph over declared units
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Node id → ids it depends on, in declaration order
    nodes: IndexMap<String, Vec<String>>,
}

/// Three-color DFS marking
#[derive(Clone, Copy, PartialEq)]
enum Mark {
    InProgress,
    Done,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Idempotent.
    pub fn add_node(&mut self, id: impl Into<String>) {
        self.nodes.entry(id.into()).or_default();
    }

    /// Record that `id` depends on `depends_on`. The dependent node is
    /// created if needed; the target is validated at ordering time so a
    /// dangling reference fails with the name of both ends.
    pub fn add_dependency(&mut self, id: &str, depends_on: &str) {
        let deps = self.nodes.entry(id.to_string()).or_default();
        if !deps.iter().any(|d| d == depends_on) {
            deps.push(depends_on.to_string());
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.nodes.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// One valid execution ordering: every dependency precedes its
    /// dependents, ties broken by declaration order.
    pub fn execution_order(&self) -> Result<Vec<String>> {
        let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(self.nodes.len());
        let mut order = Vec::with_capacity(self.nodes.len());
        for id in self.nodes.keys() {
            self.visit(id, &mut marks, &mut order)?;
        }
        Ok(order)
    }

    /// Teardown ordering: exact reverse of execution, so nothing is
    /// deleted while something that depends on it still exists.
    pub fn teardown_order(&self) -> Result<Vec<String>> {
        let mut order = self.execution_order()?;
        order.reverse();
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        id: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                return Err(EngineError::CycleDetected(id.to_string()));
            }
            None => {}
        }
        let Some(deps) = self.nodes.get(id) else {
            // Reached only through an edge; the caller reports both ends.
            return Err(EngineError::MissingDependency {
                fqn: String::new(),
                dependency: id.to_string(),
            });
        };
        marks.insert(id, Mark::InProgress);
        for dep in deps {
            self.visit(dep, marks, order).map_err(|e| match e {
                EngineError::MissingDependency { fqn, dependency } if fqn.is_empty() => {
                    EngineError::MissingDependency {
                        fqn: id.to_string(),
                        dependency,
                    }
                }
                other => other,
            })?;
        }
        marks.insert(id, Mark::Done);
        order.push(id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for (id, deps) in edges {
            g.add_node(*id);
            for dep in *deps {
                g.add_dependency(id, dep);
            }
        }
        g
    }

    fn index_of(order: &[String], id: &str) -> usize {
        order.iter().position(|x| x == id).unwrap()
    }

    #[test]
    fn dependencies_precede_dependents() {
        let g = graph(&[
            ("api", &["db", "cache"]),
            ("db", &["network"]),
            ("cache", &["network"]),
            ("network", &[]),
        ]);
        let order = g.execution_order().unwrap();
        assert_eq!(order.len(), 4);
        for (id, deps) in [("api", vec!["db", "cache"]), ("db", vec!["network"])] {
            for dep in deps {
                assert!(index_of(&order, dep) < index_of(&order, id));
            }
        }
    }

    #[test]
    fn declaration_order_breaks_ties() {
        let g = graph(&[("c", &[]), ("a", &[]), ("b", &[])]);
        assert_eq!(g.execution_order().unwrap(), ["c", "a", "b"]);
    }

    #[test]
    fn two_node_cycle_is_detected() {
        let g = graph(&[("a", &["b"]), ("b", &["a"])]);
        let err = g.execution_order().unwrap_err();
        assert!(matches!(err, EngineError::CycleDetected(_)));
    }

    #[test]
    fn self_cycle_is_detected() {
        let g = graph(&[("a", &["a"])]);
        assert!(matches!(
            g.execution_order().unwrap_err(),
            EngineError::CycleDetected(name) if name == "a"
        ));
    }

    #[test]
    fn longer_cycle_is_detected() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"]), ("d", &[])]);
        assert!(matches!(
            g.execution_order().unwrap_err(),
            EngineError::CycleDetected(_)
        ));
    }

    #[test]
    fn dangling_dependency_names_both_ends() {
        let g = graph(&[("api", &["ghost"])]);
        match g.execution_order().unwrap_err() {
            EngineError::MissingDependency { fqn, dependency } => {
                assert_eq!(fqn, "api");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn teardown_is_reverse_of_execution() {
        let g = graph(&[("api", &["db"]), ("db", &[]), ("worker", &["api"])]);
        let mut up = g.execution_order().unwrap();
        let down = g.teardown_order().unwrap();
        up.reverse();
        assert_eq!(up, down);
    }

    #[test]
    fn duplicate_edges_collapse() {
        let mut g = DependencyGraph::new();
        g.add_node("a");
        g.add_node("b");
        g.add_dependency("a", "b");
        g.add_dependency("a", "b");
        assert_eq!(g.dependencies_of("a"), ["b"]);
    }
}
