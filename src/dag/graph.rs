// src/dag/graph.rs

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::errors::{Error, Result};

#[derive(Debug, Clone)]
struct Vertex<P> {
    payload: P,
    /// Ids this vertex depends on, in declaration order.
    outgoing: Vec<String>,
}

/// Directed acyclic graph keyed by vertex id, preserving insertion order.
///
/// Dependency ids that do not (yet) exist are permitted: they participate in
/// cycle checks as implicit nodes and resolve if the vertex arrives later.
pub struct Dag<P> {
    vertices: HashMap<String, Vertex<P>>,
    insertion: Vec<String>,
    /// Cached topological order, invalidated on any mutation.
    sorted: Option<Vec<String>>,
}

impl<P> Default for Dag<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> Dag<P> {
    pub fn new() -> Self {
        Self {
            vertices: HashMap::new(),
            insertion: Vec::new(),
            sorted: None,
        }
    }

    pub fn len(&self) -> usize {
        self.insertion.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insertion.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.vertices.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&P> {
        self.vertices.get(id).map(|v| &v.payload)
    }

    /// Vertex ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.insertion.iter().map(String::as_str)
    }

    /// `(id, payload)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &P)> {
        self.insertion
            .iter()
            .filter_map(|id| self.vertices.get(id).map(|v| (id.as_str(), &v.payload)))
    }

    /// The ids `id` depends on, in declaration order.
    pub fn depends_on(&self, id: &str) -> &[String] {
        self.vertices
            .get(id)
            .map(|v| v.outgoing.as_slice())
            .unwrap_or(&[])
    }

    /// Insert a vertex together with its dependency edges.
    pub fn add_vertex(
        &mut self,
        id: impl Into<String>,
        payload: P,
        depends_on: &[String],
    ) -> Result<()> {
        let id = id.into();
        if self.vertices.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }

        self.vertices.insert(
            id.clone(),
            Vertex {
                payload,
                outgoing: Vec::new(),
            },
        );
        self.insertion.push(id.clone());

        for dep in depends_on {
            if let Err(err) = self.add_edge(&id, dep) {
                // Roll the half-inserted vertex back out.
                self.remove_vertex(&id);
                return Err(err);
            }
        }

        self.sorted = None;
        Ok(())
    }

    /// Add a depends-on edge `from -> to`. Rejects self-loops and any edge
    /// that would close a cycle; duplicate edges are a no-op.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        if !self.vertices.contains_key(from) {
            return Err(Error::UnknownId(from.to_string()));
        }
        if from == to {
            return Err(Error::CycleDetected {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        if self
            .vertices
            .get(from)
            .is_some_and(|v| v.outgoing.iter().any(|d| d == to))
        {
            return Ok(());
        }
        if self.creates_cycle(from, to) {
            return Err(Error::CycleDetected {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        if let Some(vertex) = self.vertices.get_mut(from) {
            vertex.outgoing.push(to.to_string());
        }
        self.sorted = None;
        Ok(())
    }

    /// Remove a vertex, scrubbing every other vertex's edge to it, and
    /// return its payload.
    pub fn remove_vertex(&mut self, id: &str) -> Option<P> {
        let vertex = self.vertices.remove(id)?;
        self.insertion.retain(|v| v != id);
        for other in self.vertices.values_mut() {
            other.outgoing.retain(|dep| dep != id);
        }
        self.sorted = None;
        debug!(vertex = %id, "removed vertex and scrubbed incoming edges");
        Some(vertex.payload)
    }

    /// True iff no other vertex depends on `id`.
    pub fn is_terminal(&self, id: &str) -> bool {
        self.vertices
            .iter()
            .all(|(vid, v)| vid == id || !v.outgoing.iter().any(|dep| dep == id))
    }

    /// Would adding `from -> to` make the graph cyclic?
    ///
    /// Built on petgraph: a topological sort of the candidate graph fails
    /// exactly when the new edge closes a cycle. Dangling dependency ids
    /// join the graph as implicit nodes.
    fn creates_cycle(&self, from: &str, to: &str) -> bool {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for id in &self.insertion {
            graph.add_node(id.as_str());
        }
        for (id, vertex) in &self.vertices {
            for dep in &vertex.outgoing {
                graph.add_edge(id.as_str(), dep.as_str(), ());
            }
        }
        graph.add_edge(from, to, ());

        toposort(&graph, None).is_err()
    }

    /// Topological order of vertex ids: every vertex appears after every
    /// vertex it depends on. `cmp` orders vertices wherever dependencies
    /// leave room; equal entries keep insertion order. The result is cached
    /// until the next mutation.
    ///
    /// Sorting happens in scratch buffers only; the stored edge lists are
    /// never reordered.
    pub fn topo_sort<C>(&mut self, cmp: C) -> Vec<String>
    where
        C: Fn(&P, &P) -> Ordering,
    {
        if let Some(cached) = &self.sorted {
            return cached.clone();
        }

        let mut roots: Vec<String> = self.insertion.clone();
        roots.sort_by(|a, b| self.compare_ids(&cmp, a, b));

        let mut visited: HashSet<String> = HashSet::new();
        let mut order: Vec<String> = Vec::with_capacity(self.insertion.len());
        for id in &roots {
            self.visit(id, &cmp, &mut visited, &mut order);
        }

        self.sorted = Some(order.clone());
        order
    }

    fn compare_ids<C>(&self, cmp: &C, a: &str, b: &str) -> Ordering
    where
        C: Fn(&P, &P) -> Ordering,
    {
        match (self.vertices.get(a), self.vertices.get(b)) {
            (Some(x), Some(y)) => cmp(&x.payload, &y.payload),
            _ => Ordering::Equal,
        }
    }

    fn visit<C>(
        &self,
        id: &str,
        cmp: &C,
        visited: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) where
        C: Fn(&P, &P) -> Ordering,
    {
        let Some(vertex) = self.vertices.get(id) else {
            // Dangling dependency: nothing to schedule.
            return;
        };
        if !visited.insert(id.to_string()) {
            return;
        }

        let mut deps: Vec<String> = vertex.outgoing.clone();
        deps.sort_by(|a, b| self.compare_ids(cmp, a, b));
        for dep in &deps {
            self.visit(dep, cmp, visited, order);
        }

        order.push(id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Prio(i64);

    fn by_priority(a: &Prio, b: &Prio) -> Ordering {
        b.0.cmp(&a.0)
    }

    fn dag_abc() -> Dag<Prio> {
        let mut dag = Dag::new();
        dag.add_vertex("A", Prio(0), &[]).unwrap();
        dag.add_vertex("B", Prio(0), &["A".into()]).unwrap();
        dag.add_vertex("C", Prio(0), &["B".into()]).unwrap();
        dag
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut dag = dag_abc();
        let err = dag.add_vertex("A", Prio(0), &[]).unwrap_err();
        assert!(matches!(err, Error::DuplicateId(id) if id == "A"));
        assert_eq!(dag.len(), 3);
    }

    #[test]
    fn self_edge_rejected() {
        let mut dag = Dag::new();
        let err = dag.add_vertex("A", Prio(0), &["A".into()]).unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
        // The rolled-back vertex must not linger.
        assert!(dag.is_empty());
    }

    #[test]
    fn cycle_rejected_and_graph_unchanged() {
        let mut dag = Dag::new();
        dag.add_vertex("A", Prio(0), &[]).unwrap();
        dag.add_vertex("B", Prio(0), &[]).unwrap();
        dag.add_edge("A", "B").unwrap();

        let err = dag.add_edge("B", "A").unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
        assert_eq!(dag.depends_on("A"), ["B".to_string()]);
        assert!(dag.depends_on("B").is_empty());
    }

    #[test]
    fn transitive_cycle_rejected() {
        let mut dag = dag_abc();
        // C depends on B depends on A; A -> C would close the loop.
        let err = dag.add_edge("A", "C").unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
    }

    #[test]
    fn dangling_dependency_is_allowed_and_resolves_later() {
        let mut dag = Dag::new();
        dag.add_vertex("B", Prio(0), &["A".into()]).unwrap();
        let order = dag.topo_sort(by_priority);
        assert_eq!(order, ["B".to_string()]);

        dag.add_vertex("A", Prio(0), &[]).unwrap();
        let order = dag.topo_sort(by_priority);
        assert_eq!(order, ["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn dangling_cycle_still_detected() {
        let mut dag = Dag::new();
        dag.add_vertex("B", Prio(0), &["A".into()]).unwrap();
        let err = dag.add_vertex("A", Prio(0), &["B".into()]).unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
        assert!(!dag.contains("A"));
    }

    #[test]
    fn topo_order_puts_dependencies_first() {
        let mut dag = dag_abc();
        assert_eq!(
            dag.topo_sort(by_priority),
            ["A".to_string(), "B".to_string(), "C".to_string()]
        );
    }

    #[test]
    fn priority_orders_independent_vertices() {
        let mut dag = Dag::new();
        dag.add_vertex("low", Prio(1), &[]).unwrap();
        dag.add_vertex("high", Prio(10), &[]).unwrap();
        dag.add_vertex("mid", Prio(5), &[]).unwrap();

        assert_eq!(
            dag.topo_sort(by_priority),
            ["high".to_string(), "mid".to_string(), "low".to_string()]
        );
    }

    #[test]
    fn equal_priority_keeps_insertion_order() {
        let mut dag = Dag::new();
        for id in ["one", "two", "three", "four"] {
            dag.add_vertex(id, Prio(0), &[]).unwrap();
        }
        assert_eq!(
            dag.topo_sort(by_priority),
            ["one", "two", "three", "four"].map(String::from)
        );
    }

    #[test]
    fn sort_does_not_reorder_stored_edges() {
        let mut dag = Dag::new();
        dag.add_vertex("x", Prio(1), &[]).unwrap();
        dag.add_vertex("y", Prio(9), &[]).unwrap();
        dag.add_vertex("z", Prio(0), &["x".into(), "y".into()])
            .unwrap();

        dag.topo_sort(by_priority);
        // Declaration order survives even though the comparator prefers y.
        assert_eq!(dag.depends_on("z"), ["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn cache_invalidated_on_mutation() {
        let mut dag = dag_abc();
        let first = dag.topo_sort(by_priority);
        dag.add_vertex("D", Prio(100), &[]).unwrap();
        let second = dag.topo_sort(by_priority);
        assert_ne!(first, second);
        assert_eq!(second[0], "D");
    }

    #[test]
    fn remove_vertex_scrubs_incoming_edges() {
        let mut dag = dag_abc();
        let removed = dag.remove_vertex("B");
        assert!(removed.is_some());
        assert!(dag.depends_on("C").is_empty());
        assert!(dag.remove_vertex("B").is_none());
    }

    #[test]
    fn terminality_is_the_no_dependents_sense() {
        let dag = dag_abc();
        assert!(dag.is_terminal("C"));
        assert!(!dag.is_terminal("A"));
        assert!(!dag.is_terminal("B"));
    }
}
