//! In-memory traversal graph.
//!
//! Impact analysis pulls a whitelisted neighborhood out of the store once,
//! then runs all traversal locally. Indices into `nodes` double as BFS ids
//! so the hot loop never touches string keys.

use std::collections::{HashMap, VecDeque};

use chronicle_graph::{NodeRow, SubgraphResult};

/// An adjacency-list graph over a fetched subgraph. Edges are traversed in
/// both directions: a change to a callee impacts its callers and vice versa.
#[derive(Debug, Default)]
pub struct TraversalGraph {
    nodes: Vec<NodeRow>,
    index: HashMap<String, usize>,
    adjacency: Vec<Vec<usize>>,
}

impl TraversalGraph {
    pub fn from_subgraph(subgraph: &SubgraphResult) -> Self {
        let mut graph = Self::default();
        for node in &subgraph.nodes {
            graph.add_node(node.clone());
        }
        for edge in &subgraph.edges {
            graph.add_edge(&edge.source_id, &edge.target_id);
        }
        graph
    }

    fn add_node(&mut self, node: NodeRow) {
        if self.index.contains_key(&node.id) {
            return;
        }
        let idx = self.nodes.len();
        self.index.insert(node.id.clone(), idx);
        self.nodes.push(node);
        self.adjacency.push(Vec::new());
    }

    fn add_edge(&mut self, source_id: &str, target_id: &str) {
        let (Some(&s), Some(&t)) = (self.index.get(source_id), self.index.get(target_id)) else {
            return;
        };
        if s == t {
            return;
        }
        if !self.adjacency[s].contains(&t) {
            self.adjacency[s].push(t);
        }
        if !self.adjacency[t].contains(&s) {
            self.adjacency[t].push(s);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: usize) -> &NodeRow {
        &self.nodes[idx]
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Breadth-first hop distances from `start`, bounded by `max_depth`.
    /// Returns `(node_index, hop_distance)` pairs sorted by distance, then
    /// node id, so callers get a deterministic order. The start node itself
    /// is excluded.
    pub fn hop_distances(&self, start: usize, max_depth: usize) -> Vec<(usize, usize)> {
        let mut dist: Vec<Option<usize>> = vec![None; self.nodes.len()];
        dist[start] = Some(0);

        let mut queue = VecDeque::new();
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            let d = dist[current].unwrap_or(0);
            if d >= max_depth {
                continue;
            }
            for &next in &self.adjacency[current] {
                if dist[next].is_none() {
                    dist[next] = Some(d + 1);
                    queue.push_back(next);
                }
            }
        }

        let mut reached: Vec<(usize, usize)> = dist
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != start)
            .filter_map(|(idx, d)| d.map(|d| (idx, d)))
            .collect();
        reached.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| self.nodes[a.0].id.cmp(&self.nodes[b.0].id)));
        reached
    }
}
