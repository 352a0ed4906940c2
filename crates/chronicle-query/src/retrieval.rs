//! Hybrid retrieval: vector similarity plus one-hop graph expansion.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chronicle_core::types::GraphNode;
use chronicle_core::EngineError;
use chronicle_graph::{EdgeRow, NodeRow, SubgraphResult};

use crate::embedding::cosine_similarity;
use crate::types::{SearchHit, SearchOutcome, SearchRequest};
use crate::QueryEngine;

impl QueryEngine {
    /// Rank nodes against the query text and return them with one hop of
    /// graph context. Falls back to keyword matching (`degraded=true`) when
    /// the embedding provider is unreachable; a deadline expiring
    /// mid-expansion returns the hits gathered so far (`truncated=true`).
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchOutcome, EngineError> {
        if request.query_text.trim().is_empty() {
            return Err(EngineError::Validation("empty query text".to_string()));
        }

        let cfg = self.config().search.clone();
        let top_k = request.top_k.unwrap_or(cfg.default_top_k).max(1);
        let deadline = Instant::now()
            + Duration::from_millis(request.deadline_ms.unwrap_or(cfg.deadline_ms));

        let mut degraded = false;
        let candidates = match self.embedder().embed(&request.query_text).await {
            Ok(query_vector) => {
                let embedded = self.client().nodes_with_embeddings(cfg.candidate_limit).await?;
                let scored: Vec<(GraphNode, f32)> = embedded
                    .into_iter()
                    .map(|(node, vector)| {
                        let score = cosine_similarity(&query_vector, &vector);
                        (node, score)
                    })
                    .collect();
                select_candidates(scored, top_k)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Embedding unavailable, using keyword fallback");
                degraded = true;
                let matches = self.client().keyword_search(&request.query_text, top_k).await?;
                matches
                    .into_iter()
                    .enumerate()
                    .map(|(rank, node)| (node, 1.0 / (rank as f32 + 1.0)))
                    .collect()
            }
        };

        let mut truncated = false;
        let mut hits = Vec::with_capacity(candidates.len());
        let mut subgraph_nodes: BTreeMap<String, NodeRow> = BTreeMap::new();
        let mut subgraph_edges: Vec<EdgeRow> = Vec::new();

        for (node, score) in candidates {
            if Instant::now() >= deadline {
                truncated = true;
                break;
            }

            let neighbors = self
                .client()
                .neighbors(&node.id, request.as_of, cfg.expansion_limit)
                .await?;

            subgraph_nodes.insert(node.id.0.clone(), node_row(&node));
            let mut neighbor_ids = Vec::with_capacity(neighbors.len());
            for neighbor in &neighbors {
                subgraph_nodes.insert(neighbor.node.id.0.clone(), node_row(&neighbor.node));
                let (source, target) = if neighbor.outbound {
                    (node.id.0.clone(), neighbor.node.id.0.clone())
                } else {
                    (neighbor.node.id.0.clone(), node.id.0.clone())
                };
                subgraph_edges.push(EdgeRow {
                    source_id: source,
                    target_id: target,
                    rel_type: neighbor.rel_type,
                });
                neighbor_ids.push(neighbor.node.id.clone());
            }

            hits.push(SearchHit {
                node_id: node.id.clone(),
                node_type: node.node_type,
                name: node_name(&node),
                score,
                neighbor_count: neighbors.len(),
                neighbor_ids,
            });
        }

        rank_hits(&mut hits);
        hits.truncate(top_k);

        subgraph_edges.sort_by(|a, b| {
            (a.source_id.as_str(), a.target_id.as_str(), a.rel_type.as_cypher())
                .cmp(&(b.source_id.as_str(), b.target_id.as_str(), b.rel_type.as_cypher()))
        });
        subgraph_edges.dedup();

        tracing::debug!(
            results = hits.len(),
            degraded,
            truncated,
            "Search complete"
        );

        Ok(SearchOutcome {
            results: hits,
            subgraph: SubgraphResult {
                nodes: subgraph_nodes.into_values().collect(),
                edges: subgraph_edges,
            },
            degraded,
            truncated,
        })
    }
}

/// Candidates kept for expansion: the top `top_k` by similarity plus every
/// candidate tied with the k-th score. Neighbor counts are only known after
/// expansion, so cutting boundary ties here would pre-empt the ranking's
/// neighbor-count tie-break.
pub(crate) fn select_candidates(
    mut scored: Vec<(GraphNode, f32)>,
    top_k: usize,
) -> Vec<(GraphNode, f32)> {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.id.0.cmp(&b.0.id.0)));
    if scored.len() > top_k {
        let boundary = scored[top_k - 1].1;
        let tied = scored[top_k..]
            .iter()
            .take_while(|(_, score)| score.total_cmp(&boundary).is_eq())
            .count();
        scored.truncate(top_k + tied);
    }
    scored
}

/// Final ranking: score desc, then neighbor count desc, then node id asc.
/// Total order, no reliance on map iteration.
pub(crate) fn rank_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.neighbor_count.cmp(&a.neighbor_count))
            .then_with(|| a.node_id.0.cmp(&b.node_id.0))
    });
}

fn node_row(node: &GraphNode) -> NodeRow {
    NodeRow {
        id: node.id.0.clone(),
        node_type: node.node_type,
        name: node_name(node),
    }
}

fn node_name(node: &GraphNode) -> String {
    node.attributes
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}
