//! Request and outcome types for the retrieval and impact engines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chronicle_core::types::{NodeId, NodeType, RiskLevel};
use chronicle_graph::SubgraphResult;

/// A hybrid search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query_text: String,
    /// Defaults to the configured `default_top_k`.
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Project the graph as of this instant; `None` means current state.
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
    /// Overrides the configured search deadline.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

/// One ranked search result with its one-hop context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub node_id: NodeId,
    pub node_type: NodeType,
    pub name: String,
    pub score: f32,
    pub neighbor_count: usize,
    pub neighbor_ids: Vec<NodeId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchHit>,
    pub subgraph: SubgraphResult,
    /// True when the embedding provider was unreachable and keyword
    /// fallback supplied the results.
    pub degraded: bool,
    /// True when the deadline expired before all expansion finished.
    pub truncated: bool,
}

/// An impact analysis request. `target` is a selector: an exact node id, or
/// an exact `name`/`path` property value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactRequest {
    pub target: String,
    /// Clamped to the configured depth ceiling.
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactedNode {
    pub node_id: NodeId,
    pub node_type: NodeType,
    pub hop_distance: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactOutcome {
    pub risk_level: RiskLevel,
    /// Impacted nodes ordered by hop distance, then id. The target itself
    /// is not included.
    pub impacted: Vec<ImpactedNode>,
    pub subgraph: SubgraphResult,
    /// True when the requested depth was clamped or the deadline expired.
    pub truncated: bool,
}
