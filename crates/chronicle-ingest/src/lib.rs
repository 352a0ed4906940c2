//! chronicle-ingest: Idempotent batch ingestion for the knowledge graph.
//!
//! The merger takes externally-produced entities and relationships (the
//! "Load" responsibility) and merges them into the bitemporal graph. Within
//! a batch, node merges happen before any edge that references them; edge
//! endpoints that are still unknown are created as placeholders so
//! out-of-order batches land anyway. One bad record is logged and skipped,
//! never aborting the rest of the batch, and absence from a batch never
//! deletes anything.

pub mod error;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chronicle_core::types::{
    AttrMap, EdgeCandidate, GraphNode, MergeOutcome, NodeId, Provenance, RelType,
};
use chronicle_core::EngineError;
use chronicle_graph::GraphClient;

pub use error::{IngestError, Result};

/// A relationship observation as submitted in a batch. The batch-level
/// provenance is stamped onto every edge; `valid_from` defaults to the
/// merge instant when the extractor did not supply one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub source: NodeId,
    pub target: NodeId,
    pub rel_type: RelType,
    #[serde(default)]
    pub attributes: AttrMap,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
}

/// An interval closed during the batch because a superseding observation
/// arrived for the same edge identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedInterval {
    pub source: NodeId,
    pub target: NodeId,
    pub rel_type: RelType,
    pub closed_at: DateTime<Utc>,
}

/// A record refused by the bitemporal consistency check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencySkip {
    pub identity: String,
    pub reason: String,
}

/// Aggregate outcome of a batch merge. `skipped` counts records refused by
/// the bitemporal consistency check, with the refusals themselves in
/// `violations`; `errors` carries one message per failed record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub nodes_created: u64,
    pub nodes_updated: u64,
    pub nodes_unchanged: u64,
    pub edges_created: u64,
    pub edges_updated: u64,
    pub edges_unchanged: u64,
    pub skipped: u64,
    pub errors: Vec<String>,
    pub closed_intervals: Vec<ClosedInterval>,
    pub violations: Vec<ConsistencySkip>,
}

impl BatchReport {
    pub fn created(&self) -> u64 {
        self.nodes_created + self.edges_created
    }

    pub fn updated(&self) -> u64 {
        self.nodes_updated + self.edges_updated
    }

    pub fn unchanged(&self) -> u64 {
        self.nodes_unchanged + self.edges_unchanged
    }

    fn count_node(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Created => self.nodes_created += 1,
            MergeOutcome::Updated => self.nodes_updated += 1,
            MergeOutcome::Unchanged => self.nodes_unchanged += 1,
        }
    }

    fn count_edge(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Created => self.edges_created += 1,
            MergeOutcome::Updated => self.edges_updated += 1,
            MergeOutcome::Unchanged => self.edges_unchanged += 1,
        }
    }

    /// Record an edge upsert outcome. `Updated` means the prior open
    /// interval was closed at the candidate's `valid_from`.
    fn record_edge(&mut self, candidate: &EdgeCandidate, outcome: MergeOutcome) {
        if outcome == MergeOutcome::Updated {
            self.closed_intervals.push(ClosedInterval {
                source: candidate.source.clone(),
                target: candidate.target.clone(),
                rel_type: candidate.rel_type,
                closed_at: candidate.valid_from,
            });
        }
        self.count_edge(outcome);
    }
}

/// The batch merger. Holds no per-request state beyond the shared client.
#[derive(Clone)]
pub struct Merger {
    client: GraphClient,
}

impl Merger {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// Merge a batch of nodes and edges under one provenance.
    ///
    /// Safely retriable: re-submitting the identical batch leaves the graph
    /// unchanged (attribute-hash and provenance dedup downstream).
    pub async fn merge_batch(
        &self,
        nodes: &[GraphNode],
        edges: &[EdgeSpec],
        provenance: &Provenance,
    ) -> Result<BatchReport> {
        if nodes.is_empty() && edges.is_empty() {
            return Err(IngestError::EmptyBatch);
        }

        let mut report = BatchReport::default();
        let now = Utc::now();

        // Nodes merge before any edge that references them.
        for node in nodes {
            if let Err(reason) = validate_node(node) {
                report
                    .errors
                    .push(format!("node {}: {reason}", node.id));
                continue;
            }
            match self.client.merge_node(node).await {
                Ok(outcome) => report.count_node(outcome),
                Err(e) => {
                    tracing::warn!(node = %node.id, error = %e, "Node merge failed");
                    report.errors.push(format!("node {}: {e}", node.id));
                }
            }
        }

        for edge in edges {
            if let Err(reason) = validate_edge(edge) {
                report
                    .errors
                    .push(format!("edge {} -> {}: {reason}", edge.source, edge.target));
                continue;
            }

            let candidate = EdgeCandidate {
                source: edge.source.clone(),
                target: edge.target.clone(),
                rel_type: edge.rel_type,
                attributes: edge.attributes.clone(),
                valid_from: edge.valid_from.unwrap_or(now),
                provenance: provenance.clone(),
            };

            if let Err(e) = self.ensure_endpoints(&candidate).await {
                report
                    .errors
                    .push(format!("edge {}: {e}", candidate.identity()));
                continue;
            }

            match self.client.upsert_edge(&candidate).await {
                Ok(outcome) => report.record_edge(&candidate, outcome),
                Err(EngineError::Consistency { identity, reason }) => {
                    // A bitemporal invariant breach skips the record only.
                    tracing::warn!(%identity, %reason, "Consistency violation, record skipped");
                    report.skipped += 1;
                    report.errors.push(format!("{identity}: {reason}"));
                    report.violations.push(ConsistencySkip { identity, reason });
                }
                Err(e) => {
                    tracing::warn!(identity = %candidate.identity(), error = %e, "Edge upsert failed");
                    report
                        .errors
                        .push(format!("edge {}: {e}", candidate.identity()));
                }
            }
        }

        tracing::info!(
            origin = %provenance.origin,
            change_id = %provenance.change_id,
            created = report.created(),
            updated = report.updated(),
            unchanged = report.unchanged(),
            skipped = report.skipped,
            failed = report.errors.len(),
            "Batch merge complete"
        );

        Ok(report)
    }

    /// Create-if-absent placeholders for edge endpoints that neither the
    /// batch nor the store knows yet.
    async fn ensure_endpoints(&self, candidate: &EdgeCandidate) -> Result<()> {
        for endpoint in [&candidate.source, &candidate.target] {
            self.client.ensure_node(&placeholder_for(endpoint)).await?;
        }
        Ok(())
    }
}

/// Build a minimal placeholder node for an endpoint id. The node type is
/// taken from the id's `Type:` prefix when present, defaulting to `File`.
fn placeholder_for(id: &NodeId) -> GraphNode {
    let node_type = id
        .0
        .split_once(':')
        .and_then(|(prefix, _)| chronicle_core::types::NodeType::parse(prefix))
        .unwrap_or(chronicle_core::types::NodeType::File);
    GraphNode::new(id.0.clone(), node_type)
}

fn validate_node(node: &GraphNode) -> std::result::Result<(), String> {
    if node.id.0.trim().is_empty() {
        return Err("empty node id".to_string());
    }
    if node.attributes.contains_key("embedding") && node.embedding().is_none() {
        return Err("embedding attribute is not a numeric list".to_string());
    }
    Ok(())
}

fn validate_edge(edge: &EdgeSpec) -> std::result::Result<(), String> {
    if edge.source.0.trim().is_empty() || edge.target.0.trim().is_empty() {
        return Err("empty endpoint id".to_string());
    }
    if edge.rel_type == RelType::AppliesTo {
        return Err("APPLIES_TO is reserved for constraint attachment".to_string());
    }
    Ok(())
}
