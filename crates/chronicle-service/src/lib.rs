//! chronicle-service: the stable message contract and the facade wiring
//! every engine together.
//!
//! The request/response types in this crate are the compatibility
//! boundary; downstream callers (RPC gateways, the CLI) speak only these.
//! The facade holds per-request state nowhere and emits engine events over
//! an injected channel sender, so observers are optional.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use chronicle_core::config::EngineConfig;
use chronicle_core::events::{EngineEvent, EventPayload};
use chronicle_core::types::{GraphNode, ProposedChange, Provenance, Violation};
use chronicle_core::EngineError;
use chronicle_graph::{GraphClient, NodeRow};
use chronicle_govern::{ConstraintCoordinator, ConstraintSpec, LockCoordinator, LockGrant};
use chronicle_ingest::{BatchReport, EdgeSpec, Merger};
use chronicle_query::{ImpactOutcome, ImpactRequest, QueryEngine, SearchOutcome, SearchRequest};

// ── Request / Response Contract ───────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestBatchRequest {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
    pub provenance: Provenance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestBatchResponse {
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub skipped: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl From<&BatchReport> for IngestBatchResponse {
    fn from(report: &BatchReport) -> Self {
        Self {
            created: report.created(),
            updated: report.updated(),
            unchanged: report.unchanged(),
            skipped: report.skipped,
            errors: report.errors.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquireLockRequest {
    pub target: String,
    pub agent_id: String,
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseLockResponse {
    pub released: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyConstraintRequest {
    pub target: String,
    pub spec: ConstraintSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyConstraintResponse {
    pub constraint_id: String,
    pub applied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateConstraintsResponse {
    pub violations: Vec<Violation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrphansResponse {
    pub total_nodes: i64,
    pub orphans: Vec<NodeRow>,
}

// ── Facade ────────────────────────────────────────────────────────

/// Wires the merger, query engine, and coordinators over one shared graph
/// client. Cheap to clone; every operation is independently concurrent.
#[derive(Clone)]
pub struct ChronicleService {
    merger: Merger,
    query: QueryEngine,
    locks: LockCoordinator,
    constraints: ConstraintCoordinator,
    client: GraphClient,
    events: Option<UnboundedSender<EngineEvent>>,
}

impl ChronicleService {
    /// Build a service with the in-process feature-hashing embedder.
    pub fn new(client: GraphClient, config: EngineConfig) -> Self {
        let embedder = std::sync::Arc::new(chronicle_query::FeatureHashEmbedder::default());
        Self::with_embedder(client, config, embedder)
    }

    /// Build a service with a caller-supplied embedding provider.
    pub fn with_embedder(
        client: GraphClient,
        config: EngineConfig,
        embedder: std::sync::Arc<dyn chronicle_query::EmbeddingProvider>,
    ) -> Self {
        Self {
            merger: Merger::new(client.clone()),
            query: QueryEngine::new(client.clone(), embedder, config),
            locks: LockCoordinator::new(client.clone()),
            constraints: ConstraintCoordinator::new(client.clone()),
            client,
            events: None,
        }
    }

    /// Attach an event sink. Events are best-effort: a dropped receiver
    /// never fails an operation.
    pub fn with_events(mut self, sender: UnboundedSender<EngineEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    fn emit(&self, payload: EventPayload) {
        if let Some(sender) = &self.events {
            let _ = sender.send(EngineEvent::new(payload));
        }
    }

    pub async fn ingest_batch(
        &self,
        request: &IngestBatchRequest,
    ) -> Result<IngestBatchResponse, EngineError> {
        let report = self
            .merger
            .merge_batch(&request.nodes, &request.edges, &request.provenance)
            .await?;

        self.emit(EventPayload::BatchMerged {
            origin: request.provenance.origin.clone(),
            change_id: request.provenance.change_id.clone(),
            nodes_created: report.nodes_created,
            edges_created: report.edges_created,
            skipped: report.skipped,
        });
        for closed in &report.closed_intervals {
            self.emit(EventPayload::EdgeIntervalClosed {
                source: closed.source.clone(),
                target: closed.target.clone(),
                rel_type: closed.rel_type,
                closed_at: closed.closed_at,
            });
        }
        for violation in &report.violations {
            self.emit(EventPayload::ConsistencyViolation {
                identity: violation.identity.clone(),
                reason: violation.reason.clone(),
            });
        }
        Ok(IngestBatchResponse::from(&report))
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchOutcome, EngineError> {
        let outcome = self.query.search(request).await?;
        if outcome.degraded {
            self.emit(EventPayload::SearchDegraded {
                query: request.query_text.clone(),
                reason: "embedding provider unavailable".to_string(),
            });
        }
        Ok(outcome)
    }

    pub async fn analyze_impact(
        &self,
        request: &ImpactRequest,
    ) -> Result<ImpactOutcome, EngineError> {
        let outcome = self.query.analyze(request).await?;
        self.emit(EventPayload::ImpactComputed {
            target: chronicle_core::types::NodeId::new(request.target.clone()),
            risk_level: outcome.risk_level,
            impacted_count: outcome.impacted.len(),
            truncated: outcome.truncated,
        });
        Ok(outcome)
    }

    pub async fn acquire_lock(
        &self,
        request: &AcquireLockRequest,
    ) -> Result<LockGrant, EngineError> {
        let grant = self
            .locks
            .acquire_lock(&request.target, &request.agent_id, &request.task_id)
            .await?;
        if grant.locked {
            self.emit(EventPayload::LockAcquired {
                target: grant.target.clone(),
                agent_id: request.agent_id.clone(),
                task_id: request.task_id.clone(),
            });
        }
        Ok(grant)
    }

    pub async fn release_lock(&self, task_id: &str) -> Result<ReleaseLockResponse, EngineError> {
        let released = self.locks.release_lock(task_id).await?;
        if released > 0 {
            self.emit(EventPayload::LockReleased {
                task_id: task_id.to_string(),
                released,
            });
        }
        Ok(ReleaseLockResponse { released })
    }

    pub async fn apply_constraint(
        &self,
        request: &ApplyConstraintRequest,
    ) -> Result<ApplyConstraintResponse, EngineError> {
        let applied = self
            .constraints
            .apply_constraint(&request.target, &request.spec)
            .await?;
        self.emit(EventPayload::ConstraintApplied {
            constraint_id: applied.constraint_id.to_string(),
            target: applied.target,
        });
        Ok(ApplyConstraintResponse {
            constraint_id: applied.constraint_id.to_string(),
            applied: true,
        })
    }

    pub async fn evaluate_constraints(
        &self,
        change: &ProposedChange,
    ) -> Result<EvaluateConstraintsResponse, EngineError> {
        let violations = self.constraints.evaluate_constraints(change).await?;
        Ok(EvaluateConstraintsResponse { violations })
    }

    /// Read-only staleness report: nodes with no live relationships,
    /// alongside the total data-node count for proportion.
    pub async fn orphans(&self, limit: usize) -> Result<OrphansResponse, EngineError> {
        let total_nodes = self.client.count_nodes().await?;
        let orphans = self.client.find_orphans(limit).await?;
        Ok(OrphansResponse {
            total_nodes,
            orphans,
        })
    }
}
