//! End-to-end tests for the service facade against a live Neo4j instance.
//!
//! Run with: cargo test --package chronicle-service --test integration -- --ignored
//!
//! Skipped automatically if Neo4j is not available.

use std::sync::Arc;

use chrono::TimeZone;

use chronicle_core::config::EngineConfig;
use chronicle_core::events::EventPayload;
use chronicle_core::types::{
    AttrMap, AttrValue, ConstraintType, GraphNode, NodeId, NodeType, Provenance, RelType, RiskLevel,
    Severity,
};
use chronicle_graph::{GraphClient, GraphConfig};
use chronicle_govern::ConstraintSpec;
use chronicle_ingest::EdgeSpec;
use chronicle_query::{FailingEmbedder, ImpactRequest, SearchRequest};
use chronicle_service::{ApplyConstraintRequest, ChronicleService, IngestBatchRequest};

async fn connect_or_skip() -> Option<GraphClient> {
    let config = GraphConfig::default();
    match GraphClient::connect(&config).await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test (Neo4j not available): {e}");
            None
        }
    }
}

fn run_scope() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn function(scope: &str, name: &str) -> GraphNode {
    GraphNode::new(format!("Function:{scope}:{name}"), NodeType::Function)
        .with_attr("name", format!("{name}-{scope}"))
}

fn calls(scope: &str, source: &str, target: &str) -> EdgeSpec {
    EdgeSpec {
        source: NodeId::new(format!("Function:{scope}:{source}")),
        target: NodeId::new(format!("Function:{scope}:{target}")),
        rel_type: RelType::Calls,
        attributes: AttrMap::new(),
        valid_from: None,
    }
}

async fn cleanup_scope(client: &GraphClient, scope: &str) {
    let q = neo4rs::query(
        "MATCH (n) WHERE n.id CONTAINS $scope
         OPTIONAL MATCH (c:Constraint)-[:APPLIES_TO]->(n)
         DETACH DELETE n, c",
    )
    .param("scope", scope.to_string());
    let _ = client.run(q).await;
    let anchors = neo4rs::query("MATCH (g:EdgeIdentity) WHERE g.key CONTAINS $scope DELETE g")
        .param("scope", scope.to_string());
    let _ = client.run(anchors).await;
}

/// Scenario: `login` has 5 direct callers and 3 more at depth 2; one
/// depth-2 node carries an active immutable-logic constraint. Analysis at
/// depth 2 must come back high risk.
#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn impact_analysis_flags_immutable_logic_as_high_risk() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let scope = run_scope();
    let service = ChronicleService::new(client.clone(), EngineConfig::default());

    let mut nodes = vec![function(&scope, "login")];
    let mut edges = Vec::new();
    for i in 0..5 {
        let caller = format!("caller{i}");
        nodes.push(function(&scope, &caller));
        edges.push(calls(&scope, &caller, "login"));
    }
    for i in 0..3 {
        let outer = format!("outer{i}");
        nodes.push(function(&scope, &outer));
        edges.push(calls(&scope, &outer, "caller0"));
    }

    let response = service
        .ingest_batch(&IngestBatchRequest {
            nodes,
            edges,
            provenance: Provenance::new("test-repo", &scope),
        })
        .await
        .unwrap();
    assert_eq!(response.skipped, 0);

    service
        .apply_constraint(&ApplyConstraintRequest {
            target: format!("Function:{scope}:outer2"),
            spec: ConstraintSpec {
                constraint_type: ConstraintType::ImmutableLogic,
                params: AttrMap::new(),
                severity: Severity::Error,
                owner: "platform-team".to_string(),
            },
        })
        .await
        .unwrap();

    let outcome = service
        .analyze_impact(&ImpactRequest {
            target: format!("Function:{scope}:login"),
            max_depth: Some(2),
            deadline_ms: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome.impacted.len(), 8);
    assert_eq!(outcome.risk_level, RiskLevel::High);
    assert!(outcome
        .impacted
        .iter()
        .all(|n| (1..=2).contains(&n.hop_distance)));

    cleanup_scope(&client, &scope).await;
}

/// Scenario: the embedding provider is down. Search must degrade to
/// keyword results rather than erroring.
#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn search_degrades_to_keyword_fallback_when_embedding_fails() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let scope = run_scope();
    let service = ChronicleService::with_embedder(
        client.clone(),
        EngineConfig::default(),
        Arc::new(FailingEmbedder),
    );

    service
        .ingest_batch(&IngestBatchRequest {
            nodes: vec![
                function(&scope, "validate_token"),
                function(&scope, "refresh_token"),
            ],
            edges: vec![calls(&scope, "refresh_token", "validate_token")],
            provenance: Provenance::new("test-repo", &scope),
        })
        .await
        .unwrap();

    let outcome = service
        .search(&SearchRequest {
            query_text: format!("token-{scope}"),
            top_k: Some(5),
            as_of: None,
            deadline_ms: None,
        })
        .await
        .unwrap();

    assert!(outcome.degraded);
    assert!(!outcome.results.is_empty());
    // Deterministic ordering on repeated calls.
    let again = service
        .search(&SearchRequest {
            query_text: format!("token-{scope}"),
            top_k: Some(5),
            as_of: None,
            deadline_ms: None,
        })
        .await
        .unwrap();
    let ids: Vec<_> = outcome.results.iter().map(|h| h.node_id.clone()).collect();
    let ids_again: Vec<_> = again.results.iter().map(|h| h.node_id.clone()).collect();
    assert_eq!(ids, ids_again);

    cleanup_scope(&client, &scope).await;
}

/// Re-submitting an identical batch must leave everything unchanged.
#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn identical_batch_resubmission_is_unchanged() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let scope = run_scope();
    let service = ChronicleService::new(client.clone(), EngineConfig::default());

    let request = IngestBatchRequest {
        nodes: vec![function(&scope, "a"), function(&scope, "b")],
        edges: vec![calls(&scope, "a", "b")],
        provenance: Provenance::new("test-repo", &scope),
    };

    let first = service.ingest_batch(&request).await.unwrap();
    assert_eq!(first.created, 3);

    let second = service.ingest_batch(&request).await.unwrap();
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.unchanged, 3);

    cleanup_scope(&client, &scope).await;
}

/// Scenario: a superseding observation closes an interval and a
/// history-rewriting one is refused. Observers on the event channel must
/// see both outcomes.
#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn superseding_and_refused_edges_reach_the_event_channel() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let scope = run_scope();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let service = ChronicleService::new(client.clone(), EngineConfig::default()).with_events(tx);

    let t1 = chrono::Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let t2 = chrono::Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
    let t0 = chrono::Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

    let weighted = |weight: f64, valid_from| {
        let mut edge = calls(&scope, "a", "b");
        edge.attributes
            .insert("weight".to_string(), AttrValue::from(weight));
        edge.valid_from = Some(valid_from);
        edge
    };
    let batch = |edge, change: &str| IngestBatchRequest {
        nodes: vec![function(&scope, "a"), function(&scope, "b")],
        edges: vec![edge],
        provenance: Provenance::new("test-repo", format!("{scope}-{change}")),
    };

    service.ingest_batch(&batch(weighted(1.0, t1), "c1")).await.unwrap();

    let superseding = service.ingest_batch(&batch(weighted(2.0, t2), "c2")).await.unwrap();
    assert_eq!(superseding.updated, 1);

    let rewriting = service.ingest_batch(&batch(weighted(3.0, t0), "c3")).await.unwrap();
    assert_eq!(rewriting.skipped, 1);

    let mut saw_closed = false;
    let mut saw_violation = false;
    while let Ok(event) = rx.try_recv() {
        match event.payload {
            EventPayload::EdgeIntervalClosed { closed_at, .. } => {
                assert_eq!(closed_at, t2);
                saw_closed = true;
            }
            EventPayload::ConsistencyViolation { identity, .. } => {
                assert!(identity.contains(&scope));
                saw_violation = true;
            }
            _ => {}
        }
    }
    assert!(saw_closed);
    assert!(saw_violation);

    cleanup_scope(&client, &scope).await;
}

/// The orphan report lists unconnected nodes alongside the total count.
#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn orphan_report_lists_unconnected_nodes() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let scope = run_scope();
    let service = ChronicleService::new(client.clone(), EngineConfig::default());

    service
        .ingest_batch(&IngestBatchRequest {
            nodes: vec![
                function(&scope, "a"),
                function(&scope, "b"),
                function(&scope, "island"),
            ],
            edges: vec![calls(&scope, "a", "b")],
            provenance: Provenance::new("test-repo", &scope),
        })
        .await
        .unwrap();

    let report = service.orphans(10_000).await.unwrap();
    assert!(report.total_nodes >= 3);
    let island = format!("Function:{scope}:island");
    assert!(report.orphans.iter().any(|row| row.id == island));
    assert!(!report
        .orphans
        .iter()
        .any(|row| row.id == format!("Function:{scope}:a")));

    cleanup_scope(&client, &scope).await;
}
