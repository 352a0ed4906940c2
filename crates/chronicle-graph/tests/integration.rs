//! Integration tests for chronicle-graph against a live Neo4j instance.
//!
//! These tests require a local Neo4j (e.g. `docker compose up`).
//! Run with: cargo test --package chronicle-graph --test integration -- --ignored
//!
//! Skipped automatically if Neo4j is not available.

use chrono::{TimeZone, Utc};

use chronicle_core::types::{
    AttrMap, AttrValue, EdgeCandidate, GraphNode, MergeOutcome, NodeId, NodeType, Provenance,
    RelType,
};
use chronicle_graph::{GraphClient, GraphConfig};

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

fn scoped_id(prefix: &str, name: &str) -> String {
    format!("{prefix}:{name}:{}", uuid::Uuid::new_v4())
}

async fn cleanup(client: &GraphClient, ids: &[&NodeId]) {
    for id in ids {
        let q = neo4rs::query("MATCH (n {id: $id}) DETACH DELETE n").param("id", id.0.clone());
        let _ = client.run(q).await;
        let anchors = neo4rs::query("MATCH (g:EdgeIdentity) WHERE g.key CONTAINS $id DELETE g")
            .param("id", id.0.clone());
        let _ = client.run(anchors).await;
    }
}

fn make_function(id: &str, name: &str) -> GraphNode {
    GraphNode::new(id, NodeType::Function)
        .with_attr("name", name)
        .with_attr("path", "src/auth.rs")
}

fn candidate(
    source: &NodeId,
    target: &NodeId,
    change_id: &str,
    weight: f64,
    valid_from: chrono::DateTime<Utc>,
) -> EdgeCandidate {
    let mut attributes = AttrMap::new();
    attributes.insert("weight".to_string(), AttrValue::from(weight));
    EdgeCandidate {
        source: source.clone(),
        target: target.clone(),
        rel_type: RelType::Calls,
        attributes,
        valid_from,
        provenance: Provenance::new("test-repo", change_id),
    }
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn merge_node_is_idempotent_and_extend_only() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let id = scoped_id("Function", "login");
    let node = make_function(&id, "login");

    assert_eq!(
        client.merge_node(&node).await.unwrap(),
        MergeOutcome::Created
    );
    assert_eq!(
        client.merge_node(&node).await.unwrap(),
        MergeOutcome::Unchanged
    );

    // A later merge adds an attribute; the original ones survive.
    let extended = node.clone().with_attr("line_start", 42.0);
    assert_eq!(
        client.merge_node(&extended).await.unwrap(),
        MergeOutcome::Updated
    );
    let stored = client.get_node(&extended.id).await.unwrap();
    assert!(stored.attributes.contains_key("name"));
    assert!(stored.attributes.contains_key("line_start"));

    cleanup(&client, &[&extended.id]).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn superseding_observation_closes_prior_interval() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let a = make_function(&scoped_id("Function", "a"), "a");
    let b = make_function(&scoped_id("Function", "b"), "b");
    client.merge_node(&a).await.unwrap();
    client.merge_node(&b).await.unwrap();

    let t1 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();

    let first = candidate(&a.id, &b.id, "commit-1", 1.0, t1);
    assert_eq!(
        client.upsert_edge(&first).await.unwrap(),
        MergeOutcome::Created
    );

    // Duplicate provenance: no new interval.
    assert_eq!(
        client.upsert_edge(&first).await.unwrap(),
        MergeOutcome::Unchanged
    );

    let second = candidate(&a.id, &b.id, "commit-2", 2.0, t2);
    assert_eq!(
        client.upsert_edge(&second).await.unwrap(),
        MergeOutcome::Updated
    );

    let history = client
        .edge_history(&a.id, RelType::Calls, &b.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].valid_to, Some(t2));
    assert!(history[1].is_active());

    // Exactly one open interval per identity.
    let open: Vec<_> = history.iter().filter(|s| s.is_active()).collect();
    assert_eq!(open.len(), 1);

    cleanup(&client, &[&a.id, &b.id]).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn as_of_projection_respects_interval_bounds() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let a = make_function(&scoped_id("Function", "caller"), "caller");
    let b = make_function(&scoped_id("Function", "callee"), "callee");
    client.merge_node(&a).await.unwrap();
    client.merge_node(&b).await.unwrap();

    let t1 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
    client
        .upsert_edge(&candidate(&a.id, &b.id, "c1", 1.0, t2))
        .await
        .unwrap();

    // Before the edge became valid: invisible.
    let before = client.neighbors(&a.id, Some(t1), 10).await.unwrap();
    assert!(before.is_empty());

    // At valid_from and after: visible.
    let after = client.neighbors(&a.id, Some(t2), 10).await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].node.id, b.id);

    cleanup(&client, &[&a.id, &b.id]).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn closed_interval_is_invisible_from_its_end() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let a = make_function(&scoped_id("Function", "caller"), "caller");
    let b = make_function(&scoped_id("Function", "callee"), "callee");
    client.merge_node(&a).await.unwrap();
    client.merge_node(&b).await.unwrap();

    let t1 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
    client
        .upsert_edge(&candidate(&a.id, &b.id, "c1", 1.0, t1))
        .await
        .unwrap();
    client
        .upsert_edge(&candidate(&a.id, &b.id, "c2", 2.0, t2))
        .await
        .unwrap();

    let active = client
        .active_edge(&a.id, RelType::Calls, &b.id)
        .await
        .unwrap()
        .expect("one open interval");
    assert_eq!(active.valid_from, t2);

    // Within [t1, t2): only the closed interval is live.
    let mid = Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap();
    let during = client.neighbors(&a.id, Some(mid), 10).await.unwrap();
    assert_eq!(during.len(), 1);
    assert_ne!(during[0].edge_id, active.edge_id);

    // At the closure instant the closed interval drops out; exactly the
    // succeeding open one matches, never both.
    let at_close = client.neighbors(&a.id, Some(t2), 10).await.unwrap();
    assert_eq!(at_close.len(), 1);
    assert_eq!(at_close[0].edge_id, active.edge_id);

    cleanup(&client, &[&a.id, &b.id]).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn concurrent_upserts_leave_one_open_interval() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let a = make_function(&scoped_id("Function", "a"), "a");
    let b = make_function(&scoped_id("Function", "b"), "b");
    client.merge_node(&a).await.unwrap();
    client.merge_node(&b).await.unwrap();

    let t1 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
    let t3 = Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap();
    client
        .upsert_edge(&candidate(&a.id, &b.id, "c1", 1.0, t1))
        .await
        .unwrap();

    // Racing writers serialize on the identity anchor: the second plans
    // against what the first committed. Depending on arrival order the
    // earlier-dated candidate may be refused, but the open-interval
    // invariant must hold either way.
    let c2 = candidate(&a.id, &b.id, "c2", 2.0, t2);
    let c3 = candidate(&a.id, &b.id, "c3", 3.0, t3);
    let (r2, r3) = tokio::join!(client.upsert_edge(&c2), client.upsert_edge(&c3),);
    let accepted = [&r2, &r3].iter().filter(|r| r.is_ok()).count();
    assert!(accepted >= 1);

    let history = client
        .edge_history(&a.id, RelType::Calls, &b.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 1 + accepted);
    let open = history.iter().filter(|s| s.is_active()).count();
    assert_eq!(open, 1);

    cleanup(&client, &[&a.id, &b.id]).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn concurrent_node_merges_lose_no_attributes() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let id = scoped_id("Function", "shared");
    client.merge_node(&make_function(&id, "shared")).await.unwrap();

    let left = make_function(&id, "shared").with_attr("line_start", 10.0);
    let right = make_function(&id, "shared").with_attr("complexity", 4.0);
    let (r1, r2) = tokio::join!(client.merge_node(&left), client.merge_node(&right));
    r1.unwrap();
    r2.unwrap();

    let stored = client.get_node(&left.id).await.unwrap();
    assert!(stored.attributes.contains_key("line_start"));
    assert!(stored.attributes.contains_key("complexity"));

    cleanup(&client, &[&left.id]).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn lock_claim_is_first_writer_wins() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let file = GraphNode::new(scoped_id("File", "x"), NodeType::File).with_attr("name", "x.rs");
    client.merge_node(&file).await.unwrap();

    let winner = client
        .create_lock_if_absent(&file.id, "agent-1", "task-1")
        .await
        .unwrap();
    assert_eq!(winner.holder_agent, "agent-1");

    // Second claim surfaces the surviving holder, not the requester.
    let loser = client
        .create_lock_if_absent(&file.id, "agent-2", "task-2")
        .await
        .unwrap();
    assert_eq!(loser.holder_agent, "agent-1");
    assert_eq!(loser.holder_task, "task-1");

    assert_eq!(client.delete_locks_for_task("task-1").await.unwrap(), 1);
    // Releasing an unheld lock is a no-op.
    assert_eq!(client.delete_locks_for_task("task-1").await.unwrap(), 0);

    cleanup(&client, &[&file.id]).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn concurrent_lock_claims_admit_exactly_one_holder() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let file = GraphNode::new(scoped_id("File", "hot"), NodeType::File).with_attr("name", "hot.rs");
    client.merge_node(&file).await.unwrap();

    let (r1, r2, r3, r4) = tokio::join!(
        client.create_lock_if_absent(&file.id, "agent-1", "task-1"),
        client.create_lock_if_absent(&file.id, "agent-2", "task-2"),
        client.create_lock_if_absent(&file.id, "agent-3", "task-3"),
        client.create_lock_if_absent(&file.id, "agent-4", "task-4"),
    );
    let records = [r1.unwrap(), r2.unwrap(), r3.unwrap(), r4.unwrap()];

    // Every claim sees the same surviving holder, and exactly one claimant
    // got its own task back.
    let holder = records[0].holder_task.clone();
    assert!(records.iter().all(|r| r.holder_task == holder));
    let requested = ["task-1", "task-2", "task-3", "task-4"];
    let winners = requested
        .iter()
        .zip(records.iter())
        .filter(|(task, record)| record.holder_task == **task)
        .count();
    assert_eq!(winners, 1);

    assert_eq!(client.delete_locks_for_task(&holder).await.unwrap(), 1);
    cleanup(&client, &[&file.id]).await;
}

#[tokio::test]
#[ignore = "requires live Neo4j"]
async fn capability_surface_answers_pattern_queries() {
    let Some(client) = connect_or_skip().await else {
        return;
    };
    let node = make_function(&scoped_id("Function", "seam"), "seam");
    client.merge_node(&node).await.unwrap();

    // Backend-agnostic callers hold the primitive store surface only.
    let store: &dyn chronicle_graph::GraphPrimitiveStore = &client;
    let rows = store
        .execute_pattern(
            neo4rs::query("MATCH (n {id: $id}) RETURN n.name AS name")
                .param("id", node.id.0.clone()),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<String>("name").unwrap(), "seam");

    cleanup(&client, &[&node.id]).await;
}
