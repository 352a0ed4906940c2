//! Write operations for the knowledge graph.
//!
//! Node merges use MERGE (upsert) semantics keyed on the stable node id so
//! re-ingestion is idempotent. Node attributes extend and never shrink;
//! nodes are never hard-deleted. Lock claims are a single MERGE so that
//! exclusivity rests on the store's conditional-write atomicity rather than
//! an application-level check-then-act.

use chrono::Utc;
use neo4rs::query;

use chronicle_core::types::{format_ts, parse_ts, Constraint, GraphNode, LockRecord, MergeOutcome, NodeId};

use crate::client::{GraphClient, GraphError};

impl GraphClient {
    // ── Node Merges ──────────────────────────────────────────────

    /// Idempotently merge a node into the graph.
    ///
    /// Existing attributes are extended (new keys added, changed keys
    /// overwritten), never removed. Labels accumulate. Returns whether the
    /// node was created, updated, or left untouched.
    ///
    /// Writes happen in a transaction that first takes the node's write
    /// lock, then re-reads and re-merges under it, so two batches extending
    /// the same node concurrently cannot overwrite each other's keys. A
    /// merge that would change nothing never opens a transaction.
    pub async fn merge_node(&self, node: &GraphNode) -> Result<MergeOutcome, GraphError> {
        if let Some(current) = self.try_get_node(&node.id).await? {
            if merge_into(&current, node) == current {
                return Ok(MergeOutcome::Unchanged);
            }
        }

        let mut txn = self.start_txn().await?;

        let guard = query(
            "MATCH (n {id: $id})
             SET n._guard = true
             REMOVE n._guard",
        )
        .param("id", node.id.0.clone());
        self.txn_run(&mut txn, guard).await?;

        let current = self.node_in_txn(&mut txn, &node.id).await?;
        let (to_write, outcome) = match current {
            None => (node.clone(), MergeOutcome::Created),
            Some(current) => {
                let merged = merge_into(&current, node);
                if merged == current {
                    txn.rollback().await?;
                    return Ok(MergeOutcome::Unchanged);
                }
                (merged, MergeOutcome::Updated)
            }
        };

        let q = write_node_query(&to_write)?;
        self.txn_run(&mut txn, q).await?;
        txn.commit().await?;
        Ok(outcome)
    }

    /// Create a minimal placeholder node for an edge endpoint that has not
    /// been ingested yet. A single MERGE with ON CREATE SET makes this an
    /// atomic create-if-absent that never touches an existing node; a later
    /// full merge extends the placeholder in place.
    pub async fn ensure_node(&self, node: &GraphNode) -> Result<(), GraphError> {
        let label = node.node_type.label();
        let attrs_json = serde_json::to_string(&node.attributes)
            .map_err(|e| GraphError::Serialization(e.to_string()))?;

        let cypher = format!(
            "MERGE (n {{id: $id}})
             ON CREATE SET n:{label}, n.first_ingested = $now,
                           n.node_type = $node_type, n.labels = $labels,
                           n.attrs = $attrs, n.name = $name, n.path = $path,
                           n.updated_at = $now"
        );
        let q = query(&cypher)
            .param("id", node.id.0.clone())
            .param("node_type", label.to_string())
            .param("labels", node.labels.iter().cloned().collect::<Vec<_>>())
            .param("attrs", attrs_json)
            .param("name", attr_str(node, "name"))
            .param("path", attr_str(node, "path"))
            .param("now", format_ts(Utc::now()));

        self.run(q).await
    }

    async fn node_in_txn(
        &self,
        txn: &mut neo4rs::Txn,
        id: &NodeId,
    ) -> Result<Option<GraphNode>, GraphError> {
        let q = query(
            "MATCH (n {id: $id})
             WHERE NOT n:Lock AND NOT n:Constraint
             RETURN n LIMIT 1",
        )
        .param("id", id.0.clone());

        match self.txn_query_one(txn, q).await? {
            Some(row) => {
                let node: neo4rs::Node = row
                    .get("n")
                    .map_err(|e| GraphError::Serialization(format!("node decode: {e}")))?;
                Ok(Some(crate::queries::decode_graph_node(&node)?))
            }
            None => Ok(None),
        }
    }

    // ── Lock Records ─────────────────────────────────────────────

    /// Claim an exclusive lock on a target node with a single atomic
    /// create-if-absent. Returns the surviving lock record: if the holder
    /// fields differ from the requested ones, the claim lost to an
    /// existing lock.
    pub async fn create_lock_if_absent(
        &self,
        target: &NodeId,
        agent_id: &str,
        task_id: &str,
    ) -> Result<LockRecord, GraphError> {
        let q = query(
            "MERGE (l:Lock {target_id: $target})
             ON CREATE SET l.holder_agent = $agent, l.holder_task = $task,
                           l.acquired_at = $now
             RETURN l.holder_agent AS holder_agent, l.holder_task AS holder_task,
                    l.acquired_at AS acquired_at",
        )
        .param("target", target.0.clone())
        .param("agent", agent_id.to_string())
        .param("task", task_id.to_string())
        .param("now", format_ts(Utc::now()));

        let row = self.query_one(q).await?.ok_or_else(|| {
            GraphError::Serialization("lock MERGE returned no row".to_string())
        })?;

        let acquired_raw: String = row.get("acquired_at").unwrap_or_default();
        Ok(LockRecord {
            target_node: target.clone(),
            holder_agent: row.get("holder_agent").unwrap_or_default(),
            holder_task: row.get("holder_task").unwrap_or_default(),
            acquired_at: parse_ts(&acquired_raw).unwrap_or_else(Utc::now),
        })
    }

    /// Delete all locks held by a task. Returns the number released;
    /// zero is a normal outcome, not an error.
    pub async fn delete_locks_for_task(&self, task_id: &str) -> Result<i64, GraphError> {
        let q = query(
            "MATCH (l:Lock {holder_task: $task})
             DELETE l
             RETURN count(l) AS cnt",
        )
        .param("task", task_id.to_string());

        match self.query_one(q).await? {
            Some(row) => Ok(row.get::<i64>("cnt").unwrap_or(0)),
            None => Ok(0),
        }
    }

    // ── Constraint Records ───────────────────────────────────────

    /// Persist a constraint and attach it to its target nodes via
    /// APPLIES_TO edges, in one transaction.
    pub async fn create_constraint(
        &self,
        constraint: &Constraint,
        targets: &[NodeId],
    ) -> Result<(), GraphError> {
        let params_json = serde_json::to_string(&constraint.params)
            .map_err(|e| GraphError::Serialization(e.to_string()))?;

        let mut txn = self.start_txn().await?;

        let q = query(
            "MERGE (c:Constraint {id: $id})
             SET c.constraint_type = $ctype, c.params = $params,
                 c.severity = $severity, c.owner = $owner, c.active = $active,
                 c.created_at = $now",
        )
        .param("id", constraint.id.to_string())
        .param("ctype", constraint.constraint_type.as_str().to_string())
        .param("params", params_json)
        .param("severity", sev_to_str(constraint.severity).to_string())
        .param("owner", constraint.owner.clone())
        .param("active", constraint.active)
        .param("now", format_ts(Utc::now()));
        txn.run(q).await?;

        for target in targets {
            let q = query(
                "MATCH (c:Constraint {id: $cid})
                 MATCH (n {id: $target})
                 MERGE (c)-[:APPLIES_TO]->(n)",
            )
            .param("cid", constraint.id.to_string())
            .param("target", target.0.clone());
            txn.run(q).await?;
        }

        txn.commit().await?;
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Merge an incoming node over the stored one: attributes extend with
/// new-key-wins, labels accumulate, the incoming node type is kept.
fn merge_into(current: &GraphNode, incoming: &GraphNode) -> GraphNode {
    let mut merged = incoming.clone();
    merged.attributes = current.attributes.clone();
    for (k, v) in &incoming.attributes {
        merged.attributes.insert(k.clone(), v.clone());
    }
    merged.labels = current.labels.union(&incoming.labels).cloned().collect();
    merged
}

/// Build the MERGE statement writing a node's full property set. The match
/// is label-less so a type upgrade (placeholder to full node) updates the
/// existing node instead of creating a second one under the new label.
fn write_node_query(node: &GraphNode) -> Result<neo4rs::Query, GraphError> {
    let label = node.node_type.label();
    let attrs_json = serde_json::to_string(&node.attributes)
        .map_err(|e| GraphError::Serialization(e.to_string()))?;

    let embedding_clause = if node.embedding().is_some() {
        ", n.embedding = $embedding"
    } else {
        ""
    };

    let cypher = format!(
        "MERGE (n {{id: $id}})
         ON CREATE SET n.first_ingested = $now
         SET n:{label}, n.node_type = $node_type, n.labels = $labels,
             n.attrs = $attrs, n.name = $name, n.path = $path,
             n.updated_at = $now{embedding_clause}"
    );

    let mut q = query(&cypher)
        .param("id", node.id.0.clone())
        .param("node_type", label.to_string())
        .param("labels", node.labels.iter().cloned().collect::<Vec<_>>())
        .param("attrs", attrs_json)
        .param("name", attr_str(node, "name"))
        .param("path", attr_str(node, "path"))
        .param("now", format_ts(Utc::now()));

    if let Some(vector) = node.embedding() {
        let as_f64: Vec<f64> = vector.into_iter().map(f64::from).collect();
        q = q.param("embedding", as_f64);
    }

    Ok(q)
}

fn attr_str(node: &GraphNode, key: &str) -> String {
    node.attributes
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn sev_to_str(sev: chronicle_core::types::Severity) -> &'static str {
    match sev {
        chronicle_core::types::Severity::Error => "error",
        chronicle_core::types::Severity::Warning => "warning",
        chronicle_core::types::Severity::Info => "info",
    }
}

pub(crate) fn sev_from_str(raw: &str) -> chronicle_core::types::Severity {
    match raw {
        "error" => chronicle_core::types::Severity::Error,
        "warning" => chronicle_core::types::Severity::Warning,
        _ => chronicle_core::types::Severity::Info,
    }
}
