//! Bitemporal version management for edge intervals.
//!
//! Edges are append-only interval records. A superseding observation closes
//! the open interval (`valid_to := new valid_from`) and inserts a new open
//! one; existing intervals are never rewritten except to be closed. At most
//! one open interval exists per `(source, rel_type, target)` identity, which
//! is what makes exact as-of reconstruction possible. Writers for the same
//! identity serialize on an `EdgeIdentity` anchor node, so the invariant
//! holds under concurrent ingestion too.

use chrono::Utc;
use neo4rs::query;
use uuid::Uuid;

use chronicle_core::types::{
    attr_hash, format_ts, parse_ts, AttrMap, EdgeCandidate, EdgeSnapshot, MergeOutcome, NodeId,
    Provenance, RelType,
};
use chronicle_core::EngineError;

use crate::client::{GraphClient, GraphError};

/// Namespace for deterministic edge-interval ids.
const EDGE_NS: Uuid = Uuid::from_bytes([
    0x2f, 0x1c, 0x5a, 0x9e, 0x41, 0x7b, 0x4d, 0x03, 0xb6, 0x22, 0x8d, 0x55, 0x19, 0xe0, 0x74, 0xaa,
]);

/// Stored interval metadata used for upsert planning.
#[derive(Debug, Clone)]
pub(crate) struct IntervalMeta {
    pub edge_id: String,
    pub valid_from: String,
    /// Empty string marks the open interval.
    pub valid_to: String,
    pub attr_hash: String,
    pub prov_key: String,
}

/// What an upsert should do, decided from current interval state.
#[derive(Debug, PartialEq)]
pub(crate) enum UpsertPlan {
    Unchanged,
    Reject { reason: String },
    Write {
        close_edge_id: Option<String>,
        outcome: MergeOutcome,
    },
}

/// Pure upsert planning over the identity's stored intervals.
///
/// Decision order: provenance dedup, unchanged-attribute dedup, bitemporal
/// ordering checks, then close-and-insert.
pub(crate) fn plan_upsert(
    candidate_hash: &str,
    prov_key: &str,
    valid_from: &str,
    intervals: &[IntervalMeta],
) -> UpsertPlan {
    // Re-submitting the identical observation never creates a new interval.
    if intervals.iter().any(|i| i.prov_key == prov_key) {
        return UpsertPlan::Unchanged;
    }

    let active = intervals.iter().find(|i| i.valid_to.is_empty());

    if let Some(open) = active {
        if open.attr_hash == candidate_hash {
            return UpsertPlan::Unchanged;
        }
        // Equality is refused too: closing at the open interval's own start
        // would store a zero-length interval (valid_to <= valid_from).
        if valid_from <= open.valid_from.as_str() {
            return UpsertPlan::Reject {
                reason: format!(
                    "valid_from {valid_from} does not follow the open interval's start {}",
                    open.valid_from
                ),
            };
        }
    }

    if let Some(closed_end) = intervals
        .iter()
        .filter(|i| !i.valid_to.is_empty())
        .map(|i| i.valid_to.as_str())
        .max()
    {
        if valid_from < closed_end {
            return UpsertPlan::Reject {
                reason: format!(
                    "valid_from {valid_from} precedes an already-closed interval's end {closed_end}"
                ),
            };
        }
    }

    UpsertPlan::Write {
        close_edge_id: active.map(|i| i.edge_id.clone()),
        outcome: if active.is_some() {
            MergeOutcome::Updated
        } else {
            MergeOutcome::Created
        },
    }
}

impl GraphClient {
    /// Idempotently upsert an edge observation into the interval history.
    ///
    /// Returns `Unchanged` for duplicate provenance or identical attributes,
    /// `Updated` when it closed the prior interval, `Created` for a first
    /// observation. A candidate that would rewrite history is an
    /// `EngineError::Consistency`; callers log and skip it without
    /// aborting their batch.
    ///
    /// The whole read-plan-write sequence runs in one transaction. Its first
    /// statement writes the identity's anchor node, taking the store's write
    /// lock, so concurrent upserts for the same identity serialize and each
    /// plans against the intervals its predecessor committed. Without the
    /// anchor, two racing writers could both observe no open interval and
    /// both create one.
    pub async fn upsert_edge(&self, candidate: &EdgeCandidate) -> Result<MergeOutcome, EngineError> {
        let hash = attr_hash(&candidate.attributes);
        let prov_key = candidate.provenance.key();
        let vf = format_ts(candidate.valid_from);

        let mut txn = self.start_txn().await?;

        let anchor = query(
            "MERGE (g:EdgeIdentity {key: $key})
             SET g.touched_at = $now",
        )
        .param("key", candidate.identity())
        .param("now", format_ts(Utc::now()));
        self.txn_run(&mut txn, anchor).await?;

        let intervals = self
            .intervals_in_txn(&mut txn, &candidate.source, candidate.rel_type, &candidate.target)
            .await?;

        if intervals.is_empty() {
            // First observation for this identity: both endpoints must exist.
            for endpoint in [&candidate.source, &candidate.target] {
                if !self.node_exists_in_txn(&mut txn, endpoint).await? {
                    txn.rollback().await.map_err(GraphError::from)?;
                    return Err(EngineError::not_found("node", endpoint.as_str()));
                }
            }
        }

        match plan_upsert(&hash, &prov_key, &vf, &intervals) {
            UpsertPlan::Unchanged => {
                txn.rollback().await.map_err(GraphError::from)?;
                Ok(MergeOutcome::Unchanged)
            }
            UpsertPlan::Reject { reason } => {
                txn.rollback().await.map_err(GraphError::from)?;
                Err(EngineError::Consistency {
                    identity: candidate.identity(),
                    reason,
                })
            }
            UpsertPlan::Write {
                close_edge_id,
                outcome,
            } => {
                self.write_interval(&mut txn, candidate, &hash, &vf, close_edge_id.as_deref())
                    .await?;
                txn.commit().await.map_err(GraphError::from)?;
                if outcome == MergeOutcome::Updated {
                    tracing::debug!(
                        identity = %candidate.identity(),
                        closed_at = %vf,
                        "Closed superseded edge interval"
                    );
                }
                Ok(outcome)
            }
        }
    }

    /// Close the superseded interval (if any) and insert the new open one
    /// inside the caller's transaction.
    async fn write_interval(
        &self,
        txn: &mut neo4rs::Txn,
        candidate: &EdgeCandidate,
        hash: &str,
        valid_from: &str,
        close_edge_id: Option<&str>,
    ) -> Result<(), GraphError> {
        let attrs_json = serde_json::to_string(&candidate.attributes)
            .map_err(|e| GraphError::Serialization(e.to_string()))?;
        let edge_id = Uuid::new_v5(
            &EDGE_NS,
            format!("{}|{}|{}", candidate.identity(), valid_from, candidate.provenance.key())
                .as_bytes(),
        )
        .to_string();
        let rel = candidate.rel_type.as_cypher();

        if let Some(open_id) = close_edge_id {
            let q = query(
                "MATCH ()-[r {id: $id}]->()
                 WHERE r.valid_to = ''
                 SET r.valid_to = $vf",
            )
            .param("id", open_id.to_string())
            .param("vf", valid_from.to_string());
            self.txn_run(txn, q).await?;
        }

        let cypher = format!(
            "MATCH (a {{id: $src}})
             MATCH (b {{id: $tgt}})
             CREATE (a)-[r:{rel} {{
               id: $edge_id, attrs: $attrs, attr_hash: $hash,
               valid_from: $vf, valid_to: '',
               ingested_at: $now,
               prov_origin: $prov_origin, prov_change: $prov_change,
               prov_key: $prov_key
             }}]->(b)",
        );
        let q = query(&cypher)
            .param("src", candidate.source.0.clone())
            .param("tgt", candidate.target.0.clone())
            .param("edge_id", edge_id)
            .param("attrs", attrs_json)
            .param("hash", hash.to_string())
            .param("vf", valid_from.to_string())
            .param("now", format_ts(Utc::now()))
            .param("prov_origin", candidate.provenance.origin.clone())
            .param("prov_change", candidate.provenance.change_id.clone())
            .param("prov_key", candidate.provenance.key());
        self.txn_run(txn, q).await?;

        Ok(())
    }

    /// All stored interval metadata for one edge identity, read under the
    /// caller's transaction so the plan built from it stays valid.
    async fn intervals_in_txn(
        &self,
        txn: &mut neo4rs::Txn,
        source: &NodeId,
        rel_type: RelType,
        target: &NodeId,
    ) -> Result<Vec<IntervalMeta>, GraphError> {
        let cypher = format!(
            "MATCH (a {{id: $src}})-[r:{}]->(b {{id: $tgt}})
             RETURN r.id AS edge_id, r.valid_from AS valid_from,
                    r.valid_to AS valid_to, r.attr_hash AS attr_hash,
                    r.prov_key AS prov_key
             ORDER BY valid_from",
            rel_type.as_cypher()
        );
        let q = query(&cypher)
            .param("src", source.0.clone())
            .param("tgt", target.0.clone());

        let rows = self.txn_query_rows(txn, q).await?;
        Ok(rows
            .into_iter()
            .map(|row| IntervalMeta {
                edge_id: row.get("edge_id").unwrap_or_default(),
                valid_from: row.get("valid_from").unwrap_or_default(),
                valid_to: row.get("valid_to").unwrap_or_default(),
                attr_hash: row.get("attr_hash").unwrap_or_default(),
                prov_key: row.get("prov_key").unwrap_or_default(),
            })
            .collect())
    }

    async fn node_exists_in_txn(
        &self,
        txn: &mut neo4rs::Txn,
        id: &NodeId,
    ) -> Result<bool, GraphError> {
        let q = query(
            "MATCH (n {id: $id})
             WHERE NOT n:Lock AND NOT n:Constraint
             RETURN n.id AS id LIMIT 1",
        )
        .param("id", id.0.clone());
        Ok(self.txn_query_one(txn, q).await?.is_some())
    }

    /// The full interval history for an edge identity, oldest first.
    pub async fn edge_history(
        &self,
        source: &NodeId,
        rel_type: RelType,
        target: &NodeId,
    ) -> Result<Vec<EdgeSnapshot>, GraphError> {
        let cypher = format!(
            "MATCH (a {{id: $src}})-[r:{}]->(b {{id: $tgt}})
             RETURN r ORDER BY r.valid_from",
            rel_type.as_cypher()
        );
        let q = query(&cypher)
            .param("src", source.0.clone())
            .param("tgt", target.0.clone());

        let rows = self.query_rows(q).await?;
        let mut snapshots = Vec::with_capacity(rows.len());
        for row in rows {
            let rel: neo4rs::Relation = row
                .get("r")
                .map_err(|e| GraphError::Serialization(format!("interval decode: {e}")))?;
            snapshots.push(decode_snapshot(&rel, source, rel_type, target)?);
        }
        Ok(snapshots)
    }

    /// The currently-open interval for an edge identity, if any.
    pub async fn active_edge(
        &self,
        source: &NodeId,
        rel_type: RelType,
        target: &NodeId,
    ) -> Result<Option<EdgeSnapshot>, GraphError> {
        let history = self.edge_history(source, rel_type, target).await?;
        Ok(history.into_iter().find(|s| s.is_active()))
    }
}

fn decode_snapshot(
    rel: &neo4rs::Relation,
    source: &NodeId,
    rel_type: RelType,
    target: &NodeId,
) -> Result<EdgeSnapshot, GraphError> {
    let attrs_raw: String = rel.get("attrs").unwrap_or_default();
    let attributes: AttrMap = if attrs_raw.is_empty() {
        AttrMap::new()
    } else {
        serde_json::from_str(&attrs_raw)
            .map_err(|e| GraphError::Serialization(format!("edge attrs decode: {e}")))?
    };

    let vf_raw: String = rel.get("valid_from").unwrap_or_default();
    let valid_from = parse_ts(&vf_raw)
        .ok_or_else(|| GraphError::Serialization(format!("bad valid_from {vf_raw:?}")))?;
    let vt_raw: String = rel.get("valid_to").unwrap_or_default();
    let valid_to = if vt_raw.is_empty() {
        None
    } else {
        Some(
            parse_ts(&vt_raw)
                .ok_or_else(|| GraphError::Serialization(format!("bad valid_to {vt_raw:?}")))?,
        )
    };
    let ingested_raw: String = rel.get("ingested_at").unwrap_or_default();
    let ingested_at = parse_ts(&ingested_raw).unwrap_or(valid_from);

    Ok(EdgeSnapshot {
        edge_id: rel.get("id").unwrap_or_default(),
        source: source.clone(),
        target: target.clone(),
        rel_type,
        attributes,
        valid_from,
        valid_to,
        ingested_at,
        provenance: Provenance::new(
            rel.get::<String>("prov_origin").unwrap_or_default(),
            rel.get::<String>("prov_change").unwrap_or_default(),
        ),
    })
}

impl From<GraphError> for EngineError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::NotFound { key } => EngineError::not_found("node", key),
            GraphError::Connection(msg) => EngineError::Unavailable(msg),
            other => EngineError::Store(other.to_string()),
        }
    }
}
