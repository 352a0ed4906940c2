//! Read operations and Cypher query builders for the knowledge graph.
//!
//! Every edge-touching query filters on the bitemporal interval columns:
//! an empty `valid_to` marks the open (active) interval, any other value a
//! closed one. Passing an as-of timestamp restricts the view to intervals
//! live at that instant.

use neo4rs::query;

use chronicle_core::types::{
    format_ts, AttrMap, Constraint, ConstraintId, ConstraintType, GraphNode, NodeId, NodeType,
    RelType,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::client::{GraphClient, GraphError};
use crate::mutations::sev_from_str;

/// A lightweight node record for subgraph payloads.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct NodeRow {
    pub id: String,
    pub node_type: NodeType,
    pub name: String,
}

/// A lightweight edge record for subgraph payloads.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct EdgeRow {
    pub source_id: String,
    pub target_id: String,
    pub rel_type: RelType,
}

/// A neighbor result: the adjacent node plus the connecting relationship.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub node: GraphNode,
    pub rel_type: RelType,
    pub edge_id: String,
    /// True when the relationship points from the queried node outward.
    pub outbound: bool,
}

/// Result of a neighborhood fetch.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SubgraphResult {
    pub nodes: Vec<NodeRow>,
    pub edges: Vec<EdgeRow>,
}

impl GraphClient {
    // ── Single Node Lookups ──────────────────────────────────────

    /// Get a data node by id, or `None` if absent. Lock and constraint
    /// records are invisible to this lookup.
    pub async fn try_get_node(&self, id: &NodeId) -> Result<Option<GraphNode>, GraphError> {
        let q = query(
            "MATCH (n {id: $id})
             WHERE NOT n:Lock AND NOT n:Constraint
             RETURN n LIMIT 1",
        )
        .param("id", id.0.clone());

        match self.query_one(q).await? {
            Some(row) => {
                let node: neo4rs::Node = row
                    .get("n")
                    .map_err(|e| GraphError::Serialization(format!("node decode: {e}")))?;
                Ok(Some(decode_graph_node(&node)?))
            }
            None => Ok(None),
        }
    }

    /// Get a data node by id, erroring if absent.
    pub async fn get_node(&self, id: &NodeId) -> Result<GraphNode, GraphError> {
        self.try_get_node(id).await?.ok_or(GraphError::NotFound {
            key: id.0.clone(),
        })
    }

    /// Resolve a target selector to a node: exact id first, then an exact
    /// `name` or `path` property match. Ties break on node id so resolution
    /// is deterministic.
    pub async fn resolve_selector(&self, selector: &str) -> Result<Option<GraphNode>, GraphError> {
        if let Some(node) = self.try_get_node(&NodeId::new(selector)).await? {
            return Ok(Some(node));
        }

        let q = query(
            "MATCH (n)
             WHERE NOT n:Lock AND NOT n:Constraint
               AND (n.name = $sel OR n.path = $sel)
             RETURN n ORDER BY n.id LIMIT 1",
        )
        .param("sel", selector.to_string());

        match self.query_one(q).await? {
            Some(row) => {
                let node: neo4rs::Node = row
                    .get("n")
                    .map_err(|e| GraphError::Serialization(format!("node decode: {e}")))?;
                Ok(Some(decode_graph_node(&node)?))
            }
            None => Ok(None),
        }
    }

    /// Count data nodes in the graph.
    pub async fn count_nodes(&self) -> Result<i64, GraphError> {
        let q = query(
            "MATCH (n) WHERE NOT n:Lock AND NOT n:Constraint AND NOT n:EdgeIdentity
             RETURN count(n) AS cnt",
        );
        match self.query_one(q).await? {
            Some(row) => Ok(row.get::<i64>("cnt").unwrap_or(0)),
            None => Ok(0),
        }
    }

    // ── Neighbor Queries ─────────────────────────────────────────

    /// One-hop neighbors of a node through live edge intervals.
    ///
    /// With `as_of = None` only currently-open intervals qualify; with a
    /// timestamp, intervals live at that instant qualify. This is the
    /// point-in-time projection the version manager guarantees.
    pub async fn neighbors(
        &self,
        id: &NodeId,
        as_of: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Neighbor>, GraphError> {
        let interval_filter = match as_of {
            Some(_) => "r.valid_from <= $t AND (r.valid_to = '' OR r.valid_to > $t)",
            None => "r.valid_to = ''",
        };
        let cypher = format!(
            "MATCH (a {{id: $id}})-[r]-(b)
             WHERE type(r) <> 'APPLIES_TO' AND NOT b:Lock AND NOT b:Constraint
               AND {interval_filter}
             RETURN b, type(r) AS rel_type, r.id AS edge_id,
                    startNode(r).id = $id AS outbound
             ORDER BY b.id
             LIMIT $limit"
        );

        let mut q = query(&cypher)
            .param("id", id.0.clone())
            .param("limit", limit as i64);
        if let Some(t) = as_of {
            q = q.param("t", format_ts(t));
        }

        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let neo_node: neo4rs::Node = row
                .get("b")
                .map_err(|e| GraphError::Serialization(format!("neighbor decode: {e}")))?;
            let rel_raw: String = row.get("rel_type").unwrap_or_default();
            let Some(rel_type) = RelType::parse(&rel_raw) else {
                continue;
            };
            results.push(Neighbor {
                node: decode_graph_node(&neo_node)?,
                rel_type,
                edge_id: row.get("edge_id").unwrap_or_default(),
                outbound: row.get("outbound").unwrap_or(false),
            });
        }
        Ok(results)
    }

    /// Fetch the neighborhood of a center node up to `max_depth` hops,
    /// following only whitelisted relationship types over open intervals.
    /// Includes the center node itself.
    pub async fn fetch_neighborhood(
        &self,
        center: &NodeId,
        whitelist: &[RelType],
        max_depth: usize,
        node_limit: u32,
    ) -> Result<SubgraphResult, GraphError> {
        let rel_pattern = whitelist
            .iter()
            .map(|r| r.as_cypher())
            .collect::<Vec<_>>()
            .join("|");

        // Variable-length bounds must be literals in Cypher.
        let cypher = format!(
            "MATCH p = (c {{id: $id}})-[:{rel_pattern}*1..{max_depth}]-(n)
             WHERE ALL(r IN relationships(p) WHERE r.valid_to = '')
               AND n.id <> $id
             WITH DISTINCT n
             RETURN n.id AS id, n.node_type AS node_type, n.name AS name
             ORDER BY id
             LIMIT $limit"
        );

        let q = query(&cypher)
            .param("id", center.0.clone())
            .param("limit", node_limit as i64);

        let rows = self.query_rows(q).await?;
        let mut nodes = Vec::with_capacity(rows.len() + 1);

        let center_node = self.get_node(center).await?;
        nodes.push(NodeRow {
            id: center_node.id.0.clone(),
            node_type: center_node.node_type,
            name: center_node
                .attributes
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        });

        for row in rows {
            let type_raw: String = row.get("node_type").unwrap_or_default();
            let Some(node_type) = NodeType::parse(&type_raw) else {
                continue;
            };
            nodes.push(NodeRow {
                id: row.get("id").unwrap_or_default(),
                node_type,
                name: row.get("name").unwrap_or_default(),
            });
        }

        // Induced edges: open whitelisted intervals between fetched nodes.
        let ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
        let edge_cypher = format!(
            "MATCH (a)-[r:{rel_pattern}]->(b)
             WHERE a.id IN $ids AND b.id IN $ids AND r.valid_to = ''
             RETURN a.id AS source_id, b.id AS target_id, type(r) AS rel_type
             ORDER BY source_id, target_id"
        );
        let q = query(&edge_cypher).param("ids", ids);
        let rows = self.query_rows(q).await?;

        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            let rel_raw: String = row.get("rel_type").unwrap_or_default();
            let Some(rel_type) = RelType::parse(&rel_raw) else {
                continue;
            };
            edges.push(EdgeRow {
                source_id: row.get("source_id").unwrap_or_default(),
                target_id: row.get("target_id").unwrap_or_default(),
                rel_type,
            });
        }

        Ok(SubgraphResult { nodes, edges })
    }

    // ── Retrieval Support ────────────────────────────────────────

    /// Case-insensitive substring match over node names and paths.
    /// The keyword fallback path when no embedding provider is reachable.
    pub async fn keyword_search(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<GraphNode>, GraphError> {
        let q = query(
            "MATCH (n)
             WHERE NOT n:Lock AND NOT n:Constraint
               AND (toLower(n.name) CONTAINS toLower($term)
                    OR toLower(n.path) CONTAINS toLower($term))
             RETURN n
             ORDER BY n.id
             LIMIT $limit",
        )
        .param("term", term.to_string())
        .param("limit", limit as i64);

        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let node: neo4rs::Node = row
                .get("n")
                .map_err(|e| GraphError::Serialization(format!("search decode: {e}")))?;
            results.push(decode_graph_node(&node)?);
        }
        Ok(results)
    }

    /// Fetch nodes carrying semantic vectors, with their vectors.
    pub async fn nodes_with_embeddings(
        &self,
        limit: usize,
    ) -> Result<Vec<(GraphNode, Vec<f32>)>, GraphError> {
        let q = query(
            "MATCH (n)
             WHERE n.embedding IS NOT NULL AND size(n.embedding) > 0
             RETURN n
             ORDER BY n.id
             LIMIT $limit",
        )
        .param("limit", limit as i64);

        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let neo_node: neo4rs::Node = row
                .get("n")
                .map_err(|e| GraphError::Serialization(format!("embedding decode: {e}")))?;
            let vector: Vec<f64> = neo_node.get("embedding").unwrap_or_default();
            let node = decode_graph_node(&neo_node)?;
            results.push((node, vector.into_iter().map(|v| v as f32).collect()));
        }
        Ok(results)
    }

    // ── Governance Support ───────────────────────────────────────

    /// Active constraints attached to a node via APPLIES_TO.
    pub async fn constraints_for(&self, id: &NodeId) -> Result<Vec<Constraint>, GraphError> {
        let q = query(
            "MATCH (c:Constraint {active: true})-[:APPLIES_TO]->(n {id: $id})
             RETURN c ORDER BY c.id",
        )
        .param("id", id.0.clone());

        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let c: neo4rs::Node = row
                .get("c")
                .map_err(|e| GraphError::Serialization(format!("constraint decode: {e}")))?;
            results.push(decode_constraint(&c)?);
        }
        Ok(results)
    }

    // ── Staleness / Orphan Report ────────────────────────────────

    /// Read-only orphan report: data nodes with no live edge in any
    /// direction. Detection never mutates the graph; absence from a later
    /// batch is not deletion.
    pub async fn find_orphans(&self, limit: usize) -> Result<Vec<NodeRow>, GraphError> {
        let q = query(
            "MATCH (n)
             WHERE NOT n:Lock AND NOT n:Constraint AND NOT n:EdgeIdentity
               AND NOT EXISTS {
                 MATCH (n)-[r]-()
                 WHERE type(r) <> 'APPLIES_TO' AND r.valid_to = ''
               }
             RETURN n.id AS id, n.node_type AS node_type, n.name AS name
             ORDER BY id
             LIMIT $limit",
        )
        .param("limit", limit as i64);

        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let type_raw: String = row.get("node_type").unwrap_or_default();
            let Some(node_type) = NodeType::parse(&type_raw) else {
                continue;
            };
            results.push(NodeRow {
                id: row.get("id").unwrap_or_default(),
                node_type,
                name: row.get("name").unwrap_or_default(),
            });
        }
        Ok(results)
    }
}

// ── Decode Helpers ───────────────────────────────────────────────

/// Convert a stored node back into a typed [`GraphNode`].
pub(crate) fn decode_graph_node(node: &neo4rs::Node) -> Result<GraphNode, GraphError> {
    let id: String = node.get("id").unwrap_or_default();
    let type_raw: String = node.get("node_type").unwrap_or_default();
    let node_type = NodeType::parse(&type_raw).ok_or_else(|| {
        GraphError::Serialization(format!("unknown node_type {type_raw:?} on node {id}"))
    })?;

    let labels: Vec<String> = node.get("labels").unwrap_or_default();
    let attrs_raw: String = node.get("attrs").unwrap_or_default();
    let attributes: AttrMap = if attrs_raw.is_empty() {
        AttrMap::new()
    } else {
        serde_json::from_str(&attrs_raw)
            .map_err(|e| GraphError::Serialization(format!("attrs decode on {id}: {e}")))?
    };

    Ok(GraphNode {
        id: NodeId::new(id),
        node_type,
        labels: labels.into_iter().collect(),
        attributes,
    })
}

pub(crate) fn decode_constraint(node: &neo4rs::Node) -> Result<Constraint, GraphError> {
    let id_raw: String = node.get("id").unwrap_or_default();
    let id = Uuid::parse_str(&id_raw)
        .map_err(|e| GraphError::Serialization(format!("constraint id {id_raw:?}: {e}")))?;

    let ctype_raw: String = node.get("constraint_type").unwrap_or_default();
    let constraint_type = ConstraintType::parse(&ctype_raw).ok_or_else(|| {
        GraphError::Serialization(format!("unknown constraint_type {ctype_raw:?}"))
    })?;

    let params_raw: String = node.get("params").unwrap_or_default();
    let params: AttrMap = if params_raw.is_empty() {
        AttrMap::new()
    } else {
        serde_json::from_str(&params_raw)
            .map_err(|e| GraphError::Serialization(format!("constraint params: {e}")))?
    };

    let sev_raw: String = node.get("severity").unwrap_or_default();

    Ok(Constraint {
        id: ConstraintId(id),
        constraint_type,
        params,
        severity: sev_from_str(&sev_raw),
        owner: node.get("owner").unwrap_or_default(),
        active: node.get("active").unwrap_or(false),
    })
}
