//! Core domain types for the Chronicle knowledge graph.
//!
//! These types represent versioned nodes and bitemporal edge intervals,
//! shared across all Chronicle components.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Identifiers ───────────────────────────────────────────────────

/// Opaque stable key for a node, supplied by the extraction pipeline
/// (e.g. `"Function:src/auth.rs:login"`). Never derived from content here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a constraint record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConstraintId(pub Uuid);

impl ConstraintId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConstraintId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Timestamps ────────────────────────────────────────────────────

/// Format a timestamp as RFC 3339 UTC with fixed microsecond precision.
///
/// Fixed width means lexicographic comparison of stored strings equals
/// chronological comparison, which the as-of Cypher filters rely on.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp previously produced by [`format_ts`].
pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ── Attribute Values ──────────────────────────────────────────────

/// A typed attribute value attached to a node or edge.
///
/// Validated at the ingestion boundary; `BTreeMap` keys keep serialization
/// and hashing deterministic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Num(f64),
    Str(String),
    List(Vec<AttrValue>),
    Map(BTreeMap<String, AttrValue>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            AttrValue::Num(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Num(n)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

/// An attribute map as carried by nodes and edge intervals.
pub type AttrMap = BTreeMap<String, AttrValue>;

/// BLAKE3 content hash of an attribute map in canonical (key-sorted) JSON.
///
/// Identical maps always hash identically regardless of insertion order,
/// which is what unchanged-detection during edge upserts keys on.
pub fn attr_hash(attrs: &AttrMap) -> String {
    let canonical = serde_json::to_vec(attrs).unwrap_or_default();
    blake3::hash(&canonical).to_hex().to_string()
}

// ── Node Types ────────────────────────────────────────────────────

/// Closed set of node type tags in the knowledge graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeType {
    File,
    Function,
    Class,
    Module,
    Package,
    Application,
}

impl NodeType {
    /// The graph label for this node type.
    pub fn label(&self) -> &'static str {
        match self {
            NodeType::File => "File",
            NodeType::Function => "Function",
            NodeType::Class => "Class",
            NodeType::Module => "Module",
            NodeType::Package => "Package",
            NodeType::Application => "Application",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "File" => Some(NodeType::File),
            "Function" => Some(NodeType::Function),
            "Class" => Some(NodeType::Class),
            "Module" => Some(NodeType::Module),
            "Package" => Some(NodeType::Package),
            "Application" => Some(NodeType::Application),
            _ => None,
        }
    }

    /// Whether impact traversal entering a node of this type counts as a
    /// module/application boundary crossing.
    pub fn is_boundary(&self) -> bool {
        matches!(self, NodeType::Module | NodeType::Application)
    }
}

/// A versioned node in the knowledge graph.
///
/// Attributes extend, never shrink, across merges; nodes are never
/// hard-deleted. The optional `embedding` attribute (list of numbers)
/// carries the semantic vector produced by the upstream pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    pub id: NodeId,
    pub node_type: NodeType,
    pub labels: BTreeSet<String>,
    pub attributes: AttrMap,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: NodeId::new(id),
            node_type,
            labels: BTreeSet::new(),
            attributes: AttrMap::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Extract the node's semantic vector, if one is attached.
    pub fn embedding(&self) -> Option<Vec<f32>> {
        match self.attributes.get("embedding")? {
            AttrValue::List(vals) => {
                let mut out = Vec::with_capacity(vals.len());
                for v in vals {
                    out.push(v.as_num()? as f32);
                }
                Some(out)
            }
            _ => None,
        }
    }
}

// ── Edge Types ────────────────────────────────────────────────────

/// Closed set of relationship types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelType {
    Calls,
    DependsOn,
    Contains,
    DefinedIn,
    Imports,
    /// Internal: attaches a constraint to its target node.
    AppliesTo,
}

impl RelType {
    /// The Cypher relationship type string.
    pub fn as_cypher(&self) -> &'static str {
        match self {
            RelType::Calls => "CALLS",
            RelType::DependsOn => "DEPENDS_ON",
            RelType::Contains => "CONTAINS",
            RelType::DefinedIn => "DEFINED_IN",
            RelType::Imports => "IMPORTS",
            RelType::AppliesTo => "APPLIES_TO",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "CALLS" => Some(RelType::Calls),
            "DEPENDS_ON" => Some(RelType::DependsOn),
            "CONTAINS" => Some(RelType::Contains),
            "DEFINED_IN" => Some(RelType::DefinedIn),
            "IMPORTS" => Some(RelType::Imports),
            "APPLIES_TO" => Some(RelType::AppliesTo),
            _ => None,
        }
    }
}

/// The source observation that produced an edge interval, used for
/// idempotent deduplication of re-submitted batches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Provenance {
    /// Where the observation came from (e.g. repository or pipeline name).
    pub origin: String,
    /// The commit hash or extraction-run id of the observation.
    pub change_id: String,
}

impl Provenance {
    pub fn new(origin: impl Into<String>, change_id: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            change_id: change_id.into(),
        }
    }

    /// Stable dedup key for this observation.
    pub fn key(&self) -> String {
        format!("{}@{}", self.origin, self.change_id)
    }
}

/// An edge observation submitted for bitemporal upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeCandidate {
    pub source: NodeId,
    pub target: NodeId,
    pub rel_type: RelType,
    pub attributes: AttrMap,
    /// When the relationship became true in the world (valid time).
    pub valid_from: DateTime<Utc>,
    pub provenance: Provenance,
}

impl EdgeCandidate {
    /// The edge identity: at most one open interval may exist per identity.
    pub fn identity(&self) -> String {
        format!(
            "{}|{}|{}",
            self.source.0,
            self.rel_type.as_cypher(),
            self.target.0
        )
    }
}

/// One stored edge interval, as read back from the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub edge_id: String,
    pub source: NodeId,
    pub target: NodeId,
    pub rel_type: RelType,
    pub attributes: AttrMap,
    pub valid_from: DateTime<Utc>,
    /// `None` means the interval is currently open (active).
    pub valid_to: Option<DateTime<Utc>>,
    /// When the system learned of the relationship (ingestion time).
    pub ingested_at: DateTime<Utc>,
    pub provenance: Provenance,
}

impl EdgeSnapshot {
    pub fn is_active(&self) -> bool {
        self.valid_to.is_none()
    }
}

/// The outcome of an idempotent merge.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MergeOutcome {
    Created,
    Updated,
    Unchanged,
}

// ── Locks ─────────────────────────────────────────────────────────

/// An exclusive claim on a graph node. Exactly one active lock may exist
/// per target at any time; there is no implicit expiry in the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    pub target_node: NodeId,
    pub holder_agent: String,
    pub holder_task: String,
    pub acquired_at: DateTime<Utc>,
}

// ── Constraints ───────────────────────────────────────────────────

/// Closed enumeration of declarative constraint types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConstraintType {
    ImmutableLogic,
    VersionPinning,
    LicenseRestriction,
    AccessControl,
}

impl ConstraintType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintType::ImmutableLogic => "IMMUTABLE_LOGIC",
            ConstraintType::VersionPinning => "VERSION_PINNING",
            ConstraintType::LicenseRestriction => "LICENSE_RESTRICTION",
            ConstraintType::AccessControl => "ACCESS_CONTROL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "IMMUTABLE_LOGIC" => Some(ConstraintType::ImmutableLogic),
            "VERSION_PINNING" => Some(ConstraintType::VersionPinning),
            "LICENSE_RESTRICTION" => Some(ConstraintType::LicenseRestriction),
            "ACCESS_CONTROL" => Some(ConstraintType::AccessControl),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A declarative rule restricting allowed changes to a graph target.
///
/// Constraints are read-only inputs to the coordinator; no other component
/// mutates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    pub id: ConstraintId,
    pub constraint_type: ConstraintType,
    pub params: AttrMap,
    pub severity: Severity,
    pub owner: String,
    pub active: bool,
}

// ── Proposed Changes ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
}

/// One touched node within a proposed change. `new_values` carries the
/// proposed attribute values where the proposer knows them; value-dependent
/// constraints cannot be checked without them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeItem {
    pub node: NodeId,
    pub change_type: ChangeType,
    #[serde(default)]
    pub touched_attributes: BTreeSet<String>,
    #[serde(default)]
    pub new_values: AttrMap,
}

/// A change an agent proposes to make, evaluated against constraints
/// before the caller decides whether to proceed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedChange {
    pub agent_id: String,
    pub task_id: String,
    pub items: Vec<ChangeItem>,
}

/// A structured constraint violation. Returned as data, never raised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub constraint_id: String,
    pub constraint_type: ConstraintType,
    pub severity: Severity,
    pub node: NodeId,
    pub reason: String,
}

// ── Risk ──────────────────────────────────────────────────────────

/// Deterministic risk classification for a proposed change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn node_serialization_roundtrip() {
        let node = GraphNode::new("Function:src/auth.rs:login", NodeType::Function)
            .with_attr("name", "login")
            .with_attr("line_start", 42.0)
            .with_attr("is_async", true);

        let json = serde_json::to_string(&node).unwrap();
        let back: GraphNode = serde_json::from_str(&json).unwrap();
        assert_eq!(node, back);
    }

    #[test]
    fn rel_type_serializes_screaming_snake() {
        let json = serde_json::to_string(&RelType::DependsOn).unwrap();
        assert_eq!(json, "\"DEPENDS_ON\"");
        assert_eq!(RelType::parse("DEPENDS_ON"), Some(RelType::DependsOn));
    }

    #[test]
    fn attr_hash_is_order_independent() {
        let mut a = AttrMap::new();
        a.insert("alpha".to_string(), AttrValue::from("x"));
        a.insert("beta".to_string(), AttrValue::from(2.0));

        let mut b = AttrMap::new();
        b.insert("beta".to_string(), AttrValue::from(2.0));
        b.insert("alpha".to_string(), AttrValue::from("x"));

        assert_eq!(attr_hash(&a), attr_hash(&b));
    }

    #[test]
    fn attr_hash_detects_change() {
        let mut a = AttrMap::new();
        a.insert("weight".to_string(), AttrValue::from(1.0));
        let mut b = a.clone();
        b.insert("weight".to_string(), AttrValue::from(2.0));
        assert_ne!(attr_hash(&a), attr_hash(&b));
    }

    #[test]
    fn format_ts_orders_lexicographically() {
        let t1 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 1).unwrap();
        assert!(format_ts(t1) < format_ts(t2));
        assert_eq!(parse_ts(&format_ts(t1)), Some(t1));
    }

    #[test]
    fn embedding_extraction() {
        let node = GraphNode::new("File:src/lib.rs", NodeType::File).with_attr(
            "embedding",
            AttrValue::List(vec![AttrValue::from(0.5), AttrValue::from(-0.25)]),
        );
        assert_eq!(node.embedding(), Some(vec![0.5, -0.25]));

        let bare = GraphNode::new("File:src/main.rs", NodeType::File);
        assert_eq!(bare.embedding(), None);
    }

    #[test]
    fn edge_identity_is_stable() {
        let cand = EdgeCandidate {
            source: NodeId::new("Function:a"),
            target: NodeId::new("Function:b"),
            rel_type: RelType::Calls,
            attributes: AttrMap::new(),
            valid_from: Utc::now(),
            provenance: Provenance::new("repo", "abc123"),
        };
        assert_eq!(cand.identity(), "Function:a|CALLS|Function:b");
    }
}
