//! Engine events for observers.
//!
//! Events are emitted by the service facade over an injected channel sender;
//! there is no module-level event bus. Consumers (audit sinks, dashboards)
//! subscribe by handing the facade a sender half.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{NodeId, RelType, RiskLevel};

/// Unique identifier for an emitted event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// An event emitted by the Chronicle engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl EngineEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// The event payload, tagged by type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum EventPayload {
    // ── Ingestion events ──────────────────────────────────────
    /// A batch merge finished.
    BatchMerged {
        origin: String,
        change_id: String,
        nodes_created: u64,
        edges_created: u64,
        skipped: u64,
    },
    /// An edge interval was closed by a superseding observation.
    EdgeIntervalClosed {
        source: NodeId,
        target: NodeId,
        rel_type: RelType,
        closed_at: DateTime<Utc>,
    },
    /// A candidate violated the bitemporal invariant and was skipped.
    ConsistencyViolation { identity: String, reason: String },

    // ── Query events ──────────────────────────────────────────
    /// A search fell back to keyword matching.
    SearchDegraded { query: String, reason: String },
    /// An impact analysis completed.
    ImpactComputed {
        target: NodeId,
        risk_level: RiskLevel,
        impacted_count: usize,
        truncated: bool,
    },

    // ── Coordination events ───────────────────────────────────
    /// An exclusive lock was granted.
    LockAcquired {
        target: NodeId,
        agent_id: String,
        task_id: String,
    },
    /// Locks held by a task were released.
    LockReleased { task_id: String, released: u64 },
    /// A constraint was attached to a node.
    ConstraintApplied {
        constraint_id: String,
        target: NodeId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_roundtrip() {
        let event = EngineEvent::new(EventPayload::LockAcquired {
            target: NodeId::new("File:src/auth.rs"),
            agent_id: "agent-1".to_string(),
            task_id: "task-42".to_string(),
        });

        let json = serde_json::to_string(&event).unwrap();
        let back: EngineEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
    }

    #[test]
    fn event_payload_tags() {
        let payload = EventPayload::SearchDegraded {
            query: "auth flow".to_string(),
            reason: "embedding provider unavailable".to_string(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"event_type\":\"SearchDegraded\""));
    }
}
