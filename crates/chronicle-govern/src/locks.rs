//! Exclusive claims on graph targets.
//!
//! The critical section is exactly one atomic MERGE in the store; no lock
//! is held in-process across an await point. There is no lease expiry:
//! stale-lock reclamation is the caller's policy.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use chronicle_core::EngineError;
use chronicle_graph::GraphClient;

/// The outcome of an acquisition attempt. `locked=false` always carries
/// the surviving holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockGrant {
    /// The node the selector resolved to.
    pub target: chronicle_core::types::NodeId,
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict: Option<LockConflict>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConflict {
    pub holder_agent: String,
    pub holder_task: String,
    /// How long the surviving holder has held the lock, in seconds.
    pub held_for_secs: i64,
}

#[derive(Clone)]
pub struct LockCoordinator {
    client: GraphClient,
}

impl LockCoordinator {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// Claim an exclusive lock on the node `selector` resolves to.
    ///
    /// The store's create-if-absent decides the winner: whoever the
    /// returned record names holds the lock. Re-acquisition by the same
    /// task succeeds.
    pub async fn acquire_lock(
        &self,
        selector: &str,
        agent_id: &str,
        task_id: &str,
    ) -> Result<LockGrant, EngineError> {
        if agent_id.trim().is_empty() || task_id.trim().is_empty() {
            return Err(EngineError::Validation(
                "agent_id and task_id are required".to_string(),
            ));
        }

        let target = self
            .client
            .resolve_selector(selector)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::not_found("node", selector))?;

        let record = self
            .client
            .create_lock_if_absent(&target.id, agent_id, task_id)
            .await?;

        if record.holder_task == task_id {
            tracing::info!(target = %target.id, agent_id, task_id, "Lock acquired");
            Ok(LockGrant {
                target: target.id,
                locked: true,
                conflict: None,
            })
        } else {
            tracing::info!(
                target = %target.id,
                agent_id,
                holder = %record.holder_agent,
                "Lock contended"
            );
            Ok(LockGrant {
                target: target.id,
                locked: false,
                conflict: Some(LockConflict {
                    holder_agent: record.holder_agent,
                    holder_task: record.holder_task,
                    held_for_secs: (Utc::now() - record.acquired_at).num_seconds().max(0),
                }),
            })
        }
    }

    /// Release every lock held by `task_id`. Releasing nothing is a no-op.
    pub async fn release_lock(&self, task_id: &str) -> Result<u64, EngineError> {
        let released = self.client.delete_locks_for_task(task_id).await?;
        if released > 0 {
            tracing::info!(task_id, released, "Locks released");
        }
        Ok(released.max(0) as u64)
    }
}
