//! Impact analysis: bounded blast-radius traversal with risk classification.

use std::time::{Duration, Instant};

use chronicle_core::types::{ConstraintType, NodeId, RiskLevel};
use chronicle_core::EngineError;

use crate::graph::TraversalGraph;
use crate::types::{ImpactOutcome, ImpactRequest, ImpactedNode};
use crate::QueryEngine;

impl QueryEngine {
    /// Compute the blast radius of a change to `target` out to `max_depth`
    /// hops over the whitelisted relationship types, and classify the risk.
    ///
    /// Depth requests beyond the configured ceiling are clamped with
    /// `truncated=true`, never rejected. A deadline expiring during the
    /// constraint sweep yields a best-effort classification, also flagged
    /// `truncated`.
    pub async fn analyze(&self, request: &ImpactRequest) -> Result<ImpactOutcome, EngineError> {
        let cfg = self.config().impact.clone();
        let deadline = Instant::now()
            + Duration::from_millis(request.deadline_ms.unwrap_or(cfg.deadline_ms));

        let target = self
            .client()
            .resolve_selector(&request.target)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::not_found("node", &request.target))?;

        let requested_depth = request.max_depth.unwrap_or(cfg.depth_ceiling).max(1);
        let depth = requested_depth.min(cfg.depth_ceiling);
        let mut truncated = requested_depth > cfg.depth_ceiling;

        let subgraph = self
            .client()
            .fetch_neighborhood(&target.id, &cfg.rel_whitelist, depth, cfg.node_limit)
            .await?;

        let graph = TraversalGraph::from_subgraph(&subgraph);
        let start = graph
            .index_of(target.id.as_str())
            .ok_or_else(|| EngineError::not_found("node", target.id.as_str()))?;

        let impacted: Vec<ImpactedNode> = graph
            .hop_distances(start, depth)
            .into_iter()
            .map(|(idx, hop_distance)| {
                let row = graph.node(idx);
                ImpactedNode {
                    node_id: NodeId::new(row.id.clone()),
                    node_type: row.node_type,
                    hop_distance,
                }
            })
            .collect();

        let mut immutable_hit = false;
        for node in &impacted {
            if Instant::now() >= deadline {
                truncated = true;
                break;
            }
            let constraints = self.client().constraints_for(&node.node_id).await?;
            if constraints
                .iter()
                .any(|c| c.active && c.constraint_type == ConstraintType::ImmutableLogic)
            {
                immutable_hit = true;
                break;
            }
        }

        let boundary_crossings = impacted
            .iter()
            .filter(|n| n.node_type.is_boundary())
            .count();
        let risk_level = classify_risk(
            impacted.len(),
            boundary_crossings,
            immutable_hit,
            cfg.t1,
            cfg.t2,
        );

        tracing::debug!(
            target = %target.id,
            impacted = impacted.len(),
            boundary_crossings,
            risk = ?risk_level,
            truncated,
            "Impact analysis complete"
        );

        Ok(ImpactOutcome {
            risk_level,
            impacted,
            subgraph,
            truncated,
        })
    }
}

/// Deterministic risk classification. `t1 < t2` gate the impacted-count
/// bands; an active immutable-logic constraint anywhere in the radius, or
/// more than one module/application boundary crossing, escalates to high.
pub(crate) fn classify_risk(
    impacted: usize,
    boundary_crossings: usize,
    immutable_hit: bool,
    t1: usize,
    t2: usize,
) -> RiskLevel {
    if immutable_hit || impacted >= t2 || boundary_crossings > 1 {
        RiskLevel::High
    } else if impacted >= t1 || boundary_crossings == 1 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T1: usize = 5;
    const T2: usize = 20;

    #[test]
    fn small_radius_without_boundary_is_low() {
        assert_eq!(classify_risk(3, 0, false, T1, T2), RiskLevel::Low);
        assert_eq!(classify_risk(0, 0, false, T1, T2), RiskLevel::Low);
    }

    #[test]
    fn first_threshold_or_single_boundary_is_medium() {
        assert_eq!(classify_risk(T1, 0, false, T1, T2), RiskLevel::Medium);
        assert_eq!(classify_risk(2, 1, false, T1, T2), RiskLevel::Medium);
    }

    #[test]
    fn second_threshold_is_high() {
        assert_eq!(classify_risk(T2, 0, false, T1, T2), RiskLevel::High);
        assert_eq!(classify_risk(T2 + 50, 3, false, T1, T2), RiskLevel::High);
    }

    #[test]
    fn immutable_constraint_forces_high_regardless_of_size() {
        // Scenario: 5 direct callers plus 3 at depth 2, one of them carrying
        // an active immutable-logic constraint.
        assert_eq!(classify_risk(8, 0, true, T1, T2), RiskLevel::High);
        assert_eq!(classify_risk(1, 0, true, T1, T2), RiskLevel::High);
    }

    #[test]
    fn multiple_boundary_crossings_escalate() {
        assert_eq!(classify_risk(2, 2, false, T1, T2), RiskLevel::High);
    }

    #[test]
    fn risk_is_monotone_in_impacted_count() {
        let levels: Vec<RiskLevel> = (0..T2 + 5)
            .map(|n| classify_risk(n, 0, false, T1, T2))
            .collect();
        assert!(levels.windows(2).all(|w| w[0] <= w[1]));
    }
}
