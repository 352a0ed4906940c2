//! Declarative constraints and their evaluation against proposed changes.
//!
//! Evaluation is advisory: violations come back as structured data and the
//! caller decides policy. The per-type predicates are pure functions over
//! the constraint params and one change item.

use serde::{Deserialize, Serialize};

use chronicle_core::types::{
    AttrMap, AttrValue, ChangeItem, ChangeType, Constraint, ConstraintId, ConstraintType,
    ProposedChange, Severity, Violation,
};
use chronicle_core::EngineError;
use chronicle_graph::GraphClient;

/// A constraint as submitted by a caller; `id` and `active` are assigned
/// on creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintSpec {
    pub constraint_type: ConstraintType,
    #[serde(default)]
    pub params: AttrMap,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    pub owner: String,
}

fn default_severity() -> Severity {
    Severity::Error
}

/// A persisted constraint and the node it was attached to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedConstraint {
    pub constraint_id: ConstraintId,
    pub target: chronicle_core::types::NodeId,
}

#[derive(Clone)]
pub struct ConstraintCoordinator {
    client: GraphClient,
}

impl ConstraintCoordinator {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }

    /// Persist a constraint and attach it to the node `selector` resolves
    /// to.
    pub async fn apply_constraint(
        &self,
        selector: &str,
        spec: &ConstraintSpec,
    ) -> Result<AppliedConstraint, EngineError> {
        let target = self
            .client
            .resolve_selector(selector)
            .await
            .map_err(EngineError::from)?
            .ok_or_else(|| EngineError::not_found("node", selector))?;

        let constraint = Constraint {
            id: ConstraintId::new(),
            constraint_type: spec.constraint_type,
            params: spec.params.clone(),
            severity: spec.severity,
            owner: spec.owner.clone(),
            active: true,
        };

        self.client
            .create_constraint(&constraint, std::slice::from_ref(&target.id))
            .await?;

        tracing::info!(
            constraint_id = %constraint.id,
            constraint_type = constraint.constraint_type.as_str(),
            target = %target.id,
            "Constraint applied"
        );
        Ok(AppliedConstraint {
            constraint_id: constraint.id,
            target: target.id,
        })
    }

    /// Evaluate a proposed change against every active constraint attached
    /// to its touched nodes. Violations are data; an empty vec means the
    /// change is clean.
    pub async fn evaluate_constraints(
        &self,
        change: &ProposedChange,
    ) -> Result<Vec<Violation>, EngineError> {
        let mut violations = Vec::new();
        for item in &change.items {
            let constraints = self.client.constraints_for(&item.node).await?;
            for constraint in &constraints {
                if let Some(reason) = check_constraint(constraint, item, &change.agent_id) {
                    violations.push(Violation {
                        constraint_id: constraint.id.to_string(),
                        constraint_type: constraint.constraint_type,
                        severity: constraint.severity,
                        node: item.node.clone(),
                        reason,
                    });
                }
            }
        }

        if !violations.is_empty() {
            tracing::info!(
                agent_id = %change.agent_id,
                task_id = %change.task_id,
                violations = violations.len(),
                "Proposed change violates constraints"
            );
        }
        Ok(violations)
    }
}

/// Evaluate one constraint against one change item. Returns the violation
/// reason, or `None` if the change is allowed.
pub(crate) fn check_constraint(
    constraint: &Constraint,
    item: &ChangeItem,
    agent_id: &str,
) -> Option<String> {
    if !constraint.active {
        return None;
    }
    match constraint.constraint_type {
        ConstraintType::ImmutableLogic => match item.change_type {
            ChangeType::Modified | ChangeType::Deleted => {
                Some("target logic is immutable".to_string())
            }
            ChangeType::Created => None,
        },
        ConstraintType::VersionPinning => {
            let pinned = param_str(&constraint.params, "attribute").unwrap_or("version");
            if item.change_type == ChangeType::Deleted {
                Some(format!("target pins `{pinned}` and cannot be deleted"))
            } else if item.touched_attributes.contains(pinned) {
                Some(format!("attribute `{pinned}` is pinned"))
            } else {
                None
            }
        }
        ConstraintType::LicenseRestriction => {
            let touches_license = item.touched_attributes.contains("license")
                || item.new_values.contains_key("license");
            if !touches_license {
                return None;
            }
            let allowed = param_str_list(&constraint.params, "allowed");
            match item.new_values.get("license").and_then(|v| v.as_str()) {
                Some(license) if allowed.iter().any(|a| a == license) => None,
                Some(license) => Some(format!("license `{license}` is not in the allowed list")),
                None => Some("license change without a declared value".to_string()),
            }
        }
        ConstraintType::AccessControl => {
            let allowed = param_str_list(&constraint.params, "allowed_agents");
            if allowed.iter().any(|a| a == agent_id) {
                None
            } else {
                Some(format!("agent `{agent_id}` is not permitted to change this node"))
            }
        }
    }
}

fn param_str<'a>(params: &'a AttrMap, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

fn param_str_list(params: &AttrMap, key: &str) -> Vec<String> {
    match params.get(key) {
        Some(AttrValue::List(vals)) => vals
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}
