//! Engine configuration.
//!
//! Loaded from `chronicle.toml` sections or `CHRONICLE__`-prefixed
//! environment variables by the service binary; every field has a default
//! so a bare deployment works out of the box.

use serde::Deserialize;

use crate::error::EngineError;
use crate::types::RelType;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub impact: ImpactConfig,
}

impl EngineConfig {
    /// Reject configurations the risk classifier cannot work with. Called
    /// at load time so a bad deployment fails at startup, not mid-analysis.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.impact.t1 >= self.impact.t2 {
            return Err(EngineError::Validation(format!(
                "impact thresholds must satisfy t1 < t2 (got t1={}, t2={})",
                self.impact.t1, self.impact.t2
            )));
        }
        if self.impact.depth_ceiling == 0 {
            return Err(EngineError::Validation(
                "impact depth_ceiling must be at least 1".to_string(),
            ));
        }
        if self.search.default_top_k == 0 {
            return Err(EngineError::Validation(
                "search default_top_k must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Hybrid retrieval tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// Result count when the request does not specify one.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Maximum embedded nodes pulled from the store per search.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,

    /// Per-candidate one-hop expansion cap.
    #[serde(default = "default_expansion_limit")]
    pub expansion_limit: usize,

    /// Soft deadline for a search, in milliseconds.
    #[serde(default = "default_search_deadline_ms")]
    pub deadline_ms: u64,
}

/// Impact analysis tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct ImpactConfig {
    /// Below this impacted count (with no boundary crossing) risk is low.
    #[serde(default = "default_t1")]
    pub t1: usize,

    /// At or above this impacted count risk is high. Must exceed `t1`.
    #[serde(default = "default_t2")]
    pub t2: usize,

    /// Hard ceiling on traversal depth; deeper requests are clamped.
    #[serde(default = "default_depth_ceiling")]
    pub depth_ceiling: usize,

    /// Relationship types impact traversal is allowed to follow.
    #[serde(default = "default_rel_whitelist")]
    pub rel_whitelist: Vec<RelType>,

    /// Maximum nodes fetched for the traversal neighborhood.
    #[serde(default = "default_node_limit")]
    pub node_limit: u32,

    /// Soft deadline for an analysis, in milliseconds.
    #[serde(default = "default_impact_deadline_ms")]
    pub deadline_ms: u64,
}

fn default_top_k() -> usize {
    10
}

fn default_candidate_limit() -> usize {
    512
}

fn default_expansion_limit() -> usize {
    32
}

fn default_search_deadline_ms() -> u64 {
    2_000
}

fn default_t1() -> usize {
    5
}

fn default_t2() -> usize {
    20
}

fn default_depth_ceiling() -> usize {
    6
}

fn default_rel_whitelist() -> Vec<RelType> {
    vec![RelType::Calls, RelType::DependsOn, RelType::Contains]
}

fn default_node_limit() -> u32 {
    10_000
}

fn default_impact_deadline_ms() -> u64 {
    5_000
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            candidate_limit: default_candidate_limit(),
            expansion_limit: default_expansion_limit(),
            deadline_ms: default_search_deadline_ms(),
        }
    }
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            t1: default_t1(),
            t2: default_t2(),
            depth_ceiling: default_depth_ceiling(),
            rel_whitelist: default_rel_whitelist(),
            node_limit: default_node_limit(),
            deadline_ms: default_impact_deadline_ms(),
        }
    }
}
