//! chronicle-core: Shared types, configuration, and error handling for the
//! Chronicle bitemporal knowledge graph.
//!
//! This crate provides the foundational types used across all Chronicle
//! components:
//! - Node and edge types for the versioned knowledge graph
//! - Typed attribute values validated at the ingestion boundary
//! - Lock, constraint, and proposed-change records for multi-agent editing
//! - Engine events for observers
//! - Configuration management
//! - Common error types

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use error::EngineError;
pub use types::{
    AttrValue, EdgeCandidate, EdgeSnapshot, GraphNode, MergeOutcome, NodeId, NodeType, Provenance,
    RelType, RiskLevel,
};
