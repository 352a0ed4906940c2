//! chronicle-graph: Neo4j adapter for the bitemporal knowledge graph.
//!
//! This crate is the single mutation point for the underlying graph store.
//! All reads and writes flow through this crate so that the bitemporal
//! interval invariants and the store's native conditional-write atomicity
//! are applied consistently. Higher components never cache mutable copies
//! of graph records across calls.

pub mod client;
pub mod mutations;
pub mod queries;
pub mod store;
pub mod temporal;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use queries::{EdgeRow, Neighbor, NodeRow, SubgraphResult};
pub use store::{connect_driver, GraphPrimitiveStore, DRIVERS};
