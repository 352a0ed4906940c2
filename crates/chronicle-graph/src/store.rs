//! Storage capability seam and driver registry.
//!
//! Everything the engine needs from a graph store reduces to two
//! primitives: pattern queries and conditional writes executed against the
//! store's native atomicity. [`GraphPrimitiveStore`] captures that surface
//! so an alternative backend only has to implement it; [`connect_driver`]
//! resolves a backend by its registry name.

use async_trait::async_trait;
use neo4rs::Query;

use crate::client::{GraphClient, GraphConfig, GraphError};

/// Driver names the registry can connect.
pub const DRIVERS: &[&str] = &["neo4j"];

/// The primitive store surface every backend must provide.
///
/// Higher layers that do not need the typed adapter methods can hold a
/// `dyn GraphPrimitiveStore` and stay backend-agnostic.
#[async_trait]
pub trait GraphPrimitiveStore: Send + Sync {
    /// Execute a write statement (CREATE, MERGE, DELETE, SET) atomically.
    async fn execute_write(&self, query: Query) -> Result<(), GraphError>;

    /// Execute a pattern query and collect all rows.
    async fn execute_pattern(&self, query: Query) -> Result<Vec<neo4rs::Row>, GraphError>;
}

#[async_trait]
impl GraphPrimitiveStore for GraphClient {
    async fn execute_write(&self, query: Query) -> Result<(), GraphError> {
        self.run(query).await
    }

    async fn execute_pattern(&self, query: Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        self.query_rows(query).await
    }
}

/// Connect the driver named in the registry.
///
/// `"bolt"` is accepted as an alias since the Neo4j driver speaks the Bolt
/// protocol. Unknown names fail before any network activity.
pub async fn connect_driver(name: &str, config: &GraphConfig) -> Result<GraphClient, GraphError> {
    match name {
        "neo4j" | "bolt" => GraphClient::connect(config).await,
        other => Err(GraphError::Connection(format!(
            "unknown graph driver {other:?} (available: {})",
            DRIVERS.join(", ")
        ))),
    }
}
