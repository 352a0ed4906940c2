//! chronicle-query: Hybrid retrieval and impact analysis.
//!
//! Both engines read through the graph adapter and hold no per-request
//! state. Store and embedding calls are the only await points; ranking,
//! traversal, and risk classification are synchronous bounded work.

pub mod embedding;
pub mod graph;
pub mod impact;
pub mod retrieval;
pub mod types;

use std::sync::Arc;

use chronicle_core::config::EngineConfig;
use chronicle_graph::GraphClient;

pub use embedding::{
    cosine_similarity, EmbedError, EmbeddingProvider, FailingEmbedder, FeatureHashEmbedder,
};
pub use graph::TraversalGraph;
pub use types::{
    ImpactOutcome, ImpactRequest, ImpactedNode, SearchHit, SearchOutcome, SearchRequest,
};

/// The query engine: one instance serves both search and impact analysis.
#[derive(Clone)]
pub struct QueryEngine {
    client: GraphClient,
    embedder: Arc<dyn EmbeddingProvider>,
    config: EngineConfig,
}

impl QueryEngine {
    pub fn new(
        client: GraphClient,
        embedder: Arc<dyn EmbeddingProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            client,
            embedder,
            config,
        }
    }

    pub(crate) fn client(&self) -> &GraphClient {
        &self.client
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }
}
