//! Error types for the chronicle-ingest crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Empty batch: nothing to merge")]
    EmptyBatch,

    #[error("Invalid record {key}: {reason}")]
    InvalidRecord { key: String, reason: String },

    #[error("Graph error: {0}")]
    Graph(#[from] chronicle_graph::GraphError),

    #[error("Engine error: {0}")]
    Engine(#[from] chronicle_core::EngineError),
}

pub type Result<T> = std::result::Result<T, IngestError>;

impl From<IngestError> for chronicle_core::EngineError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::EmptyBatch => {
                chronicle_core::EngineError::Validation("empty batch: nothing to merge".to_string())
            }
            IngestError::InvalidRecord { key, reason } => {
                chronicle_core::EngineError::Validation(format!("invalid record {key}: {reason}"))
            }
            IngestError::Graph(g) => g.into(),
            IngestError::Engine(inner) => inner,
        }
    }
}
