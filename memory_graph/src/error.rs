//! Error type for the memory graph crate.

use memory_log::LogError;

use crate::knowledge_base::NodeId;

#[derive(thiserror::Error, Debug)]
pub enum GraphError {
    #[error("unknown node '{0}'")]
    UnknownNode(NodeId),

    #[error("edge weight must be a positive finite number, got {0}")]
    InvalidWeight(f32),

    #[error("explicit edge cannot connect node '{0}' to itself")]
    SelfLoop(NodeId),

    #[error("unknown {kind} filter '{value}'")]
    UnknownFilter { kind: &'static str, value: String },

    #[error(transparent)]
    Log(#[from] LogError),

    #[error("failed to serialize analytics export: {0}")]
    Export(#[from] serde_json::Error),
}
