use parley_core::ids::NodeId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("node not found: {0}")]
    NotFound(NodeId),

    #[error("parent chain from {0} does not reach a root")]
    BrokenChain(NodeId),

    #[error("conflict: {0}")]
    Conflict(String),
}
