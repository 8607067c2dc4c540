use thiserror::Error;

/// Errors surfaced by the explanation engine. All of them are local
/// programming or integration errors; none are retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The compiled circuit text is malformed or truncated.
    #[error("malformed compiled circuit: {0}")]
    Format(String),

    /// Decomposability or determinism is broken.
    #[error("structural invariant violated: {0}")]
    Invariant(String),

    /// A requested node id is out of range.
    #[error("node {index} out of range for a circuit with {node_count} nodes")]
    Index { index: u32, node_count: usize },

    /// An operation was invoked on a circuit that is not in the expected state.
    #[error("precondition violated: {0}")]
    Precondition(String),
}
