//! Error types for network construction, table access and propagation.

use thiserror::Error;

/// Errors raised by tables, nodes and network events.
///
/// Every failure is local and synchronous. A network event that fails is
/// rolled back, so a caller can inspect the network after an error and find
/// the belief state it had before the call.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BayesError {
    /// A state, parent-combination or node index outside its valid range.
    #[error("index error: {0}")]
    Index(String),

    /// A parent combination or replacement table whose dimensions do not
    /// match the node it is applied to.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A pi-message would divide by a zero lambda-message.
    #[error("zero lambda-message from `{child}` to `{parent}` for state {state}")]
    ZeroMessage {
        parent: String,
        child: String,
        state: usize,
    },

    /// Lambda- and pi-evidence jointly give zero weight to every state.
    #[error("degenerate distribution at `{0}`: evidence rules out every state")]
    DegenerateDistribution(String),

    /// An edge that would break the polytree structure, or a propagation that
    /// did not terminate within the configured bound.
    #[error("topology error: {0}")]
    Topology(String),

    #[error("duplicate node `{0}`")]
    DuplicateNode(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Malformed table text.
    #[error("parse error at line {line}: {msg}")]
    Parse { line: usize, msg: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BayesError>;
