use proven_coordination::{CoordinatorError, CoordinatorErrorKind, SessionId};
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// A node already exists at the path.
    #[error("node already exists: {0}")]
    NodeExists(String),

    /// The node, or the parent of a node being created, is missing.
    #[error("node does not exist: {0}")]
    NoNode(String),

    /// Ephemeral nodes cannot have children.
    #[error("ephemeral node cannot have children: {0}")]
    NoChildrenForEphemerals(String),

    /// The session has been closed.
    #[error("session {0} is closed")]
    SessionClosed(SessionId),

    /// The path is not a valid absolute node path.
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl CoordinatorError for Error {
    fn kind(&self) -> CoordinatorErrorKind {
        match self {
            Self::NodeExists(_) => CoordinatorErrorKind::NodeExists,
            Self::NoNode(_) => CoordinatorErrorKind::NoNode,
            Self::SessionClosed(_) => CoordinatorErrorKind::SessionClosed,
            Self::NoChildrenForEphemerals(_) | Self::InvalidPath(_) => CoordinatorErrorKind::Other,
        }
    }
}
