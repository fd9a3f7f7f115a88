use std::error::Error;
use std::fmt::{self, Debug};

/// Marker trait for `Coordinator` errors
pub trait CoordinatorError: Debug + Error + Send + Sync + 'static {
    /// Returns the kind of this error
    fn kind(&self) -> CoordinatorErrorKind;
}

/// The kind of coordination backend error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CoordinatorErrorKind {
    /// A node already exists at the requested path
    NodeExists,

    /// The node, or the parent of a node being created, does not exist
    NoNode,

    /// The session backing the client has ended
    SessionClosed,

    /// Other/unknown error
    Other,
}

impl fmt::Display for CoordinatorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}
