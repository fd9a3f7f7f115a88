//! Abstract interface for hierarchical, session-based coordination backends.
//!
//! A coordination backend exposes a tree of nodes addressed by absolute,
//! slash-separated paths. Nodes are either persistent or ephemeral; ephemeral
//! nodes belong to the session that created them and disappear when that
//! session ends. Clients can arm one-shot watches that fire on the next
//! change to a node's children.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod path;
mod watch;

pub use error::{CoordinatorError, CoordinatorErrorKind};
pub use path::{ancestors, basename, is_valid_path, join_path, parent};
pub use watch::{Watch, WatchEvent, WatchEventKind, WatchSender};

use async_trait::async_trait;
use bytes::Bytes;

/// Identifier of a backend session.
pub type SessionId = u64;

/// How a node should be created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateMode {
    /// The node outlives the session that created it.
    Persistent,

    /// The node is removed when the creating session ends.
    Ephemeral,
}

/// Permission bits carried by an [`Acl`] entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Permissions(u32);

impl Permissions {
    /// May read node data and list children.
    pub const READ: Self = Self(1);
    /// May set node data.
    pub const WRITE: Self = Self(1 << 1);
    /// May create children.
    pub const CREATE: Self = Self(1 << 2);
    /// May delete children.
    pub const DELETE: Self = Self(1 << 3);
    /// May change the node's ACL.
    pub const ADMIN: Self = Self(1 << 4);
    /// Every permission.
    pub const ALL: Self = Self(0b1_1111);

    /// Returns the raw permission bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if every bit in `other` is also set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// A single access-control entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Acl {
    /// Granted permissions.
    pub perms: Permissions,

    /// Authentication scheme the identity belongs to.
    pub scheme: String,

    /// Identity within the scheme.
    pub id: String,
}

impl Acl {
    /// An entry granting `perms` to anyone.
    #[must_use]
    pub fn world(perms: Permissions) -> Self {
        Self {
            perms,
            scheme: "world".to_string(),
            id: "anyone".to_string(),
        }
    }
}

/// The open ACL: everyone may do everything.
#[must_use]
pub fn open_acl() -> Vec<Acl> {
    vec![Acl::world(Permissions::ALL)]
}

/// Metadata describing a node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stat {
    /// Number of times the node's data has changed.
    pub version: u64,

    /// Number of times the node's children have changed.
    pub cversion: u64,

    /// Current number of children.
    pub num_children: usize,

    /// Owning session when the node is ephemeral.
    pub ephemeral_owner: Option<SessionId>,

    /// Length of the node's data.
    pub data_length: usize,
}

/// A connected client of a coordination backend.
///
/// Implementations must be safe to share between tasks; independent callers
/// may issue requests concurrently on the same handle.
#[async_trait]
pub trait Coordinator: Send + Sync + 'static {
    /// The error type for backend operations.
    type Error: CoordinatorError;

    /// Checks whether a node exists, returning its metadata if it does.
    ///
    /// # Arguments
    /// * `path`: Absolute path of the node.
    async fn exists(&self, path: &str) -> Result<Option<Stat>, Self::Error>;

    /// Creates a node and returns the path it was created at.
    ///
    /// Fails with an error of kind [`CoordinatorErrorKind::NodeExists`] if a
    /// node is already present at `path`, and of kind
    /// [`CoordinatorErrorKind::NoNode`] if the parent does not exist.
    ///
    /// # Arguments
    /// * `path`: Absolute path of the new node.
    /// * `data`: Initial node data.
    /// * `mode`: Whether the node is persistent or session-scoped.
    /// * `acl`: Access-control entries for the node.
    async fn create(
        &self,
        path: &str,
        data: Bytes,
        mode: CreateMode,
        acl: Vec<Acl>,
    ) -> Result<String, Self::Error>;

    /// Lists the children of a node and arms a one-shot watch that fires on
    /// the next change to that list.
    ///
    /// Child names are returned relative to `path`.
    async fn children_with_watch(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, Stat, Watch), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_acl_grants_everything() {
        let acl = open_acl();

        assert_eq!(acl.len(), 1);
        assert_eq!(acl[0].scheme, "world");
        assert_eq!(acl[0].id, "anyone");
        assert!(acl[0].perms.contains(Permissions::READ));
        assert!(acl[0].perms.contains(Permissions::ADMIN));
    }

    #[test]
    fn test_permission_bits() {
        assert_eq!(Permissions::ALL.bits(), 31);
        assert!(!Permissions::READ.contains(Permissions::WRITE));
    }
}
