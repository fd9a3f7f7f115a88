//! In-memory (single node) implementation of a coordination backend for local
//! development.
//!
//! A [`MemoryCoordinator`] holds the node tree. Each call to
//! [`MemoryCoordinator::session`] opens a new client session; ephemeral nodes
//! created through that session are removed when it is closed.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use proven_coordination::{
    Acl, Coordinator, CreateMode, SessionId, Stat, Watch, WatchEventKind, WatchSender, basename,
    is_valid_path, open_acl, parent,
};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug)]
struct Node {
    data: Bytes,
    acl: Vec<Acl>,
    ephemeral_owner: Option<SessionId>,
    version: u64,
    cversion: u64,
    children: BTreeSet<String>,
}

impl Node {
    fn new(data: Bytes, acl: Vec<Acl>, ephemeral_owner: Option<SessionId>) -> Self {
        Self {
            data,
            acl,
            ephemeral_owner,
            version: 0,
            cversion: 0,
            children: BTreeSet::new(),
        }
    }

    fn stat(&self) -> Stat {
        Stat {
            version: self.version,
            cversion: self.cversion,
            num_children: self.children.len(),
            ephemeral_owner: self.ephemeral_owner,
            data_length: self.data.len(),
        }
    }
}

#[derive(Debug)]
struct Tree {
    nodes: BTreeMap<String, Node>,
    child_watches: HashMap<String, Vec<(SessionId, WatchSender)>>,
    closed_sessions: HashSet<SessionId>,
}

impl Tree {
    fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::new(Bytes::new(), open_acl(), None));

        Self {
            nodes,
            child_watches: HashMap::new(),
            closed_sessions: HashSet::new(),
        }
    }

    fn fire_child_watches(&mut self, path: &str, kind: WatchEventKind) {
        if let Some(watches) = self.child_watches.remove(path) {
            debug!("Firing {} child watches on {}", watches.len(), path);
            for (_, sender) in watches {
                sender.fire(kind);
            }
        }
    }

    fn remove_node(&mut self, path: &str) {
        if self.nodes.remove(path).is_none() {
            return;
        }

        if let Some(parent_path) = parent(path) {
            if let Some(parent_node) = self.nodes.get_mut(parent_path) {
                parent_node.children.remove(basename(path));
                parent_node.cversion += 1;
            }
            self.fire_child_watches(parent_path, WatchEventKind::ChildrenChanged);
        }

        self.fire_child_watches(path, WatchEventKind::NodeDeleted);
    }
}

/// In-memory coordination backend shared by any number of sessions.
#[derive(Clone, Debug)]
pub struct MemoryCoordinator {
    tree: Arc<Mutex<Tree>>,
    next_session: Arc<AtomicU64>,
}

impl Default for MemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCoordinator {
    /// Creates a new `MemoryCoordinator` containing only the root node.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tree: Arc::new(Mutex::new(Tree::new())),
            next_session: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Opens a new client session against this backend.
    #[must_use]
    pub fn session(&self) -> MemorySession {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        debug!("Opened memory coordination session {}", id);

        MemorySession {
            id,
            tree: self.tree.clone(),
        }
    }
}

/// A client session of a [`MemoryCoordinator`].
#[derive(Clone, Debug)]
pub struct MemorySession {
    id: SessionId,
    tree: Arc<Mutex<Tree>>,
}

impl MemorySession {
    /// Returns this session's identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Ends the session.
    ///
    /// Every ephemeral node owned by the session is deleted, which fires the
    /// child watches of the affected parents. Watches armed by this session
    /// are dropped. Closing an already closed session does nothing.
    pub async fn close(&self) {
        let mut tree = self.tree.lock().await;

        if !tree.closed_sessions.insert(self.id) {
            return;
        }

        let owned: Vec<String> = tree
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner == Some(self.id))
            .map(|(path, _)| path.clone())
            .collect();

        debug!(
            "Closing session {}, removing {} ephemeral nodes",
            self.id,
            owned.len()
        );

        // Drop this session's watches first so they resolve as lost rather
        // than as changes caused by the session's own cleanup.
        for watches in tree.child_watches.values_mut() {
            watches.retain(|(owner, _)| *owner != self.id);
        }
        tree.child_watches.retain(|_, watches| !watches.is_empty());

        for path in owned {
            tree.remove_node(&path);
        }
    }

    /// Returns the access-control entries stored on a node.
    ///
    /// ACLs are recorded but not enforced by this backend.
    pub async fn acl(&self, path: &str) -> Result<Vec<Acl>, Error> {
        check_path(path)?;

        let tree = self.tree.lock().await;
        self.check_open(&tree)?;

        tree.nodes
            .get(path)
            .map(|node| node.acl.clone())
            .ok_or_else(|| Error::NoNode(path.to_string()))
    }

    fn check_open(&self, tree: &Tree) -> Result<(), Error> {
        if tree.closed_sessions.contains(&self.id) {
            return Err(Error::SessionClosed(self.id));
        }

        Ok(())
    }
}

fn check_path(path: &str) -> Result<(), Error> {
    if is_valid_path(path) {
        Ok(())
    } else {
        Err(Error::InvalidPath(path.to_string()))
    }
}

#[async_trait]
impl Coordinator for MemorySession {
    type Error = Error;

    async fn exists(&self, path: &str) -> Result<Option<Stat>, Self::Error> {
        check_path(path)?;

        let tree = self.tree.lock().await;
        self.check_open(&tree)?;

        Ok(tree.nodes.get(path).map(Node::stat))
    }

    async fn create(
        &self,
        path: &str,
        data: Bytes,
        mode: CreateMode,
        acl: Vec<Acl>,
    ) -> Result<String, Self::Error> {
        check_path(path)?;

        let mut tree = self.tree.lock().await;
        self.check_open(&tree)?;

        if tree.nodes.contains_key(path) {
            return Err(Error::NodeExists(path.to_string()));
        }

        let parent_path = parent(path).ok_or_else(|| Error::NodeExists(path.to_string()))?;
        let parent_node = tree
            .nodes
            .get_mut(parent_path)
            .ok_or_else(|| Error::NoNode(parent_path.to_string()))?;

        if parent_node.ephemeral_owner.is_some() {
            return Err(Error::NoChildrenForEphemerals(parent_path.to_string()));
        }

        parent_node.children.insert(basename(path).to_string());
        parent_node.cversion += 1;

        let owner = match mode {
            CreateMode::Persistent => None,
            CreateMode::Ephemeral => Some(self.id),
        };
        tree.nodes
            .insert(path.to_string(), Node::new(data, acl, owner));

        debug!("Session {} created {:?} node {}", self.id, mode, path);

        tree.fire_child_watches(parent_path, WatchEventKind::ChildrenChanged);

        Ok(path.to_string())
    }

    async fn children_with_watch(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, Stat, Watch), Self::Error> {
        check_path(path)?;

        let mut tree = self.tree.lock().await;
        self.check_open(&tree)?;

        let node = tree
            .nodes
            .get(path)
            .ok_or_else(|| Error::NoNode(path.to_string()))?;
        let children = node.children.iter().cloned().collect();
        let stat = node.stat();

        let (sender, watch) = Watch::channel(path);
        tree.child_watches
            .entry(path.to_string())
            .or_default()
            .push((self.id, sender));

        Ok((children, stat, watch))
    }
}
