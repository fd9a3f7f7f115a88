//! Scripted coordination backend for driving a watcher step by step.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use proven_coordination::{
    Acl, Coordinator, CoordinatorError, CoordinatorErrorKind, CreateMode, Stat, Watch,
    WatchEventKind, WatchSender,
};
use thiserror::Error;

/// A backend call as observed by the scripted coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Exists(String),
    Create(String, CreateMode),
    Children(String),
}

#[derive(Debug, Error)]
#[error("scripted {kind} failure")]
pub struct ScriptedError {
    pub kind: CoordinatorErrorKind,
}

impl CoordinatorError for ScriptedError {
    fn kind(&self) -> CoordinatorErrorKind {
        self.kind
    }
}

#[derive(Debug, Default)]
pub struct ScriptedCoordinator {
    calls: Mutex<Vec<Call>>,
    existing: Mutex<HashSet<String>>,
    exists_failures: Mutex<HashMap<String, CoordinatorErrorKind>>,
    create_failures: Mutex<HashMap<String, CoordinatorErrorKind>>,
    pending_fetch_failures: AtomicUsize,
    panic_on_exists: bool,
    members: Mutex<Vec<String>>,
    watches: Mutex<Vec<WatchSender>>,
}

impl ScriptedCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_existing(self, path: &str) -> Self {
        self.existing.lock().insert(path.to_string());
        self
    }

    pub fn fail_exists(self, path: &str, kind: CoordinatorErrorKind) -> Self {
        self.exists_failures.lock().insert(path.to_string(), kind);
        self
    }

    pub fn fail_create(self, path: &str, kind: CoordinatorErrorKind) -> Self {
        self.create_failures.lock().insert(path.to_string(), kind);
        self
    }

    pub fn panic_on_exists(mut self) -> Self {
        self.panic_on_exists = true;
        self
    }

    pub fn fail_fetches(self, count: usize) -> Self {
        self.pending_fetch_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn set_members(&self, members: &[&str]) {
        *self.members.lock() = members.iter().map(ToString::to_string).collect();
    }

    /// Fires every armed watch, returning how many fired.
    pub fn fire_watches(&self) -> usize {
        let watches: Vec<WatchSender> = self.watches.lock().drain(..).collect();
        let fired = watches.len();
        for watch in watches {
            watch.fire(WatchEventKind::ChildrenChanged);
        }
        fired
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, Call::Children(_)))
            .count()
    }

    /// Polls until at least `count` fetches were issued.
    pub async fn wait_for_fetches(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.fetch_count() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("fetches were not issued in time");
    }
}

#[async_trait]
impl Coordinator for ScriptedCoordinator {
    type Error = ScriptedError;

    async fn exists(&self, path: &str) -> Result<Option<Stat>, Self::Error> {
        self.calls.lock().push(Call::Exists(path.to_string()));
        assert!(!self.panic_on_exists, "backend crashed checking {path}");

        if let Some(kind) = self.exists_failures.lock().get(path) {
            return Err(ScriptedError { kind: *kind });
        }

        Ok(self
            .existing
            .lock()
            .contains(path)
            .then(Stat::default))
    }

    async fn create(
        &self,
        path: &str,
        _data: Bytes,
        mode: CreateMode,
        _acl: Vec<Acl>,
    ) -> Result<String, Self::Error> {
        self.calls.lock().push(Call::Create(path.to_string(), mode));

        if let Some(kind) = self.create_failures.lock().get(path) {
            return Err(ScriptedError { kind: *kind });
        }

        self.existing.lock().insert(path.to_string());
        Ok(path.to_string())
    }

    async fn children_with_watch(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, Stat, Watch), Self::Error> {
        self.calls.lock().push(Call::Children(path.to_string()));

        let failed = self
            .pending_fetch_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ScriptedError {
                kind: CoordinatorErrorKind::Other,
            });
        }

        let (sender, watch) = Watch::channel(path);
        self.watches.lock().push(sender);

        Ok((self.members.lock().clone(), Stat::default(), watch))
    }
}
