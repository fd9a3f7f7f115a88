//! Pool registration and the membership watch loop.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use proven_coordination::{
    Coordinator, CoordinatorError, CoordinatorErrorKind, CreateMode, ancestors, join_path,
    open_acl,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;
use crate::error::{PoolError, TerminalReason, WatcherStatus};

/// Location of the pool node relative to the configured root
const POOL_SUFFIX: &str = "scraper/scrapers";

/// A snapshot in flight. The worker waits on `taken` before moving on.
#[derive(Debug)]
struct Handoff {
    members: Vec<String>,
    taken: oneshot::Sender<()>,
}

/// Stream of membership snapshots produced by a [`MembershipWatcher`].
///
/// Each item is the full list of member ids at the time it was fetched. The
/// watcher does not fetch again until the current snapshot is taken, and a
/// snapshot abandoned by a stopping watcher is never yielded. The stream ends
/// once the watcher has stopped, for any reason; check
/// [`MembershipWatcher::stopped`] to learn why.
#[derive(Debug)]
pub struct Snapshots {
    receiver: mpsc::Receiver<Handoff>,
}

impl Snapshots {
    /// Waits for the next snapshot. Returns `None` once the watcher stopped.
    pub async fn recv(&mut self) -> Option<Vec<String>> {
        std::future::poll_fn(|cx| self.poll_take(cx)).await
    }

    fn poll_take(&mut self, cx: &mut Context<'_>) -> Poll<Option<Vec<String>>> {
        loop {
            match self.receiver.poll_recv(cx) {
                Poll::Ready(Some(handoff)) => {
                    // A closed ack means the worker gave up on this snapshot.
                    if handoff.taken.send(()).is_ok() {
                        return Poll::Ready(Some(handoff.members));
                    }
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Stream for Snapshots {
    type Item = Vec<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.poll_take(cx)
    }
}

/// Latches cancellation and publishes the terminal status when the task
/// ends, including by panic.
struct StatusGuard {
    cancel: CancellationToken,
    status: watch::Sender<WatcherStatus>,
    reason: TerminalReason,
}

impl Drop for StatusGuard {
    fn drop(&mut self) {
        self.cancel.cancel();

        let reason = std::mem::replace(&mut self.reason, TerminalReason::Aborted);
        let _ = self.status.send(WatcherStatus::Stopped(reason));
    }
}

/// Registers this process in a worker pool and watches the pool's members.
///
/// Construction spawns a single background task. The task keeps running
/// until [`stop`](Self::stop) is called, the handle is dropped, or
/// bootstrap/registration fails.
#[derive(Debug)]
pub struct MembershipWatcher {
    id: String,
    pool_path: String,
    cancel: CancellationToken,
    stop_guard: AtomicBool,
    output: Mutex<Option<Snapshots>>,
    status: watch::Receiver<WatcherStatus>,
}

impl MembershipWatcher {
    /// Validates `config` and starts the background task.
    ///
    /// Never waits on the backend; failures to join the pool are reported
    /// through [`stopped`](Self::stopped) and by the snapshot stream closing.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Configuration`] for an empty member id, a member
    /// id containing `/`, a relative root or a zero retry interval, and
    /// [`PoolError::NoRuntime`] when called outside a tokio runtime.
    pub fn new<C>(config: PoolConfig<C>) -> Result<Self, PoolError>
    where
        C: Coordinator,
    {
        config.validate()?;

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| PoolError::NoRuntime)?;

        let pool_path = join_path(&config.root, POOL_SUFFIX);
        let member_path = join_path(&pool_path, &config.id);
        let cancel = CancellationToken::new();
        let (out, receiver) = mpsc::channel(1);
        let (status_tx, status) = watch::channel(WatcherStatus::Running);

        info!(
            "Starting membership watcher {} on pool {}",
            config.id, pool_path
        );

        let worker = Worker {
            client: config.client,
            pool_path: pool_path.clone(),
            member_path,
            retry_interval: config.retry_interval,
            cancel: cancel.clone(),
            out,
        };

        let guard = StatusGuard {
            cancel: cancel.clone(),
            status: status_tx,
            reason: TerminalReason::Aborted,
        };
        runtime.spawn(async move {
            let mut guard = guard;
            guard.reason = worker.run().await;
        });

        Ok(Self {
            id: config.id,
            pool_path,
            cancel,
            stop_guard: AtomicBool::new(false),
            output: Mutex::new(Some(Snapshots { receiver })),
            status,
        })
    }

    /// This instance's member id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path of the pool node whose children are the members.
    #[must_use]
    pub fn pool_path(&self) -> &str {
        &self.pool_path
    }

    /// Requests the watcher to stop. Safe to call any number of times from
    /// any number of threads; does not wait for the task to exit.
    ///
    /// Returns `true` for the one call that triggered cancellation.
    pub fn stop(&self) -> bool {
        if self.stop_guard.swap(true, Ordering::AcqRel) {
            return false;
        }

        info!(
            "Stopping membership watcher {} on pool {}",
            self.id, self.pool_path
        );
        self.cancel.cancel();

        true
    }

    /// Takes the snapshot stream. Only the first call returns `Some`.
    pub fn output(&self) -> Option<Snapshots> {
        self.output.lock().take()
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> WatcherStatus {
        self.status.borrow().clone()
    }

    /// Waits for the background task to exit and returns why it stopped.
    pub async fn stopped(&self) -> TerminalReason {
        let mut status = self.status.clone();

        match status
            .wait_for(|status| matches!(status, WatcherStatus::Stopped(_)))
            .await
        {
            Ok(status) => match &*status {
                WatcherStatus::Stopped(reason) => reason.clone(),
                WatcherStatus::Running => TerminalReason::Aborted,
            },
            Err(_) => TerminalReason::Aborted,
        }
    }
}

impl Drop for MembershipWatcher {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

struct Worker<C>
where
    C: Coordinator,
{
    client: Arc<C>,
    pool_path: String,
    member_path: String,
    retry_interval: Duration,
    cancel: CancellationToken,
    out: mpsc::Sender<Handoff>,
}

impl<C> Worker<C>
where
    C: Coordinator,
{
    /// Consumes the worker so the snapshot sender is dropped, closing the
    /// stream, before the terminal status is published.
    async fn run(self) -> TerminalReason {
        if let Err(e) = self.ensure_ancestors().await {
            error!("Failed to bootstrap pool path {}: {}", self.pool_path, e);
            return TerminalReason::BootstrapFailed(e);
        }

        if let Err(e) = self.register().await {
            error!("Could not register self in pool: {}", e);
            return TerminalReason::RegistrationFailed(e);
        }

        self.watch_members().await;

        debug!("Membership watcher for {} exited", self.member_path);
        TerminalReason::Stopped
    }

    async fn ensure_ancestors(&self) -> Result<(), PoolError> {
        for path in ancestors(&self.member_path) {
            debug!("Ensuring path {} exists", path);

            let exists = self
                .client
                .exists(&path)
                .await
                .map_err(|e| bootstrap_error(&path, &e))?;

            if exists.is_some() {
                debug!("Path {} already exists", path);
                continue;
            }

            match self
                .client
                .create(&path, Bytes::new(), CreateMode::Persistent, open_acl())
                .await
            {
                Ok(_) => debug!("Created path {}", path),
                Err(e) if e.kind() == CoordinatorErrorKind::NodeExists => {
                    debug!("Path {} was created concurrently", path);
                }
                Err(e) => return Err(bootstrap_error(&path, &e)),
            }
        }

        Ok(())
    }

    async fn register(&self) -> Result<(), PoolError> {
        info!("Registering self at {}", self.member_path);

        self.client
            .create(
                &self.member_path,
                Bytes::new(),
                CreateMode::Ephemeral,
                open_acl(),
            )
            .await
            .map_err(|e| PoolError::Registration {
                path: self.member_path.clone(),
                kind: e.kind(),
                message: e.to_string(),
            })?;

        Ok(())
    }

    /// Hands a snapshot to the consumer and waits until it is taken.
    async fn publish(&self, members: Vec<String>) {
        let (taken, ack) = oneshot::channel();

        if self.out.send(Handoff { members, taken }).await.is_err() {
            debug!("Snapshot stream for {} was dropped", self.pool_path);
            return;
        }

        if ack.await.is_err() {
            debug!(
                "Snapshot stream for {} was dropped before taking a snapshot",
                self.pool_path
            );
        }
    }

    async fn watch_members(&self) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            let (members, _, members_changed) =
                match self.client.children_with_watch(&self.pool_path).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(
                            "Error getting member list for {}, retrying in {:?}: {}",
                            self.pool_path, self.retry_interval, e
                        );

                        tokio::select! {
                            biased;
                            () = self.cancel.cancelled() => return,
                            () = tokio::time::sleep(self.retry_interval) => continue,
                        }
                    }
                };

            info!(
                "Pool {} has {} members: {:?}",
                self.pool_path,
                members.len(),
                members
            );

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                () = self.publish(members) => {}
            }

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                event = members_changed => {
                    debug!("Pool watch fired: {:?} on {}", event.kind, event.path);
                }
            }
        }
    }
}

fn bootstrap_error<E>(path: &str, error: &E) -> PoolError
where
    E: CoordinatorError,
{
    PoolError::Bootstrap {
        path: path.to_string(),
        kind: error.kind(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use proven_coordination_memory::{MemoryCoordinator, MemorySession};
    use tracing_test::traced_test;

    fn session() -> Arc<MemorySession> {
        Arc::new(MemoryCoordinator::new().session())
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let client = session();

        let result = MembershipWatcher::new(PoolConfig::new("", client.clone(), "/pools"));
        assert_matches!(result, Err(PoolError::Configuration(_)));

        let result = MembershipWatcher::new(PoolConfig::new("a/b", client.clone(), "/pools"));
        assert_matches!(result, Err(PoolError::Configuration(_)));

        let result = MembershipWatcher::new(PoolConfig::new("worker", client.clone(), "pools"));
        assert_matches!(result, Err(PoolError::Configuration(_)));

        let result = MembershipWatcher::new(
            PoolConfig::new("worker", client, "/pools").with_retry_interval(Duration::ZERO),
        );
        assert_matches!(result, Err(PoolError::Configuration(_)));
    }

    #[test]
    fn test_requires_runtime() {
        let result = MembershipWatcher::new(PoolConfig::new("worker", session(), "/pools"));

        assert_matches!(result, Err(PoolError::NoRuntime));
    }

    #[tokio::test]
    async fn test_pool_path_layout() {
        let watcher =
            MembershipWatcher::new(PoolConfig::new("worker-7", session(), "/pools/")).unwrap();

        assert_eq!(watcher.id(), "worker-7");
        assert_eq!(watcher.pool_path(), "/pools/scraper/scrapers");
    }

    #[tokio::test]
    async fn test_output_is_handed_out_once() {
        let watcher =
            MembershipWatcher::new(PoolConfig::new("worker-7", session(), "/pools")).unwrap();

        assert!(watcher.output().is_some());
        assert!(watcher.output().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_stop_cancels_once() {
        let watcher = Arc::new(
            MembershipWatcher::new(PoolConfig::new("worker-7", session(), "/pools")).unwrap(),
        );
        let mut snapshots = watcher.output().unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let watcher = watcher.clone();
                tokio::spawn(async move { watcher.stop() })
            })
            .collect();

        let mut triggered = 0;
        for handle in handles {
            if handle.await.unwrap() {
                triggered += 1;
            }
        }
        assert_eq!(triggered, 1);
        assert!(!watcher.stop());

        assert_eq!(watcher.stopped().await, TerminalReason::Stopped);
        assert_eq!(watcher.status(), WatcherStatus::Stopped(TerminalReason::Stopped));
        while snapshots.recv().await.is_some() {}
    }

    #[tokio::test]
    #[traced_test]
    async fn test_drop_stops_watcher() {
        let client = session();
        let watcher =
            MembershipWatcher::new(PoolConfig::new("worker-7", client, "/pools")).unwrap();
        let mut snapshots = watcher.output().unwrap();

        assert_eq!(snapshots.recv().await, Some(vec!["worker-7".to_string()]));

        drop(watcher);

        assert_eq!(snapshots.recv().await, None);
        assert!(logs_contain("Stopping membership watcher worker-7"));
    }
}
