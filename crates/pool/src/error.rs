//! Error and terminal-status types for membership watchers.

use proven_coordination::CoordinatorErrorKind;
use thiserror::Error;

/// Errors reported by a membership watcher.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum PoolError {
    /// The watcher configuration is unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The watcher was constructed outside of a tokio runtime.
    #[error("membership watcher must be created inside a tokio runtime")]
    NoRuntime,

    /// An ancestor of the pool path could not be checked or created.
    #[error("failed to ensure {path} exists ({kind}): {message}")]
    Bootstrap {
        /// The ancestor path being ensured.
        path: String,
        /// Kind of the backend error.
        kind: CoordinatorErrorKind,
        /// Backend error message.
        message: String,
    },

    /// The member node could not be created.
    #[error("failed to register member node {path} ({kind}): {message}")]
    Registration {
        /// Path of the member node.
        path: String,
        /// Kind of the backend error.
        kind: CoordinatorErrorKind,
        /// Backend error message.
        message: String,
    },
}

/// Why a membership watcher stopped.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TerminalReason {
    /// `stop` was requested (or the watcher handle was dropped).
    Stopped,

    /// The pool's ancestor hierarchy could not be ensured.
    BootstrapFailed(PoolError),

    /// The member node could not be created; no snapshot was ever published.
    RegistrationFailed(PoolError),

    /// The background task ended without reporting a reason.
    Aborted,
}

/// Lifecycle status of a membership watcher.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WatcherStatus {
    /// The background task is still running.
    Running,

    /// The background task has exited and the snapshot stream is closed.
    Stopped(TerminalReason),
}
