//! Live membership of a named worker pool backed by a hierarchical
//! coordination service.
//!
//! A process joins the pool by constructing a [`MembershipWatcher`]. The
//! watcher ensures the pool's path hierarchy exists, registers an ephemeral
//! member node tied to the client's session, then republishes the full list
//! of members every time the pool's children change.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod error;
mod watcher;

pub use config::{DEFAULT_RETRY_INTERVAL, PoolConfig};
pub use error::{PoolError, TerminalReason, WatcherStatus};
pub use watcher::{MembershipWatcher, Snapshots};
