use std::sync::Arc;
use std::time::Duration;

use proven_coordination::Coordinator;

use crate::error::PoolError;

/// Default delay before retrying a failed membership fetch
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Configuration of a [`MembershipWatcher`](crate::MembershipWatcher).
#[derive(Debug)]
pub struct PoolConfig<C>
where
    C: Coordinator,
{
    /// Member id, unique per process instance.
    pub id: String,

    /// Connected coordination client. Shared with the caller; the watcher
    /// never closes it.
    pub client: Arc<C>,

    /// Absolute path under which the pool tree lives.
    pub root: String,

    /// Fixed delay between attempts when fetching the member list fails.
    pub retry_interval: Duration,
}

impl<C> PoolConfig<C>
where
    C: Coordinator,
{
    /// Creates a config using the default retry interval.
    pub fn new(id: impl Into<String>, client: Arc<C>, root: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            client,
            root: root.into(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }

    /// Overrides the delay between failed membership fetches.
    #[must_use]
    pub const fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), PoolError> {
        if self.id.is_empty() {
            return Err(PoolError::Configuration("member id is empty".to_string()));
        }

        if self.id.contains('/') {
            return Err(PoolError::Configuration(format!(
                "member id '{}' contains '/'",
                self.id
            )));
        }

        if !self.root.starts_with('/') {
            return Err(PoolError::Configuration(format!(
                "root '{}' is not an absolute path",
                self.root
            )));
        }

        if self.retry_interval.is_zero() {
            return Err(PoolError::Configuration(
                "retry interval must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}
