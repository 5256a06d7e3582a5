//! Change-wait coordination
//!
//! Turns a best-effort mutation subscription into "the next value of this key,
//! or whatever is stored once the timeout elapses".

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::domain::DomainError;
use crate::domain::cache::{
    CacheStore, MutationKind, MutationNotifier, MutationSubscription, StorageKey,
};
use crate::infrastructure::observability::record_wait_resolution;

/// How a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResolution {
    /// A write notification arrived; the value was re-read
    Set,
    /// A removal notification arrived; no read was made
    Removed,
    /// The timeout elapsed first; the value was read as it stands
    Timeout,
}

impl WaitResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Removed => "removed",
            Self::Timeout => "timeout",
        }
    }
}

impl From<MutationKind> for WaitResolution {
    fn from(kind: MutationKind) -> Self {
        match kind {
            MutationKind::Set => Self::Set,
            MutationKind::Removed => Self::Removed,
        }
    }
}

/// Result of a completed wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitOutcome {
    pub resolution: WaitResolution,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitState {
    Waiting,
    Resolved(WaitResolution),
    Failed,
}

/// One in-flight wait: owns its subscription and timer
///
/// `release` closes the subscription; if the owning future is dropped before
/// that, dropping the handle drops the subscription with it.
struct WaitHandle {
    subscription: Box<dyn MutationSubscription>,
    state: WaitState,
}

impl WaitHandle {
    async fn open(notifier: &dyn MutationNotifier, key: &StorageKey) -> Result<Self, DomainError> {
        let subscription = notifier.watch(key).await?;

        Ok(Self {
            subscription,
            state: WaitState::Waiting,
        })
    }

    fn transition(&mut self, next: WaitState) {
        debug_assert_eq!(self.state, WaitState::Waiting, "wait resolved twice");
        self.state = next;
    }

    async fn resolve(
        &mut self,
        store: &dyn CacheStore,
        key: &StorageKey,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome, DomainError> {
        let result = self.race(timeout, cancel).await;

        let resolution = match result {
            Ok(resolution) => resolution,
            Err(e) => {
                self.transition(WaitState::Failed);
                return Err(e);
            }
        };
        self.transition(WaitState::Resolved(resolution));

        let value = match resolution {
            WaitResolution::Removed => None,
            WaitResolution::Set | WaitResolution::Timeout => store.get(key).await?,
        };

        Ok(WaitOutcome { resolution, value })
    }

    async fn race(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<WaitResolution, DomainError> {
        let timer = tokio::time::sleep(timeout);

        tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(DomainError::cancelled("wait for change was cancelled")),
            event = self.subscription.next_event() => match event? {
                Some(event) => Ok(event.kind.into()),
                None => Err(DomainError::subscription("notification stream ended")),
            },
            _ = timer => Ok(WaitResolution::Timeout),
        }
    }

    async fn release(mut self) {
        if let Err(e) = self.subscription.close().await {
            warn!(error = %e, state = ?self.state, "Failed to close mutation subscription");
        }
    }
}

/// Blocks a caller until a key changes or a timeout elapses
#[derive(Clone)]
pub struct ChangeWaitCoordinator {
    store: Arc<dyn CacheStore>,
    notifier: Arc<dyn MutationNotifier>,
}

impl fmt::Debug for ChangeWaitCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeWaitCoordinator")
            .field("store", &self.store)
            .field("notifier", &self.notifier)
            .finish()
    }
}

impl ChangeWaitCoordinator {
    pub fn new(store: Arc<dyn CacheStore>, notifier: Arc<dyn MutationNotifier>) -> Self {
        Self { store, notifier }
    }

    /// Waits for the next mutation of `key`
    ///
    /// The subscription is opened before anything else, so a write landing
    /// after this call starts is either delivered or caught by the read at
    /// timeout. The subscription is closed on every exit path.
    #[instrument(skip(self, cancel), fields(key = %key, wait_id = %uuid::Uuid::new_v4()))]
    pub async fn wait_for_change(
        &self,
        key: &StorageKey,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome, DomainError> {
        let started = Instant::now();

        let mut handle = WaitHandle::open(self.notifier.as_ref(), key).await?;
        let result = handle
            .resolve(self.store.as_ref(), key, timeout, cancel)
            .await;
        handle.release().await;

        match &result {
            Ok(outcome) => {
                record_wait_resolution(outcome.resolution.as_str(), started.elapsed());
                debug!(
                    resolution = outcome.resolution.as_str(),
                    found = outcome.value.is_some(),
                    "Wait for change resolved"
                );
            }
            Err(e) => debug!(error = %e, "Wait for change failed"),
        }

        result
    }
}
