use std::{
    any::Any,
    collections::HashMap,
    fmt,
    future::Future,
    path::Path,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::error::{CacheError, Result};

/// Identity of a unit of work eligible for deduplication.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct OperationKey {
    resource: String,
    operation: String,
}

impl OperationKey {
    pub fn new(
        resource: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Self {
            resource: resource.into(),
            operation: operation.into(),
        }
    }

    /// Key for an operation touching a single path.
    pub fn for_path(path: &Path, operation: &str) -> Self {
        Self::new(path.to_string_lossy(), operation)
    }

    /// Key for an operation touching a source and a destination path.
    pub fn for_pair(from: &Path, to: &Path, operation: &str) -> Self {
        Self::new(
            format!("{}_{}", from.to_string_lossy(), to.to_string_lossy()),
            operation,
        )
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl fmt::Debug for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OperationKey")
            .field(&self.operation)
            .field(&self.resource)
            .finish()
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operation, self.resource)
    }
}

/// What happens when an operation is submitted while an identical one is
/// still in flight.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DedupPolicy {
    /// The duplicate caller waits and receives the same outcome as the
    /// caller that started the operation.
    #[default]
    Join,
    /// The duplicate caller fails immediately with
    /// [`CacheError::AlreadyInProgress`].
    Reject,
}

type Outcome<T> = Result<T>;
type OutcomeRx<T> = watch::Receiver<Option<Outcome<T>>>;
type OutcomeTx<T> = watch::Sender<Option<Outcome<T>>>;

/// Point-in-time counters, mostly useful in logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub leaders: u64,
    pub joined: u64,
    pub rejected: u64,
    pub in_flight: usize,
}

struct Inner {
    policy: DedupPolicy,
    // Each slot holds an `OutcomeRx<T>` for the `T` its operation produces.
    active: Mutex<HashMap<OperationKey, Box<dyn Any + Send + Sync>>>,
    leaders: AtomicU64,
    joined: AtomicU64,
    rejected: AtomicU64,
}

impl Inner {
    fn active(
        &self,
    ) -> std::sync::MutexGuard<
        '_,
        HashMap<OperationKey, Box<dyn Any + Send + Sync>>,
    > {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Registration<T> {
    Leader(OutcomeTx<T>, OutcomeRx<T>),
    Follower(OutcomeRx<T>),
}

/// Single-flight coordinator: at most one execution in flight per
/// [`OperationKey`].
///
/// The coordinator is a cheap handle; clone it and pass it to every component
/// that must serialize work on shared paths. Actions are spawned onto the
/// Tokio runtime and run to completion even if every caller stops waiting.
/// The pending entry is removed exactly once, after the action settles (or
/// unwinds).
#[derive(Clone)]
pub struct OperationCoordinator {
    inner: Arc<Inner>,
}

impl fmt::Debug for OperationCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("OperationCoordinator")
            .field("policy", &self.inner.policy)
            .field("in_flight", &stats.in_flight)
            .field("leaders", &stats.leaders)
            .field("joined", &stats.joined)
            .field("rejected", &stats.rejected)
            .finish()
    }
}

impl Default for OperationCoordinator {
    fn default() -> Self {
        Self::new(DedupPolicy::default())
    }
}

impl OperationCoordinator {
    pub fn new(policy: DedupPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                policy,
                active: Mutex::new(HashMap::new()),
                leaders: AtomicU64::new(0),
                joined: AtomicU64::new(0),
                rejected: AtomicU64::new(0),
            }),
        }
    }

    pub fn policy(&self) -> DedupPolicy {
        self.inner.policy
    }

    pub fn is_in_flight(&self, key: &OperationKey) -> bool {
        self.inner.active().contains_key(key)
    }

    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            leaders: self.inner.leaders.load(Ordering::Relaxed),
            joined: self.inner.joined.load(Ordering::Relaxed),
            rejected: self.inner.rejected.load(Ordering::Relaxed),
            in_flight: self.inner.active().len(),
        }
    }

    /// Run `action` unless an operation with the same key is already in
    /// flight, in which case the configured [`DedupPolicy`] decides.
    ///
    /// Every operation submitted under a given key must produce the same `T`;
    /// the operation name inside the key is what keeps result types apart.
    pub async fn submit<T, F, Fut>(
        &self,
        key: OperationKey,
        action: F,
    ) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut rx = match self.register::<T>(&key)? {
            Registration::Leader(tx, rx) => {
                self.spawn_action(key.clone(), tx, action());
                rx
            }
            Registration::Follower(rx) => rx,
        };

        match rx.wait_for(Option::is_some).await {
            Ok(settled) => match &*settled {
                Some(outcome) => outcome.clone(),
                None => Err(CacheError::Abandoned { key }),
            },
            Err(_) => Err(CacheError::Abandoned { key }),
        }
    }

    fn register<T>(&self, key: &OperationKey) -> Result<Registration<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut active = self.inner.active();

        if let Some(slot) = active.get(key) {
            return match self.inner.policy {
                DedupPolicy::Reject => {
                    let rejected =
                        self.inner.rejected.fetch_add(1, Ordering::Relaxed)
                            + 1;
                    debug!(
                        "singleflight reject: key={}, rejected={}",
                        key, rejected
                    );
                    Err(CacheError::AlreadyInProgress { key: key.clone() })
                }
                DedupPolicy::Join => {
                    let rx = slot
                        .downcast_ref::<OutcomeRx<T>>()
                        .cloned()
                        .ok_or_else(|| {
                            CacheError::Internal(format!(
                                "operation {key} joined with a mismatched result type"
                            ))
                        })?;
                    let joined =
                        self.inner.joined.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(
                        "singleflight join: key={}, joined={}",
                        key, joined
                    );
                    Ok(Registration::Follower(rx))
                }
            };
        }

        let (tx, rx) = watch::channel(None);
        active.insert(key.clone(), Box::new(rx.clone()));
        let leaders = self.inner.leaders.fetch_add(1, Ordering::Relaxed) + 1;
        debug!("singleflight lead: key={}, leaders={}", key, leaders);
        Ok(Registration::Leader(tx, rx))
    }

    fn spawn_action<T, Fut>(
        &self,
        key: OperationKey,
        tx: OutcomeTx<T>,
        action: Fut,
    ) where
        T: Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let guard = SettleGuard {
            inner: Arc::clone(&self.inner),
            key,
        };
        tokio::spawn(async move {
            let outcome = action.await;
            // Free the key before publishing so a caller that observes the
            // outcome can immediately resubmit.
            drop(guard);
            let _ = tx.send(Some(outcome));
        });
    }
}

/// Removes the pending entry when dropped, including during unwinding.
struct SettleGuard {
    inner: Arc<Inner>,
    key: OperationKey,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        self.inner.active().remove(&self.key);
        debug!("singleflight complete: key={}", self.key);
    }
}
