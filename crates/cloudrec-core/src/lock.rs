// In-memory edit lock service
// Per-record leases with optional expiry and two acquisition policies

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use cloudrec_common::CloudRecError;

/// How an acquire request treats a live lease held by someone else
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockPolicy {
    /// Acquire always moves ownership to the caller (last writer wins)
    #[default]
    Grab,
    /// Acquire fails while another caller's lease is live
    Exclusive,
}

impl FromStr for LockPolicy {
    type Err = CloudRecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "grab" => Ok(LockPolicy::Grab),
            "exclusive" => Ok(LockPolicy::Exclusive),
            other => Err(CloudRecError::IllegalArgument(format!(
                "unknown lock policy '{}', expected grab or exclusive",
                other
            ))),
        }
    }
}

/// Current owner of a lease
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockHolder {
    pub owner: String,
    pub owner_name: String,
}

/// An acquired lease
pub(crate) struct LockEntry {
    holder: LockHolder,
    acquired_at: Instant,
    ttl: Option<Duration>,
}

impl LockEntry {
    fn is_expired(&self) -> bool {
        self.ttl.is_some_and(|ttl| self.acquired_at.elapsed() >= ttl)
    }
}

/// In-memory record lock service using DashMap
pub struct LockService {
    pub(crate) locks: Arc<DashMap<i64, LockEntry>>,
    policy: LockPolicy,
    ttl: Option<Duration>,
}

impl Default for LockService {
    fn default() -> Self {
        Self::new(LockPolicy::default(), None)
    }
}

impl LockService {
    /// Create a lock service; `ttl` of `None` means leases never expire
    pub fn new(policy: LockPolicy, ttl: Option<Duration>) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            policy,
            ttl: ttl.filter(|d| !d.is_zero()),
        }
    }

    /// Build from a millisecond lease length where `0` means indefinite
    pub fn with_lease_ms(policy: LockPolicy, lease_ttl_ms: u64) -> Self {
        Self::new(policy, Some(Duration::from_millis(lease_ttl_ms)))
    }

    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Start the background task that evicts expired leases.
    ///
    /// Returns `None` when leases never expire. Must be called inside a
    /// tokio runtime.
    pub fn spawn_sweeper(&self, period: Duration) -> Option<JoinHandle<()>> {
        self.ttl?;
        let locks = self.locks.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let removed = purge(&locks);
                if removed > 0 {
                    debug!(count = removed, "Cleaned up expired lock entries");
                }
            }
        });
        info!(?period, "LockService background expiry task started");
        Some(handle)
    }

    /// Evict expired leases now; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        purge(&self.locks)
    }

    /// Attempt to acquire the lease on `id` for `owner`.
    ///
    /// Returns the holder after the attempt, which is `owner` on success and
    /// the existing holder when an exclusive acquire is rejected.
    pub fn acquire(&self, id: i64, owner: &str, owner_name: &str) -> LockHolder {
        if self.policy == LockPolicy::Exclusive
            && let Some(existing) = self.locks.get(&id)
            && !existing.is_expired()
            && existing.holder.owner != owner
        {
            debug!(id, owner = %owner, holder = %existing.holder.owner, "Lock acquire rejected");
            return existing.holder.clone();
        }

        self.assign(id, owner, owner_name)
    }

    /// Make `owner` the holder regardless of policy
    pub fn assign(&self, id: i64, owner: &str, owner_name: &str) -> LockHolder {
        let holder = LockHolder {
            owner: owner.to_string(),
            owner_name: owner_name.to_string(),
        };
        let previous = self.locks.insert(
            id,
            LockEntry {
                holder: holder.clone(),
                acquired_at: Instant::now(),
                ttl: self.ttl,
            },
        );

        match previous {
            Some(prev) if !prev.is_expired() && prev.holder.owner != owner => {
                debug!(id, from = %prev.holder.owner, to = %owner, "Lock moved");
            }
            _ => debug!(id, owner = %owner, "Lock acquired"),
        }
        holder
    }

    /// Current live holder of `id`
    pub fn holder(&self, id: i64) -> Option<LockHolder> {
        self.locks
            .get(&id)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.holder.clone())
    }

    pub fn is_held_by(&self, id: i64, owner: &str) -> bool {
        self.holder(id).is_some_and(|h| h.owner == owner)
    }

    /// Run `f` while `owner` holds a live lease on `id`.
    ///
    /// The lease entry stays borrowed until `f` returns, so an acquire of
    /// `id` by anyone else waits for it. `f` must not touch this service.
    /// On refusal the live holder, if any, is returned.
    pub fn while_held<R>(
        &self,
        id: i64,
        owner: &str,
        f: impl FnOnce() -> R,
    ) -> Result<R, Option<LockHolder>> {
        match self.locks.get(&id) {
            Some(entry) if !entry.is_expired() && entry.holder.owner == owner => Ok(f()),
            Some(entry) if !entry.is_expired() => Err(Some(entry.holder.clone())),
            _ => Err(None),
        }
    }

    /// Restart the lease of `owner` on `id`; nothing happens for any other owner
    pub fn renew(&self, id: i64, owner: &str) -> bool {
        match self.locks.get_mut(&id) {
            Some(mut entry) if !entry.is_expired() && entry.holder.owner == owner => {
                entry.acquired_at = Instant::now();
                true
            }
            _ => false,
        }
    }

    /// Release the lease on `id`
    ///
    /// Returns `true` if the lease was released, `false` if not held by this owner
    pub fn release(&self, id: i64, owner: &str) -> bool {
        let released = self
            .locks
            .remove_if(&id, |_, entry| entry.holder.owner == owner)
            .is_some();
        if released {
            debug!(id, owner = %owner, "Lock released");
        }
        released
    }

    /// Drop any lease on `id`, used when the record itself goes away
    pub fn forget(&self, id: i64) {
        self.locks.remove(&id);
    }
}

fn purge(locks: &DashMap<i64, LockEntry>) -> usize {
    let before = locks.len();
    locks.retain(|_, entry| !entry.is_expired());
    before.saturating_sub(locks.len())
}
