//! Exclusive lease lock
//!
//! A lease is a store key holding a random owner token with a TTL. Acquire is
//! a single set-if-absent; release and extend are atomic compare operations,
//! so only the token returned by `acquire` can end or renew its own lease.
//!
//! ```text
//! FREE --acquire--> HELD --release(token)--> FREE
//!                   HELD --ttl elapses-----> FREE
//! ```
//!
//! Nothing here blocks, polls or retries. A lease that outlives its holder
//! simply lapses when the TTL runs out.

use crate::config::LockConfig;
use crate::error::{LockError, LockResult};
use keel_core::AtomicStore;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Owner token for a held lease
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseToken(String);

impl LeaseToken {
    /// Generate a fresh random token
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the token text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for LeaseToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl std::fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lease TTLs travel to the store in whole milliseconds.
fn lease_ttl(ttl: Duration) -> LockResult<Duration> {
    let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
    if millis == 0 {
        return Err(LockError::InvalidTtl);
    }
    Ok(Duration::from_millis(millis))
}

/// Lease lock over a shared atomic store
pub struct LeaseLock {
    store: Arc<dyn AtomicStore>,
    config: LockConfig,
}

impl LeaseLock {
    /// Create a lock with the default configuration
    pub fn new(store: Arc<dyn AtomicStore>) -> Self {
        Self::with_config(store, LockConfig::default())
    }

    /// Create a lock with a custom configuration
    pub fn with_config(store: Arc<dyn AtomicStore>, config: LockConfig) -> Self {
        Self { store, config }
    }

    /// Get the configuration
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    fn key(&self, name: &str) -> String {
        format!("{}:{}", self.config.key_prefix, name)
    }

    /// Try once to take the lease on `name`.
    ///
    /// Returns `None` if a live lease is held by anyone, including this
    /// process under an older token.
    pub async fn acquire(&self, name: &str, ttl: Duration) -> LockResult<Option<LeaseToken>> {
        let ttl = lease_ttl(ttl)?;
        let token = LeaseToken::generate();

        if self
            .store
            .set_if_absent(&self.key(name), token.as_str(), ttl)
            .await?
        {
            info!(lock = %name, ttl_ms = ttl.as_millis() as u64, "Acquired lock");
            Ok(Some(token))
        } else {
            debug!(lock = %name, "Failed to acquire lock (already held)");
            Ok(None)
        }
    }

    /// [`acquire`](Self::acquire) with the configured default TTL.
    pub async fn acquire_default(&self, name: &str) -> LockResult<Option<LeaseToken>> {
        self.acquire(name, self.config.default_ttl).await
    }

    /// End the lease if `token` still owns it.
    ///
    /// `false` means the lease had already expired or belongs to someone
    /// else; in either case nothing was deleted.
    pub async fn release(&self, name: &str, token: &LeaseToken) -> LockResult<bool> {
        let released = self
            .store
            .compare_and_delete(&self.key(name), token.as_str())
            .await?;

        if released {
            debug!(lock = %name, "Released lock");
        } else {
            warn!(lock = %name, "Failed to release lock (not held or expired)");
        }
        Ok(released)
    }

    /// Reset the lease TTL if `token` still owns it.
    pub async fn extend(&self, name: &str, token: &LeaseToken, ttl: Duration) -> LockResult<bool> {
        let ttl = lease_ttl(ttl)?;
        let extended = self
            .store
            .compare_and_expire(&self.key(name), token.as_str(), ttl)
            .await?;

        if extended {
            debug!(lock = %name, ttl_ms = ttl.as_millis() as u64, "Extended lock");
        } else {
            warn!(lock = %name, "Failed to extend lock (not held or expired)");
        }
        Ok(extended)
    }

    /// Current owner of `name`, if the lease is live.
    pub async fn holder(&self, name: &str) -> LockResult<Option<LeaseToken>> {
        Ok(self.store.get(&self.key(name)).await?.map(LeaseToken::from))
    }

    /// Run `f` only if the lease on `name` can be taken right now.
    ///
    /// Returns [`LockError::Contended`] without calling `f` when another
    /// owner holds the lease. Once `f` has run its output is returned even
    /// if the release afterwards fails; the lease then lapses by TTL.
    pub async fn run_exclusive<F, Fut, T>(&self, name: &str, ttl: Duration, f: F) -> LockResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let Some(token) = self.acquire(name, ttl).await? else {
            return Err(LockError::Contended(name.to_string()));
        };

        let output = f().await;

        match self.release(name, &token).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(lock = %name, "Lease expired before the guarded work finished");
            }
            Err(e) => {
                error!(lock = %name, error = %e, "Failed to release lock after guarded work");
            }
        }

        Ok(output)
    }
}

impl std::fmt::Debug for LeaseLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseLock")
            .field("backend", &self.store.backend())
            .field("config", &self.config)
            .finish()
    }
}
