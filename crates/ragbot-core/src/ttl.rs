//! Key/value store with per-entry time-to-live.
//!
//! Backs the chat answer cache and the [`RateLimiter`](crate::rate_limit::RateLimiter).
//! Handlers receive it as `Arc<dyn TtlStore>`, so a shared backend can
//! replace [`MemoryTtlStore`] without touching request code.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock [`Clock`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Result of [`TtlStore::increment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    /// Value after the increment.
    pub count: u64,
    /// Time until the counter expires.
    pub resets_in: Duration,
}

#[async_trait]
pub trait TtlStore: Send + Sync {
    /// Returns the value, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Increment an integer counter. A missing or expired key starts at 1
    /// and expires after `ttl`; an existing counter keeps its expiry.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<Counter>;

    async fn remove(&self, key: &str) -> Result<()>;
}

/// Expired entries are swept on write once the map grows past this size.
const SWEEP_THRESHOLD: usize = 1024;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process [`TtlStore`].
pub struct MemoryTtlStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryTtlStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("ttl store lock poisoned"))
    }

    fn sweep(entries: &mut HashMap<String, Entry>, now: Instant) {
        if entries.len() > SWEEP_THRESHOLD {
            entries.retain(|_, e| e.expires_at > now);
        }
    }
}

impl Default for MemoryTtlStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TtlStore for MemoryTtlStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let entries = self.lock()?;
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        Self::sweep(&mut entries, now);
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<Counter> {
        let now = self.clock.now();
        let mut entries = self.lock()?;
        Self::sweep(&mut entries, now);

        let live = entries.get(key).filter(|e| e.expires_at > now);
        let (count, expires_at) = match live {
            Some(entry) => {
                let current: u64 = entry.value.parse().map_err(|_| {
                    anyhow!("ttl store key '{}' does not hold a counter", key)
                })?;
                (current + 1, entry.expires_at)
            }
            None => (1, now + ttl),
        };

        entries.insert(
            key.to_string(),
            Entry {
                value: count.to_string(),
                expires_at,
            },
        );

        Ok(Counter {
            count,
            resets_in: expires_at.saturating_duration_since(now),
        })
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// A [`Clock`] that only moves when told to. Useful in tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.lock().map(|now| *now).unwrap_or_else(|e| *e.into_inner())
    }
}
