//! Shared key/value store seam.
//!
//! The reservation log and the consumption counter both sit on this trait.
//! In production the implementation is a cache cluster shared by every
//! instance of a deployment; [`InMemoryKeyValueStore`] provides the same
//! contract in-process for embedded use and tests. Counter values are stored
//! as decimal strings so both implementations agree on what an increment
//! means.

use crate::core::error::{CastorError, CastorResult};
use crate::core::time::SharedClock;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

/// Shared, cross-instance key/value store.
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key`, if present and not expired.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: Vec<u8>);

    /// Store `value` under `key` only if the key is absent.
    ///
    /// Returns `true` when the value was stored. This is the linearizable
    /// check-and-set the reservation protocol relies on.
    fn set_if_absent(&self, key: &str, value: Vec<u8>) -> bool;

    /// Remove `key`. Returns `true` when a value was removed.
    fn delete(&self, key: &str) -> bool;

    /// Atomically add `delta` to the integer stored under `key`.
    ///
    /// A missing key counts as zero; `ttl` is applied only when the key is
    /// created by this call. Returns the new value.
    fn increment_by(&self, key: &str, delta: u64, ttl: Option<Duration>) -> CastorResult<u64>;

    /// All live entries whose key starts with `prefix`.
    fn scan_prefix(&self, prefix: &str) -> Vec<(String, Vec<u8>)>;
}

struct Entry {
    value: Vec<u8>,
    expires_at_ms: Option<u64>,
}

impl Entry {
    fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at_ms.is_some_and(|at| now_ms >= at)
    }
}

/// In-process [`KeyValueStore`] with clock-driven expiry.
pub struct InMemoryKeyValueStore {
    entries: RwLock<HashMap<String, Entry>>,
    clock: SharedClock,
}

impl InMemoryKeyValueStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Drop every expired entry. Expiry is otherwise lazy, applied per read.
    pub fn purge_expired(&self) {
        let now_ms = self.clock.now_ms();
        self.entries.write().retain(|_, e| !e.is_expired(now_ms));
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now_ms = self.clock.now_ms();
        self.entries
            .read()
            .values()
            .filter(|e| !e.is_expired(now_ms))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now_ms = self.clock.now_ms();
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|e| !e.is_expired(now_ms))
            .map(|e| e.value.clone())
    }

    fn set(&self, key: &str, value: Vec<u8>) {
        self.entries.write().insert(
            key.to_string(),
            Entry {
                value,
                expires_at_ms: None,
            },
        );
    }

    fn set_if_absent(&self, key: &str, value: Vec<u8>) -> bool {
        let now_ms = self.clock.now_ms();
        let mut entries = self.entries.write();
        match entries.get(key) {
            Some(existing) if !existing.is_expired(now_ms) => false,
            _ => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value,
                        expires_at_ms: None,
                    },
                );
                true
            }
        }
    }

    fn delete(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    fn increment_by(&self, key: &str, delta: u64, ttl: Option<Duration>) -> CastorResult<u64> {
        let now_ms = self.clock.now_ms();
        let mut entries = self.entries.write();
        let current = match entries.get(key) {
            Some(existing) if !existing.is_expired(now_ms) => {
                let text = std::str::from_utf8(&existing.value)
                    .map_err(|_| CastorError::storage(format!("counter {key} is not numeric")))?;
                let value: u64 = text
                    .parse()
                    .map_err(|_| CastorError::storage(format!("counter {key} is not numeric")))?;
                Some((value, existing.expires_at_ms))
            }
            _ => None,
        };
        let (next, expires_at_ms) = match current {
            Some((value, expires_at_ms)) => (value + delta, expires_at_ms),
            None => (
                delta,
                ttl.map(|ttl| now_ms + ttl.as_millis() as u64),
            ),
        };
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string().into_bytes(),
                expires_at_ms,
            },
        );
        Ok(next)
    }

    fn scan_prefix(&self, prefix: &str) -> Vec<(String, Vec<u8>)> {
        let now_ms = self.clock.now_ms();
        self.entries
            .read()
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired(now_ms))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }
}
