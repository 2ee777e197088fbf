//! Reload markers.
//!
//! Short-lived "recently handled" markers keyed by name. A marker expires on
//! its own after its TTL; expired entries are dropped lazily on lookup.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

#[derive(Clone, Copy)]
struct Marker {
    expires_at: Instant,
}

impl Marker {
    fn new(ttl: Duration) -> Self {
        Self {
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Thread-safe set of TTL markers.
#[derive(Clone, Default)]
pub struct ReloadMarkers {
    markers: Arc<DashMap<String, Marker>>,
}

impl ReloadMarkers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` for `ttl`, replacing any previous expiry.
    pub fn mark(&self, key: impl Into<String>, ttl: Duration) {
        self.markers.insert(key.into(), Marker::new(ttl));
    }

    /// Whether `key` is set and not yet expired.
    pub fn is_marked(&self, key: &str) -> bool {
        let Some(marker) = self.markers.get(key).map(|m| *m) else {
            return false;
        };
        if marker.is_expired() {
            self.markers.remove(key);
            return false;
        }
        true
    }

    /// Set `key` unless it is already set. Returns `true` if this call set it.
    pub fn try_mark(&self, key: &str, ttl: Duration) -> bool {
        use dashmap::mapref::entry::Entry;

        match self.markers.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(Marker::new(ttl));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Marker::new(ttl));
                true
            }
        }
    }

    pub fn clear(&self, key: &str) {
        self.markers.remove(key);
    }

    /// Drop every expired marker and return how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.markers.len();
        self.markers.retain(|_, marker| !marker.is_expired());
        before - self.markers.len()
    }
}
