//! In-process cache backed by [`DashMap`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use dirgroup_model::Group;
use serde::{Deserialize, Serialize};

use crate::key::CacheKey;
use crate::provider::{CacheLookup, GroupCacheProvider};

/// Expiry settings for [`InMemoryGroupCache`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of resolved groups. `None` keeps them until invalidated.
    #[serde(with = "humantime_serde")]
    pub positive_ttl: Option<Duration>,
    /// Lifetime of absent markers. `None` keeps them until overwritten.
    #[serde(with = "humantime_serde")]
    pub negative_ttl: Option<Duration>,
}

impl CacheConfig {
    /// Sets the positive entry lifetime.
    #[must_use]
    pub const fn with_positive_ttl(mut self, ttl: Duration) -> Self {
        self.positive_ttl = Some(ttl);
        self
    }

    /// Sets the negative entry lifetime.
    #[must_use]
    pub const fn with_negative_ttl(mut self, ttl: Duration) -> Self {
        self.negative_ttl = Some(ttl);
        self
    }
}

#[derive(Debug)]
struct Stored {
    group: Arc<Group>,
    at: Instant,
}

fn expired(at: Instant, ttl: Option<Duration>) -> bool {
    ttl.is_some_and(|ttl| at.elapsed() >= ttl)
}

/// Group cache kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryGroupCache {
    config: CacheConfig,
    groups: DashMap<CacheKey, Stored>,
    absent: DashMap<CacheKey, Instant>,
}

impl InMemoryGroupCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            groups: DashMap::new(),
            absent: DashMap::new(),
        }
    }

    /// Number of positive entries, counting both keys of each group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns `true` if no positive entry is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of absent markers.
    #[must_use]
    pub fn absent_len(&self) -> usize {
        self.absent.len()
    }

    fn read_positive(&self, key: &CacheKey) -> Option<Arc<Group>> {
        let (group, stale) = {
            let entry = self.groups.get(key)?;
            (
                Arc::clone(&entry.group),
                expired(entry.at, self.config.positive_ttl),
            )
        };
        if stale {
            self.groups
                .remove_if(key, |_, stored| expired(stored.at, self.config.positive_ttl));
            return None;
        }
        Some(group)
    }

    fn read_absent(&self, key: &CacheKey) -> bool {
        let Some(at) = self.absent.get(key).map(|entry| *entry) else {
            return false;
        };
        if expired(at, self.config.negative_ttl) {
            self.absent
                .remove_if(key, |_, at| expired(*at, self.config.negative_ttl));
            return false;
        }
        true
    }
}

impl GroupCacheProvider for InMemoryGroupCache {
    fn get(&self, key: &CacheKey) -> CacheLookup {
        if let Some(group) = self.read_positive(key) {
            return CacheLookup::Hit(group);
        }
        if self.read_absent(key) {
            return CacheLookup::Absent;
        }
        CacheLookup::Miss
    }

    // `populate` and `mark_absent` lock the `groups` shard of a key before
    // touching `absent`, so a key never ends up in both tiers.

    fn populate(&self, group: Arc<Group>) {
        let now = Instant::now();
        for key in CacheKey::for_group(&group) {
            tracing::trace!(key = %key, "caching group");
            let slot = self.groups.entry(key.clone());
            self.absent.remove(&key);
            slot.insert(Stored {
                group: Arc::clone(&group),
                at: now,
            });
        }
    }

    fn mark_absent(&self, key: &CacheKey) {
        match self.groups.entry(key.clone()) {
            Entry::Occupied(stored) if !expired(stored.get().at, self.config.positive_ttl) => {}
            slot => {
                tracing::trace!(key = %key, "caching absent marker");
                self.absent.insert(key.clone(), Instant::now());
                if let Entry::Occupied(stale) = slot {
                    stale.remove();
                }
            }
        }
    }

    fn invalidate(&self, group: &Group) {
        for key in CacheKey::for_group(group) {
            self.groups.remove(&key);
        }
    }

    fn clear(&self) {
        self.groups.clear();
        self.absent.clear();
    }
}
