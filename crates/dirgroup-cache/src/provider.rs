//! Group cache provider trait.

use std::sync::Arc;

use dirgroup_model::Group;

use crate::key::CacheKey;

/// Outcome of a cache read.
#[derive(Debug, Clone)]
pub enum CacheLookup {
    /// A resolved group is cached under the key.
    Hit(Arc<Group>),
    /// The key was confirmed absent in the directory.
    Absent,
    /// Nothing is known about the key.
    Miss,
}

impl CacheLookup {
    /// Returns the cached group, if any.
    #[must_use]
    pub fn group(&self) -> Option<&Arc<Group>> {
        match self {
            Self::Hit(group) => Some(group),
            Self::Absent | Self::Miss => None,
        }
    }

    /// Returns `true` for a negative entry.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Two-tier group cache.
///
/// Implementations must be thread-safe. A key never holds a positive and a
/// negative entry at the same time once a write has completed; concurrent
/// writers for the same key resolve last-writer-wins.
pub trait GroupCacheProvider: Send + Sync {
    /// Reads an entry.
    fn get(&self, key: &CacheKey) -> CacheLookup;

    /// Stores a group under both of its keys and clears any negative entry
    /// for either key.
    fn populate(&self, group: Arc<Group>);

    /// Records a key as absent. Has no effect if a positive entry exists.
    fn mark_absent(&self, key: &CacheKey);

    /// Removes both positive entries of a group.
    fn invalidate(&self, group: &Group);

    /// Drops every entry of both tiers.
    fn clear(&self);
}
