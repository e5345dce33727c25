//! # dirgroup-cache
//!
//! Group cache abstraction for directory group providers.
//!
//! ## Tiers
//!
//! - positive entries hold resolved groups, stored under two keys (by unique
//!   key and by site and name)
//! - negative entries record keys confirmed absent so repeated lookups of a
//!   missing group never reach the directory
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use dirgroup_cache::{CacheKey, CacheLookup, GroupCacheProvider, InMemoryGroupCache};
//!
//! let cache = InMemoryGroupCache::default();
//! cache.populate(Arc::new(group));
//! match cache.get(&CacheKey::by_key("ldap", "admins")) {
//!     CacheLookup::Hit(group) => { /* ... */ }
//!     CacheLookup::Absent => { /* known missing */ }
//!     CacheLookup::Miss => { /* ask the directory */ }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod key;
pub mod memory;
pub mod provider;

pub use key::CacheKey;
pub use memory::{CacheConfig, InMemoryGroupCache};
pub use provider::{CacheLookup, GroupCacheProvider};
