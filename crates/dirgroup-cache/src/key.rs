//! Cache keys.
//!
//! Keys have the form `{providerKey}{kind}{discriminator}` where `kind` is
//! `k` for the unique group key and `n` for `<siteId>_<name>`.

use std::fmt;

use dirgroup_model::Group;

/// Key of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for lookups by unique group key.
    #[must_use]
    pub fn by_key(provider_key: &str, group_key: &str) -> Self {
        Self(format!("{provider_key}k{group_key}"))
    }

    /// Key for lookups by site and name.
    #[must_use]
    pub fn by_name(provider_key: &str, site_id: i32, name: &str) -> Self {
        Self(format!("{provider_key}n{site_id}_{name}"))
    }

    /// Both keys a resolved group is stored under.
    #[must_use]
    pub fn for_group(group: &Group) -> [Self; 2] {
        [
            Self::by_key(&group.provider_key, &group.key),
            Self::by_name(&group.provider_key, group.site_id, &group.name),
        ]
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
