//! Principal references.
//!
//! Members of a group are principals resolved by the user directory. A
//! `UserPrincipal` additionally carries the lazily computed set of groups the
//! user belongs to, for as long as that principal stays in memory.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A reference to a user known to a directory provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Key of the provider the principal comes from.
    pub provider_key: String,
    /// Unique key of the principal.
    pub key: String,
    /// Distinguished name, when the principal lives in a directory.
    pub dn: Option<String>,
    /// Directory attributes (first value of each).
    pub attributes: BTreeMap<String, String>,
}

impl Principal {
    /// Creates a principal with no DN and no attributes.
    #[must_use]
    pub fn new(provider_key: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            provider_key: provider_key.into(),
            key: key.into(),
            dn: None,
            attributes: BTreeMap::new(),
        }
    }

    /// Sets the distinguished name.
    #[must_use]
    pub fn with_dn(mut self, dn: impl Into<String>) -> Self {
        self.dn = Some(dn.into());
        self
    }

    /// Adds an attribute value.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Gets an attribute value.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// A user principal that remembers its resolved group closure.
#[derive(Debug)]
pub struct UserPrincipal {
    principal: Principal,
    groups: RwLock<Option<Arc<BTreeSet<String>>>>,
}

impl UserPrincipal {
    /// Wraps a principal with an empty group slot.
    #[must_use]
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            groups: RwLock::new(None),
        }
    }

    /// Returns the wrapped principal.
    #[must_use]
    pub const fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Returns the principal key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.principal.key
    }

    /// Returns the distinguished name, if any.
    #[must_use]
    pub fn dn(&self) -> Option<&str> {
        self.principal.dn.as_deref()
    }

    /// Returns the remembered group closure, if one was stored.
    #[must_use]
    pub fn cached_groups(&self) -> Option<Arc<BTreeSet<String>>> {
        self.groups.read().clone()
    }

    /// Stores a complete group closure and returns the shared handle.
    ///
    /// A later call replaces the stored closure.
    pub fn remember_groups(&self, groups: BTreeSet<String>) -> Arc<BTreeSet<String>> {
        let groups = Arc::new(groups);
        *self.groups.write() = Some(Arc::clone(&groups));
        groups
    }

    /// Drops the stored closure so the next query recomputes it.
    pub fn forget_groups(&self) {
        *self.groups.write() = None;
    }
}

impl From<Principal> for UserPrincipal {
    fn from(principal: Principal) -> Self {
        Self::new(principal)
    }
}
