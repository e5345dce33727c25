//! Group domain model.
//!
//! A group is built from exactly one directory entry. Its membership is either
//! an explicit list of member references (static) or a stored query evaluated
//! against the user directory (dynamic).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::principal::Principal;

/// Site identifier used for groups that are not scoped to a site.
pub const GLOBAL_SITE: i32 = 0;

/// Separator used when flattening multi-valued attributes.
const VALUE_SEPARATOR: char = '\n';

/// Resolved members of a group, keyed by member key.
pub type MemberMap = BTreeMap<String, Principal>;

/// How the members of a group are defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipKind {
    /// Explicit list of member references.
    #[default]
    Static,
    /// Stored search query evaluated at resolution time.
    Dynamic,
}

impl MembershipKind {
    /// Returns the kind for a dynamic flag.
    #[must_use]
    pub const fn from_dynamic(dynamic: bool) -> Self {
        if dynamic {
            Self::Dynamic
        } else {
            Self::Static
        }
    }

    /// Returns true for dynamic membership.
    #[must_use]
    pub const fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic)
    }
}

/// A group resolved from a directory.
///
/// Groups are assembled with the `with_*` methods and then published behind an
/// `Arc`. A published group is never modified; refreshing it means building a
/// new value and replacing the old one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    // === Identity ===
    /// Key of the provider that resolved this group.
    pub provider_key: String,
    /// Unique key of the group inside its provider.
    pub key: String,
    /// Group name.
    pub name: String,
    /// Site scope (`GLOBAL_SITE` for unscoped groups).
    pub site_id: i32,

    // === Attributes ===
    /// Raw attributes; multi-valued attributes are joined with line feeds.
    pub attributes: BTreeMap<String, String>,

    // === Membership ===
    /// Static or dynamic membership.
    pub kind: MembershipKind,
    /// Resolved members. Empty until resolved when `preloaded` is false.
    pub members: MemberMap,
    /// Whether `members` holds a resolved member set.
    pub preloaded: bool,
}

impl Group {
    /// Creates a global group whose name is its key.
    #[must_use]
    pub fn new(
        provider_key: impl Into<String>,
        key: impl Into<String>,
        kind: MembershipKind,
    ) -> Self {
        let key = key.into();
        Self {
            provider_key: provider_key.into(),
            name: key.clone(),
            key,
            site_id: GLOBAL_SITE,
            attributes: BTreeMap::new(),
            kind,
            members: MemberMap::new(),
            preloaded: false,
        }
    }

    /// Sets the site scope.
    #[must_use]
    pub const fn with_site(mut self, site_id: i32) -> Self {
        self.site_id = site_id;
        self
    }

    /// Sets the group name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replaces the raw attributes.
    #[must_use]
    pub fn with_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Sets a resolved member set and marks the group as preloaded.
    #[must_use]
    pub fn with_members(mut self, members: MemberMap) -> Self {
        self.members = members;
        self.preloaded = true;
        self
    }

    /// Returns the key prefixed with the provider key, e.g. `{ldap}admins`.
    #[must_use]
    pub fn qualified_key(&self) -> String {
        format!("{{{}}}{}", self.provider_key, self.key)
    }

    /// Checks if the group has dynamic membership.
    #[must_use]
    pub const fn is_dynamic(&self) -> bool {
        self.kind.is_dynamic()
    }

    /// Gets the raw (flattened) value of an attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Gets the individual values of a flattened attribute.
    #[must_use]
    pub fn attribute_values(&self, name: &str) -> Vec<&str> {
        self.attributes
            .get(name)
            .map(|v| v.split(VALUE_SEPARATOR).collect())
            .unwrap_or_default()
    }

    /// Checks if a principal key is among the resolved members.
    #[must_use]
    pub fn has_member(&self, member_key: &str) -> bool {
        self.members.contains_key(member_key)
    }
}
