//! Member resolution.
//!
//! Static groups list member references; each one is looked up in the user
//! directory, either as a DN or as a value of the configured user attribute.
//! Dynamic groups store LDAP URLs whose results are unioned by user key.
//! Lookups that fail or find nobody are logged and left out of the result.

use std::sync::Arc;

use dirgroup_federation::UserDirectory;
use dirgroup_model::{MemberMap, Principal};
use tracing::{debug, warn};

use crate::config::{LdapGroupConfig, MemberReference};
use crate::search::LdapEntry;

/// Resolves the member set of a group entry.
#[derive(Clone)]
pub struct MembershipResolver {
    members_attribute: String,
    dynamic_members_attribute: String,
    reference: MemberReference,
    users: Arc<dyn UserDirectory>,
}

impl MembershipResolver {
    /// Creates a resolver for the configured member attributes.
    #[must_use]
    pub fn new(config: &LdapGroupConfig, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            members_attribute: config.members_attribute.clone(),
            dynamic_members_attribute: config.dynamic_members_attribute.clone(),
            reference: config.member_reference(),
            users,
        }
    }

    /// The user directory members are resolved against.
    #[must_use]
    pub fn users(&self) -> &Arc<dyn UserDirectory> {
        &self.users
    }

    /// Attribute read for a group of the given kind.
    #[must_use]
    pub fn member_attribute(&self, dynamic: bool) -> &str {
        if dynamic {
            &self.dynamic_members_attribute
        } else {
            &self.members_attribute
        }
    }

    /// Resolves the members of `entry`. A missing member attribute yields an
    /// empty map.
    pub async fn resolve(&self, entry: &LdapEntry, dynamic: bool) -> MemberMap {
        let Some(values) = entry.get_attrs(self.member_attribute(dynamic)) else {
            debug!(dn = %entry.dn, dynamic, "group has no member attribute");
            return MemberMap::new();
        };

        if dynamic {
            self.resolve_urls(values).await
        } else {
            self.resolve_references(values).await
        }
    }

    /// Looks up each static member reference.
    pub async fn resolve_references(&self, values: &[String]) -> MemberMap {
        let mut members = MemberMap::new();
        for value in values {
            let lookup = match &self.reference {
                MemberReference::Dn => self.users.lookup_user_by_dn(value).await,
                MemberReference::Attribute(attr) => {
                    self.users.lookup_user_by_attribute(attr, value).await
                }
            };
            match lookup {
                Ok(Some(principal)) => insert(&mut members, principal),
                Ok(None) => debug!(member = %value, "member reference matches no user"),
                Err(e) => warn!(member = %value, error = %e, "member lookup failed"),
            }
        }
        members
    }

    /// Evaluates each member URL and unions the results.
    pub async fn resolve_urls(&self, urls: &[String]) -> MemberMap {
        let mut members = MemberMap::new();
        for url in urls {
            match self.users.search_users_by_url(url, None).await {
                Ok(found) => {
                    debug!(url = %url, count = found.len(), "evaluated member URL");
                    for principal in found {
                        insert(&mut members, principal);
                    }
                }
                Err(e) => warn!(url = %url, error = %e, "member URL evaluation failed"),
            }
        }
        members
    }
}

fn insert(members: &mut MemberMap, principal: Principal) {
    members.insert(principal.key.clone(), principal);
}
