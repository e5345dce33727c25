//! User membership closure.
//!
//! The closure of a user is built in three phases:
//!
//! 1. static groups whose member attribute references the user
//! 2. dynamic groups whose member URLs match the user
//! 3. groups reachable from those through the external group graph
//!
//! Directory groups are reported as `{providerKey}groupKey`, graph groups as
//! `name:siteId`. Only a closure computed without any failure is stored on
//! the user principal.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use dirgroup_federation::{GraphNode, GroupGraph, UserDirectory};
use dirgroup_model::{Principal, UserPrincipal};
use tracing::{debug, warn};

use crate::config::{LdapGroupConfig, MemberReference};
use crate::connection::{DirectoryConnector, DirectorySession};
use crate::error::{FailureClass, LdapResult};
use crate::filter::FilterBuilder;
use crate::search::GroupSearcher;

/// Result of one closure walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClosureWalk {
    /// Group identifiers reached.
    pub groups: BTreeSet<String>,
    /// Directory group keys found in phases 1 and 2.
    pub direct: Vec<String>,
    /// False when any step failed or was truncated.
    pub complete: bool,
}

impl ClosureWalk {
    fn new() -> Self {
        Self {
            complete: true,
            ..Self::default()
        }
    }
}

/// Computes transitive group membership.
pub struct MembershipClosureWalker {
    config: Arc<LdapGroupConfig>,
    filters: FilterBuilder,
    connector: Arc<dyn DirectoryConnector>,
    users: Arc<dyn UserDirectory>,
    graph: Arc<dyn GroupGraph>,
}

impl MembershipClosureWalker {
    /// Creates a walker.
    #[must_use]
    pub fn new(
        config: Arc<LdapGroupConfig>,
        connector: Arc<dyn DirectoryConnector>,
        users: Arc<dyn UserDirectory>,
        graph: Arc<dyn GroupGraph>,
    ) -> Self {
        Self {
            filters: FilterBuilder::from_config(&config),
            config,
            connector,
            users,
            graph,
        }
    }

    /// Returns the groups of `user`, reusing the closure stored on it.
    ///
    /// A directory failure yields an empty set. Nothing is stored unless the
    /// walk completed.
    pub async fn closure(&self, user: &UserPrincipal) -> Arc<BTreeSet<String>> {
        if let Some(groups) = user.cached_groups() {
            return groups;
        }

        match self.walk(user.principal()).await {
            Ok(walk) if walk.complete => user.remember_groups(walk.groups),
            Ok(walk) => {
                debug!(user = %user.key(), groups = walk.groups.len(), "closure incomplete, not caching");
                Arc::new(walk.groups)
            }
            Err(e) => {
                match e.class() {
                    FailureClass::Transient => {
                        debug!(user = %user.key(), error = %e, "directory unavailable, empty membership")
                    }
                    _ => warn!(user = %user.key(), error = %e, "membership lookup failed"),
                }
                Arc::new(BTreeSet::new())
            }
        }
    }

    /// Runs all three phases without touching the user's stored closure.
    pub async fn walk(&self, user: &Principal) -> LdapResult<ClosureWalk> {
        let mut walk = ClosureWalk::new();

        let mut session = self.connector.open().await?;
        let direct = self.direct_groups(&mut *session, user, &mut walk).await;
        session.close().await;
        direct?;

        let mut starts = Vec::new();
        for key in &walk.direct {
            match self
                .graph
                .find_external_group(&self.config.provider_key, key)
                .await
            {
                Ok(Some(node)) => starts.push(node),
                Ok(None) => {}
                Err(e) => {
                    warn!(group = %key, error = %e, "graph lookup failed");
                    walk.complete = false;
                }
            }
        }

        let nested = self.walk_graph(starts).await;
        walk.groups.extend(nested.groups);
        walk.complete &= nested.complete;

        Ok(walk)
    }

    /// Depth-first walk of containing groups.
    ///
    /// Every containing group is reported; a node is descended into at most
    /// once, start nodes included.
    pub async fn walk_graph(&self, starts: Vec<GraphNode>) -> ClosureWalk {
        let mut walk = ClosureWalk::new();
        let mut visited: HashSet<String> = starts.iter().map(|node| node.id.clone()).collect();
        let mut stack = starts;

        while let Some(node) = stack.pop() {
            match self.graph.containing_groups(&node).await {
                Ok(parents) => {
                    for parent in parents {
                        walk.groups.insert(parent.identifier());
                        if visited.insert(parent.id.clone()) {
                            stack.push(parent);
                        }
                    }
                }
                Err(e) => {
                    warn!(group = %node.identifier(), error = %e, "graph traversal failed");
                    walk.complete = false;
                }
            }
        }

        walk
    }

    async fn direct_groups(
        &self,
        session: &mut dyn DirectorySession,
        user: &Principal,
        walk: &mut ClosureWalk,
    ) -> LdapResult<()> {
        let prefix = self.config.key_prefix();
        let identity = self.config.identity_attribute.as_str();
        let mut searcher = GroupSearcher::new(session, &self.config);

        if let Some(reference) = self.member_reference(user) {
            let filter = self.filters.static_membership_filter(reference);
            let response = searcher.search(&filter, &[identity]).await?;
            walk.complete &= response.is_complete();
            for entry in &response.entries {
                if let Some(key) = entry.get_attr(identity) {
                    debug!(group = %key, "static membership");
                    walk.groups.insert(format!("{prefix}{key}"));
                    walk.direct.push(key.to_string());
                }
            }
        }

        let user_key = user.key.strip_prefix(prefix.as_str()).unwrap_or(&user.key);
        let url_attribute = self.config.dynamic_members_attribute.as_str();
        let filter = self.filters.dynamic_groups_filter();
        let response = searcher.search(&filter, &[identity, url_attribute]).await?;
        walk.complete &= response.is_complete();

        for entry in &response.entries {
            let (Some(key), Some(urls)) = (entry.get_attr(identity), entry.get_attrs(url_attribute))
            else {
                continue;
            };
            for url in urls {
                match self.users.search_users_by_url(url, Some(user_key)).await {
                    Ok(found) if !found.is_empty() => {
                        debug!(group = %key, "dynamic membership");
                        walk.groups.insert(format!("{prefix}{key}"));
                        walk.direct.push(key.to_string());
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(group = %key, url = %url, error = %e, "member URL evaluation failed");
                        walk.complete = false;
                    }
                }
            }
        }

        Ok(())
    }

    fn member_reference<'u>(&self, user: &'u Principal) -> Option<&'u str> {
        match self.config.member_reference() {
            MemberReference::Attribute(attr) => {
                user.attribute(&attr).or(user.dn.as_deref())
            }
            MemberReference::Dn => user.dn.as_deref(),
        }
    }
}
