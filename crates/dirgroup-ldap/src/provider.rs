//! LDAP group provider.
//!
//! Entry point tying together the cache, the directory searches, entry
//! translation, member resolution and membership closure. Directory failures
//! never cross this API: lookups degrade to "not found", listings and member
//! sets to empty collections.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dirgroup_cache::{CacheKey, CacheLookup, GroupCacheProvider};
use dirgroup_federation::{GroupGraph, UserDirectory};
use dirgroup_model::{Group, MemberMap, UserPrincipal};
use tracing::{debug, info, instrument, warn};

use crate::closure::MembershipClosureWalker;
use crate::config::LdapGroupConfig;
use crate::connection::{DirectoryConnector, LdapConnector};
use crate::error::{FailureClass, LdapError, LdapResult};
use crate::filter::FilterBuilder;
use crate::membership::MembershipResolver;
use crate::search::{GroupSearcher, LdapEntry, SearchResponse};
use crate::translator::EntryTranslator;

/// Read-only group provider backed by an LDAP directory.
pub struct LdapGroupProvider {
    config: Arc<LdapGroupConfig>,
    connector: Arc<dyn DirectoryConnector>,
    cache: Arc<dyn GroupCacheProvider>,
    filters: FilterBuilder,
    translator: EntryTranslator,
    closure: MembershipClosureWalker,
}

impl LdapGroupProvider {
    /// Creates a provider on an existing connector.
    ///
    /// ## Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn new(
        config: LdapGroupConfig,
        connector: Arc<dyn DirectoryConnector>,
        cache: Arc<dyn GroupCacheProvider>,
        users: Arc<dyn UserDirectory>,
        graph: Arc<dyn GroupGraph>,
    ) -> LdapResult<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let resolver = MembershipResolver::new(&config, Arc::clone(&users));
        let translator = EntryTranslator::new(&config, resolver);
        let closure = MembershipClosureWalker::new(
            Arc::clone(&config),
            Arc::clone(&connector),
            users,
            graph,
        );

        Ok(Self {
            filters: FilterBuilder::from_config(&config),
            config,
            connector,
            cache,
            translator,
            closure,
        })
    }

    /// Creates a provider talking to the configured directory through `ldap3`.
    ///
    /// ## Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn with_ldap(
        config: LdapGroupConfig,
        cache: Arc<dyn GroupCacheProvider>,
        users: Arc<dyn UserDirectory>,
        graph: Arc<dyn GroupGraph>,
    ) -> LdapResult<Self> {
        let connector = Arc::new(LdapConnector::new(Arc::new(config.clone())));
        Self::new(config, connector, cache, users, graph)
    }

    /// Returns the provider key.
    #[must_use]
    pub fn provider_key(&self) -> &str {
        &self.config.provider_key
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LdapGroupConfig {
        &self.config
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Looks up a group by key. A `{providerKey}` prefix is ignored.
    #[instrument(skip(self), fields(provider = %self.config.provider_key))]
    pub async fn lookup_group(&self, key: &str) -> Option<Arc<Group>> {
        let key = self.strip_prefix(key);
        let cache_key = CacheKey::by_key(&self.config.provider_key, key);

        match self.cache.get(&cache_key) {
            CacheLookup::Hit(group) => Some(group),
            CacheLookup::Absent => None,
            CacheLookup::Miss => self.resolve(key, &cache_key, None).await,
        }
    }

    /// Looks up a group by site and name. The group is scoped to `site_id`.
    #[instrument(skip(self), fields(provider = %self.config.provider_key))]
    pub async fn lookup_group_by_name(&self, site_id: i32, name: &str) -> Option<Arc<Group>> {
        let cache_key = CacheKey::by_name(&self.config.provider_key, site_id, name);

        match self.cache.get(&cache_key) {
            CacheLookup::Hit(group) => Some(group),
            CacheLookup::Absent => None,
            CacheLookup::Miss => self.resolve(name, &cache_key, Some(site_id)).await,
        }
    }

    /// Whether a group with this name exists for the site.
    pub async fn group_exists(&self, site_id: i32, name: &str) -> bool {
        self.lookup_group_by_name(site_id, name).await.is_some()
    }

    /// Publishes a group to the cache under both of its keys.
    pub fn update_cache(&self, group: Arc<Group>) {
        debug!(group = %group.key, site = group.site_id, "updating cached group");
        self.cache.populate(group);
    }

    async fn resolve(
        &self,
        identity: &str,
        requested: &CacheKey,
        site_id: Option<i32>,
    ) -> Option<Arc<Group>> {
        if self.config.is_reserved(identity) {
            debug!(group = %identity, "reserved group name, not querying directory");
            self.cache.mark_absent(requested);
            return None;
        }

        match self.fetch_group(identity).await {
            Ok(Some(group)) => {
                let group = match site_id {
                    Some(site_id) => group.with_site(site_id),
                    None => group,
                };
                let group = Arc::new(group);
                self.cache.populate(Arc::clone(&group));
                Some(group)
            }
            Ok(None) => {
                debug!(group = %identity, "group not found in directory");
                self.cache.mark_absent(requested);
                None
            }
            Err(e) => {
                self.log_failure("group lookup", &e);
                None
            }
        }
    }

    async fn fetch_group(&self, identity: &str) -> LdapResult<Option<Group>> {
        let Some(entry) = self.fetch_entry(identity).await? else {
            return Ok(None);
        };
        Ok(self.translator.translate(&entry).await)
    }

    async fn fetch_entry(&self, identity: &str) -> LdapResult<Option<LdapEntry>> {
        let filter = self
            .filters
            .by_attribute(&self.config.identity_attribute, identity);
        let response = self.search(&filter, &[]).await?;
        if let Some(class) = response.degraded {
            return Err(LdapError::Incomplete(class));
        }

        if response.entries.len() > 1 {
            info!(group = %identity, count = response.entries.len(), "multiple groups share this identity, using the first");
        }
        Ok(response.entries.into_iter().next())
    }

    // ========================================================================
    // Searches and listings
    // ========================================================================

    /// Finds groups matching criteria.
    ///
    /// Criteria map property or attribute names to values; `*` searches every
    /// wildcard attribute. Results are scoped to `site_id` and not cached.
    #[instrument(skip(self), fields(provider = %self.config.provider_key))]
    pub async fn search_groups(
        &self,
        site_id: i32,
        criteria: &BTreeMap<String, String>,
    ) -> Vec<Group> {
        let filter = self.filters.build(criteria);
        let response = match self.search(&filter, &[]).await {
            Ok(response) => response,
            Err(e) => {
                self.log_failure("group search", &e);
                return Vec::new();
            }
        };
        self.log_degraded("group search", &response);

        let mut groups = Vec::with_capacity(response.entries.len());
        for entry in &response.entries {
            if let Some(group) = self.translator.translate(entry).await {
                groups.push(group.with_site(site_id));
            }
        }
        groups
    }

    /// Keys of all groups, up to the size limit.
    #[instrument(skip(self), fields(provider = %self.config.provider_key))]
    pub async fn group_keys(&self) -> Vec<String> {
        let identity = self.config.identity_attribute.as_str();
        let filter = self.filters.object_class_filter();

        match self.search(&filter, &[identity]).await {
            Ok(response) => {
                self.log_degraded("group listing", &response);
                response
                    .entries
                    .iter()
                    .filter_map(|entry| self.translator.group_key(entry))
                    .map(ToString::to_string)
                    .collect()
            }
            Err(e) => {
                self.log_failure("group listing", &e);
                Vec::new()
            }
        }
    }

    /// Names of all groups. Directory groups are named by their key.
    pub async fn group_names(&self) -> Vec<String> {
        self.group_keys().await
    }

    // ========================================================================
    // Members
    // ========================================================================

    /// Resolves the members of a group straight from the directory.
    #[instrument(skip(self), fields(provider = %self.config.provider_key))]
    pub async fn group_members(&self, key: &str) -> MemberMap {
        match self.fetch_members(self.strip_prefix(key)).await {
            Ok(members) => members.unwrap_or_default(),
            Err(e) => {
                self.log_failure("member lookup", &e);
                MemberMap::new()
            }
        }
    }

    /// Returns `group` with resolved members.
    ///
    /// A group that is not preloaded is re-read, resolved and published to the
    /// cache as a new value. On failure the group is returned unchanged.
    pub async fn ensure_members(&self, group: Arc<Group>) -> Arc<Group> {
        if group.preloaded {
            return group;
        }

        match self.fetch_members(&group.key).await {
            Ok(Some(members)) => {
                let resolved = Arc::new(Group::clone(&group).with_members(members));
                self.cache.populate(Arc::clone(&resolved));
                resolved
            }
            Ok(None) => {
                debug!(group = %group.key, "group vanished before member resolution");
                group
            }
            Err(e) => {
                self.log_failure("member lookup", &e);
                group
            }
        }
    }

    async fn fetch_members(&self, key: &str) -> LdapResult<Option<MemberMap>> {
        let Some(entry) = self.fetch_entry(key).await? else {
            return Ok(None);
        };
        let attributes = self.translator.translate_attributes(&entry);
        let dynamic = self.translator.is_dynamic(&attributes);
        Ok(Some(self.translator.resolver().resolve(&entry, dynamic).await))
    }

    /// Identifiers of every group `user` belongs to, directly or through
    /// nested groups.
    ///
    /// Users of other providers belong to no group of this provider.
    #[instrument(skip(self, user), fields(provider = %self.config.provider_key, user = %user.key()))]
    pub async fn user_membership(&self, user: &UserPrincipal) -> Arc<BTreeSet<String>> {
        if user.principal().provider_key != self.config.provider_key {
            return Arc::new(BTreeSet::new());
        }
        self.closure.closure(user).await
    }

    // ========================================================================
    // Unsupported writes and health
    // ========================================================================

    /// Groups cannot be created in the directory.
    ///
    /// ## Errors
    ///
    /// Always returns [`LdapError::NotSupported`].
    pub fn create_group(&self, _site_id: i32, name: &str) -> LdapResult<Group> {
        warn!(group = %name, "group creation is not supported by the LDAP provider");
        Err(LdapError::not_supported("create_group"))
    }

    /// Groups cannot be deleted from the directory.
    ///
    /// ## Errors
    ///
    /// Always returns [`LdapError::NotSupported`].
    pub fn delete_group(&self, group: &Group) -> LdapResult<()> {
        warn!(group = %group.key, "group deletion is not supported by the LDAP provider");
        Err(LdapError::not_supported("delete_group"))
    }

    /// Opens and closes one session.
    ///
    /// ## Errors
    ///
    /// Returns the connection or bind failure.
    pub async fn test_connection(&self) -> LdapResult<()> {
        let mut session = self.connector.open().await?;
        session.close().await;
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn search(&self, filter: &str, attributes: &[&str]) -> LdapResult<SearchResponse> {
        debug!(filter = %filter, "searching groups");
        let mut session = self.connector.open().await?;
        let response = GroupSearcher::new(&mut *session, &self.config)
            .search(filter, attributes)
            .await;
        session.close().await;
        response
    }

    fn strip_prefix<'k>(&self, key: &'k str) -> &'k str {
        let prefix = self.config.key_prefix();
        key.strip_prefix(prefix.as_str()).unwrap_or(key)
    }

    fn log_degraded(&self, operation: &str, response: &SearchResponse) {
        match response.degraded {
            Some(FailureClass::SizeLimited) => debug!(
                operation,
                limit = self.config.size_limit,
                "search exceeded the size limit, keeping the first results"
            ),
            Some(FailureClass::PartialResult) => {
                warn!(operation, "directory returned a partial result")
            }
            Some(class) => warn!(operation, ?class, "search degraded"),
            None => {}
        }
    }

    fn log_failure(&self, operation: &str, error: &LdapError) {
        match error.class() {
            FailureClass::Transient => {
                debug!(operation, error = %error, "directory unavailable, returning empty result")
            }
            FailureClass::SizeLimited => warn!(
                operation,
                limit = self.config.size_limit,
                error = %error,
                "search exceeded the size limit"
            ),
            FailureClass::PartialResult | FailureClass::Fatal => {
                warn!(operation, error = %error, "directory operation failed")
            }
        }
    }
}
