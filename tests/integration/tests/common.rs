//! Common test utilities and fixtures.
//!
//! `FakeDirectory` understands the filter subset the provider generates
//! (`&`, `|` and equality with `*` wildcards) and the `;range=` attribute
//! option, so searches behave like a small directory server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use dirgroup_cache::InMemoryGroupCache;
use dirgroup_federation::{FederationError, FederationResult, GraphNode, GroupGraph, UserDirectory};
use dirgroup_ldap::{
    DirectoryConnector, DirectorySession, FailureClass, LdapEntry, LdapError, LdapGroupConfig,
    LdapGroupConfigBuilder, LdapGroupProvider, LdapResult, SearchRequest, SearchResponse,
};
use dirgroup_model::Principal;

pub const BASE_DN: &str = "ou=groups,dc=example,dc=com";

/// Initializes tracing once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dirgroup_ldap=debug,dirgroup_cache=trace")
        .with_test_writer()
        .try_init();
}

/// Builds a group entry under [`BASE_DN`].
pub fn group_entry(cn: &str, object_class: &str) -> LdapEntry {
    LdapEntry::new(format!("cn={cn},{BASE_DN}"))
        .with_attribute("cn", [cn])
        .with_attribute("objectClass", ["top", object_class])
}

pub fn user_dn(uid: &str) -> String {
    format!("uid={uid},ou=people,dc=example,dc=com")
}

// ============================================================================
// Directory
// ============================================================================

#[derive(Default)]
struct DirectoryState {
    entries: Mutex<Vec<LdapEntry>>,
    requests: Mutex<Vec<SearchRequest>>,
    max_values: Mutex<Option<usize>>,
    degraded: Mutex<Option<FailureClass>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    unavailable: AtomicBool,
}

/// In-memory directory server.
#[derive(Clone, Default)]
pub struct FakeDirectory {
    state: Arc<DirectoryState>,
}

impl FakeDirectory {
    pub fn new(entries: Vec<LdapEntry>) -> Self {
        let directory = Self::default();
        *directory.state.entries.lock() = entries;
        directory
    }

    /// Caps values per attribute in full-entry responses, like Active
    /// Directory's `MaxValRange`.
    pub fn with_max_values(self, max: usize) -> Self {
        *self.state.max_values.lock() = Some(max);
        self
    }

    pub fn add(&self, entry: LdapEntry) {
        self.state.entries.lock().push(entry);
    }

    /// Answers every search with an empty result of the given class.
    pub fn set_degraded(&self, class: Option<FailureClass>) {
        *self.state.degraded.lock() = class;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn searches(&self) -> usize {
        self.state.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.state.requests.lock().clone()
    }

    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryConnector for FakeDirectory {
    async fn open(&self) -> LdapResult<Box<dyn DirectorySession>> {
        if self.state.unavailable.load(Ordering::SeqCst) {
            return Err(LdapError::connection("connection refused"));
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeSession {
    state: Arc<DirectoryState>,
}

#[async_trait]
impl DirectorySession for FakeSession {
    async fn search(&mut self, request: &SearchRequest) -> LdapResult<SearchResponse> {
        self.state.requests.lock().push(request.clone());
        if let Some(class) = *self.state.degraded.lock() {
            return Ok(SearchResponse::degraded(Vec::new(), class));
        }

        let filter = Filter::parse(&request.filter)
            .ok_or_else(|| LdapError::search(87, format!("bad filter {}", request.filter)))?;
        let max_values = *self.state.max_values.lock();

        let mut entries: Vec<LdapEntry> = self
            .state
            .entries
            .lock()
            .iter()
            .filter(|entry| entry.dn.ends_with(&request.base) && filter.matches(entry))
            .map(|entry| project(entry, &request.attributes, max_values))
            .collect();

        let limit = usize::try_from(request.size_limit).unwrap_or(0);
        if limit > 0 && entries.len() > limit {
            entries.truncate(limit);
            return Ok(SearchResponse::degraded(entries, FailureClass::SizeLimited));
        }
        Ok(SearchResponse::complete(entries))
    }

    async fn close(&mut self) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}

fn project(entry: &LdapEntry, requested: &[String], max_values: Option<usize>) -> LdapEntry {
    let mut out = LdapEntry::new(entry.dn.clone());

    if requested.is_empty() || requested.iter().any(|r| r == "*") {
        for (name, values) in &entry.attributes {
            match max_values {
                Some(max) if values.len() > max => {
                    out.attributes
                        .insert(format!("{name};range=0-{}", max - 1), values[..max].to_vec());
                }
                _ => {
                    out.attributes.insert(name.clone(), values.clone());
                }
            }
        }
        return out;
    }

    for name in requested {
        if let Some((attr, range)) = name.split_once(";range=") {
            let Some(values) = entry.get_attrs(attr) else {
                continue;
            };
            let Some((low, high)) = range.split_once('-') else {
                continue;
            };
            let low: usize = low.parse().unwrap_or(0);
            if low >= values.len() {
                continue;
            }
            let high: usize = high.parse().unwrap_or(usize::MAX);
            let cap = max_values.unwrap_or(usize::MAX);
            let end = high.saturating_add(1).min(low.saturating_add(cap)).min(values.len());
            let id = if end == values.len() {
                format!("{attr};range={low}-*")
            } else {
                format!("{attr};range={low}-{}", end - 1)
            };
            out.attributes.insert(id, values[low..end].to_vec());
        } else if let Some(values) = entry.get_attrs(name) {
            out.attributes.insert(name.clone(), values.clone());
        }
    }
    out
}

enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Eq(String, String),
}

impl Filter {
    fn parse(input: &str) -> Option<Self> {
        let (filter, rest) = Self::parse_one(input)?;
        rest.is_empty().then_some(filter)
    }

    fn parse_one(input: &str) -> Option<(Self, &str)> {
        let body = input.strip_prefix('(')?;
        if let Some(mut rest) = body.strip_prefix('&').or_else(|| body.strip_prefix('|')) {
            let and = body.starts_with('&');
            let mut children = Vec::new();
            while !rest.starts_with(')') {
                let (child, next) = Self::parse_one(rest)?;
                children.push(child);
                rest = next;
            }
            let filter = if and { Self::And(children) } else { Self::Or(children) };
            return Some((filter, &rest[1..]));
        }
        let end = body.find(')')?;
        let (attr, value) = body[..end].split_once('=')?;
        let value = value
            .replace("\\28", "(")
            .replace("\\29", ")")
            .replace("\\5c", "\\");
        Some((Self::Eq(attr.to_string(), value), &body[end + 1..]))
    }

    fn matches(&self, entry: &LdapEntry) -> bool {
        match self {
            Self::And(children) => children.iter().all(|f| f.matches(entry)),
            Self::Or(children) => children.iter().any(|f| f.matches(entry)),
            Self::Eq(attr, pattern) => entry
                .get_attrs(attr)
                .is_some_and(|values| values.iter().any(|v| glob(pattern, v))),
        }
    }
}

fn glob(pattern: &str, value: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let value = value.to_ascii_lowercase();
    if !pattern.contains('*') {
        return pattern == value;
    }
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = value.as_str();
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            let Some(stripped) = rest.strip_prefix(part) else {
                return false;
            };
            rest = stripped;
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            let Some(pos) = rest.find(part) else {
                return false;
            };
            rest = &rest[pos + part.len()..];
        }
    }
    true
}

// ============================================================================
// User directory
// ============================================================================

#[derive(Default)]
pub struct FakeUsers {
    users: Vec<Principal>,
    urls: HashMap<String, Vec<String>>,
    url_searches: AtomicUsize,
}

impl FakeUsers {
    pub fn new(uids: &[&str]) -> Self {
        let users = uids
            .iter()
            .map(|uid| {
                Principal::new("ldap", *uid)
                    .with_dn(user_dn(uid))
                    .with_attribute("uid", *uid)
            })
            .collect();
        Self {
            users,
            ..Self::default()
        }
    }

    /// Registers the users a member URL evaluates to.
    pub fn with_url(mut self, url: &str, uids: &[&str]) -> Self {
        self.urls
            .insert(url.to_string(), uids.iter().map(ToString::to_string).collect());
        self
    }

    pub fn url_searches(&self) -> usize {
        self.url_searches.load(Ordering::SeqCst)
    }

    fn by_key(&self, key: &str) -> Option<Principal> {
        self.users.iter().find(|user| user.key == key).cloned()
    }
}

#[async_trait]
impl UserDirectory for FakeUsers {
    async fn lookup_user_by_dn(&self, dn: &str) -> FederationResult<Option<Principal>> {
        Ok(self
            .users
            .iter()
            .find(|user| user.dn.as_deref().is_some_and(|d| d.eq_ignore_ascii_case(dn)))
            .cloned())
    }

    async fn lookup_user_by_attribute(
        &self,
        attribute: &str,
        value: &str,
    ) -> FederationResult<Option<Principal>> {
        Ok(self
            .users
            .iter()
            .find(|user| user.attribute(attribute) == Some(value))
            .cloned())
    }

    async fn search_users_by_url(
        &self,
        url: &str,
        user_key: Option<&str>,
    ) -> FederationResult<Vec<Principal>> {
        self.url_searches.fetch_add(1, Ordering::SeqCst);
        let Some(keys) = self.urls.get(url) else {
            return Err(FederationError::user_lookup(format!("malformed URL {url}")));
        };
        Ok(keys
            .iter()
            .filter(|key| user_key.map_or(true, |wanted| wanted == key.as_str()))
            .filter_map(|key| self.by_key(key))
            .collect())
    }
}

// ============================================================================
// Group graph
// ============================================================================

/// Group-of-group edges keyed by member node id.
#[derive(Default)]
pub struct FakeGraph {
    external: HashMap<String, GraphNode>,
    containers: HashMap<String, Vec<GraphNode>>,
    traversals: AtomicUsize,
}

impl FakeGraph {
    /// Mirrors a directory group as a graph node.
    pub fn with_external(mut self, group_key: &str, node: GraphNode) -> Self {
        self.external.insert(group_key.to_string(), node);
        self
    }

    /// Makes `member` a member of `container`.
    pub fn with_edge(mut self, member: &GraphNode, container: GraphNode) -> Self {
        self.containers
            .entry(member.id.clone())
            .or_default()
            .push(container);
        self
    }

    pub fn traversals(&self) -> usize {
        self.traversals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GroupGraph for FakeGraph {
    async fn find_external_group(
        &self,
        _provider_key: &str,
        group_key: &str,
    ) -> FederationResult<Option<GraphNode>> {
        Ok(self.external.get(group_key).cloned())
    }

    async fn containing_groups(&self, node: &GraphNode) -> FederationResult<Vec<GraphNode>> {
        self.traversals.fetch_add(1, Ordering::SeqCst);
        Ok(self.containers.get(&node.id).cloned().unwrap_or_default())
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Provider wired to the fakes.
pub struct TestEnv {
    pub directory: FakeDirectory,
    pub users: Arc<FakeUsers>,
    pub graph: Arc<FakeGraph>,
    pub cache: Arc<InMemoryGroupCache>,
    pub provider: LdapGroupProvider,
}

impl TestEnv {
    pub fn new(directory: FakeDirectory) -> anyhow::Result<Self> {
        Self::build(directory, FakeUsers::default(), FakeGraph::default(), |b| b)
    }

    pub fn build(
        directory: FakeDirectory,
        users: FakeUsers,
        graph: FakeGraph,
        configure: impl FnOnce(LdapGroupConfigBuilder) -> LdapGroupConfigBuilder,
    ) -> anyhow::Result<Self> {
        init_tracing();

        let config = configure(
            LdapGroupConfig::builder()
                .connection_url("ldap://directory.test:389")
                .base_dn(BASE_DN),
        )
        .build()?;

        let users = Arc::new(users);
        let graph = Arc::new(graph);
        let cache = Arc::new(InMemoryGroupCache::default());
        let provider = LdapGroupProvider::new(
            config,
            Arc::new(directory.clone()),
            cache.clone(),
            users.clone(),
            graph.clone(),
        )?;

        Ok(Self {
            directory,
            users,
            graph,
            cache,
            provider,
        })
    }
}
