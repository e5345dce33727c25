//! Search requests, responses and the group searcher.

use std::collections::HashMap;

use ldap3::SearchEntry;

use crate::config::LdapGroupConfig;
use crate::connection::DirectorySession;
use crate::error::{FailureClass, LdapResult};
use crate::range::RangeAttributeLoader;

/// Represents an LDAP entry with parsed attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LdapEntry {
    /// Distinguished Name.
    pub dn: String,

    /// Attributes (all values are multi-valued).
    pub attributes: HashMap<String, Vec<String>>,
}

impl LdapEntry {
    /// Creates an entry without attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attributes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Creates a new LDAP entry from search result.
    #[must_use]
    pub fn from_search_entry(entry: SearchEntry) -> Self {
        Self {
            dn: entry.dn,
            attributes: entry.attrs,
        }
    }

    /// Gets the values of an attribute, matching the name case-insensitively.
    #[must_use]
    pub fn get_attrs(&self, name: &str) -> Option<&Vec<String>> {
        self.attributes.get(name).or_else(|| {
            self.attributes
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, values)| values)
        })
    }

    /// Gets the first value of an attribute.
    #[must_use]
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.get_attrs(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// Checks if the entry has an attribute.
    #[must_use]
    pub fn has_attr(&self, name: &str) -> bool {
        self.get_attrs(name).is_some()
    }
}

/// A subtree search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Search base.
    pub base: String,
    /// Filter string.
    pub filter: String,
    /// Requested attributes. Empty requests all user attributes.
    pub attributes: Vec<String>,
    /// Server-side size limit; zero means no limit.
    pub size_limit: i32,
}

impl SearchRequest {
    /// Creates a request for all attributes with no size limit.
    #[must_use]
    pub fn new(base: impl Into<String>, filter: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            filter: filter.into(),
            attributes: Vec::new(),
            size_limit: 0,
        }
    }

    /// Restricts the returned attributes.
    #[must_use]
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the size limit.
    #[must_use]
    pub const fn with_size_limit(mut self, limit: i32) -> Self {
        self.size_limit = limit;
        self
    }

    /// Attribute list in the form the wire protocol expects.
    #[must_use]
    pub fn attribute_list(&self) -> Vec<&str> {
        if self.attributes.is_empty() {
            vec!["*"]
        } else {
            self.attributes.iter().map(String::as_str).collect()
        }
    }
}

/// Entries returned by a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResponse {
    /// Returned entries.
    pub entries: Vec<LdapEntry>,
    /// Set when the server cut the result short.
    pub degraded: Option<FailureClass>,
}

impl SearchResponse {
    /// A complete response.
    #[must_use]
    pub fn complete(entries: Vec<LdapEntry>) -> Self {
        Self {
            entries,
            degraded: None,
        }
    }

    /// A response the server cut short.
    #[must_use]
    pub fn degraded(entries: Vec<LdapEntry>, class: FailureClass) -> Self {
        Self {
            entries,
            degraded: Some(class),
        }
    }

    /// Whether the server returned the full result.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.degraded.is_none()
    }
}

/// Runs group searches on one session and pages oversized member attributes.
pub struct GroupSearcher<'a> {
    session: &'a mut dyn DirectorySession,
    config: &'a LdapGroupConfig,
}

impl<'a> GroupSearcher<'a> {
    /// Creates a new group searcher.
    pub fn new(session: &'a mut dyn DirectorySession, config: &'a LdapGroupConfig) -> Self {
        Self { session, config }
    }

    /// Searches the group base with the configured size limit.
    ///
    /// An empty attribute list requests every attribute. For such searches,
    /// when range paging is enabled, each entry carrying a ranged member
    /// attribute is completed before it is returned.
    pub async fn search(&mut self, filter: &str, attributes: &[&str]) -> LdapResult<SearchResponse> {
        let request = SearchRequest::new(&self.config.base_dn, filter)
            .with_attributes(attributes.iter().copied())
            .with_size_limit(self.config.size_limit);

        let mut response = self.session.search(&request).await?;

        if self.config.range_step > 0 && attributes.is_empty() {
            let loader = RangeAttributeLoader::new(
                &self.config.base_dn,
                filter,
                &self.config.identity_attribute,
                &self.config.members_attribute,
                self.config.range_step,
            );
            for entry in &mut response.entries {
                if loader.needs_paging(entry) {
                    loader.load(&mut *self.session, entry).await?;
                }
            }
        }

        Ok(response)
    }
}
