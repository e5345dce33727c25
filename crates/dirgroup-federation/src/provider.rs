//! Collaborator traits.
//!
//! A group provider resolves members through a [`UserDirectory`] and walks
//! group-of-group relations through a [`GroupGraph`]. Both are constructed by
//! the caller and handed to the provider at startup.

use async_trait::async_trait;
use dirgroup_model::Principal;

use crate::error::FederationResult;

// ============================================================================
// User Directory
// ============================================================================

/// User lookups needed to resolve group members.
///
/// ## Implementation Notes
///
/// - Implementations must be thread-safe (Send + Sync)
/// - `Ok(None)` means the user does not exist; errors mean the lookup failed
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Gets a user by distinguished name.
    async fn lookup_user_by_dn(&self, dn: &str) -> FederationResult<Option<Principal>>;

    /// Gets a user whose `attribute` equals `value`.
    async fn lookup_user_by_attribute(
        &self,
        attribute: &str,
        value: &str,
    ) -> FederationResult<Option<Principal>>;

    /// Evaluates a stored member query (an LDAP URL).
    ///
    /// When `user_key` is set, only that user may be returned; an empty result
    /// then means the user does not match the query.
    async fn search_users_by_url(
        &self,
        url: &str,
        user_key: Option<&str>,
    ) -> FederationResult<Vec<Principal>>;
}

// ============================================================================
// Group Graph
// ============================================================================

/// A group node in the external group graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphNode {
    /// Store-specific node identifier.
    pub id: String,
    /// Group name.
    pub name: String,
    /// Site the group belongs to (0 for global groups).
    pub site_id: i32,
}

impl GraphNode {
    /// Creates a node.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, site_id: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            site_id,
        }
    }

    /// Returns the group identifier, `name:site_id`.
    #[must_use]
    pub fn identifier(&self) -> String {
        format!("{}:{}", self.name, self.site_id)
    }
}

/// Group-of-group edges stored outside the directory.
#[async_trait]
pub trait GroupGraph: Send + Sync {
    /// Finds the node mirroring a directory group, if the store knows it.
    async fn find_external_group(
        &self,
        provider_key: &str,
        group_key: &str,
    ) -> FederationResult<Option<GraphNode>>;

    /// Lists the groups that have `node` among their members.
    async fn containing_groups(&self, node: &GraphNode) -> FederationResult<Vec<GraphNode>>;
}
