//! LDAP group provider configuration.
//!
//! The typed record is built either through [`LdapGroupConfig::builder`] or
//! from a flat property map with [`LdapGroupConfig::from_properties`]. Both
//! paths end in [`LdapGroupConfig::validate`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LdapError, LdapResult};

// ============================================================================
// Connection Options
// ============================================================================

/// How the provider authenticates its directory sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticationMode {
    /// Simple bind with the configured DN and credential.
    #[default]
    Simple,
    /// Anonymous sessions.
    None,
}

impl AuthenticationMode {
    fn parse(value: &str) -> LdapResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "none" => Ok(Self::None),
            other => Err(LdapError::config(format!(
                "unsupported authentication mode '{other}'"
            ))),
        }
    }
}

/// What to do with referrals returned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferralPolicy {
    /// Drop referral references and keep the rest of the result.
    #[default]
    Ignore,
    /// Report results that carried referrals as partial.
    Throw,
}

impl ReferralPolicy {
    fn parse(value: &str) -> LdapResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "throw" => Ok(Self::Throw),
            "follow" => Err(LdapError::config("referral policy 'follow' is not supported")),
            other => Err(LdapError::config(format!("unknown referral policy '{other}'"))),
        }
    }
}

/// How static member references are turned into principals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberReference {
    /// Member values are user distinguished names.
    Dn,
    /// Member values are values of this user attribute.
    Attribute(String),
}

// ============================================================================
// LDAP Group Configuration
// ============================================================================

/// Configuration of an LDAP group provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapGroupConfig {
    /// Provider key, used in cache keys and qualified group keys.
    pub provider_key: String,

    // === Connection ===
    /// Directory URL (`ldap://`, `ldaps://` or `ldapi://`).
    pub connection_url: String,

    /// Bind DN for the service account.
    pub bind_dn: Option<String>,

    /// Bind credential.
    #[serde(skip_serializing, default)]
    pub bind_credential: Option<String>,

    /// Authentication mode.
    pub authentication_mode: AuthenticationMode,

    /// Referral handling.
    pub referral: ReferralPolicy,

    /// Whether concurrently open sessions are capped.
    pub use_connection_pool: bool,

    /// Maximum concurrently open sessions when pooling is enabled.
    pub pool_max_size: usize,

    /// Connection timeout.
    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,

    // === Directory Structure ===
    /// Base DN for group searches.
    pub base_dn: String,

    /// Attribute holding the unique group key.
    pub identity_attribute: String,

    /// Object class of static groups.
    pub static_object_class: String,

    /// Object class of dynamic groups.
    pub dynamic_object_class: String,

    /// Member attribute of static groups.
    pub members_attribute: String,

    /// Member URL attribute of dynamic groups.
    pub dynamic_members_attribute: String,

    // === Search ===
    /// Server-side result size limit.
    pub size_limit: i32,

    /// Attributes searched by the `*` criterion.
    pub wildcard_attributes: Vec<String>,

    /// Property name to directory attribute.
    pub attribute_map: BTreeMap<String, String>,

    /// User attribute referenced by static member values. `None` means member
    /// values are DNs.
    pub member_user_attribute: Option<String>,

    /// Page size for ranged member retrieval. Zero disables paging.
    pub range_step: u32,

    /// Resolve members while translating entries.
    pub preload_members: bool,

    /// Group names that never exist in the directory.
    pub reserved_group_names: Vec<String>,
}

impl fmt::Debug for LdapGroupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapGroupConfig")
            .field("provider_key", &self.provider_key)
            .field("connection_url", &self.connection_url)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_credential",
                &self.bind_credential.as_ref().map(|_| "<redacted>"),
            )
            .field("authentication_mode", &self.authentication_mode)
            .field("referral", &self.referral)
            .field("use_connection_pool", &self.use_connection_pool)
            .field("pool_max_size", &self.pool_max_size)
            .field("connection_timeout", &self.connection_timeout)
            .field("base_dn", &self.base_dn)
            .field("identity_attribute", &self.identity_attribute)
            .field("static_object_class", &self.static_object_class)
            .field("dynamic_object_class", &self.dynamic_object_class)
            .field("members_attribute", &self.members_attribute)
            .field("dynamic_members_attribute", &self.dynamic_members_attribute)
            .field("size_limit", &self.size_limit)
            .field("wildcard_attributes", &self.wildcard_attributes)
            .field("attribute_map", &self.attribute_map)
            .field("member_user_attribute", &self.member_user_attribute)
            .field("range_step", &self.range_step)
            .field("preload_members", &self.preload_members)
            .field("reserved_group_names", &self.reserved_group_names)
            .finish()
    }
}

impl LdapGroupConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> LdapGroupConfigBuilder {
        LdapGroupConfigBuilder::new()
    }

    /// Builds a configuration from a flat property map.
    ///
    /// Keys may carry a `group.` prefix. Every `<property>.attribute.map` key
    /// adds an attribute mapping. Unknown keys are ignored.
    ///
    /// ## Errors
    ///
    /// Returns an error if a value cannot be parsed or validation fails.
    pub fn from_properties(properties: &HashMap<String, String>) -> LdapResult<Self> {
        let mut builder = LdapGroupConfigBuilder::new();

        for (raw_key, value) in properties {
            let key = raw_key.strip_prefix("group.").unwrap_or(raw_key);
            builder = match key {
                "url" => builder.connection_url(value),
                "authentification.mode" | "authentication.mode" => {
                    builder.authentication_mode(AuthenticationMode::parse(value)?)
                }
                "public.bind.dn" => builder.bind_dn(value),
                "public.bind.password" => builder.bind_credential(value),
                "preload" => builder.preload_members(parse_bool(key, value)?),
                "search.attribute" => builder.identity_attribute(value),
                "search.name" => builder.base_dn(value),
                "search.objectclass" => builder.static_object_class(value),
                "dynamic.search.objectclass" => builder.dynamic_object_class(value),
                "search.countlimit" => builder.size_limit(parse_number(key, value)?),
                "search.wildcards.attributes" => builder.wildcard_attributes(split_list(value)),
                "members.attribute" => builder.members_attribute(value),
                "dynamic.members.attribute" => builder.dynamic_members_attribute(value),
                "refferal" | "referral" => builder.referral(ReferralPolicy::parse(value)?),
                "ldap.connect.pool" => builder.use_connection_pool(parse_bool(key, value)?),
                "ldap.connect.timeout" => builder
                    .connection_timeout(Duration::from_millis(parse_number(key, value)?)),
                "ad.range.step" => builder.range_step(parse_number(key, value)?),
                "members.user.attibute.map" | "members.user.attribute.map" => {
                    builder.member_user_attribute(value)
                }
                _ => match key.strip_suffix(".attribute.map") {
                    Some(property) => builder.map_attribute(property, value),
                    None => builder,
                },
            };
        }

        builder.build()
    }

    /// Validates the configuration.
    ///
    /// ## Errors
    ///
    /// Returns an error for an unknown URL scheme or a missing required field.
    pub fn validate(&self) -> LdapResult<()> {
        let url = self.connection_url.to_ascii_lowercase();
        let scheme_len = ["ldap://", "ldaps://", "ldapi://"]
            .iter()
            .find(|scheme| url.starts_with(*scheme))
            .map(|scheme| scheme.len())
            .ok_or_else(|| LdapError::UnsupportedScheme(self.connection_url.clone()))?;
        if url.len() <= scheme_len && !url.starts_with("ldapi://") {
            return Err(LdapError::config("connection URL is missing a host"));
        }

        if url.starts_with("ldap://")
            && self.authentication_mode == AuthenticationMode::Simple
            && self.bind_credential.is_some()
        {
            tracing::warn!(
                url = %self.connection_url,
                "bind credential will be sent over an unencrypted connection"
            );
        }

        for (name, value) in [
            ("provider_key", &self.provider_key),
            ("identity_attribute", &self.identity_attribute),
            ("static_object_class", &self.static_object_class),
            ("dynamic_object_class", &self.dynamic_object_class),
            ("members_attribute", &self.members_attribute),
            ("dynamic_members_attribute", &self.dynamic_members_attribute),
        ] {
            if value.trim().is_empty() {
                return Err(LdapError::config(format!("{name} cannot be empty")));
            }
        }

        if self.use_connection_pool && self.pool_max_size == 0 {
            return Err(LdapError::config(
                "pool_max_size must be positive when pooling is enabled",
            ));
        }

        Ok(())
    }

    /// Returns the static member reference strategy.
    #[must_use]
    pub fn member_reference(&self) -> MemberReference {
        match &self.member_user_attribute {
            Some(attribute) => MemberReference::Attribute(attribute.clone()),
            None => MemberReference::Dn,
        }
    }

    /// Returns the qualified key prefix, `{providerKey}`.
    #[must_use]
    pub fn key_prefix(&self) -> String {
        format!("{{{}}}", self.provider_key)
    }

    /// Whether `key` names a reserved group that never lives in the directory.
    ///
    /// A key is reserved when it contains `<reserved>:` anywhere, which covers
    /// site-qualified identifiers such as `users:3`.
    #[must_use]
    pub fn is_reserved(&self, key: &str) -> bool {
        self.reserved_group_names
            .iter()
            .any(|reserved| key.contains(&format!("{reserved}:")))
    }
}

fn parse_bool(key: &str, value: &str) -> LdapResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(LdapError::config(format!(
            "property {key} expects a boolean, got '{value}'"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> LdapResult<T> {
    value.trim().parse().map_err(|_| {
        LdapError::config(format!("property {key} expects a number, got '{value}'"))
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

// ============================================================================
// Configuration Builder
// ============================================================================

/// Builder for LDAP group configuration.
#[derive(Debug)]
pub struct LdapGroupConfigBuilder {
    provider_key: String,
    connection_url: Option<String>,
    bind_dn: Option<String>,
    bind_credential: Option<String>,
    authentication_mode: AuthenticationMode,
    referral: ReferralPolicy,
    use_connection_pool: bool,
    pool_max_size: usize,
    connection_timeout: Duration,
    base_dn: String,
    identity_attribute: String,
    static_object_class: String,
    dynamic_object_class: String,
    members_attribute: String,
    dynamic_members_attribute: String,
    size_limit: i32,
    wildcard_attributes: Vec<String>,
    attribute_map: BTreeMap<String, String>,
    member_user_attribute: Option<String>,
    range_step: u32,
    preload_members: bool,
    reserved_group_names: Vec<String>,
}

impl Default for LdapGroupConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LdapGroupConfigBuilder {
    /// Creates a new builder with defaults.
    #[must_use]
    pub fn new() -> Self {
        let attribute_map = [("groupname", "cn"), ("description", "description")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        Self {
            provider_key: "ldap".to_string(),
            connection_url: None,
            bind_dn: None,
            bind_credential: None,
            authentication_mode: AuthenticationMode::Simple,
            referral: ReferralPolicy::Ignore,
            use_connection_pool: true,
            pool_max_size: 10,
            connection_timeout: Duration::from_secs(5),
            base_dn: String::new(),
            identity_attribute: "cn".to_string(),
            static_object_class: "groupOfUniqueNames".to_string(),
            dynamic_object_class: "groupOfURLs".to_string(),
            members_attribute: "uniqueMember".to_string(),
            dynamic_members_attribute: "memberurl".to_string(),
            size_limit: 100,
            wildcard_attributes: vec![
                "cn".to_string(),
                "description".to_string(),
                "uniqueMember".to_string(),
            ],
            attribute_map,
            member_user_attribute: None,
            range_step: 0,
            preload_members: false,
            reserved_group_names: vec![
                "administrators".to_string(),
                "guest".to_string(),
                "users".to_string(),
            ],
        }
    }

    /// Sets the provider key.
    #[must_use]
    pub fn provider_key(mut self, key: impl Into<String>) -> Self {
        self.provider_key = key.into();
        self
    }

    /// Sets the connection URL.
    #[must_use]
    pub fn connection_url(mut self, url: impl Into<String>) -> Self {
        self.connection_url = Some(url.into());
        self
    }

    /// Sets the bind DN.
    #[must_use]
    pub fn bind_dn(mut self, dn: impl Into<String>) -> Self {
        self.bind_dn = Some(dn.into());
        self
    }

    /// Sets the bind credential.
    #[must_use]
    pub fn bind_credential(mut self, credential: impl Into<String>) -> Self {
        self.bind_credential = Some(credential.into());
        self
    }

    /// Sets the authentication mode.
    #[must_use]
    pub const fn authentication_mode(mut self, mode: AuthenticationMode) -> Self {
        self.authentication_mode = mode;
        self
    }

    /// Sets the referral policy.
    #[must_use]
    pub const fn referral(mut self, policy: ReferralPolicy) -> Self {
        self.referral = policy;
        self
    }

    /// Enables or disables the session cap.
    #[must_use]
    pub const fn use_connection_pool(mut self, enabled: bool) -> Self {
        self.use_connection_pool = enabled;
        self
    }

    /// Sets the session cap.
    #[must_use]
    pub const fn pool_max_size(mut self, max: usize) -> Self {
        self.pool_max_size = max;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Sets the group search base.
    #[must_use]
    pub fn base_dn(mut self, dn: impl Into<String>) -> Self {
        self.base_dn = dn.into();
        self
    }

    /// Sets the identity attribute.
    #[must_use]
    pub fn identity_attribute(mut self, attr: impl Into<String>) -> Self {
        self.identity_attribute = attr.into();
        self
    }

    /// Sets the static group object class.
    #[must_use]
    pub fn static_object_class(mut self, class: impl Into<String>) -> Self {
        self.static_object_class = class.into();
        self
    }

    /// Sets the dynamic group object class.
    #[must_use]
    pub fn dynamic_object_class(mut self, class: impl Into<String>) -> Self {
        self.dynamic_object_class = class.into();
        self
    }

    /// Sets the static member attribute.
    #[must_use]
    pub fn members_attribute(mut self, attr: impl Into<String>) -> Self {
        self.members_attribute = attr.into();
        self
    }

    /// Sets the dynamic member URL attribute.
    #[must_use]
    pub fn dynamic_members_attribute(mut self, attr: impl Into<String>) -> Self {
        self.dynamic_members_attribute = attr.into();
        self
    }

    /// Sets the result size limit.
    #[must_use]
    pub const fn size_limit(mut self, limit: i32) -> Self {
        self.size_limit = limit;
        self
    }

    /// Sets the wildcard attribute list.
    #[must_use]
    pub fn wildcard_attributes(mut self, attrs: Vec<String>) -> Self {
        self.wildcard_attributes = attrs;
        self
    }

    /// Maps a property name to a directory attribute.
    #[must_use]
    pub fn map_attribute(mut self, property: impl Into<String>, attr: impl Into<String>) -> Self {
        self.attribute_map.insert(property.into(), attr.into());
        self
    }

    /// Resolves static members through a user attribute instead of DNs.
    #[must_use]
    pub fn member_user_attribute(mut self, attr: impl Into<String>) -> Self {
        self.member_user_attribute = Some(attr.into());
        self
    }

    /// Sets the range paging step.
    #[must_use]
    pub const fn range_step(mut self, step: u32) -> Self {
        self.range_step = step;
        self
    }

    /// Enables member preloading.
    #[must_use]
    pub const fn preload_members(mut self, preload: bool) -> Self {
        self.preload_members = preload;
        self
    }

    /// Sets the reserved group names.
    #[must_use]
    pub fn reserved_group_names(mut self, names: Vec<String>) -> Self {
        self.reserved_group_names = names;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// ## Errors
    ///
    /// Returns an error if the connection URL is missing or validation fails.
    pub fn build(self) -> LdapResult<LdapGroupConfig> {
        let config = LdapGroupConfig {
            provider_key: self.provider_key,
            connection_url: self
                .connection_url
                .ok_or_else(|| LdapError::config("connection_url is required"))?,
            bind_dn: self.bind_dn,
            bind_credential: self.bind_credential,
            authentication_mode: self.authentication_mode,
            referral: self.referral,
            use_connection_pool: self.use_connection_pool,
            pool_max_size: self.pool_max_size,
            connection_timeout: self.connection_timeout,
            base_dn: self.base_dn,
            identity_attribute: self.identity_attribute,
            static_object_class: self.static_object_class,
            dynamic_object_class: self.dynamic_object_class,
            members_attribute: self.members_attribute,
            dynamic_members_attribute: self.dynamic_members_attribute,
            size_limit: self.size_limit,
            wildcard_attributes: self.wildcard_attributes,
            attribute_map: self.attribute_map,
            member_user_attribute: self.member_user_attribute,
            range_step: self.range_step,
            preload_members: self.preload_members,
            reserved_group_names: self.reserved_group_names,
        };

        config.validate()?;

        Ok(config)
    }
}
