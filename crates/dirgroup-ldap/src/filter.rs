//! Search filter construction.
//!
//! Every literal value is escaped before it enters the filter grammar. `*`
//! is left alone in criteria values so they keep their wildcard meaning, and
//! escaped in membership filters.

use std::collections::BTreeMap;

use crate::config::LdapGroupConfig;

/// Criterion name that searches every wildcard attribute.
pub const ANY_ATTRIBUTE: &str = "*";

/// Pseudo-criterion naming the static member attribute.
pub const MEMBERS_CRITERION: &str = "members";

/// Escapes `\`, `(` and `)` in a filter value.
///
/// Backslashes are escaped first so the escape sequences themselves are never
/// escaped again.
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('(', "\\28")
        .replace(')', "\\29")
}

/// Escapes a value that must match literally, including `*` as `\2a`.
#[must_use]
pub fn escape_literal_value(value: &str) -> String {
    escape_filter_value(value).replace('*', "\\2a")
}

/// Builds group search filters.
#[derive(Debug, Clone)]
pub struct FilterBuilder {
    static_class: String,
    dynamic_class: String,
    members_attribute: String,
    wildcard_attributes: Vec<String>,
    attribute_map: BTreeMap<String, String>,
}

impl FilterBuilder {
    /// Creates a builder for the two group object classes.
    #[must_use]
    pub fn new(static_class: impl Into<String>, dynamic_class: impl Into<String>) -> Self {
        Self {
            static_class: static_class.into(),
            dynamic_class: dynamic_class.into(),
            members_attribute: "uniqueMember".to_string(),
            wildcard_attributes: Vec::new(),
            attribute_map: BTreeMap::new(),
        }
    }

    /// Creates a builder from provider configuration.
    #[must_use]
    pub fn from_config(config: &LdapGroupConfig) -> Self {
        Self::new(&config.static_object_class, &config.dynamic_object_class)
            .with_members_attribute(&config.members_attribute)
            .with_wildcard_attributes(config.wildcard_attributes.clone())
            .with_attribute_map(config.attribute_map.clone())
    }

    /// Sets the attribute the `members` criterion is renamed to.
    #[must_use]
    pub fn with_members_attribute(mut self, attr: impl Into<String>) -> Self {
        self.members_attribute = attr.into();
        self
    }

    /// Sets the attributes searched by the `*` criterion.
    #[must_use]
    pub fn with_wildcard_attributes(mut self, attrs: Vec<String>) -> Self {
        self.wildcard_attributes = attrs;
        self
    }

    /// Sets the property to attribute map used to rename criteria.
    #[must_use]
    pub fn with_attribute_map(mut self, map: BTreeMap<String, String>) -> Self {
        self.attribute_map = map;
        self
    }

    /// Matches every static and dynamic group.
    #[must_use]
    pub fn object_class_filter(&self) -> String {
        format!(
            "(|(objectClass={})(objectClass={}))",
            self.static_class, self.dynamic_class
        )
    }

    /// Builds a filter from criteria.
    ///
    /// Criteria are ANDed together with the object class filter. Without
    /// criteria the bare object class filter is returned.
    #[must_use]
    pub fn build(&self, criteria: &BTreeMap<String, String>) -> String {
        let mut clauses = String::new();
        for (name, value) in criteria {
            let value = escape_filter_value(value);
            if name == ANY_ATTRIBUTE {
                self.push_wildcard(&mut clauses, &value);
            } else {
                let attr = self.directory_attribute(name);
                clauses.push_str(&format!("({attr}={value})"));
            }
        }

        if clauses.is_empty() {
            self.object_class_filter()
        } else {
            format!("(&{}{clauses})", self.object_class_filter())
        }
    }

    /// Builds a filter matching the group whose `attr` equals `value`.
    #[must_use]
    pub fn by_attribute(&self, attr: &str, value: &str) -> String {
        Self::qualify(&self.object_class_filter(), attr, value)
    }

    /// Static groups whose member attribute holds `member`.
    #[must_use]
    pub fn static_membership_filter(&self, member: &str) -> String {
        format!(
            "(&(objectClass={})({}={}))",
            self.static_class,
            self.members_attribute,
            escape_literal_value(member)
        )
    }

    /// All dynamic groups.
    #[must_use]
    pub fn dynamic_groups_filter(&self) -> String {
        format!("(objectClass={})", self.dynamic_class)
    }

    /// ANDs `filter` with an equality clause on `attr`.
    #[must_use]
    pub fn qualify(filter: &str, attr: &str, value: &str) -> String {
        format!("(&{filter}({attr}={}))", escape_filter_value(value))
    }

    fn directory_attribute<'a>(&'a self, name: &'a str) -> &'a str {
        if let Some(attr) = self.attribute_map.get(name) {
            return attr;
        }
        if name == MEMBERS_CRITERION {
            return &self.members_attribute;
        }
        name
    }

    fn push_wildcard(&self, clauses: &mut String, value: &str) {
        match self.wildcard_attributes.as_slice() {
            [] => {}
            [attr] => clauses.push_str(&format!("({attr}={value})")),
            attrs => {
                clauses.push_str("(|");
                for attr in attrs {
                    clauses.push_str(&format!("({attr}={value})"));
                }
                clauses.push(')');
            }
        }
    }
}
