//! Directory entry to group translation.

use std::collections::BTreeMap;

use dirgroup_model::{Group, MembershipKind};
use tracing::debug;

use crate::config::LdapGroupConfig;
use crate::membership::MembershipResolver;
use crate::search::LdapEntry;

const OBJECT_CLASS: &str = "objectClass";

/// Joins attribute values with line feeds.
#[must_use]
pub fn flatten_values(values: &[String]) -> String {
    values.join("\n")
}

/// Turns directory entries into groups.
#[derive(Clone)]
pub struct EntryTranslator {
    provider_key: String,
    identity_attribute: String,
    dynamic_class: String,
    attribute_map: BTreeMap<String, String>,
    preload: bool,
    resolver: MembershipResolver,
}

impl EntryTranslator {
    /// Creates a translator.
    #[must_use]
    pub fn new(config: &LdapGroupConfig, resolver: MembershipResolver) -> Self {
        Self {
            provider_key: config.provider_key.clone(),
            identity_attribute: config.identity_attribute.clone(),
            dynamic_class: config.dynamic_object_class.to_ascii_lowercase(),
            attribute_map: config.attribute_map.clone(),
            preload: config.preload_members,
            resolver,
        }
    }

    /// The resolver used for preloading.
    #[must_use]
    pub const fn resolver(&self) -> &MembershipResolver {
        &self.resolver
    }

    /// Translates one entry. Entries without an identity value are skipped.
    pub async fn translate(&self, entry: &LdapEntry) -> Option<Group> {
        let Some(key) = self.group_key(entry) else {
            debug!(
                dn = %entry.dn,
                attribute = %self.identity_attribute,
                "ignoring entry without identity value"
            );
            return None;
        };

        let attributes = self.translate_attributes(entry);
        let dynamic = self.is_dynamic(&attributes);
        let group = Group::new(&self.provider_key, key, MembershipKind::from_dynamic(dynamic))
            .with_attributes(attributes);

        if self.preload {
            let members = self.resolver.resolve(entry, dynamic).await;
            debug!(group = %group.key, members = members.len(), "preloaded members");
            Some(group.with_members(members))
        } else {
            Some(group)
        }
    }

    /// Returns the entry's identity value.
    #[must_use]
    pub fn group_key<'e>(&self, entry: &'e LdapEntry) -> Option<&'e str> {
        entry
            .get_attr(&self.identity_attribute)
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Flattens every attribute, then copies mapped attributes to their
    /// property names. `objectClass` is normalised whatever its casing.
    #[must_use]
    pub fn translate_attributes(&self, entry: &LdapEntry) -> BTreeMap<String, String> {
        let mut attributes: BTreeMap<String, String> = entry
            .attributes
            .iter()
            .map(|(name, values)| (name.clone(), flatten_values(values)))
            .collect();

        if let Some(classes) = entry.get_attrs(OBJECT_CLASS) {
            attributes.insert(OBJECT_CLASS.to_string(), flatten_values(classes));
        }

        for (property, attr) in &self.attribute_map {
            if let Some(values) = entry.get_attrs(attr) {
                attributes.insert(property.clone(), flatten_values(values));
            }
        }

        attributes
    }

    /// Dynamic when the object class value contains the dynamic class token.
    #[must_use]
    pub fn is_dynamic(&self, attributes: &BTreeMap<String, String>) -> bool {
        attributes
            .get(OBJECT_CLASS)
            .is_some_and(|classes| classes.to_ascii_lowercase().contains(&self.dynamic_class))
    }
}
