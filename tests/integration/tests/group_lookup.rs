//! Group lookup, search and cache behaviour against the in-memory directory.

use std::collections::BTreeMap;
use std::sync::Arc;

use dirgroup_cache::{CacheKey, CacheLookup, GroupCacheProvider};
use dirgroup_ldap::{FailureClass, LdapError};
use dirgroup_model::MembershipKind;

use crate::common::{group_entry, user_dn, FakeDirectory, FakeGraph, FakeUsers, TestEnv};

fn directory() -> FakeDirectory {
    FakeDirectory::new(vec![
        group_entry("admins", "groupOfUniqueNames")
            .with_attribute("description", ["Administrators", "of the realm"])
            .with_attribute("uniqueMember", [user_dn("alice"), user_dn("bob")]),
        group_entry("auditors", "groupOfUniqueNames")
            .with_attribute("description", ["Read-only access"])
            .with_attribute("uniqueMember", [user_dn("carol")]),
        group_entry("everyone", "groupOfURLs")
            .with_attribute("memberurl", ["ldap:///ou=people,dc=example,dc=com??sub?(uid=*)"]),
    ])
}

#[tokio::test]
async fn lookup_caches_under_both_keys() -> anyhow::Result<()> {
    let env = TestEnv::new(directory())?;

    let group = env
        .provider
        .lookup_group("admins")
        .await
        .ok_or_else(|| anyhow::anyhow!("admins not found"))?;

    assert_eq!(group.key, "admins");
    assert_eq!(group.provider_key, "ldap");
    assert_eq!(group.kind, MembershipKind::Static);
    assert_eq!(group.attribute("description"), Some("Administrators\nof the realm"));
    assert_eq!(group.attribute("groupname"), Some("admins"));
    assert!(!group.preloaded);
    assert_eq!(env.directory.searches(), 1);

    for key in CacheKey::for_group(&group) {
        assert!(matches!(env.cache.get(&key), CacheLookup::Hit(_)), "{key} not cached");
    }

    let again = env
        .provider
        .lookup_group("{ldap}admins")
        .await
        .ok_or_else(|| anyhow::anyhow!("admins not found on second lookup"))?;
    assert!(Arc::ptr_eq(&group, &again));
    assert_eq!(env.directory.searches(), 1);

    let by_name = env.provider.lookup_group_by_name(0, "admins").await;
    assert!(by_name.is_some_and(|g| Arc::ptr_eq(&g, &group)));
    assert_eq!(env.directory.searches(), 1);

    Ok(())
}

#[tokio::test]
async fn dynamic_groups_are_recognised() -> anyhow::Result<()> {
    let env = TestEnv::new(directory())?;

    let group = env.provider.lookup_group("everyone").await;
    assert!(group.is_some_and(|g| g.is_dynamic()));

    Ok(())
}

#[tokio::test]
async fn missing_group_is_negatively_cached() -> anyhow::Result<()> {
    let env = TestEnv::new(directory())?;

    assert!(env.provider.lookup_group("ghosts").await.is_none());
    assert_eq!(env.directory.searches(), 1);
    assert!(env.cache.get(&CacheKey::by_key("ldap", "ghosts")).is_absent());

    assert!(env.provider.lookup_group("ghosts").await.is_none());
    assert_eq!(env.directory.searches(), 1);

    // A group appearing later is found once the marker is cleared.
    env.directory
        .add(group_entry("ghosts", "groupOfUniqueNames"));
    env.cache.clear();
    assert!(env.provider.lookup_group("ghosts").await.is_some());
    assert_eq!(env.directory.searches(), 2);

    Ok(())
}

#[tokio::test]
async fn reserved_names_never_reach_the_directory() -> anyhow::Result<()> {
    let env = TestEnv::new(directory())?;

    assert!(env.provider.lookup_group("users:3").await.is_none());
    assert!(env.provider.lookup_group("{ldap}guest:0").await.is_none());
    assert_eq!(env.directory.searches(), 0);
    assert!(env.cache.get(&CacheKey::by_key("ldap", "users:3")).is_absent());

    Ok(())
}

#[tokio::test]
async fn lookup_by_name_scopes_to_site() -> anyhow::Result<()> {
    let env = TestEnv::new(directory())?;

    let group = env
        .provider
        .lookup_group_by_name(7, "auditors")
        .await
        .ok_or_else(|| anyhow::anyhow!("auditors not found"))?;
    assert_eq!(group.site_id, 7);
    assert!(matches!(
        env.cache.get(&CacheKey::by_name("ldap", 7, "auditors")),
        CacheLookup::Hit(_)
    ));

    assert!(env.provider.group_exists(7, "auditors").await);
    assert!(!env.provider.group_exists(7, "nobody").await);

    Ok(())
}

#[tokio::test]
async fn wildcard_search_spans_configured_attributes() -> anyhow::Result<()> {
    let env = TestEnv::new(directory())?;

    let criteria = BTreeMap::from([("*".to_string(), "*read*".to_string())]);
    let groups = env.provider.search_groups(4, &criteria).await;
    let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
    assert_eq!(keys, vec!["auditors"]);
    assert!(groups.iter().all(|g| g.site_id == 4));

    let criteria = BTreeMap::from([("groupname".to_string(), "a*".to_string())]);
    let mut keys: Vec<String> = env
        .provider
        .search_groups(0, &criteria)
        .await
        .into_iter()
        .map(|g| g.key)
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["admins", "auditors"]);

    // Searches do not populate the cache.
    assert!(env.cache.is_empty());

    Ok(())
}

#[tokio::test]
async fn listings_request_only_the_identity_attribute() -> anyhow::Result<()> {
    let env = TestEnv::new(directory())?;

    let mut keys = env.provider.group_keys().await;
    keys.sort();
    assert_eq!(keys, vec!["admins", "auditors", "everyone"]);
    assert_eq!(env.provider.group_names().await.len(), 3);

    let requests = env.directory.requests();
    assert!(requests.iter().all(|r| r.attributes == vec!["cn".to_string()]));
    assert!(requests.iter().all(|r| r.size_limit == 100));

    Ok(())
}

#[tokio::test]
async fn size_limit_keeps_first_results() -> anyhow::Result<()> {
    let env = TestEnv::build(directory(), FakeUsers::default(), FakeGraph::default(), |b| {
        b.size_limit(2)
    })?;

    assert_eq!(env.provider.group_keys().await.len(), 2);

    Ok(())
}

#[tokio::test]
async fn members_are_resolved_on_demand() -> anyhow::Result<()> {
    let env = TestEnv::build(
        directory(),
        FakeUsers::new(&["alice", "bob", "carol"]),
        FakeGraph::default(),
        |b| b,
    )?;

    let members = env.provider.group_members("{ldap}admins").await;
    assert_eq!(members.keys().collect::<Vec<_>>(), vec!["alice", "bob"]);

    let group = env
        .provider
        .lookup_group("auditors")
        .await
        .ok_or_else(|| anyhow::anyhow!("auditors not found"))?;
    assert!(!group.preloaded);

    let resolved = env.provider.ensure_members(Arc::clone(&group)).await;
    assert!(resolved.preloaded);
    assert!(resolved.has_member("carol"));
    assert!(!group.preloaded);

    let cached = env.provider.lookup_group("auditors").await;
    assert!(cached.is_some_and(|g| Arc::ptr_eq(&g, &resolved)));

    let searches = env.directory.searches();
    let same = env.provider.ensure_members(Arc::clone(&resolved)).await;
    assert!(Arc::ptr_eq(&same, &resolved));
    assert_eq!(env.directory.searches(), searches);

    Ok(())
}

#[tokio::test]
async fn preloading_resolves_members_during_lookup() -> anyhow::Result<()> {
    let env = TestEnv::build(
        directory(),
        FakeUsers::new(&["alice", "bob"]).with_url(
            "ldap:///ou=people,dc=example,dc=com??sub?(uid=*)",
            &["alice", "bob"],
        ),
        FakeGraph::default(),
        |b| b.preload_members(true),
    )?;

    let everyone = env
        .provider
        .lookup_group("everyone")
        .await
        .ok_or_else(|| anyhow::anyhow!("everyone not found"))?;
    assert!(everyone.preloaded);
    assert_eq!(everyone.members.len(), 2);
    assert_eq!(env.users.url_searches(), 1);

    Ok(())
}

#[tokio::test]
async fn unavailable_directory_degrades_without_negative_marker() -> anyhow::Result<()> {
    let env = TestEnv::new(directory())?;
    env.directory.set_unavailable(true);

    assert!(env.provider.lookup_group("admins").await.is_none());
    assert!(env.provider.group_keys().await.is_empty());
    assert!(env.provider.group_members("admins").await.is_empty());
    assert!(env.provider.test_connection().await.is_err());
    assert_eq!(env.cache.absent_len(), 0);

    env.directory.set_unavailable(false);
    assert!(env.provider.lookup_group("admins").await.is_some());
    assert!(env.provider.test_connection().await.is_ok());

    Ok(())
}

#[tokio::test]
async fn degraded_lookup_is_neither_cached_nor_marked_absent() -> anyhow::Result<()> {
    let env = TestEnv::new(directory())?;
    env.directory.set_degraded(Some(FailureClass::PartialResult));

    assert!(env.provider.lookup_group("admins").await.is_none());
    assert!(env.provider.lookup_group_by_name(0, "admins").await.is_none());
    assert_eq!(env.cache.absent_len(), 0);
    assert!(env.cache.is_empty());

    env.directory.set_degraded(None);
    assert!(env.provider.lookup_group("admins").await.is_some());

    Ok(())
}

#[tokio::test]
async fn size_limited_lookup_is_not_cached() -> anyhow::Result<()> {
    let directory = directory();
    directory.add(
        group_entry("admins", "groupOfUniqueNames")
            .with_attribute("description", ["Shadow copy"]),
    );
    let env = TestEnv::build(directory, FakeUsers::default(), FakeGraph::default(), |b| {
        b.size_limit(1)
    })?;

    assert!(env.provider.lookup_group("admins").await.is_none());
    assert!(env.cache.is_empty());
    assert_eq!(env.cache.absent_len(), 0);

    Ok(())
}

#[tokio::test]
async fn writes_are_not_supported() -> anyhow::Result<()> {
    let env = TestEnv::new(directory())?;

    assert!(matches!(
        env.provider.create_group(0, "new"),
        Err(LdapError::NotSupported(_))
    ));

    let group = env
        .provider
        .lookup_group("admins")
        .await
        .ok_or_else(|| anyhow::anyhow!("admins not found"))?;
    assert!(matches!(
        env.provider.delete_group(&group),
        Err(LdapError::NotSupported(_))
    ));

    Ok(())
}

#[tokio::test]
async fn every_session_is_closed() -> anyhow::Result<()> {
    let env = TestEnv::new(directory())?;

    env.provider.lookup_group("admins").await;
    env.provider.lookup_group("missing").await;
    env.provider.group_keys().await;
    env.provider
        .search_groups(0, &BTreeMap::from([("cn".to_string(), "*".to_string())]))
        .await;

    assert_eq!(env.directory.opened(), 4);
    assert_eq!(env.directory.closed(), 4);

    Ok(())
}
