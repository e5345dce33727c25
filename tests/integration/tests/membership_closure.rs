//! Transitive group membership of users.

use std::collections::BTreeSet;
use std::sync::Arc;

use dirgroup_federation::GraphNode;
use dirgroup_model::{Principal, UserPrincipal};

use crate::common::{group_entry, user_dn, FakeDirectory, FakeGraph, FakeUsers, TestEnv};

const EVERYONE_URL: &str = "ldap:///ou=people,dc=example,dc=com??sub?(objectClass=person)";

fn directory() -> FakeDirectory {
    FakeDirectory::new(vec![
        group_entry("admins", "groupOfUniqueNames")
            .with_attribute("uniqueMember", [user_dn("alice"), user_dn("bob")]),
        group_entry("auditors", "groupOfUniqueNames")
            .with_attribute("uniqueMember", [user_dn("carol")]),
        group_entry("everyone", "groupOfURLs").with_attribute("memberURL", [EVERYONE_URL]),
    ])
}

fn users() -> FakeUsers {
    FakeUsers::new(&["alice", "bob", "carol"]).with_url(EVERYONE_URL, &["alice", "carol"])
}

fn node(name: &str) -> GraphNode {
    GraphNode::new(format!("node-{name}"), name, 0)
}

/// `admins` is mirrored as A, and A -> B -> C -> A.
fn cyclic_graph() -> FakeGraph {
    FakeGraph::default()
        .with_external("admins", node("A"))
        .with_edge(&node("A"), node("B"))
        .with_edge(&node("B"), node("C"))
        .with_edge(&node("C"), node("A"))
}

fn user(key: &str) -> UserPrincipal {
    UserPrincipal::new(
        Principal::new("ldap", key)
            .with_dn(user_dn(key.trim_start_matches("{ldap}")))
            .with_attribute("uid", key.trim_start_matches("{ldap}")),
    )
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn static_dynamic_and_nested_groups_are_combined() -> anyhow::Result<()> {
    let env = TestEnv::build(directory(), users(), cyclic_graph(), |b| b)?;
    let alice = user("alice");

    let groups = env.provider.user_membership(&alice).await;

    assert_eq!(
        *groups,
        set(&["{ldap}admins", "{ldap}everyone", "A:0", "B:0", "C:0"])
    );
    // Each graph node is expanded once despite the cycle.
    assert_eq!(env.graph.traversals(), 3);

    Ok(())
}

#[tokio::test]
async fn closure_is_remembered_on_the_principal() -> anyhow::Result<()> {
    let env = TestEnv::build(directory(), users(), cyclic_graph(), |b| b)?;
    let carol = user("carol");

    let first = env.provider.user_membership(&carol).await;
    assert_eq!(*first, set(&["{ldap}auditors", "{ldap}everyone"]));
    let searches = env.directory.searches();

    let second = env.provider.user_membership(&carol).await;
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(env.directory.searches(), searches);

    carol.forget_groups();
    env.provider.user_membership(&carol).await;
    assert!(env.directory.searches() > searches);

    Ok(())
}

#[tokio::test]
async fn qualified_user_keys_match_dynamic_groups() -> anyhow::Result<()> {
    let env = TestEnv::build(directory(), users(), FakeGraph::default(), |b| b)?;

    let groups = env.provider.user_membership(&user("{ldap}carol")).await;
    assert!(groups.contains("{ldap}everyone"));

    let groups = env.provider.user_membership(&user("bob")).await;
    assert_eq!(*groups, set(&["{ldap}admins"]));

    Ok(())
}

#[tokio::test]
async fn members_referenced_by_user_attribute() -> anyhow::Result<()> {
    let directory = FakeDirectory::new(vec![group_entry("ops", "groupOfUniqueNames")
        .with_attribute("uniqueMember", ["alice", "dave"])]);
    let env = TestEnv::build(directory, users(), FakeGraph::default(), |b| {
        b.member_user_attribute("uid")
    })?;

    let groups = env.provider.user_membership(&user("alice")).await;
    assert_eq!(*groups, set(&["{ldap}ops"]));

    Ok(())
}

#[tokio::test]
async fn users_of_other_providers_have_no_groups() -> anyhow::Result<()> {
    let env = TestEnv::build(directory(), users(), cyclic_graph(), |b| b)?;
    let stranger = UserPrincipal::new(Principal::new("db", "alice").with_dn(user_dn("alice")));

    assert!(env.provider.user_membership(&stranger).await.is_empty());
    assert_eq!(env.directory.searches(), 0);

    Ok(())
}

#[tokio::test]
async fn unavailable_directory_yields_uncached_empty_closure() -> anyhow::Result<()> {
    let env = TestEnv::build(directory(), users(), cyclic_graph(), |b| b)?;
    env.directory.set_unavailable(true);
    let alice = user("alice");

    assert!(env.provider.user_membership(&alice).await.is_empty());
    assert!(alice.cached_groups().is_none());

    env.directory.set_unavailable(false);
    assert_eq!(env.provider.user_membership(&alice).await.len(), 5);
    assert!(alice.cached_groups().is_some());

    Ok(())
}
