//! End-to-End Integration Tests
//!
//! These tests drive the LDAP group provider against an in-memory directory,
//! user directory and group graph that count every round-trip.

mod common;
mod group_lookup;
mod membership_closure;
