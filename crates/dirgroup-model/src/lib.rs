//! # dirgroup-model
//!
//! Domain models for directory-backed group resolution.
//!
//! This crate defines the group record produced from a directory entry and the
//! principal references that populate its member set.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod group;
pub mod principal;

pub use group::{Group, MemberMap, MembershipKind, GLOBAL_SITE};
pub use principal::{Principal, UserPrincipal};
