//! # dirgroup-federation
//!
//! Interfaces to the systems a group provider depends on but does not own.
//!
//! - [`UserDirectory`] resolves member references and evaluates the stored
//!   queries of dynamic groups.
//! - [`GroupGraph`] exposes group-of-group edges kept outside the directory.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod provider;

pub use error::{FederationError, FederationResult};
pub use provider::{GraphNode, GroupGraph, UserDirectory};
