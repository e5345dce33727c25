//! # dirgroup-ldap
//!
//! LDAP-backed group provider using `ldap3`.
//!
//! ## Pipeline
//!
//! ```text
//! LdapGroupProvider::lookup_group
//!   -> GroupCacheProvider (positive, then negative)
//!   -> FilterBuilder -> DirectorySession::search
//!   -> RangeAttributeLoader (oversized member attributes)
//!   -> EntryTranslator -> MembershipResolver (when preloading)
//!   -> GroupCacheProvider::populate
//! ```
//!
//! User membership is computed separately by the
//! [`MembershipClosureWalker`], which also walks the external group graph.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod closure;
pub mod config;
pub mod connection;
pub mod error;
pub mod filter;
pub mod membership;
pub mod provider;
pub mod range;
pub mod search;
pub mod translator;

pub use closure::{ClosureWalk, MembershipClosureWalker};
pub use config::{
    AuthenticationMode, LdapGroupConfig, LdapGroupConfigBuilder, MemberReference, ReferralPolicy,
};
pub use connection::{DirectoryConnector, DirectorySession, LdapConnector, LdapSession};
pub use error::{FailureClass, LdapError, LdapResult};
pub use filter::{escape_filter_value, escape_literal_value, FilterBuilder};
pub use membership::MembershipResolver;
pub use provider::LdapGroupProvider;
pub use range::{RangeAttributeLoader, RangeSpec, RangeState};
pub use search::{GroupSearcher, LdapEntry, SearchRequest, SearchResponse};
pub use translator::{flatten_values, EntryTranslator};
