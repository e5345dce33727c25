//! Directory sessions.
//!
//! A session is opened per logical operation and closed on every exit path.
//! With pooling enabled, open sessions are capped by a semaphore; the permit
//! is held by the session and released when it is dropped.

use std::sync::Arc;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, SearchOptions};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::config::{AuthenticationMode, LdapGroupConfig, ReferralPolicy};
use crate::error::{FailureClass, LdapError, LdapResult};
use crate::search::{LdapEntry, SearchRequest, SearchResponse};

/// Opens directory sessions.
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Opens and authenticates a new session.
    async fn open(&self) -> LdapResult<Box<dyn DirectorySession>>;
}

/// One open directory session.
#[async_trait]
pub trait DirectorySession: Send {
    /// Runs a subtree search.
    ///
    /// Size-limited and referral-truncated results come back as a degraded
    /// [`SearchResponse`]; every other non-success result is an error.
    async fn search(&mut self, request: &SearchRequest) -> LdapResult<SearchResponse>;

    /// Closes the session. Errors are logged, never returned.
    async fn close(&mut self);
}

/// Connector backed by `ldap3`.
pub struct LdapConnector {
    config: Arc<LdapGroupConfig>,
    gate: Option<Arc<Semaphore>>,
}

impl LdapConnector {
    /// Creates a connector. Nothing is opened until [`DirectoryConnector::open`].
    #[must_use]
    pub fn new(config: Arc<LdapGroupConfig>) -> Self {
        let gate = config
            .use_connection_pool
            .then(|| Arc::new(Semaphore::new(config.pool_max_size)));
        Self { config, gate }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LdapGroupConfig {
        &self.config
    }

    /// Free session slots, `None` when pooling is disabled.
    #[must_use]
    pub fn available_permits(&self) -> Option<usize> {
        self.gate.as_ref().map(|gate| gate.available_permits())
    }

    async fn connect(&self) -> LdapResult<Ldap> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.config.connection_timeout);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.config.connection_url)
            .await
            .map_err(|e| LdapError::Connection(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("LDAP connection driver error: {}", e);
            }
        });

        if self.config.authentication_mode == AuthenticationMode::Simple {
            if let Some(bind_dn) = &self.config.bind_dn {
                let credential = self.config.bind_credential.as_deref().unwrap_or_default();
                ldap.simple_bind(bind_dn, credential)
                    .await
                    .map_err(|e| LdapError::Connection(e.to_string()))?
                    .success()
                    .map_err(|e| LdapError::Bind(format!("{bind_dn}: {e}")))?;
            }
        }

        Ok(ldap)
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn open(&self) -> LdapResult<Box<dyn DirectorySession>> {
        let permit = match &self.gate {
            Some(gate) => Some(
                Arc::clone(gate)
                    .acquire_owned()
                    .await
                    .map_err(|_| LdapError::PoolClosed)?,
            ),
            None => None,
        };

        let ldap = self.connect().await?;
        debug!(url = %self.config.connection_url, "opened directory session");

        Ok(Box::new(LdapSession {
            ldap,
            referral: self.config.referral,
            _permit: permit,
        }))
    }
}

/// A session on an `ldap3` connection.
pub struct LdapSession {
    ldap: Ldap,
    referral: ReferralPolicy,
    _permit: Option<OwnedSemaphorePermit>,
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn search(&mut self, request: &SearchRequest) -> LdapResult<SearchResponse> {
        let options = SearchOptions::new().sizelimit(request.size_limit);
        let ldap3::SearchResult(results, outcome) = self
            .ldap
            .with_search_options(options)
            .search(
                &request.base,
                Scope::Subtree,
                &request.filter,
                request.attribute_list(),
            )
            .await?;

        let mut referrals = !outcome.refs.is_empty();
        let entries: Vec<LdapEntry> = results
            .into_iter()
            .filter(|result| {
                let reference = result.is_ref();
                referrals |= reference;
                !reference
            })
            .map(SearchEntry::construct)
            .map(LdapEntry::from_search_entry)
            .collect();

        match classify(outcome.rc, referrals, self.referral) {
            Ok(None) => Ok(SearchResponse::complete(entries)),
            Ok(Some(class)) => Ok(SearchResponse::degraded(entries, class)),
            Err(()) => Err(LdapError::search(outcome.rc, outcome.text)),
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ldap.unbind().await {
            debug!("unbind failed: {}", e);
        }
    }
}

/// Maps a search outcome onto the degradation classes.
///
/// `Ok(None)` is a complete result, `Ok(Some(_))` a usable partial one and
/// `Err(())` a failed search.
fn classify(rc: u32, referrals: bool, policy: ReferralPolicy) -> Result<Option<FailureClass>, ()> {
    let throw = policy == ReferralPolicy::Throw;
    match rc {
        0 if referrals && throw => Ok(Some(FailureClass::PartialResult)),
        0 => Ok(None),
        FailureClass::REFERRAL if throw => Ok(Some(FailureClass::PartialResult)),
        FailureClass::REFERRAL => Ok(None),
        rc => {
            let class = FailureClass::from_result_code(rc);
            if class.keeps_entries() {
                Ok(Some(class))
            } else {
                Err(())
            }
        }
    }
}
