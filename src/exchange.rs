//! Authorization exchange: turning an embedded-signup redirect or a
//! manually-entered credential bundle into a committed, complete
//! [`IntegrationConfig`].
//!
//! The exchange is all-or-nothing. Nothing is written to the
//! [`ConfigStore`] until the credentials are proven live and the account
//! metadata has been fetched, so readers can never observe a half-linked
//! organization.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{ConfigStore, IntegrationConfig};
use crate::credentials::{self, CredentialBundle};
use crate::error::Error;
use crate::graph::GraphClient;
use crate::OrganizationId;

/// How long an issued authorization state stays redeemable.
const STATE_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug)]
struct PendingAuthorization {
    organization_id: OrganizationId,
    issued_at: Instant,
}

/// Server-side store of short-lived, one-shot authorization states.
///
/// A state token is issued when an organization starts the redirect flow and
/// must come back unchanged on the callback. Consuming is one-shot: whether
/// the check passes or not, the entry is destroyed, so a captured state
/// cannot be replayed.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<Mutex<HashMap<String, PendingAuthorization>>>,
    ttl: Duration,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::with_ttl(STATE_TTL)
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose entries expire after `ttl` instead of the default ten
    /// minutes.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Arc::default(),
            ttl,
        }
    }

    /// Issues a fresh state token bound to `organization_id`.
    pub async fn issue(&self, organization_id: &OrganizationId) -> String {
        let token = hex::encode(rand::random::<[u8; 32]>());
        let mut states = self.inner.lock().await;
        states.retain(|_, pending| pending.issued_at.elapsed() < self.ttl);
        states.insert(
            token.clone(),
            PendingAuthorization {
                organization_id: organization_id.clone(),
                issued_at: Instant::now(),
            },
        );
        token
    }

    /// Verifies and destroys a state token.
    ///
    /// The token comparison is constant-time over every stored entry so the
    /// lookup leaks nothing about which states exist. Expired entries and
    /// entries issued for a different organization both fail closed.
    pub async fn consume(
        &self,
        organization_id: &OrganizationId,
        state: &str,
    ) -> Result<(), Error> {
        let mut states = self.inner.lock().await;

        let mut matched: Option<String> = None;
        for key in states.keys() {
            if key.as_bytes().ct_eq(state.as_bytes()).into() {
                matched = Some(key.clone());
            }
        }

        let Some(key) = matched else {
            return Err(Error::StateMismatch);
        };
        // One-shot either way: a failed check still burns the entry.
        let pending = states.remove(&key).ok_or(Error::StateMismatch)?;

        if pending.issued_at.elapsed() >= self.ttl {
            return Err(Error::StateMismatch);
        }
        if pending.organization_id != *organization_id {
            return Err(Error::OrganizationMismatch);
        }
        Ok(())
    }
}

/// Converts an authorization into durable, committed credentials.
///
/// Two entry points, per the two ways an organization can link its account:
/// - [`exchange_code`](AuthorizationExchanger::exchange_code) for the
///   redirect-based embedded-signup flow, and
/// - [`accept_manual_credentials`](AuthorizationExchanger::accept_manual_credentials)
///   for a hand-entered bundle.
#[derive(Clone)]
pub struct AuthorizationExchanger<S> {
    graph: GraphClient,
    store: S,
    states: StateStore,
}

impl<S: ConfigStore> AuthorizationExchanger<S> {
    pub fn new(graph: GraphClient, store: S) -> Self {
        Self {
            graph,
            store,
            states: StateStore::new(),
        }
    }

    /// Starts the redirect-based flow: issues the state the callback must
    /// echo. The caller embeds this in the authorization URL.
    pub async fn begin(&self, organization_id: &OrganizationId) -> String {
        self.states.issue(organization_id).await
    }

    /// Redeems a one-time authorization code from the embedded-signup
    /// redirect.
    ///
    /// The state check runs before anything touches the network; a mismatch
    /// terminates the flow with no code redemption and no store write. On
    /// success the durable token, the WABA discovered from the token's
    /// grants, and the account metadata are committed in a single atomic
    /// `set`.
    pub async fn exchange_code(
        &self,
        organization_id: &OrganizationId,
        code: &str,
        state: &str,
    ) -> Result<IntegrationConfig, Error> {
        if let Err(err) = self.states.consume(organization_id, state).await {
            warn!(organization = %organization_id, "authorization state check failed: {err}");
            return Err(err);
        }

        let token = self.graph.exchange_code(code).await?;

        // The redirect carries no account ids; recover the WABA from the
        // token's granular grants and the phone number from the WABA.
        let debug = self.graph.debug_token(&token.access_token).await?;
        let business_account_id = debug
            .business_account_id()
            .ok_or(Error::CredentialsInvalid { source: None })?
            .to_owned();

        let numbers = self
            .graph
            .list_phone_numbers(&token.access_token, &business_account_id)
            .await?;
        let phone = numbers
            .into_iter()
            .next()
            .ok_or(Error::CredentialsInvalid { source: None })?;
        let phone_number_id = phone
            .id
            .clone()
            .ok_or(Error::CredentialsInvalid { source: None })?;

        let credentials = CredentialBundle {
            access_token: token.access_token,
            app_id: self.graph.app_id().to_owned(),
            phone_number_id,
            business_account_id,
        };

        let mut config = IntegrationConfig::new(organization_id.clone(), credentials, true);
        config.account_metadata = phone.into_metadata();
        self.enrich(&mut config).await;

        self.store.set(config.clone()).await?;
        info!(organization = %organization_id, "embedded signup exchange committed");
        Ok(config)
    }

    /// Accepts a manually-entered credential bundle.
    ///
    /// Format validation runs first and fails fast; a rejected bundle
    /// never costs a network call. A valid-looking bundle is then proven
    /// live against the platform (`debug_token` plus a metadata read) before
    /// the single atomic commit.
    pub async fn accept_manual_credentials(
        &self,
        organization_id: &OrganizationId,
        bundle: CredentialBundle,
    ) -> Result<IntegrationConfig, Error> {
        let result = credentials::validate(&bundle);
        if !result.is_valid() {
            return Err(Error::Validation(result));
        }

        self.graph.debug_token(&bundle.access_token).await?;
        let metadata = self.graph.phone_number_metadata(&bundle).await?;

        let mut config = IntegrationConfig::new(organization_id.clone(), bundle, false);
        config.account_metadata = metadata;
        self.enrich(&mut config).await;

        self.store.set(config.clone()).await?;
        info!(organization = %organization_id, "manual credential setup committed");
        Ok(config)
    }

    /// Best-effort enrichment after the required metadata is in hand: WABA
    /// review status and the existing business profile. Either probe may
    /// fail without blocking the commit.
    async fn enrich(&self, config: &mut IntegrationConfig) {
        let (review, profile) = futures::join!(
            self.graph.account_review_status(&config.credentials),
            self.graph.business_profile(&config.credentials),
        );

        match review {
            Ok(status) => config.account_metadata.account_review_status = status,
            Err(err) => warn!(
                organization = %config.organization_id,
                "account review probe failed, defaulting to UNKNOWN: {err}"
            ),
        }
        match profile {
            Ok(profile) => config.business_profile = profile,
            Err(err) => warn!(
                organization = %config.organization_id,
                "business profile probe failed, starting empty: {err}"
            ),
        }
    }
}
