#![deny(clippy::large_enum_variant)]

//! # whatsapp_onboarding_rs
//!
//! Per-organization WhatsApp Business **account linking and configuration
//! lifecycle** for multi-tenant applications: everything that must happen
//! before any messaging can occur, and nothing that happens after.
//!
//! ## What's inside
//!
//! - **Credential validation**: pure format checks on the four-field
//!   credential bundle, collecting every problem at once.
//! - **Authorization exchange**: redeem an embedded-signup code (with
//!   server-side one-shot state matching) or accept manually entered
//!   credentials, proven live before a single atomic commit.
//! - **Configuration store**: one [`config::IntegrationConfig`] per
//!   organization, full-replace writes, partial updates for the business
//!   profile only.
//! - **Status probing**: live phone/WABA health (quality rating, review
//!   status, messaging limits) normalized into a stable shape, degrading
//!   gracefully when the platform is unreachable.
//! - **Setup progress**: a pure priority chain deriving the wizard step
//!   from persisted state.
//! - **Webhook registration**: deterministic per-organization callback URL
//!   and HMAC-derived verify token, plus the `hub.challenge` handshake.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use whatsapp_onboarding_rs::{
//!     config::MemoryConfigStore,
//!     exchange::AuthorizationExchanger,
//!     graph::GraphClient,
//!     routes::{self, AppState, HeaderIdentity},
//!     status::AccountStatusProber,
//!     webhook::WebhookRegistrar,
//! };
//!
//! # fn example() -> Result<(), whatsapp_onboarding_rs::Error> {
//! let graph = GraphClient::builder()
//!     .app_credentials("YOUR_APP_ID", "YOUR_APP_SECRET")
//!     .build()?;
//! let store = MemoryConfigStore::new();
//!
//! let app = routes::router(AppState {
//!     store: store.clone(),
//!     exchanger: AuthorizationExchanger::new(graph.clone(), store.clone()),
//!     prober: AccountStatusProber::new(graph, store),
//!     registrar: WebhookRegistrar::new("https://crm.example.com", "WEBHOOK_SECRET"),
//!     identity: Arc::new(HeaderIdentity),
//! });
//! // Merge `app` into your host router and serve it.
//! # Ok(()) }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod config;
pub mod credentials;
pub mod error;
pub mod exchange;
pub mod graph;
pub mod progress;
pub mod routes;
pub mod status;
pub mod webhook;

pub use config::{ConfigStore, IntegrationConfig, MemoryConfigStore};
pub use credentials::{CredentialBundle, ValidationResult};
pub use error::{Error, GraphError};
pub use progress::{SetupProgress, SetupStep};
pub use webhook::WebhookConfig;

/// Identifies one tenant organization. The full partition key for every
/// piece of state this crate holds.
#[derive(Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Clone, Debug)]
#[serde(transparent)]
pub struct OrganizationId(String);

impl OrganizationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrganizationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for OrganizationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Masks an access token for any output that crosses the service boundary:
/// enough to recognize, never enough to use.
pub(crate) fn mask_token(token: &str) -> String {
    if token.len() <= 8 || !token.is_ascii() {
        return "••••".to_owned();
    }
    format!("{}••••{}", &token[..4], &token[token.len() - 4..])
}
