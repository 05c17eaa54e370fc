//! Webhook registration and the verification handshake.
//!
//! The platform must be configured with a callback URL and a shared verify
//! token per organization. [`WebhookRegistrar::describe`] computes both
//! deterministically. The token is an HMAC of the organization id under a
//! service-wide secret, so it is stable across calls (the platform caches
//! it) yet unguessable, unlike a raw organization slug.
//!
//! [`WebhookRegistrar::verify_challenge`] answers the platform's GET
//! handshake: echo `hub.challenge` when `hub.verify_token` matches, reject
//! otherwise.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::Error;
use crate::OrganizationId;

/// Path segment under which per-organization webhook endpoints live.
const WEBHOOK_PATH: &str = "webhook";

/// The values the platform must be configured with for one organization.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct WebhookConfig {
    pub webhook_url: String,
    pub verify_token: String,
}

/// Computes and verifies per-organization webhook endpoints.
#[derive(Clone, Debug)]
pub struct WebhookRegistrar {
    public_base_url: String,
    secret: String,
}

impl WebhookRegistrar {
    /// `public_base_url` is the service's externally reachable origin;
    /// `secret` is a service-wide value the verify tokens are derived from.
    /// Rotating the secret invalidates every organization's registration.
    pub fn new(public_base_url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into().trim_end_matches('/').to_owned(),
            secret: secret.into(),
        }
    }

    /// The webhook URL and verify token for one organization. Deterministic:
    /// calling this twice yields byte-identical output, so the platform can
    /// be reconfigured idempotently.
    pub fn describe(&self, organization_id: &OrganizationId) -> WebhookConfig {
        WebhookConfig {
            webhook_url: format!(
                "{}/{WEBHOOK_PATH}/{organization_id}",
                self.public_base_url
            ),
            verify_token: self.verify_token(organization_id),
        }
    }

    fn verify_token(&self, organization_id: &OrganizationId) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(organization_id.as_str().as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Answers the inbound verification handshake for one organization.
    ///
    /// Returns the challenge to echo when the presented token matches the
    /// expected one (constant-time comparison); any other token, even one
    /// character off, fails with [`Error::ChallengeRejected`].
    pub fn verify_challenge(
        &self,
        organization_id: &OrganizationId,
        token: &str,
        challenge: &str,
    ) -> Result<String, Error> {
        let expected = self.verify_token(organization_id);
        if expected.as_bytes().ct_eq(token.as_bytes()).into() {
            Ok(challenge.to_owned())
        } else {
            Err(Error::ChallengeRejected)
        }
    }
}
