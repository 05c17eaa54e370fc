//! Error Handling
//!
//! This module defines the crate's error taxonomy. The variants are split by
//! what the caller can do about them: correct the input (`Validation`),
//! re-enter credentials (`CredentialsInvalid`), restart the authorization
//! flow (`StateMismatch` / `OrganizationMismatch`), retry later
//! (`Transient`), or complete setup first (`NotConfigured`).

use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::credentials::ValidationResult;
use crate::OrganizationId;

/// A convenient type alias for a boxed, trait-object error that can be sent
/// across threads.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// The **top-level error enum** for the `whatsapp-onboarding-rs` crate.
///
/// It uses `#[non_exhaustive]` to allow for future additions of error
/// variants without breaking client code.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A submitted credential bundle failed format validation.
    ///
    /// This is purely local: no network call was made, and the contained
    /// [`ValidationResult`] carries one error per failed field so the caller
    /// can report all of them at once.
    #[error("credential validation failed: {0}")]
    Validation(ValidationResult),

    /// The platform rejected the credentials themselves (expired or revoked
    /// token, wrong app). Retrying without new credentials is pointless;
    /// callers should prompt for reconfiguration instead.
    #[error("the platform rejected the credentials")]
    CredentialsInvalid {
        #[source]
        source: Option<GraphError>,
    },

    /// The `state` presented at the authorization callback does not match
    /// any state issued at authorization start.
    ///
    /// Security-sensitive: never retried, and surfaced to end users only as
    /// a generic "restart the flow" message.
    #[error("authorization state mismatch")]
    StateMismatch,

    /// The authorization flow was started for a different organization than
    /// the one completing it. Security-sensitive, same handling as
    /// [`Error::StateMismatch`].
    #[error("authorization was started for a different organization")]
    OrganizationMismatch,

    /// The organization has never completed setup. Distinct from
    /// "misconfigured": there is nothing stored to act on at all.
    #[error("organization '{0}' has no integration configuration")]
    NotConfigured(OrganizationId),

    /// An inbound webhook verification handshake presented a token that does
    /// not match the organization's expected verify token.
    #[error("webhook verification rejected")]
    ChallengeRejected,

    /// A network-level failure (timeout, connect, 5xx) that is worth
    /// retrying with backoff. Bounded retries happen inside the crate before
    /// this surfaces.
    #[error("a transient network error occurred: {0}")]
    Transient(#[source] BoxError),

    /// A non-auth error reported by the platform in an API response body.
    /// 4xx-class: surfaced immediately, never retried.
    #[error("the platform returned an error: {0}")]
    Api(#[from] GraphError),

    /// An internal logic error within the crate, or an error caused by
    /// invalid input that should have been caught earlier.
    #[error("an internal error occurred: {0}")]
    Internal(#[source] BoxError),
}

impl Error {
    pub(crate) fn transient(err: impl Into<BoxError>) -> Self {
        Self::Transient(err.into())
    }

    pub(crate) fn internal(err: impl Into<BoxError>) -> Self {
        Self::Internal(err.into())
    }

    /// Whether retrying the same operation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        if value.is_builder() || value.is_redirect() {
            // Request composition errors point to internal misconfiguration,
            // not to anything the network did.
            Self::internal(value)
        } else {
            // Timeouts, connect failures, and body errors are all retryable
            // from the caller's point of view.
            Self::transient(value)
        }
    }
}

/// An error **reported by the platform itself** in an API response body.
///
/// This is distinct from the crate's own [`Error`] enum: it describes what
/// the Graph API said, parsed from the `{ "error": { ... } }` envelope.
#[derive(thiserror::Error, Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct GraphError {
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_subcode: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fbtrace_id: Option<String>,
}

impl GraphError {
    /// Platform error code for an invalid or expired OAuth access token.
    const INVALID_TOKEN_CODE: i64 = 190;

    /// Whether this error indicates the credentials themselves were
    /// rejected, as opposed to the request being malformed or rate-limited.
    pub fn is_auth_error(&self) -> bool {
        self.code == Self::INVALID_TOKEN_CODE || self.r#type.as_deref() == Some("OAuthException")
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(code: {})", self.code)?;

        if let Some(r#type) = &self.r#type {
            write!(f, " (type: {type})")?;
        }

        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }

        if let Some(id) = &self.fbtrace_id {
            write!(f, " [trace: {id}]")?;
        }

        Ok(())
    }
}
