//! Outbound Graph API client.
//!
//! [`GraphClient`] wraps the handful of platform calls the onboarding
//! lifecycle needs: redeeming an embedded-signup code, introspecting a
//! token, and reading phone-number / WABA / business-profile state. It owns
//! the error mapping (auth rejection vs. transient vs. plain API error) and
//! a small bounded retry loop for transient failures.
//!
//! # Example
//! ```rust,no_run
//! use whatsapp_onboarding_rs::graph::GraphClient;
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), whatsapp_onboarding_rs::Error> {
//! let graph = GraphClient::builder()
//!     .app_credentials("123456789012345", "YOUR_APP_SECRET")
//!     .api_version("23.0")
//!     .timeout(Duration::from_secs(10))
//!     .build()?;
//! # Ok(()) }
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{AccountMetadata, AccountReviewStatus, BusinessProfile};
use crate::credentials::CredentialBundle;
use crate::error::{Error, GraphError};

/// Default Graph API version.
const DEFAULT_API_VERSION: &str = "23.0";
/// Production Graph API origin.
const DEFAULT_BASE_URL: &str = "https://graph.facebook.com";
/// Outbound calls get their own deadline, distinct from whatever inbound
/// request is waiting on them; a hung platform call must not wedge the
/// onboarding UI.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default user agent for the client.
const USER_AGENT: &str = "whatsapp-onboarding-rs/0.1 (Rust)";

/// Extra attempts after the first, transient failures only.
const TRANSIENT_RETRIES: u32 = 2;
/// First backoff delay; doubled per attempt.
const RETRY_BACKOFF: Duration = Duration::from_millis(250);

/// Fields requested when projecting a phone number.
const PHONE_NUMBER_FIELDS: &str = "display_phone_number,verified_name,quality_rating,\
     code_verification_status,name_status,messaging_limit_tier";
/// Fields requested when projecting a business profile.
const PROFILE_FIELDS: &str = "about,address,description,email,websites,vertical";

/// A typed client for the platform's Graph API, scoped to one Meta App.
///
/// Cloning is cheap; the underlying HTTP client and configuration are
/// shared.
#[derive(Clone, Debug)]
pub struct GraphClient {
    inner: Arc<InnerClient>,
}

#[derive(Debug)]
struct InnerClient {
    http: reqwest::Client,
    base_url: String,
    api_version: String,
    app_id: String,
    app_secret: String,
}

/// Builder for [`GraphClient`].
#[derive(Debug)]
#[must_use]
pub struct GraphClientBuilder {
    timeout: Duration,
    base_url: String,
    api_version: String,
    app_id: String,
    app_secret: String,
}

impl Default for GraphClientBuilder {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_version: DEFAULT_API_VERSION.to_owned(),
            app_id: String::new(),
            app_secret: String::new(),
        }
    }
}

impl GraphClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The Meta App this service exchanges codes through. Required for
    /// `oauth/access_token` and `debug_token`.
    pub fn app_credentials(
        mut self,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Self {
        self.app_id = app_id.into();
        self.app_secret = app_secret.into();
        self
    }

    /// Per-call deadline for outbound platform requests. Defaults to 10s.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Graph API version, with or without the `v` prefix.
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Override the Graph API origin. Intended for tests pointing at a mock
    /// server.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn build(self) -> Result<GraphClient, Error> {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(GraphClient {
            inner: Arc::new(InnerClient {
                http,
                base_url: self.base_url.trim_end_matches('/').to_owned(),
                api_version: self.api_version.trim_start_matches('v').to_owned(),
                app_id: self.app_id,
                app_secret: self.app_secret,
            }),
        })
    }
}

/// A durable access token returned by the code exchange.
#[derive(Deserialize, Clone, Debug)]
#[non_exhaustive]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Seconds until expiry, when the platform reports one.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Token introspection result from `debug_token`.
#[derive(Deserialize, Clone, Debug)]
#[non_exhaustive]
pub struct TokenDebug {
    #[serde(default)]
    pub app_id: Option<String>,
    pub is_valid: bool,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub granular_scopes: Vec<GranularScope>,
}

/// One scope grant with the concrete object ids it applies to.
#[derive(Deserialize, Clone, Debug)]
#[non_exhaustive]
pub struct GranularScope {
    pub scope: String,
    #[serde(default)]
    pub target_ids: Vec<String>,
}

impl TokenDebug {
    /// The WABA id granted through the signup flow, when present.
    pub fn business_account_id(&self) -> Option<&str> {
        self.granular_scopes
            .iter()
            .find(|s| s.scope == "whatsapp_business_management")
            .and_then(|s| s.target_ids.first())
            .map(String::as_str)
    }
}

/// A phone number as the platform projects it.
#[derive(Deserialize, Clone, Debug)]
#[non_exhaustive]
pub struct PhoneNumberInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_phone_number: Option<String>,
    #[serde(default)]
    pub verified_name: Option<String>,
    #[serde(default)]
    pub quality_rating: Option<crate::config::QualityRating>,
    #[serde(default)]
    pub code_verification_status: Option<String>,
    #[serde(default)]
    pub name_status: Option<String>,
    #[serde(default)]
    pub messaging_limit_tier: Option<String>,
}

impl PhoneNumberInfo {
    /// Normalize into the stable shape the rest of the crate consumes.
    pub(crate) fn into_metadata(self) -> AccountMetadata {
        AccountMetadata {
            display_phone_number: self.display_phone_number,
            verified_name: self.verified_name,
            quality_rating: self.quality_rating.unwrap_or_default(),
            name_status: self.name_status,
            number_status: self.code_verification_status,
            account_review_status: AccountReviewStatus::default(),
            messaging_limit_tier: self.messaging_limit_tier,
        }
    }
}

#[derive(Serialize, Debug)]
struct ExchangeCodeRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
}

#[derive(Deserialize, Debug)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize, Debug)]
struct WabaReviewResponse {
    #[serde(default)]
    account_review_status: Option<AccountReviewStatus>,
}

impl GraphClient {
    pub fn builder() -> GraphClientBuilder {
        GraphClientBuilder::new()
    }

    /// The Meta App id this client exchanges codes through.
    pub fn app_id(&self) -> &str {
        &self.inner.app_id
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/v{}/{}",
            self.inner.base_url, self.inner.api_version, path
        )
    }

    /// The app token used to authorize `debug_token` introspection.
    fn app_token(&self) -> String {
        format!("{}|{}", self.inner.app_id, self.inner.app_secret)
    }

    /// Redeems a one-time embedded-signup code for a durable access token.
    pub async fn exchange_code(&self, code: &str) -> Result<AccessToken, Error> {
        let request = self.inner.http.get(self.url("oauth/access_token")).query(
            &ExchangeCodeRequest {
                client_id: &self.inner.app_id,
                client_secret: &self.inner.app_secret,
                code,
            },
        );
        self.execute("oauth/access_token", request).await
    }

    /// Introspects an access token. This is the liveness round-trip for
    /// manually entered credentials: format validation cannot catch a
    /// revoked or copy-pasted-wrong token, `debug_token` can.
    pub async fn debug_token(&self, token: &str) -> Result<TokenDebug, Error> {
        let request = self
            .inner
            .http
            .get(self.url("debug_token"))
            .query(&[("input_token", token), ("access_token", &self.app_token())]);

        let debug: DataEnvelope<TokenDebug> = self.execute("debug_token", request).await?;
        if !debug.data.is_valid {
            return Err(Error::CredentialsInvalid { source: None });
        }
        Ok(debug.data)
    }

    /// Reads the live state of the configured phone number.
    pub async fn phone_number_metadata(
        &self,
        credentials: &CredentialBundle,
    ) -> Result<AccountMetadata, Error> {
        let request = self
            .inner
            .http
            .get(self.url(&credentials.phone_number_id))
            .bearer_auth(&credentials.access_token)
            .query(&[("fields", PHONE_NUMBER_FIELDS)]);

        let info: PhoneNumberInfo = self.execute("phone_number", request).await?;
        Ok(info.into_metadata())
    }

    /// Lists the phone numbers attached to a WABA. Used during the
    /// embedded-signup path, where the signup flow grants a WABA but the
    /// redirect carries no phone number id.
    pub async fn list_phone_numbers(
        &self,
        access_token: &str,
        business_account_id: &str,
    ) -> Result<Vec<PhoneNumberInfo>, Error> {
        let request = self
            .inner
            .http
            .get(self.url(&format!("{business_account_id}/phone_numbers")))
            .bearer_auth(access_token)
            .query(&[("fields", format!("id,{PHONE_NUMBER_FIELDS}"))]);

        let list: DataEnvelope<Vec<PhoneNumberInfo>> =
            self.execute("phone_numbers", request).await?;
        Ok(list.data)
    }

    /// Reads the WABA's review status.
    pub async fn account_review_status(
        &self,
        credentials: &CredentialBundle,
    ) -> Result<AccountReviewStatus, Error> {
        let request = self
            .inner
            .http
            .get(self.url(&credentials.business_account_id))
            .bearer_auth(&credentials.access_token)
            .query(&[("fields", "account_review_status")]);

        let review: WabaReviewResponse = self.execute("account_review_status", request).await?;
        Ok(review.account_review_status.unwrap_or_default())
    }

    /// Reads the phone number's public business profile.
    pub async fn business_profile(
        &self,
        credentials: &CredentialBundle,
    ) -> Result<BusinessProfile, Error> {
        let request = self
            .inner
            .http
            .get(self.url(&format!(
                "{}/whatsapp_business_profile",
                credentials.phone_number_id
            )))
            .bearer_auth(&credentials.access_token)
            .query(&[("fields", PROFILE_FIELDS)]);

        let profiles: DataEnvelope<Vec<BusinessProfile>> =
            self.execute("whatsapp_business_profile", request).await?;
        Ok(profiles.data.into_iter().next().unwrap_or_default())
    }

    /// Sends a request with bounded retries for transient failures and maps
    /// the response through the crate's error taxonomy.
    async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<T, Error> {
        let mut backoff = RETRY_BACKOFF;
        let mut attempt = 0u32;

        loop {
            let cloned = request
                .try_clone()
                .ok_or_else(|| Error::internal("unclonable graph request"))?;

            let result = match cloned.send().await {
                Ok(response) => Self::handle_response(endpoint, response).await,
                Err(err) => Err(err.into()),
            };

            match result {
                Err(err) if err.is_retryable() && attempt < TRANSIENT_RETRIES => {
                    attempt += 1;
                    debug!(endpoint, attempt, "retrying transient graph failure: {err}");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                other => return other,
            }
        }
    }

    /// Handles API responses with consistent error mapping.
    async fn handle_response<T: DeserializeOwned>(
        endpoint: &str,
        response: Response,
    ) -> Result<T, Error> {
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            return serde_json::from_slice(&body).map_err(|err| {
                Error::internal(format!(
                    "unexpected payload from '{endpoint}': {err} (body: '{}')",
                    String::from_utf8_lossy(&body)
                ))
            });
        }

        // Platform errors arrive as `{ "error": { ... } }`.
        #[derive(Deserialize, Debug)]
        struct ErrorEnvelope {
            error: GraphError,
        }

        match serde_json::from_slice::<ErrorEnvelope>(&body) {
            Ok(envelope) if status.as_u16() == 401 || envelope.error.is_auth_error() => {
                Err(Error::CredentialsInvalid {
                    source: Some(envelope.error),
                })
            }
            Ok(envelope) if status.is_server_error() => Err(Error::transient(envelope.error)),
            Ok(envelope) => Err(Error::Api(envelope.error)),
            // A 401 means the credentials were rejected even when the body
            // carries no parseable envelope.
            Err(_) if status.as_u16() == 401 => Err(Error::CredentialsInvalid { source: None }),
            Err(_) if status.is_server_error() => Err(Error::transient(format!(
                "'{endpoint}' returned HTTP {status} with an unstructured body"
            ))),
            Err(err) => Err(Error::internal(format!(
                "unparseable error from '{endpoint}' (HTTP {status}): {err} (body: '{}')",
                String::from_utf8_lossy(&body)
            ))),
        }
    }
}
