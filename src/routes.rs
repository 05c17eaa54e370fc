//! The crate's REST surface.
//!
//! [`router`] builds an `axum` router over [`AppState`], meant to be merged
//! into a host server. The shapes follow the integration endpoints the CRM
//! dashboard consumes, plus the platform-facing webhook handshake.
//!
//! Two commit-bearing endpoints (`/integration/setup/manual` and
//! `/integration/exchange-code`) run their work inside `tokio::spawn`: if
//! the initiating request is aborted by the client mid-exchange, the
//! exchange still runs to completion and commits, so the store is never
//! left ambiguous between "saved" and "not saved".

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{BusinessProfilePatch, ConfigStore, IntegrationConfig, MAX_PROFILE_WEBSITES};
use crate::credentials::{CredentialBundle, FieldError, ValidationResult};
use crate::error::Error;
use crate::exchange::AuthorizationExchanger;
use crate::status::AccountStatusProber;
use crate::webhook::WebhookRegistrar;
use crate::{progress, OrganizationId};

/// Header the surrounding CRM's auth layer uses to convey the
/// authenticated organization.
pub const ORGANIZATION_HEADER: &str = "x-organization-id";

/// Resolves the current session's organization.
///
/// Authentication itself is the host CRM's concern; this seam only answers
/// "which organization is acting". The default [`HeaderIdentity`] trusts
/// the gateway-injected [`ORGANIZATION_HEADER`].
pub trait IdentityProvider: Send + Sync + 'static {
    fn current_organization(&self, headers: &HeaderMap) -> Option<OrganizationId>;
}

/// [`IdentityProvider`] reading the organization from a trusted header.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeaderIdentity;

impl IdentityProvider for HeaderIdentity {
    fn current_organization(&self, headers: &HeaderMap) -> Option<OrganizationId> {
        headers
            .get(ORGANIZATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(OrganizationId::new)
    }
}

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState<S> {
    pub store: S,
    pub exchanger: AuthorizationExchanger<S>,
    pub prober: AccountStatusProber<S>,
    pub registrar: WebhookRegistrar,
    pub identity: Arc<dyn IdentityProvider>,
}

/// Builds the integration router. Merge it into the host application's
/// router; all paths are absolute.
pub fn router<S: ConfigStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/integration/setup/manual", axum::routing::post(manual_setup::<S>))
        .route("/integration/exchange-code", get(exchange_code::<S>))
        .route(
            "/integration/settings/{organization_id}",
            get(get_settings::<S>).put(put_settings::<S>),
        )
        .route("/integration/status/{organization_id}", get(get_status::<S>))
        .route(
            "/integration/progress/{organization_id}",
            get(get_progress::<S>),
        )
        .route(
            "/webhook/{organization_id}",
            get(webhook_verify::<S>).post(webhook_receive::<S>),
        )
        .with_state(state)
}

/// Uniform envelope for the setup endpoints.
#[derive(Serialize, Deserialize, Debug)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Vec<String>>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Maps a crate error onto an HTTP status and the user-facing messages the
/// envelope carries. Security-sensitive failures are logged here with full
/// detail and surfaced generically.
struct ApiFailure(Error);

impl ApiFailure {
    fn status_and_messages(&self) -> (StatusCode, Vec<String>) {
        match &self.0 {
            Error::Validation(result) => {
                (StatusCode::UNPROCESSABLE_ENTITY, result.error_messages())
            }
            Error::CredentialsInvalid { .. } => (
                StatusCode::UNAUTHORIZED,
                vec!["the platform rejected the credentials; reconfigure the integration".into()],
            ),
            Error::StateMismatch | Error::OrganizationMismatch => {
                // Detail was already logged with organization context at the
                // point of failure; leak nothing about the matching here.
                (
                    StatusCode::FORBIDDEN,
                    vec!["setup failed, please retry from the start".into()],
                )
            }
            Error::NotConfigured(org) => (
                StatusCode::NOT_FOUND,
                vec![format!("organization '{org}' is not configured")],
            ),
            Error::ChallengeRejected => {
                (StatusCode::FORBIDDEN, vec!["verification rejected".into()])
            }
            Error::Transient(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                vec!["the messaging platform is unreachable, try again shortly".into()],
            ),
            Error::Api(err) => (StatusCode::BAD_GATEWAY, vec![err.to_string()]),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                vec!["internal error".into()],
            ),
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let (status, messages) = self.status_and_messages();
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(messages),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ManualSetupRequest {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    app_id: String,
    #[serde(default)]
    phone_number_id: String,
    #[serde(default, rename = "wabaId")]
    business_account_id: String,
}

impl From<ManualSetupRequest> for CredentialBundle {
    fn from(req: ManualSetupRequest) -> Self {
        Self {
            access_token: req.access_token,
            app_id: req.app_id,
            phone_number_id: req.phone_number_id,
            business_account_id: req.business_account_id,
        }
    }
}

fn current_organization<S>(
    state: &AppState<S>,
    headers: &HeaderMap,
) -> Result<OrganizationId, Response> {
    state.identity.current_organization(headers).ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::<()> {
                success: false,
                data: None,
                error: Some(vec!["no organization in session".into()]),
            }),
        )
            .into_response()
    })
}

async fn manual_setup<S: ConfigStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Json(request): Json<ManualSetupRequest>,
) -> Response {
    let organization_id = match current_organization(&state, &headers) {
        Ok(org) => org,
        Err(response) => return response,
    };

    let exchanger = state.exchanger.clone();
    let result = tokio::spawn(async move {
        exchanger
            .accept_manual_credentials(&organization_id, request.into())
            .await
    })
    .await
    .unwrap_or_else(|err| Err(Error::internal(err)));

    match result {
        Ok(config) => Json(ApiResponse::ok(config.redacted())).into_response(),
        Err(err) => ApiFailure(err).into_response(),
    }
}

#[derive(Deserialize, Debug)]
struct ExchangeCodeQuery {
    code: String,
    state: String,
}

async fn exchange_code<S: ConfigStore>(
    State(state): State<AppState<S>>,
    headers: HeaderMap,
    Query(query): Query<ExchangeCodeQuery>,
) -> Response {
    let organization_id = match current_organization(&state, &headers) {
        Ok(org) => org,
        Err(response) => return response,
    };

    let exchanger = state.exchanger.clone();
    let result = tokio::spawn(async move {
        exchanger
            .exchange_code(&organization_id, &query.code, &query.state)
            .await
    })
    .await
    .unwrap_or_else(|err| Err(Error::internal(err)));

    match result {
        Ok(config) => Json(ApiResponse::ok(config.redacted())).into_response(),
        Err(err) => ApiFailure(err).into_response(),
    }
}

async fn get_settings<S: ConfigStore>(
    State(state): State<AppState<S>>,
    Path(organization_id): Path<OrganizationId>,
) -> Response {
    match state.store.get(&organization_id).await {
        // Raw credentials never cross this boundary.
        Ok(Some(config)) => Json(config.redacted()).into_response(),
        Ok(None) => ApiFailure(Error::NotConfigured(organization_id)).into_response(),
        Err(err) => ApiFailure(err).into_response(),
    }
}

async fn put_settings<S: ConfigStore>(
    State(state): State<AppState<S>>,
    Path(organization_id): Path<OrganizationId>,
    Json(patch): Json<BusinessProfilePatch>,
) -> Response {
    if let Some(websites) = &patch.websites {
        if websites.len() > MAX_PROFILE_WEBSITES {
            let result = ValidationResult {
                errors: vec![FieldError {
                    field: "websites",
                    message: format!("at most {MAX_PROFILE_WEBSITES} websites are allowed"),
                }],
                warnings: Vec::new(),
            };
            return ApiFailure(Error::Validation(result)).into_response();
        }
    }

    match state
        .store
        .patch_business_profile(&organization_id, patch)
        .await
    {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => ApiFailure(err).into_response(),
    }
}

async fn get_status<S: ConfigStore>(
    State(state): State<AppState<S>>,
    Path(organization_id): Path<OrganizationId>,
) -> Response {
    match state.prober.refresh(&organization_id).await {
        Ok(metadata) => Json(metadata).into_response(),
        Err(err) => ApiFailure(err).into_response(),
    }
}

async fn get_progress<S: ConfigStore>(
    State(state): State<AppState<S>>,
    Path(organization_id): Path<OrganizationId>,
) -> Response {
    let config = match state.store.get(&organization_id).await {
        Ok(config) => config,
        Err(err) => return ApiFailure(err).into_response(),
    };

    // The live probe is one of the independently failable inputs: when it
    // fails the step derivation still answers from persisted state, with
    // status degraded to UNKNOWN rather than a 5xx.
    let live = if config.as_ref().is_some_and(IntegrationConfig::is_configured) {
        match state.prober.refresh(&organization_id).await {
            Ok(metadata) => Some(metadata),
            Err(err) => {
                debug!(organization = %organization_id, "live probe unavailable: {err}");
                None
            }
        }
    } else {
        None
    };

    Json(progress::derive(config.as_ref(), live.as_ref())).into_response()
}

async fn webhook_verify<S: ConfigStore>(
    State(state): State<AppState<S>>,
    Path(organization_id): Path<OrganizationId>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let token = query.get("hub.verify_token").map(String::as_str).unwrap_or_default();
    let challenge = query.get("hub.challenge").map(String::as_str).unwrap_or_default();

    match state
        .registrar
        .verify_challenge(&organization_id, token, challenge)
    {
        Ok(echo) => (StatusCode::OK, echo).into_response(),
        Err(_) => {
            warn!(organization = %organization_id, "webhook verification token mismatch");
            (StatusCode::FORBIDDEN, "verification rejected").into_response()
        }
    }
}

async fn webhook_receive<S: ConfigStore>(
    Path(organization_id): Path<OrganizationId>,
    body: axum::body::Bytes,
) -> Response {
    // Delivery processing is out of scope here; acknowledge so the
    // platform does not retry or disable the subscription.
    debug!(
        organization = %organization_id,
        bytes = body.len(),
        "webhook delivery acknowledged"
    );
    StatusCode::OK.into_response()
}
