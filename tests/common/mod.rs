use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use whatsapp_onboarding_rs::config::MemoryConfigStore;
use whatsapp_onboarding_rs::credentials::CredentialBundle;
use whatsapp_onboarding_rs::exchange::AuthorizationExchanger;
use whatsapp_onboarding_rs::graph::GraphClient;
use whatsapp_onboarding_rs::routes::{AppState, HeaderIdentity};
use whatsapp_onboarding_rs::status::AccountStatusProber;
use whatsapp_onboarding_rs::webhook::WebhookRegistrar;

// --- CONSTANTS ---
#[allow(dead_code)]
pub const ORG_ID: &str = "org-42";
#[allow(dead_code)]
pub const APP_ID: &str = "123456789012345";
#[allow(dead_code)]
pub const APP_SECRET: &str = "a1b2c3d4e5f6";
#[allow(dead_code)]
pub const WABA_ID: &str = "987654321098765";
#[allow(dead_code)]
pub const PHONE_ID: &str = "111222333444555";
#[allow(dead_code)]
pub const ACCESS_TOKEN: &str = "EAAGxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx";
#[allow(dead_code)]
pub const WEBHOOK_SECRET: &str = "webhook-derivation-secret";
#[allow(dead_code)]
pub const PUBLIC_BASE_URL: &str = "https://crm.example.com";

/// A graph client pointed at the mock platform, with short timeouts so
/// failure tests stay fast.
#[allow(dead_code)]
pub fn graph_for(server: &wiremock::MockServer) -> GraphClient {
    GraphClient::builder()
        .app_credentials(APP_ID, APP_SECRET)
        .api_version("23.0")
        .base_url(server.uri())
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Full application state over an in-memory store.
#[allow(dead_code)]
pub fn state_for(server: &wiremock::MockServer) -> AppState<MemoryConfigStore> {
    let graph = graph_for(server);
    let store = MemoryConfigStore::new();
    AppState {
        store: store.clone(),
        exchanger: AuthorizationExchanger::new(graph.clone(), store.clone()),
        prober: AccountStatusProber::new(graph, store),
        registrar: WebhookRegistrar::new(PUBLIC_BASE_URL, WEBHOOK_SECRET),
        identity: Arc::new(HeaderIdentity),
    }
}

#[allow(dead_code)]
pub fn bundle() -> CredentialBundle {
    CredentialBundle {
        access_token: ACCESS_TOKEN.into(),
        app_id: APP_ID.into(),
        phone_number_id: PHONE_ID.into(),
        business_account_id: WABA_ID.into(),
    }
}

/// `debug_token` response for a live token with WABA management granted.
#[allow(dead_code)]
pub fn debug_token_body() -> Value {
    json!({
        "data": {
            "app_id": APP_ID,
            "is_valid": true,
            "scopes": ["whatsapp_business_management", "whatsapp_business_messaging"],
            "granular_scopes": [
                { "scope": "whatsapp_business_management", "target_ids": [WABA_ID] }
            ]
        }
    })
}

/// Phone-number projection as the platform returns it.
#[allow(dead_code)]
pub fn phone_metadata_body() -> Value {
    json!({
        "id": PHONE_ID,
        "display_phone_number": "+1 555-010-0042",
        "verified_name": "Acme Stores",
        "quality_rating": "GREEN",
        "code_verification_status": "VERIFIED",
        "name_status": "APPROVED",
        "messaging_limit_tier": "TIER_1K"
    })
}

#[allow(dead_code)]
pub fn auth_error_body() -> Value {
    json!({
        "error": {
            "message": "Error validating access token: The session has been invalidated.",
            "type": "OAuthException",
            "code": 190,
            "fbtrace_id": "A4Kxyz"
        }
    })
}
