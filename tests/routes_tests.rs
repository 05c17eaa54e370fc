mod common;

use common::*;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt as _;
use whatsapp_onboarding_rs::config::{IntegrationConfig, MemoryConfigStore};
use whatsapp_onboarding_rs::routes::{self, AppState, ORGANIZATION_HEADER};
use whatsapp_onboarding_rs::webhook::WebhookRegistrar;
use whatsapp_onboarding_rs::{ConfigStore as _, OrganizationId};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn app(state: AppState<MemoryConfigStore>) -> Router {
    routes::router(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn seed_configured(store: &MemoryConfigStore) -> OrganizationId {
    let org = OrganizationId::new(ORG_ID);
    let mut config = IntegrationConfig::new(org.clone(), bundle(), true);
    config.account_metadata.display_phone_number = Some("+1 555-010-0042".into());
    config.business_profile.about = Some("Acme Stores".into());
    store.set(config).await.unwrap();
    org
}

#[tokio::test]
async fn progress_for_a_fresh_organization_is_all_pending() {
    let server = MockServer::start().await;
    let response = app(state_for(&server))
        .oneshot(
            Request::get(format!("/integration/progress/{ORG_ID}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["isConfigured"], json!(false));
    assert_eq!(body["hasPhoneNumber"], json!(false));
    assert_eq!(body["step"], json!("authorization"));
    assert_eq!(body["accountStatus"], json!("UNKNOWN"));
    // Nothing to probe, so nothing was probed.
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn manual_setup_with_malformed_fields_is_unprocessable() {
    let server = MockServer::start().await;
    let response = app(state_for(&server))
        .oneshot(
            Request::post("/integration/setup/manual")
                .header(ORGANIZATION_HEADER, ORG_ID)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "accessToken": "BAD",
                        "appId": "abc",
                        "phoneNumberId": PHONE_ID,
                        "wabaId": WABA_ID
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"].as_array().map(Vec::len), Some(2));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn setup_without_an_organization_is_unauthorized() {
    let server = MockServer::start().await;
    let response = app(state_for(&server))
        .oneshot(
            Request::post("/integration/setup/manual")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn settings_for_an_unknown_organization_is_not_found() {
    let server = MockServer::start().await;
    let response = app(state_for(&server))
        .oneshot(
            Request::get("/integration/settings/org-unknown")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn settings_round_trip_patches_profile_and_masks_the_token() {
    let server = MockServer::start().await;
    let state = state_for(&server);
    let store = state.store.clone();
    seed_configured(&store).await;
    let app = app(state);

    let response = app
        .clone()
        .oneshot(
            Request::put(format!("/integration/settings/{ORG_ID}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "description": "Everything for coyotes" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(
            Request::get(format!("/integration/settings/{ORG_ID}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["businessProfile"]["about"], json!("Acme Stores"));
    assert_eq!(
        body["businessProfile"]["description"],
        json!("Everything for coyotes")
    );

    let token = body["credentials"]["accessToken"].as_str().unwrap();
    assert_ne!(token, ACCESS_TOKEN);
    assert!(token.contains("••••"));
}

#[tokio::test]
async fn settings_rejects_too_many_websites() {
    let server = MockServer::start().await;
    let state = state_for(&server);
    seed_configured(&state.store).await;

    let response = app(state)
        .oneshot(
            Request::put(format!("/integration/settings/{ORG_ID}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "websites": ["https://a.example", "https://b.example", "https://c.example"] })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn progress_degrades_when_the_platform_rejects_the_probe() {
    let server = MockServer::start().await;
    let state = state_for(&server);
    seed_configured(&state.store).await;

    Mock::given(method("GET"))
        .and(path(format!("/v23.0/{PHONE_ID}")))
        .respond_with(ResponseTemplate::new(401).set_body_json(auth_error_body()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/v23.0/{WABA_ID}")))
        .respond_with(ResponseTemplate::new(401).set_body_json(auth_error_body()))
        .mount(&server)
        .await;

    let response = app(state)
        .oneshot(
            Request::get(format!("/integration/progress/{ORG_ID}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // The failed probe never turns into a 5xx; persisted state answers.
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["isConfigured"], json!(true));
    assert_eq!(body["accountStatus"], json!("UNKNOWN"));
    assert_eq!(body["step"], json!("complete"));
}

#[tokio::test]
async fn webhook_handshake_echoes_the_challenge() {
    let server = MockServer::start().await;
    let token = WebhookRegistrar::new(PUBLIC_BASE_URL, WEBHOOK_SECRET)
        .describe(&OrganizationId::new(ORG_ID))
        .verify_token;

    let response = app(state_for(&server))
        .oneshot(
            Request::get(format!(
                "/webhook/{ORG_ID}?hub.mode=subscribe&hub.verify_token={token}&hub.challenge=1158201444"
            ))
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"1158201444");
}

#[tokio::test]
async fn webhook_handshake_rejects_a_wrong_token() {
    let server = MockServer::start().await;
    let response = app(state_for(&server))
        .oneshot(
            Request::get(format!(
                "/webhook/{ORG_ID}?hub.mode=subscribe&hub.verify_token=guessed&hub.challenge=1158201444"
            ))
            .body(Body::empty())
            .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn webhook_deliveries_are_acknowledged() {
    let server = MockServer::start().await;
    let response = app(state_for(&server))
        .oneshot(
            Request::post(format!("/webhook/{ORG_ID}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({ "object": "whatsapp_business_account" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
