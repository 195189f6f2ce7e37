//! HTTP surface: the router served on an ephemeral port, driven with
//! reqwest. Registry traffic goes to a wiremock server.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;
use orcid_sync::config::Config;
use orcid_sync::diagnostics::LogLevel;
use orcid_sync::notification::LogOnlyMailer;
use orcid_sync::registry::{ApiMode, RegistryEndpoints};
use orcid_sync::store::resolver::PublicUrlResolver;
use orcid_sync::{api, AppState};

const ADMIN_KEY: &str = "test-admin-key-0123456789";

fn config(registry: &MockServer) -> Config {
    Config {
        port: 0,
        database_url: String::new(),
        master_key: "0".repeat(64),
        admin_key: Some(ADMIN_KEY.into()),
        api_mode: None,
        client_id: None,
        client_secret: None,
        log_file: "orcid.log".into(),
        log_level: LogLevel::Error,
        public_base_url: BASE_URL.into(),
        mail_webhook_url: None,
        mail_webhook_secret: None,
        request_timeout_secs: 5,
        send_mail_on_publication: false,
        registry_endpoints: Some(
            RegistryEndpoints::new(&registry.uri(), &registry.uri()).unwrap(),
        ),
    }
}

async fn serve(fx: &Fixture, registry: &MockServer) -> SocketAddr {
    let state = Arc::new(AppState::new(
        config(registry),
        fx.store.clone(),
        fx.store.clone(),
        Arc::new(PublicUrlResolver::new(BASE_URL)),
        Arc::new(LogOnlyMailer),
        fx.diagnostics.clone(),
    ));
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn admin(req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    req.header("x-admin-key", ADMIN_KEY)
}

#[tokio::test]
async fn test_healthz_needs_no_key() {
    let registry = MockServer::start().await;
    let fx = Fixture::new();
    let addr = serve(&fx, &registry).await;

    let resp = reqwest::get(format!("http://{}/healthz", addr)).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_management_api_requires_admin_key() {
    let registry = MockServer::start().await;
    let fx = Fixture::new();
    let addr = serve(&fx, &registry).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/api/v1/contributors/{}/credential", addr, ALICE);

    let missing = client.get(&url).send().await.unwrap();
    assert_eq!(missing.status(), 401);

    let wrong = client
        .get(&url)
        .header("x-admin-key", "not-the-key-at-all")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), 401);

    let bearer = client
        .get(&url)
        .header("authorization", format!("Bearer {}", ADMIN_KEY))
        .send()
        .await
        .unwrap();
    assert_eq!(bearer.status(), 200);
}

#[tokio::test]
async fn test_manual_sync_and_metrics() {
    let registry = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(work_path(ALICE_ORCID)))
        .respond_with(ResponseTemplate::new(201).insert_header(
            "location",
            format!("{}/v2.1/{}/work/88", registry.uri(), ALICE_ORCID).as_str(),
        ))
        .expect(1)
        .mount(&registry)
        .await;

    let fx = Fixture::new();
    fx.store.put_settings(JOURNAL_ID, settings(ApiMode::MEMBER));
    fx.authorize(ALICE, "alice-token");
    let addr = serve(&fx, &registry).await;
    let client = reqwest::Client::new();

    let resp = admin(client.post(format!(
        "http://{}/api/v1/submissions/{}/sync",
        addr, SUBMISSION_ID
    )))
    .send()
    .await
    .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"], "completed");
    assert_eq!(body["contributors"][0]["new_put_code"], "88");

    let view: Value = admin(client.get(format!(
        "http://{}/api/v1/contributors/{}/credential",
        addr, ALICE
    )))
    .send()
    .await
    .unwrap()
    .json()
    .await
    .unwrap();
    assert_eq!(view["state"], "authorized");
    assert_eq!(view["work_put_code"], "88");
    assert!(view.get("access_token").is_none());

    let metrics = reqwest::get(format!("http://{}/metrics", addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("orcid_sync_runs_total{result=\"success\"} 1"));
}

#[tokio::test]
async fn test_unconfigured_journal_is_a_conflict() {
    let registry = MockServer::start().await;
    let fx = Fixture::new();
    let addr = serve(&fx, &registry).await;

    let resp = admin(reqwest::Client::new().post(format!(
        "http://{}/api/v1/events/submission-scheduled",
        addr
    )))
    .json(&json!({ "journal_id": JOURNAL_ID, "submission_id": SUBMISSION_ID }))
    .send()
    .await
    .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "orcid_not_configured");
}

#[tokio::test]
async fn test_verify_rejects_unknown_invitation_token() {
    let registry = MockServer::start().await;
    let fx = Fixture::new();
    fx.store.put_settings(JOURNAL_ID, settings(ApiMode::MEMBER));
    let addr = serve(&fx, &registry).await;

    let resp = reqwest::get(format!(
        "http://{}/orcidapi/verify?token=nope&articleId={}&code=abc",
        addr, SUBMISSION_ID
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "invalid_email_token");
}

#[tokio::test]
async fn test_verify_records_denial() {
    let registry = MockServer::start().await;
    let fx = Fixture::new();
    fx.store.put_settings(JOURNAL_ID, settings(ApiMode::MEMBER));
    let mut bob = orcid_sync::models::credential::ContributorCredential::default();
    bob.email_token = Some("bob-invite".into());
    fx.store.put_credential(BOB, bob);
    let addr = serve(&fx, &registry).await;

    let resp = reqwest::get(format!(
        "http://{}/orcidapi/verify?token=bob-invite&articleId={}&error=access_denied",
        addr, SUBMISSION_ID
    ))
    .await
    .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "status": "denied", "contributor_id": BOB }));
    assert!(fx.store.credential(BOB).unwrap().access_denied);
}

#[tokio::test]
async fn test_authorize_url_endpoint() {
    let registry = MockServer::start().await;
    let fx = Fixture::new();
    fx.store.put_settings(JOURNAL_ID, settings(ApiMode::MEMBER));
    let addr = serve(&fx, &registry).await;

    let body: Value = admin(reqwest::Client::new().get(format!(
        "http://{}/api/v1/authorize-url?journal_id={}&redirect_uri=https%3A%2F%2Fjournal.example%2Fback",
        addr, JOURNAL_ID
    )))
    .send()
    .await
    .unwrap()
    .json()
    .await
    .unwrap();
    assert_eq!(body["scope"], "/activities/update");
    let url = body["url"].as_str().unwrap();
    assert!(url.contains("redirect_uri=https%3A%2F%2Fjournal.example%2Fback"));
}
