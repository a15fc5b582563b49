use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use futures_util::future::FutureExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, header as header_match, method, path},
};

use bugbridge_broker::{
    entitlement::{AllowAllGate, AllowlistGate, EntitlementGate},
    http::{AppContext, extract::OWNER_HEADER, router},
    rate_limit::RateLimiter,
};
use bugbridge_core::{
    ConnectionLifecycle, Credential, CredentialStore, FsCredentialStore, HealthProbe,
    RequestExecutor, StateKey, TRACKER_PROVIDER, TrackerConfig,
};

const APP_BASE_URL: &str = "https://app.example.test";

async fn try_start_mock() -> Option<MockServer> {
    let fut = MockServer::start();
    let fut = std::panic::AssertUnwindSafe(fut);
    fut.catch_unwind().await.ok()
}

struct Harness {
    server: MockServer,
    store: Arc<FsCredentialStore>,
    router: Router,
    _dir: TempDir,
}

impl Harness {
    async fn new() -> Option<Self> {
        Self::with_gate(Arc::new(AllowAllGate)).await
    }

    async fn with_gate(gate: Arc<dyn EntitlementGate>) -> Option<Self> {
        let server = try_start_mock().await?;
        let dir = TempDir::new().expect("tempdir");

        let tracker = TrackerConfig {
            client_id: "client".to_owned(),
            client_secret: "secret".to_owned(),
            auth_url: "https://auth.example.test/authorize".to_owned(),
            token_url: format!("{}/oauth/token", server.uri()),
            api_base: server.uri(),
            redirect_uri: "https://broker.example.test/tracker/callback".to_owned(),
            ..TrackerConfig::default()
        };
        let http = tracker.http_client().expect("http client");
        let store = Arc::new(FsCredentialStore::new(dir.path().to_path_buf()).expect("store"));
        let state_key = StateKey::new(&[7u8; 32]).expect("state key");

        let executor = Arc::new(RequestExecutor::new(
            tracker.clone(),
            http.clone(),
            store.clone(),
        ));
        let probe = Arc::new(HealthProbe::new(
            tracker.clone(),
            http.clone(),
            executor.clone(),
            store.clone(),
        ));
        let lifecycle = Arc::new(ConnectionLifecycle::new(
            tracker.clone(),
            http.clone(),
            store.clone(),
            state_key,
        ));

        let context = AppContext {
            tracker,
            http,
            store: store.clone(),
            executor,
            probe,
            lifecycle,
            entitlements: gate,
            rate_limiter: Arc::new(RateLimiter::new(60, std::time::Duration::from_secs(60))),
            app_base_url: APP_BASE_URL.to_owned(),
        };

        Some(Self {
            server,
            store,
            router: router(Arc::new(context)),
            _dir: dir,
        })
    }

    fn seed_credential(&self, access: &str, refresh: Option<&str>) {
        let credential = Credential::new(
            "user@example.com",
            "cloud-1",
            Some("https://acme.atlassian.net".to_owned()),
            access,
            refresh.map(str::to_owned),
        );
        self.store.upsert(&credential).expect("seed credential");
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value, Option<String>) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value, location)
    }

    fn get(&self, uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .header(OWNER_HEADER, "user@example.com")
            .body(Body::empty())
            .expect("request")
    }

    fn post_json(&self, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(OWNER_HEADER, "user@example.com")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn stored(&self) -> Option<Credential> {
        self.store
            .get("user@example.com", TRACKER_PROVIDER)
            .expect("store get")
    }
}

fn refresh_response(access: &str, refresh: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": 3600,
    }))
}

#[tokio::test]
async fn status_requires_an_owner() {
    let Some(harness) = Harness::new().await else {
        eprintln!("skipping status_requires_an_owner: mock server unavailable");
        return;
    };

    let request = Request::builder()
        .method("GET")
        .uri("/tracker/status")
        .body(Body::empty())
        .expect("request");
    let (status, body, _) = harness.send(request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");
}

#[tokio::test]
async fn tracker_routes_are_plan_gated() {
    let gate = Arc::new(AllowlistGate::new(["pro@example.com".to_owned()]));
    let Some(harness) = Harness::with_gate(gate).await else {
        eprintln!("skipping tracker_routes_are_plan_gated: mock server unavailable");
        return;
    };

    let (status, body, _) = harness.send(harness.get("/tracker/status")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "PLAN_REQUIRED");
}

#[tokio::test]
async fn status_reports_not_connected_without_credential() {
    let Some(harness) = Harness::new().await else {
        eprintln!("skipping status_reports_not_connected_without_credential: mock server unavailable");
        return;
    };

    let (status, body, _) = harness.send(harness.get("/tracker/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "connected": false }));
}

#[tokio::test]
async fn status_reports_expired_and_cleans_up() {
    let Some(harness) = Harness::new().await else {
        eprintln!("skipping status_reports_expired_and_cleans_up: mock server unavailable");
        return;
    };

    Mock::given(method("GET"))
        .and(path("/ex/jira/cloud-1/rest/api/3/myself"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&harness.server)
        .await;

    harness.seed_credential("A-expired", Some("R-revoked"));
    let (status, body, _) = harness.send(harness.get("/tracker/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "connected": false, "reason": "EXPIRED" }));
    assert!(harness.stored().is_none());
}

#[tokio::test]
async fn status_reports_connected_after_silent_refresh() {
    let Some(harness) = Harness::new().await else {
        eprintln!("skipping status_reports_connected_after_silent_refresh: mock server unavailable");
        return;
    };

    Mock::given(method("GET"))
        .and(path("/ex/jira/cloud-1/rest/api/3/myself"))
        .and(header_match("Authorization", "Bearer A-expired"))
        .respond_with(ResponseTemplate::new(401))
        .with_priority(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ex/jira/cloud-1/rest/api/3/myself"))
        .and(header_match("Authorization", "Bearer A-new-1"))
        .respond_with(ResponseTemplate::new(200))
        .with_priority(1)
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(refresh_response("A-new-1", "R-valid-2"))
        .mount(&harness.server)
        .await;

    harness.seed_credential("A-expired", Some("R-valid"));
    let (status, body, _) = harness.send(harness.get("/tracker/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "connected": true }));

    let stored = harness.stored().expect("credential kept");
    assert_eq!(stored.access_token, "A-new-1");
}

#[tokio::test]
async fn connect_and_callback_establish_a_credential() {
    let Some(harness) = Harness::new().await else {
        eprintln!("skipping connect_and_callback_establish_a_credential: mock server unavailable");
        return;
    };

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A-initial",
            "refresh_token": "R-initial",
        })))
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/oauth/token/accessible-resources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "cloud-1", "url": "https://acme.atlassian.net" },
        ])))
        .mount(&harness.server)
        .await;

    let (status, _, location) = harness.send(harness.get("/tracker/connect")).await;
    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    let authorize_url = Url::parse(&location.expect("redirect location")).expect("authorize url");
    let state = authorize_url
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .expect("state param");

    let (status, _, location) = harness
        .send(harness.get(&format!(
            "/tracker/callback?code=authcode&state={state}"
        )))
        .await;
    assert_eq!(status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location.as_deref(), Some(APP_BASE_URL));

    let stored = harness.stored().expect("credential stored");
    assert_eq!(stored.site_id, "cloud-1");
    assert_eq!(stored.access_token, "A-initial");
}

#[tokio::test]
async fn callback_rejects_forged_state() {
    let Some(harness) = Harness::new().await else {
        eprintln!("skipping callback_rejects_forged_state: mock server unavailable");
        return;
    };

    let (status, body, _) = harness
        .send(harness.get("/tracker/callback?code=authcode&state=forged.blob"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_STATE");
    assert!(harness.stored().is_none());
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let Some(harness) = Harness::new().await else {
        eprintln!("skipping disconnect_is_idempotent: mock server unavailable");
        return;
    };

    harness.seed_credential("A-live", Some("R-live"));

    for _ in 0..2 {
        let request = Request::builder()
            .method("DELETE")
            .uri("/tracker/connection")
            .header(OWNER_HEADER, "user@example.com")
            .body(Body::empty())
            .expect("request");
        let (status, _, _) = harness.send(request).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    assert!(harness.stored().is_none());
}

#[tokio::test]
async fn create_issue_returns_key_and_browse_url() {
    let Some(harness) = Harness::new().await else {
        eprintln!("skipping create_issue_returns_key_and_browse_url: mock server unavailable");
        return;
    };

    Mock::given(method("POST"))
        .and(path("/ex/jira/cloud-1/rest/api/3/issue"))
        .and(header_match("Authorization", "Bearer A-live"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "10101",
            "key": "BUG-7",
        })))
        .expect(1)
        .mount(&harness.server)
        .await;

    harness.seed_credential("A-live", Some("R-live"));
    let (status, body, _) = harness
        .send(harness.post_json(
            "/tracker/issues",
            json!({
                "title": "Login button unresponsive",
                "description": "Clicking login does nothing on Firefox.",
                "projectId": "10000",
                "issueTypeId": "10001",
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["issueKey"], "BUG-7");
    assert_eq!(body["issueUrl"], "https://acme.atlassian.net/browse/BUG-7");
    harness.server.verify().await;
}

#[tokio::test]
async fn create_issue_validates_required_fields() {
    let Some(harness) = Harness::new().await else {
        eprintln!("skipping create_issue_validates_required_fields: mock server unavailable");
        return;
    };

    harness.seed_credential("A-live", Some("R-live"));
    let (status, body, _) = harness
        .send(harness.post_json(
            "/tracker/issues",
            json!({ "title": "only a title" }),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "MISSING_REQUIRED_FIELDS");
}

#[tokio::test]
async fn create_issue_adds_to_sprint_when_requested() {
    let Some(harness) = Harness::new().await else {
        eprintln!("skipping create_issue_adds_to_sprint_when_requested: mock server unavailable");
        return;
    };

    Mock::given(method("POST"))
        .and(path("/ex/jira/cloud-1/rest/api/3/issue"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "key": "BUG-8" })))
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/ex/jira/cloud-1/rest/agile/1.0/sprint/55/issue"))
        .and(body_string_contains("BUG-8"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&harness.server)
        .await;

    harness.seed_credential("A-live", Some("R-live"));
    let (status, body, _) = harness
        .send(harness.post_json(
            "/tracker/issues",
            json!({
                "title": "Broken layout",
                "description": "Sidebar overlaps the editor.",
                "projectId": "10000",
                "issueTypeId": "10001",
                "sprintId": "55",
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["issueKey"], "BUG-8");
    harness.server.verify().await;
}

#[tokio::test]
async fn dead_credential_maps_to_reconnect_required() {
    let Some(harness) = Harness::new().await else {
        eprintln!("skipping dead_credential_maps_to_reconnect_required: mock server unavailable");
        return;
    };

    Mock::given(method("POST"))
        .and(path("/ex/jira/cloud-1/rest/api/3/issue"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&harness.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&harness.server)
        .await;

    harness.seed_credential("A-expired", Some("R-revoked"));
    let (status, body, _) = harness
        .send(harness.post_json(
            "/tracker/issues",
            json!({
                "title": "Broken layout",
                "description": "Sidebar overlaps the editor.",
                "projectId": "10000",
                "issueTypeId": "10001",
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "RECONNECT_REQUIRED");
    assert!(harness.stored().is_none(), "dead credential must be deleted");
}

#[tokio::test]
async fn attach_uploads_multipart_image() {
    let Some(harness) = Harness::new().await else {
        eprintln!("skipping attach_uploads_multipart_image: mock server unavailable");
        return;
    };

    Mock::given(method("POST"))
        .and(path("/ex/jira/cloud-1/rest/api/3/issue/BUG-7/attachments"))
        .and(header_match("X-Atlassian-Token", "no-check"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "att-1" }])))
        .expect(1)
        .mount(&harness.server)
        .await;

    harness.seed_credential("A-live", Some("R-live"));
    let encoded = {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(b"png-bytes")
    };
    let (status, body, _) = harness
        .send(harness.post_json(
            "/tracker/issues/BUG-7/attachments",
            json!({ "image": format!("data:image/png;base64,{encoded}") }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));
    harness.server.verify().await;
}

#[tokio::test]
async fn attach_rejects_malformed_and_oversized_images() {
    let Some(harness) = Harness::new().await else {
        eprintln!("skipping attach_rejects_malformed_and_oversized_images: mock server unavailable");
        return;
    };

    harness.seed_credential("A-live", Some("R-live"));

    let (status, body, _) = harness
        .send(harness.post_json(
            "/tracker/issues/BUG-7/attachments",
            json!({ "image": "not a data url" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_IMAGE");

    let oversized = format!("data:image/png;base64,{}", "A".repeat(10_000_001));
    let (status, body, _) = harness
        .send(harness.post_json(
            "/tracker/issues/BUG-7/attachments",
            json!({ "image": oversized }),
        ))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "IMAGE_TOO_LARGE");
}

#[tokio::test]
async fn meta_aggregates_issue_form_options() {
    let Some(harness) = Harness::new().await else {
        eprintln!("skipping meta_aggregates_issue_form_options: mock server unavailable");
        return;
    };

    Mock::given(method("GET"))
        .and(path("/ex/jira/cloud-1/rest/api/3/project/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [{ "id": "10000", "name": "Platform" }],
        })))
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ex/jira/cloud-1/rest/api/3/issuetype/project"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "10001", "name": "Bug" },
        ])))
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ex/jira/cloud-1/rest/api/3/priority"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "2", "name": "High" },
        ])))
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ex/jira/cloud-1/rest/api/3/users/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "accountId": "acc-1", "displayName": "Dana Developer" },
            { "accountId": "acc-2", "emailAddress": "q@example.com" },
        ])))
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ex/jira/cloud-1/rest/agile/1.0/board"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [
                { "id": 3, "location": { "projectId": 10000 } },
            ],
        })))
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ex/jira/cloud-1/rest/agile/1.0/board/3/sprint"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [{ "id": 55, "name": "Sprint 12" }],
        })))
        .mount(&harness.server)
        .await;

    harness.seed_credential("A-live", Some("R-live"));
    let (status, body, _) = harness.send(harness.get("/tracker/meta")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["projects"], json!([{ "id": "10000", "name": "Platform" }]));
    assert_eq!(body["issueTypes"], json!([{ "id": "10001", "name": "Bug" }]));
    assert_eq!(body["priorities"], json!([{ "id": "2", "name": "High" }]));
    assert_eq!(
        body["assignees"],
        json!([
            { "id": "acc-1", "name": "Dana Developer" },
            { "id": "acc-2", "name": "q@example.com" },
        ])
    );
    assert_eq!(body["sprints"], json!([{ "id": "55", "name": "Sprint 12" }]));
}

#[tokio::test]
async fn meta_tolerates_sprint_lookup_failures() {
    let Some(harness) = Harness::new().await else {
        eprintln!("skipping meta_tolerates_sprint_lookup_failures: mock server unavailable");
        return;
    };

    Mock::given(method("GET"))
        .and(path("/ex/jira/cloud-1/rest/api/3/project/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [{ "id": "10000", "name": "Platform" }],
        })))
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ex/jira/cloud-1/rest/api/3/issuetype/project"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ex/jira/cloud-1/rest/api/3/priority"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ex/jira/cloud-1/rest/api/3/users/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&harness.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ex/jira/cloud-1/rest/agile/1.0/board"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&harness.server)
        .await;

    harness.seed_credential("A-live", Some("R-live"));
    let (status, body, _) = harness.send(harness.get("/tracker/meta")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sprints"], json!([]));
}
