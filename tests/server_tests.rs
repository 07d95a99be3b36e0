mod auth_support;

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::header::{COOKIE, LOCATION, SET_COOKIE};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use listing_connector::airtable::AirtableApi;
use listing_connector::auth::{AuthService, HandshakeSealer, ProviderId};
use listing_connector::config::ConnectorConfig;
use listing_connector::server::{router, AppState};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use auth_support::{configured, fresh, manager, InMemoryTokenStore, AIRTABLE_BASIC};

struct Harness {
    server: MockServer,
    store: Arc<InMemoryTokenStore>,
    app: axum::Router,
}

async fn harness(config: ConnectorConfig) -> Harness {
    let server = MockServer::start().await;
    let store = Arc::new(InMemoryTokenStore::new());
    let manager = manager(store.clone(), config, &server.uri());
    let auth = AuthService::new(manager.clone(), HandshakeSealer::new(b"test-session-secret".to_vec()));
    let airtable = AirtableApi::new(reqwest::Client::new(), manager)
        .with_base_url(format!("{}/v0", server.uri()));
    let app = router(Arc::new(AppState::new(auth, airtable)));
    Harness { server, store, app }
}

async fn get(app: &axum::Router, uri: &str, cookie: Option<&str>) -> Response {
    let mut request = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(COOKIE, cookie);
    }
    app.clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response) -> String {
    response.headers()[LOCATION].to_str().unwrap().to_string()
}

fn set_cookie(response: &Response) -> String {
    response.headers()[SET_COOKIE].to_str().unwrap().to_string()
}

/// `name=value` pair from a `Set-Cookie` header.
fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().to_string()
}

fn query(url: &str) -> HashMap<String, String> {
    Url::parse(url).unwrap().query_pairs().into_owned().collect()
}

#[tokio::test]
async fn authorize_redirects_with_handshake_cookie() {
    let h = harness(configured()).await;
    let response = get(&h.app, "/oauth/airtable", None).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    let target = location(&response);
    assert!(target.starts_with("https://airtable.com/oauth2/v1/authorize?"));
    assert_eq!(query(&target)["code_challenge_method"], "S256");

    let cookie = set_cookie(&response);
    assert!(cookie.starts_with("airtable_oauth="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Max-Age=600"));
}

#[tokio::test]
async fn ebay_authorize_sets_no_cookie() {
    let h = harness(configured()).await;
    let response = get(&h.app, "/oauth/ebay", None).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    let target = location(&response);
    assert!(target.starts_with(&format!("{}/oauth2/authorize?", h.server.uri())));
    assert_eq!(query(&target)["redirect_uri"], "Seller-RuName-1");
    assert!(response.headers().get(SET_COOKIE).is_none());
}

#[tokio::test]
async fn authorize_without_configuration_redirects_with_error() {
    let mut config = configured();
    config.ebay = Default::default();
    let h = harness(config).await;

    let response = get(&h.app, "/oauth/ebay", None).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        location(&response),
        "/?ebay_error=Missing+configuration%3A+EBAY_CLIENT_ID%2C+EBAY_CLIENT_SECRET%2C+EBAY_REDIRECT_URI"
    );
}

#[tokio::test]
async fn airtable_handshake_completes_and_stores_tokens() {
    let h = harness(configured()).await;
    let start = get(&h.app, "/oauth/airtable", None).await;
    let state = query(&location(&start))["state"].clone();
    let cookie = cookie_pair(&set_cookie(&start));

    Mock::given(method("POST"))
        .and(path("/oauth2/v1/token"))
        .and(header("authorization", AIRTABLE_BASIC))
        .and(body_string_contains("code=abc"))
        .and(body_string_contains("code_verifier="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A1",
            "refresh_token": "R1",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let uri = format!("/oauth/airtable/callback?code=abc&state={state}");
    let response = get(&h.app, &uri, Some(&cookie)).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/?airtable=ok");
    assert!(set_cookie(&response).starts_with("airtable_oauth=; Path=/; Max-Age=0"));

    let stored = h.store.get(ProviderId::Airtable).expect("tokens stored");
    assert_eq!(stored.access_token, "A1");
    assert_eq!(stored.refresh_token.as_deref(), Some("R1"));

    // Replaying the same slot is rejected without a second exchange.
    let replay = get(&h.app, &uri, Some(&cookie)).await;
    assert_eq!(
        location(&replay),
        "/?airtable_error=invalid_state_or_missing_verifier"
    );
}

#[tokio::test]
async fn state_mismatch_never_reaches_token_endpoint() {
    let h = harness(configured()).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let start = get(&h.app, "/oauth/airtable", None).await;
    let cookie = cookie_pair(&set_cookie(&start));

    let response = get(
        &h.app,
        "/oauth/airtable/callback?code=abc&state=forged",
        Some(&cookie),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        location(&response),
        "/?airtable_error=invalid_state_or_missing_verifier"
    );
    assert!(set_cookie(&response).contains("Max-Age=0"));
    assert!(h.store.get(ProviderId::Airtable).is_none());
}

#[tokio::test]
async fn callback_without_handshake_cookie_fails() {
    let h = harness(configured()).await;
    let response = get(&h.app, "/oauth/airtable/callback?code=abc&state=s", None).await;
    assert_eq!(
        location(&response),
        "/?airtable_error=invalid_state_or_missing_verifier"
    );
}

#[tokio::test]
async fn callback_reports_provider_denial_and_missing_code() {
    let h = harness(configured()).await;

    let denied = get(
        &h.app,
        "/oauth/ebay/callback?error=access_denied&error_description=User+cancelled",
        None,
    )
    .await;
    assert_eq!(location(&denied), "/?ebay_error=User+cancelled");

    let no_code = get(&h.app, "/oauth/ebay/callback", None).await;
    assert_eq!(location(&no_code), "/?ebay_error=no_code");
}

#[tokio::test]
async fn ebay_callback_exchanges_code() {
    let h = harness(configured()).await;
    Mock::given(method("POST"))
        .and(path("/identity/v1/oauth2/token"))
        .and(body_string_contains("code=v%5E1.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "E1",
            "refresh_token": "ER1",
            "expires_in": 7200
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let response = get(&h.app, "/oauth/ebay/callback?code=v%5E1.1&state=anything", None).await;
    assert_eq!(location(&response), "/?ebay=ok");
    assert_eq!(h.store.get(ProviderId::Ebay).unwrap().access_token, "E1");
}

#[tokio::test]
async fn status_and_disconnect_routes() {
    let h = harness(configured()).await;
    h.store.seed(ProviderId::Ebay, fresh("E1", Some("R1")));

    let status = json_body(get(&h.app, "/oauth/status", None).await).await;
    assert_eq!(status, json!({ "airtable": false, "ebay": true }));

    let response = h
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/oauth/ebay")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "airtable": false, "ebay": false }));
}

#[tokio::test]
async fn unknown_provider_is_not_found() {
    let h = harness(configured()).await;
    let response = get(&h.app, "/oauth/github", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "unknown_provider");
}

#[tokio::test]
async fn airtable_fields_fall_back_to_sampled_record() {
    let h = harness(configured()).await;
    h.store.seed(ProviderId::Airtable, fresh("A1", Some("R1")));

    Mock::given(method("GET"))
        .and(path("/v0/meta/bases/app1/tables"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "type": "INVALID_PERMISSIONS", "message": "Forbidden" }
        })))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v0/app1/Listings"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [{
                "id": "rec1",
                "createdTime": "2024-01-01T00:00:00.000Z",
                "fields": { "Title": "Lamp", "Price": 20 }
            }]
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let fields = json_body(get(&h.app, "/api/airtable/fields/app1/Listings", None).await).await;
    let mut names: Vec<&str> = fields
        .as_array()
        .unwrap()
        .iter()
        .map(|field| {
            assert_eq!(field["type"], "unknown");
            assert_eq!(field["id"], field["name"]);
            field["name"].as_str().unwrap()
        })
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["Price", "Title"]);
}

#[tokio::test]
async fn airtable_api_without_connection_is_unauthorized() {
    let h = harness(configured()).await;
    let response = get(&h.app, "/api/airtable/bases", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert!(body["error"]["message"].as_str().unwrap().contains("not connected"));
}

#[tokio::test]
async fn airtable_fields_trust_schema_listing_without_fields() {
    let h = harness(configured()).await;
    h.store.seed(ProviderId::Airtable, fresh("A1", Some("R1")));

    Mock::given(method("GET"))
        .and(path("/v0/meta/bases/app1/tables"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tables": [{ "id": "tbl1", "name": "Listings", "fields": [] }]
        })))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v0/app1/Listings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "records": [] })))
        .expect(0)
        .mount(&h.server)
        .await;

    let fields = json_body(get(&h.app, "/api/airtable/fields/app1/Listings", None).await).await;
    assert_eq!(fields, json!([]));
}
