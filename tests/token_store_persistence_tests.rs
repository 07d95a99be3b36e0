mod auth_support;

use std::fs;
use std::sync::Arc;

use listing_connector::auth::{FileTokenStore, ProviderId, TokenManager, TokenStore, TokenStoreConfig};
use listing_connector::config::StaticConfigSource;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use auth_support::{configured, fresh, mock_clients, stale};

#[tokio::test]
async fn refresh_persists_to_tokens_json_without_touching_other_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/identity/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A2",
            "expires_in": 7200
        })))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let store = Arc::new(FileTokenStore::new(TokenStoreConfig::new(temp.path())));
    store.save(ProviderId::Airtable, &fresh("AT", Some("ATR"))).unwrap();
    store.save(ProviderId::Ebay, &stale("A1", Some("R1"))).unwrap();

    let mut config = configured();
    config.data_dir = temp.path().to_path_buf();
    let manager = TokenManager::new(
        store.clone(),
        Arc::new(StaticConfigSource::new(config)),
        mock_clients(&server.uri()),
    );

    assert_eq!(
        manager.valid_access_token(ProviderId::Ebay).await.as_deref(),
        Some("A2")
    );

    let raw = fs::read_to_string(temp.path().join("tokens.json")).unwrap();
    let document: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(document["ebay"]["access_token"], "A2");
    assert_eq!(document["ebay"]["refresh_token"], "R1");
    assert!(document["ebay"]["expires_at"].is_i64());
    assert_eq!(document["airtable"]["access_token"], "AT");

    // A second store over the same directory sees the refreshed record.
    let reopened = FileTokenStore::new(TokenStoreConfig::new(temp.path()));
    assert_eq!(
        reopened.load(ProviderId::Ebay).unwrap().unwrap().access_token,
        "A2"
    );
}

#[tokio::test]
async fn corrupt_tokens_file_reads_as_not_connected() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("tokens.json"), "{ not json").unwrap();

    let manager = TokenManager::new(
        Arc::new(FileTokenStore::new(TokenStoreConfig::new(temp.path()))),
        Arc::new(StaticConfigSource::new(configured())),
        mock_clients(&server.uri()),
    );

    assert_eq!(manager.valid_access_token(ProviderId::Airtable).await, None);
    assert!(!manager.is_connected(ProviderId::Ebay));
}
