//! HTTP API tests against a server bound to an ephemeral port.

use filemeta::config::Config;
use filemeta::models::NewUser;
use filemeta::server;
use filemeta::users::hash_credential;
use filemeta::MetadataStore;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;

struct TestServer {
    base: String,
    store: Arc<MetadataStore>,
    tmp: TempDir,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let tmp = TempDir::new().unwrap();
        let cfg = Config::with_db_path(tmp.path().join("fmeta.sqlite"));
        let store = Arc::new(MetadataStore::open(&cfg).await.unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server::serve(listener, store.clone()));

        Self {
            base: format!("http://{}", addr),
            store,
            tmp,
            client: reqwest::Client::new(),
        }
    }

    fn touch(&self, name: &str) -> String {
        let path = self.tmp.path().join(name);
        fs::write(&path, "x").unwrap();
        path.to_str().unwrap().to_string()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }
}

#[tokio::test]
async fn test_health() {
    let srv = TestServer::start().await;
    let resp = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_file_lifecycle_status_codes() {
    let srv = TestServer::start().await;
    let path = srv.touch("report.csv");

    let resp = srv
        .client
        .post(srv.url("/files"))
        .header("x-created-by", "web")
        .json(&json!({ "filepath": path, "custom_tags": { "dept": "finance", "year": 2024 } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let file: Value = resp.json().await.unwrap();
    let id = file["id"].as_i64().unwrap();
    assert_eq!(file["filename"], "report.csv");
    assert_eq!(file["created_by"], "web");
    assert_eq!(file["tags"].as_array().unwrap().len(), 2);

    let resp = srv
        .client
        .post(srv.url("/files"))
        .json(&json!({ "filepath": path }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "conflict");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains(&format!("(ID: {})", id)));

    let resp = srv
        .client
        .put(srv.url(&format!("/files/{}", id)))
        .json(&json!({ "tags_to_add_modify": { "year": 2025 }, "tags_to_remove": ["dept"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let file: Value = resp.json().await.unwrap();
    assert_eq!(file["tags"].as_array().unwrap().len(), 1);
    assert_eq!(file["tags"][0]["typed_value"], 2025);
    assert_eq!(file["tags"][0]["value_type"], "integer");

    let resp = srv
        .client
        .delete(srv.url(&format!("/files/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = srv
        .client
        .get(srv.url(&format!("/files/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_create_missing_path_is_404() {
    let srv = TestServer::start().await;
    let missing = srv.tmp.path().join("ghost.txt");

    let resp = srv
        .client
        .post(srv.url("/files"))
        .json(&json!({ "filepath": missing.to_str().unwrap() }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_to_missing_path_is_400() {
    let srv = TestServer::start().await;
    let path = srv.touch("a.txt");
    let resp = srv
        .client
        .post(srv.url("/files"))
        .json(&json!({ "filepath": path }))
        .send()
        .await
        .unwrap();
    let id = resp.json::<Value>().await.unwrap()["id"].as_i64().unwrap();

    let resp = srv
        .client
        .put(srv.url(&format!("/files/{}", id)))
        .json(&json!({ "new_filepath": srv.tmp.path().join("nope.txt").to_str().unwrap() }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_bad_owner_header_is_400() {
    let srv = TestServer::start().await;
    let path = srv.touch("a.txt");

    let resp = srv
        .client
        .post(srv.url("/files"))
        .header("x-owner-id", "alice")
        .json(&json!({ "filepath": path }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(srv.store.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_bodies_get_error_envelope() {
    let srv = TestServer::start().await;
    let path = srv.touch("a.txt");

    let resp = srv
        .client
        .post(srv.url("/files"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert!(!body["error"]["message"].as_str().unwrap().is_empty());

    // No JSON content type at all.
    let resp = srv
        .client
        .post(srv.url("/files"))
        .body(format!(r#"{{"filepath": "{}"}}"#, path))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    let resp = srv
        .client
        .post(srv.url("/files"))
        .json(&json!({ "filepath": path }))
        .send()
        .await
        .unwrap();
    let id = resp.json::<Value>().await.unwrap()["id"].as_i64().unwrap();

    // Well-formed JSON with a field of the wrong type.
    let resp = srv
        .client
        .put(srv.url(&format!("/files/{}", id)))
        .json(&json!({ "overwrite_existing": "yes" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_search_and_list_with_owner() {
    let srv = TestServer::start().await;
    let alice = srv
        .store
        .create_user(&NewUser {
            username: "alice".into(),
            credential_hash: hash_credential("pw"),
            role: None,
        })
        .await
        .unwrap()
        .id;

    for (name, owner) in [("a.txt", Some(alice)), ("b.txt", None)] {
        let mut req = srv
            .client
            .post(srv.url("/files"))
            .json(&json!({ "filepath": srv.touch(name), "custom_tags": { "project": "apollo" } }));
        if let Some(owner) = owner {
            req = req.header("x-owner-id", owner.to_string());
        }
        assert_eq!(req.send().await.unwrap().status(), StatusCode::CREATED);
    }

    let hits: Vec<Value> = srv
        .client
        .get(srv.url("/files/search?keywords=nomatch,APOLLO"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);

    let hits: Vec<Value> = srv
        .client
        .get(srv.url(&format!("/files/search?keywords=apollo&owner_id={}", alice)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["owner"], alice);

    let hits: Vec<Value> = srv
        .client
        .get(srv.url("/files/search"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(hits.is_empty());

    let all: Vec<Value> = srv
        .client
        .get(srv.url("/files"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
}
