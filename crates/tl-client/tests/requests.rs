//! Request layer tests against a mock API.

mod common;

use serde_json::{json, Map, Value};
use tl_client::TransloaditError;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use common::client;

fn signed_query(req: &Request) -> bool {
    let pairs: Vec<(String, String)> = req.url.query_pairs().into_owned().collect();
    let params = pairs.iter().find(|(k, _)| k == "params");
    let signature = pairs.iter().find(|(k, _)| k == "signature");

    match (params, signature) {
        (Some((_, params)), Some((_, signature))) => {
            let params: Value = match serde_json::from_str(params) {
                Ok(v) => v,
                Err(_) => return false,
            };
            params["auth"]["key"] == json!("test_key")
                && params["nonce"].is_string()
                && signature.starts_with("sha384:")
        }
        _ => false,
    }
}

#[tokio::test]
async fn test_get_assembly_sends_signed_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assemblies/abc123"))
        .and(header(
            "Transloadit-Client",
            format!("rust-sdk:{}", env!("CARGO_PKG_VERSION")).as_str(),
        ))
        .and(signed_query)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": "ASSEMBLY_COMPLETED",
            "assembly_id": "abc123"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server).get_assembly("abc123").await.unwrap();
    assert_eq!(response.id(), Some("abc123"));
    assert!(response.is_completed());
    assert!(response.is_finished());
}

#[tokio::test]
async fn test_unsigned_requests_omit_signature() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assemblies"))
        .and(|req: &Request| {
            req.url.query_pairs().any(|(k, _)| k == "params")
                && !req.url.query_pairs().any(|(k, _)| k == "signature")
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [], "count": 0})))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = client(&server);
    client.set_request_signing(false).unwrap();

    let list = client.list_assemblies(&Map::new()).await.unwrap();
    assert!(list.items().is_empty());
    assert_eq!(list.size(), 0);
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/templates/tpl1"))
        .respond_with(ResponseTemplate::new(413).set_body_json(json!({
            "error": "RATE_LIMIT_REACHED",
            "info": {"retryIn": 0}
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/templates/tpl1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": "TEMPLATE_FOUND",
            "id": "tpl1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server).get_template("tpl1").await.unwrap();
    assert_eq!(response.ok_code(), Some("TEMPLATE_FOUND"));
}

#[tokio::test]
async fn test_rate_limit_without_budget_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/templates/tpl1"))
        .respond_with(ResponseTemplate::new(413).set_body_json(json!({
            "error": "RATE_LIMIT_REACHED",
            "info": {"retryIn": 30}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = client(&server);
    client.set_retry_attempts_rate_limit(0);

    let err = client.get_template("tpl1").await.unwrap_err();
    assert!(matches!(err, TransloaditError::RateLimited { retry_in_secs: 30 }));
}

#[tokio::test]
async fn test_api_error_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assemblies/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "ASSEMBLY_NOT_FOUND",
            "message": "The assembly could not be found"
        })))
        .mount(&server)
        .await;

    let err = client(&server).get_assembly("missing").await.unwrap_err();
    match err {
        TransloaditError::Api { status, error, .. } => {
            assert_eq!(status, 404);
            assert_eq!(error, "ASSEMBLY_NOT_FOUND");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_cancel_assembly_uses_absolute_url() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/assemblies/abc123"))
        .and(body_string_contains("params="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": "ASSEMBLY_CANCELED"})))
        .expect(1)
        .mount(&server)
        .await;

    // Host points elsewhere; the absolute URL must win.
    let client = tl_client::Transloadit::new("test_key", "test_secret").with_host("http://127.0.0.1:9");
    let url = format!("{}/assemblies/abc123", server.uri());

    let response = client.cancel_assembly(&url).await.unwrap();
    assert!(response.is_canceled());
}

#[tokio::test]
async fn test_get_bill_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/bill/2024-03"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": "BILL_FOUND", "invoice_id": "76fe5df"})))
        .expect(1)
        .mount(&server)
        .await;

    let bill = client(&server).get_bill(3, 2024).await.unwrap();
    assert_eq!(bill.get_str("invoice_id"), Some("76fe5df"));
}

#[tokio::test]
async fn test_template_lifecycle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/templates"))
        .and(body_string_contains("thumbnails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": "TEMPLATE_CREATED", "id": "tpl9"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/templates/tpl9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": "TEMPLATE_UPDATED"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/templates/tpl9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": "TEMPLATE_DELETED"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/templates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{"id": "tpl9", "name": "thumbnails"}],
            "count": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);

    let mut template = client.new_template("thumbnails");
    let mut options = Map::new();
    options.insert("width".to_string(), json!(75));
    template.add_step("resize", "/image/resize", options);
    let created = template.save().await.unwrap();
    assert_eq!(created.get_str("id"), Some("tpl9"));

    let mut update = Map::new();
    update.insert("name".to_string(), json!("thumbs"));
    assert_eq!(
        client.update_template("tpl9", &update).await.unwrap().ok_code(),
        Some("TEMPLATE_UPDATED")
    );

    let list = client.list_templates(&Map::new()).await.unwrap();
    assert_eq!(list.size(), 1);
    assert_eq!(list.items()[0]["name"], json!("thumbnails"));

    assert_eq!(
        client.delete_template("tpl9").await.unwrap().ok_code(),
        Some("TEMPLATE_DELETED")
    );
}
