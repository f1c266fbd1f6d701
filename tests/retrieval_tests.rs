use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use url::Url;

use sharelink_client::client::ApiClient;
use sharelink_client::download::{DownloadGate, ExchangeError, GatePhase};
use sharelink_client::resolve::{LinkMetadata, LinkResolver, ResolveError};

// ============================================================================
// Mock backend helpers
// ============================================================================

async fn spawn_backend(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn api(base: &str) -> ApiClient {
    ApiClient::new(Url::parse(base).unwrap()).unwrap()
}

fn info_payload(expired: bool, password_protected: bool) -> serde_json::Value {
    json!({
        "fileNames": ["report.pdf"],
        "fileSizes": [150000],
        "totalSize": 150000,
        "createdAt": 1754300000000i64,
        "expiresAt": 1754386400000i64,
        "downloadCount": 3,
        "passwordProtected": password_protected,
        "expiresInHours": if expired { 0 } else { 23 },
        "expired": expired,
    })
}

fn metadata(expired: bool, password_protected: bool) -> LinkMetadata {
    LinkMetadata {
        file_names: vec!["report.pdf".to_string()],
        file_sizes: vec![150_000],
        total_size: 150_000,
        download_count: 3,
        password_protected,
        expires_in_hours: 23,
        expired,
        created_at: None,
        expires_at: None,
    }
}

// ============================================================================
// LinkResolver
// ============================================================================

#[tokio::test]
async fn test_resolve_returns_the_server_metadata() {
    let router = Router::new().route(
        "/info/:code",
        get(|Path(code): Path<String>| async move {
            assert_eq!(code, "abc123");
            Json(info_payload(false, true))
        }),
    );
    let base = spawn_backend(router).await;
    let resolver = LinkResolver::new(api(&base));

    let metadata = resolver.resolve("abc123").await.unwrap();
    assert_eq!(metadata.file_names, vec!["report.pdf"]);
    assert_eq!(metadata.file_sizes, vec![150_000]);
    assert_eq!(metadata.download_count, 3);
    assert!(metadata.password_protected);
    assert_eq!(metadata.expires_in_hours, 23);
    assert!(!metadata.expired);
}

#[tokio::test]
async fn test_resolve_unknown_code_is_link_not_found() {
    let router = Router::new().route(
        "/info/:code",
        get(|| async { StatusCode::NOT_FOUND }),
    );
    let base = spawn_backend(router).await;
    let resolver = LinkResolver::new(api(&base));

    let result = resolver.resolve("gone99").await;
    assert_eq!(result.unwrap_err(), ResolveError::LinkNotFound);
}

#[tokio::test]
async fn test_resolve_transport_failure_collapses_to_link_not_found() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let resolver = LinkResolver::new(api(&base));
    let result = resolver.resolve("abc123").await;
    assert_eq!(result.unwrap_err(), ResolveError::LinkNotFound);
}

#[tokio::test]
async fn test_resolve_malformed_body_collapses_to_link_not_found() {
    let router = Router::new().route(
        "/info/:code",
        get(|| async { Json(json!({"nothing": "useful"})) }),
    );
    let base = spawn_backend(router).await;
    let resolver = LinkResolver::new(api(&base));

    let result = resolver.resolve("abc123").await;
    assert_eq!(result.unwrap_err(), ResolveError::LinkNotFound);
}

#[tokio::test]
async fn test_qr_url_is_derived_from_the_short_code() {
    let resolver = LinkResolver::new(api("http://backend.test/api"));

    assert_eq!(
        resolver.qr_url("abc123").as_str(),
        "http://backend.test/api/abc123/qr"
    );
}

// ============================================================================
// DownloadGate
// ============================================================================

#[tokio::test]
async fn test_expired_link_blocks_the_gate_without_a_request() {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&hits);
    let router = Router::new()
        .route(
            "/info/:code",
            get(|| async { Json(info_payload(true, true)) }),
        )
        .route(
            "/:code/download",
            post(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(json!({"downloadUrl": "https://files.test/never"}))
                }
            }),
        );
    let base = spawn_backend(router).await;

    let resolver = LinkResolver::new(api(&base));
    let metadata = resolver.resolve("abc123").await.unwrap();
    assert!(metadata.expired);

    let gate = DownloadGate::new(api(&base), "abc123", &metadata);
    assert_eq!(gate.phase().await, GatePhase::Blocked);

    let result = gate.exchange(Some("whatever")).await;
    assert_eq!(result.unwrap_err(), ExchangeError::Expired);
    assert_eq!(gate.phase().await, GatePhase::Blocked);

    // Blocked never reaches the exchange endpoint
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_wrong_password_rejects_then_retry_succeeds() {
    let router = Router::new().route(
        "/:code/download",
        post(
            |Path(code): Path<String>, Json(body): Json<serde_json::Value>| async move {
                if body.get("password").and_then(|p| p.as_str()) == Some("secret") {
                    Json(json!({
                        "downloadUrl": format!("https://files.test/{code}/presigned")
                    }))
                    .into_response()
                } else {
                    StatusCode::UNAUTHORIZED.into_response()
                }
            },
        ),
    );
    let base = spawn_backend(router).await;
    let gate = DownloadGate::new(api(&base), "abc123", &metadata(false, true));

    let rejected = gate.exchange(Some("wrong")).await;
    assert_eq!(rejected.unwrap_err(), ExchangeError::Rejected);
    assert_eq!(gate.phase().await, GatePhase::Rejected);

    // Rejection is re-enterable; the right password still works
    let grant = gate.exchange(Some("secret")).await.unwrap();
    assert_eq!(
        grant.download_url.as_str(),
        "https://files.test/abc123/presigned"
    );
    assert_eq!(gate.phase().await, GatePhase::Granted);
}

#[tokio::test]
async fn test_unprotected_link_exchanges_with_an_empty_credential() {
    let router = Router::new().route(
        "/:code/download",
        post(|Json(body): Json<serde_json::Value>| async move {
            if body.get("password").is_some() {
                return StatusCode::BAD_REQUEST.into_response();
            }
            Json(json!({"downloadUrl": "https://files.test/open/presigned"})).into_response()
        }),
    );
    let base = spawn_backend(router).await;
    let gate = DownloadGate::new(api(&base), "open01", &metadata(false, false));
    assert!(!gate.password_protected());

    // Whatever the caller passes, an unprotected exchange goes out empty
    let grant = gate.exchange(Some("ignored")).await.unwrap();
    assert_eq!(
        grant.download_url.as_str(),
        "https://files.test/open/presigned"
    );
}

#[tokio::test]
async fn test_empty_password_is_omitted_from_a_protected_exchange() {
    let router = Router::new().route(
        "/:code/download",
        post(|Json(body): Json<serde_json::Value>| async move {
            // The server sees no password field at all, and rejects
            assert!(body.get("password").is_none());
            StatusCode::UNAUTHORIZED.into_response()
        }),
    );
    let base = spawn_backend(router).await;
    let gate = DownloadGate::new(api(&base), "abc123", &metadata(false, true));

    let result = gate.exchange(Some("")).await;
    assert_eq!(result.unwrap_err(), ExchangeError::Rejected);
}

#[tokio::test]
async fn test_exchange_transport_failure_is_undifferentiated() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let gate = DownloadGate::new(api(&base), "abc123", &metadata(false, true));

    // Same rejection as a wrong password -- nothing leaks about the cause
    let result = gate.exchange(Some("secret")).await;
    assert_eq!(result.unwrap_err(), ExchangeError::Rejected);
    assert_eq!(gate.phase().await, GatePhase::Rejected);
}

#[tokio::test]
async fn test_expiry_between_resolve_and_exchange_rejects() {
    // Metadata said the link was live, but it lapsed before the exchange
    let router = Router::new().route(
        "/:code/download",
        post(|| async { StatusCode::GONE.into_response() }),
    );
    let base = spawn_backend(router).await;
    let gate = DownloadGate::new(api(&base), "abc123", &metadata(false, false));

    let result = gate.exchange(None).await;
    assert_eq!(result.unwrap_err(), ExchangeError::Rejected);
    assert_eq!(gate.phase().await, GatePhase::Rejected);
}
