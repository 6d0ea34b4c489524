//! HTTP adapters against a local mock server.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use funshiksha_core::api::{HttpRemote, RemoteError};
use funshiksha_core::cache::{
    CacheInterceptor, CacheStorage, Fetcher, HttpFetcher, InterceptorConfig, LifecycleState,
    Request, ResponseKind,
};
use funshiksha_core::models::{OperationKind, PendingOperation};
use funshiksha_core::sync::{DeliveryError, RemoteEndpoint};
use funshiksha_core::{Connectivity, LocalStore, SyncCoordinator};

fn operation(id: &str, kind: OperationKind) -> PendingOperation {
    PendingOperation {
        id: id.to_string(),
        kind,
        payload: json!({ "content_id": "math_001", "selected_option": 1 }),
        created_at: Utc::now(),
        retry_count: 0,
    }
}

#[tokio::test]
async fn remote_posts_payload_with_idempotency_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sync/quiz_attempt"))
        .and(header("Idempotency-Key", "queue_1"))
        .and(body_json(json!({ "content_id": "math_001", "selected_option": 1 })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let remote = HttpRemote::new(server.uri()).unwrap();
    remote
        .deliver(&operation("queue_1", OperationKind::AttemptSubmission))
        .await
        .unwrap();
}

#[tokio::test]
async fn remote_maps_error_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sync/user_update"))
        .respond_with(ResponseTemplate::new(422).set_body_string("missing name"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sync/progress_update"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let remote = HttpRemote::new(server.uri()).unwrap();
    let rejected = remote
        .deliver(&operation("queue_2", OperationKind::ProfileUpdate))
        .await
        .unwrap_err();
    assert!(matches!(
        rejected,
        DeliveryError::Remote(RemoteError::Rejected(ref body)) if body == "missing name"
    ));

    let unavailable = remote
        .deliver(&operation("queue_3", OperationKind::ProgressUpdate))
        .await
        .unwrap_err();
    assert!(matches!(
        unavailable,
        DeliveryError::Remote(RemoteError::ServerError(_))
    ));
}

#[tokio::test]
async fn remote_gives_up_after_repeated_rate_limits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .expect(4)
        .mount(&server)
        .await;

    let remote = HttpRemote::new(server.uri())
        .unwrap()
        .with_initial_backoff(Duration::from_millis(5));
    let err = remote
        .deliver(&operation("queue_4", OperationKind::AttemptSubmission))
        .await
        .unwrap_err();
    assert!(matches!(err, DeliveryError::Remote(RemoteError::RateLimited)));
}

#[tokio::test]
async fn coordinator_delivers_through_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sync/quiz_attempt"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalStore::new(dir.path()));
    for n in 0..2 {
        store
            .add_pending(OperationKind::AttemptSubmission, json!({ "n": n }))
            .await
            .unwrap();
    }
    let remote = Arc::new(HttpRemote::new(server.uri()).unwrap());
    let sync = SyncCoordinator::new(
        store,
        remote,
        Connectivity::new(true),
        Duration::from_secs(5),
    );

    let report = sync.sync_pending().await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(sync.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn fetcher_tags_same_origin_responses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/static/css/main.css"))
        .respond_with(ResponseTemplate::new(200).set_body_string("body{}"))
        .mount(&server)
        .await;

    let fetcher = HttpFetcher::new(&server.uri()).unwrap();
    let mut response = fetcher
        .fetch(&Request::get(format!("{}/static/css/main.css", server.uri())))
        .await
        .unwrap();
    assert!(response.is_ok());
    assert_eq!(response.kind, ResponseKind::Basic);
    assert_eq!(response.text().unwrap(), "body{}");

    let other = HttpFetcher::new("https://funshiksha.app").unwrap();
    let response = other
        .fetch(&Request::get(format!("{}/static/css/main.css", server.uri())))
        .await
        .unwrap();
    assert_eq!(response.kind, ResponseKind::Cors);
}

#[tokio::test]
async fn interceptor_serves_installed_shell_offline() {
    let server = MockServer::start().await;
    for (route, body) in [("/", "<html>home</html>"), ("/offline.html", "<html>offline</html>")] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(CacheStorage::new(dir.path().to_path_buf()).unwrap());
    let config = InterceptorConfig {
        cache_name: "funshiksha-v1".to_string(),
        origin: server.uri(),
        offline_url: "/offline.html".to_string(),
        manifest: vec!["/".to_string(), "/offline.html".to_string()],
        return_uncacheable_responses: false,
    };
    let fetcher = Arc::new(HttpFetcher::new(&server.uri()).unwrap());
    let interceptor = CacheInterceptor::new(config, storage, fetcher);

    assert_eq!(interceptor.install().await.unwrap(), 2);
    interceptor.activate().await.unwrap();
    assert_eq!(interceptor.state(), LifecycleState::Active);

    // Cached shell is served without another request (expect(1) above)
    let mut home = interceptor
        .handle(Request::get(format!("{}/", server.uri())))
        .await
        .unwrap();
    assert_eq!(home.text().unwrap(), "<html>home</html>");

    // Unknown page, server answers 404: HTML callers get the offline document
    let mut missing = interceptor
        .handle(Request::get(format!("{}/quiz/science", server.uri())).accept("text/html"))
        .await
        .unwrap();
    assert_eq!(missing.text().unwrap(), "<html>offline</html>");
}
