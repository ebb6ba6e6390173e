//! HTTP client against an in-process stand-in daemon

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query},
    http::StatusCode,
    routing::{get, post, put},
};
use fleetdeck_api::models::ContainerAction;
use fleetdeck_api::requests::{FilesQuery, SearchQuery, UpsertHostRequest};
use fleetdeck_api::responses::{ActionResponse, HealthResponse};
use fleetdeck_client::{ClientError, HttpClient};
use serde_json::json;

async fn serve(router: Router) -> HttpClient {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    HttpClient::new(format!("http://{addr}")).unwrap()
}

#[tokio::test]
async fn test_health() {
    let client = serve(Router::new().route(
        "/health",
        get(|| async {
            Json(HealthResponse {
                status: "ok".to_string(),
            })
        }),
    ))
    .await;

    assert_eq!(client.health().await.unwrap().status, "ok");
}

#[tokio::test]
async fn test_action_path_and_response() {
    let client = serve(Router::new().route(
        "/api/containers/{host}/{id}/{action}",
        post(|Path((host, id, action)): Path<(String, String, String)>| async move {
            Json(ActionResponse::ok(format!("{action}:{host}:{id}")))
        }),
    ))
    .await;

    let result = client
        .container_action("nas", "abc123def456", ContainerAction::Unpause)
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.message, "unpause:nas:abc123def456");
}

#[tokio::test]
async fn test_error_body_is_parsed() {
    let client = serve(Router::new().route(
        "/api/containers/{host}/{id}/update",
        post(|| async {
            (
                StatusCode::CONFLICT,
                Json(json!({"code": "VALIDATION_FAILED", "message": "validation container exited with code 1"})),
            )
        }),
    ))
    .await;

    let err = client.update_container("nas", "abc123def456").await.unwrap_err();
    match err {
        ClientError::Api {
            status,
            code,
            message,
        } => {
            assert_eq!(status, 409);
            assert_eq!(code, "VALIDATION_FAILED");
            assert!(message.contains("code 1"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_route_is_not_found() {
    let client = serve(Router::new()).await;
    let err = client.containers().await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_query_strings() {
    let client = serve(Router::new().route(
        "/api/search",
        get(|Query(query): Query<SearchQuery>| async move {
            if query.q == "plex server" {
                Json(json!([]))
            } else {
                Json(json!(null))
            }
        }),
    ))
    .await;

    assert!(client.search("plex server").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_file_upload_and_download() {
    let client = serve(Router::new().route(
        "/api/hosts/{host}/files/content",
        put(|Query(query): Query<FilesQuery>, body: Bytes| async move {
            assert_eq!(query.path, "/srv/app/.env");
            assert_eq!(&body[..], b"PORT=8080\n");
            StatusCode::NO_CONTENT
        })
        .get(|Query(query): Query<FilesQuery>| async move {
            assert_eq!(query.path, "/srv/app/.env");
            b"PORT=8080\n".to_vec()
        }),
    ))
    .await;

    client
        .write_file("nas", "/srv/app/.env", b"PORT=8080\n".to_vec())
        .await
        .unwrap();
    let data = client.read_file("nas", "/srv/app/.env").await.unwrap();
    assert_eq!(data, b"PORT=8080\n");
}

#[tokio::test]
async fn test_upsert_host_sends_body() {
    let client = serve(Router::new().route(
        "/api/hosts/{host}",
        put(|Path(host): Path<String>, Json(req): Json<UpsertHostRequest>| async move {
            (
                StatusCode::CREATED,
                Json(json!({"id": host, "name": req.name, "address": req.address, "isLocal": req.is_local})),
            )
        })
        .delete(|| async { StatusCode::NO_CONTENT }),
    ))
    .await;

    let request = UpsertHostRequest {
        name: "NAS".to_string(),
        address: "10.0.0.5".to_string(),
        is_local: false,
    };
    let host = client.upsert_host("nas", &request).await.unwrap();
    assert_eq!(host.id, "nas");
    assert_eq!(host.address, "10.0.0.5");
    client.remove_host("nas").await.unwrap();
}
