use super::router;
use crate::api::AppState;
use crate::config::Config;
use crate::db::test_pool;
use crate::storage::MemoryBackend;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "shelf-test-boundary";

async fn test_app() -> Router {
    let state = AppState::new(test_pool().await, Arc::new(MemoryBackend::new()), Config::for_tests());
    router(state)
}

/// Register a user and return its access token
async fn register(app: &Router) -> String {
    let (status, body) = send(
        app,
        json_request(
            Method::POST,
            "/api/auth/register",
            None,
            json!({ "name": "Ada", "email": "ada@example.com", "password": "correct horse" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["token"].as_str().unwrap().to_string()
}

fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn upload_request(token: &str, path: &[&str], files: &[(&str, &str)]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"path\"\r\n\r\n{}\r\n",
            serde_json::to_string(path).unwrap()
        )
        .as_bytes(),
    );
    for (name, content) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/files/upload")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

async fn send_raw(app: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, headers, bytes)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, _, bytes) = send_raw(app, request).await;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn names(list: &Value) -> Vec<&str> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn test_health_and_fallback() {
    let app = test_app().await;

    let (status, body) = send(&app, get_request("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&app, get_request("/api/nowhere", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Resource not found");
}

#[tokio::test]
async fn test_routes_require_token() {
    let app = test_app().await;

    let (status, _) = send(&app, get_request("/api/files", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, get_request("/api/starred", Some("garbage"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_flow() {
    let app = test_app().await;
    register(&app).await;

    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            "/api/auth/register",
            None,
            json!({ "name": "Ada", "email": "ADA@example.com", "password": "another pass" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "email": "ada@example.com", "password": "wrong horse" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "email": "ada@example.com", "password": "correct horse" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["name"], "Ada");
    let refresh = body["refreshToken"].as_str().unwrap().to_string();

    // A refresh token does not open the API
    let (status, _) = send(&app, get_request("/api/files", Some(&refresh))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/api/auth/refresh", None, json!({ "refreshToken": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap();
    let (status, _) = send(&app, get_request("/api/files", Some(token))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_short_password_rejected() {
    let app = test_app().await;
    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            "/api/auth/register",
            None,
            json!({ "name": "Bob", "email": "bob@example.com", "password": "short" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_folder_upload_and_listing() {
    let app = test_app().await;
    let token = register(&app).await;

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/files/folder",
            Some(&token),
            json!({ "folderName": "docs", "path": [] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["item"]["key"], "docs/");
    assert_eq!(body["item"]["type"], "folder");

    let (status, body) = send(
        &app,
        upload_request(&token, &["docs"], &[("report.pdf", "%PDF-1.4"), ("notes.txt", "hi")]),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["files"].as_array().unwrap().len(), 2);

    let (status, body) = send(&app, upload_request(&token, &[], &[("readme.md", "# Shelf")])).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["files"][0]["key"], "readme.md");

    let (status, body) = send(&app, get_request("/api/files", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&body["directories"]), vec!["docs"]);
    assert_eq!(names(&body["files"]), vec!["readme.md"]);

    let (status, body) = send(&app, get_request("/api/files?path=docs", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&body["files"]), vec!["notes.txt", "report.pdf"]);
    assert_eq!(body["files"][1]["type"], "pdf");
    assert_eq!(body["files"][1]["size"], "8 Bytes");

    let (status, headers, bytes) = send_raw(
        &app,
        get_request("/api/files/content/docs%2Freport.pdf", Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"%PDF-1.4");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"report.pdf\""
    );
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
}

#[tokio::test]
async fn test_upload_without_files_is_rejected() {
    let app = test_app().await;
    let token = register(&app).await;
    let (status, _) = send(&app, upload_request(&token, &[], &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rename_and_delete() {
    let app = test_app().await;
    let token = register(&app).await;
    send(&app, upload_request(&token, &["docs", "img"], &[("logo.png", "png")])).await;
    send(&app, upload_request(&token, &[], &[("readme.md", "# Shelf")])).await;

    let (status, body) = send(
        &app,
        json_request(Method::PATCH, "/api/files/docs%2F", Some(&token), json!({ "name": "papers" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item"]["key"], "papers/");

    let (status, _) = send(
        &app,
        json_request(Method::PATCH, "/api/files/readme.md", Some(&token), json!({ "name": "README.txt" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        Request::builder()
            .method(Method::DELETE)
            .uri("/api/files/papers%2F")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, get_request("/api/files", Some(&token))).await;
    assert!(body["directories"].as_array().unwrap().is_empty());
    assert_eq!(names(&body["files"]), vec!["README.txt"]);
}

#[tokio::test]
async fn test_items_named_like_static_routes() {
    let app = test_app().await;
    let token = register(&app).await;
    send(&app, upload_request(&token, &[], &[("upload", "u"), ("folder", "f"), ("content", "c")])).await;

    let (status, body) = send(
        &app,
        json_request(Method::PATCH, "/api/files/upload", Some(&token), json!({ "name": "uploaded" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item"]["key"], "uploaded");

    for key in ["folder", "content", "uploaded"] {
        let (status, _) = send(
            &app,
            Request::builder()
                .method(Method::DELETE)
                .uri(format!("/api/files/{}", key))
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "delete {}", key);
    }

    let (_, body) = send(&app, get_request("/api/files", Some(&token))).await;
    assert!(body["files"].as_array().unwrap().is_empty());

    // the static routes still serve their POST handlers
    let (status, _) = send(
        &app,
        json_request(Method::POST, "/api/files/folder", Some(&token), json!({ "folderName": "docs", "path": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_star_routes() {
    let app = test_app().await;
    let token = register(&app).await;

    let (status, body) = send(
        &app,
        json_request(
            Method::PATCH,
            "/api/star/file/docs%2Freport.pdf",
            Some(&token),
            json!({ "starred": true, "type": "pdf", "size": 1536 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item"]["starred"], true);
    assert_eq!(body["item"]["size"], "1.5 KB");

    let (status, _) = send(
        &app,
        json_request(Method::PATCH, "/api/star/folder/docs%2F", Some(&token), json!({ "starred": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get_request("/api/starred", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names(&body["directories"]), vec!["docs"]);
    assert_eq!(names(&body["files"]), vec!["report.pdf"]);

    let (status, _) = send(
        &app,
        json_request(Method::PATCH, "/api/star/link/docs%2F", Some(&token), json!({ "starred": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    send(
        &app,
        json_request(
            Method::PATCH,
            "/api/star/file/docs%2Freport.pdf",
            Some(&token),
            json!({ "starred": false }),
        ),
    )
    .await;
    let (_, body) = send(&app, get_request("/api/starred", Some(&token))).await;
    assert!(body["files"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_share_link_serves_file_publicly() {
    let app = test_app().await;
    let token = register(&app).await;
    send(&app, upload_request(&token, &[], &[("readme.md", "# Shelf")])).await;

    let (status, body) = send(
        &app,
        get_request("/api/files/share/readme.md?expiresIn=3600", Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let url = body["url"].as_str().unwrap();
    assert!(url.starts_with("http://localhost:3001/api/shared/"));
    assert!(body["expiresAt"].is_string());

    let path = url.trim_start_matches("http://localhost:3001");
    let (status, _, bytes) = send_raw(&app, get_request(path, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"# Shelf");

    let (status, _) = send(&app, get_request("/api/shared/not-a-token", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get_request("/api/files/share/missing.txt", Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, get_request("/api/files/download/readme.md", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["url"].as_str().unwrap().contains("/api/shared/"));
}
