use axum::http::{header, StatusCode};

use super::*;

#[tokio::test]
async fn test_healthz_and_readyz() {
    let t = setup_test_app().await;
    let (status, _, body) = send(&t.app, get("/healthz", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"ok");

    let (status, _, body) = send(&t.app, get("/readyz", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"ready");
}

#[tokio::test]
async fn test_readyz_reports_closed_pool() {
    let t = setup_test_app().await;
    t.state.db.close().await;
    let (status, _, _) = send(&t.app, get("/readyz", None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_security_headers_present() {
    let t = setup_test_app().await;
    let (_, headers, _) = send(&t.app, get("/version", None)).await;
    for name in [
        "x-content-type-options",
        "x-frame-options",
        "referrer-policy",
        "permissions-policy",
        "cross-origin-opener-policy",
    ] {
        assert!(headers.contains_key(name), "missing {}", name);
    }
    assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
}

#[tokio::test]
async fn test_metrics_endpoints() {
    let t = setup_test_app().await;
    let token = admin_token(&t.app).await;
    send(&t.app, get("/api/books", Some(&token))).await;

    let (status, _, body) = send(&t.app, get("/metrics", None)).await;
    assert_eq!(status, StatusCode::OK);
    let m = json(&body);
    assert_eq!(m["logins_ok"], 1);
    assert_eq!(m["listings"], 1);
    assert!(m.get("uptime_seconds").is_some());

    let (status, headers, body) = send(&t.app, get("/metrics/prometheus", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get(header::CONTENT_TYPE).unwrap().to_str().unwrap().starts_with("text/plain"));
    assert!(String::from_utf8_lossy(&body).contains("bookstock_listings 1"));
}

#[tokio::test]
async fn test_version_endpoint() {
    let t = setup_test_app().await;
    let (status, _, body) = send(&t.app, get("/version", None)).await;
    assert_eq!(status, StatusCode::OK);
    let v = json(&body);
    assert_eq!(v["name"], "bookstock");
    assert!(v.get("version").is_some());
    assert!(v.get("build").is_some());
}

#[tokio::test]
async fn test_path_traversal_is_rejected() {
    let t = setup_test_app().await;
    let (status, _, body) = send(&t.app, get("/uploads/%2e%2e/secret", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&body)["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_cors_allows_configured_origin_and_exposes_disposition() {
    let t = setup_test_app().await;
    let req = axum::http::Request::builder()
        .uri("/healthz")
        .header(header::ORIGIN, "http://localhost:4028")
        .body(axum::body::Body::empty())
        .unwrap();
    let (_, headers, _) = send(&t.app, req).await;
    assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "http://localhost:4028");
    assert!(headers
        .get(header::ACCESS_CONTROL_EXPOSE_HEADERS)
        .unwrap()
        .to_str()
        .unwrap()
        .to_ascii_lowercase()
        .contains("content-disposition"));

    let req = axum::http::Request::builder()
        .uri("/healthz")
        .header(header::ORIGIN, "http://evil.example")
        .body(axum::body::Body::empty())
        .unwrap();
    let (_, headers, _) = send(&t.app, req).await;
    assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}
