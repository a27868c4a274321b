// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Subscriber endpoint tests against the in-process router.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
    response::Response,
};
use runlet_manager::{
    ctx::Ctx,
    dispatcher::Dispatcher,
    handlers::subscribers::subscriber_info::SubscriberInfo,
    program_cache::ProgramCache,
    server,
    trigger::ScheduledLauncher,
    workforce::Workforce,
};
use runlet_protocol::ErrorBody;
use tower::ServiceExt;

fn setup() -> (Router, Arc<Workforce>) {
    let workforce = Arc::new(Workforce::new(Duration::from_secs(15)));
    let dispatcher = Arc::new(Dispatcher::new(workforce.clone()));
    let programs = Arc::new(ProgramCache::new(Arc::new(ScheduledLauncher::new(
        dispatcher.clone(),
    ))));
    let ctx = Ctx {
        workforce: workforce.clone(),
        programs,
        dispatcher,
    };
    (server::router(ctx), workforce)
}

fn request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn subscription(id: &str) -> serde_json::Value {
    serde_json::json!({
        "uuid": id,
        "scheme": "http",
        "authority": format!("{id}.internal:8090"),
        "languages": ["lua"],
    })
}

async fn error_code(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice::<ErrorBody>(&bytes).unwrap().code
}

#[tokio::test]
async fn test_subscribe_then_exists() {
    let (app, workforce) = setup();

    let response = app
        .clone()
        .oneshot(request("POST", "/v1/subscribers", Some(subscription("w-1"))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(workforce.exists("w-1"));

    let response = app
        .oneshot(request("GET", "/v1/subscribers/w-1", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_unknown_subscriber_is_not_found() {
    let (app, _) = setup();

    let response = app
        .oneshot(request("GET", "/v1/subscribers/nobody", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(response).await, "SUBSCRIBER_NOT_FOUND");
}

#[tokio::test]
async fn test_malformed_subscription_is_bad_request() {
    let (app, workforce) = setup();

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/v1/subscribers",
            Some(serde_json::json!({ "uuid": 42 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, "INVALID_REQUEST_BODY");

    let mut ftp = subscription("w-1");
    ftp["scheme"] = "ftp".into();
    let response = app
        .oneshot(request("POST", "/v1/subscribers", Some(ftp)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, "INVALID_SUBSCRIPTION");
    assert!(workforce.is_empty());
}

#[tokio::test]
async fn test_report_load() {
    let (app, workforce) = setup();
    app.clone()
        .oneshot(request("POST", "/v1/subscribers", Some(subscription("w-1"))))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(request(
            "PUT",
            "/v1/subscribers/w-1/load",
            Some(serde_json::json!({ "load": 2500 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(workforce.get("w-1").unwrap().load, 2500);

    let response = app
        .oneshot(request(
            "PUT",
            "/v1/subscribers/ghost/load",
            Some(serde_json::json!({ "load": 1 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(!workforce.exists("ghost"));
}

#[tokio::test]
async fn test_report_load_malformed() {
    let (app, _) = setup();
    app.clone()
        .oneshot(request("POST", "/v1/subscribers", Some(subscription("w-1"))))
        .await
        .unwrap();

    let response = app
        .oneshot(request(
            "PUT",
            "/v1/subscribers/w-1/load",
            Some(serde_json::json!({ "load": "heavy" })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, "INVALID_REQUEST_BODY");
}

#[tokio::test]
async fn test_unsubscribe_is_idempotent() {
    let (app, workforce) = setup();
    app.clone()
        .oneshot(request("POST", "/v1/subscribers", Some(subscription("w-1"))))
        .await
        .unwrap();

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(request("DELETE", "/v1/subscribers/w-1", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
    assert!(!workforce.exists("w-1"));
}

#[tokio::test]
async fn test_list_subscribers() {
    let (app, _) = setup();
    for id in ["w-2", "w-1"] {
        app.clone()
            .oneshot(request("POST", "/v1/subscribers", Some(subscription(id))))
            .await
            .unwrap();
    }

    let response = app
        .oneshot(request("GET", "/v1/subscribers", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let listed: Vec<SubscriberInfo> = serde_json::from_slice(&bytes).unwrap();
    let ids: Vec<&str> = listed.iter().map(|s| s.uuid.as_str()).collect();
    assert_eq!(ids, vec!["w-1", "w-2"]);
    assert!(listed.iter().all(|s| s.alive && s.load == 0));
}

#[tokio::test]
async fn test_health() {
    let (app, _) = setup();
    app.clone()
        .oneshot(request("POST", "/v1/subscribers", Some(subscription("w-1"))))
        .await
        .unwrap();

    let response = app.oneshot(request("GET", "/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["workers"], 1);
    assert_eq!(body["alive_workers"], 1);
    assert_eq!(body["routines"], 0);
    assert_eq!(body["dispatch"]["dropped"], 0);
}
