// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Manager client and load reporter tests against a mock manager.

use std::sync::Arc;
use std::time::Duration;

use runlet_protocol::Subscription;
use runlet_sandbox::{Engine, NoResolver};
use runlet_worker::execution_cache::ExecutionCache;
use runlet_worker::subscription::{ClientError, LoadReporter, LoadReporterConfig, ManagerClient};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn subscription() -> Subscription {
    Subscription {
        uuid: "w-1".to_string(),
        scheme: "http".to_string(),
        authority: "10.0.0.7:8090".to_string(),
        languages: vec!["lua".to_string()],
    }
}

fn executions() -> Arc<ExecutionCache> {
    Arc::new(ExecutionCache::new(
        Arc::new(Engine::new(Arc::new(NoResolver))),
        Duration::from_secs(60),
    ))
}

#[tokio::test]
async fn test_subscribe_posts_subscription() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/subscribers"))
        .and(body_json(subscription()))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    ManagerClient::new(server.uri())
        .subscribe(&subscription())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_report_load_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/subscribers/w-1/load"))
        .and(body_json(serde_json::json!({ "load": 1500 })))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/subscribers/gone/load"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = ManagerClient::new(server.uri());
    client.report_load("w-1", 1500).await.unwrap();

    let err = client.report_load("gone", 0).await.unwrap_err();
    assert!(matches!(err, ClientError::UnknownSubscriber));
}

#[tokio::test]
async fn test_unsubscribe_tolerates_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/subscribers/w-1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    ManagerClient::new(server.uri())
        .unsubscribe("w-1")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unexpected_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = ManagerClient::new(server.uri())
        .subscribe(&subscription())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::UnexpectedStatus(500)));
}

#[tokio::test]
async fn test_reporter_lifecycle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/subscribers"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/subscribers/w-1/load"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1..)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/subscribers/w-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let reporter = LoadReporter::new(
        ManagerClient::new(server.uri()),
        subscription(),
        executions(),
        LoadReporterConfig {
            interval: Duration::from_millis(20),
        },
    );
    let shutdown = reporter.shutdown_handle();
    let handle = tokio::spawn(async move { reporter.run().await });

    tokio::time::sleep(Duration::from_millis(150)).await;
    shutdown.notify_one();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_reporter_resubscribes_when_forgotten() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/subscribers"))
        .respond_with(ResponseTemplate::new(201))
        .expect(2..)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/subscribers/w-1/load"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let reporter = LoadReporter::new(
        ManagerClient::new(server.uri()),
        subscription(),
        executions(),
        LoadReporterConfig {
            interval: Duration::from_millis(20),
        },
    );
    let shutdown = reporter.shutdown_handle();
    let handle = tokio::spawn(async move { reporter.run().await });

    tokio::time::sleep(Duration::from_millis(150)).await;
    shutdown.notify_one();
    handle.await.unwrap();
}
