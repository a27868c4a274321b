// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::time::Duration;

use runlet_protocol::{EXPIRES_HEADER, Task};
use runlet_worker::runtime::WorkerRuntime;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_runtime_serves_tasks() {
    let runtime = WorkerRuntime::builder()
        .bind_addr("127.0.0.1:0".parse().unwrap())
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();
    assert!(runtime.is_running());

    let task = Task::new(
        "acme",
        "p1",
        "lua",
        Duration::from_secs(1),
        b"return 42",
    );
    let response = reqwest::Client::new()
        .post(format!("http://{}/v1/tasks", runtime.local_addr()))
        .json(&task)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key(EXPIRES_HEADER));
    assert_eq!(runtime.executions().stats().runs, 1);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_runtime_subscribes_and_unsubscribes() {
    let manager = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/subscribers"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&manager)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/subscribers/worker-a"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&manager)
        .await;

    let runtime = WorkerRuntime::builder()
        .bind_addr("127.0.0.1:0".parse().unwrap())
        .worker_id("worker-a")
        .manager_url(manager.uri())
        .load_report_interval(Duration::from_secs(60))
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    runtime.shutdown().await.unwrap();
}

#[test]
fn test_builder_rejects_bad_scheme() {
    let result = WorkerRuntime::builder().scheme("ftp").build();
    assert!(result.is_err());
}
