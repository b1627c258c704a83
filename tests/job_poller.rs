/*
 * Copyright (c) 2025 Craig Hamilton and Contributors.
 * Licensed under either of
 *  - Apache License, Version 2.0 <http://www.apache.org/licenses/LICENSE-2.0> OR
 *  - MIT license <http://opensource.org/licenses/MIT>
 *  at your option.
 */
mod helpers;

#[cfg(test)]
mod test {
    use crate::helpers::{self, TOKEN_PATH};
    use firefly_services::{FireflyError, JobStatus, Phase, PollPolicy, StatusRule};
    use futures::{StreamExt, pin_mut};
    use serde_json::json;
    use std::time::{Duration, Instant};
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const STATUS_PATH: &str = "/jobs/42/status";

    async fn mount_status(server: &MockServer, body: serde_json::Value, times: Option<u64>) {
        let mock = Mock::given(method("GET"))
            .and(path(STATUS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body));
        match times {
            Some(times) => mock.up_to_n_times(times).expect(times).mount(server).await,
            None => mock.mount(server).await,
        }
    }

    #[tokio::test]
    async fn succeeds_after_pending_polls() {
        let server = MockServer::start().await;
        helpers::mount_token(&server, 1).await;
        mount_status(&server, json!({"status": "pending"}), Some(2)).await;
        let asset = json!({"assetID": "urn:aaid:1", "downloadUri": "https://cdn/result.pdf"});
        mount_status(&server, json!({"status": "succeeded", "asset": asset}), Some(1)).await;

        let client = helpers::client(&server);
        let result = client
            .poller()
            .wait_until_terminal(
                helpers::handle(&server, STATUS_PATH),
                &helpers::fast_poll(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.payload, asset);
        assert_eq!(result.polls, 3);
        assert_eq!(helpers::requests_to(&server, "GET", STATUS_PATH).await, 3);
    }

    #[tokio::test]
    async fn failed_job_is_not_retried() {
        let server = MockServer::start().await;
        helpers::mount_token(&server, 1).await;
        mount_status(&server, json!({"status": "failed", "error": {"code": "X"}}), None).await;

        let err = helpers::client(&server)
            .poller()
            .wait_until_terminal(
                helpers::handle(&server, STATUS_PATH),
                &helpers::fast_poll(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            FireflyError::Job(payload) => assert_eq!(payload, json!({"code": "X"})),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(helpers::requests_to(&server, "GET", STATUS_PATH).await, 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_wait() {
        let server = MockServer::start().await;
        helpers::mount_token(&server, 1).await;
        mount_status(&server, json!({"status": "running"}), None).await;
        let policy = PollPolicy::fixed(Duration::from_millis(100), Duration::from_millis(500));

        let started = Instant::now();
        let err = helpers::client(&server)
            .poller()
            .wait_until_terminal(
                helpers::handle(&server, STATUS_PATH),
                &policy,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(err.phase(), Phase::Polling);
        match err {
            FireflyError::JobTimeout { last_status, .. } => {
                assert_eq!(last_status.as_deref(), Some("running"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(elapsed >= Duration::from_millis(500), "gave up early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1500), "gave up late: {elapsed:?}");
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let server = MockServer::start().await;
        helpers::mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(STATUS_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        mount_status(&server, json!({"status": "succeeded", "result": {"size": 1}}), Some(1)).await;

        let result = helpers::client(&server)
            .poller()
            .wait_until_terminal(
                helpers::handle(&server, STATUS_PATH),
                &helpers::fast_poll(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.payload, json!({"size": 1}));
        assert_eq!(result.polls, 1);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        helpers::mount_token(&server, 1).await;
        Mock::given(method("GET"))
            .and(path(STATUS_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such job"))
            .expect(1)
            .mount(&server)
            .await;

        let err = helpers::client(&server)
            .poller()
            .wait_until_terminal(
                helpers::handle(&server, STATUS_PATH),
                &helpers::fast_poll(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            FireflyError::StatusCheck { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "no such job");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_token_is_refreshed() {
        let server = MockServer::start().await;
        helpers::mount_token(&server, 2).await;
        Mock::given(method("GET"))
            .and(path(STATUS_PATH))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        mount_status(&server, json!({"status": "done", "asset": {"id": 1}}), Some(1)).await;

        let result = helpers::client(&server)
            .poller()
            .wait_until_terminal(
                helpers::handle(&server, STATUS_PATH),
                &helpers::fast_poll(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.payload, json!({"id": 1}));
        assert_eq!(helpers::requests_to(&server, "POST", TOKEN_PATH).await, 2);
    }

    #[tokio::test]
    async fn unavailable_token_endpoint_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(helpers::token_response(86399))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(helpers::token_response(86399))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(STATUS_PATH))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_status(&server, json!({"status": "done", "asset": {"id": 1}}), Some(1)).await;

        let result = helpers::client(&server)
            .poller()
            .wait_until_terminal(
                helpers::handle(&server, STATUS_PATH),
                &helpers::fast_poll(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.payload, json!({"id": 1}));
        assert_eq!(result.polls, 1);
        assert_eq!(helpers::requests_to(&server, "POST", TOKEN_PATH).await, 3);
    }

    #[tokio::test]
    async fn refused_credentials_end_the_wait() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_client"))
            .expect(1)
            .mount(&server)
            .await;

        let err = helpers::client(&server)
            .poller()
            .wait_until_terminal(
                helpers::handle(&server, STATUS_PATH),
                &helpers::fast_poll(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.phase(), Phase::Auth);
        assert!(matches!(err, FireflyError::AuthRejected { status: 400, .. }));
        assert_eq!(helpers::requests_to(&server, "GET", STATUS_PATH).await, 0);
    }

    #[tokio::test]
    async fn cancellation_stops_waiting() {
        let server = MockServer::start().await;
        helpers::mount_token(&server, 1).await;
        mount_status(&server, json!({"status": "pending"}), None).await;
        let policy = PollPolicy::fixed(Duration::from_secs(10), Duration::from_secs(60));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = helpers::client(&server)
            .poller()
            .wait_until_terminal(helpers::handle(&server, STATUS_PATH), &policy, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, FireflyError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(helpers::requests_to(&server, "GET", STATUS_PATH).await, 1);
    }

    #[tokio::test]
    async fn cancelled_before_first_poll() {
        let server = MockServer::start().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = helpers::client(&server)
            .poller()
            .wait_until_terminal(
                helpers::handle(&server, STATUS_PATH),
                &helpers::fast_poll(),
                &cancel,
            )
            .await
            .unwrap_err();

        assert_eq!(err.phase(), Phase::Cancelled);
        assert_eq!(helpers::requests_to(&server, "GET", STATUS_PATH).await, 0);
    }

    #[tokio::test]
    async fn watch_reports_each_status() {
        let server = MockServer::start().await;
        helpers::mount_token(&server, 1).await;
        let outputs = json!([{"status": "pending"}, {"status": "pending"}]);
        mount_status(&server, json!({"outputs": outputs}), Some(1)).await;
        let outputs = json!([{"status": "succeeded"}, {"status": "running"}]);
        mount_status(&server, json!({"outputs": outputs}), Some(1)).await;
        let outputs = json!([{"status": "succeeded"}, {"status": "succeeded"}]);
        mount_status(&server, json!({"outputs": outputs}), Some(1)).await;

        let client = helpers::client(&server);
        let poller = client.poller();
        let policy = helpers::fast_poll().with_status_rule(StatusRule::NestedOutputs);
        let cancel = CancellationToken::new();
        let statuses = poller.watch(helpers::handle(&server, STATUS_PATH), &policy, &cancel);
        pin_mut!(statuses);

        let mut labels = Vec::new();
        while let Some(status) = statuses.next().await {
            let status = status.unwrap();
            labels.push(status.label());
            if let JobStatus::Succeeded(payload) = status {
                assert_eq!(payload["outputs"].as_array().map(Vec::len), Some(2));
            }
        }
        assert_eq!(labels, vec!["pending", "running", "succeeded"]);
    }
}
