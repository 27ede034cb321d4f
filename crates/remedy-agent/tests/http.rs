//! HTTP collaborators against a mock server.

use std::time::Duration;

use remedy_agent::{
    EmailConfig, HttpJobControl, JobControl, JobParams, JobsConfig, MailRelayNotifier, Notifier,
};
use remedy_types::RemedyError;
use serde_json::json;
use wiremock::matchers::{basic_auth, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn job_control(server: &MockServer) -> HttpJobControl {
    HttpJobControl::new(
        &JobsConfig {
            workspace_url: server.uri(),
            token: "dapi-test".into(),
            cluster_id: None,
        },
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn get_run_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/2.1/jobs/runs/get"))
        .and(query_param("run_id", "42"))
        .and(header("authorization", "Bearer dapi-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "run_id": 42,
            "job_id": 4,
            "state": {"life_cycle_state": "TERMINATED", "result_state": "FAILED",
                      "state_message": "Task timed out"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let details = job_control(&server).get_run(42).await.unwrap();
    assert_eq!(details.job_id, Some(4));
    assert_eq!(details.state_message(), Some("Task timed out"));
}

#[tokio::test]
async fn get_run_not_found_carries_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/2.1/jobs/runs/get"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error_code": "INVALID_PARAMETER_VALUE",
            "message": "Run 42 does not exist."
        })))
        .mount(&server)
        .await;

    let err = job_control(&server).get_run(42).await.unwrap_err();
    match err {
        RemedyError::JobControl {
            operation,
            status,
            message,
        } => {
            assert_eq!(operation, "jobs/runs/get");
            assert_eq!(status, Some(400));
            assert_eq!(message, "Run 42 does not exist.");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn submit_run_sends_string_params() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/2.1/jobs/run-now"))
        .and(body_json(json!({
            "job_id": 4,
            "notebook_params": {"workers": "8", "mode": "full"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"run_id": 77})))
        .expect(1)
        .mount(&server)
        .await;

    let mut params = JobParams::new();
    params.insert("workers".into(), json!(8));
    params.insert("mode".into(), json!("full"));

    let run_id = job_control(&server)
        .submit_run(4, Some(&params))
        .await
        .unwrap();
    assert_eq!(run_id, 77);
}

#[tokio::test]
async fn submit_run_without_run_id_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/2.1/jobs/run-now"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let err = job_control(&server).submit_run(4, None).await.unwrap_err();
    assert!(!err.is_transport());
}

#[tokio::test]
async fn unreachable_workspace_is_transport_error() {
    let client = HttpJobControl::new(
        &JobsConfig {
            workspace_url: "http://127.0.0.1:9".into(),
            token: "t".into(),
            cluster_id: None,
        },
        Duration::from_secs(2),
    )
    .unwrap();

    let err = client.submit_run(1, None).await.unwrap_err();
    assert!(err.is_transport());
    assert!(!client.cancel_run(1).await);
}

#[tokio::test]
async fn cancel_and_list() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/2.1/jobs/runs/cancel"))
        .and(body_json(json!({"run_id": 9})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/2.1/jobs/list"))
        .and(query_param("limit", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobs": [
                {"job_id": 1, "created_time": 1717200000000_i64, "settings": {"name": "ingest"}},
                {"job_id": 2}
            ],
            "has_more": false
        })))
        .mount(&server)
        .await;

    let client = job_control(&server);
    assert!(client.cancel_run(9).await);

    let jobs = client.list_jobs(50).await.unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].name(), "ingest");
    assert_eq!(jobs[1].created_time, None);
}

#[tokio::test]
async fn relay_receives_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(basic_auth("alerts@example.com", "hunter2"))
        .and(body_json(json!({
            "from": "alerts@example.com",
            "to": ["ops@example.com"],
            "subject": "Job failed",
            "body": "details"
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = MailRelayNotifier::new(
        EmailConfig {
            enabled: true,
            relay_url: format!("{}/send", server.uri()),
            sender: "alerts@example.com".into(),
            password: "hunter2".into(),
            recipients: vec![],
        },
        Duration::from_secs(5),
    )
    .unwrap();

    assert!(
        notifier
            .send("Job failed", "details", &["ops@example.com".to_string()])
            .await
    );
}

#[tokio::test]
async fn relay_rejection_returns_false() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("mailbox unavailable"))
        .mount(&server)
        .await;

    let notifier = MailRelayNotifier::new(
        EmailConfig {
            enabled: true,
            relay_url: server.uri(),
            ..EmailConfig::default()
        },
        Duration::from_secs(5),
    )
    .unwrap();

    assert!(
        !notifier
            .send("s", "b", &["ops@example.com".to_string()])
            .await
    );
}
