//! The API suite and facade, run against the in-process stub backend

use std::time::Duration;

use bugtrack_common::{BugPatch, Priority, Status};
use bugtrack_e2e::config::Reporter;
use bugtrack_e2e::fixtures;
use bugtrack_e2e::runner::RunnerConfig;
use bugtrack_e2e::suites::ApiSuite;
use bugtrack_e2e::{BugApi, E2eError, TestRunner, TestStatus};
use bugtrack_stub::StubServer;
use regex::Regex;
use test_case::test_case;

fn runner(output: &std::path::Path, workers: usize) -> TestRunner {
    TestRunner::with_config(RunnerConfig {
        workers,
        retries: 0,
        test_timeout: Duration::from_secs(30),
        output_dir: output.to_path_buf(),
        screenshot_on_failure: false,
        reporters: vec![Reporter::Json, Reporter::Junit],
        grep: None,
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn whole_api_suite_passes_against_stub() {
    let stub = StubServer::spawn().await.unwrap();
    let output = tempfile::tempdir().unwrap();
    let runner = runner(output.path(), 4);

    let suite = ApiSuite::new(BugApi::new(stub.api_base_url()).unwrap());
    let result = runner.run_suite(&suite).await;

    let failures: Vec<_> = result
        .results
        .iter()
        .filter(|r| r.status == TestStatus::Failed)
        .map(|r| format!("{}: {}", r.full_name(), r.error.as_deref().unwrap_or("")))
        .collect();
    assert!(failures.is_empty(), "failed scenarios:\n{}", failures.join("\n"));
    assert_eq!(result.total, 37);
    assert_eq!(result.passed, 37);

    let written = runner.write_results(&[result]).unwrap();
    assert_eq!(written.len(), 2);
    assert!(output.path().join("results.json").exists());
    assert!(output.path().join("results.xml").exists());

    // Per-scenario cleanup leaves nothing behind
    assert!(stub.store().read().await.list_bugs().is_empty());
    stub.shutdown().await;
}

#[tokio::test]
async fn grep_selects_a_subset() {
    let stub = StubServer::spawn().await.unwrap();
    let output = tempfile::tempdir().unwrap();
    let mut config = RunnerConfig {
        grep: Some(Regex::new("^TC-API-02[0-2]").unwrap()),
        ..RunnerConfig::default()
    };
    config.output_dir = output.path().to_path_buf();
    config.workers = 2;
    config.retries = 0;
    let runner = TestRunner::with_config(config);

    let suite = ApiSuite::new(BugApi::new(stub.api_base_url()).unwrap());
    let result = runner.run_suite(&suite).await;

    let ids: Vec<_> = result.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["TC-API-020", "TC-API-021", "TC-API-022"]);
    assert!(result.success());
}

#[tokio::test]
async fn unreachable_api_fails_every_scenario_without_panicking() {
    let output = tempfile::tempdir().unwrap();
    let mut config = RunnerConfig::default();
    config.output_dir = output.path().to_path_buf();
    config.grep = Some(Regex::new("TC-API-00[1-3]").unwrap());
    config.retries = 0;
    let runner = TestRunner::with_config(config);

    let api = BugApi::with_timeout("http://127.0.0.1:9/api", Duration::from_secs(2)).unwrap();
    let result = runner.run_suite(&ApiSuite::new(api)).await;

    assert_eq!(result.failed, 3);
    assert!(result.results.iter().all(|r| r.error.is_some()));
}

#[tokio::test]
async fn facade_round_trips_bug_lifecycle() {
    let stub = StubServer::spawn().await.unwrap();
    let api = BugApi::new(stub.api_base_url()).unwrap();

    assert_eq!(api.health_check().await.unwrap().status, "ok");

    let data = fixtures::unique_bug_with(BugPatch::priority(Priority::High));
    let bug = api.create_bug(&data).await.unwrap();
    assert!(bug.id > 0);
    assert_eq!(bug.data(), data);

    let updated = api
        .update_bug(bug.id, &BugPatch::status(Status::Resolved))
        .await
        .unwrap();
    assert_eq!(updated.status, Status::Resolved);
    assert_eq!(updated.title, data.title);

    let comment = api
        .create_comment(bug.id, &fixtures::unique_comment())
        .await
        .unwrap();
    assert_eq!(comment.bug_id, bug.id);
    assert_eq!(api.list_comments(bug.id).await.unwrap().len(), 1);

    api.delete_bug(bug.id).await.unwrap();
    let err = api.get_bug(bug.id).await.unwrap_err();
    assert!(matches!(err, E2eError::UnexpectedStatus { status: 404, .. }));
}

#[test_case("bugs/999999", 404 ; "missing bug")]
#[test_case("bugs/invalid", 400 ; "malformed id")]
#[test_case("bugs/0", 400 ; "zero id")]
#[test_case("bugs/999999/comments", 404 ; "comments of missing bug")]
#[tokio::test]
async fn raw_requests_expose_error_statuses(path: &str, status: u16) {
    let stub = StubServer::spawn().await.unwrap();
    let api = BugApi::new(stub.api_base_url()).unwrap();

    let response = api.raw().get(path).await.unwrap();
    assert_eq!(response.status, status);
    assert!(!response.is_success());
    assert!(response.error_message().is_some());
}

#[tokio::test]
async fn invalid_payloads_are_rejected_with_field_names() {
    let stub = StubServer::spawn().await.unwrap();
    let api = BugApi::new(stub.api_base_url()).unwrap();
    let invalid = fixtures::invalid_bugs();

    for (payload, field) in [
        (invalid.missing_title, "title"),
        (invalid.empty_title, "title"),
        (invalid.invalid_status, "status"),
        (invalid.invalid_priority, "priority"),
        (invalid.missing_status, "status"),
        (invalid.missing_priority, "priority"),
    ] {
        let response = api.raw().post("bugs", &payload).await.unwrap();
        assert_eq!(response.status, 400, "{}", payload);
        assert!(response.error_message().unwrap().contains(field));
    }
    assert!(api.list_bugs().await.unwrap().is_empty());
}
