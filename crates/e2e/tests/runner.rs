//! Runner behaviour: retries, timeouts, skips, exclusive scenarios, hooks

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bugtrack_e2e::config::Reporter;
use bugtrack_e2e::runner::RunnerConfig;
use bugtrack_e2e::scenario::{Scenario, Suite};
use bugtrack_e2e::{scenario, E2eError, E2eResult, TestRunner, TestStatus};

#[derive(Default)]
struct Shared {
    attempts: Mutex<HashMap<&'static str, u32>>,
    in_flight: AtomicUsize,
    overlapped: AtomicBool,
    setups: AtomicUsize,
    teardowns: AtomicUsize,
    captures: AtomicUsize,
}

struct FakeCtx {
    shared: Arc<Shared>,
}

impl FakeCtx {
    /// Count attempts of `id`, returning the number of this one.
    fn attempt(&self, id: &'static str) -> u32 {
        let mut attempts = self.shared.attempts.lock().unwrap();
        let n = attempts.entry(id).or_default();
        *n += 1;
        *n
    }

    fn enter(&self) -> InFlight {
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlight(self.shared.clone())
    }
}

/// Decrements the in-flight count even when the body is cancelled
struct InFlight(Arc<Shared>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn passes(ctx: &FakeCtx) -> E2eResult<()> {
    let _busy = ctx.enter();
    tokio::time::sleep(Duration::from_millis(20)).await;
    Ok(())
}

async fn fails_once(ctx: &FakeCtx) -> E2eResult<()> {
    let _busy = ctx.enter();
    if ctx.attempt("T-002") == 1 {
        return Err(E2eError::AssertionFailed("first try".into()));
    }
    Ok(())
}

async fn always_fails(ctx: &FakeCtx) -> E2eResult<()> {
    let _busy = ctx.enter();
    Err(E2eError::AssertionFailed("status should be 201, got 500".into()))
}

async fn skips(_: &FakeCtx) -> E2eResult<()> {
    Err(E2eError::Skipped("search not present".into()))
}

async fn hangs(ctx: &FakeCtx) -> E2eResult<()> {
    let _busy = ctx.enter();
    tokio::time::sleep(Duration::from_secs(30)).await;
    Ok(())
}

async fn wipes(ctx: &FakeCtx) -> E2eResult<()> {
    let _busy = ctx.enter();
    for _ in 0..5 {
        if ctx.shared.in_flight.load(Ordering::SeqCst) > 1 {
            ctx.shared.overlapped.store(true, Ordering::SeqCst);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

struct FakeSuite {
    shared: Arc<Shared>,
}

impl FakeSuite {
    fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
        }
    }
}

#[async_trait]
impl Suite for FakeSuite {
    type Context = FakeCtx;

    fn name(&self) -> &str {
        "Fake Suite"
    }

    fn scenarios(&self) -> Vec<Scenario<FakeCtx>> {
        vec![
            scenario!("T-001", "Basics", "Should pass", passes),
            scenario!("T-002", "Basics", "Should pass on retry", fails_once),
            scenario!("T-003", "Basics", "Should fail", always_fails),
            scenario!("T-004", "Optional", "Should skip", skips),
            scenario!("T-005", "Slow", "Should time out", hangs),
            scenario!("T-006", "Cleanup", "Should run alone", wipes).exclusive(),
            scenario!("T-007", "Basics", "Should pass too", passes),
            scenario!("T-008", "Basics", "Should pass as well", passes),
        ]
    }

    async fn setup(&self) -> E2eResult<FakeCtx> {
        self.shared.setups.fetch_add(1, Ordering::SeqCst);
        Ok(FakeCtx {
            shared: self.shared.clone(),
        })
    }

    async fn teardown(&self, _ctx: FakeCtx) -> E2eResult<()> {
        self.shared.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn capture_failure(&self, _ctx: &FakeCtx, _path: &Path) -> E2eResult<bool> {
        self.shared.captures.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

fn config(output: &Path) -> RunnerConfig {
    RunnerConfig {
        workers: 4,
        retries: 1,
        test_timeout: Duration::from_millis(300),
        output_dir: output.to_path_buf(),
        screenshot_on_failure: true,
        reporters: vec![Reporter::List],
        grep: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn outcomes_cover_pass_flaky_fail_skip_and_timeout() {
    let output = tempfile::tempdir().unwrap();
    let runner = TestRunner::with_config(config(output.path()));
    let suite = FakeSuite::new();

    let result = runner.run_suite(&suite).await;

    assert_eq!(result.project, "Fake Suite");
    assert_eq!(result.total, 8);
    assert_eq!(result.passed, 4);
    assert_eq!(result.flaky, 1);
    assert_eq!(result.failed, 2);
    assert_eq!(result.skipped, 1);
    assert!(!result.success());

    let ids: Vec<_> = result.results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["T-001", "T-002", "T-003", "T-004", "T-005", "T-006", "T-007", "T-008"]
    );

    let flaky = result.find("T-002").unwrap();
    assert_eq!(flaky.status, TestStatus::Flaky);
    assert_eq!(flaky.attempts, 2);
    assert!(flaky.error.is_none());

    let failed = result.find("T-003").unwrap();
    assert_eq!(failed.status, TestStatus::Failed);
    assert_eq!(failed.attempts, 2);
    assert!(failed.error.as_deref().unwrap().contains("got 500"));
    assert_eq!(
        failed.screenshot.as_deref().unwrap(),
        output
            .path()
            .join("screenshots")
            .join("Fake_Suite-T-003-attempt2.png")
    );

    let skipped = result.find("T-004").unwrap();
    assert_eq!(skipped.status, TestStatus::Skipped);
    assert_eq!(skipped.attempts, 1);
    assert_eq!(skipped.error.as_deref(), Some("search not present"));
    assert!(skipped.screenshot.is_none());

    let timed_out = result.find("T-005").unwrap();
    assert_eq!(timed_out.status, TestStatus::Failed);
    assert!(timed_out.error.as_deref().unwrap().contains("exceeded 300 ms"));

    assert_eq!(result.find("T-006").unwrap().status, TestStatus::Passed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn teardown_runs_after_every_attempt() {
    let output = tempfile::tempdir().unwrap();
    let runner = TestRunner::with_config(config(output.path()));
    let suite = FakeSuite::new();

    let result = runner.run_suite(&suite).await;

    let attempts: u32 = result.results.iter().map(|r| r.attempts).sum();
    assert_eq!(attempts, 11);
    assert_eq!(suite.shared.setups.load(Ordering::SeqCst), 11);
    assert_eq!(suite.shared.teardowns.load(Ordering::SeqCst), 11);
    // T-002 once, T-003 and T-005 on both attempts
    assert_eq!(suite.shared.captures.load(Ordering::SeqCst), 5);
    assert_eq!(suite.shared.in_flight.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exclusive_scenarios_never_overlap_others() {
    let output = tempfile::tempdir().unwrap();
    for _ in 0..3 {
        let runner = TestRunner::with_config(config(output.path()));
        let suite = FakeSuite::new();
        runner.run_suite(&suite).await;
        assert!(!suite.shared.overlapped.load(Ordering::SeqCst));
    }
}

#[tokio::test]
async fn no_retries_means_a_single_attempt() {
    let output = tempfile::tempdir().unwrap();
    let mut config = config(output.path());
    config.retries = 0;
    config.screenshot_on_failure = false;
    config.grep = Some(regex::Regex::new("T-00[23]").unwrap());
    let runner = TestRunner::with_config(config);
    let suite = FakeSuite::new();

    let result = runner.run_suite(&suite).await;

    assert_eq!(result.total, 2);
    assert_eq!(result.failed, 2);
    assert!(result.results.iter().all(|r| r.attempts == 1));
    assert!(result.results.iter().all(|r| r.screenshot.is_none()));
    assert_eq!(suite.shared.captures.load(Ordering::SeqCst), 0);
}

#[test]
fn skipped_suite_reports_every_selected_scenario() {
    let output = tempfile::tempdir().unwrap();
    let mut config = config(output.path());
    config.grep = Some(regex::Regex::new("(?i)basics").unwrap());
    let runner = TestRunner::with_config(config);
    let suite = FakeSuite::new();

    let result = runner.skip_suite(&suite, "UI not reachable at http://localhost:3000");

    assert_eq!(result.total, 5);
    assert_eq!(result.skipped, 5);
    assert!(result.success());
    assert!(result
        .results
        .iter()
        .all(|r| r.attempts == 0 && r.error.as_deref().unwrap().starts_with("UI not reachable")));
    assert_eq!(suite.shared.setups.load(Ordering::SeqCst), 0);
}
