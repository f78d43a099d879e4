//! Test runner: executes a suite's scenarios with retries, timeouts and a
//! bounded number of concurrent workers

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{E2eConfig, Reporter};
use crate::error::{E2eError, E2eResult};
use crate::report;
use crate::scenario::{Scenario, Suite};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    /// Passed after at least one failed attempt
    Flaky,
}

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub id: String,
    pub title: String,
    pub group: String,
    pub status: TestStatus,
    pub attempts: u32,
    pub duration_ms: u64,
    /// Last failure, or the skip reason
    pub error: Option<String>,
    pub screenshot: Option<PathBuf>,
}

impl TestResult {
    fn skipped<C>(scenario: &Scenario<C>, reason: &str) -> Self {
        Self {
            id: scenario.id.to_string(),
            title: scenario.title.to_string(),
            group: scenario.group.to_string(),
            status: TestStatus::Skipped,
            attempts: 0,
            duration_ms: 0,
            error: Some(reason.to_string()),
            screenshot: None,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}: {}", self.id, self.title)
    }
}

/// Result of running one suite against one project
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub project: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub flaky: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    fn from_results(project: &str, results: Vec<TestResult>, duration: Duration) -> Self {
        let count = |status: TestStatus| results.iter().filter(|r| r.status == status).count();
        Self {
            project: project.to_string(),
            total: results.len(),
            passed: count(TestStatus::Passed),
            failed: count(TestStatus::Failed),
            skipped: count(TestStatus::Skipped),
            flaky: count(TestStatus::Flaky),
            duration_ms: duration.as_millis() as u64,
            results,
        }
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }

    pub fn find(&self, id: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.id == id)
    }
}

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub workers: usize,
    pub retries: u32,
    pub test_timeout: Duration,
    pub output_dir: PathBuf,
    pub screenshot_on_failure: bool,
    pub reporters: Vec<Reporter>,
    /// Only run scenarios matching this pattern
    pub grep: Option<Regex>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from_config(&E2eConfig::default())
    }
}

impl RunnerConfig {
    pub fn from_config(config: &E2eConfig) -> Self {
        Self {
            workers: config.effective_workers(),
            retries: config.effective_retries(),
            test_timeout: config.test_timeout(),
            output_dir: config.output_dir.clone(),
            screenshot_on_failure: config.screenshot_on_failure,
            reporters: config.reporters.clone(),
            grep: None,
        }
    }
}

/// Main E2E test runner
pub struct TestRunner {
    config: RunnerConfig,
    /// Exclusive scenarios hold the write half; everything else a read half.
    exclusive: Arc<RwLock<()>>,
}

impl TestRunner {
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            config,
            exclusive: Arc::new(RwLock::new(())),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    fn selected<C>(&self, scenarios: Vec<Scenario<C>>) -> Vec<Scenario<C>> {
        match &self.config.grep {
            Some(grep) => scenarios.into_iter().filter(|s| s.matches(grep)).collect(),
            None => scenarios,
        }
    }

    /// Run every selected scenario of `suite`
    pub async fn run_suite<S: Suite>(&self, suite: &S) -> TestSuiteResult {
        let start = Instant::now();
        let scenarios = self.selected(suite.scenarios());

        info!(
            "[{}] Running {} test(s) with {} worker(s)...",
            suite.name(),
            scenarios.len(),
            self.config.workers
        );

        let results: Vec<TestResult> = stream::iter(scenarios.iter())
            .map(|scenario| self.run_scenario(suite, scenario))
            .buffer_unordered(self.config.workers.max(1))
            .collect()
            .await;

        let mut results = results;
        results.sort_by(|a, b| a.id.cmp(&b.id));

        let suite_result = TestSuiteResult::from_results(suite.name(), results, start.elapsed());
        if self.config.reporters.contains(&Reporter::List) {
            report::log_summary(&suite_result);
        }
        suite_result
    }

    /// Report every selected scenario of `suite` as skipped without running it
    pub fn skip_suite<S: Suite>(&self, suite: &S, reason: &str) -> TestSuiteResult {
        warn!("[{}] Skipping suite: {}", suite.name(), reason);
        let results = self
            .selected(suite.scenarios())
            .iter()
            .map(|s| TestResult::skipped(s, reason))
            .collect();
        TestSuiteResult::from_results(suite.name(), results, Duration::ZERO)
    }

    async fn run_scenario<S: Suite>(&self, suite: &S, scenario: &Scenario<S::Context>) -> TestResult {
        let start = Instant::now();
        let mut attempts = 0;
        let mut screenshot = None;

        let (status, error) = loop {
            attempts += 1;
            debug!("Running {} (attempt {})", scenario.id, attempts);

            let (outcome, shot) = if scenario.exclusive {
                let _wipe = self.exclusive.write().await;
                self.attempt(suite, scenario, attempts).await
            } else {
                let _shared = self.exclusive.read().await;
                self.attempt(suite, scenario, attempts).await
            };
            if shot.is_some() {
                screenshot = shot;
            }

            match outcome {
                Ok(()) if attempts > 1 => break (TestStatus::Flaky, None),
                Ok(()) => break (TestStatus::Passed, None),
                Err(E2eError::Skipped(reason)) => break (TestStatus::Skipped, Some(reason)),
                Err(e) if attempts > self.config.retries => {
                    break (TestStatus::Failed, Some(e.to_string()))
                }
                Err(e) => warn!("{} failed, retrying: {}", scenario.id, e),
            }
        };

        let result = TestResult {
            id: scenario.id.to_string(),
            title: scenario.title.to_string(),
            group: scenario.group.to_string(),
            status,
            attempts,
            duration_ms: start.elapsed().as_millis() as u64,
            error,
            screenshot,
        };
        if self.config.reporters.contains(&Reporter::List) {
            report::log_result(&result);
        }
        result
    }

    /// Setup, body and teardown of one attempt. The test timeout bounds
    /// setup plus body; teardown always runs.
    async fn attempt<S: Suite>(
        &self,
        suite: &S,
        scenario: &Scenario<S::Context>,
        attempt: u32,
    ) -> (E2eResult<()>, Option<PathBuf>) {
        let deadline = tokio::time::Instant::now() + self.config.test_timeout;
        let timed_out = || {
            E2eError::Timeout(format!(
                "{} exceeded {} ms",
                scenario.id,
                self.config.test_timeout.as_millis()
            ))
        };

        let ctx = match tokio::time::timeout_at(deadline, suite.setup()).await {
            Ok(Ok(ctx)) => ctx,
            Ok(Err(e)) => return (Err(e), None),
            Err(_) => return (Err(timed_out()), None),
        };

        let outcome = match tokio::time::timeout_at(deadline, (scenario.run)(&ctx)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(timed_out()),
        };

        let mut screenshot = None;
        if self.config.screenshot_on_failure {
            if let Err(e) = &outcome {
                if !matches!(e, E2eError::Skipped(_)) {
                    let path = screenshot_path(&self.config.output_dir, suite.name(), scenario.id, attempt);
                    match suite.capture_failure(&ctx, &path).await {
                        Ok(true) => screenshot = Some(path),
                        Ok(false) => {}
                        Err(e) => warn!("Could not capture failure of {}: {}", scenario.id, e),
                    }
                }
            }
        }

        match tokio::time::timeout(self.config.test_timeout, suite.teardown(ctx)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Teardown of {} failed: {}", scenario.id, e),
            Err(_) => warn!("Teardown of {} timed out", scenario.id),
        }

        (outcome, screenshot)
    }

    /// Write the configured file reports
    pub fn write_results(&self, results: &[TestSuiteResult]) -> E2eResult<Vec<PathBuf>> {
        let mut written = Vec::new();
        if self.config.reporters.contains(&Reporter::Json) {
            written.push(report::write_json(&self.config.output_dir, results)?);
        }
        if self.config.reporters.contains(&Reporter::Junit) {
            written.push(report::write_junit(&self.config.output_dir, results)?);
        }
        for path in &written {
            info!("Results written to: {}", path.display());
        }
        Ok(written)
    }
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn screenshot_path(output_dir: &Path, project: &str, id: &str, attempt: u32) -> PathBuf {
    let slug: String = format!("{}-{}", project, id)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    output_dir
        .join("screenshots")
        .join(format!("{}-attempt{}.png", slug, attempt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screenshot_names_are_filesystem_safe() {
        let path = screenshot_path(Path::new("out"), "Mobile Safari", "TC-UI-010", 2);
        assert_eq!(
            path,
            Path::new("out/screenshots/Mobile_Safari-TC-UI-010-attempt2.png")
        );
    }

    #[test]
    fn suite_counts_every_status() {
        let result = |id: &str, status| TestResult {
            id: id.into(),
            title: "t".into(),
            group: "g".into(),
            status,
            attempts: 1,
            duration_ms: 1,
            error: None,
            screenshot: None,
        };
        let suite = TestSuiteResult::from_results(
            "API Tests",
            vec![
                result("a", TestStatus::Passed),
                result("b", TestStatus::Failed),
                result("c", TestStatus::Skipped),
                result("d", TestStatus::Flaky),
            ],
            Duration::from_millis(5),
        );

        assert_eq!((suite.total, suite.passed, suite.failed, suite.skipped, suite.flaky), (4, 1, 1, 1, 1));
        assert!(!suite.success());
        assert_eq!(suite.find("c").unwrap().status, TestStatus::Skipped);
    }
}
