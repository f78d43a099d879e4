//! Result reporters: list lines through `tracing`, `results.json` and a
//! JUnit `results.xml` for CI dashboards

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::E2eResult;
use crate::runner::{TestResult, TestStatus, TestSuiteResult};

pub const JSON_REPORT: &str = "results.json";
pub const JUNIT_REPORT: &str = "results.xml";

pub fn log_result(result: &TestResult) {
    match result.status {
        TestStatus::Passed => info!("✓ {} ({} ms)", result.full_name(), result.duration_ms),
        TestStatus::Flaky => warn!(
            "✓ {} ({} ms, flaky after {} attempts)",
            result.full_name(),
            result.duration_ms,
            result.attempts
        ),
        TestStatus::Skipped => info!(
            "- {} ({})",
            result.full_name(),
            result.error.as_deref().unwrap_or("skipped")
        ),
        TestStatus::Failed => error!(
            "✗ {} - {}",
            result.full_name(),
            result.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

pub fn log_summary(suite: &TestSuiteResult) {
    info!("");
    info!(
        "[{}] Test Results: {} passed, {} failed, {} skipped, {} flaky ({} ms)",
        suite.project, suite.passed, suite.failed, suite.skipped, suite.flaky, suite.duration_ms
    );
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    passed: usize,
    failed: usize,
    skipped: usize,
    flaky: usize,
    suites: &'a [TestSuiteResult],
}

pub fn write_json(output_dir: &Path, suites: &[TestSuiteResult]) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let report = JsonReport {
        generated_at: Utc::now().to_rfc3339(),
        passed: suites.iter().map(|s| s.passed).sum(),
        failed: suites.iter().map(|s| s.failed).sum(),
        skipped: suites.iter().map(|s| s.skipped).sum(),
        flaky: suites.iter().map(|s| s.flaky).sum(),
        suites,
    };

    let path = output_dir.join(JSON_REPORT);
    std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
    Ok(path)
}

pub fn write_junit(output_dir: &Path, suites: &[TestSuiteResult]) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(JUNIT_REPORT);
    std::fs::write(&path, render_junit(suites))?;
    Ok(path)
}

fn seconds(ms: u64) -> String {
    format!("{:.3}", ms as f64 / 1000.0)
}

pub fn render_junit(suites: &[TestSuiteResult]) -> String {
    let tests: usize = suites.iter().map(|s| s.total).sum();
    let failures: usize = suites.iter().map(|s| s.failed).sum();
    let skipped: usize = suites.iter().map(|s| s.skipped).sum();
    let time: u64 = suites.iter().map(|s| s.duration_ms).sum();

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        xml,
        "<testsuites tests=\"{}\" failures=\"{}\" skipped=\"{}\" errors=\"0\" time=\"{}\">",
        tests,
        failures,
        skipped,
        seconds(time)
    );

    for suite in suites {
        let _ = writeln!(
            xml,
            "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" skipped=\"{}\" errors=\"0\" time=\"{}\">",
            escape(&suite.project),
            suite.total,
            suite.failed,
            suite.skipped,
            seconds(suite.duration_ms)
        );

        for result in &suite.results {
            let _ = write!(
                xml,
                "    <testcase name=\"{}\" classname=\"{}\" time=\"{}\"",
                escape(&result.full_name()),
                escape(&format!("{}.{}", suite.project, result.group)),
                seconds(result.duration_ms)
            );

            let message = escape(result.error.as_deref().unwrap_or_default());
            match result.status {
                TestStatus::Passed => xml.push_str("/>\n"),
                TestStatus::Flaky => {
                    let _ = writeln!(
                        xml,
                        ">\n      <system-out>passed after {} attempts</system-out>\n    </testcase>",
                        result.attempts
                    );
                }
                TestStatus::Skipped => {
                    let _ = writeln!(
                        xml,
                        ">\n      <skipped message=\"{}\"/>\n    </testcase>",
                        message
                    );
                }
                TestStatus::Failed => {
                    let _ = write!(
                        xml,
                        ">\n      <failure message=\"{}\">{}</failure>\n",
                        message, message
                    );
                    if let Some(shot) = &result.screenshot {
                        let _ = writeln!(
                            xml,
                            "      <system-out>[[ATTACHMENT|{}]]</system-out>",
                            escape(&shot.to_string_lossy())
                        );
                    }
                    xml.push_str("    </testcase>\n");
                }
            }
        }

        xml.push_str("  </testsuite>\n");
    }

    xml.push_str("</testsuites>\n");
    xml
}

/// Escape text for XML attributes and character data.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if (c as u32) < 0x20 && !matches!(c, '\n' | '\r' | '\t') => {}
            c => out.push(c),
        }
    }
    out
}
