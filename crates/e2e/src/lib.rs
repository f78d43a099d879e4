//! Bugtrack E2E Test Framework
//!
//! This crate drives end-to-end tests against the bug tracker:
//! - Generates unique, valid and deliberately invalid test data
//! - Talks to the HTTP API through a typed facade
//! - Controls a browser through Playwright behind a page object
//! - Runs registered scenarios with retries, timeouts and parallel workers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── run_suite(suite) -> TestSuiteResult                  │
//! │    │     └── per scenario: setup → run → teardown (retry)   │
//! │    └── write_results() -> results.json, results.xml         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Suites                                                     │
//! │    ├── ApiSuite  ── BugApi (reqwest) ──────► /api/bugs ...  │
//! │    └── UiSuite   ── BugListPage                             │
//! │                       └── PageDriver                        │
//! │                             └── PlaywrightSession (node)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  fixtures: unique_bug(), invalid_bugs(), edge_cases() ...   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod page;
pub mod pages;
pub mod playwright;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod server;
pub mod suites;

pub use api::{BugApi, RawResponse};
pub use config::{E2eConfig, Project, Reporter};
pub use error::{E2eError, E2eResult};
pub use page::{Locator, PageDriver};
pub use pages::{BugListPage, DeleteChoice};
pub use playwright::{Browser, PlaywrightSession, Viewport};
pub use runner::{RunnerConfig, TestResult, TestRunner, TestStatus, TestSuiteResult};
pub use scenario::{Scenario, Suite};
