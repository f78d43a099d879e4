//! Suite configuration
//!
//! Layering, lowest precedence first: built-in defaults, an optional YAML
//! file, environment variables (`API_BASE_URL`, `UI_BASE_URL`, `CI`), then
//! whatever the harness sets from its command line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::playwright::{Browser, Viewport};
use crate::server::WebServerConfig;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_UI_BASE_URL: &str = "http://localhost:3000";
pub const API_PROJECT: &str = "API Tests";

/// Report formats the runner can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reporter {
    /// One log line per test plus a summary
    List,
    /// `results.json` in the output directory
    Json,
    /// `results.xml` in the output directory
    Junit,
}

/// A run target: the HTTP API, or one browser/device profile for the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,

    /// Browser engine; `None` marks the API project
    #[serde(default)]
    pub browser: Option<Browser>,

    #[serde(default)]
    pub viewport: Option<Viewport>,

    #[serde(default)]
    pub is_mobile: bool,
}

impl Project {
    pub fn api() -> Self {
        Self {
            name: API_PROJECT.to_string(),
            browser: None,
            viewport: None,
            is_mobile: false,
        }
    }

    pub fn desktop(name: &str, browser: Browser) -> Self {
        Self {
            name: name.to_string(),
            browser: Some(browser),
            viewport: Some(Viewport::DESKTOP),
            is_mobile: false,
        }
    }

    pub fn mobile(name: &str, browser: Browser, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            browser: Some(browser),
            viewport: Some(Viewport { width, height }),
            is_mobile: true,
        }
    }

    pub fn is_api(&self) -> bool {
        self.browser.is_none()
    }
}

/// Default projects: the API plus three desktop engines and two phones.
pub fn default_projects() -> Vec<Project> {
    vec![
        Project::api(),
        Project::desktop("chromium", Browser::Chromium),
        Project::desktop("firefox", Browser::Firefox),
        Project::desktop("webkit", Browser::Webkit),
        // Pixel 5
        Project::mobile("Mobile Chrome", Browser::Chromium, 393, 851),
        // iPhone 12
        Project::mobile("Mobile Safari", Browser::Webkit, 390, 844),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct E2eConfig {
    pub api_base_url: String,
    pub ui_base_url: String,

    /// Running under CI; changes the retry and worker defaults
    pub ci: bool,

    pub test_timeout_ms: u64,
    pub action_timeout_ms: u64,
    pub navigation_timeout_ms: u64,

    /// Retries per failed test; defaults to 2 on CI and 0 locally
    pub retries: Option<u32>,

    /// Concurrent tests; defaults to 1 on CI and half the cores locally
    pub workers: Option<usize>,

    pub output_dir: PathBuf,
    pub reporters: Vec<Reporter>,
    pub screenshot_on_failure: bool,
    pub headless: bool,
    pub projects: Vec<Project>,

    /// Dev server to launch (or reuse) before the run
    pub web_server: Option<WebServerConfig>,
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ui_base_url: DEFAULT_UI_BASE_URL.to_string(),
            ci: false,
            test_timeout_ms: 30_000,
            action_timeout_ms: 10_000,
            navigation_timeout_ms: 30_000,
            retries: None,
            workers: None,
            output_dir: PathBuf::from("test-results"),
            reporters: vec![Reporter::List, Reporter::Json, Reporter::Junit],
            screenshot_on_failure: true,
            headless: true,
            projects: default_projects(),
            web_server: None,
        }
    }
}

impl E2eConfig {
    /// Defaults, overlaid by `path` when given, overlaid by the process environment.
    pub fn load(path: Option<&Path>) -> E2eResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            E2eError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Overlay environment variables read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("API_BASE_URL") {
            debug!("API_BASE_URL={}", url);
            self.api_base_url = url;
        }
        if let Some(url) = non_empty("UI_BASE_URL") {
            debug!("UI_BASE_URL={}", url);
            self.ui_base_url = url;
        }
        if let Some(ci) = non_empty("CI") {
            self.ci = !matches!(ci.trim().to_ascii_lowercase().as_str(), "0" | "false");
        }
    }

    pub fn effective_retries(&self) -> u32 {
        self.retries.unwrap_or(if self.ci { 2 } else { 0 })
    }

    pub fn effective_workers(&self) -> usize {
        if let Some(workers) = self.workers {
            return workers.max(1);
        }
        if self.ci {
            return 1;
        }
        std::thread::available_parallelism()
            .map(|n| (n.get() / 2).max(1))
            .unwrap_or(1)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_millis(self.test_timeout_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn api_project(&self) -> Option<&Project> {
        self.projects.iter().find(|p| p.is_api())
    }

    pub fn browser_projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.iter().filter(|p| !p.is_api())
    }

    /// Keep only the projects whose names appear in `names` (case-insensitive).
    pub fn retain_projects(&mut self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        self.projects
            .retain(|p| names.iter().any(|n| n.eq_ignore_ascii_case(&p.name)));
    }

    pub fn has_reporter(&self, reporter: Reporter) -> bool {
        self.reporters.contains(&reporter)
    }
}
