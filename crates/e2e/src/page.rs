//! Browser-facing seam: locators and the driver trait page objects talk to

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::E2eResult;
use crate::playwright::Viewport;

/// One hop of a locator chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorStep {
    pub selector: String,
    /// Narrow to the first match
    pub first: bool,
}

/// A lazily resolved element query, relative to the page.
///
/// Selectors use Playwright syntax, including comma-separated alternatives
/// and `:has-text(...)`, so one handle tolerates several UI implementations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub steps: Vec<LocatorStep>,
}

impl Locator {
    /// First element matching any of `alternatives`.
    pub fn any(alternatives: &[&str]) -> Self {
        Self {
            steps: vec![LocatorStep {
                selector: alternatives.join(", "),
                first: true,
            }],
        }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            steps: vec![LocatorStep {
                selector: selector.into(),
                first: true,
            }],
        }
    }

    /// Every element matching any of `alternatives`, for counting and listing.
    pub fn all(alternatives: &[&str]) -> Self {
        Self {
            steps: vec![LocatorStep {
                selector: alternatives.join(", "),
                first: false,
            }],
        }
    }

    /// First descendant of this element matching any of `alternatives`.
    pub fn within(&self, alternatives: &[&str]) -> Self {
        let mut steps = self.steps.clone();
        steps.push(LocatorStep {
            selector: alternatives.join(", "),
            first: true,
        });
        Self { steps }
    }

    /// Human-readable form for logs and errors.
    pub fn describe(&self) -> String {
        self.steps
            .iter()
            .map(|s| s.selector.as_str())
            .collect::<Vec<_>>()
            .join(" >> ")
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Quote `text` for use inside `:has-text("...")`.
pub fn quote_text(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[default]
    #[serde(rename = "networkidle")]
    NetworkIdle,
}

/// Operations a page object needs from a live browser page.
///
/// Waits fail with [`crate::E2eError::Timeout`] when the bound passes; callers
/// that treat absence as an answer map that variant to `false`.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to `path`, relative to the UI base URL.
    async fn goto(&self, path: &str) -> E2eResult<()>;
    async fn wait_for_load_state(&self, state: LoadState) -> E2eResult<()>;
    async fn wait_for(&self, locator: &Locator, state: WaitState, timeout: Duration) -> E2eResult<()>;
    async fn click(&self, locator: &Locator) -> E2eResult<()>;
    async fn fill(&self, locator: &Locator, value: &str) -> E2eResult<()>;
    async fn select_option(&self, locator: &Locator, value: &str) -> E2eResult<()>;
    async fn is_visible(&self, locator: &Locator) -> E2eResult<bool>;
    async fn count(&self, locator: &Locator) -> E2eResult<usize>;
    async fn all_text_contents(&self, locator: &Locator) -> E2eResult<Vec<String>>;
    async fn text_content(&self, locator: &Locator) -> E2eResult<Option<String>>;
    async fn input_value(&self, locator: &Locator) -> E2eResult<String>;
    /// Document title.
    async fn title(&self) -> E2eResult<String>;
    /// Current URL.
    async fn url(&self) -> E2eResult<String>;
    async fn set_viewport(&self, viewport: Viewport) -> E2eResult<()>;
    async fn wait_timeout(&self, duration: Duration) -> E2eResult<()>;
    async fn screenshot(&self, path: &Path) -> E2eResult<()>;
    async fn close(&self) -> E2eResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alternatives_are_joined_and_chained() {
        let modal = Locator::any(&["[role=\"dialog\"]", ".modal"]);
        let input = modal.within(&["input[name=\"title\"]"]);

        assert_eq!(input.steps.len(), 2);
        assert_eq!(input.steps[0].selector, "[role=\"dialog\"], .modal");
        assert!(input.steps.iter().all(|s| s.first));
        assert_eq!(
            input.describe(),
            "[role=\"dialog\"], .modal >> input[name=\"title\"]"
        );
        assert!(!Locator::all(&[".bug-item"]).steps[0].first);
    }

    #[test]
    fn quoted_text_escapes_quotes_and_backslashes() {
        assert_eq!(quote_text("plain"), "\"plain\"");
        assert_eq!(
            quote_text(r#"say "hi" \o/"#),
            r#""say \"hi\" \\o/""#
        );
    }

    #[test]
    fn states_serialize_like_playwright() {
        assert_eq!(serde_json::to_string(&WaitState::Hidden).unwrap(), "\"hidden\"");
        assert_eq!(
            serde_json::to_string(&LoadState::NetworkIdle).unwrap(),
            "\"networkidle\""
        );
        assert_eq!(
            serde_json::to_string(&LoadState::DomContentLoaded).unwrap(),
            "\"domcontentloaded\""
        );
    }
}
