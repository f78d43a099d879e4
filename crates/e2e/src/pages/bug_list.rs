//! The bug list page: list, add/edit modal, delete confirmation, comments

use std::sync::Arc;
use std::time::Duration;

use bugtrack_common::{BugData, BugPatch};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::page::{quote_text, LoadState, Locator, PageDriver, WaitState};

/// How long `is_bug_visible` and `is_page_loaded` wait before answering `false`.
const VISIBILITY_WAIT: Duration = Duration::from_secs(5);

/// The modal closes once the backend accepted the form.
const SUBMIT_WAIT: Duration = Duration::from_secs(10);

/// Pause after filter and search input so the list can re-render.
const SETTLE: Duration = Duration::from_millis(500);

const BUG_ITEMS: &[&str] = &["[data-testid=\"bug-item\"]", ".bug-item"];

/// Answer of the delete confirmation dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteChoice {
    Confirm,
    Cancel,
}

pub struct BugListPage {
    driver: Arc<dyn PageDriver>,
    action_timeout: Duration,
    /// Titles this page object submitted, for teardown
    created: Mutex<Vec<String>>,

    pub add_bug_button: Locator,
    pub bug_list: Locator,
    pub search_input: Locator,
    pub status_filter: Locator,
    pub priority_filter: Locator,
    pub page_title: Locator,

    pub modal: Locator,
    pub modal_title: Locator,
    pub title_input: Locator,
    pub description_input: Locator,
    pub status_select: Locator,
    pub priority_select: Locator,
    pub submit_button: Locator,
    pub cancel_button: Locator,
    pub close_modal_button: Locator,

    pub confirmation_modal: Locator,
    pub confirm_delete_button: Locator,
    pub cancel_delete_button: Locator,

    pub comment_section: Locator,
    pub comment_input: Locator,
    pub comment_author_input: Locator,
    pub comment_submit_button: Locator,
    pub comment_items: Locator,

    pub validation_message: Locator,
}

impl BugListPage {
    pub fn new(driver: Arc<dyn PageDriver>, action_timeout: Duration) -> Self {
        let modal = Locator::any(&["[role=\"dialog\"]", ".modal", "[data-testid=\"bug-modal\"]"]);
        let confirmation_modal =
            Locator::any(&["[role=\"alertdialog\"]", "[data-testid=\"confirmation-modal\"]"]);

        Self {
            driver,
            action_timeout,
            created: Mutex::new(Vec::new()),

            add_bug_button: Locator::any(&[
                "button:has-text(\"Add Bug\")",
                "button:has-text(\"Create Bug\")",
                "button:has-text(\"New Bug\")",
            ]),
            bug_list: Locator::any(&["[data-testid=\"bug-list\"]", ".bug-list", "[class*=\"bug-list\"]"]),
            search_input: Locator::any(&["input[placeholder*=\"Search\"]", "input[type=\"search\"]"]),
            status_filter: Locator::any(&["select[name=\"status\"]", "select:has-text(\"Status\")"]),
            priority_filter: Locator::any(&["select[name=\"priority\"]", "select:has-text(\"Priority\")"]),
            page_title: Locator::any(&["h1", "h2"]),

            modal_title: modal.within(&["h2", "h3", ".modal-title"]),
            title_input: modal.within(&["input[name=\"title\"]", "input[placeholder*=\"Title\"]"]),
            description_input: modal.within(&[
                "textarea[name=\"description\"]",
                "textarea[placeholder*=\"Description\"]",
                "input[name=\"description\"]",
            ]),
            status_select: modal.within(&["select[name=\"status\"]"]),
            priority_select: modal.within(&["select[name=\"priority\"]"]),
            submit_button: modal.within(&[
                "button[type=\"submit\"]",
                "button:has-text(\"Save\")",
                "button:has-text(\"Create\")",
                "button:has-text(\"Update\")",
            ]),
            cancel_button: modal.within(&["button:has-text(\"Cancel\")"]),
            close_modal_button: modal.within(&["button[aria-label=\"Close\"]", ".close-button"]),
            modal,

            confirm_delete_button: confirmation_modal.within(&[
                "button:has-text(\"Delete\")",
                "button:has-text(\"Confirm\")",
                "button:has-text(\"Yes\")",
            ]),
            cancel_delete_button: confirmation_modal
                .within(&["button:has-text(\"Cancel\")", "button:has-text(\"No\")"]),
            confirmation_modal,

            comment_section: Locator::any(&["[data-testid=\"comment-section\"]", ".comments"]),
            comment_input: Locator::any(&[
                "textarea[placeholder*=\"Comment\"]",
                "input[placeholder*=\"Comment\"]",
            ]),
            comment_author_input: Locator::any(&["input[placeholder*=\"Author\"]", "input[name=\"author\"]"]),
            comment_submit_button: Locator::any(&[
                "button:has-text(\"Add Comment\")",
                "button:has-text(\"Submit\")",
            ]),
            comment_items: Locator::all(&["[data-testid=\"comment\"]", ".comment"]),

            validation_message: Locator::css("text=/required|empty|fill/i"),
        }
    }

    pub fn driver(&self) -> &Arc<dyn PageDriver> {
        &self.driver
    }

    /// List entry whose text contains `title`.
    pub fn bug_by_title(&self, title: &str) -> Locator {
        let text = quote_text(title);
        let alternatives = [
            format!("[data-testid=\"bug-item\"]:has-text({})", text),
            format!(".bug-item:has-text({})", text),
            format!("li:has-text({})", text),
        ];
        let alternatives: Vec<&str> = alternatives.iter().map(String::as_str).collect();
        Locator::any(&alternatives)
    }

    pub fn edit_button(&self, title: &str) -> Locator {
        self.bug_by_title(title)
            .within(&["button:has-text(\"Edit\")", "[aria-label=\"Edit\"]"])
    }

    pub fn delete_button(&self, title: &str) -> Locator {
        self.bug_by_title(title)
            .within(&["button:has-text(\"Delete\")", "[aria-label=\"Delete\"]"])
    }

    /// Titles submitted through this page, oldest first.
    pub async fn created_titles(&self) -> Vec<String> {
        self.created.lock().await.clone()
    }

    async fn remember(&self, title: &str) {
        self.created.lock().await.push(title.to_string());
    }

    async fn wait_visible(&self, locator: &Locator) -> E2eResult<()> {
        self.driver
            .wait_for(locator, WaitState::Visible, self.action_timeout)
            .await
    }

    async fn wait_hidden(&self, locator: &Locator, timeout: Duration) -> E2eResult<()> {
        self.driver.wait_for(locator, WaitState::Hidden, timeout).await
    }

    /// `true` once `locator` is visible within `timeout`; only a timeout answers `false`.
    async fn appears_within(&self, locator: &Locator, timeout: Duration) -> E2eResult<bool> {
        match self.driver.wait_for(locator, WaitState::Visible, timeout).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_timeout() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Immediate visibility check; a timeout counts as absent.
    async fn shown_now(&self, locator: &Locator) -> E2eResult<bool> {
        match self.driver.is_visible(locator).await {
            Ok(visible) => Ok(visible),
            Err(e) if e.is_timeout() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn goto(&self) -> E2eResult<()> {
        self.driver.goto("/").await?;
        self.driver.wait_for_load_state(LoadState::NetworkIdle).await
    }

    pub async fn wait_for_page_load(&self) -> E2eResult<()> {
        self.driver
            .wait_for_load_state(LoadState::DomContentLoaded)
            .await?;
        self.driver
            .wait_for(&Locator::css("body"), WaitState::Attached, self.action_timeout)
            .await
    }

    pub async fn is_page_loaded(&self) -> E2eResult<bool> {
        self.appears_within(&self.page_title, VISIBILITY_WAIT).await
    }

    pub async fn open_add_bug_modal(&self) -> E2eResult<()> {
        self.driver.click(&self.add_bug_button).await?;
        self.wait_visible(&self.modal).await
    }

    pub async fn fill_bug_form(&self, bug: &BugData) -> E2eResult<()> {
        self.driver.fill(&self.title_input, &bug.title).await?;
        self.driver
            .fill(&self.description_input, &bug.description)
            .await?;
        self.driver
            .select_option(&self.status_select, bug.status.as_str())
            .await?;
        self.driver
            .select_option(&self.priority_select, bug.priority.as_str())
            .await
    }

    /// Submit the modal form and wait for it to close.
    pub async fn submit_bug_form(&self) -> E2eResult<()> {
        self.driver.click(&self.submit_button).await?;
        self.wait_hidden(&self.modal, SUBMIT_WAIT).await
    }

    /// Create a bug through the modal and wait until it shows up in the list.
    pub async fn create_bug(&self, bug: &BugData) -> E2eResult<()> {
        debug!("UI create bug {:?}", bug.title);
        self.open_add_bug_modal().await?;
        self.fill_bug_form(bug).await?;
        self.remember(&bug.title).await;
        self.submit_bug_form().await?;
        self.wait_visible(&self.bug_by_title(&bug.title)).await
    }

    /// Open the edit modal of `current_title` and change the fields set in `patch`.
    pub async fn edit_bug(&self, current_title: &str, patch: &BugPatch) -> E2eResult<()> {
        debug!("UI edit bug {:?}", current_title);
        self.driver.click(&self.edit_button(current_title)).await?;
        self.wait_visible(&self.modal).await?;

        if let Some(title) = &patch.title {
            self.driver.fill(&self.title_input, title).await?;
            self.remember(title).await;
        }
        if let Some(description) = &patch.description {
            self.driver.fill(&self.description_input, description).await?;
        }
        if let Some(status) = patch.status {
            self.driver
                .select_option(&self.status_select, status.as_str())
                .await?;
        }
        if let Some(priority) = patch.priority {
            self.driver
                .select_option(&self.priority_select, priority.as_str())
                .await?;
        }

        self.submit_bug_form().await
    }

    pub async fn delete_bug(&self, title: &str, choice: DeleteChoice) -> E2eResult<()> {
        debug!("UI delete bug {:?} ({:?})", title, choice);
        self.driver.click(&self.delete_button(title)).await?;
        self.wait_visible(&self.confirmation_modal).await?;

        let button = match choice {
            DeleteChoice::Confirm => &self.confirm_delete_button,
            DeleteChoice::Cancel => &self.cancel_delete_button,
        };
        self.driver.click(button).await?;
        self.wait_hidden(&self.confirmation_modal, self.action_timeout)
            .await
    }

    /// Text of every list entry.
    pub async fn all_bug_titles(&self) -> E2eResult<Vec<String>> {
        let items = Locator::all(&["[data-testid=\"bug-item\"]", ".bug-item", "li"]);
        self.driver.all_text_contents(&items).await
    }

    pub async fn is_bug_visible(&self, title: &str) -> E2eResult<bool> {
        self.appears_within(&self.bug_by_title(title), VISIBILITY_WAIT)
            .await
    }

    pub async fn filter_by_status(&self, status: &str) -> E2eResult<()> {
        self.driver.select_option(&self.status_filter, status).await?;
        self.driver.wait_timeout(SETTLE).await
    }

    pub async fn filter_by_priority(&self, priority: &str) -> E2eResult<()> {
        self.driver
            .select_option(&self.priority_filter, priority)
            .await?;
        self.driver.wait_timeout(SETTLE).await
    }

    pub async fn search_bugs(&self, term: &str) -> E2eResult<()> {
        self.driver.fill(&self.search_input, term).await?;
        self.driver.wait_timeout(SETTLE).await
    }

    pub async fn bug_count(&self) -> E2eResult<usize> {
        self.driver.count(&Locator::all(BUG_ITEMS)).await
    }

    /// Assert the list entry for `title` shows the status and priority in `expected`.
    pub async fn verify_bug_details(&self, title: &str, expected: &BugPatch) -> E2eResult<()> {
        let item = self.bug_by_title(title);
        if !self.appears_within(&item, self.action_timeout).await? {
            return Err(E2eError::AssertionFailed(format!(
                "bug {:?} is not listed",
                title
            )));
        }

        let text = self.driver.text_content(&item).await?.unwrap_or_default();
        let wanted = expected
            .status
            .map(|s| s.as_str())
            .into_iter()
            .chain(expected.priority.map(|p| p.as_str()));
        for value in wanted {
            if !text.contains(value) {
                return Err(E2eError::AssertionFailed(format!(
                    "bug {:?} should show {:?}, found {:?}",
                    title, value, text
                )));
            }
        }
        Ok(())
    }

    pub async fn open_bug_details(&self, title: &str) -> E2eResult<()> {
        self.driver.click(&self.bug_by_title(title)).await
    }

    pub async fn add_comment(&self, text: &str, author: &str) -> E2eResult<()> {
        self.driver.fill(&self.comment_input, text).await?;
        self.driver.fill(&self.comment_author_input, author).await?;
        self.driver.click(&self.comment_submit_button).await?;
        self.driver.wait_timeout(SETTLE).await
    }

    pub async fn comment_count(&self) -> E2eResult<usize> {
        self.driver.count(&self.comment_items).await
    }

    /// Dismiss the modal with Cancel, or the close button when there is none.
    pub async fn close_modal(&self) -> E2eResult<()> {
        if self.shown_now(&self.cancel_button).await? {
            self.driver.click(&self.cancel_button).await?;
        } else if self.shown_now(&self.close_modal_button).await? {
            self.driver.click(&self.close_modal_button).await?;
        }
        self.wait_hidden(&self.modal, self.action_timeout).await
    }

    pub async fn has_status_filter(&self) -> E2eResult<bool> {
        self.shown_now(&self.status_filter).await
    }

    pub async fn has_priority_filter(&self) -> E2eResult<bool> {
        self.shown_now(&self.priority_filter).await
    }

    pub async fn has_search(&self) -> E2eResult<bool> {
        self.shown_now(&self.search_input).await
    }

    pub async fn has_comment_section(&self) -> E2eResult<bool> {
        self.shown_now(&self.comment_section).await
    }

    pub async fn has_validation_message(&self) -> E2eResult<bool> {
        self.shown_now(&self.validation_message).await
    }

    pub async fn is_modal_visible(&self) -> E2eResult<bool> {
        self.shown_now(&self.modal).await
    }
}
