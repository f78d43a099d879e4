//! Browser scenarios against the bug list page, one suite per project

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bugtrack_common::{BugPatch, Priority, Status};
use tracing::{debug, warn};

use crate::api::BugApi;
use crate::config::{E2eConfig, Project};
use crate::error::{E2eError, E2eResult};
use crate::fixtures;
use crate::page::{Locator, PageDriver, WaitState};
use crate::pages::{BugListPage, DeleteChoice};
use crate::playwright::{PlaywrightConfig, PlaywrightSession, Viewport};
use crate::scenario::{Scenario, Suite};
use crate::{check, check_eq, scenario};

const SHOWN_WAIT: Duration = Duration::from_secs(5);

/// Per-attempt state: a fresh browser page already showing the bug list
pub struct UiContext {
    pub page: BugListPage,
    pub base_url: String,
}

impl UiContext {
    pub fn new(page: BugListPage, base_url: impl Into<String>) -> Self {
        Self {
            page,
            base_url: base_url.into(),
        }
    }

    fn driver(&self) -> &Arc<dyn PageDriver> {
        self.page.driver()
    }

    /// Create a uniquely titled bug through the UI and return its title.
    async fn create_titled(&self, prefix: &str, patch: BugPatch) -> E2eResult<String> {
        let title = format!("{} {}", prefix, fixtures::unique_suffix());
        let bug = fixtures::unique_bug_with(BugPatch {
            title: Some(title.clone()),
            ..patch
        });
        self.page.create_bug(&bug).await?;
        Ok(title)
    }
}

/// The UI scenarios for one browser project
pub struct UiSuite {
    project: Project,
    playwright: PlaywrightConfig,
    /// Used to delete what the UI created; cleanup is skipped without it
    api: Option<BugApi>,
}

impl UiSuite {
    pub fn new(config: &E2eConfig, project: Project, api: Option<BugApi>) -> Self {
        Self {
            playwright: PlaywrightConfig::for_project(config, &project),
            project,
            api,
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    async fn delete_created(&self, api: &BugApi, titles: &[String]) -> E2eResult<()> {
        let bugs = api.list_bugs().await?;
        for bug in bugs.iter().filter(|b| titles.contains(&b.title)) {
            match api.delete_bug(bug.id).await {
                Ok(()) => debug!("cleaned up UI bug {:?}", bug.title),
                Err(E2eError::UnexpectedStatus { status: 404, .. }) => {}
                Err(e) => warn!("Cleanup of bug {} failed: {}", bug.id, e),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Suite for UiSuite {
    type Context = UiContext;

    fn name(&self) -> &str {
        &self.project.name
    }

    fn scenarios(&self) -> Vec<Scenario<UiContext>> {
        scenarios()
    }

    async fn setup(&self) -> E2eResult<UiContext> {
        let session: Arc<dyn PageDriver> =
            Arc::new(PlaywrightSession::launch(self.playwright.clone()).await?);
        let page = BugListPage::new(session.clone(), self.playwright.action_timeout);

        if let Err(e) = page.goto().await {
            let _ = session.close().await;
            return Err(e);
        }
        Ok(UiContext::new(page, self.playwright.base_url.clone()))
    }

    async fn teardown(&self, ctx: UiContext) -> E2eResult<()> {
        let closed = ctx.driver().close().await;

        let titles = ctx.page.created_titles().await;
        if let (Some(api), false) = (&self.api, titles.is_empty()) {
            if let Err(e) = self.delete_created(api, &titles).await {
                warn!("Cleanup of UI bugs failed: {}", e);
            }
        }
        closed
    }

    async fn capture_failure(&self, ctx: &UiContext, path: &Path) -> E2eResult<bool> {
        ctx.driver().screenshot(path).await?;
        Ok(true)
    }
}

pub fn scenarios() -> Vec<Scenario<UiContext>> {
    vec![
        scenario!("TC-UI-001", "Page Load and Initial Render", "Should load the bug list page successfully", page_loads),
        scenario!("TC-UI-002", "Page Load and Initial Render", "Should display Add Bug button", add_button_visible),
        scenario!("TC-UI-003", "Page Load and Initial Render", "Should have proper page title", document_title),
        scenario!("TC-UI-004", "Page Load and Initial Render", "Page should be accessible", has_h1),
        scenario!("TC-UI-005", "Add Bug Functionality", "Should open Add Bug modal when clicking Add Bug button", open_modal),
        scenario!("TC-UI-006", "Add Bug Functionality", "Should create a new bug with valid data", create_bug),
        scenario!("TC-UI-007", "Add Bug Functionality", "Should create bug with Medium priority", create_medium),
        scenario!("TC-UI-008", "Add Bug Functionality", "Should create bug with Low priority", create_low),
        scenario!("TC-UI-009", "Add Bug Functionality", "Should create bug with In Progress status", create_in_progress),
        scenario!("TC-UI-010", "Add Bug Functionality", "Should close modal when clicking Cancel", cancel_closes_modal),
        scenario!("TC-UI-011", "Add Bug Functionality", "Form should have all required fields", form_fields_present),
        scenario!("TC-UI-012", "Edit Bug Functionality", "Should open edit modal with pre-filled data", edit_prefilled),
        scenario!("TC-UI-013", "Edit Bug Functionality", "Should update bug title", edit_title),
        scenario!("TC-UI-014", "Edit Bug Functionality", "Should update bug priority", edit_priority),
        scenario!("TC-UI-015", "Edit Bug Functionality", "Should update bug status", edit_status),
        scenario!("TC-UI-016", "Edit Bug Functionality", "Should update multiple fields at once", edit_multiple),
        scenario!("TC-UI-017", "Delete Bug Functionality", "Should show confirmation modal when clicking delete", delete_asks_confirmation),
        scenario!("TC-UI-018", "Delete Bug Functionality", "Should delete bug when confirming", delete_confirmed),
        scenario!("TC-UI-019", "Delete Bug Functionality", "Should NOT delete bug when canceling", delete_cancelled),
        scenario!("TC-UI-020", "Bug List Display", "Should display multiple bugs", lists_multiple),
        scenario!("TC-UI-021", "Bug List Display", "Should display bug with all details", shows_details),
        scenario!("TC-UI-022", "Filter and Search", "Should filter bugs by High priority", filter_priority),
        scenario!("TC-UI-023", "Filter and Search", "Should filter bugs by status", filter_status),
        scenario!("TC-UI-024", "Filter and Search", "Should search for bugs", search),
        scenario!("TC-UI-025", "Form Validation", "Should not submit form with empty title", empty_title_keeps_modal),
        scenario!("TC-UI-026", "Form Validation", "Should show validation message for empty title", empty_title_feedback),
        scenario!("TC-UI-027", "Comments Functionality", "Should open bug details", open_details),
        scenario!("TC-UI-028", "Comments Functionality", "Should add comment to bug", add_comment),
        scenario!("TC-UI-029", "Responsive Design", "Should work on mobile viewport", mobile_viewport),
        scenario!("TC-UI-030", "Responsive Design", "Should work on tablet viewport", tablet_viewport),
        scenario!("TC-UI-031", "Performance", "Page should load within acceptable time", loads_quickly),
        scenario!("TC-UI-032", "Performance", "Should handle creating 5 bugs quickly", five_creates_are_fast),
    ]
}

/// Wait for `locator` to become visible, failing the scenario if it never does.
async fn expect_shown(ctx: &UiContext, locator: &Locator, what: &str) -> E2eResult<()> {
    match ctx
        .driver()
        .wait_for(locator, WaitState::Visible, SHOWN_WAIT)
        .await
    {
        Err(e) if e.is_timeout() => Err(E2eError::AssertionFailed(format!("{} not shown", what))),
        other => other,
    }
}

async fn page_loads(ctx: &UiContext) -> E2eResult<()> {
    let url = ctx.driver().url().await?;
    check_eq!(url.trim_end_matches('/'), ctx.base_url.trim_end_matches('/'));
    check!(ctx.page.is_page_loaded().await?, "page heading never became visible");
    Ok(())
}

async fn add_button_visible(ctx: &UiContext) -> E2eResult<()> {
    check!(ctx.driver().is_visible(&ctx.page.add_bug_button).await?);
    Ok(())
}

async fn document_title(ctx: &UiContext) -> E2eResult<()> {
    let title = ctx.driver().title().await?;
    check!(!title.trim().is_empty(), "document title is empty");
    Ok(())
}

async fn has_h1(ctx: &UiContext) -> E2eResult<()> {
    let headings = ctx.driver().count(&Locator::all(&["h1"])).await?;
    check!(headings >= 1, "expected at least one h1, found {}", headings);
    Ok(())
}

async fn open_modal(ctx: &UiContext) -> E2eResult<()> {
    ctx.page.open_add_bug_modal().await?;
    let driver = ctx.driver();
    check!(driver.is_visible(&ctx.page.modal).await?);
    check!(driver.is_visible(&ctx.page.title_input).await?);
    check!(driver.is_visible(&ctx.page.description_input).await?);
    Ok(())
}

async fn create_bug(ctx: &UiContext) -> E2eResult<()> {
    let title = ctx
        .create_titled(
            "UI Test Bug",
            BugPatch {
                description: Some("Created via UI test".into()),
                status: Some(Status::Open),
                priority: Some(Priority::High),
                ..Default::default()
            },
        )
        .await?;
    check!(ctx.page.is_bug_visible(&title).await?, "{:?} not listed", title);
    Ok(())
}

async fn create_with(ctx: &UiContext, patch: BugPatch) -> E2eResult<()> {
    let title = ctx.create_titled("Test Bug", patch.clone()).await?;
    ctx.page.verify_bug_details(&title, &patch).await
}

async fn create_medium(ctx: &UiContext) -> E2eResult<()> {
    create_with(ctx, BugPatch::priority(Priority::Medium)).await
}

async fn create_low(ctx: &UiContext) -> E2eResult<()> {
    create_with(ctx, BugPatch::priority(Priority::Low)).await
}

async fn create_in_progress(ctx: &UiContext) -> E2eResult<()> {
    create_with(ctx, BugPatch::status(Status::InProgress)).await
}

async fn cancel_closes_modal(ctx: &UiContext) -> E2eResult<()> {
    ctx.page.open_add_bug_modal().await?;
    check!(ctx.page.is_modal_visible().await?);

    ctx.page.close_modal().await?;
    check!(!ctx.page.is_modal_visible().await?, "modal still open");
    Ok(())
}

async fn form_fields_present(ctx: &UiContext) -> E2eResult<()> {
    ctx.page.open_add_bug_modal().await?;
    let page = &ctx.page;
    for (name, field) in [
        ("title", &page.title_input),
        ("description", &page.description_input),
        ("status", &page.status_select),
        ("priority", &page.priority_select),
        ("submit", &page.submit_button),
    ] {
        check!(page.driver().is_visible(field).await?, "{} field is not visible", name);
    }
    Ok(())
}

async fn edit_prefilled(ctx: &UiContext) -> E2eResult<()> {
    let title = ctx.create_titled("Bug to Edit", BugPatch::default()).await?;

    ctx.driver().click(&ctx.page.edit_button(&title)).await?;
    expect_shown(ctx, &ctx.page.modal, "edit modal").await?;

    let value = ctx.driver().input_value(&ctx.page.title_input).await?;
    check!(value.contains("Bug to Edit"), "title input holds {:?}", value);
    Ok(())
}

async fn edit_title(ctx: &UiContext) -> E2eResult<()> {
    let title = ctx.create_titled("Bug to Edit", BugPatch::default()).await?;
    let new_title = format!("Updated Title {}", fixtures::unique_suffix());

    ctx.page.edit_bug(&title, &BugPatch::title(new_title.clone())).await?;
    check!(ctx.page.is_bug_visible(&new_title).await?, "{:?} not listed", new_title);
    Ok(())
}

async fn edit_priority(ctx: &UiContext) -> E2eResult<()> {
    let title = ctx.create_titled("Bug to Edit", BugPatch::default()).await?;
    let patch = BugPatch::priority(Priority::Low);

    ctx.page.edit_bug(&title, &patch).await?;
    ctx.page.verify_bug_details(&title, &patch).await
}

async fn edit_status(ctx: &UiContext) -> E2eResult<()> {
    let title = ctx.create_titled("Bug to Edit", BugPatch::default()).await?;
    let patch = BugPatch::status(Status::Resolved);

    ctx.page.edit_bug(&title, &patch).await?;
    ctx.page.verify_bug_details(&title, &patch).await
}

async fn edit_multiple(ctx: &UiContext) -> E2eResult<()> {
    let title = ctx.create_titled("Bug to Edit", BugPatch::default()).await?;
    let new_title = format!("Fully Updated {}", fixtures::unique_suffix());
    let patch = BugPatch {
        title: Some(new_title.clone()),
        status: Some(Status::InProgress),
        priority: Some(Priority::High),
        ..Default::default()
    };

    ctx.page.edit_bug(&title, &patch).await?;
    ctx.page.verify_bug_details(&new_title, &patch).await
}

async fn delete_asks_confirmation(ctx: &UiContext) -> E2eResult<()> {
    let title = ctx.create_titled("Bug to Delete", BugPatch::default()).await?;

    ctx.driver().click(&ctx.page.delete_button(&title)).await?;
    expect_shown(ctx, &ctx.page.confirmation_modal, "delete confirmation").await
}

async fn delete_confirmed(ctx: &UiContext) -> E2eResult<()> {
    let title = ctx.create_titled("Bug to Delete", BugPatch::default()).await?;

    ctx.page.delete_bug(&title, DeleteChoice::Confirm).await?;
    match ctx
        .driver()
        .wait_for(&ctx.page.bug_by_title(&title), WaitState::Hidden, SHOWN_WAIT)
        .await
    {
        Err(e) if e.is_timeout() => Err(E2eError::AssertionFailed(format!(
            "{:?} is still listed",
            title
        ))),
        other => other,
    }
}

async fn delete_cancelled(ctx: &UiContext) -> E2eResult<()> {
    let title = ctx.create_titled("Bug to Delete", BugPatch::default()).await?;

    ctx.page.delete_bug(&title, DeleteChoice::Cancel).await?;
    check!(ctx.page.is_bug_visible(&title).await?, "{:?} disappeared", title);
    Ok(())
}

async fn lists_multiple(ctx: &UiContext) -> E2eResult<()> {
    for i in 0..3 {
        ctx.create_titled(&format!("List Bug {}", i), BugPatch::default())
            .await?;
    }
    let count = ctx.page.bug_count().await?;
    check!(count >= 3, "expected at least 3 bugs, found {}", count);
    Ok(())
}

async fn shows_details(ctx: &UiContext) -> E2eResult<()> {
    let patch = BugPatch {
        status: Some(Status::Open),
        priority: Some(Priority::High),
        ..Default::default()
    };
    let title = ctx.create_titled("Detailed Bug", patch.clone()).await?;
    ctx.page.verify_bug_details(&title, &patch).await
}

/// The three bugs the filter scenarios look for, by title.
struct FilterSet {
    high: String,
    low: String,
}

async fn filter_fixtures(ctx: &UiContext) -> E2eResult<FilterSet> {
    let high = ctx
        .create_titled(
            "High Priority Bug",
            BugPatch {
                priority: Some(Priority::High),
                status: Some(Status::Open),
                ..Default::default()
            },
        )
        .await?;
    let low = ctx
        .create_titled(
            "Low Priority Bug",
            BugPatch {
                priority: Some(Priority::Low),
                status: Some(Status::Resolved),
                ..Default::default()
            },
        )
        .await?;
    ctx.create_titled(
        "Medium Priority Bug",
        BugPatch {
            priority: Some(Priority::Medium),
            status: Some(Status::InProgress),
            ..Default::default()
        },
    )
    .await?;
    Ok(FilterSet { high, low })
}

async fn filter_priority(ctx: &UiContext) -> E2eResult<()> {
    let bugs = filter_fixtures(ctx).await?;
    if !ctx.page.has_priority_filter().await? {
        return Err(E2eError::Skipped("no priority filter on the page".into()));
    }

    ctx.page.filter_by_priority(Priority::High.as_str()).await?;
    check!(ctx.page.is_bug_visible(&bugs.high).await?, "{:?} filtered out", bugs.high);
    Ok(())
}

async fn filter_status(ctx: &UiContext) -> E2eResult<()> {
    let bugs = filter_fixtures(ctx).await?;
    if !ctx.page.has_status_filter().await? {
        return Err(E2eError::Skipped("no status filter on the page".into()));
    }

    ctx.page.filter_by_status(Status::Resolved.as_str()).await?;
    check!(ctx.page.is_bug_visible(&bugs.low).await?, "{:?} filtered out", bugs.low);
    Ok(())
}

async fn search(ctx: &UiContext) -> E2eResult<()> {
    let bugs = filter_fixtures(ctx).await?;
    if !ctx.page.has_search().await? {
        return Err(E2eError::Skipped("no search box on the page".into()));
    }

    ctx.page.search_bugs("High Priority").await?;
    check!(ctx.page.is_bug_visible(&bugs.high).await?, "{:?} not found", bugs.high);
    Ok(())
}

async fn empty_title_keeps_modal(ctx: &UiContext) -> E2eResult<()> {
    ctx.page.open_add_bug_modal().await?;
    ctx.driver().fill(&ctx.page.title_input, "").await?;
    ctx.driver()
        .fill(&ctx.page.description_input, "Some description")
        .await?;
    ctx.driver().click(&ctx.page.submit_button).await?;

    check!(ctx.page.is_modal_visible().await?, "modal closed on an empty title");
    Ok(())
}

async fn empty_title_feedback(ctx: &UiContext) -> E2eResult<()> {
    ctx.page.open_add_bug_modal().await?;
    ctx.driver().click(&ctx.page.submit_button).await?;

    let has_error = ctx.page.has_validation_message().await?;
    let modal_open = ctx.page.is_modal_visible().await?;
    check!(has_error || modal_open, "no validation feedback for an empty title");
    Ok(())
}

async fn open_details(ctx: &UiContext) -> E2eResult<()> {
    let title = ctx.create_titled("Bug with Comments", BugPatch::default()).await?;
    check!(ctx.page.is_bug_visible(&title).await?);
    ctx.page.open_bug_details(&title).await
}

async fn add_comment(ctx: &UiContext) -> E2eResult<()> {
    let title = ctx.create_titled("Bug with Comments", BugPatch::default()).await?;
    ctx.page.open_bug_details(&title).await?;

    if !ctx.page.has_comment_section().await? {
        return Err(E2eError::Skipped("no comment section on the page".into()));
    }

    ctx.page
        .add_comment("This is a test comment", "Test User")
        .await?;
    let comments = ctx.page.comment_count().await?;
    check!(comments > 0, "comment was not added");
    Ok(())
}

async fn works_at(ctx: &UiContext, viewport: Viewport) -> E2eResult<()> {
    ctx.driver().set_viewport(viewport).await?;
    ctx.page.goto().await?;
    check!(
        ctx.driver().is_visible(&ctx.page.add_bug_button).await?,
        "Add Bug button hidden at {}x{}",
        viewport.width,
        viewport.height
    );
    Ok(())
}

async fn mobile_viewport(ctx: &UiContext) -> E2eResult<()> {
    works_at(ctx, Viewport::MOBILE).await
}

async fn tablet_viewport(ctx: &UiContext) -> E2eResult<()> {
    works_at(ctx, Viewport::TABLET).await
}

async fn loads_quickly(ctx: &UiContext) -> E2eResult<()> {
    let start = Instant::now();
    ctx.page.goto().await?;
    let elapsed = start.elapsed();
    check!(
        elapsed < Duration::from_secs(5),
        "page load took {} ms",
        elapsed.as_millis()
    );
    Ok(())
}

async fn five_creates_are_fast(ctx: &UiContext) -> E2eResult<()> {
    let start = Instant::now();
    for i in 0..5 {
        ctx.create_titled(&format!("Perf Bug {}", i), BugPatch::default())
            .await?;
    }
    let elapsed = start.elapsed();
    check!(
        elapsed < Duration::from_secs(30),
        "5 UI creates took {} ms",
        elapsed.as_millis()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_ui_case_is_registered_once() {
        let all = scenarios();
        assert_eq!(all.len(), 32);
        for (n, scenario) in all.iter().enumerate() {
            assert_eq!(scenario.id, format!("TC-UI-{:03}", n + 1));
            assert!(!scenario.exclusive);
        }
    }
}
