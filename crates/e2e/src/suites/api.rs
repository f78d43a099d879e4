//! HTTP API scenarios: CRUD, validation, comments, edge cases and timing

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bugtrack_common::{Bug, BugData, BugPatch, Priority, Status};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::api::{verify_bug_structure, verify_comment_structure, wait_for_condition, BugApi};
use crate::config::API_PROJECT;
use crate::error::{E2eError, E2eResult};
use crate::fixtures::{self, expected_errors};
use crate::scenario::{Scenario, Suite};
use crate::{check, check_eq, scenario};

/// An id no test ever reaches
const MISSING_ID: i64 = 999_999;

/// Per-attempt state: the client and every bug the attempt created
pub struct ApiContext {
    pub api: BugApi,
    created: Mutex<Vec<i64>>,
}

impl ApiContext {
    pub fn new(api: BugApi) -> Self {
        Self {
            api,
            created: Mutex::new(Vec::new()),
        }
    }

    /// Delete `id` during teardown.
    pub async fn track(&self, id: i64) {
        self.created.lock().await.push(id);
    }

    /// Create a bug and schedule it for cleanup.
    pub async fn create(&self, data: &BugData) -> E2eResult<Bug> {
        let bug = self.api.create_bug(data).await?;
        self.track(bug.id).await;
        Ok(bug)
    }

    /// Delete every tracked bug. Bugs a scenario already removed are fine.
    pub async fn cleanup(&self) {
        let ids: Vec<i64> = std::mem::take(&mut *self.created.lock().await);
        for id in ids {
            match self.api.delete_bug(id).await {
                Ok(()) => debug!("cleaned up bug {}", id),
                Err(E2eError::UnexpectedStatus { status: 404, .. }) => {}
                Err(e) => warn!("Cleanup of bug {} failed: {}", id, e),
            }
        }
    }
}

pub struct ApiSuite {
    api: BugApi,
}

impl ApiSuite {
    pub fn new(api: BugApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Suite for ApiSuite {
    type Context = ApiContext;

    fn name(&self) -> &str {
        API_PROJECT
    }

    fn scenarios(&self) -> Vec<Scenario<ApiContext>> {
        scenarios()
    }

    async fn setup(&self) -> E2eResult<ApiContext> {
        Ok(ApiContext::new(self.api.clone()))
    }

    async fn teardown(&self, ctx: ApiContext) -> E2eResult<()> {
        ctx.cleanup().await;
        Ok(())
    }
}

pub fn scenarios() -> Vec<Scenario<ApiContext>> {
    vec![
        scenario!("TC-API-001", "Health Check", "Should return healthy status", health_is_ok),
        scenario!("TC-API-002", "Bug Creation - Valid Cases", "Create bug with all valid fields", create_with_all_fields),
        scenario!("TC-API-003", "Bug Creation - Valid Cases", "Create bug with High priority", create_high_priority),
        scenario!("TC-API-004", "Bug Creation - Valid Cases", "Create bug with In Progress status", create_in_progress),
        scenario!("TC-API-005", "Bug Creation - Valid Cases", "Create bug with Resolved status", create_resolved),
        scenario!("TC-API-006", "Bug Creation - Valid Cases", "Create multiple bugs", create_batch),
        scenario!("TC-API-007", "Bug Creation - Validation Errors", "Should reject bug without title", reject_missing_title),
        scenario!("TC-API-008", "Bug Creation - Validation Errors", "Should reject bug with empty title", reject_empty_title),
        scenario!("TC-API-009", "Bug Creation - Validation Errors", "Should reject bug with invalid status", reject_invalid_status),
        scenario!("TC-API-010", "Bug Creation - Validation Errors", "Should reject bug with invalid priority", reject_invalid_priority),
        scenario!("TC-API-011", "Bug Retrieval", "Get all bugs", list_contains_created),
        scenario!("TC-API-012", "Bug Retrieval", "Get single bug by ID", get_by_id),
        scenario!("TC-API-013", "Bug Retrieval", "Should return 404 for non-existent bug", get_missing_is_404),
        scenario!("TC-API-014", "Bug Retrieval", "Should return 400 for invalid bug ID format", malformed_id_is_400),
        scenario!("TC-API-015", "Bug Update", "Update bug title", update_title),
        scenario!("TC-API-016", "Bug Update", "Update bug status", update_status),
        scenario!("TC-API-017", "Bug Update", "Update bug priority", update_priority),
        scenario!("TC-API-018", "Bug Update", "Update multiple fields", update_all_fields),
        scenario!("TC-API-019", "Bug Update", "Should return 404 when updating non-existent bug", update_missing_is_404),
        scenario!("TC-API-020", "Bug Deletion", "Delete a bug", delete_then_404),
        scenario!("TC-API-021", "Bug Deletion", "Should return 404 when deleting non-existent bug", delete_missing_is_404),
        scenario!("TC-API-022", "Bug Deletion", "Delete all bugs", delete_all_empties_list).exclusive(),
        scenario!("TC-API-023", "Comments", "Create comment for a bug", create_comment),
        scenario!("TC-API-024", "Comments", "Get comments for a bug", list_comments),
        scenario!("TC-API-025", "Comments", "Should return 404 when creating comment for non-existent bug", comment_on_missing_is_404),
        scenario!("TC-API-026", "Comments", "Should return 404 when getting comments for non-existent bug", comments_of_missing_is_404),
        scenario!("TC-API-027", "Edge Cases", "Create bug with special characters in title", special_characters),
        scenario!("TC-API-028", "Edge Cases", "Create bug with Unicode characters", unicode_characters),
        scenario!("TC-API-029", "Performance", "Create 10 bugs within acceptable time", ten_creates_are_fast),
        scenario!("TC-API-030", "Bug Creation - Validation Errors", "Should reject bug without status", reject_missing_status),
        scenario!("TC-API-031", "Bug Creation - Validation Errors", "Should reject bug without priority", reject_missing_priority),
        scenario!("TC-API-032", "Bug Creation - Validation Errors", "Rejected bugs are not stored", rejected_bugs_are_not_stored),
        scenario!("TC-API-033", "Bug Update", "Partial update leaves other fields unchanged", partial_update),
        scenario!("TC-API-034", "Comments", "Should reject comment with empty text", reject_empty_comment),
        scenario!("TC-API-035", "Comments", "Should reject comment without author", reject_comment_without_author),
        scenario!("TC-API-036", "Comments", "Comments are gone once their bug is deleted", comments_follow_bug_deletion),
        scenario!("TC-API-037", "Edge Cases", "Create bug with long title and description", long_fields),
    ]
}

fn created_id(body: &Value) -> E2eResult<i64> {
    body.get("id")
        .and_then(Value::as_i64)
        .ok_or_else(|| E2eError::AssertionFailed(format!("response has no numeric id: {}", body)))
}

/// POST `payload` and expect a 400 whose message mentions `field` when given.
async fn expect_rejected(ctx: &ApiContext, payload: &Value, field: Option<&str>) -> E2eResult<()> {
    let response = ctx.api.raw().post("bugs", payload).await?;
    if response.is_success() {
        if let Ok(id) = created_id(&response.body) {
            ctx.track(id).await;
        }
    }

    check_eq!(response.status, 400);
    if let Some(field) = field {
        let message = response.error_message().unwrap_or_default();
        check!(
            message.contains(field),
            "error {:?} should mention {:?}",
            message,
            field
        );
    }
    Ok(())
}

async fn health_is_ok(ctx: &ApiContext) -> E2eResult<()> {
    let health = ctx.api.health_check().await?;
    check_eq!(health.status, "ok");
    Ok(())
}

async fn create_with_all_fields(ctx: &ApiContext) -> E2eResult<()> {
    let data = fixtures::unique_bug();
    let response = ctx.api.raw().post("bugs", &serde_json::to_value(&data)?).await?;
    check!(response.is_success(), "create returned {}", response.status);

    let id = created_id(&response.body)?;
    ctx.track(id).await;

    verify_bug_structure(&response.body, Some(&BugPatch::from(data)))?;
    check!(id > 0);
    check!(response.body["created_at"].as_str().is_some_and(|s| !s.is_empty()));
    check!(response.body["updated_at"].as_str().is_some_and(|s| !s.is_empty()));
    Ok(())
}

async fn create_high_priority(ctx: &ApiContext) -> E2eResult<()> {
    let bug = ctx
        .create(&fixtures::unique_bug_with(BugPatch::priority(Priority::High)))
        .await?;
    check_eq!(bug.priority, Priority::High);
    Ok(())
}

async fn create_in_progress(ctx: &ApiContext) -> E2eResult<()> {
    let bug = ctx
        .create(&fixtures::unique_bug_with(BugPatch::status(Status::InProgress)))
        .await?;
    check_eq!(bug.status, Status::InProgress);
    Ok(())
}

async fn create_resolved(ctx: &ApiContext) -> E2eResult<()> {
    let bug = ctx
        .create(&fixtures::unique_bug_with(BugPatch::status(Status::Resolved)))
        .await?;
    check_eq!(bug.status, Status::Resolved);
    Ok(())
}

async fn create_batch(ctx: &ApiContext) -> E2eResult<()> {
    let mut bugs = Vec::new();
    for i in 0..3 {
        let data = fixtures::unique_bug_with(BugPatch::title(format!(
            "Batch Bug {} {}",
            i,
            fixtures::unique_suffix()
        )));
        bugs.push(ctx.create(&data).await?);
    }

    check_eq!(bugs.len(), 3);
    for bug in &bugs {
        verify_bug_structure(&serde_json::to_value(bug)?, None)?;
    }
    Ok(())
}

async fn reject_missing_title(ctx: &ApiContext) -> E2eResult<()> {
    expect_rejected(ctx, &fixtures::invalid_bugs().missing_title, Some("title")).await
}

async fn reject_empty_title(ctx: &ApiContext) -> E2eResult<()> {
    expect_rejected(ctx, &fixtures::invalid_bugs().empty_title, Some("title")).await
}

async fn reject_invalid_status(ctx: &ApiContext) -> E2eResult<()> {
    expect_rejected(ctx, &fixtures::invalid_bugs().invalid_status, None).await
}

async fn reject_invalid_priority(ctx: &ApiContext) -> E2eResult<()> {
    expect_rejected(ctx, &fixtures::invalid_bugs().invalid_priority, None).await
}

async fn reject_missing_status(ctx: &ApiContext) -> E2eResult<()> {
    expect_rejected(ctx, &fixtures::invalid_bugs().missing_status, Some("status")).await
}

async fn reject_missing_priority(ctx: &ApiContext) -> E2eResult<()> {
    expect_rejected(ctx, &fixtures::invalid_bugs().missing_priority, Some("priority")).await
}

async fn rejected_bugs_are_not_stored(ctx: &ApiContext) -> E2eResult<()> {
    let suffix = fixtures::unique_suffix();
    let invalid = fixtures::invalid_bugs();

    let mut titles = Vec::new();
    for mut payload in [invalid.invalid_status, invalid.invalid_priority, invalid.missing_status] {
        let title = format!("{} {}", payload["title"].as_str().unwrap_or("Rejected"), suffix);
        payload["title"] = Value::String(title.clone());
        expect_rejected(ctx, &payload, None).await?;
        titles.push(title);
    }

    let stored = ctx.api.list_bugs().await?;
    for title in &titles {
        check!(
            stored.iter().all(|bug| &bug.title != title),
            "rejected bug {:?} was stored",
            title
        );
    }
    Ok(())
}

async fn list_contains_created(ctx: &ApiContext) -> E2eResult<()> {
    let created = ctx.create(&fixtures::unique_bug()).await?;

    let response = ctx.api.raw().get("bugs").await?;
    check_eq!(response.status, 200);
    let bugs = response
        .body
        .as_array()
        .ok_or_else(|| E2eError::AssertionFailed(format!("expected an array: {}", response.body)))?;

    check!(!bugs.is_empty());
    verify_bug_structure(&bugs[0], None)?;
    check!(
        bugs.iter().any(|bug| bug["id"] == created.id),
        "bug {} missing from the list",
        created.id
    );
    Ok(())
}

async fn get_by_id(ctx: &ApiContext) -> E2eResult<()> {
    let data = fixtures::unique_bug();
    let created = ctx.create(&data).await?;

    let response = ctx.api.raw().get(&format!("bugs/{}", created.id)).await?;
    check_eq!(response.status, 200);
    verify_bug_structure(&response.body, Some(&BugPatch::from(data)))?;

    let fetched = ctx.api.get_bug(created.id).await?;
    check_eq!(fetched, created);
    Ok(())
}

async fn get_missing_is_404(ctx: &ApiContext) -> E2eResult<()> {
    let response = ctx.api.raw().get(&format!("bugs/{}", MISSING_ID)).await?;
    check_eq!(response.status, 404);
    check_eq!(response.error_message(), Some(expected_errors::BUG_NOT_FOUND));
    Ok(())
}

async fn malformed_id_is_400(ctx: &ApiContext) -> E2eResult<()> {
    let response = ctx.api.raw().get("bugs/invalid").await?;
    check_eq!(response.status, 400);
    check_eq!(response.error_message(), Some(expected_errors::INVALID_BUG_ID));
    Ok(())
}

async fn update_title(ctx: &ApiContext) -> E2eResult<()> {
    let created = ctx.create(&fixtures::unique_bug()).await?;
    let title = format!("Updated {}", fixtures::unique_suffix());

    let updated = ctx
        .api
        .update_bug(created.id, &BugPatch::title(title.clone()))
        .await?;
    check_eq!(updated.title, title);
    check_eq!(updated.id, created.id);
    Ok(())
}

async fn update_status(ctx: &ApiContext) -> E2eResult<()> {
    let created = ctx
        .create(&fixtures::unique_bug_with(BugPatch::status(Status::Open)))
        .await?;
    let updated = ctx
        .api
        .update_bug(created.id, &BugPatch::status(Status::Resolved))
        .await?;
    check_eq!(updated.status, Status::Resolved);
    Ok(())
}

async fn update_priority(ctx: &ApiContext) -> E2eResult<()> {
    let created = ctx
        .create(&fixtures::unique_bug_with(BugPatch::priority(Priority::Low)))
        .await?;
    let updated = ctx
        .api
        .update_bug(created.id, &BugPatch::priority(Priority::High))
        .await?;
    check_eq!(updated.priority, Priority::High);
    Ok(())
}

async fn update_all_fields(ctx: &ApiContext) -> E2eResult<()> {
    let created = ctx.create(&fixtures::unique_bug()).await?;
    let patch = BugPatch {
        title: Some("Completely Updated".into()),
        description: Some("New description".into()),
        status: Some(Status::InProgress),
        priority: Some(Priority::High),
    };

    let updated = ctx.api.update_bug(created.id, &patch).await?;
    check_eq!(updated.data(), created.data().with_patch(&patch));
    Ok(())
}

async fn partial_update(ctx: &ApiContext) -> E2eResult<()> {
    let created = ctx
        .create(&fixtures::unique_bug_with(BugPatch {
            status: Some(Status::Open),
            priority: Some(Priority::Low),
            ..Default::default()
        }))
        .await?;

    ctx.api
        .update_bug(created.id, &BugPatch::priority(Priority::Medium))
        .await?;
    let fetched = ctx.api.get_bug(created.id).await?;

    check_eq!(fetched.priority, Priority::Medium);
    check_eq!(fetched.title, created.title);
    check_eq!(fetched.description, created.description);
    check_eq!(fetched.status, created.status);
    check_eq!(fetched.created_at, created.created_at);
    Ok(())
}

async fn update_missing_is_404(ctx: &ApiContext) -> E2eResult<()> {
    let response = ctx
        .api
        .raw()
        .put(&format!("bugs/{}", MISSING_ID), &json!({ "title": "Updated" }))
        .await?;
    check_eq!(response.status, 404);
    Ok(())
}

async fn delete_then_404(ctx: &ApiContext) -> E2eResult<()> {
    let created = ctx.api.create_bug(&fixtures::unique_bug()).await?;
    ctx.api.delete_bug(created.id).await?;

    let response = ctx.api.raw().get(&format!("bugs/{}", created.id)).await?;
    check_eq!(response.status, 404);
    Ok(())
}

async fn delete_missing_is_404(ctx: &ApiContext) -> E2eResult<()> {
    let response = ctx.api.raw().delete(&format!("bugs/{}", MISSING_ID)).await?;
    check_eq!(response.status, 404);
    Ok(())
}

async fn delete_all_empties_list(ctx: &ApiContext) -> E2eResult<()> {
    for _ in 0..3 {
        ctx.api.create_bug(&fixtures::unique_bug()).await?;
    }

    ctx.api.delete_all_bugs().await?;

    let api = &ctx.api;
    wait_for_condition(
        || async move { Ok::<_, E2eError>(api.list_bugs().await?.is_empty()) },
        Duration::from_secs(5),
        Duration::from_millis(100),
    )
    .await
    .map_err(|e| match e {
        E2eError::Timeout(_) => E2eError::AssertionFailed("bug list is not empty after delete all".into()),
        other => other,
    })
}

/// Create a bug to hang comments on.
async fn comment_target(ctx: &ApiContext) -> E2eResult<i64> {
    Ok(ctx.create(&fixtures::unique_bug()).await?.id)
}

async fn create_comment(ctx: &ApiContext) -> E2eResult<()> {
    let bug_id = comment_target(ctx).await?;
    let data = fixtures::unique_comment();

    let response = ctx
        .api
        .raw()
        .post(&format!("bugs/{}/comments", bug_id), &serde_json::to_value(&data)?)
        .await?;
    check!(response.is_success(), "comment create returned {}", response.status);
    verify_comment_structure(&response.body, Some(&data))?;
    check_eq!(response.body["bug_id"].as_i64(), Some(bug_id));
    Ok(())
}

async fn list_comments(ctx: &ApiContext) -> E2eResult<()> {
    let bug_id = comment_target(ctx).await?;
    ctx.api
        .create_comment(bug_id, &fixtures::unique_comment_with_text("First comment"))
        .await?;
    ctx.api
        .create_comment(bug_id, &fixtures::unique_comment_with_text("Second comment"))
        .await?;

    let comments = ctx.api.list_comments(bug_id).await?;
    check!(comments.len() >= 2, "expected 2 comments, got {}", comments.len());
    check!(comments.iter().all(|c| c.bug_id == bug_id));
    Ok(())
}

async fn comment_on_missing_is_404(ctx: &ApiContext) -> E2eResult<()> {
    let response = ctx
        .api
        .raw()
        .post(
            &format!("bugs/{}/comments", MISSING_ID),
            &serde_json::to_value(fixtures::unique_comment())?,
        )
        .await?;
    check_eq!(response.status, 404);
    Ok(())
}

async fn comments_of_missing_is_404(ctx: &ApiContext) -> E2eResult<()> {
    let response = ctx
        .api
        .raw()
        .get(&format!("bugs/{}/comments", MISSING_ID))
        .await?;
    check_eq!(response.status, 404);
    Ok(())
}

async fn reject_empty_comment(ctx: &ApiContext) -> E2eResult<()> {
    let bug_id = comment_target(ctx).await?;
    let invalid = fixtures::invalid_comments();

    for payload in [invalid.empty_text, invalid.missing_text] {
        let response = ctx
            .api
            .raw()
            .post(&format!("bugs/{}/comments", bug_id), &payload)
            .await?;
        check_eq!(response.status, 400);
        check!(response.error_message().unwrap_or_default().contains("text"));
    }
    check!(ctx.api.list_comments(bug_id).await?.is_empty());
    Ok(())
}

async fn reject_comment_without_author(ctx: &ApiContext) -> E2eResult<()> {
    let bug_id = comment_target(ctx).await?;
    let response = ctx
        .api
        .raw()
        .post(
            &format!("bugs/{}/comments", bug_id),
            &fixtures::invalid_comments().missing_author,
        )
        .await?;
    check_eq!(response.status, 400);
    check!(response.error_message().unwrap_or_default().contains("author"));
    Ok(())
}

async fn comments_follow_bug_deletion(ctx: &ApiContext) -> E2eResult<()> {
    let bug = ctx.api.create_bug(&fixtures::unique_bug()).await?;
    for comment in fixtures::valid_comments().iter().take(2) {
        ctx.api.create_comment(bug.id, comment).await?;
    }
    check_eq!(ctx.api.list_comments(bug.id).await?.len(), 2);

    ctx.api.delete_bug(bug.id).await?;

    let response = ctx.api.raw().get(&format!("bugs/{}/comments", bug.id)).await?;
    check_eq!(response.status, 404);
    Ok(())
}

async fn special_characters(ctx: &ApiContext) -> E2eResult<()> {
    let data = fixtures::edge_cases().special_characters_title;
    let bug = ctx.create(&data).await?;
    check_eq!(bug.title, data.title);
    Ok(())
}

async fn unicode_characters(ctx: &ApiContext) -> E2eResult<()> {
    let data = fixtures::edge_cases().unicode_characters;
    let bug = ctx.create(&data).await?;
    check_eq!(bug.title, data.title);
    Ok(())
}

async fn long_fields(ctx: &ApiContext) -> E2eResult<()> {
    let edge = fixtures::edge_cases();

    let bug = ctx.create(&edge.long_title).await?;
    check_eq!(bug.title.chars().count(), 500);

    let bug = ctx.create(&edge.long_description).await?;
    check_eq!(bug.description, edge.long_description.description);
    Ok(())
}

async fn ten_creates_are_fast(ctx: &ApiContext) -> E2eResult<()> {
    let start = Instant::now();
    for i in 0..10 {
        let data = fixtures::unique_bug_with(BugPatch::title(format!(
            "Performance Test {} {}",
            i,
            fixtures::unique_suffix()
        )));
        ctx.create(&data).await?;
    }

    let elapsed = start.elapsed();
    check!(
        elapsed < Duration::from_secs(10),
        "10 creates took {} ms",
        elapsed.as_millis()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn scenario_ids_are_unique_and_only_delete_all_is_exclusive() {
        let all = scenarios();
        let ids: HashSet<_> = all.iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), all.len());
        assert!((1..=29).all(|n| ids.contains(format!("TC-API-{:03}", n).as_str())));

        let exclusive: Vec<_> = all.iter().filter(|s| s.exclusive).map(|s| s.id).collect();
        assert_eq!(exclusive, vec!["TC-API-022"]);
    }
}
