//! HTTP facade over the bug tracker API
//!
//! Every typed call demands a 2xx response and fails fast otherwise; there
//! is no retry at this layer. Tests that expect an error status go through
//! [`BugApi::raw`] and inspect the [`RawResponse`] themselves.

use std::future::Future;
use std::time::{Duration, Instant};

use bugtrack_common::{Bug, BugData, BugPatch, Comment, CommentData, Health};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{E2eError, E2eResult};

/// Client for one API base URL, e.g. `http://localhost:8080/api`
#[derive(Debug, Clone)]
pub struct BugApi {
    client: reqwest::Client,
    base_url: String,
}

impl BugApi {
    pub fn new(base_url: impl Into<String>) -> E2eResult<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> E2eResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> E2eResult<Response> {
        let url = self.url(path);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Send and require a success status.
    async fn send_ok<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> E2eResult<Response> {
        let response = self.send(method.clone(), path, body).await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();
        Err(E2eError::UnexpectedStatus {
            method: method.to_string(),
            url,
            status,
            body,
        })
    }

    async fn json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> E2eResult<T> {
        let response = self.send_ok(method, path, body).await?;
        Ok(response.json().await?)
    }

    pub async fn health_check(&self) -> E2eResult<Health> {
        self.json(Method::GET, "health", None::<&()>).await
    }

    pub async fn create_bug(&self, data: &BugData) -> E2eResult<Bug> {
        self.json(Method::POST, "bugs", Some(data)).await
    }

    pub async fn list_bugs(&self) -> E2eResult<Vec<Bug>> {
        self.json(Method::GET, "bugs", None::<&()>).await
    }

    pub async fn get_bug(&self, id: i64) -> E2eResult<Bug> {
        self.json(Method::GET, &format!("bugs/{}", id), None::<&()>)
            .await
    }

    pub async fn update_bug(&self, id: i64, patch: &BugPatch) -> E2eResult<Bug> {
        self.json(Method::PUT, &format!("bugs/{}", id), Some(patch))
            .await
    }

    pub async fn delete_bug(&self, id: i64) -> E2eResult<()> {
        self.send_ok(Method::DELETE, &format!("bugs/{}", id), None::<&()>)
            .await?;
        Ok(())
    }

    /// Bulk delete. Wipes bugs created by anyone sharing the backend.
    pub async fn delete_all_bugs(&self) -> E2eResult<()> {
        self.send_ok(Method::DELETE, "bugs", None::<&()>).await?;
        Ok(())
    }

    pub async fn list_comments(&self, bug_id: i64) -> E2eResult<Vec<Comment>> {
        self.json(Method::GET, &format!("bugs/{}/comments", bug_id), None::<&()>)
            .await
    }

    pub async fn create_comment(&self, bug_id: i64, data: &CommentData) -> E2eResult<Comment> {
        self.json(Method::POST, &format!("bugs/{}/comments", bug_id), Some(data))
            .await
    }

    /// Unchecked requests for negative tests.
    pub fn raw(&self) -> RawApi<'_> {
        RawApi { api: self }
    }
}

/// Status and body of an unchecked request
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    /// Parsed JSON body; `Null` when empty, a string when not JSON
    pub body: Value,
}

impl RawResponse {
    /// The `error` field of an API error body.
    pub fn error_message(&self) -> Option<&str> {
        self.body.get("error").and_then(Value::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    async fn read(response: Response) -> E2eResult<Self> {
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok(Self { status, body })
    }
}

pub struct RawApi<'a> {
    api: &'a BugApi,
}

impl RawApi<'_> {
    pub async fn get(&self, path: &str) -> E2eResult<RawResponse> {
        let response = self.api.send(Method::GET, path, None::<&()>).await?;
        RawResponse::read(response).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> E2eResult<RawResponse> {
        let response = self.api.send(Method::POST, path, Some(body)).await?;
        RawResponse::read(response).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> E2eResult<RawResponse> {
        let response = self.api.send(Method::PUT, path, Some(body)).await?;
        RawResponse::read(response).await
    }

    pub async fn delete(&self, path: &str) -> E2eResult<RawResponse> {
        let response = self.api.send(Method::DELETE, path, None::<&()>).await?;
        RawResponse::read(response).await
    }
}

fn require_fields(kind: &str, value: &Value, fields: &[&str]) -> E2eResult<()> {
    for field in fields {
        match value.get(field) {
            Some(v) if !v.is_null() => {}
            _ => {
                return Err(E2eError::AssertionFailed(format!(
                    "{} is missing `{}`: {}",
                    kind, field, value
                )))
            }
        }
    }
    Ok(())
}

fn expect_field(kind: &str, value: &Value, field: &str, expected: &str) -> E2eResult<()> {
    match value.get(field).and_then(Value::as_str) {
        Some(actual) if actual == expected => Ok(()),
        actual => Err(E2eError::AssertionFailed(format!(
            "{}.{}: expected {:?}, got {:?}",
            kind, field, expected, actual
        ))),
    }
}

/// Check a bug body has every field, and the values in `expected` if given.
pub fn verify_bug_structure(bug: &Value, expected: Option<&BugPatch>) -> E2eResult<()> {
    require_fields(
        "bug",
        bug,
        &["id", "title", "description", "status", "priority", "created_at", "updated_at"],
    )?;

    if let Some(expected) = expected {
        if let Some(title) = &expected.title {
            expect_field("bug", bug, "title", title)?;
        }
        if let Some(description) = &expected.description {
            expect_field("bug", bug, "description", description)?;
        }
        if let Some(status) = expected.status {
            expect_field("bug", bug, "status", status.as_str())?;
        }
        if let Some(priority) = expected.priority {
            expect_field("bug", bug, "priority", priority.as_str())?;
        }
    }
    Ok(())
}

/// Check a comment body has every field, and the values in `expected` if given.
pub fn verify_comment_structure(comment: &Value, expected: Option<&CommentData>) -> E2eResult<()> {
    require_fields(
        "comment",
        comment,
        &["id", "bug_id", "text", "author", "created_at"],
    )?;

    if let Some(expected) = expected {
        expect_field("comment", comment, "text", &expected.text)?;
        expect_field("comment", comment, "author", &expected.author)?;
    }
    Ok(())
}

/// Poll `condition` every `interval` until it returns true or `timeout` passes.
pub async fn wait_for_condition<F, Fut>(
    mut condition: F,
    timeout: Duration,
    interval: Duration,
) -> E2eResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<bool>>,
{
    let start = Instant::now();
    loop {
        if condition().await? {
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(E2eError::Timeout(format!(
                "condition not met within {} ms",
                timeout.as_millis()
            )));
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bugtrack_common::{Priority, Status};
    use serde_json::json;

    fn bug_json() -> Value {
        json!({
            "id": 7,
            "title": "X",
            "description": "Y",
            "status": "In Progress",
            "priority": "High",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
        })
    }

    #[test]
    fn base_url_is_normalised() {
        let api = BugApi::new("http://localhost:8080/api/").unwrap();
        assert_eq!(api.base_url(), "http://localhost:8080/api");
        assert_eq!(api.url("/bugs/1"), "http://localhost:8080/api/bugs/1");
        assert_eq!(api.url("health"), "http://localhost:8080/api/health");
    }

    #[test]
    fn bug_structure_accepts_matching_values() {
        let expected = BugPatch {
            status: Some(Status::InProgress),
            priority: Some(Priority::High),
            ..Default::default()
        };
        verify_bug_structure(&bug_json(), Some(&expected)).unwrap();
    }

    #[test]
    fn bug_structure_reports_missing_and_mismatched_fields() {
        let mut bug = bug_json();
        bug.as_object_mut().unwrap().remove("updated_at");
        let err = verify_bug_structure(&bug, None).unwrap_err();
        assert!(err.to_string().contains("updated_at"));

        let err = verify_bug_structure(&bug_json(), Some(&BugPatch::title("Other"))).unwrap_err();
        assert!(matches!(err, E2eError::AssertionFailed(_)));
    }

    #[test]
    fn comment_structure_checks_text_and_author() {
        let comment = json!({
            "id": 1, "bug_id": 7, "text": "hi", "author": "QA",
            "created_at": "2024-01-01T00:00:00Z",
        });
        let expected = CommentData { text: "hi".into(), author: "QA".into() };
        verify_comment_structure(&comment, Some(&expected)).unwrap();

        let other = CommentData { text: "bye".into(), author: "QA".into() };
        assert!(verify_comment_structure(&comment, Some(&other)).is_err());
    }

    #[tokio::test]
    async fn wait_for_condition_times_out() {
        let err = wait_for_condition(
            || async { Ok(false) },
            Duration::from_millis(30),
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn wait_for_condition_returns_once_true() {
        let mut calls = 0;
        wait_for_condition(
            || {
                calls += 1;
                let done = calls >= 3;
                async move { Ok(done) }
            },
            Duration::from_secs(1),
            Duration::from_millis(1),
        )
        .await
        .unwrap();
        assert_eq!(calls, 3);
    }
}
