//! In-memory bug and comment store with the API's validation rules

use std::collections::BTreeMap;

use bugtrack_common::{messages, Bug, Comment, Priority, Status};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Rejected payload; the message names the offending field.
    #[error("{0}")]
    Validation(String),

    #[error("{}", messages::INVALID_BUG_ID)]
    InvalidId(String),

    #[error("{}", messages::BUG_NOT_FOUND)]
    NotFound(i64),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Parse a bug identifier taken from a URL path segment.
pub fn parse_bug_id(raw: &str) -> StoreResult<i64> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(StoreError::InvalidId(raw.to_string())),
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn as_object(body: &Value) -> StoreResult<&Map<String, Value>> {
    body.as_object()
        .ok_or_else(|| StoreError::Validation("request body must be a JSON object".into()))
}

fn required_text(body: &Map<String, Value>, field: &str, message: &str) -> StoreResult<String> {
    match body.get(field).and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        _ => Err(StoreError::Validation(message.to_string())),
    }
}

fn parse_status(value: &Value) -> StoreResult<Status> {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StoreError::Validation(messages::INVALID_STATUS.into()))
}

fn parse_priority(value: &Value) -> StoreResult<Priority> {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StoreError::Validation(messages::INVALID_PRIORITY.into()))
}

fn optional_description(body: &Map<String, Value>) -> StoreResult<Option<String>> {
    match body.get("description") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(_) => Err(StoreError::Validation("description must be a string".into())),
    }
}

/// Bugs and their comments, keyed by server-assigned ids.
#[derive(Debug, Default)]
pub struct BugStore {
    bugs: BTreeMap<i64, Bug>,
    comments: BTreeMap<i64, Comment>,
    next_bug_id: i64,
    next_comment_id: i64,
}

impl BugStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_bug(&mut self, body: &Value) -> StoreResult<Bug> {
        let body = as_object(body)?;
        let title = required_text(body, "title", messages::TITLE_REQUIRED)?;
        let description = optional_description(body)?.unwrap_or_default();
        let status = body
            .get("status")
            .ok_or_else(|| StoreError::Validation(messages::STATUS_REQUIRED.into()))
            .and_then(parse_status)?;
        let priority = body
            .get("priority")
            .ok_or_else(|| StoreError::Validation(messages::PRIORITY_REQUIRED.into()))
            .and_then(parse_priority)?;

        self.next_bug_id += 1;
        let created_at = now();
        let bug = Bug {
            id: self.next_bug_id,
            title,
            description,
            status,
            priority,
            updated_at: created_at.clone(),
            created_at,
        };
        self.bugs.insert(bug.id, bug.clone());
        Ok(bug)
    }

    pub fn list_bugs(&self) -> Vec<Bug> {
        self.bugs.values().cloned().collect()
    }

    pub fn get_bug(&self, id: i64) -> StoreResult<Bug> {
        self.bugs.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    /// Apply a partial update. Fields absent from `body` are left alone.
    pub fn update_bug(&mut self, id: i64, body: &Value) -> StoreResult<Bug> {
        if !self.bugs.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        let body = as_object(body)?;

        let title = match body.get("title") {
            None => None,
            Some(_) => Some(required_text(body, "title", messages::TITLE_REQUIRED)?),
        };
        let description = optional_description(body)?;
        let status = body.get("status").map(parse_status).transpose()?;
        let priority = body.get("priority").map(parse_priority).transpose()?;

        let bug = self.bugs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(title) = title {
            bug.title = title;
        }
        if let Some(description) = description {
            bug.description = description;
        }
        if let Some(status) = status {
            bug.status = status;
        }
        if let Some(priority) = priority {
            bug.priority = priority;
        }
        bug.updated_at = now();
        Ok(bug.clone())
    }

    /// Remove a bug together with its comments.
    pub fn delete_bug(&mut self, id: i64) -> StoreResult<()> {
        self.bugs.remove(&id).ok_or(StoreError::NotFound(id))?;
        self.comments.retain(|_, comment| comment.bug_id != id);
        Ok(())
    }

    pub fn delete_all(&mut self) {
        self.bugs.clear();
        self.comments.clear();
    }

    pub fn list_comments(&self, bug_id: i64) -> StoreResult<Vec<Comment>> {
        if !self.bugs.contains_key(&bug_id) {
            return Err(StoreError::NotFound(bug_id));
        }
        Ok(self
            .comments
            .values()
            .filter(|comment| comment.bug_id == bug_id)
            .cloned()
            .collect())
    }

    pub fn create_comment(&mut self, bug_id: i64, body: &Value) -> StoreResult<Comment> {
        if !self.bugs.contains_key(&bug_id) {
            return Err(StoreError::NotFound(bug_id));
        }
        let body = as_object(body)?;
        let text = required_text(body, "text", messages::TEXT_REQUIRED)?;
        let author = required_text(body, "author", messages::AUTHOR_REQUIRED)?;

        self.next_comment_id += 1;
        let comment = Comment {
            id: self.next_comment_id,
            bug_id,
            text,
            author,
            created_at: now(),
        };
        self.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    /// Number of stored comments across all bugs.
    pub fn comment_total(&self) -> usize {
        self.comments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn valid_bug() -> Value {
        json!({
            "title": "X",
            "description": "Y",
            "status": "Open",
            "priority": "High",
        })
    }

    #[test]
    fn create_assigns_positive_ids_and_timestamps() {
        let mut store = BugStore::new();
        let first = store.create_bug(&valid_bug()).unwrap();
        let second = store.create_bug(&valid_bug()).unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.status, Status::Open);
        assert_eq!(first.priority, Priority::High);
        assert!(!first.created_at.is_empty());
        assert_eq!(first.created_at, first.updated_at);
        assert_eq!(store.get_bug(first.id).unwrap(), first);
    }

    #[test_case(json!({"description": "d", "status": "Open", "priority": "Low"}), messages::TITLE_REQUIRED)]
    #[test_case(json!({"title": "", "status": "Open", "priority": "Low"}), messages::TITLE_REQUIRED)]
    #[test_case(json!({"title": "   ", "status": "Open", "priority": "Low"}), messages::TITLE_REQUIRED)]
    #[test_case(json!({"title": "t", "status": "InvalidStatus", "priority": "Low"}), messages::INVALID_STATUS)]
    #[test_case(json!({"title": "t", "status": "Open", "priority": "Critical"}), messages::INVALID_PRIORITY)]
    #[test_case(json!({"title": "t", "priority": "Low"}), messages::STATUS_REQUIRED)]
    #[test_case(json!({"title": "t", "status": "Open"}), messages::PRIORITY_REQUIRED)]
    fn invalid_payloads_are_rejected_without_a_record(body: Value, message: &str) {
        let mut store = BugStore::new();
        let err = store.create_bug(&body).unwrap_err();

        assert_eq!(err, StoreError::Validation(message.to_string()));
        assert!(store.list_bugs().is_empty());
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let mut store = BugStore::new();
        let bug = store.create_bug(&valid_bug()).unwrap();
        let updated = store
            .update_bug(bug.id, &json!({ "status": "Resolved" }))
            .unwrap();

        assert_eq!(updated.status, Status::Resolved);
        assert_eq!(updated.title, bug.title);
        assert_eq!(updated.description, bug.description);
        assert_eq!(updated.priority, bug.priority);
        assert_eq!(updated.created_at, bug.created_at);
    }

    #[test]
    fn update_rejects_empty_title_and_leaves_bug_untouched() {
        let mut store = BugStore::new();
        let bug = store.create_bug(&valid_bug()).unwrap();
        let err = store
            .update_bug(bug.id, &json!({ "title": "", "status": "Resolved" }))
            .unwrap_err();

        assert_eq!(err, StoreError::Validation(messages::TITLE_REQUIRED.into()));
        assert_eq!(store.get_bug(bug.id).unwrap(), bug);
    }

    #[test]
    fn missing_bug_is_not_found() {
        let mut store = BugStore::new();
        assert_eq!(store.get_bug(999_999), Err(StoreError::NotFound(999_999)));
        assert_eq!(
            store.update_bug(999_999, &json!({ "title": "Updated" })),
            Err(StoreError::NotFound(999_999))
        );
        assert_eq!(store.delete_bug(999_999), Err(StoreError::NotFound(999_999)));
        assert_eq!(store.list_comments(999_999), Err(StoreError::NotFound(999_999)));
    }

    #[test]
    fn deleting_a_bug_cascades_to_its_comments() {
        let mut store = BugStore::new();
        let doomed = store.create_bug(&valid_bug()).unwrap();
        let kept = store.create_bug(&valid_bug()).unwrap();
        let comment = json!({ "text": "repro", "author": "QA" });
        store.create_comment(doomed.id, &comment).unwrap();
        store.create_comment(doomed.id, &comment).unwrap();
        store.create_comment(kept.id, &comment).unwrap();

        store.delete_bug(doomed.id).unwrap();

        assert_eq!(store.comment_total(), 1);
        assert_eq!(store.list_comments(kept.id).unwrap().len(), 1);
    }

    #[test]
    fn comments_reference_their_bug() {
        let mut store = BugStore::new();
        let bug = store.create_bug(&valid_bug()).unwrap();
        let comment = store
            .create_comment(bug.id, &json!({ "text": "first", "author": "QA" }))
            .unwrap();

        assert_eq!(comment.bug_id, bug.id);
        assert!(comment.id > 0);
        assert_eq!(
            store.create_comment(bug.id, &json!({ "text": "", "author": "QA" })),
            Err(StoreError::Validation(messages::TEXT_REQUIRED.into()))
        );
        assert_eq!(
            store.create_comment(bug.id, &json!({ "text": "no author" })),
            Err(StoreError::Validation(messages::AUTHOR_REQUIRED.into()))
        );
    }

    #[test_case("invalid")]
    #[test_case("0")]
    #[test_case("-4")]
    #[test_case("1.5")]
    fn malformed_ids_are_rejected(raw: &str) {
        assert_eq!(parse_bug_id(raw), Err(StoreError::InvalidId(raw.to_string())));
    }
}
