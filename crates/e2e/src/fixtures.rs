//! Test data: canned bugs and comments, deliberately broken payloads, and
//! generators that hand out unique titles so concurrent tests never collide.

use std::sync::atomic::{AtomicU64, Ordering};

use bugtrack_common::{BugData, BugPatch, CommentData, Priority, Status};
use chrono::Utc;
use serde_json::{json, Value};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Millisecond timestamp plus a process-wide counter.
///
/// The counter keeps two calls inside the same millisecond distinct.
pub fn unique_suffix() -> String {
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", Utc::now().timestamp_millis(), seq)
}

/// Realistic bugs covering every status and priority.
pub fn valid_bugs() -> Vec<BugData> {
    vec![
        BugData {
            title: "Login button not responding on mobile".into(),
            description: "When users click the login button on mobile devices, nothing happens. This issue affects both iOS and Android users.".into(),
            status: Status::Open,
            priority: Priority::High,
        },
        BugData {
            title: "Database connection timeout".into(),
            description: "Database queries are timing out after 5 seconds, causing performance issues.".into(),
            status: Status::InProgress,
            priority: Priority::High,
        },
        BugData {
            title: "Minor UI alignment issue in dashboard".into(),
            description: "The dashboard widgets are slightly misaligned on screens smaller than 1024px.".into(),
            status: Status::Open,
            priority: Priority::Low,
        },
        BugData {
            title: "Email notifications not being sent".into(),
            description: "Users report not receiving email notifications for bug updates.".into(),
            status: Status::Resolved,
            priority: Priority::Medium,
        },
        BugData {
            title: "Search functionality returns incorrect results".into(),
            description: "When searching for bugs by title, the results include irrelevant bugs.".into(),
            status: Status::InProgress,
            priority: Priority::Medium,
        },
    ]
}

/// Payloads the API must reject. Raw JSON, since several of them cannot be
/// expressed with the typed model.
#[derive(Debug, Clone)]
pub struct InvalidBugs {
    pub missing_title: Value,
    pub empty_title: Value,
    pub invalid_status: Value,
    pub invalid_priority: Value,
    pub missing_status: Value,
    pub missing_priority: Value,
}

pub fn invalid_bugs() -> InvalidBugs {
    InvalidBugs {
        missing_title: json!({
            "description": "This bug has no title",
            "status": "Open",
            "priority": "Medium",
        }),
        empty_title: json!({
            "title": "",
            "description": "This bug has an empty title",
            "status": "Open",
            "priority": "High",
        }),
        invalid_status: json!({
            "title": "Bug with invalid status",
            "description": "Testing invalid status value",
            "status": "InvalidStatus",
            "priority": "Low",
        }),
        invalid_priority: json!({
            "title": "Bug with invalid priority",
            "description": "Testing invalid priority value",
            "status": "Open",
            "priority": "Critical",
        }),
        missing_status: json!({
            "title": "Bug without status",
            "description": "Testing missing status field",
            "priority": "Medium",
        }),
        missing_priority: json!({
            "title": "Bug without priority",
            "description": "Testing missing priority field",
            "status": "Open",
        }),
    }
}

pub fn valid_comments() -> Vec<CommentData> {
    [
        ("I can reproduce this issue on my device as well.", "John Doe"),
        ("Working on a fix for this. Should be ready by EOD.", "Jane Smith"),
        ("This is a duplicate of bug #123.", "Alice Johnson"),
        ("Fixed in the latest release. Closing this bug.", "Bob Wilson"),
    ]
    .into_iter()
    .map(|(text, author)| CommentData {
        text: text.into(),
        author: author.into(),
    })
    .collect()
}

#[derive(Debug, Clone)]
pub struct InvalidComments {
    pub missing_text: Value,
    pub empty_text: Value,
    pub missing_author: Value,
}

pub fn invalid_comments() -> InvalidComments {
    InvalidComments {
        missing_text: json!({ "author": "Test User" }),
        empty_text: json!({ "text": "", "author": "Test User" }),
        missing_author: json!({ "text": "Comment without author" }),
    }
}

/// A valid bug with a unique title, `Open` and `Medium`.
pub fn unique_bug() -> BugData {
    unique_bug_with(BugPatch::default())
}

/// [`unique_bug`] with the fields of `overrides` applied on top.
pub fn unique_bug_with(overrides: BugPatch) -> BugData {
    BugData {
        title: format!("Test Bug {}", unique_suffix()),
        description: format!(
            "This is an automated test bug created at {}",
            Utc::now().to_rfc3339()
        ),
        status: Status::Open,
        priority: Priority::Medium,
    }
    .with_patch(&overrides)
}

pub fn unique_comment() -> CommentData {
    unique_comment_with(None, None)
}

/// A unique comment with `text` and `author` replaced where given.
pub fn unique_comment_with(text: Option<String>, author: Option<String>) -> CommentData {
    CommentData {
        text: text.unwrap_or_else(|| format!("Test comment created at {}", unique_suffix())),
        author: author.unwrap_or_else(|| "Automated Test".into()),
    }
}

/// [`unique_comment`] with a fixed text.
pub fn unique_comment_with_text(text: impl Into<String>) -> CommentData {
    unique_comment_with(Some(text.into()), None)
}

/// `count` unique bugs cycling through every status and priority.
pub fn multiple_bugs(count: usize) -> Vec<BugData> {
    let suffix = unique_suffix();
    (0..count)
        .map(|index| BugData {
            title: format!("Test Bug {}_{}", suffix, index),
            description: format!("Automated test bug number {}", index + 1),
            status: Status::ALL[index % Status::ALL.len()],
            priority: Priority::ALL[index % Priority::ALL.len()],
        })
        .collect()
}

/// Payloads at the edges of what a title or description may hold
#[derive(Debug, Clone)]
pub struct EdgeCases {
    pub long_title: BugData,
    pub long_description: BugData,
    pub special_characters_title: BugData,
    pub unicode_characters: BugData,
}

pub fn edge_cases() -> EdgeCases {
    EdgeCases {
        long_title: BugData {
            title: "A".repeat(500),
            description: "Testing with extremely long title".into(),
            status: Status::Open,
            priority: Priority::Low,
        },
        long_description: BugData {
            title: "Bug with long description".into(),
            description: "B".repeat(5000),
            status: Status::Open,
            priority: Priority::Medium,
        },
        special_characters_title: BugData {
            title: r#"Bug with special chars: <script>alert("XSS")</script> & é â ñ"#.into(),
            description: "Testing special character handling".into(),
            status: Status::Open,
            priority: Priority::High,
        },
        unicode_characters: BugData {
            title: "测试 Bug テスト 🐛".into(),
            description: "Testing Unicode and emoji support".into(),
            status: Status::Open,
            priority: Priority::Low,
        },
    }
}

/// Error messages the API is expected to return.
pub mod expected_errors {
    pub use bugtrack_common::messages::{
        BUG_NOT_FOUND, INVALID_BUG_ID, INVALID_PRIORITY, INVALID_STATUS, TITLE_REQUIRED,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn unique_bugs_never_repeat_a_title() {
        let titles: HashSet<String> = (0..1_000).map(|_| unique_bug().title).collect();
        assert_eq!(titles.len(), 1_000);
    }

    #[test]
    fn overrides_replace_only_the_given_fields() {
        let bug = unique_bug_with(BugPatch {
            status: Some(Status::Resolved),
            priority: Some(Priority::High),
            ..Default::default()
        });

        assert!(bug.title.starts_with("Test Bug "));
        assert_eq!(bug.status, Status::Resolved);
        assert_eq!(bug.priority, Priority::High);

        let defaults = unique_bug();
        assert_eq!(defaults.status, Status::Open);
        assert_eq!(defaults.priority, Priority::Medium);
    }

    #[test]
    fn comment_overrides_keep_the_other_field() {
        let by_reviewer = unique_comment_with(None, Some("Reviewer".into()));
        assert_eq!(by_reviewer.author, "Reviewer");
        assert!(by_reviewer.text.starts_with("Test comment created at "));

        let fixed = unique_comment_with_text("First comment");
        assert_eq!(fixed.text, "First comment");
        assert_eq!(fixed.author, "Automated Test");

        let both = unique_comment_with(Some("Looks fixed".into()), Some("QA".into()));
        assert_eq!((both.text.as_str(), both.author.as_str()), ("Looks fixed", "QA"));

        assert_ne!(unique_comment().text, unique_comment().text);
    }

    #[test]
    fn multiple_bugs_cycle_through_enumerations() {
        let bugs = multiple_bugs(4);
        let statuses: Vec<_> = bugs.iter().map(|b| b.status).collect();
        assert_eq!(
            statuses,
            vec![Status::Open, Status::InProgress, Status::Resolved, Status::Open]
        );
        assert_eq!(bugs[2].priority, Priority::High);
        assert_ne!(bugs[0].title, bugs[1].title);
    }

    #[test]
    fn invalid_payloads_break_exactly_one_rule() {
        let invalid = invalid_bugs();
        assert!(invalid.missing_title.get("title").is_none());
        assert_eq!(invalid.empty_title["title"], "");
        assert!(serde_json::from_value::<BugData>(invalid.invalid_status).is_err());
        assert!(serde_json::from_value::<BugData>(invalid.invalid_priority).is_err());
        assert!(invalid.missing_status.get("status").is_none());
        assert!(invalid.missing_priority.get("priority").is_none());
    }

    #[test]
    fn edge_cases_have_expected_sizes() {
        let edge = edge_cases();
        assert_eq!(edge.long_title.title.chars().count(), 500);
        assert_eq!(edge.long_description.description.len(), 5000);
        assert!(edge.unicode_characters.title.contains('🐛'));
        assert!(edge.special_characters_title.title.contains('"'));
    }
}
