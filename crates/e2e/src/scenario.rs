//! Registered test cases and the hooks that surround them

use std::path::Path;

use async_trait::async_trait;
use futures::future::BoxFuture;
use regex::Regex;

use crate::error::E2eResult;

/// Body of a scenario, borrowing its per-attempt context.
pub type ScenarioFn<C> = for<'a> fn(&'a C) -> BoxFuture<'a, E2eResult<()>>;

/// One test case
pub struct Scenario<C> {
    /// Stable identifier, e.g. `TC-API-014`
    pub id: &'static str,
    /// Grouping used in reports
    pub group: &'static str,
    pub title: &'static str,
    /// Runs with no other scenario in flight
    pub exclusive: bool,
    pub run: ScenarioFn<C>,
}

impl<C> Scenario<C> {
    pub fn new(
        id: &'static str,
        group: &'static str,
        title: &'static str,
        run: ScenarioFn<C>,
    ) -> Self {
        Self {
            id,
            group,
            title,
            exclusive: false,
            run,
        }
    }

    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// `TC-API-001: Should return healthy status`
    pub fn full_name(&self) -> String {
        format!("{}: {}", self.id, self.title)
    }

    /// Match `grep` against the id, title and group.
    pub fn matches(&self, grep: &Regex) -> bool {
        grep.is_match(&self.full_name()) || grep.is_match(self.group)
    }
}

impl<C> Clone for Scenario<C> {
    fn clone(&self) -> Self {
        Self { ..*self }
    }
}

impl<C> std::fmt::Debug for Scenario<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("id", &self.id)
            .field("group", &self.group)
            .field("title", &self.title)
            .field("exclusive", &self.exclusive)
            .finish()
    }
}

/// Register an `async fn(&Ctx) -> E2eResult<()>` as a scenario.
#[macro_export]
macro_rules! scenario {
    ($id:literal, $group:literal, $title:literal, $body:path) => {
        $crate::scenario::Scenario::new($id, $group, $title, |ctx| Box::pin($body(ctx)))
    };
}

/// A family of scenarios sharing one kind of context.
///
/// Each attempt gets a fresh context from [`Suite::setup`], handed back to
/// [`Suite::teardown`] whatever the outcome.
#[async_trait]
pub trait Suite: Send + Sync {
    type Context: Send + Sync;

    /// Project name shown in reports
    fn name(&self) -> &str;

    fn scenarios(&self) -> Vec<Scenario<Self::Context>>;

    async fn setup(&self) -> E2eResult<Self::Context>;

    /// Release whatever the attempt created. Errors are logged, never fatal.
    async fn teardown(&self, ctx: Self::Context) -> E2eResult<()>;

    /// Save failure evidence to `path`; returns whether anything was written.
    async fn capture_failure(&self, _ctx: &Self::Context, _path: &Path) -> E2eResult<bool> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop(_: &()) -> E2eResult<()> {
        Ok(())
    }

    #[test]
    fn registered_scenarios_match_by_id_title_or_group() {
        let scenario: Scenario<()> =
            crate::scenario!("TC-API-001", "Health Check", "Should return healthy status", noop);

        assert_eq!(scenario.full_name(), "TC-API-001: Should return healthy status");
        assert!(scenario.matches(&Regex::new("TC-API-00[0-9]").unwrap()));
        assert!(scenario.matches(&Regex::new("(?i)health check").unwrap()));
        assert!(!scenario.matches(&Regex::new("TC-UI").unwrap()));
        assert!(!scenario.exclusive);
        assert!(scenario.clone().exclusive().exclusive);
    }

    #[tokio::test]
    async fn scenario_body_runs_against_context() {
        let scenario: Scenario<()> = crate::scenario!("T-1", "g", "t", noop);
        (scenario.run)(&()).await.unwrap();
    }
}
