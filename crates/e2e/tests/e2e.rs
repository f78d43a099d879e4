//! E2E test harness entry point
//!
//! Runs the API suite and one UI suite per browser project.
//! Run with: cargo test --package bugtrack-e2e --test e2e -- [OPTIONS]
//!
//! Without `API_BASE_URL`, `--api-url`, `--config` or `--live`, and with
//! nothing answering on the default API URL, the API suite runs against an
//! in-process stub backend. UI suites are skipped when the UI is unreachable
//! or Playwright is not installed.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use regex::Regex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bugtrack_e2e::playwright::PlaywrightConfig;
use bugtrack_e2e::runner::RunnerConfig;
use bugtrack_e2e::server::{is_healthy, ServerHandle};
use bugtrack_e2e::suites::{api, ui, ApiSuite, UiSuite};
use bugtrack_e2e::{BugApi, E2eConfig, PlaywrightSession, TestRunner};
use bugtrack_stub::StubServer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SuiteArg {
    All,
    Api,
    Ui,
}

#[derive(Parser, Debug)]
#[command(name = "bugtrack-e2e")]
#[command(about = "E2E test runner for the Bugtrack API and UI")]
#[command(ignore_errors = true)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "E2E_CONFIG")]
    config: Option<PathBuf>,

    /// Which suites to run
    #[arg(short, long, value_enum, default_value = "all")]
    suite: SuiteArg,

    /// Run only these projects (repeatable), e.g. "API Tests", chromium
    #[arg(short, long)]
    project: Vec<String>,

    /// Run only scenarios whose id, title or group matches this pattern
    #[arg(short, long)]
    grep: Option<String>,

    /// API base URL, overriding config and API_BASE_URL
    #[arg(long)]
    api_url: Option<String>,

    /// UI base URL, overriding config and UI_BASE_URL
    #[arg(long)]
    ui_url: Option<String>,

    /// Never fall back to the in-process stub backend
    #[arg(long)]
    live: bool,

    #[arg(short, long)]
    workers: Option<usize>,

    #[arg(short, long)]
    retries: Option<u32>,

    /// Output directory for results
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Print the registered scenarios and exit
    #[arg(long)]
    list: bool,
}

impl Args {
    fn apply(&self, config: &mut E2eConfig) {
        if let Some(url) = &self.api_url {
            config.api_base_url = url.clone();
        }
        if let Some(url) = &self.ui_url {
            config.ui_base_url = url.clone();
        }
        if self.workers.is_some() {
            config.workers = self.workers;
        }
        if self.retries.is_some() {
            config.retries = self.retries;
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if self.headed {
            config.headless = false;
        }
        config.retain_projects(&self.project);
    }

    /// Whether the API under test was chosen explicitly.
    fn explicit_target(&self) -> bool {
        self.live
            || self.api_url.is_some()
            || self.config.is_some()
            || std::env::var("API_BASE_URL").is_ok_and(|v| !v.trim().is_empty())
    }

    fn wants(&self, suite: SuiteArg) -> bool {
        self.suite == SuiteArg::All || self.suite == suite
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let code = match tokio::runtime::Runtime::new() {
        Ok(rt) => match rt.block_on(async_main(args)) {
            Ok(true) => 0,
            Ok(false) => 1,
            Err(e) => {
                error!("{:#}", e);
                2
            }
        },
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            2
        }
    };
    std::process::exit(code);
}

fn list_scenarios() {
    for scenario in api::scenarios() {
        println!("[API] {} ({})", scenario.full_name(), scenario.group);
    }
    for scenario in ui::scenarios() {
        println!("[UI]  {} ({})", scenario.full_name(), scenario.group);
    }
}

async fn async_main(args: Args) -> anyhow::Result<bool> {
    if args.list {
        list_scenarios();
        return Ok(true);
    }

    let mut config = E2eConfig::load(args.config.as_deref())?;
    args.apply(&mut config);

    let mut runner_config = RunnerConfig::from_config(&config);
    if let Some(pattern) = &args.grep {
        runner_config.grep = Some(Regex::new(pattern).context("invalid --grep pattern")?);
    }
    let runner = TestRunner::with_config(runner_config);

    // Keep the dev server alive for the whole run
    let _server = match &config.web_server {
        Some(web_server) => ServerHandle::ensure(web_server).await?,
        None => None,
    };

    let health_url = format!("{}/health", config.api_base_url.trim_end_matches('/'));
    let mut stub = None;
    let api_url = if args.explicit_target() || is_healthy(&health_url).await {
        config.api_base_url.clone()
    } else {
        let server = StubServer::spawn().await?;
        info!(
            "No API at {}, running against the in-process stub at {}",
            config.api_base_url,
            server.api_base_url()
        );
        let url = server.api_base_url();
        stub = Some(server);
        url
    };
    let api = BugApi::with_timeout(&api_url, config.action_timeout())?;

    let mut results = Vec::new();

    if args.wants(SuiteArg::Api) && config.api_project().is_some() {
        results.push(runner.run_suite(&ApiSuite::new(api.clone())).await);
    }

    if args.wants(SuiteArg::Ui) {
        let skip_reason = if !is_healthy(&config.ui_base_url).await {
            Some(format!("UI not reachable at {}", config.ui_base_url))
        } else if let Err(e) = PlaywrightSession::check_installed(&PlaywrightConfig::default()).await {
            Some(e.to_string())
        } else {
            None
        };

        // The stub is not the UI's backend; there is nothing to clean there
        let cleanup_api = if stub.is_none() { Some(api.clone()) } else { None };

        let projects: Vec<_> = config.browser_projects().cloned().collect();
        for project in projects {
            let suite = UiSuite::new(&config, project, cleanup_api.clone());
            let result = match &skip_reason {
                Some(reason) => runner.skip_suite(&suite, reason),
                None => runner.run_suite(&suite).await,
            };
            results.push(result);
        }
    }

    if results.is_empty() {
        warn!("No suites selected");
    }

    runner.write_results(&results)?;

    if let Some(stub) = stub {
        stub.shutdown().await;
    }

    Ok(results.iter().all(|r| r.success()))
}
