//! Playwright browser automation
//!
//! A [`PlaywrightSession`] owns one `node` child process running the bundled
//! bridge script. The bridge keeps a single browser page alive and executes
//! one JSON command per stdin line, answering on stdout, so page state
//! survives between calls the way a test expects.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{E2eConfig, Project};
use crate::error::{E2eError, E2eResult};
use crate::page::{LoadState, Locator, PageDriver, WaitState};

const BRIDGE_SCRIPT: &str = include_str!("../assets/playwright_bridge.js");

/// Extra time granted on top of an operation's own timeout before the
/// bridge is considered hung.
const REPLY_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const DESKTOP: Viewport = Viewport { width: 1280, height: 720 };
    pub const TABLET: Viewport = Viewport { width: 768, height: 1024 };
    pub const MOBILE: Viewport = Viewport { width: 375, height: 667 };
}

/// Configuration for one browser session
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub base_url: String,
    pub browser: Browser,
    pub headless: bool,
    pub viewport: Viewport,
    pub is_mobile: bool,
    pub action_timeout: Duration,
    pub navigation_timeout: Duration,
    /// `node` executable
    pub node_binary: PathBuf,
    /// Module search path exported as `NODE_PATH`; see [`node_search_path`]
    pub node_path: Option<OsString>,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            base_url: crate::config::DEFAULT_UI_BASE_URL.to_string(),
            browser: Browser::Chromium,
            headless: true,
            viewport: Viewport::DESKTOP,
            is_mobile: false,
            action_timeout: Duration::from_secs(10),
            navigation_timeout: Duration::from_secs(30),
            node_binary: PathBuf::from("node"),
            node_path: node_search_path(
                std::env::current_dir().ok().as_deref(),
                std::env::var_os("NODE_PATH"),
            ),
        }
    }
}

impl PlaywrightConfig {
    pub fn for_project(config: &E2eConfig, project: &Project) -> Self {
        Self {
            base_url: config.ui_base_url.clone(),
            browser: project.browser.unwrap_or_default(),
            headless: config.headless,
            viewport: project.viewport.unwrap_or(Viewport::DESKTOP),
            is_mobile: project.is_mobile,
            action_timeout: config.action_timeout(),
            navigation_timeout: config.navigation_timeout(),
            ..Default::default()
        }
    }

    fn bridge_env(&self) -> Value {
        serde_json::json!({
            "browser": self.browser.as_str(),
            "headless": self.headless,
            "viewport": self.viewport,
            "is_mobile": self.is_mobile,
            "action_timeout_ms": self.action_timeout.as_millis() as u64,
            "navigation_timeout_ms": self.navigation_timeout.as_millis() as u64,
        })
    }
}

/// `NODE_PATH` for the bridge.
///
/// The bridge script runs from a temp dir, so node would never look in the
/// project's `node_modules`. That directory goes first, followed by any
/// entries already in `NODE_PATH`.
pub fn node_search_path(project_dir: Option<&Path>, inherited: Option<OsString>) -> Option<OsString> {
    let mut entries: Vec<PathBuf> = project_dir
        .map(|dir| dir.join("node_modules"))
        .into_iter()
        .collect();
    if let Some(inherited) = &inherited {
        entries.extend(std::env::split_paths(inherited).filter(|p| !p.as_os_str().is_empty()));
    }
    if entries.is_empty() {
        return None;
    }
    std::env::join_paths(entries).ok().or(inherited)
}

/// Join a page path onto the UI base URL.
pub fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// One bridge command
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum BridgeCommand<'a> {
    Goto { url: String },
    WaitForLoadState { state: LoadState },
    WaitFor { locator: &'a Locator, state: WaitState, timeout: u64 },
    Click { locator: &'a Locator },
    Fill { locator: &'a Locator, value: &'a str },
    SelectOption { locator: &'a Locator, value: &'a str },
    IsVisible { locator: &'a Locator },
    Count { locator: &'a Locator },
    AllTextContents { locator: &'a Locator },
    TextContent { locator: &'a Locator },
    InputValue { locator: &'a Locator },
    Title,
    Url,
    SetViewport { width: u32, height: u32 },
    WaitTimeout { ms: u64 },
    Screenshot { path: String },
    Close,
}

impl BridgeCommand<'_> {
    fn name(&self) -> String {
        match self {
            BridgeCommand::Goto { url } => format!("goto:{}", url),
            BridgeCommand::WaitForLoadState { state } => format!("load_state:{:?}", state),
            BridgeCommand::WaitFor { locator, state, .. } => format!("wait:{:?}:{}", state, locator),
            BridgeCommand::Click { locator } => format!("click:{}", locator),
            BridgeCommand::Fill { locator, .. } => format!("fill:{}", locator),
            BridgeCommand::SelectOption { locator, .. } => format!("select:{}", locator),
            BridgeCommand::IsVisible { locator } => format!("is_visible:{}", locator),
            BridgeCommand::Count { locator } => format!("count:{}", locator),
            BridgeCommand::AllTextContents { locator } => format!("texts:{}", locator),
            BridgeCommand::TextContent { locator } => format!("text:{}", locator),
            BridgeCommand::InputValue { locator } => format!("value:{}", locator),
            BridgeCommand::Title => "title".to_string(),
            BridgeCommand::Url => "url".to_string(),
            BridgeCommand::SetViewport { width, height } => format!("viewport:{}x{}", width, height),
            BridgeCommand::WaitTimeout { ms } => format!("sleep:{}ms", ms),
            BridgeCommand::Screenshot { path } => format!("screenshot:{}", path),
            BridgeCommand::Close => "close".to_string(),
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a BridgeCommand<'a>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BridgeReply {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    timeout: bool,
    #[serde(default)]
    ready: Option<bool>,
}

impl BridgeReply {
    /// Parse a stdout line; `None` for anything that is not a reply (stray logs).
    pub(crate) fn parse(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }

    fn into_result(self, what: &str) -> E2eResult<Value> {
        if self.ok {
            return Ok(self.value);
        }
        let error = self.error.unwrap_or_else(|| "unknown bridge error".to_string());
        if self.timeout {
            Err(E2eError::Timeout(format!("{} ({})", what, error)))
        } else {
            Err(E2eError::Playwright(format!("{}: {}", what, error)))
        }
    }
}

struct BridgeIo {
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

/// A live browser page behind the bridge process
pub struct PlaywrightSession {
    config: PlaywrightConfig,
    io: Mutex<BridgeIo>,
    child: Mutex<Child>,
    next_id: AtomicU64,
    _script_dir: tempfile::TempDir,
}

impl PlaywrightSession {
    /// Verify node resolves the `playwright` module the way the bridge will
    pub async fn check_installed(config: &PlaywrightConfig) -> E2eResult<()> {
        let mut cmd = TokioCommand::new(&config.node_binary);
        cmd.args(["-e", "require.resolve('playwright')"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(node_path) = &config.node_path {
            cmd.env("NODE_PATH", node_path);
        }

        match cmd.status().await {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => {
                debug!("playwright module not resolvable ({})", status);
                Err(E2eError::PlaywrightNotFound)
            }
            Err(e) => {
                debug!("could not run {}: {}", config.node_binary.display(), e);
                Err(E2eError::PlaywrightNotFound)
            }
        }
    }

    /// Start node with the bridge and wait for the browser to come up.
    pub async fn launch(config: PlaywrightConfig) -> E2eResult<Self> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;

        debug!(
            "Launching {} via {}",
            config.browser.as_str(),
            script_path.display()
        );

        let mut cmd = TokioCommand::new(&config.node_binary);
        cmd.arg(&script_path)
            .env("BUGTRACK_PW_CONFIG", config.bridge_env().to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(node_path) = &config.node_path {
            cmd.env("NODE_PATH", node_path);
        }

        let mut child = cmd.spawn().map_err(|e| {
            E2eError::Playwright(format!(
                "failed to spawn {}: {}",
                config.node_binary.display(),
                e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Protocol("bridge stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Protocol("bridge stdout unavailable".into()))?;
        let mut lines = BufReader::new(stdout).lines();

        let startup = config.navigation_timeout + REPLY_GRACE;
        let ready = tokio::time::timeout(startup, async {
            while let Some(line) = lines.next_line().await? {
                match BridgeReply::parse(&line) {
                    Some(BridgeReply { ready: Some(true), .. }) => return Ok(()),
                    Some(BridgeReply { ready: Some(false), error, .. }) => {
                        return Err(E2eError::Playwright(
                            error.unwrap_or_else(|| "browser launch failed".into()),
                        ))
                    }
                    _ => debug!("[bridge] {}", line),
                }
            }
            Err(E2eError::Protocol("bridge exited before becoming ready".into()))
        })
        .await
        .map_err(|_| E2eError::Timeout("browser launch".into()))?;
        ready?;

        info!(
            "{} ready ({}x{})",
            config.browser.as_str(),
            config.viewport.width,
            config.viewport.height
        );

        Ok(Self {
            config,
            io: Mutex::new(BridgeIo { stdin, lines }),
            child: Mutex::new(child),
            next_id: AtomicU64::new(1),
            _script_dir: script_dir,
        })
    }

    pub fn config(&self) -> &PlaywrightConfig {
        &self.config
    }

    async fn request(&self, command: BridgeCommand<'_>, budget: Duration) -> E2eResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let what = command.name();
        let mut line = serde_json::to_string(&Envelope { id, command: &command })?;
        line.push('\n');

        debug!("bridge #{} {}", id, what);

        let mut io = self.io.lock().await;
        io.stdin.write_all(line.as_bytes()).await?;
        io.stdin.flush().await?;

        let reply = tokio::time::timeout(budget + REPLY_GRACE, async {
            while let Some(line) = io.lines.next_line().await? {
                match BridgeReply::parse(&line) {
                    Some(reply) if reply.id == Some(id) => return Ok(reply),
                    Some(reply) => warn!("bridge reply for unexpected id {:?}", reply.id),
                    None => debug!("[bridge] {}", line),
                }
            }
            Err(E2eError::Protocol(format!("bridge exited during {}", what)))
        })
        .await
        .map_err(|_| E2eError::Protocol(format!("no bridge reply for {}", what)))??;

        reply.into_result(&what)
    }

    fn action_budget(&self) -> Duration {
        self.config.action_timeout
    }
}

fn as_bool(value: Value) -> E2eResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| E2eError::Protocol(format!("expected boolean, got {}", value)))
}

fn as_string(value: Value) -> E2eResult<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(E2eError::Protocol(format!("expected string, got {}", other))),
    }
}

#[async_trait]
impl PageDriver for PlaywrightSession {
    async fn goto(&self, path: &str) -> E2eResult<()> {
        let url = join_url(&self.config.base_url, path);
        self.request(BridgeCommand::Goto { url }, self.config.navigation_timeout)
            .await?;
        Ok(())
    }

    async fn wait_for_load_state(&self, state: LoadState) -> E2eResult<()> {
        self.request(
            BridgeCommand::WaitForLoadState { state },
            self.config.navigation_timeout,
        )
        .await?;
        Ok(())
    }

    async fn wait_for(&self, locator: &Locator, state: WaitState, timeout: Duration) -> E2eResult<()> {
        self.request(
            BridgeCommand::WaitFor {
                locator,
                state,
                timeout: timeout.as_millis() as u64,
            },
            timeout,
        )
        .await?;
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> E2eResult<()> {
        self.request(BridgeCommand::Click { locator }, self.action_budget())
            .await?;
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> E2eResult<()> {
        self.request(BridgeCommand::Fill { locator, value }, self.action_budget())
            .await?;
        Ok(())
    }

    async fn select_option(&self, locator: &Locator, value: &str) -> E2eResult<()> {
        self.request(
            BridgeCommand::SelectOption { locator, value },
            self.action_budget(),
        )
        .await?;
        Ok(())
    }

    async fn is_visible(&self, locator: &Locator) -> E2eResult<bool> {
        let value = self
            .request(BridgeCommand::IsVisible { locator }, self.action_budget())
            .await?;
        as_bool(value)
    }

    async fn count(&self, locator: &Locator) -> E2eResult<usize> {
        let value = self
            .request(BridgeCommand::Count { locator }, self.action_budget())
            .await?;
        value
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| E2eError::Protocol(format!("expected count, got {}", value)))
    }

    async fn all_text_contents(&self, locator: &Locator) -> E2eResult<Vec<String>> {
        let value = self
            .request(BridgeCommand::AllTextContents { locator }, self.action_budget())
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn text_content(&self, locator: &Locator) -> E2eResult<Option<String>> {
        let value = self
            .request(BridgeCommand::TextContent { locator }, self.action_budget())
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn input_value(&self, locator: &Locator) -> E2eResult<String> {
        let value = self
            .request(BridgeCommand::InputValue { locator }, self.action_budget())
            .await?;
        as_string(value)
    }

    async fn title(&self) -> E2eResult<String> {
        let value = self.request(BridgeCommand::Title, self.action_budget()).await?;
        as_string(value)
    }

    async fn url(&self) -> E2eResult<String> {
        let value = self.request(BridgeCommand::Url, self.action_budget()).await?;
        as_string(value)
    }

    async fn set_viewport(&self, viewport: Viewport) -> E2eResult<()> {
        self.request(
            BridgeCommand::SetViewport {
                width: viewport.width,
                height: viewport.height,
            },
            self.action_budget(),
        )
        .await?;
        Ok(())
    }

    async fn wait_timeout(&self, duration: Duration) -> E2eResult<()> {
        self.request(
            BridgeCommand::WaitTimeout {
                ms: duration.as_millis() as u64,
            },
            duration,
        )
        .await?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> E2eResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.request(
            BridgeCommand::Screenshot {
                path: path.to_string_lossy().to_string(),
            },
            self.action_budget(),
        )
        .await?;
        Ok(())
    }

    async fn close(&self) -> E2eResult<()> {
        let closed = self.request(BridgeCommand::Close, self.action_budget()).await;
        let mut child = self.child.lock().await;
        match tokio::time::timeout(REPLY_GRACE, child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                warn!("bridge did not exit, killing it");
                child.kill().await?;
            }
        }
        closed.map(|_| ())
    }
}
