//! Dev server management - launching (or reusing) the application under test

use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};

/// Handle to a dev server process started by the suite
pub struct ServerHandle {
    child: Child,
    pub url: String,
}

impl ServerHandle {
    /// Make sure `config.url` is serving.
    ///
    /// Returns `None` when an already running server is reused, otherwise the
    /// handle of the process that was started.
    pub async fn ensure(config: &WebServerConfig) -> E2eResult<Option<Self>> {
        if config.reuse_existing && is_healthy(&config.url).await {
            info!("Reusing running server at {}", config.url);
            return Ok(None);
        }

        info!("Starting dev server: {}", config.command);

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&config.command);
        if let Some(dir) = &config.cwd {
            cmd.current_dir(dir);
        }
        cmd.stdout(Stdio::null()).stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            E2eError::ServerStartup(format!("Failed to spawn `{}`: {}", config.command, e))
        })?;
        if let Some(stderr) = child.stderr.take() {
            forward_stderr(stderr);
        }

        let mut handle = ServerHandle {
            child,
            url: config.url.clone(),
        };

        if let Err(e) = handle.wait_for_healthy(config.timeout()).await {
            handle.stop()?;
            return Err(e);
        }

        info!("Server is healthy at {}", handle.url);
        Ok(Some(handle))
    }

    /// Wait for the server to respond with a success status
    async fn wait_for_healthy(&mut self, timeout_duration: Duration) -> E2eResult<()> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        while start.elapsed() < timeout_duration {
            attempts += 1;

            if let Some(status) = self.child.try_wait()? {
                return Err(E2eError::ServerStartup(format!(
                    "dev server exited early with {}",
                    status
                )));
            }

            match client.get(&self.url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("Health check returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for server to start...");
                    }
                    // Connection refused is expected while server is starting
                    if !e.is_connect() {
                        warn!("Health check error: {}", e);
                    }
                }
            }

            sleep(Duration::from_millis(250)).await;
        }

        Err(E2eError::ServerHealthCheck(attempts))
    }

    /// Stop the server
    pub fn stop(&mut self) -> E2eResult<()> {
        info!("Stopping dev server (pid: {})", self.child.id());

        // Try graceful shutdown first
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                // Give it a moment to shut down gracefully
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        // Force kill if still running
        let _ = self.child.kill();
        let _ = self.child.wait();

        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Keep reading the server's stderr so a chatty process never blocks on a
/// full pipe. Lines go to the debug log.
fn forward_stderr(stderr: ChildStderr) {
    std::thread::spawn(move || {
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            debug!(target: "dev_server", "{}", line);
        }
    });
}

/// Returns true if `url` answers with a 2xx status within two seconds.
pub async fn is_healthy(url: &str) -> bool {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
    {
        Ok(client) => client,
        Err(_) => return false,
    };
    matches!(client.get(url).send().await, Ok(resp) if resp.status().is_success())
}

/// How to launch the application under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebServerConfig {
    /// Shell command that starts the server
    pub command: String,

    /// URL polled until it answers 2xx
    pub url: String,

    /// Use an already running server instead of starting one
    #[serde(default = "default_reuse_existing")]
    pub reuse_existing: bool,

    /// Startup timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Working directory for the command
    #[serde(default)]
    pub cwd: Option<std::path::PathBuf>,
}

fn default_reuse_existing() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    120
}

impl WebServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
