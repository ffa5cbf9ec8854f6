//! Native browser lifecycle management using `chromiumoxide`.
//!
//! This module is the single source of truth for:
//! * Finding a usable browser executable (env override → PATH → well-known paths).
//! * `BrowserSession` — one shared persistent browser instance per process,
//!   lazily launched, with a page opened per request.
//! * Launch configuration tuned for constrained/headless server environments,
//!   with exactly one minimal-config fallback attempt.
//! * `wait_until_quiet` network-idle polling used by the scrape driver.

use std::path::Path;
use std::time::Duration;

use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::core::config::chrome_executable_override;
use crate::core::error::FetchError;

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan — finds package-manager installs.
/// 3. Fixed well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Some(p) = chrome_executable_override() {
        return Some(p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = ["google-chrome", "chromium", "chromium-browser", "chrome"];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/chromium-browser",
        "/usr/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    ];
    for c in candidates {
        if Path::new(c).exists() {
            return Some(c.to_string());
        }
    }

    None
}

// ── Headless browser config builders ─────────────────────────────────────────

/// Build the primary headless `BrowserConfig`.
///
/// Flags chosen for compatibility with CI / container environments:
/// no sandbox, no GPU, single process, and `--disable-dev-shm-usage` to
/// avoid /dev/shm OOM on small instances.
fn build_primary_config(exe: Option<&str>) -> Result<BrowserConfig, String> {
    let mut builder = BrowserConfig::builder()
        .viewport(Viewport {
            width: 1280,
            height: 900,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(1280, 900)
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-accelerated-2d-canvas")
        .arg("--disable-gpu")
        .arg("--disable-software-rasterizer")
        .arg("--disable-extensions")
        .arg("--single-process");

    if let Some(exe) = exe {
        builder = builder.chrome_executable(exe);
    }

    builder.build()
}

/// Minimal config for the single fallback launch attempt: sandbox flags only.
/// An explicitly configured executable is honored here too; otherwise default
/// executable resolution applies.
fn build_fallback_config(exe: Option<&str>) -> Result<BrowserConfig, String> {
    let mut builder = BrowserConfig::builder()
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage");

    if let Some(exe) = exe {
        builder = builder.chrome_executable(exe);
    }

    builder.build()
}

async fn launch(config: BrowserConfig) -> Result<Browser, chromiumoxide::error::CdpError> {
    let (browser, mut handler) = Browser::launch(config).await?;
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("CDP handler error: {e}");
            }
        }
    });
    Ok(browser)
}

// ── Browser session ──────────────────────────────────────────────────────────

/// One shared, long-lived browser instance per process.
///
/// Lazily launched on first use, reused by every request afterwards (one page
/// per request, reused browser — no pooling). The handle lives behind a
/// `Mutex` held across the launch, so two early requests cannot race into a
/// double launch. If the process crashes, the next `open_page()` restarts it.
///
/// Store `Arc<BrowserSession>` in `AppState` so all handlers share one instance.
pub struct BrowserSession {
    inner: Mutex<Option<Browser>>,
    /// Explicit executable path. `None` means auto-discovery per launch.
    executable: Option<String>,
}

impl BrowserSession {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
            executable: None,
        }
    }

    /// Pin the browser executable instead of auto-discovering one. Both the
    /// primary and the fallback launch attempt use this path.
    pub fn with_executable(exe: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(None),
            executable: Some(exe.into()),
        }
    }

    /// Open a fresh page on the shared browser, lazily launching it first.
    ///
    /// A failed primary launch triggers exactly one fallback attempt with a
    /// minimal configuration; a failed fallback is fatal for this call but
    /// leaves the session retryable.
    pub async fn open_page(&self) -> Result<Page, FetchError> {
        let mut guard = self.inner.lock().await;

        // Probe: a blank tab tells us whether the process is still alive.
        if let Some(browser) = guard.as_mut() {
            match browser.new_page("about:blank").await {
                Ok(page) => return Ok(page),
                Err(e) => {
                    warn!("browser session: instance dead ({e}), relaunching");
                    if let Some(mut old) = guard.take() {
                        let _ = old.close().await;
                    }
                }
            }
        }

        let exe = self.executable.clone().or_else(find_chrome_executable);
        info!(
            "browser session: launching headless instance ({})",
            exe.as_deref().unwrap_or("<auto>")
        );

        let primary = match build_primary_config(exe.as_deref()) {
            Ok(config) => launch(config).await.map_err(|e| e.to_string()),
            Err(e) => Err(e),
        };

        let browser = match primary {
            Ok(b) => b,
            Err(primary_err) => {
                warn!("browser session: primary launch failed ({primary_err}), trying minimal config");
                let config = build_fallback_config(self.executable.as_deref())
                    .map_err(|e| FetchError::BrowserLaunchFailed(format!("{primary_err}; {e}")))?;
                launch(config).await.map_err(|fallback_err| {
                    FetchError::BrowserLaunchFailed(format!("{primary_err}; {fallback_err}"))
                })?
            }
        };

        *guard = Some(browser);
        guard
            .as_mut()
            .ok_or_else(|| FetchError::BrowserLaunchFailed("browser vanished after launch".into()))?
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::BrowserLaunchFailed(format!("failed to open page: {e}")))
    }

    /// Gracefully close the browser process. Safe to call when no browser was
    /// ever launched.
    pub async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(mut browser) = guard.take() {
            let _ = browser.close().await;
            info!("browser session shut down");
        }
    }
}

impl Default for BrowserSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Best-effort cleanup. Drop cannot await; if we're inside a tokio
        // runtime, spawn a task to close the browser to avoid zombie
        // Chromium processes.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        if let Ok(mut guard) = self.inner.try_lock() {
            if let Some(mut browser) = guard.take() {
                handle.spawn(async move {
                    let _ = browser.close().await;
                });
            }
        }
    }
}

// ── Network-idle polling ─────────────────────────────────────────────────────


/// Wait until the page network goes idle (no new resource entries for
/// `quiet_ms` consecutive ms) or until `timeout_ms` has elapsed.
///
/// Polls `performance.getEntriesByType("resource").length` every 250 ms — a
/// networkidle heuristic that works without CDP Network events. Returns
/// `true` when idle was reached, `false` on timeout.
pub async fn wait_until_quiet(page: &Page, quiet_ms: u64, timeout_ms: u64) -> bool {
    let poll_ms = 250u64;
    let start = std::time::Instant::now();
    let mut last_count: u64 = 0;
    let mut stable_since = std::time::Instant::now();

    loop {
        if start.elapsed().as_millis() as u64 >= timeout_ms {
            return false;
        }

        let count: u64 = page
            .evaluate("performance.getEntriesByType('resource').length")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_u64())
            .unwrap_or(0);

        let ready_complete: bool = page
            .evaluate("document.readyState")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_str().map(|s| s == "complete"))
            .unwrap_or(false);

        if !ready_complete {
            // DOM not fully loaded; keep waiting and do not allow "idle" to trigger.
            stable_since = std::time::Instant::now();
            last_count = count;
        } else if count != last_count {
            last_count = count;
            stable_since = std::time::Instant::now();
        } else if stable_since.elapsed().as_millis() as u64 >= quiet_ms {
            return true;
        }

        tokio::time::sleep(Duration::from_millis(poll_ms)).await;
    }
}
