//! Native browser launch using `chromiumoxide`.
//!
//! * Finding a usable browser executable (Chrome → Chromium → Brave, cross-platform).
//! * Building a `BrowserConfig` around a persistent profile so the site login survives.
//! * `BrowserSession`: one browser process plus its CDP handler task.
//! * `wait_until_ready`: navigation settle heuristic for SPA pages.

use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::core::config::BrowserSettings;

// ── Browser executable discovery ─────────────────────────────────────────────

/// Executable names looked up on `PATH`.
const PATH_CANDIDATES: &[&str] = &[
    "google-chrome",
    "chromium",
    "chromium-browser",
    "chrome",
    "brave-browser",
];

#[cfg(target_os = "macos")]
const INSTALL_CANDIDATES: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
];

#[cfg(target_os = "linux")]
const INSTALL_CANDIDATES: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/local/bin/chromium",
];

#[cfg(target_os = "windows")]
const INSTALL_CANDIDATES: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
];

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
const INSTALL_CANDIDATES: &[&str] = &[];

/// Find a usable Chromium-family browser executable.
///
/// `explicit` wins when it exists, then `PATH`, then the usual install
/// locations for the current OS.
pub fn find_chrome_executable(explicit: Option<&str>) -> Option<String> {
    let explicit = explicit.filter(|p| Path::new(p).exists()).map(str::to_string);

    let on_path = || {
        let path_var = std::env::var_os("PATH")?;
        std::env::split_paths(&path_var)
            .flat_map(|dir| PATH_CANDIDATES.iter().map(move |exe| dir.join(exe)))
            .find(|full| full.exists())
            .map(|full| full.to_string_lossy().to_string())
    };

    let installed = || {
        INSTALL_CANDIDATES
            .iter()
            .find(|c| Path::new(c).exists())
            .map(|c| c.to_string())
    };

    explicit.or_else(on_path).or_else(installed)
}

// ── Browser config builder ───────────────────────────────────────────────────

/// Build a `BrowserConfig` for a (normally headed) session on a persistent profile.
///
/// `--disable-blink-features=AutomationControlled` hides `navigator.webdriver`;
/// the site refuses to load comments for obviously automated sessions.
pub fn build_browser_config(exe: &str, settings: &BrowserSettings) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: settings.window_width,
            height: settings.window_height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(settings.window_width, settings.window_height)
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-blink-features=AutomationControlled");

    if !settings.headless {
        builder = builder.with_head();
    }

    if let Some(dir) = settings.user_data_dir.as_ref() {
        builder = builder.user_data_dir(dir);
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

// ── Session ──────────────────────────────────────────────────────────────────

/// A launched browser and the task pumping its CDP handler.
pub struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let exe = find_chrome_executable(settings.chrome_executable.as_deref())
            .ok_or_else(|| anyhow!("No browser found. Install Chrome or Chromium, or set CHROME_EXECUTABLE."))?;

        info!(
            "🚀 Launching browser ({}, headless={})",
            exe, settings.headless
        );
        let config = build_browser_config(&exe, settings)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                }
            }
        });

        Ok(Self { browser, handler })
    }

    /// Open a blank tab. Attach network capture before navigating so the
    /// first comment page is recorded.
    pub async fn blank_page(&self) -> Result<Page> {
        self.browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("Failed to open tab: {}", e))
    }

    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Browser close error (non-fatal): {}", e);
        }
        self.handler.abort();
        info!("🛑 Browser closed");
    }
}

// ── Page readiness ───────────────────────────────────────────────────────────

const READY_PROBE: &str = "({ complete: document.readyState === 'complete', \
    resources: performance.getEntriesByType('resource').length })";

const READY_POLL: Duration = Duration::from_millis(250);

/// Wait until `document.readyState` is `complete` and the resource count stays
/// flat for `quiet_ms`, or until `timeout_ms` elapses. Never fails.
pub async fn wait_until_ready(page: &Page, quiet_ms: u64, timeout_ms: u64) {
    let quiet = Duration::from_millis(quiet_ms);
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    let started = Instant::now();
    let mut last_resources = None;
    let mut quiet_since = Instant::now();

    while Instant::now() < deadline {
        let probe = page
            .evaluate(READY_PROBE)
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok());
        let complete = probe
            .as_ref()
            .and_then(|p| p.get("complete"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let resources = probe
            .as_ref()
            .and_then(|p| p.get("resources"))
            .and_then(|v| v.as_u64());

        if !complete || resources != last_resources {
            last_resources = resources;
            quiet_since = Instant::now();
        } else if quiet_since.elapsed() >= quiet {
            info!(
                "Page ready after {}ms ({} resources)",
                started.elapsed().as_millis(),
                resources.unwrap_or(0)
            );
            return;
        }

        tokio::time::sleep(READY_POLL).await;
    }
    info!("Page not idle after {}ms, continuing anyway", timeout_ms);
}
