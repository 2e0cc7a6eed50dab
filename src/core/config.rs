use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::harvest::matcher::{DEFAULT_COMMENT_API_PATH, DEFAULT_CONTENT_ID_PARAM};

// ---------------------------------------------------------------------------
// ScoutConfig: file-based config loader (note-scout.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "NOTE_SCOUT_CONFIG";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_HEADLESS: &str = "NOTE_SCOUT_HEADLESS";
pub const ENV_USER_DATA_DIR: &str = "NOTE_SCOUT_USER_DATA_DIR";
pub const ENV_SCROLL_COUNT: &str = "NOTE_SCOUT_SCROLL_COUNT";
pub const ENV_SETTLE_MS: &str = "NOTE_SCOUT_SETTLE_MS";
pub const ENV_COMMENT_API_PATH: &str = "NOTE_SCOUT_COMMENT_API_PATH";

/// Browser sub-config (mirrors the `browser` key in note-scout.json).
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct BrowserFileConfig {
    /// Run without a visible window. Defaults to `false`: the target site
    /// usually needs a logged-in, visible profile.
    pub headless: Option<bool>,
    /// Persistent Chromium profile directory (keeps the login session).
    pub user_data_dir: Option<String>,
    /// Explicit browser binary. Auto-discovered when unset.
    pub chrome_executable: Option<String>,
    pub window_width: Option<u32>,
    pub window_height: Option<u32>,
    /// Wait after navigation before the page is considered usable. Default: 3000.
    pub page_load_wait_ms: Option<u64>,
    /// Delay between issuing a scroll and reading the new offset. Default: 500.
    pub scroll_measure_delay_ms: Option<u64>,
}

impl BrowserFileConfig {
    /// Headless: JSON field → `NOTE_SCOUT_HEADLESS` → `false`.
    pub fn resolve_headless(&self) -> bool {
        if let Some(b) = self.headless {
            return b;
        }
        std::env::var(ENV_HEADLESS)
            .map(|v| env_flag(&v))
            .unwrap_or(false)
    }

    /// Profile dir: JSON field → `NOTE_SCOUT_USER_DATA_DIR` → `~/.note-scout/chrome-profile`.
    pub fn resolve_user_data_dir(&self) -> Option<PathBuf> {
        if let Some(d) = non_empty(self.user_data_dir.as_deref()) {
            return Some(expand_home(d));
        }
        if let Ok(d) = std::env::var(ENV_USER_DATA_DIR) {
            if let Some(d) = non_empty(Some(&d)) {
                return Some(expand_home(d));
            }
        }
        dirs::home_dir().map(|h| h.join(".note-scout").join("chrome-profile"))
    }

    /// Executable: JSON field → `CHROME_EXECUTABLE` → `None` (auto-discovery).
    /// Paths that do not exist are ignored.
    pub fn resolve_chrome_executable(&self) -> Option<String> {
        let candidate = non_empty(self.chrome_executable.as_deref())
            .map(str::to_string)
            .or_else(|| {
                std::env::var(ENV_CHROME_EXECUTABLE)
                    .ok()
                    .and_then(|v| non_empty(Some(&v)).map(str::to_string))
            })?;
        if Path::new(&candidate).exists() {
            Some(candidate)
        } else {
            tracing::warn!("configured browser executable not found: {}", candidate);
            None
        }
    }

    pub fn resolve(&self) -> BrowserSettings {
        let defaults = BrowserSettings::default();
        BrowserSettings {
            headless: self.resolve_headless(),
            user_data_dir: self.resolve_user_data_dir(),
            chrome_executable: self.resolve_chrome_executable(),
            window_width: self.window_width.unwrap_or(defaults.window_width),
            window_height: self.window_height.unwrap_or(defaults.window_height),
            page_load_wait: self
                .page_load_wait_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.page_load_wait),
            scroll_measure_delay: self
                .scroll_measure_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.scroll_measure_delay),
        }
    }
}

/// Harvest sub-config (mirrors the `harvest` key in note-scout.json).
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct HarvestFileConfig {
    /// URL fragment identifying the comment-page API.
    pub comment_api_path: Option<String>,
    /// Query parameter carrying the content id. Default: `note_id`.
    pub content_id_param: Option<String>,
    /// Pixels per scroll action. Default: 1200.
    pub scroll_pixels: Option<i64>,
    /// Wait after each scroll before sampling traffic. Default: 1500.
    pub settle_interval_ms: Option<u64>,
    /// Wait before the initial harvest pass. Default: 1000.
    pub initial_delay_ms: Option<u64>,
    /// Wait between the initial pass and the first scroll. Default: 2000.
    pub post_initial_delay_ms: Option<u64>,
    /// Scroll budget used by the CLI when none is given. Default: 3.
    pub scroll_count: Option<u32>,
}

impl HarvestFileConfig {
    pub fn resolve_comment_api_path(&self) -> String {
        if let Some(p) = non_empty(self.comment_api_path.as_deref()) {
            return p.to_string();
        }
        std::env::var(ENV_COMMENT_API_PATH)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_COMMENT_API_PATH.to_string())
    }

    /// Scroll budget: JSON field → `NOTE_SCOUT_SCROLL_COUNT` → 3.
    pub fn resolve_scroll_count(&self) -> u32 {
        self.scroll_count
            .or_else(|| env_parse(ENV_SCROLL_COUNT))
            .unwrap_or(3)
    }

    /// Settle interval: JSON field → `NOTE_SCOUT_SETTLE_MS` → 1500 ms.
    pub fn resolve_settle_interval(&self) -> Duration {
        Duration::from_millis(
            self.settle_interval_ms
                .or_else(|| env_parse(ENV_SETTLE_MS))
                .unwrap_or(1500),
        )
    }

    pub fn resolve(&self) -> HarvestSettings {
        let defaults = HarvestSettings::default();
        HarvestSettings {
            comment_api_path: self.resolve_comment_api_path(),
            content_id_param: non_empty(self.content_id_param.as_deref())
                .map(str::to_string)
                .unwrap_or(defaults.content_id_param),
            scroll_pixels: self.scroll_pixels.unwrap_or(defaults.scroll_pixels),
            settle_interval: self.resolve_settle_interval(),
            initial_delay: self
                .initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_delay),
            post_initial_delay: self
                .post_initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.post_initial_delay),
            scroll_count: self.resolve_scroll_count(),
        }
    }
}

/// Top-level config loaded from `note-scout.json`.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct ScoutConfig {
    #[serde(default)]
    pub browser: BrowserFileConfig,
    #[serde(default)]
    pub harvest: HarvestFileConfig,
}

/// Resolved browser launch settings.
#[derive(Clone, Debug)]
pub struct BrowserSettings {
    pub headless: bool,
    pub user_data_dir: Option<PathBuf>,
    pub chrome_executable: Option<String>,
    pub window_width: u32,
    pub window_height: u32,
    pub page_load_wait: Duration,
    pub scroll_measure_delay: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: false,
            user_data_dir: None,
            chrome_executable: None,
            window_width: 1920,
            window_height: 1080,
            page_load_wait: Duration::from_millis(3000),
            scroll_measure_delay: Duration::from_millis(500),
        }
    }
}

/// Resolved harvest settings shared by the matcher and the scroll loop.
#[derive(Clone, Debug, PartialEq)]
pub struct HarvestSettings {
    pub comment_api_path: String,
    pub content_id_param: String,
    pub scroll_pixels: i64,
    pub settle_interval: Duration,
    pub initial_delay: Duration,
    pub post_initial_delay: Duration,
    pub scroll_count: u32,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            comment_api_path: DEFAULT_COMMENT_API_PATH.to_string(),
            content_id_param: DEFAULT_CONTENT_ID_PARAM.to_string(),
            scroll_pixels: 1200,
            settle_interval: Duration::from_millis(1500),
            initial_delay: Duration::from_millis(1000),
            post_initial_delay: Duration::from_millis(2000),
            scroll_count: 3,
        }
    }
}

/// Load `note-scout.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `NOTE_SCOUT_CONFIG` env var path
/// 2. `./note-scout.json`
/// 3. `../note-scout.json`
///
/// Missing file → `ScoutConfig::default()` (silent, all env-var fallbacks apply).
/// Parse error → log a warning, return `ScoutConfig::default()`.
pub fn load_scout_config() -> ScoutConfig {
    let candidates: Vec<PathBuf> = {
        let mut v = vec![
            PathBuf::from("note-scout.json"),
            PathBuf::from("../note-scout.json"),
        ];
        if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
            v.insert(0, PathBuf::from(env_path));
        }
        v
    };

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => return parse_scout_config(&contents, path),
            Err(_) => continue,
        }
    }

    ScoutConfig::default()
}

fn parse_scout_config(contents: &str, path: &Path) -> ScoutConfig {
    match serde_json::from_str::<ScoutConfig>(contents) {
        Ok(cfg) => {
            tracing::info!("note-scout.json loaded from {}", path.display());
            cfg
        }
        Err(e) => {
            tracing::warn!(
                "note-scout.json parse error at {}: {}; using defaults",
                path.display(),
                e
            );
            ScoutConfig::default()
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

fn expand_home(p: &str) -> PathBuf {
    match p.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| PathBuf::from(p)),
        None => PathBuf::from(p),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let cfg = parse_scout_config(
            r#"{"harvest": {"scroll_pixels": 800, "settle_interval_ms": 250}}"#,
            Path::new("note-scout.json"),
        );
        let settings = cfg.harvest.resolve();
        assert_eq!(settings.scroll_pixels, 800);
        assert_eq!(settings.settle_interval, Duration::from_millis(250));
        assert_eq!(settings.content_id_param, "note_id");
        assert_eq!(settings.initial_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let cfg = parse_scout_config("{not json", Path::new("broken.json"));
        assert!(cfg.browser.headless.is_none());
        assert!(cfg.harvest.scroll_pixels.is_none());
    }

    #[test]
    fn test_browser_section_resolution() {
        let cfg = parse_scout_config(
            r#"{"browser": {"headless": true, "user_data_dir": "/tmp/profile", "window_width": 1280}}"#,
            Path::new("note-scout.json"),
        );
        let settings = cfg.browser.resolve();
        assert!(settings.headless);
        assert_eq!(settings.user_data_dir, Some(PathBuf::from("/tmp/profile")));
        assert_eq!(settings.window_width, 1280);
        assert_eq!(settings.window_height, 1080);
    }

    #[test]
    fn test_env_flag_values() {
        assert!(env_flag("1"));
        assert!(env_flag(" TRUE "));
        assert!(!env_flag("0"));
        assert!(!env_flag("off"));
    }
}
