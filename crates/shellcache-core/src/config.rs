//! Worker configuration management.
//!
//! The cache identifier, precache manifest and the handful of fixed paths
//! the handlers need are injected as a `WorkerConfig` instead of living in
//! globals. Configuration is stored at `~/.config/shellcache/config.json`;
//! a missing file means the built-in defaults for the Molintas Water app.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::cache::storage::check_name;
use crate::error::WorkerError;
use crate::net::http::DEFAULT_TIMEOUT_SECS;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "shellcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_PRECACHE: [&str; 12] = [
    "/",
    "/app/index.html",
    "/app/styles/main.css",
    "/app/styles/components.css",
    "/app/styles/responsive.css",
    "/app/js/utils.js",
    "/app/js/store.js",
    "/app/js/components.js",
    "/app/js/app.js",
    "/app/manifest.json",
    "https://fonts.googleapis.com/css2?family=Inter:wght@400;500;600;700&display=swap",
    "https://unpkg.com/lucide@latest/dist/umd/lucide.js",
];

/// Literal values used when building push notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub explore_icon: String,
    pub close_icon: String,
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            title: "Molintas Water Services".to_string(),
            body: "You have a new notification".to_string(),
            icon: "/app/icons/icon-192x192.png".to_string(),
            badge: "/app/icons/badge-72x72.png".to_string(),
            vibrate: vec![100, 50, 100],
            explore_icon: "/app/icons/checkmark.png".to_string(),
            close_icon: "/app/icons/xmark.png".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Logical cache name; the version is appended to form the identifier.
    pub app_name: String,
    /// `major.minor.patch` of the deployed app shell.
    pub version: String,
    /// Origin (and base path) relative locators are resolved against.
    pub scope: String,
    pub precache: Vec<String>,
    /// Page served to failed navigations.
    pub offline_fallback: String,
    /// Page opened when a notification is clicked.
    pub app_root: String,
    pub sync_tag: String,
    pub periodic_sync_tag: String,
    pub notification: NotificationDefaults,
    pub request_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            app_name: "molintas-water".to_string(),
            version: "1.0.0".to_string(),
            scope: "http://localhost:8080/".to_string(),
            precache: DEFAULT_PRECACHE.iter().map(|s| s.to_string()).collect(),
            offline_fallback: "/app/index.html".to_string(),
            app_root: "/app/".to_string(),
            sync_tag: "background-sync".to_string(),
            periodic_sync_tag: "content-sync".to_string(),
            notification: NotificationDefaults::default(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl WorkerConfig {
    /// Load from the default location, or defaults if no file exists.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory the on-disk cache storage lives in.
    pub fn cache_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn validate(&self) -> Result<()> {
        if self.app_name.is_empty() {
            anyhow::bail!("app_name must not be empty");
        }
        semver::Version::parse(&self.version)
            .with_context(|| format!("Invalid version {:?}", self.version))?;
        // Build metadata ("+build.5") or an odd app name can still make an
        // unusable storage identifier
        check_name(&self.cache_name())?;
        self.scope_url()?;
        Ok(())
    }

    /// The current cache identifier, e.g. `molintas-water-v1.0.0`.
    pub fn cache_name(&self) -> String {
        format!("{}-v{}", self.app_name, self.version)
    }

    pub fn scope_url(&self) -> Result<Url, WorkerError> {
        Url::parse(&self.scope).map_err(|e| WorkerError::InvalidLocator {
            locator: self.scope.clone(),
            reason: e.to_string(),
        })
    }

    /// Resolve an absolute or scope-relative locator.
    pub fn resolve(&self, locator: &str) -> Result<Url, WorkerError> {
        self.scope_url()?
            .join(locator)
            .map_err(|e| WorkerError::InvalidLocator {
                locator: locator.to_string(),
                reason: e.to_string(),
            })
    }
}
