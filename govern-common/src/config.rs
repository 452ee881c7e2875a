//! Configuration management for the governance tools.
//!
//! Configuration lives in an optional file at `~/.govern/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Command-line flags (applied by the binary)
//! 2. Environment variables
//! 3. Explicit config file values
//! 4. Default values
//!
//! # Environment Variable Mapping
//!
//! - `AIMAESTRO_API` → api.base_url
//! - `CLAUDE_PROJECT_DIR` → mirror.project_dir
//! - `AIMAESTRO_AGENT`, then `SESSION_NAME` → identity.session_name
//! - `GOVERN_LOG_LEVEL` → logging.level
//! - `GOVERN_LOG_FORMAT` → logging.format

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default base URL of the remote governance service.
pub const DEFAULT_API_BASE: &str = "http://localhost:23000";

/// Fixed sub-path of the governance request collection.
pub const GOVERNANCE_API_PATH: &str = "/api/v1/governance/requests";

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".govern"),
        |dirs| dirs.home_dir().join(".govern"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Remote API
// ============================================================================

/// How the two authorities are used for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationMode {
    /// Remote service first, local mirror as audit trail and fallback
    #[default]
    Dual,
    /// Remote service only; the mirror is neither read nor written
    ApiOnly,
    /// Mirror only; the remote service starts out marked unreachable
    Offline,
}

impl OperationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dual => "dual",
            Self::ApiOnly => "api-only",
            Self::Offline => "offline",
        }
    }

    /// Whether the local mirror participates in this mode.
    pub fn uses_mirror(&self) -> bool {
        !matches!(self, Self::ApiOnly)
    }
}

/// Remote governance endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL, without the governance sub-path
    #[serde(default = "default_api_base")]
    pub base_url: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub mode: OperationMode,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base(),
            timeout_secs: default_api_timeout(),
            mode: OperationMode::default(),
        }
    }
}

impl ApiConfig {
    /// Full URL of the request collection.
    pub fn requests_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            GOVERNANCE_API_PATH
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.into()
}

fn default_api_timeout() -> u64 {
    10
}

// ============================================================================
// Local mirror
// ============================================================================

/// Local mirror location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Project root; the current directory when unset
    #[serde(default)]
    pub project_dir: Option<PathBuf>,

    /// Approvals directory, relative to the project root unless absolute
    #[serde(default = "default_approvals_dir")]
    pub approvals_dir: PathBuf,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            project_dir: None,
            approvals_dir: default_approvals_dir(),
        }
    }
}

impl MirrorConfig {
    /// Resolve the directory holding the `pending/` and `completed/` shelves.
    pub fn root(&self) -> PathBuf {
        if self.approvals_dir.is_absolute() {
            return self.approvals_dir.clone();
        }
        let project = self
            .project_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        project.join(&self.approvals_dir)
    }
}

fn default_approvals_dir() -> PathBuf {
    PathBuf::from(".claude/approvals")
}

// ============================================================================
// Wait / polling
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_wait_timeout")]
    pub default_timeout_secs: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            default_timeout_secs: default_wait_timeout(),
        }
    }
}

impl WaitConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

fn default_poll_interval() -> u64 {
    5
}

fn default_wait_timeout() -> u64 {
    120
}

// ============================================================================
// Notifications
// ============================================================================

/// Outbound notification settings (fire-and-forget message command).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Executable invoked as `<command> <to> <subject> <message> --priority <p> --type <t>`
    #[serde(default = "default_notify_command")]
    pub command: String,

    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,

    /// Recipient of new-request routing notifications
    #[serde(default = "default_approver")]
    pub approver: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: default_notify_command(),
            timeout_secs: default_notify_timeout(),
            approver: default_approver(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_notify_command() -> String {
    "amp-send".into()
}

fn default_notify_timeout() -> u64 {
    30
}

fn default_approver() -> String {
    "ai-maestro-assistant-manager-agent".into()
}

// ============================================================================
// Identity / logging
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Session name of the calling agent, used as the default `source_cos`
    #[serde(default)]
    pub session_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "warn".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub mirror: MirrorConfig,

    #[serde(default)]
    pub wait: WaitConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default path, falling back to defaults.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = non_empty("AIMAESTRO_API") {
            self.api.base_url = url;
        }
        if let Some(dir) = non_empty("CLAUDE_PROJECT_DIR") {
            self.mirror.project_dir = Some(PathBuf::from(dir));
        }
        if let Some(name) = non_empty("AIMAESTRO_AGENT").or_else(|| non_empty("SESSION_NAME")) {
            self.identity.session_name = Some(name);
        }
        if let Some(level) = non_empty("GOVERN_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = non_empty("GOVERN_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}
