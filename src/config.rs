use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{AndroidUseError, AndroidUseResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_max_errors")]
    pub max_errors: u32,
    /// Delay between steps, seconds. Gives the UI time to settle after a gesture.
    #[serde(default = "default_step_delay")]
    pub step_delay_secs: f64,
    /// Run budget in USD; each step is charged a flat estimate.
    #[serde(default = "default_budget_limit")]
    pub budget_limit: f64,
    #[serde(default = "default_cost_per_step")]
    pub cost_per_step: f64,
    /// Identical consecutive actions tolerated before the run is stopped.
    #[serde(default = "default_loop_threshold")]
    pub loop_detection_threshold: u32,
    #[serde(default = "default_history_dir")]
    pub history_dir: String,
    #[serde(default)]
    pub save_screenshots: bool,
    #[serde(default = "default_screenshot_path")]
    pub screenshot_path: String,
}

fn default_max_steps() -> u32 {
    20
}

fn default_max_errors() -> u32 {
    3
}

fn default_step_delay() -> f64 {
    1.0
}

fn default_budget_limit() -> f64 {
    2.0
}

fn default_cost_per_step() -> f64 {
    0.01
}

fn default_loop_threshold() -> u32 {
    3
}

fn default_history_dir() -> String {
    "sessions".into()
}

fn default_screenshot_path() -> String {
    "last_screenshot.png".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_errors: default_max_errors(),
            step_delay_secs: default_step_delay(),
            budget_limit: default_budget_limit(),
            cost_per_step: default_cost_per_step(),
            loop_detection_threshold: default_loop_threshold(),
            history_dir: default_history_dir(),
            save_screenshots: false,
            screenshot_path: default_screenshot_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Target device serial. None picks the single connected device.
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default = "default_adb_path")]
    pub adb_path: String,
}

fn default_adb_path() -> String {
    "adb".into()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial: None,
            adb_path: default_adb_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_path")]
    pub path: String,
}

fn default_memory_path() -> String {
    "memory.json".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            path: default_memory_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_stats_poll")]
    pub stats_poll_secs: u64,
    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,
}

fn default_ws_url() -> String {
    "ws://127.0.0.1:8000/ws".into()
}

fn default_api_base() -> String {
    "http://127.0.0.1:8000".into()
}

fn default_stats_poll() -> u64 {
    5
}

fn default_max_log_lines() -> usize {
    500
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            api_base: default_api_base(),
            stats_poll_secs: default_stats_poll(),
            max_log_lines: default_max_log_lines(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_active_provider")]
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
}

fn default_active_provider() -> String {
    "openai".into()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            active_provider: default_active_provider(),
            providers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub display_name: String,
    pub api_base: String,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Optional API key stored in config.toml (falls back to env var ANDROID_USE_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_temperature() -> f64 {
    0.1
}

fn resolve_config_path() -> AndroidUseResult<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(AndroidUseError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

pub fn load_config() -> AndroidUseResult<AppConfig> {
    let path = resolve_config_path()?;
    let content = std::fs::read_to_string(&path)?;
    let config: AppConfig = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
    Ok(config)
}

/// Like [`load_config`] but falls back to built-in defaults when no
/// config.toml exists. A parse error in an existing file still fails.
pub fn load_config_or_default() -> AndroidUseResult<AppConfig> {
    match load_config() {
        Ok(config) => Ok(config),
        Err(AndroidUseError::Config(_)) => {
            tracing::warn!("no config.toml found, using defaults");
            Ok(AppConfig::default())
        }
        Err(e) => Err(e),
    }
}

pub fn save_config(config: &AppConfig) -> AndroidUseResult<()> {
    let path = resolve_config_path()?;
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}
