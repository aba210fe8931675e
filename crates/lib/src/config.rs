//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.cafebot/config.json`) and environment.
//! Secrets and deployment knobs can come from env so the file can stay empty on hosted setups.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::handoff::{ttl_from_minutes, DEFAULT_TTL_MINUTES};
use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Webhook server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// LINE Messaging API credentials.
    #[serde(default)]
    pub line: LineConfig,

    /// Completion service used for unmatched questions.
    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub handoff: HandoffConfig,

    /// Coordinate overrides for the location reply.
    #[serde(default)]
    pub place: PlaceConfig,

    /// Which store profile to serve.
    #[serde(default)]
    pub profile: ProfileConfig,
}

/// Server bind, port, and webhook route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 3000).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Route the platform POSTs to (default "/api/webhook").
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_webhook_path() -> String {
    "/api/webhook".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            webhook_path: default_webhook_path(),
        }
    }
}

/// LINE channel config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineConfig {
    /// Bearer token for the reply API. Overridden by LINE_CHANNEL_ACCESS_TOKEN env when set.
    pub channel_access_token: Option<String>,
    /// Secret for X-Line-Signature verification. Overridden by LINE_CHANNEL_SECRET env when set.
    /// When unset, signatures are not checked (loopback only).
    pub channel_secret: Option<String>,
    /// API base URL (default https://api.line.me).
    pub api_base: Option<String>,
    /// Upper bound on one reply API call, in seconds (default 10).
    #[serde(default = "default_line_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_line_timeout_secs() -> u64 {
    10
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            channel_access_token: None,
            channel_secret: None,
            api_base: None,
            timeout_secs: default_line_timeout_secs(),
        }
    }
}

impl LineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Completion service config (OpenAI Responses API).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionConfig {
    /// Overridden by OPENAI_API_KEY env when set.
    pub api_key: Option<String>,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_completion_base_url")]
    pub base_url: String,
    #[serde(default = "default_completion_temperature")]
    pub temperature: f32,
    /// Upper bound on one completion call, in seconds (default 20).
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_completion_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_completion_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_completion_temperature() -> f32 {
    0.1
}

fn default_completion_timeout_secs() -> u64 {
    20
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_completion_model(),
            base_url: default_completion_base_url(),
            temperature: default_completion_temperature(),
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

impl CompletionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffConfig {
    /// Minutes a hand-off silences the bot (default 90). Overridden by HANDOFF_TTL_MIN env.
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,
}

fn default_ttl_minutes() -> u64 {
    DEFAULT_TTL_MINUTES
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_ttl_minutes(),
        }
    }
}

/// Overrides for the profile's place coordinates. PLACE_LAT / PLACE_LNG env take precedence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceConfig {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Profile selection: an explicit file, else `profile.json` beside the config, else a bundled preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileConfig {
    /// Bundled preset name (default "cafe").
    #[serde(default = "default_profile_preset")]
    pub preset: String,
    /// Profile JSON file. Relative paths are resolved against the config file's parent.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_profile_preset() -> String {
    "cafe".to_string()
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            preset: default_profile_preset(),
            path: None,
        }
    }
}

/// Where the served profile comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileSource {
    File(PathBuf),
    Preset(String),
}

/// Trimmed, non-empty env value.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| non_empty(&s))
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

fn config_value(v: &Option<String>) -> Option<String> {
    v.as_deref().and_then(non_empty)
}

/// Resolve the LINE access token: env LINE_CHANNEL_ACCESS_TOKEN overrides config.
pub fn resolve_line_access_token(config: &Config) -> Option<String> {
    env_value("LINE_CHANNEL_ACCESS_TOKEN").or_else(|| config_value(&config.line.channel_access_token))
}

/// Resolve the LINE channel secret: env LINE_CHANNEL_SECRET overrides config.
pub fn resolve_line_channel_secret(config: &Config) -> Option<String> {
    env_value("LINE_CHANNEL_SECRET").or_else(|| config_value(&config.line.channel_secret))
}

/// Resolve the completion API key: env OPENAI_API_KEY overrides config.
pub fn resolve_completion_api_key(config: &Config) -> Option<String> {
    env_value("OPENAI_API_KEY").or_else(|| config_value(&config.completion.api_key))
}

/// Resolve the hand-off lifetime: env HANDOFF_TTL_MIN overrides config.
pub fn resolve_handoff_ttl(config: &Config) -> Duration {
    ttl_from_minutes(handoff_minutes(
        env_value("HANDOFF_TTL_MIN").as_deref(),
        config.handoff.ttl_minutes,
    ))
}

/// Positive whole minutes from env, else the configured value; zero anywhere means the default.
fn handoff_minutes(env: Option<&str>, configured: u64) -> u64 {
    if let Some(raw) = env {
        match raw.parse::<u64>() {
            Ok(m) if m > 0 => return m,
            _ => log::warn!("config: ignoring HANDOFF_TTL_MIN={:?}", raw),
        }
    }
    if configured > 0 {
        configured
    } else {
        DEFAULT_TTL_MINUTES
    }
}

/// Resolve place coordinate overrides: PLACE_LAT / PLACE_LNG env override config.
pub fn resolve_place_coordinates(config: &Config) -> (Option<f64>, Option<f64>) {
    (
        coordinate("PLACE_LAT", env_value("PLACE_LAT").as_deref(), config.place.latitude),
        coordinate("PLACE_LNG", env_value("PLACE_LNG").as_deref(), config.place.longitude),
    )
}

fn coordinate(name: &str, env: Option<&str>, configured: Option<f64>) -> Option<f64> {
    if let Some(raw) = env {
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => return Some(v),
            _ => log::warn!("config: ignoring {}={:?}", name, raw),
        }
    }
    configured
}

/// Build identifier for logs: first 7 chars of VERCEL_GIT_COMMIT_SHA, else "local".
pub fn resolve_build_id() -> String {
    build_id(env_value("VERCEL_GIT_COMMIT_SHA").as_deref())
}

fn build_id(sha: Option<&str>) -> String {
    match sha {
        Some(s) => s.chars().take(7).collect(),
        None => "local".to_string(),
    }
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("CAFEBOT_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".cafebot").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the default path (or CAFEBOT_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used (for resolving the config directory).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

fn config_parent(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Default profile file: `profile.json` next to the config file.
pub fn profile_file(config_path: &Path) -> PathBuf {
    config_parent(config_path).join("profile.json")
}

/// Resolve the profile: `config.profile.path` if set (relative paths resolved against the config
/// file's parent), else `profile.json` beside the config when it exists, else the named preset.
pub fn resolve_profile_source(config: &Config, config_path: &Path) -> ProfileSource {
    match &config.profile.path {
        Some(p) if !p.as_os_str().is_empty() => {
            if p.is_absolute() {
                ProfileSource::File(p.clone())
            } else {
                ProfileSource::File(config_parent(config_path).join(p))
            }
        }
        _ => {
            let default = profile_file(config_path);
            if default.exists() {
                ProfileSource::File(default)
            } else {
                ProfileSource::Preset(config.profile.preset.clone())
            }
        }
    }
}
