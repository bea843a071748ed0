use anyhow::{Context, Result, anyhow};
use chorus_core::{MissingSessionPolicy, RelayConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Config written by `chorus init` and used when no config file exists
pub const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChorusConfig {
    #[serde(default)]
    pub relay: RelaySection,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

// ── Relay ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySection {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
    #[serde(default)]
    pub missing_session: MissingSessionPolicy,
}

fn default_system_prompt() -> String {
    chorus_core::DEFAULT_SYSTEM_PROMPT.to_string()
}
fn default_call_timeout_secs() -> u64 {
    120
}
fn default_max_concurrent_calls() -> usize {
    6
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            call_timeout_secs: default_call_timeout_secs(),
            max_concurrent_calls: default_max_concurrent_calls(),
            missing_session: MissingSessionPolicy::default(),
        }
    }
}

impl RelaySection {
    pub fn to_relay_config(&self) -> RelayConfig {
        RelayConfig {
            system_prompt: self.system_prompt.clone(),
            call_timeout: Duration::from_secs(self.call_timeout_secs.max(1)),
            max_concurrent_calls: self.max_concurrent_calls.max(1),
            missing_session: self.missing_session,
        }
    }
}

// ── Providers ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: OpenAiProviderConfig,
    #[serde(default)]
    pub claude: ClaudeProviderConfig,
    #[serde(default)]
    pub gemini: GeminiProviderConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl std::fmt::Debug for OpenAiProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProviderConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for OpenAiProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}

/// Which wire API serves the claude slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaudeApi {
    /// OpenAI-compatible chat completions through OpenRouter
    #[default]
    OpenRouter,
    /// Anthropic Messages API directly
    Anthropic,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ClaudeProviderConfig {
    #[serde(default)]
    pub api: ClaudeApi,
    #[serde(default)]
    pub api_key: String,
    /// Defaults depend on `api`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl std::fmt::Debug for ClaudeProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeProviderConfig")
            .field("api", &self.api)
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url())
            .field("model", &self.model())
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for ClaudeProviderConfig {
    fn default() -> Self {
        Self {
            api: ClaudeApi::default(),
            api_key: String::new(),
            base_url: None,
            model: None,
            max_tokens: default_max_tokens(),
        }
    }
}

impl ClaudeProviderConfig {
    pub fn base_url(&self) -> String {
        match (&self.base_url, self.api) {
            (Some(url), _) if !url.is_empty() => url.clone(),
            (_, ClaudeApi::OpenRouter) => "https://openrouter.ai/api".to_string(),
            (_, ClaudeApi::Anthropic) => "https://api.anthropic.com".to_string(),
        }
    }

    pub fn model(&self) -> String {
        match (&self.model, self.api) {
            (Some(model), _) if !model.is_empty() => model.clone(),
            (_, ClaudeApi::OpenRouter) => "anthropic/claude-3.5-haiku".to_string(),
            (_, ClaudeApi::Anthropic) => "claude-3-5-haiku-latest".to_string(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GeminiProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl std::fmt::Debug for GeminiProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProviderConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for GeminiProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_gemini_base_url(),
            model: default_gemini_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

// ── Store / Gateway ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "~/.chorus/chorus.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_db_path(),
        }
    }
}

impl StoreConfig {
    /// Database path with `~/` expanded; an empty path falls back to the default
    pub fn resolved_path(&self) -> PathBuf {
        if self.path.trim().is_empty() {
            expand_home(&default_db_path())
        } else {
            expand_home(&self.path)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    5000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_gateway_bind(),
            port: default_gateway_port(),
        }
    }
}

impl GatewayConfig {
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("Invalid gateway address {}:{}", self.bind, self.port))
    }
}

// ── Loading ─────────────────────────────────────────────────────

/// Mask a secret string for safe display in Debug output / logs.
/// Shows first 3 and last 4 chars for keys longer than 7 chars, otherwise "***".
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chorus")
}

pub fn expand_home(s: &str) -> PathBuf {
    match s.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(s),
    }
}

impl ChorusConfig {
    /// Load from `custom_path`, or from `~/.chorus/config.toml`, falling back
    /// to the embedded default when that file does not exist.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = match custom_path {
            Some(path) => path.clone(),
            None => {
                let path = config_dir().join("config.toml");
                if !path.exists() {
                    info!(
                        "No config at {}, using built-in defaults and environment",
                        path.display()
                    );
                    return Self::parse(DEFAULT_CONFIG);
                }
                path
            }
        };

        check_permissions(&path)?;

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `chorus init` first.",
                path.display()
            )
        })?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        config.warn_hardcoded_keys(&content);
        Ok(config)
    }

    /// Expand allowlisted `${VAR}` references and parse TOML
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: Self = toml::from_str(&expanded)?;
        Ok(config)
    }

    fn warn_hardcoded_keys(&self, raw: &str) {
        let keys = [
            ("openai", &self.providers.openai.api_key, "OPENAI_API_KEY"),
            ("claude", &self.providers.claude.api_key, "OPENROUTER_API_KEY"),
            ("gemini", &self.providers.gemini.api_key, "GOOGLE_API_KEY"),
        ];
        for (name, key, var) in keys {
            if !key.is_empty() && raw.contains(key.as_str()) {
                warn!(
                    "{} API key is hardcoded in config file. For security, use environment variables: api_key = \"${{{}}}\"",
                    name, var
                );
            }
        }
    }
}

/// Refuse config files that group or other can read (Unix only)
fn check_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                return Err(anyhow!(
                    "Config file {:?} has overly permissive permissions ({:o}). \
                     It may contain secrets. Fix with: chmod 600 {:?}",
                    path,
                    mode & 0o777,
                    path
                ));
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Allowlist of environment variable names that may be expanded in config files.
const ALLOWED_ENV_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "OPENROUTER_API_KEY",
    "GOOGLE_API_KEY",
    "CHORUS_DB_PATH",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str) -> String {
    expand_with(s, |name| std::env::var(name).ok())
}

fn expand_with(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            pos = abs_start + end + 1;
            continue;
        }

        let raw = lookup(&var_name).unwrap_or_default();
        let line_start = result[..abs_start].rfind('\n').map_or(0, |i| i + 1);
        let value = if in_basic_string(&result[line_start..abs_start]) {
            escape_basic(&raw)
        } else {
            raw
        };
        result.replace_range(abs_start..abs_start + end + 1, &value);
        pos = abs_start + value.len();
    }
    result
}

/// Whether the end of `line` sits inside a `"..."` TOML string
fn in_basic_string(line: &str) -> bool {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in line.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match (quote, c) {
            (Some('"'), '\\') => escaped = true,
            (Some(q), c) if c == q => quote = None,
            (None, '"' | '\'') => quote = Some(c),
            (None, '#') => return false,
            _ => {}
        }
    }
    quote == Some('"')
}

fn escape_basic(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}
