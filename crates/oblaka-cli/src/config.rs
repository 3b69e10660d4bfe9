use anyhow::{Context, Result, anyhow};
use oblaka_core::providers::{google, mask_secret, openai};
use oblaka_core::{GeminiSettings, OpenAiSettings, PoolConfig, ProviderKeys};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OblakaConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

// ── Server Config ───────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on a single `/chat` request, failover included
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Bearer token for `/debug`; empty leaves it open
    #[serde(default)]
    pub debug_token: String,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("debug_token", &mask_secret(&self.debug_token))
            .finish()
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
            debug_token: String::new(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.bind, self.port))
    }
}

// ── Provider Config ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: OpenAiProviderConfig,
    #[serde(default)]
    pub gemini: GeminiProviderConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub backup_api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl std::fmt::Debug for OpenAiProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProviderConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("backup_api_key", &mask_secret(&self.backup_api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("system_prompt", &self.system_prompt)
            .finish()
    }
}

fn default_openai_base_url() -> String {
    openai::DEFAULT_OPENAI_BASE_URL.to_string()
}

fn default_openai_model() -> String {
    openai::DEFAULT_OPENAI_MODEL.to_string()
}

fn default_system_prompt() -> String {
    openai::DEFAULT_SYSTEM_PROMPT.to_string()
}

impl Default for OpenAiProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            backup_api_key: String::new(),
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            system_prompt: default_system_prompt(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GeminiProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub backup_api_key: String,
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    #[serde(default = "default_gemini_model")]
    pub model: String,
    /// Deadline for the startup probe that decides Gemini availability
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl std::fmt::Debug for GeminiProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProviderConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("backup_api_key", &mask_secret(&self.backup_api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("probe_timeout_secs", &self.probe_timeout_secs)
            .finish()
    }
}

fn default_gemini_base_url() -> String {
    google::DEFAULT_GEMINI_BASE_URL.to_string()
}

fn default_gemini_model() -> String {
    google::DEFAULT_GEMINI_MODEL.to_string()
}

fn default_probe_timeout_secs() -> u64 {
    15
}

impl Default for GeminiProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            backup_api_key: String::new(),
            base_url: default_gemini_base_url(),
            model: default_gemini_model(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".oblaka")
}

impl OblakaConfig {
    /// Load configuration: defaults, then the TOML file, then the process
    /// environment.
    ///
    /// An explicit `--config` path must exist. The default location
    /// (`~/.oblaka/config.toml`) is optional so the service can run from
    /// environment variables alone.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let mut config = match custom_path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = config_dir().join("config.toml");
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    debug!("No config at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };

        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `oblaka init` first.",
                path.display()
            )
        })?;

        // Checked on the raw text; expansion would make env-sourced keys look literal
        for key in hardcoded_keys(&content) {
            warn!(
                "{} is hardcoded in config file. For security, use environment variables: api_key = \"${{OPENAI_API_KEY}}\"",
                key
            );
        }

        // Expand environment variables before parsing
        let expanded = expand_env_vars(&content);

        let config: Self = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        Ok(config)
    }

    /// Environment variables win over file values when set and non-blank.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("OPENAI_API_KEY") {
            self.providers.openai.api_key = v;
        }
        if let Some(v) = get("OPENAI_API_KEY2") {
            self.providers.openai.backup_api_key = v;
        }
        if let Some(v) = get("GEMINI_API_KEY") {
            self.providers.gemini.api_key = v;
        }
        if let Some(v) = get("GEMINI_API_KEY2") {
            self.providers.gemini.backup_api_key = v;
        }
        if let Some(v) = get("GEMINI_MODEL") {
            self.providers.gemini.model = v;
        }
        if let Some(v) = get("OBLAKA_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = get("OBLAKA_PORT") {
            match v.trim().parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!("Ignoring invalid OBLAKA_PORT value '{}'", v),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, base_url) in [
            ("providers.openai.base_url", &self.providers.openai.base_url),
            ("providers.gemini.base_url", &self.providers.gemini.base_url),
        ] {
            let parsed = url::Url::parse(base_url)
                .with_context(|| format!("{} is not a valid URL: {}", name, base_url))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(anyhow!("{} must use http or https: {}", name, base_url));
            }
        }
        if self.server.request_timeout_secs == 0 {
            return Err(anyhow!("server.request_timeout_secs must be greater than 0"));
        }
        self.server.socket_addr()?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn to_pool_config(&self) -> PoolConfig {
        let openai = &self.providers.openai;
        let gemini = &self.providers.gemini;

        PoolConfig {
            openai: OpenAiSettings {
                keys: keys(&openai.api_key, &openai.backup_api_key),
                base_url: openai.base_url.clone(),
                model: openai.model.clone(),
                system_prompt: openai.system_prompt.clone(),
            },
            gemini: GeminiSettings {
                keys: keys(&gemini.api_key, &gemini.backup_api_key),
                base_url: gemini.base_url.clone(),
                model: gemini.model.clone(),
            },
            http_timeout: self.request_timeout(),
            probe_timeout: Duration::from_secs(gemini.probe_timeout_secs),
        }
    }
}

fn keys(primary: &str, backup: &str) -> ProviderKeys {
    let non_empty = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };
    ProviderKeys::new(non_empty(primary), non_empty(backup))
}

/// Secret fields of the raw config file that hold a literal value instead
/// of a `${VAR}` reference
fn hardcoded_keys(raw: &str) -> Vec<String> {
    let Ok(table) = raw.parse::<toml::Table>() else {
        return Vec::new();
    };
    let Some(providers) = table.get("providers").and_then(|v| v.as_table()) else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for provider in ["openai", "gemini"] {
        let Some(section) = providers.get(provider).and_then(|v| v.as_table()) else {
            continue;
        };
        for field in ["api_key", "backup_api_key"] {
            if let Some(value) = section.get(field).and_then(|v| v.as_str()) {
                if !value.is_empty() && !value.contains("${") {
                    found.push(format!("providers.{}.{}", provider, field));
                }
            }
        }
    }
    found
}

/// Allowlist of environment variable names that may be expanded in config files.
const ALLOWED_ENV_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "OPENAI_API_KEY2",
    "GEMINI_API_KEY",
    "GEMINI_API_KEY2",
    "GEMINI_MODEL",
    "OBLAKA_DEBUG_TOKEN",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str) -> String {
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

        let value = std::env::var(&var_name).unwrap_or_default();
        let value_len = value.len();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value_len;
    }
    result
}
