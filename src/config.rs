//! Agent configuration loading.
//!
//! Settings come from the environment by default. When
//! `PIPELINE_AGENT_CONFIG` names a YAML file, that file is used instead;
//! string values in it may reference `${VAR}` or `${VAR:-default}`.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::agent_core::types::{AgentSettings, DEFAULT_MAX_ITERATIONS, DEFAULT_TERMINAL_TOOL};

// ─── Defaults ────────────────────────────────────────────────────────────────

/// Environment variable naming an optional YAML config file.
pub const CONFIG_PATH_VAR: &str = "PIPELINE_AGENT_CONFIG";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "openai/Llama-4-Scout-17B-16E-W4A16";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_ISSUE_OWNER: &str = "user1";
const DEFAULT_ISSUE_REPO: &str = "mcp";

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    ReadFailed {
        path: String,
        reason: String,
    },

    #[error("failed to parse config: {reason}")]
    ParseFailed {
        reason: String,
    },

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// One tool server. A missing URL disables the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    /// `sse` or `streamable-http`; validated when the client is built.
    #[serde(default = "default_transport")]
    pub transport: String,
}

/// Completion endpoint settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
        }
    }
}

/// Where diagnosed failures are filed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IssueTarget {
    #[serde(default = "default_issue_owner")]
    pub owner: String,
    #[serde(default = "default_issue_repo")]
    pub repo: String,
}

impl Default for IssueTarget {
    fn default() -> Self {
        Self {
            owner: default_issue_owner(),
            repo: default_issue_repo(),
        }
    }
}

/// Complete agent configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub issue: IssueTarget,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_transport() -> String {
    "streamable-http".to_string()
}
fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_issue_owner() -> String {
    DEFAULT_ISSUE_OWNER.to_string()
}
fn default_issue_repo() -> String {
    DEFAULT_ISSUE_REPO.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

// ─── Loading ─────────────────────────────────────────────────────────────────

impl AgentConfig {
    /// Load from the YAML file named by `PIPELINE_AGENT_CONFIG`, or from the
    /// environment when it is unset.
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) if !path.trim().is_empty() => {
                let path = expand_tilde(path.trim());
                tracing::info!(path = %path, "loading config file");
                Self::from_yaml_file(Path::new(&path))
            }
            _ => Self::from_env(),
        }
    }

    /// Build from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let servers = vec![
            ServerConfig {
                name: "openshift".to_string(),
                url: get("MCP_OPENSHIFT_URL"),
                transport: get("MCP_OPENSHIFT_TRANSPORT").unwrap_or_else(|| "sse".to_string()),
            },
            ServerConfig {
                name: "gitea".to_string(),
                url: get("MCP_GITEA_URL"),
                transport: get("MCP_GITEA_TRANSPORT").unwrap_or_else(default_transport),
            },
        ];

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "PORT".into(),
                value: raw.clone(),
                reason: format!("{e}"),
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            servers,
            model: ModelConfig {
                base_url: get("LITELLM_URL").unwrap_or_else(default_base_url),
                api_key: get("LITELLM_API_KEY"),
                model: get("LITELLM_MODEL").unwrap_or_else(default_model),
            },
            issue: IssueTarget {
                owner: get("MCP_GITEA_USER").unwrap_or_else(default_issue_owner),
                repo: get("MCP_GITEA_REPO").unwrap_or_else(default_issue_repo),
            },
            port,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        })
    }

    /// Load a YAML file, interpolating `${VAR}` references from the process
    /// environment.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml_str(&raw, |key| std::env::var(key).ok())
    }

    /// Parse YAML text, interpolating `${VAR}` references through `lookup`.
    pub fn from_yaml_str<F>(raw: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let interpolated = interpolate_vars(raw, &lookup);
        let mut config: AgentConfig =
            serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::ParseFailed {
                reason: e.to_string(),
            })?;

        for server in &mut config.servers {
            server.url = server.url.take().filter(|u| !u.trim().is_empty());
        }
        config.model.api_key = config.model.api_key.take().filter(|k| !k.is_empty());

        if config.max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_iterations".into(),
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(config)
    }

    /// Loop settings derived from this configuration.
    pub fn agent_settings(&self) -> AgentSettings {
        AgentSettings {
            max_iterations: self.max_iterations,
            terminal_tool: DEFAULT_TERMINAL_TOOL.to_string(),
            issue_owner: self.issue.owner.clone(),
            issue_repo: self.issue.repo.clone(),
        }
    }
}

// ─── Variable interpolation ──────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_vars<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                expr.push(c);
            }
            result.push_str(&resolve_var_expr(&expr, lookup));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve `VAR` or `VAR:-default`. An unset or empty variable takes the
/// default.
fn resolve_var_expr<F>(expr: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    match expr.split_once(":-") {
        Some((name, default)) => lookup(name)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| expand_tilde(default)),
        None => lookup(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
