//! Relay configuration
//!
//! Loaded from YAML:
//!
//! ```yaml
//! apiVersion: prcard/v1
//! kind: RelayConfig
//! metadata:
//!   name: my-relay
//! spec:
//!   server:
//!     port: 8080
//!   github:
//!     webhook_secret_env: GITHUB_WEBHOOK_SECRET
//!   feishu:
//!     app_id: cli_xxx
//!     app_secret_env: FEISHU_APP_SECRET
//!     chat_id: oc_xxx
//!   state:
//!     directory: /var/lib/prcard
//! ```
//!
//! Every secret takes either a direct value or the name of an environment
//! variable; the direct value wins. Without either, the conventional
//! variable (`GITHUB_TOKEN`, `FEISHU_APP_SECRET`, ...) is consulted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use prcard_core::{RelayError, RelayResult, DEFAULT_MAX_MAPPINGS, DEFAULT_TOKEN_BUFFER_SECS};
use prcard_triggers::{FeishuConfig, GitHubConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "prcard.yaml";

const GITHUB_WEBHOOK_SECRET_ENV: &str = "GITHUB_WEBHOOK_SECRET";
const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
const FEISHU_APP_ID_ENV: &str = "FEISHU_APP_ID";
const FEISHU_APP_SECRET_ENV: &str = "FEISHU_APP_SECRET";
const FEISHU_CHAT_ID_ENV: &str = "FEISHU_CHAT_ID";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

// ============================================================================
// FILE SCHEMA
// ============================================================================

/// Relay configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfigFile {
    /// API version (prcard/v1)
    #[serde(rename = "apiVersion", default)]
    pub api_version: Option<String>,

    /// Kind (RelayConfig)
    #[serde(default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub metadata: ConfigMetadata,

    #[serde(default)]
    pub spec: RelaySpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub name: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelaySpec {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub github: GitHubSection,

    #[serde(default)]
    pub feishu: FeishuSection,

    #[serde(default)]
    pub state: StateConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Timeout for every outbound API call
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Largest accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            timeout_secs: default_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_port() -> u16 {
    8080
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubSection {
    pub webhook_secret: Option<String>,
    pub webhook_secret_env: Option<String>,

    pub token: Option<String>,
    pub token_env: Option<String>,

    #[serde(default = "default_github_api_url")]
    pub api_url: String,
}

impl Default for GitHubSection {
    fn default() -> Self {
        Self {
            webhook_secret: None,
            webhook_secret_env: None,
            token: None,
            token_env: None,
            api_url: default_github_api_url(),
        }
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeishuSection {
    pub app_id: Option<String>,
    pub app_id_env: Option<String>,

    pub app_secret: Option<String>,
    pub app_secret_env: Option<String>,

    /// Group chat receiving the cards
    pub chat_id: Option<String>,
    pub chat_id_env: Option<String>,

    /// `https://open.larksuite.com` for Lark
    #[serde(default = "default_feishu_api_url")]
    pub api_url: String,

    /// Safety margin subtracted from token lifetimes
    #[serde(default = "default_token_buffer")]
    pub token_buffer_secs: i64,
}

impl Default for FeishuSection {
    fn default() -> Self {
        Self {
            app_id: None,
            app_id_env: None,
            app_secret: None,
            app_secret_env: None,
            chat_id: None,
            chat_id_env: None,
            api_url: default_feishu_api_url(),
            token_buffer_secs: default_token_buffer(),
        }
    }
}

fn default_feishu_api_url() -> String {
    "https://open.feishu.cn".to_string()
}

fn default_token_buffer() -> i64 {
    DEFAULT_TOKEN_BUFFER_SECS
}

/// Where the persisted state lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_dir")]
    pub directory: PathBuf,

    #[serde(default = "default_token_file")]
    pub token_file: String,

    #[serde(default = "default_message_map_file")]
    pub message_map_file: String,

    /// Cap on remembered PR -> message mappings
    #[serde(default = "default_max_mappings")]
    pub max_mappings: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            directory: default_state_dir(),
            token_file: default_token_file(),
            message_map_file: default_message_map_file(),
            max_mappings: default_max_mappings(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_token_file() -> String {
    ".feishu_token".to_string()
}

fn default_message_map_file() -> String {
    ".pr_message_map".to_string()
}

fn default_max_mappings() -> usize {
    DEFAULT_MAX_MAPPINGS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also append plain log lines to this file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

// ============================================================================
// LOADING
// ============================================================================

/// Candidate locations searched when no file is given explicitly
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from(CONFIG_FILE_NAME),
        PathBuf::from("/etc/prcard").join(CONFIG_FILE_NAME),
    ];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".prcard").join(CONFIG_FILE_NAME));
    }
    paths
}

impl RelayConfigFile {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `explicit`, or the first existing search path, or defaults.
    ///
    /// Returns the file actually read alongside the configuration.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::from_file(path)?, Some(path.to_path_buf())));
        }

        for path in search_paths() {
            if path.is_file() {
                return Ok((Self::from_file(&path)?, Some(path)));
            }
        }

        Ok((Self::default(), None))
    }

    /// Resolve secrets from the process environment
    pub fn resolve(self, source: Option<PathBuf>) -> Settings {
        self.resolve_with(source, |name| std::env::var(name).ok())
    }

    /// Resolve secrets using `lookup` for environment variables
    pub fn resolve_with<F>(self, source: Option<PathBuf>, lookup: F) -> Settings
    where
        F: Fn(&str) -> Option<String>,
    {
        let RelaySpec {
            server,
            github,
            feishu,
            state,
            logging,
        } = self.spec;

        let resolve = |direct: Option<String>, env_name: Option<String>, fallback: &str| {
            resolve_env_value(direct, env_name.as_deref().unwrap_or(fallback), &lookup)
        };

        let github = GitHubConfig {
            webhook_secret: resolve(
                github.webhook_secret,
                github.webhook_secret_env,
                GITHUB_WEBHOOK_SECRET_ENV,
            ),
            token: resolve(github.token, github.token_env, GITHUB_TOKEN_ENV),
            api_url: github.api_url,
            timeout_secs: server.timeout_secs,
        };

        let feishu_config = FeishuConfig {
            app_id: resolve(feishu.app_id, feishu.app_id_env, FEISHU_APP_ID_ENV)
                .unwrap_or_default(),
            app_secret: resolve(feishu.app_secret, feishu.app_secret_env, FEISHU_APP_SECRET_ENV)
                .unwrap_or_default(),
            chat_id: resolve(feishu.chat_id, feishu.chat_id_env, FEISHU_CHAT_ID_ENV)
                .unwrap_or_default(),
            api_url: feishu.api_url,
            timeout_secs: server.timeout_secs,
        };

        Settings {
            name: self.metadata.name,
            source,
            token_path: state.directory.join(&state.token_file),
            message_map_path: state.directory.join(&state.message_map_file),
            max_mappings: state.max_mappings,
            token_buffer_secs: feishu.token_buffer_secs,
            server,
            github,
            feishu: feishu_config,
            logging,
        }
    }
}

/// Direct value first, then the environment variable. Empty strings count as unset.
fn resolve_env_value<F>(direct: Option<String>, env_name: &str, lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    direct
        .filter(|v| !v.is_empty())
        .or_else(|| lookup(env_name).filter(|v| !v.is_empty()))
}

// ============================================================================
// RESOLVED SETTINGS
// ============================================================================

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub name: Option<String>,
    /// File the settings were read from, if any
    pub source: Option<PathBuf>,
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub feishu: FeishuConfig,
    pub token_buffer_secs: i64,
    pub token_path: PathBuf,
    pub message_map_path: PathBuf,
    pub max_mappings: usize,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Load and resolve in one step
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let (file, source) = RelayConfigFile::discover(explicit)?;
        Ok(file.resolve(source))
    }

    /// Check that everything needed to post cards is present
    pub fn validate(&self) -> RelayResult<()> {
        let mut missing = Vec::new();
        if self.feishu.app_id.is_empty() {
            missing.push(format!("feishu.app_id (or {})", FEISHU_APP_ID_ENV));
        }
        if self.feishu.app_secret.is_empty() {
            missing.push(format!("feishu.app_secret (or {})", FEISHU_APP_SECRET_ENV));
        }
        if self.feishu.chat_id.is_empty() {
            missing.push(format!("feishu.chat_id (or {})", FEISHU_CHAT_ID_ENV));
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(RelayError::config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Show only the first few characters of a secret
pub fn mask_secret(secret: Option<&str>) -> String {
    match secret {
        None | Some("") => "(not set)".to_string(),
        Some(s) if s.chars().count() <= 8 => "****".to_string(),
        Some(s) => format!("{}****", s.chars().take(4).collect::<String>()),
    }
}
