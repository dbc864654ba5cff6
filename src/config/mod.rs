//! Configuration: TOML file, `.env`, then environment overlay.
//!
//! Lookup order for the file is `--config <path>`, `./medic.toml`, then
//! `<config dir>/medic/config.toml`. A missing file means defaults.
//! Credentials are only ever read from the environment.

mod env;

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::MedicError;
use crate::validation::RepoName;

pub use env::apply_env_overlay;

pub const LOCAL_CONFIG_FILE: &str = "medic.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    #[default]
    OpenAi,
    Anthropic,
}

impl AiProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiProvider::OpenAi => "openai",
            AiProvider::Anthropic => "anthropic",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            AiProvider::OpenAi => "gpt-4",
            AiProvider::Anthropic => "claude-sonnet-4-5",
        }
    }

    pub fn key_env_var(&self) -> &'static str {
        match self {
            AiProvider::OpenAi => "OPENAI_API_KEY",
            AiProvider::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl std::str::FromStr for AiProvider {
    type Err = MedicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(AiProvider::OpenAi),
            "anthropic" => Ok(AiProvider::Anthropic),
            other => Err(MedicError::InvalidConfig(format!(
                "Invalid AI_PROVIDER: {other} (expected openai or anthropic)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitMode {
    /// Git data API; no local checkout needed
    #[default]
    Api,
    /// Git CLI against a configured local checkout
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: String,
    pub org: Option<String>,
    pub repositories: Vec<RepoName>,
    /// Globs over `owner/name`; empty means everything
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    /// Run conclusions treated as failures
    pub conclusions: Vec<String>,
    pub lookback_hours: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            org: None,
            repositories: Vec::new(),
            allow: Vec::new(),
            deny: Vec::new(),
            conclusions: vec!["failure".to_string(), "timed_out".to_string()],
            lookback_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub provider: AiProvider,
    /// Defaults per provider when unset
    pub model: Option<String>,
    /// Override for OpenAI-compatible or proxied endpoints
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub ai_fix_min_confidence: f64,
    pub request_timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: AiProvider::OpenAi,
            model: None,
            base_url: None,
            max_tokens: 2000,
            ai_fix_min_confidence: 0.7,
            request_timeout_secs: 120,
        }
    }
}

impl AiConfig {
    pub fn effective_model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub exponential_backoff: bool,
    pub max_delay_secs: u64,
    /// Longest in-process wait per failure; longer waits defer to the next run
    pub max_inline_wait_secs: u64,
    pub rerun_poll_interval_secs: u64,
    pub rerun_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 60,
            exponential_backoff: true,
            max_delay_secs: 3600,
            max_inline_wait_secs: 0,
            rerun_poll_interval_secs: 30,
            rerun_timeout_secs: 10800,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub create_issues: bool,
    pub assignees: Vec<String>,
    pub label: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            create_issues: true,
            assignees: Vec::new(),
            label: "workflow-failure".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalCommitConfig {
    pub remote: String,
    pub push: bool,
    /// `owner/name` -> path of a local clone
    pub checkouts: BTreeMap<String, PathBuf>,
}

impl Default for LocalCommitConfig {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            push: true,
            checkouts: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    pub mode: CommitMode,
    pub branch_prefix: String,
    pub open_pull_request: bool,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub local: LocalCommitConfig,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            mode: CommitMode::Api,
            branch_prefix: "medic/".to_string(),
            open_pull_request: false,
            author_name: None,
            author_email: None,
            local: LocalCommitConfig::default(),
        }
    }
}

pub const DEFAULT_ALLOWED_PATHS: &[&str] = &[
    ".github/workflows/*.yml",
    ".github/workflows/*.yaml",
    "**/package.json",
    "**/requirements*.txt",
    "**/pyproject.toml",
    "**/Cargo.toml",
    "**/go.mod",
    "**/Gemfile",
    "**/.nvmrc",
    "**/.python-version",
    "**/.tool-versions",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub allowed_paths: Vec<String>,
    pub max_files: usize,
    pub max_file_bytes: usize,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            allowed_paths: DEFAULT_ALLOWED_PATHS.iter().map(|s| s.to_string()).collect(),
            max_files: 5,
            max_file_bytes: 256 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub host: String,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

/// Secrets from the environment. Never serialised, never printed.
#[derive(Clone, Default, PartialEq)]
pub struct Credentials {
    pub github_token: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
}

impl Credentials {
    pub fn ai_key(&self, provider: AiProvider) -> Option<&str> {
        match provider {
            AiProvider::OpenAi => self.openai_api_key.as_deref(),
            AiProvider::Anthropic => self.anthropic_api_key.as_deref(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("github_token", &mask(&self.github_token))
            .field("openai_api_key", &mask(&self.openai_api_key))
            .field("anthropic_api_key", &mask(&self.anthropic_api_key))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub ai: AiConfig,
    pub retry: RetryConfig,
    pub notify: NotifyConfig,
    pub commit: CommitConfig,
    pub safety: SafetyConfig,
    pub dashboard: DashboardConfig,
    pub state_dir: PathBuf,
    pub parallel_repos: usize,
    pub log_format: LogFormat,
    #[serde(skip)]
    pub credentials: Credentials,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github: GitHubConfig::default(),
            ai: AiConfig::default(),
            retry: RetryConfig::default(),
            notify: NotifyConfig::default(),
            commit: CommitConfig::default(),
            safety: SafetyConfig::default(),
            dashboard: DashboardConfig::default(),
            state_dir: PathBuf::from(".medic"),
            parallel_repos: 1,
            log_format: LogFormat::Text,
            credentials: Credentials::default(),
        }
    }
}

/// Which command is about to run; decides what must be configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Monitor,
    Scan,
    Dashboard,
    Status,
    Completions,
}

impl Config {
    /// Load `.env`, the config file (if any) and the environment overlay.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match Self::resolve_path(explicit)? {
            Some(path) => Self::from_file(&path)?,
            None => {
                tracing::debug!("no config file found, using defaults");
                Self::default()
            }
        };

        apply_env_overlay(&mut config, |key| std::env::var(key).ok())
            .context("Failed to apply environment configuration")?;
        Ok(config)
    }

    /// Pick the config file. An explicit path must exist.
    pub fn resolve_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            return Ok(Some(path.to_path_buf()));
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Ok(Some(local));
        }

        Ok(dirs::config_dir()
            .map(|dir| dir.join("medic").join("config.toml"))
            .filter(|path| path.exists()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Every configuration problem for `command`, empty when it may run.
    pub fn problems_for(&self, command: CommandKind) -> Vec<String> {
        let mut problems = Vec::new();

        let needs_github = matches!(command, CommandKind::Monitor | CommandKind::Scan);
        let needs_ai = command == CommandKind::Monitor;

        if needs_github && self.credentials.github_token.as_deref().unwrap_or("").is_empty() {
            problems.push("GITHUB_TOKEN is required".to_string());
        }

        if needs_ai
            && self
                .credentials
                .ai_key(self.ai.provider)
                .unwrap_or("")
                .is_empty()
        {
            problems.push(format!(
                "{} is required when AI_PROVIDER is '{}'",
                self.ai.provider.key_env_var(),
                self.ai.provider.as_str()
            ));
        }

        if needs_github {
            if reqwest::Url::parse(&self.github.api_url).is_err() {
                problems.push(format!("github.api_url is not a URL: {}", self.github.api_url));
            }
            if self.github.conclusions.is_empty() {
                problems.push("github.conclusions must not be empty".to_string());
            }
            for pattern in self.github.allow.iter().chain(self.github.deny.iter()) {
                if glob::Pattern::new(pattern).is_err() {
                    problems.push(format!("invalid repository glob: {pattern}"));
                }
            }
        }

        if command == CommandKind::Monitor {
            if self.retry.max_attempts == 0 {
                problems.push("retry.max_attempts must be at least 1".to_string());
            }
            if !(0.0..=1.0).contains(&self.ai.ai_fix_min_confidence) {
                problems.push("ai.ai_fix_min_confidence must be between 0 and 1".to_string());
            }
            if self.parallel_repos == 0 {
                problems.push("parallel_repos must be at least 1".to_string());
            }
            if self.commit.branch_prefix.trim().is_empty() {
                problems.push("commit.branch_prefix must not be empty".to_string());
            }
            for pattern in &self.safety.allowed_paths {
                if glob::Pattern::new(pattern).is_err() {
                    problems.push(format!("invalid safety.allowed_paths glob: {pattern}"));
                }
            }
            if self.commit.mode == CommitMode::Local && self.commit.local.checkouts.is_empty() {
                problems.push("commit.mode = \"local\" needs at least one commit.local.checkouts entry".to_string());
            }
        }

        problems
    }

    /// Fail with every problem at once.
    pub fn validate_for(&self, command: CommandKind) -> Result<(), MedicError> {
        let problems = self.problems_for(command);
        if problems.is_empty() {
            return Ok(());
        }
        let missing_only = problems.iter().all(|p| p.contains("is required"));
        let message = problems.join("; ");
        if missing_only {
            Err(MedicError::MissingConfig(message))
        } else {
            Err(MedicError::InvalidConfig(message))
        }
    }

    pub fn failures_dir(&self) -> PathBuf {
        self.state_dir.join("failures")
    }
}
