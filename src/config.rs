//! Configuration for quire, read from `.quire/quire.toml`.
//!
//! Layered: file → environment → CLI flags. Every field has a default, so an
//! empty or missing file is a valid configuration.
//!
//! # Configuration File Format
//!
//! ```toml
//! [backend]
//! kind = "cli"
//! command = "claude"
//! args = ["--print"]
//! timeout_secs = 300
//!
//! [retry]
//! max_attempts = 5
//! initial_backoff_ms = 1000
//! max_backoff_ms = 60000
//!
//! [extraction]
//! chunk_size = 50000
//! max_concurrency = 1
//!
//! [fixes]
//! window_radius = 200
//! fallback_radius = 1500
//! ```
//!
//! Environment overrides: `QUIRE_GENERATE_CMD` (command line for the CLI
//! backend, split with shell quoting rules so `'/opt/my tools/gen' --print`
//! works; switches `kind` to `cli`), `QUIRE_MODEL`, `QUIRE_BASE_URL`,
//! `QUIRE_MAX_CONCURRENCY`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::backend::{
    CliBackend, GenerationBackend, GuardedBackend, HttpBackend, RetryPolicy, UsageMeter,
};
use crate::cancel::CancellationRegistry;
use crate::extract::ExtractionConfig;
use crate::fix::FixConfig;

/// Which generation backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Spawn a local command, prompt on stdin
    #[default]
    Cli,
    /// OpenAI-compatible chat completions endpoint
    Http,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Cli => write!(f, "cli"),
            BackendKind::Http => write!(f, "http"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cli" => Ok(BackendKind::Cli),
            "http" => Ok(BackendKind::Http),
            _ => anyhow::bail!("Invalid backend kind '{}'. Valid values: cli, http", s),
        }
    }
}

/// `[backend]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSection {
    #[serde(default)]
    pub kind: BackendKind,
    /// Command for the CLI backend (default: "claude")
    #[serde(default = "default_command")]
    pub command: String,
    /// Arguments passed to the command (default: ["--print"])
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Base URL for the HTTP backend
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model name sent to the HTTP backend
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the HTTP API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Per-call timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_command() -> String {
    "claude".to_string()
}

fn default_args() -> Vec<String> {
    vec!["--print".to_string()]
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            command: default_command(),
            args: default_args(),
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// `[retry]` section: transient failure handling for every backend call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    60_000
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetrySection {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// `[extraction]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSection {
    /// Maximum characters per segment
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Generation calls in flight at once (1 = sequential)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_extraction_max_tokens")]
    pub max_tokens: u32,
}

fn default_chunk_size() -> usize {
    50_000
}

fn default_max_concurrency() -> usize {
    1
}

fn default_extraction_max_tokens() -> u32 {
    4000
}

impl Default for ExtractionSection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_concurrency: default_max_concurrency(),
            max_tokens: default_extraction_max_tokens(),
        }
    }
}

impl ExtractionSection {
    pub fn to_extraction_config(&self) -> ExtractionConfig {
        ExtractionConfig {
            chunk_size: self.chunk_size.max(1),
            max_concurrency: self.max_concurrency.max(1),
            max_tokens: self.max_tokens,
        }
    }
}

/// `[fixes]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixesSection {
    /// Characters kept on each side of the anchor in the rewrite window
    #[serde(default = "default_window_radius")]
    pub window_radius: usize,
    /// Characters on each side of the midpoint when no anchor is usable
    #[serde(default = "default_fallback_radius")]
    pub fallback_radius: usize,
    #[serde(default = "default_fix_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_fix_temperature")]
    pub temperature: f32,
}

fn default_window_radius() -> usize {
    200
}

fn default_fallback_radius() -> usize {
    1500
}

fn default_fix_max_tokens() -> u32 {
    1000
}

fn default_fix_temperature() -> f32 {
    0.3
}

impl Default for FixesSection {
    fn default() -> Self {
        Self {
            window_radius: default_window_radius(),
            fallback_radius: default_fallback_radius(),
            max_tokens: default_fix_max_tokens(),
            temperature: default_fix_temperature(),
        }
    }
}

impl FixesSection {
    pub fn to_fix_config(&self) -> FixConfig {
        FixConfig {
            window_radius: self.window_radius,
            fallback_radius: self.fallback_radius,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

/// The complete quire.toml configuration structure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QuireToml {
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub extraction: ExtractionSection,
    #[serde(default)]
    pub fixes: FixesSection,
}

impl QuireToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse quire.toml")
    }

    /// Load `.quire/quire.toml`, or defaults when the file doesn't exist.
    pub fn load_or_default(quire_dir: &Path) -> Result<Self> {
        let config_path = quire_dir.join("quire.toml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize quire.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides from `lookup`.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(cmd) = lookup("QUIRE_GENERATE_CMD") {
            match shlex::split(&cmd) {
                Some(parts) if !parts.is_empty() => {
                    let mut parts = parts.into_iter();
                    self.backend.kind = BackendKind::Cli;
                    self.backend.command = parts.next().unwrap_or_default();
                    self.backend.args = parts.collect();
                }
                _ => warn!(value = %cmd, "Ignoring malformed QUIRE_GENERATE_CMD"),
            }
        }
        if let Some(model) = lookup("QUIRE_MODEL") {
            self.backend.model = model;
        }
        if let Some(url) = lookup("QUIRE_BASE_URL") {
            self.backend.base_url = url;
        }
        if let Some(raw) = lookup("QUIRE_MAX_CONCURRENCY") {
            match raw.parse::<usize>() {
                Ok(n) => self.extraction.max_concurrency = n,
                Err(_) => warn!(value = %raw, "Ignoring invalid QUIRE_MAX_CONCURRENCY"),
            }
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.backend.command.trim().is_empty() && self.backend.kind == BackendKind::Cli {
            warnings.push("backend.command is empty".to_string());
        }
        if self.backend.kind == BackendKind::Http {
            if !self.backend.base_url.starts_with("http") {
                warnings.push(format!(
                    "backend.base_url '{}' is not an http(s) URL",
                    self.backend.base_url
                ));
            }
            if self.backend.model.trim().is_empty() {
                warnings.push("backend.model is empty".to_string());
            }
        }
        if self.backend.timeout_secs == 0 {
            warnings.push("backend.timeout_secs is 0; every call will time out".to_string());
        }
        if self.retry.max_attempts == 0 {
            warnings.push("retry.max_attempts is 0; treating as 1".to_string());
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            warnings.push(format!(
                "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
                self.retry.initial_backoff_ms, self.retry.max_backoff_ms
            ));
        }
        if self.extraction.chunk_size == 0 {
            warnings.push("extraction.chunk_size is 0; treating as 1".to_string());
        }
        if self.extraction.max_concurrency == 0 {
            warnings.push("extraction.max_concurrency is 0; treating as 1".to_string());
        }
        if !(0.0..=2.0).contains(&self.fixes.temperature) {
            warnings.push(format!(
                "fixes.temperature {} is outside 0.0..=2.0",
                self.fixes.temperature
            ));
        }
        if self.fixes.window_radius == 0 {
            warnings.push("fixes.window_radius is 0; rewrites will only see the anchor".to_string());
        }

        warnings
    }
}

/// Resolved configuration for one project directory.
///
/// Merges settings from:
/// 1. quire.toml file
/// 2. Environment variables
/// 3. CLI arguments
#[derive(Debug, Clone)]
pub struct QuireConfig {
    pub project_dir: PathBuf,
    /// Path to the .quire directory
    pub quire_dir: PathBuf,
    pub toml: QuireToml,
    pub verbose: bool,
}

impl QuireConfig {
    /// Load configuration for `project_dir` (file, then environment).
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let quire_dir = project_dir.join(".quire");
        let mut toml = QuireToml::load_or_default(&quire_dir)?;
        toml.apply_env();

        Ok(Self {
            project_dir,
            quire_dir,
            toml,
            verbose: false,
        })
    }

    /// Create QuireConfig with CLI overrides.
    pub fn with_cli_args(
        project_dir: PathBuf,
        verbose: bool,
        max_concurrency: Option<usize>,
    ) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.verbose = verbose;
        if let Some(n) = max_concurrency {
            config.toml.extraction.max_concurrency = n;
        }
        Ok(config)
    }

    pub fn config_file(&self) -> PathBuf {
        self.quire_dir.join("quire.toml")
    }

    pub fn is_initialized(&self) -> bool {
        self.quire_dir.is_dir()
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }

    pub fn extraction_config(&self) -> ExtractionConfig {
        self.toml.extraction.to_extraction_config()
    }

    pub fn fix_config(&self) -> FixConfig {
        self.toml.fixes.to_fix_config()
    }

    /// Build the configured backend wrapped in retry and cancellation guards.
    pub fn build_backend(
        &self,
        registry: CancellationRegistry,
        meter: UsageMeter,
    ) -> Result<Arc<dyn GenerationBackend>> {
        let section = &self.toml.backend;
        let timeout = Duration::from_secs(section.timeout_secs);
        let inner: Arc<dyn GenerationBackend> = match section.kind {
            BackendKind::Cli => Arc::new(
                CliBackend::new(&section.command)
                    .with_args(section.args.clone())
                    .with_timeout(timeout)
                    .with_working_dir(self.project_dir.clone()),
            ),
            BackendKind::Http => {
                let api_key = std::env::var(&section.api_key_env).ok();
                if api_key.is_none() {
                    warn!(
                        env = %section.api_key_env,
                        "API key variable not set; requests will be unauthenticated"
                    );
                }
                Arc::new(HttpBackend::new(
                    &section.base_url,
                    &section.model,
                    api_key,
                    timeout,
                )?)
            }
        };

        Ok(Arc::new(
            GuardedBackend::new(inner, registry, self.toml.retry.to_policy()).with_meter(meter),
        ))
    }
}
