//! Workflow configuration.
//!
//! Loaded from a YAML file, then overridden from `HALL_MONITOR_*`
//! environment variables, then from command-line flags. The resulting value
//! is immutable for the rest of the run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::git::{is_plain_dir_name, validate_git_ref, DEFAULT_REMOTE};
use crate::registry::{DEFAULT_MAX_CONCURRENT_QUERIES, DEFAULT_QUAY_API_BASE};
use crate::update::driver::{DEFAULT_CHECKOUT_BRANCH, DEFAULT_FLOATING_BRANCH};

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

const ENV_PREFIX: &str = "HALL_MONITOR_";

/// Configuration for one hall-monitor run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    // Inputs
    /// JSON object file mapping service name to registry path.
    pub repos_config: PathBuf,
    /// Restrict the run to these services; empty means all.
    pub services: Vec<String>,

    // Inspection
    /// Recency window in days.
    pub quick_search_days: u32,
    pub registry_api_base: String,
    pub request_timeout_secs: u64,
    pub max_concurrent_queries: usize,

    // Remediation
    /// Branch checked out and pushed in each working copy.
    pub branch: String,
    /// Floating branch pipeline references are rewritten to.
    pub pipeline_branch: String,
    pub remote: String,
    /// Directory containing one working copy per repository.
    pub git_repos_dir: Option<PathBuf>,
    pub dry_run: bool,
    /// Service name → repository directory name, for services sharing a
    /// repository.
    pub repo_aliases: BTreeMap<String, String>,
    pub max_concurrent_updates: usize,
    /// Stop starting new update pipelines after this many seconds.
    pub run_timeout_secs: Option<u64>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            repos_config: PathBuf::from("repos.json"),
            services: Vec::new(),

            quick_search_days: 14,
            registry_api_base: DEFAULT_QUAY_API_BASE.to_string(),
            request_timeout_secs: 30,
            max_concurrent_queries: DEFAULT_MAX_CONCURRENT_QUERIES,

            branch: DEFAULT_CHECKOUT_BRANCH.to_string(),
            pipeline_branch: DEFAULT_FLOATING_BRANCH.to_string(),
            remote: DEFAULT_REMOTE.to_string(),
            git_repos_dir: None,
            dry_run: false,
            repo_aliases: BTreeMap::new(),
            max_concurrent_updates: 1,
            run_timeout_secs: None,
        }
    }
}

impl WorkflowConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a YAML file. An empty file yields defaults.
    ///
    /// # Errors
    ///
    /// `ConfigError::NotFound` when the file does not exist,
    /// `ConfigError::Yaml` when it is not valid YAML for this schema.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(display.clone())
            } else {
                ConfigError::Io {
                    path: display.clone(),
                    source: e,
                }
            }
        })?;
        Self::from_yaml_str(&content, &display)
    }

    pub fn from_yaml_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|source| ConfigError::Yaml {
            path: origin.to_string(),
            source,
        })
    }

    /// Apply `HALL_MONITOR_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which receives full variable names.
    ///
    /// # Environment Variables
    ///
    /// - `HALL_MONITOR_REPOS_CONFIG`
    /// - `HALL_MONITOR_SERVICES`: comma-separated
    /// - `HALL_MONITOR_QUICK_SEARCH_DAYS`
    /// - `HALL_MONITOR_REGISTRY_API_BASE`
    /// - `HALL_MONITOR_REQUEST_TIMEOUT_SECS`
    /// - `HALL_MONITOR_MAX_CONCURRENT_QUERIES`
    /// - `HALL_MONITOR_BRANCH`
    /// - `HALL_MONITOR_PIPELINE_BRANCH`
    /// - `HALL_MONITOR_REMOTE`
    /// - `HALL_MONITOR_GIT_REPOS_DIR`
    /// - `HALL_MONITOR_DRY_RUN`
    /// - `HALL_MONITOR_MAX_CONCURRENT_UPDATES`
    /// - `HALL_MONITOR_RUN_TIMEOUT_SECS`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|val| (key, val))
        };

        if let Some((_, val)) = get("REPOS_CONFIG") {
            self.repos_config = PathBuf::from(val);
        }
        if let Some((_, val)) = get("SERVICES") {
            self.services = split_list(&val);
        }
        if let Some((key, val)) = get("QUICK_SEARCH_DAYS") {
            self.quick_search_days = parse_env_value(&val, &key)?;
        }
        if let Some((_, val)) = get("REGISTRY_API_BASE") {
            self.registry_api_base = val;
        }
        if let Some((key, val)) = get("REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_env_value(&val, &key)?;
        }
        if let Some((key, val)) = get("MAX_CONCURRENT_QUERIES") {
            self.max_concurrent_queries = parse_env_value(&val, &key)?;
        }
        if let Some((_, val)) = get("BRANCH") {
            self.branch = val;
        }
        if let Some((_, val)) = get("PIPELINE_BRANCH") {
            self.pipeline_branch = val;
        }
        if let Some((_, val)) = get("REMOTE") {
            self.remote = val;
        }
        if let Some((_, val)) = get("GIT_REPOS_DIR") {
            self.git_repos_dir = Some(PathBuf::from(val));
        }
        if let Some((key, val)) = get("DRY_RUN") {
            self.dry_run = parse_env_bool(&val, &key)?;
        }
        if let Some((key, val)) = get("MAX_CONCURRENT_UPDATES") {
            self.max_concurrent_updates = parse_env_value(&val, &key)?;
        }
        if let Some((key, val)) = get("RUN_TIMEOUT_SECS") {
            self.run_timeout_secs = Some(parse_env_value(&val, &key)?);
        }
        Ok(())
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quick_search_days == 0 {
            return Err(invalid("quick_search_days", "must be greater than 0"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", "must be greater than 0"));
        }
        if self.max_concurrent_queries == 0 {
            return Err(invalid("max_concurrent_queries", "must be greater than 0"));
        }
        if self.max_concurrent_updates == 0 {
            return Err(invalid("max_concurrent_updates", "must be greater than 0"));
        }
        if self.run_timeout_secs == Some(0) {
            return Err(invalid("run_timeout_secs", "must be greater than 0"));
        }
        if self.registry_api_base.trim().is_empty() {
            return Err(invalid("registry_api_base", "cannot be empty"));
        }

        for (key, value) in [
            ("branch", &self.branch),
            ("pipeline_branch", &self.pipeline_branch),
            ("remote", &self.remote),
        ] {
            validate_git_ref(value).map_err(|e| invalid(key, &e.to_string()))?;
        }

        for (service, repo) in &self.repo_aliases {
            if !is_plain_dir_name(repo) {
                return Err(invalid(
                    "repo_aliases",
                    &format!("alias for '{service}' must be a plain directory name, got '{repo}'"),
                ));
            }
        }

        // Unaliased services name their working copy directly.
        for service in &self.services {
            if !self.repo_aliases.contains_key(service) && !is_plain_dir_name(service) {
                return Err(invalid(
                    "services",
                    &format!("'{service}' is not a plain directory name"),
                ));
            }
        }

        Ok(())
    }

    /// The working-copy root, checked to exist.
    ///
    /// # Errors
    ///
    /// `ConfigError::MissingWorkingCopyRoot` when unset or not a directory.
    pub fn require_repos_dir(&self) -> Result<&Path, ConfigError> {
        let dir = self.git_repos_dir.as_deref().ok_or_else(|| {
            ConfigError::MissingWorkingCopyRoot("git_repos_dir is not configured".to_string())
        })?;
        if !dir.is_dir() {
            return Err(ConfigError::MissingWorkingCopyRoot(dir.display().to_string()));
        }
        Ok(dir)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    /// Builder method to set the recency window.
    pub fn with_days(mut self, days: u32) -> Self {
        self.quick_search_days = days;
        self
    }

    pub fn with_services(mut self, services: Vec<String>) -> Self {
        self.services = services;
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_pipeline_branch(mut self, branch: impl Into<String>) -> Self {
        self.pipeline_branch = branch.into();
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_repos_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.repos_config = path.into();
        self
    }

    pub fn with_git_repos_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.git_repos_dir = Some(dir.into());
        self
    }

    pub fn with_repo_aliases(mut self, aliases: BTreeMap<String, String>) -> Self {
        self.repo_aliases = aliases;
        self
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

/// Split a comma-separated list, dropping blanks.
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}
