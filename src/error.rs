//! Error types for hall-monitor operations.
//!
//! Defines error types for each subsystem:
//! - Registry tag queries
//! - Pipeline file mutation
//! - Git working-copy operations
//! - Run configuration (fatal to the whole run)

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while querying an image registry.
///
/// These never abort a run; the classifier records them per service.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid registry path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Repository {0} not found or not public")]
    NotFound(String),

    #[error("HTTP {status} fetching tags from {repository}")]
    HttpStatus { repository: String, status: u16 },

    #[error("Registry request failed: {0}")]
    RequestFailed(String),

    #[error("Registry request timed out: {0}")]
    Timeout(String),

    #[error("Failed to decode registry response: {0}")]
    Decode(String),
}

/// Errors that can occur while rewriting pipeline definition files.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("Failed to parse pipeline file '{}': {reason}", path.display())]
    Format { path: PathBuf, reason: String },

    #[error("IO error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MutationError {
    /// Path of the pipeline file the error refers to.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Format { path, .. } | Self::Io { path, .. } => path,
        }
    }
}

/// Errors that can occur while driving git in a working copy.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Branch '{branch}' not found on remote '{remote}'")]
    BranchNotFoundOnRemote { remote: String, branch: String },

    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Invalid git ref: {0}")]
    InvalidRef(String),

    #[error("Failed to spawn git: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-level failures. Any of these aborts the run before
/// per-service processing starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid YAML in config file '{path}': {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid JSON in mapping file '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No repositories found in mapping file '{0}'")]
    EmptyMapping(String),

    #[error("Working-copy root does not exist: {0}")]
    MissingWorkingCopyRoot(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error reading '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
