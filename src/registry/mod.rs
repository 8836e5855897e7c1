//! Image registry inspection.
//!
//! - Load the service → registry repository mapping
//! - List repository tags (Quay API, paginated)
//! - Pick the newest `sc-{date}-{id}` tag and compare it to the window

use std::fmt;

use async_trait::async_trait;

use crate::error::RegistryError;

pub mod inspector;
pub mod mapping;
pub mod quay;
pub mod tags;

pub use inspector::{Inspection, TagInspector, DEFAULT_MAX_CONCURRENT_QUERIES};
pub use mapping::{load_service_mappings, select_services, ServiceMapping};
pub use quay::{QuayClient, DEFAULT_QUAY_API_BASE};
pub use tags::{select_latest, ScTag, TagSelection};

/// Anything that can list the tag names of a registry repository.
#[async_trait]
pub trait TagSource: Send + Sync {
    /// List every tag name in the repository at `registry_path`.
    async fn list_tags(&self, registry_path: &str) -> Result<Vec<String>, RegistryError>;
}

/// A registry repository split into namespace and (possibly nested) name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCoordinate {
    pub namespace: String,
    pub repository: String,
}

impl RegistryCoordinate {
    /// Parse `quay.io/namespace/repo[/more/path]`. The host prefix is optional.
    pub fn parse(registry_path: &str) -> Result<Self, RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidPath {
            path: registry_path.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = registry_path.trim();
        let path = trimmed.strip_prefix("quay.io/").unwrap_or(trimmed);
        if path.is_empty() {
            return Err(invalid("expected namespace/repository"));
        }
        if path.chars().any(char::is_whitespace) {
            return Err(invalid("must not contain whitespace"));
        }

        let (namespace, repository) = path
            .split_once('/')
            .ok_or_else(|| invalid("expected namespace/repository"))?;
        if namespace.is_empty() || repository.is_empty() {
            return Err(invalid("namespace and repository must be non-empty"));
        }
        if repository.split('/').any(str::is_empty) {
            return Err(invalid("repository path contains an empty segment"));
        }

        Ok(Self {
            namespace: namespace.to_string(),
            repository: repository.to_string(),
        })
    }
}

impl fmt::Display for RegistryCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.repository)
    }
}
