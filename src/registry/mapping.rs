//! Service → registry repository mapping.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One service and the registry coordinate its images are pushed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMapping {
    pub service_name: String,
    /// e.g. `quay.io/redhat-services-prod/tenant/app/component`
    pub registry_path: String,
}

impl ServiceMapping {
    pub fn new(service_name: impl Into<String>, registry_path: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            registry_path: registry_path.into(),
        }
    }
}

/// Load the mapping file, a flat JSON object of `service -> registry path`.
///
/// Entries come back sorted by service name. An empty object is a
/// configuration error: a run with nothing to inspect is almost always a
/// wrong path or a truncated file.
pub fn load_service_mappings(path: &Path) -> Result<Vec<ServiceMapping>, ConfigError> {
    let display = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ConfigError::NotFound(display.clone())
        } else {
            ConfigError::Io {
                path: display.clone(),
                source,
            }
        }
    })?;

    let entries: BTreeMap<String, String> =
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: display.clone(),
            source,
        })?;

    if entries.is_empty() {
        return Err(ConfigError::EmptyMapping(display));
    }

    Ok(entries
        .into_iter()
        .map(|(service_name, registry_path)| ServiceMapping {
            service_name,
            registry_path,
        })
        .collect())
}

/// Restrict mappings to an explicit subset. An empty filter keeps everything.
///
/// Returns the kept mappings (in mapping order) and the filter names that
/// matched no mapping.
pub fn select_services(
    mappings: &[ServiceMapping],
    filter: &[String],
) -> (Vec<ServiceMapping>, Vec<String>) {
    if filter.is_empty() {
        return (mappings.to_vec(), Vec::new());
    }

    let selected = mappings
        .iter()
        .filter(|m| filter.iter().any(|f| f == &m.service_name))
        .cloned()
        .collect();
    let unknown = filter
        .iter()
        .filter(|f| !mappings.iter().any(|m| &m.service_name == *f))
        .cloned()
        .collect();

    (selected, unknown)
}
