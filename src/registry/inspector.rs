//! Registry tag inspector: newest `sc-` tag per service within a window.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use super::tags::{select_latest, ScTag, TagSelection};
use super::{ServiceMapping, TagSource};

/// Default number of registry queries in flight at once.
pub const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 8;

/// Result of inspecting one registry repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Inspection {
    /// Newest matching tag inside the window.
    Found { tag: String, date: NaiveDate },
    /// No matching tag inside the window. `latest` is the newest matching
    /// tag seen at all, if any.
    NotFound { latest: Option<ScTag> },
    /// The registry could not be queried.
    Error { detail: String },
}

/// Lists tags through a [`TagSource`] and applies the recency window.
#[derive(Clone)]
pub struct TagInspector {
    source: Arc<dyn TagSource>,
}

impl TagInspector {
    pub fn new(source: Arc<dyn TagSource>) -> Self {
        Self { source }
    }

    /// Find the newest `sc-` tag dated within `window_days` of `today`.
    pub async fn recent_matching_tag(
        &self,
        registry_path: &str,
        window_days: u32,
        today: NaiveDate,
    ) -> Inspection {
        if registry_path.trim().is_empty() {
            return Inspection::Error {
                detail: "Invalid repo format: registry path is empty".to_string(),
            };
        }
        if window_days == 0 {
            return Inspection::Error {
                detail: "recency window must be at least one day".to_string(),
            };
        }

        let tags = match self.source.list_tags(registry_path).await {
            Ok(tags) => tags,
            Err(e) => {
                return Inspection::Error {
                    detail: e.to_string(),
                }
            }
        };

        match select_latest(tags.iter().map(String::as_str), window_days, today) {
            TagSelection::Recent(tag) => Inspection::Found {
                date: tag.date,
                tag: tag.name,
            },
            TagSelection::OutsideWindow(tag) => Inspection::NotFound { latest: Some(tag) },
            TagSelection::NoMatchingTags => Inspection::NotFound { latest: None },
        }
    }

    /// Inspect every mapping with at most `max_concurrent` queries in flight.
    ///
    /// Results come back in the same order as `mappings`.
    pub async fn inspect_all(
        &self,
        mappings: &[ServiceMapping],
        window_days: u32,
        today: NaiveDate,
        max_concurrent: usize,
    ) -> Vec<(ServiceMapping, Inspection)> {
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
        let mut handles = Vec::with_capacity(mappings.len());

        for mapping in mappings {
            let sem = semaphore.clone();
            let inspector = self.clone();
            let registry_path = mapping.registry_path.clone();
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                inspector
                    .recent_matching_tag(&registry_path, window_days, today)
                    .await
            }));
        }

        let mut results = Vec::with_capacity(mappings.len());
        for (mapping, handle) in mappings.iter().zip(handles) {
            let inspection = handle.await.unwrap_or_else(|e| Inspection::Error {
                detail: format!("inspection task failed: {e}"),
            });
            tracing::debug!(
                service = %mapping.service_name,
                registry = %mapping.registry_path,
                result = ?inspection,
                "Registry inspection finished"
            );
            results.push((mapping.clone(), inspection));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Tag source serving canned tag lists per registry path.
    struct StaticTags {
        tags: HashMap<String, Result<Vec<String>, String>>,
    }

    #[async_trait]
    impl TagSource for StaticTags {
        async fn list_tags(&self, registry_path: &str) -> Result<Vec<String>, RegistryError> {
            match self.tags.get(registry_path) {
                Some(Ok(tags)) => Ok(tags.clone()),
                Some(Err(e)) => Err(RegistryError::RequestFailed(e.clone())),
                None => Err(RegistryError::NotFound(registry_path.to_string())),
            }
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 16).unwrap()
    }

    fn inspector(entries: Vec<(&str, Result<Vec<&str>, &str>)>) -> TagInspector {
        let tags = entries
            .into_iter()
            .map(|(path, result)| {
                (
                    path.to_string(),
                    result
                        .map(|t| t.into_iter().map(str::to_string).collect())
                        .map_err(str::to_string),
                )
            })
            .collect();
        TagInspector::new(Arc::new(StaticTags { tags }))
    }

    #[tokio::test]
    async fn finds_recent_tag() {
        let inspector = inspector(vec![(
            "quay.io/ns/alpha",
            Ok(vec!["sc-20260101-aaa1111", "sc-20260115-bbb2222", "rel-9.9"]),
        )]);
        let result = inspector
            .recent_matching_tag("quay.io/ns/alpha", 14, today())
            .await;
        assert_eq!(
            result,
            Inspection::Found {
                tag: "sc-20260115-bbb2222".to_string(),
                date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            }
        );
    }

    #[tokio::test]
    async fn old_or_missing_tags_are_not_found() {
        let inspector = inspector(vec![
            ("quay.io/ns/old", Ok(vec!["sc-20251201-aaa1111"])),
            ("quay.io/ns/none", Ok(vec!["latest", "v1.2.3"])),
            ("quay.io/ns/empty", Ok(vec![])),
        ]);

        let old = inspector.recent_matching_tag("quay.io/ns/old", 14, today()).await;
        match old {
            Inspection::NotFound { latest: Some(tag) } => {
                assert_eq!(tag.name, "sc-20251201-aaa1111")
            }
            other => panic!("expected not found with latest, got {other:?}"),
        }

        for path in ["quay.io/ns/none", "quay.io/ns/empty"] {
            assert_eq!(
                inspector.recent_matching_tag(path, 14, today()).await,
                Inspection::NotFound { latest: None }
            );
        }
    }

    #[tokio::test]
    async fn query_failures_become_errors() {
        let inspector = inspector(vec![("quay.io/ns/down", Err("connection refused"))]);
        match inspector.recent_matching_tag("quay.io/ns/down", 14, today()).await {
            Inspection::Error { detail } => assert!(detail.contains("connection refused")),
            other => panic!("expected error, got {other:?}"),
        }
        assert!(matches!(
            inspector.recent_matching_tag("  ", 14, today()).await,
            Inspection::Error { .. }
        ));
        assert!(matches!(
            inspector.recent_matching_tag("quay.io/ns/down", 0, today()).await,
            Inspection::Error { .. }
        ));
    }

    #[tokio::test]
    async fn inspect_all_preserves_input_order() {
        let inspector = inspector(vec![
            ("quay.io/ns/a", Ok(vec!["sc-20260110-aaa1111"])),
            ("quay.io/ns/b", Ok(vec![])),
            ("quay.io/ns/c", Err("boom")),
        ]);
        let mappings = vec![
            ServiceMapping::new("a", "quay.io/ns/a"),
            ServiceMapping::new("b", "quay.io/ns/b"),
            ServiceMapping::new("c", "quay.io/ns/c"),
        ];

        let results = inspector.inspect_all(&mappings, 14, today(), 2).await;
        let names: Vec<_> = results.iter().map(|(m, _)| m.service_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(matches!(results[0].1, Inspection::Found { .. }));
        assert!(matches!(results[1].1, Inspection::NotFound { .. }));
        assert!(matches!(results[2].1, Inspection::Error { .. }));
    }
}
