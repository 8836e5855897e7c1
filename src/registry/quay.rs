//! Quay.io tag listing client.
//!
//! Uses the public repository API (`/api/v1/repository/{ns}/{repo}/tag/`),
//! which pages results 100 at a time and signals further pages with
//! `has_additional`. Only public repositories are supported; credentials
//! are out of scope for this tool.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{RegistryCoordinate, TagSource};
use crate::error::RegistryError;

/// Default API root for quay.io.
pub const DEFAULT_QUAY_API_BASE: &str = "https://quay.io/api/v1";

const PAGE_SIZE: usize = 100;
/// Pages fetched per repository before listing stops.
const MAX_PAGES: u32 = 50;

#[derive(Debug, Deserialize)]
pub(crate) struct TagPage {
    #[serde(default)]
    pub(crate) tags: Vec<TagEntry>,
    #[serde(default)]
    pub(crate) has_additional: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagEntry {
    pub(crate) name: String,
}

/// Quay REST client listing repository tags.
#[derive(Debug, Clone)]
pub struct QuayClient {
    client: Client,
    api_base: String,
}

impl QuayClient {
    /// Create a client with the given API root and per-request timeout.
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Client for quay.io with a 30 second request timeout.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_QUAY_API_BASE, Duration::from_secs(30))
    }

    /// Build the URL for one page of the tag listing.
    pub fn tags_url(&self, coordinate: &RegistryCoordinate, page: u32) -> String {
        let repository = coordinate
            .repository
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/repository/{}/{}/tag/?page={}&limit={}",
            self.api_base,
            urlencoding::encode(&coordinate.namespace),
            repository,
            page,
            PAGE_SIZE
        )
    }

    async fn fetch_page(
        &self,
        coordinate: &RegistryCoordinate,
        page: u32,
    ) -> Result<TagPage, RegistryError> {
        let url = self.tags_url(coordinate, page);
        let response = self
            .client
            .get(&url)
            .header("User-Agent", "hall-monitor/0.1")
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RegistryError::Timeout(format!("{coordinate}: {e}"))
                } else {
                    RegistryError::RequestFailed(format!("{coordinate}: {e}"))
                }
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(coordinate.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                repository = %coordinate,
                status = %status,
                body = %body,
                "Quay API returned error"
            );
            return Err(RegistryError::HttpStatus {
                repository: coordinate.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<TagPage>()
            .await
            .map_err(|e| RegistryError::Decode(format!("{coordinate}: {e}")))
    }
}

#[async_trait]
impl TagSource for QuayClient {
    async fn list_tags(&self, registry_path: &str) -> Result<Vec<String>, RegistryError> {
        let coordinate = RegistryCoordinate::parse(registry_path)?;
        let repository = coordinate.to_string();
        let coordinate = &coordinate;
        collect_tag_pages(&repository, move |page| self.fetch_page(coordinate, page)).await
    }
}

/// Follow `has_additional` from page 1, stopping after [`MAX_PAGES`].
///
/// Quay lists tags most recently pushed first, so a truncated listing keeps
/// the newest tags and the `sc-` tag that decides staleness. Truncation is
/// logged and the collected tags are returned.
pub(crate) async fn collect_tag_pages<F, Fut>(
    repository: &str,
    mut fetch: F,
) -> Result<Vec<String>, RegistryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<TagPage, RegistryError>>,
{
    let mut names = Vec::new();

    for page in 1..=MAX_PAGES {
        let batch = fetch(page).await?;
        let fetched = batch.tags.len();
        names.extend(batch.tags.into_iter().map(|t| t.name));

        tracing::debug!(
            repository = %repository,
            page = page,
            tags = fetched,
            total = names.len(),
            "Quay tag page fetched"
        );

        if !batch.has_additional || fetched == 0 {
            break;
        }
        if page == MAX_PAGES {
            tracing::warn!(
                repository = %repository,
                pages = MAX_PAGES,
                tags = names.len(),
                "Stopping tag pagination at page limit, older tags not listed"
            );
        }
    }

    Ok(names)
}
