//! Staleness classification of registry inspection results.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::registry::{Inspection, ServiceMapping};

/// Per-service image status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    Recent,
    Stale,
    Error,
}

impl ImageStatus {
    /// Short symbol used in text reports.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Recent => "✓",
            Self::Stale => "✗",
            Self::Error => "⚠",
        }
    }
}

impl std::fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Recent => "recent",
            Self::Stale => "stale",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Classification of one service for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCheckResult {
    pub service_name: String,
    pub status: ImageStatus,
    /// Newest `sc-` tag inside the window (recent services only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_date: Option<NaiveDate>,
    /// Newest `sc-` tag outside the window, when a stale service has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl ImageCheckResult {
    pub fn is_stale(&self) -> bool {
        self.status == ImageStatus::Stale
    }
}

/// Map an inspection onto a status. Pure and total.
pub fn classify(service_name: &str, inspection: &Inspection) -> ImageCheckResult {
    let mut result = ImageCheckResult {
        service_name: service_name.to_string(),
        status: ImageStatus::Stale,
        matched_tag: None,
        matched_date: None,
        last_seen_tag: None,
        error_detail: None,
    };

    match inspection {
        Inspection::Found { tag, date } => {
            result.status = ImageStatus::Recent;
            result.matched_tag = Some(tag.clone());
            result.matched_date = Some(*date);
        }
        Inspection::NotFound { latest } => {
            result.last_seen_tag = latest.as_ref().map(|t| t.name.clone());
        }
        Inspection::Error { detail } => {
            result.status = ImageStatus::Error;
            result.error_detail = Some(detail.clone());
        }
    }

    result
}

/// Classify a batch of inspections, keeping their order.
pub fn classify_all(inspections: &[(ServiceMapping, Inspection)]) -> Vec<ImageCheckResult> {
    inspections
        .iter()
        .map(|(mapping, inspection)| classify(&mapping.service_name, inspection))
        .collect()
}

/// Counts per status for summary lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationCounts {
    pub recent: usize,
    pub stale: usize,
    pub errors: usize,
}

impl ClassificationCounts {
    pub fn from_results(results: &[ImageCheckResult]) -> Self {
        results.iter().fold(Self::default(), |mut acc, r| {
            match r.status {
                ImageStatus::Recent => acc.recent += 1,
                ImageStatus::Stale => acc.stale += 1,
                ImageStatus::Error => acc.errors += 1,
            }
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ScTag;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn found_is_recent() {
        let result = classify(
            "alpha",
            &Inspection::Found {
                tag: "sc-20260115-bbb2222".to_string(),
                date: date(2026, 1, 15),
            },
        );
        assert_eq!(result.status, ImageStatus::Recent);
        assert_eq!(result.matched_tag.as_deref(), Some("sc-20260115-bbb2222"));
        assert_eq!(result.matched_date, Some(date(2026, 1, 15)));
        assert!(result.error_detail.is_none());
    }

    #[test]
    fn not_found_is_always_stale() {
        let none = classify("beta", &Inspection::NotFound { latest: None });
        assert!(none.is_stale());
        assert!(none.matched_tag.is_none());

        let latest = ScTag::parse("sc-20250101-aaa1111").unwrap();
        let old = classify("beta", &Inspection::NotFound { latest: Some(latest) });
        assert!(old.is_stale());
        assert_eq!(old.last_seen_tag.as_deref(), Some("sc-20250101-aaa1111"));
    }

    #[test]
    fn error_carries_detail() {
        let result = classify(
            "gamma",
            &Inspection::Error {
                detail: "HTTP 500".to_string(),
            },
        );
        assert_eq!(result.status, ImageStatus::Error);
        assert_eq!(result.error_detail.as_deref(), Some("HTTP 500"));
    }

    #[test]
    fn classification_is_deterministic() {
        let inspection = Inspection::NotFound { latest: None };
        assert_eq!(classify("x", &inspection), classify("x", &inspection));
    }

    #[test]
    fn counts_by_status() {
        let inspections = vec![
            (
                ServiceMapping::new("a", "quay.io/ns/a"),
                Inspection::Found {
                    tag: "sc-20260115-bbb2222".to_string(),
                    date: date(2026, 1, 15),
                },
            ),
            (
                ServiceMapping::new("b", "quay.io/ns/b"),
                Inspection::NotFound { latest: None },
            ),
            (
                ServiceMapping::new("c", "quay.io/ns/c"),
                Inspection::NotFound { latest: None },
            ),
            (
                ServiceMapping::new("d", "quay.io/ns/d"),
                Inspection::Error {
                    detail: "down".to_string(),
                },
            ),
        ];
        let results = classify_all(&inspections);
        assert_eq!(
            ClassificationCounts::from_results(&results),
            ClassificationCounts {
                recent: 1,
                stale: 2,
                errors: 1
            }
        );
    }
}
