//! Text and JSON rendering of run results.

use std::fmt::Write as _;

use serde::Serialize;

use super::reconcile::UnremediedEntry;
use crate::staleness::{ClassificationCounts, ImageCheckResult, ImageStatus};
use crate::update::RepoUpdateOutcome;

/// Machine-readable summary emitted with `--json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub window_days: u32,
    pub dry_run: bool,
    pub check_only: bool,
    pub counts: ClassificationCounts,
    pub results: Vec<ImageCheckResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcomes: Option<Vec<RepoUpdateOutcome>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unremedied: Option<Vec<UnremediedEntry>>,
}

/// Recent, stale and error sections followed by a summary line.
pub fn classification_report(results: &[ImageCheckResult], window_days: u32) -> String {
    let mut out = String::new();
    let counts = ClassificationCounts::from_results(results);

    let _ = writeln!(out, "\n=== Image Freshness (last {window_days} days) ===");

    let section = |out: &mut String, status: ImageStatus, title: &str| {
        let members: Vec<_> = results.iter().filter(|r| r.status == status).collect();
        if members.is_empty() {
            return;
        }
        let _ = writeln!(out, "\n{title} ({}):", members.len());
        for r in members {
            let detail = match status {
                ImageStatus::Recent => r.matched_tag.clone().unwrap_or_default(),
                ImageStatus::Stale => r
                    .last_seen_tag
                    .as_ref()
                    .map(|t| format!("last seen {t}"))
                    .unwrap_or_else(|| "no sc- tags".to_string()),
                ImageStatus::Error => r.error_detail.clone().unwrap_or_default(),
            };
            let _ = writeln!(out, "  {} {:<40} {}", status.symbol(), r.service_name, detail);
        }
    };

    section(&mut out, ImageStatus::Recent, "Recent");
    section(&mut out, ImageStatus::Stale, "Stale");
    section(&mut out, ImageStatus::Error, "Errors");

    let _ = writeln!(
        out,
        "\nSummary: {} recent, {} stale, {} errors ({} services)",
        counts.recent,
        counts.stale,
        counts.errors,
        results.len()
    );
    out
}

/// One line per processed service, with the commit SHA when one was made.
pub fn update_summary(outcomes: &[RepoUpdateOutcome], dry_run: bool) -> String {
    let mut out = String::new();
    let header = if dry_run {
        "=== Update Results [DRY RUN] ==="
    } else {
        "=== Update Results ==="
    };
    let _ = writeln!(out, "\n{header}");

    for o in outcomes {
        let marker = if o.is_remedied() { "✓" } else { "✗" };
        let mut line = format!("  {marker} {:<40} {:?}", o.service_name, o.reason);
        if let Some(sha) = &o.commit_sha {
            let short = sha.get(..7).unwrap_or(sha);
            let _ = write!(line, " ({short})");
        }
        if o.would_change {
            let _ = write!(line, " would update {} file(s)", o.changed_files.len());
        }
        let _ = writeln!(out, "{line}");
    }

    let remedied = outcomes.iter().filter(|o| o.is_remedied()).count();
    let _ = writeln!(out, "\n{remedied} of {} services updated", outcomes.len());
    out
}

/// Unremedied services with their reasons. `None` when every stale service
/// was fixed.
pub fn unremedied_report(entries: &[UnremediedEntry]) -> Option<String> {
    if entries.is_empty() {
        return None;
    }
    let mut out = String::new();
    let _ = writeln!(out, "\n=== Stale services not fixed ===");
    for entry in entries {
        let _ = writeln!(out, "  ✗ {:<40} {}", entry.service_name, entry.reason);
    }
    let _ = writeln!(out, "\nTotal: {} service(s) remain stale", entries.len());
    Some(out)
}

/// Sorted stale service names, one per line.
pub fn stale_list(results: &[ImageCheckResult]) -> String {
    let mut names: Vec<&str> = results
        .iter()
        .filter(|r| r.is_stale())
        .map(|r| r.service_name.as_str())
        .collect();
    names.sort_unstable();
    let mut out = names.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}
