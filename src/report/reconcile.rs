//! Cross-reference stale services against update outcomes.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::staleness::ImageCheckResult;
use crate::update::{RepoUpdateOutcome, UpdateReason};

/// Why a stale service is still stale after the update pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnremediedReason {
    AlreadyOnTargetBranch { branch: String },
    NoMatchingFiles,
    NoChangeNeeded,
    BranchNotFoundOnRemote { branch: String },
    WorkingCopyMissing { path: PathBuf },
    CheckoutFailed { detail: String },
    FormatError { file: PathBuf, detail: String },
    MutationFailed { detail: String },
    CommitFailed { detail: String },
    PushFailed { detail: String },
    /// The run deadline passed before the service's pipeline started.
    NotProcessed,
}

impl fmt::Display for UnremediedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyOnTargetBranch { branch } => {
                write!(f, "SC files already use '{branch}' branch")
            }
            Self::NoMatchingFiles => f.write_str("No -sc files found in .tekton directory"),
            Self::NoChangeNeeded => f.write_str("No pinned pipeline references to update"),
            Self::BranchNotFoundOnRemote { branch } => {
                write!(f, "Branch '{branch}' not found on remote")
            }
            Self::WorkingCopyMissing { path } => {
                write!(f, "Working copy not found at {}", path.display())
            }
            Self::CheckoutFailed { detail } => write!(f, "Checkout failed: {detail}"),
            Self::FormatError { file, detail } => {
                write!(f, "Could not parse {}: {detail}", file.display())
            }
            Self::MutationFailed { detail } => write!(f, "Updating pipeline files failed: {detail}"),
            Self::CommitFailed { detail } => write!(f, "Commit failed: {detail}"),
            Self::PushFailed { detail } => write!(f, "Push failed after commit: {detail}"),
            Self::NotProcessed => f.write_str("Not processed before the run deadline"),
        }
    }
}

/// A stale service that remediation did not fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnremediedEntry {
    pub service_name: String,
    pub reason: UnremediedReason,
}

/// Branch names the reasons refer to.
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    pub checkout_branch: String,
    pub floating_branch: String,
}

/// List every stale service without a remedying outcome, in the order of
/// `stale_results`. Non-stale entries in `stale_results` are ignored.
pub fn reconcile(
    stale_results: &[ImageCheckResult],
    outcomes: &[RepoUpdateOutcome],
    context: &ReconcileContext,
) -> Vec<UnremediedEntry> {
    let by_service: HashMap<&str, &RepoUpdateOutcome> = outcomes
        .iter()
        .map(|o| (o.service_name.as_str(), o))
        .collect();

    stale_results
        .iter()
        .filter(|r| r.is_stale())
        .filter_map(|result| {
            let reason = match by_service.get(result.service_name.as_str()) {
                None => UnremediedReason::NotProcessed,
                Some(outcome) if outcome.is_remedied() => return None,
                Some(outcome) => unremedied_reason(outcome, context),
            };
            Some(UnremediedEntry {
                service_name: result.service_name.clone(),
                reason,
            })
        })
        .collect()
}

fn unremedied_reason(outcome: &RepoUpdateOutcome, context: &ReconcileContext) -> UnremediedReason {
    match &outcome.reason {
        UpdateReason::AlreadyOnTargetBranch => UnremediedReason::AlreadyOnTargetBranch {
            branch: context.floating_branch.clone(),
        },
        UpdateReason::NoMatchingFiles => UnremediedReason::NoMatchingFiles,
        // FilesUpdated without `changed` cannot come out of the driver; treat
        // it like a no-op rather than hiding the service.
        UpdateReason::NoChangeNeeded | UpdateReason::FilesUpdated => {
            UnremediedReason::NoChangeNeeded
        }
        UpdateReason::BranchNotFoundOnRemote => UnremediedReason::BranchNotFoundOnRemote {
            branch: context.checkout_branch.clone(),
        },
        UpdateReason::WorkingCopyMissing => UnremediedReason::WorkingCopyMissing {
            path: outcome.working_copy.clone(),
        },
        UpdateReason::CheckoutFailed { detail } => UnremediedReason::CheckoutFailed {
            detail: detail.clone(),
        },
        UpdateReason::FormatError { file, detail } => UnremediedReason::FormatError {
            file: file.clone(),
            detail: detail.clone(),
        },
        UpdateReason::MutationFailed { detail } => UnremediedReason::MutationFailed {
            detail: detail.clone(),
        },
        UpdateReason::CommitFailed { detail } => UnremediedReason::CommitFailed {
            detail: detail.clone(),
        },
        UpdateReason::PushFailed { detail } => UnremediedReason::PushFailed {
            detail: detail.clone(),
        },
    }
}
