//! Repository update driver: checkout → mutate → commit → push per stale
//! service.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::tekton::{FileChange, MutationReason};

pub mod driver;

pub use driver::{DriverConfig, RepoUpdateDriver};

/// Terminal reason of one service's update pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateReason {
    FilesUpdated,
    AlreadyOnTargetBranch,
    NoMatchingFiles,
    NoChangeNeeded,
    BranchNotFoundOnRemote,
    WorkingCopyMissing,
    CheckoutFailed { detail: String },
    FormatError { file: PathBuf, detail: String },
    MutationFailed { detail: String },
    CommitFailed { detail: String },
    /// Files were rewritten and committed locally but the push failed.
    PushFailed { detail: String },
}

impl UpdateReason {
    /// Whether the pipeline stopped on a failure rather than a normal
    /// terminal state.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::CheckoutFailed { .. }
                | Self::FormatError { .. }
                | Self::MutationFailed { .. }
                | Self::CommitFailed { .. }
                | Self::PushFailed { .. }
                | Self::WorkingCopyMissing
        )
    }
}

impl From<MutationReason> for UpdateReason {
    fn from(reason: MutationReason) -> Self {
        match reason {
            MutationReason::FilesUpdated => Self::FilesUpdated,
            MutationReason::AlreadyOnTargetBranch => Self::AlreadyOnTargetBranch,
            MutationReason::NoMatchingFiles => Self::NoMatchingFiles,
            MutationReason::NoChangeNeeded => Self::NoChangeNeeded,
        }
    }
}

/// Result of one stale service's update pipeline.
///
/// `changed` is true only when files were rewritten, committed and pushed,
/// and then `reason` is always [`UpdateReason::FilesUpdated`].
/// `would_change` is the dry-run counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoUpdateOutcome {
    pub service_name: String,
    pub working_copy: PathBuf,
    pub changed: bool,
    pub would_change: bool,
    pub reason: UpdateReason,
    pub committed: bool,
    pub pushed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changed_files: Vec<FileChange>,
}

impl RepoUpdateOutcome {
    /// Outcome for a pipeline that ended without touching the repository.
    pub fn unchanged(
        service_name: impl Into<String>,
        working_copy: impl Into<PathBuf>,
        reason: UpdateReason,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            working_copy: working_copy.into(),
            changed: false,
            would_change: false,
            reason,
            committed: false,
            pushed: false,
            commit_sha: None,
            changed_files: Vec::new(),
        }
    }

    /// Files were (or in a dry run would have been) rewritten and pushed.
    pub fn is_remedied(&self) -> bool {
        self.changed || self.would_change
    }
}
