//! Tekton security-compliance pipeline file rewriting.
//!
//! Security-compliance PipelineRuns live in `.tekton/*-sc*.yaml` and pull
//! their pipeline definition from a GitHub raw URL through the
//! `pipelinesascode.tekton.dev/pipeline` annotation. When that URL is pinned
//! to a release tag the SC build never picks up pipeline fixes, which is
//! the usual reason a service stops producing fresh `sc-` images.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::MutationError;

pub mod mutator;
pub mod yaml_edit;

pub use mutator::{is_sc_pipeline_file, PipelineFileRef, TektonMutator};

/// Directory inside a working copy that holds the pipeline files.
pub const CONVENTION_DIR: &str = ".tekton";
/// Infix identifying security-compliance pipeline files.
pub const SC_NAME_INFIX: &str = "-sc";
/// Annotation carrying the pipeline definition URL.
pub const PIPELINE_ANNOTATION: &str = "pipelinesascode.tekton.dev/pipeline";

/// Why a mutation pass ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationReason {
    FilesUpdated,
    AlreadyOnTargetBranch,
    NoMatchingFiles,
    NoChangeNeeded,
}

/// One rewritten pipeline reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Path relative to the working copy.
    pub path: PathBuf,
    pub old_reference: String,
    pub new_reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationResult {
    pub changed_files: Vec<FileChange>,
    pub reason: MutationReason,
}

impl MutationResult {
    pub fn unchanged(reason: MutationReason) -> Self {
        Self {
            changed_files: Vec::new(),
            reason,
        }
    }

    pub fn changed(&self) -> bool {
        !self.changed_files.is_empty()
    }
}

/// Rewrites pinned pipeline references in a working copy.
pub trait ReferenceMutator: Send + Sync {
    /// Point every pinned SC pipeline reference at `floating_branch`.
    ///
    /// With `apply == false` the result is computed but nothing is written.
    fn update_branch_references(
        &self,
        working_copy: &Path,
        floating_branch: &str,
        apply: bool,
    ) -> Result<MutationResult, MutationError>;
}
