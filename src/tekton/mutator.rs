//! Rewrites pinned pipeline references in `.tekton/*-sc*.yaml` files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde_yaml::Value;
use walkdir::WalkDir;

use super::yaml_edit::replace_scalar_value;
use super::{
    FileChange, MutationReason, MutationResult, ReferenceMutator, CONVENTION_DIR,
    PIPELINE_ANNOTATION, SC_NAME_INFIX,
};
use crate::error::MutationError;

fn pipeline_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(https://github\.com/[^/]+/[^/]+/raw/)([^/]+)(/.+)$")
            .expect("pipeline url pattern is valid")
    })
}

fn version_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^v\d[\d.]*$").expect("version tag pattern is valid"))
}

/// A pipeline file loaded for one mutation pass.
#[derive(Debug, Clone)]
pub struct PipelineFileRef {
    pub repository_path: PathBuf,
    pub file_path: PathBuf,
    /// Ref segment of the pipeline URL, if the annotation is present and
    /// points at a GitHub raw URL.
    pub original_branch_reference: Option<String>,
    pub content: String,
}

/// How a single file relates to the floating branch.
#[derive(Debug)]
enum FileState {
    OnTarget,
    Rewrite(FileChange, String),
    Untouched,
}

/// File-system implementation of [`ReferenceMutator`].
#[derive(Debug, Clone, Default)]
pub struct TektonMutator;

impl TektonMutator {
    pub fn new() -> Self {
        Self
    }

    /// Security-compliance pipeline files in the working copy's convention
    /// directory, sorted by path.
    pub fn find_sc_files(working_copy: &Path) -> Vec<PathBuf> {
        let dir = working_copy.join(CONVENTION_DIR);
        if !dir.is_dir() {
            return Vec::new();
        }

        let mut files: Vec<PathBuf> = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| is_sc_pipeline_file(path))
            .collect();
        files.sort();
        files
    }

    fn load(working_copy: &Path, path: &Path) -> Result<PipelineFileRef, MutationError> {
        let content = fs::read_to_string(path).map_err(|source| MutationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document: Value =
            serde_yaml::from_str(&content).map_err(|e| MutationError::Format {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let original_branch_reference = pipeline_annotation(&document)
            .and_then(|url| pipeline_url_pattern().captures(url))
            .map(|caps| caps[2].to_string());

        Ok(PipelineFileRef {
            repository_path: working_copy.to_path_buf(),
            file_path: path.to_path_buf(),
            original_branch_reference,
            content,
        })
    }

    fn evaluate(file: &PipelineFileRef, floating_branch: &str) -> Result<FileState, MutationError> {
        let Some(reference) = file.original_branch_reference.as_deref() else {
            tracing::debug!(file = %file.file_path.display(), "No pipeline annotation with a GitHub raw URL");
            return Ok(FileState::Untouched);
        };
        if reference == floating_branch {
            return Ok(FileState::OnTarget);
        }
        if !version_tag_pattern().is_match(reference) {
            tracing::debug!(
                file = %file.file_path.display(),
                reference = %reference,
                "Pipeline reference is not a pinned version tag"
            );
            return Ok(FileState::Untouched);
        }

        // The annotation was parsed above, so it is a string scalar.
        let document: Value =
            serde_yaml::from_str(&file.content).map_err(|e| MutationError::Format {
                path: file.file_path.clone(),
                reason: e.to_string(),
            })?;
        let old_url = pipeline_annotation(&document).unwrap_or_default().to_string();
        let new_url = pipeline_url_pattern()
            .replace(&old_url, format!("${{1}}{floating_branch}${{3}}"))
            .into_owned();

        let content = replace_scalar_value(&file.content, PIPELINE_ANNOTATION, &old_url, &new_url)
            .ok_or_else(|| MutationError::Format {
                path: file.file_path.clone(),
                reason: format!("{PIPELINE_ANNOTATION} value is not on a single line"),
            })?;

        let relative = file
            .file_path
            .strip_prefix(&file.repository_path)
            .unwrap_or(&file.file_path)
            .to_path_buf();
        Ok(FileState::Rewrite(
            FileChange {
                path: relative,
                old_reference: old_url,
                new_reference: new_url,
            },
            content,
        ))
    }
}

impl ReferenceMutator for TektonMutator {
    fn update_branch_references(
        &self,
        working_copy: &Path,
        floating_branch: &str,
        apply: bool,
    ) -> Result<MutationResult, MutationError> {
        let files = Self::find_sc_files(working_copy);
        if files.is_empty() {
            return Ok(MutationResult::unchanged(MutationReason::NoMatchingFiles));
        }

        // Evaluate everything before writing so a format error in one file
        // leaves the whole set untouched.
        let mut on_target = 0usize;
        let mut rewrites = Vec::new();
        for path in &files {
            let file = Self::load(working_copy, path)?;
            match Self::evaluate(&file, floating_branch)? {
                FileState::OnTarget => on_target += 1,
                FileState::Rewrite(change, content) => rewrites.push((path, change, content)),
                FileState::Untouched => {}
            }
        }

        if rewrites.is_empty() {
            let reason = if on_target == files.len() {
                MutationReason::AlreadyOnTargetBranch
            } else {
                MutationReason::NoChangeNeeded
            };
            return Ok(MutationResult::unchanged(reason));
        }

        let mut changed_files = Vec::with_capacity(rewrites.len());
        for (path, change, content) in rewrites {
            if apply {
                fs::write(path, content).map_err(|source| MutationError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
            tracing::info!(
                file = %change.path.display(),
                old = %change.old_reference,
                new = %change.new_reference,
                dry_run = !apply,
                "Pipeline reference rewritten"
            );
            changed_files.push(change);
        }

        Ok(MutationResult {
            changed_files,
            reason: MutationReason::FilesUpdated,
        })
    }
}

/// Name contains `-sc` and the extension is `.yaml` or `.yml`.
pub fn is_sc_pipeline_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let has_yaml_extension = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    has_yaml_extension && name.contains(SC_NAME_INFIX)
}

fn pipeline_annotation(document: &Value) -> Option<&str> {
    document
        .get("metadata")?
        .get("annotations")?
        .get(PIPELINE_ANNOTATION)?
        .as_str()
}
