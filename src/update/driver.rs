//! Per-service update pipeline and batch scheduling.
//!
//! Services that resolve to the same working copy share one pipeline run:
//! the first of them drives checkout, mutation, commit and push, and every
//! member gets a copy of that outcome under its own name. Distinct working
//! copies may run concurrently up to `max_concurrent_updates`.
//!
//! A repository name that is not a single plain directory name never
//! resolves to a working copy.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::Instrument;

use super::{RepoUpdateOutcome, UpdateReason};
use crate::error::{GitError, MutationError};
use crate::git::{is_plain_dir_name, is_working_copy, RepoOps, DEFAULT_REMOTE};
use crate::tekton::{MutationReason, MutationResult, ReferenceMutator};

/// Default branch carrying the security-compliance pipelines.
pub const DEFAULT_CHECKOUT_BRANCH: &str = "security-compliance";
/// Default floating branch pipeline references are rewritten to.
pub const DEFAULT_FLOATING_BRANCH: &str = "main";

/// Settings threaded through every service pipeline.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Directory holding one working copy per repository.
    pub repos_dir: PathBuf,
    /// Branch checked out, committed to and pushed.
    pub checkout_branch: String,
    /// Branch pipeline references are rewritten to.
    pub floating_branch: String,
    pub remote: String,
    pub dry_run: bool,
    /// Services whose working copy directory is not named after the service.
    pub repo_aliases: BTreeMap<String, String>,
    pub max_concurrent_updates: usize,
    /// Pipelines not yet started at this instant are skipped.
    pub deadline: Option<Instant>,
}

impl DriverConfig {
    pub fn new(repos_dir: impl Into<PathBuf>) -> Self {
        Self {
            repos_dir: repos_dir.into(),
            checkout_branch: DEFAULT_CHECKOUT_BRANCH.to_string(),
            floating_branch: DEFAULT_FLOATING_BRANCH.to_string(),
            remote: DEFAULT_REMOTE.to_string(),
            dry_run: false,
            repo_aliases: BTreeMap::new(),
            max_concurrent_updates: 1,
            deadline: None,
        }
    }

    pub fn with_checkout_branch(mut self, branch: impl Into<String>) -> Self {
        self.checkout_branch = branch.into();
        self
    }

    pub fn with_floating_branch(mut self, branch: impl Into<String>) -> Self {
        self.floating_branch = branch.into();
        self
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_repo_aliases(mut self, aliases: BTreeMap<String, String>) -> Self {
        self.repo_aliases = aliases;
        self
    }

    pub fn with_max_concurrent_updates(mut self, max: usize) -> Self {
        self.max_concurrent_updates = max;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Repository directory name for a service.
    pub fn repo_name<'a>(&'a self, service: &'a str) -> &'a str {
        self.repo_aliases
            .get(service)
            .map(String::as_str)
            .unwrap_or(service)
    }

    /// `None` when the repository name would leave `repos_dir`.
    pub fn working_copy_for(&self, service: &str) -> Option<PathBuf> {
        let repo = self.repo_name(service);
        is_plain_dir_name(repo).then(|| self.repos_dir.join(repo))
    }

    pub fn commit_message(&self) -> String {
        format!(
            "Update Tekton SC pipeline URLs to use {} branch",
            self.floating_branch
        )
    }
}

/// Drives the update pipeline for stale services.
#[derive(Clone)]
pub struct RepoUpdateDriver {
    git: Arc<dyn RepoOps>,
    mutator: Arc<dyn ReferenceMutator>,
    config: Arc<DriverConfig>,
}

impl RepoUpdateDriver {
    pub fn new(
        git: Arc<dyn RepoOps>,
        mutator: Arc<dyn ReferenceMutator>,
        config: DriverConfig,
    ) -> Self {
        Self {
            git,
            mutator,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Run checkout → mutate → commit → push for one service.
    ///
    /// Never fails: every error becomes the outcome's reason.
    pub async fn process_service(&self, service: &str) -> RepoUpdateOutcome {
        let Some(working_copy) = self.config.working_copy_for(service) else {
            return self.invalid_repo_name(service);
        };
        let span = tracing::info_span!("update", service = %service, repo = %working_copy.display());
        self.run_pipeline(service, working_copy).instrument(span).await
    }

    async fn run_pipeline(&self, service: &str, working_copy: PathBuf) -> RepoUpdateOutcome {
        let config = &self.config;

        if !is_working_copy(&working_copy) {
            tracing::warn!("Working copy missing or not a git repository");
            return RepoUpdateOutcome::unchanged(
                service,
                working_copy,
                UpdateReason::WorkingCopyMissing,
            );
        }

        if let Err(e) = self
            .git
            .checkout(&working_copy, &config.remote, &config.checkout_branch)
            .await
        {
            let reason = match e {
                GitError::BranchNotFoundOnRemote { .. } => {
                    tracing::warn!(branch = %config.checkout_branch, "Branch does not exist on remote, skipping");
                    UpdateReason::BranchNotFoundOnRemote
                }
                other => {
                    tracing::error!(error = %other, "Checkout failed");
                    UpdateReason::CheckoutFailed {
                        detail: other.to_string(),
                    }
                }
            };
            return RepoUpdateOutcome::unchanged(service, working_copy, reason);
        }

        let mutation = match self.mutate(&working_copy).await {
            Ok(result) => result,
            Err(reason) => return RepoUpdateOutcome::unchanged(service, working_copy, reason),
        };

        if mutation.reason != MutationReason::FilesUpdated || !mutation.changed() {
            tracing::info!(reason = ?mutation.reason, "No changes made");
            return RepoUpdateOutcome::unchanged(service, working_copy, mutation.reason.into());
        }

        let mut outcome = RepoUpdateOutcome::unchanged(service, &working_copy, UpdateReason::FilesUpdated);
        outcome.changed_files = mutation.changed_files;

        if config.dry_run {
            tracing::info!(
                files = outcome.changed_files.len(),
                branch = %config.checkout_branch,
                "[DRY RUN] Would commit and push"
            );
            outcome.would_change = true;
            return outcome;
        }

        let files: Vec<PathBuf> = outcome.changed_files.iter().map(|c| c.path.clone()).collect();
        match self
            .git
            .commit(&working_copy, &files, &config.commit_message())
            .await
        {
            Ok(sha) => {
                tracing::info!(commit = %sha, "Committed changes");
                outcome.committed = true;
                outcome.commit_sha = Some(sha);
            }
            Err(e) => {
                tracing::error!(error = %e, "Commit failed");
                let mut detail = e.to_string();
                if let Err(restore) = self.git.restore(&working_copy, &files).await {
                    tracing::error!(error = %restore, "Failed to restore rewritten files");
                    detail = format!("{detail}; restoring rewritten files also failed: {restore}");
                }
                outcome.reason = UpdateReason::CommitFailed { detail };
                return outcome;
            }
        }

        match self
            .git
            .push(&working_copy, &config.remote, &config.checkout_branch)
            .await
        {
            Ok(()) => {
                tracing::info!(remote = %config.remote, branch = %config.checkout_branch, "Pushed changes");
                outcome.pushed = true;
                outcome.changed = true;
            }
            Err(e) => {
                tracing::error!(error = %e, "Push failed; remediation attempted but not published");
                outcome.reason = UpdateReason::PushFailed {
                    detail: e.to_string(),
                };
            }
        }

        outcome
    }

    async fn mutate(&self, working_copy: &Path) -> Result<MutationResult, UpdateReason> {
        let mutator = self.mutator.clone();
        let path = working_copy.to_path_buf();
        let floating = self.config.floating_branch.clone();
        let apply = !self.config.dry_run;

        let joined = tokio::task::spawn_blocking(move || {
            mutator.update_branch_references(&path, &floating, apply)
        })
        .await;

        match joined {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(MutationError::Format { path, reason })) => {
                tracing::error!(file = %path.display(), error = %reason, "Pipeline file could not be parsed");
                Err(UpdateReason::FormatError {
                    file: path,
                    detail: reason,
                })
            }
            Ok(Err(e)) => {
                tracing::error!(file = %e.path().display(), error = %e, "Pipeline file update failed");
                Err(UpdateReason::MutationFailed {
                    detail: e.to_string(),
                })
            }
            Err(e) => Err(UpdateReason::MutationFailed {
                detail: format!("mutation task failed: {e}"),
            }),
        }
    }

    fn invalid_repo_name(&self, service: &str) -> RepoUpdateOutcome {
        let repo = self.config.repo_name(service);
        tracing::warn!(service = %service, repo = %repo, "Repository name is not a plain directory name");
        RepoUpdateOutcome::unchanged(service, PathBuf::from(repo), UpdateReason::WorkingCopyMissing)
    }

    /// Process every service and return outcomes in input order.
    ///
    /// Services whose repository had not started when the deadline passed
    /// get no outcome.
    pub async fn process_all(&self, services: &[String]) -> Vec<RepoUpdateOutcome> {
        let mut indexed = Vec::with_capacity(services.len());
        let mut groups: Vec<(PathBuf, Vec<(usize, String)>)> = Vec::new();
        for (index, service) in services.iter().enumerate() {
            let Some(working_copy) = self.config.working_copy_for(service) else {
                indexed.push((index, self.invalid_repo_name(service)));
                continue;
            };
            match groups.iter_mut().find(|(path, _)| *path == working_copy) {
                Some((_, members)) => members.push((index, service.clone())),
                None => groups.push((working_copy, vec![(index, service.clone())])),
            }
        }

        let grouped: usize = groups.iter().map(|(_, members)| members.len()).sum();
        if groups.len() < grouped {
            tracing::info!(
                services = grouped,
                repositories = groups.len(),
                "Some services share a repository"
            );
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_updates.max(1)));
        let mut handles = Vec::with_capacity(groups.len());
        for (_, members) in groups {
            let sem = semaphore.clone();
            let driver = self.clone();
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let Some((_, lead)) = members.first() else {
                    return Vec::new();
                };
                if driver.deadline_passed() {
                    tracing::warn!(service = %lead, "Run deadline reached, not starting update");
                    return Vec::new();
                }
                let shared = driver.process_service(lead).await;
                members
                    .into_iter()
                    .map(|(index, service)| {
                        let mut outcome = shared.clone();
                        outcome.service_name = service;
                        (index, outcome)
                    })
                    .collect::<Vec<_>>()
            }));
        }

        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(outcomes) => indexed.extend(outcomes),
                Err(e) => tracing::error!(error = %e, "Update task panicked"),
            }
        }
        indexed.sort_by_key(|(index, _)| *index);
        indexed.into_iter().map(|(_, outcome)| outcome).collect()
    }

    fn deadline_passed(&self) -> bool {
        self.config
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}
