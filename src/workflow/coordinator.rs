//! End-to-end run: inspect → classify → update stale → reconcile.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use super::config::WorkflowConfig;
use crate::error::ConfigError;
use crate::git::{is_working_copy, GitCli, RepoOps};
use crate::registry::{load_service_mappings, select_services, QuayClient, TagInspector, TagSource};
use crate::report::{
    classification_report, reconcile, stale_list, unremedied_report, update_summary,
    ReconcileContext, RunSummary, UnremediedEntry,
};
use crate::staleness::{classify_all, ClassificationCounts, ImageCheckResult};
use crate::tekton::{ReferenceMutator, TektonMutator};
use crate::update::{DriverConfig, RepoUpdateDriver, RepoUpdateOutcome};

/// Per-invocation switches that are not part of the configuration file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop after classification.
    pub check_only: bool,
    /// Write sorted stale service names here.
    pub output_stale: Option<PathBuf>,
    /// Print human-readable reports as each stage completes.
    pub print_reports: bool,
    /// Reference date for the recency window; defaults to the local date.
    pub today: Option<NaiveDate>,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub results: Vec<ImageCheckResult>,
    /// `None` in check-only mode.
    pub outcomes: Option<Vec<RepoUpdateOutcome>>,
    pub unremedied: Option<Vec<UnremediedEntry>>,
}

impl RunReport {
    pub fn stale_services(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.is_stale())
            .map(|r| r.service_name.clone())
            .collect()
    }

    pub fn summary(&self, config: &WorkflowConfig, check_only: bool) -> RunSummary {
        RunSummary {
            run_id: self.run_id.to_string(),
            window_days: config.quick_search_days,
            dry_run: config.dry_run,
            check_only,
            counts: ClassificationCounts::from_results(&self.results),
            results: self.results.clone(),
            outcomes: self.outcomes.clone(),
            unremedied: self.unremedied.clone(),
        }
    }
}

/// Composes the inspector, classifier, driver and reporter.
pub struct Coordinator {
    config: WorkflowConfig,
    tags: Arc<dyn TagSource>,
    git: Arc<dyn RepoOps>,
    mutator: Arc<dyn ReferenceMutator>,
}

impl Coordinator {
    /// Coordinator backed by the Quay API, the `git` binary and the
    /// filesystem mutator.
    pub fn new(config: WorkflowConfig) -> Self {
        let tags = Arc::new(QuayClient::new(
            config.registry_api_base.clone(),
            config.request_timeout(),
        ));
        Self::with_components(config, tags, Arc::new(GitCli::new()), Arc::new(TektonMutator::new()))
    }

    pub fn with_components(
        config: WorkflowConfig,
        tags: Arc<dyn TagSource>,
        git: Arc<dyn RepoOps>,
        mutator: Arc<dyn ReferenceMutator>,
    ) -> Self {
        Self {
            config,
            tags,
            git,
            mutator,
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Run the workflow.
    ///
    /// # Errors
    ///
    /// Fails before any per-service work on configuration problems
    /// ([`ConfigError`] inside the returned error) and when the stale list
    /// cannot be written. Per-service failures are part of the report.
    pub async fn run(&self, options: &RunOptions) -> anyhow::Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", run_id = %run_id);
        self.run_inner(run_id, options).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, options: &RunOptions) -> anyhow::Result<RunReport> {
        let config = &self.config;
        config.validate()?;

        let mappings = load_service_mappings(&config.repos_config)?;
        tracing::info!(
            count = mappings.len(),
            path = %config.repos_config.display(),
            "Loaded repository configuration"
        );

        let repos_dir = if options.check_only {
            None
        } else {
            Some(config.require_repos_dir()?.to_path_buf())
        };

        let (selected, unknown) = select_services(&mappings, &config.services);
        for name in &unknown {
            tracing::warn!(service = %name, "Requested service not found in mapping");
        }
        if selected.is_empty() && !config.services.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "services".to_string(),
                message: format!("none of {:?} are in the mapping", config.services),
            }
            .into());
        }

        let today = options
            .today
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        tracing::info!(
            services = selected.len(),
            window_days = config.quick_search_days,
            today = %today,
            "Checking registry for recent sc- images"
        );

        let inspector = TagInspector::new(self.tags.clone());
        let inspections = inspector
            .inspect_all(
                &selected,
                config.quick_search_days,
                today,
                config.max_concurrent_queries,
            )
            .await;
        let results = classify_all(&inspections);

        let counts = ClassificationCounts::from_results(&results);
        tracing::info!(
            recent = counts.recent,
            stale = counts.stale,
            errors = counts.errors,
            "Classification complete"
        );
        if options.print_reports {
            print!("{}", classification_report(&results, config.quick_search_days));
        }

        if let Some(path) = &options.output_stale {
            write_stale_list(path, &results)?;
        }

        let mut report = RunReport {
            run_id,
            results,
            outcomes: None,
            unremedied: None,
        };

        let Some(repos_dir) = repos_dir else {
            tracing::info!("Check-only mode: skipping repository updates");
            return Ok(report);
        };

        let stale = report.stale_services();
        let outcomes = if stale.is_empty() {
            tracing::info!("No stale services, nothing to update");
            Vec::new()
        } else {
            let driver = RepoUpdateDriver::new(
                self.git.clone(),
                self.mutator.clone(),
                self.driver_config(repos_dir),
            );
            driver.process_all(&stale).await
        };

        if options.print_reports && !outcomes.is_empty() {
            print!("{}", update_summary(&outcomes, config.dry_run));
        }

        let context = ReconcileContext {
            checkout_branch: config.branch.clone(),
            floating_branch: config.pipeline_branch.clone(),
        };
        let unremedied = reconcile(&report.results, &outcomes, &context);
        if !unremedied.is_empty() {
            tracing::warn!(count = unremedied.len(), "Stale services remain unremedied");
        }
        if options.print_reports {
            if let Some(text) = unremedied_report(&unremedied) {
                print!("{text}");
            }
        }

        report.outcomes = Some(outcomes);
        report.unremedied = Some(unremedied);
        Ok(report)
    }

    fn driver_config(&self, repos_dir: PathBuf) -> DriverConfig {
        let config = &self.config;
        let deadline = config
            .run_timeout()
            .map(|timeout| tokio::time::Instant::now() + timeout);
        DriverConfig::new(repos_dir)
            .with_checkout_branch(config.branch.clone())
            .with_floating_branch(config.pipeline_branch.clone())
            .with_remote(config.remote.clone())
            .with_dry_run(config.dry_run)
            .with_repo_aliases(config.repo_aliases.clone())
            .with_max_concurrent_updates(config.max_concurrent_updates)
            .with_deadline(deadline)
    }
}

fn write_stale_list(path: &Path, results: &[ImageCheckResult]) -> anyhow::Result<()> {
    std::fs::write(path, stale_list(results))
        .with_context(|| format!("failed to write stale service list to {}", path.display()))?;
    tracing::info!(path = %path.display(), "Wrote stale service list");
    Ok(())
}

/// Names of every git working copy directly under `repos_dir`, sorted.
pub fn discover_working_copies(repos_dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = walkdir::WalkDir::new(repos_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir() && is_working_copy(entry.path()))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
