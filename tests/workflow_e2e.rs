//! End-to-end workflow runs against an in-memory registry, a recording git
//! fake and real working-copy directories.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;

use hall_monitor::git::RepoOps;
use hall_monitor::registry::TagSource;
use hall_monitor::report::UnremediedReason;
use hall_monitor::staleness::ImageStatus;
use hall_monitor::tekton::TektonMutator;
use hall_monitor::update::UpdateReason;
use hall_monitor::workflow::{Coordinator, RunOptions, WorkflowConfig};
use hall_monitor::{ConfigError, GitError, RegistryError};

struct MemoryRegistry {
    tags: HashMap<String, Vec<String>>,
}

#[async_trait]
impl TagSource for MemoryRegistry {
    async fn list_tags(&self, registry_path: &str) -> Result<Vec<String>, RegistryError> {
        match self.tags.get(registry_path) {
            Some(tags) => Ok(tags.clone()),
            None => Err(RegistryError::HttpStatus {
                repository: registry_path.to_string(),
                status: 500,
            }),
        }
    }
}

#[derive(Default)]
struct RecordingGit {
    branchless: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl RecordingGit {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

fn name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

#[async_trait]
impl RepoOps for RecordingGit {
    async fn checkout(&self, wc: &Path, remote: &str, branch: &str) -> Result<(), GitError> {
        self.calls.lock().unwrap().push(format!("checkout {}", name(wc)));
        if self.branchless.contains(&name(wc)) {
            return Err(GitError::BranchNotFoundOnRemote {
                remote: remote.to_string(),
                branch: branch.to_string(),
            });
        }
        Ok(())
    }

    async fn commit(&self, wc: &Path, files: &[PathBuf], message: &str) -> Result<String, GitError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("commit {} {} {message}", name(wc), files.len()));
        Ok("f00dfeed".to_string())
    }

    async fn push(&self, wc: &Path, remote: &str, branch: &str) -> Result<(), GitError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("push {} {remote} {branch}", name(wc)));
        Ok(())
    }

    async fn restore(&self, wc: &Path, files: &[PathBuf]) -> Result<(), GitError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("restore {} {}", name(wc), files.len()));
        Ok(())
    }
}

const PINNED_PIPELINE: &str = r#"apiVersion: tekton.dev/v1
kind: PipelineRun
metadata:
  name: alpha-sc-on-push
  annotations:
    # security compliance build
    pipelinesascode.tekton.dev/pipeline: "https://github.com/RedHatInsights/konflux-pipelines/raw/v1.2.0/pipelines/docker-build-oci-ta.yaml"
    pipelinesascode.tekton.dev/max-keep-runs: "3"
spec:
  params:
    - name: git-url
      value: '{{source_url}}'
"#;

struct Fixture {
    _dir: tempfile::TempDir,
    repos: PathBuf,
    mapping: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let repos = dir.path().join("repos");

    let alpha = repos.join("alpha");
    fs::create_dir_all(alpha.join(".git")).unwrap();
    fs::create_dir_all(alpha.join(".tekton")).unwrap();
    fs::write(alpha.join(".tekton/alpha-sc-push.yaml"), PINNED_PIPELINE).unwrap();
    fs::write(alpha.join(".tekton/alpha-push.yaml"), PINNED_PIPELINE).unwrap();

    let beta = repos.join("beta");
    fs::create_dir_all(beta.join(".git")).unwrap();
    fs::create_dir_all(beta.join(".tekton")).unwrap();
    fs::write(beta.join(".tekton/beta-push.yaml"), PINNED_PIPELINE).unwrap();

    fs::create_dir_all(repos.join("gamma/.git")).unwrap();

    let mapping = dir.path().join("repos.json");
    fs::write(
        &mapping,
        r#"{
  "alpha": "quay.io/redhat-services-prod/alpha",
  "beta": "quay.io/redhat-services-prod/beta",
  "gamma": "quay.io/redhat-services-prod/gamma",
  "delta": "quay.io/redhat-services-prod/delta",
  "epsilon": "quay.io/redhat-services-prod/epsilon"
}"#,
    )
    .unwrap();

    Fixture {
        _dir: dir,
        repos,
        mapping,
    }
}

fn registry() -> Arc<MemoryRegistry> {
    let mut tags = HashMap::new();
    tags.insert(
        "quay.io/redhat-services-prod/alpha".to_string(),
        vec!["latest".to_string(), "sc-20251201-aaa1111".to_string()],
    );
    tags.insert("quay.io/redhat-services-prod/beta".to_string(), vec![]);
    tags.insert(
        "quay.io/redhat-services-prod/gamma".to_string(),
        vec!["sc-2025-bad".to_string()],
    );
    tags.insert(
        "quay.io/redhat-services-prod/delta".to_string(),
        vec![
            "sc-20260110-aaa1111".to_string(),
            "sc-20260115-bbb2222".to_string(),
            "sc-20251201-ccc3333".to_string(),
            "sc-2026-bad".to_string(),
        ],
    );
    Arc::new(MemoryRegistry { tags })
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 16).unwrap()
}

fn options(check_only: bool) -> RunOptions {
    RunOptions {
        check_only,
        output_stale: None,
        print_reports: false,
        today: Some(today()),
    }
}

#[tokio::test]
async fn full_run_remedies_alpha_and_reports_beta_and_gamma() {
    let fx = fixture();
    let git = Arc::new(RecordingGit {
        branchless: vec!["gamma".to_string()],
        ..Default::default()
    });
    let config = WorkflowConfig::default()
        .with_repos_config(&fx.mapping)
        .with_git_repos_dir(&fx.repos);
    let coordinator =
        Coordinator::with_components(config, registry(), git.clone(), Arc::new(TektonMutator::new()));

    let report = coordinator.run(&options(false)).await.unwrap();

    let status: HashMap<_, _> = report
        .results
        .iter()
        .map(|r| (r.service_name.as_str(), r.status))
        .collect();
    assert_eq!(status["alpha"], ImageStatus::Stale);
    assert_eq!(status["beta"], ImageStatus::Stale);
    assert_eq!(status["gamma"], ImageStatus::Stale);
    assert_eq!(status["delta"], ImageStatus::Recent);
    assert_eq!(status["epsilon"], ImageStatus::Error);

    let delta = report.results.iter().find(|r| r.service_name == "delta").unwrap();
    assert_eq!(delta.matched_tag.as_deref(), Some("sc-20260115-bbb2222"));

    let outcomes = report.outcomes.as_ref().unwrap();
    assert_eq!(outcomes.len(), 3);
    let alpha = &outcomes[0];
    assert_eq!(alpha.service_name, "alpha");
    assert!(alpha.changed);
    assert_eq!(alpha.reason, UpdateReason::FilesUpdated);
    assert_eq!(alpha.commit_sha.as_deref(), Some("f00dfeed"));
    assert_eq!(outcomes[1].reason, UpdateReason::NoMatchingFiles);
    assert_eq!(outcomes[2].reason, UpdateReason::BranchNotFoundOnRemote);

    let rewritten = fs::read_to_string(fx.repos.join("alpha/.tekton/alpha-sc-push.yaml")).unwrap();
    assert_eq!(
        rewritten,
        PINNED_PIPELINE.replace("/raw/v1.2.0/", "/raw/main/")
    );
    let untouched = fs::read_to_string(fx.repos.join("alpha/.tekton/alpha-push.yaml")).unwrap();
    assert_eq!(untouched, PINNED_PIPELINE);

    let unremedied = report.unremedied.as_ref().unwrap();
    let names: Vec<_> = unremedied.iter().map(|e| e.service_name.as_str()).collect();
    assert_eq!(names, vec!["beta", "gamma"]);
    assert_eq!(unremedied[0].reason, UnremediedReason::NoMatchingFiles);
    assert_eq!(
        unremedied[1].reason.to_string(),
        "Branch 'security-compliance' not found on remote"
    );

    assert_eq!(
        git.calls(),
        vec![
            "checkout alpha".to_string(),
            "commit alpha 1 Update Tekton SC pipeline URLs to use main branch".to_string(),
            "push alpha upstream security-compliance".to_string(),
            "checkout beta".to_string(),
            "checkout gamma".to_string(),
        ]
    );
}

#[tokio::test]
async fn dry_run_plans_without_writing() {
    let fx = fixture();
    let git = Arc::new(RecordingGit::default());
    let config = WorkflowConfig::default()
        .with_repos_config(&fx.mapping)
        .with_git_repos_dir(&fx.repos)
        .with_services(vec!["alpha".to_string()])
        .with_dry_run(true);
    let coordinator =
        Coordinator::with_components(config, registry(), git.clone(), Arc::new(TektonMutator::new()));

    let report = coordinator.run(&options(false)).await.unwrap();

    let outcome = &report.outcomes.as_ref().unwrap()[0];
    assert!(!outcome.changed);
    assert!(outcome.would_change);
    assert_eq!(outcome.changed_files.len(), 1);
    assert!(report.unremedied.as_ref().unwrap().is_empty());
    assert_eq!(git.calls(), vec!["checkout alpha".to_string()]);
    assert_eq!(
        fs::read_to_string(fx.repos.join("alpha/.tekton/alpha-sc-push.yaml")).unwrap(),
        PINNED_PIPELINE
    );
}

#[tokio::test]
async fn check_only_never_touches_repositories() {
    let fx = fixture();
    let git = Arc::new(RecordingGit::default());
    let stale_file = fx.repos.parent().unwrap().join("stale.txt");
    let config = WorkflowConfig::default().with_repos_config(&fx.mapping);
    let coordinator =
        Coordinator::with_components(config, registry(), git.clone(), Arc::new(TektonMutator::new()));

    let mut opts = options(true);
    opts.output_stale = Some(stale_file.clone());
    let report = coordinator.run(&opts).await.unwrap();

    assert!(report.outcomes.is_none());
    assert!(report.unremedied.is_none());
    assert!(git.calls().is_empty());
    assert_eq!(fs::read_to_string(stale_file).unwrap(), "alpha\nbeta\ngamma\n");
}

#[tokio::test]
async fn missing_working_copy_root_is_fatal() {
    let fx = fixture();
    let git = Arc::new(RecordingGit::default());
    let config = WorkflowConfig::default()
        .with_repos_config(&fx.mapping)
        .with_git_repos_dir(fx.repos.join("nowhere"));
    let coordinator =
        Coordinator::with_components(config, registry(), git.clone(), Arc::new(TektonMutator::new()));

    let err = coordinator.run(&options(false)).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::MissingWorkingCopyRoot(_))
    ));
    assert!(git.calls().is_empty());
}

#[tokio::test]
async fn empty_mapping_is_fatal() {
    let fx = fixture();
    fs::write(&fx.mapping, "{}").unwrap();
    let config = WorkflowConfig::default().with_repos_config(&fx.mapping);
    let coordinator = Coordinator::with_components(
        config,
        registry(),
        Arc::new(RecordingGit::default()),
        Arc::new(TektonMutator::new()),
    );

    let err = coordinator.run(&options(true)).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::EmptyMapping(_))
    ));
}

#[tokio::test]
async fn second_run_finds_alpha_already_on_target() {
    let fx = fixture();
    let config = WorkflowConfig::default()
        .with_repos_config(&fx.mapping)
        .with_git_repos_dir(&fx.repos)
        .with_services(vec!["alpha".to_string()]);

    for expected in [UpdateReason::FilesUpdated, UpdateReason::AlreadyOnTargetBranch] {
        let coordinator = Coordinator::with_components(
            config.clone(),
            registry(),
            Arc::new(RecordingGit::default()),
            Arc::new(TektonMutator::new()),
        );
        let report = coordinator.run(&options(false)).await.unwrap();
        assert_eq!(report.outcomes.unwrap()[0].reason, expected);
    }
}
