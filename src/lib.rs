//! hall-monitor: find services whose security-compliance images went stale
//! and repoint their Tekton SC pipelines at a floating branch.
//!
//! The run is a straight pipeline: registry inspection, staleness
//! classification, per-repository updates, then reconciliation of what is
//! still stale.

// Core modules
pub mod cli;
pub mod error;
pub mod git;
pub mod registry;
pub mod report;
pub mod staleness;
pub mod tekton;
pub mod update;
pub mod workflow;

// Re-export commonly used error types
pub use error::{ConfigError, GitError, MutationError, RegistryError};
