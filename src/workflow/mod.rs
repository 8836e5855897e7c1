//! Workflow configuration and the coordinator composing a full run.

pub mod config;
pub mod coordinator;

pub use config::{WorkflowConfig, DEFAULT_CONFIG_PATH};
pub use coordinator::{discover_working_copies, Coordinator, RunOptions, RunReport};
