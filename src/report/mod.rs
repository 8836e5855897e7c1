//! Reconciliation of update outcomes and human/JSON reports.

pub mod reconcile;
pub mod render;

pub use reconcile::{reconcile, ReconcileContext, UnremediedEntry, UnremediedReason};
pub use render::{
    classification_report, stale_list, unremedied_report, update_summary, RunSummary,
};
