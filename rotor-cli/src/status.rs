// Presentation collaborator output: a JSON snapshot of the pass for
// dashboards or anything else downstream.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use rotor_engine::ReconcileReport;
use serde::Serialize;

use crate::error::Result;

#[derive(Serialize)]
struct StatusSnapshot<'a> {
    generated_at: String,
    playlist: String,
    changed: bool,
    #[serde(flatten)]
    report: &'a ReconcileReport,
}

/// Serialize the reconcile report to `path` as pretty-printed JSON.
pub fn write_status(
    path: &Path,
    playlist: &Path,
    changed: bool,
    report: &ReconcileReport,
) -> Result<()> {
    let snapshot = StatusSnapshot {
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        playlist: playlist.display().to_string(),
        changed,
        report,
    };
    let serialized = serde_json::to_string_pretty(&snapshot)
        .expect("reconcile report serialization is infallible");
    std::fs::write(path, serialized)?;
    Ok(())
}
