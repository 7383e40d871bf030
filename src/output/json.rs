//! JSON output formatting.

use serde::Serialize;
use serde_json::json;

use crate::error::SyncError;
use crate::sync::{PendingAction, QueueStats, SyncStatus};

/// Format queued actions as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_actions_json(actions: &[PendingAction]) -> Result<String, SyncError> {
    let output = json!({
        "count": actions.len(),
        "items": actions
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format queue statistics and status as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_status_json(
    stats: &QueueStats,
    status: &SyncStatus,
    backend: &str,
) -> Result<String, SyncError> {
    let output = json!({
        "backend": backend,
        "status": status,
        "queue": stats
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Serialize any value as pretty JSON.
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, SyncError> {
    Ok(serde_json::to_string_pretty(value)?)
}
