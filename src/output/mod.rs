//! Output formatting for offline-sync.
//!
//! This module provides formatters for displaying queue and cache state in
//! various formats.

mod json;
mod pretty;

use crate::cli::args::OutputFormat;
use crate::error::SyncError;
use crate::sync::{DrainReport, PendingAction};

pub use json::*;
pub use pretty::*;

/// Format queued actions based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_actions(
    actions: &[PendingAction],
    title: &str,
    format: OutputFormat,
) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_actions_pretty(actions, title)),
        OutputFormat::Json => format_actions_json(actions),
    }
}

/// Format a single queued action based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_action(action: &PendingAction, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_action_pretty(action)),
        OutputFormat::Json => to_json(action),
    }
}

/// Format a drain report based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_drain_report(report: &DrainReport, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_drain_report_pretty(report)),
        OutputFormat::Json => to_json(report),
    }
}
