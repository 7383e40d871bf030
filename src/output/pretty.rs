use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::cache::CacheEntry;
use crate::sync::{ActionStatus, DrainReport, PendingAction, Priority, QueueStats, SyncStatus};

/// Render how long ago `then` was
pub fn format_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(then);
    if age.num_days() > 0 {
        format!("{} days ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{} hours ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{} minutes ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}

fn status_icon(status: ActionStatus) -> String {
    match status {
        ActionStatus::Pending => "⏳".to_string(),
        ActionStatus::Syncing => "▶".cyan().to_string(),
        ActionStatus::Failed => "✗".red().to_string(),
    }
}

fn priority_label(priority: Priority) -> String {
    match priority {
        Priority::High => "high".red().to_string(),
        Priority::Medium => "medium".yellow().to_string(),
        Priority::Low => "low".dimmed().to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// Format queued actions as a table, in dispatch order
pub fn format_actions_pretty(actions: &[PendingAction], title: &str) -> String {
    if actions.is_empty() {
        return format!("{title} (0)\n  No queued actions");
    }

    let mut lines = vec![format!("{title} ({})", actions.len())];
    lines.push("─".repeat(72));
    lines.push(format!(
        "{:<32} {:<20} {:<8} {:<8} {}",
        "ID", "Type", "Priority", "Attempts", "Status"
    ));
    lines.push("─".repeat(72));

    for action in actions {
        lines.push(format!(
            "{:<32} {:<20} {:<8} {:<8} {} {}",
            action.id.to_string(),
            truncate(&action.action_type, 20),
            priority_label(action.priority),
            action.attempts,
            status_icon(action.status),
            action.status
        ));
        if let Some(error) = &action.last_error {
            lines.push(format!("{:<33}{}", "", truncate(error, 60).red()));
        }
    }

    lines.join("\n")
}

/// Format one queued action
pub fn format_action_pretty(action: &PendingAction) -> String {
    let mut output = format!(
        "{} {}\n",
        status_icon(action.status),
        action.action_type.bold()
    );
    output.push_str(&format!("  {}: {}\n", "ID".dimmed(), action.id));
    output.push_str(&format!("  {}: {}\n", "Priority".dimmed(), priority_label(action.priority)));
    output.push_str(&format!("  {}: {}\n", "Status".dimmed(), action.status));
    output.push_str(&format!(
        "  {}: {}\n",
        "Created".dimmed(),
        action.created_at.format("%Y-%m-%d %H:%M:%S")
    ));
    if action.attempts > 0 {
        output.push_str(&format!("  {}: {}\n", "Attempts".dimmed(), action.attempts));
    }
    if let Some(error) = &action.last_error {
        output.push_str(&format!("  {}: {}\n", "Last error".dimmed(), error.red()));
    }
    output
}

/// Format the queue status panel
pub fn format_status_pretty(
    stats: &QueueStats,
    status: &SyncStatus,
    backend: &str,
    now: DateTime<Utc>,
) -> String {
    let mut lines = vec!["Offline Queue Status".bold().to_string()];
    lines.push("─".repeat(40));

    let backend_line = if status.storage_degraded {
        backend.yellow().to_string()
    } else {
        backend.to_string()
    };
    lines.push(format!("  Storage:    {backend_line}"));
    lines.push(format!(
        "  Pending:    {} {}",
        stats.pending,
        if stats.pending > 0 {
            "actions waiting".dimmed()
        } else {
            "".dimmed()
        }
    ));
    if stats.syncing > 0 {
        lines.push(format!("  Syncing:    {}", stats.syncing));
    }
    lines.push(format!(
        "  Failed:     {} {}",
        stats.failed,
        if stats.failed > 0 {
            "actions need attention".red()
        } else {
            "".normal()
        }
    ));

    if let Some(oldest) = stats.oldest {
        lines.push(format!("  Oldest:     {}", format_age(oldest, now).dimmed()));
    }
    if let Some(last) = status.last_sync_time {
        lines.push(format!("  Last sync:  {}", format_age(last, now).dimmed()));
    }

    if stats.pending > 0 {
        lines.push(String::new());
        lines.push(
            "Run 'offline-sync queue run' to dispatch pending actions"
                .dimmed()
                .to_string(),
        );
    }

    lines.join("\n")
}

/// Format the result of a drain
pub fn format_drain_report_pretty(report: &DrainReport) -> String {
    if report.skipped_offline {
        return "Offline: drain skipped, actions stay queued.".yellow().to_string();
    }
    if report.processed == 0 {
        return "No pending actions to sync.".to_string();
    }

    let mut lines = vec![format!("Sync completed: {} actions", report.processed)];
    lines.push("─".repeat(40));

    if report.succeeded > 0 {
        lines.push(format!(
            "  {} {}",
            "✓".green(),
            format!("{} succeeded", report.succeeded).green()
        ));
    }
    if report.retried > 0 {
        lines.push(format!(
            "  {} {}",
            "↻".yellow(),
            format!("{} will retry", report.retried).yellow()
        ));
    }
    if report.failed > 0 {
        lines.push(format!(
            "  {} {}",
            "✗".red(),
            format!("{} failed", report.failed).red()
        ));
    }
    if report.deferred > 0 {
        lines.push(format!(
            "  {} {}",
            "○".dimmed(),
            format!("{} without executor", report.deferred).dimmed()
        ));
    }

    lines.join("\n")
}

/// Format a cache entry with its metadata
pub fn format_cache_entry_pretty(entry: &CacheEntry, now: DateTime<Utc>) -> String {
    let mut output = format!("{}\n", entry.key.bold());
    output.push_str(&format!(
        "  {}: {}\n",
        "Cached".dimmed(),
        format_age(entry.timestamp, now)
    ));
    let expiry = entry.expiry.map_or_else(
        || "never".to_string(),
        |e| e.format("%Y-%m-%d %H:%M:%S").to_string(),
    );
    output.push_str(&format!("  {}: {}\n", "Expires".dimmed(), expiry));
    let data = serde_json::to_string_pretty(&entry.data).unwrap_or_else(|_| entry.data.to_string());
    output.push_str(&data);
    output
}

/// Format a list of cache keys
pub fn format_keys_pretty(keys: &[String]) -> String {
    if keys.is_empty() {
        return "Cached keys (0)\n  Cache is empty".to_string();
    }

    let mut output = format!("Cached keys ({})\n", keys.len());
    output.push_str(&"─".repeat(40));
    for key in keys {
        output.push('\n');
        output.push_str(&format!("  {key}"));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::ActionId;
    use chrono::Duration;
    use serde_json::json;

    fn make_action(status: ActionStatus, error: Option<&str>) -> PendingAction {
        let now = Utc::now();
        let mut action = PendingAction::new(
            ActionId::new(3, now.timestamp_millis()),
            "update-stock",
            json!({}),
            Priority::Medium,
            now,
        );
        action.status = status;
        action.last_error = error.map(str::to_string);
        action
    }

    #[test]
    fn test_format_age() {
        let now = Utc::now();
        assert_eq!(format_age(now, now), "just now");
        assert_eq!(format_age(now - Duration::minutes(5), now), "5 minutes ago");
        assert_eq!(format_age(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(format_age(now - Duration::days(2), now), "2 days ago");
    }

    #[test]
    fn test_format_actions_empty() {
        let output = format_actions_pretty(&[], "Queued actions");
        assert!(output.contains("No queued actions"));
    }

    #[test]
    fn test_format_actions_with_error() {
        let action = make_action(ActionStatus::Failed, Some("Conflict: version mismatch"));
        let output = format_actions_pretty(&[action.clone()], "Queued actions");
        assert!(output.contains("Queued actions (1)"));
        assert!(output.contains(&action.id.to_string()));
        assert!(output.contains("update-stock"));
        assert!(output.contains("version mismatch"));
    }

    #[test]
    fn test_format_action() {
        let action = make_action(ActionStatus::Pending, None);
        let output = format_action_pretty(&action);
        assert!(output.contains("update-stock"));
        assert!(output.contains("pending"));
        assert!(!output.contains("Last error"));
    }

    #[test]
    fn test_format_drain_report() {
        let mut report = DrainReport::started(Utc::now());
        assert_eq!(format_drain_report_pretty(&report), "No pending actions to sync.");

        report.processed = 3;
        report.succeeded = 2;
        report.failed = 1;
        let output = format_drain_report_pretty(&report);
        assert!(output.contains("Sync completed: 3 actions"));
        assert!(output.contains("2 succeeded"));
        assert!(output.contains("1 failed"));
        assert!(!output.contains("retry"));

        let offline = DrainReport::offline(Utc::now());
        assert!(format_drain_report_pretty(&offline).contains("Offline"));
    }

    #[test]
    fn test_format_status() {
        let now = Utc::now();
        let stats = QueueStats {
            pending: 2,
            failed: 1,
            total: 3,
            oldest: Some(now - Duration::hours(2)),
            ..QueueStats::default()
        };
        let output = format_status_pretty(&stats, &SyncStatus::default(), "sqlite", now);
        assert!(output.contains("sqlite"));
        assert!(output.contains("2 hours ago"));
        assert!(output.contains("queue run"));
    }

    #[test]
    fn test_format_cache_entry() {
        let now = Utc::now();
        let entry = CacheEntry::new("products".to_string(), json!({"n": 1}), now, None);
        let output = format_cache_entry_pretty(&entry, now);
        assert!(output.contains("products"));
        assert!(output.contains("never"));
        assert!(output.contains("\"n\": 1"));
    }

    #[test]
    fn test_format_keys() {
        assert!(format_keys_pretty(&[]).contains("Cache is empty"));
        let output = format_keys_pretty(&["a".to_string(), "b".to_string()]);
        assert!(output.contains("Cached keys (2)"));
    }
}
