//! Queue command implementation.
//!
//! Handles pending action queue management commands.

use colored::Colorize;

use super::Context;
use crate::cli::args::{OutputFormat, QueueCommands};
use crate::error::SyncError;
use crate::output::{
    format_action, format_actions, format_drain_report, format_status_json, format_status_pretty,
    to_json,
};
use crate::sync::{ActionId, ActionStatus, Priority, SyncOrchestrator};

/// Execute queue subcommands.
///
/// # Errors
///
/// Returns an error if the store fails or the arguments are invalid.
pub async fn queue(ctx: &Context, cmd: QueueCommands) -> Result<String, SyncError> {
    let orchestrator = ctx.orchestrator()?;
    let format = ctx.format;

    match cmd {
        QueueCommands::Status => show_status(ctx, &orchestrator, format),
        QueueCommands::List { status, limit } => {
            list_actions(&orchestrator, status.as_deref(), limit, format)
        },
        QueueCommands::Add {
            action_type,
            payload,
            priority,
        } => {
            ctx.require_durable()?;
            let output = add_action(&orchestrator, &action_type, &payload, &priority, format)?;
            ctx.require_durable()?;
            Ok(output)
        },
        QueueCommands::Run => {
            let report = orchestrator.sync_now().await?;
            format_drain_report(&report, format)
        },
        QueueCommands::Retry { all, id } => retry_actions(&orchestrator, all, id.as_deref(), format),
        QueueCommands::Clear { force } => clear_actions(&orchestrator, force, format),
    }
}

/// Show queue status.
fn show_status(
    ctx: &Context,
    orchestrator: &SyncOrchestrator,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let stats = orchestrator.stats()?;
    let status = orchestrator.status();
    let store = ctx.store();
    let backend = store.backend_name();

    match format {
        OutputFormat::Json => format_status_json(&stats, &status, backend),
        OutputFormat::Pretty => Ok(format_status_pretty(
            &stats,
            &status,
            backend,
            chrono::Utc::now(),
        )),
    }
}

/// List queued actions.
fn list_actions(
    orchestrator: &SyncOrchestrator,
    status: Option<&str>,
    limit: usize,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let (actions, title) = match status {
        Some(status) => {
            let status: ActionStatus = status.parse()?;
            let title = format!("{} actions", capitalize(&status.to_string()));
            (orchestrator.queue().by_status(status)?, title)
        },
        None => (orchestrator.get_pending_actions()?, "Queued actions".to_string()),
    };

    let shown: Vec<_> = actions.into_iter().take(limit).collect();
    format_actions(&shown, &title, format)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// Queue an action.
fn add_action(
    orchestrator: &SyncOrchestrator,
    action_type: &str,
    payload: &str,
    priority: &str,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let payload: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| SyncError::InvalidInput(format!("Payload is not valid JSON: {e}")))?;
    let priority: Priority = priority.parse()?;

    let queued = orchestrator.add_pending_action(action_type, payload, priority)?;

    match format {
        OutputFormat::Json => format_action(queued.action(), format),
        OutputFormat::Pretty => Ok(format!(
            "Queued {} action (ID: {})",
            queued.action().action_type.bold(),
            queued.id()
        )),
    }
}

/// Reset failed actions.
fn retry_actions(
    orchestrator: &SyncOrchestrator,
    all: bool,
    id: Option<&str>,
    format: OutputFormat,
) -> Result<String, SyncError> {
    if let Some(id) = id {
        let id: ActionId = id.parse()?;
        let reset = orchestrator.retry_action(id)?;

        match format {
            OutputFormat::Json => to_json(&serde_json::json!({"id": id, "reset": reset})),
            OutputFormat::Pretty if reset => Ok(format!("Reset action {id} for retry")),
            OutputFormat::Pretty => Ok(format!("Action {id} has not failed; nothing to reset")),
        }
    } else if all {
        let count = orchestrator.retry_failed_actions()?;

        match format {
            OutputFormat::Json => to_json(&serde_json::json!({"reset": count})),
            OutputFormat::Pretty => Ok(format!("Reset {count} failed actions for retry")),
        }
    } else {
        Err(SyncError::InvalidInput(
            "Specify --all or provide an action ID".to_string(),
        ))
    }
}

/// Remove every queued action.
fn clear_actions(
    orchestrator: &SyncOrchestrator,
    force: bool,
    format: OutputFormat,
) -> Result<String, SyncError> {
    if !force {
        return Err(SyncError::InvalidInput(
            "Use --force to clear all queued actions".to_string(),
        ));
    }
    let removed = orchestrator.clear_all_pending_actions()?;

    match format {
        OutputFormat::Json => to_json(&serde_json::json!({"cleared": removed})),
        OutputFormat::Pretty => Ok(format!("Cleared {removed} actions from the queue")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CommandSpec, Config, Paths};
    use tempfile::TempDir;

    fn create_test_context(format: OutputFormat) -> (Context, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let paths = Paths::with_root(temp_dir.path().to_path_buf());
        paths.ensure_dirs().unwrap();
        let mut config = Config::default();
        config.retry = crate::sync::RetryPolicy::immediate(2);
        config.executors.insert(
            "ok".to_string(),
            CommandSpec {
                command: "true".to_string(),
                args: vec![],
                timeout_secs: 5,
                parallel: false,
            },
        );
        (Context::new(config, paths, format), temp_dir)
    }

    async fn add(ctx: &Context, action_type: &str, priority: &str) {
        let cmd = QueueCommands::Add {
            action_type: action_type.to_string(),
            payload: "{}".to_string(),
            priority: priority.to_string(),
        };
        queue(ctx, cmd).await.unwrap();
    }

    #[tokio::test]
    async fn test_add_and_list() {
        let (ctx, _dir) = create_test_context(OutputFormat::Json);
        add(&ctx, "ok", "low").await;
        add(&ctx, "ok", "high").await;

        let output = queue(&ctx, QueueCommands::List { status: None, limit: 10 })
            .await
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["count"], 2);
        assert_eq!(parsed["items"][0]["priority"], "high");
    }

    #[tokio::test]
    async fn test_add_rejects_bad_payload() {
        let (ctx, _dir) = create_test_context(OutputFormat::Pretty);
        let cmd = QueueCommands::Add {
            action_type: "ok".to_string(),
            payload: "{not json".to_string(),
            priority: "medium".to_string(),
        };
        assert!(matches!(
            queue(&ctx, cmd).await,
            Err(SyncError::InvalidInput(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_dispatches_and_defers() {
        let (ctx, _dir) = create_test_context(OutputFormat::Json);
        add(&ctx, "ok", "medium").await;
        add(&ctx, "unconfigured", "medium").await;

        let output = queue(&ctx, QueueCommands::Run).await.unwrap();
        let report: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(report["succeeded"], 1);
        assert_eq!(report["deferred"], 1);

        let status = queue(&ctx, QueueCommands::Status).await.unwrap();
        let status: serde_json::Value = serde_json::from_str(&status).unwrap();
        assert_eq!(status["queue"]["pending"], 1);
        assert_eq!(status["backend"], "sqlite");
    }

    #[tokio::test]
    async fn test_retry_requires_target() {
        let (ctx, _dir) = create_test_context(OutputFormat::Pretty);
        let result = queue(&ctx, QueueCommands::Retry { all: false, id: None }).await;
        assert!(matches!(result, Err(SyncError::InvalidInput(_))));

        let output = queue(&ctx, QueueCommands::Retry { all: true, id: None })
            .await
            .unwrap();
        assert!(output.contains("Reset 0 failed actions"));
    }

    #[tokio::test]
    async fn test_clear_requires_force() {
        let (ctx, _dir) = create_test_context(OutputFormat::Pretty);
        add(&ctx, "ok", "medium").await;

        let result = queue(&ctx, QueueCommands::Clear { force: false }).await;
        assert!(result.is_err());

        let output = queue(&ctx, QueueCommands::Clear { force: true }).await.unwrap();
        assert!(output.contains("Cleared 1 actions"));
    }

    #[tokio::test]
    async fn test_add_fails_when_store_is_degraded() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let paths = Paths::with_root(temp_dir.path().to_path_buf());
        let mut config = Config::default();
        config.storage.backend = crate::config::StorageBackend::File;
        config.storage.path = Some(blocker.join("store"));
        let ctx = Context::new(config, paths, OutputFormat::Pretty);

        let cmd = QueueCommands::Add {
            action_type: "ok".to_string(),
            payload: "{}".to_string(),
            priority: "medium".to_string(),
        };
        assert!(matches!(
            queue(&ctx, cmd).await,
            Err(SyncError::Storage(_))
        ));
        assert_eq!(ctx.orchestrator().unwrap().get_pending_actions_count().unwrap(), 0);
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("failed"), "Failed");
        assert_eq!(capitalize(""), "");
    }
}
