//! Executors that perform the remote effect of a queued action.
//!
//! The host registers one [`ActionExecutor`] per action type. Executors must
//! tolerate being called more than once for the same payload: delivery is
//! at-least-once.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::CommandSpec;

/// Classified executor failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// Payload rejected; retrying cannot help.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transient transport failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The remote call did not finish in time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Remote state diverged; needs manual resolution.
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl ExecutorError {
    /// Whether the action should be retried on a later drain.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    /// Classify a process exit code using the sysexits conventions.
    #[must_use]
    pub fn from_exit_code(code: Option<i32>, stderr: &str) -> Self {
        let detail = stderr.trim();
        let message = |fallback: String| {
            if detail.is_empty() {
                fallback
            } else {
                detail.to_string()
            }
        };
        match code {
            Some(65) => Self::Validation(message("payload rejected".to_string())),
            Some(76) => Self::Conflict(message("remote state conflict".to_string())),
            Some(code) => Self::Network(message(format!("exited with status {code}"))),
            None => Self::Network(message("terminated by signal".to_string())),
        }
    }
}

/// Performs the real remote effect for one action type.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Execute the action described by `payload`.
    ///
    /// # Errors
    ///
    /// Returns a classified [`ExecutorError`] on failure.
    async fn execute(&self, payload: &serde_json::Value) -> Result<(), ExecutorError>;
}

/// Adapts an async closure into an [`ActionExecutor`].
pub struct FnExecutor<F>(F);

impl<F> FnExecutor<F> {
    /// Wrap `f`.
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), ExecutorError>> + Send,
    {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> ActionExecutor for FnExecutor<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ExecutorError>> + Send,
{
    async fn execute(&self, payload: &serde_json::Value) -> Result<(), ExecutorError> {
        (self.0)(payload.clone()).await
    }
}

/// Runs an external program with the payload as JSON on stdin.
///
/// Exit status 0 is success, 65 a validation error, 76 a conflict; any other
/// failure is treated as a network error and retried.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandExecutor {
    /// Create an executor for `program` with a 30 second timeout.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Build from a configured command.
    #[must_use]
    pub fn from_spec(spec: &CommandSpec) -> Self {
        Self {
            program: spec.command.clone(),
            args: spec.args.clone(),
            timeout: Duration::from_secs(spec.timeout_secs),
        }
    }

    /// Append arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Override the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, input: Vec<u8>) -> Result<(), ExecutorError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutorError::Network(format!("Failed to run {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A program that ignores its input may close stdin early
            let _ = stdin.write_all(&input).await;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecutorError::Network(format!("Failed to wait for {}: {e}", self.program)))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(ExecutorError::from_exit_code(output.status.code(), &stderr))
    }
}

#[async_trait]
impl ActionExecutor for CommandExecutor {
    async fn execute(&self, payload: &serde_json::Value) -> Result<(), ExecutorError> {
        let input = serde_json::to_vec(payload)
            .map_err(|e| ExecutorError::Validation(format!("Unserializable payload: {e}")))?;

        match tokio::time::timeout(self.timeout, self.run(input)).await {
            Ok(result) => result,
            Err(_) => Err(ExecutorError::Timeout(format!(
                "{} did not finish within {}s",
                self.program,
                self.timeout.as_secs()
            ))),
        }
    }
}

#[derive(Clone)]
struct Registration {
    executor: Arc<dyn ActionExecutor>,
    parallel: bool,
}

/// Executors keyed by action type.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Registration>,
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("types", &self.types())
            .finish()
    }
}

impl ExecutorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry of [`CommandExecutor`]s from configuration.
    #[must_use]
    pub fn from_commands(commands: &BTreeMap<String, CommandSpec>) -> Self {
        let mut registry = Self::new();
        for (action_type, spec) in commands {
            registry.insert(
                action_type,
                Arc::new(CommandExecutor::from_spec(spec)),
                spec.parallel,
            );
        }
        registry
    }

    fn insert(&mut self, action_type: &str, executor: Arc<dyn ActionExecutor>, parallel: bool) {
        self.executors
            .insert(action_type.to_string(), Registration { executor, parallel });
    }

    /// Register the executor for `action_type`; actions of this type are
    /// dispatched one at a time.
    pub fn register<E>(&mut self, action_type: &str, executor: E) -> &mut Self
    where
        E: ActionExecutor + 'static,
    {
        self.insert(action_type, Arc::new(executor), false);
        self
    }

    /// Register an executor whose actions may run concurrently with
    /// neighbouring actions of parallel-safe types.
    pub fn register_parallel<E>(&mut self, action_type: &str, executor: E) -> &mut Self
    where
        E: ActionExecutor + 'static,
    {
        self.insert(action_type, Arc::new(executor), true);
        self
    }

    /// The executor for `action_type`, if any.
    #[must_use]
    pub fn get(&self, action_type: &str) -> Option<Arc<dyn ActionExecutor>> {
        self.executors
            .get(action_type)
            .map(|r| Arc::clone(&r.executor))
    }

    /// Whether `action_type` is registered as parallel-safe.
    #[must_use]
    pub fn is_parallel(&self, action_type: &str) -> bool {
        self.executors.get(action_type).is_some_and(|r| r.parallel)
    }

    /// Registered action types, sorted.
    #[must_use]
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}
