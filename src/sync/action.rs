//! Queued action types.
//!
//! Defines the durable record for one mutating operation and the total order
//! the queue dispatches in.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Dispatch priority of a queued action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Dispatched before everything else
    High,
    /// Default priority
    #[default]
    Medium,
    /// Dispatched last
    Low,
}

impl Priority {
    /// Sort rank; lower dispatches first.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Priority {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" | "h" => Ok(Self::High),
            "medium" | "med" | "m" => Ok(Self::Medium),
            "low" | "l" => Ok(Self::Low),
            other => Err(SyncError::InvalidInput(format!("Unknown priority: {other}"))),
        }
    }
}

/// Lifecycle state of a queued action.
///
/// `Pending -> Syncing -> {removed | Pending | Failed}`. `Failed` is left
/// only through a manual retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Waiting for a drain
    Pending,
    /// Claimed by the running drain
    Syncing,
    /// Permanently failed or out of retries
    Failed,
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ActionStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "syncing" | "in_progress" => Ok(Self::Syncing),
            "failed" => Ok(Self::Failed),
            other => Err(SyncError::InvalidInput(format!("Unknown status: {other}"))),
        }
    }
}

/// Unique action id: a store-wide sequence number plus the creation time.
///
/// Renders as `"{seq:016}-{millis}"`. Ids compare by sequence, so ties in
/// `created_at` still break deterministically under clock skew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActionId {
    seq: u64,
    millis: i64,
}

impl ActionId {
    /// Build an id from its parts.
    #[must_use]
    pub const fn new(seq: u64, millis: i64) -> Self {
        Self { seq, millis }
    }

    /// Store-wide sequence number.
    #[must_use]
    pub const fn seq(self) -> u64 {
        self.seq
    }
}

impl Ord for ActionId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.seq
            .cmp(&other.seq)
            .then_with(|| self.millis.cmp(&other.millis))
    }
}

impl PartialOrd for ActionId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016}-{}", self.seq, self.millis)
    }
}

impl FromStr for ActionId {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SyncError::InvalidInput(format!("Invalid action id: {s}"));
        let (seq, millis) = s.split_once('-').ok_or_else(invalid)?;
        Ok(Self {
            seq: seq.parse().map_err(|_| invalid())?,
            millis: millis.parse().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for ActionId {
    type Error = SyncError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ActionId> for String {
    fn from(id: ActionId) -> Self {
        id.to_string()
    }
}

/// A durably queued mutating operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    /// Unique ID
    pub id: ActionId,
    /// Selects the executor
    pub action_type: String,
    /// Caller-owned payload
    pub payload: serde_json::Value,
    /// Dispatch priority
    pub priority: Priority,
    /// When the action was queued
    pub created_at: DateTime<Utc>,
    /// Number of failed dispatch attempts
    pub attempts: u32,
    /// Current status
    pub status: ActionStatus,
    /// Last error message
    pub last_error: Option<String>,
    /// Last dispatch timestamp
    #[serde(default)]
    pub last_attempt: Option<DateTime<Utc>>,
    /// Earliest time a retry may be dispatched
    #[serde(default)]
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl PendingAction {
    /// Create a new pending action.
    #[must_use]
    pub fn new(
        id: ActionId,
        action_type: impl Into<String>,
        payload: serde_json::Value,
        priority: Priority,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            action_type: action_type.into(),
            payload,
            priority,
            created_at,
            attempts: 0,
            status: ActionStatus::Pending,
            last_error: None,
            last_attempt: None,
            next_attempt_at: None,
        }
    }

    /// Compare by dispatch order: priority, then `created_at`, then id.
    #[must_use]
    pub fn dispatch_order(&self, other: &Self) -> Ordering {
        self.priority
            .rank()
            .cmp(&other.priority.rank())
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.id.cmp(&other.id))
    }

    /// Secondary store index encoding [`PendingAction::dispatch_order`].
    #[must_use]
    pub fn index(&self) -> String {
        let micros = self.created_at.timestamp_micros().max(0);
        format!("{}:{:020}:{:020}", self.priority.rank(), micros, self.id.seq())
    }

    /// Whether a drain at `now` may dispatch this action.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ActionStatus::Pending && self.next_attempt_at.map_or(true, |at| at <= now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn action(seq: u64, priority: Priority, created_at: DateTime<Utc>) -> PendingAction {
        PendingAction::new(
            ActionId::new(seq, created_at.timestamp_millis()),
            "create-order",
            serde_json::json!({"seq": seq}),
            priority,
            created_at,
        )
    }

    #[test]
    fn test_priority_rank() {
        assert!(Priority::High.rank() < Priority::Medium.rank());
        assert!(Priority::Medium.rank() < Priority::Low.rank());
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("m".parse::<Priority>().unwrap(), Priority::Medium);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_status_parse_and_display() {
        for status in [ActionStatus::Pending, ActionStatus::Syncing, ActionStatus::Failed] {
            assert_eq!(status.to_string().parse::<ActionStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_action_id_text_form() {
        let id = ActionId::new(42, 1_700_000_000_000);
        assert_eq!(id.to_string(), "0000000000000042-1700000000000");
        assert_eq!(id.to_string().parse::<ActionId>().unwrap(), id);
        assert!("garbage".parse::<ActionId>().is_err());
    }

    #[test]
    fn test_action_id_orders_by_sequence() {
        // Later sequence wins even if the wall clock went backwards
        let first = ActionId::new(1, 2_000);
        let second = ActionId::new(2, 1_000);
        assert!(first < second);
    }

    #[test]
    fn test_dispatch_order() {
        let now = Utc::now();
        let low = action(1, Priority::Low, now);
        let high = action(2, Priority::High, now + Duration::seconds(1));
        let medium_early = action(3, Priority::Medium, now);
        let medium_tie = action(4, Priority::Medium, now);

        let mut actions = vec![low.clone(), medium_tie.clone(), high.clone(), medium_early.clone()];
        actions.sort_by(PendingAction::dispatch_order);

        let ids: Vec<_> = actions.iter().map(|a| a.id.seq()).collect();
        assert_eq!(ids, vec![2, 3, 4, 1]);
    }

    #[test]
    fn test_index_matches_dispatch_order() {
        let now = Utc::now();
        let mut actions = vec![
            action(1, Priority::Low, now),
            action(2, Priority::High, now + Duration::seconds(5)),
            action(3, Priority::Medium, now),
            action(4, Priority::Medium, now),
        ];
        let mut by_index = actions.clone();
        by_index.sort_by_key(PendingAction::index);
        actions.sort_by(PendingAction::dispatch_order);

        assert_eq!(by_index, actions);
    }

    #[test]
    fn test_is_due_honours_backoff() {
        let now = Utc::now();
        let mut a = action(1, Priority::Medium, now);
        assert!(a.is_due(now));

        a.next_attempt_at = Some(now + Duration::seconds(30));
        assert!(!a.is_due(now));
        assert!(a.is_due(now + Duration::seconds(30)));

        a.status = ActionStatus::Failed;
        assert!(!a.is_due(now + Duration::days(1)));
    }

    #[test]
    fn test_serialized_shape() {
        let a = action(7, Priority::High, Utc::now());
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["priority"], "high");
        assert!(json["id"].as_str().unwrap().starts_with("0000000000000007-"));

        let back: PendingAction = serde_json::from_value(json).unwrap();
        assert_eq!(back, a);
    }
}
