//! Sync lifecycle events, persisted for observability.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of sync lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventKind {
    SyncStarted,
    EmailsFetched,
    EmailParsed,
    SyncCompleted,
    SyncFailed,
}

impl SyncEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyncStarted => "sync_started",
            Self::EmailsFetched => "emails_fetched",
            Self::EmailParsed => "email_parsed",
            Self::SyncCompleted => "sync_completed",
            Self::SyncFailed => "sync_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sync_started" => Some(Self::SyncStarted),
            "emails_fetched" => Some(Self::EmailsFetched),
            "email_parsed" => Some(Self::EmailParsed),
            "sync_completed" => Some(Self::SyncCompleted),
            "sync_failed" => Some(Self::SyncFailed),
            _ => None,
        }
    }
}

/// One event of a sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub sync_id: String,
    pub owner: String,
    pub mailbox_id: Option<String>,
    pub kind: SyncEventKind,
    /// Counters and error details.
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl SyncEvent {
    pub fn new(
        sync_id: &str,
        owner: &str,
        mailbox_id: Option<&str>,
        kind: SyncEventKind,
        data: serde_json::Value,
    ) -> Self {
        Self {
            sync_id: sync_id.to_string(),
            owner: owner.to_string(),
            mailbox_id: mailbox_id.map(str::to_string),
            kind,
            data,
            created_at: Utc::now(),
        }
    }
}

/// Unique id for one sync run.
pub fn new_sync_id() -> String {
    format!("sync_{}", uuid::Uuid::new_v4().simple())
}
