//! `ParcelStore` trait: single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::carriers::Carrier;
use crate::email::{MessageStatus, RawMessage};
use crate::error::DatabaseError;
use crate::parcel::{Parcel, ParcelPatch};
use crate::sync::events::SyncEvent;
use crate::sync::mailbox::{Mailbox, MailboxStatus};

/// Processing state of an unparsed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnparsedStatus {
    Pending,
    Processed,
    Failed,
}

impl UnparsedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "processed" => Self::Processed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// A tracking-looking message the rules could not resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnparsedEmail {
    pub id: Uuid,
    pub owner: String,
    pub message_id: String,
    pub subject: String,
    pub sender: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
    pub carrier: Option<Carrier>,
    pub completeness: u8,
    pub is_tracking_email: bool,
    pub status: UnparsedStatus,
    pub created_at: DateTime<Utc>,
}

/// Backend-agnostic storage for parcels, raw messages, mailboxes and sync
/// events.
///
/// Parcel updates go through [`ParcelPatch`], whose metadata fields are only
/// written where the stored value is null.
#[async_trait]
pub trait ParcelStore: Send + Sync {
    // ── Parcels ─────────────────────────────────────────────────────

    /// Look up the parcel for (owner, tracking number).
    async fn find_parcel_by_tracking(
        &self,
        owner: &str,
        tracking_number: &str,
    ) -> Result<Option<Parcel>, DatabaseError>;

    /// Insert a new parcel. Fails with `Constraint` when (owner, tracking
    /// number) already exists.
    async fn create_parcel(&self, parcel: &Parcel) -> Result<(), DatabaseError>;

    /// Apply a partial update and return the stored parcel.
    async fn update_parcel(&self, id: Uuid, patch: &ParcelPatch) -> Result<Parcel, DatabaseError>;

    async fn get_parcel(&self, id: Uuid) -> Result<Option<Parcel>, DatabaseError>;

    /// All parcels of an owner, most recently updated first.
    async fn list_parcels(&self, owner: &str) -> Result<Vec<Parcel>, DatabaseError>;

    /// Set the user-report flag.
    async fn set_reported(&self, id: Uuid, reported: bool) -> Result<(), DatabaseError>;

    // ── Raw messages ────────────────────────────────────────────────

    /// Return the stored message for (owner, message id), inserting `message`
    /// when none exists. The flag is `true` when the message was inserted.
    async fn find_or_create_raw_message(
        &self,
        message: &RawMessage,
    ) -> Result<(RawMessage, bool), DatabaseError>;

    async fn set_message_status(&self, id: &str, status: MessageStatus) -> Result<(), DatabaseError>;

    // ── Unparsed messages ───────────────────────────────────────────

    async fn record_unparsed(&self, entry: &UnparsedEmail) -> Result<(), DatabaseError>;

    async fn pending_unparsed(
        &self,
        owner: &str,
        limit: usize,
    ) -> Result<Vec<UnparsedEmail>, DatabaseError>;

    async fn set_unparsed_status(
        &self,
        owner: &str,
        message_id: &str,
        status: UnparsedStatus,
    ) -> Result<(), DatabaseError>;

    // ── Mailboxes ───────────────────────────────────────────────────

    /// Insert or replace a mailbox.
    async fn upsert_mailbox(&self, mailbox: &Mailbox) -> Result<(), DatabaseError>;

    async fn list_mailboxes(&self, owner: &str) -> Result<Vec<Mailbox>, DatabaseError>;

    async fn get_mailbox(&self, id: &str) -> Result<Option<Mailbox>, DatabaseError>;

    async fn set_mailbox_status(&self, id: &str, status: MailboxStatus) -> Result<(), DatabaseError>;

    async fn mark_initial_sync_completed(&self, id: &str) -> Result<(), DatabaseError>;

    // ── Sync events ─────────────────────────────────────────────────

    async fn record_sync_event(&self, event: &SyncEvent) -> Result<(), DatabaseError>;

    /// Events of one sync run, oldest first.
    async fn list_sync_events(&self, sync_id: &str) -> Result<Vec<SyncEvent>, DatabaseError>;
}
