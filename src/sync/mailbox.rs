//! Connected mailboxes.

use serde::{Deserialize, Serialize};

use crate::email::MailProvider;

/// Connection state of a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailboxStatus {
    Active,
    Expired,
    Revoked,
    NeedsReconnect,
}

impl MailboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::NeedsReconnect => "needs_reconnect",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "expired" => Self::Expired,
            "revoked" => Self::Revoked,
            "needs_reconnect" => Self::NeedsReconnect,
            _ => Self::Active,
        }
    }
}

/// A mailbox connected by an owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mailbox {
    pub id: String,
    pub owner: String,
    pub provider: MailProvider,
    pub address: String,
    pub status: MailboxStatus,
    /// Set after the first full pass; later syncs fetch less and pre-filter.
    pub initial_sync_completed: bool,
}

impl Mailbox {
    pub fn new(
        id: impl Into<String>,
        owner: impl Into<String>,
        provider: MailProvider,
        address: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            provider,
            address: address.into(),
            status: MailboxStatus::Active,
            initial_sync_completed: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == MailboxStatus::Active
    }
}
