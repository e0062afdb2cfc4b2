//! Mail-fetch seam.
//!
//! Provider access (OAuth, pagination, provider quirks) lives behind
//! [`MailFetcher`]. Two fetchers ship with the crate: a directory of `.eml`
//! files and an in-memory queue for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::mailbox::Mailbox;
use crate::email::NormalizedEmail;
use crate::error::SyncError;

/// Fetches the most recent messages of a mailbox.
#[async_trait]
pub trait MailFetcher: Send + Sync {
    /// Up to `limit` messages, newest first.
    ///
    /// Expired or revoked credentials are reported as
    /// [`SyncError::NeedsReconnect`].
    async fn fetch(&self, mailbox: &Mailbox, limit: usize) -> Result<Vec<NormalizedEmail>, SyncError>;
}

fn newest_first(mut emails: Vec<NormalizedEmail>, limit: usize) -> Vec<NormalizedEmail> {
    emails.sort_by(|a, b| b.received_at.cmp(&a.received_at));
    emails.truncate(limit);
    emails
}

// ── Directory of .eml files ─────────────────────────────────────────

/// Reads every `.eml` file of one directory, whatever the mailbox.
pub struct DirectoryFetcher {
    dir: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl MailFetcher for DirectoryFetcher {
    async fn fetch(&self, mailbox: &Mailbox, limit: usize) -> Result<Vec<NormalizedEmail>, SyncError> {
        let fetch_err = |reason: String| SyncError::Fetch {
            mailbox: mailbox.id.clone(),
            reason,
        };

        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| fetch_err(format!("{}: {e}", self.dir.display())))?;

        let mut emails = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| fetch_err(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("eml") {
                continue;
            }
            let raw = match tokio::fs::read(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable message file");
                    continue;
                }
            };
            match NormalizedEmail::from_rfc822(&raw) {
                Ok(mut email) => {
                    // Generated ids change per read; key on the file name instead.
                    if email.message_id.starts_with("gen-") {
                        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                            email.message_id = format!("file:{name}");
                        }
                    }
                    emails.push(email);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping malformed message file");
                }
            }
        }

        debug!(dir = %self.dir.display(), count = emails.len(), "Read message files");
        Ok(newest_first(emails, limit))
    }
}

// ── In-memory ───────────────────────────────────────────────────────

/// Per-mailbox message lists, for tests and embedding.
#[derive(Default)]
pub struct InMemoryFetcher {
    mailboxes: Mutex<HashMap<String, Vec<NormalizedEmail>>>,
    needs_reconnect: Mutex<Vec<String>>,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message to a mailbox.
    pub async fn push(&self, mailbox_id: &str, email: NormalizedEmail) {
        self.mailboxes
            .lock()
            .await
            .entry(mailbox_id.to_string())
            .or_default()
            .push(email);
    }

    /// Make every later fetch of the mailbox fail with expired credentials.
    pub async fn expire(&self, mailbox_id: &str) {
        self.needs_reconnect.lock().await.push(mailbox_id.to_string());
    }
}

#[async_trait]
impl MailFetcher for InMemoryFetcher {
    async fn fetch(&self, mailbox: &Mailbox, limit: usize) -> Result<Vec<NormalizedEmail>, SyncError> {
        if self.needs_reconnect.lock().await.contains(&mailbox.id) {
            return Err(SyncError::NeedsReconnect {
                mailbox: mailbox.id.clone(),
            });
        }
        let emails = self
            .mailboxes
            .lock()
            .await
            .get(&mailbox.id)
            .cloned()
            .unwrap_or_default();
        Ok(newest_first(emails, limit))
    }
}
