//! In-memory `ParcelStore` for tests and one-shot CLI runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::email::{MessageStatus, RawMessage};
use crate::error::DatabaseError;
use crate::parcel::{Parcel, ParcelPatch};
use crate::store::traits::{ParcelStore, UnparsedEmail, UnparsedStatus};
use crate::sync::events::SyncEvent;
use crate::sync::mailbox::{Mailbox, MailboxStatus};

#[derive(Default)]
struct Inner {
    parcels: HashMap<Uuid, Parcel>,
    raw_messages: HashMap<(String, String), RawMessage>,
    unparsed: HashMap<(String, String), UnparsedEmail>,
    mailboxes: HashMap<String, Mailbox>,
    events: Vec<SyncEvent>,
}

/// Store backed by maps behind one async mutex.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(entity: &str, id: impl ToString) -> DatabaseError {
    DatabaseError::NotFound {
        entity: entity.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl ParcelStore for MemoryStore {
    async fn find_parcel_by_tracking(
        &self,
        owner: &str,
        tracking_number: &str,
    ) -> Result<Option<Parcel>, DatabaseError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .parcels
            .values()
            .find(|p| p.owner == owner && p.tracking_number == tracking_number)
            .cloned())
    }

    async fn create_parcel(&self, parcel: &Parcel) -> Result<(), DatabaseError> {
        let mut inner = self.inner.lock().await;
        let duplicate = inner.parcels.values().any(|p| {
            p.id == parcel.id
                || (p.owner == parcel.owner && p.tracking_number == parcel.tracking_number)
        });
        if duplicate {
            return Err(DatabaseError::Constraint(format!(
                "parcel {} already exists for {}",
                parcel.tracking_number, parcel.owner
            )));
        }
        inner.parcels.insert(parcel.id, parcel.clone());
        Ok(())
    }

    async fn update_parcel(&self, id: Uuid, patch: &ParcelPatch) -> Result<Parcel, DatabaseError> {
        let mut inner = self.inner.lock().await;
        let parcel = inner
            .parcels
            .get_mut(&id)
            .ok_or_else(|| not_found("parcel", id))?;
        parcel.apply(patch);
        Ok(parcel.clone())
    }

    async fn get_parcel(&self, id: Uuid) -> Result<Option<Parcel>, DatabaseError> {
        Ok(self.inner.lock().await.parcels.get(&id).cloned())
    }

    async fn list_parcels(&self, owner: &str) -> Result<Vec<Parcel>, DatabaseError> {
        let inner = self.inner.lock().await;
        let mut parcels: Vec<Parcel> = inner
            .parcels
            .values()
            .filter(|p| p.owner == owner)
            .cloned()
            .collect();
        parcels.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(parcels)
    }

    async fn set_reported(&self, id: Uuid, reported: bool) -> Result<(), DatabaseError> {
        let mut inner = self.inner.lock().await;
        let parcel = inner
            .parcels
            .get_mut(&id)
            .ok_or_else(|| not_found("parcel", id))?;
        parcel.reported = reported;
        parcel.updated_at = Utc::now();
        Ok(())
    }

    async fn find_or_create_raw_message(
        &self,
        message: &RawMessage,
    ) -> Result<(RawMessage, bool), DatabaseError> {
        let mut inner = self.inner.lock().await;
        let key = (message.owner.clone(), message.message_id.clone());
        if let Some(existing) = inner.raw_messages.get(&key) {
            return Ok((existing.clone(), false));
        }
        inner.raw_messages.insert(key, message.clone());
        Ok((message.clone(), true))
    }

    async fn set_message_status(&self, id: &str, status: MessageStatus) -> Result<(), DatabaseError> {
        let mut inner = self.inner.lock().await;
        let message = inner
            .raw_messages
            .values_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| not_found("raw_message", id))?;
        message.status = status;
        Ok(())
    }

    async fn record_unparsed(&self, entry: &UnparsedEmail) -> Result<(), DatabaseError> {
        let mut inner = self.inner.lock().await;
        inner
            .unparsed
            .entry((entry.owner.clone(), entry.message_id.clone()))
            .or_insert_with(|| entry.clone());
        Ok(())
    }

    async fn pending_unparsed(
        &self,
        owner: &str,
        limit: usize,
    ) -> Result<Vec<UnparsedEmail>, DatabaseError> {
        let inner = self.inner.lock().await;
        let mut pending: Vec<UnparsedEmail> = inner
            .unparsed
            .values()
            .filter(|u| u.owner == owner && u.status == UnparsedStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn set_unparsed_status(
        &self,
        owner: &str,
        message_id: &str,
        status: UnparsedStatus,
    ) -> Result<(), DatabaseError> {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner
            .unparsed
            .get_mut(&(owner.to_string(), message_id.to_string()))
        {
            entry.status = status;
        }
        Ok(())
    }

    async fn upsert_mailbox(&self, mailbox: &Mailbox) -> Result<(), DatabaseError> {
        self.inner
            .lock()
            .await
            .mailboxes
            .insert(mailbox.id.clone(), mailbox.clone());
        Ok(())
    }

    async fn list_mailboxes(&self, owner: &str) -> Result<Vec<Mailbox>, DatabaseError> {
        let inner = self.inner.lock().await;
        let mut mailboxes: Vec<Mailbox> = inner
            .mailboxes
            .values()
            .filter(|m| m.owner == owner)
            .cloned()
            .collect();
        mailboxes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(mailboxes)
    }

    async fn get_mailbox(&self, id: &str) -> Result<Option<Mailbox>, DatabaseError> {
        Ok(self.inner.lock().await.mailboxes.get(id).cloned())
    }

    async fn set_mailbox_status(&self, id: &str, status: MailboxStatus) -> Result<(), DatabaseError> {
        let mut inner = self.inner.lock().await;
        let mailbox = inner
            .mailboxes
            .get_mut(id)
            .ok_or_else(|| not_found("mailbox", id))?;
        mailbox.status = status;
        Ok(())
    }

    async fn mark_initial_sync_completed(&self, id: &str) -> Result<(), DatabaseError> {
        let mut inner = self.inner.lock().await;
        let mailbox = inner
            .mailboxes
            .get_mut(id)
            .ok_or_else(|| not_found("mailbox", id))?;
        mailbox.initial_sync_completed = true;
        Ok(())
    }

    async fn record_sync_event(&self, event: &SyncEvent) -> Result<(), DatabaseError> {
        self.inner.lock().await.events.push(event.clone());
        Ok(())
    }

    async fn list_sync_events(&self, sync_id: &str) -> Result<Vec<SyncEvent>, DatabaseError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .events
            .iter()
            .filter(|e| e.sync_id == sync_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::{MailProvider, NormalizedEmail};

    #[tokio::test]
    async fn raw_messages_dedup_per_owner() {
        let store = MemoryStore::new();
        let email = NormalizedEmail::new("m-1", "s", "a@b.c", "body", Utc::now());

        let (first, created) = store
            .find_or_create_raw_message(&RawMessage::new("u1", MailProvider::File, &email))
            .await
            .unwrap();
        assert!(created);

        let (again, created) = store
            .find_or_create_raw_message(&RawMessage::new("u1", MailProvider::File, &email))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(again.id, first.id);

        let (_, created) = store
            .find_or_create_raw_message(&RawMessage::new("u2", MailProvider::File, &email))
            .await
            .unwrap();
        assert!(created);
    }

    #[tokio::test]
    async fn update_missing_parcel_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_parcel(Uuid::new_v4(), &ParcelPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }
}
