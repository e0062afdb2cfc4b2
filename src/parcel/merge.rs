//! Parcel merge engine: `upsert_parcel(owner, result, source message)`.
//!
//! The read-modify-write on a parcel runs under a per-(owner, tracking)
//! async lock, so two messages for the same tracking number never lose
//! each other's updates.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::model::{Parcel, ParcelPatch, StatusHistoryEntry};
use super::state::{accepts_transition, resolve_status};
use crate::error::{DatabaseError, PipelineError};
use crate::pipeline::ExtractionResult;
use crate::store::ParcelStore;

type Key = (String, String);

/// Never held across an await.
type KeyLocks = std::sync::Mutex<HashMap<Key, Arc<Mutex<()>>>>;

/// A claim on one key's lock. Dropping it, including when the owning future
/// is cancelled, removes the map entry once nobody else holds or waits on it.
struct KeyClaim<'a> {
    locks: &'a KeyLocks,
    key: Key,
    lock: Arc<Mutex<()>>,
}

impl Drop for KeyClaim<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one held here.
        if Arc::strong_count(&self.lock) <= 2 {
            locks.remove(&self.key);
        }
    }
}

/// Human-readable parcel title.
///
/// Product name, then "Parcel from {sender}", then "{Direction} via
/// {marketplace}", then "{CARRIER} – {first 10 chars of tracking}".
pub fn synthesize_title(result: &ExtractionResult) -> String {
    if let Some(product) = &result.product_name {
        return product.clone();
    }
    if let Some(sender) = &result.sender_name {
        return format!("Parcel from {sender}");
    }
    if let Some(marketplace) = &result.marketplace {
        let direction = match result.direction {
            crate::classify::Direction::Sale => "Sale",
            crate::classify::Direction::Purchase => "Purchase",
        };
        return format!("{direction} via {}", capitalize(marketplace));
    }
    let prefix: String = result
        .tracking_number
        .as_deref()
        .unwrap_or("unknown")
        .chars()
        .take(10)
        .collect();
    format!("{} – {prefix}", result.carrier.as_str().to_uppercase())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Upserts parcels from extraction results.
pub struct MergeEngine {
    store: Arc<dyn ParcelStore>,
    locks: KeyLocks,
}

impl MergeEngine {
    pub fn new(store: Arc<dyn ParcelStore>) -> Self {
        Self {
            store,
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ParcelStore> {
        &self.store
    }

    fn claim_key(&self, key: Key) -> KeyClaim<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = locks.entry(key.clone()).or_default().clone();
        KeyClaim {
            locks: &self.locks,
            key,
            lock,
        }
    }

    /// Create or update the parcel for (owner, tracking number).
    pub async fn upsert_parcel(
        &self,
        owner: &str,
        result: &ExtractionResult,
        source_message_id: &str,
    ) -> Result<Parcel, PipelineError> {
        let tracking = result.tracking_number.as_deref().ok_or_else(|| {
            PipelineError::MalformedInput(format!(
                "message {source_message_id} has no tracking number"
            ))
        })?;

        let claim = self.claim_key((owner.to_string(), tracking.to_string()));
        let _guard = claim.lock.lock().await;
        Ok(self
            .upsert_locked(owner, tracking, result, source_message_id)
            .await?)
    }

    async fn upsert_locked(
        &self,
        owner: &str,
        tracking: &str,
        result: &ExtractionResult,
        source_message_id: &str,
    ) -> Result<Parcel, DatabaseError> {
        let incoming = resolve_status(result);
        let now = Utc::now();

        let Some(existing) = self.store.find_parcel_by_tracking(owner, tracking).await? else {
            let parcel = Parcel {
                id: Uuid::new_v4(),
                owner: owner.to_string(),
                tracking_number: tracking.to_string(),
                carrier: result.carrier,
                direction: result.direction,
                status: incoming,
                title: synthesize_title(result),
                marketplace: result.marketplace.clone(),
                product_name: result.product_name.clone(),
                product_description: result.product_description.clone(),
                recipient_name: result.recipient_name.clone(),
                sender_name: result.sender_name.clone(),
                pickup_address: result.pickup_address.clone(),
                pickup_deadline: result.pickup_deadline,
                order_number: result.order_number.clone(),
                price: result.price.clone(),
                pickup_code: result.pickup_code.clone(),
                qr_code: result.qr_code.clone(),
                label_url: result.label_url.clone(),
                source_message_id: source_message_id.to_string(),
                history: vec![StatusHistoryEntry {
                    status: incoming,
                    at: now,
                    email_type: result.email_type,
                    source_message_id: source_message_id.to_string(),
                    accepted: true,
                }],
                reported: false,
                created_at: now,
                updated_at: now,
            };
            self.store.create_parcel(&parcel).await?;
            info!(
                owner,
                tracking,
                carrier = %parcel.carrier,
                status = %parcel.status,
                title = %parcel.title,
                "Parcel created"
            );
            return Ok(parcel);
        };

        let accepted = accepts_transition(existing.status, incoming);
        if accepted {
            info!(tracking, from = %existing.status, to = %incoming, "Status advanced");
        } else {
            debug!(tracking, current = %existing.status, attempted = %incoming, "Status transition rejected");
        }

        let patch = build_patch(&existing, result, incoming, accepted, source_message_id);
        self.store.update_parcel(existing.id, &patch).await
    }
}

/// Only blank parcel fields receive values; everything else stays `None`.
fn build_patch(
    existing: &Parcel,
    result: &ExtractionResult,
    incoming: super::model::ParcelStatus,
    accepted: bool,
    source_message_id: &str,
) -> ParcelPatch {
    fn blank<T: Clone>(current: &Option<T>, new: &Option<T>) -> Option<T> {
        if current.is_none() { new.clone() } else { None }
    }

    ParcelPatch {
        status: accepted.then_some(incoming),
        carrier: (existing.carrier.is_other() && !result.carrier.is_other())
            .then_some(result.carrier),
        history: vec![StatusHistoryEntry {
            status: incoming,
            at: Utc::now(),
            email_type: result.email_type,
            source_message_id: source_message_id.to_string(),
            accepted,
        }],
        marketplace: blank(&existing.marketplace, &result.marketplace),
        product_name: blank(&existing.product_name, &result.product_name),
        product_description: blank(&existing.product_description, &result.product_description),
        recipient_name: blank(&existing.recipient_name, &result.recipient_name),
        sender_name: blank(&existing.sender_name, &result.sender_name),
        pickup_address: blank(&existing.pickup_address, &result.pickup_address),
        pickup_deadline: blank(&existing.pickup_deadline, &result.pickup_deadline),
        order_number: blank(&existing.order_number, &result.order_number),
        price: blank(&existing.price, &result.price),
        pickup_code: blank(&existing.pickup_code, &result.pickup_code),
        qr_code: blank(&existing.qr_code, &result.qr_code),
        label_url: blank(&existing.label_url, &result.label_url),
    }
}
