//! Parcel data model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::carriers::Carrier;
use crate::classify::{Direction, EmailType};
use crate::extract::Price;

/// Visible lifecycle status of a parcel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParcelStatus {
    Pending,
    InTransit,
    OutForDelivery,
    Delivered,
    Returned,
}

impl ParcelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InTransit => "in_transit",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Returned => "returned",
        }
    }

    /// Parse a stored value; unknown values are `Pending`.
    pub fn parse(s: &str) -> Self {
        match s {
            "in_transit" => Self::InTransit,
            "out_for_delivery" => Self::OutForDelivery,
            "delivered" => Self::Delivered,
            "returned" => Self::Returned,
            _ => Self::Pending,
        }
    }

    /// Position in the forward lifecycle. `Returned` sits outside it.
    pub fn order(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::InTransit => Some(1),
            Self::OutForDelivery => Some(2),
            Self::Delivered => Some(3),
            Self::Returned => None,
        }
    }
}

impl std::fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation of a parcel's status, accepted or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    /// The status the message pointed to.
    pub status: ParcelStatus,
    pub at: DateTime<Utc>,
    pub email_type: EmailType,
    pub source_message_id: String,
    /// Whether the visible status moved to `status`.
    pub accepted: bool,
}

/// A durable parcel, unique per (owner, tracking number).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parcel {
    pub id: Uuid,
    pub owner: String,
    pub tracking_number: String,
    pub carrier: Carrier,
    pub direction: Direction,
    pub status: ParcelStatus,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketplace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_deadline: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickup_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_url: Option<String>,
    /// Message that created the parcel.
    pub source_message_id: String,
    /// Append-only audit trail.
    pub history: Vec<StatusHistoryEntry>,
    /// Set by the user, never by merges.
    pub reported: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update applied by the store.
///
/// Metadata fields are only written where the stored value is null, so a
/// patch can never overwrite populated data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParcelPatch {
    /// New visible status, when the transition was accepted.
    pub status: Option<ParcelStatus>,
    /// Replaces `Other` only.
    pub carrier: Option<Carrier>,
    pub history: Vec<StatusHistoryEntry>,
    pub marketplace: Option<String>,
    pub product_name: Option<String>,
    pub product_description: Option<String>,
    pub recipient_name: Option<String>,
    pub sender_name: Option<String>,
    pub pickup_address: Option<String>,
    pub pickup_deadline: Option<NaiveDate>,
    pub order_number: Option<String>,
    pub price: Option<Price>,
    pub pickup_code: Option<String>,
    pub qr_code: Option<String>,
    pub label_url: Option<String>,
}

fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(value);
    }
}

impl Parcel {
    /// Apply a patch in memory with the same semantics the stores use.
    pub fn apply(&mut self, patch: &ParcelPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if self.carrier.is_other() {
            if let Some(carrier) = patch.carrier {
                self.carrier = carrier;
            }
        }
        self.history.extend(patch.history.iter().cloned());
        fill(&mut self.marketplace, &patch.marketplace);
        fill(&mut self.product_name, &patch.product_name);
        fill(&mut self.product_description, &patch.product_description);
        fill(&mut self.recipient_name, &patch.recipient_name);
        fill(&mut self.sender_name, &patch.sender_name);
        fill(&mut self.pickup_address, &patch.pickup_address);
        fill(&mut self.pickup_deadline, &patch.pickup_deadline);
        fill(&mut self.order_number, &patch.order_number);
        fill(&mut self.price, &patch.price);
        fill(&mut self.pickup_code, &patch.pickup_code);
        fill(&mut self.qr_code, &patch.qr_code);
        fill(&mut self.label_url, &patch.label_url);
        self.updated_at = Utc::now();
    }
}
