//! Shared types for the extraction pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::carriers::Carrier;
use crate::classify::{Direction, EmailType, SourceType};
use crate::extract::{Price, TrackingConfidence};

pub use crate::secondary::SecondaryRecord;

// ── Extraction result ───────────────────────────────────────────────

/// Which stages contributed to a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionSource {
    /// Rule-based extractors only.
    Rules,
    /// Rules merged with a secondary extractor.
    Hybrid,
    /// Filled in by batch enrichment.
    Enriched,
}

/// Everything the pipeline recovered from one message.
///
/// Computed per message and never persisted on its own. A result without a
/// tracking number creates no parcel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub message_id: String,
    pub tracking_number: Option<String>,
    pub tracking_confidence: Option<TrackingConfidence>,
    pub carrier: Carrier,
    pub direction: Direction,
    /// 0-100.
    pub direction_confidence: u8,
    pub email_type: EmailType,
    pub classification_confidence: f32,
    pub source_type: SourceType,
    pub source_name: Option<String>,
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
    /// `fr`, `en` or `es`.
    pub language: String,
    /// Weighted completeness, 0-100.
    pub completeness: u8,
    pub source: ExtractionSource,
}

impl ExtractionResult {
    /// An empty result for a message: no fields, default classification.
    pub fn empty(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            tracking_number: None,
            tracking_confidence: None,
            carrier: Carrier::Other,
            direction: Direction::Purchase,
            direction_confidence: 50,
            email_type: EmailType::Unknown,
            classification_confidence: 0.30,
            source_type: SourceType::Unknown,
            source_name: None,
            marketplace: None,
            product_name: None,
            product_description: None,
            recipient_name: None,
            sender_name: None,
            pickup_address: None,
            pickup_deadline: None,
            order_number: None,
            price: None,
            pickup_code: None,
            qr_code: None,
            label_url: None,
            language: "fr".to_string(),
            completeness: 0,
            source: ExtractionSource::Rules,
        }
    }

    pub fn has_tracking(&self) -> bool {
        self.tracking_number.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_has_defaults() {
        let r = ExtractionResult::empty("m-1");
        assert!(!r.has_tracking());
        assert_eq!(r.carrier, Carrier::Other);
        assert_eq!(r.direction, Direction::Purchase);
        assert_eq!(r.email_type, EmailType::Unknown);
        assert_eq!(r.source, ExtractionSource::Rules);
    }

    #[test]
    fn serializes_with_wire_names() {
        let mut r = ExtractionResult::empty("m-1");
        r.carrier = Carrier::VintedGo;
        r.email_type = EmailType::PickupReady;
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["carrier"], "vinted_go");
        assert_eq!(json["email_type"], "pickup_ready");
        assert_eq!(json["direction"], "purchase");
        assert_eq!(json["source"], "rules");
    }
}
