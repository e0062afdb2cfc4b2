//! Rule-based email parser: `parseEmail(NormalizedEmail) → ExtractionResult`.
//!
//! Pure and stateless. Parsing the same message twice gives the same
//! result, and parsers can be shared across tasks freely.

use tracing::debug;

use super::hybrid::completeness_score;
use super::types::{ExtractionResult, ExtractionSource};
use crate::carriers::{CarrierExtractor, classify_carrier};
use crate::classify::{classify_direction, classify_email};
use crate::email::types::{NormalizedEmail, PreparedEmail};
use crate::extract::{detect_language, extract_price};

/// The deterministic extraction pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmailParser {
    extractor: CarrierExtractor,
}

impl EmailParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every rule-based stage over one message.
    pub fn parse_email(&self, email: &NormalizedEmail) -> ExtractionResult {
        let prepared = PreparedEmail::new(email);

        let carrier = classify_carrier(&email.sender, &email.subject, &prepared.text);
        let fields = self.extractor.extract(&prepared, carrier);
        let direction = classify_direction(&email.sender, &email.subject, &prepared.text);
        let classification = classify_email(&email.sender, &email.subject, &prepared.text);

        let mut result = ExtractionResult {
            message_id: email.message_id.clone(),
            tracking_number: fields.tracking_number,
            tracking_confidence: fields.tracking_confidence,
            carrier: fields.carrier.unwrap_or(carrier),
            direction: direction.direction,
            direction_confidence: direction.confidence,
            email_type: classification.email_type,
            classification_confidence: classification.confidence,
            source_type: classification.source_type,
            source_name: classification.source_name,
            marketplace: fields.marketplace,
            product_name: fields.product_name,
            product_description: fields.product_description,
            recipient_name: fields.recipient_name,
            sender_name: fields.sender_name.or_else(|| email.sender_display_name()),
            pickup_address: fields.pickup_address,
            pickup_deadline: fields.pickup_deadline,
            order_number: fields.order_number,
            price: extract_price(&prepared.text),
            pickup_code: fields.pickup_code,
            qr_code: fields.qr_code,
            label_url: fields.label_url,
            language: detect_language(&prepared.text).to_string(),
            completeness: 0,
            source: ExtractionSource::Rules,
        };
        result.completeness = completeness_score(&result);

        debug!(
            message_id = %email.message_id,
            carrier = %result.carrier,
            tracking = result.tracking_number.as_deref().unwrap_or("-"),
            email_type = %result.email_type,
            score = result.completeness,
            "Email parsed"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::carriers::Carrier;
    use crate::classify::{Direction, EmailType, SourceType};

    fn make_email(sender: &str, subject: &str, body: &str) -> NormalizedEmail {
        let received = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        NormalizedEmail::new("msg-42", subject, sender, body, received)
    }

    #[test]
    fn vinted_go_pickup_notification() {
        let email = make_email(
            "Vinted Go <noreply@vintedgo.com>",
            "Ton colis #12345678901234567 est arrivé",
            "<p>Bonjour Camille,</p><p>Ton colis est disponible dans ton point relais.</p>\
             <p>Pour le retirer, saisis le code suivant :<br>*522758*</p>\
             <p>À retirer avant le 14/03/2026.</p>",
        );
        let result = EmailParser::new().parse_email(&email);
        assert_eq!(result.carrier, Carrier::VintedGo);
        assert_eq!(result.tracking_number.as_deref(), Some("12345678901234567"));
        assert_eq!(result.pickup_code.as_deref(), Some("522758"));
        assert_eq!(result.email_type, EmailType::PickupReady);
        assert_eq!(result.direction, Direction::Purchase);
        assert_eq!(result.source_type, SourceType::Platform);
        assert_eq!(result.marketplace.as_deref(), Some("vinted"));
        assert_eq!(result.language, "fr");
    }

    #[test]
    fn parsing_is_idempotent() {
        let email = make_email(
            "pkginfo@ups.com",
            "UPS Update: Package Scheduled for Delivery",
            "Tracking Number: 1Z999AA10123456784\nScheduled Delivery: 12/03/2026\nTotal: $42.50",
        );
        let parser = EmailParser::new();
        let first = parser.parse_email(&email);
        let second = parser.parse_email(&email);
        assert_eq!(first, second);
        assert_eq!(first.carrier, Carrier::Ups);
        assert_eq!(first.price.as_ref().map(|p| p.amount), Some(dec!(42.50)));
    }

    #[test]
    fn no_tracking_number_is_not_an_error() {
        let email = make_email("friend@example.com", "Lunch?", "See you at noon");
        let result = EmailParser::new().parse_email(&email);
        assert!(!result.has_tracking());
        assert_eq!(result.carrier, Carrier::Other);
        assert_eq!(result.email_type, EmailType::Unknown);
    }

    #[test]
    fn display_name_is_sender_fallback() {
        let email = make_email("Boutique Soleil <shop@soleil.example>", "Commande", "Merci");
        let result = EmailParser::new().parse_email(&email);
        assert_eq!(result.sender_name.as_deref(), Some("Boutique Soleil"));
    }
}
