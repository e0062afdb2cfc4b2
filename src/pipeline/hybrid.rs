//! Completeness scoring and escalation to a secondary extractor.
//!
//! The rule-based result is scored on a weighted rubric. Below the
//! threshold the secondary extractor runs on the same message under a
//! timeout; its answer is merged with deterministic fields kept from the
//! rules and free-text fields taken from the secondary. Any secondary
//! failure leaves the rule-based result as it was.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::parser::EmailParser;
use super::types::{ExtractionResult, ExtractionSource};
use crate::classify::{EmailType, is_tracking_email};
use crate::config::PipelineConfig;
use crate::email::NormalizedEmail;
use crate::error::SecondaryError;
use crate::extract::validate_tracking;
use crate::secondary::{SecondaryExtractor, SecondaryRecord};

// ── Scoring ─────────────────────────────────────────────────────────

const WEIGHT_TRACKING: u32 = 3;
const WEIGHT_CARRIER: u32 = 2;
const WEIGHT_DIRECTION: u32 = 1;
const WEIGHT_PRODUCT: u32 = 1;
const WEIGHT_ADDRESS: u32 = 2;
const WEIGHT_CODE: u32 = 1;
const MAX_SCORE: u32 =
    WEIGHT_TRACKING + WEIGHT_CARRIER + WEIGHT_DIRECTION + WEIGHT_PRODUCT + WEIGHT_ADDRESS + WEIGHT_CODE;

/// Weighted completeness of a result, 0-100.
///
/// Direction always counts: the classifier never leaves it empty.
pub fn completeness_score(result: &ExtractionResult) -> u8 {
    let mut score = WEIGHT_DIRECTION;
    if result.has_tracking() {
        score += WEIGHT_TRACKING;
    }
    if !result.carrier.is_other() {
        score += WEIGHT_CARRIER;
    }
    if result.product_name.is_some() {
        score += WEIGHT_PRODUCT;
    }
    if result.pickup_address.is_some() {
        score += WEIGHT_ADDRESS;
    }
    if result.pickup_code.is_some() || result.qr_code.is_some() {
        score += WEIGHT_CODE;
    }
    // Rounded to the nearest integer percentage.
    ((score * 100 + MAX_SCORE / 2) / MAX_SCORE) as u8
}

// ── Merge ───────────────────────────────────────────────────────────

fn keep_rule(rule: &mut Option<String>, secondary: Option<String>) {
    if rule.is_none() {
        *rule = secondary;
    }
}

fn prefer_secondary<T>(rule: &mut Option<T>, secondary: Option<T>) {
    if secondary.is_some() {
        *rule = secondary;
    }
}

/// Merge a secondary record into a rule-based result.
///
/// Deterministic fields (tracking number, codes, order number, label URL)
/// keep the rule value when present. Free-text fields (product, names,
/// address, deadline, direction, marketplace) take the secondary value when
/// it is non-null. The carrier and email type are only replaced when the
/// rules could not tell. The price is fill-if-blank.
pub fn merge_secondary(mut rule: ExtractionResult, secondary: SecondaryRecord) -> ExtractionResult {
    if rule.carrier.is_other() {
        if let Some(carrier) = secondary.carrier {
            rule.carrier = carrier;
        }
    }
    if rule.tracking_number.is_none() {
        rule.tracking_number = secondary
            .tracking_number
            .as_deref()
            .and_then(|t| validate_tracking(t, rule.carrier));
    }
    keep_rule(&mut rule.pickup_code, secondary.pickup_code);
    keep_rule(&mut rule.qr_code, secondary.qr_code);
    keep_rule(&mut rule.order_number, secondary.order_number);
    keep_rule(&mut rule.label_url, secondary.label_url);

    prefer_secondary(&mut rule.product_name, secondary.product_name);
    prefer_secondary(&mut rule.product_description, secondary.product_description);
    prefer_secondary(&mut rule.sender_name, secondary.sender_name);
    prefer_secondary(&mut rule.recipient_name, secondary.recipient_name);
    prefer_secondary(&mut rule.pickup_address, secondary.pickup_address);
    prefer_secondary(&mut rule.pickup_deadline, secondary.pickup_deadline);
    prefer_secondary(&mut rule.marketplace, secondary.marketplace);
    if let Some(direction) = secondary.direction {
        rule.direction = direction;
        rule.direction_confidence = (secondary.confidence.clamp(0.0, 1.0) * 100.0).round() as u8;
    }

    if matches!(rule.email_type, EmailType::Unknown | EmailType::Info) {
        if let Some(email_type) = secondary.email_type {
            rule.email_type = email_type;
        }
    }
    if rule.price.is_none() {
        rule.price = secondary.price;
    }

    rule.source = ExtractionSource::Hybrid;
    rule.completeness = completeness_score(&rule);
    rule
}

// ── Hybrid parser ───────────────────────────────────────────────────

/// Rule-based parser with optional escalation.
pub struct HybridParser {
    parser: EmailParser,
    secondary: Option<Arc<dyn SecondaryExtractor>>,
    config: PipelineConfig,
    timeout: Duration,
}

impl HybridParser {
    /// Rules only.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            parser: EmailParser::new(),
            secondary: None,
            config,
            timeout: Duration::from_secs(10),
        }
    }

    /// Escalate to `secondary`, bounding each call by `timeout`.
    pub fn with_secondary(mut self, secondary: Arc<dyn SecondaryExtractor>, timeout: Duration) -> Self {
        self.secondary = Some(secondary);
        self.timeout = timeout;
        self
    }

    pub fn parser(&self) -> &EmailParser {
        &self.parser
    }

    /// Whether a rule-based result should be escalated.
    pub fn needs_escalation(&self, email: &NormalizedEmail, result: &ExtractionResult) -> bool {
        if result.completeness >= self.config.escalation_threshold {
            return false;
        }
        if self.config.escalate_only_tracking_emails {
            return is_tracking_email(&email.sender, &email.subject, &email.body);
        }
        true
    }

    /// Parse one message, escalating when the result is incomplete.
    pub async fn parse(&self, email: &NormalizedEmail) -> ExtractionResult {
        let result = self.parser.parse_email(email);
        let Some(secondary) = self.secondary.as_ref() else {
            return result;
        };
        if !self.needs_escalation(email, &result) {
            return result;
        }

        info!(
            message_id = %email.message_id,
            score = result.completeness,
            extractor = secondary.name(),
            "Escalating to secondary extractor"
        );
        match self.call_secondary(secondary.as_ref(), email).await {
            Ok(record) => {
                let merged = merge_secondary(result, record);
                debug!(
                    message_id = %email.message_id,
                    score = merged.completeness,
                    "Secondary result merged"
                );
                merged
            }
            Err(e) => {
                warn!(
                    message_id = %email.message_id,
                    extractor = secondary.name(),
                    error = %e,
                    "Secondary extractor failed, keeping rule-based result"
                );
                result
            }
        }
    }

    async fn call_secondary(
        &self,
        secondary: &dyn SecondaryExtractor,
        email: &NormalizedEmail,
    ) -> Result<SecondaryRecord, SecondaryError> {
        tokio::time::timeout(
            self.timeout,
            secondary.extract(&email.subject, &email.body, &email.sender),
        )
        .await
        .map_err(|_| SecondaryError::Timeout {
            after: self.timeout,
        })?
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;
    use crate::carriers::Carrier;
    use crate::classify::Direction;
    use crate::secondary::StubSecondary;

    fn make_email(sender: &str, subject: &str, body: &str) -> NormalizedEmail {
        let received = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        NormalizedEmail::new("msg-7", subject, sender, body, received)
    }

    fn sparse_email() -> NormalizedEmail {
        make_email(
            "notifications@shop.example",
            "Votre colis est en route",
            "Bonjour, votre colis a été expédié. Suivi de livraison disponible bientôt.",
        )
    }

    #[test]
    fn score_weights() {
        let mut r = ExtractionResult::empty("m");
        assert_eq!(completeness_score(&r), 10);
        r.tracking_number = Some("XW123456789FR".into());
        r.carrier = Carrier::Chronopost;
        assert_eq!(completeness_score(&r), 60);
        r.pickup_address = Some("Relais, 1 rue Haute, 75001 Paris".into());
        assert_eq!(completeness_score(&r), 80);
        r.product_name = Some("Veste".into());
        r.qr_code = Some("QR123456".into());
        assert_eq!(completeness_score(&r), 100);
    }

    #[test]
    fn merge_keeps_deterministic_fields() {
        let mut rule = ExtractionResult::empty("m");
        rule.tracking_number = Some("XW123456789FR".into());
        rule.carrier = Carrier::Chronopost;
        rule.pickup_code = Some("4821".into());
        rule.product_name = Some("colis".into());

        let secondary = SecondaryRecord {
            tracking_number: Some("XS999999999FR".into()),
            carrier: Some(Carrier::Dhl),
            pickup_code: Some("9999".into()),
            product_name: Some("Manteau en laine".into()),
            pickup_address: Some("Tabac du Port, 12 quai Est, 29200 Brest".into()),
            pickup_deadline: NaiveDate::from_ymd_opt(2026, 3, 21),
            direction: Some(Direction::Sale),
            confidence: 0.8,
            ..Default::default()
        };
        let merged = merge_secondary(rule, secondary);
        assert_eq!(merged.tracking_number.as_deref(), Some("XW123456789FR"));
        assert_eq!(merged.carrier, Carrier::Chronopost);
        assert_eq!(merged.pickup_code.as_deref(), Some("4821"));
        assert_eq!(merged.product_name.as_deref(), Some("Manteau en laine"));
        assert_eq!(merged.pickup_deadline, NaiveDate::from_ymd_opt(2026, 3, 21));
        assert_eq!(merged.direction, Direction::Sale);
        assert_eq!(merged.direction_confidence, 80);
        assert_eq!(merged.source, ExtractionSource::Hybrid);
        assert_eq!(merged.completeness, 100);
    }

    #[test]
    fn merge_validates_secondary_tracking() {
        let mut rule = ExtractionResult::empty("m");
        rule.carrier = Carrier::Ups;
        let secondary = SecondaryRecord {
            tracking_number: Some("1Z999AA10123456780".into()),
            ..Default::default()
        };
        let merged = merge_secondary(rule, secondary);
        assert!(merged.tracking_number.is_none());
    }

    #[tokio::test]
    async fn low_score_escalates_and_merges() {
        let stub = Arc::new(StubSecondary::returning(SecondaryRecord {
            tracking_number: Some("6A12345678901".into()),
            carrier: Some(Carrier::Colissimo),
            product_name: Some("Lampe".into()),
            confidence: 0.9,
            ..Default::default()
        }));
        let parser = HybridParser::new(PipelineConfig::default())
            .with_secondary(stub.clone(), Duration::from_secs(1));

        let result = parser.parse(&sparse_email()).await;
        assert_eq!(stub.calls(), 1);
        assert_eq!(result.source, ExtractionSource::Hybrid);
        assert_eq!(result.carrier, Carrier::Colissimo);
        assert_eq!(result.tracking_number.as_deref(), Some("6A12345678901"));
        assert_eq!(result.product_name.as_deref(), Some("Lampe"));
    }

    #[tokio::test]
    async fn complete_result_is_not_escalated() {
        let stub = Arc::new(StubSecondary::returning(SecondaryRecord::default()));
        let config = PipelineConfig {
            escalation_threshold: 0,
            ..Default::default()
        };
        let parser = HybridParser::new(config).with_secondary(stub.clone(), Duration::from_secs(1));
        let result = parser.parse(&sparse_email()).await;
        assert_eq!(stub.calls(), 0);
        assert_eq!(result.source, ExtractionSource::Rules);
    }

    #[tokio::test]
    async fn secondary_failure_keeps_rule_result() {
        let stub = Arc::new(StubSecondary::failing("model offline"));
        let parser = HybridParser::new(PipelineConfig::default())
            .with_secondary(stub.clone(), Duration::from_secs(1));
        let email = sparse_email();
        let expected = parser.parser().parse_email(&email);
        let result = parser.parse(&email).await;
        assert_eq!(stub.calls(), 1);
        assert_eq!(result, expected);
    }

    #[tokio::test]
    async fn secondary_timeout_keeps_rule_result() {
        let stub = Arc::new(StubSecondary::slow(
            Duration::from_millis(500),
            SecondaryRecord {
                product_name: Some("Too late".into()),
                ..Default::default()
            },
        ));
        let parser = HybridParser::new(PipelineConfig::default())
            .with_secondary(stub, Duration::from_millis(20));
        let result = parser.parse(&sparse_email()).await;
        assert_eq!(result.source, ExtractionSource::Rules);
        assert!(result.product_name.is_none());
    }

    #[tokio::test]
    async fn non_tracking_mail_skipped_when_gated() {
        let stub = Arc::new(StubSecondary::returning(SecondaryRecord::default()));
        let config = PipelineConfig {
            escalate_only_tracking_emails: true,
            ..Default::default()
        };
        let parser = HybridParser::new(config).with_secondary(stub.clone(), Duration::from_secs(1));
        parser
            .parse(&make_email("friend@example.com", "Dinner", "See you tonight"))
            .await;
        assert_eq!(stub.calls(), 0);
    }
}
