//! Batch enrichment of messages that still lack a tracking number.
//!
//! Messages are packed into requests bounded by item count and by total
//! serialized characters, sent to the generative backend with a strict JSON
//! output contract, and the answers are merged fill-if-blank. A batch that
//! fails (transport, timeout or unparseable output) is logged and its
//! members keep their rule-based result.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::hybrid::completeness_score;
use super::types::{ExtractionResult, ExtractionSource};
use crate::carriers::Carrier;
use crate::classify::{Direction, EmailType};
use crate::config::EnrichmentConfig;
use crate::email::NormalizedEmail;
use crate::error::PipelineError;
use crate::extract::{Price, validate_tracking};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, extract_json};
use crate::secondary::{SecondaryRecord, non_blank};

/// Carrier names the model is allowed to answer with.
const ALLOWED_CARRIERS: &[&str] = &[
    "dhl",
    "ups",
    "fedex",
    "laposte",
    "colissimo",
    "vinted_go",
    "mondial_relay",
    "relais_colis",
    "chronopost",
    "dpd",
    "colis_prive",
    "gls",
    "amazon_logistics",
    "other",
];

// ── Batching ────────────────────────────────────────────────────────

/// One email as sent to the model.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentItem {
    pub email_id: String,
    pub subject: String,
    pub from: String,
    pub body: String,
    pub received_at: Option<DateTime<Utc>>,
    /// What the rules already found, as a hint.
    pub partial: PartialHint,
}

/// Rule-based fields passed along with each item.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialHint {
    pub carrier: Option<Carrier>,
    pub marketplace: Option<String>,
    pub pickup_code: Option<String>,
    pub pickup_address: Option<String>,
}

impl EnrichmentItem {
    pub fn new(email: &NormalizedEmail, result: &ExtractionResult) -> Self {
        Self {
            email_id: email.message_id.clone(),
            subject: email.subject.clone(),
            from: email.sender.clone(),
            body: crate::email::html::to_plain_text(&email.body),
            received_at: Some(email.received_at),
            partial: PartialHint {
                carrier: (!result.carrier.is_other()).then_some(result.carrier),
                marketplace: result.marketplace.clone(),
                pickup_code: result.pickup_code.clone(),
                pickup_address: result.pickup_address.clone(),
            },
        }
    }

    fn clip_body(&mut self, max_chars: usize) {
        if let Some((idx, _)) = self.body.char_indices().nth(max_chars) {
            self.body.truncate(idx);
        }
    }

    /// Characters this item adds to the request payload, separator included.
    fn serialized_len(&self) -> usize {
        match serde_json::to_string(self) {
            Ok(json) => json.chars().count() + 1,
            Err(_) => self.subject.len() + self.from.len() + self.body.len(),
        }
    }
}

/// Split items into batches of at most `batch_size` items and, where
/// possible, at most `max_chars` serialized characters.
///
/// Bodies are clipped to `body_clip` characters first. An item larger than
/// `max_chars` on its own still gets a batch of its own.
pub fn chunk_batches(
    items: Vec<EnrichmentItem>,
    batch_size: usize,
    max_chars: usize,
    body_clip: usize,
) -> Vec<Vec<EnrichmentItem>> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::new();
    let mut current: Vec<EnrichmentItem> = Vec::new();
    let mut current_chars = 0usize;

    for mut item in items {
        item.clip_body(body_clip);
        let size = item.serialized_len();

        let overflow = current.len() >= batch_size || current_chars + size > max_chars;
        if overflow && !current.is_empty() {
            batches.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current.push(item);
        current_chars += size;
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

// ── Prompt ──────────────────────────────────────────────────────────

fn build_system_prompt() -> String {
    [
        "You are an email parsing engine. Extract shipment tracking details.",
        "Return ONLY valid JSON (no markdown).",
        "Output format: {\"results\":[{...}]}",
        "Each result must include: emailId, trackingNumber, carrier, type, qrCode, withdrawalCode, \
         articleId, marketplace, productName, productDescription, recipientName, senderName, \
         pickupAddress, pickupDeadline, orderNumber, estimatedValue, currency.",
        &format!(
            "Use null if unknown. carrier must be one of: {}.",
            ALLOWED_CARRIERS.join(", ")
        ),
        "type must be purchase or sale when possible.",
        "marketplace should be detected from email content (vinted, leboncoin, \
         vestiaire_collective, ebay, amazon, etc).",
        "pickupDeadline must be an ISO 8601 date string or null.",
        "estimatedValue must be a number (no currency symbol).",
        "pickupAddress must be the complete address: relay or shop name, street number, \
         street name, postal code, city.",
    ]
    .join("\n")
}

fn build_user_prompt(items: &[EnrichmentItem]) -> Result<String, PipelineError> {
    let payload = serde_json::to_string(items)
        .map_err(|e| PipelineError::Enrichment(format!("serialize batch: {e}")))?;
    Ok(format!("Input JSON:\n{payload}"))
}

/// Build the completion request for a batch.
pub fn build_request(
    items: &[EnrichmentItem],
    temperature: f32,
    max_tokens: u32,
) -> Result<CompletionRequest, PipelineError> {
    Ok(CompletionRequest::new(vec![
        ChatMessage::system(build_system_prompt()),
        ChatMessage::user(build_user_prompt(items)?),
    ])
    .with_temperature(temperature)
    .with_max_tokens(max_tokens))
}

// ── Response parsing ────────────────────────────────────────────────

/// One entry of the model's answer. Values stay loose: models return
/// numbers where strings are expected and vice versa.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawEntry {
    email_id: Option<Value>,
    tracking_number: Option<Value>,
    carrier: Option<Value>,
    #[serde(rename = "type")]
    direction: Option<Value>,
    email_type: Option<Value>,
    qr_code: Option<Value>,
    withdrawal_code: Option<Value>,
    article_id: Option<Value>,
    marketplace: Option<Value>,
    product_name: Option<Value>,
    product_description: Option<Value>,
    recipient_name: Option<Value>,
    sender_name: Option<Value>,
    pickup_address: Option<Value>,
    pickup_deadline: Option<Value>,
    order_number: Option<Value>,
    estimated_value: Option<Value>,
    currency: Option<Value>,
}

fn text(value: &Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => non_blank(Some(s.clone())),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn iso_date(value: &Option<Value>) -> Option<NaiveDate> {
    let raw = text(value)?;
    let date_part = raw.get(..10).unwrap_or(&raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn price(value: &Option<Value>, currency: &Option<Value>) -> Option<Price> {
    let amount = match value {
        Some(Value::Number(n)) => n.to_string().parse::<Decimal>().ok()?,
        _ => return None,
    };
    let currency = text(currency)
        .map(|c| c.to_uppercase())
        .unwrap_or_else(|| "EUR".to_string());
    Some(Price { amount, currency })
}

impl RawEntry {
    /// Convert to a record. Entries naming a carrier outside the closed set
    /// are rejected outright.
    fn into_record(self) -> Option<(String, SecondaryRecord)> {
        let email_id = text(&self.email_id)?;
        let carrier = match text(&self.carrier) {
            Some(name) => Some(Carrier::from_wire(&name)?),
            None => None,
        };
        let record = SecondaryRecord {
            tracking_number: text(&self.tracking_number),
            carrier,
            direction: text(&self.direction).and_then(|d| Direction::parse(&d)),
            email_type: text(&self.email_type)
                .map(|t| EmailType::parse(&t))
                .filter(|t| *t != EmailType::Unknown),
            marketplace: text(&self.marketplace).map(|m| m.to_lowercase()),
            product_name: text(&self.product_name),
            product_description: text(&self.product_description),
            recipient_name: text(&self.recipient_name),
            sender_name: text(&self.sender_name),
            pickup_address: text(&self.pickup_address),
            pickup_deadline: iso_date(&self.pickup_deadline),
            order_number: text(&self.order_number),
            price: price(&self.estimated_value, &self.currency),
            pickup_code: text(&self.withdrawal_code),
            qr_code: text(&self.qr_code).or_else(|| text(&self.article_id)),
            label_url: None,
            confidence: 0.7,
        };
        Some((email_id, record))
    }
}

/// Parse a model answer: either a bare JSON array or `{"results": [...]}`.
///
/// Individual entries that fail to parse, lack an `emailId`, or name an
/// unknown carrier are dropped. A response that is not JSON at all is an
/// error.
pub fn parse_enrichment_response(raw: &str) -> Result<Vec<(String, SecondaryRecord)>, PipelineError> {
    let json = extract_json(raw);
    let value: Value = serde_json::from_str(json)
        .map_err(|e| PipelineError::Enrichment(format!("JSON parse error: {e}")))?;

    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut obj) => match obj.remove("results") {
            Some(Value::Array(entries)) => entries,
            _ => {
                return Err(PipelineError::Enrichment(
                    "response has no results array".to_string(),
                ));
            }
        },
        _ => {
            return Err(PipelineError::Enrichment(
                "response is neither an array nor an object".to_string(),
            ));
        }
    };

    let total = entries.len();
    let records: Vec<_> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<RawEntry>(entry).ok())
        .filter_map(RawEntry::into_record)
        .collect();
    if records.len() < total {
        debug!(total, kept = records.len(), "Dropped invalid enrichment entries");
    }
    Ok(records)
}

// ── Merge ───────────────────────────────────────────────────────────

fn fill<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    if slot.is_none() && value.is_some() {
        *slot = value;
        true
    } else {
        false
    }
}

/// Copy every field of `record` into `result` where `result` has no value.
///
/// A returned tracking number must validate for the known carrier. Returns
/// `true` when anything changed.
pub fn fill_blank(result: &mut ExtractionResult, record: SecondaryRecord) -> bool {
    let mut changed = false;

    if result.carrier.is_other() {
        if let Some(carrier) = record.carrier.filter(|c| !c.is_other()) {
            result.carrier = carrier;
            changed = true;
        }
    }
    if result.tracking_number.is_none() {
        if let Some(candidate) = record.tracking_number.as_deref() {
            if let Some(valid) = validate_tracking(candidate, result.carrier) {
                result.tracking_number = Some(valid);
                changed = true;
            } else {
                debug!(candidate, carrier = %result.carrier, "Rejected enriched tracking number");
            }
        }
    }
    // The rule-based direction is a default when confidence is at its floor.
    if result.direction_confidence <= 50 {
        if let Some(direction) = record.direction {
            result.direction = direction;
            changed = true;
        }
    }
    if matches!(result.email_type, EmailType::Unknown | EmailType::Info) {
        if let Some(email_type) = record.email_type {
            result.email_type = email_type;
            changed = true;
        }
    }

    changed |= fill(&mut result.marketplace, record.marketplace);
    changed |= fill(&mut result.product_name, record.product_name);
    changed |= fill(&mut result.product_description, record.product_description);
    changed |= fill(&mut result.recipient_name, record.recipient_name);
    changed |= fill(&mut result.sender_name, record.sender_name);
    changed |= fill(&mut result.pickup_address, record.pickup_address);
    changed |= fill(&mut result.pickup_deadline, record.pickup_deadline);
    changed |= fill(&mut result.order_number, record.order_number);
    changed |= fill(&mut result.price, record.price);
    changed |= fill(&mut result.pickup_code, record.pickup_code);
    changed |= fill(&mut result.qr_code, record.qr_code);
    changed |= fill(&mut result.label_url, record.label_url);
    changed
}

// ── Enricher ────────────────────────────────────────────────────────

/// A message awaiting enrichment together with its rule-based result.
#[derive(Debug, Clone)]
pub struct PendingEmail {
    pub email: NormalizedEmail,
    pub result: ExtractionResult,
}

/// Counters for one enrichment run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
    pub batches: usize,
    pub failed_batches: usize,
    pub enriched: usize,
    pub tracking_found: usize,
}

/// Sends batches to a generative backend and merges the answers.
pub struct BatchEnricher {
    llm: Arc<dyn LlmProvider>,
    config: EnrichmentConfig,
}

impl BatchEnricher {
    pub fn new(llm: Arc<dyn LlmProvider>, config: EnrichmentConfig) -> Self {
        Self { llm, config }
    }

    /// Enrich every pending message that has no tracking number yet.
    ///
    /// Never fails as a whole: a failed batch is logged and skipped.
    pub async fn enrich(&self, pending: &mut [PendingEmail]) -> EnrichmentReport {
        let mut report = EnrichmentReport::default();
        if !self.config.enabled {
            debug!("Batch enrichment disabled");
            return report;
        }

        let items: Vec<EnrichmentItem> = pending
            .iter()
            .filter(|p| !p.result.has_tracking())
            .map(|p| EnrichmentItem::new(&p.email, &p.result))
            .collect();
        if items.is_empty() {
            return report;
        }

        let index: HashMap<String, usize> = pending
            .iter()
            .enumerate()
            .map(|(i, p)| (p.email.message_id.clone(), i))
            .collect();

        let batches = chunk_batches(
            items,
            self.config.batch_size,
            self.config.max_chars,
            self.config.body_clip,
        );
        info!(
            emails = index.len(),
            batches = batches.len(),
            model = self.llm.model_name(),
            "Starting batch enrichment"
        );

        for batch in &batches {
            report.batches += 1;
            let records = match self.run_batch(batch).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(size = batch.len(), error = %e, "Enrichment batch failed");
                    report.failed_batches += 1;
                    continue;
                }
            };

            for (email_id, record) in records {
                let Some(&i) = index.get(&email_id) else {
                    debug!(email_id, "Enrichment returned an unknown email id");
                    continue;
                };
                let target = &mut pending[i].result;
                let had_tracking = target.has_tracking();
                if fill_blank(target, record) {
                    target.source = ExtractionSource::Enriched;
                    target.completeness = completeness_score(target);
                    report.enriched += 1;
                    if !had_tracking && target.has_tracking() {
                        report.tracking_found += 1;
                    }
                }
            }
        }

        info!(
            batches = report.batches,
            failed = report.failed_batches,
            enriched = report.enriched,
            tracking_found = report.tracking_found,
            "Batch enrichment finished"
        );
        report
    }

    async fn run_batch(
        &self,
        batch: &[EnrichmentItem],
    ) -> Result<Vec<(String, SecondaryRecord)>, PipelineError> {
        let request = build_request(batch, self.config.temperature, self.config.max_tokens)?;
        let response = tokio::time::timeout(self.config.timeout, self.llm.complete(request))
            .await
            .map_err(|_| {
                PipelineError::Enrichment(format!("LLM call timed out after {:?}", self.config.timeout))
            })?
            .map_err(|e| PipelineError::Enrichment(format!("LLM call failed: {e}")))?;
        debug!(
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Enrichment batch answered"
        );
        parse_enrichment_response(&response.content).inspect_err(|e| {
            warn!(
                raw_response = %response.content.chars().take(500).collect::<String>(),
                error = %e,
                "Failed to parse enrichment response"
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::{CompletionResponse, FinishReason};

    fn make_item(id: &str, body_len: usize) -> EnrichmentItem {
        EnrichmentItem {
            email_id: id.to_string(),
            subject: "s".repeat(10),
            from: "f".repeat(10),
            body: "b".repeat(body_len),
            received_at: None,
            partial: PartialHint::default(),
        }
    }

    fn make_pending(id: &str, body: &str) -> PendingEmail {
        let received = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        let email = NormalizedEmail::new(id, "Votre colis", "shop@example.com", body, received);
        PendingEmail {
            result: ExtractionResult::empty(id),
            email,
        }
    }

    /// Mock LLM returning canned responses in order.
    struct MockEnrichLlm {
        responses: Mutex<Vec<Result<String, String>>>,
        calls: Mutex<usize>,
    }

    impl MockEnrichLlm {
        fn new(responses: Vec<Result<String, String>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for MockEnrichLlm {
        fn model_name(&self) -> &str {
            "mock-enrich"
        }

        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            *self.calls.lock().unwrap() += 1;
            let next = self.responses.lock().unwrap().remove(0);
            match next {
                Ok(content) => Ok(CompletionResponse {
                    content,
                    input_tokens: 100,
                    output_tokens: 50,
                    finish_reason: FinishReason::Stop,
                    response_id: None,
                }),
                Err(reason) => Err(LlmError::RequestFailed {
                    provider: "mock".into(),
                    reason,
                }),
            }
        }
    }

    #[test]
    fn batches_respect_item_count() {
        let items: Vec<_> = (0..10).map(|i| make_item(&i.to_string(), 10)).collect();
        let batches = chunk_batches(items, 8, 12_000, 8_000);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 8);
        assert_eq!(batches[1].len(), 2);
    }

    #[test]
    fn batches_respect_char_budget() {
        // Each item serializes to a little over 5000 characters.
        let items: Vec<_> = (0..3).map(|i| make_item(&i.to_string(), 5_000)).collect();
        let batches = chunk_batches(items, 8, 12_000, 8_000);
        assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn char_budget_counts_the_json_payload() {
        // 120 raw characters each, but escaped quotes and keys push every
        // item past half the budget.
        let items: Vec<_> = (0..2)
            .map(|i| {
                let mut item = make_item(&i.to_string(), 0);
                item.body = "\"".repeat(100);
                item
            })
            .collect();
        let batches = chunk_batches(items, 8, 400, 8_000);
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn oversized_item_gets_its_own_batch_and_is_clipped() {
        let items = vec![make_item("a", 20_000), make_item("b", 10)];
        let batches = chunk_batches(items, 8, 5_000, 8_000);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0][0].body.chars().count(), 8_000);
    }

    #[test]
    fn parses_results_object_and_bare_array() {
        let wrapped = r#"{"results":[{"emailId":"m1","trackingNumber":"XW123456789FR","carrier":"chronopost"}]}"#;
        let bare = r#"[{"emailId":"m1","trackingNumber":"XW123456789FR","carrier":"chronopost"}]"#;
        for raw in [wrapped, bare] {
            let parsed = parse_enrichment_response(raw).unwrap();
            assert_eq!(parsed.len(), 1);
            assert_eq!(parsed[0].0, "m1");
            assert_eq!(parsed[0].1.carrier, Some(Carrier::Chronopost));
        }
    }

    #[test]
    fn unknown_carrier_entries_are_dropped() {
        let raw = r#"```json
{"results":[
  {"emailId":"m1","carrier":"pigeon post","trackingNumber":"ABC12345678"},
  {"emailId":"m2","carrier":null,"productName":"Lampe","estimatedValue":19.9,"currency":"eur"}
]}
```"#;
        let parsed = parse_enrichment_response(raw).unwrap();
        assert_eq!(parsed.len(), 1);
        let (id, record) = &parsed[0];
        assert_eq!(id, "m2");
        assert_eq!(record.product_name.as_deref(), Some("Lampe"));
        let price = record.price.as_ref().unwrap();
        assert_eq!(price.amount, dec!(19.9));
        assert_eq!(price.currency, "EUR");
    }

    #[test]
    fn garbage_response_is_an_error() {
        assert!(parse_enrichment_response("I cannot help with that").is_err());
        assert!(parse_enrichment_response(r#"{"answer": 42}"#).is_err());
    }

    #[test]
    fn fill_blank_never_overwrites() {
        let mut result = ExtractionResult::empty("m1");
        result.pickup_address = Some("Relais A, 1 rue Haute, 75001 Paris".into());
        let record = SecondaryRecord {
            pickup_address: Some("Relais B, 2 rue Basse, 75002 Paris".into()),
            product_name: Some("Veste".into()),
            ..Default::default()
        };
        assert!(fill_blank(&mut result, record));
        assert_eq!(result.pickup_address.as_deref(), Some("Relais A, 1 rue Haute, 75001 Paris"));
        assert_eq!(result.product_name.as_deref(), Some("Veste"));
    }

    #[test]
    fn fill_blank_validates_tracking_against_carrier() {
        let mut result = ExtractionResult::empty("m1");
        result.carrier = Carrier::Ups;
        let record = SecondaryRecord {
            tracking_number: Some("1Z999AA10123456780".into()),
            ..Default::default()
        };
        assert!(!fill_blank(&mut result, record));
        assert!(result.tracking_number.is_none());
    }

    #[tokio::test]
    async fn enrich_fills_missing_tracking() {
        let llm = Arc::new(MockEnrichLlm::new(vec![Ok(
            r#"{"results":[{"emailId":"m1","trackingNumber":"6A12345678901","carrier":"colissimo","pickupDeadline":"2026-03-20"}]}"#.into(),
        )]));
        let enricher = BatchEnricher::new(llm.clone(), EnrichmentConfig::default());
        let mut pending = vec![make_pending("m1", "Votre colis arrive")];

        let report = enricher.enrich(&mut pending).await;
        assert_eq!(report.batches, 1);
        assert_eq!(report.tracking_found, 1);
        let result = &pending[0].result;
        assert_eq!(result.tracking_number.as_deref(), Some("6A12345678901"));
        assert_eq!(result.carrier, Carrier::Colissimo);
        assert_eq!(result.pickup_deadline, NaiveDate::from_ymd_opt(2026, 3, 20));
        assert_eq!(result.source, ExtractionSource::Enriched);
        assert!(result.completeness >= 50);
    }

    #[tokio::test]
    async fn failed_batch_leaves_members_untouched_and_continues() {
        let llm = Arc::new(MockEnrichLlm::new(vec![
            Err("boom".into()),
            Ok(r#"[{"emailId":"m2","trackingNumber":"XW123456789FR","carrier":"chronopost"}]"#.into()),
        ]));
        let config = EnrichmentConfig {
            batch_size: 1,
            ..Default::default()
        };
        let enricher = BatchEnricher::new(llm.clone(), config);
        let mut pending = vec![make_pending("m1", "a"), make_pending("m2", "b")];

        let report = enricher.enrich(&mut pending).await;
        assert_eq!(*llm.calls.lock().unwrap(), 2);
        assert_eq!(report.failed_batches, 1);
        assert!(pending[0].result.tracking_number.is_none());
        assert_eq!(pending[1].result.tracking_number.as_deref(), Some("XW123456789FR"));
    }

    /// Never answers.
    struct HangingLlm;

    #[async_trait::async_trait]
    impl LlmProvider for HangingLlm {
        fn model_name(&self) -> &str {
            "hanging"
        }

        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn unresponsive_backend_fails_the_batch_after_timeout() {
        let config = EnrichmentConfig {
            timeout: std::time::Duration::from_millis(50),
            ..Default::default()
        };
        let enricher = BatchEnricher::new(Arc::new(HangingLlm), config);
        let mut pending = vec![make_pending("m1", "Votre colis arrive")];

        let report = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            enricher.enrich(&mut pending),
        )
        .await
        .unwrap();
        assert_eq!(report.batches, 1);
        assert_eq!(report.failed_batches, 1);
        assert!(pending[0].result.tracking_number.is_none());
    }

    #[tokio::test]
    async fn messages_with_tracking_are_not_sent() {
        let llm = Arc::new(MockEnrichLlm::new(vec![]));
        let enricher = BatchEnricher::new(llm.clone(), EnrichmentConfig::default());
        let mut pending = vec![make_pending("m1", "a")];
        pending[0].result.tracking_number = Some("XW123456789FR".into());

        let report = enricher.enrich(&mut pending).await;
        assert_eq!(report, EnrichmentReport::default());
        assert_eq!(*llm.calls.lock().unwrap(), 0);
    }
}
