//! HTTP client for the NLP entity-extraction service.
//!
//! `POST {base}/extract` with `{body, subject, sender}` returns entity lists
//! and labelled classifications. Only the first entity of each list is used,
//! and labels below [`MIN_LABEL_CONFIDENCE`] are ignored.

use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{SecondaryExtractor, SecondaryRecord, non_blank};
use crate::carriers::Carrier;
use crate::classify::{Direction, EmailType};
use crate::config::SecondaryConfig;
use crate::error::SecondaryError;
use crate::extract::{Price, parse_date};

/// Labels at or below this confidence are dropped.
pub const MIN_LABEL_CONFIDENCE: f32 = 0.3;

static AMOUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+[.,]?\d*)").unwrap());

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NlpLabel {
    pub label: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NlpExtractResponse {
    pub tracking_numbers: Vec<String>,
    pub pickup_address: Option<String>,
    pub delivery_address: Option<String>,
    pub person_names: Vec<String>,
    pub withdrawal_codes: Vec<String>,
    pub order_numbers: Vec<String>,
    pub product_names: Vec<String>,
    pub prices: Vec<String>,
    pub dates: Vec<String>,
    pub carrier: Option<NlpLabel>,
    pub shipment_type: Option<NlpLabel>,
    pub marketplace: Option<NlpLabel>,
    pub email_type: Option<NlpLabel>,
    pub processing_time_ms: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(default)]
    models_loaded: bool,
}

// ── Client ──────────────────────────────────────────────────────────

/// Client for the NLP extraction service.
pub struct NlpClient {
    client: reqwest::Client,
    base_url: String,
    enabled: bool,
}

impl NlpClient {
    pub fn new(config: &SecondaryConfig) -> Result<Self, SecondaryError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SecondaryError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            enabled: config.enabled,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// `true` when the service reports `status: ok` with models loaded.
    pub async fn is_healthy(&self) -> bool {
        if !self.enabled {
            return false;
        }
        let resp = match self
            .client
            .get(self.url("health"))
            .timeout(Duration::from_secs(3))
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                debug!(error = %e, "NLP health check failed");
                return false;
            }
        };
        match resp.json::<HealthResponse>().await {
            Ok(health) => health.status == "ok" && health.models_loaded,
            Err(_) => false,
        }
    }
}

#[async_trait]
impl SecondaryExtractor for NlpClient {
    fn name(&self) -> &str {
        "nlp"
    }

    async fn extract(
        &self,
        subject: &str,
        body: &str,
        sender: &str,
    ) -> Result<SecondaryRecord, SecondaryError> {
        if !self.enabled {
            return Err(SecondaryError::Disabled {
                name: "nlp".to_string(),
            });
        }

        let payload = serde_json::json!({
            "body": body,
            "subject": subject,
            "sender": sender,
        });
        let resp = self
            .client
            .post(self.url("extract"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| SecondaryError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            warn!(status = %status, "NLP service returned an error status");
            return Err(SecondaryError::Http(format!("extract returned {status}")));
        }

        let parsed: NlpExtractResponse = resp
            .json()
            .await
            .map_err(|e| SecondaryError::InvalidResponse(e.to_string()))?;
        debug!(
            elapsed_ms = parsed.processing_time_ms.unwrap_or_default(),
            trackings = parsed.tracking_numbers.len(),
            "NLP extraction done"
        );
        Ok(map_response(parsed))
    }
}

// ── Mapping ─────────────────────────────────────────────────────────

fn confident(label: Option<NlpLabel>) -> Option<NlpLabel> {
    label.filter(|l| l.confidence > MIN_LABEL_CONFIDENCE)
}

fn first(list: Vec<String>) -> Option<String> {
    non_blank(list.into_iter().next())
}

/// Parse "12,50 €" / "$8" into a price; currency defaults to EUR.
fn parse_nlp_price(raw: &str) -> Option<Price> {
    let caps = AMOUNT.captures(raw)?;
    let amount = Decimal::from_str(&caps[1].replace(',', ".")).ok()?;
    let lower = raw.to_lowercase();
    let currency = if lower.contains('$') || lower.contains("usd") {
        "USD"
    } else if lower.contains('£') || lower.contains("gbp") {
        "GBP"
    } else {
        "EUR"
    };
    Some(Price {
        amount,
        currency: currency.to_string(),
    })
}

/// Convert a service response into a partial record.
pub fn map_response(nlp: NlpExtractResponse) -> SecondaryRecord {
    let carrier_label = confident(nlp.carrier);
    let confidence = carrier_label.as_ref().map(|l| l.confidence).unwrap_or(0.5);

    SecondaryRecord {
        tracking_number: first(nlp.tracking_numbers),
        carrier: carrier_label.and_then(|l| Carrier::from_wire(&l.label)),
        direction: confident(nlp.shipment_type).and_then(|l| Direction::parse(&l.label)),
        email_type: confident(nlp.email_type)
            .map(|l| EmailType::parse(&l.label))
            .filter(|t| *t != EmailType::Unknown),
        marketplace: confident(nlp.marketplace).map(|l| l.label.to_lowercase()),
        product_name: first(nlp.product_names),
        recipient_name: first(nlp.person_names),
        pickup_address: non_blank(nlp.pickup_address),
        pickup_deadline: nlp
            .dates
            .first()
            .and_then(|d| parse_date(d, Utc::now())),
        order_number: first(nlp.order_numbers),
        price: nlp.prices.first().and_then(|p| parse_nlp_price(p)),
        pickup_code: first(nlp.withdrawal_codes),
        confidence,
        ..Default::default()
    }
}
