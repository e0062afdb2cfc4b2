//! Secondary extractors consulted when rule-based extraction is incomplete.
//!
//! An extractor takes `(subject, body, sender)` and returns a partial record
//! with an overall confidence. Two backends exist: an HTTP NLP service and a
//! generative model. Tests use [`StubSecondary`].

pub mod llm;
pub mod nlp;
pub mod stub;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::carriers::Carrier;
use crate::classify::{Direction, EmailType};
use crate::config::{EnrichmentConfig, SecondaryBackend, SecondaryConfig};
use crate::error::SecondaryError;
use crate::extract::Price;
use crate::llm::LlmProvider;

pub use llm::LlmExtractor;
pub use nlp::NlpClient;
pub use stub::StubSecondary;

/// Partial record produced by a secondary extractor. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecondaryRecord {
    pub tracking_number: Option<String>,
    pub carrier: Option<Carrier>,
    pub direction: Option<Direction>,
    pub email_type: Option<EmailType>,
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
    /// Overall confidence, 0.0-1.0.
    pub confidence: f32,
}

impl SecondaryRecord {
    /// `true` when the extractor recovered nothing usable.
    pub fn is_empty(&self) -> bool {
        self.tracking_number.is_none()
            && self.carrier.is_none()
            && self.product_name.is_none()
            && self.pickup_address.is_none()
            && self.pickup_code.is_none()
            && self.qr_code.is_none()
            && self.sender_name.is_none()
            && self.order_number.is_none()
    }
}

/// Narrow seam between the pipeline and any NLP/LLM backend.
#[async_trait]
pub trait SecondaryExtractor: Send + Sync {
    /// Short backend name, used in logs.
    fn name(&self) -> &str;

    async fn extract(
        &self,
        subject: &str,
        body: &str,
        sender: &str,
    ) -> Result<SecondaryRecord, SecondaryError>;
}

/// Build the configured secondary extractor, or `None` when escalation is off.
///
/// The LLM backend needs a provider; asking for it without one is an error.
pub fn build_secondary(
    config: &SecondaryConfig,
    enrichment: &EnrichmentConfig,
    llm: Option<Arc<dyn LlmProvider>>,
) -> Result<Option<Arc<dyn SecondaryExtractor>>, SecondaryError> {
    if !config.enabled {
        return Ok(None);
    }
    let extractor: Arc<dyn SecondaryExtractor> = match config.backend {
        SecondaryBackend::Nlp => Arc::new(NlpClient::new(config)?),
        SecondaryBackend::Llm => {
            let llm = llm.ok_or_else(|| SecondaryError::Disabled {
                name: "llm (no LLM_API_KEY)".to_string(),
            })?;
            Arc::new(LlmExtractor::new(llm, enrichment.clone()))
        }
    };
    tracing::info!(extractor = extractor.name(), "Secondary extractor enabled");
    Ok(Some(extractor))
}

/// Trim and drop empty strings; model and NLP output is full of `""`.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::{CompletionRequest, CompletionResponse};

    struct NamedLlm;

    #[async_trait]
    impl LlmProvider for NamedLlm {
        fn model_name(&self) -> &str {
            "haiku"
        }

        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Err(LlmError::RequestFailed {
                provider: "named".into(),
                reason: "not called".into(),
            })
        }
    }

    fn make_config(enabled: bool, backend: SecondaryBackend) -> SecondaryConfig {
        SecondaryConfig {
            enabled,
            backend,
            ..Default::default()
        }
    }

    #[test]
    fn disabled_config_builds_nothing() {
        let built = build_secondary(
            &make_config(false, SecondaryBackend::Llm),
            &EnrichmentConfig::default(),
            Some(Arc::new(NamedLlm)),
        )
        .unwrap();
        assert!(built.is_none());
    }

    #[test]
    fn llm_backend_wraps_the_provider() {
        let built = build_secondary(
            &make_config(true, SecondaryBackend::Llm),
            &EnrichmentConfig::default(),
            Some(Arc::new(NamedLlm)),
        )
        .unwrap()
        .unwrap();
        assert_eq!(built.name(), "haiku");
    }

    #[test]
    fn llm_backend_without_provider_is_an_error() {
        let err = build_secondary(
            &make_config(true, SecondaryBackend::Llm),
            &EnrichmentConfig::default(),
            None,
        )
        .err()
        .unwrap();
        assert!(matches!(err, SecondaryError::Disabled { .. }));
    }

    #[test]
    fn nlp_backend_builds_the_http_client() {
        let built = build_secondary(
            &make_config(true, SecondaryBackend::Nlp),
            &EnrichmentConfig::default(),
            None,
        )
        .unwrap()
        .unwrap();
        assert_eq!(built.name(), "nlp");
    }

    #[test]
    fn default_record_is_empty() {
        assert!(SecondaryRecord::default().is_empty());
        let rec = SecondaryRecord {
            product_name: Some("Veste".into()),
            ..Default::default()
        };
        assert!(!rec.is_empty());
    }

    #[test]
    fn non_blank_filters_placeholders() {
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(Some("null".into())), None);
        assert_eq!(non_blank(Some(" Paris ".into())).as_deref(), Some("Paris"));
    }
}
