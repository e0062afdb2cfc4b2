//! Single-email secondary extractor backed by a generative model.
//!
//! Uses the same prompt and answer contract as batch enrichment, with a
//! batch of one.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{SecondaryExtractor, SecondaryRecord};
use crate::config::EnrichmentConfig;
use crate::email::html::to_plain_text;
use crate::error::{LlmError, SecondaryError};
use crate::llm::LlmProvider;
use crate::pipeline::enrichment::{
    EnrichmentItem, PartialHint, build_request, parse_enrichment_response,
};

const EMAIL_ID: &str = "email";

pub struct LlmExtractor {
    llm: Arc<dyn LlmProvider>,
    config: EnrichmentConfig,
}

impl LlmExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>, config: EnrichmentConfig) -> Self {
        Self { llm, config }
    }
}

#[async_trait]
impl SecondaryExtractor for LlmExtractor {
    fn name(&self) -> &str {
        self.llm.model_name()
    }

    async fn extract(
        &self,
        subject: &str,
        body: &str,
        sender: &str,
    ) -> Result<SecondaryRecord, SecondaryError> {
        let mut plain = to_plain_text(body);
        if let Some((idx, _)) = plain.char_indices().nth(self.config.body_clip) {
            plain.truncate(idx);
        }
        let item = EnrichmentItem {
            email_id: EMAIL_ID.to_string(),
            subject: subject.to_string(),
            from: sender.to_string(),
            body: plain,
            received_at: None,
            partial: PartialHint::default(),
        };

        let request = build_request(&[item], self.config.temperature, self.config.max_tokens)
            .map_err(|e| SecondaryError::InvalidResponse(e.to_string()))?;
        let response = self.llm.complete(request).await?;
        let records = parse_enrichment_response(&response.content).map_err(|e| {
            SecondaryError::Llm(LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: e.to_string(),
            })
        })?;

        let record = records
            .into_iter()
            .map(|(_, record)| record)
            .next()
            .ok_or_else(|| SecondaryError::InvalidResponse("empty results".to_string()))?;
        debug!(
            model = self.llm.model_name(),
            tracking = record.tracking_number.as_deref().unwrap_or("-"),
            "LLM extraction done"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::carriers::Carrier;
    use crate::llm::{CompletionRequest, CompletionResponse, FinishReason};

    struct MockLlm {
        response: String,
    }

    #[async_trait]
    impl LlmProvider for MockLlm {
        fn model_name(&self) -> &str {
            "mock-extract"
        }

        fn cost_per_token(&self) -> (Decimal, Decimal) {
            (Decimal::ZERO, Decimal::ZERO)
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            assert!(request.system_prompt().unwrap().contains("email parsing engine"));
            Ok(CompletionResponse {
                content: self.response.clone(),
                input_tokens: 10,
                output_tokens: 10,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }
    }

    #[tokio::test]
    async fn returns_first_record() {
        let extractor = LlmExtractor::new(
            Arc::new(MockLlm {
                response: r#"{"results":[{"emailId":"email","carrier":"dpd","productName":"Casque audio"}]}"#.into(),
            }),
            EnrichmentConfig::default(),
        );
        let record = extractor.extract("Colis", "<p>Bonjour</p>", "a@b.fr").await.unwrap();
        assert_eq!(record.carrier, Some(Carrier::Dpd));
        assert_eq!(record.product_name.as_deref(), Some("Casque audio"));
    }

    #[tokio::test]
    async fn unparseable_answer_is_an_error() {
        let extractor = LlmExtractor::new(
            Arc::new(MockLlm {
                response: "sorry".into(),
            }),
            EnrichmentConfig::default(),
        );
        let err = extractor.extract("s", "b", "f").await.unwrap_err();
        assert!(matches!(err, SecondaryError::Llm(_)));
    }
}
