//! Deterministic secondary extractor for tests and offline runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{SecondaryExtractor, SecondaryRecord};
use crate::error::SecondaryError;

enum Behaviour {
    Return(SecondaryRecord),
    Fail(String),
    Sleep(Duration, SecondaryRecord),
}

/// Returns a canned record, fails, or sleeps before answering.
pub struct StubSecondary {
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl StubSecondary {
    pub fn returning(record: SecondaryRecord) -> Self {
        Self::with(Behaviour::Return(record))
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self::with(Behaviour::Fail(reason.into()))
    }

    pub fn slow(delay: Duration, record: SecondaryRecord) -> Self {
        Self::with(Behaviour::Sleep(delay, record))
    }

    fn with(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `extract` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecondaryExtractor for StubSecondary {
    fn name(&self) -> &str {
        "stub"
    }

    async fn extract(
        &self,
        _subject: &str,
        _body: &str,
        _sender: &str,
    ) -> Result<SecondaryRecord, SecondaryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Return(record) => Ok(record.clone()),
            Behaviour::Fail(reason) => Err(SecondaryError::InvalidResponse(reason.clone())),
            Behaviour::Sleep(delay, record) => {
                tokio::time::sleep(*delay).await;
                Ok(record.clone())
            }
        }
    }
}
