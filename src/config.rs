//! Configuration types.
//!
//! Every section has a `Default` matching production values and a
//! `from_env()` constructor that overrides individual fields from
//! environment variables. Unparseable values fall back to the default.

use std::path::PathBuf;
use std::time::Duration;

/// Read and parse an environment variable, falling back to `default`.
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Rule-based pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Completeness score (0-100) below which the secondary extractor runs.
    pub escalation_threshold: u8,
    /// Only escalate messages that pass the tracking-email pre-filter.
    pub escalate_only_tracking_emails: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            escalation_threshold: 70,
            escalate_only_tracking_emails: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            escalation_threshold: env_or("PARCEL_ESCALATION_THRESHOLD", d.escalation_threshold)
                .min(100),
            escalate_only_tracking_emails: env_or(
                "PARCEL_ESCALATE_ONLY_TRACKING",
                d.escalate_only_tracking_emails,
            ),
        }
    }
}

/// Which backend answers escalations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryBackend {
    /// The HTTP NLP service at `base_url`.
    Nlp,
    /// The configured generative model, one email per request.
    Llm,
}

impl std::str::FromStr for SecondaryBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nlp" => Ok(Self::Nlp),
            "llm" => Ok(Self::Llm),
            other => Err(format!("unknown secondary backend '{other}'")),
        }
    }
}

/// Secondary extractor settings.
#[derive(Debug, Clone)]
pub struct SecondaryConfig {
    pub enabled: bool,
    pub backend: SecondaryBackend,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for SecondaryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: SecondaryBackend::Nlp,
            base_url: "http://localhost:8000".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl SecondaryConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            enabled: env_or("NLP_ENABLED", d.enabled),
            backend: env_or("SECONDARY_BACKEND", d.backend),
            base_url: std::env::var("NLP_BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(d.base_url),
            timeout: Duration::from_millis(env_or("NLP_TIMEOUT_MS", 10_000u64)),
        }
    }
}

/// Batch LLM enrichment settings.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    /// Maximum emails per request.
    pub batch_size: usize,
    /// Maximum serialized characters (subject + sender + clipped body) per request.
    pub max_chars: usize,
    /// Each body is clipped to this many characters before batching.
    pub body_clip: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound on one batch request; a batch that exceeds it counts as failed.
    pub timeout: Duration,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 8,
            max_chars: 12_000,
            body_clip: 8_000,
            temperature: 0.0,
            max_tokens: 4_096,
            timeout: Duration::from_secs(60),
        }
    }
}

impl EnrichmentConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            enabled: env_or("ENRICH_ENABLED", d.enabled),
            batch_size: env_or("ENRICH_BATCH_SIZE", d.batch_size).max(1),
            max_chars: env_or("ENRICH_MAX_CHARS", d.max_chars),
            body_clip: env_or("ENRICH_BODY_CLIP", d.body_clip),
            temperature: d.temperature,
            max_tokens: env_or("ENRICH_MAX_TOKENS", d.max_tokens),
            timeout: Duration::from_millis(env_or("ENRICH_TIMEOUT_MS", 60_000u64)),
        }
    }
}

/// Mailbox synchronisation settings.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Fetch volume on a mailbox's first-ever sync.
    pub initial_fetch_limit: usize,
    /// Fetch volume on later syncs.
    pub incremental_fetch_limit: usize,
    /// Interval of the background sync loop.
    pub interval: Duration,
    /// Mailboxes processed concurrently per owner.
    pub max_concurrent_mailboxes: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            initial_fetch_limit: 100,
            incremental_fetch_limit: 20,
            interval: Duration::from_secs(300),
            max_concurrent_mailboxes: 4,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            initial_fetch_limit: env_or("SYNC_INITIAL_LIMIT", d.initial_fetch_limit),
            incremental_fetch_limit: env_or("SYNC_INCREMENTAL_LIMIT", d.incremental_fetch_limit),
            interval: Duration::from_secs(env_or("SYNC_INTERVAL_SECS", 300u64)),
            max_concurrent_mailboxes: env_or("SYNC_CONCURRENCY", d.max_concurrent_mailboxes)
                .max(1),
        }
    }
}

/// Aggregated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub pipeline: PipelineConfig,
    pub secondary: SecondaryConfig,
    pub enrichment: EnrichmentConfig,
    pub sync: SyncConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/parcel-intel.db"),
            pipeline: PipelineConfig::default(),
            secondary: SecondaryConfig::default(),
            enrichment: EnrichmentConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var("PARCEL_INTEL_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/parcel-intel.db")),
            pipeline: PipelineConfig::from_env(),
            secondary: SecondaryConfig::from_env(),
            enrichment: EnrichmentConfig::from_env(),
            sync: SyncConfig::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.pipeline.escalation_threshold, 70);
        assert_eq!(cfg.enrichment.batch_size, 8);
        assert_eq!(cfg.enrichment.max_chars, 12_000);
        assert_eq!(cfg.enrichment.body_clip, 8_000);
        assert_eq!(cfg.sync.initial_fetch_limit, 100);
        assert_eq!(cfg.sync.incremental_fetch_limit, 20);
        assert!(!cfg.secondary.enabled);
        assert_eq!(cfg.secondary.backend, SecondaryBackend::Nlp);
        assert_eq!(cfg.enrichment.timeout, Duration::from_secs(60));
    }

    #[test]
    fn secondary_backend_parses_case_insensitively() {
        assert_eq!(" LLM ".parse::<SecondaryBackend>(), Ok(SecondaryBackend::Llm));
        assert_eq!("nlp".parse::<SecondaryBackend>(), Ok(SecondaryBackend::Nlp));
        assert!("spacy".parse::<SecondaryBackend>().is_err());
    }

    #[test]
    fn env_or_falls_back_on_garbage() {
        // Key is unique to this test so parallel tests don't interfere.
        let key = "PARCEL_INTEL_TEST_GARBAGE_VALUE";
        assert_eq!(env_or(key, 42usize), 42);
    }
}
