//! Email intelligence pipeline.
//!
//! Every message goes through:
//! 1. `EmailParser::parse_email()`: carrier classification, per-carrier
//!    extraction, direction and lifecycle classification (pure, no I/O)
//! 2. `HybridParser::parse()`: escalation to a secondary extractor when the
//!    completeness score is below the threshold
//! 3. `BatchEnricher::enrich()`: batched LLM pass over messages that still
//!    have no tracking number
//!
//! A result without a tracking number never creates a parcel.

pub mod enrichment;
pub mod hybrid;
pub mod parser;
pub mod types;

pub use enrichment::{BatchEnricher, EnrichmentReport, PendingEmail};
pub use hybrid::{HybridParser, completeness_score, merge_secondary};
pub use parser::EmailParser;
pub use types::{ExtractionResult, ExtractionSource};
