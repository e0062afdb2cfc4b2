//! Keyword-cascade classifiers: direction, lifecycle/source, pre-filter.

pub mod direction;
pub mod lifecycle;
pub mod prefilter;

pub use direction::{Direction, DirectionVerdict, classify_direction};
pub use lifecycle::{
    EmailClassification, EmailType, SourceType, classify_email, classify_email_type,
    classify_source,
};
pub use prefilter::is_tracking_email;
