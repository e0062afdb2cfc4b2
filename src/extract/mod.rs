//! Stateless field extractors shared by every carrier profile.
//!
//! Each extractor takes text (or markup) and returns `None` on a miss.
//! Nothing here allocates state between calls.

pub mod address;
pub mod date;
pub mod entities;
pub mod label_url;
pub mod marketplace;
pub mod pickup_code;
pub mod plausibility;
pub mod qr;
pub mod tracking;

pub use address::{extract_address, is_address_complete};
pub use date::parse_date;
pub use entities::{Price, detect_language, extract_greeting_name, extract_order_number, extract_price};
pub use label_url::extract_label_url;
pub use marketplace::detect_marketplace;
pub use pickup_code::extract_pickup_code;
pub use qr::extract_qr_reference;
pub use tracking::{
    TrackingCandidate, TrackingConfidence, best_tracking_candidate, clean_tracking,
    scan_tracking_candidates, validate_tracking,
};
