//! Parcel Intel: email intelligence pipeline for parcel tracking.
//!
//! Shipping emails are classified by carrier, mined for tracking numbers
//! and pickup details, and merged into one durable parcel per
//! (owner, tracking number).

pub mod carriers;
pub mod classify;
pub mod config;
pub mod email;
pub mod error;
pub mod extract;
pub mod llm;
pub mod parcel;
pub mod pipeline;
pub mod secondary;
pub mod store;
pub mod sync;
