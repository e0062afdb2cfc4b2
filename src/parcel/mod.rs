//! Durable parcels: model, status state machine, merge engine.

pub mod merge;
pub mod model;
pub mod state;

pub use merge::{MergeEngine, synthesize_title};
pub use model::{Parcel, ParcelPatch, ParcelStatus, StatusHistoryEntry};
pub use state::{accepts_transition, resolve_status, status_for_email_type};
