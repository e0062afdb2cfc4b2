//! Parcel status state machine.
//!
//! Statuses only move forward along pending → in_transit →
//! out_for_delivery → delivered. A move to `returned` is always accepted
//! and nothing leaves `returned`.

use super::model::ParcelStatus;
use crate::classify::EmailType;
use crate::pipeline::ExtractionResult;

/// Whether a parcel at `current` may move to `incoming`.
pub fn accepts_transition(current: ParcelStatus, incoming: ParcelStatus) -> bool {
    if incoming == ParcelStatus::Returned {
        return current != ParcelStatus::Returned;
    }
    match (current.order(), incoming.order()) {
        (Some(from), Some(to)) => to > from,
        // `current` is returned: terminal.
        _ => false,
    }
}

/// Explicit mapping from the lifecycle classification. `None` when the
/// email type says nothing about the parcel's progress.
pub fn status_for_email_type(email_type: EmailType) -> Option<ParcelStatus> {
    match email_type {
        EmailType::OrderConfirmed | EmailType::LabelCreated => Some(ParcelStatus::Pending),
        EmailType::Shipped | EmailType::InTransit => Some(ParcelStatus::InTransit),
        EmailType::OutForDelivery => Some(ParcelStatus::OutForDelivery),
        EmailType::Delivered | EmailType::PickupReady => Some(ParcelStatus::Delivered),
        EmailType::Returned => Some(ParcelStatus::Returned),
        EmailType::Info | EmailType::Promo | EmailType::Unknown => None,
    }
}

/// A pickup address, deadline or code means the parcel sits at a pickup point.
pub fn heuristic_status(result: &ExtractionResult) -> Option<ParcelStatus> {
    (result.pickup_address.is_some()
        || result.pickup_deadline.is_some()
        || result.pickup_code.is_some())
    .then_some(ParcelStatus::Delivered)
}

/// Status a message points to: explicit mapping, then heuristic, then pending.
pub fn resolve_status(result: &ExtractionResult) -> ParcelStatus {
    status_for_email_type(result.email_type)
        .or_else(|| heuristic_status(result))
        .unwrap_or(ParcelStatus::Pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ParcelStatus::*;

    #[test]
    fn forward_moves_are_accepted() {
        assert!(accepts_transition(Pending, InTransit));
        assert!(accepts_transition(InTransit, Delivered));
        assert!(accepts_transition(OutForDelivery, Delivered));
    }

    #[test]
    fn backward_and_same_moves_are_rejected() {
        assert!(!accepts_transition(InTransit, Pending));
        assert!(!accepts_transition(Delivered, OutForDelivery));
        assert!(!accepts_transition(InTransit, InTransit));
    }

    #[test]
    fn returned_is_always_accepted_and_absorbing() {
        for s in [Pending, InTransit, OutForDelivery, Delivered] {
            assert!(accepts_transition(s, Returned));
            assert!(!accepts_transition(Returned, s));
        }
        assert!(!accepts_transition(Returned, Returned));
    }

    #[test]
    fn email_type_mapping() {
        assert_eq!(status_for_email_type(EmailType::OrderConfirmed), Some(Pending));
        assert_eq!(status_for_email_type(EmailType::PickupReady), Some(Delivered));
        assert_eq!(status_for_email_type(EmailType::Promo), None);
    }

    #[test]
    fn heuristic_applies_only_without_explicit_mapping() {
        let mut result = ExtractionResult::empty("m");
        assert_eq!(resolve_status(&result), Pending);
        result.pickup_code = Some("4821".into());
        assert_eq!(resolve_status(&result), Delivered);
        result.email_type = EmailType::Shipped;
        assert_eq!(resolve_status(&result), InTransit);
    }
}
