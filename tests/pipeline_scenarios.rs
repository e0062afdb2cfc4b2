//! End-to-end behaviour of the extraction pipeline and the merge engine.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use parcel_intel::carriers::Carrier;
use parcel_intel::classify::{Direction, EmailType, classify_direction};
use parcel_intel::email::NormalizedEmail;
use parcel_intel::extract::{extract_pickup_code, validate_tracking};
use parcel_intel::parcel::{MergeEngine, ParcelStatus};
use parcel_intel::pipeline::{EmailParser, ExtractionResult};
use parcel_intel::store::{LibSqlBackend, MemoryStore, ParcelStore};

fn make_email(id: &str, sender: &str, subject: &str, body: &str) -> NormalizedEmail {
    let received = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
    NormalizedEmail::new(id, subject, sender, body, received)
}

fn make_result(tracking: &str, email_type: EmailType) -> ExtractionResult {
    let mut r = ExtractionResult::empty("m");
    r.tracking_number = Some(tracking.to_string());
    r.carrier = Carrier::Chronopost;
    r.email_type = email_type;
    r
}

// ── Classification and extraction ───────────────────────────────────

#[test]
fn sold_item_with_label_is_a_sale() {
    let verdict = classify_direction(
        "no-reply@vinted.fr",
        "Your item has been sold — print your label",
        "Download your shipping label and drop off the parcel.",
    );
    assert_eq!(verdict.direction, Direction::Sale);
}

#[test]
fn ambiguous_direction_defaults_to_purchase() {
    let verdict = classify_direction("news@example.com", "Bonjour", "Rien de particulier.");
    assert_eq!(verdict.direction, Direction::Purchase);
}

#[test]
fn starred_pickup_code_is_extracted() {
    let body = "Pour retirer ton colis, saisis le code suivant :\n*522758*";
    assert_eq!(extract_pickup_code(body, body).as_deref(), Some("522758"));
}

#[test]
fn ups_checksum_gates_candidates() {
    assert_eq!(
        validate_tracking("1Z999AA10123456784", Carrier::Ups).as_deref(),
        Some("1Z999AA10123456784")
    );
    assert_eq!(validate_tracking("1Z999AA10123456785", Carrier::Ups), None);
    assert_eq!(validate_tracking("1Z999AA10123456780", Carrier::Ups), None);
}

#[test]
fn parsing_the_same_message_twice_is_identical() {
    let email = make_email(
        "m-1",
        "Vinted Go <noreply@vintedgo.com>",
        "Ton colis #12345678901234567 est arrivé",
        "<p>Ton colis est disponible.</p><p>Saisis le code suivant :<br>*522758*</p>",
    );
    let parser = EmailParser::new();
    assert_eq!(parser.parse_email(&email), parser.parse_email(&email));
}

// ── Merge engine ────────────────────────────────────────────────────

#[tokio::test]
async fn backward_status_keeps_current_and_records_attempt() {
    let engine = MergeEngine::new(Arc::new(MemoryStore::new()));
    engine
        .upsert_parcel("u1", &make_result("XW123456789FR", EmailType::InTransit), "m1")
        .await
        .unwrap();

    let parcel = engine
        .upsert_parcel("u1", &make_result("XW123456789FR", EmailType::OrderConfirmed), "m2")
        .await
        .unwrap();
    assert_eq!(parcel.status, ParcelStatus::InTransit);
    let last = parcel.history.last().unwrap();
    assert_eq!(last.status, ParcelStatus::Pending);
    assert!(!last.accepted);
    assert_eq!(last.source_message_id, "m2");
}

#[tokio::test]
async fn delivered_parcel_can_be_returned() {
    let engine = MergeEngine::new(Arc::new(MemoryStore::new()));
    engine
        .upsert_parcel("u1", &make_result("XW123456789FR", EmailType::Delivered), "m1")
        .await
        .unwrap();
    let parcel = engine
        .upsert_parcel("u1", &make_result("XW123456789FR", EmailType::Returned), "m2")
        .await
        .unwrap();
    assert_eq!(parcel.status, ParcelStatus::Returned);

    let parcel = engine
        .upsert_parcel("u1", &make_result("XW123456789FR", EmailType::OutForDelivery), "m3")
        .await
        .unwrap();
    assert_eq!(parcel.status, ParcelStatus::Returned);
}

#[tokio::test]
async fn pickup_address_fills_once_and_is_never_overwritten() {
    let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let engine = MergeEngine::new(store.clone());

    engine
        .upsert_parcel("u1", &make_result("XW123456789FR", EmailType::Shipped), "m1")
        .await
        .unwrap();

    let mut second = make_result("XW123456789FR", EmailType::PickupReady);
    second.pickup_address = Some("Tabac du Port, 12 quai Est, 29200 Brest".into());
    engine.upsert_parcel("u1", &second, "m2").await.unwrap();

    let mut third = make_result("XW123456789FR", EmailType::PickupReady);
    third.pickup_address = Some("Relais Gare, 3 rue Neuve, 75010 Paris".into());
    let parcel = engine.upsert_parcel("u1", &third, "m3").await.unwrap();

    assert_eq!(
        parcel.pickup_address.as_deref(),
        Some("Tabac du Port, 12 quai Est, 29200 Brest")
    );
    assert_eq!(parcel.status, ParcelStatus::Delivered);
    assert_eq!(parcel.history.len(), 3);
    assert_eq!(store.list_parcels("u1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn accepted_statuses_never_move_backwards() {
    let engine = MergeEngine::new(Arc::new(MemoryStore::new()));
    let sequence = [
        EmailType::Shipped,
        EmailType::OrderConfirmed,
        EmailType::OutForDelivery,
        EmailType::InTransit,
        EmailType::Delivered,
        EmailType::LabelCreated,
    ];
    let mut parcel = None;
    for (i, email_type) in sequence.into_iter().enumerate() {
        parcel = Some(
            engine
                .upsert_parcel("u1", &make_result("XW123456789FR", email_type), &format!("m{i}"))
                .await
                .unwrap(),
        );
    }
    let parcel = parcel.unwrap();
    assert_eq!(parcel.status, ParcelStatus::Delivered);

    let accepted: Vec<u8> = parcel
        .history
        .iter()
        .filter(|h| h.accepted)
        .filter_map(|h| h.status.order())
        .collect();
    assert!(accepted.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(parcel.history.len(), sequence.len());
}

#[tokio::test]
async fn concurrent_messages_resolve_to_one_parcel() {
    let engine = Arc::new(MergeEngine::new(Arc::new(MemoryStore::new())));

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let mut result = make_result("XW123456789FR", EmailType::InTransit);
                if i == 7 {
                    result.pickup_code = Some("4821".into());
                }
                engine.upsert_parcel("u1", &result, &format!("m{i}")).await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let parcels = engine.store().list_parcels("u1").await.unwrap();
    assert_eq!(parcels.len(), 1);
    assert_eq!(parcels[0].history.len(), 16);
    assert_eq!(parcels[0].pickup_code.as_deref(), Some("4821"));
}
