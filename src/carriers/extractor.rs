//! The one carrier extractor.
//!
//! Driven by a [`CarrierProfile`]: the carrier's rules run first, then the
//! generic profile's, then the shared utility extractors. Each field is
//! resolved on its own, so a miss on one never blocks another.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Carrier;
use super::profile::{CarrierProfile, RuleSet};
use crate::email::types::PreparedEmail;
use crate::extract::address::{extract_address, is_address_complete};
use crate::extract::plausibility::is_plausible_code;
use crate::extract::qr::is_valid_qr_reference;
use crate::extract::tracking::{
    TrackingConfidence, best_tracking_candidate, is_valid_s10, is_valid_ups, validate_tracking,
};
use crate::extract::{
    detect_marketplace, extract_greeting_name, extract_label_url, extract_order_number,
    extract_pickup_code, extract_qr_reference, parse_date,
};

/// Fields a carrier extractor recovered from one message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CarrierFields {
    /// The classified carrier, or the scanner's carrier when the message
    /// was unclassified.
    pub carrier: Option<Carrier>,
    pub tracking_number: Option<String>,
    pub tracking_confidence: Option<TrackingConfidence>,
    pub pickup_code: Option<String>,
    pub qr_code: Option<String>,
    pub pickup_address: Option<String>,
    pub pickup_deadline: Option<NaiveDate>,
    pub recipient_name: Option<String>,
    pub sender_name: Option<String>,
    pub product_name: Option<String>,
    pub product_description: Option<String>,
    pub order_number: Option<String>,
    pub label_url: Option<String>,
    pub marketplace: Option<String>,
}

/// Stateless extractor shared by every carrier.
#[derive(Debug, Clone, Copy, Default)]
pub struct CarrierExtractor;

impl CarrierExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract every field for `carrier` from a prepared email.
    pub fn extract(&self, email: &PreparedEmail<'_>, carrier: Carrier) -> CarrierFields {
        let profile = CarrierProfile::for_carrier(carrier);
        let generic = CarrierProfile::generic();

        let (tracking_number, tracking_confidence, resolved_carrier) =
            match self.tracking(email, profile, generic, carrier) {
                Some((number, confidence, c)) => (Some(number), Some(confidence), c),
                None => (None, None, carrier),
            };

        let pickup_code = first_of(email, profile, generic, |p| &p.pickup_code, |c| {
            let code = c.trim_matches('*').to_uppercase();
            is_plausible_code(&code).then_some(code)
        })
        // a tracking number is never its own pickup code
        .filter(|code| tracking_number.as_deref() != Some(code.as_str()))
        .or_else(|| extract_pickup_code(email.html, &email.text))
        .filter(|code| tracking_number.as_deref() != Some(code.as_str()));

        let qr_code = first_of(email, profile, generic, |p| &p.qr_code, |c| {
            is_valid_qr_reference(c).then(|| c.to_string())
        })
        .or_else(|| extract_qr_reference(email.html));

        let pickup_address = first_of(email, profile, generic, |p| &p.address, |c| {
            let joined = join_lines(c);
            is_address_complete(&joined).then_some(joined)
        })
        .or_else(|| extract_address(email.html));

        let received = email.email.received_at;
        let pickup_deadline =
            first_of(email, profile, generic, |p| &p.deadline, |c| parse_date(c, received));

        let recipient_name = first_of(email, profile, generic, |p| &p.recipient, clean_name)
            .or_else(|| extract_greeting_name(&email.text));

        let merchant = profile
            .merchant
            .first_accepted(email, clean_name)
            .map(|(m, _)| m);

        let sender_name = merchant
            .clone()
            .or_else(|| first_of(email, profile, generic, |p| &p.sender, clean_name));

        let product_name = profile.product_label(email).map(str::to_string);

        let product_description =
            first_of(email, profile, generic, |p| &p.description, |c| Some(c.to_string()));

        let order_number = first_of(email, profile, generic, |p| &p.order_number, |c| {
            let n = c.trim_end_matches('-').to_uppercase();
            (n.len() >= 4 && n.bytes().any(|b| b.is_ascii_digit())).then_some(n)
        })
        .or_else(|| extract_order_number(&email.text));

        let marketplace = detect_marketplace(&email.email.sender, &email.email.subject, &email.text)
            .or(merchant)
            .or_else(|| profile.default_marketplace.map(str::to_string));

        let fields = CarrierFields {
            carrier: Some(resolved_carrier),
            tracking_number,
            tracking_confidence,
            pickup_code,
            qr_code,
            pickup_address,
            pickup_deadline,
            recipient_name,
            sender_name,
            product_name,
            product_description,
            order_number,
            label_url: extract_label_url(email.html),
            marketplace,
        };
        debug!(
            message_id = %email.email.message_id,
            carrier = %resolved_carrier,
            tracking = fields.tracking_number.is_some(),
            "Carrier fields extracted"
        );
        fields
    }

    /// Carrier rules, then generic keyword rules, then the multi-format
    /// scanner. Returns the number, its confidence and the carrier it
    /// belongs to.
    fn tracking(
        &self,
        email: &PreparedEmail<'_>,
        profile: &CarrierProfile,
        generic: &CarrierProfile,
        carrier: Carrier,
    ) -> Option<(String, TrackingConfidence, Carrier)> {
        let validate = |c: &str| validate_tracking(c, carrier);
        let rule_hit = profile
            .tracking
            .first_accepted(email, validate)
            .or_else(|| generic.tracking.first_accepted(email, validate));
        if let Some((number, _)) = rule_hit {
            let confidence = if is_valid_ups(&number) || is_valid_s10(&number) {
                TrackingConfidence::High
            } else {
                TrackingConfidence::Medium
            };
            return Some((number, confidence, carrier));
        }

        let haystack = format!("{}\n{}", email.email.subject, email.text);
        let candidate = best_tracking_candidate(&haystack)?;
        if carrier.is_other() {
            return Some((candidate.number, candidate.confidence, candidate.carrier));
        }
        // a known carrier only takes numbers in its own format or checksum-proven ones
        let fits = validate_tracking(&candidate.number, carrier).is_some();
        if fits || candidate.confidence == TrackingConfidence::High {
            let owner = if fits { carrier } else { candidate.carrier };
            return Some((candidate.number, candidate.confidence, owner));
        }
        None
    }
}

/// Run a field's carrier rules, then the generic rules for the same field.
fn first_of<T>(
    email: &PreparedEmail<'_>,
    profile: &CarrierProfile,
    generic: &CarrierProfile,
    field: impl Fn(&CarrierProfile) -> &RuleSet,
    mut validate: impl FnMut(&str) -> Option<T>,
) -> Option<T> {
    field(profile)
        .first_accepted(email, &mut validate)
        .or_else(|| {
            if std::ptr::eq(profile, generic) {
                None
            } else {
                field(generic).first_accepted(email, &mut validate)
            }
        })
        .map(|(value, _)| value)
}

fn join_lines(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn clean_name(raw: &str) -> Option<String> {
    let name = raw
        .trim()
        .trim_end_matches(|c: char| c == ',' || c == '!' || c == '.' || c.is_whitespace());
    let len = name.chars().count();
    ((2..=60).contains(&len) && name.chars().any(char::is_alphabetic)).then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::email::NormalizedEmail;

    fn make_email(sender: &str, subject: &str, body: &str) -> NormalizedEmail {
        let received = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        NormalizedEmail::new("m-1", subject, sender, body, received)
    }

    fn extract(email: &NormalizedEmail, carrier: Carrier) -> CarrierFields {
        CarrierExtractor::new().extract(&PreparedEmail::new(email), carrier)
    }

    #[test]
    fn vinted_go_notification() {
        let email = make_email(
            "Vinted Go <noreply@vintedgo.com>",
            "Ton colis #12345678901234567 est arrivé",
            "Bonjour Camille,\nTon colis est disponible.\nPour le retirer, saisis le code suivant :\n*522758*\nÀ retirer avant le 14/03/2026.",
        );
        let fields = extract(&email, Carrier::VintedGo);
        assert_eq!(fields.tracking_number.as_deref(), Some("12345678901234567"));
        assert_eq!(fields.pickup_code.as_deref(), Some("522758"));
        assert_eq!(fields.pickup_deadline, NaiveDate::from_ymd_opt(2026, 3, 14));
        assert_eq!(fields.recipient_name.as_deref(), Some("Camille"));
        assert_eq!(fields.marketplace.as_deref(), Some("vinted"));
    }

    #[test]
    fn ups_checksum_gates_tracking() {
        let good = make_email("pkginfo@ups.com", "UPS Update", "Tracking Number: 1Z999AA10123456784\nUPS Ground");
        let fields = extract(&good, Carrier::Ups);
        assert_eq!(fields.tracking_number.as_deref(), Some("1Z999AA10123456784"));
        assert_eq!(fields.tracking_confidence, Some(TrackingConfidence::High));
        assert_eq!(fields.product_name.as_deref(), Some("UPS Ground"));

        let bad = make_email("pkginfo@ups.com", "UPS Update", "Tracking Number: 1Z999AA10123456780");
        assert!(extract(&bad, Carrier::Ups).tracking_number.is_none());
    }

    #[test]
    fn colissimo_fields() {
        let email = make_email(
            "noreply@notif-colissimo-laposte.info",
            "Votre colis est disponible",
            "Bonjour Marie Dupont,\nVotre colis n° 6A12345678901 est disponible en point retrait :\nTABAC DE LA GARE\n12 rue de la Paix\n75002 Paris\nIl est disponible jusqu'au 20/03/2026.\nExpéditeur : Boutique Soleil",
        );
        let fields = extract(&email, Carrier::Colissimo);
        assert_eq!(fields.tracking_number.as_deref(), Some("6A12345678901"));
        assert_eq!(fields.tracking_confidence, Some(TrackingConfidence::Medium));
        assert_eq!(
            fields.pickup_address.as_deref(),
            Some("TABAC DE LA GARE, 12 rue de la Paix, 75002 Paris")
        );
        assert_eq!(fields.pickup_deadline, NaiveDate::from_ymd_opt(2026, 3, 20));
        assert_eq!(fields.sender_name.as_deref(), Some("Boutique Soleil"));
        assert_eq!(fields.product_name.as_deref(), Some("Colissimo Point Retrait"));
    }

    #[test]
    fn unclassified_mail_adopts_scanner_carrier() {
        let email = make_email(
            "shop@example.com",
            "Expédition de votre commande",
            "Votre commande a été expédiée. Numéro : XW123456789TS via Chronopost.",
        );
        let fields = extract(&email, Carrier::Other);
        assert_eq!(fields.tracking_number.as_deref(), Some("XW123456789TS"));
        assert_eq!(fields.carrier, Some(Carrier::Chronopost));
    }

    #[test]
    fn fields_fail_independently() {
        let email = make_email("info@dhl.com", "Your DHL Express shipment", "Hello,\nnothing useful here");
        let fields = extract(&email, Carrier::Dhl);
        assert!(fields.tracking_number.is_none());
        assert!(fields.pickup_code.is_none());
        assert_eq!(fields.product_name.as_deref(), Some("DHL Express"));
    }

    #[test]
    fn relais_colis_merchant_becomes_sender_and_marketplace() {
        let email = make_email(
            "noreply@relaiscolis.com",
            "Votre colis",
            r##"<p>Votre colis <font color="#ef354a">Maison Lumière</font> n° VD1234567890 est arrivé.</p>"##,
        );
        let fields = extract(&email, Carrier::RelaisColis);
        assert_eq!(fields.tracking_number.as_deref(), Some("VD1234567890"));
        assert_eq!(fields.sender_name.as_deref(), Some("Maison Lumière"));
        assert_eq!(fields.marketplace.as_deref(), Some("Maison Lumière"));
    }
}
