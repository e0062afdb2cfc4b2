//! Carrier classification.
//!
//! Fixed priority, first match wins:
//!
//! 1. carrier sender domains
//! 2. retailer / logistics senders that subcontract: the body names the carrier
//! 3. Vinted senders: body names the partner carrier, else Vinted Go
//! 4. carrier mentions in the subject
//! 5. carrier mentions in the body (forwarded mail, unknown senders)
//! 6. tracking-number shape
//! 7. `Other`

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::Carrier;
use crate::email::types::sender_domain;

/// Sender domains and text mentions identifying one carrier.
struct CarrierSignature {
    carrier: Carrier,
    domains: &'static [&'static str],
    mention: Regex,
}

fn signature(carrier: Carrier, domains: &'static [&'static str], mention: &str) -> CarrierSignature {
    CarrierSignature {
        carrier,
        domains,
        mention: Regex::new(&format!(r"(?i)\b(?:{mention})\b")).unwrap(),
    }
}

/// Priority order for both domain and mention lookups.
static SIGNATURES: LazyLock<Vec<CarrierSignature>> = LazyLock::new(|| {
    vec![
        signature(
            Carrier::Chronopost,
            &["chronopost.fr", "chronopost.com", "pickup.fr"],
            r"chronopost|chrono pickup|chrono relais",
        ),
        signature(
            Carrier::MondialRelay,
            &["mondialrelay.fr", "mondialrelay.com"],
            r"mondial relay|mondialrelay",
        ),
        signature(
            Carrier::Colissimo,
            &[
                "colissimo.fr",
                "colissimo-laposte.info",
                "notif-colissimo-laposte.info",
                "notif-laposte.info",
                "laposte.info",
            ],
            r"colissimo",
        ),
        signature(Carrier::LaPoste, &["laposte.fr", "laposte.net"], r"la poste|laposte\.fr|lettre suivie"),
        signature(Carrier::Dhl, &["dhl.com", "dhl.fr", "dhl.de"], r"dhl"),
        signature(Carrier::Ups, &["ups.com", "ups.fr"], r"ups\.com|united parcel|ups"),
        signature(Carrier::Fedex, &["fedex.com", "fedex.fr"], r"fedex"),
        signature(Carrier::RelaisColis, &["relaiscolis.com"], r"relais colis|relaiscolis"),
        signature(
            Carrier::Dpd,
            &["dpd.fr", "dpd.com"],
            r"dpd",
        ),
        signature(
            Carrier::ColisPrive,
            &["colisprive.fr", "colisprive.com"],
            r"colis privé|colis prive|colisprive",
        ),
        signature(Carrier::Gls, &["gls-france.com", "gls.fr"], r"gls"),
        signature(
            Carrier::AmazonLogistics,
            &["amazon.fr", "amazon.com"],
            r"amazon logistics|livraison amazon",
        ),
    ]
});

/// Retailers and logistics brokers whose mail names the real carrier in the body.
const SUBCONTRACTING_SENDERS: &[(&str, Carrier)] = &[
    ("gofoexpress.fr", Carrier::Dpd),
    ("cirroparcel.com", Carrier::Dpd),
    ("sheinnotice.com", Carrier::Other),
    ("shein.com", Carrier::Other),
    ("temu.com", Carrier::Other),
    ("showroomprive.com", Carrier::Other),
];

const VINTED_SENDERS: &[&str] = &["vintedgo.com", "vinted.com", "vinted.fr"];

/// Carriers Vinted hands parcels to, checked in this order.
const VINTED_PARTNERS: &[Carrier] = &[Carrier::Chronopost, Carrier::MondialRelay, Carrier::Colissimo];

static VINTED_GO_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)vinted ?go|vinted\.(?:com|fr)").unwrap());

static TRACKING_SHAPES: LazyLock<Vec<(Regex, Carrier)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"(?i)\bX[WS]\d{9,11}[A-Z]{2}\b").unwrap(), Carrier::Chronopost),
        (Regex::new(r"\b[6-8][AV]\d{11}\b").unwrap(), Carrier::Colissimo),
        (Regex::new(r"\b1Z[A-Z0-9]{16}\b").unwrap(), Carrier::Ups),
        (Regex::new(r"(?i)\bGFFR\d{10,20}\b").unwrap(), Carrier::Dpd),
        (Regex::new(r"\bVD\d{10}\b").unwrap(), Carrier::RelaisColis),
    ]
});

fn domain_matches(domain: &str, candidates: &[&str]) -> bool {
    candidates
        .iter()
        .any(|d| domain == *d || domain.ends_with(&format!(".{d}")))
}

fn mentioned_carrier(text: &str) -> Option<Carrier> {
    SIGNATURES
        .iter()
        .find(|sig| sig.mention.is_match(text))
        .map(|sig| sig.carrier)
}

fn carrier_from_tracking_shape(text: &str) -> Option<Carrier> {
    TRACKING_SHAPES
        .iter()
        .find(|(shape, _)| shape.is_match(text))
        .map(|(_, carrier)| *carrier)
}

/// Classify the carrier of a message.
pub fn classify_carrier(sender: &str, subject: &str, body: &str) -> Carrier {
    let carrier = classify(sender, subject, body);
    debug!(carrier = %carrier, sender, "Carrier classified");
    carrier
}

fn mentions(carrier: Carrier, text: &str) -> bool {
    SIGNATURES
        .iter()
        .find(|s| s.carrier == carrier)
        .is_some_and(|s| s.mention.is_match(text))
}

fn classify(sender: &str, subject: &str, body: &str) -> Carrier {
    let domain = sender_domain(sender).unwrap_or_default();

    if let Some(sig) = SIGNATURES.iter().find(|s| domain_matches(&domain, s.domains)) {
        // La Poste also sends Colissimo notifications
        if sig.carrier == Carrier::LaPoste && mentions(Carrier::Colissimo, body) {
            return Carrier::Colissimo;
        }
        return sig.carrier;
    }

    if let Some((_, fallback)) = SUBCONTRACTING_SENDERS
        .iter()
        .find(|(d, _)| domain_matches(&domain, &[d]))
    {
        return mentioned_carrier(body)
            .or_else(|| carrier_from_tracking_shape(&format!("{body} {subject}")))
            .unwrap_or(*fallback);
    }

    if domain_matches(&domain, VINTED_SENDERS) {
        return VINTED_PARTNERS
            .iter()
            .copied()
            .find(|partner| {
                SIGNATURES
                    .iter()
                    .any(|s| s.carrier == *partner && s.mention.is_match(body))
            })
            .unwrap_or(Carrier::VintedGo);
    }

    if let Some(carrier) = mentioned_carrier(subject) {
        return carrier;
    }
    if let Some(carrier) = mentioned_carrier(body) {
        return carrier;
    }
    if VINTED_GO_MENTION.is_match(&format!("{sender} {subject} {body}")) {
        return Carrier::VintedGo;
    }

    carrier_from_tracking_shape(&format!("{body} {subject}")).unwrap_or(Carrier::Other)
}
