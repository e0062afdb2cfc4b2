//! Per-carrier extraction profiles.
//!
//! A profile is plain data: for each field, an ordered list of rules whose
//! first capture group is a candidate. The extractor runs a field's rules
//! in order and keeps the first candidate its validator accepts. Every
//! carrier is followed by the generic profile, so a carrier only lists what
//! differs from the common phrasing.
//!
//! Profiles are built once on first use and never mutated.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::Carrier;
use crate::email::types::PreparedEmail;

/// Which view of the message a rule is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSource {
    Subject,
    /// Raw body, markup kept.
    Html,
    /// Flattened plain-text body.
    Text,
}

/// A single candidate pattern for one field.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub regex: Regex,
    pub source: RuleSource,
    /// Confidence attached to a value this rule produced.
    pub confidence: f32,
}

impl FieldRule {
    pub fn new(pattern: &str, source: RuleSource, confidence: f32) -> Self {
        Self {
            regex: Regex::new(pattern).unwrap(),
            source,
            confidence,
        }
    }

    fn text(pattern: &str) -> Self {
        Self::new(pattern, RuleSource::Text, 0.9)
    }

    fn html(pattern: &str) -> Self {
        Self::new(pattern, RuleSource::Html, 0.9)
    }

    fn subject(pattern: &str) -> Self {
        Self::new(pattern, RuleSource::Subject, 0.95)
    }

    fn weak(mut self) -> Self {
        self.confidence = 0.6;
        self
    }

    fn haystack<'e>(&self, email: &'e PreparedEmail<'_>) -> &'e str {
        match self.source {
            RuleSource::Subject => &email.email.subject,
            RuleSource::Html => email.html,
            RuleSource::Text => &email.text,
        }
    }

    /// First capture group of every match, in document order.
    pub fn candidates<'r, 'e>(
        &'r self,
        email: &'e PreparedEmail<'_>,
    ) -> impl Iterator<Item = &'e str> {
        self.regex
            .captures_iter(self.haystack(email))
            .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim()))
    }
}

/// An ordered rule list for one field, evaluated to first accept.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<FieldRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<FieldRule>) -> Self {
        Self { rules }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Run the rules in order; the first candidate `validate` maps to
    /// `Some` wins, together with the confidence of the rule that found it.
    pub fn first_accepted<T>(
        &self,
        email: &PreparedEmail<'_>,
        mut validate: impl FnMut(&str) -> Option<T>,
    ) -> Option<(T, f32)> {
        self.rules.iter().find_map(|rule| {
            rule.candidates(email)
                .find_map(&mut validate)
                .map(|value| (value, rule.confidence))
        })
    }
}

/// Service-name keyword mapped to a product label ("DHL Express").
#[derive(Debug, Clone)]
pub struct ProductRule {
    pub keyword: Regex,
    pub label: &'static str,
}

impl ProductRule {
    fn new(keyword: &str, label: &'static str) -> Self {
        Self {
            keyword: Regex::new(keyword).unwrap(),
            label,
        }
    }
}

/// Extraction rules for one carrier.
#[derive(Debug, Clone)]
pub struct CarrierProfile {
    pub carrier: Carrier,
    pub tracking: RuleSet,
    pub pickup_code: RuleSet,
    pub qr_code: RuleSet,
    pub address: RuleSet,
    /// Captures a short snippet that is handed to the date parser.
    pub deadline: RuleSet,
    pub recipient: RuleSet,
    pub sender: RuleSet,
    pub order_number: RuleSet,
    /// Weight / package count.
    pub description: RuleSet,
    /// Merchant named inside the carrier's own template.
    pub merchant: RuleSet,
    pub products: Vec<ProductRule>,
    pub default_marketplace: Option<&'static str>,
}

impl CarrierProfile {
    fn empty(carrier: Carrier) -> Self {
        Self {
            carrier,
            tracking: RuleSet::empty(),
            pickup_code: RuleSet::empty(),
            qr_code: RuleSet::empty(),
            address: RuleSet::empty(),
            deadline: RuleSet::empty(),
            recipient: RuleSet::empty(),
            sender: RuleSet::empty(),
            order_number: RuleSet::empty(),
            description: RuleSet::empty(),
            merchant: RuleSet::empty(),
            products: Vec::new(),
            default_marketplace: None,
        }
    }

    /// Profile for a carrier; carriers without their own rules get the
    /// generic profile.
    pub fn for_carrier(carrier: Carrier) -> &'static CarrierProfile {
        PROFILES.get(&carrier).unwrap_or(&*GENERIC)
    }

    /// Rules shared by every carrier, tried after the carrier's own.
    pub fn generic() -> &'static CarrierProfile {
        &GENERIC
    }

    /// First product label whose keyword appears in subject or body.
    pub fn product_label(&self, email: &PreparedEmail<'_>) -> Option<&'static str> {
        self.products
            .iter()
            .find(|p| p.keyword.is_match(&email.email.subject) || p.keyword.is_match(&email.text))
            .map(|p| p.label)
    }
}

// ── Shared fragments ────────────────────────────────────────────────

const NAME: &str = r"([A-ZÀ-Ý][\p{L}'\-]+(?:[ \t]+[A-ZÀ-Ý][\p{L}'\-]+){0,2})";
/// Up to three lines following a keyword.
const LINES: &str = r"([^\n]{3,120}(?:\n[^\n]{2,120}){0,2})";
/// Short snippet after a deadline keyword.
const SNIPPET: &str = r"([^\n]{4,60})";

fn keyword_then(keywords: &str, capture: &str) -> String {
    format!(r"(?i:{keywords})\s*(?:n°|no\.?|#|number|numéro)?\s*[:#]?\s*{capture}")
}

fn generic_profile() -> CarrierProfile {
    CarrierProfile {
        tracking: RuleSet::new(vec![
            FieldRule::text(&keyword_then(
                r"n°\s*de\s*suivi|num[ée]ro\s*de\s*suivi|num[ée]ro\s*de\s*colis|tracking\s*(?:number|id)?|suivi|parcel\s*(?:number|id)|n[úu]mero\s*de\s*seguimiento|sendungsnummer",
                r"([A-Z0-9]{8,34}|\d{2,6}(?: \d{2,6}){2,8})\b",
            )),
            FieldRule::subject(&keyword_then(
                r"suivi|tracking|colis|parcel|package",
                r"([A-Z0-9]{8,34})\b",
            ))
            .weak(),
        ]),
        deadline: RuleSet::new(vec![FieldRule::text(&format!(
            r"(?i:à retirer avant le|a retirer avant le|retirer avant le|disponible jusqu'au|disponible jusqu’au|jusqu'au|jusqu’au|avant le|limite de retrait|pick up by|collect by|before|until|hasta el)\s*:?\s*{SNIPPET}"
        ))]),
        recipient: RuleSet::new(vec![
            FieldRule::text(&format!(
                r"(?i:destinataire|recipient|livraison pour|ship to|deliver to)\s*:?\s*{NAME}"
            )),
            FieldRule::text(&format!(
                r"(?m)^\s*(?i:bonjour|hello|hi|hola|dear|cher|chère)[ \t]+{NAME}\s*[,!]"
            ))
            .weak(),
        ]),
        sender: RuleSet::new(vec![FieldRule::text(
            r"(?i:expéditeur|expediteur|envoyé par|envoye par|sent by|shipper|vendeur|seller|from)\s*:\s*([^\n]{2,60})",
        )]),
        description: RuleSet::new(vec![
            FieldRule::text(r"(?i)(?:poids|weight|peso)\s*:?\s*(\d+(?:[.,]\d+)?\s*(?:kg|g|lbs?))\b"),
            FieldRule::text(r"(?i)\b(\d{1,3}\s+(?:colis|packages?|parcels?|articles?|items?))\b"),
        ]),
        ..CarrierProfile::empty(Carrier::Other)
    }
}

// ── Carrier profiles ────────────────────────────────────────────────

fn vinted_go_profile() -> CarrierProfile {
    CarrierProfile {
        tracking: RuleSet::new(vec![
            FieldRule::subject(r"#\s*(\d{16,20})\b"),
            FieldRule::text(&keyword_then(r"suivi|colis|envoi", r"(\d{16,20})\b")),
        ]),
        pickup_code: RuleSet::new(vec![FieldRule::text(
            r"(?i:code suivant|code de retrait|ton code)\s*:?[\s*]*([A-Z0-9]{4,10})\b",
        )]),
        deadline: RuleSet::new(vec![FieldRule::text(&format!(
            r"(?i:à retirer avant le|a retirer avant le|retire-le avant le|avant le)\s*:?\s*{SNIPPET}"
        ))]),
        recipient: RuleSet::new(vec![FieldRule::text(&format!(r"(?m)^\s*(?i:bonjour)[ \t]+{NAME}"))]),
        default_marketplace: Some("vinted"),
        ..CarrierProfile::empty(Carrier::VintedGo)
    }
}

fn mondial_relay_profile() -> CarrierProfile {
    CarrierProfile {
        tracking: RuleSet::new(vec![
            FieldRule::text(r"\b(VD\d{10,12})\b"),
            FieldRule::text(r"(?i:vinted)\s+(\d{8,12})\b"),
            FieldRule::text(&keyword_then(
                r"référence|reference|n° d'envoi|numéro d'expédition|numéro de colis",
                r"([A-Z]{0,3}\d{8,12})\b",
            )),
        ]),
        pickup_code: RuleSet::new(vec![FieldRule::text(r"(?i:code de retrait)\D{0,20}(\d{6})\b")]),
        address: RuleSet::new(vec![FieldRule::text(&format!(
            r"(?i:point relais|locker|consigne)\s*:?\s*\n?{LINES}"
        ))]),
        products: vec![
            ProductRule::new(r"(?i)\blocker\b|\bconsigne\b", "Mondial Relay Locker"),
            ProductRule::new(r"(?i)point relais", "Mondial Relay Point Relais"),
        ],
        default_marketplace: Some("vinted"),
        ..CarrierProfile::empty(Carrier::MondialRelay)
    }
}

fn relais_colis_profile() -> CarrierProfile {
    CarrierProfile {
        tracking: RuleSet::new(vec![FieldRule::text(r"\b(VD\d{10})\b")]),
        qr_code: RuleSet::new(vec![FieldRule::html(
            r#"(?i)<img[^>]+src\s*=\s*["']([^"']*qrcodeencrypt[^"']*)["']"#,
        )]),
        merchant: RuleSet::new(vec![FieldRule::html(
            r#"(?i)<font[^>]*color\s*=\s*["']#ef354a["'][^>]*>\s*([^<]{2,40}?)\s*</font>"#,
        )]),
        deadline: RuleSet::new(vec![FieldRule::text(&format!(
            r"(?i:jusqu'au|jusqu’au)\s*:?\s*{SNIPPET}"
        ))]),
        ..CarrierProfile::empty(Carrier::RelaisColis)
    }
}

fn chronopost_profile() -> CarrierProfile {
    CarrierProfile {
        tracking: RuleSet::new(vec![
            FieldRule::text(r"\b(X[WS]\d{9,11}[A-Z]{2})\b"),
            FieldRule::text(&keyword_then(
                r"colis|suivi|envoi|numéro de colis",
                r"([A-Z]{2}\d{9}[A-Z]{2})\b",
            )),
            FieldRule::text(&keyword_then(r"colis|suivi|envoi", r"(\d{13})\b")),
        ]),
        pickup_code: RuleSet::new(vec![FieldRule::text(r"(?i:code de retrait)\D{0,20}(\d{6})\b")]),
        address: RuleSet::new(vec![FieldRule::text(&format!(
            r"(?i:votre relais pickup|relais pickup|agence chronopost)\s*:?\s*\n?{LINES}"
        ))]),
        recipient: RuleSet::new(vec![FieldRule::text(r"(?m)^\s*(?i:bonjour)[ \t]+([^\n!,]{2,40}?)\s*!")]),
        products: vec![
            ProductRule::new(r"(?i)chrono\s*relais|relais pickup", "Chrono Relais"),
            ProductRule::new(r"(?i)chrono\s*13", "Chrono 13"),
            ProductRule::new(r"(?i)chrono\s*18", "Chrono 18"),
            ProductRule::new(r"(?i)chrono\s*classic", "Chrono Classic"),
        ],
        ..CarrierProfile::empty(Carrier::Chronopost)
    }
}

fn colissimo_profile(carrier: Carrier) -> CarrierProfile {
    CarrierProfile {
        tracking: RuleSet::new(vec![
            FieldRule::text(&keyword_then(r"suivi|colis|envoi|n°", r"([6-8][AV]\d{11})\b")),
            FieldRule::text(r"\b([6-8][AV]\d{11})\b").weak(),
            FieldRule::text(r"\b([RL][A-Z]\d{9}[A-Z]{2})\b").weak(),
        ]),
        address: RuleSet::new(vec![FieldRule::text(&format!(
            r"(?i:point retrait|adresse du point|retirez votre colis à|retirez votre colis au|bureau de poste)\s*:?\s*\n?{LINES}"
        ))]),
        deadline: RuleSet::new(vec![FieldRule::text(&format!(
            r"(?i:disponible jusqu'au|disponible jusqu’au|limite de retrait|jusqu'au|jusqu’au|avant le)\s*:?\s*{SNIPPET}"
        ))]),
        recipient: RuleSet::new(vec![
            FieldRule::text(&format!(r"(?i:destinataire|livraison pour)\s*:?\s*{NAME}")),
            FieldRule::text(&format!(r"(?m)^\s*(?i:bonjour|madame|monsieur)[ \t]+{NAME}")).weak(),
        ]),
        sender: RuleSet::new(vec![FieldRule::text(
            r"(?i:expéditeur|expediteur|envoyé par|envoye par)\s*:?\s*([^\n]{2,60})",
        )]),
        products: vec![
            ProductRule::new(r"(?i)lettre\s+suivie", "Lettre Suivie"),
            ProductRule::new(r"(?i)colissimo\s+international|\binternational\b", "Colissimo International"),
            ProductRule::new(r"(?i)point\s+retrait|bureau\s+de\s+poste", "Colissimo Point Retrait"),
        ],
        ..CarrierProfile::empty(carrier)
    }
}

fn dhl_profile() -> CarrierProfile {
    let keywords = r"tracking|waybill|awb|shipment|sendung";
    CarrierProfile {
        tracking: RuleSet::new(vec![
            FieldRule::text(&keyword_then(keywords, r"(\d{10,11})\b")),
            FieldRule::text(&keyword_then(keywords, r"([A-Z]{2}\d{12,16})\b")),
        ]),
        address: RuleSet::new(vec![FieldRule::text(&format!(
            r"(?i:delivery address|adresse de livraison)\s*:?\s*\n?{LINES}"
        ))]),
        deadline: RuleSet::new(vec![FieldRule::text(&format!(
            r"(?i:estimated delivery|delivery by|livraison prévue le|livraison prevue le)(?:\s*date)?\s*:?\s*{SNIPPET}"
        ))]),
        recipient: RuleSet::new(vec![
            FieldRule::text(&format!(r"(?i:recipient|destinataire)\s*:?\s*{NAME}")),
            FieldRule::text(&format!(r"(?m)^\s*(?i:dear|hello|bonjour)[ \t]+{NAME}")).weak(),
        ]),
        sender: RuleSet::new(vec![FieldRule::text(
            r"(?i:sender|shipper|from|expéditeur)\s*:\s*([^\n]{2,60})",
        )]),
        products: vec![
            ProductRule::new(r"(?i)dhl\s+express", "DHL Express"),
            ProductRule::new(r"(?i)dhl\s+e-?commerce", "DHL eCommerce"),
            ProductRule::new(r"(?i)dhl\s+parcel", "DHL Parcel"),
        ],
        ..CarrierProfile::empty(Carrier::Dhl)
    }
}

fn ups_profile() -> CarrierProfile {
    CarrierProfile {
        tracking: RuleSet::new(vec![FieldRule::text(r"\b(1Z(?:[ \t]?[A-Z0-9]){16})\b")]),
        address: RuleSet::new(vec![FieldRule::text(&format!(
            r"(?i:delivery address|ship to address)\s*:?\s*\n?{LINES}"
        ))]),
        deadline: RuleSet::new(vec![FieldRule::text(&format!(
            r"(?i:scheduled delivery|estimated delivery)(?:\s*date)?\s*:?\s*{SNIPPET}"
        ))]),
        recipient: RuleSet::new(vec![
            FieldRule::text(&format!(r"(?i:ship to)\s*:?\s*{NAME}")),
            FieldRule::text(&format!(r"(?m)^\s*(?i:dear|hello)[ \t]+{NAME}")).weak(),
        ]),
        sender: RuleSet::new(vec![FieldRule::text(
            r"(?i:shipper|sent by|from)\s*:\s*([^\n]{2,60})",
        )]),
        order_number: RuleSet::new(vec![FieldRule::text(
            r"(?i:reference number|reference|order|invoice)\s*(?:number|no\.?|#)?\s*[:#]\s*([A-Z0-9][A-Z0-9-]{3,29})\b",
        )]),
        description: RuleSet::new(vec![FieldRule::text(
            r"(?i)\b(\d+(?:\.\d+)?\s*(?:lbs|lb|kg))\b",
        )]),
        products: vec![
            ProductRule::new(r"(?i)next\s+day|ups\s+express", "UPS Express"),
            ProductRule::new(r"(?i)2nd\s+day", "UPS 2nd Day Air"),
            ProductRule::new(r"(?i)ups\s+ground|\bground\b", "UPS Ground"),
            ProductRule::new(r"(?i)worldwide", "UPS Worldwide"),
        ],
        ..CarrierProfile::empty(Carrier::Ups)
    }
}

fn fedex_profile() -> CarrierProfile {
    CarrierProfile {
        tracking: RuleSet::new(vec![FieldRule::text(&keyword_then(
            r"tracking|suivi|shipment",
            r"(92\d{20}|\d{15}|[79]\d{11})\b",
        ))]),
        deadline: RuleSet::new(vec![FieldRule::text(&format!(
            r"(?i:scheduled delivery|estimated delivery|delivery date)\s*:?\s*{SNIPPET}"
        ))]),
        products: vec![
            ProductRule::new(r"(?i)international\s+priority", "FedEx International Priority"),
            ProductRule::new(r"(?i)fedex\s+ground", "FedEx Ground"),
            ProductRule::new(r"(?i)fedex\s+express", "FedEx Express"),
        ],
        ..CarrierProfile::empty(Carrier::Fedex)
    }
}

fn dpd_profile() -> CarrierProfile {
    CarrierProfile {
        tracking: RuleSet::new(vec![
            FieldRule::text(r"(?i)\b(GFFR\d{10,20})\b"),
            FieldRule::text(&keyword_then(r"colis|suivi|parcel", r"(\d{14})\b")),
        ]),
        products: vec![
            ProductRule::new(r"(?i)predict", "DPD Predict"),
            ProductRule::new(r"(?i)relais|pickup", "DPD Relais"),
        ],
        ..CarrierProfile::empty(Carrier::Dpd)
    }
}

fn gls_profile() -> CarrierProfile {
    CarrierProfile {
        tracking: RuleSet::new(vec![FieldRule::text(&keyword_then(
            r"colis|suivi|parcel|tracking",
            r"(\d{11,12}|[A-Z0-9]{8})\b",
        ))]),
        ..CarrierProfile::empty(Carrier::Gls)
    }
}

fn amazon_profile() -> CarrierProfile {
    CarrierProfile {
        tracking: RuleSet::new(vec![FieldRule::text(r"\b(TBA\d{9,12})\b")]),
        default_marketplace: Some("amazon"),
        ..CarrierProfile::empty(Carrier::AmazonLogistics)
    }
}

static GENERIC: LazyLock<CarrierProfile> = LazyLock::new(generic_profile);

static PROFILES: LazyLock<HashMap<Carrier, CarrierProfile>> = LazyLock::new(|| {
    [
        vinted_go_profile(),
        mondial_relay_profile(),
        relais_colis_profile(),
        chronopost_profile(),
        colissimo_profile(Carrier::Colissimo),
        colissimo_profile(Carrier::LaPoste),
        dhl_profile(),
        ups_profile(),
        fedex_profile(),
        dpd_profile(),
        gls_profile(),
        amazon_profile(),
    ]
    .into_iter()
    .map(|p| (p.carrier, p))
    .collect()
});
