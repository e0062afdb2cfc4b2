//! Lifecycle (email type) and source classification.
//!
//! The email-type cascade runs in a fixed priority order; each rule has a
//! fixed confidence. Promotional mail is excluded first and needs two
//! corroborating signals. The source classifier separately tags the mail as
//! coming from a platform (marketplace) or a carrier.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::email::html::collapse_whitespace;

/// The 11-state email taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailType {
    OrderConfirmed,
    LabelCreated,
    Shipped,
    InTransit,
    OutForDelivery,
    Delivered,
    PickupReady,
    Returned,
    Info,
    Promo,
    Unknown,
}

impl EmailType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderConfirmed => "order_confirmed",
            Self::LabelCreated => "label_created",
            Self::Shipped => "shipped",
            Self::InTransit => "in_transit",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::PickupReady => "pickup_ready",
            Self::Returned => "returned",
            Self::Info => "info",
            Self::Promo => "promo",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a wire name; anything unrecognised is `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "order_confirmed" => Self::OrderConfirmed,
            "label_created" => Self::LabelCreated,
            "shipped" => Self::Shipped,
            "in_transit" => Self::InTransit,
            "out_for_delivery" => Self::OutForDelivery,
            "delivered" => Self::Delivered,
            "pickup_ready" => Self::PickupReady,
            "returned" => Self::Returned,
            "info" => Self::Info,
            "promo" => Self::Promo,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for EmailType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who sent the mail: the marketplace, the carrier, or neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Platform,
    Carrier,
    Unknown,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::Carrier => "carrier",
            Self::Unknown => "unknown",
        }
    }
}

/// Result of the lifecycle + source classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailClassification {
    pub email_type: EmailType,
    pub source_type: SourceType,
    pub source_name: Option<String>,
    /// Rule confidence, +0.1 when the source is known, capped at 1.0.
    pub confidence: f32,
}

// ── Email-type rules ────────────────────────────────────────────────

struct EmailTypeRule {
    email_type: EmailType,
    patterns: Vec<Regex>,
    confidence: f32,
}

fn rule(email_type: EmailType, confidence: f32, patterns: &[&str]) -> EmailTypeRule {
    EmailTypeRule {
        email_type,
        patterns: patterns
            .iter()
            .map(|p| Regex::new(&format!("(?i){p}")).unwrap())
            .collect(),
        confidence,
    }
}

pub(crate) const PROMO_SIGNALS: &[&str] = &[
    "unsubscribe",
    "se désabonner",
    "désinscrire",
    "newsletter",
    "offre spéciale",
    "special offer",
    "promotion",
    "% off",
    "% de réduction",
    "soldes",
    "vente flash",
    "flash sale",
    "code promo",
    "coupon",
    "ne manquez pas",
    "don't miss",
];

const INFO_SIGNALS: &[&str] = &["tracking", "suivi", "colis", "livraison", "shipment", "parcel"];

/// Cascade after the promo exclusion, in priority order.
static EMAIL_TYPE_RULES: LazyLock<Vec<EmailTypeRule>> = LazyLock::new(|| {
    vec![
        rule(
            EmailType::PickupReady,
            0.90,
            &[
                r"(?:vous attend|est arrivé|est disponible).{0,80}(?:point|relais|relay|consigne|locker)",
                r"(?:ready|prêt).{0,40}(?:pickup|retrait|collect)",
                r"(?:retirer|récupérer).{0,20}(?:votre|ton|your).{0,20}(?:colis|parcel)",
                r"mis à disposition|available for collection",
                r"en attente de retrait|awaiting collection",
            ],
        ),
        rule(
            EmailType::Delivered,
            0.88,
            &[
                r"(?:a été|has been).{0,40}(?:livré|delivered)",
                r"(?:livraison|delivery).{0,40}(?:effectuée|completed|confirmée)",
                r"colis.{0,40}(?:livré|remis|distribué)",
                r"(?:successfully|bien)\s+(?:delivered|livré)",
                r"signé par|signed by",
            ],
        ),
        rule(
            EmailType::Returned,
            0.88,
            &[
                r"retourné|returned|renvoyé",
                r"return.{0,40}(?:to sender|à l'expéditeur)",
                r"non retiré|not collected|non réclamé",
            ],
        ),
        rule(
            EmailType::OutForDelivery,
            0.88,
            &[
                r"en cours de livraison|out for delivery",
                r"en tournée|on its way to you",
                r"(?:sera livré|will be delivered).{0,40}(?:aujourd'hui|today)",
                r"(?:livreur|driver).{0,40}(?:en route|on the way)",
            ],
        ),
        rule(
            EmailType::InTransit,
            0.85,
            &[
                r"en transit|in transit",
                r"en cours d'acheminement|being transported",
                r"en cours de transport",
            ],
        ),
        rule(
            EmailType::Shipped,
            0.85,
            &[
                r"(?:a été|has been).{0,40}(?:expédié|shipped|envoyé|dispatched)",
                r"(?:votre|your).{0,40}(?:colis|parcel|commande|order).{0,40}(?:en route|on the way)",
                r"pris en charge|picked up by carrier",
                r"confié à|handed to",
            ],
        ),
        rule(
            EmailType::LabelCreated,
            0.88,
            &[
                r"(?:étiquette|label).{0,40}(?:créée|created|générée|generated)",
                r"(?:imprimer|print).{0,40}(?:étiquette|label|bordereau)",
                r"(?:télécharger|download).{0,40}(?:bordereau|label|étiquette)",
                r"votre étiquette|your label",
            ],
        ),
        rule(
            EmailType::OrderConfirmed,
            0.82,
            &[
                r"(?:commande|order).{0,40}(?:confirmée|confirmed)",
                r"(?:achat|purchase).{0,40}(?:confirmé|confirmed)",
                r"(?:paiement|payment).{0,40}(?:reçu|received|accepté|accepted)",
                r"merci pour votre achat|thank you for your purchase",
                r"article vendu|item sold",
            ],
        ),
    ]
});

/// Number of promotional signals in lowercase text.
pub(crate) fn promo_signal_count(lower: &str) -> usize {
    PROMO_SIGNALS.iter().filter(|s| lower.contains(*s)).count()
}

/// Classify the lifecycle type of a message. Returns the type and the
/// fixed confidence of the rule that matched.
pub fn classify_email_type(subject: &str, body: &str) -> (EmailType, f32) {
    let combined = collapse_whitespace(&format!("{subject} {body}"))
        .to_lowercase()
        .replace('’', "'");

    if promo_signal_count(&combined) >= 2 {
        return (EmailType::Promo, 0.90);
    }

    for rule in EMAIL_TYPE_RULES.iter() {
        if rule.patterns.iter().any(|p| p.is_match(&combined)) {
            return (rule.email_type, rule.confidence);
        }
    }

    let info_hits = INFO_SIGNALS.iter().filter(|s| combined.contains(*s)).count();
    if info_hits >= 2 {
        return (EmailType::Info, 0.60);
    }
    (EmailType::Unknown, 0.30)
}

// ── Source classifier ───────────────────────────────────────────────

const PLATFORM_KEYWORDS: &[(&[&str], &str)] = &[
    (&["vinted"], "vinted"),
    (&["leboncoin"], "leboncoin"),
    (&["vestiaire-collective", "vestiairecollective"], "vestiaire_collective"),
    (&["amazon"], "amazon"),
    (&["ebay"], "ebay"),
    (&["depop"], "depop"),
    (&["wallapop"], "wallapop"),
    (&["shopify"], "shopify"),
    (&["cdiscount"], "cdiscount"),
    (&["fnac"], "fnac"),
    (&["aliexpress"], "aliexpress"),
];

const CARRIER_KEYWORDS: &[(&[&str], &str)] = &[
    (&["colissimo", "laposte"], "colissimo"),
    (&["chronopost"], "chronopost"),
    (&["mondial-relay", "mondialrelay"], "mondial_relay"),
    (&["relais-colis", "relaiscolis"], "relais_colis"),
    (&["dhl"], "dhl"),
    (&["ups.com", "ups "], "ups"),
    (&["fedex"], "fedex"),
    (&["dpd"], "dpd"),
    (&["gls"], "gls"),
    (&["colis-prive", "colisprive"], "colis_prive"),
];

fn lookup(table: &[(&[&str], &'static str)], haystack: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|kw| haystack.contains(kw)))
        .map(|(_, name)| *name)
}

/// Tag the source of a message. Platform keywords are checked in sender
/// and subject; carrier keywords in the sender, then in the subject as a
/// lower-trust fallback.
pub fn classify_source(sender: &str, subject: &str) -> (SourceType, Option<String>) {
    let sender = sender.to_lowercase();
    let subject = subject.to_lowercase();

    if let Some(name) = lookup(PLATFORM_KEYWORDS, &sender).or_else(|| lookup(PLATFORM_KEYWORDS, &subject)) {
        return (SourceType::Platform, Some(name.to_string()));
    }
    if let Some(name) = lookup(CARRIER_KEYWORDS, &sender) {
        return (SourceType::Carrier, Some(name.to_string()));
    }
    if let Some(name) = lookup(CARRIER_KEYWORDS, &subject) {
        return (SourceType::Carrier, Some(name.to_string()));
    }
    (SourceType::Unknown, None)
}

/// Email type and source together, with the combined confidence.
pub fn classify_email(sender: &str, subject: &str, body: &str) -> EmailClassification {
    let (email_type, type_confidence) = classify_email_type(subject, body);
    let (source_type, source_name) = classify_source(sender, subject);
    let confidence = if source_type == SourceType::Unknown {
        type_confidence
    } else {
        (type_confidence + 0.1).min(1.0)
    };

    debug!(
        email_type = %email_type,
        source_type = source_type.as_str(),
        source = source_name.as_deref().unwrap_or("-"),
        confidence,
        "Email classified"
    );

    EmailClassification {
        email_type,
        source_type,
        source_name,
        confidence,
    }
}
