//! Marketplace (platform) detection.
//!
//! Sender domain first, then word-boundary mentions in subject and body,
//! then the "confié par X" phrasing La Poste uses for parcels handed over by
//! a merchant.

use std::sync::LazyLock;

use regex::Regex;

use crate::email::types::sender_domain;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

/// Sender domain → marketplace. Subdomains match their parent entry.
const DOMAIN_MAP: &[(&str, &str)] = &[
    ("vinted.fr", "vinted"),
    ("vinted.com", "vinted"),
    ("vinted.de", "vinted"),
    ("vinted.es", "vinted"),
    ("vinted.it", "vinted"),
    ("vinted.be", "vinted"),
    ("vinted.nl", "vinted"),
    ("vinted.pl", "vinted"),
    ("vintedgo.com", "vinted"),
    ("leboncoin.fr", "leboncoin"),
    ("vestiairecollective.com", "vestiaire_collective"),
    ("amazon.fr", "amazon"),
    ("amazon.com", "amazon"),
    ("amazon.de", "amazon"),
    ("amazon.es", "amazon"),
    ("amazon.it", "amazon"),
    ("ebay.fr", "ebay"),
    ("ebay.com", "ebay"),
    ("ebay.de", "ebay"),
    ("ebay.co.uk", "ebay"),
    ("depop.com", "depop"),
    ("wallapop.com", "wallapop"),
    ("shopify.com", "shopify"),
    ("sheinnotice.com", "shein"),
    ("shein.com", "shein"),
    ("temu.com", "temu"),
    ("showroomprive.com", "showroomprive"),
    ("cdiscount.com", "cdiscount"),
    ("fnac.com", "fnac"),
    ("rakuten.com", "rakuten"),
    ("zalando.fr", "zalando"),
];

static BODY_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("vinted", re(r"(?i)\bvinted(?:go)?\b")),
        ("leboncoin", re(r"(?i)\ble ?bon ?coin\b")),
        ("vestiaire_collective", re(r"(?i)\bvestiaire collective\b")),
        ("amazon", re(r"(?i)\bamazon\b")),
        ("ebay", re(r"(?i)\bebay\b")),
        ("depop", re(r"(?i)\bdepop\b")),
        ("wallapop", re(r"(?i)\bwallapop\b")),
        ("shein", re(r"(?i)\bshein\b")),
        ("temu", re(r"(?i)\btemu\b")),
        ("cdiscount", re(r"(?i)\bcdiscount\b")),
        ("fnac", re(r"(?i)\bfnac\b")),
        ("zalando", re(r"(?i)\bzalando\b")),
        ("rakuten", re(r"(?i)\brakuten\b")),
    ]
});

static CONFIE_PAR: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)confié\s+par\s+([A-Z][A-Za-z0-9'&\- ]{1,25})"));

/// Words that end the merchant name in "confié par X sera livré ...".
const STOP_WORDS: &[&str] = &[
    "sera", "est", "a", "va", "qui", "pour", "votre", "le", "la", "les", "un", "une", "de", "du",
    "des", "en", "bien",
];
/// Fragments that mean the capture ran into the sentence.
const REJECT_FRAGMENTS: &[&str] = &["livr", "expéd", "envoy", "dispon"];

/// Detect the marketplace a message relates to.
pub fn detect_marketplace(sender: &str, subject: &str, body: &str) -> Option<String> {
    if let Some(domain) = sender_domain(sender) {
        let hit = DOMAIN_MAP
            .iter()
            .find(|(d, _)| domain == *d || domain.ends_with(&format!(".{d}")));
        if let Some((_, marketplace)) = hit {
            return Some((*marketplace).to_string());
        }
    }

    let combined = format!("{subject} {body}");
    if let Some((marketplace, _)) = BODY_PATTERNS.iter().find(|(_, p)| p.is_match(&combined)) {
        return Some((*marketplace).to_string());
    }

    merchant_from_confie_par(body)
}

fn merchant_from_confie_par(body: &str) -> Option<String> {
    let caps = CONFIE_PAR.captures(body)?;
    let words: Vec<&str> = caps[1]
        .split_whitespace()
        .take_while(|w| !STOP_WORDS.contains(&w.to_lowercase().as_str()))
        .collect();
    let name = words.join(" ");
    let lower = name.to_lowercase();
    if name.chars().count() < 2 || REJECT_FRAGMENTS.iter().any(|f| lower.contains(f)) {
        return None;
    }
    Some(name)
}
