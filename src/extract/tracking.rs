//! Tracking-number validation and the generic multi-format scanner.
//!
//! A carrier-specific candidate is accepted only when it matches the
//! carrier's format and, for UPS and S10 numbers, the check digit. The scanner is the
//! fallback used when no carrier rule produced a number: it tries a ranked
//! list of known formats over the whole text and grades each hit.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::plausibility::is_plausible_tracking;
use crate::carriers::Carrier;

/// Trim, uppercase and drop inner whitespace.
pub fn clean_tracking(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

// ── Checksums ───────────────────────────────────────────────────────

/// UPS check digit over the first 17 characters of a `1Z` number.
///
/// Characters 3..=17 are weighted: digits by value, letters by
/// `(ord - 63) mod 10`; odd offsets count double.
pub fn ups_check_digit(first17: &str) -> Option<char> {
    let bytes = first17.as_bytes();
    if bytes.len() != 17 {
        return None;
    }
    let mut sum: u32 = 0;
    for (i, &b) in bytes.iter().enumerate().skip(2) {
        let value = match b {
            b'0'..=b'9' => u32::from(b - b'0'),
            b'A'..=b'Z' => (u32::from(b) - 63) % 10,
            _ => return None,
        };
        sum += if i % 2 == 0 { value } else { value * 2 };
    }
    char::from_digit((10 - sum % 10) % 10, 10)
}

/// `true` for an 18-character `1Z` number whose last digit checks out.
pub fn is_valid_ups(tracking: &str) -> bool {
    UPS_FORMAT.is_match(tracking)
        && ups_check_digit(&tracking[..17]) == tracking[17..].chars().next()
}

/// UPU S10 check (`AA123456789FR`): mod-11 over the eight serial digits.
pub fn is_valid_s10(tracking: &str) -> bool {
    if !S10_FORMAT.is_match(tracking) {
        return false;
    }
    const WEIGHTS: [u32; 8] = [8, 6, 4, 2, 3, 5, 9, 7];
    let digits: Vec<u32> = tracking[2..11]
        .bytes()
        .map(|b| u32::from(b - b'0'))
        .collect();
    let sum: u32 = digits[..8].iter().zip(WEIGHTS).map(|(d, w)| d * w).sum();
    let check = match 11 - sum % 11 {
        10 => 0,
        11 => 5,
        c => c,
    };
    digits[8] == check
}

// ── Per-carrier validation ──────────────────────────────────────────

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

static UPS_FORMAT: LazyLock<Regex> = LazyLock::new(|| re(r"^1Z[A-Z0-9]{16}$"));
static S10_FORMAT: LazyLock<Regex> = LazyLock::new(|| re(r"^[A-Z]{2}\d{9}[A-Z]{2}$"));

type Checksum = fn(&str) -> bool;

/// One accepted shape for a carrier. A format with a checksum only accepts
/// numbers that pass it.
struct Format {
    regex: Regex,
    checksum: Option<Checksum>,
}

impl Format {
    fn accepts(&self, cleaned: &str) -> bool {
        self.regex.is_match(cleaned) && self.checksum.is_none_or(|check| check(cleaned))
    }
}

fn plain(pattern: &str) -> Format {
    Format {
        regex: re(pattern),
        checksum: None,
    }
}

fn checked(pattern: &str, checksum: Checksum) -> Format {
    Format {
        regex: re(pattern),
        checksum: Some(checksum),
    }
}

static CARRIER_FORMATS: LazyLock<HashMap<Carrier, Vec<Format>>> = LazyLock::new(|| {
    let colissimo = || {
        vec![
            plain(r"^[6-8][AV]\d{11}$"),
            checked(r"^[RL][A-Z]\d{9}[A-Z]{2}$", is_valid_s10),
        ]
    };
    HashMap::from([
        (Carrier::Ups, vec![checked(r"^1Z[A-Z0-9]{16}$", is_valid_ups)]),
        (
            Carrier::Fedex,
            vec![plain(r"^[79]\d{11}$"), plain(r"^\d{15}$"), plain(r"^92\d{20}$")],
        ),
        (
            Carrier::Dhl,
            vec![plain(r"^\d{10,11}$"), plain(r"^(GM|LX|RX|JD|JJ|JA)\d{12,16}$")],
        ),
        (Carrier::Colissimo, colissimo()),
        (Carrier::LaPoste, colissimo()),
        (
            Carrier::Chronopost,
            vec![
                plain(r"^\d{13}$"),
                plain(r"^X[WS]\d{9,11}[A-Z]{2}$"),
                checked(r"^[A-Z]{2}\d{9}[A-Z]{2}$", is_valid_s10),
            ],
        ),
        (Carrier::VintedGo, vec![plain(r"^\d{16,20}$")]),
        (
            Carrier::MondialRelay,
            vec![plain(r"^[A-Z]{1,3}\d{8,12}$"), plain(r"^\d{8,12}$")],
        ),
        (Carrier::RelaisColis, vec![plain(r"^VD\d{10}$")]),
        (Carrier::Dpd, vec![plain(r"^GFFR\d{10,20}$"), plain(r"^\d{14}$")]),
    ])
});

static GENERIC_FORMAT: LazyLock<Regex> = LazyLock::new(|| re(r"^[A-Z0-9]{8,30}$"));

/// Validate a candidate for a carrier. Returns the cleaned number on success.
///
/// UPS and S10 numbers must pass their check digit; carriers without a
/// dedicated format accept any plausible alphanumeric of eight characters
/// or more.
pub fn validate_tracking(candidate: &str, carrier: Carrier) -> Option<String> {
    let cleaned = clean_tracking(candidate);
    if !is_plausible_tracking(&cleaned) {
        return None;
    }
    let ok = match CARRIER_FORMATS.get(&carrier) {
        Some(formats) => formats.iter().any(|f| f.accepts(&cleaned)),
        None => GENERIC_FORMAT.is_match(&cleaned),
    };
    ok.then_some(cleaned)
}

// ── Generic scanner ─────────────────────────────────────────────────

/// How much a scanned candidate can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingConfidence {
    /// Format only.
    Low,
    /// Format plus a carrier mention nearby in the text.
    Medium,
    /// Checksum validated.
    High,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingCandidate {
    pub number: String,
    pub carrier: Carrier,
    pub confidence: TrackingConfidence,
}

struct TrackingFamily {
    regex: Regex,
    carrier: Carrier,
    /// Lowercase mentions that upgrade a format match to medium.
    context: &'static [&'static str],
    /// Bare digit runs are too ambiguous to keep without context.
    requires_context: bool,
    /// When present, passing it means high confidence and failing it drops the hit.
    checksum: Option<Checksum>,
}

static FAMILIES: LazyLock<Vec<TrackingFamily>> = LazyLock::new(|| {
    let family = |pattern: &str,
                  carrier: Carrier,
                  context: &'static [&'static str],
                  requires_context: bool,
                  checksum: Option<Checksum>| TrackingFamily {
        regex: re(pattern),
        carrier,
        context,
        requires_context,
        checksum,
    };
    vec![
        family(r"\b1Z[A-Z0-9]{16}\b", Carrier::Ups, &["ups"], false, Some(is_valid_ups)),
        family(r"\bX[WS]\d{9,11}[A-Z]{2}\b", Carrier::Chronopost, &["chronopost", "chrono"], false, None),
        family(
            r"\b[A-Z]{2}\d{9}[A-Z]{2}\b",
            Carrier::Colissimo,
            &["colissimo", "la poste", "laposte"],
            false,
            Some(is_valid_s10),
        ),
        family(r"\b[6-8][AV]\d{11}\b", Carrier::Colissimo, &["colissimo", "la poste", "laposte"], false, None),
        family(r"\bGFFR\d{10,20}\b", Carrier::Dpd, &["dpd", "gofo"], false, None),
        family(r"\bVD\d{10}\b", Carrier::RelaisColis, &["relais colis", "relaiscolis"], false, None),
        family(r"\b92\d{20}\b", Carrier::Fedex, &["fedex"], false, None),
        family(r"\b(?:GM|LX|RX|JD|JJ|JA)\d{12,16}\b", Carrier::Dhl, &["dhl"], false, None),
        family(r"\b\d{16,20}\b", Carrier::VintedGo, &["vinted"], true, None),
        family(r"\b\d{13}\b", Carrier::Chronopost, &["chronopost"], true, None),
        family(r"\b(?:[79]\d{11}|\d{15})\b", Carrier::Fedex, &["fedex"], true, None),
        family(r"\b[1-9]\d{9,10}\b", Carrier::Dhl, &["dhl"], true, None),
        family(r"\b\d{8,12}\b", Carrier::MondialRelay, &["mondial relay", "mondialrelay", "relais"], true, None),
    ]
});

/// Scan free text for tracking numbers of any known format.
///
/// Each distinct number is reported once, with the highest confidence any
/// family gave it, in order of first appearance among families.
pub fn scan_tracking_candidates(text: &str) -> Vec<TrackingCandidate> {
    let lower = text.to_lowercase();
    let mut out: Vec<TrackingCandidate> = Vec::new();

    for family in FAMILIES.iter() {
        let has_context = family.context.iter().any(|kw| lower.contains(kw));
        if family.requires_context && !has_context {
            continue;
        }
        for m in family.regex.find_iter(text) {
            let number = m.as_str().to_string();
            if !is_plausible_tracking(&number) {
                continue;
            }
            let confidence = match family.checksum {
                Some(check) if check(&number) => TrackingConfidence::High,
                Some(_) => continue,
                _ if has_context => TrackingConfidence::Medium,
                _ => TrackingConfidence::Low,
            };
            match out.iter_mut().find(|c| c.number == number) {
                Some(existing) if existing.confidence < confidence => {
                    existing.confidence = confidence;
                    existing.carrier = family.carrier;
                }
                Some(_) => {}
                None => out.push(TrackingCandidate {
                    number,
                    carrier: family.carrier,
                    confidence,
                }),
            }
        }
    }
    out
}

/// Highest-confidence candidate; ties go to the earlier (higher ranked) one.
pub fn best_tracking_candidate(text: &str) -> Option<TrackingCandidate> {
    scan_tracking_candidates(text)
        .into_iter()
        .fold(None, |best: Option<TrackingCandidate>, c| match best {
            Some(b) if b.confidence >= c.confidence => Some(b),
            _ => Some(c),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ups_check_digit_is_computed_over_positions_three_to_seventeen() {
        assert_eq!(ups_check_digit("1Z999AA1012345678"), Some('4'));
        assert!(is_valid_ups("1Z999AA10123456784"));
        assert!(!is_valid_ups("1Z999AA10123456785"));
        assert!(!is_valid_ups("1Z999AA10123456780"));
        assert!(is_valid_ups("1Z12345E6605272234"));
    }

    #[test]
    fn ups_candidates_need_a_valid_check_digit() {
        assert_eq!(
            validate_tracking("1z999aa1 0123456784", Carrier::Ups).as_deref(),
            Some("1Z999AA10123456784")
        );
        assert_eq!(validate_tracking("1Z999AA10123456780", Carrier::Ups), None);
    }

    #[test]
    fn s10_check_digit() {
        assert!(is_valid_s10("RR123456785FR"));
        assert!(is_valid_s10("LA987654326FR"));
        assert!(!is_valid_s10("LA987654321FR"));
    }

    #[test]
    fn s10_numbers_need_a_valid_check_digit() {
        assert_eq!(
            validate_tracking("la987654326fr", Carrier::Colissimo).as_deref(),
            Some("LA987654326FR")
        );
        assert!(validate_tracking("LA987654321FR", Carrier::Colissimo).is_none());
        assert!(validate_tracking("LA987654321FR", Carrier::LaPoste).is_none());
        assert!(validate_tracking("RR123456785FR", Carrier::Chronopost).is_some());
        assert!(validate_tracking("RR123456784FR", Carrier::Chronopost).is_none());
    }

    #[test]
    fn scanner_drops_failed_s10_checksums() {
        assert!(scan_tracking_candidates("Votre colis Colissimo LA987654321FR").is_empty());
        let hits = scan_tracking_candidates("Votre colis Colissimo LA987654326FR");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].confidence, TrackingConfidence::High);
    }

    #[test]
    fn carrier_formats() {
        assert!(validate_tracking("6A12345678901", Carrier::Colissimo).is_some());
        assert!(validate_tracking("6A12345678901", Carrier::LaPoste).is_some());
        assert!(validate_tracking("6B12345678901", Carrier::Colissimo).is_none());
        assert!(validate_tracking("XW123456789TS", Carrier::Chronopost).is_some());
        assert!(validate_tracking("VD1029384756", Carrier::RelaisColis).is_some());
        assert!(validate_tracking("GFFR2048576193", Carrier::Dpd).is_some());
        assert!(validate_tracking("771234567890", Carrier::Fedex).is_some());
        assert!(validate_tracking("571234567890", Carrier::Fedex).is_none());
        assert!(validate_tracking("JD014600003828392018", Carrier::Dhl).is_none());
        assert!(validate_tracking("JD0146000038283920", Carrier::Dhl).is_some());
        assert!(validate_tracking("MR48213957", Carrier::MondialRelay).is_some());
        assert!(validate_tracking("AB12CD34", Carrier::Gls).is_some());
        assert!(validate_tracking("AB12", Carrier::Gls).is_none());
    }

    #[test]
    fn implausible_numbers_are_rejected_for_every_carrier() {
        assert!(validate_tracking("0000000000", Carrier::Dhl).is_none());
        assert!(validate_tracking("12345678", Carrier::MondialRelay).is_none());
    }

    #[test]
    fn scanner_grades_candidates() {
        let text = "Votre colis 6A12345678901 est en route. Colissimo.";
        let best = best_tracking_candidate(text).unwrap();
        assert_eq!(best.number, "6A12345678901");
        assert_eq!(best.carrier, Carrier::Colissimo);
        assert_eq!(best.confidence, TrackingConfidence::Medium);
    }

    #[test]
    fn scanner_prefers_checksum_validated_numbers() {
        let text = "Ref XW123456789TS, UPS 1Z999AA10123456784";
        let best = best_tracking_candidate(text).unwrap();
        assert_eq!(best.number, "1Z999AA10123456784");
        assert_eq!(best.confidence, TrackingConfidence::High);
    }

    #[test]
    fn scanner_drops_failed_ups_checksums_and_bare_digits() {
        assert!(scan_tracking_candidates("1Z999AA10123456780").is_empty());
        // no carrier mention: bare digit runs are ignored
        assert!(scan_tracking_candidates("Order 48213957 total").is_empty());
        let hits = scan_tracking_candidates("Mondial Relay colis 48213957");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].carrier, Carrier::MondialRelay);
    }

    #[test]
    fn duplicates_are_reported_once() {
        let hits = scan_tracking_candidates("VD1029384756 ... VD1029384756");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].confidence, TrackingConfidence::Low);
    }
}
