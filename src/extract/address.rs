//! Pickup/delivery address extraction.
//!
//! Strategies run in order and the first candidate that passes
//! [`is_address_complete`] wins:
//!
//! 1. structured markup (labelled sections, relay blocks, table cells,
//!    address-classed divs)
//! 2. street + postal code + locality over the flattened text
//! 3. a window after pickup-location phrases
//! 4. backwards from a bare postal code

use std::sync::LazyLock;

use regex::Regex;

use crate::email::html::{collapse_whitespace, strip_html, to_plain_text};

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

const STREET_TYPES: &str = "rue|avenue|av\\.|boulevard|bd|route|place|chemin|allée|allee|impasse|passage|cours|quai|voie|square|parvis|street|road";

static LABELLED_SECTION: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?is)ADRESSE\s*:?\s*</(?:strong|b)>(.{10,600}?\b\d{5}\b[^<]{0,60})")
});
static RELAY_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?is)(?:point\s*relais|relais\s*colis|bureau\s*de\s*poste|point\s*retrait|relais\s*pickup|relais\s*particulier)(.{0,500})")
});
static TABLE_ROW: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?is)<t[dh][^>]*>[^<]*(?:point\s*relais|bureau\s*de\s*poste|point\s*retrait|adresse)[^<]*</t[dh]>\s*<t[dh][^>]*>(.{10,300}?)</t[dh]>")
});
static ADDRESS_DIV: LazyLock<Regex> = LazyLock::new(|| {
    re(r#"(?is)<div[^>]*(?:class|id)=["'][^"']*(?:address|adresse|relay|relais|pickup)[^"']*["'][^>]*>(.{20,400}?)</div>"#)
});
static STREET_LINE: LazyLock<Regex> = LazyLock::new(|| {
    re(&format!(
        r"(?i)\b(\d{{1,4}}(?:\s*(?:bis|ter))?[\s,]+(?:{STREET_TYPES})\s+[\p{{L}}\d\s'’.-]{{3,60}}?[\s,]+\d{{5}}\s+[\p{{L}}][\p{{L}}\s'-]{{1,40}})"
    ))
});
static POSTAL_IN_WINDOW: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?s)^[\s:,\-–]*(.{5,180}?\b\d{5}\b[ \t]*\p{L}[\p{L}\d '\-]{1,40})"));
static POSTAL_CODE: LazyLock<Regex> = LazyLock::new(|| re(r"\b(\d{5})\b"));
static CITY_AFTER_POSTAL: LazyLock<Regex> =
    LazyLock::new(|| re(r"^[ \t]*(\p{L}[\p{L}\d '\-]{1,40})"));
static POSTAL_LIKE: LazyLock<Regex> = LazyLock::new(|| re(r"\d{4,6}"));
static ADDRESS_CONTENT: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\d+\s|rue|avenue|boulevard|place|chemin|allée|bureau|shop|relais|route|impasse|passage|résidence|lot|cours|quai|square|voie|parvis|zone|centre|tabac|pressing|agence|poste|carrefour|leclerc|intermarch|street|road")
});
static VENUE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\d+\s|rue|avenue|boulevard|route|place|chemin|allée|impasse|passage|cours|quai|voie|square|parvis|zone|centre|relais|bureau|tabac|pressing|carrefour|super u|leclerc|intermarch|lidl")
});
/// Registry abbreviations are matched case-sensitively so street names
/// containing "sa" or "rcs" are not rejected.
static LEGAL_ABBREVIATIONS: LazyLock<Regex> =
    LazyLock::new(|| re(r"\b(?:RCS|SIRET|SIREN|SAS|SARL|SA|TVA)\b"));
static LEGAL_PHRASES: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)capital de|mentions légales|legal notice|privacy policy|politique de confidentialité|se désabonner|désinscri|unsubscribe|opt-out|©|copyright|all rights reserved|tous droits réservés")
});
static UI_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)voir sur la carte|compléter mon adresse|modifier la date|choisir un point|vous remercie de votre confiance|en cas d|cliquez ici|suivre mon colis")
});

const CONTEXT_KEYWORDS: &[&str] = &[
    "point relais",
    "point retrait",
    "point de retrait",
    "adresse du point",
    "lieu de retrait",
    "relais colis",
    "relais pickup",
    "relais particulier",
    "bureau de poste",
    "agence chronopost",
    "consigne",
    "retirez votre colis",
    "retirer votre colis",
    "disponible au",
    "disponible chez",
    "disponible dans",
    "vous attend au",
    "vous attend chez",
    "votre colis vous attend",
    "récupérer votre colis",
    "adresse de livraison",
    "livré à",
    "pickup location",
    "collection point",
    "delivery address",
];

/// Extract the most likely pickup or delivery address from a body.
pub fn extract_address(body: &str) -> Option<String> {
    let text = to_plain_text(body);
    let strategies: [&dyn Fn() -> Option<String>; 4] = [
        &|| from_structured_markup(body),
        &|| from_street_pattern(&text),
        &|| from_keyword_context(&text),
        &|| from_postal_code(&text),
    ];
    strategies
        .iter()
        .filter_map(|strategy| strategy())
        .map(|candidate| clean_address(&candidate))
        .find(|candidate| is_address_complete(candidate))
}

/// Acceptance test for an address candidate.
pub fn is_address_complete(address: &str) -> bool {
    let len = address.chars().count();
    (15..=250).contains(&len)
        && POSTAL_LIKE.is_match(address)
        && ADDRESS_CONTENT.is_match(address)
        && !is_legal_noise(address)
        && !UI_TEXT.is_match(address)
}

fn is_legal_noise(text: &str) -> bool {
    LEGAL_ABBREVIATIONS.is_match(text) || LEGAL_PHRASES.is_match(text)
}

/// Join lines with ", " and collapse whitespace.
fn clean_address(raw: &str) -> String {
    let joined = raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    collapse_whitespace(&joined)
        .trim_matches(|c: char| c == ',' || c == ':' || c.is_whitespace())
        .replace(" ,", ",")
        .replace(",,", ",")
}

// ── Strategy 1: structured markup ───────────────────────────────────

fn from_structured_markup(html: &str) -> Option<String> {
    if let Some(caps) = LABELLED_SECTION.captures(html) {
        let section = strip_html(&caps[1]);
        if POSTAL_CODE.is_match(&section) {
            return Some(section);
        }
    }

    if let Some(caps) = RELAY_BLOCK.captures(html) {
        // first three text segments after the keyword, ending on the postal line
        let block = strip_html(&caps[1]);
        let mut lines = Vec::new();
        for line in block.lines().map(str::trim).filter(|l| l.len() >= 3) {
            lines.push(line);
            if POSTAL_CODE.is_match(line) {
                if lines.len() <= 3 {
                    return Some(lines.join("\n"));
                }
                break;
            }
            if lines.len() >= 3 {
                break;
            }
        }
    }

    if let Some(caps) = TABLE_ROW.captures(html) {
        let cell = strip_html(&caps[1]);
        if POSTAL_CODE.is_match(&cell) {
            return Some(cell);
        }
    }

    ADDRESS_DIV
        .captures(html)
        .map(|caps| strip_html(&caps[1]))
        .filter(|s| POSTAL_CODE.is_match(s))
}

// ── Strategy 2: positional street pattern ───────────────────────────

fn from_street_pattern(text: &str) -> Option<String> {
    let flat = collapse_whitespace(text);
    STREET_LINE
        .captures(&flat)
        .map(|caps| caps[1].trim().to_string())
}

// ── Strategy 3: keyword context window ──────────────────────────────

fn from_keyword_context(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    for keyword in CONTEXT_KEYWORDS {
        let Some(pos) = lower.find(keyword) else {
            continue;
        };
        // lowercasing can shift byte offsets for a few characters; map back safely
        let start = pos + keyword.len();
        let Some(after) = text.get(start..).or_else(|| lower.get(start..)) else {
            continue;
        };
        let window: String = after.chars().take(400).collect();
        if let Some(caps) = POSTAL_IN_WINDOW.captures(&window) {
            let candidate = caps[1].trim();
            if candidate.chars().count() >= 15 {
                return Some(candidate.to_string());
            }
        }
    }
    None
}

// ── Strategy 4: backwards from a postal code ────────────────────────

fn from_postal_code(text: &str) -> Option<String> {
    for m in POSTAL_CODE.find_iter(text) {
        let code = m.as_str();
        let Ok(value) = code.parse::<u32>() else {
            continue;
        };
        if !(1000..=98999).contains(&value) {
            continue;
        }
        let Some(city) = CITY_AFTER_POSTAL
            .captures(&text[m.end()..])
            .map(|c| c[1].trim().to_string())
        else {
            continue;
        };

        let before = &text[..m.start()];
        let lines: Vec<&str> = before
            .lines()
            .map(str::trim)
            .filter(|l| l.chars().count() > 3)
            .collect();
        let Some(last) = lines.last() else {
            continue;
        };
        // same-line prefix counts as the street line
        let last = last.trim_end_matches(|c: char| c == ',' || c.is_whitespace());
        if !VENUE_LINE.is_match(last) {
            continue;
        }
        let mut parts: Vec<String> = Vec::new();
        if lines.len() >= 2 {
            let prev = lines[lines.len() - 2];
            if (3..=80).contains(&prev.chars().count()) && !prev.contains(['@', '<', '>']) {
                parts.push(prev.to_string());
            }
        }
        parts.push(last.to_string());
        parts.push(format!("{code} {city}"));
        return Some(parts.join("\n"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_block_in_markup() {
        let html = "<p>Votre colis est disponible en <b>Point Relais</b></p>\
                    <p>TABAC DE LA GARE</p><p>12 rue de la Paix</p><p>75002 Paris</p>\
                    <p>Voir sur la carte</p>";
        assert_eq!(
            extract_address(html).as_deref(),
            Some("TABAC DE LA GARE, 12 rue de la Paix, 75002 Paris")
        );
    }

    #[test]
    fn labelled_section() {
        let html = "<p><strong>ADRESSE :</strong></p><p>Carrefour City</p>\
                    <p>4 avenue Jean Jaurès</p><p>69007 Lyon</p>";
        assert_eq!(
            extract_address(html).as_deref(),
            Some("Carrefour City, 4 avenue Jean Jaurès, 69007 Lyon")
        );
    }

    #[test]
    fn street_pattern_in_plain_text() {
        let text = "Bonjour, livraison au 8 boulevard Voltaire 13001 Marseille demain.";
        let address = extract_address(text).unwrap();
        assert!(address.starts_with("8 boulevard Voltaire"));
        assert!(address.contains("13001 Marseille"));
    }

    #[test]
    fn keyword_window_in_plain_text() {
        let text = "Votre colis vous attend chez : Pressing Martin, Centre commercial Les Halles, 44000 Nantes\nMerci";
        let address = extract_address(text).unwrap();
        assert!(address.contains("Pressing Martin"));
        assert!(address.contains("44000 Nantes"));
    }

    #[test]
    fn legal_footer_is_rejected() {
        let text = "Vinted UAB\nSAS au capital de 10 000 euros\n10 rue du Commerce 75015 Paris RCS Paris";
        assert!(extract_address(text).is_none());
    }

    #[test]
    fn completeness_rules() {
        assert!(is_address_complete("12 rue de la Paix, 75002 Paris"));
        assert!(!is_address_complete("75002 Paris"));
        assert!(!is_address_complete("Somewhere without a postal code at all"));
        assert!(is_address_complete("3 rue Sainte-Anne, 35000 Rennes"));
        assert!(!is_address_complete("12 rue de la Paix 75002 Paris - Cliquez ici"));
    }
}
