//! Small entity extractors: order number, price, language, names.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

static ORDER_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)(?:order|commande|pedido|n°\s*de\s*commande|order\s*number|numéro\s*de\s*commande)\s*(?:n°|no\.?|#|number|numéro)?\s*[:#]?\s*([A-Z0-9][A-Z0-9-]{5,19})\b")
});

static PRICE_AFTER: LazyLock<Regex> =
    LazyLock::new(|| re(r"(\d{1,6}(?:[ .]\d{3})*[.,]\d{2})\s*(€|EUR|\$|USD|£|GBP)"));
static PRICE_BEFORE: LazyLock<Regex> =
    LazyLock::new(|| re(r"(€|EUR|\$|USD|£|GBP)\s*(\d{1,6}(?:[ ,]\d{3})*[.,]\d{2})"));

static GREETING: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?m)^\s*(?:Bonjour|Hello|Hi|Hola|Cher|Chère|Dear)\s+([A-ZÀ-Ý][\p{L}'\-]+(?:\s+[A-ZÀ-Ý][\p{L}'\-]+)?)\s*[,!]")
});

/// A monetary amount with its ISO 4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub amount: Decimal,
    pub currency: String,
}

/// Extract an order number after an order keyword.
///
/// At least one digit is required so "commande confirmée" is not read as an
/// order number.
pub fn extract_order_number(text: &str) -> Option<String> {
    ORDER_NUMBER
        .captures_iter(text)
        .map(|caps| caps[1].trim_end_matches('-').to_uppercase())
        .find(|n| n.len() >= 6 && n.bytes().any(|b| b.is_ascii_digit()))
}

fn currency_code(symbol: &str) -> &'static str {
    match symbol {
        "$" | "USD" => "USD",
        "£" | "GBP" => "GBP",
        _ => "EUR",
    }
}

/// Normalise "1 234,56" / "1.234,56" / "1,234.56" to a decimal.
fn parse_amount(raw: &str) -> Option<Decimal> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let (int_part, frac) = compact.split_at(compact.len().checked_sub(3)?);
    let int_digits: String = int_part.chars().filter(char::is_ascii_digit).collect();
    let frac_digits = frac.get(1..)?;
    Decimal::from_str(&format!("{int_digits}.{frac_digits}")).ok()
}

/// First price in the text, symbol before or after the amount.
pub fn extract_price(text: &str) -> Option<Price> {
    let after = PRICE_AFTER
        .captures(text)
        .and_then(|c| Some((c.get(0)?.start(), parse_amount(&c[1])?, currency_code(&c[2]))));
    let before = PRICE_BEFORE
        .captures(text)
        .and_then(|c| Some((c.get(0)?.start(), parse_amount(&c[2])?, currency_code(&c[1]))));
    let (_, amount, currency) = match (after, before) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (a, b) => a.or(b)?,
    };
    Some(Price {
        amount,
        currency: currency.to_string(),
    })
}

/// Rough language guess from function-word frequency. Returns `fr`, `en` or `es`.
pub fn detect_language(text: &str) -> &'static str {
    const FR: &[&str] = &["le", "la", "les", "votre", "vous", "colis", "est", "de", "pour", "avec"];
    const EN: &[&str] = &["the", "your", "you", "is", "has", "been", "order", "for", "with", "of"];
    const ES: &[&str] = &["el", "los", "su", "tu", "pedido", "paquete", "está", "para", "con", "del"];

    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();
    let count = |list: &[&str]| words.iter().filter(|w| list.contains(w)).count();
    let (fr, en, es) = (count(FR), count(EN), count(ES));
    if en > fr && en >= es {
        "en"
    } else if es > fr && es > en {
        "es"
    } else {
        "fr"
    }
}

/// Recipient name from an opening greeting ("Bonjour Marie,").
pub fn extract_greeting_name(text: &str) -> Option<String> {
    GREETING
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn order_numbers_need_digits() {
        assert_eq!(
            extract_order_number("Votre commande n° 402-1234567-8912345 est confirmée").as_deref(),
            Some("402-1234567-8912345")
        );
        assert_eq!(extract_order_number("Order #A1B2C3D4 shipped").as_deref(), Some("A1B2C3D4"));
        assert_eq!(extract_order_number("Votre commande confirmée"), None);
    }

    #[test]
    fn prices_in_several_notations() {
        assert_eq!(
            extract_price("Total : 12,50 €"),
            Some(Price { amount: dec!(12.50), currency: "EUR".into() })
        );
        assert_eq!(
            extract_price("Total: $1,234.99 incl. tax"),
            Some(Price { amount: dec!(1234.99), currency: "USD".into() })
        );
        assert_eq!(
            extract_price("Prix 1 299,00 EUR"),
            Some(Price { amount: dec!(1299.00), currency: "EUR".into() })
        );
        assert_eq!(extract_price("no money here"), None);
    }

    #[test]
    fn language_guess() {
        assert_eq!(detect_language("Votre colis est arrivé dans le point relais"), "fr");
        assert_eq!(detect_language("Your order has been shipped with the carrier"), "en");
        assert_eq!(detect_language("Tu pedido está en camino con el transportista"), "es");
    }

    #[test]
    fn greeting_name() {
        assert_eq!(
            extract_greeting_name("Bonjour Marie Dupont,\nVotre colis...").as_deref(),
            Some("Marie Dupont")
        );
        assert_eq!(extract_greeting_name("Bonjour,\nVotre colis"), None);
    }
}
