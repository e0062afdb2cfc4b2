//! Shared plausibility filter for code-like candidates.
//!
//! Pattern matches over email text regularly pick up things that look like
//! codes but are not: `000000`, `123456`, markup words such as `STYLE`.

/// Words that match `[A-Z0-9]{4,10}` in mail bodies but are never codes.
const NOISE_WORDS: &[&str] = &[
    "HTTP", "HTTPS", "WWW", "HTML", "UTF", "ISO", "RGB", "TRUE", "FALSE", "NULL", "NONE",
    "PIXEL", "IMAGE", "STYLE", "CLASS", "WIDTH", "HEIGHT", "CODE", "CODES", "VOTRE", "SUIVANT",
    "RETRAIT", "PICKUP", "COLIS", "PARCEL", "ORDER", "COMMANDE", "TRACKING", "SUIVI", "NUMERO",
    "NUMBER", "BONJOUR", "HELLO", "MERCI",
];

/// `true` for strings of four or more copies of one digit (`0000`, `999999`).
pub fn is_repeated_digits(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first.is_ascii_digit() && s.len() >= 4 => chars.all(|c| c == first),
        _ => false,
    }
}

/// `true` for ascending or descending digit runs (`123456`, `98765`).
pub fn is_sequential_run(s: &str) -> bool {
    if s.len() < 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let bytes = s.as_bytes();
    let ascending = bytes.windows(2).all(|w| w[1] == w[0] + 1);
    let descending = bytes.windows(2).all(|w| w[0] == w[1] + 1);
    ascending || descending
}

/// `true` for common words that happen to look like codes.
pub fn is_noise_word(s: &str) -> bool {
    let upper = s.to_ascii_uppercase();
    NOISE_WORDS.contains(&upper.as_str())
}

/// Pickup/withdrawal code check: 4-10 ASCII alphanumerics with at least one
/// digit, not noise, not a repeated or sequential run.
pub fn is_plausible_code(s: &str) -> bool {
    (4..=10).contains(&s.len())
        && s.bytes().all(|b| b.is_ascii_alphanumeric())
        && s.bytes().any(|b| b.is_ascii_digit())
        && !is_noise_word(s)
        && !is_repeated_digits(s)
        && !is_sequential_run(s)
}

/// Tracking number check applied after the carrier format matched.
pub fn is_plausible_tracking(s: &str) -> bool {
    s.len() >= 8
        && s.bytes().any(|b| b.is_ascii_digit())
        && !is_repeated_digits(s)
        && !is_sequential_run(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_and_sequential_runs_are_rejected() {
        assert!(is_repeated_digits("000000"));
        assert!(!is_repeated_digits("000100"));
        assert!(!is_repeated_digits("111"));
        assert!(is_sequential_run("123456"));
        assert!(is_sequential_run("9876"));
        assert!(!is_sequential_run("123457"));
        assert!(!is_sequential_run("12A4"));
    }

    #[test]
    fn codes_need_a_digit_and_no_noise() {
        assert!(is_plausible_code("522758"));
        assert!(is_plausible_code("A7K2Q"));
        assert!(!is_plausible_code("STYLE"));
        assert!(!is_plausible_code("HTTPS"));
        assert!(!is_plausible_code("ABCDEF"));
        assert!(!is_plausible_code("123456"));
        assert!(!is_plausible_code("12"));
        assert!(!is_plausible_code("12345678901"));
    }

    #[test]
    fn tracking_plausibility() {
        assert!(is_plausible_tracking("6A12345678901"));
        assert!(!is_plausible_tracking("00000000000"));
        assert!(!is_plausible_tracking("12345678"));
        assert!(!is_plausible_tracking("ABCDEFGHIJ"));
    }
}
