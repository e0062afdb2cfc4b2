//! Pickup / withdrawal code extraction.

use std::sync::LazyLock;

use regex::Regex;

use super::plausibility::is_plausible_code;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

/// Bold code next to a code keyword, in markup.
static MARKUP_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        re(r"(?i)code\s+(?:de\s+)?(?:retrait|pickup|withdrawal)[\s:]*<(?:strong|b)>\s*([A-Z0-9]{4,10})\s*</(?:strong|b)>"),
        re(r"(?i)(?:code suivant|saisis le code|votre code)[\s:]*<(?:strong|b)>\s*([A-Z0-9]{4,10})\s*</(?:strong|b)>"),
        re(r"(?i)<(?:strong|b)>\s*([A-Z0-9]{4,10})\s*</(?:strong|b)>\s*(?:code|retrait|pickup)"),
    ]
});

/// Code directly after a keyword phrase, in flattened text.
static CONTEXT_RULE: LazyLock<Regex> = LazyLock::new(|| {
    re(r#"(?i)(?:code de retrait|code retrait|code de collecte|withdrawal code|pickup code|collection code|code suivant|code pin|pin code|code point retrait|saisis le code(?: suivant)?|votre code(?: de retrait| suivant)?)\s*(?:est|is)?[\s:*«»"'’\-–]*([A-Z0-9]{4,10})\b"#)
});

static NUMERIC_NEAR_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)(?:code|retrait|pickup)[\s\S]{0,30}?\b(\d{6})\b"));

/// Extract a pickup code. `html` is the raw body, `text` its flattened form.
pub fn extract_pickup_code(html: &str, text: &str) -> Option<String> {
    let first_plausible = |pattern: &Regex, haystack: &str| {
        pattern
            .captures_iter(haystack)
            .map(|caps| caps[1].to_uppercase())
            .find(|code| is_plausible_code(code))
    };

    MARKUP_RULES
        .iter()
        .find_map(|rule| first_plausible(rule, html))
        .or_else(|| first_plausible(&*CONTEXT_RULE, text))
        .or_else(|| first_plausible(&*NUMERIC_NEAR_KEYWORD, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_on_the_line_after_the_keyword() {
        let text = "Pour retirer ton colis, saisis le code suivant :\n*522758*";
        assert_eq!(extract_pickup_code(text, text).as_deref(), Some("522758"));
    }

    #[test]
    fn bold_code_in_markup() {
        let html = "<p>Code de retrait : <strong>A7K2Q9</strong></p>";
        assert_eq!(extract_pickup_code(html, "Code de retrait : A7K2Q9").as_deref(), Some("A7K2Q9"));
    }

    #[test]
    fn keyword_itself_is_not_taken_as_a_code() {
        // "code" alone after the keyword must not be returned
        let text = "Votre code de retrait est 4821 93";
        assert_eq!(extract_pickup_code(text, text).as_deref(), Some("4821"));
    }

    #[test]
    fn numeric_code_near_keyword() {
        let text = "Présentez ce code au relais. Retrait possible avec 739104 et une pièce d'identité.";
        assert_eq!(extract_pickup_code(text, text).as_deref(), Some("739104"));
    }

    #[test]
    fn implausible_codes_are_rejected() {
        let text = "Votre code : 000000";
        assert_eq!(extract_pickup_code(text, text), None);
        let text = "code de retrait : STYLE";
        assert_eq!(extract_pickup_code(text, text), None);
    }
}
