//! Markup flattening for email bodies.
//!
//! Extractors match keyword phrases against plain text but still need line
//! structure (address blocks are line based), so block-level tags become
//! newlines and inline tags become spaces.

use std::sync::LazyLock;

use regex::Regex;

static STYLE_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(style|script|head)\b[^>]*>.*?</(style|script|head)\s*>").unwrap()
});
static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static BLOCK_CLOSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(p|div|tr|li|h[1-6]|table|ul|ol|blockquote|section)\s*>").unwrap()
});
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static NUMERIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(?:[xX]([0-9a-fA-F]{1,6})|(\d{1,7}));").unwrap());
static HTML_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(html|body|div|p|br|table|td|tr|span|a|b|strong|img|font)\b").unwrap()
});

/// Whether a body looks like markup rather than plain text.
pub fn looks_like_html(body: &str) -> bool {
    HTML_HINT.is_match(body)
}

/// Flatten markup to plain text, one logical line per block.
pub fn strip_html(html: &str) -> String {
    let s = STYLE_SCRIPT.replace_all(html, "");
    let s = COMMENT.replace_all(&s, "");
    let s = LINE_BREAK.replace_all(&s, "\n");
    let s = BLOCK_CLOSE.replace_all(&s, "\n");
    let s = ANY_TAG.replace_all(&s, " ");
    normalize_lines(&decode_entities(&s))
}

/// Plain-text view of a body, whether it is markup or not.
pub fn to_plain_text(body: &str) -> String {
    if looks_like_html(body) {
        strip_html(body)
    } else {
        normalize_lines(&decode_entities(body))
    }
}

/// Decode the entities that show up in transactional mail.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let named = s
        .replace("&nbsp;", " ")
        .replace("&NBSP;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&rsquo;", "'")
        .replace("&lsquo;", "'")
        .replace("&euro;", "€")
        .replace("&eacute;", "é")
        .replace("&egrave;", "è")
        .replace("&agrave;", "à")
        .replace("&ccedil;", "ç");
    let numeric = NUMERIC_ENTITY.replace_all(&named, |caps: &regex::Captures| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (_, Some(dec)) => dec.as_str().parse::<u32>().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_default()
    });
    // &amp; last so "&amp;lt;" stays literal "&lt;"
    numeric.replace("&amp;", "&")
}

/// Collapse horizontal whitespace inside lines and drop empty lines.
pub fn normalize_lines(s: &str) -> String {
    s.lines()
        .map(|line| {
            line.split(|c: char| c.is_whitespace() || c == '\u{a0}')
                .filter(|w| !w.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse all whitespace, newlines included, to single spaces.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
