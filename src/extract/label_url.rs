//! Shipping label (bordereau) download link extraction.
//!
//! Candidates come from anchors whose tag or text mentions a label, direct
//! PDF links, and bare URLs near label words. Each is scored and the best
//! positive score wins.

use std::sync::LazyLock;

use regex::Regex;

use crate::email::html::decode_entities;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

static ANCHOR: LazyLock<Regex> =
    LazyLock::new(|| re(r#"(?is)<a\s[^>]*href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#));
static PDF_HREF: LazyLock<Regex> =
    LazyLock::new(|| re(r#"(?i)href\s*=\s*["'](https?://[^"']+\.pdf[^"']*)"#));
static URL_AFTER_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    re(r#"(?is)(?:étiquette|etiquette|bordereau|label|imprimer|print|télécharger|download).{0,200}?(https?://[^\s<>"']{10,200})"#)
});

const LABEL_KEYWORDS: &[&str] = &[
    "étiquette",
    "etiquette",
    "bordereau",
    "label",
    "imprimer",
    "print",
    "télécharger",
    "download",
    "pdf",
    "bon de transport",
];

fn is_http_url(url: &str) -> bool {
    url.len() >= 10 && (url.starts_with("http://") || url.starts_with("https://"))
}

/// Likelihood that a URL points at a printable label.
pub fn score_label_url(url: &str) -> i32 {
    let lower = url.to_lowercase();
    let mut score = 0;
    if lower.contains(".pdf") {
        score += 3;
    }
    for kw in ["label", "bordereau", "etiquette", "étiquette"] {
        if lower.contains(kw) {
            score += 2;
        }
    }
    for kw in ["shipping", "print", "download"] {
        if lower.contains(kw) {
            score += 1;
        }
    }
    for domain in ["colissimo.fr", "chronopost.fr", "mondialrelay"] {
        if lower.contains(domain) {
            score += 2;
        }
    }
    if lower.contains("vinted") {
        score += 1;
    }
    if lower.contains("tracking") || lower.contains("suivi") {
        score -= 1;
    }
    if lower.contains("unsubscribe") || lower.contains("mailto:") {
        score -= 5;
    }
    score
}

/// Extract the most likely label URL from a body.
pub fn extract_label_url(html: &str) -> Option<String> {
    let mut candidates: Vec<String> = Vec::new();
    let mut push = |url: &str| {
        let url = decode_entities(url.trim());
        if is_http_url(&url) && !candidates.contains(&url) {
            candidates.push(url);
        }
    };

    for caps in ANCHOR.captures_iter(html) {
        let whole = caps[0].to_lowercase();
        if LABEL_KEYWORDS.iter().any(|kw| whole.contains(kw)) {
            push(&caps[1]);
        }
    }
    for caps in PDF_HREF.captures_iter(html) {
        push(&caps[1]);
    }
    for caps in URL_AFTER_KEYWORD.captures_iter(html) {
        push(&caps[1]);
    }

    candidates
        .into_iter()
        .map(|url| (score_label_url(&url), url))
        .filter(|(score, _)| *score > 0)
        // max_by_key keeps the last maximum; reverse so the first one wins ties
        .rev()
        .max_by_key(|(score, _)| *score)
        .map(|(_, url)| url)
}
