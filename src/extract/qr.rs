//! QR code / barcode image reference extraction.
//!
//! Carriers embed the pickup pass as an image: a hosted URL, a barcode
//! API link or an inline `data:` URI. The reference is returned as-is.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap()
}

static IMG_TAG: LazyLock<Regex> = LazyLock::new(|| re(r"(?is)<img\b[^>]*>"));
static ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| re(r#"(?is)([a-z][a-z0-9-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#));
static QR_ALT: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)\bqr\b|qr\s*code|qrcode|barcode|code.?barre|pickup pass|\bcode\b"));
static QR_CONTEXT: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)\bqr\b|qr\s*code|barcode|code.?barre"));
static BARCODE_URL: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)barcode|aztec|qrcode|qr-code|datamatrix|pickup-services"));
static DATA_URI: LazyLock<Regex> =
    LazyLock::new(|| re(r"^data:image/(?:png|jpe?g|gif|webp|svg\+xml);base64,[A-Za-z0-9+/=]{50,}$"));
static IMAGE_EXT: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)\.(?:png|jpe?g|gif|webp|svg)(?:\?.*)?$"));

struct ImgTag {
    start: usize,
    attrs: HashMap<String, String>,
}

impl ImgTag {
    /// `src`, then lazy-loading `data-src`, then the first `srcset` entry.
    fn source(&self) -> Option<String> {
        if let Some(src) = self.attrs.get("src").filter(|s| !s.trim().is_empty()) {
            return Some(src.trim().to_string());
        }
        if let Some(src) = self.attrs.get("data-src").filter(|s| !s.trim().is_empty()) {
            return Some(src.trim().to_string());
        }
        self.attrs
            .get("srcset")
            .and_then(|set| set.split(',').next())
            .and_then(|first| first.split_whitespace().next())
            .map(str::to_string)
    }

    fn alt(&self) -> &str {
        self.attrs
            .get("alt")
            .or_else(|| self.attrs.get("title"))
            .map(String::as_str)
            .unwrap_or("")
    }
}

fn img_tags(html: &str) -> Vec<ImgTag> {
    IMG_TAG
        .find_iter(html)
        .map(|m| {
            let attrs = ATTRIBUTE
                .captures_iter(m.as_str())
                .map(|caps| {
                    let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |v| v.as_str());
                    (caps[1].to_lowercase(), value.to_string())
                })
                .collect();
            ImgTag {
                start: m.start(),
                attrs,
            }
        })
        .collect()
}

/// `true` for data URIs, absolute http(s) URLs and relative image paths.
pub fn is_valid_qr_reference(url: &str) -> bool {
    url.len() >= 10
        && (DATA_URI.is_match(url)
            || url.starts_with("http://")
            || url.starts_with("https://")
            || IMAGE_EXT.is_match(url))
}

/// Extract the QR/barcode image reference from a body.
pub fn extract_qr_reference(html: &str) -> Option<String> {
    let tags = img_tags(html);
    if tags.is_empty() {
        return None;
    }

    // alt/title names the image as a code
    let by_alt = tags
        .iter()
        .filter(|t| QR_ALT.is_match(t.alt()))
        .filter_map(ImgTag::source);
    // image shortly after a "QR code" mention
    let by_context = tags.iter().filter_map(|t| {
        let window_start = html[..t.start]
            .char_indices()
            .rev()
            .nth(200)
            .map_or(0, |(i, _)| i);
        QR_CONTEXT
            .is_match(&html[window_start..t.start])
            .then(|| t.source())
            .flatten()
    });
    // barcode service URL or inline image regardless of alt text
    let by_url = tags
        .iter()
        .filter_map(ImgTag::source)
        .filter(|src| BARCODE_URL.is_match(src) || DATA_URI.is_match(src));

    by_alt
        .chain(by_context)
        .chain(by_url)
        .find(|src| is_valid_qr_reference(src))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_with_qr_alt_text() {
        let html = r#"<img src="https://cdn.example.com/logo.png" alt="Logo">
                      <img alt="QR code" src="https://qr.vintedgo.com/pass/ABC123.png">"#;
        assert_eq!(
            extract_qr_reference(html).as_deref(),
            Some("https://qr.vintedgo.com/pass/ABC123.png")
        );
    }

    #[test]
    fn image_after_qr_mention() {
        let html = r#"<p>Présente ce QR code au relais</p><div><img src="https://img.example.com/x/9f8e7d.png"></div>"#;
        assert_eq!(
            extract_qr_reference(html).as_deref(),
            Some("https://img.example.com/x/9f8e7d.png")
        );
    }

    #[test]
    fn barcode_api_url_and_lazy_loading() {
        let html = r#"<img data-src="https://avis.example.fr/pickup-services/aztec?id=42" width="200">"#;
        assert_eq!(
            extract_qr_reference(html).as_deref(),
            Some("https://avis.example.fr/pickup-services/aztec?id=42")
        );
    }

    #[test]
    fn inline_data_uri() {
        let payload = "A".repeat(64);
        let html = format!(r#"<img src="data:image/png;base64,{payload}">"#);
        assert_eq!(
            extract_qr_reference(&html),
            Some(format!("data:image/png;base64,{payload}"))
        );
    }

    #[test]
    fn plain_logos_are_ignored() {
        let html = r#"<img src="https://cdn.example.com/logo.png" alt="Vinted">"#;
        assert_eq!(extract_qr_reference(html), None);
    }
}
