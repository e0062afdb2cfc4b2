//! Lightweight keyword-density pre-filter used on incremental syncs.

use super::lifecycle::promo_signal_count;

const TRACKING_KEYWORDS: &[&str] = &[
    "tracking",
    "suivi",
    "colis",
    "livraison",
    "shipment",
    "numéro de suivi",
    "tracking number",
    "code qr",
    "qr code",
    "point relais",
    "retrait",
    "code de retrait",
    "colissimo",
    "laposte",
    "chronopost",
    "mondial relay",
    "vinted go",
    "express",
    "dhl",
    "ups.com",
    "fedex",
    "parcel",
    "package",
    "delivery",
    "dispatch",
    "shipped",
    "en transit",
    "en cours",
    "remise à",
    "récupérer",
    "adresse de livraison",
    "livré",
    "delivered",
    "amazon",
    "ebay",
    "aliexpress",
    "cdiscount",
];

/// Minimum number of distinct keywords for a message to count.
const MIN_KEYWORDS: usize = 2;

/// `true` when a message looks like a parcel notification: at least two
/// tracking keywords, and not promotional.
pub fn is_tracking_email(sender: &str, subject: &str, body: &str) -> bool {
    let combined = format!("{subject} {sender} {body}").to_lowercase();
    let hits = TRACKING_KEYWORDS
        .iter()
        .filter(|kw| combined.contains(*kw))
        .count();
    hits >= MIN_KEYWORDS && promo_signal_count(&combined) < 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_keywords_pass() {
        assert!(is_tracking_email("noreply@colissimo.fr", "Votre colis", "Suivi de livraison"));
    }

    #[test]
    fn single_keyword_fails() {
        assert!(!is_tracking_email("friend@example.com", "Dinner", "See you at the colis... no"));
    }

    #[test]
    fn promotional_mail_is_excluded() {
        assert!(!is_tracking_email(
            "news@shop.example",
            "Livraison offerte sur tous les colis",
            "Soldes ! Code promo WINTER. Se désabonner"
        ));
    }
}
