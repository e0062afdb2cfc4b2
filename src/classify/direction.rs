//! Direction classifier: is the user shipping a parcel out (sale) or
//! receiving one (purchase)?
//!
//! Seller phrases are checked first and are treated as high precision: any
//! hit means sale. Otherwise any buyer phrase means purchase, and with no
//! signal at all the answer is still purchase.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::email::types::sender_address;

/// Which way a parcel travels relative to the mailbox owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The user ships out.
    Sale,
    /// The user receives.
    Purchase,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::Purchase => "purchase",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sale" | "outgoing" => Some(Self::Sale),
            "purchase" | "incoming" => Some(Self::Purchase),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction with a 0-100 confidence and the reason it was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectionVerdict {
    pub direction: Direction,
    pub confidence: u8,
    pub reason: &'static str,
}

const SALE_KEYWORDS: &[&str] = &[
    // labels and drop-off
    "bordereau",
    "étiquette d'expédition",
    "étiquette de transport",
    "bon de transport",
    "imprimer l'étiquette",
    "télécharger le bordereau",
    "télécharger l'étiquette",
    "votre étiquette",
    "expédiez votre colis",
    "expédier le colis",
    "déposer votre colis",
    "dépose ton colis",
    "apporter le colis",
    "déposer au point relais",
    "shipping label",
    "print label",
    "print your label",
    "download label",
    "print shipping label",
    "your shipping label",
    "ship your order",
    "ship your item",
    "ship the item",
    "drop off package",
    "drop off your package",
    // seller notifications
    "you sold",
    "you have sold",
    "order to ship",
    "ready to ship",
    "ship by",
    "fulfill order",
    "fulfillment",
    "vous avez vendu",
    "tu as vendu",
    "commande à expédier",
    "prêt à expédier",
    "article vendu",
    "vente confirmée",
    "ton article a été acheté",
    "ton article est vendu",
    "your item has been sold",
    "your item sold",
    "prepare your shipment",
    "prépare ton envoi",
    "préparez votre envoi",
    "create shipping label",
    "créer une étiquette",
    "générer le bordereau",
    "generate label",
    "seller central",
    "manage your shipment",
    "ship this order",
    "gérer votre expédition",
    "vendido",
    "has vendido",
    "etiqueta de envío",
];

const PURCHASE_KEYWORDS: &[&str] = &[
    "récupérer ton colis",
    "récupérer votre colis",
    "retirer votre colis",
    "retirer ton colis",
    "prêt à être récupéré",
    "disponible au retrait",
    "colis disponible",
    "à retirer avant le",
    "code de retrait",
    "code de récupération",
    "ton colis arrive",
    "votre colis arrive",
    "livraison prévue",
    "en cours de livraison",
    "colis en transit",
    "colis livré",
    "pickup your parcel",
    "pick up your parcel",
    "collect your parcel",
    "ready for pickup",
    "available for pickup",
    "pickup code",
    "withdrawal code",
    "your parcel is ready",
    "your package is ready",
    "delivery scheduled",
    "out for delivery",
    "in transit",
    "delivered",
    "tracking update",
    "your order",
    "votre commande",
    "order confirmation",
    "confirmation de commande",
    "merci pour votre achat",
    "thank you for your purchase",
    "your purchase",
    "votre achat",
    "vous avez acheté",
    "ton achat",
    "your item",
    "votre article",
    "article acheté",
    "item purchased",
    "qr code",
    "scanner le qr",
    "scan qr",
    "présenter le code",
    "show this code",
    "tu pedido",
    "su pedido",
    "recoger tu paquete",
];

/// Seller-side platforms. Combined with a shipping word they mean sale.
const SELLER_SENDERS: &[&str] = &[
    "shopify.com",
    "woocommerce.com",
    "sellercentral.amazon",
    "ebay.com/seller",
    "etsy.com/seller",
];

const SHIPPING_WORDS: &[&str] = &["ship", "expédi", "label"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn is_sale(sender: &str, subject: &str, body: &str) -> bool {
    if contains_any(subject, SALE_KEYWORDS) || contains_any(body, SALE_KEYWORDS) {
        return true;
    }
    contains_any(sender, SELLER_SENDERS) && contains_any(body, SHIPPING_WORDS)
}

fn is_purchase(subject: &str, body: &str) -> bool {
    contains_any(subject, PURCHASE_KEYWORDS) || contains_any(body, PURCHASE_KEYWORDS)
}

/// Classify direction with confidence.
pub fn classify_direction(sender: &str, subject: &str, body: &str) -> DirectionVerdict {
    // typographic apostrophes are common in French templates
    let subject = subject.to_lowercase().replace('’', "'");
    let body = body.to_lowercase().replace('’', "'");
    let sender = sender_address(sender);

    let verdict = if is_sale(&sender, &subject, &body) {
        let (confidence, reason) = if body.contains("bordereau") || body.contains("shipping label") {
            (95, "shipping label keywords")
        } else if body.contains("expédier") || body.contains("ship your") {
            (85, "shipment action keywords")
        } else if body.contains("vendu") || body.contains("sold") {
            (80, "sale confirmation keywords")
        } else {
            (70, "seller keywords")
        };
        DirectionVerdict {
            direction: Direction::Sale,
            confidence,
            reason,
        }
    } else if is_purchase(&subject, &body) {
        let (confidence, reason) =
            if body.contains("code de retrait") || body.contains("withdrawal code") {
                (98, "pickup code")
            } else if body.contains("récupérer") || body.contains("pickup") {
                (90, "pickup keywords")
            } else if body.contains("votre commande") || body.contains("your order") {
                (75, "order confirmation keywords")
            } else {
                (65, "buyer keywords")
            };
        DirectionVerdict {
            direction: Direction::Purchase,
            confidence,
            reason,
        }
    } else {
        DirectionVerdict {
            direction: Direction::Purchase,
            confidence: 50,
            reason: "default",
        }
    };

    debug!(direction = %verdict.direction, confidence = verdict.confidence, reason = verdict.reason, "Direction classified");
    verdict
}
