//! Carrier identity, classification and per-carrier extraction profiles.

pub mod classifier;
pub mod extractor;
pub mod profile;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use classifier::classify_carrier;
pub use extractor::{CarrierExtractor, CarrierFields};
pub use profile::CarrierProfile;

/// The closed set of carriers the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Carrier {
    VintedGo,
    MondialRelay,
    RelaisColis,
    Chronopost,
    Colissimo,
    #[serde(rename = "laposte")]
    LaPoste,
    Dhl,
    Ups,
    Fedex,
    Dpd,
    ColisPrive,
    Gls,
    AmazonLogistics,
    Other,
}

impl Carrier {
    pub const ALL: [Carrier; 14] = [
        Carrier::VintedGo,
        Carrier::MondialRelay,
        Carrier::RelaisColis,
        Carrier::Chronopost,
        Carrier::Colissimo,
        Carrier::LaPoste,
        Carrier::Dhl,
        Carrier::Ups,
        Carrier::Fedex,
        Carrier::Dpd,
        Carrier::ColisPrive,
        Carrier::Gls,
        Carrier::AmazonLogistics,
        Carrier::Other,
    ];

    /// Wire name, as stored and as accepted from secondary extractors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VintedGo => "vinted_go",
            Self::MondialRelay => "mondial_relay",
            Self::RelaisColis => "relais_colis",
            Self::Chronopost => "chronopost",
            Self::Colissimo => "colissimo",
            Self::LaPoste => "laposte",
            Self::Dhl => "dhl",
            Self::Ups => "ups",
            Self::Fedex => "fedex",
            Self::Dpd => "dpd",
            Self::ColisPrive => "colis_prive",
            Self::Gls => "gls",
            Self::AmazonLogistics => "amazon_logistics",
            Self::Other => "other",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::VintedGo => "Vinted Go",
            Self::MondialRelay => "Mondial Relay",
            Self::RelaisColis => "Relais Colis",
            Self::Chronopost => "Chronopost",
            Self::Colissimo => "Colissimo",
            Self::LaPoste => "La Poste",
            Self::Dhl => "DHL",
            Self::Ups => "UPS",
            Self::Fedex => "FedEx",
            Self::Dpd => "DPD",
            Self::ColisPrive => "Colis Privé",
            Self::Gls => "GLS",
            Self::AmazonLogistics => "Amazon Logistics",
            Self::Other => "Other carrier",
        }
    }

    /// Parse a wire name. Returns `None` for values outside the closed set.
    pub fn from_wire(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        let alias = match normalized.as_str() {
            "la_poste" => "laposte",
            "vinted" | "vintedgo" => "vinted_go",
            "mondialrelay" => "mondial_relay",
            "amazon" => "amazon_logistics",
            other => other,
        };
        Self::ALL.into_iter().find(|c| c.as_str() == alias)
    }

    /// Parse a stored value; anything unrecognised becomes `Other`.
    pub fn parse(s: &str) -> Self {
        Self::from_wire(s).unwrap_or(Self::Other)
    }

    pub fn is_other(&self) -> bool {
        matches!(self, Self::Other)
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
