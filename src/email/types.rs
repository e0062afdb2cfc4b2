//! Email types: the normalized message handed to the pipeline and the raw
//! message persisted by the sync orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::html;

// ── Normalized email ────────────────────────────────────────────────

/// A fetched email in provider-neutral form.
///
/// Produced by a mail-fetch collaborator (Gmail/Outlook/IMAP/.eml files).
/// `body` may be HTML markup or plain text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEmail {
    /// Provider-unique message id.
    pub message_id: String,
    pub subject: String,
    /// Sender address, optionally in `Name <addr>` form.
    pub sender: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

impl NormalizedEmail {
    pub fn new(
        message_id: impl Into<String>,
        subject: impl Into<String>,
        sender: impl Into<String>,
        body: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            subject: subject.into(),
            sender: sender.into(),
            body: body.into(),
            received_at,
        }
    }

    /// Display name part of the sender, if present.
    pub fn sender_display_name(&self) -> Option<String> {
        let (name, _) = self.sender.split_once('<')?;
        let name = name.trim().trim_matches('"').trim();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }
}

/// Extract the bare lowercase address from a sender header value.
pub fn sender_address(sender: &str) -> String {
    let s = sender.trim();
    let addr = match (s.rfind('<'), s.rfind('>')) {
        (Some(start), Some(end)) if end > start => &s[start + 1..end],
        _ => s,
    };
    addr.trim().to_lowercase()
}

/// Lowercase domain part of a sender header value.
pub fn sender_domain(sender: &str) -> Option<String> {
    let addr = sender_address(sender);
    let (_, domain) = addr.rsplit_once('@')?;
    let domain = domain.trim_end_matches('.');
    if domain.contains('.') {
        Some(domain.to_string())
    } else {
        None
    }
}

// ── Prepared email ──────────────────────────────────────────────────

/// An email with its plain-text view computed once.
///
/// Extractors that need markup read `html`; everything else reads `text`.
#[derive(Debug, Clone)]
pub struct PreparedEmail<'a> {
    pub email: &'a NormalizedEmail,
    /// Original body (markup kept).
    pub html: &'a str,
    /// Body flattened to plain text, line structure kept.
    pub text: String,
}

impl<'a> PreparedEmail<'a> {
    pub fn new(email: &'a NormalizedEmail) -> Self {
        Self {
            email,
            html: &email.body,
            text: html::to_plain_text(&email.body),
        }
    }
}

// ── Raw message ─────────────────────────────────────────────────────

/// Mailbox provider a message was fetched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailProvider {
    Gmail,
    Outlook,
    Imap,
    File,
}

impl MailProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gmail => "gmail",
            Self::Outlook => "outlook",
            Self::Imap => "imap",
            Self::File => "file",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "gmail" => Self::Gmail,
            "outlook" => Self::Outlook,
            "file" => Self::File,
            _ => Self::Imap,
        }
    }
}

/// Processing status of a persisted raw message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Fetched,
    Parsed,
    /// Dropped by the keyword pre-filter without parsing.
    Skipped,
    Error,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetched => "fetched",
            Self::Parsed => "parsed",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "parsed" => Self::Parsed,
            "skipped" => Self::Skipped,
            "error" => Self::Error,
            _ => Self::Fetched,
        }
    }
}

/// A fetched message as persisted. Immutable after creation except `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: String,
    pub owner: String,
    pub provider: MailProvider,
    pub message_id: String,
    pub subject: String,
    pub sender: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

impl RawMessage {
    /// A freshly fetched message, not yet parsed.
    pub fn new(owner: impl Into<String>, provider: MailProvider, email: &NormalizedEmail) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner: owner.into(),
            provider,
            message_id: email.message_id.clone(),
            subject: email.subject.clone(),
            sender: email.sender.clone(),
            body: email.body.clone(),
            received_at: email.received_at,
            status: MessageStatus::Fetched,
            created_at: Utc::now(),
        }
    }

    /// Rebuild the pipeline view of this message.
    pub fn to_normalized(&self) -> NormalizedEmail {
        NormalizedEmail {
            message_id: self.message_id.clone(),
            subject: self.subject.clone(),
            sender: self.sender.clone(),
            body: self.body.clone(),
            received_at: self.received_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_email(sender: &str) -> NormalizedEmail {
        NormalizedEmail::new("m-1", "Subject", sender, "<p>Hello</p>", Utc::now())
    }

    #[test]
    fn sender_address_strips_display_name() {
        let email = make_email("\"Vinted Go\" <NoReply@VintedGo.com>");
        assert_eq!(sender_address(&email.sender), "noreply@vintedgo.com");
        assert_eq!(sender_domain(&email.sender).as_deref(), Some("vintedgo.com"));
        assert_eq!(email.sender_display_name().as_deref(), Some("Vinted Go"));
    }

    #[test]
    fn bare_address_has_no_display_name() {
        let email = make_email("info@ups.com");
        assert_eq!(sender_address(&email.sender), "info@ups.com");
        assert!(email.sender_display_name().is_none());
    }

    #[test]
    fn sender_without_domain_dot_has_no_domain() {
        assert!(sender_domain("root@localhost").is_none());
        assert!(sender_domain("not an address").is_none());
    }

    #[test]
    fn prepared_email_flattens_markup() {
        let email = make_email("a@b.com");
        let prepared = PreparedEmail::new(&email);
        assert_eq!(prepared.text, "Hello");
        assert_eq!(prepared.html, "<p>Hello</p>");
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            MessageStatus::Fetched,
            MessageStatus::Parsed,
            MessageStatus::Skipped,
            MessageStatus::Error,
        ] {
            assert_eq!(MessageStatus::parse(status.as_str()), status);
        }
        assert_eq!(MailProvider::parse("outlook"), MailProvider::Outlook);
    }
}
