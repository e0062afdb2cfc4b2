//! RFC 822 / MIME decoding into [`NormalizedEmail`].

use chrono::{NaiveDate, Utc};
use mail_parser::{MessageParser, PartType};
use uuid::Uuid;

use super::types::NormalizedEmail;
use crate::error::PipelineError;

impl NormalizedEmail {
    /// Decode a raw RFC 822 message.
    ///
    /// The HTML part is preferred over the text part since several carriers
    /// only put pickup codes and label links in markup. Messages without a
    /// parseable header block are rejected; a missing Message-ID or Date is
    /// filled in.
    pub fn from_rfc822(raw: &[u8]) -> Result<Self, PipelineError> {
        let parsed = MessageParser::default()
            .parse(raw)
            .ok_or_else(|| PipelineError::MalformedInput("unparseable RFC 822 message".into()))?;

        let sender = parsed
            .from()
            .and_then(|addr| addr.first())
            .and_then(|a| {
                let address = a.address()?;
                Some(match a.name() {
                    Some(name) if !name.trim().is_empty() => format!("{} <{address}>", name.trim()),
                    _ => address.to_string(),
                })
            })
            .ok_or_else(|| PipelineError::MalformedInput("message has no From address".into()))?;

        let subject = parsed.subject().unwrap_or_default().to_string();

        let body = match parsed.html_part(0).map(|part| &part.body) {
            Some(PartType::Html(html)) => html.to_string(),
            _ => parsed
                .body_text(0)
                .map(|b| b.into_owned())
                .unwrap_or_default(),
        };

        let message_id = parsed
            .message_id()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("gen-{}", Uuid::new_v4()));

        #[allow(clippy::cast_sign_loss)]
        let received_at = parsed
            .date()
            .and_then(|d| {
                NaiveDate::from_ymd_opt(d.year as i32, u32::from(d.month), u32::from(d.day))
                    .and_then(|date| {
                        date.and_hms_opt(
                            u32::from(d.hour),
                            u32::from(d.minute),
                            u32::from(d.second),
                        )
                    })
                    .map(|naive| {
                        let offset_secs = i64::from(d.tz_hour) * 3600 + i64::from(d.tz_minute) * 60;
                        let offset_secs = if d.tz_before_gmt { -offset_secs } else { offset_secs };
                        naive.and_utc() - chrono::Duration::seconds(offset_secs)
                    })
            })
            .unwrap_or_else(Utc::now);

        Ok(Self {
            message_id,
            subject,
            sender,
            body,
            received_at,
        })
    }
}
