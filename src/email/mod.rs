//! Email input: the provider-neutral message, markup flattening and MIME decoding.

pub mod html;
pub mod mime;
pub mod types;

pub use types::{MailProvider, MessageStatus, NormalizedEmail, PreparedEmail, RawMessage};
