//! Mailbox synchronisation: fetch, dedup, parse, merge.

pub mod events;
pub mod fetcher;
pub mod mailbox;
pub mod orchestrator;

pub use events::{SyncEvent, SyncEventKind};
pub use fetcher::{DirectoryFetcher, InMemoryFetcher, MailFetcher};
pub use mailbox::{Mailbox, MailboxStatus};
pub use orchestrator::{OwnerSyncReport, SyncOrchestrator, SyncSummary, spawn_sync_loop};
