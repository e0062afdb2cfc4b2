//! Sync orchestrator: fetch → dedup → persist → parse → merge, per mailbox.
//!
//! One pass over a mailbox:
//! 1. Skip it unless active; pick the fetch volume (large until the first
//!    pass completes, small afterwards)
//! 2. Persist each fetched message, skipping ids already seen for the owner
//! 3. Parse every new message on the first pass; later passes only parse
//!    messages accepted by the tracking pre-filter
//! 4. Upsert a parcel for each result with a tracking number; log the
//!    tracking-looking rest as unparsed
//! 5. Batch-enrich the unparsed messages when a generative backend is set
//!
//! Lifecycle events are persisted along the way. Per-message failures are
//! logged and never abort the pass.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::{SyncEvent, SyncEventKind, new_sync_id};
use super::fetcher::MailFetcher;
use super::mailbox::{Mailbox, MailboxStatus};
use crate::classify::is_tracking_email;
use crate::config::SyncConfig;
use crate::email::{MessageStatus, NormalizedEmail, RawMessage};
use crate::error::SyncError;
use crate::parcel::MergeEngine;
use crate::pipeline::{BatchEnricher, ExtractionResult, HybridParser, PendingEmail};
use crate::store::{ParcelStore, UnparsedEmail, UnparsedStatus};

/// Counters of one mailbox pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Messages returned by the fetcher.
    pub fetched: usize,
    /// Messages already stored for the owner.
    pub duplicates: usize,
    /// Messages run through the pipeline.
    pub parsed: usize,
    /// Parcels created or updated.
    pub tracking_found: usize,
    /// Parsed messages left without a tracking number.
    pub no_tracking: usize,
}

impl SyncSummary {
    fn absorb(&mut self, other: &SyncSummary) {
        self.fetched += other.fetched;
        self.duplicates += other.duplicates;
        self.parsed += other.parsed;
        self.tracking_found += other.tracking_found;
        self.no_tracking += other.no_tracking;
    }
}

/// Outcome of syncing every mailbox of an owner.
#[derive(Debug, Default)]
pub struct OwnerSyncReport {
    pub summary: SyncSummary,
    pub synced: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Drives mailbox syncs through the pipeline and the merge engine.
pub struct SyncOrchestrator {
    store: Arc<dyn ParcelStore>,
    fetcher: Arc<dyn MailFetcher>,
    parser: HybridParser,
    merge: MergeEngine,
    enricher: Option<BatchEnricher>,
    config: SyncConfig,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn ParcelStore>,
        fetcher: Arc<dyn MailFetcher>,
        parser: HybridParser,
        config: SyncConfig,
    ) -> Self {
        Self {
            merge: MergeEngine::new(Arc::clone(&store)),
            store,
            fetcher,
            parser,
            enricher: None,
            config,
        }
    }

    /// Run batch enrichment on unparsed messages at the end of each pass.
    pub fn with_enricher(mut self, enricher: BatchEnricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn store(&self) -> &Arc<dyn ParcelStore> {
        &self.store
    }

    pub fn merge_engine(&self) -> &MergeEngine {
        &self.merge
    }

    async fn emit(&self, sync_id: &str, mailbox: &Mailbox, kind: SyncEventKind, data: serde_json::Value) {
        let event = SyncEvent::new(sync_id, &mailbox.owner, Some(&mailbox.id), kind, data);
        if let Err(e) = self.store.record_sync_event(&event).await {
            warn!(sync_id, kind = kind.as_str(), error = %e, "Failed to record sync event");
        }
    }

    /// Sync one mailbox. `fetch_limit` overrides the configured volume.
    pub async fn sync_mailbox(
        &self,
        owner: &str,
        mailbox_id: &str,
        fetch_limit: Option<usize>,
    ) -> Result<SyncSummary, SyncError> {
        let mailbox = self
            .store
            .get_mailbox(mailbox_id)
            .await?
            .filter(|m| m.owner == owner)
            .ok_or_else(|| SyncError::MailboxNotFound(mailbox_id.to_string()))?;

        if !mailbox.is_active() {
            debug!(mailbox_id, status = mailbox.status.as_str(), "Skipping inactive mailbox");
            return Ok(SyncSummary::default());
        }

        let sync_id = new_sync_id();
        let limit = fetch_limit.unwrap_or(if mailbox.initial_sync_completed {
            self.config.incremental_fetch_limit
        } else {
            self.config.initial_fetch_limit
        });
        info!(
            sync_id = %sync_id,
            owner,
            mailbox_id,
            limit,
            initial = !mailbox.initial_sync_completed,
            "Mailbox sync started"
        );
        self.emit(&sync_id, &mailbox, SyncEventKind::SyncStarted, json!({ "limit": limit }))
            .await;

        match self.run_pass(&sync_id, &mailbox, limit).await {
            Ok(summary) => {
                if !mailbox.initial_sync_completed {
                    self.store.mark_initial_sync_completed(&mailbox.id).await?;
                }
                self.emit(
                    &sync_id,
                    &mailbox,
                    SyncEventKind::SyncCompleted,
                    json!({
                        "fetched": summary.fetched,
                        "parsed": summary.parsed,
                        "trackingFound": summary.tracking_found,
                    }),
                )
                .await;
                info!(
                    sync_id = %sync_id,
                    mailbox_id,
                    fetched = summary.fetched,
                    parsed = summary.parsed,
                    tracking_found = summary.tracking_found,
                    "Mailbox sync completed"
                );
                Ok(summary)
            }
            Err(e) => {
                if let SyncError::NeedsReconnect { .. } = e {
                    warn!(mailbox_id, "Mailbox credentials rejected, marking for reconnect");
                    self.store
                        .set_mailbox_status(&mailbox.id, MailboxStatus::NeedsReconnect)
                        .await?;
                }
                error!(sync_id = %sync_id, mailbox_id, error = %e, "Mailbox sync failed");
                self.emit(
                    &sync_id,
                    &mailbox,
                    SyncEventKind::SyncFailed,
                    json!({ "error": e.to_string() }),
                )
                .await;
                Err(e)
            }
        }
    }

    async fn run_pass(
        &self,
        sync_id: &str,
        mailbox: &Mailbox,
        limit: usize,
    ) -> Result<SyncSummary, SyncError> {
        let emails = self.fetcher.fetch(mailbox, limit).await?;
        let mut summary = SyncSummary {
            fetched: emails.len(),
            ..Default::default()
        };
        self.emit(
            sync_id,
            mailbox,
            SyncEventKind::EmailsFetched,
            json!({ "totalEmails": emails.len() }),
        )
        .await;

        let mut unparsed = Vec::new();
        for email in emails {
            let raw = RawMessage::new(&mailbox.owner, mailbox.provider, &email);
            let stored = match self.store.find_or_create_raw_message(&raw).await {
                Ok((_, false)) => {
                    summary.duplicates += 1;
                    continue;
                }
                Ok((stored, true)) => stored,
                Err(e) => {
                    error!(message_id = %email.message_id, error = %e, "Failed to persist message");
                    continue;
                }
            };

            let tracking_like = is_tracking_email(&email.sender, &email.subject, &email.body);
            if mailbox.initial_sync_completed && !tracking_like {
                debug!(message_id = %email.message_id, "Skipped by pre-filter");
                self.set_status(&stored.id, MessageStatus::Skipped).await;
                continue;
            }

            let result = self.parser.parse(&email).await;
            summary.parsed += 1;

            if result.has_tracking() {
                let status = match self
                    .merge
                    .upsert_parcel(&mailbox.owner, &result, &email.message_id)
                    .await
                {
                    Ok(parcel) => {
                        summary.tracking_found += 1;
                        debug!(
                            message_id = %email.message_id,
                            parcel_id = %parcel.id,
                            "Message merged into parcel"
                        );
                        MessageStatus::Parsed
                    }
                    Err(e) => {
                        error!(message_id = %email.message_id, error = %e, "Parcel upsert failed");
                        MessageStatus::Error
                    }
                };
                self.set_status(&stored.id, status).await;
                continue;
            }

            summary.no_tracking += 1;
            self.set_status(&stored.id, MessageStatus::Parsed).await;
            if tracking_like {
                self.record_unparsed(&mailbox.owner, &email, &result).await;
                unparsed.push(PendingEmail { email, result });
            }
        }

        self.emit(
            sync_id,
            mailbox,
            SyncEventKind::EmailParsed,
            json!({
                "parsedEmails": summary.parsed,
                "trackingEmails": summary.tracking_found,
            }),
        )
        .await;

        if !unparsed.is_empty() {
            summary.tracking_found += self.enrich_and_merge(&mailbox.owner, unparsed).await;
        }

        Ok(summary)
    }

    async fn set_status(&self, raw_id: &str, status: MessageStatus) {
        if let Err(e) = self.store.set_message_status(raw_id, status).await {
            warn!(raw_id, error = %e, "Failed to update message status");
        }
    }

    async fn record_unparsed(&self, owner: &str, email: &NormalizedEmail, result: &ExtractionResult) {
        let entry = UnparsedEmail {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            message_id: email.message_id.clone(),
            subject: email.subject.clone(),
            sender: email.sender.clone(),
            body: email.body.clone(),
            received_at: email.received_at,
            carrier: (!result.carrier.is_other()).then_some(result.carrier),
            completeness: result.completeness,
            is_tracking_email: true,
            status: UnparsedStatus::Pending,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.record_unparsed(&entry).await {
            warn!(message_id = %email.message_id, error = %e, "Failed to record unparsed message");
        }
    }

    /// Enrich messages without a tracking number and merge the ones that
    /// gain one. Returns the number of parcels upserted.
    async fn enrich_and_merge(&self, owner: &str, mut pending: Vec<PendingEmail>) -> usize {
        let Some(enricher) = self.enricher.as_ref() else {
            return 0;
        };
        enricher.enrich(&mut pending).await;

        let mut merged = 0;
        for item in pending.iter().filter(|p| p.result.has_tracking()) {
            match self
                .merge
                .upsert_parcel(owner, &item.result, &item.email.message_id)
                .await
            {
                Ok(_) => {
                    merged += 1;
                    if let Err(e) = self
                        .store
                        .set_unparsed_status(owner, &item.email.message_id, UnparsedStatus::Processed)
                        .await
                    {
                        warn!(message_id = %item.email.message_id, error = %e, "Failed to update unparsed status");
                    }
                }
                Err(e) => {
                    error!(message_id = %item.email.message_id, error = %e, "Parcel upsert after enrichment failed");
                }
            }
        }
        merged
    }

    /// Re-run enrichment over the owner's stored unparsed backlog.
    pub async fn enrich_backlog(&self, owner: &str, limit: usize) -> Result<usize, SyncError> {
        if self.enricher.is_none() {
            return Ok(0);
        }
        let backlog = self.store.pending_unparsed(owner, limit).await?;
        let pending: Vec<PendingEmail> = backlog
            .into_iter()
            .map(|entry| {
                let email = NormalizedEmail::new(
                    entry.message_id,
                    entry.subject,
                    entry.sender,
                    entry.body,
                    entry.received_at,
                );
                let result = self.parser.parser().parse_email(&email);
                PendingEmail { email, result }
            })
            .collect();
        info!(owner, count = pending.len(), "Enriching unparsed backlog");
        Ok(self.enrich_and_merge(owner, pending).await)
    }

    /// Sync every active mailbox of an owner, a few at a time.
    ///
    /// A failing mailbox is reported and does not stop the others.
    pub async fn sync_owner(&self, owner: &str) -> Result<OwnerSyncReport, SyncError> {
        let mailboxes: Vec<Mailbox> = self
            .store
            .list_mailboxes(owner)
            .await?
            .into_iter()
            .filter(Mailbox::is_active)
            .collect();

        let outcomes: Vec<(String, Result<SyncSummary, SyncError>)> = stream::iter(mailboxes)
            .map(|mailbox| async move {
                let outcome = self.sync_mailbox(owner, &mailbox.id, None).await;
                (mailbox.id, outcome)
            })
            .buffer_unordered(self.config.max_concurrent_mailboxes.max(1))
            .collect()
            .await;

        let mut report = OwnerSyncReport::default();
        for (mailbox_id, outcome) in outcomes {
            match outcome {
                Ok(summary) => {
                    report.summary.absorb(&summary);
                    report.synced.push(mailbox_id);
                }
                Err(e) => report.failed.push((mailbox_id, e.to_string())),
            }
        }
        Ok(report)
    }
}

/// Spawn a background task syncing `owners` every `interval`.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop.
pub fn spawn_sync_loop(
    orchestrator: Arc<SyncOrchestrator>,
    owners: Vec<String>,
    interval: Duration,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(owners = owners.len(), interval_secs = interval.as_secs(), "Sync loop started");
        let mut tick = tokio::time::interval(interval);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Sync loop shutting down");
                return;
            }

            for owner in &owners {
                match orchestrator.sync_owner(owner).await {
                    Ok(report) => {
                        if !report.failed.is_empty() {
                            warn!(owner = %owner, failed = report.failed.len(), "Some mailboxes failed to sync");
                        }
                    }
                    Err(e) => error!(owner = %owner, error = %e, "Owner sync failed"),
                }
            }
        }
    });

    (handle, shutdown_flag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::email::MailProvider;
    use crate::store::MemoryStore;
    use crate::sync::fetcher::InMemoryFetcher;

    fn shipped_email(id: &str) -> NormalizedEmail {
        NormalizedEmail::new(
            id,
            "Votre colis est en route",
            "Chronopost <noreply@chronopost.fr>",
            "Bonjour, votre colis XW123456789FR a été expédié et est en cours de livraison.",
            Utc::now(),
        )
    }

    async fn setup() -> (Arc<MemoryStore>, Arc<InMemoryFetcher>, SyncOrchestrator) {
        let store = Arc::new(MemoryStore::new());
        let fetcher = Arc::new(InMemoryFetcher::new());
        store
            .upsert_mailbox(&Mailbox::new("mb-1", "u1", MailProvider::Gmail, "me@example.com"))
            .await
            .unwrap();
        let orch = SyncOrchestrator::new(
            store.clone(),
            fetcher.clone(),
            HybridParser::new(PipelineConfig::default()),
            SyncConfig::default(),
        );
        (store, fetcher, orch)
    }

    #[tokio::test]
    async fn first_pass_creates_parcel_and_marks_initial_sync() {
        let (store, fetcher, orch) = setup().await;
        fetcher.push("mb-1", shipped_email("m-1")).await;

        let summary = orch.sync_mailbox("u1", "mb-1", None).await.unwrap();
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.parsed, 1);
        assert_eq!(summary.tracking_found, 1);

        let parcels = store.list_parcels("u1").await.unwrap();
        assert_eq!(parcels.len(), 1);
        assert_eq!(parcels[0].tracking_number, "XW123456789FR");
        assert!(store.get_mailbox("mb-1").await.unwrap().unwrap().initial_sync_completed);
    }

    #[tokio::test]
    async fn second_pass_skips_seen_messages() {
        let (_, fetcher, orch) = setup().await;
        fetcher.push("mb-1", shipped_email("m-1")).await;
        orch.sync_mailbox("u1", "mb-1", None).await.unwrap();

        let summary = orch.sync_mailbox("u1", "mb-1", None).await.unwrap();
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.parsed, 0);
    }

    #[tokio::test]
    async fn later_passes_apply_prefilter() {
        let (store, fetcher, orch) = setup().await;
        orch.sync_mailbox("u1", "mb-1", None).await.unwrap();

        let chat =
            NormalizedEmail::new("m-2", "Dîner samedi ?", "ami@example.com", "On se voit samedi ?", Utc::now());
        fetcher.push("mb-1", chat.clone()).await;
        let summary = orch.sync_mailbox("u1", "mb-1", None).await.unwrap();
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.parsed, 0);
        assert!(store.list_parcels("u1").await.unwrap().is_empty());

        let (stored, created) = store
            .find_or_create_raw_message(&RawMessage::new("u1", MailProvider::Gmail, &chat))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(stored.status, MessageStatus::Skipped);
    }

    #[tokio::test]
    async fn expired_credentials_mark_reconnect() {
        let (store, fetcher, orch) = setup().await;
        fetcher.expire("mb-1").await;

        let err = orch.sync_mailbox("u1", "mb-1", None).await.unwrap_err();
        assert!(matches!(err, SyncError::NeedsReconnect { .. }));
        let mailbox = store.get_mailbox("mb-1").await.unwrap().unwrap();
        assert_eq!(mailbox.status, MailboxStatus::NeedsReconnect);

        // Inactive now: skipped without error.
        let summary = orch.sync_mailbox("u1", "mb-1", None).await.unwrap();
        assert_eq!(summary, SyncSummary::default());
    }

    #[tokio::test]
    async fn other_owners_mailbox_is_not_found() {
        let (_, _, orch) = setup().await;
        let err = orch.sync_mailbox("u2", "mb-1", None).await.unwrap_err();
        assert!(matches!(err, SyncError::MailboxNotFound(_)));
    }
}
