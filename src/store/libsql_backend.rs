//! libSQL backend for `ParcelStore`.
//!
//! Supports local file and in-memory databases. Fill-if-blank updates are
//! expressed in SQL with `COALESCE(column, ?)` so a concurrent writer can
//! never have populated data overwritten.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use crate::carriers::Carrier;
use crate::classify::{Direction, EmailType};
use crate::email::{MailProvider, MessageStatus, RawMessage};
use crate::error::DatabaseError;
use crate::extract::Price;
use crate::parcel::{Parcel, ParcelPatch, ParcelStatus, StatusHistoryEntry};
use crate::store::migrations;
use crate::store::traits::{ParcelStore, UnparsedEmail, UnparsedStatus};
use crate::sync::events::{SyncEvent, SyncEventKind};
use crate::sync::mailbox::{Mailbox, MailboxStatus};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn load_history(&self, parcel_id: Uuid) -> Result<Vec<StatusHistoryEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT status, email_type, source_message_id, accepted, at
                 FROM parcel_status_history WHERE parcel_id = ?1 ORDER BY id",
                params![parcel_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_history: {e}")))?;

        let mut history = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("load_history: {e}")))?
        {
            let entry = row_to_history(&row)
                .map_err(|e| DatabaseError::Query(format!("load_history row parse: {e}")))?;
            history.push(entry);
        }
        Ok(history)
    }

    async fn insert_history(
        &self,
        parcel_id: Uuid,
        entries: &[StatusHistoryEntry],
    ) -> Result<(), DatabaseError> {
        for entry in entries {
            self.conn()
                .execute(
                    "INSERT INTO parcel_status_history (parcel_id, status, email_type, source_message_id, accepted, at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        parcel_id.to_string(),
                        entry.status.as_str(),
                        entry.email_type.as_str(),
                        entry.source_message_id.clone(),
                        i64::from(entry.accepted),
                        entry.at.to_rfc3339(),
                    ],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("insert_history: {e}")))?;
        }
        Ok(())
    }

    /// Run a parcel query and attach each parcel's history.
    async fn query_parcels(
        &self,
        op: &str,
        sql: &str,
        args: impl libsql::params::IntoParams,
    ) -> Result<Vec<Parcel>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, args)
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut parcels = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            let parcel = row_to_parcel(&row)
                .map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}")))?;
            parcels.push(parcel);
        }
        for parcel in &mut parcels {
            parcel.history = self.load_history(parcel.id).await?;
        }
        Ok(parcels)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_date(s: Option<String>) -> Option<NaiveDate> {
    s.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn opt_date(d: Option<NaiveDate>) -> libsql::Value {
    opt_text_owned(d.map(|d| d.format("%Y-%m-%d").to_string()))
}

fn constraint_or_query(op: &str, e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        DatabaseError::Constraint(format!("{op}: {msg}"))
    } else {
        DatabaseError::Query(format!("{op}: {msg}"))
    }
}

const PARCEL_COLUMNS: &str = "id, owner, tracking_number, carrier, direction, status, title, \
    marketplace, product_name, product_description, recipient_name, sender_name, \
    pickup_address, pickup_deadline, order_number, price_amount, price_currency, \
    pickup_code, qr_code, label_url, source_message_id, reported, created_at, updated_at";

/// Map a row (PARCEL_COLUMNS order) to a Parcel without history.
fn row_to_parcel(row: &libsql::Row) -> Result<Parcel, libsql::Error> {
    let id_str: String = row.get(0)?;
    let carrier: String = row.get(3)?;
    let direction: String = row.get(4)?;
    let status: String = row.get(5)?;
    let price_amount: Option<String> = row.get(15).ok();
    let price_currency: Option<String> = row.get(16).ok();
    let reported: i64 = row.get(21)?;
    let created: String = row.get(22)?;
    let updated: String = row.get(23)?;

    let price = match (price_amount, price_currency) {
        (Some(amount), Some(currency)) => Decimal::from_str(&amount)
            .ok()
            .map(|amount| Price { amount, currency }),
        _ => None,
    };

    Ok(Parcel {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        owner: row.get(1)?,
        tracking_number: row.get(2)?,
        carrier: Carrier::parse(&carrier),
        direction: Direction::parse(&direction).unwrap_or(Direction::Purchase),
        status: ParcelStatus::parse(&status),
        title: row.get(6)?,
        marketplace: row.get(7).ok(),
        product_name: row.get(8).ok(),
        product_description: row.get(9).ok(),
        recipient_name: row.get(10).ok(),
        sender_name: row.get(11).ok(),
        pickup_address: row.get(12).ok(),
        pickup_deadline: parse_date(row.get(13).ok()),
        order_number: row.get(14).ok(),
        price,
        pickup_code: row.get(17).ok(),
        qr_code: row.get(18).ok(),
        label_url: row.get(19).ok(),
        source_message_id: row.get(20)?,
        history: Vec::new(),
        reported: reported != 0,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

fn row_to_history(row: &libsql::Row) -> Result<StatusHistoryEntry, libsql::Error> {
    let status: String = row.get(0)?;
    let email_type: String = row.get(1)?;
    let accepted: i64 = row.get(3)?;
    let at: String = row.get(4)?;
    Ok(StatusHistoryEntry {
        status: ParcelStatus::parse(&status),
        at: parse_datetime(&at),
        email_type: EmailType::parse(&email_type),
        source_message_id: row.get(2)?,
        accepted: accepted != 0,
    })
}

const RAW_COLUMNS: &str =
    "id, owner, provider, message_id, subject, sender, body, received_at, status, created_at";

fn row_to_raw_message(row: &libsql::Row) -> Result<RawMessage, libsql::Error> {
    let provider: String = row.get(2)?;
    let received: String = row.get(7)?;
    let status: String = row.get(8)?;
    let created: String = row.get(9)?;
    Ok(RawMessage {
        id: row.get(0)?,
        owner: row.get(1)?,
        provider: MailProvider::parse(&provider),
        message_id: row.get(3)?,
        subject: row.get(4)?,
        sender: row.get(5)?,
        body: row.get(6)?,
        received_at: parse_datetime(&received),
        status: MessageStatus::parse(&status),
        created_at: parse_datetime(&created),
    })
}

const UNPARSED_COLUMNS: &str = "id, owner, message_id, subject, sender, body, received_at, \
    carrier, completeness, is_tracking_email, status, created_at";

fn row_to_unparsed(row: &libsql::Row) -> Result<UnparsedEmail, libsql::Error> {
    let id_str: String = row.get(0)?;
    let received: String = row.get(6)?;
    let carrier: Option<String> = row.get(7).ok();
    let completeness: i64 = row.get(8)?;
    let is_tracking: i64 = row.get(9)?;
    let status: String = row.get(10)?;
    let created: String = row.get(11)?;
    Ok(UnparsedEmail {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        owner: row.get(1)?,
        message_id: row.get(2)?,
        subject: row.get(3)?,
        sender: row.get(4)?,
        body: row.get(5)?,
        received_at: parse_datetime(&received),
        carrier: carrier.as_deref().and_then(Carrier::from_wire),
        completeness: completeness.clamp(0, 100) as u8,
        is_tracking_email: is_tracking != 0,
        status: UnparsedStatus::parse(&status),
        created_at: parse_datetime(&created),
    })
}

const MAILBOX_COLUMNS: &str = "id, owner, provider, address, status, initial_sync_completed";

fn row_to_mailbox(row: &libsql::Row) -> Result<Mailbox, libsql::Error> {
    let provider: String = row.get(2)?;
    let status: String = row.get(4)?;
    let initial: i64 = row.get(5)?;
    Ok(Mailbox {
        id: row.get(0)?,
        owner: row.get(1)?,
        provider: MailProvider::parse(&provider),
        address: row.get(3)?,
        status: MailboxStatus::parse(&status),
        initial_sync_completed: initial != 0,
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl ParcelStore for LibSqlBackend {
    // ── Parcels ─────────────────────────────────────────────────────

    async fn find_parcel_by_tracking(
        &self,
        owner: &str,
        tracking_number: &str,
    ) -> Result<Option<Parcel>, DatabaseError> {
        let parcels = self
            .query_parcels(
                "find_parcel_by_tracking",
                &format!("SELECT {PARCEL_COLUMNS} FROM parcels WHERE owner = ?1 AND tracking_number = ?2"),
                params![owner, tracking_number],
            )
            .await?;
        Ok(parcels.into_iter().next())
    }

    async fn create_parcel(&self, parcel: &Parcel) -> Result<(), DatabaseError> {
        let (price_amount, price_currency) = match &parcel.price {
            Some(p) => (Some(p.amount.to_string()), Some(p.currency.clone())),
            None => (None, None),
        };

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO parcels ({PARCEL_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)"
                ),
                params![
                    parcel.id.to_string(),
                    parcel.owner.clone(),
                    parcel.tracking_number.clone(),
                    parcel.carrier.as_str(),
                    parcel.direction.as_str(),
                    parcel.status.as_str(),
                    parcel.title.clone(),
                    opt_text(parcel.marketplace.as_deref()),
                    opt_text(parcel.product_name.as_deref()),
                    opt_text(parcel.product_description.as_deref()),
                    opt_text(parcel.recipient_name.as_deref()),
                    opt_text(parcel.sender_name.as_deref()),
                    opt_text(parcel.pickup_address.as_deref()),
                    opt_date(parcel.pickup_deadline),
                    opt_text(parcel.order_number.as_deref()),
                    opt_text_owned(price_amount),
                    opt_text_owned(price_currency),
                    opt_text(parcel.pickup_code.as_deref()),
                    opt_text(parcel.qr_code.as_deref()),
                    opt_text(parcel.label_url.as_deref()),
                    parcel.source_message_id.clone(),
                    i64::from(parcel.reported),
                    parcel.created_at.to_rfc3339(),
                    parcel.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| constraint_or_query("create_parcel", e))?;

        self.insert_history(parcel.id, &parcel.history).await?;
        debug!(parcel_id = %parcel.id, tracking = %parcel.tracking_number, "Parcel inserted into DB");
        Ok(())
    }

    async fn update_parcel(&self, id: Uuid, patch: &ParcelPatch) -> Result<Parcel, DatabaseError> {
        let (price_amount, price_currency) = match &patch.price {
            Some(p) => (Some(p.amount.to_string()), Some(p.currency.clone())),
            None => (None, None),
        };

        // Right-hand sides see the pre-update row, so price_currency is
        // only written together with a blank price_amount.
        let affected = self
            .conn()
            .execute(
                "UPDATE parcels SET
                    status = COALESCE(?1, status),
                    carrier = CASE WHEN carrier = 'other' AND ?2 IS NOT NULL THEN ?2 ELSE carrier END,
                    marketplace = COALESCE(marketplace, ?3),
                    product_name = COALESCE(product_name, ?4),
                    product_description = COALESCE(product_description, ?5),
                    recipient_name = COALESCE(recipient_name, ?6),
                    sender_name = COALESCE(sender_name, ?7),
                    pickup_address = COALESCE(pickup_address, ?8),
                    pickup_deadline = COALESCE(pickup_deadline, ?9),
                    order_number = COALESCE(order_number, ?10),
                    price_currency = CASE WHEN price_amount IS NULL THEN ?12 ELSE price_currency END,
                    price_amount = COALESCE(price_amount, ?11),
                    pickup_code = COALESCE(pickup_code, ?13),
                    qr_code = COALESCE(qr_code, ?14),
                    label_url = COALESCE(label_url, ?15),
                    updated_at = ?16
                 WHERE id = ?17",
                params![
                    opt_text(patch.status.as_ref().map(|s| s.as_str())),
                    opt_text(patch.carrier.as_ref().map(|c| c.as_str())),
                    opt_text(patch.marketplace.as_deref()),
                    opt_text(patch.product_name.as_deref()),
                    opt_text(patch.product_description.as_deref()),
                    opt_text(patch.recipient_name.as_deref()),
                    opt_text(patch.sender_name.as_deref()),
                    opt_text(patch.pickup_address.as_deref()),
                    opt_date(patch.pickup_deadline),
                    opt_text(patch.order_number.as_deref()),
                    opt_text_owned(price_amount),
                    opt_text_owned(price_currency),
                    opt_text(patch.pickup_code.as_deref()),
                    opt_text(patch.qr_code.as_deref()),
                    opt_text(patch.label_url.as_deref()),
                    Utc::now().to_rfc3339(),
                    id.to_string(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_parcel: {e}")))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "parcel".into(),
                id: id.to_string(),
            });
        }

        self.insert_history(id, &patch.history).await?;
        self.get_parcel(id).await?.ok_or_else(|| DatabaseError::NotFound {
            entity: "parcel".into(),
            id: id.to_string(),
        })
    }

    async fn get_parcel(&self, id: Uuid) -> Result<Option<Parcel>, DatabaseError> {
        let parcels = self
            .query_parcels(
                "get_parcel",
                &format!("SELECT {PARCEL_COLUMNS} FROM parcels WHERE id = ?1"),
                params![id.to_string()],
            )
            .await?;
        Ok(parcels.into_iter().next())
    }

    async fn list_parcels(&self, owner: &str) -> Result<Vec<Parcel>, DatabaseError> {
        self.query_parcels(
            "list_parcels",
            &format!("SELECT {PARCEL_COLUMNS} FROM parcels WHERE owner = ?1 ORDER BY updated_at DESC"),
            params![owner],
        )
        .await
    }

    async fn set_reported(&self, id: Uuid, reported: bool) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE parcels SET reported = ?1, updated_at = ?2 WHERE id = ?3",
                params![i64::from(reported), Utc::now().to_rfc3339(), id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_reported: {e}")))?;
        Ok(())
    }

    // ── Raw messages ────────────────────────────────────────────────

    async fn find_or_create_raw_message(
        &self,
        message: &RawMessage,
    ) -> Result<(RawMessage, bool), DatabaseError> {
        let inserted = self
            .conn()
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO raw_messages ({RAW_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    message.id.clone(),
                    message.owner.clone(),
                    message.provider.as_str(),
                    message.message_id.clone(),
                    message.subject.clone(),
                    message.sender.clone(),
                    message.body.clone(),
                    message.received_at.to_rfc3339(),
                    message.status.as_str(),
                    message.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_or_create_raw_message: {e}")))?;

        if inserted > 0 {
            return Ok((message.clone(), true));
        }

        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {RAW_COLUMNS} FROM raw_messages WHERE owner = ?1 AND message_id = ?2"),
                params![message.owner.clone(), message.message_id.clone()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_or_create_raw_message: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let existing = row_to_raw_message(&row).map_err(|e| {
                    DatabaseError::Query(format!("find_or_create_raw_message row parse: {e}"))
                })?;
                Ok((existing, false))
            }
            Ok(None) => Err(DatabaseError::NotFound {
                entity: "raw_message".into(),
                id: message.message_id.clone(),
            }),
            Err(e) => Err(DatabaseError::Query(format!("find_or_create_raw_message: {e}"))),
        }
    }

    async fn set_message_status(&self, id: &str, status: MessageStatus) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE raw_messages SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_message_status: {e}")))?;
        Ok(())
    }

    // ── Unparsed messages ───────────────────────────────────────────

    async fn record_unparsed(&self, entry: &UnparsedEmail) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO unparsed_emails ({UNPARSED_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    entry.id.to_string(),
                    entry.owner.clone(),
                    entry.message_id.clone(),
                    entry.subject.clone(),
                    entry.sender.clone(),
                    entry.body.clone(),
                    entry.received_at.to_rfc3339(),
                    opt_text(entry.carrier.as_ref().map(|c| c.as_str())),
                    i64::from(entry.completeness),
                    i64::from(entry.is_tracking_email),
                    entry.status.as_str(),
                    entry.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_unparsed: {e}")))?;
        Ok(())
    }

    async fn pending_unparsed(
        &self,
        owner: &str,
        limit: usize,
    ) -> Result<Vec<UnparsedEmail>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {UNPARSED_COLUMNS} FROM unparsed_emails
                     WHERE owner = ?1 AND status = 'pending' ORDER BY created_at LIMIT ?2"
                ),
                params![owner, limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("pending_unparsed: {e}")))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("pending_unparsed: {e}")))?
        {
            let entry = row_to_unparsed(&row)
                .map_err(|e| DatabaseError::Query(format!("pending_unparsed row parse: {e}")))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    async fn set_unparsed_status(
        &self,
        owner: &str,
        message_id: &str,
        status: UnparsedStatus,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE unparsed_emails SET status = ?1 WHERE owner = ?2 AND message_id = ?3",
                params![status.as_str(), owner, message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_unparsed_status: {e}")))?;
        Ok(())
    }

    // ── Mailboxes ───────────────────────────────────────────────────

    async fn upsert_mailbox(&self, mailbox: &Mailbox) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO mailboxes (id, owner, provider, address, status, initial_sync_completed, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))
                 ON CONFLICT(id) DO UPDATE SET
                    owner = excluded.owner,
                    provider = excluded.provider,
                    address = excluded.address,
                    status = excluded.status,
                    initial_sync_completed = excluded.initial_sync_completed,
                    updated_at = excluded.updated_at",
                params![
                    mailbox.id.clone(),
                    mailbox.owner.clone(),
                    mailbox.provider.as_str(),
                    mailbox.address.clone(),
                    mailbox.status.as_str(),
                    i64::from(mailbox.initial_sync_completed),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_mailbox: {e}")))?;
        Ok(())
    }

    async fn list_mailboxes(&self, owner: &str) -> Result<Vec<Mailbox>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {MAILBOX_COLUMNS} FROM mailboxes WHERE owner = ?1 ORDER BY id"),
                params![owner],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_mailboxes: {e}")))?;

        let mut mailboxes = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_mailboxes: {e}")))?
        {
            let mailbox = row_to_mailbox(&row)
                .map_err(|e| DatabaseError::Query(format!("list_mailboxes row parse: {e}")))?;
            mailboxes.push(mailbox);
        }
        Ok(mailboxes)
    }

    async fn get_mailbox(&self, id: &str) -> Result<Option<Mailbox>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {MAILBOX_COLUMNS} FROM mailboxes WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_mailbox: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let mailbox = row_to_mailbox(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_mailbox row parse: {e}")))?;
                Ok(Some(mailbox))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_mailbox: {e}"))),
        }
    }

    async fn set_mailbox_status(&self, id: &str, status: MailboxStatus) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE mailboxes SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![status.as_str(), id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_mailbox_status: {e}")))?;
        debug!(mailbox_id = id, status = status.as_str(), "Mailbox status updated");
        Ok(())
    }

    async fn mark_initial_sync_completed(&self, id: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE mailboxes SET initial_sync_completed = 1, updated_at = datetime('now') WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("mark_initial_sync_completed: {e}")))?;
        Ok(())
    }

    // ── Sync events ─────────────────────────────────────────────────

    async fn record_sync_event(&self, event: &SyncEvent) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO sync_events (sync_id, owner, mailbox_id, kind, data, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.sync_id.clone(),
                    event.owner.clone(),
                    opt_text(event.mailbox_id.as_deref()),
                    event.kind.as_str(),
                    event.data.to_string(),
                    event.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_sync_event: {e}")))?;
        Ok(())
    }

    async fn list_sync_events(&self, sync_id: &str) -> Result<Vec<SyncEvent>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT sync_id, owner, mailbox_id, kind, data, created_at
                 FROM sync_events WHERE sync_id = ?1 ORDER BY id",
                params![sync_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_sync_events: {e}")))?;

        let mut events = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_sync_events: {e}")))?
        {
            let kind: String = row
                .get(3)
                .map_err(|e| DatabaseError::Query(format!("list_sync_events row parse: {e}")))?;
            let Some(kind) = SyncEventKind::parse(&kind) else {
                continue;
            };
            let data: String = row.get(4).unwrap_or_default();
            let created: String = row.get(5).unwrap_or_default();
            events.push(SyncEvent {
                sync_id: row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("list_sync_events row parse: {e}")))?,
                owner: row
                    .get(1)
                    .map_err(|e| DatabaseError::Query(format!("list_sync_events row parse: {e}")))?,
                mailbox_id: row.get(2).ok(),
                kind,
                data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
                created_at: parse_datetime(&created),
            });
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::NormalizedEmail;
    use rust_decimal_macros::dec;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_parcel(owner: &str, tracking: &str) -> Parcel {
        let now = Utc::now();
        Parcel {
            id: Uuid::new_v4(),
            owner: owner.into(),
            tracking_number: tracking.into(),
            carrier: Carrier::Other,
            direction: Direction::Purchase,
            status: ParcelStatus::InTransit,
            title: "Veste en jean".into(),
            marketplace: None,
            product_name: Some("Veste en jean".into()),
            product_description: None,
            recipient_name: None,
            sender_name: None,
            pickup_address: None,
            pickup_deadline: None,
            order_number: None,
            price: None,
            pickup_code: None,
            qr_code: None,
            label_url: None,
            source_message_id: "m1".into(),
            history: vec![StatusHistoryEntry {
                status: ParcelStatus::InTransit,
                at: now,
                email_type: EmailType::Shipped,
                source_message_id: "m1".into(),
                accepted: true,
            }],
            reported: false,
            created_at: now,
            updated_at: now,
        }
    }

    // ── Parcel tests ────────────────────────────────────────────────

    #[tokio::test]
    async fn create_and_find_by_tracking() {
        let db = test_db().await;
        let parcel = make_parcel("u1", "XW123456789FR");
        db.create_parcel(&parcel).await.unwrap();

        let fetched = db
            .find_parcel_by_tracking("u1", "XW123456789FR")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.id, parcel.id);
        assert_eq!(fetched.status, ParcelStatus::InTransit);
        assert_eq!(fetched.history.len(), 1);
        assert!(fetched.history[0].accepted);

        assert!(db.find_parcel_by_tracking("u2", "XW123456789FR").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_parcel_is_constraint_error() {
        let db = test_db().await;
        db.create_parcel(&make_parcel("u1", "XW123456789FR")).await.unwrap();
        let err = db
            .create_parcel(&make_parcel("u1", "XW123456789FR"))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Constraint(_)));
    }

    #[tokio::test]
    async fn update_fills_only_blank_fields() {
        let db = test_db().await;
        let parcel = make_parcel("u1", "XW123456789FR");
        db.create_parcel(&parcel).await.unwrap();

        let updated = db
            .update_parcel(
                parcel.id,
                &ParcelPatch {
                    status: Some(ParcelStatus::Delivered),
                    carrier: Some(Carrier::Chronopost),
                    product_name: Some("Manteau".into()),
                    pickup_code: Some("4821".into()),
                    pickup_deadline: NaiveDate::from_ymd_opt(2026, 3, 14),
                    price: Some(Price {
                        amount: dec!(24.90),
                        currency: "EUR".into(),
                    }),
                    history: vec![StatusHistoryEntry {
                        status: ParcelStatus::Delivered,
                        at: Utc::now(),
                        email_type: EmailType::PickupReady,
                        source_message_id: "m2".into(),
                        accepted: true,
                    }],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.status, ParcelStatus::Delivered);
        assert_eq!(updated.carrier, Carrier::Chronopost);
        assert_eq!(updated.product_name.as_deref(), Some("Veste en jean"));
        assert_eq!(updated.pickup_code.as_deref(), Some("4821"));
        assert_eq!(updated.pickup_deadline, NaiveDate::from_ymd_opt(2026, 3, 14));
        assert_eq!(updated.price.as_ref().map(|p| p.amount), Some(dec!(24.90)));
        assert_eq!(updated.history.len(), 2);

        let again = db
            .update_parcel(
                parcel.id,
                &ParcelPatch {
                    carrier: Some(Carrier::Dhl),
                    price: Some(Price {
                        amount: dec!(99.00),
                        currency: "USD".into(),
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(again.carrier, Carrier::Chronopost);
        assert_eq!(again.price.map(|p| p.currency), Some("EUR".to_string()));
    }

    #[tokio::test]
    async fn update_missing_parcel_is_not_found() {
        let db = test_db().await;
        let err = db
            .update_parcel(Uuid::new_v4(), &ParcelPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn reported_flag_round_trips() {
        let db = test_db().await;
        let parcel = make_parcel("u1", "XW123456789FR");
        db.create_parcel(&parcel).await.unwrap();
        db.set_reported(parcel.id, true).await.unwrap();
        assert!(db.get_parcel(parcel.id).await.unwrap().unwrap().reported);
    }

    // ── Raw message tests ───────────────────────────────────────────

    #[tokio::test]
    async fn raw_messages_dedup_per_owner() {
        let db = test_db().await;
        let email = NormalizedEmail::new("m-1", "Votre colis", "a@b.c", "body", Utc::now());

        let (first, created) = db
            .find_or_create_raw_message(&RawMessage::new("u1", MailProvider::Gmail, &email))
            .await
            .unwrap();
        assert!(created);

        let (again, created) = db
            .find_or_create_raw_message(&RawMessage::new("u1", MailProvider::Gmail, &email))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(again.id, first.id);
        assert_eq!(again.subject, "Votre colis");

        db.set_message_status(&first.id, MessageStatus::Parsed).await.unwrap();
        let (parsed, _) = db
            .find_or_create_raw_message(&RawMessage::new("u1", MailProvider::Gmail, &email))
            .await
            .unwrap();
        assert_eq!(parsed.status, MessageStatus::Parsed);
    }

    // ── Unparsed tests ──────────────────────────────────────────────

    #[tokio::test]
    async fn unparsed_pending_queue() {
        let db = test_db().await;
        let entry = UnparsedEmail {
            id: Uuid::new_v4(),
            owner: "u1".into(),
            message_id: "m-9".into(),
            subject: "Votre commande".into(),
            sender: "shop@example.com".into(),
            body: "merci".into(),
            received_at: Utc::now(),
            carrier: Some(Carrier::Colissimo),
            completeness: 20,
            is_tracking_email: true,
            status: UnparsedStatus::Pending,
            created_at: Utc::now(),
        };
        db.record_unparsed(&entry).await.unwrap();
        db.record_unparsed(&entry).await.unwrap();

        let pending = db.pending_unparsed("u1", 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].carrier, Some(Carrier::Colissimo));
        assert_eq!(pending[0].completeness, 20);

        db.set_unparsed_status("u1", "m-9", UnparsedStatus::Processed)
            .await
            .unwrap();
        assert!(db.pending_unparsed("u1", 10).await.unwrap().is_empty());
    }

    // ── Mailbox and event tests ─────────────────────────────────────

    #[tokio::test]
    async fn mailbox_lifecycle() {
        let db = test_db().await;
        let mailbox = Mailbox::new("mb-1", "u1", MailProvider::Gmail, "me@example.com");
        db.upsert_mailbox(&mailbox).await.unwrap();
        db.mark_initial_sync_completed("mb-1").await.unwrap();
        db.set_mailbox_status("mb-1", MailboxStatus::NeedsReconnect)
            .await
            .unwrap();

        let fetched = db.get_mailbox("mb-1").await.unwrap().unwrap();
        assert!(fetched.initial_sync_completed);
        assert_eq!(fetched.status, MailboxStatus::NeedsReconnect);
        assert_eq!(db.list_mailboxes("u1").await.unwrap().len(), 1);
        assert!(db.list_mailboxes("u2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sync_events_in_order() {
        let db = test_db().await;
        for kind in [SyncEventKind::SyncStarted, SyncEventKind::SyncCompleted] {
            db.record_sync_event(&SyncEvent::new(
                "sync_1",
                "u1",
                Some("mb-1"),
                kind,
                serde_json::json!({"fetched": 3}),
            ))
            .await
            .unwrap();
        }
        let events = db.list_sync_events("sync_1").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, SyncEventKind::SyncStarted);
        assert_eq!(events[1].data["fetched"], 3);
    }

    #[tokio::test]
    async fn local_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("parcels.db");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.create_parcel(&make_parcel("u1", "XW123456789FR")).await.unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert_eq!(db.list_parcels("u1").await.unwrap().len(), 1);
    }
}
