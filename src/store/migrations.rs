//! Schema versions for the parcel database.
//!
//! `_migrations` records every applied version; opening a database applies
//! whatever is newer, in order.

use libsql::Connection;

use crate::error::DatabaseError;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Append only.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS parcels (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                tracking_number TEXT NOT NULL,
                carrier TEXT NOT NULL,
                direction TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                title TEXT NOT NULL,
                marketplace TEXT,
                product_name TEXT,
                product_description TEXT,
                recipient_name TEXT,
                sender_name TEXT,
                pickup_address TEXT,
                pickup_deadline TEXT,
                order_number TEXT,
                price_amount TEXT,
                price_currency TEXT,
                pickup_code TEXT,
                qr_code TEXT,
                label_url TEXT,
                source_message_id TEXT NOT NULL,
                reported INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (owner, tracking_number)
            );
            CREATE INDEX IF NOT EXISTS idx_parcels_owner ON parcels(owner);
            CREATE INDEX IF NOT EXISTS idx_parcels_status ON parcels(status);

            CREATE TABLE IF NOT EXISTS parcel_status_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                parcel_id TEXT NOT NULL REFERENCES parcels(id) ON DELETE CASCADE,
                status TEXT NOT NULL,
                email_type TEXT NOT NULL,
                source_message_id TEXT NOT NULL,
                accepted INTEGER NOT NULL,
                at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_status_history_parcel
                ON parcel_status_history(parcel_id);

            CREATE TABLE IF NOT EXISTS raw_messages (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                provider TEXT NOT NULL,
                message_id TEXT NOT NULL,
                subject TEXT NOT NULL,
                sender TEXT NOT NULL,
                body TEXT NOT NULL,
                received_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'fetched',
                created_at TEXT NOT NULL,
                UNIQUE (owner, message_id)
            );
            CREATE INDEX IF NOT EXISTS idx_raw_messages_status ON raw_messages(status);

            CREATE TABLE IF NOT EXISTS unparsed_emails (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                message_id TEXT NOT NULL,
                subject TEXT NOT NULL,
                sender TEXT NOT NULL,
                body TEXT NOT NULL,
                received_at TEXT NOT NULL,
                carrier TEXT,
                completeness INTEGER NOT NULL DEFAULT 0,
                is_tracking_email INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                UNIQUE (owner, message_id)
            );
            CREATE INDEX IF NOT EXISTS idx_unparsed_owner_status
                ON unparsed_emails(owner, status);
        "#,
    },
    Migration {
        version: 2,
        name: "mailbox_sync",
        sql: r#"
            CREATE TABLE IF NOT EXISTS mailboxes (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                provider TEXT NOT NULL,
                address TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                initial_sync_completed INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            CREATE INDEX IF NOT EXISTS idx_mailboxes_owner ON mailboxes(owner);

            CREATE TABLE IF NOT EXISTS sync_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sync_id TEXT NOT NULL,
                owner TEXT NOT NULL,
                mailbox_id TEXT,
                kind TEXT NOT NULL,
                data TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sync_events_sync ON sync_events(sync_id);
            CREATE INDEX IF NOT EXISTS idx_sync_events_owner ON sync_events(owner);
        "#,
    },
];

/// Bring `conn` up to the latest schema version.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("create _migrations: {e}")))?;

    let applied = current_version(conn).await?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "Applying schema migration"
        );
        conn.execute_batch(migration.sql).await.map_err(|e| {
            DatabaseError::Migration(format!("V{} {}: {e}", migration.version, migration.name))
        })?;
        record_version(conn, migration).await?;
    }
    Ok(())
}

/// 0 on a fresh database.
async fn current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("current_version: {e}")))?;
    let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("current_version: {e}")))?
    else {
        return Ok(0);
    };
    row.get::<i64>(0)
        .map_err(|e| DatabaseError::Migration(format!("current_version: {e}")))
}

async fn record_version(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![migration.version, migration.name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("record V{}: {e}", migration.version)))?;
    Ok(())
}
