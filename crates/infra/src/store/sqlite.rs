//! SQLite-backed store.
//!
//! The shop's data lives in one local SQLite file with three tables:
//! `items` (the catalog), `changes_log` (the audit trail) and `operators`
//! (login credentials).
//!
//! ## Connections
//!
//! The public API is synchronous. Each call builds a one-off current-thread
//! runtime, opens a connection, runs its statements and closes the
//! connection again. Nothing is held between calls, so the scan thread and
//! the UI thread can share one `SqliteStore`. A bounded busy timeout keeps a
//! lookup from waiting forever on a locked database. Do not call these
//! methods from inside an async runtime.
//!
//! ## Error Mapping
//!
//! | SQLx error | StoreError |
//! |---|---|
//! | Database (check / not-null / unique / foreign key) | `Constraint` |
//! | Database (busy / locked) | `Unavailable` |
//! | Database (other) | `Storage` |
//! | Io, Tls, PoolTimedOut, PoolClosed | `Unavailable` |
//! | Other | `Storage` |

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::error::ErrorKind;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use stockroom_core::{ItemId, OperatorId, QUANTITY_DECIMALS, normalize_quantity};
use stockroom_inventory::{AuditEntry, PendingDelta};

use super::r#trait::{InventoryStore, ItemRecord, StoreError};

/// Default time a statement waits on a locked database before failing.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS items (
        item_id   TEXT PRIMARY KEY,
        name      TEXT NOT NULL,
        quantity  REAL NOT NULL CHECK (quantity >= 0)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS changes_log (
        entry_id          TEXT PRIMARY KEY,
        item_id           TEXT NOT NULL,
        item_name         TEXT NOT NULL,
        original_quantity REAL NOT NULL,
        new_quantity      REAL NOT NULL,
        quantity_change   REAL NOT NULL,
        operator_id       TEXT NOT NULL,
        recorded_at       TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS changes_log_by_item
        ON changes_log (item_id, recorded_at)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS operators (
        operator_id TEXT PRIMARY KEY,
        credential  TEXT NOT NULL
    )
    "#,
];

#[derive(Debug, Clone)]
pub struct SqliteStore {
    options: SqliteConnectOptions,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url` and ensure the schema.
    ///
    /// `url` is a SQLx SQLite URL such as `sqlite:///var/lib/shop/stock.db`.
    pub fn open(url: &str) -> Result<Self, StoreError> {
        Self::open_with_timeout(url, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_timeout(url: &str, busy_timeout: Duration) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Unavailable(format!("invalid database url {url:?}: {e}")))?
            .create_if_missing(true)
            .busy_timeout(busy_timeout);

        let store = Self { options };
        store.with_runtime("ensure_schema", async {
            let mut conn = store.connect("ensure_schema").await?;
            let result = ensure_schema(&mut conn).await;
            release(conn).await;
            result
        })?;
        debug!(url, "sqlite store ready");
        Ok(store)
    }

    /// Create or replace a catalog item.
    pub fn insert_item(&self, record: &ItemRecord) -> Result<(), StoreError> {
        self.with_runtime("insert_item", async {
            let mut conn = self.connect("insert_item").await?;
            let result = sqlx::query(
                r#"
                INSERT INTO items (item_id, name, quantity)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(item_id)
                DO UPDATE SET
                    name = excluded.name,
                    quantity = excluded.quantity
                "#,
            )
            .bind(record.item_id.as_str())
            .bind(&record.name)
            .bind(normalize_quantity(record.quantity))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error("insert_item", e));
            release(conn).await;
            result
        })
    }

    /// Create or replace an operator's login credential.
    pub fn register_operator(
        &self,
        operator: &OperatorId,
        credential: &str,
    ) -> Result<(), StoreError> {
        self.with_runtime("register_operator", async {
            let mut conn = self.connect("register_operator").await?;
            let result = sqlx::query(
                r#"
                INSERT INTO operators (operator_id, credential)
                VALUES (?1, ?2)
                ON CONFLICT(operator_id)
                DO UPDATE SET credential = excluded.credential
                "#,
            )
            .bind(operator.as_str())
            .bind(credential)
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error("register_operator", e));
            release(conn).await;
            result
        })
    }

    fn with_runtime<T, F>(&self, operation: &str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                StoreError::Unavailable(format!("failed to create runtime for {operation}: {e}"))
            })?;
        rt.block_on(fut)
    }

    async fn connect(&self, operation: &str) -> Result<SqliteConnection, StoreError> {
        self.options
            .connect()
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }
}

async fn release(conn: SqliteConnection) {
    if let Err(err) = conn.close().await {
        warn!(error = %err, "failed to close sqlite connection cleanly");
    }
}

async fn ensure_schema(conn: &mut SqliteConnection) -> Result<(), StoreError> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    }
    Ok(())
}

async fn apply_deltas_tx(
    conn: &mut SqliteConnection,
    deltas: &[PendingDelta],
) -> Result<(), StoreError> {
    let mut tx = conn
        .begin()
        .await
        .map_err(|e| map_sqlx_error("begin_transaction", e))?;

    for d in deltas {
        let outcome = sqlx::query(
            r#"
            UPDATE items
            SET quantity = ROUND(quantity + ?1, ?3)
            WHERE item_id = ?2
            "#,
        )
        .bind(d.delta)
        .bind(d.item_id.as_str())
        .bind(i64::from(QUANTITY_DECIMALS))
        .execute(&mut *tx)
        .await;

        let failure = match outcome {
            Ok(done) if done.rows_affected() == 1 => None,
            Ok(_) => Some(StoreError::NotFound(d.item_id.clone())),
            Err(e) => Some(map_sqlx_error("apply_deltas", e)),
        };

        if let Some(err) = failure {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(err);
        }
    }

    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("commit_transaction", e))
}

fn row_to_item(row: &SqliteRow) -> Result<ItemRecord, StoreError> {
    let id: String = row.try_get("item_id").map_err(|e| decode_error("item_id", e))?;
    let item_id = ItemId::new(id).map_err(|e| StoreError::Storage(e.to_string()))?;
    Ok(ItemRecord {
        item_id,
        name: row.try_get("name").map_err(|e| decode_error("name", e))?,
        quantity: row
            .try_get("quantity")
            .map_err(|e| decode_error("quantity", e))?,
    })
}

fn row_to_entry(row: &SqliteRow) -> Result<AuditEntry, StoreError> {
    let entry_id: String = row
        .try_get("entry_id")
        .map_err(|e| decode_error("entry_id", e))?;
    let item_id: String = row.try_get("item_id").map_err(|e| decode_error("item_id", e))?;
    let operator_id: String = row
        .try_get("operator_id")
        .map_err(|e| decode_error("operator_id", e))?;
    let recorded_at: String = row
        .try_get("recorded_at")
        .map_err(|e| decode_error("recorded_at", e))?;

    Ok(AuditEntry {
        entry_id: Uuid::parse_str(&entry_id)
            .map_err(|e| StoreError::Storage(format!("invalid entry_id in changes_log: {e}")))?,
        item_id: ItemId::new(item_id).map_err(|e| StoreError::Storage(e.to_string()))?,
        item_name: row
            .try_get("item_name")
            .map_err(|e| decode_error("item_name", e))?,
        original_quantity: row
            .try_get("original_quantity")
            .map_err(|e| decode_error("original_quantity", e))?,
        new_quantity: row
            .try_get("new_quantity")
            .map_err(|e| decode_error("new_quantity", e))?,
        delta: row
            .try_get("quantity_change")
            .map_err(|e| decode_error("quantity_change", e))?,
        actor: OperatorId::new(operator_id).map_err(|e| StoreError::Storage(e.to_string()))?,
        recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::Storage(format!("invalid recorded_at in changes_log: {e}")))?,
    })
}

fn decode_error(column: &str, err: sqlx::Error) -> StoreError {
    StoreError::Storage(format!("failed to decode column {column}: {err}"))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            // SQLITE_BUSY (5) / SQLITE_LOCKED (6), possibly extended.
            let busy = db_err
                .code()
                .and_then(|c| c.parse::<i32>().ok())
                .is_some_and(|code| matches!(code & 0xff, 5 | 6));
            if busy {
                return StoreError::Unavailable(msg);
            }
            match db_err.kind() {
                ErrorKind::CheckViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation => StoreError::Constraint(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {operation}: {e}")),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("no connection available in {operation}"))
        }
        other => StoreError::Storage(format!("sqlx error in {operation}: {other}")),
    }
}

impl InventoryStore for SqliteStore {
    #[instrument(skip(self), err)]
    fn load_catalog(&self) -> Result<Vec<ItemRecord>, StoreError> {
        self.with_runtime("load_catalog", async {
            let mut conn = self.connect("load_catalog").await?;
            let rows = sqlx::query(
                r#"
                SELECT item_id, name, quantity
                FROM items
                ORDER BY item_id ASC
                "#,
            )
            .fetch_all(&mut conn)
            .await
            .map_err(|e| map_sqlx_error("load_catalog", e));
            release(conn).await;

            rows?.iter().map(row_to_item).collect()
        })
    }

    #[instrument(skip(self, deltas), fields(items = deltas.len()), err)]
    fn apply_deltas(&self, deltas: &[PendingDelta]) -> Result<(), StoreError> {
        if deltas.is_empty() {
            return Ok(());
        }
        self.with_runtime("apply_deltas", async {
            let mut conn = self.connect("apply_deltas").await?;
            let result = apply_deltas_tx(&mut conn, deltas).await;
            release(conn).await;
            result
        })
    }

    #[instrument(
        skip(self, entry),
        fields(entry_id = %entry.entry_id, item_id = %entry.item_id),
        err
    )]
    fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.with_runtime("append_audit", async {
            let mut conn = self.connect("append_audit").await?;
            // Re-sending an entry after an ambiguous failure must not duplicate it.
            let result = sqlx::query(
                r#"
                INSERT INTO changes_log (
                    entry_id,
                    item_id,
                    item_name,
                    original_quantity,
                    new_quantity,
                    quantity_change,
                    operator_id,
                    recorded_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(entry_id) DO NOTHING
                "#,
            )
            .bind(entry.entry_id.to_string())
            .bind(entry.item_id.as_str())
            .bind(&entry.item_name)
            .bind(entry.original_quantity)
            .bind(entry.new_quantity)
            .bind(entry.delta)
            .bind(entry.actor.as_str())
            .bind(entry.recorded_at.to_rfc3339())
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error("append_audit", e));
            release(conn).await;
            result
        })
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    fn find_item(&self, item_id: &ItemId) -> Result<Option<ItemRecord>, StoreError> {
        self.with_runtime("find_item", async {
            let mut conn = self.connect("find_item").await?;
            let row = sqlx::query(
                r#"
                SELECT item_id, name, quantity
                FROM items
                WHERE item_id = ?1
                "#,
            )
            .bind(item_id.as_str())
            .fetch_optional(&mut conn)
            .await
            .map_err(|e| map_sqlx_error("find_item", e));
            release(conn).await;

            row?.as_ref().map(row_to_item).transpose()
        })
    }

    #[instrument(skip(self, credential), fields(operator = %operator), err)]
    fn verify_credentials(
        &self,
        operator: &OperatorId,
        credential: &str,
    ) -> Result<bool, StoreError> {
        self.with_runtime("verify_credentials", async {
            let mut conn = self.connect("verify_credentials").await?;
            let row = sqlx::query(
                r#"
                SELECT 1 AS matched
                FROM operators
                WHERE operator_id = ?1
                  AND credential = ?2
                "#,
            )
            .bind(operator.as_str())
            .bind(credential)
            .fetch_optional(&mut conn)
            .await
            .map_err(|e| map_sqlx_error("verify_credentials", e));
            release(conn).await;

            Ok(row?.is_some())
        })
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    fn audit_history(&self, item_id: &ItemId) -> Result<Vec<AuditEntry>, StoreError> {
        self.with_runtime("audit_history", async {
            let mut conn = self.connect("audit_history").await?;
            let rows = sqlx::query(
                r#"
                SELECT
                    entry_id,
                    item_id,
                    item_name,
                    original_quantity,
                    new_quantity,
                    quantity_change,
                    operator_id,
                    recorded_at
                FROM changes_log
                WHERE item_id = ?1
                ORDER BY recorded_at ASC, rowid ASC
                "#,
            )
            .bind(item_id.as_str())
            .fetch_all(&mut conn)
            .await
            .map_err(|e| map_sqlx_error("audit_history", e));
            release(conn).await;

            rows?.iter().map(row_to_entry).collect()
        })
    }
}
