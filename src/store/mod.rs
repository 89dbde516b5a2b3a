//! Message store with SQLite persistence.
//!
//! The [`MessageStore`] is the sole reader/writer of persisted message and
//! audit state, and the only component that interprets "due" semantics.
//! Status *policy* (which transitions are legal) lives in the lifecycle
//! engine; the store enforces the column-level pairing of `sent_at` and
//! `provider_message_id` with a successful send.
//!
//! Timestamps are RFC 3339 UTC text, so lexicographic comparison in SQL is
//! chronological.

pub mod contacts;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{info, trace};

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

/// Lifecycle status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Created for immediate delivery, not yet attempted.
    Pending,
    /// Created for deferred delivery; becomes due when `scheduled_at` passes.
    Scheduled,
    /// Delivery attempt succeeded. Terminal.
    Sent,
    /// Delivery attempt failed. Terminal — resubmission is the caller's job.
    Failed,
}

impl MessageStatus {
    /// Returns the string representation stored in SQLite.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    /// Parse from a SQLite text value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a recognised status.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "pending" => Ok(Self::Pending),
            "scheduled" => Ok(Self::Scheduled),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => Err(StoreError::InvalidStatus {
                value: other.to_owned(),
            }),
        }
    }
}

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Database row id.
    pub id: i64,
    /// Optional reference into the contact directory.
    pub contact_id: Option<i64>,
    /// Recipient address.
    pub recipient: String,
    /// Message body text.
    pub body: String,
    /// Target provider name.
    pub provider: String,
    /// Current lifecycle status.
    pub status: MessageStatus,
    /// Backend-assigned identifier, set only after a successful send.
    pub provider_message_id: Option<String>,
    /// RFC 3339 deferred-delivery time; `None` means as soon as possible.
    pub scheduled_at: Option<String>,
    /// RFC 3339 time of the successful send attempt.
    pub sent_at: Option<String>,
    /// RFC 3339 creation time (set by SQLite on insert).
    pub created_at: String,
}

/// Parameters for inserting a new message.
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    /// Recipient address.
    pub recipient: &'a str,
    /// Message body text.
    pub body: &'a str,
    /// Target provider name.
    pub provider: &'a str,
    /// Initial status (`Pending` or `Scheduled`).
    pub status: MessageStatus,
    /// Deferred-delivery time for the scheduled path.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Optional reference into the contact directory.
    pub contact_id: Option<i64>,
}

/// One immutable audit row recording a dispatch attempt's outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Database row id.
    pub id: i64,
    /// The message this entry belongs to.
    pub message_id: i64,
    /// Status the message reached at this point.
    pub status: MessageStatus,
    /// Raw provider response or error text.
    pub detail: String,
    /// RFC 3339 creation time.
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from message store operations.
///
/// Storage I/O failures propagate uncaught — there is no internal retry.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An unrecognised status value was read from the database.
    #[error("invalid status value: {value:?}")]
    InvalidStatus {
        /// The unexpected value.
        value: String,
    },

    /// A contact with this phone number already exists.
    #[error("contact with phone {phone} already exists")]
    DuplicatePhone {
        /// The conflicting phone number.
        phone: String,
    },
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Row type returned by SQLite queries for messages.
type MessageRow = (
    i64,
    Option<i64>,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
);

const MESSAGE_COLUMNS: &str = "id, contact_id, recipient, body, provider, status, \
     provider_message_id, scheduled_at, sent_at, created_at";

/// SQLite-backed store for messages and their audit trail.
///
/// Cheap to clone — wraps a connection pool. Reads and writes run as
/// individual statements against the pool, so concurrent immediate sends are
/// not blocked by a drain pass in progress.
#[derive(Debug, Clone)]
pub struct MessageStore {
    db: SqlitePool,
}

impl MessageStore {
    /// Wrap an existing pool. The schema must already be applied.
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Open a file-backed store, creating the database and applying the
    /// schema if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the pool cannot be opened or the
    /// schema fails to apply.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let db = SqlitePoolOptions::new().connect_with(opts).await?;
        migrate(&db).await?;
        info!(path = %path.display(), "message store opened");
        Ok(Self { db })
    }

    /// Insert a new message and return its assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on SQLite failure.
    pub async fn create_message(&self, new: NewMessage<'_>) -> Result<i64, StoreError> {
        let scheduled_at = new.scheduled_at.map(|t| t.to_rfc3339());
        let result = sqlx::query(
            "INSERT INTO messages (contact_id, recipient, body, provider, status, scheduled_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(new.contact_id)
        .bind(new.recipient)
        .bind(new.body)
        .bind(new.provider)
        .bind(new.status.as_str())
        .bind(&scheduled_at)
        .execute(&self.db)
        .await?;

        let id = result.last_insert_rowid();
        trace!(
            message_id = id,
            provider = new.provider,
            status = new.status.as_str(),
            "message created"
        );
        Ok(id)
    }

    /// Transition a message's status.
    ///
    /// When `provider_message_id` is supplied the backend identifier is
    /// recorded and `sent_at` is stamped to the current time in the same
    /// statement — the two columns cannot drift apart. Without one, only the
    /// status column changes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on SQLite failure.
    pub async fn update_status(
        &self,
        id: i64,
        status: MessageStatus,
        provider_message_id: Option<&str>,
    ) -> Result<(), StoreError> {
        match provider_message_id {
            Some(pmid) => {
                sqlx::query(
                    "UPDATE messages SET status = ?1, provider_message_id = ?2, sent_at = ?3 \
                     WHERE id = ?4",
                )
                .bind(status.as_str())
                .bind(pmid)
                .bind(Utc::now().to_rfc3339())
                .bind(id)
                .execute(&self.db)
                .await?;
            }
            None => {
                sqlx::query("UPDATE messages SET status = ?1 WHERE id = ?2")
                    .bind(status.as_str())
                    .bind(id)
                    .execute(&self.db)
                    .await?;
            }
        }
        trace!(message_id = id, status = status.as_str(), "status updated");
        Ok(())
    }

    /// Append one immutable audit row for a message.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on SQLite failure.
    pub async fn append_audit(
        &self,
        message_id: i64,
        status: MessageStatus,
        detail: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO audit_log (message_id, status, detail) VALUES (?1, ?2, ?3)")
            .bind(message_id)
            .bind(status.as_str())
            .bind(detail)
            .execute(&self.db)
            .await?;
        trace!(message_id, status = status.as_str(), "audit row appended");
        Ok(())
    }

    /// Snapshot of messages that are due for dispatch right now.
    ///
    /// A message is due when it is `pending`, or `scheduled` with a
    /// `scheduled_at` at or before the current time. The result is a finite
    /// snapshot taken at call time with no ordering guarantee.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on SQLite failure.
    pub async fn due_messages(&self) -> Result<Vec<Message>, StoreError> {
        let now = Utc::now().to_rfc3339();
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE status = 'pending' \
             OR (status = 'scheduled' AND scheduled_at <= ?1)"
        ))
        .bind(&now)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(message_from_row).collect()
    }

    /// Fetch a single message by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on SQLite failure.
    pub async fn message(&self, id: i64) -> Result<Option<Message>, StoreError> {
        let row: Option<MessageRow> =
            sqlx::query_as(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"))
                .bind(id)
                .fetch_optional(&self.db)
                .await?;
        row.map(message_from_row).transpose()
    }

    /// Fetch the audit trail for a message, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on SQLite failure.
    pub async fn audit_for(&self, message_id: i64) -> Result<Vec<AuditEntry>, StoreError> {
        let rows: Vec<(i64, i64, String, String, String)> = sqlx::query_as(
            "SELECT id, message_id, status, detail, created_at FROM audit_log \
             WHERE message_id = ?1 ORDER BY id ASC",
        )
        .bind(message_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|(id, message_id, status, detail, created_at)| {
                Ok(AuditEntry {
                    id,
                    message_id,
                    status: MessageStatus::parse(&status)?,
                    detail,
                    created_at,
                })
            })
            .collect()
    }

    /// Returns a reference to the underlying SQLite pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }
}

fn message_from_row(row: MessageRow) -> Result<Message, StoreError> {
    let (
        id,
        contact_id,
        recipient,
        body,
        provider,
        status,
        provider_message_id,
        scheduled_at,
        sent_at,
        created_at,
    ) = row;
    Ok(Message {
        id,
        contact_id,
        recipient,
        body,
        provider,
        status: MessageStatus::parse(&status)?,
        provider_message_id,
        scheduled_at,
        sent_at,
        created_at,
    })
}

/// Apply the schema to a pool.
///
/// Idempotent: every statement is `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if a statement fails.
pub async fn migrate(db: &SqlitePool) -> Result<(), StoreError> {
    let schema = include_str!("../../migrations/001_schema.sql");
    sqlx::raw_sql(schema).execute(db).await?;
    Ok(())
}
