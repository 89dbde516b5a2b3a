//! Contact directory persistence.
//!
//! Plain key-value CRUD over the `contacts` table. Messages may reference a
//! contact, but the dispatch core never depends on this module.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::trace;

use super::StoreError;

/// Row type returned by SQLite queries for contacts.
type ContactRow = (i64, String, String, Option<String>, Option<String>, String);

/// A directory entry that messages can optionally reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Database row id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Phone number (unique).
    pub phone: String,
    /// Optional email address.
    pub email: Option<String>,
    /// Optional group label for bulk lookups.
    pub group: Option<String>,
    /// RFC 3339 creation time.
    pub created_at: String,
}

/// Insert a new contact and return its assigned id.
///
/// # Errors
///
/// Returns [`StoreError::DuplicatePhone`] when the phone number is already
/// registered, [`StoreError::Database`] on any other SQLite failure.
pub async fn add_contact(
    db: &SqlitePool,
    name: &str,
    phone: &str,
    email: Option<&str>,
    group: Option<&str>,
) -> Result<i64, StoreError> {
    let result = sqlx::query(
        "INSERT INTO contacts (name, phone, email, group_name) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(name)
    .bind(phone)
    .bind(email)
    .bind(group)
    .execute(db)
    .await;

    match result {
        Ok(done) => {
            let id = done.last_insert_rowid();
            trace!(contact_id = id, name, "contact created");
            Ok(id)
        }
        Err(err) => {
            if err
                .as_database_error()
                .is_some_and(|db_err| db_err.is_unique_violation())
            {
                return Err(StoreError::DuplicatePhone {
                    phone: phone.to_owned(),
                });
            }
            Err(err.into())
        }
    }
}

/// List contacts, optionally filtered by group, ordered by name.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on SQLite failure.
pub async fn contacts(db: &SqlitePool, group: Option<&str>) -> Result<Vec<Contact>, StoreError> {
    let rows: Vec<ContactRow> = match group {
        Some(g) => {
            sqlx::query_as(
                "SELECT id, name, phone, email, group_name, created_at FROM contacts \
                 WHERE group_name = ?1 ORDER BY name",
            )
            .bind(g)
            .fetch_all(db)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT id, name, phone, email, group_name, created_at FROM contacts \
                 ORDER BY name",
            )
            .fetch_all(db)
            .await?
        }
    };

    Ok(rows
        .into_iter()
        .map(|(id, name, phone, email, group, created_at)| Contact {
            id,
            name,
            phone,
            email,
            group,
            created_at,
        })
        .collect())
}

/// Look a contact up by phone number.
///
/// # Errors
///
/// Returns [`StoreError::Database`] on SQLite failure.
pub async fn contact_by_phone(db: &SqlitePool, phone: &str) -> Result<Option<Contact>, StoreError> {
    let row: Option<ContactRow> = sqlx::query_as(
        "SELECT id, name, phone, email, group_name, created_at FROM contacts WHERE phone = ?1",
    )
    .bind(phone)
    .fetch_optional(db)
    .await?;

    Ok(row.map(|(id, name, phone, email, group, created_at)| Contact {
        id,
        name,
        phone,
        email,
        group,
        created_at,
    }))
}
