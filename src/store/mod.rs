//! SQLite persistence.
//!
//! Every query function takes an explicit `&Connection`, normally a [`Tx`]
//! obtained from [`SqliteStore::begin`] or [`SqliteStore::read`]. A `Tx` rolls
//! back when dropped without [`Tx::commit`].

pub mod activity;
pub mod gpg_keys;
pub mod grants;
pub mod groups;
pub mod platform_mirrors;
pub mod provider_platforms;
pub mod provider_versions;
pub mod providers;
pub mod resource_limits;
mod schema;
pub mod service_accounts;
pub mod tokens;
pub mod users;
pub mod version_mirrors;

use std::collections::HashMap;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::{Mutex, OwnedMutexGuard};

use self::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::LimitName;

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Applies the schema and seeds any resource limit not yet stored.
    pub async fn initialize(&self) -> Result<()> {
        self.initialize_with_limits(&HashMap::new()).await
    }

    /// Like [`initialize`](Self::initialize), seeding missing limits from
    /// `defaults` before falling back to the built-in ceilings. Limits already
    /// present in the database are left alone.
    pub async fn initialize_with_limits(&self, defaults: &HashMap<LimitName, i64>) -> Result<()> {
        {
            let conn = self.conn.lock().await;
            conn.execute_batch(SCHEMA)?;
        }

        let tx = self.begin().await?;
        for name in LimitName::ALL {
            let value = defaults
                .get(&name)
                .copied()
                .unwrap_or_else(|| name.default_value());
            resource_limits::seed(&tx, name, value)?;
        }
        tx.commit()
    }

    /// Opens a write transaction. `BEGIN IMMEDIATE` takes the database write
    /// lock up front so concurrent writers serialize here rather than failing
    /// at commit.
    pub async fn begin(&self) -> Result<Tx> {
        Tx::open(Arc::clone(&self.conn), "BEGIN IMMEDIATE").await
    }

    /// Opens a read transaction so multi-query reads see one snapshot.
    pub async fn read(&self) -> Result<Tx> {
        Tx::open(Arc::clone(&self.conn), "BEGIN").await
    }
}

/// An open transaction holding exclusive use of the connection.
pub struct Tx {
    conn: OwnedMutexGuard<Connection>,
    finished: bool,
}

impl Tx {
    async fn open(conn: Arc<Mutex<Connection>>, begin: &str) -> Result<Self> {
        let conn = conn.lock_owned().await;
        conn.execute_batch(begin)?;
        Ok(Self {
            conn,
            finished: false,
        })
    }

    pub fn commit(mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }
}

impl Deref for Tx {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

impl Drop for Tx {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            tracing::error!("Failed to roll back transaction: {e}");
        }
    }
}

pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

pub(crate) fn parse_optional_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref().map(parse_datetime)
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// True when `err` is a UNIQUE or PRIMARY KEY constraint failure.
#[must_use]
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.extended_code,
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        ),
        _ => false,
    }
}

/// Maps a unique-constraint failure on insert to `Conflict`.
pub(crate) fn insert_error(err: rusqlite::Error, what: impl FnOnce() -> String) -> Error {
    if is_unique_violation(&err) {
        Error::Conflict(what())
    } else {
        Error::Database(err)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::types::Group;

    pub async fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize().await.unwrap();
        store
    }

    pub fn group(conn: &Connection, name: &str, parent: Option<&Group>) -> Group {
        let group = Group {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            parent_id: parent.map(|p| p.id.clone()),
            full_path: match parent {
                Some(p) => format!("{}/{name}", p.full_path),
                None => name.to_string(),
            },
            created_at: Utc::now(),
        };
        groups::insert(conn, &group).unwrap();
        group
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_dropped_tx_rolls_back() {
        let store = store().await;

        {
            let tx = store.begin().await.unwrap();
            group(&tx, "acme", None);
        }

        let tx = store.read().await.unwrap();
        assert!(groups::get_by_path(&tx, "acme").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_committed_tx_persists() {
        let store = store().await;

        let tx = store.begin().await.unwrap();
        group(&tx, "acme", None);
        tx.commit().unwrap();

        let tx = store.read().await.unwrap();
        assert!(groups::get_by_path(&tx, "acme").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent_and_keeps_stored_limits() {
        let store = store().await;

        let tx = store.begin().await.unwrap();
        resource_limits::set(&tx, LimitName::GpgKeysPerGroup, 3).unwrap();
        tx.commit().unwrap();

        store.initialize().await.unwrap();

        let tx = store.read().await.unwrap();
        assert_eq!(
            resource_limits::get(&tx, LimitName::GpgKeysPerGroup).unwrap(),
            Some(3)
        );
        assert_eq!(
            resource_limits::get(&tx, LimitName::ProvidersPerGroup).unwrap(),
            Some(LimitName::ProvidersPerGroup.default_value())
        );
    }

    #[test]
    fn test_parse_datetime_formats() {
        let rfc = parse_datetime("2024-01-02T03:04:05+00:00");
        let sqlite = parse_datetime("2024-01-02 03:04:05");
        assert_eq!(rfc, sqlite);
    }
}
