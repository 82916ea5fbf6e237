use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use super::{format_datetime, parse_datetime};
use crate::error::{Error, Result};
use crate::types::{LimitName, ResourceLimit};

/// Inserts `value` for `name` unless a value is already stored.
pub fn seed(conn: &Connection, name: LimitName, value: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO resource_limits (name, value, updated_at) VALUES (?1, ?2, ?3)",
        params![name.as_str(), value, format_datetime(&Utc::now())],
    )?;
    Ok(())
}

pub fn set(conn: &Connection, name: LimitName, value: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO resource_limits (name, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![name.as_str(), value, format_datetime(&Utc::now())],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, name: LimitName) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT value FROM resource_limits WHERE name = ?1",
        params![name.as_str()],
        |row| row.get(0),
    )
    .optional()
    .map_err(Error::from)
}

pub fn list(conn: &Connection) -> Result<Vec<ResourceLimit>> {
    let mut stmt = conn.prepare("SELECT name, value, updated_at FROM resource_limits ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut limits = Vec::new();
    for row in rows {
        let (name, value, updated_at) = row?;
        match LimitName::parse(&name) {
            Some(name) => limits.push(ResourceLimit {
                name,
                value,
                updated_at: parse_datetime(&updated_at),
            }),
            None => tracing::warn!("Ignoring unknown resource limit '{name}'"),
        }
    }
    Ok(limits)
}
