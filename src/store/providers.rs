use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{format_datetime, insert_error, parse_datetime};
use crate::error::{Error, Result};
use crate::types::Provider;

const COLUMNS: &str = "id, name, group_id, root_group_id, private, repository_url, created_by, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Provider> {
    Ok(Provider {
        id: row.get(0)?,
        name: row.get(1)?,
        group_id: row.get(2)?,
        root_group_id: row.get(3)?,
        private: row.get(4)?,
        repository_url: row.get(5)?,
        created_by: row.get(6)?,
        created_at: parse_datetime(&row.get::<_, String>(7)?),
        updated_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

pub fn insert(conn: &Connection, provider: &Provider) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO providers ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
        params![
            provider.id,
            provider.name,
            provider.group_id,
            provider.root_group_id,
            provider.private,
            provider.repository_url,
            provider.created_by,
            format_datetime(&provider.created_at),
            format_datetime(&provider.updated_at),
        ],
    )
    .map_err(|e| insert_error(e, || format!("provider '{}' already exists", provider.name)))?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Provider>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM providers WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn get_by_root_group_and_name(
    conn: &Connection,
    root_group_id: &str,
    name: &str,
) -> Result<Option<Provider>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM providers WHERE root_group_id = ?1 AND name = ?2"),
        params![root_group_id, name],
        from_row,
    )
    .optional()
    .map_err(Error::from)
}

/// Fetches every provider whose id is in `ids`. Missing ids are skipped.
pub fn get_many(conn: &Connection, ids: &[String]) -> Result<Vec<Provider>> {
    let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM providers WHERE id = ?1"))?;
    let mut providers = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(provider) = stmt.query_row(params![id], from_row).optional()? {
            providers.push(provider);
        }
    }
    Ok(providers)
}

pub fn list_by_group(conn: &Connection, group_id: &str) -> Result<Vec<Provider>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM providers WHERE group_id = ?1 ORDER BY name"
    ))?;
    let rows = stmt.query_map(params![group_id], from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

pub fn count_by_group(conn: &Connection, group_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM providers WHERE group_id = ?1",
        params![group_id],
        |row| row.get(0),
    )
    .map_err(Error::from)
}

pub fn update(conn: &Connection, provider: &Provider) -> Result<()> {
    let rows = conn.execute(
        "UPDATE providers SET private = ?1, repository_url = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            provider.private,
            provider.repository_url,
            format_datetime(&provider.updated_at),
            provider.id,
        ],
    )?;

    if rows == 0 {
        return Err(Error::not_found(format!("provider {} not found", provider.id)));
    }
    Ok(())
}

pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
    let rows = conn.execute("DELETE FROM providers WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}
