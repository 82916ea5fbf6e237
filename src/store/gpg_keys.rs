use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{format_datetime, insert_error, parse_datetime};
use crate::error::{Error, Result};
use crate::types::GpgKey;

const COLUMNS: &str = "id, group_id, gpg_key_id, fingerprint, ascii_armor, created_by, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<GpgKey> {
    Ok(GpgKey {
        id: row.get(0)?,
        group_id: row.get(1)?,
        gpg_key_id: row.get::<_, i64>(2)? as u64,
        fingerprint: row.get(3)?,
        ascii_armor: row.get(4)?,
        created_by: row.get(5)?,
        created_at: parse_datetime(&row.get::<_, String>(6)?),
    })
}

pub fn insert(conn: &Connection, key: &GpgKey) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO gpg_keys ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
        params![
            key.id,
            key.group_id,
            key.gpg_key_id as i64,
            key.fingerprint,
            key.ascii_armor,
            key.created_by,
            format_datetime(&key.created_at),
        ],
    )
    .map_err(|e| {
        insert_error(e, || {
            format!("gpg key {} already exists in this group", key.fingerprint)
        })
    })?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<GpgKey>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM gpg_keys WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn list_by_group(conn: &Connection, group_id: &str) -> Result<Vec<GpgKey>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM gpg_keys WHERE group_id = ?1 ORDER BY created_at, id"
    ))?;
    let rows = stmt.query_map(params![group_id], from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

/// Keys stored on `group_id` or any of its ancestors, nearest group first.
/// When `gpg_key_id` is set only keys with that 64-bit id are returned.
pub fn list_inherited(
    conn: &Connection,
    group_id: &str,
    gpg_key_id: Option<u64>,
) -> Result<Vec<GpgKey>> {
    let mut stmt = conn.prepare(
        "WITH RECURSIVE chain(id, parent_id, depth) AS (
             SELECT id, parent_id, 0 FROM groups WHERE id = ?1
             UNION ALL
             SELECT g.id, g.parent_id, chain.depth + 1
             FROM groups g JOIN chain ON g.id = chain.parent_id
         )
         SELECT k.id, k.group_id, k.gpg_key_id, k.fingerprint, k.ascii_armor, k.created_by, k.created_at
         FROM gpg_keys k
         JOIN chain ON k.group_id = chain.id
         WHERE ?2 IS NULL OR k.gpg_key_id = ?2
         ORDER BY chain.depth, k.created_at, k.id",
    )?;
    let rows = stmt.query_map(params![group_id, gpg_key_id.map(|id| id as i64)], from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

pub fn count_by_group(conn: &Connection, group_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM gpg_keys WHERE group_id = ?1",
        params![group_id],
        |row| row.get(0),
    )
    .map_err(Error::from)
}

pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
    let rows = conn.execute("DELETE FROM gpg_keys WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}
