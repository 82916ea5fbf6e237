use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{format_datetime, parse_datetime};
use crate::error::{Error, Result};
use crate::types::GroupGrant;

fn from_row(row: &Row<'_>) -> rusqlite::Result<GroupGrant> {
    Ok(GroupGrant {
        subject_id: row.get(0)?,
        group_id: row.get(1)?,
        allow_bits: row.get::<_, i64>(2)?.into(),
        deny_bits: row.get::<_, i64>(3)?.into(),
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

pub fn upsert(conn: &Connection, grant: &GroupGrant) -> Result<()> {
    conn.execute(
        "INSERT INTO group_grants (subject_id, group_id, allow_bits, deny_bits, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(subject_id, group_id) DO UPDATE SET
             allow_bits = excluded.allow_bits,
             deny_bits = excluded.deny_bits,
             updated_at = excluded.updated_at",
        params![
            grant.subject_id,
            grant.group_id,
            i64::from(grant.allow_bits),
            i64::from(grant.deny_bits),
            format_datetime(&grant.created_at),
            format_datetime(&grant.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, subject_id: &str, group_id: &str) -> Result<Option<GroupGrant>> {
    conn.query_row(
        "SELECT subject_id, group_id, allow_bits, deny_bits, created_at, updated_at
         FROM group_grants WHERE subject_id = ?1 AND group_id = ?2",
        params![subject_id, group_id],
        from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn delete(conn: &Connection, subject_id: &str, group_id: &str) -> Result<bool> {
    let rows = conn.execute(
        "DELETE FROM group_grants WHERE subject_id = ?1 AND group_id = ?2",
        params![subject_id, group_id],
    )?;
    Ok(rows > 0)
}

/// Grants held by `subject_id` on `group_id` or any of its ancestors.
pub fn list_inherited(
    conn: &Connection,
    subject_id: &str,
    group_id: &str,
) -> Result<Vec<GroupGrant>> {
    let mut stmt = conn.prepare(
        "WITH RECURSIVE chain(id, parent_id) AS (
             SELECT id, parent_id FROM groups WHERE id = ?2
             UNION ALL
             SELECT g.id, g.parent_id FROM groups g JOIN chain ON g.id = chain.parent_id
         )
         SELECT gg.subject_id, gg.group_id, gg.allow_bits, gg.deny_bits, gg.created_at, gg.updated_at
         FROM group_grants gg JOIN chain ON gg.group_id = chain.id
         WHERE gg.subject_id = ?1",
    )?;

    let rows = stmt.query_map(params![subject_id, group_id], from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}
