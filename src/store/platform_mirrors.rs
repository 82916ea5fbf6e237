use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{format_datetime, insert_error, parse_datetime};
use crate::error::{Error, Result};
use crate::types::ProviderPlatformMirror;

const COLUMNS: &str = "id, version_mirror_id, os, architecture, created_by, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<ProviderPlatformMirror> {
    Ok(ProviderPlatformMirror {
        id: row.get(0)?,
        version_mirror_id: row.get(1)?,
        os: row.get(2)?,
        architecture: row.get(3)?,
        created_by: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

pub fn insert(conn: &Connection, mirror: &ProviderPlatformMirror) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO provider_platform_mirrors ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
        params![
            mirror.id,
            mirror.version_mirror_id,
            mirror.os,
            mirror.architecture,
            mirror.created_by,
            format_datetime(&mirror.created_at),
        ],
    )
    .map_err(|e| {
        insert_error(e, || {
            format!(
                "platform {}_{} is already mirrored",
                mirror.os, mirror.architecture
            )
        })
    })?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<ProviderPlatformMirror>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM provider_platform_mirrors WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn get_by_os_arch(
    conn: &Connection,
    version_mirror_id: &str,
    os: &str,
    architecture: &str,
) -> Result<Option<ProviderPlatformMirror>> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM provider_platform_mirrors
             WHERE version_mirror_id = ?1 AND os = ?2 AND architecture = ?3"
        ),
        params![version_mirror_id, os, architecture],
        from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn list_by_version_mirror(
    conn: &Connection,
    version_mirror_id: &str,
) -> Result<Vec<ProviderPlatformMirror>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM provider_platform_mirrors
         WHERE version_mirror_id = ?1 ORDER BY os, architecture"
    ))?;
    let rows = stmt.query_map(params![version_mirror_id], from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

pub fn count_by_version_mirror(conn: &Connection, version_mirror_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM provider_platform_mirrors WHERE version_mirror_id = ?1",
        params![version_mirror_id],
        |row| row.get(0),
    )
    .map_err(Error::from)
}

pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
    let rows = conn.execute(
        "DELETE FROM provider_platform_mirrors WHERE id = ?1",
        params![id],
    )?;
    Ok(rows > 0)
}
