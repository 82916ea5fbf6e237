use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{format_datetime, insert_error, parse_datetime};
use crate::error::{Error, Result};
use crate::types::ProviderPlatform;

const COLUMNS: &str = "id, provider_version_id, os, architecture, sha_sum, filename, binary_uploaded, created_by, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<ProviderPlatform> {
    Ok(ProviderPlatform {
        id: row.get(0)?,
        provider_version_id: row.get(1)?,
        os: row.get(2)?,
        architecture: row.get(3)?,
        sha_sum: row.get(4)?,
        filename: row.get(5)?,
        binary_uploaded: row.get(6)?,
        created_by: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

pub fn insert(conn: &Connection, platform: &ProviderPlatform) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO provider_platforms ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        ),
        params![
            platform.id,
            platform.provider_version_id,
            platform.os,
            platform.architecture,
            platform.sha_sum,
            platform.filename,
            platform.binary_uploaded,
            platform.created_by,
            format_datetime(&platform.created_at),
        ],
    )
    .map_err(|e| {
        insert_error(e, || {
            format!(
                "platform {}_{} already exists for this version",
                platform.os, platform.architecture
            )
        })
    })?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<ProviderPlatform>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM provider_platforms WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn get_by_os_arch(
    conn: &Connection,
    provider_version_id: &str,
    os: &str,
    architecture: &str,
) -> Result<Option<ProviderPlatform>> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM provider_platforms
             WHERE provider_version_id = ?1 AND os = ?2 AND architecture = ?3"
        ),
        params![provider_version_id, os, architecture],
        from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn list_by_version(conn: &Connection, provider_version_id: &str) -> Result<Vec<ProviderPlatform>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM provider_platforms
         WHERE provider_version_id = ?1 ORDER BY os, architecture"
    ))?;
    let rows = stmt.query_map(params![provider_version_id], from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

pub fn count_by_version(conn: &Connection, provider_version_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM provider_platforms WHERE provider_version_id = ?1",
        params![provider_version_id],
        |row| row.get(0),
    )
    .map_err(Error::from)
}

pub fn mark_binary_uploaded(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "UPDATE provider_platforms SET binary_uploaded = 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
    let rows = conn.execute("DELETE FROM provider_platforms WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}
