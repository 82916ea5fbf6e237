use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{format_datetime, insert_error, parse_datetime};
use crate::error::{Error, Result};
use crate::types::ProviderVersion;

const COLUMNS: &str = "id, provider_id, semantic_version, protocols, latest, readme_uploaded, \
     sha_sums_uploaded, sha_sums_sig_uploaded, gpg_key_id, gpg_ascii_armor, created_by, \
     created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<ProviderVersion> {
    let protocols: String = row.get(3)?;
    Ok(ProviderVersion {
        id: row.get(0)?,
        provider_id: row.get(1)?,
        semantic_version: row.get(2)?,
        protocols: serde_json::from_str(&protocols).unwrap_or_else(|e| {
            tracing::error!("Invalid protocols column '{protocols}': {e}");
            Vec::new()
        }),
        latest: row.get(4)?,
        readme_uploaded: row.get(5)?,
        sha_sums_uploaded: row.get(6)?,
        sha_sums_sig_uploaded: row.get(7)?,
        gpg_key_id: row.get::<_, Option<i64>>(8)?.map(|id| id as u64),
        gpg_ascii_armor: row.get(9)?,
        created_by: row.get(10)?,
        created_at: parse_datetime(&row.get::<_, String>(11)?),
        updated_at: parse_datetime(&row.get::<_, String>(12)?),
    })
}

pub fn insert(conn: &Connection, version: &ProviderVersion) -> Result<()> {
    let protocols = serde_json::to_string(&version.protocols)
        .map_err(|e| Error::internal(format!("failed to encode protocols: {e}")))?;

    conn.execute(
        &format!(
            "INSERT INTO provider_versions ({COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        ),
        params![
            version.id,
            version.provider_id,
            version.semantic_version,
            protocols,
            version.latest,
            version.readme_uploaded,
            version.sha_sums_uploaded,
            version.sha_sums_sig_uploaded,
            version.gpg_key_id.map(|id| id as i64),
            version.gpg_ascii_armor,
            version.created_by,
            format_datetime(&version.created_at),
            format_datetime(&version.updated_at),
        ],
    )
    .map_err(|e| {
        insert_error(e, || {
            format!("provider version {} already exists", version.semantic_version)
        })
    })?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<ProviderVersion>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM provider_versions WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn get_by_semver(
    conn: &Connection,
    provider_id: &str,
    semantic_version: &str,
) -> Result<Option<ProviderVersion>> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM provider_versions WHERE provider_id = ?1 AND semantic_version = ?2"
        ),
        params![provider_id, semantic_version],
        from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn get_latest(conn: &Connection, provider_id: &str) -> Result<Option<ProviderVersion>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM provider_versions WHERE provider_id = ?1 AND latest = 1"),
        params![provider_id],
        from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn list_by_provider(conn: &Connection, provider_id: &str) -> Result<Vec<ProviderVersion>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM provider_versions WHERE provider_id = ?1 ORDER BY created_at, id"
    ))?;
    let rows = stmt.query_map(params![provider_id], from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

pub fn count_by_provider(conn: &Connection, provider_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM provider_versions WHERE provider_id = ?1",
        params![provider_id],
        |row| row.get(0),
    )
    .map_err(Error::from)
}

/// Persists the mutable columns. Upload flags only ever move from false to
/// true, so a stale `false` here never clears a latch set by another writer.
pub fn update(conn: &Connection, version: &ProviderVersion) -> Result<()> {
    let rows = conn.execute(
        "UPDATE provider_versions SET
             latest = ?1,
             readme_uploaded = MAX(readme_uploaded, ?2),
             sha_sums_uploaded = MAX(sha_sums_uploaded, ?3),
             sha_sums_sig_uploaded = MAX(sha_sums_sig_uploaded, ?4),
             gpg_key_id = ?5,
             gpg_ascii_armor = ?6,
             updated_at = ?7
         WHERE id = ?8",
        params![
            version.latest,
            version.readme_uploaded,
            version.sha_sums_uploaded,
            version.sha_sums_sig_uploaded,
            version.gpg_key_id.map(|id| id as i64),
            version.gpg_ascii_armor,
            format_datetime(&version.updated_at),
            version.id,
        ],
    )?;

    if rows == 0 {
        return Err(Error::not_found(format!(
            "provider version {} not found",
            version.id
        )));
    }
    Ok(())
}

pub fn set_latest(conn: &Connection, id: &str, latest: bool) -> Result<()> {
    conn.execute(
        "UPDATE provider_versions SET latest = ?1 WHERE id = ?2",
        params![latest, id],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
    let rows = conn.execute("DELETE FROM provider_versions WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}
