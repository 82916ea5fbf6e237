use std::collections::BTreeMap;

use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{format_datetime, insert_error, parse_datetime};
use crate::error::{Error, Result};
use crate::types::ProviderVersionMirror;
use crate::verify::Checksums;

const COLUMNS: &str = "id, group_id, registry_hostname, registry_namespace, provider_type, \
     semantic_version, digests, created_by, created_at";

fn decode_digests(raw: &str) -> rusqlite::Result<Checksums> {
    let encoded: BTreeMap<String, String> = serde_json::from_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;

    encoded
        .into_iter()
        .map(|(name, digest)| {
            let mut bytes = [0u8; 32];
            hex::decode_to_slice(&digest, &mut bytes).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    6,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            Ok((name, bytes))
        })
        .collect()
}

fn encode_digests(digests: &Checksums) -> Result<String> {
    let encoded: BTreeMap<&str, String> = digests
        .iter()
        .map(|(name, digest)| (name.as_str(), hex::encode(digest)))
        .collect();
    serde_json::to_string(&encoded)
        .map_err(|e| Error::internal(format!("failed to encode digests: {e}")))
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<ProviderVersionMirror> {
    Ok(ProviderVersionMirror {
        id: row.get(0)?,
        group_id: row.get(1)?,
        registry_hostname: row.get(2)?,
        registry_namespace: row.get(3)?,
        provider_type: row.get(4)?,
        semantic_version: row.get(5)?,
        digests: decode_digests(&row.get::<_, String>(6)?)?,
        created_by: row.get(7)?,
        created_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

pub fn insert(conn: &Connection, mirror: &ProviderVersionMirror) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO provider_version_mirrors ({COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        ),
        params![
            mirror.id,
            mirror.group_id,
            mirror.registry_hostname,
            mirror.registry_namespace,
            mirror.provider_type,
            mirror.semantic_version,
            encode_digests(&mirror.digests)?,
            mirror.created_by,
            format_datetime(&mirror.created_at),
        ],
    )
    .map_err(|e| {
        insert_error(e, || {
            format!(
                "provider version mirror {}/{}/{} {} already exists",
                mirror.registry_hostname,
                mirror.registry_namespace,
                mirror.provider_type,
                mirror.semantic_version
            )
        })
    })?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<ProviderVersionMirror>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM provider_version_mirrors WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()
    .map_err(Error::from)
}

/// Identifies one mirrored provider within a root group.
#[derive(Debug, Clone, Copy)]
pub struct MirrorAddress<'a> {
    pub group_id: &'a str,
    pub hostname: &'a str,
    pub namespace: &'a str,
    pub provider_type: &'a str,
}

pub fn get_by_address(
    conn: &Connection,
    address: MirrorAddress<'_>,
    semantic_version: &str,
) -> Result<Option<ProviderVersionMirror>> {
    conn.query_row(
        &format!(
            "SELECT {COLUMNS} FROM provider_version_mirrors
             WHERE group_id = ?1 AND registry_hostname = ?2 AND registry_namespace = ?3
               AND provider_type = ?4 AND semantic_version = ?5"
        ),
        params![
            address.group_id,
            address.hostname,
            address.namespace,
            address.provider_type,
            semantic_version
        ],
        from_row,
    )
    .optional()
    .map_err(Error::from)
}

/// Version mirrors of one provider that have at least one platform mirror.
pub fn list_populated(
    conn: &Connection,
    address: MirrorAddress<'_>,
) -> Result<Vec<ProviderVersionMirror>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM provider_version_mirrors vm
         WHERE group_id = ?1 AND registry_hostname = ?2 AND registry_namespace = ?3
           AND provider_type = ?4
           AND EXISTS (SELECT 1 FROM provider_platform_mirrors pm WHERE pm.version_mirror_id = vm.id)
         ORDER BY created_at, id"
    ))?;
    let rows = stmt.query_map(
        params![
            address.group_id,
            address.hostname,
            address.namespace,
            address.provider_type
        ],
        from_row,
    )?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

pub fn list_by_group(conn: &Connection, group_id: &str) -> Result<Vec<ProviderVersionMirror>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM provider_version_mirrors WHERE group_id = ?1
         ORDER BY registry_hostname, registry_namespace, provider_type, created_at"
    ))?;
    let rows = stmt.query_map(params![group_id], from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

pub fn count_by_group(conn: &Connection, group_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM provider_version_mirrors WHERE group_id = ?1",
        params![group_id],
        |row| row.get(0),
    )
    .map_err(Error::from)
}

pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
    let rows = conn.execute(
        "DELETE FROM provider_version_mirrors WHERE id = ?1",
        params![id],
    )?;
    Ok(rows > 0)
}
