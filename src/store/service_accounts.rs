use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{format_datetime, insert_error, parse_datetime};
use crate::error::{Error, Result};
use crate::types::ServiceAccount;

fn from_row(row: &Row<'_>) -> rusqlite::Result<ServiceAccount> {
    Ok(ServiceAccount {
        id: row.get(0)?,
        name: row.get(1)?,
        group_id: row.get(2)?,
        resource_path: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

pub fn insert(conn: &Connection, account: &ServiceAccount) -> Result<()> {
    conn.execute(
        "INSERT INTO service_accounts (id, name, group_id, resource_path, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            account.id,
            account.name,
            account.group_id,
            account.resource_path,
            format_datetime(&account.created_at),
        ],
    )
    .map_err(|e| {
        insert_error(e, || {
            format!("service account '{}' already exists", account.resource_path)
        })
    })?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<ServiceAccount>> {
    conn.query_row(
        "SELECT id, name, group_id, resource_path, created_at FROM service_accounts WHERE id = ?1",
        params![id],
        from_row,
    )
    .optional()
    .map_err(Error::from)
}
