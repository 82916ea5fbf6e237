use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{format_datetime, parse_datetime, parse_optional_datetime};
use crate::error::{Error, Result};
use crate::types::Token;

const COLUMNS: &str = "id, token_hash, token_lookup, user_id, service_account_id, created_at, expires_at, last_used_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Token> {
    Ok(Token {
        id: row.get(0)?,
        token_hash: row.get(1)?,
        token_lookup: row.get(2)?,
        user_id: row.get(3)?,
        service_account_id: row.get(4)?,
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        expires_at: parse_optional_datetime(row.get(6)?),
        last_used_at: parse_optional_datetime(row.get(7)?),
    })
}

pub fn insert(conn: &Connection, token: &Token) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO tokens ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
        params![
            token.id,
            token.token_hash,
            token.token_lookup,
            token.user_id,
            token.service_account_id,
            format_datetime(&token.created_at),
            token.expires_at.as_ref().map(format_datetime),
            token.last_used_at.as_ref().map(format_datetime),
        ],
    )?;
    Ok(())
}

pub fn get_by_lookup(conn: &Connection, lookup: &str) -> Result<Option<Token>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM tokens WHERE token_lookup = ?1"),
        params![lookup],
        from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn touch_last_used(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "UPDATE tokens SET last_used_at = ?1 WHERE id = ?2",
        params![format_datetime(&Utc::now()), id],
    )?;
    Ok(())
}
