use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{format_datetime, insert_error, parse_datetime};
use crate::error::{Error, Result};
use crate::types::User;

fn from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        admin: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

pub fn insert(conn: &Connection, user: &User) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, username, admin, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            user.id,
            user.username,
            user.admin,
            format_datetime(&user.created_at),
        ],
    )
    .map_err(|e| insert_error(e, || format!("user '{}' already exists", user.username)))?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<User>> {
    conn.query_row(
        "SELECT id, username, admin, created_at FROM users WHERE id = ?1",
        params![id],
        from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn get_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    conn.query_row(
        "SELECT id, username, admin, created_at FROM users WHERE username = ?1",
        params![username],
        from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn has_admin(conn: &Connection) -> Result<bool> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM users WHERE admin = 1", [], |row| {
        row.get(0)
    })?;
    Ok(count > 0)
}
