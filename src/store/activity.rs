use rusqlite::{Connection, Row, params};

use super::{format_datetime, parse_datetime};
use crate::error::{Error, Result};
use crate::types::{ActivityAction, ActivityEvent, ActivityTarget};

fn from_row(row: &Row<'_>) -> rusqlite::Result<ActivityEvent> {
    let action: String = row.get(1)?;
    let target_type: String = row.get(2)?;
    let payload: Option<String> = row.get(6)?;

    Ok(ActivityEvent {
        id: row.get(0)?,
        action: ActivityAction::parse(&action).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(1, action.clone(), rusqlite::types::Type::Text)
        })?,
        target_type: ActivityTarget::parse(&target_type).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(2, target_type.clone(), rusqlite::types::Type::Text)
        })?,
        target_id: row.get(3)?,
        group_id: row.get(4)?,
        created_by: row.get(5)?,
        payload: payload.and_then(|p| serde_json::from_str(&p).ok()),
        created_at: parse_datetime(&row.get::<_, String>(7)?),
    })
}

pub fn insert(conn: &Connection, event: &ActivityEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO activity_events
             (id, action, target_type, target_id, group_id, created_by, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            event.id,
            event.action.as_str(),
            event.target_type.as_str(),
            event.target_id,
            event.group_id,
            event.created_by,
            event.payload.as_ref().map(|p| p.to_string()),
            format_datetime(&event.created_at),
        ],
    )?;
    Ok(())
}

pub fn list_by_group(conn: &Connection, group_id: &str) -> Result<Vec<ActivityEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, action, target_type, target_id, group_id, created_by, payload, created_at
         FROM activity_events WHERE group_id = ?1 ORDER BY created_at, rowid",
    )?;
    let rows = stmt.query_map(params![group_id], from_row)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}
