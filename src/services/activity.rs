use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use crate::error::Result;
use crate::store::activity;
use crate::types::{ActivityAction, ActivityEvent, ActivityTarget, Caller};

pub(crate) struct Target<'a> {
    pub kind: ActivityTarget,
    pub id: &'a str,
    pub group_id: &'a str,
}

/// Writes one activity event in the caller's transaction.
pub(crate) fn record(
    conn: &Connection,
    caller: &Caller,
    action: ActivityAction,
    target: Target<'_>,
    payload: Option<serde_json::Value>,
) -> Result<()> {
    activity::insert(
        conn,
        &ActivityEvent {
            id: Uuid::new_v4().to_string(),
            action,
            target_type: target.kind,
            target_id: target.id.to_string(),
            group_id: target.group_id.to_string(),
            created_by: caller.subject(),
            payload,
            created_at: Utc::now(),
        },
    )
}
