use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{format_datetime, insert_error, parse_datetime};
use crate::error::{Error, Result};
use crate::types::Group;

const COLUMNS: &str = "id, name, parent_id, full_path, created_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        name: row.get(1)?,
        parent_id: row.get(2)?,
        full_path: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

pub fn insert(conn: &Connection, group: &Group) -> Result<()> {
    conn.execute(
        "INSERT INTO groups (id, name, parent_id, full_path, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            group.id,
            group.name,
            group.parent_id,
            group.full_path,
            format_datetime(&group.created_at),
        ],
    )
    .map_err(|e| insert_error(e, || format!("group '{}' already exists", group.full_path)))?;
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<Group>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM groups WHERE id = ?1"),
        params![id],
        from_row,
    )
    .optional()
    .map_err(Error::from)
}

pub fn get_by_path(conn: &Connection, full_path: &str) -> Result<Option<Group>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM groups WHERE full_path = ?1"),
        params![full_path],
        from_row,
    )
    .optional()
    .map_err(Error::from)
}

/// Returns the ids of `group_id` and every group above it, nearest first.
pub fn ancestor_ids(conn: &Connection, group_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "WITH RECURSIVE chain(id, parent_id, depth) AS (
             SELECT id, parent_id, 0 FROM groups WHERE id = ?1
             UNION ALL
             SELECT g.id, g.parent_id, chain.depth + 1
             FROM groups g JOIN chain ON g.id = chain.parent_id
         )
         SELECT id FROM chain ORDER BY depth",
    )?;

    let rows = stmt.query_map(params![group_id], |row| row.get(0))?;
    rows.collect::<std::result::Result<Vec<String>, _>>()
        .map_err(Error::from)
}

/// Returns the top-level group above `group_id` (itself if it is a root).
pub fn root_of(conn: &Connection, group_id: &str) -> Result<Option<Group>> {
    match ancestor_ids(conn, group_id)?.last() {
        Some(root_id) => get(conn, root_id),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_ancestor_chain() {
        let store = store().await;
        let tx = store.begin().await.unwrap();

        let root = group(&tx, "acme", None);
        let mid = group(&tx, "platform", Some(&root));
        let leaf = group(&tx, "networking", Some(&mid));

        assert_eq!(
            ancestor_ids(&tx, &leaf.id).unwrap(),
            vec![leaf.id.clone(), mid.id.clone(), root.id.clone()]
        );
        assert_eq!(root_of(&tx, &leaf.id).unwrap().unwrap().id, root.id);
        assert_eq!(root_of(&tx, &root.id).unwrap().unwrap().id, root.id);
        assert!(root_of(&tx, "missing").unwrap().is_none());
        assert_eq!(
            get_by_path(&tx, "acme/platform/networking").unwrap().unwrap().id,
            leaf.id
        );
    }

    #[tokio::test]
    async fn test_duplicate_path_conflicts() {
        let store = store().await;
        let tx = store.begin().await.unwrap();
        group(&tx, "acme", None);

        let dup = Group {
            id: "other".to_string(),
            name: "acme".to_string(),
            parent_id: None,
            full_path: "acme".to_string(),
            created_at: chrono::Utc::now(),
        };
        assert!(matches!(insert(&tx, &dup), Err(Error::Conflict(_))));
    }
}
