use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::store::{grants, groups};
use crate::types::{Caller, Group, Permission, Provider};

/// Effective permissions of `caller` on `group_id`: the union of allow bits
/// granted on the group and every ancestor, minus any deny bits on the same
/// chain.
pub fn effective_permission(conn: &Connection, caller: &Caller, group_id: &str) -> Result<Permission> {
    if caller.is_unrestricted() {
        return Ok(Permission::GROUP_ADMIN.expand_implied());
    }
    let Some(subject_id) = caller.grant_subject_id() else {
        return Ok(Permission::default());
    };

    let mut allow = Permission::default();
    let mut deny = Permission::default();
    for grant in grants::list_inherited(conn, subject_id, group_id)? {
        allow = allow.union(grant.allow_bits.expand_implied());
        deny = deny.union(grant.deny_bits);
    }

    Ok(allow.difference(deny))
}

pub fn check_group_permission(
    conn: &Connection,
    caller: &Caller,
    group_id: &str,
    required: Permission,
) -> Result<bool> {
    Ok(effective_permission(conn, caller, group_id)?.has(required))
}

/// Returns Forbidden unless `caller` holds `required` on `group_id`.
pub fn require_group_permission(
    conn: &Connection,
    caller: &Caller,
    group_id: &str,
    required: Permission,
) -> Result<()> {
    if !check_group_permission(conn, caller, group_id, required)? {
        return Err(Error::forbidden(format!(
            "{} lacks {required} on this group",
            caller.subject()
        )));
    }
    Ok(())
}

/// Public providers are readable by any caller. Private ones need
/// `provider:read` inherited on the provider's group.
pub fn require_provider_visible(conn: &Connection, caller: &Caller, provider: &Provider) -> Result<()> {
    if !provider.private {
        return Ok(());
    }
    require_group_permission(conn, caller, &provider.group_id, Permission::PROVIDER_READ)
}

pub fn group_by_path(conn: &Connection, path: &str) -> Result<Group> {
    groups::get_by_path(conn, path.trim_matches('/'))?
        .ok_or_else(|| Error::not_found(format!("group '{path}' not found")))
}

pub fn root_group_by_path(conn: &Connection, path: &str) -> Result<Group> {
    let group = group_by_path(conn, path)?;
    if !group.is_root() {
        return Err(Error::invalid(format!("group '{path}' is not a root group")));
    }
    Ok(group)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::store::test_support::*;
    use crate::types::{GroupGrant, ServiceAccount, ServiceAccountCaller, SystemCaller, User, UserCaller};

    fn user(id: &str, admin: bool) -> Caller {
        Caller::User(UserCaller {
            user: User {
                id: id.to_string(),
                username: id.to_string(),
                admin,
                created_at: Utc::now(),
            },
        })
    }

    fn grant(subject: &str, group: &Group, allow: Permission, deny: Permission) -> GroupGrant {
        GroupGrant {
            subject_id: subject.to_string(),
            group_id: group.id.clone(),
            allow_bits: allow,
            deny_bits: deny,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_grants_are_inherited_down_the_tree() {
        let store = store().await;
        let tx = store.begin().await.unwrap();
        let root = group(&tx, "acme", None);
        let child = group(&tx, "team", Some(&root));

        grants::upsert(
            &tx,
            &grant("alice", &root, Permission::MIRROR_WRITE, Permission::default()),
        )
        .unwrap();

        let alice = user("alice", false);
        assert!(check_group_permission(&tx, &alice, &child.id, Permission::MIRROR_READ).unwrap());
        assert!(!check_group_permission(&tx, &alice, &child.id, Permission::PROVIDER_READ).unwrap());

        let err = require_group_permission(&tx, &user("bob", false), &child.id, Permission::MIRROR_READ)
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_deny_on_child_overrides_parent_allow() {
        let store = store().await;
        let tx = store.begin().await.unwrap();
        let root = group(&tx, "acme", None);
        let child = group(&tx, "team", Some(&root));

        grants::upsert(
            &tx,
            &grant("alice", &root, Permission::GROUP_ADMIN, Permission::default()),
        )
        .unwrap();
        grants::upsert(
            &tx,
            &grant("alice", &child, Permission::default(), Permission::GPG_KEY_WRITE),
        )
        .unwrap();

        let alice = user("alice", false);
        assert!(!check_group_permission(&tx, &alice, &child.id, Permission::GPG_KEY_WRITE).unwrap());
        assert!(check_group_permission(&tx, &alice, &root.id, Permission::GPG_KEY_WRITE).unwrap());
    }

    #[tokio::test]
    async fn test_unrestricted_callers_bypass_grants() {
        let store = store().await;
        let tx = store.begin().await.unwrap();
        let root = group(&tx, "acme", None);

        assert!(check_group_permission(&tx, &user("root", true), &root.id, Permission::GROUP_ADMIN).unwrap());
        assert!(
            check_group_permission(&tx, &Caller::System(SystemCaller), &root.id, Permission::MIRROR_WRITE)
                .unwrap()
        );

        let sa = Caller::ServiceAccount(ServiceAccountCaller {
            service_account: ServiceAccount {
                id: "sa-1".to_string(),
                name: "ci".to_string(),
                group_id: root.id.clone(),
                resource_path: "acme/ci".to_string(),
                created_at: Utc::now(),
            },
        });
        assert!(!check_group_permission(&tx, &sa, &root.id, Permission::PROVIDER_READ).unwrap());
    }

    #[tokio::test]
    async fn test_root_group_by_path() {
        let store = store().await;
        let tx = store.begin().await.unwrap();
        let root = group(&tx, "acme", None);
        group(&tx, "team", Some(&root));

        assert_eq!(root_group_by_path(&tx, "acme").unwrap().id, root.id);
        assert!(matches!(root_group_by_path(&tx, "acme/team"), Err(Error::Invalid(_))));
        assert!(matches!(group_by_path(&tx, "nope"), Err(Error::NotFound(_))));
    }
}
