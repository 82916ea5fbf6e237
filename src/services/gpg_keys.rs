use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

use super::access::{self, require_group_permission};
use super::activity::{self, Target};
use super::limits::LimitChecker;
use crate::context::RequestContext;
use crate::error::{Error, Result};
use crate::store::{SqliteStore, gpg_keys};
use crate::types::{ActivityAction, ActivityTarget, GpgKey, LimitName, Permission};
use crate::verify::{format_key_id, inspect_public_key};

/// Public keys trusted to sign provider checksums. A key stored on a group
/// is trusted for providers in that group and every group below it.
pub struct GpgKeyService {
    store: SqliteStore,
    limits: Arc<dyn LimitChecker>,
}

impl GpgKeyService {
    pub fn new(store: SqliteStore, limits: Arc<dyn LimitChecker>) -> Self {
        Self { store, limits }
    }

    pub async fn create_gpg_key(
        &self,
        ctx: &RequestContext,
        group_path: &str,
        ascii_armor: &str,
    ) -> Result<GpgKey> {
        let caller = ctx.caller()?;
        let info = inspect_public_key(ascii_armor)
            .map_err(|e| Error::invalid(format!("invalid GPG public key: {e}")))?;

        let tx = self.store.begin().await?;
        let group = access::group_by_path(&tx, group_path)?;
        require_group_permission(&tx, caller, &group.id, Permission::GPG_KEY_WRITE)?;

        let key = GpgKey {
            id: Uuid::new_v4().to_string(),
            group_id: group.id.clone(),
            gpg_key_id: info.key_id,
            fingerprint: info.fingerprint,
            ascii_armor: ascii_armor.trim().to_string(),
            created_by: caller.subject(),
            created_at: Utc::now(),
        };
        gpg_keys::insert(&tx, &key)?;

        let count = gpg_keys::count_by_group(&tx, &group.id)?;
        self.limits
            .check_limit(&tx, LimitName::GpgKeysPerGroup, count)?;

        activity::record(
            &tx,
            caller,
            ActivityAction::Create,
            key_target(&key),
            Some(json!({ "key_id": format_key_id(key.gpg_key_id) })),
        )?;
        tx.commit()?;

        tracing::info!(
            "Added GPG key {} to {}",
            format_key_id(key.gpg_key_id),
            group.full_path
        );
        Ok(key)
    }

    pub async fn get_gpg_key(&self, ctx: &RequestContext, id: &str) -> Result<GpgKey> {
        let caller = ctx.caller()?;
        let tx = self.store.read().await?;
        let key = key_or_not_found(&tx, id)?;
        require_group_permission(&tx, caller, &key.group_id, Permission::GPG_KEY_READ)?;
        Ok(key)
    }

    /// Keys on the group itself, or also those of its ancestors when
    /// `include_inherited` is set (nearest group first).
    pub async fn list_gpg_keys(
        &self,
        ctx: &RequestContext,
        group_path: &str,
        include_inherited: bool,
    ) -> Result<Vec<GpgKey>> {
        let caller = ctx.caller()?;
        let tx = self.store.read().await?;
        let group = access::group_by_path(&tx, group_path)?;
        require_group_permission(&tx, caller, &group.id, Permission::GPG_KEY_READ)?;

        if include_inherited {
            gpg_keys::list_inherited(&tx, &group.id, None)
        } else {
            gpg_keys::list_by_group(&tx, &group.id)
        }
    }

    /// Versions already signed with this key keep their snapshot of it.
    pub async fn delete_gpg_key(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        let caller = ctx.caller()?;
        let tx = self.store.begin().await?;
        let key = key_or_not_found(&tx, id)?;
        require_group_permission(&tx, caller, &key.group_id, Permission::GPG_KEY_WRITE)?;

        gpg_keys::delete(&tx, &key.id)?;
        activity::record(
            &tx,
            caller,
            ActivityAction::Delete,
            key_target(&key),
            Some(json!({ "key_id": format_key_id(key.gpg_key_id) })),
        )?;
        tx.commit()
    }
}

fn key_target(key: &GpgKey) -> Target<'_> {
    Target {
        kind: ActivityTarget::GpgKey,
        id: &key.id,
        group_id: &key.group_id,
    }
}

fn key_or_not_found(conn: &Connection, id: &str) -> Result<GpgKey> {
    gpg_keys::get(conn, id)?.ok_or_else(|| Error::not_found(format!("gpg key {id} not found")))
}
