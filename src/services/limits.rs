use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::store::resource_limits;
use crate::types::LimitName;

/// Post-insert ceiling check. Call it after the mutating write and before
/// commit, passing the count as seen inside the same transaction; an error
/// causes the caller's transaction to roll back.
pub trait LimitChecker: Send + Sync {
    fn check_limit(&self, conn: &Connection, name: LimitName, count: i64) -> Result<()>;
}

/// Reads ceilings from the `resource_limits` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreLimitChecker;

impl LimitChecker for StoreLimitChecker {
    fn check_limit(&self, conn: &Connection, name: LimitName, count: i64) -> Result<()> {
        let limit = resource_limits::get(conn, name)?.unwrap_or_else(|| name.default_value());
        if count > limit {
            return Err(Error::invalid(format!(
                "resource limit {name} exceeded: {count} exceeds the limit of {limit}"
            )));
        }
        Ok(())
    }
}
