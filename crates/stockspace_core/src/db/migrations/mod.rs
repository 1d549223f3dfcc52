//! Cache schema steps.
//!
//! # Responsibility
//! - List the schema steps of the local cache in order.
//! - Bring a connection from its stored version to the newest one.
//!
//! # Invariants
//! - Step numbers start at 1 and grow by one.
//! - All pending steps commit together or not at all; the stored
//!   `PRAGMA user_version` always names the last committed step.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::Connection;

/// Ordered schema steps; index `n` holds step `n + 1`.
const SCHEMA_STEPS: [(&str, &str); 2] = [
    ("items", include_str!("0001_items.sql")),
    ("transfer_requests", include_str!("0002_transfer_requests.sql")),
];

/// Schema version written by the newest step this build knows.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.len() as u32
}

/// Runs every step above the stored version inside one transaction.
///
/// # Errors
/// - `DbError::UnsupportedSchemaVersion` when the cache was written by a
///   newer build.
/// - `DbError::Sqlite` when a step fails; nothing is committed then.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let stored: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    let latest = latest_version();
    if stored > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: stored,
            latest_supported: latest,
        });
    }

    let pending = SCHEMA_STEPS
        .iter()
        .enumerate()
        .skip(stored as usize)
        .collect::<Vec<_>>();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (index, (name, sql)) in pending {
        let version = index as u32 + 1;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", version)?;
        debug!("event=db_migrate_step module=db status=ok version={version} name={name}");
    }
    tx.commit()?;

    info!("event=db_migrate module=db status=ok from_version={stored} to_version={latest}");
    Ok(())
}
