//! Cache connection setup.
//!
//! # Invariants
//! - Every handed-out connection enforces foreign keys.
//! - Every handed-out connection carries the newest schema.

use super::migrations::apply_migrations;
use super::DbResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const LOCK_WAIT: Duration = Duration::from_secs(5);

/// Where a cache connection points.
#[derive(Clone, Copy)]
enum Target<'a> {
    File(&'a Path),
    Memory,
}

impl Target<'_> {
    fn label(self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Memory => "memory",
        }
    }

    fn connect(self) -> rusqlite::Result<Connection> {
        match self {
            Self::File(path) => Connection::open(path),
            Self::Memory => Connection::open_in_memory(),
        }
    }
}

/// Opens (creating if needed) the cache file at `path` and migrates it.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    prepare(Target::File(path.as_ref()))
}

/// Opens a throwaway cache that lives as long as the connection.
pub fn open_db_in_memory() -> DbResult<Connection> {
    prepare(Target::Memory)
}

fn prepare(target: Target<'_>) -> DbResult<Connection> {
    let started = Instant::now();
    let mode = target.label();

    let result = target
        .connect()
        .map_err(Into::into)
        .and_then(|mut conn| configure(&mut conn).map(|()| conn));

    let elapsed_ms = started.elapsed().as_millis();
    match &result {
        Ok(_) => info!("event=db_open module=db status=ok mode={mode} duration_ms={elapsed_ms}"),
        Err(err) => error!(
            "event=db_open module=db status=error mode={mode} duration_ms={elapsed_ms} error={err}"
        ),
    }
    result
}

fn configure(conn: &mut Connection) -> DbResult<()> {
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.busy_timeout(LOCK_WAIT)?;
    apply_migrations(conn)
}
