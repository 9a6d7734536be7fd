//! Connection helpers for the slot store.

use rusqlite::Connection;
use std::path::Path;

pub(crate) fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS app_slots (
            slot TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )
}

pub(crate) fn open_file(path: impl AsRef<Path>) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub(crate) fn open_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}
