// Pantry store: one SQLite connection shared behind a mutex.
// Inventory and taste-profile queries live in their own modules as
// additional `impl Store` blocks.

use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::StoreResult;

/// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Store {
    pub(crate) conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database file and make sure the tables exist.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!("Opening pantry store at {:?}", path);
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        debug!("journal_mode={}", mode);
        Self::from_connection(conn)
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn run_migrations(conn: &Connection) -> StoreResult<()> {
    debug!("Ensuring pantry schema");
    // Dates are stored as ISO `YYYY-MM-DD` text so lexical order is date order.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS inventory (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            expiration TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_inventory_key
            ON inventory(name, expiration);

        CREATE TABLE IF NOT EXISTS taste_profile (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            profile TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_tables() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('inventory', 'taste_profile')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_reopen_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pantry.db");
        {
            let store = Store::open(&path).unwrap();
            store
                .conn
                .lock()
                .execute("INSERT INTO taste_profile (profile) VALUES ('spicy')", [])
                .unwrap();
        }
        let store = Store::open(&path).unwrap();
        let profile: String = store
            .conn
            .lock()
            .query_row("SELECT profile FROM taste_profile", [], |row| row.get(0))
            .unwrap();
        assert_eq!(profile, "spicy");
    }
}
