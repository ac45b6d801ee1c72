use rusqlite::{params, OptionalExtension};

use crate::error::StoreResult;
use crate::store::Store;

impl Store {
    /// Most recently saved profile, or an empty string if none was ever saved.
    pub fn current_taste_profile(&self) -> StoreResult<String> {
        let conn = self.conn.lock();
        let profile = conn
            .query_row(
                "SELECT profile FROM taste_profile ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(profile.unwrap_or_default())
    }

    /// Append a new profile snapshot; earlier ones are kept as history.
    pub fn save_taste_profile(&self, profile: &str) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO taste_profile (profile) VALUES (?1)",
            params![profile],
        )?;
        Ok(())
    }
}
