use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use std::fmt;
use std::io;
use tracing::debug;

use crate::error::{PersistenceError, StoreResult};
use crate::store::Store;

/// Storage and wire format for expiration dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// One pantry record. `(name, expiration)` identifies the line; the stored
/// quantity is always positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InventoryLine {
    pub name: String,
    pub quantity: i64,
    pub expiration: Option<NaiveDate>,
}

impl InventoryLine {
    pub fn expiration_label(&self) -> String {
        format_expiration(self.expiration)
    }
}

impl fmt::Display for InventoryLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} (Expires: {})",
            self.name,
            self.quantity,
            self.expiration_label()
        )
    }
}

/// ISO date, or `unknown` when the line has no expiration.
pub fn format_expiration(expiration: Option<NaiveDate>) -> String {
    match expiration {
        Some(date) => date.format(DATE_FORMAT).to_string(),
        None => "unknown".to_string(),
    }
}

/// Write `lines` as CSV with a `Name,Quantity,Expiration` header. An unknown
/// expiration is an empty cell.
pub fn write_csv<W: io::Write>(lines: &[InventoryLine], writer: W) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    if lines.is_empty() {
        writer.write_record(["Name", "Quantity", "Expiration"])?;
    }
    for line in lines {
        writer.serialize(line)?;
    }
    writer.flush()?;
    Ok(())
}

/// What a single `upsert_delta` did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertEffect {
    Inserted { quantity: i64 },
    Updated { quantity: i64 },
    Deleted,
    /// Non-positive delta for a line that does not exist.
    Ignored,
}

/// A signed quantity change for one inventory key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryDelta {
    pub name: String,
    pub expiration: Option<NaiveDate>,
    pub delta: i64,
}

/// The delta at `index` failed; the whole batch was rolled back.
#[derive(Debug)]
pub struct BatchFailure {
    pub index: usize,
    pub error: PersistenceError,
}

impl Store {
    /// Apply `delta` to the line keyed by `(name, expiration)` in one
    /// immediate transaction.
    ///
    /// Existing lines are updated, or deleted once the quantity drops to zero
    /// or below. A missing line is created only for a positive delta;
    /// removing something that is not stored is a no-op.
    pub fn upsert_delta(
        &self,
        name: &str,
        expiration: Option<NaiveDate>,
        delta: i64,
    ) -> StoreResult<UpsertEffect> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let effect = upsert_delta_on(&tx, name, expiration, delta)?;
        tx.commit()?;
        Ok(effect)
    }

    /// Apply every delta in order inside a single transaction. Nothing is
    /// persisted unless all of them succeed.
    pub fn upsert_batch_atomic(
        &self,
        deltas: &[InventoryDelta],
    ) -> Result<Vec<UpsertEffect>, BatchFailure> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| BatchFailure {
                index: 0,
                error: e.into(),
            })?;

        let mut effects = Vec::with_capacity(deltas.len());
        for (index, d) in deltas.iter().enumerate() {
            let effect = upsert_delta_on(&tx, &d.name, d.expiration, d.delta)
                .map_err(|error| BatchFailure { index, error })?;
            effects.push(effect);
        }

        tx.commit().map_err(|e| BatchFailure {
            index: deltas.len().saturating_sub(1),
            error: e.into(),
        })?;
        Ok(effects)
    }

    /// All lines, soonest expiration first. Lines without an expiration come
    /// last; ties are ordered by name, then insertion order.
    pub fn list_all(&self) -> StoreResult<Vec<InventoryLine>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT name, quantity, expiration FROM inventory
             ORDER BY expiration IS NULL, expiration ASC, name ASC, id ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(name, quantity, expiration)| {
                Ok(InventoryLine {
                    name,
                    quantity,
                    expiration: expiration.as_deref().map(parse_stored_date).transpose()?,
                })
            })
            .collect()
    }

    /// Delete every line. Returns how many were removed.
    pub fn clear_all(&self) -> StoreResult<usize> {
        let conn = self.conn.lock();
        let removed = conn.execute("DELETE FROM inventory", [])?;
        debug!("Cleared {} inventory lines", removed);
        Ok(removed)
    }

    /// The pantry as the assistant sees it, one `name: qty (Expires: date)`
    /// line per record.
    pub fn inventory_listing(&self) -> StoreResult<String> {
        Ok(self
            .list_all()?
            .iter()
            .map(|line| line.to_string())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

fn upsert_delta_on(
    conn: &Connection,
    name: &str,
    expiration: Option<NaiveDate>,
    delta: i64,
) -> StoreResult<UpsertEffect> {
    let expiration = expiration.map(|d| d.format(DATE_FORMAT).to_string());

    // `IS` so that two unknown expirations match each other.
    let existing: Option<(i64, i64)> = conn
        .query_row(
            "SELECT id, quantity FROM inventory WHERE name = ?1 AND expiration IS ?2
             ORDER BY id LIMIT 1",
            params![name, expiration],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let effect = match existing {
        Some((id, current)) => {
            let quantity = current
                .checked_add(delta)
                .ok_or_else(|| PersistenceError::QuantityOverflow {
                    name: name.to_string(),
                })?;
            if quantity > 0 {
                conn.execute(
                    "UPDATE inventory SET quantity = ?1 WHERE id = ?2",
                    params![quantity, id],
                )?;
                UpsertEffect::Updated { quantity }
            } else {
                conn.execute("DELETE FROM inventory WHERE id = ?1", params![id])?;
                UpsertEffect::Deleted
            }
        }
        None if delta > 0 => {
            conn.execute(
                "INSERT INTO inventory (name, quantity, expiration) VALUES (?1, ?2, ?3)",
                params![name, delta, expiration],
            )?;
            UpsertEffect::Inserted { quantity: delta }
        }
        None => UpsertEffect::Ignored,
    };

    debug!(
        "upsert_delta name={} expiration={:?} delta={} -> {:?}",
        name, expiration, delta, effect
    );
    Ok(effect)
}

fn parse_stored_date(value: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| PersistenceError::InvalidStoredDate {
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_line_display_matches_prompt_format() {
        let line = InventoryLine {
            name: "Milk".to_string(),
            quantity: 2,
            expiration: Some(date("2024-01-01")),
        };
        assert_eq!(line.to_string(), "Milk: 2 (Expires: 2024-01-01)");

        let unknown = InventoryLine {
            name: "Salt".to_string(),
            quantity: 1,
            expiration: None,
        };
        assert_eq!(unknown.to_string(), "Salt: 1 (Expires: unknown)");
    }

    #[test]
    fn test_write_csv_export() {
        let lines = vec![
            InventoryLine {
                name: "Milk".to_string(),
                quantity: 2,
                expiration: Some(date("2024-01-01")),
            },
            InventoryLine {
                name: "Salt, coarse".to_string(),
                quantity: 1,
                expiration: None,
            },
        ];
        let mut out = Vec::new();
        write_csv(&lines, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Name,Quantity,Expiration\nMilk,2,2024-01-01\n\"Salt, coarse\",1,\n"
        );

        let mut empty = Vec::new();
        write_csv(&[], &mut empty).unwrap();
        assert_eq!(String::from_utf8(empty).unwrap(), "Name,Quantity,Expiration\n");
    }

    #[test]
    fn test_unknown_expirations_share_a_line() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_delta("Salt", None, 1).unwrap();
        let effect = store.upsert_delta("Salt", None, 2).unwrap();
        assert_eq!(effect, UpsertEffect::Updated { quantity: 3 });
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_overflow_leaves_line_untouched() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_delta("Rice", None, i64::MAX).unwrap();
        let err = store.upsert_delta("Rice", None, 1).unwrap_err();
        assert!(matches!(err, PersistenceError::QuantityOverflow { .. }));
        assert_eq!(store.list_all().unwrap()[0].quantity, i64::MAX);
    }

    #[test]
    fn test_corrupt_stored_date_is_reported() {
        let store = Store::open_in_memory().unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO inventory (name, quantity, expiration) VALUES ('Jam', 1, 'soon')",
                [],
            )
            .unwrap();
        let err = store.list_all().unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidStoredDate { value } if value == "soon"));
    }
}
