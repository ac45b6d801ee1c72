use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::{ParseError, PersistenceError};
use crate::inventory::{InventoryDelta, DATE_FORMAT};
use crate::modification::{self, Action, ModificationInstruction, ESTIMATED};
use crate::store::Store;

/// Shown instead of a summary when a payload cannot be decoded.
pub const NO_STRUCTURED_DATA: &str = "No valid structured data found in the response.";

/// How a batch of instructions is written to the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchMode {
    /// Each instruction commits on its own; a failure keeps earlier writes.
    #[default]
    Sequential,
    /// The whole batch commits in one transaction or not at all.
    Atomic,
}

impl FromStr for BatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(BatchMode::Sequential),
            "atomic" => Ok(BatchMode::Atomic),
            other => Err(format!(
                "unknown batch mode '{}' (expected 'sequential' or 'atomic')",
                other
            )),
        }
    }
}

impl fmt::Display for BatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchMode::Sequential => write!(f, "sequential"),
            BatchMode::Atomic => write!(f, "atomic"),
        }
    }
}

#[derive(Debug)]
pub enum ReconciliationOutcome {
    /// Every instruction was written. `skipped` counts payload items the
    /// parser dropped before applying.
    Applied {
        applied: usize,
        skipped: usize,
        summary: String,
    },
    /// Sequential mode: instruction `failed_index` failed; the ones before it
    /// stay committed and are described by `applied_summary`.
    PartialFailure {
        failed_index: usize,
        applied_summary: String,
        error: PersistenceError,
    },
    /// Atomic mode: instruction `failed_index` failed and nothing was kept.
    RolledBack {
        failed_index: usize,
        error: PersistenceError,
    },
    /// The payload or one of the instructions was invalid; nothing reached
    /// the store.
    Rejected(ParseError),
}

impl ReconciliationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ReconciliationOutcome::Applied { .. })
    }

    /// Text shown to the user for this outcome.
    pub fn message(&self) -> String {
        match self {
            ReconciliationOutcome::Applied {
                applied: 0,
                skipped,
                ..
            } if *skipped > 0 => format!(
                "No inventory changes were applied ({} invalid item(s) skipped).",
                skipped
            ),
            ReconciliationOutcome::Applied {
                skipped, summary, ..
            } => {
                let summary = if *skipped > 0 {
                    join_lines(summary, &format!("Skipped {} invalid item(s).", skipped))
                } else {
                    summary.clone()
                };
                join_lines(&summary, "Inventory updated successfully.")
            }
            ReconciliationOutcome::PartialFailure {
                applied_summary,
                error,
                ..
            } => join_lines(
                applied_summary,
                &format!("Error processing inventory modification: {}", error),
            ),
            ReconciliationOutcome::RolledBack { error, .. } => format!(
                "Error processing inventory modification: {}\nNo changes were saved.",
                error
            ),
            ReconciliationOutcome::Rejected(ParseError::Malformed(_)) => {
                NO_STRUCTURED_DATA.to_string()
            }
            ReconciliationOutcome::Rejected(err) => {
                format!("Inventory modification rejected: {}", err)
            }
        }
    }
}

fn join_lines(head: &str, tail: &str) -> String {
    if head.is_empty() {
        tail.to_string()
    } else {
        format!("{}\n{}", head, tail)
    }
}

/// One human-readable line per instruction, in input order.
pub fn summarize(instructions: &[ModificationInstruction]) -> String {
    instructions
        .iter()
        .map(|i| match i.action {
            Action::Add => format!(
                "Added {} {} (Expires: {})",
                i.quantity,
                i.name,
                i.expiration
                    .map(|d| d.format(DATE_FORMAT).to_string())
                    .unwrap_or_else(|| ESTIMATED.to_string())
            ),
            Action::Remove => format!("Removed {} {}", i.quantity, i.name),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Applies modification batches to the pantry store.
pub struct Reconciler<'a> {
    store: &'a Store,
    mode: BatchMode,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            mode: BatchMode::default(),
        }
    }

    pub fn with_mode(store: &'a Store, mode: BatchMode) -> Self {
        Self { store, mode }
    }

    pub fn mode(&self) -> BatchMode {
        self.mode
    }

    /// Parse `payload` and apply it. Parse failures never touch the store.
    pub fn reconcile(&self, payload: &str) -> ReconciliationOutcome {
        match modification::parse(payload) {
            Ok(batch) => {
                let mut outcome = self.apply(&batch.instructions);
                if let ReconciliationOutcome::Applied { skipped, .. } = &mut outcome {
                    *skipped = batch.skipped.len();
                }
                outcome
            }
            Err(err) => {
                warn!("Rejected modification payload: {}", err);
                ReconciliationOutcome::Rejected(err)
            }
        }
    }

    /// Apply `instructions` in order. Later instructions see the effect of
    /// earlier ones in the same batch.
    ///
    /// The whole batch is validated first; an instruction without a name or
    /// with a non-positive quantity rejects the batch before any write.
    pub fn apply(&self, instructions: &[ModificationInstruction]) -> ReconciliationOutcome {
        let deltas = match instructions
            .iter()
            .enumerate()
            .map(|(index, instruction)| instruction.to_delta(index))
            .collect::<Result<Vec<InventoryDelta>, ParseError>>()
        {
            Ok(deltas) => deltas,
            Err(err) => {
                warn!("Rejected modification batch: {}", err);
                return ReconciliationOutcome::Rejected(err);
            }
        };

        let outcome = match self.mode {
            BatchMode::Sequential => self.apply_sequential(instructions, &deltas),
            BatchMode::Atomic => self.apply_atomic(instructions, &deltas),
        };
        match &outcome {
            ReconciliationOutcome::Applied { applied, .. } => {
                info!("Applied {} inventory modifications ({})", applied, self.mode)
            }
            ReconciliationOutcome::PartialFailure {
                failed_index,
                error,
                ..
            } => warn!(
                "Inventory modification {} failed, earlier ones were kept: {}",
                failed_index, error
            ),
            ReconciliationOutcome::RolledBack {
                failed_index,
                error,
            } => warn!(
                "Inventory modification {} failed, batch rolled back: {}",
                failed_index, error
            ),
            ReconciliationOutcome::Rejected(_) => {}
        }
        outcome
    }

    fn apply_sequential(
        &self,
        instructions: &[ModificationInstruction],
        deltas: &[InventoryDelta],
    ) -> ReconciliationOutcome {
        for (index, d) in deltas.iter().enumerate() {
            if let Err(error) = self.store.upsert_delta(&d.name, d.expiration, d.delta) {
                return ReconciliationOutcome::PartialFailure {
                    failed_index: index,
                    applied_summary: summarize(&instructions[..index]),
                    error,
                };
            }
        }
        ReconciliationOutcome::Applied {
            applied: instructions.len(),
            skipped: 0,
            summary: summarize(instructions),
        }
    }

    fn apply_atomic(
        &self,
        instructions: &[ModificationInstruction],
        deltas: &[InventoryDelta],
    ) -> ReconciliationOutcome {
        match self.store.upsert_batch_atomic(deltas) {
            Ok(_) => ReconciliationOutcome::Applied {
                applied: instructions.len(),
                skipped: 0,
                summary: summarize(instructions),
            },
            Err(failure) => ReconciliationOutcome::RolledBack {
                failed_index: failure.index,
                error: failure.error,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_summarize_lines() {
        let instructions = vec![
            ModificationInstruction::add(
                "Apple",
                5,
                NaiveDate::from_ymd_opt(2023, 12, 31),
            ),
            ModificationInstruction::add("Bread", 1, None),
            ModificationInstruction::remove("Milk", 2, NaiveDate::from_ymd_opt(2023, 9, 15)),
        ];
        assert_eq!(
            summarize(&instructions),
            "Added 5 Apple (Expires: 2023-12-31)\nAdded 1 Bread (Expires: estimated)\nRemoved 2 Milk"
        );
        assert_eq!(summarize(&[]), "");
    }

    #[test]
    fn test_batch_mode_from_str() {
        assert_eq!("Atomic".parse::<BatchMode>(), Ok(BatchMode::Atomic));
        assert_eq!("sequential".parse::<BatchMode>(), Ok(BatchMode::Sequential));
        assert!("eventually".parse::<BatchMode>().is_err());
    }

    #[test]
    fn test_outcome_messages() {
        let applied = ReconciliationOutcome::Applied {
            applied: 1,
            skipped: 0,
            summary: "Removed 1 Milk".to_string(),
        };
        assert_eq!(
            applied.message(),
            "Removed 1 Milk\nInventory updated successfully."
        );

        let with_skips = ReconciliationOutcome::Applied {
            applied: 1,
            skipped: 2,
            summary: "Removed 1 Milk".to_string(),
        };
        assert_eq!(
            with_skips.message(),
            "Removed 1 Milk\nSkipped 2 invalid item(s).\nInventory updated successfully."
        );

        let nothing = ReconciliationOutcome::Applied {
            applied: 0,
            skipped: 3,
            summary: String::new(),
        };
        assert_eq!(
            nothing.message(),
            "No inventory changes were applied (3 invalid item(s) skipped)."
        );

        let invalid = ReconciliationOutcome::Rejected(ParseError::ItemInvalid {
            index: 0,
            reason: "quantity -3 is not a positive integer".to_string(),
        });
        assert_eq!(
            invalid.message(),
            "Inventory modification rejected: Item 0 is invalid: quantity -3 is not a positive integer"
        );

        let rejected = ReconciliationOutcome::Rejected(ParseError::Malformed("x".to_string()));
        assert_eq!(rejected.message(), NO_STRUCTURED_DATA);

        let partial = ReconciliationOutcome::PartialFailure {
            failed_index: 0,
            applied_summary: String::new(),
            error: PersistenceError::QuantityOverflow {
                name: "Rice".to_string(),
            },
        };
        assert_eq!(
            partial.message(),
            "Error processing inventory modification: Quantity overflow while updating 'Rice'"
        );
    }
}
