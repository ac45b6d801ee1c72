use thiserror::Error;

/// Failures raised by the SQLite-backed pantry store.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Quantity overflow while updating '{name}'")]
    QuantityOverflow { name: String },

    #[error("Stored expiration '{value}' is not a valid date")]
    InvalidStoredDate { value: String },
}

/// Failures raised while decoding an assistant payload.
///
/// `Malformed` rejects the whole payload. The item-level variants are never
/// returned from `parse`; they are collected on the batch for the items that
/// were skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Item {index} is invalid: {reason}")]
    ItemInvalid { index: usize, reason: String },

    #[error("Item {index} has unknown action '{action}'")]
    UnknownAction { index: usize, action: String },
}

pub type StoreResult<T> = std::result::Result<T, PersistenceError>;

/// Invalid settings from the environment or command line.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}
