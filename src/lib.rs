pub mod api_connection;
pub mod assistant;
pub mod cli;
pub mod config;
pub mod error;
pub mod inventory;
pub mod logger;
pub mod modification;
pub mod reconciliation;
pub mod store;
pub mod taste_profile;

pub use assistant::{Assistant, Conversation, Oracle, TurnReply};
pub use config::AppConfig;
pub use error::{ParseError, PersistenceError};
pub use inventory::InventoryLine;
pub use modification::{Action, ModificationInstruction};
pub use reconciliation::{BatchMode, ReconciliationOutcome, Reconciler};
pub use store::Store;
