// Chat turn orchestration: grounds the oracle in the current pantry and
// taste profile, then routes its reply either to the user or through
// reconciliation.

use chrono::NaiveDateTime;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api_connection::{ApiConnectionError, ChatMessage};
use crate::error::{ParseError, PersistenceError};
use crate::inventory::InventoryLine;
use crate::modification::extract_payload;
use crate::reconciliation::{BatchMode, ReconciliationOutcome, Reconciler, NO_STRUCTURED_DATA};
use crate::store::Store;

pub const SYSTEM_PROMPT: &str = "You are an AI assistant managing an inventory system and providing personalized recipe suggestions. When the user requests to modify the inventory, immediately output JSON with the modifications without asking for clarification. Follow these rules:

1. Always use JSON format for inventory modifications.
2. If quantity is not specified, assume 1.
3. If expiration is not specified, estimate a reasonable date based on the item type.
4. Use 'add' for adding items and 'remove' for removing items.
5. Always provide the expiration date in YYYY-MM-DD format.
6. Create a new entry only if an item with the same name and expiration doesn't exist.
7. Update quantity if the item already exists.
8. Remove items by subtracting their entire quantity.

Example JSON format:
{
    \"items\": [
        {\"action\": \"add\", \"name\": \"Apple\", \"quantity\": 5, \"expiration\": \"2023-12-31\"},
        {\"action\": \"remove\", \"name\": \"Milk\", \"quantity\": 2, \"expiration\": \"2023-09-15\"}
    ]
}

For recipe suggestions, consider the user's taste profile and current inventory. Provide 2-3 options with brief descriptions that align with preferences and available ingredients.

Only ask for clarification if the user's request is extremely ambiguous or impossible to act upon.";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Text generator behind the assistant, usually a chat-completion API.
pub trait Oracle: Send + Sync {
    fn generate(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
    ) -> impl Future<Output = Result<String, ApiConnectionError>> + Send;
}

/// User and assistant messages of one chat session, oldest first.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Assistant request failed: {0}")]
    Oracle(#[from] ApiConnectionError),

    #[error("Pantry store failed: {0}")]
    Store(#[from] PersistenceError),
}

/// What one chat turn produced for display.
#[derive(Debug)]
pub struct TurnReply {
    pub text: String,
    /// Set when the reply was a modification payload.
    pub outcome: Option<ReconciliationOutcome>,
    /// Pantry contents after the turn. Reading them back can fail even
    /// though the turn itself, including any writes, went through.
    pub inventory: Result<Vec<InventoryLine>, PersistenceError>,
}

/// Full system prompt for one turn.
pub fn build_system_prompt(inventory_listing: &str, taste_profile: &str, now: NaiveDateTime) -> String {
    format!(
        "{}\n\nCurrent Inventory:\n{}\n\nUser's Taste Profile:\n{}\n\nTime of user message: {}",
        SYSTEM_PROMPT,
        inventory_listing,
        taste_profile,
        now.format(TIMESTAMP_FORMAT)
    )
}

pub struct Assistant<'a, O: Oracle> {
    oracle: O,
    store: &'a Store,
    mode: BatchMode,
}

impl<'a, O: Oracle> Assistant<'a, O> {
    pub fn new(oracle: O, store: &'a Store, mode: BatchMode) -> Self {
        Self {
            oracle,
            store,
            mode,
        }
    }

    /// Run one user turn against `conversation`.
    ///
    /// If the prompt cannot be built or the oracle fails, the user message is
    /// taken back out of the conversation so the turn can simply be retried.
    /// Once the oracle has answered the turn is kept, since a payload may
    /// already have been written to the store.
    pub async fn handle_turn(
        &self,
        conversation: &mut Conversation,
        user_text: &str,
        now: NaiveDateTime,
    ) -> Result<TurnReply, AssistantError> {
        conversation.messages.push(ChatMessage::user(user_text));

        let response = match self.ask_oracle(conversation, now).await {
            Ok(response) => response,
            Err(err) => {
                conversation.messages.pop();
                return Err(err);
            }
        };

        let (text, outcome) = self.route_response(response);
        conversation
            .messages
            .push(ChatMessage::assistant(text.clone()));

        let inventory = self.store.list_all();
        if let Err(err) = &inventory {
            warn!("Could not read pantry after turn: {}", err);
        }

        Ok(TurnReply {
            text,
            outcome,
            inventory,
        })
    }

    async fn ask_oracle(
        &self,
        conversation: &Conversation,
        now: NaiveDateTime,
    ) -> Result<String, AssistantError> {
        let system_prompt = build_system_prompt(
            &self.store.inventory_listing()?,
            &self.store.current_taste_profile()?,
            now,
        );

        Ok(self
            .oracle
            .generate(&system_prompt, conversation.messages())
            .await?)
    }

    fn route_response(&self, response: String) -> (String, Option<ReconciliationOutcome>) {
        match extract_payload(&response) {
            Some(payload) => {
                debug!("Assistant replied with a modification payload");
                let outcome = Reconciler::with_mode(self.store, self.mode).reconcile(payload);
                let text = match &outcome {
                    ReconciliationOutcome::Rejected(ParseError::Malformed(_)) => {
                        format!("{}\n\n{}", NO_STRUCTURED_DATA, response.trim())
                    }
                    _ => outcome.message(),
                };
                (text, Some(outcome))
            }
            None => {
                info!("Assistant replied conversationally");
                (response, None)
            }
        }
    }
}
