//! Decoding of assistant payloads into inventory modification instructions.
//!
//! The assistant is asked to answer inventory requests with
//! `{"items": [{"action": "add"|"remove", "name": .., "quantity"?: .., "expiration"?: ..}]}`
//! but nothing guarantees it does, so every field is checked here before
//! anything reaches the store.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::ParseError;
use crate::inventory::{InventoryDelta, DATE_FORMAT};

/// Expiration placeholder used when the assistant gives no date.
pub const ESTIMATED: &str = "estimated";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModificationInstruction {
    pub action: Action,
    pub name: String,
    /// At least 1 when produced by `parse`; hand-built instructions are
    /// checked by `to_delta` before they reach the store.
    pub quantity: i64,
    /// `None` when the payload omitted it or said `"estimated"`.
    pub expiration: Option<NaiveDate>,
}

impl ModificationInstruction {
    pub fn add(name: &str, quantity: i64, expiration: Option<NaiveDate>) -> Self {
        Self {
            action: Action::Add,
            name: name.to_string(),
            quantity,
            expiration,
        }
    }

    pub fn remove(name: &str, quantity: i64, expiration: Option<NaiveDate>) -> Self {
        Self {
            action: Action::Remove,
            name: name.to_string(),
            quantity,
            expiration,
        }
    }

    /// Signed change this instruction applies to its inventory line, or
    /// `None` if the quantity is not positive.
    pub fn delta(&self) -> Option<i64> {
        if self.quantity <= 0 {
            return None;
        }
        match self.action {
            Action::Add => Some(self.quantity),
            Action::Remove => self.quantity.checked_neg(),
        }
    }

    /// Validate this instruction (at position `index` of its batch) and turn
    /// it into a store delta.
    pub fn to_delta(&self, index: usize) -> Result<InventoryDelta, ParseError> {
        if self.name.trim().is_empty() {
            return Err(ParseError::ItemInvalid {
                index,
                reason: "missing 'name'".to_string(),
            });
        }
        let delta = self.delta().ok_or_else(|| ParseError::ItemInvalid {
            index,
            reason: format!("quantity {} is not a positive integer", self.quantity),
        })?;
        Ok(InventoryDelta {
            name: self.name.clone(),
            expiration: self.expiration,
            delta,
        })
    }
}

/// Result of a successful parse: the usable instructions in payload order,
/// plus the items that were skipped and why.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModificationBatch {
    pub instructions: Vec<ModificationInstruction>,
    pub skipped: Vec<ParseError>,
}

/// Find a modification payload in a raw assistant reply.
///
/// A surrounding Markdown code fence is stripped first. The reply counts as a
/// payload only if what remains starts with `{` and ends with `}`; anything
/// else is an ordinary conversational answer.
pub fn extract_payload(response: &str) -> Option<&str> {
    let mut content = response.trim();
    if let Some(inner) = content
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    {
        // Language tag may come back as `json`, `JSON`, `Json`...
        let inner = match inner.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => &inner[4..],
            _ => inner,
        };
        content = inner.trim();
    }

    if content.starts_with('{') && content.ends_with('}') {
        Some(content)
    } else {
        None
    }
}

/// Decode `payload` into a batch of instructions.
///
/// Only a non-JSON payload, a non-object, or a missing/non-array `items`
/// field fails the whole parse. Individual bad items are skipped.
pub fn parse(payload: &str) -> Result<ModificationBatch, ParseError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| ParseError::Malformed(e.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| ParseError::Malformed("payload is not a JSON object".to_string()))?;

    let items = match object.get("items") {
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(ParseError::Malformed(
                "'items' field is not an array".to_string(),
            ))
        }
        None => return Err(ParseError::Malformed("missing 'items' field".to_string())),
    };

    let mut batch = ModificationBatch::default();
    for (index, item) in items.iter().enumerate() {
        match parse_item(index, item) {
            Ok(instruction) => batch.instructions.push(instruction),
            Err(err) => {
                warn!("Skipping modification item: {}", err);
                batch.skipped.push(err);
            }
        }
    }

    debug!(
        "Parsed {} instructions ({} skipped)",
        batch.instructions.len(),
        batch.skipped.len()
    );
    Ok(batch)
}

fn parse_item(index: usize, item: &Value) -> Result<ModificationInstruction, ParseError> {
    let invalid = |reason: &str| ParseError::ItemInvalid {
        index,
        reason: reason.to_string(),
    };

    let fields = item.as_object().ok_or_else(|| invalid("item is not an object"))?;

    let action = match fields.get("action") {
        Some(Value::String(a)) if a == "add" => Action::Add,
        Some(Value::String(a)) if a == "remove" => Action::Remove,
        Some(Value::String(a)) => {
            return Err(ParseError::UnknownAction {
                index,
                action: a.clone(),
            })
        }
        Some(_) => return Err(invalid("'action' is not a string")),
        None => return Err(invalid("missing 'action'")),
    };

    let name = match fields.get("name") {
        Some(Value::String(n)) if !n.trim().is_empty() => n.clone(),
        _ => return Err(invalid("missing 'name'")),
    };

    let quantity = parse_quantity(fields).ok_or_else(|| invalid("'quantity' must be a positive integer"))?;

    let expiration = match fields.get("expiration") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case(ESTIMATED) => None,
        Some(Value::String(s)) => Some(
            NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                .map_err(|_| invalid(&format!("expiration '{}' is not YYYY-MM-DD", s)))?,
        ),
        Some(_) => return Err(invalid("'expiration' is not a string")),
    };

    Ok(ModificationInstruction {
        action,
        name,
        quantity,
        expiration,
    })
}

fn parse_quantity(fields: &Map<String, Value>) -> Option<i64> {
    match fields.get("quantity") {
        None | Some(Value::Null) => Some(1),
        Some(Value::Number(n)) => n.as_i64().filter(|q| *q > 0),
        Some(_) => None,
    }
}
