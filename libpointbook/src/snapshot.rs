//! Snapshot encoding
//!
//! A snapshot is the whole state minus `isLoading`, as one flat JSON
//! document stored under a single key.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;
use crate::state::{AppState, StatePatch};

/// Serialize `state` for storage
pub fn encode(state: &AppState) -> Result<String> {
    Ok(serde_json::to_string(state)?)
}

/// Parse a stored snapshot into a patch to merge over defaults
///
/// Returns `Ok(None)` when the document parses but carries no `userPoints`
/// (absent or null). Saved state without a balance is not trusted.
///
/// List entries (`userBets`, `completedBets`, `cart`) are read one at a
/// time: an entry that does not decode is dropped with a warning, and the
/// rest of the snapshot is kept.
///
/// # Errors
///
/// Returns `PointbookError::Snapshot` when the text is not a JSON object or
/// a scalar field has the wrong shape.
pub fn decode(text: &str) -> Result<Option<StatePatch>> {
    let mut doc: Value = serde_json::from_str(text)?;

    let (user_bets, completed_bets, cart) = match doc.as_object_mut() {
        Some(fields) => (
            fields.remove("userBets"),
            fields.remove("completedBets"),
            fields.remove("cart"),
        ),
        None => (None, None, None),
    };

    let mut patch: StatePatch = serde_json::from_value(doc)?;
    if patch.user_points.is_none() {
        return Ok(None);
    }
    // A snapshot never decides whether we are loading.
    patch.is_loading = None;
    patch.user_bets = user_bets.and_then(|v| decode_list("userBets", v));
    patch.completed_bets = completed_bets.and_then(|v| decode_list("completedBets", v));
    patch.cart = cart.and_then(|v| decode_list("cart", v));
    Ok(Some(patch))
}

fn decode_list<T: DeserializeOwned>(field: &str, value: Value) -> Option<Vec<T>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Null => return None,
        _ => {
            tracing::warn!(field, "Saved list is not an array, ignoring it");
            return None;
        }
    };

    let decoded = items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(field, index, error = %e, "Skipping unreadable saved entry");
                None
            }
        })
        .collect();
    Some(decoded)
}
